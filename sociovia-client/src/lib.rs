//! Async client for the Sociovia ad-preview backend.
//!
//! [`PreviewClient`] fetches and normalizes previews and publishes
//! campaigns. [`PreviewSession`] wraps a client for a single preview widget:
//! it debounces input changes, cancels superseded fetches and exposes the
//! latest state through a `watch` channel.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod transport;

pub use api::{Creative, PreviewRequest, PublishRequest, PublishResponse};
pub use client::{backoff_delay, PreviewClient};
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult, PublishError, TransportError};
pub use session::{PreviewSession, PreviewState};
pub use transport::{HttpTransport, PreviewTransport, REQUEST_ID_HEADER};
