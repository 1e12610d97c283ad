//! Per-widget preview session.
//!
//! A session owns at most one fetch task. Each [`PreviewSession::request`]
//! aborts the previous task, waits out the debounce window and then
//! fetches. Results are published through a `watch` channel only if no
//! newer request has started in the meantime, so visible state always
//! reflects the latest request.

use serde::Serialize;
use sociovia_preview::{NoiseSuppression, PreviewFailure, PreviewNoiseFilter, RenderedPreview};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;
use tracing::Instrument;

use crate::api::PreviewRequest;
use crate::client::PreviewClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewState {
    Idle,
    Loading {
        generation: u64,
    },
    Ready {
        generation: u64,
        previews: Vec<RenderedPreview>,
    },
    Failed {
        generation: u64,
        failure: PreviewFailure,
    },
}

impl PreviewState {
    pub fn generation(&self) -> Option<u64> {
        match self {
            PreviewState::Idle => None,
            PreviewState::Loading { generation }
            | PreviewState::Ready { generation, .. }
            | PreviewState::Failed { generation, .. } => Some(*generation),
        }
    }

    /// Ready or failed.
    pub fn is_settled(&self) -> bool {
        matches!(self, PreviewState::Ready { .. } | PreviewState::Failed { .. })
    }
}

/// Publishes `state` unless a newer request has superseded `generation`.
#[derive(Clone)]
struct Publisher {
    current: Arc<AtomicU64>,
    tx: Arc<watch::Sender<PreviewState>>,
}

impl Publisher {
    fn publish(&self, generation: u64, state: PreviewState) -> bool {
        self.tx.send_if_modified(|slot| {
            if self.current.load(Ordering::SeqCst) != generation {
                return false;
            }
            *slot = state;
            true
        })
    }
}

pub struct PreviewSession {
    client: Arc<PreviewClient>,
    debounce: Duration,
    publisher: Publisher,
    task: Option<JoinHandle<()>>,
    _noise: Option<NoiseSuppression>,
}

impl PreviewSession {
    pub fn new(client: Arc<PreviewClient>) -> Self {
        let debounce = client.config().debounce;
        let (tx, _rx) = watch::channel(PreviewState::Idle);
        Self {
            client,
            debounce,
            publisher: Publisher {
                current: Arc::new(AtomicU64::new(0)),
                tx: Arc::new(tx),
            },
            task: None,
            _noise: None,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Keep `filter` active for as long as this session lives.
    pub fn with_noise_filter(mut self, filter: &PreviewNoiseFilter) -> Self {
        self._noise = Some(filter.suppress());
        self
    }

    /// Start a new fetch, superseding any pending one. Returns its generation.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request(&mut self, request: PreviewRequest) -> u64 {
        self.abort_task();

        let generation = self.publisher.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.publisher.publish(generation, PreviewState::Loading { generation });

        let client = Arc::clone(&self.client);
        let publisher = self.publisher.clone();
        let debounce = self.debounce;
        let span = tracing::debug_span!("preview_session", generation);

        self.task = Some(tokio::spawn(
            async move {
                tokio::time::sleep(debounce).await;
                let state = match client.load_previews(&request).await {
                    Ok(previews) => PreviewState::Ready {
                        generation,
                        previews,
                    },
                    Err(failure) => PreviewState::Failed {
                        generation,
                        failure,
                    },
                };
                if !publisher.publish(generation, state) {
                    tracing::debug!("discarding superseded preview result");
                }
            }
            .instrument(span),
        ));

        generation
    }

    /// Abort any pending fetch and return to `Idle`.
    pub fn cancel(&mut self) {
        self.abort_task();
        let generation = self.publisher.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.publisher.publish(generation, PreviewState::Idle);
    }

    /// Re-sanitize ready inline previews against a new base href.
    pub fn rebase(&self, base_href: Option<&str>) {
        self.publisher.tx.send_if_modified(|state| match state {
            PreviewState::Ready { previews, .. } => previews
                .iter_mut()
                .fold(false, |changed, preview| preview.rebase(base_href) || changed),
            _ => false,
        });
    }

    pub fn state(&self) -> PreviewState {
        self.publisher.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.publisher.tx.subscribe()
    }

    /// State changes as a stream, starting with the current state.
    pub fn stream(&self) -> WatchStream<PreviewState> {
        WatchStream::new(self.subscribe())
    }

    /// True while a fetch task is still running.
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            if !task.is_finished() {
                tracing::debug!("aborting in-flight preview fetch");
            }
            task.abort();
        }
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        self.abort_task();
    }
}
