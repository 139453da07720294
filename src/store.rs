use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::models::FetchState;
use crate::sources::{ScheduleSource, SourceError};

/// Holds the itinerary a view renders, together with its loading and error
/// flags, and runs fetch cycles against the configured source.
pub struct ScheduleStore {
    source: Arc<dyn ScheduleSource>,
    state: RwLock<FetchState>,
    current: Mutex<CancellationToken>,
    generation: AtomicU64,
    deadline: Duration,
    error_message: String,
}

impl ScheduleStore {
    pub fn new(
        source: Arc<dyn ScheduleSource>,
        deadline: Duration,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            state: RwLock::new(FetchState::default()),
            current: Mutex::new(CancellationToken::new()),
            generation: AtomicU64::new(0),
            deadline,
            error_message: error_message.into(),
        }
    }

    pub async fn state(&self) -> FetchState {
        self.state.read().await.clone()
    }

    /// Cancels the fetch in flight, if any. It finishes in the failed state.
    pub async fn cancel(&self) {
        self.current.lock().await.cancel();
    }

    /// Runs one fetch cycle and returns the terminal state. The previous list
    /// is replaced wholesale: either by the fetched items or by an empty list
    /// plus the error message.
    ///
    /// Starting a cycle cancels the one before it, and only the latest cycle
    /// commits its outcome to the store. A superseded cycle still returns its
    /// own outcome to its caller.
    pub async fn fetch_schedule(&self) -> FetchState {
        let cancel = CancellationToken::new();
        let generation = {
            let mut current = self.current.lock().await;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            std::mem::replace(&mut *current, cancel.clone()).cancel();
            generation
        };
        {
            let mut state = self.state.write().await;
            state.is_loading = true;
            state.error = None;
        }

        let outcome = match tokio::time::timeout(self.deadline, self.source.fetch_all(&cancel)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                cancel.cancel();
                Err(SourceError::Timeout(self.deadline))
            }
        };

        let next = match outcome {
            Ok(items) => {
                info!(source = self.source.name(), count = items.len(), "schedules loaded");
                FetchState::loaded(items)
            }
            Err(err) => {
                error!(source = self.source.name(), error = %err, "failed to fetch schedules");
                FetchState::failed(self.error_message.clone())
            }
        };

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) == generation {
            *state = next.clone();
        } else {
            debug!(source = self.source.name(), "fetch superseded, result discarded");
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use http::StatusCode;

    use super::*;
    use crate::models::ScheduleItem;

    struct Fixed(Result<Vec<ScheduleItem>, StatusCode>);

    #[async_trait]
    impl ScheduleSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn fetch_all(
            &self,
            _cancel: &CancellationToken,
        ) -> Result<Vec<ScheduleItem>, SourceError> {
            self.0.clone().map_err(SourceError::Status)
        }
    }

    struct Hanging;

    #[async_trait]
    impl ScheduleSource for Hanging {
        fn name(&self) -> &'static str {
            "hanging"
        }

        async fn fetch_all(
            &self,
            cancel: &CancellationToken,
        ) -> Result<Vec<ScheduleItem>, SourceError> {
            cancel.cancelled().await;
            Err(SourceError::Cancelled)
        }
    }

    /// First call is slow and fails unless cancelled first; later calls
    /// succeed quickly.
    struct SlowThenFast {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ScheduleSource for SlowThenFast {
        fn name(&self) -> &'static str {
            "slow-then-fast"
        }

        async fn fetch_all(
            &self,
            cancel: &CancellationToken,
        ) -> Result<Vec<ScheduleItem>, SourceError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::select! {
                    _ = cancel.cancelled() => Err(SourceError::Cancelled),
                    _ = tokio::time::sleep(Duration::from_millis(300)) => {
                        Err(SourceError::Status(StatusCode::BAD_GATEWAY))
                    }
                }
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(vec![shrine()])
            }
        }
    }

    fn shrine() -> ScheduleItem {
        ScheduleItem {
            id: Some(1),
            date: "2026.02.04 (수)".into(),
            time_range: "12:30 ~ 14:00".into(),
            content: "Shrine A".into(),
            lat: 35.0,
            lng: 135.0,
            category: "SIGHT".into(),
            note: None,
        }
    }

    #[tokio::test]
    async fn test_success_populates_data() {
        let store = ScheduleStore::new(
            Arc::new(Fixed(Ok(vec![shrine()]))),
            Duration::from_secs(1),
            "failed",
        );
        let state = store.fetch_schedule().await;
        assert_eq!(state, FetchState::loaded(vec![shrine()]));
        assert_eq!(store.state().await, state);
    }

    #[tokio::test]
    async fn test_failure_empties_data_and_sets_message() {
        let store = ScheduleStore::new(
            Arc::new(Fixed(Err(StatusCode::INTERNAL_SERVER_ERROR))),
            Duration::from_secs(1),
            "일정 데이터를 서버에서 불러오지 못했습니다.",
        );
        let state = store.fetch_schedule().await;
        assert!(state.data.is_empty());
        assert!(!state.is_loading);
        assert_eq!(
            state.error.as_deref(),
            Some("일정 데이터를 서버에서 불러오지 못했습니다.")
        );
    }

    #[tokio::test]
    async fn test_deadline_ends_loading() {
        let store = ScheduleStore::new(Arc::new(Hanging), Duration::from_millis(50), "timeout");
        let state = store.fetch_schedule().await;
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_cancel_ends_loading() {
        let store = Arc::new(ScheduleStore::new(
            Arc::new(Hanging),
            Duration::from_secs(30),
            "cancelled",
        ));
        let running = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_schedule().await }
        });
        while !store.state().await.is_loading {
            tokio::task::yield_now().await;
        }
        store.cancel().await;
        let state = running.await.unwrap();
        assert!(!state.is_loading);
        assert_eq!(state.error.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_newer_fetch_supersedes_older_one() {
        let source = Arc::new(SlowThenFast {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(ScheduleStore::new(
            source.clone(),
            Duration::from_secs(5),
            "failed",
        ));
        let older = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_schedule().await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let newer = store.fetch_schedule().await;
        let older = older.await.unwrap();

        assert_eq!(newer, FetchState::loaded(vec![shrine()]));
        assert_eq!(older.error.as_deref(), Some("failed"));
        assert_eq!(store.state().await, FetchState::loaded(vec![shrine()]));
    }

    #[tokio::test]
    async fn test_superseded_fetch_is_cancelled() {
        let source = Arc::new(SlowThenFast {
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(ScheduleStore::new(
            source.clone(),
            Duration::from_secs(5),
            "failed",
        ));
        let started = std::time::Instant::now();
        let older = tokio::spawn({
            let store = store.clone();
            async move { store.fetch_schedule().await }
        });
        while source.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let (older, newer) = tokio::join!(older, store.fetch_schedule());

        assert!(older.unwrap().error.is_some());
        assert!(newer.error.is_none());
        assert!(started.elapsed() < Duration::from_millis(300));
        assert!(!store.state().await.is_loading);
    }
}
