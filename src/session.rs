use std::fmt;
use std::future::Future;

use futures::future::{BoxFuture, FutureExt, Shared};
use http::StatusCode;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Opaque bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("refresh endpoint answered {0}")]
    Rejected(StatusCode),
    #[error("refresh request failed: {0}")]
    Transport(String),
    #[error("refresh response is malformed: {0}")]
    MalformedResponse(String),
}

pub type RefreshOutcome = Result<AccessToken, RefreshError>;

type InflightRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

/// Session context shared by everything that talks to the backend on behalf
/// of one user: the current access token and the refresh currently in flight.
///
/// The token lives in memory only; a new process starts signed out and gets
/// its token back through the refresh cookie.
#[derive(Default)]
pub struct Session {
    token: RwLock<Option<AccessToken>>,
    inflight: Mutex<Option<InflightRefresh>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: AccessToken) -> Self {
        Self {
            token: RwLock::new(Some(token)),
            inflight: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Option<AccessToken> {
        self.token.read().await.clone()
    }

    pub async fn set_token(&self, token: AccessToken) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    /// Obtains a replacement for `stale`, the token a rejected request was
    /// sent with.
    ///
    /// If the session already holds a different token, that token is returned
    /// without calling `refresh`. Otherwise concurrent callers share a single
    /// execution of the future produced by `refresh`. That future must apply its
    /// own outcome to the session (store the new token or clear it) so the store
    /// is updated before any waiter resumes.
    pub async fn refresh<F, Fut>(&self, stale: Option<&AccessToken>, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        if let Some(current) = self.token().await
            && stale != Some(&current)
        {
            debug!("access token already rotated, skipping refresh");
            return Ok(current);
        }

        let shared = {
            let mut slot = self.inflight.lock().await;
            // a finished refresh left behind by a dropped waiter is never joined
            if slot.as_ref().is_some_and(|inflight| inflight.peek().is_some()) {
                *slot = None;
                if let Some(current) = self.token().await
                    && stale != Some(&current)
                {
                    return Ok(current);
                }
            }
            match slot.as_ref() {
                Some(inflight) => {
                    debug!("joining in-flight token refresh");
                    inflight.clone()
                }
                None => {
                    let inflight = refresh().boxed().shared();
                    *slot = Some(inflight.clone());
                    inflight
                }
            }
        };

        let outcome = shared.clone().await;

        let mut slot = self.inflight.lock().await;
        if slot
            .as_ref()
            .is_some_and(|inflight| inflight.ptr_eq(&shared))
        {
            *slot = None;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    fn counted_refresh(
        session: Arc<Session>,
        calls: Arc<AtomicUsize>,
        issued: &'static str,
    ) -> impl Future<Output = RefreshOutcome> + Send + 'static {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            let token = AccessToken::new(issued);
            session.set_token(token.clone()).await;
            Ok(token)
        }
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_share_one_call() {
        let session = Arc::new(Session::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let (first, second) = tokio::join!(
            session.refresh(None, || counted_refresh(session.clone(), calls.clone(), "fresh")),
            session.refresh(None, || counted_refresh(session.clone(), calls.clone(), "other")),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.unwrap().as_str(), "fresh");
        assert_eq!(second.unwrap().as_str(), "fresh");
        assert_eq!(session.token().await.unwrap().as_str(), "fresh");
    }

    #[tokio::test]
    async fn test_rotated_token_skips_refresh() {
        let session = Arc::new(Session::with_token(AccessToken::new("new")));
        let calls = Arc::new(AtomicUsize::new(0));
        let stale = AccessToken::new("old");

        let token = session
            .refresh(Some(&stale), || {
                counted_refresh(session.clone(), calls.clone(), "unused")
            })
            .await
            .unwrap();

        assert_eq!(token.as_str(), "new");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_completed_refresh_is_not_reused() {
        let session = Arc::new(Session::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = session
            .refresh(None, || counted_refresh(session.clone(), calls.clone(), "one"))
            .await
            .unwrap();
        session
            .refresh(Some(&first), || {
                counted_refresh(session.clone(), calls.clone(), "two")
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(session.token().await.unwrap().as_str(), "two");
    }

    #[tokio::test]
    async fn test_failed_refresh_reaches_every_waiter() {
        let session = Arc::new(Session::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let failing = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<AccessToken, _>(RefreshError::Rejected(StatusCode::UNAUTHORIZED))
        };

        let (first, second) = tokio::join!(
            session.refresh(None, || failing(calls.clone())),
            session.refresh(None, || failing(calls.clone())),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(
            matches!(first, Err(RefreshError::Rejected(status)) if status == StatusCode::UNAUTHORIZED)
        );
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn test_finished_refresh_left_in_slot_is_not_joined() {
        let session = Arc::new(Session::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let abandoned: InflightRefresh = async {
            Err::<AccessToken, _>(RefreshError::Rejected(StatusCode::UNAUTHORIZED))
        }
        .boxed()
        .shared();
        abandoned.clone().await.unwrap_err();
        *session.inflight.lock().await = Some(abandoned);

        let token = session
            .refresh(None, || counted_refresh(session.clone(), calls.clone(), "fresh"))
            .await
            .unwrap();

        assert_eq!(token.as_str(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.inflight.lock().await.is_none());
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("secret");
        assert_eq!(format!("{token:?}"), "AccessToken(***)");
    }
}
