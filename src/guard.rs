use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use utoipa::ToSchema;

use crate::session::Session;
use crate::settings::GateKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
        }
    }

    pub fn requires_auth(self) -> bool {
        matches!(self, Route::Home)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Redirect(Route),
}

/// Answers whether the current user may see authenticated routes.
#[async_trait]
pub trait AuthGate: Send + Sync {
    async fn is_authenticated(&self) -> bool;
}

/// Authenticated while the session holds an access token.
#[async_trait]
impl AuthGate for Session {
    async fn is_authenticated(&self) -> bool {
        Session::is_authenticated(self).await
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub display_name: Option<String>,
}

/// Authenticated while the identity provider reports a signed-in user.
/// The provider pushes every sign-in and sign-out through the channel.
pub struct IdentityGate {
    current: watch::Receiver<Option<Identity>>,
}

impl IdentityGate {
    pub fn new(current: watch::Receiver<Option<Identity>>) -> Self {
        Self { current }
    }

    pub fn current(&self) -> Option<Identity> {
        self.current.borrow().clone()
    }
}

#[async_trait]
impl AuthGate for IdentityGate {
    async fn is_authenticated(&self) -> bool {
        self.current.borrow().is_some()
    }
}

pub fn gate_for(
    kind: GateKind,
    session: Arc<Session>,
    identity: watch::Receiver<Option<Identity>>,
) -> Arc<dyn AuthGate> {
    match kind {
        GateKind::Token => session,
        GateKind::Identity => Arc::new(IdentityGate::new(identity)),
    }
}

/// Navigation guard: signed-out users are sent to login, signed-in users
/// are sent away from it.
pub async fn resolve(route: Route, gate: &dyn AuthGate) -> GateDecision {
    let authenticated = gate.is_authenticated().await;
    if route.requires_auth() && !authenticated {
        GateDecision::Redirect(Route::Login)
    } else if route == Route::Login && authenticated {
        GateDecision::Redirect(Route::Home)
    } else {
        GateDecision::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AccessToken;

    #[tokio::test]
    async fn test_token_gate() {
        let session = Session::new();
        assert_eq!(
            resolve(Route::Home, &session).await,
            GateDecision::Redirect(Route::Login)
        );
        assert_eq!(resolve(Route::Login, &session).await, GateDecision::Proceed);

        session.set_token(AccessToken::new("tok")).await;
        assert_eq!(resolve(Route::Home, &session).await, GateDecision::Proceed);
        assert_eq!(
            resolve(Route::Login, &session).await,
            GateDecision::Redirect(Route::Home)
        );
    }

    #[tokio::test]
    async fn test_identity_gate_follows_provider() {
        let (provider, receiver) = watch::channel(None);
        let gate = IdentityGate::new(receiver);
        assert_eq!(
            resolve(Route::Home, &gate).await,
            GateDecision::Redirect(Route::Login)
        );

        provider
            .send(Some(Identity {
                display_name: Some("traveller".into()),
            }))
            .unwrap();
        assert_eq!(resolve(Route::Home, &gate).await, GateDecision::Proceed);
        assert_eq!(
            gate.current().and_then(|i| i.display_name).as_deref(),
            Some("traveller")
        );

        provider.send(None).unwrap();
        assert_eq!(
            resolve(Route::Home, &gate).await,
            GateDecision::Redirect(Route::Login)
        );
    }
}
