use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, InvalidHeaderValue,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::navigation::Navigator;
use crate::session::{AccessToken, RefreshError, RefreshOutcome, Session};
use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out")]
    Timeout,
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),
    #[error("login session expired: {0}")]
    SessionExpired(#[source] RefreshError),
}

impl ClientError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Http(err)
        }
    }
}

/// A request relative to the API base URL. Kept as plain data so it can be
/// issued a second time after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn json<T: Serialize>(self, body: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(body)?;
        Ok(self.body(body))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub refresh_path: String,
    pub login_path: String,
    pub request_timeout: Duration,
}

impl From<&Settings> for ClientConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.api_base_url.to_string(),
            refresh_path: settings.refresh_path.clone(),
            login_path: settings.login_path.clone(),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
}

/// HTTP client for the itinerary backend.
///
/// Every call carries the session's bearer token and the cookie jar. A 401
/// triggers at most one refresh through the refresh-cookie endpoint and at
/// most one retry of the rejected request; a failed refresh signs the
/// session out and navigates to the login route.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Arc<Session>,
    navigator: Arc<dyn Navigator>,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        Self::with_cookie_jar(config, session, navigator, Arc::new(Jar::default()))
    }

    pub fn with_cookie_jar(
        config: ClientConfig,
        session: Arc<Session>,
        navigator: Arc<dyn Navigator>,
        jar: Arc<Jar>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().cookie_provider(jar).build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            session,
            navigator,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    pub async fn send(
        &self,
        request: &ApiRequest,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        let sent_with = self.session.token().await;
        let response = self
            .dispatch(self.build(request, sent_with.as_ref())?, cancel)
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        info!(path = request.path(), "access token rejected, refreshing");
        let refreshed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::Cancelled),
            outcome = self.session.refresh(sent_with.as_ref(), || self.refresh_call()) => outcome,
        };
        let token = refreshed.map_err(|err| {
            error!(error = %err, "login session expired");
            ClientError::SessionExpired(err)
        })?;

        self.dispatch(self.build(request, Some(&token))?, cancel)
            .await
    }

    fn build(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<RequestBuilder, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(request.headers.clone());
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder = self
            .http
            .request(request.method.clone(), self.url(&request.path))
            .headers(headers)
            .timeout(self.config.request_timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder)
    }

    async fn dispatch(
        &self,
        builder: RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<Response, ClientError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ClientError::Cancelled),
            result = builder.send() => result.map_err(ClientError::from_transport),
        }
    }

    /// The shared refresh: exchanges the refresh cookie for a new token and
    /// applies the outcome to the session before resolving.
    fn refresh_call(&self) -> impl Future<Output = RefreshOutcome> + Send + use<> {
        let http = self.http.clone();
        let url = self.url(&self.config.refresh_path);
        let timeout = self.config.request_timeout;
        let login_path = self.config.login_path.clone();
        let session = self.session.clone();
        let navigator = self.navigator.clone();

        async move {
            match request_access_token(&http, &url, timeout).await {
                Ok(token) => {
                    session.set_token(token.clone()).await;
                    Ok(token)
                }
                Err(err) => {
                    warn!(error = %err, "token refresh failed, signing out");
                    session.clear().await;
                    navigator.navigate(&login_path);
                    Err(err)
                }
            }
        }
    }
}

async fn request_access_token(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> RefreshOutcome {
    let response = http
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| RefreshError::Transport(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RefreshError::Rejected(status));
    }

    let body: RefreshResponse = response
        .json()
        .await
        .map_err(|err| RefreshError::MalformedResponse(err.to_string()))?;
    if body.access_token.trim().is_empty() {
        return Err(RefreshError::MalformedResponse(
            "empty access token".into(),
        ));
    }
    Ok(AccessToken::new(body.access_token))
}
