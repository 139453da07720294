use axum::body::Bytes;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Json, extract::State, http::StatusCode};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use tracing::info;

use crate::{
    AppState,
    auth::{LoginRequest, login_token},
    error::ApiError,
    guard::{AuthGate, GateDecision, Identity, Route, resolve},
    models::FetchState,
};

async fn redirect_for(state: &AppState, route: Route) -> Option<Response> {
    match resolve(route, state.gate.as_ref()).await {
        GateDecision::Proceed => None,
        GateDecision::Redirect(to) => Some(Redirect::to(to.path()).into_response()),
    }
}

async fn require_auth(state: &AppState) -> Result<(), ApiError> {
    if state.gate.is_authenticated().await {
        Ok(())
    } else {
        Err(ApiError::Unauthorized("Sign in required".into()))
    }
}

/// Home view: loads the itinerary on every visit.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Itinerary fetch result", body = FetchState),
        (status = 303, description = "Not signed in, redirected to /login")
    ),
    tag = "itinerary"
)]
pub async fn home(State(state): State<AppState>) -> Response {
    if let Some(redirect) = redirect_for(&state, Route::Home).await {
        return redirect;
    }

    let fetched = state.store.fetch_schedule().await;

    // the session may have ended while fetching
    if let Some(redirect) = redirect_for(&state, Route::Home).await {
        return redirect;
    }
    Json(fetched).into_response()
}

#[utoipa::path(
    get,
    path = "/login",
    responses(
        (status = 200, description = "Login options"),
        (status = 303, description = "Already signed in, redirected to /")
    ),
    tag = "auth"
)]
pub async fn login_page(State(state): State<AppState>) -> Response {
    if let Some(redirect) = redirect_for(&state, Route::Login).await {
        return redirect;
    }
    Json(serde_json::json!({
        "message": "Sign in to view the itinerary",
        "googleClientId": state.settings.google_client_id,
        "endpoints": {
            "POST /login": "Submit the access token issued by the identity provider"
        }
    }))
    .into_response()
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(content = LoginRequest, description = "Token may also be sent as a Bearer header"),
    responses(
        (status = 204, description = "Signed in"),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "No access token supplied")
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: LoginRequest = if body.is_empty() {
        LoginRequest::default()
    } else {
        serde_json::from_slice(&body)?
    };
    let token = login_token(auth.map(|TypedHeader(a)| a), &request)?;

    state.session.set_token(token).await;
    state.identity.send_replace(Some(Identity {
        display_name: request.display_name,
    }));
    info!("signed in");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/logout",
    responses((status = 204, description = "Signed out")),
    tag = "auth"
)]
pub async fn logout(State(state): State<AppState>) -> StatusCode {
    state.session.clear().await;
    state.identity.send_replace(None);
    info!("signed out");
    StatusCode::NO_CONTENT
}

#[utoipa::path(
    get,
    path = "/schedules",
    responses(
        (status = 200, description = "Current itinerary state", body = FetchState),
        (status = 401, description = "Not signed in")
    ),
    tag = "itinerary"
)]
pub async fn get_schedules(State(state): State<AppState>) -> Result<Json<FetchState>, ApiError> {
    require_auth(&state).await?;
    Ok(Json(state.store.state().await))
}

#[utoipa::path(
    post,
    path = "/schedules/fetch",
    responses(
        (status = 200, description = "Itinerary fetch result", body = FetchState),
        (status = 401, description = "Not signed in")
    ),
    tag = "itinerary"
)]
pub async fn fetch_schedules(
    State(state): State<AppState>,
) -> Result<Json<FetchState>, ApiError> {
    require_auth(&state).await?;
    Ok(Json(state.store.fetch_schedule().await))
}

#[utoipa::path(
    post,
    path = "/schedules/cancel",
    responses(
        (status = 202, description = "In-flight fetch cancelled"),
        (status = 401, description = "Not signed in")
    ),
    tag = "itinerary"
)]
pub async fn cancel_fetch(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    require_auth(&state).await?;
    state.store.cancel().await;
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    get,
    path = "/schedules.ical",
    responses(
        (status = 200, description = "iCal file", content_type = "text/calendar"),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "No schedules loaded")
    ),
    tag = "itinerary"
)]
pub async fn get_ical(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    require_auth(&state).await?;
    let current = state.store.state().await;
    if current.data.is_empty() {
        return Err(ApiError::NotFound("No schedules loaded".into()));
    }

    let body = state.exporter.generate(&current.data);
    Ok((
        StatusCode::OK,
        [
            ("content-type", "text/calendar"),
            (
                "content-disposition",
                "attachment; filename=itinerary.ics",
            ),
        ],
        body,
    ))
}

#[utoipa::path(get, path = "/healthz/live", tag = "health")]
pub async fn healthz_live() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

#[utoipa::path(get, path = "/healthz/ready", tag = "health")]
pub async fn healthz_ready() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}
