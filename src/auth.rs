use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::session::AccessToken;

/// Body of `POST /login`, sent by the front end once the identity provider
/// has issued a token.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub access_token: Option<String>,
    pub display_name: Option<String>,
}

/// Takes the access token from the bearer header, falling back to the body.
pub fn login_token(
    auth: Option<Authorization<Bearer>>,
    body: &LoginRequest,
) -> Result<AccessToken, ApiError> {
    let provided_token = auth
        .map(|a| a.token().to_string())
        .or_else(|| body.access_token.clone());
    match provided_token {
        Some(token) if !token.trim().is_empty() => Ok(AccessToken::new(token.trim())),
        _ => Err(ApiError::Unauthorized("Missing access token".into())),
    }
}
