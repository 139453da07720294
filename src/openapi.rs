use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::LoginRequest;
use crate::guard::Identity;
use crate::models::{FetchState, ScheduleItem};

pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::home,
        crate::handlers::login_page,
        crate::handlers::login,
        crate::handlers::logout,
        crate::handlers::get_schedules,
        crate::handlers::fetch_schedules,
        crate::handlers::cancel_fetch,
        crate::handlers::get_ical,
        crate::handlers::healthz_live,
        crate::handlers::healthz_ready
    ),
    components(schemas(ScheduleItem, FetchState, LoginRequest, Identity)),
    tags(
        (name = "itinerary", description = "Travel itinerary data"),
        (name = "auth", description = "Session sign-in and sign-out"),
        (name = "health", description = "Liveness and readiness")
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;
