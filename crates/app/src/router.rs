use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use handy_geocode::GeocodingClient;
use handy_storage::Database;

use crate::auth::{PasswordHasher, TokenService};
use crate::{accounts, admin, tasks, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    tokens: TokenService,
    passwords: PasswordHasher,
    geocoder: Option<GeocodingClient>,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl AppState {
    pub fn new(
        metrics: PrometheusHandle,
        storage: Database,
        tokens: TokenService,
        passwords: PasswordHasher,
        geocoder: Option<GeocodingClient>,
    ) -> Self {
        Self {
            metrics,
            storage,
            tokens,
            passwords,
            geocoder,
            clock: Arc::new(Utc::now),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn passwords(&self) -> &PasswordHasher {
        &self.passwords
    }

    pub fn geocoder(&self) -> Option<&GeocodingClient> {
        self.geocoder.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

/// Success envelope: `{ "data": ... }`.
#[derive(Debug, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T: Serialize> IntoResponse for Data<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub fn data<T: Serialize>(value: T) -> Data<T> {
    Data { data: value }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/auth/register", post(accounts::register))
        .route("/api/auth/login", post(accounts::login))
        .route("/api/auth/admin/login", post(accounts::admin_login))
        .route("/api/auth/session", get(accounts::session))
        .route(
            "/api/users/profile",
            get(accounts::profile).put(accounts::update_profile),
        )
        .route("/api/tasks", get(tasks::list).post(tasks::create))
        .route("/api/tasks/create", post(tasks::create))
        .route("/api/tasks/nearby", get(tasks::nearby))
        .route("/api/tasks/:id", get(tasks::detail))
        .route("/api/tasks/:id/accept", post(tasks::accept))
        .route("/api/tasks/:id/status", put(tasks::update_status))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/tasks", get(admin::list_tasks))
        .route("/api/admin/tasks/:id/status", put(admin::update_task_status))
        .route("/api/admin/users", get(admin::list_users))
        .route("/api/admin/users/:id/status", put(admin::update_user_status))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
