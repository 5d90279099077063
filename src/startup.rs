use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{FromRef, MatchedPath},
    http::{header::CONTENT_TYPE, HeaderValue, Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::configuration::{ApplicationSettings, Settings};
use crate::rate_limit::{limit_signups, RateLimiter};
use crate::relay_client::RelayClient;
use crate::routes::{check_health, join_waitlist};
use crate::waitlist_store::WaitlistStore;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Arc<WaitlistStore>,
    pub relay_client: RelayClient,
    pub rate_limiter: Arc<RateLimiter>,
}

pub fn get_app_state(configuration: &Settings) -> Result<AppState, anyhow::Error> {
    let store = WaitlistStore::new(configuration.storage.data_file.clone());

    let relay_client = RelayClient::new(
        configuration.relay.url.clone(),
        configuration.relay.timeout(),
    )
    .context("Failed to build the relay HTTP client")?;
    if !relay_client.is_configured() {
        tracing::warn!("Relay target not configured, signups are only stored locally");
    }

    let rate_limiter = RateLimiter::new(
        configuration.rate_limit.max_requests,
        configuration.rate_limit.window(),
    );

    Ok(AppState {
        store: Arc::new(store),
        relay_client,
        rate_limiter: Arc::new(rate_limiter),
    })
}

pub async fn run(listener: TcpListener, app: Router) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

pub fn router(app_state: AppState, settings: &ApplicationSettings) -> Result<Router, anyhow::Error> {
    let cors_origin = HeaderValue::from_str(&settings.cors_origin)
        .with_context(|| format!("Invalid CORS origin {:?}", settings.cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(cors_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    let waitlist = Router::new()
        .route("/api/waitlist", post(join_waitlist))
        .route_layer(middleware::from_fn_with_state(
            app_state.rate_limiter.clone(),
            limit_signups,
        ));

    let mut router = Router::new()
        .merge(waitlist)
        .route("/health_check", get(check_health))
        .with_state(app_state);

    if let Some(static_dir) = &settings.static_dir {
        let index = static_dir.join("index.html");
        router = router.fallback_service(ServeDir::new(static_dir).fallback(ServeFile::new(index)));
    }

    Ok(router.layer(cors).layer(
        // Refer to https://github.com/tokio-rs/axum/blob/main/examples/tracing-aka-logging/Cargo.toml
        TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let path = request
                .extensions()
                .get::<MatchedPath>()
                .map(MatchedPath::as_str);
            tracing::info_span!(
                "Starting HTTP request",
                method = ?request.method(),
                path,
                request_id = %Uuid::new_v4(),
            )
        }),
    ))
}
