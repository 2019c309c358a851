//! HTTP server wiring for the pastebin service (routes, middleware, state).

/// HTTP error mapping for API handlers.
pub mod error;
/// HTTP handlers for the paste API, rendered page and health check.
pub mod handlers;
/// Background purge of store-expired entries.
pub mod housekeeping;
/// Per-IP fixed-window rate limit middleware.
pub mod rate_limit;

pub use pastebin_core::{
    config, kv, models, AppError, Config, IncrementFallback, PasteService, StoreBackend,
    DEFAULT_PORT,
};

use axum::{
    extract::DefaultBodyLimit,
    http::{header, request::Parts, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use pastebin_core::kv::{
    KvClient, KvConnector, MemoryStore, ReconnectPolicy, RedbConnector, StaticConnector,
};
use pastebin_core::{FixedWindowLimiter, SharedClock, StoreError};
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' data:; frame-ancestors 'none'; base-uri 'self'; form-action 'self'";

/// Shared state passed to HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<PasteService>,
    pub limiter: Arc<FixedWindowLimiter>,
}

impl AppState {
    /// Wire the paste service and rate limiter over one store client.
    ///
    /// # Arguments
    /// - `config`: Loaded configuration.
    /// - `kv`: Connected store client.
    /// - `clock`: Time source for lifecycle checks and rate limit windows.
    pub fn new(config: Config, kv: Arc<KvClient>, clock: SharedClock) -> Self {
        let service = PasteService::new(kv.clone(), clock.clone(), config.base_url.clone())
            .with_fallback(config.view_count_fallback);
        let limiter = FixedWindowLimiter::new(
            kv,
            clock,
            config.rate_limit_max_requests,
            config.rate_limit_window_secs,
        );
        Self {
            config: Arc::new(config),
            service: Arc::new(service),
            limiter: Arc::new(limiter),
        }
    }
}

/// Connect the store selected by `config`, retrying per its reconnect policy.
///
/// # Errors
/// Returns the last connect error once retries are exhausted.
pub async fn connect_store(
    config: &Config,
    clock: SharedClock,
) -> Result<Arc<KvClient>, StoreError> {
    let connector: Arc<dyn KvConnector> = match config.store_backend {
        StoreBackend::Memory => Arc::new(StaticConnector::new(Arc::new(MemoryStore::new(
            clock,
        )))),
        StoreBackend::Redb => Arc::new(RedbConnector::new(&config.db_path, clock)),
    };
    let policy = ReconnectPolicy {
        max_retries: config.store_connect_retries,
        ..ReconnectPolicy::default()
    };
    let client = KvClient::connect(connector, policy, config.store_timeout).await?;
    Ok(Arc::new(client))
}

/// Resolve the listener address from the `BIND` override and security policy.
///
/// # Returns
/// A socket address that stays on loopback unless public access is enabled.
pub fn resolve_bind_address(config: &Config) -> SocketAddr {
    let default_bind = SocketAddr::from(([127, 0, 0, 1], config.port));
    let requested = match config.bind.as_deref() {
        Some(value) => match value.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(err) => {
                tracing::warn!(
                    "Invalid BIND='{}': {}. Falling back to {}",
                    value,
                    err,
                    default_bind
                );
                default_bind
            }
        },
        None => default_bind,
    };

    if config.allow_public_access || requested.ip().is_loopback() {
        return requested;
    }

    tracing::warn!(
        "Non-loopback bind {} requested without ALLOW_PUBLIC_ACCESS; forcing 127.0.0.1",
        requested
    );
    SocketAddr::from(([127, 0, 0, 1], requested.port()))
}

/// Create the application router with all routes and middleware.
pub fn create_app(state: AppState) -> Router {
    let cors_port = state.config.port;
    create_app_with_cors_port(state, cors_port)
}

/// JSON API routes, mounted at the root and under `/api`.
fn api_routes(state: &AppState) -> Router<AppState> {
    let pastes = Router::new()
        .route("/pastes", post(handlers::paste::create_paste))
        .route("/pastes/:id", get(handlers::paste::get_paste))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ));

    Router::new()
        .merge(pastes)
        .route("/healthz", get(handlers::health::healthz))
}

fn is_loopback_origin(origin: &HeaderValue, port: u16) -> bool {
    let Ok(origin) = origin.to_str() else {
        return false;
    };
    let Some(authority) = origin.strip_prefix("http://") else {
        return false;
    };
    let Some((host, origin_port)) = authority.rsplit_once(':') else {
        return false;
    };
    if origin_port.parse::<u16>().ok() != Some(port) {
        return false;
    }
    let host = host.trim_start_matches('[').trim_end_matches(']');
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

fn cors_layer(allow_public_access: bool, cors_port: u16) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    if allow_public_access {
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(tower_http::cors::Any);
    }

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| is_loopback_origin(origin, cors_port),
        ))
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}

fn create_app_with_cors_port(state: AppState, cors_port: u16) -> Router {
    let cors = cors_layer(state.config.allow_public_access, cors_port);
    let body_limit = state.config.max_body_size;

    Router::new()
        .merge(api_routes(&state))
        .nest("/api", api_routes(&state))
        .route("/p/:id", get(handlers::page::paste_page))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(body_limit))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(cors)
                .layer(SetResponseHeaderLayer::overriding(
                    header::CONTENT_SECURITY_POLICY,
                    HeaderValue::from_static(CONTENT_SECURITY_POLICY),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_CONTENT_TYPE_OPTIONS,
                    HeaderValue::from_static("nosniff"),
                ))
                .layer(SetResponseHeaderLayer::overriding(
                    header::X_FRAME_OPTIONS,
                    HeaderValue::from_static("DENY"),
                )),
        )
}

fn listener_cors_port(listener: &tokio::net::TcpListener, fallback_port: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(fallback_port)
}

/// Run the Axum server with graceful shutdown support.
///
/// Peer addresses are exposed to the rate limiter through `ConnectInfo`.
///
/// # Errors
/// Returns any I/O error produced by `axum::serve`.
pub async fn serve_router(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let cors_port = listener_cors_port(&listener, state.config.port);
    let app = create_app_with_cors_port(state, cors_port);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
}
