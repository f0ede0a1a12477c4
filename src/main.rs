use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::Extension;
use std::sync::Arc;
use storefront_api::services::payments::SandboxGateway;
use storefront_api::{
    api_v1_routes, auth::AuthService, config, db, events, middleware_helpers, openapi,
    AppServices, AppState,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config::init_tracing(app_config.log_level(), app_config.log_json);
    info!(
        environment = %app_config.environment,
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(db::establish_connection_from_app_config(&app_config).await?);
    if app_config.auto_migrate {
        info!("Running database migrations");
        db::run_migrations(&db_pool).await?;
    }

    let (tx, rx) = mpsc::channel(app_config.event_channel_capacity);
    let event_sender = events::EventSender::new(tx);
    tokio::spawn(events::process_events(rx));
    events::outbox::start_worker(db_pool.clone(), event_sender.clone()).await;

    let auth_service = Arc::new(AuthService::from_app_config(&app_config));
    let services = AppServices::new(
        db_pool.clone(),
        &app_config,
        event_sender.clone(),
        Arc::new(SandboxGateway),
    );

    let state = AppState {
        db: db_pool,
        config: Arc::new(app_config.clone()),
        event_sender,
        services,
    };

    let cors = build_cors_layer(&app_config);
    let app = api_v1_routes()
        .merge(openapi::swagger_ui())
        .layer(storefront_api::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .layer(Extension(auth_service))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn build_cors_layer(config: &config::AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    if config.has_cors_allowed_origins() {
        let origins: Vec<HeaderValue> = config
            .cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .filter_map(|origin| {
                let trimmed = origin.trim();
                if trimmed.is_empty() {
                    return None;
                }
                match trimmed.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin: {}", trimmed);
                        None
                    }
                }
            })
            .collect();
        let layer = layer.allow_origin(AllowOrigin::list(origins));
        if config.cors_allow_credentials {
            layer.allow_credentials(true)
        } else {
            layer
        }
    } else if config.should_allow_permissive_cors() {
        layer.allow_origin(Any)
    } else {
        // load_config rejects this combination; treat it as no cross-origin access
        error!("No CORS origins configured; cross-origin requests will be rejected");
        layer
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
