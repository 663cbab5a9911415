use std::{net::SocketAddr, sync::Arc};

use anyhow::{bail, Context};
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, warn};

use storefront_api as api;
use storefront_api::config::{AppConfig, StoreBackendKind};
use storefront_api::services::payment_gateway::{DisabledGateway, PaymentGateway, RazorpayClient};
use storefront_api::services::payments::PaymentVerifier;
use storefront_api::services::shipping::{DisabledShipping, NimbusPostClient, ShippingProvider};
use storefront_api::store::{FileBackend, MemoryBackend, RedisBackend, StoreBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);

    let backend = open_backend(&cfg).await?;
    let collaborators = build_collaborators(&cfg)?;
    let app_state = api::AppState::new(
        backend,
        cfg.store_timeout(),
        cfg.pricing_policy()?,
        cfg.upstream_timeout(),
        collaborators,
    );

    let access_log = if cfg.log_json {
        api::logging::plain_logger()
    } else {
        api::logging::setup_logger(&api::logging::LoggerConfig::default())
    };

    let app = api::app_router(app_state, api::logging::AccessLog::new(access_log))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(cfg.request_timeout()))
        .layer(cors_layer(&cfg)?);

    let ip: std::net::IpAddr = cfg
        .host
        .parse()
        .with_context(|| format!("invalid host address: {}", cfg.host))?;
    let addr = SocketAddr::new(ip, cfg.port);
    info!("storefront-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("storefront-api stopped");
    Ok(())
}

async fn open_backend(cfg: &AppConfig) -> anyhow::Result<Arc<dyn StoreBackend>> {
    let backend: Arc<dyn StoreBackend> = match cfg.store_backend_kind()? {
        StoreBackendKind::Memory => {
            warn!("Using the in-memory store; records are lost on restart");
            Arc::new(MemoryBackend::new())
        }
        StoreBackendKind::File => {
            info!(data_dir = %cfg.data_dir, "Using the file store");
            Arc::new(
                FileBackend::open(&cfg.data_dir)
                    .await
                    .context("failed to open the data directory")?,
            )
        }
        StoreBackendKind::Redis => {
            let url = cfg
                .redis_url
                .as_deref()
                .context("redis_url is required for the redis store")?;
            info!(namespace = %cfg.redis_namespace, "Using the Redis store");
            Arc::new(
                RedisBackend::connect(url, cfg.redis_namespace.clone())
                    .await
                    .context("failed to connect to Redis")?,
            )
        }
    };
    Ok(backend)
}

fn build_collaborators(cfg: &AppConfig) -> anyhow::Result<api::Collaborators> {
    let gateway: Arc<dyn PaymentGateway> = match cfg.razorpay_credentials() {
        Some((key_id, key_secret)) => {
            info!("Razorpay payment intents enabled");
            Arc::new(RazorpayClient::new(
                cfg.razorpay_base_url.clone(),
                key_id,
                key_secret,
                cfg.upstream_timeout(),
            )?)
        }
        None => {
            warn!("Razorpay credentials not configured; PREPAID orders will be rejected");
            Arc::new(DisabledGateway)
        }
    };

    let shipping: Arc<dyn ShippingProvider> = match cfg.nimbus_credentials() {
        Some((api_key, client_id)) => {
            info!("NimbusPost shipment booking enabled");
            Arc::new(NimbusPostClient::new(
                cfg.nimbus_base_url.clone(),
                api_key,
                client_id,
                cfg.upstream_timeout(),
            )?)
        }
        None => {
            warn!("NimbusPost credentials not configured; shipments will not be booked");
            Arc::new(DisabledShipping)
        }
    };

    let verifier = cfg.payment_signing_secret().map(PaymentVerifier::new);
    if verifier.is_none() {
        warn!("No payment signing secret configured; payment confirmations will fail");
    }

    Ok(api::Collaborators {
        gateway,
        shipping,
        verifier,
    })
}

fn cors_layer(cfg: &AppConfig) -> anyhow::Result<CorsLayer> {
    let configured_origins: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    if let Some(origins) = configured_origins {
        Ok(CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any))
    } else if cfg.should_allow_permissive_cors() {
        info!(
            "Using permissive CORS because explicit origins were not configured ({})",
            if cfg.is_development() {
                "development environment"
            } else {
                "explicit override enabled"
            }
        );
        Ok(CorsLayer::permissive())
    } else {
        error!("Missing CORS configuration detected; set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true");
        bail!("Missing CORS configuration: set APP__CORS_ALLOWED_ORIGINS or APP__CORS_ALLOW_ANY_ORIGIN=true")
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
