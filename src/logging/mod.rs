//! HTTP access log.
//!
//! Application events go through `tracing`; this module keeps a separate
//! slog drain for one line per handled request.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, PlainDecorator, TermDecorator};
use std::sync::Arc;
use std::time::Instant;

use crate::middleware_helpers::request_id::current_request_id;

/// Configuration for the access logger
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

/// Builds the async terminal logger used for access lines.
pub fn setup_logger(config: &LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder
        };
        builder.build()
    };
    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(
        drain,
        o!("service" => "storefront-api", "version" => env!("CARGO_PKG_VERSION")),
    )
}

/// Logger writing plain lines to stderr, for non-terminal output.
pub fn plain_logger() -> Logger {
    let decorator = PlainDecorator::new(std::io::stderr());
    let drain = FullFormat::new(decorator).build().fuse();
    let drain = Async::new(drain).build().fuse();
    Logger::root(drain, o!("service" => "storefront-api"))
}

/// Shared state for [`access_log_middleware`].
#[derive(Clone)]
pub struct AccessLog {
    logger: Logger,
}

impl AccessLog {
    pub fn new(logger: Logger) -> Arc<Self> {
        Arc::new(Self {
            logger: logger.new(o!("component" => "http")),
        })
    }

    /// Drops every record.
    pub fn discard() -> Arc<Self> {
        Self::new(Logger::root(slog::Discard, o!()))
    }
}

/// Logs method, path, status and latency of every request.
///
/// Must run inside the request-id middleware so the id is in scope.
pub async fn access_log_middleware(
    State(state): State<Arc<AccessLog>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let start_time = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let request_id = current_request_id()
        .map(|rid| rid.as_str().to_string())
        .unwrap_or_default();

    let response = next.run(req).await;
    let status = response.status().as_u16();
    let duration_ms = start_time.elapsed().as_millis() as u64;

    if status >= 500 {
        slog::warn!(
            &state.logger,
            "HTTP request failed";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
            "request_id" => request_id,
        );
    } else {
        slog::info!(
            &state.logger,
            "HTTP request handled";
            "method" => method,
            "path" => path,
            "status" => status,
            "duration_ms" => duration_ms,
            "request_id" => request_id,
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Collects the `path` value of every record.
    struct PathCollector(Arc<Mutex<Vec<String>>>);

    struct PathSerializer<'a>(&'a mut Option<String>);

    impl slog::Serializer for PathSerializer<'_> {
        fn emit_arguments(&mut self, key: slog::Key, val: &std::fmt::Arguments<'_>) -> slog::Result {
            if key == "path" {
                *self.0 = Some(val.to_string());
            }
            Ok(())
        }
    }

    impl Drain for PathCollector {
        type Ok = ();
        type Err = slog::Never;

        fn log(&self, record: &slog::Record<'_>, values: &slog::OwnedKVList) -> Result<(), slog::Never> {
            use slog::KV;
            let mut path = None;
            let _ = record.kv().serialize(record, &mut PathSerializer(&mut path));
            let _ = values.serialize(record, &mut PathSerializer(&mut path));
            if let Some(path) = path {
                self.0.lock().unwrap().push(path);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn logs_each_request_and_passes_response_through() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::root(PathCollector(seen.clone()).fuse(), o!());
        let app = Router::new()
            .route("/health", get(|| async { "OK" }))
            .layer(axum::middleware::from_fn_with_state(
                AccessLog::new(logger),
                access_log_middleware,
            ));

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(seen.lock().unwrap().as_slice(), ["/health".to_string()]);
    }

    #[tokio::test]
    async fn discard_logger_is_usable() {
        let app = Router::new()
            .route("/", get(|| async { StatusCode::NO_CONTENT }))
            .layer(axum::middleware::from_fn_with_state(
                AccessLog::discard(),
                access_log_middleware,
            ));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
