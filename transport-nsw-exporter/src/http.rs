//! HTTP server for the metrics and probe endpoints.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::collector::SharedCollector;
use crate::readiness::{Lifecycle, ServerState};

/// How long in-flight requests may drain after shutdown begins.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Content type of the Prometheus text exposition format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Fatal server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
    #[error("graceful shutdown failed: requests still in flight after {0:?}")]
    DrainTimeout(Duration),
}

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    collector: SharedCollector,
    lifecycle: Lifecycle,
}

/// Create the HTTP router.
pub fn create_router(collector: SharedCollector, lifecycle: Lifecycle, metrics_path: &str) -> Router {
    let state = AppState {
        collector,
        lifecycle,
    };

    Router::new()
        .route(metrics_path, get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handler for the metrics endpoint. Each request runs one collection pass.
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.collector.render().await;

    (
        StatusCode::OK,
        [("content-type", METRICS_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

/// Handler for the /healthz endpoint.
async fn healthz_handler(State(state): State<AppState>) -> Response {
    if state.lifecycle.is_live() {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "fault").into_response()
    }
}

/// Handler for the /readyz endpoint.
async fn readyz_handler(State(state): State<AppState>) -> Response {
    if state.lifecycle.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// HTTP server configuration.
pub struct HttpServer {
    collector: SharedCollector,
    lifecycle: Lifecycle,
    listen_addr: SocketAddr,
    metrics_path: String,
    shutdown_grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(
        collector: SharedCollector,
        lifecycle: Lifecycle,
        listen_addr: SocketAddr,
        metrics_path: String,
    ) -> Self {
        Self {
            collector,
            lifecycle,
            listen_addr,
            metrics_path,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    /// Override the drain grace period.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Bind the listener and serve until the shutdown signal is received.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), ServerError> {
        self.lifecycle.transition(ServerState::Starting);

        info!(
            addr = %self.listen_addr,
            path = %self.metrics_path,
            "Starting HTTP server"
        );

        let listener = match TcpListener::bind(self.listen_addr).await {
            Ok(listener) => listener,
            Err(source) => {
                self.lifecycle.mark_faulted();
                self.lifecycle.transition(ServerState::Stopped);
                return Err(ServerError::Bind {
                    addr: self.listen_addr,
                    source,
                });
            }
        };

        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener until the shutdown signal is
    /// received, then drain within the grace period.
    pub async fn serve(
        self,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), ServerError> {
        let router = create_router(
            self.collector.clone(),
            self.lifecycle.clone(),
            &self.metrics_path,
        );
        let addr = listener.local_addr().unwrap_or(self.listen_addr);

        self.lifecycle.transition(ServerState::Ready);
        info!(addr = %addr, path = %self.metrics_path, "HTTP server listening");

        let (draining_tx, draining_rx) = oneshot::channel::<()>();
        let lifecycle = self.lifecycle.clone();

        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            // Wait for shutdown signal
            loop {
                if *shutdown.borrow() {
                    break;
                }
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            info!("shutdown signal received");
            lifecycle.transition(ServerState::ShuttingDown);
            let _ = draining_tx.send(());
        });
        let server = server.into_future();
        tokio::pin!(server);

        tokio::select! {
            biased;
            _ = draining_rx => {}
            result = &mut server => {
                // The listener stopped without a shutdown request.
                self.lifecycle.transition(ServerState::ShuttingDown);
                self.lifecycle.transition(ServerState::Stopped);
                return match result {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        self.lifecycle.mark_faulted();
                        Err(ServerError::Serve(e))
                    }
                };
            }
        }

        let result = match tokio::time::timeout(self.shutdown_grace, &mut server).await {
            Ok(Ok(())) => {
                info!("server stopped gracefully");
                Ok(())
            }
            Ok(Err(e)) => Err(ServerError::Serve(e)),
            Err(_) => {
                error!(grace = ?self.shutdown_grace, "in-flight requests did not drain in time");
                Err(ServerError::DrainTimeout(self.shutdown_grace))
            }
        };

        self.lifecycle.transition(ServerState::Stopped);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, FacilitySource, FetchFuture};
    use crate::collector::CarParkCollector;
    use crate::facility::Facility;
    use crate::metrics::CarParkDescriptors;
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    struct FailingSource;

    impl FacilitySource for FailingSource {
        fn fetch<'a>(&'a self, _facility_id: &'a str) -> FetchFuture<'a> {
            Box::pin(async { Err::<Facility, _>(ClientError::Url("offline".to_string())) })
        }
    }

    fn make_collector() -> SharedCollector {
        Arc::new(CarParkCollector::new(
            Arc::new(FailingSource),
            vec!["486".to_string()],
            CarParkDescriptors::new("transport"),
        ))
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let router = create_router(make_collector(), Lifecycle::new(), "/metrics");

        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("version=0.0.4"));

        let body = body_string(response).await;
        assert!(body.contains("transport_car_park_errors{facility_id=\"486\"} 1"));
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let lifecycle = Lifecycle::new();
        let router = create_router(make_collector(), lifecycle.clone(), "/metrics");

        let response = router
            .clone()
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");

        lifecycle.mark_faulted();
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_readyz_follows_lifecycle() {
        let lifecycle = Lifecycle::new();
        let router = create_router(make_collector(), lifecycle.clone(), "/metrics");

        let probe = |router: Router| async move {
            router
                .oneshot(Request::get("/readyz").body(Body::empty()).unwrap())
                .await
                .unwrap()
        };

        let response = probe(router.clone()).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_string(response).await, "not ready");

        lifecycle.transition(ServerState::Ready);
        let response = probe(router.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ready");

        lifecycle.transition(ServerState::ShuttingDown);
        let response = probe(router).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_custom_metrics_path() {
        let router = create_router(make_collector(), Lifecycle::new(), "/prometheus/metrics");

        // Custom path should work
        let response = router
            .clone()
            .oneshot(
                Request::get("/prometheus/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Default path should 404
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
