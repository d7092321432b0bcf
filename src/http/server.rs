//! HTTP serving glue.
//!
//! # Responsibilities
//! - Bind the application listener and the metrics listener
//! - Invoke the lifecycle hooks around every request, on every listener,
//!   outside the metrics router (the supervisor's side of the contract)
//! - Emit one access record per completed request
//! - Drain gracefully and retire this worker's shard on the way out
//!
//! # Design Decisions
//! - Hooks wrap the router, not the other way around, so a scrape is
//!   counted like any other request, exactly as the fleet supervisor
//!   would count it
//! - Hook and access-log failures never touch the response path

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use futures_util::future::BoxFuture;
use tokio::net::TcpListener;
use tower::{Layer, Service};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::router::MetricsRouterLayer;
use crate::lifecycle::hooks::{LifecycleHooks, RequestContext};
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::metrics::shard::ShardError;
use crate::metrics::{Aggregator, DirShardStore, HttpMetrics, Registry, ShardStore};
use crate::observability::logging::{AccessRecord, ServerLogger};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One worker: the wrapped application plus both listeners.
pub struct AppServer {
    config: ServiceConfig,
    app: Router,
    aggregator: Arc<Aggregator>,
    hooks: Arc<LifecycleHooks>,
    logger: ServerLogger,
}

impl AppServer {
    /// Wire the metric registry, shard store, aggregator, and hooks
    /// around the given application.
    ///
    /// The application seam is this `app` argument: the caller constructs
    /// the router, nothing is discovered dynamically.
    pub fn new(config: ServiceConfig, app: Router) -> Result<Self, ShardError> {
        let registry = Registry::new();
        let metrics = HttpMetrics::register(&registry)
            .expect("http metric catalog registers once per fresh registry");

        let store: Option<Arc<dyn ShardStore>> = match &config.metrics.shard_dir {
            Some(dir) => Some(Arc::new(DirShardStore::new(dir)?)),
            None => None,
        };
        let worker_id = std::process::id().to_string();
        let aggregator = Arc::new(Aggregator::attach(registry, store, &worker_id));
        let hooks = Arc::new(LifecycleHooks::new(aggregator.clone(), metrics));

        Ok(Self {
            config,
            app,
            aggregator,
            hooks,
            logger: ServerLogger::new(),
        })
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        self.aggregator.clone()
    }

    pub fn hooks(&self) -> Arc<LifecycleHooks> {
        self.hooks.clone()
    }

    /// Serve both listeners until a shutdown signal, then retire the shard.
    pub async fn run(self) -> std::io::Result<()> {
        let app_addr = parse_addr(&self.config.server.bind_address)?;
        let metrics_addr = parse_addr(&self.config.metrics.bind_address)?;

        let app_listener = TcpListener::bind(app_addr).await?;
        let metrics_listener = TcpListener::bind(metrics_addr).await?;

        tracing::info!(
            app_address = %app_listener.local_addr()?,
            metrics_address = %metrics_listener.local_addr()?,
            metrics_path = %self.config.metrics.path,
            multiprocess = self.aggregator.multiprocess(),
            worker_id = %self.aggregator.worker_id(),
            "HTTP server starting"
        );

        self.serve(app_listener, metrics_listener, metrics_addr.port())
            .await
    }

    async fn serve(
        self,
        app_listener: TcpListener,
        metrics_listener: TcpListener,
        metrics_port: u16,
    ) -> std::io::Result<()> {
        let shutdown = Shutdown::new();

        let stack = |served_port: u16| {
            self.app
                .clone()
                .layer(MetricsRouterLayer::new(
                    self.aggregator.clone(),
                    served_port,
                    metrics_port,
                    &self.config.metrics.path,
                ))
                .layer(InstrumentLayer::new(self.hooks.clone(), self.logger))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
                .layer(TraceLayer::new_for_http())
        };

        let app_port = app_listener.local_addr()?.port();
        let app_router = stack(app_port);
        let metrics_router = stack(metrics_port);

        let mut app_rx = shutdown.subscribe();
        let app_serve = axum::serve(
            app_listener,
            app_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = app_rx.recv().await;
        });

        let mut metrics_rx = shutdown.subscribe();
        let metrics_serve = axum::serve(
            metrics_listener,
            metrics_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = metrics_rx.recv().await;
        });

        tokio::spawn(async move {
            shutdown::wait_for_signal().await;
            shutdown.trigger();
        });

        let result = tokio::try_join!(
            async { app_serve.await },
            async { metrics_serve.await }
        )
        .map(|_| ());

        if let Err(error) = &result {
            self.logger.error(&format!("Listener failed: {error}"));
        }
        self.hooks.worker_exit(self.aggregator.worker_id());
        self.logger.info("HTTP server stopped");
        result
    }
}

fn parse_addr(addr: &str) -> std::io::Result<SocketAddr> {
    addr.parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
}

/// Layer invoking the lifecycle hooks and access logger around every
/// request a listener handles.
#[derive(Clone)]
pub struct InstrumentLayer {
    hooks: Arc<LifecycleHooks>,
    logger: ServerLogger,
}

impl InstrumentLayer {
    pub fn new(hooks: Arc<LifecycleHooks>, logger: ServerLogger) -> Self {
        Self { hooks, logger }
    }
}

impl<S> Layer<S> for InstrumentLayer {
    type Service = Instrument<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrument {
            inner,
            hooks: self.hooks.clone(),
            logger: self.logger,
        }
    }
}

/// The service form of [`InstrumentLayer`].
#[derive(Clone)]
pub struct Instrument<S> {
    inner: S,
    hooks: Arc<LifecycleHooks>,
    logger: ServerLogger,
}

impl<S> Service<Request<Body>> for Instrument<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0.ip().to_string())
            .unwrap_or_else(|| "-".to_string());
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let target = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| path.clone());
        let protocol = format!("{:?}", req.version());
        let payload_bytes = header_u64(&req, header::CONTENT_LENGTH);
        let user_agent = req
            .headers()
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut ctx = RequestContext::new(&remote_addr, &method, &path);
        self.hooks.pre_request(&mut ctx);

        let hooks = self.hooks.clone();
        let logger = self.logger;
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let response = inner.call(req).await?;

            let status = response.status().as_u16();
            hooks.post_request(&ctx, status, payload_bytes);

            let response_bytes = response
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            logger.access(&AccessRecord {
                remote_addr,
                method,
                target,
                protocol,
                status,
                response_bytes,
                user_agent,
            });

            Ok(response)
        })
    }
}

fn header_u64(req: &Request<Body>, name: header::HeaderName) -> Option<u64> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}
