//! Metrics endpoint routing.
//!
//! # Responsibilities
//! - Split traffic with one binary decision: a request on the metrics
//!   port at the reserved path is answered with the merged exposition;
//!   everything else reaches the wrapped application untouched
//!
//! # Design Decisions
//! - The router is built per listener with that listener's bound port,
//!   so the port half of the decision is a field comparison
//! - No instrumentation here: hooks are the serving glue's concern, and
//!   keeping them out of the router keeps the split orthogonal
//! - Stateless and cheap to clone across listeners and processes

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use crate::metrics::{exposition, Aggregator};

/// Layer form of [`MetricsRouter`], applied per listener.
#[derive(Clone)]
pub struct MetricsRouterLayer {
    aggregator: Arc<Aggregator>,
    served_port: u16,
    metrics_port: u16,
    metrics_path: Arc<str>,
}

impl MetricsRouterLayer {
    pub fn new(
        aggregator: Arc<Aggregator>,
        served_port: u16,
        metrics_port: u16,
        metrics_path: &str,
    ) -> Self {
        Self {
            aggregator,
            served_port,
            metrics_port,
            metrics_path: Arc::from(metrics_path),
        }
    }
}

impl<S> Layer<S> for MetricsRouterLayer {
    type Service = MetricsRouter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsRouter {
            inner,
            aggregator: self.aggregator.clone(),
            served_port: self.served_port,
            metrics_port: self.metrics_port,
            metrics_path: self.metrics_path.clone(),
        }
    }
}

/// Pass-through dispatcher wrapping the application service.
#[derive(Clone)]
pub struct MetricsRouter<S> {
    inner: S,
    aggregator: Arc<Aggregator>,
    served_port: u16,
    metrics_port: u16,
    metrics_path: Arc<str>,
}

impl<S> Service<Request<Body>> for MetricsRouter<S>
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
        if self.served_port == self.metrics_port && req.uri().path() == &*self.metrics_path {
            let aggregator = self.aggregator.clone();
            return Box::pin(async move { Ok(scrape_response(&aggregator)) });
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        Box::pin(async move { inner.call(req).await })
    }
}

/// Render the merged view. Always `200`: an empty catalog is an empty
/// body, and partial shard data is still a scrape.
fn scrape_response(aggregator: &Aggregator) -> Response {
    let body = exposition::render(&aggregator.merge());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, exposition::CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
