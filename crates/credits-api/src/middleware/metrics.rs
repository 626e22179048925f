//! Prometheus metrics
//!
//! Installs the global recorder, describes the service's metrics and exposes
//! them on `GET /metrics`. The middleware records per-route request counts
//! and durations.
//!
//! # Metrics Exposed
//!
//! - `http_requests_total{method,route,status}`
//! - `http_request_duration_seconds{method,route,status}`
//! - `webhook_verifications_total{result}`
//! - `orders_created_total{plan}`
//! - `settlement_outcomes_total{outcome}`

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpResponse,
};
use futures_util::future::LocalBoxFuture;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Instant,
};

use crate::models::ErrorResponse;

/// Global Prometheus handle for the /metrics endpoint
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Route label for requests that matched no resource
const UNMATCHED_ROUTE: &str = "unmatched";

/// Install the Prometheus recorder once and describe all metrics
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new().install_recorder()?;

            describe_counter!(
                "http_requests_total",
                "Total number of HTTP requests processed"
            );
            describe_histogram!(
                "http_request_duration_seconds",
                "HTTP request duration in seconds"
            );
            describe_counter!(
                "webhook_verifications_total",
                "Identity-provider webhook verification results"
            );
            describe_counter!("orders_created_total", "Orders created per plan");
            describe_counter!(
                "settlement_outcomes_total",
                "Outcomes of order verification requests"
            );

            Ok(handle)
        })
        .cloned()
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> HttpResponse {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().json(ErrorResponse::new(
            "metrics_unavailable",
            "Metrics recorder not initialized",
        )),
    }
}

/// Request metrics middleware
///
/// Labels use the matched route pattern (`/api/v1/orders/verify`), never the
/// raw path, so label cardinality stays bounded.
#[derive(Clone, Default)]
pub struct RequestMetrics;

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestMetricsMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let route = req
            .match_pattern()
            .unwrap_or_else(|| UNMATCHED_ROUTE.to_string());
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let result = service.call(req).await;

            let status = match &result {
                Ok(response) => response.status(),
                Err(e) => e.as_response_error().status_code(),
            };
            record_request(method, route, status.as_u16(), start.elapsed().as_secs_f64());

            result
        })
    }
}

fn record_request(method: String, route: String, status: u16, duration_secs: f64) {
    let status = status.to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.clone()
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "route" => route,
        "status" => status
    )
    .record(duration_secs);
}
