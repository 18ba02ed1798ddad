use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Middleware that assigns each request a trace id and logs its outcome
/// with latency.
pub struct TracingMiddleware;

impl<S, B> Transform<S, ServiceRequest> for TracingMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TracingMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TracingMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct TracingMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for TracingMiddlewareService<S>
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
        // Honor an upstream trace id when a proxy supplies one.
        let trace_id = req
            .headers()
            .get("X-Trace-Id")
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        req.extensions_mut().insert(TraceId(trace_id.clone()));

        let method = req.method().to_string();
        let path = req.path().to_string();
        let service = Rc::clone(&self.service);

        Box::pin(async move {
            let span = tracing::info_span!(
                "http_request",
                trace_id = %trace_id,
                method = %method,
                path = %path
            );

            async move {
                let started = Instant::now();
                let res = service.call(req).await?;
                tracing::debug!(
                    "request completed - status={}, elapsed_ms={}",
                    res.status(),
                    started.elapsed().as_millis()
                );
                Ok(res)
            }
            .instrument(span)
            .await
        })
    }
}

/// Wrapper type for the trace id stored in request extensions.
#[derive(Clone, Debug)]
pub struct TraceId(pub String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
