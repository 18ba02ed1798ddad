pub mod tracing_middleware;

pub use tracing_middleware::TracingMiddleware;
