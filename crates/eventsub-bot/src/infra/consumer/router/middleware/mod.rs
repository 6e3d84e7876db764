mod logging_middleware;

pub use logging_middleware::LoggingMiddleware;
