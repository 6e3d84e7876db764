pub mod handlers;
pub mod middleware;
pub mod router;
pub mod traits;

pub use handlers::{message_handler, other_handler, redemption_handler};
pub use middleware::LoggingMiddleware;
pub use router::{BaseRouter, Route};
