pub mod consumer;
pub mod router;

pub use consumer::Consumer;
pub use router::{BaseRouter, LoggingMiddleware, Route};
pub use router::{message_handler, other_handler, redemption_handler};
