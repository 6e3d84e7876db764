pub mod message_handler;
pub mod other_handler;
pub mod redemption_handler;
