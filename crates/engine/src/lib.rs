pub mod cart;
pub mod config;
pub mod conflict;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod recurrence;
pub mod resolve;
pub mod service;
pub mod store;
pub mod validator;
pub mod window;

#[cfg(test)]
mod fixtures;

pub use config::EngineConfig;
pub use error::{BookingError, ErrorReport};
pub use service::BookingService;
pub use window::TimeWindow;
