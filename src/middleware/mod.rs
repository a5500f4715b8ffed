pub mod error_handler;
pub mod logging;

pub use error_handler::GlobalErrorHandler;
pub use logging::{RequestLogging, RequestTime};
