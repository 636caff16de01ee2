pub mod error_classifier;
pub mod retry;

pub use error_classifier::*;
pub use retry::*;
