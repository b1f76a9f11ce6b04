pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, VerdictError};
pub use traits::{SearchProvider, TextGenerator};
pub use types::*;
