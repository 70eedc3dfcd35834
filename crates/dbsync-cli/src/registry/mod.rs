mod logging;
mod report;

pub use logging::init_logging;
pub use report::write_report;

use thiserror::Error;

/// Errors while setting up logging or writing run artifacts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("logging error: {0}")]
    Logging(String),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
