pub mod error;

pub use error::{BoxError, ConfigError, Error, ErrorKind, Result};
