use std::fmt::{self, Display, Formatter};

/// Errors raised while constructing a sampler.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConfigError {
  /// The sampling interval must be a positive integer.
  InvalidInterval(u64),
}

impl Display for ConfigError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::InvalidInterval(value) => {
        write!(f, "sampling interval must be positive, got {value}")
      }
    }
  }
}

impl std::error::Error for ConfigError {}
