//! Engine settings.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable overriding [`EngineOptions::parallelism`].
pub const PARALLELISM_ENV: &str = "TERRACE_PARALLELISM";

/// Default number of graph nodes run at once.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Settings of an [`crate::Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Maximum number of graph nodes running at once.
    pub parallelism: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl EngineOptions {
    /// Reads the options from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the options through a variable lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut options = Self::default();
        if let Some(raw) = lookup(PARALLELISM_ENV) {
            options.parallelism = parse_parallelism(&raw)?;
        }
        Ok(options)
    }

    /// Sets the parallelism.
    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }
}

fn parse_parallelism(raw: &str) -> Result<usize, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidOption {
        name: PARALLELISM_ENV.to_string(),
        message,
    };
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(invalid(String::from("must be at least 1"))),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(format!("{raw:?} is not a number: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lookup() {
        let options = EngineOptions::from_lookup(|_| None).expect("defaults");
        assert_eq!(options.parallelism, DEFAULT_PARALLELISM);

        let options = EngineOptions::from_lookup(|name| (name == PARALLELISM_ENV).then(|| String::from(" 4 ")))
            .expect("valid");
        assert_eq!(options.parallelism, 4);

        for raw in ["0", "many"] {
            let err = EngineOptions::from_lookup(|_| Some(raw.to_string())).expect_err(raw);
            assert!(matches!(err, ConfigError::InvalidOption { .. }));
        }
    }
}
