//! Store configuration.

use crate::error::{CoreError, CoreResult};
use std::time::Duration;

/// Default name of the store.
pub const DEFAULT_STORE_NAME: &str = "test-store";

/// Name of the single container every store owns.
pub const CONTAINER_NAME: &str = "state";

/// Key written by [`crate::Store::mark_update`].
pub const LAST_UPDATE_KEY: &str = "last-update";

/// Default budget for every guarded step.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Name of the database the engine opens.
    pub store_name: String,

    /// Schema version requested on open.
    pub version: u32,

    /// Budget for one open attempt.
    pub open_timeout: Duration,

    /// Budget for obtaining the connection before an operation starts.
    pub acquire_timeout: Duration,

    /// Budget for a transaction to signal completion.
    pub operation_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_name: DEFAULT_STORE_NAME.to_string(),
            version: 1,
            open_timeout: DEFAULT_TIMEOUT,
            acquire_timeout: DEFAULT_TIMEOUT,
            operation_timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the store name.
    #[must_use]
    pub fn store_name(mut self, name: impl Into<String>) -> Self {
        self.store_name = name.into();
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Sets the open budget.
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Sets the connection acquisition budget.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the transaction completion budget.
    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets all three budgets at once.
    #[must_use]
    pub fn timeouts(self, timeout: Duration) -> Self {
        self.open_timeout(timeout)
            .acquire_timeout(timeout)
            .operation_timeout(timeout)
    }

    /// Checks that the configuration can be used.
    ///
    /// # Errors
    ///
    /// Returns `Config` for an empty store name, version 0 or a zero budget.
    pub fn validate(&self) -> CoreResult<()> {
        if self.store_name.is_empty() {
            return Err(CoreError::config("store name must not be empty"));
        }
        if self.version == 0 {
            return Err(CoreError::config("version must be at least 1"));
        }
        for (name, timeout) in [
            ("open_timeout", self.open_timeout),
            ("acquire_timeout", self.acquire_timeout),
            ("operation_timeout", self.operation_timeout),
        ] {
            if timeout.is_zero() {
                return Err(CoreError::config(format!("{name} must be non-zero")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.store_name, "test-store");
        assert_eq!(config.version, 1);
        assert_eq!(config.open_timeout, Duration::from_millis(1000));
        assert_eq!(config.operation_timeout, DEFAULT_TIMEOUT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let config = StoreConfig::new()
            .store_name("vitals")
            .version(3)
            .timeouts(Duration::from_millis(250))
            .operation_timeout(Duration::from_secs(2));

        assert_eq!(config.store_name, "vitals");
        assert_eq!(config.version, 3);
        assert_eq!(config.open_timeout, Duration::from_millis(250));
        assert_eq!(config.acquire_timeout, Duration::from_millis(250));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
    }

    #[test]
    fn validate_rejects_bad_values() {
        assert!(StoreConfig::new().store_name("").validate().is_err());
        assert!(StoreConfig::new().version(0).validate().is_err());

        let err = StoreConfig::new()
            .acquire_timeout(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::config("acquire_timeout must be non-zero")
        );
    }

    proptest! {
        #[test]
        fn non_degenerate_configs_validate(
            name in "[a-z][a-z0-9-]{0,15}",
            version in 1u32..,
            millis in 1u64..60_000,
        ) {
            let config = StoreConfig::new()
                .store_name(name)
                .version(version)
                .timeouts(Duration::from_millis(millis));
            prop_assert!(config.validate().is_ok());
        }
    }
}
