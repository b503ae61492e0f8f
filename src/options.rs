//! Process-wide tuning options.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use device_link::CoreOptions;
//!
//! let options = CoreOptions::new()
//!     .with_default_validation_timeout(Duration::from_secs(2))
//!     .with_max_pending_expectations(16);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::script::DEFAULT_SCRIPT_TIME_LIMIT;

// ============================================================================
// Constants
// ============================================================================

/// Validation deadline used when neither the command nor its validation
/// config names one.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_millis(5000);

/// Pause after a step that requested no validation.
pub const DEFAULT_POST_SEND_DELAY: Duration = Duration::from_millis(100);

/// Maximum pending expectations per session.
pub const DEFAULT_MAX_PENDING_EXPECTATIONS: usize = 100;

// ============================================================================
// CoreOptions
// ============================================================================

/// Tuning shared by every session of one manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreOptions {
    /// Fallback validation deadline.
    pub default_validation_timeout: Duration,

    /// Sequence pause after steps without validation.
    pub post_send_delay: Duration,

    /// Hard execution-time cap per script invocation.
    pub script_time_limit: Duration,

    /// Pending expectation limit per session.
    pub max_pending_expectations: usize,
}

impl Default for CoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl CoreOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            default_validation_timeout: DEFAULT_VALIDATION_TIMEOUT,
            post_send_delay: DEFAULT_POST_SEND_DELAY,
            script_time_limit: DEFAULT_SCRIPT_TIME_LIMIT,
            max_pending_expectations: DEFAULT_MAX_PENDING_EXPECTATIONS,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl CoreOptions {
    /// Sets the fallback validation deadline.
    #[inline]
    #[must_use]
    pub fn with_default_validation_timeout(mut self, timeout: Duration) -> Self {
        self.default_validation_timeout = timeout;
        self
    }

    /// Sets the pause after steps without validation.
    #[inline]
    #[must_use]
    pub fn with_post_send_delay(mut self, delay: Duration) -> Self {
        self.post_send_delay = delay;
        self
    }

    /// Sets the script execution-time cap.
    #[inline]
    #[must_use]
    pub fn with_script_time_limit(mut self, limit: Duration) -> Self {
        self.script_time_limit = limit;
        self
    }

    /// Sets the pending expectation limit per session.
    #[inline]
    #[must_use]
    pub fn with_max_pending_expectations(mut self, limit: usize) -> Self {
        self.max_pending_expectations = limit;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl CoreOptions {
    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns error message if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.default_validation_timeout.is_zero() {
            return Err("Default validation timeout must be greater than zero".to_string());
        }
        if self.script_time_limit.is_zero() {
            return Err("Script time limit must be greater than zero".to_string());
        }
        if self.max_pending_expectations == 0 {
            return Err("Pending expectation limit must be greater than zero".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = CoreOptions::default();
        assert_eq!(options.default_validation_timeout, Duration::from_millis(5000));
        assert_eq!(options.post_send_delay, Duration::from_millis(100));
        assert_eq!(options.script_time_limit, Duration::from_millis(1000));
        assert_eq!(options.max_pending_expectations, 100);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_builder_chain() {
        let options = CoreOptions::new()
            .with_post_send_delay(Duration::ZERO)
            .with_max_pending_expectations(4);
        assert_eq!(options.post_send_delay, Duration::ZERO);
        assert_eq!(options.max_pending_expectations, 4);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(
            CoreOptions::new()
                .with_max_pending_expectations(0)
                .validate()
                .is_err()
        );
        assert!(
            CoreOptions::new()
                .with_script_time_limit(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
