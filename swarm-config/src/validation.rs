//! Configuration validation traits and utilities

use crate::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration
pub trait Validatable {
    /// Validate the configuration
    fn validate(&self) -> ConfigResult<()>;

    /// Get the domain name for error reporting
    fn domain_name(&self) -> &'static str;

    /// Helper to create a domain-specific validation error
    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

/// Validate a positive number
pub fn validate_positive<T>(value: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value <= T::default() {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be greater than 0, got {}", field_name, value),
        });
    }
    Ok(())
}

/// Validate that a value does not exceed an upper bound
pub fn validate_at_most<T>(value: T, max: T, field_name: &str, domain: &str) -> ConfigResult<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value > max {
        return Err(ConfigError::DomainError {
            domain: domain.to_string(),
            message: format!("{} must be at most {}, got {}", field_name, max, value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive() {
        assert!(validate_positive(1usize, "max_slots", "admission").is_ok());
        let err = validate_positive(0usize, "max_slots", "admission").unwrap_err();
        assert!(err.to_string().contains("max_slots must be greater than 0"));
    }

    #[test]
    fn test_validate_at_most() {
        assert!(validate_at_most(10u32, 10, "release_attempts", "lifecycle").is_ok());
        assert!(validate_at_most(11u32, 10, "release_attempts", "lifecycle").is_err());
    }
}
