//! Environment variable loading with type conversion and defaults.

use std::env;
use std::str::FromStr;

use crate::error::{Result, SalesIntelError};

/// Typed environment variable loader.
pub struct EnvLoader;

impl EnvLoader {
    /// Load a required environment variable.
    pub fn load_required<T>(key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let value = env::var(key).map_err(|_| SalesIntelError::Configuration {
            message: format!("required environment variable '{}' is not set", key),
        })?;

        value.parse().map_err(|e| SalesIntelError::Configuration {
            message: format!("failed to parse '{}': {}", key, e),
        })
    }

    /// Load an optional environment variable, falling back to a default.
    pub fn load_with_default<T>(key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => value.parse().map_err(|e| SalesIntelError::Configuration {
                message: format!("failed to parse '{}': {}", key, e),
            }),
            Err(_) => Ok(default),
        }
    }

    /// Load an optional environment variable.
    pub fn load_optional<T>(key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Ok(value) => {
                let parsed = value.parse().map_err(|e| SalesIntelError::Configuration {
                    message: format!("failed to parse '{}': {}", key, e),
                })?;
                Ok(Some(parsed))
            }
            Err(_) => Ok(None),
        }
    }

    /// Load a boolean environment variable, accepting common spellings.
    pub fn load_bool(key: &str, default: bool) -> bool {
        match env::var(key).as_deref() {
            Ok("true" | "True" | "TRUE" | "1" | "yes" | "Yes" | "YES" | "on" | "On" | "ON") => true,
            Ok("false" | "False" | "FALSE" | "0" | "no" | "No" | "NO" | "off" | "Off" | "OFF") => {
                false
            }
            _ => default,
        }
    }
}
