use anyhow::{anyhow, Result};
use std::env;
use std::str::FromStr;

/// Retrieves an environment variable as a string, falling back to `default` when unset.
pub fn get_env_var_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Parses an environment variable into `T`, falling back to `default` when unset.
///
/// Unlike a silent `unwrap_or`, a value that is present but does not parse is an error,
/// so a typo in the configuration never turns into a surprising default.
///
/// # Arguments
/// - `var`: The name of the environment variable.
/// - `default`: Value used when the variable is unset or blank.
///
/// # Returns
/// - `Ok(T)` with the parsed or default value
/// - `Err` if the variable is set but cannot be parsed
pub fn parse_env_var<T>(var: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", var, raw, e)),
        _ => Ok(default),
    }
}

/// Parses an optional environment variable into `T`; unset or blank yields `None`.
pub fn parse_optional_env_var<T>(var: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("Invalid value for {}: {:?} ({})", var, raw, e)),
        _ => Ok(None),
    }
}
