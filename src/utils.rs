use std::env::var;
use std::str::FromStr;

use anyhow::Context;
use anyhow::Result;

/// Get the value of ENV var, or a default
///
/// Only when:
/// - It is set
/// - It is not empty
pub fn env_var_or_else<F>(var_name: &'static str, or_else: F) -> String
where
    F: FnOnce() -> String,
{
    env_var(var_name).unwrap_or_else(or_else)
}

/// Get the value of ENV var when it is set and not empty
pub fn env_var(var_name: &'static str) -> Option<String> {
    var(var_name).ok().filter(|value| !value.is_empty())
}

/// Parse the value of ENV var when it is set and not empty
///
/// # Errors
///
/// Will return `Err` when the value does not parse
pub fn parse_env_var<T>(var_name: &'static str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(var_name)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("`{var_name}` has an invalid value: {value}"))
        })
        .transpose()
}
