// ABOUTME: KUBELING_* environment overrides applied on top of the config file.
// ABOUTME: Empty variables are treated as unset.

use super::Config;
use crate::error::{Error, Result};
use crate::runtime::parse_runtime;

pub const ENV_RUNTIME: &str = "KUBELING_RUNTIME";
pub const ENV_SOCKET: &str = "KUBELING_SOCKET";
pub const ENV_TIMEOUT: &str = "KUBELING_TIMEOUT";

fn lookup(var: &str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(super) fn apply(config: &mut Config) -> Result<()> {
    if let Some(runtime) = lookup(ENV_RUNTIME) {
        parse_runtime(&runtime).map_err(|e| Error::InvalidEnv {
            var: ENV_RUNTIME,
            message: e.to_string(),
        })?;
        config.runtime = runtime;
    }

    if let Some(socket) = lookup(ENV_SOCKET) {
        config.socket = Some(socket);
    }

    if let Some(timeout) = lookup(ENV_TIMEOUT) {
        config.timeout = humantime_serde::re::humantime::parse_duration(&timeout).map_err(|e| {
            Error::InvalidEnv {
                var: ENV_TIMEOUT,
                message: e.to_string(),
            }
        })?;
    }

    Ok(())
}
