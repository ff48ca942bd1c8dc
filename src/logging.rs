//! Tracing setup for the `emostab` binary
//!
//! `EMOSTAB_LOG` overrides the level/filter passed on the command line.
//! Logs go to stderr so stdout stays clean for emissions.

use std::sync::OnceLock;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{EngineError, EngineResult};

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV_VAR: &str = "EMOSTAB_LOG";

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(level: &str, json: bool) -> EngineResult<()> {
    if LOGGING_INIT.get().is_some() {
        return Ok(());
    }

    let directive = resolve_directive(std::env::var(LOG_ENV_VAR).ok().as_deref(), level);
    let env_filter = build_filter(&directive)?;

    let builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    let result = if json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|err| EngineError::Logging(err.to_string()))?;
    LOGGING_INIT.set(()).ok();

    info!(
        target: "emostab::logging",
        filter = directive.as_str(),
        json,
        "logging initialized"
    );
    Ok(())
}

/// Parse a filter directive; a malformed one is an error, not a silent default
fn build_filter(directive: &str) -> EngineResult<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|err| EngineError::Logging(format!("invalid log filter {:?}: {}", directive, err)))
}

/// Non-blank env value wins over the CLI level
fn resolve_directive(env_value: Option<&str>, level: &str) -> String {
    env_value
        .filter(|value| !value.trim().is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| level.to_string())
}
