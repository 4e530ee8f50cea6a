use std::env;
use std::path::PathBuf;

/// Directory scanned for plugin modules
pub const PLUGINS_DIR_ENV: &str = "WIDGET_PLUGINS_DIR";

/// Enables verbose diagnostics of the load sequence
pub const LOAD_LOG_ENV: &str = "WIDGET_PLUGINS_LOAD_LOG";

/// Values read from the environment
#[derive(Debug, Clone, Default)]
pub(crate) struct EnvConfig {
    pub plugin_dir: Option<PathBuf>,
    pub verbose_load: bool,
}

impl EnvConfig {
    pub fn load() -> Self {
        Self {
            plugin_dir: env::var(PLUGINS_DIR_ENV)
                .ok()
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from),
            verbose_load: verbose_load_from_env(),
        }
    }
}

/// Whether the load-sequence log flag is set in the environment
pub fn verbose_load_from_env() -> bool {
    env::var(LOAD_LOG_ENV).map(|v| flag_enabled(&v)).unwrap_or(false)
}

/// Any value other than empty, `0` or `false` counts as set.
pub(crate) fn flag_enabled(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}
