//! Tracing subscriber setup
//!
//! The subscriber goes in before the config file is read so that config
//! loading itself is logged. The configured level is applied afterwards
//! through a reload handle, unless `RUST_LOG` is set.

use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter used until the config file has been read
pub const BOOTSTRAP_DIRECTIVE: &str = "info";

/// Filter directive for a configured `logging.level`
pub fn config_directive(level: &str) -> String {
    format!("cosmowall_gen={0},cosmowall_common={0},tower_http=info", level)
}

/// Swaps the active filter once configuration is known
pub struct LogFilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilterHandle {
    /// Apply the config file's level; a `RUST_LOG` filter is left alone
    pub fn apply_config_level(&self, level: &str) -> Result<(), reload::Error> {
        if self.from_env {
            return Ok(());
        }
        self.handle.reload(EnvFilter::new(config_directive(level)))
    }
}

fn filter_layer(env_filter: Option<EnvFilter>) -> (reload::Layer<EnvFilter, Registry>, LogFilterHandle) {
    let from_env = env_filter.is_some();
    let filter = env_filter.unwrap_or_else(|| EnvFilter::new(BOOTSTRAP_DIRECTIVE));
    let (layer, handle) = reload::Layer::new(filter);
    (layer, LogFilterHandle { handle, from_env })
}

/// Install the global subscriber (registry + reloadable filter + fmt layer)
pub fn init() -> LogFilterHandle {
    let (filter, handle) = filter_layer(EnvFilter::try_from_default_env().ok());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    handle
}
