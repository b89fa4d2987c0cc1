//! Layered configuration: built-in defaults, an optional TOML file, then
//! `CUSTOMER_REGISTRY_*` environment variables (`__` separates sections,
//! e.g. `CUSTOMER_REGISTRY_STORE__DATA_DIR`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;

use crate::orchestrator::OrchestratorConfig;
use crate::report::PageLayout;

const DEFAULTS: &str = include_str!("../config/default.toml");
const ENV_PREFIX: &str = "CUSTOMER_REGISTRY_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub capacity: usize,
    pub reply_timeout_ms: u64,
    pub status_reply_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub layout: PageLayout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// `EnvFilter` directive, e.g. `info` or `customer_registry=debug`.
    pub log_level: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub channel: ChannelConfig,
    pub report: ReportConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load the layered configuration.
    ///
    /// # Errors
    ///
    /// Fails if `path` is given but missing, a layer does not fit the
    /// schema, or the report layout is unusable.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract::<Self>()?.checked()
    }

    /// Cross-field checks the schema cannot express.
    fn checked(self) -> Result<Self, figment::Error> {
        self.report.layout.validate().map_err(figment::Error::from)?;
        Ok(self)
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Toml::string(DEFAULTS));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Orchestrator settings derived from the `[channel]` section.
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            channel_capacity: self.channel.capacity,
            reply_timeout: Duration::from_millis(self.channel.reply_timeout_ms),
            status_reply_delay: Duration::from_millis(self.channel.status_reply_delay_ms),
        }
    }
}
