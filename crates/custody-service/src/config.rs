//! Configuration for custodyd

use custody_core::PipelineConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Risk, fee, limit and polling settings for the pipeline
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Where balances, fees and the ledger come from
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8092)),
            enable_cors: true,
        }
    }
}

/// Collaborator backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-process simulated ledger (development/testing)
    Simulated {
        #[serde(default = "default_confirm_after")]
        confirm_after: u32,

        #[serde(default = "default_base_fee")]
        base_fee: Decimal,

        /// Opening balances
        #[serde(default)]
        balances: Vec<OpeningBalance>,
    },

    /// Remote wallet gateway speaking JSON over HTTP
    Http {
        url: String,

        #[serde(default = "default_request_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Simulated {
            confirm_after: default_confirm_after(),
            base_fee: default_base_fee(),
            balances: Vec::new(),
        }
    }
}

/// Funds credited to a simulated wallet at startup.
///
/// A list rather than a table keyed by address: configuration keys are case-folded,
/// addresses are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningBalance {
    pub address: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_confirm_after() -> u32 {
    2
}

fn default_base_fee() -> Decimal {
    Decimal::new(5, 6)
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ServiceConfig {
    /// Layer defaults, an optional file and `CUSTODY__`-prefixed environment variables.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&ServiceConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // e.g. CUSTODY__SERVER__LISTEN_ADDR, CUSTODY__PIPELINE__WARN_POLICY
        builder = builder.add_source(
            config::Environment::with_prefix("CUSTODY")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
