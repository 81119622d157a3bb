use std::path::PathBuf;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::{self, GatewayConfig, GatewayMode};
use crate::gateway::GatewayClient;
use crate::model::User;
use crate::store::Dataset;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything the daemon owns: the gateway wiring, the logged-in user, and
/// the entity collections. Single-threaded; handlers take `&mut`.
pub struct AppState {
    pub config_path: PathBuf,
    pub config: Option<GatewayConfig>,
    /// `None` means demo mode: reads answer empty, writes refuse.
    pub client: Option<GatewayClient>,
    pub session: Option<User>,
    pub data: Dataset,
}

impl AppState {
    /// Loads the config file and builds the gateway client. A missing file
    /// or a placeholder URL starts the sidecar in demo mode, which is the
    /// normal first-run state, not an error.
    pub fn new(config_path: PathBuf) -> AppState {
        let config = config::load_config(&config_path).ok();
        let client = config
            .as_ref()
            .filter(|cfg| cfg.is_configured())
            .and_then(|cfg| match GatewayClient::new(&cfg.endpoint_url) {
                Ok(client) => Some(client),
                Err(error) => {
                    warn!(%error, "gateway client init failed, staying in demo mode");
                    None
                }
            });
        info!(
            config = %config_path.display(),
            mode = if client.is_some() { "remote" } else { "demo" },
            "sidecar state ready"
        );
        AppState {
            config_path,
            config,
            client,
            session: None,
            data: Dataset::default(),
        }
    }

    pub fn mode(&self) -> GatewayMode {
        if self.client.is_some() {
            GatewayMode::Remote
        } else {
            GatewayMode::Demo
        }
    }

    /// Applies a new gateway config: persists nothing itself, just swaps the
    /// live client. Callers persist via [`config::save_config`] first.
    pub fn apply_config(&mut self, cfg: GatewayConfig) {
        self.client = if cfg.is_configured() {
            match GatewayClient::new(&cfg.endpoint_url) {
                Ok(client) => Some(client),
                Err(error) => {
                    warn!(%error, "gateway client init failed, staying in demo mode");
                    None
                }
            }
        } else {
            None
        };
        self.config = Some(cfg);
    }
}
