use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Deployment-id placeholder shipped in the distributed config template.
/// A URL still carrying it has never been pointed at a real deployment.
pub const PLACEHOLDER_MARKER: &str = "MASUKKAN_DEPLOYMENT_ID_BARU_DISINI";
pub const ENDPOINT_PREFIX: &str = "https://script.google.com";

const DEFAULT_CONFIG_FILE: &str = "kelasd.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    pub endpoint_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    /// Endpoint is absent or still the placeholder: loads answer empty,
    /// writes fail, login falls back to the hardcoded bypass.
    Demo,
    Remote,
}

impl GatewayMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayMode::Demo => "demo",
            GatewayMode::Remote => "remote",
        }
    }
}

impl GatewayConfig {
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        GatewayConfig {
            endpoint_url: endpoint_url.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.endpoint_url.starts_with(ENDPOINT_PREFIX)
            && !self.endpoint_url.contains(PLACEHOLDER_MARKER)
    }

    pub fn mode(&self) -> GatewayMode {
        if self.is_configured() {
            GatewayMode::Remote
        } else {
            GatewayMode::Demo
        }
    }
}

pub fn default_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from(DEFAULT_CONFIG_FILE)
}

pub fn load_config(path: &Path) -> anyhow::Result<GatewayConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.to_string_lossy()))?;
    let cfg: GatewayConfig = serde_json::from_str(&text)
        .with_context(|| format!("config {} is invalid JSON", path.to_string_lossy()))?;
    Ok(cfg)
}

pub fn save_config(path: &Path, cfg: &GatewayConfig) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    let text = serde_json::to_string_pretty(cfg).context("failed to serialize config")?;
    std::fs::write(path, text)
        .with_context(|| format!("failed to write config {}", path.to_string_lossy()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_url_is_demo_mode() {
        let cfg = GatewayConfig::new(format!(
            "https://script.google.com/macros/s/{}/exec",
            PLACEHOLDER_MARKER
        ));
        assert!(!cfg.is_configured());
        assert_eq!(cfg.mode(), GatewayMode::Demo);
    }

    #[test]
    fn foreign_host_is_demo_mode() {
        let cfg = GatewayConfig::new("https://example.com/exec");
        assert_eq!(cfg.mode(), GatewayMode::Demo);
    }

    #[test]
    fn deployed_url_is_remote_mode() {
        let cfg = GatewayConfig::new("https://script.google.com/macros/s/AKfycb-real/exec");
        assert!(cfg.is_configured());
        assert_eq!(cfg.mode(), GatewayMode::Remote);
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = std::env::temp_dir().join(format!(
            "kelasd-config-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        let path = dir.join("kelasd.json");
        let cfg = GatewayConfig::new("https://script.google.com/macros/s/abc/exec");
        save_config(&path, &cfg).expect("save");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded.endpoint_url, cfg.endpoint_url);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
