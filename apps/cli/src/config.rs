use std::{collections::HashMap, fs, time::Duration};

use client_core::ClientOptions;

#[derive(Debug, Clone)]
pub struct Settings {
    pub gateway_url: String,
    pub contract_address: String,
    pub explorer_url: String,
    pub quiet_period_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: "http://127.0.0.1:8545".into(),
            contract_address: "0x0278a4d4e98b3b81b9b2163a9c85441234bcc7b7".into(),
            explorer_url: "https://alfajores.celoscan.io".into(),
            quiet_period_ms: 500,
            confirmation_timeout_secs: 120,
        }
    }
}

impl Settings {
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            quiet_period: Duration::from_millis(self.quiet_period_ms),
            confirmation_timeout: Duration::from_secs(self.confirmation_timeout_secs),
        }
    }
}

/// `registry.toml` in the working directory, then env overrides on top.
pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("registry.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("gateway_url") {
                settings.gateway_url = v.clone();
            }
            if let Some(v) = file_cfg.get("contract_address") {
                settings.contract_address = v.clone();
            }
            if let Some(v) = file_cfg.get("explorer_url") {
                settings.explorer_url = v.clone();
            }
            if let Some(v) = file_cfg.get("quiet_period_ms") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.quiet_period_ms = parsed;
                }
            }
            if let Some(v) = file_cfg.get("confirmation_timeout_secs") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.confirmation_timeout_secs = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("REGISTRY_GATEWAY_URL") {
        settings.gateway_url = v;
    }
    if let Ok(v) = std::env::var("REGISTRY_CONTRACT_ADDRESS") {
        settings.contract_address = v;
    }
    if let Ok(v) = std::env::var("REGISTRY_EXPLORER_URL") {
        settings.explorer_url = v;
    }
    if let Ok(v) = std::env::var("REGISTRY_QUIET_PERIOD_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.quiet_period_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("REGISTRY_CONFIRMATION_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.confirmation_timeout_secs = parsed;
        }
    }

    settings
}
