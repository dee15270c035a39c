//! Anonymous usage events
//!
//! One Matomo event per phase, posted from a detached thread. A failed post
//! is logged at debug and otherwise ignored. `TELEMETRY=false` or
//! `telemetry: false` in config turns it off.

use sha2::{Digest, Sha256};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::core::config::Config;

pub const MATOMO_URL: &str = "https://unified-demo.digit.org/matomo/matomo.php";
pub const DEFAULT_SITE_ID: &str = "1";

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A single tracked event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub category: String,
    pub action: String,
    pub name: String,
}

impl Event {
    pub fn new(category: &str, action: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            action: action.to_string(),
            name: name.to_string(),
        }
    }
}

pub struct Telemetry {
    enabled: bool,
    endpoint: String,
    site_id: String,
}

impl Telemetry {
    pub fn from_config(config: &Config) -> Self {
        Self {
            enabled: config.telemetry_enabled(),
            endpoint: MATOMO_URL.to_string(),
            site_id: std::env::var("MATOMO_SITE_ID").unwrap_or_else(|_| DEFAULT_SITE_ID.to_string()),
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            endpoint: MATOMO_URL.to_string(),
            site_id: DEFAULT_SITE_ID.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Form fields for one event
    pub fn form(&self, event: &Event) -> Vec<(&'static str, String)> {
        vec![
            ("idsite", self.site_id.clone()),
            ("rec", "1".to_string()),
            ("e_c", event.category.clone()),
            ("e_a", event.action.clone()),
            ("e_n", event.name.clone()),
            ("_id", visitor_id()),
            ("url", format!("app://dataloader/{}/{}", event.category, event.action)),
            ("apiv", "1".to_string()),
        ]
    }

    /// Fire and forget; `None` when disabled
    pub fn send(&self, event: Event) -> Option<JoinHandle<()>> {
        if !self.enabled {
            return None;
        }
        let endpoint = self.endpoint.clone();
        let form = self.form(&event);
        let handle = std::thread::spawn(move || {
            let pairs: Vec<(&str, &str)> = form.iter().map(|(k, v)| (*k, v.as_str())).collect();
            let result = ureq::post(&endpoint).timeout(SEND_TIMEOUT).send_form(&pairs);
            if let Err(e) = result {
                tracing::debug!(error = %e, "telemetry event not sent");
            }
        });
        Some(handle)
    }
}

/// Stable anonymous id: first 16 hex chars of SHA-256(hostname + machine id)
pub fn visitor_id() -> String {
    hashed_id(&hostname(), &machine_id())
}

fn hashed_id(host: &str, machine: &str) -> String {
    let digest = Sha256::digest(format!("{}{}", host, machine).as_bytes());
    format!("{:x}", digest).chars().take(16).collect()
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn machine_id() -> String {
    ["/etc/machine-id", "/var/lib/dbus/machine-id"]
        .iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}
