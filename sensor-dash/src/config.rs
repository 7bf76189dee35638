use crate::error::ConfigError;
use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tokio::fs;

pub const CONFIG_PATH_ENV: &str = "SENSOR_DASH_CONFIG";
pub const HOST_ENV: &str = "SENSOR_DASH_MQTT_HOST";
pub const PORT_ENV: &str = "SENSOR_DASH_MQTT_PORT";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct DashboardConfig {
    pub mqtt: MqttConf,
    pub channels: ChannelsConf,
    pub display: DisplayConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    /// Generated as `sensor-dash-<uuid>` when absent.
    pub client_id: Option<String>,
    pub qos: u8,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ChannelsConf {
    pub slots: Vec<SlotChannel>,
    pub alerts: Option<String>,
    pub alert_capacity: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SlotChannel {
    pub topic: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    #[default]
    Terminal,
    Json,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConf {
    pub tick_ms: u64,
    pub title: String,
    pub mode: DisplayMode,
}

impl Default for MqttConf {
    fn default() -> Self {
        Self {
            host: "test.mosquitto.org".into(),
            port: 1883,
            keep_alive_secs: 60,
            client_id: None,
            qos: 0,
            reconnect_delay_ms: 2_000,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl Default for ChannelsConf {
    fn default() -> Self {
        Self {
            slots: vec![
                SlotChannel::labeled("parking/slot1", "Slot 1"),
                SlotChannel::labeled("parking/slot2", "Slot 2"),
            ],
            alerts: Some("home/intrusion/alerts".into()),
            alert_capacity: 10,
        }
    }
}

impl Default for DisplayConf {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            title: "Smart Home Dashboard".into(),
            mode: DisplayMode::Terminal,
        }
    }
}

impl SlotChannel {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into(), label: None }
    }

    pub fn labeled(topic: impl Into<String>, label: impl Into<String>) -> Self {
        Self { topic: topic.into(), label: Some(label.into()) }
    }

    /// Display name, falling back to the topic itself.
    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.topic)
    }
}

impl MqttConf {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn qos(&self) -> Result<QoS, ConfigError> {
        match self.qos {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(ConfigError::Invalid(format!("qos must be 0, 1 or 2, got {other}"))),
        }
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("sensor-dash-{}", uuid::Uuid::new_v4()))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }
}

impl DisplayConf {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl DashboardConfig {
    pub fn from_yaml_str(txt: &str) -> Result<Self, ConfigError> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(txt)?)
    }

    /// Broker address overrides, e.g. from the environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(HOST_ENV) {
            self.mqtt.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.mqtt.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV} is not a port: {port}")))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.mqtt.host.trim().is_empty() {
            return invalid("mqtt.host is empty");
        }
        if self.mqtt.port == 0 {
            return invalid("mqtt.port must be non-zero");
        }
        if self.mqtt.keep_alive_secs == 0 || self.mqtt.keep_alive_secs > u16::MAX as u64 {
            return invalid("mqtt.keep_alive_secs must be within 1..=65535");
        }
        self.mqtt.qos()?;
        if self.mqtt.reconnect_delay_ms == 0 {
            return invalid("mqtt.reconnect_delay_ms must be non-zero");
        }
        if self.mqtt.max_reconnect_delay_ms < self.mqtt.reconnect_delay_ms {
            return invalid("mqtt.max_reconnect_delay_ms is below mqtt.reconnect_delay_ms");
        }

        if self.channels.slots.is_empty() && self.channels.alerts.is_none() {
            return invalid("no channels configured");
        }
        let mut seen = HashSet::new();
        for slot in &self.channels.slots {
            if slot.topic.trim().is_empty() {
                return invalid("slot topic is empty");
            }
            if !seen.insert(slot.topic.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate slot topic {}", slot.topic)));
            }
        }
        if let Some(alerts) = &self.channels.alerts {
            if alerts.trim().is_empty() {
                return invalid("alerts topic is empty");
            }
            if seen.contains(alerts.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "alerts topic {alerts} is also a slot topic"
                )));
            }
        }
        if self.channels.alert_capacity == 0 {
            return invalid("channels.alert_capacity must be at least 1");
        }

        if self.display.tick_ms == 0 {
            return invalid("display.tick_ms must be non-zero");
        }
        Ok(())
    }
}

/// Loads `SENSOR_DASH_CONFIG` (default `dashboard.yaml`), applies env overrides and validates.
/// A missing file means reference defaults; an unreadable or invalid one is fatal.
pub async fn load_config() -> Result<DashboardConfig, ConfigError> {
    let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "dashboard.yaml".into());
    let mut cfg = load_config_from(&path).await?;
    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub async fn load_config_from<P: AsRef<Path>>(path: P) -> Result<DashboardConfig, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::warn!("no {}, using default config", path.display());
        return Ok(DashboardConfig::default());
    }
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    DashboardConfig::from_yaml_str(&txt)
}
