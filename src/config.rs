//! Configuration loading for RTDE connections

use crate::{Result, RtdeError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Connection settings for one robot, loadable from YAML.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub host: String,
    pub ports: Option<PortConfig>,
    /// Output streaming frequency override. Defaults to the controller
    /// generation's native rate (125 Hz CB-series, 500 Hz e-Series).
    pub frequency: Option<f64>,
    /// Move the command channel to registers 24..47 to avoid collisions
    /// with another program using the default window.
    pub use_upper_range_registers: Option<bool>,
    /// Upload the embedded control script at session start.
    pub upload_script: Option<bool>,
    /// Control script file overriding the embedded one.
    pub custom_script_file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortConfig {
    pub rtde: Option<u16>,
    pub script: Option<u16>,
    pub dashboard: Option<u16>,
}

impl ClientConfig {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ports: None,
            frequency: None,
            use_upper_range_registers: None,
            upload_script: None,
            custom_script_file: None,
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            RtdeError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn rtde_port(&self) -> u16 {
        self.ports
            .as_ref()
            .and_then(|p| p.rtde)
            .unwrap_or(crate::rtde::RTDE_PORT)
    }

    pub fn script_port(&self) -> u16 {
        self.ports
            .as_ref()
            .and_then(|p| p.script)
            .unwrap_or(crate::script::SCRIPT_PORT)
    }

    pub fn dashboard_port(&self) -> u16 {
        self.ports
            .as_ref()
            .and_then(|p| p.dashboard)
            .unwrap_or(crate::dashboard::DASHBOARD_PORT)
    }

    pub fn use_upper_range_registers(&self) -> bool {
        self.use_upper_range_registers.unwrap_or(false)
    }

    pub fn upload_script(&self) -> bool {
        self.upload_script.unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("192.168.56.101");
        assert_eq!(config.rtde_port(), 30004);
        assert_eq!(config.script_port(), 30002);
        assert_eq!(config.dashboard_port(), 29999);
        assert!(!config.use_upper_range_registers());
        assert!(config.upload_script());
        assert_eq!(config.frequency, None);
    }

    #[test]
    fn test_yaml_round_trip() {
        let yaml = "\
host: 10.0.0.2
ports:
  rtde: 31004
frequency: 125.0
use_upper_range_registers: true
";
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.rtde_port(), 31004);
        assert_eq!(config.script_port(), 30002);
        assert_eq!(config.frequency, Some(125.0));
        assert!(config.use_upper_range_registers());
    }
}
