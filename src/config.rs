//! Application configuration, loaded from a single TOML file.

use crate::controller::CollectorSettings;
use crate::mapping::MappingEntry;
use crate::output::RemoteSettings;
use crate::wiggle::WiggleSettings;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn, Level};

const CONFIG_DIR: &str = "mouse-gremlin";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct RoutingConfig {
    /// Inject into the local input stream
    pub local: bool,
    /// Forward to the remote peer. Needs `[remote] enabled`; forwarding starts
    /// once the broker accepts the connection
    pub remote: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            local: true,
            remote: false,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct OutputConfig {
    pub tick_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { tick_ms: 10 }
    }
}

impl OutputConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(default)]
pub struct AppConfig {
    pub log_level: String,
    pub routing: RoutingConfig,
    pub wiggle: WiggleSettings,
    pub remote: RemoteSettings,
    pub output: OutputConfig,
    pub controller: CollectorSettings,
    pub mappings: Vec<MappingEntry>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            routing: RoutingConfig::default(),
            wiggle: WiggleSettings::default(),
            remote: RemoteSettings::default(),
            output: OutputConfig::default(),
            controller: CollectorSettings::default(),
            mappings: Vec::new(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/mouse-gremlin/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Reads and validates the file at `path`. A missing file yields the
    /// defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;

        info!(
            "Loaded config from {} ({} mappings)",
            path.display(),
            config.mappings.len()
        );
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.level()?;
        self.wiggle
            .validate()
            .map_err(|e| eyre!("Invalid [wiggle] section: {}", e))?;
        if self.output.tick_ms == 0 {
            return Err(eyre!("Invalid [output] section: tick_ms must be positive"));
        }
        Ok(())
    }

    pub fn level(&self) -> Result<Level> {
        Level::from_str(&self.log_level)
            .map_err(|_| eyre!("Invalid log level '{}'", self.log_level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{ButtonType, InputId};
    use crate::mapping::ActionMode;
    use crate::output::MouseButton;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).await.unwrap();
        assert!(config.routing.local);
        assert!(!config.remote.enabled);
        assert_eq!(config.wiggle, WiggleSettings::default());
        assert!(config.mappings.is_empty());
    }

    #[tokio::test]
    async fn parses_full_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(
            &path,
            r#"
log_level = "debug"

[routing]
local = false
remote = true

[wiggle]
min_interval_secs = 5
max_interval_secs = 6

[remote]
enabled = true
broker = "pi.local:1884"

[[mappings]]
input = { button = "RightBumper" }
mode = "MouseButton"
button-id = 10

[[mappings]]
input = { axis = "LeftStickX" }
mode = 1
direction = 90
min-speed = 0
max-speed = 400
"#,
        )
        .await
        .unwrap();

        let config = AppConfig::load(&path).await.unwrap();
        assert_eq!(config.level().unwrap(), Level::DEBUG);
        assert!(!config.routing.local && config.routing.remote);
        assert_eq!(config.wiggle.min_interval_secs, 5.0);
        assert_eq!(config.wiggle.hold_secs, 1.0);
        assert_eq!(config.remote.broker, "pi.local:1884");
        assert_eq!(config.output.tick_ms, 10);
        assert_eq!(config.mappings.len(), 2);
        assert_eq!(config.mappings[0].input, InputId::Button(ButtonType::RightBumper));
        assert_eq!(config.mappings[0].action.button_id, MouseButton::WheelUp);
        assert_eq!(config.mappings[1].action.action_mode, Some(ActionMode::MouseMotion));
        assert_eq!(config.mappings[1].action.max_speed, 400.0);
    }

    #[tokio::test]
    async fn rejects_inverted_wiggle_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[wiggle]\nmin_interval_secs = 50\nmax_interval_secs = 20\n")
            .await
            .unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn rejects_non_finite_wiggle_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "[wiggle]\nmax_interval_secs = inf\n")
            .await
            .unwrap();
        assert!(AppConfig::load(&path).await.is_err());

        tokio::fs::write(&path, "[wiggle]\nsettle_secs = nan\n")
            .await
            .unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn rejects_unknown_log_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        tokio::fs::write(&path, "log_level = \"loud\"\n").await.unwrap();
        assert!(AppConfig::load(&path).await.is_err());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let mut config = AppConfig::default();
        config.mappings.push(MappingEntry {
            input: InputId::Hat(0),
            action: crate::mapping::ActionConfig {
                action_mode: Some(ActionMode::MouseMotion),
                ..Default::default()
            },
        });
        config.save(&path).await.unwrap();

        let loaded = AppConfig::load(&path).await.unwrap();
        assert_eq!(loaded.mappings, config.mappings);
    }
}
