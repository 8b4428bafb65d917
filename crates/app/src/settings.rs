use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use murmur_client::{ClientConfig, DEFAULT_BASE_URL};
use murmur_stream::{DEFAULT_FAILURE_STATUS, SessionOptions};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const SETTINGS_DIRECTORY_NAME: &str = "murmur";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "MURMUR_";
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;

/// Persisted client settings. An `idle_timeout_secs` of zero disables the idle timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_failure_status")]
    pub failure_status: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
            failure_status: default_failure_status(),
        }
    }
}

impl ClientSettings {
    pub fn normalized(mut self) -> Self {
        let base_url = self.base_url.trim().trim_end_matches('/');
        self.base_url = if base_url.is_empty() {
            default_base_url()
        } else {
            base_url.to_string()
        };
        if self.connect_timeout_secs == 0 {
            self.connect_timeout_secs = default_connect_timeout_secs();
        }
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        self.failure_status = if self.failure_status.trim().is_empty() {
            default_failure_status()
        } else {
            self.failure_status.trim().to_string()
        };

        self
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone())
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    pub fn session_options(&self) -> SessionOptions {
        let options = SessionOptions::default().with_failure_status(self.failure_status.clone());
        if self.idle_timeout_secs == 0 {
            options
        } else {
            options.with_idle_timeout(Duration::from_secs(self.idle_timeout_secs))
        }
    }
}

/// Settings backed by a JSON file, with `MURMUR_` environment overrides on top.
///
/// Only the file layer is ever written back; environment values and per-run
/// overrides live in the effective settings alone.
pub struct SettingsStore {
    file_settings: Arc<ArcSwap<ClientSettings>>,
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".murmur"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let file_settings = Self::load_from_disk(&config_path);
        let settings = Self::with_env_overrides(&file_settings);
        Self {
            file_settings: Arc::new(ArcSwap::from_pointee(file_settings)),
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Effective settings: file values with environment and per-run overrides applied.
    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    /// What the settings file holds; the base for persisted changes.
    pub fn file_settings(&self) -> Arc<ClientSettings> {
        self.file_settings.load_full()
    }

    /// Applies an override for this process only; nothing is written to disk.
    pub fn override_base_url(&self, base_url: &str) {
        let mut settings = ClientSettings::clone(&self.settings());
        settings.base_url = base_url.to_string();
        self.settings.store(Arc::new(settings.normalized()));
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings
            .store(Arc::new(Self::with_env_overrides(&normalized_settings)));
        self.file_settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn load_from_disk(path: &Path) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return ClientSettings::default();
        }

        match Self::extract_file(path) {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(%error, "failed to read settings, using defaults");
                ClientSettings::default()
            }
        }
    }

    fn extract_file(path: &Path) -> Result<ClientSettings, SettingsError> {
        Figment::from(Serialized::defaults(ClientSettings::default()))
            .merge(Json::file(path))
            .extract::<ClientSettings>()
            .map_err(Box::new)
            .context(ExtractSnafu {
                stage: "extract-settings-file",
                path: path.to_path_buf(),
            })
    }

    fn with_env_overrides(file_settings: &ClientSettings) -> ClientSettings {
        match Self::extract_env(file_settings) {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(%error, "ignoring environment overrides");
                file_settings.clone()
            }
        }
    }

    fn extract_env(file_settings: &ClientSettings) -> Result<ClientSettings, SettingsError> {
        Figment::from(Serialized::defaults(file_settings))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["settings"]))
            .extract::<ClientSettings>()
            .map_err(Box::new)
            .context(EnvironmentSnafu {
                stage: "extract-settings-env",
                prefix: ENV_PREFIX,
            })
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to read `{prefix}*` environment overrides on `{stage}`: {source}"))]
    Environment {
        stage: &'static str,
        prefix: &'static str,
        source: Box<figment::Error>,
    },
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT_SECS
}

fn default_failure_status() -> String {
    DEFAULT_FAILURE_STATUS.to_string()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    const FILE_SETTINGS: &str =
        r#"{"base_url": "http://file-host:1", "idle_timeout_secs": 7}"#;

    #[test]
    fn normalization_trims_and_restores_defaults() {
        let settings = ClientSettings {
            base_url: "  http://chat.local:9000/// ".to_string(),
            connect_timeout_secs: 0,
            request_timeout_secs: 5,
            idle_timeout_secs: 0,
            failure_status: "   ".to_string(),
        }
        .normalized();

        assert_eq!(settings.base_url, "http://chat.local:9000");
        assert_eq!(settings.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.idle_timeout_secs, 0);
        assert_eq!(settings.failure_status, DEFAULT_FAILURE_STATUS);

        let blank = ClientSettings {
            base_url: " / ".to_string(),
            ..ClientSettings::default()
        }
        .normalized();
        assert_eq!(blank.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let disabled = ClientSettings {
            idle_timeout_secs: 0,
            ..ClientSettings::default()
        };
        assert_eq!(disabled.session_options().idle_timeout, None);

        let enabled = ClientSettings {
            idle_timeout_secs: 3,
            failure_status: "no answer".to_string(),
            ..ClientSettings::default()
        };
        let options = enabled.session_options();
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(3)));
        assert_eq!(options.failure_status, "no answer");
    }

    #[test]
    fn missing_file_yields_defaults() {
        Jail::expect_with(|jail| {
            let store = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME));

            assert_eq!(*store.settings(), ClientSettings::default());
            assert!(!store.config_path().exists());
            Ok(())
        });
    }

    #[test]
    fn partial_file_is_merged_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, FILE_SETTINGS)?;

            let store = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME));

            assert_eq!(store.settings().idle_timeout_secs, 7);
            assert_eq!(store.settings().base_url, "http://file-host:1");
            assert_eq!(store.settings().failure_status, DEFAULT_FAILURE_STATUS);
            Ok(())
        });
    }

    #[test]
    fn unparsable_file_falls_back_to_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, r#"{"idle_timeout_secs": "soon""#)?;

            let store = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME));

            assert_eq!(store.settings().idle_timeout_secs, DEFAULT_IDLE_TIMEOUT_SECS);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_apply_but_are_never_persisted() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, FILE_SETTINGS)?;
            jail.set_env("MURMUR_BASE_URL", "http://env-host:2");
            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let store = SettingsStore::new(path.clone());

            assert_eq!(store.settings().base_url, "http://env-host:2");
            assert_eq!(store.file_settings().base_url, "http://file-host:1");

            let mut changed = ClientSettings::clone(&store.file_settings());
            changed.failure_status = "backend unreachable".to_string();
            store.update(changed).expect("settings persist");

            let on_disk = std::fs::read_to_string(&path).expect("settings file exists");
            assert!(on_disk.contains("file-host"));
            assert!(!on_disk.contains("env-host"));
            assert!(on_disk.contains("backend unreachable"));
            assert_eq!(store.settings().base_url, "http://env-host:2");
            assert_eq!(store.settings().failure_status, "backend unreachable");
            Ok(())
        });
    }

    #[test]
    fn invalid_environment_override_keeps_file_values() {
        Jail::expect_with(|jail| {
            jail.create_file(SETTINGS_FILE_NAME, FILE_SETTINGS)?;
            jail.set_env("MURMUR_CONNECT_TIMEOUT_SECS", "soon");

            let store = SettingsStore::new(jail.directory().join(SETTINGS_FILE_NAME));

            assert_eq!(store.settings().base_url, "http://file-host:1");
            assert_eq!(store.settings().idle_timeout_secs, 7);
            assert_eq!(
                store.settings().connect_timeout_secs,
                DEFAULT_CONNECT_TIMEOUT_SECS
            );
            Ok(())
        });
    }

    #[test]
    fn update_persists_normalized_settings() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join(SETTINGS_FILE_NAME);
            let store = SettingsStore::new(path.clone());

            store
                .update(ClientSettings {
                    base_url: "http://backend:8080/".to_string(),
                    ..ClientSettings::default()
                })
                .expect("settings persist");

            assert_eq!(store.settings().base_url, "http://backend:8080");
            assert!(!path.with_extension("json.tmp").exists());
            let reloaded = SettingsStore::new(path);
            assert_eq!(reloaded.settings().base_url, "http://backend:8080");
            Ok(())
        });
    }

    #[test]
    fn base_url_override_is_not_persisted() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join(SETTINGS_FILE_NAME);
            let store = SettingsStore::new(path.clone());

            store.override_base_url("http://elsewhere:1/");

            assert_eq!(store.settings().base_url, "http://elsewhere:1");
            assert_eq!(store.file_settings().base_url, DEFAULT_BASE_URL);
            assert!(!path.exists());
            Ok(())
        });
    }
}
