use crate::orchestrator::DEFAULT_TIMEOUT;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api";
pub const BASE_URL_ENV: &str = "MANGROVE_API_URL";
pub const TIMEOUT_ENV: &str = "MANGROVE_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: Url,
    /// `None` disables the exchange deadline.
    pub timeout: Option<Duration>,
}

#[derive(thiserror::Error, Debug)]
pub enum ClientConfigError {
    #[error("client configuration invalid: {0}")]
    Invalid(String),
}

impl ClientConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid(detail) => format!("Mangrove is misconfigured: {detail}. Update mangrove.yaml or the environment."),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base url is valid"),
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl ClientSettings {
    /// Defaults, then the first `mangrove.yaml` found, then the environment.
    pub fn load() -> Result<Self, ClientConfigError> {
        let mut settings = match locate_config_file() {
            Some(path) => Self::from_path(&path)?,
            None => Self::default(),
        };
        settings.apply_overrides(
            std::env::var(BASE_URL_ENV).ok().as_deref(),
            std::env::var(TIMEOUT_ENV).ok().as_deref(),
        )?;
        Ok(settings)
    }

    pub fn from_path(path: &Path) -> Result<Self, ClientConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ClientConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
        })?;
        let config: MangroveConfig = serde_yaml::from_str(&contents)
            .map_err(|err| ClientConfigError::Invalid(format!("invalid mangrove.yaml: {err}")))?;
        let mut settings = Self::default();
        if let Some(section) = config.client {
            settings.apply_section(section)?;
        }
        tracing::debug!(path = %path.display(), base_url = %settings.base_url, "loaded client settings");
        Ok(settings)
    }

    /// Applies textual overrides (environment or command line). Blank values
    /// are ignored.
    pub fn apply_overrides(
        &mut self,
        base_url: Option<&str>,
        timeout_secs: Option<&str>,
    ) -> Result<(), ClientConfigError> {
        if let Some(raw) = base_url.map(str::trim).filter(|raw| !raw.is_empty()) {
            self.base_url = parse_base_url(raw)?;
        }
        if let Some(raw) = timeout_secs.map(str::trim).filter(|raw| !raw.is_empty()) {
            let secs = raw.parse::<u64>().map_err(|_| {
                ClientConfigError::Invalid(format!("timeout must be a whole number of seconds, got `{raw}`"))
            })?;
            self.timeout = timeout_from_secs(secs);
        }
        Ok(())
    }

    fn apply_section(&mut self, section: ClientSection) -> Result<(), ClientConfigError> {
        if let Some(raw) = section.base_url {
            if raw.trim().is_empty() {
                return Err(ClientConfigError::Invalid(
                    "empty base_url in mangrove.yaml".to_string(),
                ));
            }
            self.base_url = parse_base_url(raw.trim())?;
        }
        if let Some(secs) = section.timeout_secs {
            self.timeout = timeout_from_secs(secs);
        }
        Ok(())
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ClientConfigError> {
    let url = Url::parse(raw)
        .map_err(|err| ClientConfigError::Invalid(format!("base url `{raw}` is not valid: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ClientConfigError::Invalid(format!(
            "base url must use http or https, got `{other}`"
        ))),
    }
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn locate_config_file() -> Option<PathBuf> {
    mangrove_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn mangrove_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("mangrove");
        paths.push(config_dir.join("mangrove.yaml"));
        paths.push(config_dir.join("mangrove.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".mangrove").join("mangrove.yaml"));
        paths.push(home_dir.join(".mangrove").join("mangrove.yml"));
    }
    paths.push(PathBuf::from("mangrove.yaml"));
    paths.push(PathBuf::from("mangrove.yml"));
    paths
}

#[derive(Debug, Deserialize)]
struct MangroveConfig {
    client: Option<ClientSection>,
}

#[derive(Debug, Default, Deserialize)]
struct ClientSection {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}
