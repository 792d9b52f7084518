use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use webdav::WebDavSettings;

pub const CONFIG_VERSION: u32 = 1;
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ROOT_PATH: &str = "/dav";
const DEFAULT_WEBDAV_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebDavConfig {
    pub url: String,
    pub username: String,
    pub password: String,
    pub root_path: String,
    pub enabled: bool,
    pub timeout_secs: u64,
}

impl Default for WebDavConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            root_path: DEFAULT_ROOT_PATH.to_string(),
            enabled: true,
            timeout_secs: DEFAULT_WEBDAV_TIMEOUT_SECS,
        }
    }
}

impl WebDavConfig {
    pub fn is_configured(&self) -> bool {
        self.enabled && !self.url.trim().is_empty()
    }

    pub fn settings(&self) -> WebDavSettings {
        WebDavSettings {
            url: self.url.trim().to_string(),
            username: self.username.clone(),
            password: self.password.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    pub extensions: Vec<String>,
    pub recursive: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: vec![".mp3".to_string()],
            recursive: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub request_delay_ms: u64,
    pub timeout_secs: u64,
    pub lyrics_dir: String,
    pub covers_dir: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 800,
            timeout_secs: 30,
            lyrics_dir: "data/lyrics".to_string(),
            covers_dir: "data/covers".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    pub user_agent: String,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("davtag/{} (https://musicbrainz.org)", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub version: u32,
    pub port: u16,
    pub index_path: String,
    pub webdav: WebDavConfig,
    pub scan: ScanConfig,
    pub enrichment: EnrichmentConfig,
    pub catalog: CatalogConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            port: DEFAULT_PORT,
            index_path: "library.redb".to_string(),
            webdav: WebDavConfig::default(),
            scan: ScanConfig::default(),
            enrichment: EnrichmentConfig::default(),
            catalog: CatalogConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "io error: {}", err),
            ConfigError::Yaml(err) => write!(f, "yaml error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

pub fn config_path_from_env() -> PathBuf {
    match env::var("DAVTAG_CONFIG") {
        Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
        _ => default_config_path(),
    }
}

fn default_config_path() -> PathBuf {
    match env::current_exe() {
        Ok(exe) => exe
            .parent()
            .map(|dir| dir.join("config.yaml"))
            .unwrap_or_else(|| PathBuf::from("config.yaml")),
        Err(_) => PathBuf::from("config.yaml"),
    }
}

/// Reads the config at `path`, writing the defaults there first when the
/// file does not exist. The flag is true when the file was created.
pub fn load_or_create_config(path: &Path) -> Result<(ServerConfig, bool), ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(path)?;
        let mut config: ServerConfig = serde_yaml::from_str(&contents)?;
        normalize(&mut config);
        return Ok((config, false));
    }

    let config = ServerConfig::default();
    save_config(path, &config)?;
    Ok((config, true))
}

fn normalize(config: &mut ServerConfig) {
    if config.version < CONFIG_VERSION {
        config.version = CONFIG_VERSION;
    }
    if config.port == 0 {
        config.port = DEFAULT_PORT;
    }
    if config.webdav.root_path.trim().is_empty() {
        config.webdav.root_path = DEFAULT_ROOT_PATH.to_string();
    }
    if config.webdav.timeout_secs == 0 {
        config.webdav.timeout_secs = DEFAULT_WEBDAV_TIMEOUT_SECS;
    }
    config.scan.extensions = config
        .scan
        .extensions
        .iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| if ext.starts_with('.') { ext } else { format!(".{}", ext) })
        .collect();
    if config.scan.extensions.is_empty() {
        config.scan.extensions = ScanConfig::default().extensions;
    }
}

pub fn save_config(path: &Path, config: &ServerConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let contents = serde_yaml::to_string(config)?;
    fs::write(path, contents)?;
    Ok(())
}

pub fn resolve_path(config_path: &Path, value: &str) -> PathBuf {
    let raw = PathBuf::from(value);
    if raw.is_absolute() {
        return raw;
    }
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    base.join(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        let (config, created) = load_or_create_config(&path).unwrap();
        assert!(created);
        assert!(path.exists());
        assert_eq!(config.port, 8080);
        assert_eq!(config.webdav.root_path, "/dav");
        assert_eq!(config.scan.extensions, vec![".mp3".to_string()]);
        assert!(config.scan.recursive);
        assert_eq!(config.webdav.timeout_secs, 300);
        assert_eq!(config.enrichment.request_delay_ms, 800);

        let (reloaded, created) = load_or_create_config(&path).unwrap();
        assert!(!created);
        assert_eq!(reloaded, config);
    }

    #[test]
    fn partial_file_is_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(
            &path,
            "port: 0\nlisten: \"0.0.0.0:9090\"\nwebdav:\n  url: http://nas:5005\n  root_path: \"\"\nscan:\n  extensions: [\"MP3\", \" .flac \"]\n",
        )
        .unwrap();
        let (config, _) = load_or_create_config(&path).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.webdav.root_path, "/dav");
        assert!(config.webdav.is_configured());
        assert_eq!(
            config.scan.extensions,
            vec![".mp3".to_string(), ".flac".to_string()]
        );
        assert_eq!(config.enrichment, EnrichmentConfig::default());

        save_config(&path, &config).unwrap();
        let saved = fs::read_to_string(&path).unwrap();
        assert!(!saved.contains("listen"));
        assert!(saved.contains("port: 8080"));
    }

    #[test]
    fn resolves_relative_paths_next_to_config() {
        let config_path = Path::new("/etc/davtag/config.yaml");
        assert_eq!(
            resolve_path(config_path, "library.redb"),
            PathBuf::from("/etc/davtag/library.redb")
        );
        assert_eq!(resolve_path(config_path, "/var/x"), PathBuf::from("/var/x"));
    }
}
