use std::collections::BTreeMap;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::atomic::write_atomic;
use crate::backups::{BackupRotator, DEFAULT_KEEP};

pub const APP_DIR_NAME: &str = "todo-cli";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "todos.json";
pub const INSTALL_ID_ENV: &str = "TODO_INSTALL_ID";

const INSTALLATION_KEY_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine the home directory")]
    NoHomeDir,
    #[error("could not determine the user config directory")]
    NoConfigDir,
    #[error("could not locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings persisted for one installation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub db_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub backups_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keep_backups: Option<usize>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub created_at: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub updated_at: String,
}

impl AppConfig {
    pub fn keep_backups(&self) -> usize {
        self.keep_backups.unwrap_or(DEFAULT_KEEP)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SharedConfigFile {
    #[serde(default)]
    installations: BTreeMap<String, AppConfig>,
}

/// Where this installation's config lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// A dedicated file holding one `AppConfig` at its root.
    File(PathBuf),
    /// One `[installations."<key>"]` table in a shared file.
    Shared { path: PathBuf, key: String },
}

impl ConfigLocation {
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Ok(ConfigLocation::File(path.to_path_buf()));
        }
        let dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(ConfigLocation::Shared {
            path: dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME),
            key: installation_key()?,
        })
    }

    pub fn path(&self) -> &Path {
        match self {
            ConfigLocation::File(path) | ConfigLocation::Shared { path, .. } => path,
        }
    }

    /// Directory that relative paths in the config resolve against.
    pub fn base_dir(&self) -> PathBuf {
        self.path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Missing files and missing installation tables read as the default config.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        match self {
            ConfigLocation::File(path) => match read_optional(path)? {
                Some(raw) => parse(path, &raw),
                None => Ok(AppConfig::default()),
            },
            ConfigLocation::Shared { path, key } => {
                let shared = load_shared(path)?;
                Ok(shared.installations.get(key).cloned().unwrap_or_default())
            }
        }
    }

    /// Replaces this installation's config. Other installations in a shared file
    /// are left as they were.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let (path, rendered) = match self {
            ConfigLocation::File(path) => (path, toml::to_string_pretty(config)?),
            ConfigLocation::Shared { path, key } => {
                let mut shared = load_shared(path)?;
                shared.installations.insert(key.clone(), config.clone());
                (path, toml::to_string_pretty(&shared)?)
            }
        };
        write_atomic(path, rendered.as_bytes()).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(path: &Path, raw: &str) -> Result<T, ConfigError> {
    toml::from_str(raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_shared(path: &Path) -> Result<SharedConfigFile, ConfigError> {
    match read_optional(path)? {
        Some(raw) => parse(path, &raw),
        None => Ok(SharedConfigFile::default()),
    }
}

/// `TODO_INSTALL_ID` when set, otherwise a hash of the running executable's path.
pub fn installation_key() -> Result<String, ConfigError> {
    let override_id = std::env::var(INSTALL_ID_ENV).ok();
    if let Some(key) = override_id.as_deref().map(str::trim).filter(|key| !key.is_empty()) {
        return Ok(key.to_string());
    }
    let exe = std::env::current_exe().map_err(ConfigError::CurrentExe)?;
    let exe = exe.canonicalize().unwrap_or(exe);
    Ok(installation_key_for(&exe))
}

pub fn installation_key_for(executable: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(executable.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..INSTALLATION_KEY_LEN].to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    Flag,
    Env,
    Config,
    Default,
}

impl PathSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PathSource::Flag => "--db",
            PathSource::Env => "TODO_DB",
            PathSource::Config => "config",
            PathSource::Default => "default",
        }
    }
}

impl fmt::Display for PathSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to document path resolution, highest precedence first.
#[derive(Debug, Clone, Copy)]
pub struct PathInputs<'a> {
    pub flag: Option<&'a Path>,
    pub env: Option<&'a str>,
    pub config: &'a AppConfig,
    pub config_dir: &'a Path,
    pub home: Option<&'a Path>,
}

pub fn resolve_db_path(inputs: PathInputs<'_>) -> Result<(PathBuf, PathSource), ConfigError> {
    if let Some(flag) = inputs.flag.filter(|flag| !flag.as_os_str().is_empty()) {
        return Ok((expand_home(flag, inputs.home), PathSource::Flag));
    }
    if let Some(env) = inputs.env.map(str::trim).filter(|env| !env.is_empty()) {
        return Ok((expand_home(Path::new(env), inputs.home), PathSource::Env));
    }
    if let Some(configured) = configured_path(&inputs.config.db_path, inputs.config_dir, inputs.home)
    {
        return Ok((configured, PathSource::Config));
    }
    let home = inputs.home.ok_or(ConfigError::NoHomeDir)?;
    Ok((default_db_path(home), PathSource::Default))
}

/// `~/Documents/todo-cli/todos.json` when `~/Documents` exists, else `~/.todo-cli/todos.json`.
pub fn default_db_path(home: &Path) -> PathBuf {
    let documents = home.join("Documents");
    if documents.is_dir() {
        documents.join(APP_DIR_NAME).join(DB_FILE_NAME)
    } else {
        home.join(format!(".{APP_DIR_NAME}")).join(DB_FILE_NAME)
    }
}

/// A config path with `~` expanded; relative values resolve against `config_dir`.
pub fn configured_path(raw: &str, config_dir: &Path, home: Option<&Path>) -> Option<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let expanded = expand_home(Path::new(raw), home);
    if expanded.is_absolute() {
        Some(expanded)
    } else {
        Some(config_dir.join(expanded))
    }
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

/// Everything a command needs from configuration, resolved once per process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub location: ConfigLocation,
    pub config: AppConfig,
    pub db_path: PathBuf,
    pub db_source: PathSource,
    pub backups: BackupRotator,
}

impl Settings {
    pub fn resolve(
        db_flag: Option<&Path>,
        config_flag: Option<&Path>,
    ) -> Result<Settings, ConfigError> {
        let location = ConfigLocation::discover(config_flag)?;
        let env = std::env::var("TODO_DB").ok();
        let home = dirs::home_dir();
        Self::from_parts(location, db_flag, env.as_deref(), home.as_deref())
    }

    pub fn from_parts(
        location: ConfigLocation,
        db_flag: Option<&Path>,
        db_env: Option<&str>,
        home: Option<&Path>,
    ) -> Result<Settings, ConfigError> {
        let config = location.load()?;
        let config_dir = location.base_dir();
        let (db_path, db_source) = resolve_db_path(PathInputs {
            flag: db_flag,
            env: db_env,
            config: &config,
            config_dir: &config_dir,
            home,
        })?;
        let backups = BackupRotator::new(
            configured_path(&config.backups_dir, &config_dir, home),
            config.keep_backups(),
        );
        tracing::debug!(
            db = %db_path.display(),
            source = %db_source,
            config = %location.path().display(),
            "settings resolved"
        );
        Ok(Settings {
            location,
            config,
            db_path,
            db_source,
            backups,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitConfigOutcome {
    /// Whether the config file was (re)written.
    pub written: bool,
    /// The document path the config points at after the call.
    pub db_path: PathBuf,
}

/// Records `target` as the configured document path. An existing path is only
/// replaced with `force`.
pub fn init_config(
    location: &ConfigLocation,
    target: &Path,
    force: bool,
    now: &str,
    home: Option<&Path>,
) -> Result<InitConfigOutcome, ConfigError> {
    let mut config = location.load()?;
    if let Some(existing) = configured_path(&config.db_path, &location.base_dir(), home) {
        if !force {
            return Ok(InitConfigOutcome {
                written: false,
                db_path: existing,
            });
        }
    }

    if config.created_at.is_empty() {
        config.created_at = now.to_string();
    }
    config.updated_at = now.to_string();
    config.db_path = target.display().to_string();
    location.save(&config)?;
    Ok(InitConfigOutcome {
        written: true,
        db_path: target.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use uuid::Uuid;

    use super::{
        default_db_path, init_config, installation_key_for, resolve_db_path, AppConfig,
        ConfigError, ConfigLocation, PathInputs, PathSource, Settings,
    };

    fn unique_workspace() -> PathBuf {
        let root = std::env::temp_dir().join(format!("todo-config-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("workspace should be creatable");
        root
    }

    fn inputs<'a>(
        flag: Option<&'a Path>,
        env: Option<&'a str>,
        config: &'a AppConfig,
        config_dir: &'a Path,
        home: &'a Path,
    ) -> PathInputs<'a> {
        PathInputs {
            flag,
            env,
            config,
            config_dir,
            home: Some(home),
        }
    }

    #[test]
    fn precedence_is_flag_env_config_default() {
        let root = unique_workspace();
        let config_dir = root.join("cfg");
        let config = AppConfig {
            db_path: "todos.json".to_string(),
            ..AppConfig::default()
        };
        let flag = root.join("cli.json");

        let resolved = resolve_db_path(inputs(None, None, &config, &config_dir, &root))
            .expect("config path");
        assert_eq!(resolved, (config_dir.join("todos.json"), PathSource::Config));

        let env = root.join("env.json").to_string_lossy().into_owned();
        let resolved =
            resolve_db_path(inputs(None, Some(env.as_str()), &config, &config_dir, &root))
                .expect("env path");
        assert_eq!(resolved, (root.join("env.json"), PathSource::Env));

        let resolved = resolve_db_path(inputs(
            Some(flag.as_path()),
            Some(env.as_str()),
            &config,
            &config_dir,
            &root,
        ))
        .expect("flag path");
        assert_eq!(resolved, (flag.clone(), PathSource::Flag));

        let empty = AppConfig::default();
        let resolved = resolve_db_path(inputs(None, Some("  "), &empty, &config_dir, &root))
            .expect("default path");
        assert_eq!(resolved, (default_db_path(&root), PathSource::Default));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn default_prefers_documents_folder() {
        let root = unique_workspace();
        assert_eq!(default_db_path(&root), root.join(".todo-cli/todos.json"));
        std::fs::create_dir_all(root.join("Documents")).expect("documents");
        assert_eq!(
            default_db_path(&root),
            root.join("Documents/todo-cli/todos.json")
        );
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn tilde_expands_against_home() {
        let home = PathBuf::from("/home/someone");
        let config = AppConfig::default();
        let resolved = resolve_db_path(inputs(
            Some(Path::new("~/lists/todos.json")),
            None,
            &config,
            Path::new("/etc"),
            &home,
        ))
        .expect("flag path");
        assert_eq!(resolved.0, PathBuf::from("/home/someone/lists/todos.json"));
    }

    #[test]
    fn default_without_home_is_an_error() {
        let config = AppConfig::default();
        let err = resolve_db_path(PathInputs {
            flag: None,
            env: None,
            config: &config,
            config_dir: Path::new("/etc"),
            home: None,
        })
        .expect_err("no home");
        assert!(matches!(err, ConfigError::NoHomeDir));
    }

    #[test]
    fn installation_key_is_stable_and_short() {
        let first = installation_key_for(Path::new("/usr/local/bin/todo"));
        let second = installation_key_for(Path::new("/usr/local/bin/todo"));
        let other = installation_key_for(Path::new("/opt/todo/bin/todo"));
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 16);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn shared_file_keeps_other_installations() {
        let root = unique_workspace();
        let path = root.join("config.toml");
        let first = ConfigLocation::Shared {
            path: path.clone(),
            key: "aaaa".to_string(),
        };
        let second = ConfigLocation::Shared {
            path: path.clone(),
            key: "bbbb".to_string(),
        };
        let config = AppConfig {
            db_path: "/data/a.json".to_string(),
            keep_backups: Some(2),
            ..AppConfig::default()
        };
        first.save(&config).expect("save first");
        second
            .save(&AppConfig {
                db_path: "/data/b.json".to_string(),
                ..AppConfig::default()
            })
            .expect("save second");

        assert_eq!(first.load().expect("load first"), config);
        assert_eq!(second.load().expect("load second").db_path, "/data/b.json");
        let raw = std::fs::read_to_string(&path).expect("read shared");
        assert!(raw.contains("[installations.aaaa]"));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn broken_config_is_reported() {
        let root = unique_workspace();
        let path = root.join("config.toml");
        std::fs::write(&path, "db_path = ").expect("seed");
        let err = ConfigLocation::File(path).load().expect_err("parse error");
        assert!(matches!(err, ConfigError::Parse { .. }));
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn init_only_overwrites_with_force() {
        let root = unique_workspace();
        let location = ConfigLocation::File(root.join("config.toml"));
        let first = root.join("one.json");
        let second = root.join("two.json");

        let outcome = init_config(&location, &first, false, "2024-01-01T00:00:00Z", None)
            .expect("first init");
        assert!(outcome.written);

        let outcome = init_config(&location, &second, false, "2024-01-02T00:00:00Z", None)
            .expect("second init");
        assert!(!outcome.written);
        assert_eq!(outcome.db_path, first);

        let outcome = init_config(&location, &second, true, "2024-01-03T00:00:00Z", None)
            .expect("forced init");
        assert!(outcome.written);
        let config = location.load().expect("load");
        assert_eq!(config.db_path, second.display().to_string());
        assert_eq!(config.created_at, "2024-01-01T00:00:00Z");
        assert_eq!(config.updated_at, "2024-01-03T00:00:00Z");
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn settings_pick_up_backup_configuration() {
        let root = unique_workspace();
        let location = ConfigLocation::File(root.join("config.toml"));
        location
            .save(&AppConfig {
                db_path: "lists/todos.json".to_string(),
                backups_dir: "bak".to_string(),
                keep_backups: Some(2),
                ..AppConfig::default()
            })
            .expect("save");

        let settings =
            Settings::from_parts(location, None, None, Some(&root)).expect("settings");
        assert_eq!(settings.db_path, root.join("lists/todos.json"));
        assert_eq!(settings.db_source, PathSource::Config);
        assert_eq!(settings.backups.keep(), 2);
        assert_eq!(
            settings.backups.backup_path(&settings.db_path, 1),
            root.join("bak/todos.json.1")
        );
        let _ = std::fs::remove_dir_all(root);
    }
}
