//! # sgnconfig - Configuration du terminal d'affichage
//!
//! Un fichier `config.yaml` par terminal, superposé à la configuration par
//! défaut embarquée (`signage.yaml`), puis aux variables d'environnement
//! `SGN_CONFIG__SECTION__CLE=valeur`.
//!
//! Le répertoire de configuration est, dans l'ordre : celui passé à
//! [`Config::load_config`], la variable `SGN_CONFIG`, `.signage` dans le
//! répertoire courant, puis `~/.signage`.
//!
//! Chaque crate fonctionnelle (cache, playlist, sync, player) ajoute ses
//! réglages via un trait d'extension dans son `config_ext.rs`.
//!
//! ```no_run
//! use sgnconfig::get_config;
//!
//! let config = get_config();
//! let level = config.get_log_min_level()?;
//! let name = config.get_terminal_name()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod tree;

use anyhow::{bail, Context, Result};
use lazy_static::lazy_static;
use serde_yaml::{Number, Value};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_CONFIG: &str = include_str!("signage.yaml");
const CONFIG_FILE: &str = "config.yaml";
const DEFAULT_DIR_NAME: &str = ".signage";

const ENV_CONFIG_DIR: &str = "SGN_CONFIG";
const ENV_PREFIX: &str = "SGN_CONFIG__";

const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";
const DEFAULT_LOG_ENABLE_CONSOLE: bool = true;
const DEFAULT_TERMINAL_NAME: &str = "signage-terminal";

lazy_static! {
    static ref CONFIG: Arc<Config> =
        Arc::new(Config::load_config("").expect("Failed to load signage configuration"));
}

/// Génère le couple getter/setter d'un booléen avec valeur par défaut
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            Ok(self.get_bool_or($path, $default))
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// Configuration d'un terminal
///
/// Toute modification passe par [`Config::set_value`] et est réécrite
/// immédiatement dans `config.yaml`.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: PathBuf,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.tree().clone()),
        }
    }
}

impl Config {
    fn locate_dir(directory: &str) -> PathBuf {
        if !directory.is_empty() {
            return PathBuf::from(directory);
        }
        if let Ok(from_env) = env::var(ENV_CONFIG_DIR) {
            info!(env_var = ENV_CONFIG_DIR, path = %from_env, "Config directory taken from env");
            return PathBuf::from(from_env);
        }

        let local = Path::new(DEFAULT_DIR_NAME);
        if local.exists() {
            return local.to_path_buf();
        }
        dirs::home_dir()
            .map(|home| home.join(DEFAULT_DIR_NAME))
            .filter(|candidate| candidate.exists())
            .unwrap_or_else(|| local.to_path_buf())
    }

    fn ensure_writable(dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create config directory {}", dir.display()))?;
        if !dir.is_dir() {
            bail!("{} is not a directory", dir.display());
        }

        let marker = dir.join(".write_test");
        fs::write(&marker, b"ok")
            .with_context(|| format!("Config directory {} is not writable", dir.display()))?;
        fs::remove_file(&marker)?;
        Ok(())
    }

    /// Détermine le répertoire de configuration et vérifie qu'il est utilisable
    pub fn config_dir(directory: &str) -> Result<String> {
        let dir = Self::locate_dir(directory);
        Self::ensure_writable(&dir)?;
        Ok(dir.to_string_lossy().into_owned())
    }

    /// Charge la configuration et la réécrit, complétée, sur disque
    ///
    /// `directory` vide : recherche du répertoire par défaut.
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::config_dir(directory)?;
        let path = Path::new(&config_dir).join(CONFIG_FILE);
        info!(config_dir = %config_dir, "Using config directory");

        let mut data = tree::lowercase_keys(serde_yaml::from_str(DEFAULT_CONFIG)?);
        match fs::read_to_string(&path) {
            Ok(text) => {
                info!(config_file = %path.display(), "Loaded config file");
                let external: Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("Invalid YAML in {}", path.display()))?;
                if !external.is_null() {
                    tree::overlay(&mut data, tree::lowercase_keys(external));
                }
            }
            Err(_) => info!(config_file = %path.display(), "No config file yet, using defaults"),
        }
        tree::apply_env(&mut data, ENV_PREFIX, env::vars());

        let config = Config {
            config_dir,
            path,
            data: Mutex::new(data),
        };
        config.save()?;
        Ok(config)
    }

    fn tree(&self) -> MutexGuard<'_, Value> {
        self.data.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Répertoire contenant `config.yaml`
    pub fn directory(&self) -> &str {
        &self.config_dir
    }

    /// Réécrit `config.yaml`
    pub fn save(&self) -> Result<()> {
        let yaml = serde_yaml::to_string(&*self.tree())?;
        fs::write(&self.path, yaml)
            .with_context(|| format!("Cannot write {}", self.path.display()))?;
        Ok(())
    }

    /// Modifie une valeur (ex: `&["player", "stall_tick_ms"]`) et sauvegarde
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        tree::assign(&mut self.tree(), path, value)?;
        debug!(path = %path.join("."), "Config value updated");
        self.save()
    }

    /// Lit une valeur, erreur si le chemin n'existe pas
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        tree::lookup(&self.tree(), path).cloned()
    }

    /// Lit un entier positif, avec repli sur `default` si absent ou mal typé
    ///
    /// Les chaînes numériques (issues des variables d'environnement) sont acceptées.
    pub fn get_u64_or(&self, path: &[&str], default: u64) -> u64 {
        match self.get_value(path) {
            Ok(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Ok(Value::String(s)) => s.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(path = %path.join("."), value = %s, "Invalid integer, using default {}", default);
                default
            }),
            _ => default,
        }
    }

    pub fn set_u64(&self, path: &[&str], value: u64) -> Result<()> {
        self.set_value(path, Value::Number(Number::from(value)))
    }

    pub fn get_bool_or(&self, path: &[&str], default: bool) -> bool {
        match self.get_value(path) {
            Ok(Value::Bool(b)) => b,
            _ => default,
        }
    }

    pub fn get_string_or(&self, path: &[&str], default: &str) -> String {
        match self.get_value(path) {
            Ok(Value::String(s)) => s,
            _ => default.to_string(),
        }
    }

    /// Lit une liste de chaînes, les éléments non textuels sont ignorés
    pub fn get_string_list_or(&self, path: &[&str], default: &[&str]) -> Vec<String> {
        match self.get_value(path) {
            Ok(Value::Sequence(items)) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => default.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Répertoire géré par la configuration, créé au besoin
    ///
    /// Un chemin relatif est résolu depuis le répertoire de configuration.
    /// Si la clé est absente, `default` y est enregistré.
    ///
    /// ```no_run
    /// use sgnconfig::get_config;
    ///
    /// let config = get_config();
    /// let cache_dir = config.get_managed_dir(&["cache", "directory"], "media_cache")?;
    /// println!("Media cache directory: {}", cache_dir);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn get_managed_dir(&self, path: &[&str], default: &str) -> Result<String> {
        let configured = match self.get_value(path) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => {
                self.set_managed_dir(path, default.to_string())?;
                default.to_string()
            }
        };

        let configured = Path::new(&configured);
        let dir = if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(configured)
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(directory = %dir.display(), "Created managed directory");
        }
        Ok(dir.to_string_lossy().into_owned())
    }

    pub fn set_managed_dir(&self, path: &[&str], directory: String) -> Result<()> {
        self.set_value(path, Value::String(directory))
    }

    /// Nom lisible du terminal (logs et rapport de diagnostic)
    pub fn get_terminal_name(&self) -> Result<String> {
        Ok(self.get_string_or(&["terminal", "name"], DEFAULT_TERMINAL_NAME))
    }

    /// Identifiant stable du terminal, généré au premier appel
    pub fn get_terminal_id(&self) -> Result<String> {
        let path = &["terminal", "id"];
        if let Ok(Value::String(id)) = self.get_value(path) {
            let id = id.trim();
            if !id.is_empty() {
                return Ok(id.to_string());
            }
        }
        let id = Uuid::new_v4().to_string();
        self.set_value(path, Value::String(id.clone()))?;
        Ok(id)
    }

    impl_bool_config!(
        get_log_enable_console,
        set_log_enable_console,
        &["host", "logger", "enable_console"],
        DEFAULT_LOG_ENABLE_CONSOLE
    );

    pub fn get_log_min_level(&self) -> Result<String> {
        Ok(self.get_string_or(&["host", "logger", "min_level"], DEFAULT_LOG_MIN_LEVEL))
    }

    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Configuration globale, chargée au premier accès
pub fn get_config() -> Arc<Config> {
    CONFIG.clone()
}
