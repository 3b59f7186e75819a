//! Project configuration (`origami.toml`)
//!
//! ```toml
//! log_level = "info"
//!
//! [project]
//! entry = "main.zy"
//!
//! [namespaces]
//! App = "./src"
//! Lib = ["./lib", "./vendor/lib"]
//!
//! [runtime]
//! max_call_depth = 10000
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use crate::error::{Error, ErrorKind};
use crate::interp::{DEFAULT_MAX_CALL_DEPTH, Vm};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default config file name, looked up next to the entry file.
pub const CONFIG_FILE: &str = "origami.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid namespace mapping `{0}`, expected NS=DIR")]
    NamespaceFlag(String),
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::new(ErrorKind::Io, err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub project: ProjectConfig,
    pub namespaces: IndexMap<String, NamespacePaths>,
    pub runtime: RuntimeConfig,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub entry: Option<PathBuf>,
}

/// One root or several, tried in order.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NamespacePaths {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl NamespacePaths {
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            NamespacePaths::One(path) => std::slice::from_ref(path),
            NamespacePaths::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_call_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Config {
    /// Load `path`. A missing file yields the default config rooted at the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config {
                root,
                ..Config::default()
            });
        }
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Config::parse(&text, root).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), namespaces = config.namespaces.len(), "config loaded");
        Ok(config)
    }

    pub fn parse(text: &str, root: PathBuf) -> Result<Config, toml::de::Error> {
        let mut config: Config = toml::from_str(text)?;
        config.root = root;
        Ok(config)
    }

    /// Add a `NS=DIR` mapping from the command line. It is tried before
    /// any root the file gives for the same namespace.
    pub fn add_namespace_flag(&mut self, flag: &str) -> Result<(), ConfigError> {
        let Some((namespace, dir)) = flag.split_once('=') else {
            return Err(ConfigError::NamespaceFlag(flag.to_string()));
        };
        let (namespace, dir) = (namespace.trim(), dir.trim());
        if namespace.is_empty() || dir.is_empty() {
            return Err(ConfigError::NamespaceFlag(flag.to_string()));
        }
        let dir = std::env::current_dir()
            .map(|cwd| cwd.join(dir))
            .unwrap_or_else(|_| PathBuf::from(dir));
        let mut paths = vec![dir];
        if let Some(existing) = self.namespaces.shift_remove(namespace) {
            paths.extend(existing.paths().iter().map(|p| self.resolve(p)));
        }
        self.namespaces
            .insert(namespace.to_string(), NamespacePaths::Many(paths));
        Ok(())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Every namespace root, resolved, in registration order.
    pub fn namespace_roots(&self) -> Vec<(String, PathBuf)> {
        self.namespaces
            .iter()
            .flat_map(|(namespace, paths)| {
                paths
                    .paths()
                    .iter()
                    .map(move |p| (namespace.clone(), self.resolve(p)))
            })
            .collect()
    }

    pub fn entry(&self) -> Option<PathBuf> {
        self.project.entry.as_deref().map(|p| self.resolve(p))
    }

    /// Register namespace roots and runtime limits with a VM.
    pub fn apply(&self, vm: &Vm) {
        for (namespace, path) in self.namespace_roots() {
            vm.class_path().add_namespace(&namespace, &path);
        }
        vm.set_max_call_depth(self.runtime.max_call_depth);
    }
}
