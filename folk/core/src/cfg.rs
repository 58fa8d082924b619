use std::{
    env,
    path::{Path, PathBuf},
};

use config::{Config, ConfigBuilder, Environment, File};
use serde_json::{Map, Value};

use crate::error::FolkError;

/// Recognized configuration keys.
#[derive(Debug, Clone, Copy)]
pub struct CfgKey;

impl CfgKey {
    /// Comma-separated names of the metric databases to register.
    pub const METRIC_DB_NAMES: &'static str = "METRIC_DB_NAMES";
    /// Table of per-db blocks keyed by db name.
    pub const METRIC_DBS: &'static str = "METRIC_DBS";
    /// Backend type inside a db block.
    pub const DB_TYPE: &'static str = "TYPE";
}

/// Environment variable prefix, without its trailing `_`.
pub const ENV_PREFIX: &str = "FOLK";
/// Environment variable overriding the config directory.
pub const CFG_DIR_ENV: &str = "FOLK_CFG_DIR";
const NESTING: &str = "__";
const CFG_FILE_STEM: &str = "cfg";

type Builder = ConfigBuilder<config::builder::DefaultState>;

/// Loaded folk configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FolkConfig {
    values: Map<String, Value>,
}

impl FolkConfig {
    /// Loads the config file from `$FOLK_CFG_DIR` (or `~/.folk`) and overlays the
    /// process environment.
    pub fn load() -> Result<Self, FolkError> {
        let dir = env::var_os(CFG_DIR_ENV).map_or_else(default_dir, PathBuf::from);
        build(dir_source(Config::builder(), &dir).add_source(env_source(None)))
    }

    /// Reads the `cfg.*` file found in `dir`; an absent file yields an empty config.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, FolkError> {
        build(dir_source(Config::builder(), dir.as_ref()))
    }

    /// Reads a config file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FolkError> {
        build(Config::builder().add_source(File::from(path.as_ref()).required(true)))
    }

    /// Wraps an already parsed document, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(values) => Ok(Self {
                values: normalize(values),
            }),
            Value::Null => Ok(Self::default()),
            other => Err(format!("expected a mapping at the top level, found {other}")),
        }
    }

    /// Overlays `FOLK_`-prefixed variables; other variables are ignored.
    pub fn with_env_vars<I, K, V>(self, vars: I) -> Result<Self, FolkError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let vars: config::Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.as_ref().to_owned(), value.into()))
            .collect();
        let base = Config::try_from(&self.values)?;
        build(
            Config::builder()
                .add_source(base)
                .add_source(env_source(Some(vars))),
        )
    }

    /// Top-level value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(&key.to_ascii_uppercase())
    }

    /// Value at a nested key path; `None` as soon as a level is missing or not a mapping.
    #[must_use]
    pub fn nested(&self, path: &[&str]) -> Option<&Value> {
        let (first, rest) = path.split_first()?;
        rest.iter().try_fold(self.get(first)?, |node, key| {
            node.as_object()?.get(&key.to_ascii_uppercase())
        })
    }

    /// Names listed under `METRIC_DB_NAMES`, trimmed, empty entries dropped.
    ///
    /// Accepts a comma-separated string or a list of strings.
    #[must_use]
    pub fn metric_db_names(&self) -> Vec<String> {
        let names: Vec<&str> = match self.get(CfgKey::METRIC_DB_NAMES) {
            Some(Value::String(names)) => names.split(',').collect(),
            Some(Value::Array(names)) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        names
            .into_iter()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Configuration block of a metric db.
    #[must_use]
    pub fn metric_db_block(&self, name: &str) -> Option<&Map<String, Value>> {
        self.nested(&[CfgKey::METRIC_DBS, name])?.as_object()
    }
}

fn default_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".folk")
}

fn dir_source(builder: Builder, dir: &Path) -> Builder {
    builder.add_source(File::from(dir.join(CFG_FILE_STEM)).required(false))
}

fn env_source(vars: Option<config::Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator(NESTING)
        .source(vars)
}

fn build(builder: Builder) -> Result<FolkConfig, FolkError> {
    let values: Map<String, Value> = builder.build()?.try_deserialize()?;
    Ok(FolkConfig {
        values: normalize(values),
    })
}

/// Uppercases every key, merging mappings whose keys differ only in case.
///
/// The environment source reports lowercased keys; those are applied last so
/// they override file values.
fn normalize(values: Map<String, Value>) -> Map<String, Value> {
    let mut entries: Vec<(String, Value)> = values.into_iter().collect();
    entries.sort_by_key(|(key, _)| *key == key.to_ascii_lowercase());
    let mut normalized = Map::new();
    for (key, value) in entries {
        let value = match value {
            Value::Object(child) => Value::Object(normalize(child)),
            other => other,
        };
        merge_into(&mut normalized, key.to_ascii_uppercase(), value);
    }
    normalized
}

fn merge_into(map: &mut Map<String, Value>, key: String, value: Value) {
    match value {
        Value::Object(incoming) => {
            if let Some(Value::Object(existing)) = map.get_mut(&key) {
                for (child_key, child) in incoming {
                    merge_into(existing, child_key, child);
                }
            } else {
                map.insert(key, Value::Object(incoming));
            }
        }
        other => {
            map.insert(key, other);
        }
    }
}
