//! Configuration file loading.
//!
//! The config is TOML. Rule and sort expression maps keep their declared
//! order, which matters for sort precedence. `[defaults]` is layered under
//! every `[systems.<name>]` table: a system entry replaces the inherited
//! entry for the same expression unless its key ends in `|union`, in which
//! case its values are appended to the inherited ones.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use romsift_catalog::GroupOverrides;
use romsift_core::ConfigError;
use romsift_filter::{Expression, SortSpec};
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "ROMSIFT_CONFIG";

/// Expression key → configured values, in declaration order.
pub type ExpressionMap = Vec<(String, Vec<String>)>;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{context}: {message}")]
    Invalid { context: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ConfigLoadError {
    pub fn invalid(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Path of the config file:
///
/// 1. CLI override (if `Some`)
/// 2. `ROMSIFT_CONFIG`
/// 3. `<config dir>/romsift/config.toml`
pub fn config_path(cli_override: Option<PathBuf>) -> PathBuf {
    if let Some(p) = cli_override {
        return p;
    }
    if let Some(p) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(p);
    }
    let config = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    config.join("romsift").join("config.toml")
}

/// Global run settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub workers: usize,
    /// Install attempts per machine.
    pub retries: usize,
    pub retry_delay_secs: u64,
    pub connect_timeout_secs: u64,
    pub download_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: 4,
            retries: 3,
            retry_delay_secs: 2,
            connect_timeout_secs: 30,
            download_dir: None,
        }
    }
}

impl Settings {
    /// Where downloads go when no directory is configured.
    pub fn download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("romsift")
                .join("downloads")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataKind {
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetadataConfig {
    pub kind: MetadataKind,
    pub path: PathBuf,
}

/// How machines are grouped and ranked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorityConfig {
    /// Attribute keying a group; the resolved group when unset.
    pub group_by: Option<String>,
    /// Sort expressions, highest precedence first.
    pub order: Vec<(String, SortSpec)>,
}

/// One catalog and where its machines are installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomsetConfig {
    pub name: String,
    pub catalog: PathBuf,
    /// Resource template to fetch from.
    pub source: Option<String>,
    /// Installed path template.
    pub target: String,
    pub install: String,
    pub filters: ExpressionMap,
}

/// A directory of symlinks to installed machines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirConfig {
    pub path: PathBuf,
    pub file: String,
    pub relative: bool,
    pub filters: ExpressionMap,
}

#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    pub name: String,
    pub filters: ExpressionMap,
    pub favorites: ExpressionMap,
    pub priority: PriorityConfig,
    pub groups: GroupOverrides,
    pub romsets: Vec<RomsetConfig>,
    pub metadata: Vec<MetadataConfig>,
    pub dirs: Vec<DirConfig>,
}

/// A loaded config file, with defaults already layered into each system.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub settings: Settings,
    pub systems: Vec<SystemConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    settings: Settings,
    #[serde(default)]
    defaults: RawSystem,
    #[serde(default)]
    systems: toml::Table,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawSystem {
    filters: toml::Table,
    favorites: toml::Table,
    priority: RawPriority,
    groups: GroupOverrides,
    romsets: Vec<RawRomset>,
    metadata: Vec<MetadataConfig>,
    dirs: Vec<RawDir>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawPriority {
    group_by: Option<String>,
    order: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRomset {
    name: String,
    catalog: PathBuf,
    #[serde(default)]
    source: Option<String>,
    target: String,
    #[serde(default = "default_action")]
    install: String,
    #[serde(default)]
    filters: toml::Table,
}

fn default_action() -> String {
    crate::install::DEFAULT_ACTION.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDir {
    path: PathBuf,
    file: String,
    #[serde(default)]
    relative: bool,
    #[serde(default)]
    filters: toml::Table,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = contents.parse()?;
        log::debug!(
            "Loaded {} system(s) from {}",
            config.systems.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn system(&self, name: &str) -> Option<&SystemConfig> {
        self.systems.iter().find(|s| s.name == name)
    }
}

impl FromStr for Config {
    type Err = ConfigLoadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: RawConfig = toml::from_str(s)?;
        let defaults = convert_system("defaults", raw.defaults)?;

        let systems = raw
            .systems
            .into_iter()
            .map(|(name, value)| {
                let context = format!("systems.{name}");
                let system: RawSystem = value
                    .try_into()
                    .map_err(|e: toml::de::Error| ConfigLoadError::invalid(&context, e.to_string()))?;
                let system = convert_system(&context, system)?;
                Ok(layer(&defaults, system, name))
            })
            .collect::<Result<Vec<_>, ConfigLoadError>>()?;

        Ok(Self {
            settings: raw.settings,
            systems,
        })
    }
}

fn convert_system(context: &str, raw: RawSystem) -> Result<SystemConfig, ConfigLoadError> {
    let romsets = raw
        .romsets
        .into_iter()
        .map(|r| {
            let filters_context = format!("{context}.romsets.{}.filters", r.name);
            Ok(RomsetConfig {
                filters: expression_map(&filters_context, &r.filters)?,
                name: r.name,
                catalog: r.catalog,
                source: r.source,
                target: r.target,
                install: r.install,
            })
        })
        .collect::<Result<Vec<_>, ConfigLoadError>>()?;

    let dirs = raw
        .dirs
        .into_iter()
        .map(|d| {
            Ok(DirConfig {
                filters: expression_map(
                    &format!("{context}.dirs.{}.filters", d.path.display()),
                    &d.filters,
                )?,
                path: d.path,
                file: d.file,
                relative: d.relative,
            })
        })
        .collect::<Result<Vec<_>, ConfigLoadError>>()?;

    let order = raw
        .priority
        .order
        .into_iter()
        .map(|(key, value)| {
            let spec: SortSpec = value.try_into().map_err(|e: toml::de::Error| {
                ConfigLoadError::invalid(format!("{context}.priority.order.{key}"), e.to_string())
            })?;
            Ok((key, spec))
        })
        .collect::<Result<Vec<_>, ConfigLoadError>>()?;

    Ok(SystemConfig {
        name: String::new(),
        filters: expression_map(&format!("{context}.filters"), &raw.filters)?,
        favorites: expression_map(&format!("{context}.favorites"), &raw.favorites)?,
        priority: PriorityConfig {
            group_by: raw.priority.group_by,
            order,
        },
        groups: raw.groups,
        romsets,
        metadata: raw.metadata,
        dirs,
    })
}

/// Convert a TOML table of `expression = value | [values]`.
fn expression_map(context: &str, table: &toml::Table) -> Result<ExpressionMap, ConfigLoadError> {
    table
        .iter()
        .map(|(key, value)| {
            let convert = |v: &toml::Value| {
                scalar(v).ok_or_else(|| {
                    ConfigLoadError::invalid(format!("{context}.{key}"), format!("unsupported value {v}"))
                })
            };
            let values = match value {
                toml::Value::Array(items) => items.iter().map(convert).collect::<Result<Vec<_>, _>>()?,
                other => vec![convert(other)?],
            };
            Ok((key.clone(), values))
        })
        .collect()
}

fn scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Layer `overlay` on top of `base`. Entries are matched by expression with
/// any `|union` suffix removed.
pub fn merge_expressions(base: &ExpressionMap, overlay: &ExpressionMap) -> ExpressionMap {
    let mut merged = base.clone();
    for (key, values) in overlay {
        let base_key = Expression::base_key(key);
        let existing = merged
            .iter_mut()
            .find(|(k, _)| Expression::base_key(k) == base_key);
        match existing {
            Some((_, inherited)) if key.ends_with(romsift_filter::UNION_SUFFIX) => {
                for value in values {
                    if !inherited.contains(value) {
                        inherited.push(value.clone());
                    }
                }
            }
            Some(entry) => *entry = (key.clone(), values.clone()),
            None => merged.push((key.clone(), values.clone())),
        }
    }
    merged
}

fn layer(defaults: &SystemConfig, system: SystemConfig, name: String) -> SystemConfig {
    let mut order = defaults.priority.order.clone();
    for (key, spec) in system.priority.order {
        match order.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = spec,
            None => order.push((key, spec)),
        }
    }

    let mut groups = defaults.groups.clone();
    groups.merge.extend(system.groups.merge);
    groups.split.extend(system.groups.split);

    let mut metadata = defaults.metadata.clone();
    metadata.extend(system.metadata);

    SystemConfig {
        name,
        filters: merge_expressions(&defaults.filters, &system.filters),
        favorites: merge_expressions(&defaults.favorites, &system.favorites),
        priority: PriorityConfig {
            group_by: system.priority.group_by.or_else(|| defaults.priority.group_by.clone()),
            order,
        },
        groups,
        romsets: system.romsets,
        metadata,
        dirs: system.dirs,
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
