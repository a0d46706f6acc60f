//! External attribute importers.
//!
//! A metadata file maps a key (machine name, disc title or title) to a set of
//! attribute assignments. Keys are matched in that order, so an entry for a
//! specific variant beats an entry for the whole title.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use romsift_core::{Attribute, AttributeRegistry, AttributeValue, Machine};

use crate::error::CatalogError;

/// Column holding the lookup key in CSV metadata.
pub const KEY_COLUMN: &str = "name";

/// Mutates machine attributes before filtering.
pub trait MetadataSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Apply this source's attributes to a machine. Machines without an entry
    /// are left untouched.
    fn update(&self, machine: &mut Machine) -> Result<(), CatalogError>;
}

type Assignments = Vec<(Arc<dyn Attribute>, AttributeValue)>;

/// Keyed attribute assignments loaded from a file.
#[derive(Debug, Default)]
pub struct MetadataTable {
    name: String,
    entries: HashMap<String, Assignments>,
}

impl MetadataTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
        }
    }

    /// Load a JSON document of the form `{ "<key>": { "<attribute>": value } }`.
    pub fn load_json(path: &Path, registry: &AttributeRegistry) -> Result<Self, CatalogError> {
        let display = path.display().to_string();
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::io(&display, e))?;
        Self::from_json_str(&display, &contents, registry)
    }

    pub fn from_json_str(
        name: &str,
        contents: &str,
        registry: &AttributeRegistry,
    ) -> Result<Self, CatalogError> {
        let document: BTreeMap<String, serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(contents).map_err(|source| CatalogError::Json {
                path: name.to_string(),
                source,
            })?;

        let mut table = Self::new(name);
        for (key, fields) in document {
            for (attribute, value) in fields {
                table.insert(registry, &key, &attribute, json_value(value))?;
            }
        }
        Ok(table)
    }

    /// Load a CSV file with a `name` column and one column per attribute.
    /// Empty cells are skipped. Set-valued cells separate values with `|`.
    pub fn load_csv(path: &Path, registry: &AttributeRegistry) -> Result<Self, CatalogError> {
        let display = path.display().to_string();
        let contents =
            std::fs::read_to_string(path).map_err(|e| CatalogError::io(&display, e))?;
        Self::from_csv_str(&display, &contents, registry)
    }

    pub fn from_csv_str(
        name: &str,
        contents: &str,
        registry: &AttributeRegistry,
    ) -> Result<Self, CatalogError> {
        let csv_error = |source| CatalogError::Csv {
            path: name.to_string(),
            source,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());

        let headers = reader.headers().map_err(csv_error)?.clone();
        let key_index = headers
            .iter()
            .position(|h| h == KEY_COLUMN)
            .ok_or_else(|| CatalogError::metadata(name, format!("missing '{KEY_COLUMN}' column")))?;

        let mut table = Self::new(name);
        for result in reader.records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("Skipping malformed metadata row in {name}: {e}");
                    continue;
                }
            };
            let Some(key) = record.get(key_index).filter(|k| !k.is_empty()) else {
                continue;
            };
            for (i, cell) in record.iter().enumerate() {
                if i == key_index || cell.is_empty() {
                    continue;
                }
                let Some(attribute) = headers.get(i) else {
                    continue;
                };
                table.insert(registry, key, attribute, AttributeValue::Text(cell.to_string()))?;
            }
        }
        Ok(table)
    }

    /// Add one assignment, validating it against the attribute up front.
    pub fn insert(
        &mut self,
        registry: &AttributeRegistry,
        key: &str,
        attribute: &str,
        value: AttributeValue,
    ) -> Result<(), CatalogError> {
        let attribute = registry.resolve(attribute)?;
        let value = value.coerce(attribute.data_type(), attribute.rule_name())?;
        // Surfaces read-only attributes at load time rather than per machine.
        attribute.set(&mut Machine::default(), value.clone())?;
        self.entries
            .entry(key.to_string())
            .or_default()
            .push((attribute, value));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, machine: &Machine) -> Option<&Assignments> {
        [&machine.name, &machine.disc_title, &machine.title]
            .into_iter()
            .find_map(|key| self.entries.get(key.as_str()))
    }
}

impl MetadataSource for MetadataTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&self, machine: &mut Machine) -> Result<(), CatalogError> {
        let Some(assignments) = self.lookup(machine) else {
            return Ok(());
        };
        for (attribute, value) in assignments {
            attribute.set(machine, value.clone())?;
        }
        Ok(())
    }
}

fn json_value(value: serde_json::Value) -> AttributeValue {
    use serde_json::Value;
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        Value::String(s) => AttributeValue::Text(s),
        Value::Array(items) => AttributeValue::Set(items.into_iter().map(json_text).collect()),
        Value::Object(fields) => AttributeValue::Dict(
            fields
                .into_iter()
                .map(|(k, v)| (k, json_text(v)))
                .collect(),
        ),
    }
}

fn json_text(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
#[path = "tests/metadata_tests.rs"]
mod tests;
