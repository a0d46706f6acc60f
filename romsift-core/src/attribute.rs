//! Named, typed accessors over [`Machine`] records.
//!
//! Rule and sort expressions refer to attributes by their rule name
//! (`"genres"`, `"players"`, ...). The [`AttributeRegistry`] maps those names
//! to [`Attribute`] implementations and is built once at startup, so an
//! unknown name fails configuration loading rather than per-machine
//! evaluation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::machine::{Machine, Manual};

/// Stand-in value used when a machine has no value for an attribute.
///
/// Rules only match a missing value when this sentinel is listed explicitly.
pub const NULL_SENTINEL: &str = "<none>";

/// Separator for set-valued attributes assigned from plain text.
const SET_SEPARATOR: char = '|';

/// The shape of an attribute's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Text,
    Int,
    Float,
    Bool,
    Set,
    Dict,
}

impl DataType {
    /// Whether values are case-folded before matching.
    pub fn normalizes(self) -> bool {
        !matches!(self, Self::Bool)
    }
}

/// A value read from (or assigned to) a machine attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Set(BTreeSet<String>),
    Dict(BTreeMap<String, String>),
}

impl AttributeValue {
    fn from_option_text(value: &Option<String>) -> Self {
        match value {
            Some(s) => Self::Text(s.clone()),
            None => Self::Null,
        }
    }

    fn from_set(values: &BTreeSet<String>) -> Self {
        Self::Set(values.clone())
    }

    fn from_list(values: &[String]) -> Self {
        Self::Set(values.iter().cloned().collect())
    }

    /// True for `Null`, empty text, and empty collections.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            Self::Set(s) => s.is_empty(),
            Self::Dict(d) => d.is_empty(),
            _ => false,
        }
    }

    /// The value as a list of strings for rule matching.
    ///
    /// Missing values become a single [`NULL_SENTINEL`]. Dictionaries match
    /// on their keys.
    pub fn match_values(&self) -> Vec<String> {
        if self.is_null() {
            return vec![NULL_SENTINEL.to_string()];
        }
        match self {
            Self::Null => vec![NULL_SENTINEL.to_string()],
            Self::Text(s) => vec![s.clone()],
            Self::Int(i) => vec![i.to_string()],
            Self::Float(f) => vec![f.to_string()],
            Self::Bool(b) => vec![b.to_string()],
            Self::Set(s) => s.iter().cloned().collect(),
            Self::Dict(d) => d.keys().cloned().collect(),
        }
    }

    /// Parse plain text (CSV cells, config strings) into a value of the given type.
    pub fn from_text(data_type: DataType, attribute: &str, text: &str) -> Result<Self, ConfigError> {
        Self::Text(text.to_string()).coerce(data_type, attribute)
    }

    /// Convert this value into the given data type.
    pub fn coerce(self, data_type: DataType, attribute: &str) -> Result<Self, ConfigError> {
        let invalid = |value: &Self| {
            ConfigError::invalid_value(attribute, format!("cannot use {value:?} as {data_type:?}"))
        };

        if let Self::Text(s) = &self {
            if s.trim().is_empty() {
                return Ok(Self::Null);
            }
        }

        let value = match (data_type, self) {
            (_, Self::Null) => Self::Null,
            (DataType::Text, Self::Text(s)) => Self::Text(s),
            (DataType::Text, Self::Int(i)) => Self::Text(i.to_string()),
            (DataType::Text, Self::Float(f)) => Self::Text(f.to_string()),
            (DataType::Text, Self::Bool(b)) => Self::Text(b.to_string()),
            (DataType::Int, Self::Int(i)) => Self::Int(i),
            (DataType::Int, Self::Float(f)) if f.fract() == 0.0 => Self::Int(f as i64),
            (DataType::Int, Self::Text(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Self::Int(i),
                Err(_) => return Err(invalid(&Self::Text(s))),
            },
            (DataType::Float, Self::Float(f)) => Self::Float(f),
            (DataType::Float, Self::Int(i)) => Self::Float(i as f64),
            (DataType::Float, Self::Text(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Self::Float(f),
                Err(_) => return Err(invalid(&Self::Text(s))),
            },
            (DataType::Bool, Self::Bool(b)) => Self::Bool(b),
            (DataType::Bool, Self::Int(i)) if i == 0 || i == 1 => Self::Bool(i == 1),
            (DataType::Bool, Self::Text(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Self::Bool(true),
                "false" | "no" | "0" => Self::Bool(false),
                _ => return Err(invalid(&Self::Text(s))),
            },
            (DataType::Set, Self::Set(s)) => Self::Set(s),
            (DataType::Set, Self::Text(s)) => Self::Set(
                s.split(SET_SEPARATOR)
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
            (DataType::Dict, Self::Dict(d)) => Self::Dict(d),
            (_, other) => return Err(invalid(&other)),
        };
        Ok(value)
    }

    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    fn into_int(self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i),
            _ => None,
        }
    }

    fn into_float(self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(f),
            _ => None,
        }
    }

    fn into_bool(self) -> bool {
        matches!(self, Self::Bool(true))
    }

    fn into_set(self) -> BTreeSet<String> {
        match self {
            Self::Set(s) => s,
            _ => BTreeSet::new(),
        }
    }
}

/// A named, typed accessor over machines.
pub trait Attribute: Send + Sync + fmt::Debug {
    /// The name used in rule and sort expressions.
    fn rule_name(&self) -> &str;

    fn data_type(&self) -> DataType;

    /// Read the machine's current value.
    fn get(&self, machine: &Machine) -> AttributeValue;

    /// Assign a value (used by metadata sources). Derived attributes are read-only.
    fn set(&self, _machine: &mut Machine, _value: AttributeValue) -> Result<(), ConfigError> {
        Err(ConfigError::read_only(self.rule_name()))
    }

    /// Normalize a value for comparison.
    fn normalize(&self, value: &str) -> String {
        if self.data_type().normalizes() {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    /// Whether rules on this attribute still apply to machines that matched
    /// an override rule.
    fn applies_to_overrides(&self) -> bool {
        false
    }
}

type Getter = fn(&Machine) -> AttributeValue;
type Setter = fn(&mut Machine, AttributeValue);

/// An [`Attribute`] backed by plain getter/setter functions over a machine field.
#[derive(Debug, Clone)]
pub struct FieldAttribute {
    name: &'static str,
    data_type: DataType,
    getter: Getter,
    setter: Option<Setter>,
    applies_to_overrides: bool,
}

impl FieldAttribute {
    pub fn new(name: &'static str, data_type: DataType, getter: Getter) -> Self {
        Self {
            name,
            data_type,
            getter,
            setter: None,
            applies_to_overrides: false,
        }
    }

    pub fn writable(mut self, setter: Setter) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn applying_to_overrides(mut self) -> Self {
        self.applies_to_overrides = true;
        self
    }
}

impl Attribute for FieldAttribute {
    fn rule_name(&self) -> &str {
        self.name
    }

    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn get(&self, machine: &Machine) -> AttributeValue {
        (self.getter)(machine)
    }

    fn set(&self, machine: &mut Machine, value: AttributeValue) -> Result<(), ConfigError> {
        let setter = self.setter.ok_or_else(|| ConfigError::read_only(self.name))?;
        let value = value.coerce(self.data_type, self.name)?;
        setter(machine, value);
        Ok(())
    }

    fn applies_to_overrides(&self) -> bool {
        self.applies_to_overrides
    }
}

/// Registration table from rule name to attribute.
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    attributes: Vec<Arc<dyn Attribute>>,
    index: HashMap<String, usize>,
}

impl AttributeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attribute, replacing any existing one with the same name.
    pub fn register<A: Attribute + 'static>(&mut self, attribute: A) -> &mut Self {
        let name = attribute.rule_name().to_string();
        let attribute: Arc<dyn Attribute> = Arc::new(attribute);
        match self.index.get(&name) {
            Some(&i) => self.attributes[i] = attribute,
            None => {
                self.index.insert(name, self.attributes.len());
                self.attributes.push(attribute);
            }
        }
        self
    }

    /// Look up an attribute by rule name.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Attribute>, ConfigError> {
        self.index
            .get(name)
            .map(|&i| Arc::clone(&self.attributes[i]))
            .ok_or_else(|| ConfigError::unknown_attribute(name))
    }

    /// Registered rule names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|a| a.rule_name())
    }

    /// Registry with every built-in machine attribute.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for attribute in standard_attributes() {
            registry.register(attribute);
        }
        registry
    }
}

fn standard_attributes() -> Vec<FieldAttribute> {
    use AttributeValue as V;
    use DataType::*;

    vec![
        // Identity
        FieldAttribute::new("names", Text, |m| V::Text(m.name.clone())),
        FieldAttribute::new("titles", Text, |m| V::Text(m.title.clone())),
        FieldAttribute::new("disc_titles", Text, |m| V::Text(m.disc_title.clone())),
        FieldAttribute::new("descriptions", Text, |m| V::from_option_text(&m.description))
            .writable(|m, v| m.description = v.into_text()),
        FieldAttribute::new("systems", Text, |m| V::Text(m.system.clone())),
        FieldAttribute::new("romsets", Text, |m| V::Text(m.romset.clone())),
        FieldAttribute::new("parents", Text, |m| V::from_option_text(&m.parent_name))
            .writable(|m, v| m.parent_name = v.into_text()),
        FieldAttribute::new("groups", Text, |m| V::Text(m.group_name.clone())),
        FieldAttribute::new("flags", Set, |m| V::from_list(&m.flags)),
        FieldAttribute::new("regions", Set, |m| V::from_list(&m.regions)),
        FieldAttribute::new("revisions", Text, |m| V::from_option_text(&m.revision)),
        FieldAttribute::new("dump_statuses", Text, |m| {
            V::Text(m.dump_status.as_str().to_string())
        }),
        // Machine kind
        FieldAttribute::new("bios", Bool, |m| V::Bool(m.is_bios)).applying_to_overrides(),
        FieldAttribute::new("devices", Bool, |m| V::Bool(m.is_device)).applying_to_overrides(),
        FieldAttribute::new("runnable", Bool, |m| V::Bool(m.runnable))
            .applying_to_overrides()
            .writable(|m, v| m.runnable = v.into_bool()),
        FieldAttribute::new("mechanical", Bool, |m| V::Bool(m.mechanical))
            .writable(|m, v| m.mechanical = v.into_bool()),
        FieldAttribute::new("clones", Bool, |m| V::Bool(m.is_clone())),
        FieldAttribute::new("favorites", Bool, |m| V::Bool(m.favorite))
            .writable(|m, v| m.favorite = v.into_bool()),
        // Descriptive metadata
        FieldAttribute::new("categories", Text, |m| V::from_option_text(&m.category))
            .writable(|m, v| m.category = v.into_text()),
        FieldAttribute::new("controls", Set, |m| V::from_set(&m.controls))
            .writable(|m, v| m.controls = v.into_set()),
        FieldAttribute::new("players", Int, |m| m.players.map_or(V::Null, V::Int))
            .writable(|m, v| m.players = v.into_int()),
        FieldAttribute::new("ratings", Float, |m| m.rating.map_or(V::Null, V::Float))
            .writable(|m, v| m.rating = v.into_float()),
        FieldAttribute::new("genres", Set, |m| V::from_set(&m.genres))
            .writable(|m, v| m.genres = v.into_set()),
        FieldAttribute::new("languages", Set, |m| V::from_set(&m.languages))
            .writable(|m, v| {
                m.languages = v.into_set().into_iter().map(|l| l.to_lowercase()).collect()
            }),
        FieldAttribute::new("emulators", Text, |m| V::from_option_text(&m.emulator))
            .writable(|m, v| m.emulator = v.into_text()),
        FieldAttribute::new("emulator_ratings", Int, |m| {
            m.emulator_rating.map_or(V::Null, V::Int)
        })
        .writable(|m, v| m.emulator_rating = v.into_int()),
        FieldAttribute::new("years", Int, |m| m.year.map_or(V::Null, V::Int))
            .writable(|m, v| m.year = v.into_int()),
        FieldAttribute::new("developers", Set, |m| V::from_set(&m.developers))
            .writable(|m, v| m.developers = v.into_set()),
        FieldAttribute::new("publishers", Set, |m| V::from_set(&m.publishers))
            .writable(|m, v| m.publishers = v.into_set()),
        FieldAttribute::new("tags", Set, |m| V::from_set(&m.tags))
            .writable(|m, v| m.tags = v.into_set()),
        FieldAttribute::new("collections", Set, |m| V::from_set(&m.collections))
            .writable(|m, v| m.collections = v.into_set()),
        FieldAttribute::new("orientations", Text, |m| V::from_option_text(&m.orientation))
            .writable(|m, v| m.orientation = v.into_text()),
        FieldAttribute::new("manuals", Dict, |m| match &m.manual {
            Some(manual) => V::Dict(manual.urls.clone()),
            None => V::Null,
        })
        .writable(|m, v| {
            m.manual = match v {
                V::Dict(urls) if !urls.is_empty() => Some(Manual { urls, format: None }),
                _ => None,
            }
        }),
    ]
}

#[cfg(test)]
#[path = "tests/attribute_tests.rs"]
mod tests;
