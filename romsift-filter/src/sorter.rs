//! Composite sort keys for ranking machines within a group.
//!
//! Each configured entry binds an attribute to either a priority list of
//! values (rank is the position of the first match) or a natural ordering of
//! the raw value. Entries are combined in declared order: the first entry has
//! the highest precedence, later ones only break ties.
//!
//! Missing values always sort last, whatever the direction.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::sync::Arc;

use romsift_core::{Attribute, AttributeRegistry, AttributeValue, ConfigError, Machine};
use serde::Deserialize;

use crate::expression::{Expression, Transform};
use crate::rule::{MatchType, Rule};

/// Direction of a natural ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// The right-hand side of a sort expression: a direction or a priority list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SortSpec {
    Order(SortOrder),
    Values(Vec<String>),
}

/// A single comparable value extracted from a machine.
#[derive(Debug, Clone)]
pub enum SortValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl SortValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Float(_) => 2,
            Self::Text(_) => 3,
        }
    }
}

impl Ord for SortValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).total_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for SortValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortValue {}

/// One position of a [`SortKey`]: an optional value and its direction.
///
/// `None` sorts after every value in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortComponent {
    pub value: Option<SortValue>,
    pub descending: bool,
}

impl Ord for SortComponent {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.value, &other.value) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) if self.descending => b.cmp(a),
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for SortComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A machine's composite key. Smaller keys are better.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey(pub Vec<SortComponent>);

#[derive(Debug, Clone)]
enum Strategy {
    /// Position of the first matching value; unmatched machines sort last.
    Priority(Rule),
    /// Number of matching values, most matches first.
    Count(Rule),
    /// The attribute's own value.
    Natural,
}

/// Ranks machines by one attribute.
#[derive(Debug, Clone)]
pub struct Sorter {
    attribute: Arc<dyn Attribute>,
    strategy: Strategy,
    descending: bool,
}

impl Sorter {
    /// Build a sorter from an expression key and its spec.
    ///
    /// `!` reverses the direction. Override modifiers and transforms applied
    /// to a natural ordering are rejected.
    pub fn new(
        registry: &AttributeRegistry,
        expression: &Expression,
        spec: &SortSpec,
    ) -> Result<Self, ConfigError> {
        if expression.override_rule {
            return Err(ConfigError::invalid_expression(expression.to_string()));
        }
        let attribute = registry.resolve(&expression.rule_name)?;

        let (strategy, descending) = match (spec, expression.transform) {
            (SortSpec::Values(values), None) => {
                let rule = Rule::new(Arc::clone(&attribute), values, MatchType::Substring)?;
                (Strategy::Priority(rule), false)
            }
            (SortSpec::Values(values), Some(Transform::Count)) => {
                let rule = Rule::new(Arc::clone(&attribute), values, MatchType::Substring)?;
                (Strategy::Count(rule), true)
            }
            (SortSpec::Order(order), None) => (Strategy::Natural, *order == SortOrder::Descending),
            (SortSpec::Order(_), Some(_)) => {
                return Err(ConfigError::invalid_expression(expression.to_string()));
            }
        };

        Ok(Self {
            attribute,
            strategy,
            descending: descending != expression.invert,
        })
    }

    pub fn attribute(&self) -> &Arc<dyn Attribute> {
        &self.attribute
    }

    /// This sorter's key component for a machine.
    pub fn component(&self, machine: &Machine) -> SortComponent {
        let value = match &self.strategy {
            Strategy::Priority(rule) => {
                let index = rule.first_match_index(machine);
                (index < rule.len()).then(|| SortValue::Int(index as i64))
            }
            Strategy::Count(rule) => Some(SortValue::Int(rule.count_matches(machine) as i64)),
            Strategy::Natural => self.natural_value(machine),
        };
        SortComponent {
            value,
            descending: self.descending,
        }
    }

    fn natural_value(&self, machine: &Machine) -> Option<SortValue> {
        let value = self.attribute.get(machine);
        if value.is_null() {
            return None;
        }
        match value {
            AttributeValue::Null => None,
            AttributeValue::Text(s) => Some(SortValue::Text(self.attribute.normalize(&s))),
            AttributeValue::Int(i) => Some(SortValue::Int(i)),
            AttributeValue::Float(f) => Some(SortValue::Float(f)),
            AttributeValue::Bool(b) => Some(SortValue::Bool(b)),
            AttributeValue::Set(s) => Some(SortValue::Int(s.len() as i64)),
            AttributeValue::Dict(d) => Some(SortValue::Int(d.len() as i64)),
        }
    }
}

/// An ordered list of sorters applied as one multi-key stable sort.
#[derive(Debug, Clone, Default)]
pub struct CompositeSorter {
    sorters: Vec<Sorter>,
}

impl CompositeSorter {
    pub fn new(sorters: Vec<Sorter>) -> Self {
        Self { sorters }
    }

    /// Build from `expression → spec` pairs in declared order. Disabled
    /// expressions are skipped.
    pub fn from_expressions<'a, I, S>(
        registry: &AttributeRegistry,
        entries: I,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, S)>,
        S: Borrow<SortSpec>,
    {
        let mut sorters = Vec::new();
        for (key, spec) in entries {
            let expression: Expression = key.parse()?;
            if expression.disabled {
                log::debug!("Skipping disabled sorter {key}");
                continue;
            }
            sorters.push(Sorter::new(registry, &expression, spec.borrow())?);
        }
        Ok(Self { sorters })
    }

    pub fn sorters(&self) -> &[Sorter] {
        &self.sorters
    }

    pub fn is_empty(&self) -> bool {
        self.sorters.is_empty()
    }

    pub fn sort_key(&self, machine: &Machine) -> SortKey {
        SortKey(self.sorters.iter().map(|s| s.component(machine)).collect())
    }

    pub fn compare(&self, a: &Machine, b: &Machine) -> Ordering {
        self.sort_key(a).cmp(&self.sort_key(b))
    }

    /// Stable sort, best machine first. Machines with equal keys keep their
    /// input order.
    pub fn sort<M: Borrow<Machine>>(&self, machines: &mut [M]) {
        machines.sort_by_cached_key(|m| self.sort_key(m.borrow()));
    }
}

#[cfg(test)]
#[path = "tests/sorter_tests.rs"]
mod tests;
