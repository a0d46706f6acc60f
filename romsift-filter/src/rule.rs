//! A single match expression bound to one attribute.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use regex::Regex;
use romsift_core::{Attribute, ConfigError, Machine};

/// Values starting with this marker are ignored.
pub const COMMENT_MARKER: char = '#';

/// Values starting with this marker are compiled as regular expressions.
pub const REGEX_MARKER: char = '/';

/// How plain (non-regex) values are compared against machine values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    /// The machine value must equal the rule value.
    #[default]
    Exact,
    /// The machine value must contain the rule value.
    Substring,
}

#[derive(Debug, Clone)]
enum RuleValue {
    Exact(String),
    Substring(String),
    Pattern(Regex),
}

impl RuleValue {
    fn is_match(&self, value: &str) -> bool {
        match self {
            Self::Exact(v) => v == value,
            Self::Substring(v) => value.contains(v.as_str()),
            Self::Pattern(re) => re.is_match(value),
        }
    }
}

/// Matches machines whose attribute value is in (or matches) a list of values.
#[derive(Debug, Clone)]
pub struct Rule {
    attribute: Arc<dyn Attribute>,
    match_type: MatchType,
    /// Values in configured order, for priority ranking.
    values: Vec<RuleValue>,
    /// Exact values for set-intersection lookups.
    exact: HashSet<String>,
    invert: bool,
    override_rule: bool,
    enabled: bool,
}

impl Rule {
    /// Build a rule from raw configured values.
    ///
    /// Comment values are dropped; regex values are compiled once here, so an
    /// invalid pattern is reported before any machine is evaluated.
    pub fn new<S: AsRef<str>>(
        attribute: Arc<dyn Attribute>,
        values: &[S],
        match_type: MatchType,
    ) -> Result<Self, ConfigError> {
        let mut rule = Self {
            attribute,
            match_type,
            values: Vec::new(),
            exact: HashSet::new(),
            invert: false,
            override_rule: false,
            enabled: true,
        };
        rule.extend_values(values)?;
        Ok(rule)
    }

    pub fn inverted(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    pub fn overriding(mut self, override_rule: bool) -> Self {
        self.override_rule = override_rule;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn attribute(&self) -> &Arc<dyn Attribute> {
        &self.attribute
    }

    pub fn is_inverted(&self) -> bool {
        self.invert
    }

    pub fn is_override(&self) -> bool {
        self.override_rule
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of configured (non-comment) values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether `other` targets the same attribute with the same modifiers,
    /// in which case the two are merged rather than kept as separate rules.
    pub fn same_slot(&self, other: &Rule) -> bool {
        self.attribute.rule_name() == other.attribute.rule_name()
            && self.invert == other.invert
            && self.override_rule == other.override_rule
            && self.match_type == other.match_type
    }

    /// Union another rule's values into this one.
    pub fn merge(&mut self, other: Rule) {
        for value in other.values {
            if let RuleValue::Exact(v) = &value {
                if !self.exact.insert(v.clone()) {
                    continue;
                }
            }
            self.values.push(value);
        }
    }

    fn extend_values<S: AsRef<str>>(&mut self, values: &[S]) -> Result<(), ConfigError> {
        for raw in values {
            let raw = raw.as_ref().trim();
            if raw.is_empty() || raw.starts_with(COMMENT_MARKER) {
                continue;
            }

            let value = if let Some(pattern) = raw.strip_prefix(REGEX_MARKER) {
                let source = if self.attribute.data_type().normalizes() {
                    format!("(?i){pattern}")
                } else {
                    pattern.to_string()
                };
                let re = Regex::new(&source).map_err(|e| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source: e,
                })?;
                RuleValue::Pattern(re)
            } else {
                let normalized = self.attribute.normalize(raw);
                match self.match_type {
                    MatchType::Exact => {
                        if !self.exact.insert(normalized.clone()) {
                            continue;
                        }
                        RuleValue::Exact(normalized)
                    }
                    MatchType::Substring => RuleValue::Substring(normalized),
                }
            };
            self.values.push(value);
        }
        Ok(())
    }

    /// The machine's normalized values for this rule's attribute.
    fn machine_values(&self, machine: &Machine) -> Vec<String> {
        self.attribute
            .get(machine)
            .match_values()
            .iter()
            .map(|v| self.attribute.normalize(v))
            .collect()
    }

    fn value_matches(&self, value: &str) -> bool {
        self.exact.contains(value)
            || self
                .values
                .iter()
                .any(|v| !matches!(v, RuleValue::Exact(_)) && v.is_match(value))
    }

    /// Whether the machine matches, with inversion applied.
    pub fn matches(&self, machine: &Machine) -> bool {
        let hit = self
            .machine_values(machine)
            .iter()
            .any(|v| self.value_matches(v));
        hit != self.invert
    }

    /// The machine values (normalized) that matched any rule value.
    pub fn find_matches(&self, machine: &Machine) -> BTreeSet<String> {
        self.machine_values(machine)
            .into_iter()
            .filter(|v| self.value_matches(v))
            .collect()
    }

    /// Number of machine values that matched.
    pub fn count_matches(&self, machine: &Machine) -> usize {
        self.find_matches(machine).len()
    }

    /// Position of the first configured value the machine matches, or
    /// `self.len()` when none match.
    pub fn first_match_index(&self, machine: &Machine) -> usize {
        let machine_values = self.machine_values(machine);
        self.values
            .iter()
            .position(|rule_value| machine_values.iter().any(|v| rule_value.is_match(v)))
            .unwrap_or(self.values.len())
    }
}

#[cfg(test)]
#[path = "tests/rule_tests.rs"]
mod tests;
