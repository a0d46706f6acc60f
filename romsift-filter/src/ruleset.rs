//! Ordered collections of rules with AND/override semantics.

use romsift_core::{AttributeRegistry, ConfigError, Machine};
use serde::Serialize;

use crate::expression::Expression;
use crate::rule::{MatchType, Rule};

/// Override rules on this attribute select a machine outright.
pub const NAME_ATTRIBUTE: &str = "names";

/// Why a machine passed a ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterReason {
    /// Every applicable rule matched.
    Allow,
    /// A name override matched; the machine is forced in and wins its group.
    Override,
}

/// Regular rules (all must match) plus override rules (any may match).
#[derive(Debug, Clone)]
pub struct Ruleset {
    rules: Vec<Rule>,
    overrides: Vec<Rule>,
    default_reason: Option<FilterReason>,
}

impl Default for Ruleset {
    fn default() -> Self {
        Self::new()
    }
}

impl Ruleset {
    /// An empty ruleset that allows everything.
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            overrides: Vec::new(),
            default_reason: Some(FilterReason::Allow),
        }
    }

    /// Set the result returned when the ruleset has no rules at all.
    pub fn with_default(mut self, reason: Option<FilterReason>) -> Self {
        self.default_reason = reason;
        self
    }

    /// Build a ruleset from `expression → values` pairs.
    ///
    /// Disabled expressions are skipped. Expressions resolving to the same
    /// attribute and modifiers are merged.
    pub fn from_expressions<'a, I, V>(
        registry: &AttributeRegistry,
        entries: I,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a str, V)>,
        V: AsRef<[String]>,
    {
        let mut ruleset = Self::new();
        for (key, values) in entries {
            let expr: Expression = key.parse()?;
            if expr.transform.is_some() {
                return Err(ConfigError::invalid_expression(key));
            }
            let attribute = registry.resolve(&expr.rule_name)?;
            let rule = Rule::new(attribute, values.as_ref(), MatchType::Exact)?
                .inverted(expr.invert)
                .overriding(expr.override_rule)
                .enabled(!expr.disabled);
            ruleset.add(rule);
        }
        Ok(ruleset)
    }

    /// Add a rule, merging it into an existing rule for the same slot.
    /// Disabled rules are ignored.
    pub fn add(&mut self, rule: Rule) {
        if !rule.is_enabled() {
            log::debug!("Skipping disabled rule on {}", rule.attribute().rule_name());
            return;
        }

        let target = if rule.is_override() {
            &mut self.overrides
        } else {
            &mut self.rules
        };

        match target.iter_mut().find(|r| r.same_slot(&rule)) {
            Some(existing) => existing.merge(rule),
            None => target.push(rule),
        }

        // Small value sets first: they tend to be the most discriminating.
        // AND is order-independent, so this only affects speed.
        self.rules.sort_by_key(Rule::len);
    }

    /// Merge every rule of `other` into this ruleset.
    pub fn extend(&mut self, other: Ruleset) {
        for rule in other.overrides.into_iter().chain(other.rules) {
            self.add(rule);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.overrides.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn overrides(&self) -> &[Rule] {
        &self.overrides
    }

    /// Evaluate a machine.
    ///
    /// Returns `None` when the machine is excluded. A matching override lets
    /// the machine skip every rule whose attribute doesn't apply to overrides.
    /// Only a match on [`NAME_ATTRIBUTE`] yields [`FilterReason::Override`];
    /// any other override match yields [`FilterReason::Allow`].
    pub fn evaluate(&self, machine: &Machine) -> Option<FilterReason> {
        if self.is_empty() {
            return self.default_reason;
        }

        let mut override_matched = false;
        let mut name_override = false;
        for rule in &self.overrides {
            if rule.matches(machine) {
                override_matched = true;
                if rule.attribute().rule_name() == NAME_ATTRIBUTE {
                    name_override = true;
                    break;
                }
            }
        }

        let allowed = self.rules.iter().all(|rule| {
            (override_matched && !rule.attribute().applies_to_overrides()) || rule.matches(machine)
        });

        if !allowed {
            None
        } else if name_override {
            Some(FilterReason::Override)
        } else {
            Some(FilterReason::Allow)
        }
    }
}

#[cfg(test)]
#[path = "tests/ruleset_tests.rs"]
mod tests;
