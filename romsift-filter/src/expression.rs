//! Parsing of rule and sort expression keys.
//!
//! ```text
//! [modifiers]<rule_name>[:<transform>][|union]
//! ```
//!
//! Modifiers may appear in any order:
//! - `~` disables the rule (it is dropped when the ruleset is built)
//! - `!` inverts the match
//! - `+` makes the rule an override
//!
//! The `|union` suffix only affects configuration layering (values are
//! appended to inherited ones instead of replacing them). It names the same
//! rule as the bare expression.

use std::fmt;
use std::str::FromStr;

use romsift_core::ConfigError;

/// Suffix marking an expression whose values extend inherited values.
pub const UNION_SUFFIX: &str = "|union";

/// Value transforms available to sort expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Rank by how many values matched instead of by first match position.
    Count,
}

/// A parsed expression key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    pub rule_name: String,
    pub disabled: bool,
    pub invert: bool,
    pub override_rule: bool,
    pub union: bool,
    pub transform: Option<Transform>,
}

impl Expression {
    /// The expression with the union suffix removed, used as the merge key
    /// when layering configuration.
    pub fn base_key(key: &str) -> &str {
        key.strip_suffix(UNION_SUFFIX).unwrap_or(key)
    }
}

impl FromStr for Expression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (rest, union) = match trimmed.strip_suffix(UNION_SUFFIX) {
            Some(rest) => (rest, true),
            None => (trimmed, false),
        };

        let mut expr = Expression {
            rule_name: String::new(),
            disabled: false,
            invert: false,
            override_rule: false,
            union,
            transform: None,
        };

        let body = rest.trim_start_matches(|c: char| match c {
            '~' => {
                expr.disabled = true;
                true
            }
            '!' => {
                expr.invert = true;
                true
            }
            '+' => {
                expr.override_rule = true;
                true
            }
            _ => false,
        });

        let (name, transform) = match body.split_once(':') {
            Some((name, "count")) => (name, Some(Transform::Count)),
            Some(_) => return Err(ConfigError::invalid_expression(s)),
            None => (body, None),
        };

        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        {
            return Err(ConfigError::invalid_expression(s));
        }

        expr.rule_name = name.to_string();
        expr.transform = transform;
        Ok(expr)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.disabled {
            write!(f, "~")?;
        }
        if self.override_rule {
            write!(f, "+")?;
        }
        if self.invert {
            write!(f, "!")?;
        }
        write!(f, "{}", self.rule_name)?;
        if self.transform == Some(Transform::Count) {
            write!(f, ":count")?;
        }
        Ok(())
    }
}
