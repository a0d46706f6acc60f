use thiserror::Error;

/// Configuration problems detected while building rules, sorters, or
/// attribute assignments. These are fatal: they surface before any
/// machine is evaluated.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A rule or sort expression named an attribute that isn't registered
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// A regex-valued rule entry failed to compile
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// An expression string could not be parsed
    #[error("Invalid expression '{0}'")]
    InvalidExpression(String),

    /// A value could not be coerced to the attribute's data type
    #[error("Invalid value for {attribute}: {message}")]
    InvalidValue { attribute: String, message: String },

    /// Attempted to assign an attribute that is derived from the catalog
    #[error("Attribute is read-only: {0}")]
    ReadOnly(String),
}

impl ConfigError {
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Self::UnknownAttribute(name.into())
    }

    pub fn invalid_expression(expr: impl Into<String>) -> Self {
        Self::InvalidExpression(expr.into())
    }

    pub fn invalid_value(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    pub fn read_only(name: impl Into<String>) -> Self {
        Self::ReadOnly(name.into())
    }
}
