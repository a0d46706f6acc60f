use romsift_core::ConfigError;

/// Errors raised while reading catalogs and metadata files.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::Error),

    /// A single catalog entry could not be read. The rest of the catalog is fine.
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("Metadata error in {path}: {message}")]
    Metadata { path: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CatalogError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    pub fn metadata(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Metadata {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether reading can continue with the next record.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InvalidRecord(_))
    }
}
