use std::path::PathBuf;

use thiserror::Error;

/// Main error type covering registration, context construction and XML processing
#[derive(Error, Debug)]
pub enum BindingError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to create binding context for {key}: {source}")]
    ContextConstruction {
        key: String,
        #[source]
        source: Box<BindingError>,
    },

    #[error("Binding engine error: {0}")]
    Engine(String),

    #[error("XML processing error: {details}")]
    XmlProcessing { details: String },

    #[error("Schema compilation failed: {details}")]
    SchemaCompilation { details: String },

    #[error("Marshalling failed: {0}")]
    Marshal(String),

    #[error("Unmarshalling failed: {0}")]
    Unmarshal(String),

    #[error("Schema validation failed with {} error(s): {}", .errors.len(), .errors.join("; "))]
    Validation { errors: Vec<String> },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status error: {status} for {url} - {message}")]
    HttpStatus {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Request timeout: {url} after {timeout_seconds} seconds")]
    Timeout { url: String, timeout_seconds: u64 },

    #[error("Schema resource not found: {location}")]
    SchemaNotFound { location: String },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BindingError {
    /// Whether this error belongs to the binding-construction kind
    pub fn is_binding_error(&self) -> bool {
        match self {
            BindingError::ContextConstruction { .. }
            | BindingError::Engine(_)
            | BindingError::Marshal(_)
            | BindingError::Unmarshal(_) => true,
            _ => false,
        }
    }

    /// Whether this error belongs to the schema/XML-processing kind
    pub fn is_xml_error(&self) -> bool {
        match self {
            BindingError::XmlProcessing { .. }
            | BindingError::SchemaCompilation { .. }
            | BindingError::Validation { .. }
            | BindingError::Io(_)
            | BindingError::Http(_)
            | BindingError::HttpStatus { .. }
            | BindingError::Timeout { .. }
            | BindingError::SchemaNotFound { .. }
            | BindingError::LibXml2Internal { .. } => true,
            _ => false,
        }
    }
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {}", .errors.join("; "))]
    SchemaParseFailed { errors: Vec<String> },

    #[error("Schema parsing failed for {}: {}", .path.display(), .errors.join("; "))]
    SchemaFileParseFailed { path: PathBuf, errors: Vec<String> },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Document parsing failed: {details}")]
    DocumentParseFailed { details: String },

    #[error("Validation failed with internal code {code}")]
    ValidationFailed { code: i32 },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,
}

impl From<ConfigError> for BindingError {
    fn from(err: ConfigError) -> Self {
        BindingError::Config(err.to_string())
    }
}

impl From<LibXml2Error> for BindingError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::SchemaParseFailed { .. } | LibXml2Error::SchemaFileParseFailed { .. } => {
                BindingError::SchemaCompilation {
                    details: err.to_string(),
                }
            }
            other => BindingError::LibXml2Internal {
                details: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BindingError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
