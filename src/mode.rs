//! Per-call decision whether a schema is attached.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::details::BindingDetails;
use crate::error::BindingError;

/// When a compiled schema is attached to marshallers and unmarshallers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaMode {
    #[default]
    Never,
    Always,
    Marshal,
    Unmarshal,
    /// Only when the details name at least one external schema location
    ExternalXsd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Marshal,
    Unmarshal,
}

impl SchemaMode {
    /// Whether a schema is attached for `direction` given `details`
    pub fn applies(self, direction: Direction, details: &BindingDetails) -> bool {
        match self {
            SchemaMode::Never => false,
            SchemaMode::Always => true,
            SchemaMode::Marshal => direction == Direction::Marshal,
            SchemaMode::Unmarshal => direction == Direction::Unmarshal,
            SchemaMode::ExternalXsd => details.has_schema_locations(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaMode::Never => "NEVER",
            SchemaMode::Always => "ALWAYS",
            SchemaMode::Marshal => "MARSHAL",
            SchemaMode::Unmarshal => "UNMARSHAL",
            SchemaMode::ExternalXsd => "EXTERNAL_XSD",
        }
    }
}

impl fmt::Display for SchemaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaMode {
    type Err = BindingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NEVER" => Ok(SchemaMode::Never),
            "ALWAYS" => Ok(SchemaMode::Always),
            "MARSHAL" => Ok(SchemaMode::Marshal),
            "UNMARSHAL" => Ok(SchemaMode::Unmarshal),
            "EXTERNAL_XSD" => Ok(SchemaMode::ExternalXsd),
            _ => Err(BindingError::InvalidArgument(format!(
                "unknown schema mode '{}'; expected one of NEVER, ALWAYS, MARSHAL, UNMARSHAL, EXTERNAL_XSD",
                s
            ))),
        }
    }
}
