//! Compiling generated fragments and external documents into one schema.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BindingError, Result};
use crate::libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
use crate::model::W3C_XML_SCHEMA_NS_URI;

/// One schema document together with the namespace it defines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    /// Target namespace; empty for no-namespace documents
    pub namespace: String,
    /// Suggested file name or original location, used in diagnostics
    pub system_id: String,
    pub document: Vec<u8>,
}

impl SchemaSource {
    pub fn new(
        namespace: impl Into<String>,
        system_id: impl Into<String>,
        document: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            system_id: system_id.into(),
            document: document.into(),
        }
    }
}

/// A compiled schema ready to validate documents
pub struct CompiledSchema {
    schema: XmlSchemaPtr,
    namespaces: BTreeSet<String>,
    system_ids: Vec<String>,
}

impl CompiledSchema {
    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    pub fn system_ids(&self) -> &[String] {
        &self.system_ids
    }

    /// Validate a complete XML document against this schema
    pub fn validate(&self, xml: &[u8]) -> Result<()> {
        match LibXml2Wrapper::new().validate_memory(&self.schema, xml)? {
            ValidationResult::Valid => Ok(()),
            ValidationResult::Invalid { errors, error_count } => {
                let errors = if errors.is_empty() {
                    vec![format!("{} validation error(s)", error_count)]
                } else {
                    errors
                };
                Err(BindingError::Validation { errors })
            }
            ValidationResult::InternalError { code } => Err(BindingError::LibXml2Internal {
                details: format!("validation returned internal code {}", code),
            }),
        }
    }
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("namespaces", &self.namespaces)
            .field("system_ids", &self.system_ids)
            .finish()
    }
}

/// Turns a list of schema sources into one compiled schema
pub trait SchemaCompiler: Send + Sync + fmt::Debug {
    /// Schema language identifier
    fn language(&self) -> &str;

    fn compile(&self, sources: &[SchemaSource]) -> Result<CompiledSchema>;
}

/// libxml2-backed compiler for W3C XML Schema
#[derive(Debug, Clone)]
pub struct LibXml2SchemaCompiler {
    language: Arc<str>,
}

impl LibXml2SchemaCompiler {
    pub fn new() -> Self {
        Self {
            language: Arc::from(W3C_XML_SCHEMA_NS_URI),
        }
    }

    /// Compiler for an explicit schema language; only W3C XML Schema compiles
    pub fn with_language(language: Arc<str>) -> Self {
        Self { language }
    }

    pub fn language_handle(&self) -> &Arc<str> {
        &self.language
    }

    fn compile_many(&self, sources: &[SchemaSource]) -> Result<XmlSchemaPtr> {
        let dir = tempfile::tempdir()?;

        let mut by_namespace: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for (index, source) in sources.iter().enumerate() {
            let file_name = format!("source{}.xsd", index + 1);
            fs::write(dir.path().join(&file_name), &source.document)?;
            by_namespace
                .entry(source.namespace.as_str())
                .or_default()
                .push(file_name);
        }

        let mut driver = String::new();
        driver.push_str(&format!(
            "<xs:schema xmlns:xs=\"{}\">\n",
            W3C_XML_SCHEMA_NS_URI
        ));
        for (index, (namespace, files)) in by_namespace.iter().enumerate() {
            if namespace.is_empty() {
                // the driver itself has no target namespace
                for file in files {
                    driver.push_str(&format!("  <xs:include schemaLocation=\"{}\"/>\n", file));
                }
                continue;
            }

            let location = if files.len() == 1 {
                files[0].clone()
            } else {
                let wrapper_name = format!("namespace{}.xsd", index + 1);
                let mut wrapper = format!(
                    "<xs:schema xmlns:xs=\"{}\" targetNamespace=\"{}\">\n",
                    W3C_XML_SCHEMA_NS_URI,
                    escape_xml(namespace)
                );
                for file in files {
                    wrapper.push_str(&format!("  <xs:include schemaLocation=\"{}\"/>\n", file));
                }
                wrapper.push_str("</xs:schema>\n");
                fs::write(dir.path().join(&wrapper_name), wrapper)?;
                wrapper_name
            };
            driver.push_str(&format!(
                "  <xs:import namespace=\"{}\" schemaLocation=\"{}\"/>\n",
                escape_xml(namespace),
                location
            ));
        }
        driver.push_str("</xs:schema>\n");

        let driver_path = dir.path().join("driver.xsd");
        fs::write(&driver_path, driver)?;

        Ok(LibXml2Wrapper::new().parse_schema_from_file(&driver_path)?)
    }
}

impl Default for LibXml2SchemaCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaCompiler for LibXml2SchemaCompiler {
    fn language(&self) -> &str {
        &self.language
    }

    fn compile(&self, sources: &[SchemaSource]) -> Result<CompiledSchema> {
        if &*self.language != W3C_XML_SCHEMA_NS_URI {
            return Err(BindingError::SchemaCompilation {
                details: format!("schema language {} is not supported", self.language),
            });
        }

        let schema = match sources {
            [] => LibXml2Wrapper::new().parse_schema_from_memory(
                format!("<xs:schema xmlns:xs=\"{}\"/>", W3C_XML_SCHEMA_NS_URI).as_bytes(),
            )?,
            [single] => LibXml2Wrapper::new().parse_schema_from_memory(&single.document)?,
            many => self.compile_many(many)?,
        };

        debug!(sources = sources.len(), "compiled schema");
        Ok(CompiledSchema {
            schema,
            namespaces: sources.iter().map(|s| s.namespace.clone()).collect(),
            system_ids: sources.iter().map(|s| s.system_id.clone()).collect(),
        })
    }
}

pub(crate) fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
