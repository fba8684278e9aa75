//! Seams to the object-to-XML binding engine.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::compiler::{CompiledSchema, SchemaSource};
use crate::error::Result;
use crate::model::{ClassLoader, ClassRef, DynamicObject, XmlObject};

/// How a context is requested from the engine
#[derive(Debug, Clone, Copy)]
pub enum ContextRequest<'a> {
    Classes(&'a [ClassRef]),
    /// Colon-joined package names
    ContextPath(&'a str),
}

/// Creates binding contexts for a final set of classes
pub trait BindingEngine: Send + Sync + fmt::Debug {
    fn new_context(
        &self,
        request: ContextRequest<'_>,
        loader: &Arc<ClassLoader>,
    ) -> Result<Arc<dyn BindingContext>>;
}

/// A constructed binding context; expensive to build, cheap to use
pub trait BindingContext: Send + Sync + fmt::Debug {
    /// Every class known to the context
    fn classes(&self) -> Vec<ClassRef>;

    fn create_marshaller(&self) -> Result<Box<dyn Marshaller>>;

    fn create_unmarshaller(&self) -> Result<Box<dyn Unmarshaller>>;

    /// Emit one schema document per namespace into `sink`
    fn generate_schema_fragments(&self, sink: &mut dyn SchemaOutputSink) -> Result<()>;
}

pub trait Marshaller: Send + fmt::Debug {
    /// Attach a schema that output is validated against, or detach it
    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>);

    fn schema(&self) -> Option<&Arc<CompiledSchema>>;

    fn marshal(&self, object: &dyn XmlObject) -> Result<String>;
}

pub trait Unmarshaller: Send + fmt::Debug {
    /// Attach a schema that input is validated against, or detach it
    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>);

    fn schema(&self) -> Option<&Arc<CompiledSchema>>;

    fn unmarshal(&self, xml: &str) -> Result<DynamicObject>;
}

/// Destination for generated schema fragments
pub trait SchemaOutputSink {
    /// Buffer to write the fragment for `namespace` into, or `None` to skip it
    fn create_output(&mut self, namespace: &str, suggested_name: &str) -> Option<&mut String>;
}

/// Collects fragments in memory, skipping namespaces supplied externally
#[derive(Debug, Default)]
pub struct MemorySchemaSink {
    excluded: BTreeSet<String>,
    fragments: Vec<SchemaSource>,
    buffers: Vec<String>,
    skipped: Vec<String>,
}

impl MemorySchemaSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn excluding(excluded: BTreeSet<String>) -> Self {
        Self {
            excluded,
            ..Self::default()
        }
    }

    /// Namespaces that were offered but skipped
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn into_sources(self) -> Vec<SchemaSource> {
        self.fragments
            .into_iter()
            .zip(self.buffers)
            .map(|(source, buffer)| SchemaSource {
                document: buffer.into_bytes(),
                ..source
            })
            .collect()
    }
}

impl SchemaOutputSink for MemorySchemaSink {
    fn create_output(&mut self, namespace: &str, suggested_name: &str) -> Option<&mut String> {
        if self.excluded.contains(namespace) {
            self.skipped.push(namespace.to_string());
            return None;
        }
        self.fragments
            .push(SchemaSource::new(namespace, suggested_name, Vec::new()));
        self.buffers.push(String::new());
        self.buffers.last_mut()
    }
}
