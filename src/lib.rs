//! # xml-binder
//!
//! Decides which classes must take part in one XML binding context and
//! caches the expensive artifacts derived from that decision: the binding
//! context itself and the compiled XML Schema attached to marshallers and
//! unmarshallers.
//!
//! A [`BindingContextBuilder`] turns a seed (an object graph, a class, a set
//! of classes or nothing at all) into canonical [`BindingDetails`], looks up
//! or builds the matching context, and attaches a schema when the configured
//! [`SchemaMode`] asks for one.

pub mod access;
pub mod builder;
pub mod cache;
pub mod catalog;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod details;
pub mod engine;
pub mod error;
pub mod http_client;
pub mod libxml2;
pub mod member;
pub mod mode;
pub mod model;
pub mod output;
pub mod registry;
pub mod resolver;
pub mod resource;
pub mod schemagen;
pub mod xml_engine;

pub use builder::{BindingContextBuilder, CanHandle};
pub use cache::{BuilderCacheStats, CacheStats, ContextCache, SchemaCache};
pub use compiler::{CompiledSchema, LibXml2SchemaCompiler, SchemaCompiler, SchemaSource};
pub use config::{BuilderConfig, ConfigManager};
pub use details::{BindingDetails, DetailsBuilder};
pub use engine::{
    BindingContext, BindingEngine, ContextRequest, Marshaller, MemorySchemaSink, SchemaOutputSink,
    Unmarshaller,
};
pub use error::{BindingError, ConfigError, Result};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use member::{BindingKey, BindingMember, SchemaLocation};
pub use mode::{Direction, SchemaMode};
pub use model::{
    AccessType, ClassDescriptor, ClassLoader, ClassRef, DynamicObject, PackageDescriptor,
    PackageRef, PropertyDescriptor, PropertyValue, ScalarType, TypeRef, Value, XmlDecl, XmlObject,
};
pub use registry::MetadataRegistry;
pub use resolver::{DefaultDependencyResolver, DependencyResolver, Seed};
pub use resource::{DefaultResourceLoader, Locator, ResourceLoader};
pub use xml_engine::XmlBindingEngine;
