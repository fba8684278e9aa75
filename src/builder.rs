//! Facade tying resolution, metadata, caches and the schema-mode gate together.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::cache::{BuilderCacheStats, ContextCache, SchemaCache};
use crate::compiler::{CompiledSchema, LibXml2SchemaCompiler, SchemaCompiler, SchemaSource};
use crate::config::BuilderConfig;
use crate::details::{BindingDetails, DetailsBuilder};
use crate::engine::{
    BindingContext, BindingEngine, ContextRequest, Marshaller, MemorySchemaSink, Unmarshaller,
};
use crate::error::{BindingError, Result};
use crate::member::{BindingKey, BindingMember};
use crate::mode::{Direction, SchemaMode};
use crate::model::{ClassLoader, ClassRef};
use crate::registry::MetadataRegistry;
use crate::resolver::{DefaultDependencyResolver, DependencyResolver, Seed};
use crate::resource::{DefaultResourceLoader, ResourceLoader};
use crate::xml_engine::XmlBindingEngine;

/// Predicate deciding whether a class can be bound by a builder
pub type CanHandle = Arc<dyn Fn(&ClassRef, &MetadataRegistry) -> bool + Send + Sync>;

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(PoisonError::into_inner).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Builds marshallers, unmarshallers and schemas for arbitrary seeds.
///
/// Shared between threads. Registration and component replacement clear
/// both caches; readers racing with such a change may still see the old
/// artifacts briefly.
pub struct BindingContextBuilder {
    loader: Arc<ClassLoader>,
    registry: MetadataRegistry,
    resolver: RwLock<Arc<dyn DependencyResolver>>,
    engine: Arc<dyn BindingEngine>,
    schema_compiler: RwLock<Arc<dyn SchemaCompiler>>,
    resource_loader: Arc<dyn ResourceLoader>,
    schema_mode: RwLock<SchemaMode>,
    can_handle: CanHandle,
    contexts: ContextCache,
    schemas: SchemaCache,
}

impl fmt::Debug for BindingContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingContextBuilder")
            .field("registry", &self.registry)
            .field("engine", &self.engine)
            .field("schema_mode", &self.schema_mode())
            .finish_non_exhaustive()
    }
}

impl BindingContextBuilder {
    /// Builder with the default engine, resolver and schema compiler
    pub fn new(loader: Arc<ClassLoader>, resource_loader: Arc<dyn ResourceLoader>) -> Self {
        Self {
            loader,
            registry: MetadataRegistry::new(),
            resolver: RwLock::new(Arc::new(DefaultDependencyResolver)),
            engine: Arc::new(XmlBindingEngine::new()),
            schema_compiler: RwLock::new(Arc::new(LibXml2SchemaCompiler::new())),
            resource_loader,
            schema_mode: RwLock::new(SchemaMode::default()),
            can_handle: Arc::new(|class: &ClassRef, _: &MetadataRegistry| class.is_bindable()),
            contexts: ContextCache::new(),
            schemas: SchemaCache::new(),
        }
    }

    /// Builder fetching resources relative to the working directory
    pub fn with_defaults(loader: Arc<ClassLoader>) -> Result<Self> {
        Ok(Self::new(loader, Arc::new(DefaultResourceLoader::with_defaults()?)))
    }

    pub fn from_config(loader: Arc<ClassLoader>, config: &BuilderConfig) -> Result<Self> {
        let resources = DefaultResourceLoader::new(
            config.resources.classpath_roots.clone(),
            config.network.to_http_config(),
        )?;
        let compiler = LibXml2SchemaCompiler::with_language(Arc::from(config.schema.language.as_str()));
        Ok(Self::new(loader, Arc::new(resources))
            .with_schema_compiler(Arc::new(compiler))
            .with_schema_mode(config.schema.mode))
    }

    pub fn with_engine(mut self, engine: Arc<dyn BindingEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_resolver(self, resolver: Arc<dyn DependencyResolver>) -> Self {
        write(&self.resolver, resolver);
        self
    }

    pub fn with_schema_compiler(self, compiler: Arc<dyn SchemaCompiler>) -> Self {
        write(&self.schema_compiler, compiler);
        self
    }

    pub fn with_schema_mode(self, mode: SchemaMode) -> Self {
        self.set_schema_mode(mode);
        self
    }

    pub fn with_can_handle<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&ClassRef, &MetadataRegistry) -> bool + Send + Sync + 'static,
    {
        self.can_handle = Arc::new(predicate);
        self
    }

    pub fn class_loader(&self) -> &Arc<ClassLoader> {
        &self.loader
    }

    pub fn registry(&self) -> &MetadataRegistry {
        &self.registry
    }

    pub fn schema_mode(&self) -> SchemaMode {
        read(&self.schema_mode)
    }

    /// The mode is read on every marshaller or unmarshaller construction
    pub fn set_schema_mode(&self, mode: SchemaMode) {
        write(&self.schema_mode, mode);
    }

    pub fn resolver(&self) -> Arc<dyn DependencyResolver> {
        read(&self.resolver)
    }

    pub fn set_resolver(&self, resolver: Arc<dyn DependencyResolver>) {
        write(&self.resolver, resolver);
        self.clear_caches();
    }

    pub fn schema_compiler(&self) -> Arc<dyn SchemaCompiler> {
        read(&self.schema_compiler)
    }

    pub fn set_schema_compiler(&self, compiler: Arc<dyn SchemaCompiler>) {
        write(&self.schema_compiler, compiler);
        self.clear_caches();
    }

    pub fn can_handle(&self, class: &ClassRef) -> bool {
        (self.can_handle)(class, &self.registry)
    }

    /// Register a member; both caches are cleared when the registry changes
    pub fn add(&self, member: BindingMember) -> bool {
        let key = member.key();
        let changed = self.registry.insert(member);
        if changed {
            debug!(%key, "binding metadata changed");
            self.clear_caches();
        }
        changed
    }

    pub fn register_class(&self, qualified_name: &str) -> Result<bool> {
        let class = self.loader.load_class(qualified_name).ok_or_else(|| {
            BindingError::InvalidArgument(format!(
                "class {} is not known to the class loader",
                qualified_name
            ))
        })?;
        Ok(self.add(BindingMember::class(class)?))
    }

    pub fn register_package(&self, name: &str, schema_location: Option<&str>) -> Result<bool> {
        let package = self.loader.package(name).ok_or_else(|| {
            BindingError::InvalidArgument(format!("package {} is not known to the class loader", name))
        })?;
        let mut member = BindingMember::package(package)?;
        if let Some(location) = schema_location {
            member = member.with_schema_location(location);
        }
        Ok(self.add(member))
    }

    pub fn registered_keys(&self) -> Vec<BindingKey> {
        self.registry.keys()
    }

    pub fn clear_caches(&self) {
        self.contexts.invalidate_all();
        self.schemas.invalidate_all();
    }

    pub async fn cache_stats(&self) -> BuilderCacheStats {
        BuilderCacheStats {
            contexts: self.contexts.stats(),
            schemas: self.schemas.stats().await,
        }
    }

    /// Canonical details for `seed`.
    ///
    /// An empty seed stands for everything registered. Classes found during
    /// resolution that no entry covers yet are registered on the way. A class
    /// whose model package is registered travels with that package.
    pub fn resolve(&self, seed: &Seed<'_>) -> BindingDetails {
        let mut builder = DetailsBuilder::new();

        if seed.is_empty() {
            for member in self.registry.effective_members() {
                builder.add(&member, &self.loader);
            }
            return builder.build();
        }

        let mut classes: Vec<ClassRef> = self
            .resolver()
            .resolve(seed, &self.loader)
            .into_iter()
            .collect();
        classes.sort();

        let mut members = BTreeMap::new();
        for class in classes {
            let member = match self.registry.covering(&class) {
                Some(member) => member,
                None => match MetadataRegistry::member_for_discovered(&class, &self.loader) {
                    Some(member) => {
                        self.add(member.clone());
                        member
                    }
                    None => {
                        warn!(class = class.qualified_name(), "skipping unbindable class");
                        continue;
                    }
                },
            };
            members.insert(member.key(), member);
        }

        for member in members.values() {
            builder.add(member, &self.loader);
        }
        builder.build()
    }

    /// Cached binding context for `details`
    pub fn compute_context(&self, details: &BindingDetails) -> Result<Arc<dyn BindingContext>> {
        self.contexts.get_or_build(details, || {
            info!(key = %details.describe(), "building binding context");
            match details.context_path() {
                Some(path) if !details.has_classes() => self
                    .engine
                    .new_context(ContextRequest::ContextPath(&path), &self.loader),
                _ => {
                    let mut classes: BTreeSet<ClassRef> = details.classes().cloned().collect();
                    for package in details.packages() {
                        classes.extend(
                            self.loader
                                .classes_in_package(package)
                                .into_iter()
                                .filter(|class| class.is_bindable()),
                        );
                    }
                    let classes: Vec<ClassRef> = classes.into_iter().collect();
                    self.engine
                        .new_context(ContextRequest::Classes(&classes), &self.loader)
                }
            }
        })
    }

    /// Generated fragments for namespaces without an external location,
    /// followed by the fetched external documents
    pub async fn schema_sources(&self, details: &BindingDetails) -> Result<Vec<SchemaSource>> {
        let context = self.compute_context(details)?;

        let mut sink = MemorySchemaSink::excluding(details.external_namespaces());
        context.generate_schema_fragments(&mut sink)?;
        for namespace in sink.skipped() {
            debug!(namespace, "namespace supplied by an external schema");
        }
        let mut sources = sink.into_sources();

        for location in details.schema_locations() {
            let document = self.resource_loader.fetch(&location.location).await?;
            sources.push(SchemaSource::new(
                location.namespace.clone(),
                location.location.clone(),
                document,
            ));
        }
        Ok(sources)
    }

    /// Cached compiled schema for `details`
    pub async fn compute_schema(&self, details: &BindingDetails) -> Result<Arc<CompiledSchema>> {
        self.schemas
            .get_or_build(details, async {
                info!(key = %details.describe(), "building schema");
                let sources = self.schema_sources(details).await?;
                let compiler = self.schema_compiler();
                let schema = tokio::task::spawn_blocking(move || compiler.compile(&sources))
                    .await
                    .map_err(|e| BindingError::SchemaCompilation {
                        details: format!("schema compilation task failed: {}", e),
                    })??;
                Ok(Arc::new(schema))
            })
            .await
    }

    pub async fn build_marshaller(&self, seed: &Seed<'_>) -> Result<Box<dyn Marshaller>> {
        let details = self.resolve(seed);
        let mut marshaller = self.compute_context(&details)?.create_marshaller()?;
        if self.schema_mode().applies(Direction::Marshal, &details) {
            marshaller.set_schema(Some(self.compute_schema(&details).await?));
        }
        Ok(marshaller)
    }

    pub async fn build_unmarshaller(&self, seed: &Seed<'_>) -> Result<Box<dyn Unmarshaller>> {
        let details = self.resolve(seed);
        let mut unmarshaller = self.compute_context(&details)?.create_unmarshaller()?;
        if self.schema_mode().applies(Direction::Unmarshal, &details) {
            unmarshaller.set_schema(Some(self.compute_schema(&details).await?));
        }
        Ok(unmarshaller)
    }

    /// Compiled schema for `seed`, regardless of the schema mode
    pub async fn build_schema(&self, seed: &Seed<'_>) -> Result<Arc<CompiledSchema>> {
        let details = self.resolve(seed);
        self.compute_schema(&details).await
    }

    /// Independent builder with a snapshot of the registry and empty caches.
    ///
    /// Immutable configuration such as the engine, compiler and resource
    /// loader is shared by reference.
    pub fn copy(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            registry: self.registry.snapshot(),
            resolver: RwLock::new(self.resolver()),
            engine: Arc::clone(&self.engine),
            schema_compiler: RwLock::new(self.schema_compiler()),
            resource_loader: Arc::clone(&self.resource_loader),
            schema_mode: RwLock::new(self.schema_mode()),
            can_handle: Arc::clone(&self.can_handle),
            contexts: ContextCache::new(),
            schemas: SchemaCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ClassDescriptor, DynamicObject, PackageDescriptor, PropertyDescriptor, TypeRef, XmlDecl,
    };
    use std::collections::HashSet;

    #[derive(Debug)]
    struct NoResources;

    #[async_trait::async_trait]
    impl ResourceLoader for NoResources {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
            Err(BindingError::SchemaNotFound {
                location: location.to_string(),
            })
        }
    }

    #[derive(Debug)]
    struct NothingResolver;

    impl DependencyResolver for NothingResolver {
        fn resolve(&self, _: &Seed<'_>, _: &ClassLoader) -> HashSet<ClassRef> {
            HashSet::new()
        }
    }

    fn loader() -> Arc<ClassLoader> {
        Arc::new(
            ClassLoader::new()
                .with_package(
                    PackageDescriptor::new("shop")
                        .with_namespace("urn:shop")
                        .with_object_factory(),
                )
                .with_class(
                    ClassDescriptor::new("shop", "Order")
                        .root_element(XmlDecl::new())
                        .property(PropertyDescriptor::accessor("item", TypeRef::class("loose.Item"))),
                )
                .with_class(
                    ClassDescriptor::new("loose", "Item")
                        .xml_type(XmlDecl::new())
                        .property(PropertyDescriptor::accessor("sku", TypeRef::string())),
                )
                .with_class(ClassDescriptor::new("loose", "Plain")),
        )
    }

    fn builder() -> BindingContextBuilder {
        BindingContextBuilder::new(loader(), Arc::new(NoResources))
    }

    #[test]
    fn test_resolve_registers_discovered_classes() {
        let builder = builder();
        let order = builder.class_loader().load_class("shop.Order").unwrap();

        let details = builder.resolve(&Seed::Class(order));

        assert_eq!(details.context_path().as_deref(), Some("shop"));
        let classes: Vec<&str> = details.classes().map(|c| c.qualified_name()).collect();
        assert_eq!(classes, vec!["loose.Item"]);
        assert_eq!(
            builder.registered_keys(),
            vec![
                BindingKey::Class("loose.Item".to_string()),
                BindingKey::Package("shop".to_string())
            ]
        );
    }

    #[test]
    fn test_empty_seed_uses_registry() {
        let builder = builder();
        assert!(builder.resolve(&Seed::Empty).is_empty());

        builder.register_package("shop", None).unwrap();
        assert_eq!(
            builder.resolve(&Seed::Empty).context_path().as_deref(),
            Some("shop")
        );
    }

    #[test]
    fn test_registered_class_folds_into_registered_package() {
        let builder = builder();
        builder.register_package("shop", None).unwrap();
        builder.register_class("shop.Order").unwrap();

        let all = builder.resolve(&Seed::Empty);
        assert!(!all.has_classes());
        assert_eq!(all.context_path().as_deref(), Some("shop"));

        let order = builder.class_loader().load_class("shop.Order").unwrap();
        let details = builder.resolve(&Seed::Class(order));
        assert_eq!(details.context_path().as_deref(), Some("shop"));
        let classes: Vec<&str> = details.classes().map(|c| c.qualified_name()).collect();
        assert_eq!(classes, vec!["loose.Item"]);
    }

    #[test]
    fn test_registration_errors_are_immediate() {
        let builder = builder();
        assert!(matches!(
            builder.register_class("loose.Plain"),
            Err(BindingError::InvalidArgument(_))
        ));
        assert!(matches!(
            builder.register_class("missing.Class"),
            Err(BindingError::InvalidArgument(_))
        ));
        assert!(matches!(
            builder.register_package("loose", None),
            Err(BindingError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mixed_details_build_context() {
        let builder = builder();
        let order = builder.class_loader().load_class("shop.Order").unwrap();
        let details = builder.resolve(&Seed::Class(order));

        let context = builder.compute_context(&details).unwrap();
        let names: Vec<String> = context
            .classes()
            .iter()
            .map(|c| c.qualified_name().to_string())
            .collect();
        assert!(names.contains(&"shop.Order".to_string()));
        assert!(names.contains(&"loose.Item".to_string()));
    }

    #[test]
    fn test_replacing_resolver_clears_caches() {
        let builder = builder();
        builder.register_package("shop", None).unwrap();
        let details = builder.resolve(&Seed::Empty);
        let first = builder.compute_context(&details).unwrap();

        builder.set_resolver(Arc::new(NothingResolver));
        let second = builder.compute_context(&details).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        let order = builder.class_loader().load_class("shop.Order").unwrap();
        assert!(builder.resolve(&Seed::Class(order)).is_empty());
    }

    #[test]
    fn test_can_handle_predicate() {
        let builder = builder();
        let plain = builder.class_loader().load_class("loose.Plain").unwrap();
        let item = builder.class_loader().load_class("loose.Item").unwrap();
        assert!(builder.can_handle(&item));
        assert!(!builder.can_handle(&plain));

        let builder = builder.with_can_handle(|class, registry| {
            registry.contains(&BindingKey::Class(class.qualified_name().to_string()))
        });
        assert!(!builder.can_handle(&item));
        builder.register_class("loose.Item").unwrap();
        assert!(builder.can_handle(&item));
    }

    #[test]
    fn test_copy_is_independent() {
        let builder = builder().with_schema_mode(SchemaMode::Always);
        builder.register_package("shop", None).unwrap();

        let copy = builder.copy();
        copy.register_class("loose.Item").unwrap();

        assert_eq!(builder.registered_keys().len(), 1);
        assert_eq!(copy.registered_keys().len(), 2);
        assert_eq!(copy.schema_mode(), SchemaMode::Always);
        assert!(Arc::ptr_eq(
            &builder.schema_compiler(),
            &copy.schema_compiler()
        ));
    }

    #[tokio::test]
    async fn test_never_mode_attaches_no_schema() {
        let builder = builder();
        let object = DynamicObject::new("shop.Order")
            .with("item", DynamicObject::new("loose.Item").with("sku", "x-1"));

        let marshaller = builder.build_marshaller(&Seed::Instance(&object)).await.unwrap();
        assert!(marshaller.schema().is_none());
        let xml = marshaller.marshal(&object).unwrap();
        assert!(xml.contains("<sku>x-1</sku>"));
    }

    #[tokio::test]
    async fn test_missing_external_schema_surfaces() {
        let builder = builder().with_schema_mode(SchemaMode::ExternalXsd);
        builder.register_package("shop", Some("shop.xsd")).unwrap();

        let err = builder.build_marshaller(&Seed::Empty).await.unwrap_err();
        assert!(matches!(err, BindingError::SchemaNotFound { .. }));
        assert!(err.is_xml_error());
    }
}
