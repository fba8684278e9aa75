//! Memoised binding contexts and compiled schemas, both keyed by [`BindingDetails`].
//!
//! Builds run outside the cache, so concurrent misses on one key never wait
//! for each other: every caller builds, the first result is installed and
//! later ones are dropped in favour of it. Entries are never evicted
//! individually; they are dropped wholesale by `invalidate_all`.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::debug;

use crate::compiler::CompiledSchema;
use crate::details::BindingDetails;
use crate::engine::BindingContext;
use crate::error::{BindingError, Result};

/// Counters for one cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entry_count: u64,
    pub hits: u64,
    /// Number of times the loader actually ran
    pub builds: u64,
}

/// Counters for both caches of a builder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuilderCacheStats {
    pub contexts: CacheStats,
    pub schemas: CacheStats,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    builds: AtomicU64,
}

impl Counters {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn build(&self) {
        self.builds.fetch_add(1, Ordering::Relaxed);
    }

    fn stats(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            entry_count,
            hits: self.hits.load(Ordering::Relaxed),
            builds: self.builds.load(Ordering::Relaxed),
        }
    }
}

/// Binding contexts, built on first request
pub struct ContextCache {
    cache: moka::sync::Cache<BindingDetails, Arc<dyn BindingContext>>,
    counters: Counters,
}

impl ContextCache {
    pub fn new() -> Self {
        Self {
            cache: moka::sync::Cache::builder().build(),
            counters: Counters::default(),
        }
    }

    /// Cached context for `details`, or the result of `build` on a miss.
    ///
    /// A failed build is wrapped in [`BindingError::ContextConstruction`]
    /// carrying the description of the key; failures are not cached.
    pub fn get_or_build<F>(&self, details: &BindingDetails, build: F) -> Result<Arc<dyn BindingContext>>
    where
        F: FnOnce() -> Result<Arc<dyn BindingContext>>,
    {
        if let Some(context) = self.cache.get(details) {
            self.counters.hit();
            debug!(key = %details.describe(), "context cache hit");
            return Ok(context);
        }

        self.counters.build();
        debug!(key = %details.describe(), "context cache miss");
        let built = build().map_err(|source| BindingError::ContextConstruction {
            key: details.describe(),
            source: Box::new(source),
        })?;

        let entry = self.cache.entry(details.clone()).or_insert(built);
        if !entry.is_fresh() {
            debug!(key = %details.describe(), "context built concurrently, keeping installed one");
        }
        Ok(entry.into_value())
    }

    pub fn get(&self, details: &BindingDetails) -> Option<Arc<dyn BindingContext>> {
        self.cache.get(details)
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks();
        self.counters.stats(self.cache.entry_count())
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiled schemas, built on first request
pub struct SchemaCache {
    cache: moka::future::Cache<BindingDetails, Arc<CompiledSchema>>,
    counters: Counters,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self {
            cache: moka::future::Cache::builder().build(),
            counters: Counters::default(),
        }
    }

    /// Cached schema for `details`, or the output of `build` on a miss
    pub async fn get_or_build<Fut>(&self, details: &BindingDetails, build: Fut) -> Result<Arc<CompiledSchema>>
    where
        Fut: Future<Output = Result<Arc<CompiledSchema>>>,
    {
        if let Some(schema) = self.cache.get(details).await {
            self.counters.hit();
            debug!(key = %details.describe(), "schema cache hit");
            return Ok(schema);
        }

        self.counters.build();
        debug!(key = %details.describe(), "schema cache miss");
        let built = build.await?;

        let entry = self.cache.entry(details.clone()).or_insert(built).await;
        if !entry.is_fresh() {
            debug!(key = %details.describe(), "schema built concurrently, keeping installed one");
        }
        Ok(entry.into_value())
    }

    pub async fn get(&self, details: &BindingDetails) -> Option<Arc<CompiledSchema>> {
        self.cache.get(details).await
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub async fn stats(&self) -> CacheStats {
        self.cache.run_pending_tasks().await;
        self.counters.stats(self.cache.entry_count())
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{LibXml2SchemaCompiler, SchemaCompiler, SchemaSource};
    use crate::details::DetailsBuilder;
    use crate::engine::{BindingEngine, ContextRequest};
    use crate::member::BindingMember;
    use crate::model::{ClassDescriptor, ClassLoader, ClassRef, XmlDecl};
    use crate::xml_engine::XmlBindingEngine;

    fn fixture() -> (Arc<ClassLoader>, BindingDetails) {
        let loader = Arc::new(
            ClassLoader::new().with_class(ClassDescriptor::new("p", "A").root_element(XmlDecl::new())),
        );
        let member = BindingMember::class(loader.load_class("p.A").unwrap()).unwrap();
        let details = DetailsBuilder::new().with(&member, &loader).build();
        (loader, details)
    }

    fn build_context(loader: &Arc<ClassLoader>, details: &BindingDetails) -> Result<Arc<dyn BindingContext>> {
        let classes: Vec<ClassRef> = details.classes().cloned().collect();
        XmlBindingEngine::new().new_context(ContextRequest::Classes(&classes), loader)
    }

    #[test]
    fn test_context_cache_returns_same_instance() {
        let (loader, details) = fixture();
        let cache = ContextCache::new();

        let first = cache
            .get_or_build(&details, || build_context(&loader, &details))
            .unwrap();
        let second = cache
            .get_or_build(&details, || panic!("must not rebuild"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_context_failure_is_wrapped_and_not_cached() {
        let (loader, details) = fixture();
        let cache = ContextCache::new();

        let err = cache
            .get_or_build(&details, || Err(BindingError::Engine("boom".to_string())))
            .unwrap_err();
        assert!(matches!(err, BindingError::ContextConstruction { .. }));
        assert!(err.to_string().contains("classes=[p.A]"));
        assert!(err.is_binding_error());

        assert!(
            cache
                .get_or_build(&details, || build_context(&loader, &details))
                .is_ok()
        );
    }

    #[test]
    fn test_invalidate_all_forces_rebuild() {
        let (loader, details) = fixture();
        let cache = ContextCache::new();

        let first = cache
            .get_or_build(&details, || build_context(&loader, &details))
            .unwrap();
        cache.invalidate_all();
        assert!(cache.get(&details).is_none());

        let second = cache
            .get_or_build(&details, || build_context(&loader, &details))
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_misses_converge_on_one_entry() {
        use std::sync::Barrier;
        use std::thread;

        let (loader, details) = fixture();
        let cache = ContextCache::new();
        let barrier = Barrier::new(4);

        let contexts: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        cache
                            .get_or_build(&details, || {
                                // every caller has missed before any installs
                                barrier.wait();
                                build_context(&loader, &details)
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let installed = cache.get(&details).unwrap();
        assert!(contexts.iter().all(|context| Arc::ptr_eq(context, &installed)));
        let stats = cache.stats();
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.builds, 4);
    }

    #[tokio::test]
    async fn test_schema_cache_memoises() {
        let (_, details) = fixture();
        let cache = SchemaCache::new();
        let source = SchemaSource::new(
            "",
            "a.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="a"/></xs:schema>"#,
        );

        let first = cache
            .get_or_build(&details, async {
                Ok(Arc::new(LibXml2SchemaCompiler::new().compile(&[source.clone()])?))
            })
            .await
            .unwrap();
        let second = cache
            .get_or_build(&details, async { panic!("must not rebuild") })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats().await;
        assert_eq!(stats.builds, 1);
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn test_schema_failure_is_not_cached() {
        let (_, details) = fixture();
        let cache = SchemaCache::new();

        let err = cache
            .get_or_build(&details, async {
                Err(BindingError::SchemaNotFound {
                    location: "missing.xsd".to_string(),
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BindingError::SchemaNotFound { .. }));
        assert!(cache.get(&details).await.is_none());
    }
}
