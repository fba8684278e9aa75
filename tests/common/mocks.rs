use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use mockall::mock;

use xml_binder::{BindingError, ResourceLoader, Result};

mock! {
    pub Resources {}

    #[async_trait]
    impl ResourceLoader for Resources {
        async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
    }
}

impl fmt::Debug for MockResources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockResources").finish_non_exhaustive()
    }
}

/// Resource loader serving fixed documents and recording every fetch
#[derive(Debug, Default)]
pub struct SpyResourceLoader {
    documents: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl SpyResourceLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serving(mut self, location: &str, document: &str) -> Self {
        self.documents
            .insert(location.to_string(), document.as_bytes().to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceLoader for SpyResourceLoader {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(location.to_string());
        self.documents
            .get(location)
            .cloned()
            .ok_or_else(|| BindingError::SchemaNotFound {
                location: location.to_string(),
            })
    }
}
