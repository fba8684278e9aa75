//! Fetching externally declared schema documents.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BindingError, Result};
use crate::http_client::{AsyncHttpClient, HttpClientConfig};

/// Loads the raw bytes behind a schema location string
#[async_trait]
pub trait ResourceLoader: Send + Sync + fmt::Debug {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// How a location string is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// Relative path searched across the classpath roots
    Classpath(String),
    File(PathBuf),
    Remote(String),
}

impl Locator {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            Locator::Remote(location.to_string())
        } else if let Some(path) = location.strip_prefix("classpath:") {
            Locator::Classpath(path.trim_start_matches('/').to_string())
        } else if let Some(path) = location.strip_prefix("file://") {
            Locator::File(PathBuf::from(path))
        } else if let Some(path) = location.strip_prefix("file:") {
            Locator::File(PathBuf::from(path))
        } else if Path::new(location).is_absolute() {
            Locator::File(PathBuf::from(location))
        } else {
            Locator::Classpath(location.to_string())
        }
    }
}

/// Resolves `classpath:`, `file:`, absolute and `http(s)` locations
#[derive(Debug, Clone)]
pub struct DefaultResourceLoader {
    classpath_roots: Vec<PathBuf>,
    http_client: AsyncHttpClient,
}

impl DefaultResourceLoader {
    pub fn new(classpath_roots: Vec<PathBuf>, http_config: HttpClientConfig) -> Result<Self> {
        Ok(Self {
            classpath_roots,
            http_client: AsyncHttpClient::new(http_config)?,
        })
    }

    /// Loader whose only classpath root is the working directory
    pub fn with_defaults() -> Result<Self> {
        Self::new(vec![PathBuf::from(".")], HttpClientConfig::default())
    }

    pub fn classpath_roots(&self) -> &[PathBuf] {
        &self.classpath_roots
    }

    async fn load_classpath(&self, location: &str, relative: &str) -> Result<Vec<u8>> {
        for root in &self.classpath_roots {
            let candidate = root.join(relative);
            match tokio::fs::read(&candidate).await {
                Ok(data) => {
                    debug!(location, path = %candidate.display(), "resolved classpath resource");
                    return Ok(data);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(BindingError::Io(e)),
            }
        }
        Err(BindingError::SchemaNotFound {
            location: location.to_string(),
        })
    }

    async fn load_file(&self, location: &str, path: &Path) -> Result<Vec<u8>> {
        tokio::fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BindingError::SchemaNotFound {
                location: location.to_string(),
            },
            _ => BindingError::Io(e),
        })
    }
}

#[async_trait]
impl ResourceLoader for DefaultResourceLoader {
    async fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        let data = match Locator::parse(location) {
            Locator::Classpath(relative) => self.load_classpath(location, &relative).await?,
            Locator::File(path) => self.load_file(location, &path).await?,
            Locator::Remote(url) => self.http_client.download(&url).await?,
        };
        validate_schema_content(&data, location)?;
        Ok(data)
    }
}

/// Reject content that cannot be an XML Schema document
pub fn validate_schema_content(data: &[u8], source: &str) -> Result<()> {
    let content = std::str::from_utf8(data).map_err(|_| BindingError::XmlProcessing {
        details: format!("{}: schema content is not valid UTF-8", source),
    })?;

    if !content.trim_start().starts_with('<') {
        return Err(BindingError::XmlProcessing {
            details: format!("{}: schema content does not appear to be XML", source),
        });
    }

    if !content.contains("<xs:schema")
        && !content.contains("<xsd:schema")
        && !content.contains("<schema")
    {
        return Err(BindingError::XmlProcessing {
            details: format!("{}: content does not appear to be an XML Schema (XSD)", source),
        });
    }

    Ok(())
}
