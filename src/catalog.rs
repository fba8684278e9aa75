//! On-disk description of a class model, loaded from TOML or JSON.
//!
//! ```toml
//! [[packages]]
//! name = "shop"
//! namespace = "urn:shop"
//! has_object_factory = true
//!
//! [[classes]]
//! package = "shop"
//! name = "Order"
//! root_element = {}
//! properties = [{ name = "id", kind = "accessor", type = { scalar = "long" }, public = true, paired = true }]
//!
//! [[registrations]]
//! package = "shop"
//! schema_location = "classpath:shop.xsd"
//! ```

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{BindingError, ConfigError, ConfigResult, Result};
use crate::member::BindingMember;
use crate::model::{ClassDescriptor, ClassLoader, PackageDescriptor};

static PACKAGE_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

static CLASS_NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn package_name_regex() -> &'static Regex {
    PACKAGE_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$")
            .expect("Failed to compile package name regex")
    })
}

fn class_name_regex() -> &'static Regex {
    CLASS_NAME_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("Failed to compile class name regex")
    })
}

/// Metadata registered up front, by class or by package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Registration {
    /// Qualified class name
    pub class: Option<String>,
    pub package: Option<String>,
    /// Package schema location
    pub schema_location: Option<String>,
    pub element_schema_location: Option<String>,
    pub type_schema_location: Option<String>,
}

impl Registration {
    pub fn to_member(&self, loader: &ClassLoader) -> Result<BindingMember> {
        let class = match &self.class {
            Some(name) => Some(loader.load_class(name).ok_or_else(|| {
                BindingError::InvalidArgument(format!("class {} is not in the catalog", name))
            })?),
            None => None,
        };
        let package = match &self.package {
            Some(name) => Some(loader.package(name).ok_or_else(|| {
                BindingError::InvalidArgument(format!("package {} is not in the catalog", name))
            })?),
            None => None,
        };

        let member = match (class, package) {
            (Some(class), Some(package)) => BindingMember::class_in_package(class, &package)?,
            (Some(class), None) => BindingMember::class(class)?,
            (None, Some(package)) => BindingMember::package(package)?,
            (None, None) => {
                return Err(BindingError::InvalidArgument(
                    "a registration names neither a class nor a package".to_string(),
                ));
            }
        };

        let mut member = member;
        if let Some(location) = &self.schema_location {
            member = member.with_schema_location(location.as_str());
        }
        if let Some(location) = &self.element_schema_location {
            member = member.with_element_schema_location(location.as_str());
        }
        if let Some(location) = &self.type_schema_location {
            member = member.with_type_schema_location(location.as_str());
        }
        Ok(member)
    }
}

/// Packages, classes and up-front registrations of one model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub packages: Vec<PackageDescriptor>,
    pub classes: Vec<ClassDescriptor>,
    pub registrations: Vec<Registration>,
}

impl Catalog {
    /// Load a catalog file (TOML or JSON, chosen by extension)
    pub async fn load(path: &Path) -> ConfigResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml(&content),
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some(ext) => Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => Self::from_toml(&content),
        }
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check names and uniqueness
    pub fn validate(&self) -> ConfigResult<()> {
        let mut packages = BTreeSet::new();
        for package in &self.packages {
            if !package_name_regex().is_match(&package.name) {
                return Err(ConfigError::Validation(format!(
                    "Invalid package name: {}",
                    package.name
                )));
            }
            if !packages.insert(package.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "Package {} is declared twice",
                    package.name
                )));
            }
        }

        let mut classes = BTreeSet::new();
        for class in &self.classes {
            if !class.package.is_empty() && !package_name_regex().is_match(&class.package) {
                return Err(ConfigError::Validation(format!(
                    "Invalid package name: {}",
                    class.package
                )));
            }
            if !class_name_regex().is_match(&class.name) {
                return Err(ConfigError::Validation(format!(
                    "Invalid class name: {}",
                    class.name
                )));
            }
            if !classes.insert(class.qualified_name()) {
                return Err(ConfigError::Validation(format!(
                    "Class {} is declared twice",
                    class.qualified_name()
                )));
            }
        }
        Ok(())
    }

    /// Validated class loader over the catalog's packages and classes
    pub fn class_loader(&self) -> ConfigResult<ClassLoader> {
        self.validate()?;
        let mut loader = ClassLoader::new();
        for package in &self.packages {
            loader.define_package(package.clone());
        }
        for class in &self.classes {
            loader.define_class(class.clone());
        }
        Ok(loader)
    }

    pub fn members(&self, loader: &ClassLoader) -> Result<Vec<BindingMember>> {
        self.registrations
            .iter()
            .map(|registration| registration.to_member(loader))
            .collect()
    }
}
