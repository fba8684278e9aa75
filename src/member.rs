//! Registry entries: one bindable class or one model package.

use std::fmt;

use crate::error::{BindingError, Result};
use crate::model::{ClassLoader, ClassRef, PackageRef};

/// Registry key; classes order before packages, then by name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingKey {
    Class(String),
    Package(String),
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKey::Class(name) => write!(f, "class {}", name),
            BindingKey::Package(name) => write!(f, "package {}", name),
        }
    }
}

/// A `(namespace, location)` pair naming an externally supplied schema document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaLocation {
    pub namespace: String,
    pub location: String,
}

impl SchemaLocation {
    pub fn new(namespace: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            location: location.into(),
        }
    }
}

impl fmt::Display for SchemaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.namespace, self.location)
    }
}

/// Declared binding metadata for a class or a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingMember {
    Class {
        class: ClassRef,
        /// Schema document for the class's root element
        element_schema_location: Option<String>,
        /// Schema document for the class's type
        type_schema_location: Option<String>,
    },
    Package {
        package: PackageRef,
        schema_location: Option<String>,
    },
}

impl BindingMember {
    /// Member for a single class, which must carry a root-element or type declaration
    pub fn class(class: ClassRef) -> Result<Self> {
        if !class.is_bindable() {
            return Err(BindingError::InvalidArgument(format!(
                "class {} has neither a root element nor a type declaration",
                class
            )));
        }
        Ok(BindingMember::Class {
            class,
            element_schema_location: None,
            type_schema_location: None,
        })
    }

    /// Member for a class whose owning package is supplied alongside
    pub fn class_in_package(class: ClassRef, package: &PackageRef) -> Result<Self> {
        if class.package != package.name {
            return Err(BindingError::InvalidArgument(format!(
                "class {} does not belong to package {}",
                class, package.name
            )));
        }
        Self::class(class)
    }

    /// Member for a whole package, which must be a model package
    pub fn package(package: PackageRef) -> Result<Self> {
        if !package.is_model_package() {
            return Err(BindingError::InvalidArgument(format!(
                "package {} has neither an object factory nor an index resource",
                package.name
            )));
        }
        Ok(BindingMember::Package {
            package,
            schema_location: None,
        })
    }

    /// Set the root-element schema location; ignored for package members
    pub fn with_element_schema_location(mut self, location: impl Into<String>) -> Self {
        if let BindingMember::Class {
            element_schema_location,
            ..
        } = &mut self
        {
            *element_schema_location = Some(location.into());
        }
        self
    }

    /// Set the type schema location; ignored for package members
    pub fn with_type_schema_location(mut self, location: impl Into<String>) -> Self {
        if let BindingMember::Class {
            type_schema_location,
            ..
        } = &mut self
        {
            *type_schema_location = Some(location.into());
        }
        self
    }

    /// Set the package schema location; ignored for class members
    pub fn with_schema_location(mut self, location: impl Into<String>) -> Self {
        if let BindingMember::Package {
            schema_location, ..
        } = &mut self
        {
            *schema_location = Some(location.into());
        }
        self
    }

    pub fn key(&self) -> BindingKey {
        match self {
            BindingMember::Class { class, .. } => {
                BindingKey::Class(class.qualified_name().to_string())
            }
            BindingMember::Package { package, .. } => BindingKey::Package(package.name.clone()),
        }
    }

    /// Schema-location pairs this member contributes.
    ///
    /// A pair is emitted only for a non-blank location whose namespace can be
    /// derived from the class's own declaration or its package.
    pub fn schema_locations(&self, loader: &ClassLoader) -> Vec<SchemaLocation> {
        let mut pairs = Vec::new();
        match self {
            BindingMember::Class {
                class,
                element_schema_location,
                type_schema_location,
            } => {
                if let Some(location) = non_blank(element_schema_location)
                    && let Some(namespace) = loader.declared_element_namespace(class)
                {
                    pairs.push(SchemaLocation::new(namespace, location));
                }
                if let Some(location) = non_blank(type_schema_location)
                    && let Some(namespace) = loader.declared_type_namespace(class)
                {
                    pairs.push(SchemaLocation::new(namespace, location));
                }
            }
            BindingMember::Package {
                package,
                schema_location,
            } => {
                if let Some(location) = non_blank(schema_location)
                    && let Some(namespace) = package.namespace.clone()
                {
                    pairs.push(SchemaLocation::new(namespace, location));
                }
            }
        }
        pairs
    }
}

fn non_blank(location: &Option<String>) -> Option<&str> {
    location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty())
}
