//! Canonical, hashable description of one binding context.

use std::collections::BTreeSet;

use crate::member::{BindingMember, SchemaLocation};
use crate::model::{ClassLoader, ClassRef};

/// Which classes and packages bind together, plus their external schema documents.
///
/// Equality and hashing cover the class set, the context path and the
/// schema-location pairs, which makes this the key of both caches. All three
/// are kept sorted and deduplicated, so registration order never matters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingDetails {
    classes: BTreeSet<ClassRef>,
    packages: BTreeSet<String>,
    schema_locations: BTreeSet<SchemaLocation>,
}

impl BindingDetails {
    pub fn classes(&self) -> impl Iterator<Item = &ClassRef> {
        self.classes.iter()
    }

    pub fn has_classes(&self) -> bool {
        !self.classes.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    /// Colon-joined package names, when built from packages
    pub fn context_path(&self) -> Option<String> {
        if self.packages.is_empty() {
            None
        } else {
            Some(self.packages().collect::<Vec<_>>().join(":"))
        }
    }

    pub fn schema_locations(&self) -> &BTreeSet<SchemaLocation> {
        &self.schema_locations
    }

    pub fn has_schema_locations(&self) -> bool {
        !self.schema_locations.is_empty()
    }

    /// Space-joined `namespace location` pairs in sorted order
    pub fn schema_location(&self) -> String {
        self.schema_locations
            .iter()
            .map(SchemaLocation::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Namespaces whose schema is supplied externally
    pub fn external_namespaces(&self) -> BTreeSet<String> {
        self.schema_locations
            .iter()
            .map(|pair| pair.namespace.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.packages.is_empty()
    }

    /// Short human-readable description used in errors and logs
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.classes.is_empty() {
            let names: Vec<&str> = self.classes.iter().map(|c| c.qualified_name()).collect();
            parts.push(format!("classes=[{}]", names.join(", ")));
        }
        if let Some(path) = self.context_path() {
            parts.push(format!("contextPath={}", path));
        }
        if !self.schema_locations.is_empty() {
            parts.push(format!("schemaLocation=\"{}\"", self.schema_location()));
        }
        if parts.is_empty() {
            "<empty>".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Folds registry members into [`BindingDetails`]
#[derive(Debug, Clone, Default)]
pub struct DetailsBuilder {
    classes: BTreeSet<ClassRef>,
    packages: BTreeSet<String>,
    schema_locations: BTreeSet<SchemaLocation>,
}

impl DetailsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, member: &BindingMember, loader: &ClassLoader) -> &mut Self {
        match member {
            BindingMember::Class { class, .. } => {
                self.classes.insert(class.clone());
            }
            BindingMember::Package { package, .. } => {
                self.packages.insert(package.name.clone());
            }
        }
        self.schema_locations
            .extend(member.schema_locations(loader));
        self
    }

    pub fn with(mut self, member: &BindingMember, loader: &ClassLoader) -> Self {
        self.add(member, loader);
        self
    }

    /// Union of both builders' classes, packages and schema locations
    pub fn merge(mut self, other: DetailsBuilder) -> Self {
        self.classes.extend(other.classes);
        self.packages.extend(other.packages);
        self.schema_locations.extend(other.schema_locations);
        self
    }

    pub fn build(&self) -> BindingDetails {
        BindingDetails {
            classes: self.classes.clone(),
            packages: self.packages.clone(),
            schema_locations: self.schema_locations.clone(),
        }
    }
}
