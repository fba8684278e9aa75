//! Concurrent map from binding keys to declared metadata.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::member::{BindingKey, BindingMember};
use crate::model::{ClassLoader, ClassRef};

/// Registered and discovered binding members.
///
/// Reads are lock-free per shard. [`MetadataRegistry::insert`] reports
/// whether the map changed so callers know when derived caches are stale.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    entries: DashMap<BindingKey, BindingMember>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a member; `false` when an equal entry already existed
    pub fn insert(&self, member: BindingMember) -> bool {
        match self.entries.entry(member.key()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get() == &member {
                    false
                } else {
                    occupied.insert(member);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(member);
                true
            }
        }
    }

    pub fn get(&self, key: &BindingKey) -> Option<BindingMember> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: &BindingKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Entry covering `class`: its registered package, else its own class entry.
    ///
    /// Only model packages can be registered, so a package entry always
    /// absorbs the classes it owns.
    pub fn covering(&self, class: &ClassRef) -> Option<BindingMember> {
        self.get(&BindingKey::Package(class.package.clone()))
            .or_else(|| self.get(&BindingKey::Class(class.qualified_name().to_string())))
    }

    /// Whether `member` is a class entry whose package is registered too
    pub fn is_folded(&self, member: &BindingMember) -> bool {
        match member {
            BindingMember::Class { class, .. } => {
                self.contains(&BindingKey::Package(class.package.clone()))
            }
            BindingMember::Package { .. } => false,
        }
    }

    /// Members with class entries folded into their registered packages
    pub fn effective_members(&self) -> Vec<BindingMember> {
        self.members()
            .into_iter()
            .filter(|member| !self.is_folded(member))
            .collect()
    }

    /// Member for a class found during resolution that nothing covers yet.
    ///
    /// A class inside a model package is folded into a package entry so the
    /// whole package binds as one unit.
    pub fn member_for_discovered(
        class: &ClassRef,
        loader: &ClassLoader,
    ) -> Option<BindingMember> {
        if let Some(package) = loader.package_of(class)
            && package.is_model_package()
        {
            return BindingMember::package(package).ok();
        }
        BindingMember::class(class.clone()).ok()
    }

    /// All members in key order
    pub fn members(&self) -> Vec<BindingMember> {
        let mut members: Vec<(BindingKey, BindingMember)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        members.sort_by(|a, b| a.0.cmp(&b.0));
        members.into_iter().map(|(_, member)| member).collect()
    }

    pub fn keys(&self) -> Vec<BindingKey> {
        let mut keys: Vec<BindingKey> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Independent copy of the current entries
    pub fn snapshot(&self) -> Self {
        let entries = DashMap::new();
        for entry in self.entries.iter() {
            entries.insert(entry.key().clone(), entry.value().clone());
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassDescriptor, PackageDescriptor, XmlDecl};

    fn loader() -> ClassLoader {
        ClassLoader::new()
            .with_package(
                PackageDescriptor::new("model")
                    .with_namespace("urn:model")
                    .with_object_factory(),
            )
            .with_package(PackageDescriptor::new("loose"))
            .with_class(ClassDescriptor::new("model", "A").root_element(XmlDecl::new()))
            .with_class(ClassDescriptor::new("loose", "B").root_element(XmlDecl::new()))
    }

    #[test]
    fn test_insert_reports_changes() {
        let loader = loader();
        let registry = MetadataRegistry::new();
        let b = BindingMember::class(loader.load_class("loose.B").unwrap()).unwrap();

        assert!(registry.insert(b.clone()));
        assert!(!registry.insert(b.clone()));
        assert!(registry.insert(b.with_element_schema_location("b.xsd")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_discovered_class_folds_into_model_package() {
        let loader = loader();
        let a = loader.load_class("model.A").unwrap();
        let b = loader.load_class("loose.B").unwrap();

        let member = MetadataRegistry::member_for_discovered(&a, &loader).unwrap();
        assert_eq!(member.key(), BindingKey::Package("model".to_string()));

        let member = MetadataRegistry::member_for_discovered(&b, &loader).unwrap();
        assert_eq!(member.key(), BindingKey::Class("loose.B".to_string()));
    }

    #[test]
    fn test_covering_folds_class_into_registered_package() {
        let loader = loader();
        let registry = MetadataRegistry::new();
        let a = loader.load_class("model.A").unwrap();
        let class_entry = BindingMember::class(a.clone()).unwrap();

        registry.insert(class_entry.clone());
        assert_eq!(
            registry.covering(&a).map(|m| m.key()),
            Some(BindingKey::Class("model.A".to_string()))
        );
        assert!(!registry.is_folded(&class_entry));

        registry.insert(BindingMember::package(loader.package("model").unwrap()).unwrap());
        assert_eq!(
            registry.covering(&a).map(|m| m.key()),
            Some(BindingKey::Package("model".to_string()))
        );
        assert!(registry.is_folded(&class_entry));
        assert_eq!(
            registry
                .effective_members()
                .iter()
                .map(|m| m.key())
                .collect::<Vec<_>>(),
            vec![BindingKey::Package("model".to_string())]
        );
    }

    #[test]
    fn test_unregistered_package_keeps_class_entry() {
        let loader = loader();
        let registry = MetadataRegistry::new();
        let b = loader.load_class("loose.B").unwrap();
        registry.insert(BindingMember::class(b.clone()).unwrap());

        assert_eq!(
            registry.covering(&b).map(|m| m.key()),
            Some(BindingKey::Class("loose.B".to_string()))
        );
        assert_eq!(registry.effective_members().len(), 1);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let loader = loader();
        let registry = MetadataRegistry::new();
        registry.insert(BindingMember::class(loader.load_class("loose.B").unwrap()).unwrap());

        let copy = registry.snapshot();
        copy.insert(BindingMember::package(loader.package("model").unwrap()).unwrap());

        assert_eq!(registry.len(), 1);
        assert_eq!(copy.len(), 2);
        assert_eq!(
            copy.keys(),
            vec![
                BindingKey::Class("loose.B".to_string()),
                BindingKey::Package("model".to_string())
            ]
        );
    }
}
