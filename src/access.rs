//! Member eligibility under the four access policies.

use crate::model::{AccessType, ClassLoader, ClassRef, PropertyDescriptor, PropertyKind};

impl AccessType {
    /// Whether a member takes part in binding under this policy
    pub fn includes(self, member: &PropertyDescriptor) -> bool {
        if member.is_static || member.transient || member.excluded {
            return false;
        }
        if member.annotated {
            return true;
        }

        match (self, member.kind) {
            (AccessType::Field, PropertyKind::Field) => true,
            (AccessType::Property, PropertyKind::Accessor) => member.paired,
            (AccessType::PublicMember, PropertyKind::Field) => member.public,
            (AccessType::PublicMember, PropertyKind::Accessor) => member.public && member.paired,
            _ => false,
        }
    }
}

/// Eligible members declared directly on `class`
pub fn declared_members<'a>(
    loader: &ClassLoader,
    class: &'a ClassRef,
) -> impl Iterator<Item = &'a PropertyDescriptor> {
    let policy = loader.access_type_for(class);
    class
        .properties
        .iter()
        .filter(move |member| policy.includes(member))
}

/// Eligible members of `class` and its bindable ancestors, ancestors first
pub fn bound_members(loader: &ClassLoader, class: &ClassRef) -> Vec<(ClassRef, PropertyDescriptor)> {
    let mut hierarchy: Vec<ClassRef> = loader
        .ancestors(class)
        .into_iter()
        .filter(|ancestor| ancestor.is_bindable())
        .collect();
    hierarchy.reverse();
    hierarchy.push(class.clone());

    let mut members = Vec::new();
    for owner in &hierarchy {
        for member in declared_members(loader, owner) {
            members.push((owner.clone(), member.clone()));
        }
    }
    members
}
