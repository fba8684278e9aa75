//! Dependency resolution: from a seed to the set of classes that must bind together.
//!
//! The walk keeps an explicit worklist and a visited set owned by the call,
//! so cyclic class models and cyclic object graphs terminate and concurrent
//! resolutions never share state.
//!
//! Given a live instance, the runtime class of each property value is used
//! instead of the declared type, so subtypes present in the object graph are
//! picked up even when the declared type is abstract. A null value stops the
//! descent. Given only a class, the declared types are all there is.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use tracing::debug;

use crate::access::{bound_members, declared_members};
use crate::model::{ClassLoader, ClassRef, PropertyValue, TypeRef, XmlObject};

/// Starting point for a resolution
#[derive(Debug, Clone)]
pub enum Seed<'a> {
    Empty,
    Instance(&'a dyn XmlObject),
    Class(ClassRef),
    Classes(Vec<ClassRef>),
    Collection(Vec<&'a dyn XmlObject>),
}

impl Seed<'_> {
    pub fn is_empty(&self) -> bool {
        match self {
            Seed::Empty => true,
            Seed::Classes(classes) => classes.is_empty(),
            Seed::Collection(items) => items.is_empty(),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Seed::Empty => "empty",
            Seed::Instance(_) => "instance",
            Seed::Class(_) => "class",
            Seed::Classes(_) => "classes",
            Seed::Collection(_) => "collection",
        }
    }
}

impl<'a> From<&'a dyn XmlObject> for Seed<'a> {
    fn from(object: &'a dyn XmlObject) -> Self {
        Seed::Instance(object)
    }
}

impl From<ClassRef> for Seed<'_> {
    fn from(class: ClassRef) -> Self {
        Seed::Class(class)
    }
}

impl From<Vec<ClassRef>> for Seed<'_> {
    fn from(classes: Vec<ClassRef>) -> Self {
        Seed::Classes(classes)
    }
}

/// Computes the transitive set of bindable classes reachable from a seed.
///
/// Implementations must be pure: the result depends only on the seed and the
/// class loader. Ordering of the returned set is not significant.
pub trait DependencyResolver: Send + Sync + fmt::Debug {
    fn resolve(&self, seed: &Seed<'_>, loader: &ClassLoader) -> HashSet<ClassRef>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDependencyResolver;

impl DependencyResolver for DefaultDependencyResolver {
    fn resolve(&self, seed: &Seed<'_>, loader: &ClassLoader) -> HashSet<ClassRef> {
        let mut walk = Walk::new(loader);

        match seed {
            Seed::Empty => {}
            Seed::Instance(object) => walk.queue.push_back(Work::Instance(*object)),
            Seed::Class(class) => walk.queue.push_back(Work::Class(class.clone())),
            Seed::Classes(classes) => {
                for class in classes {
                    walk.queue.push_back(Work::Class(class.clone()));
                }
            }
            Seed::Collection(items) => {
                for item in items {
                    walk.queue.push_back(Work::Instance(*item));
                }
            }
        }

        walk.run();
        debug!(
            seed = seed.kind(),
            classes = walk.found.len(),
            "resolved binding classes"
        );
        walk.found
    }
}

enum Work<'a> {
    Class(ClassRef),
    Instance(&'a dyn XmlObject),
}

struct Walk<'a, 'l> {
    loader: &'l ClassLoader,
    queue: VecDeque<Work<'a>>,
    visited_classes: HashSet<String>,
    visited_instances: HashSet<*const ()>,
    found: HashSet<ClassRef>,
}

impl<'a, 'l> Walk<'a, 'l> {
    fn new(loader: &'l ClassLoader) -> Self {
        Self {
            loader,
            queue: VecDeque::new(),
            visited_classes: HashSet::new(),
            visited_instances: HashSet::new(),
            found: HashSet::new(),
        }
    }

    fn run(&mut self) {
        while let Some(work) = self.queue.pop_front() {
            match work {
                Work::Class(class) => self.visit_class(class),
                Work::Instance(object) => self.visit_instance(object),
            }
        }
    }

    fn visit_class(&mut self, class: ClassRef) {
        if !self.visited_classes.insert(class.qualified_name().to_string()) {
            return;
        }
        if !class.is_bindable() {
            return;
        }

        for ancestor in self.loader.ancestors(&class) {
            if ancestor.is_bindable() {
                self.queue.push_back(Work::Class(ancestor));
            }
        }

        let declared: Vec<TypeRef> = declared_members(self.loader, &class)
            .map(|member| member.declared.clone())
            .collect();
        for type_ref in &declared {
            self.push_type(type_ref);
        }

        self.push_see_also(&class);
        self.found.insert(class);
    }

    fn visit_instance(&mut self, object: &'a dyn XmlObject) {
        let identity = std::ptr::from_ref(object).cast::<()>();
        if !self.visited_instances.insert(identity) {
            return;
        }

        let Some(class) = self.loader.load_class(object.class_name()) else {
            debug!(class = object.class_name(), "skipping instance of unknown class");
            return;
        };
        if !class.is_bindable() {
            return;
        }

        for ancestor in self.loader.ancestors(&class) {
            if ancestor.is_bindable() {
                self.push_see_also(&ancestor);
                self.found.insert(ancestor);
            }
        }
        self.push_see_also(&class);

        for (_, member) in bound_members(self.loader, &class) {
            let value = object.property(&member.name);
            self.push_value(value);
        }
        self.found.insert(class);
    }

    fn push_type(&mut self, type_ref: &TypeRef) {
        match type_ref {
            TypeRef::Scalar(_) => {}
            TypeRef::Class(name) => match self.loader.load_class(name) {
                Some(class) => self.queue.push_back(Work::Class(class)),
                None => debug!(class = %name, "skipping unknown declared type"),
            },
            TypeRef::Collection(arguments) => {
                for argument in arguments {
                    self.push_type(argument);
                }
            }
        }
    }

    fn push_value(&mut self, value: PropertyValue<'a>) {
        match value {
            PropertyValue::Null | PropertyValue::Text(_) => {}
            PropertyValue::Object(object) => self.queue.push_back(Work::Instance(object)),
            PropertyValue::List(items) => {
                for item in items {
                    self.push_value(item);
                }
            }
        }
    }

    fn push_see_also(&mut self, class: &ClassRef) {
        for name in &class.see_also {
            if let Some(alternate) = self.loader.load_class(name) {
                self.queue.push_back(Work::Class(alternate));
            }
        }
    }
}
