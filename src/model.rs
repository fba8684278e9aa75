//! Type descriptors for bindable classes and packages.
//!
//! Rust has no runtime reflection, so the class graph a binding context is
//! built from is described explicitly: a [`ClassLoader`] owns immutable
//! [`PackageDescriptor`]s and [`ClassDescriptor`]s and resolves them by
//! qualified name. Classes refer to each other by name, which keeps cyclic
//! models expressible and lets unknown names drop out silently during
//! resolution.
//!
//! Live object graphs are exposed through the [`XmlObject`] trait, which
//! reports the runtime class of a value and a borrowed view of each property.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// W3C XML Schema language identifier
pub const W3C_XML_SCHEMA_NS_URI: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace (used for `xsi:type`)
pub const XML_SCHEMA_INSTANCE_NS_URI: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Which members of a class take part in binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    /// Every non-static, non-transient field
    Field,
    /// Every read/write accessor pair
    Property,
    /// Public fields and public accessor pairs, plus anything explicitly marked
    #[default]
    PublicMember,
    /// Only explicitly marked members
    None,
}

/// Built-in value types mapped onto XML Schema simple types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Int,
    Long,
    Boolean,
    Double,
    Decimal,
    DateTime,
    Base64,
}

impl ScalarType {
    /// Local name of the matching XML Schema built-in type
    pub fn xsd_name(self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Long => "long",
            ScalarType::Boolean => "boolean",
            ScalarType::Double => "double",
            ScalarType::Decimal => "decimal",
            ScalarType::DateTime => "dateTime",
            ScalarType::Base64 => "base64Binary",
        }
    }
}

/// Declared type of a property
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeRef {
    Scalar(ScalarType),
    /// Reference to a class by qualified name
    Class(String),
    /// Collection-like type with its generic type arguments
    Collection(Vec<TypeRef>),
}

impl TypeRef {
    pub fn string() -> Self {
        TypeRef::Scalar(ScalarType::String)
    }

    pub fn class(qualified_name: impl Into<String>) -> Self {
        TypeRef::Class(qualified_name.into())
    }

    pub fn list_of(element: TypeRef) -> Self {
        TypeRef::Collection(vec![element])
    }

    pub fn map_of(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Collection(vec![key, value])
    }

    /// Element type used when the value is written as repeated XML elements
    pub fn item_type(&self) -> Option<&TypeRef> {
        match self {
            TypeRef::Collection(args) => args.last(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Field,
    Accessor,
}

/// One field or accessor of a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub name: String,
    /// Overrides the element name used in XML
    #[serde(default)]
    pub xml_name: Option<String>,
    pub kind: PropertyKind,
    #[serde(rename = "type")]
    pub declared: TypeRef,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub transient: bool,
    /// Explicitly marked for binding
    #[serde(default)]
    pub annotated: bool,
    /// Explicitly excluded from binding
    #[serde(default)]
    pub excluded: bool,
    /// Accessor has both a reader and a writer
    #[serde(default)]
    pub paired: bool,
}

impl PropertyDescriptor {
    /// A private field
    pub fn field(name: impl Into<String>, declared: TypeRef) -> Self {
        Self {
            name: name.into(),
            xml_name: None,
            kind: PropertyKind::Field,
            declared,
            public: false,
            is_static: false,
            transient: false,
            annotated: false,
            excluded: false,
            paired: false,
        }
    }

    /// A public getter/setter pair
    pub fn accessor(name: impl Into<String>, declared: TypeRef) -> Self {
        Self {
            kind: PropertyKind::Accessor,
            public: true,
            paired: true,
            ..Self::field(name, declared)
        }
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn annotated(mut self) -> Self {
        self.annotated = true;
        self
    }

    pub fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    pub fn static_member(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.paired = false;
        self
    }

    pub fn xml_name(mut self, name: impl Into<String>) -> Self {
        self.xml_name = Some(name.into());
        self
    }

    /// Name of the XML element this property is written as
    pub fn element_name(&self) -> &str {
        self.xml_name.as_deref().unwrap_or(&self.name)
    }
}

/// Root-element or type declaration; `None` fields inherit defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct XmlDecl {
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl XmlDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: Some(name.into()),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Package-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    /// Namespace from the package-level schema declaration
    #[serde(default)]
    pub namespace: Option<String>,
    /// Package carries a registry (object factory) type
    #[serde(default)]
    pub has_object_factory: bool,
    /// Package carries a sibling index resource listing its classes
    #[serde(default)]
    pub has_index: bool,
    #[serde(default)]
    pub access_type: Option<AccessType>,
}

impl PackageDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            has_object_factory: false,
            has_index: false,
            access_type: None,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_object_factory(mut self) -> Self {
        self.has_object_factory = true;
        self
    }

    pub fn with_index(mut self) -> Self {
        self.has_index = true;
        self
    }

    pub fn with_access_type(mut self, access_type: AccessType) -> Self {
        self.access_type = Some(access_type);
        self
    }

    /// A model package can be bound as a whole through a context path
    pub fn is_model_package(&self) -> bool {
        self.has_object_factory || self.has_index
    }
}

/// Class-level metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    #[serde(default)]
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub root_element: Option<XmlDecl>,
    #[serde(default)]
    pub xml_type: Option<XmlDecl>,
    #[serde(default)]
    pub access_type: Option<AccessType>,
    #[serde(default)]
    pub see_also: Vec<String>,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub properties: Vec<PropertyDescriptor>,
}

impl ClassDescriptor {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
            superclass: None,
            root_element: None,
            xml_type: None,
            access_type: None,
            see_also: Vec::new(),
            is_abstract: false,
            properties: Vec::new(),
        }
    }

    pub fn root_element(mut self, decl: XmlDecl) -> Self {
        self.root_element = Some(decl);
        self
    }

    pub fn xml_type(mut self, decl: XmlDecl) -> Self {
        self.xml_type = Some(decl);
        self
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn see_also(mut self, class: impl Into<String>) -> Self {
        self.see_also.push(class.into());
        self
    }

    pub fn access(mut self, access_type: AccessType) -> Self {
        self.access_type = Some(access_type);
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    pub fn qualified_name(&self) -> String {
        if self.package.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.package, self.name)
        }
    }

    /// Carries a root-element or type declaration
    pub fn is_bindable(&self) -> bool {
        self.root_element.is_some() || self.xml_type.is_some()
    }

    /// Local name of the global element, if the class is a root element
    pub fn element_name(&self) -> Option<String> {
        self.root_element.as_ref().map(|decl| {
            decl.name
                .clone()
                .unwrap_or_else(|| decapitalize(&self.name))
        })
    }

    /// Local name of the XML Schema type generated for the class
    pub fn type_name(&self) -> String {
        self.xml_type
            .as_ref()
            .and_then(|decl| decl.name.clone())
            .unwrap_or_else(|| decapitalize(&self.name))
    }
}

/// Lower-cases the first character, leaving acronyms such as `URL` intact
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match (chars.next(), chars.next()) {
        (Some(first), Some(second)) if first.is_uppercase() && second.is_uppercase() => {
            name.to_string()
        }
        (Some(first), _) => first.to_lowercase().chain(name.chars().skip(1)).collect(),
        (None, _) => String::new(),
    }
}

/// Shared handle to a class descriptor, identified by qualified name
#[derive(Clone)]
pub struct ClassRef {
    qualified: Arc<str>,
    inner: Arc<ClassDescriptor>,
}

impl ClassRef {
    pub fn new(descriptor: ClassDescriptor) -> Self {
        Self {
            qualified: Arc::from(descriptor.qualified_name()),
            inner: Arc::new(descriptor),
        }
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified
    }

    pub fn descriptor(&self) -> &Arc<ClassDescriptor> {
        &self.inner
    }
}

impl Deref for ClassRef {
    type Target = ClassDescriptor;

    fn deref(&self) -> &ClassDescriptor {
        &self.inner
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.qualified == other.qualified
    }
}

impl Eq for ClassRef {}

impl PartialOrd for ClassRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.qualified.cmp(&other.qualified)
    }
}

impl Hash for ClassRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.qualified.hash(state);
    }
}

impl fmt::Debug for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassRef({})", self.qualified)
    }
}

impl fmt::Display for ClassRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified)
    }
}

/// Shared handle to a package descriptor, identified by name
#[derive(Clone)]
pub struct PackageRef(Arc<PackageDescriptor>);

impl PackageRef {
    pub fn new(descriptor: PackageDescriptor) -> Self {
        Self(Arc::new(descriptor))
    }
}

impl Deref for PackageRef {
    type Target = PackageDescriptor;

    fn deref(&self) -> &PackageDescriptor {
        &self.0
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.name == other.0.name
    }
}

impl Eq for PackageRef {}

impl PartialOrd for PackageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.name.cmp(&other.0.name)
    }
}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.name.hash(state);
    }
}

impl fmt::Debug for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackageRef({})", self.0.name)
    }
}

/// Catalog of known packages and classes, looked up by name
#[derive(Debug, Clone, Default)]
pub struct ClassLoader {
    packages: BTreeMap<String, PackageRef>,
    classes: BTreeMap<String, ClassRef>,
}

impl ClassLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_package(&mut self, descriptor: PackageDescriptor) -> PackageRef {
        let package = PackageRef::new(descriptor);
        self.packages.insert(package.name.clone(), package.clone());
        package
    }

    pub fn define_class(&mut self, descriptor: ClassDescriptor) -> ClassRef {
        let class = ClassRef::new(descriptor);
        self.classes
            .insert(class.qualified_name().to_string(), class.clone());
        class
    }

    pub fn with_package(mut self, descriptor: PackageDescriptor) -> Self {
        self.define_package(descriptor);
        self
    }

    pub fn with_class(mut self, descriptor: ClassDescriptor) -> Self {
        self.define_class(descriptor);
        self
    }

    pub fn load_class(&self, qualified_name: &str) -> Option<ClassRef> {
        self.classes.get(qualified_name).cloned()
    }

    pub fn package(&self, name: &str) -> Option<PackageRef> {
        self.packages.get(name).cloned()
    }

    pub fn package_of(&self, class: &ClassDescriptor) -> Option<PackageRef> {
        self.package(&class.package)
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassRef> {
        self.classes.values()
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageRef> {
        self.packages.values()
    }

    pub fn classes_in_package(&self, package: &str) -> Vec<ClassRef> {
        self.classes
            .values()
            .filter(|class| class.package == package)
            .cloned()
            .collect()
    }

    pub fn superclass(&self, class: &ClassDescriptor) -> Option<ClassRef> {
        class
            .superclass
            .as_deref()
            .and_then(|name| self.load_class(name))
    }

    /// Known ancestors, nearest first
    pub fn ancestors(&self, class: &ClassRef) -> Vec<ClassRef> {
        let mut seen = BTreeSet::new();
        seen.insert(class.qualified_name().to_string());

        let mut chain = Vec::new();
        let mut current = self.superclass(class);
        while let Some(ancestor) = current {
            if !seen.insert(ancestor.qualified_name().to_string()) {
                break;
            }
            current = self.superclass(&ancestor);
            chain.push(ancestor);
        }
        chain
    }

    /// Effective access policy: class level, then package level, then the default
    pub fn access_type_for(&self, class: &ClassDescriptor) -> AccessType {
        class
            .access_type
            .or_else(|| self.package_of(class).and_then(|p| p.access_type))
            .unwrap_or_default()
    }

    /// Namespace from the enclosing package's schema declaration
    pub fn package_namespace(&self, class: &ClassDescriptor) -> Option<String> {
        self.package_of(class).and_then(|p| p.namespace.clone())
    }

    /// Namespace derivable for the class's root element, if any
    pub fn declared_element_namespace(&self, class: &ClassDescriptor) -> Option<String> {
        class
            .root_element
            .as_ref()
            .and_then(|decl| decl.namespace.clone())
            .or_else(|| self.package_namespace(class))
    }

    /// Namespace derivable for the class's schema type, if any
    pub fn declared_type_namespace(&self, class: &ClassDescriptor) -> Option<String> {
        class
            .xml_type
            .as_ref()
            .and_then(|decl| decl.namespace.clone())
            .or_else(|| self.package_namespace(class))
    }

    pub fn element_namespace(&self, class: &ClassDescriptor) -> String {
        self.declared_element_namespace(class).unwrap_or_default()
    }

    pub fn type_namespace(&self, class: &ClassDescriptor) -> String {
        self.declared_type_namespace(class).unwrap_or_default()
    }
}

/// A live object whose runtime class and property values can be inspected
pub trait XmlObject: fmt::Debug + Send + Sync {
    /// Qualified name of the runtime class
    fn class_name(&self) -> &str;

    /// Current value of a property; unknown properties read as `Null`
    fn property(&self, name: &str) -> PropertyValue<'_>;
}

/// Borrowed view of a property value
#[derive(Debug, Clone)]
pub enum PropertyValue<'a> {
    Null,
    Text(Cow<'a, str>),
    Object(&'a dyn XmlObject),
    List(Vec<PropertyValue<'a>>),
}

impl<'a> PropertyValue<'a> {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text.as_ref()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&'a dyn XmlObject> {
        match self {
            PropertyValue::Object(object) => Some(*object),
            _ => None,
        }
    }
}

/// Owned property value stored by [`DynamicObject`]
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Text(String),
    Object(Arc<dyn XmlObject>),
    List(Vec<Value>),
}

impl Value {
    pub fn text(text: impl Into<String>) -> Self {
        Value::Text(text.into())
    }

    pub fn object(object: impl XmlObject + 'static) -> Self {
        Value::Object(Arc::new(object))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&dyn XmlObject> {
        match self {
            Value::Object(object) => Some(object.as_ref()),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn view(&self) -> PropertyValue<'_> {
        match self {
            Value::Null => PropertyValue::Null,
            Value::Text(text) => PropertyValue::Text(Cow::Borrowed(text)),
            Value::Object(object) => PropertyValue::Object(object.as_ref()),
            Value::List(items) => PropertyValue::List(items.iter().map(Value::view).collect()),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Value::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<DynamicObject> for Value {
    fn from(object: DynamicObject) -> Self {
        Value::Object(Arc::new(object))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// General-purpose object: a runtime class name plus named property values
#[derive(Debug, Clone)]
pub struct DynamicObject {
    class_name: String,
    properties: BTreeMap<String, Value>,
}

impl DynamicObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn of(class: &ClassRef) -> Self {
        Self::new(class.qualified_name())
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.properties.iter()
    }
}

impl XmlObject for DynamicObject {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn property(&self, name: &str) -> PropertyValue<'_> {
        self.properties
            .get(name)
            .map(Value::view)
            .unwrap_or(PropertyValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ClassLoader {
        ClassLoader::new()
            .with_package(
                PackageDescriptor::new("com.acme.orders")
                    .with_namespace("urn:orders")
                    .with_object_factory(),
            )
            .with_class(
                ClassDescriptor::new("com.acme.orders", "Base")
                    .xml_type(XmlDecl::new().in_namespace("urn:base")),
            )
            .with_class(
                ClassDescriptor::new("com.acme.orders", "Order")
                    .root_element(XmlDecl::new())
                    .extends("com.acme.orders.Base"),
            )
    }

    #[test]
    fn test_decapitalize() {
        assert_eq!(decapitalize("Order"), "order");
        assert_eq!(decapitalize("URLList"), "URLList");
        assert_eq!(decapitalize("a"), "a");
        assert_eq!(decapitalize(""), "");
    }

    #[test]
    fn test_class_ref_identity_is_by_name() {
        let a = ClassRef::new(ClassDescriptor::new("p", "A"));
        let b = ClassRef::new(ClassDescriptor::new("p", "A").abstract_class());
        assert_eq!(a, b);
        assert_eq!(a.qualified_name(), "p.A");
        assert!(ClassRef::new(ClassDescriptor::new("", "Z")).qualified_name() == "Z");
    }

    #[test]
    fn test_namespace_derivation() {
        let loader = loader();
        let order = loader.load_class("com.acme.orders.Order").unwrap();
        let base = loader.load_class("com.acme.orders.Base").unwrap();

        assert_eq!(loader.element_namespace(&order), "urn:orders");
        assert_eq!(loader.type_namespace(&base), "urn:base");
        assert_eq!(loader.type_namespace(&order), "urn:orders");
        assert_eq!(order.element_name().as_deref(), Some("order"));
        assert_eq!(base.element_name(), None);
    }

    #[test]
    fn test_ancestors_stop_on_cycle() {
        let loader = ClassLoader::new()
            .with_class(ClassDescriptor::new("p", "A").extends("p.B"))
            .with_class(ClassDescriptor::new("p", "B").extends("p.A"));
        let a = loader.load_class("p.A").unwrap();
        let chain = loader.ancestors(&a);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].qualified_name(), "p.B");
    }

    #[test]
    fn test_dynamic_object_views() {
        let child = DynamicObject::new("p.Child").with("name", "leaf");
        let parent = DynamicObject::new("p.Parent")
            .with("child", child)
            .with("tags", vec![Value::text("a"), Value::text("b")]);

        assert_eq!(parent.class_name(), "p.Parent");
        let nested = parent.property("child").as_object().unwrap();
        assert_eq!(nested.property("name").as_text(), Some("leaf"));
        match parent.property("tags") {
            PropertyValue::List(items) => assert_eq!(items.len(), 2),
            other => panic!("Expected list, got {:?}", other),
        }
        assert!(parent.property("missing").is_null());
    }
}
