//! Built-in binding engine over class descriptors.
//!
//! Marshalling writes the root element qualified by the class's element
//! namespace and every property as an unqualified child element, ancestors'
//! properties first. A value whose runtime class differs from the declared
//! one carries `xsi:type`. Unmarshalling reverses this into a
//! [`DynamicObject`] tree.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info};

use crate::access::{bound_members, declared_members};
use crate::compiler::{CompiledSchema, escape_xml};
use crate::engine::{
    BindingContext, BindingEngine, ContextRequest, Marshaller, SchemaOutputSink, Unmarshaller,
};
use crate::error::{BindingError, Result};
use crate::model::{
    ClassLoader, ClassRef, DynamicObject, PropertyValue, TypeRef, Value, XML_SCHEMA_INSTANCE_NS_URI,
    XmlObject,
};
use crate::schemagen;

/// Default engine shipped with the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlBindingEngine;

impl XmlBindingEngine {
    pub fn new() -> Self {
        Self
    }

    fn package_classes(path: &str, loader: &ClassLoader) -> Result<Vec<ClassRef>> {
        let mut classes = Vec::new();
        for name in path.split(':').map(str::trim).filter(|n| !n.is_empty()) {
            let package = loader.package(name).ok_or_else(|| {
                BindingError::Engine(format!("package {} is not known to the class loader", name))
            })?;
            if !package.is_model_package() {
                return Err(BindingError::Engine(format!(
                    "package {} has neither an object factory nor an index resource",
                    name
                )));
            }
            classes.extend(
                loader
                    .classes_in_package(name)
                    .into_iter()
                    .filter(|class| class.is_bindable()),
            );
        }
        Ok(classes)
    }
}

impl BindingEngine for XmlBindingEngine {
    fn new_context(
        &self,
        request: ContextRequest<'_>,
        loader: &Arc<ClassLoader>,
    ) -> Result<Arc<dyn BindingContext>> {
        let seeds = match request {
            ContextRequest::Classes(classes) => classes.to_vec(),
            ContextRequest::ContextPath(path) => Self::package_classes(path, loader)?,
        };
        let data = ContextData::build(seeds, Arc::clone(loader))?;
        info!(
            classes = data.classes.len(),
            elements = data.elements.len(),
            "created binding context"
        );
        Ok(Arc::new(XmlContext {
            data: Arc::new(data),
        }))
    }
}

/// Context produced by [`XmlBindingEngine`]
#[derive(Debug, Clone)]
pub struct XmlContext {
    data: Arc<ContextData>,
}

#[derive(Debug)]
struct ContextData {
    loader: Arc<ClassLoader>,
    classes: BTreeMap<String, ClassRef>,
    /// `(namespace, local name)` of each global element
    elements: BTreeMap<(String, String), ClassRef>,
    /// `(namespace, type name)` of each schema type
    types: BTreeMap<(String, String), ClassRef>,
}

impl ContextData {
    fn build(seeds: Vec<ClassRef>, loader: Arc<ClassLoader>) -> Result<Self> {
        let mut classes = BTreeMap::new();
        let mut queue: VecDeque<ClassRef> = seeds.into_iter().collect();

        while let Some(class) = queue.pop_front() {
            if !class.is_bindable() || classes.contains_key(class.qualified_name()) {
                continue;
            }
            queue.extend(loader.ancestors(&class));
            for member in declared_members(&loader, &class) {
                push_type_classes(&member.declared, &loader, &mut queue);
            }
            queue.extend(class.see_also.iter().filter_map(|name| loader.load_class(name)));
            classes.insert(class.qualified_name().to_string(), class);
        }

        let mut elements = BTreeMap::new();
        let mut types = BTreeMap::new();
        for class in classes.values() {
            if let Some(local) = class.element_name() {
                let key = (loader.element_namespace(class), local);
                if let Some(existing) = elements.insert(key.clone(), class.clone()) {
                    return Err(BindingError::Engine(format!(
                        "{} and {} both declare root element {{{}}}{}",
                        existing, class, key.0, key.1
                    )));
                }
            }
            let key = (loader.type_namespace(class), class.type_name());
            if let Some(existing) = types.insert(key.clone(), class.clone()) {
                return Err(BindingError::Engine(format!(
                    "{} and {} both map to schema type {{{}}}{}",
                    existing, class, key.0, key.1
                )));
            }
        }

        Ok(Self {
            loader,
            classes,
            elements,
            types,
        })
    }

    fn runtime_class(&self, object: &dyn XmlObject) -> Result<ClassRef> {
        self.classes.get(object.class_name()).cloned().ok_or_else(|| {
            BindingError::Marshal(format!(
                "class {} is not known to this context",
                object.class_name()
            ))
        })
    }

    fn expected_elements(&self) -> String {
        self.elements
            .keys()
            .map(|(namespace, local)| format!("{{{}}}{}", namespace, local))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Class named by an `xsi:type` attribute on `node`, if present
    fn xsi_type(&self, node: roxmltree::Node<'_, '_>) -> Result<Option<ClassRef>> {
        let Some(value) = node.attribute((XML_SCHEMA_INSTANCE_NS_URI, "type")) else {
            return Ok(None);
        };
        let (prefix, local) = match value.split_once(':') {
            Some((prefix, local)) => (Some(prefix), local),
            None => (None, value),
        };
        let namespace = node.lookup_namespace_uri(prefix).unwrap_or_default();
        self.types
            .get(&(namespace.to_string(), local.to_string()))
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                BindingError::Unmarshal(format!(
                    "xsi:type {} does not name a type in this context",
                    value
                ))
            })
    }

    fn read_object(&self, node: roxmltree::Node<'_, '_>, class: &ClassRef) -> Result<DynamicObject> {
        let members = bound_members(&self.loader, class);
        let mut object = DynamicObject::of(class);
        let mut lists: BTreeMap<String, Vec<Value>> = BTreeMap::new();

        for child in node.children().filter(|n| n.is_element()) {
            let local = child.tag_name().name();
            let Some((_, member)) = members.iter().find(|(_, m)| m.element_name() == local) else {
                debug!(element = local, class = %class, "ignoring unexpected element");
                continue;
            };

            if let TypeRef::Collection(_) = member.declared {
                let item = member
                    .declared
                    .item_type()
                    .cloned()
                    .unwrap_or_else(TypeRef::string);
                let value = self.read_value(child, &item)?;
                lists.entry(member.name.clone()).or_default().push(value);
            } else {
                let value = self.read_value(child, &member.declared)?;
                object.set(member.name.clone(), value);
            }
        }

        for (name, items) in lists {
            object.set(name, Value::List(items));
        }
        Ok(object)
    }

    fn read_value(&self, node: roxmltree::Node<'_, '_>, declared: &TypeRef) -> Result<Value> {
        let target = match self.xsi_type(node)? {
            Some(class) => Some(class),
            None => match declared {
                TypeRef::Class(name) => self.classes.get(name).cloned(),
                _ => None,
            },
        };
        match target {
            Some(class) => Ok(Value::from(self.read_object(node, &class)?)),
            None => Ok(Value::Text(node.text().unwrap_or_default().to_string())),
        }
    }
}

fn push_type_classes(declared: &TypeRef, loader: &ClassLoader, queue: &mut VecDeque<ClassRef>) {
    match declared {
        TypeRef::Scalar(_) => {}
        TypeRef::Class(name) => queue.extend(loader.load_class(name)),
        TypeRef::Collection(arguments) => {
            for argument in arguments {
                push_type_classes(argument, loader, queue);
            }
        }
    }
}

impl BindingContext for XmlContext {
    fn classes(&self) -> Vec<ClassRef> {
        self.data.classes.values().cloned().collect()
    }

    fn create_marshaller(&self) -> Result<Box<dyn Marshaller>> {
        Ok(Box::new(XmlMarshaller {
            data: Arc::clone(&self.data),
            schema: None,
        }))
    }

    fn create_unmarshaller(&self) -> Result<Box<dyn Unmarshaller>> {
        Ok(Box::new(XmlUnmarshaller {
            data: Arc::clone(&self.data),
            schema: None,
        }))
    }

    fn generate_schema_fragments(&self, sink: &mut dyn SchemaOutputSink) -> Result<()> {
        let classes: Vec<ClassRef> = self.data.classes.values().cloned().collect();
        schemagen::generate_fragments(&self.data.loader, &classes, sink)
    }
}

#[derive(Debug)]
pub struct XmlMarshaller {
    data: Arc<ContextData>,
    schema: Option<Arc<CompiledSchema>>,
}

impl Marshaller for XmlMarshaller {
    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>) {
        self.schema = schema;
    }

    fn schema(&self) -> Option<&Arc<CompiledSchema>> {
        self.schema.as_ref()
    }

    fn marshal(&self, object: &dyn XmlObject) -> Result<String> {
        let class = self.data.runtime_class(object)?;
        let local = class.element_name().ok_or_else(|| {
            BindingError::Marshal(format!(
                "unable to marshal type {} as an element because it has no root element declaration",
                class
            ))
        })?;
        let namespace = self.data.loader.element_namespace(&class);

        let mut writer = XmlWriter::new(&self.data);
        let root_name = if namespace.is_empty() {
            local
        } else {
            format!("{}:{}", writer.prefix_for(&namespace), local)
        };
        writer.path.push(identity(object));
        writer.write_members(&class, object)?;

        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        out.push('<');
        out.push_str(&root_name);
        for (namespace, prefix) in &writer.prefixes {
            out.push_str(&format!(" xmlns:{}=\"{}\"", prefix, escape_xml(namespace)));
        }
        if writer.uses_xsi {
            out.push_str(&format!(" xmlns:xsi=\"{}\"", XML_SCHEMA_INSTANCE_NS_URI));
        }
        if writer.body.is_empty() {
            out.push_str("/>");
        } else {
            out.push('>');
            out.push_str(&writer.body);
            out.push_str(&format!("</{}>", root_name));
        }

        if let Some(schema) = &self.schema {
            schema.validate(out.as_bytes())?;
        }
        Ok(out)
    }
}

fn identity(object: &dyn XmlObject) -> *const () {
    std::ptr::from_ref(object).cast::<()>()
}

struct XmlWriter<'c> {
    data: &'c ContextData,
    body: String,
    /// namespace -> prefix, assigned in first-use order
    prefixes: BTreeMap<String, String>,
    uses_xsi: bool,
    /// objects currently being written, for cycle detection
    path: Vec<*const ()>,
}

impl<'c> XmlWriter<'c> {
    fn new(data: &'c ContextData) -> Self {
        Self {
            data,
            body: String::new(),
            prefixes: BTreeMap::new(),
            uses_xsi: false,
            path: Vec::new(),
        }
    }

    fn prefix_for(&mut self, namespace: &str) -> String {
        let next = format!("ns{}", self.prefixes.len() + 1);
        self.prefixes
            .entry(namespace.to_string())
            .or_insert(next)
            .clone()
    }

    fn qualified_type(&mut self, class: &ClassRef) -> String {
        let namespace = self.data.loader.type_namespace(class);
        if namespace.is_empty() {
            class.type_name()
        } else {
            format!("{}:{}", self.prefix_for(&namespace), class.type_name())
        }
    }

    fn write_members(&mut self, class: &ClassRef, object: &dyn XmlObject) -> Result<()> {
        for (_, member) in bound_members(&self.data.loader, class) {
            let value = object.property(&member.name);
            self.write_value(member.element_name(), &member.declared, value)?;
        }
        Ok(())
    }

    fn write_value(&mut self, name: &str, declared: &TypeRef, value: PropertyValue<'_>) -> Result<()> {
        match value {
            PropertyValue::Null => Ok(()),
            PropertyValue::Text(text) => {
                self.body
                    .push_str(&format!("<{0}>{1}</{0}>", name, escape_xml(&text)));
                Ok(())
            }
            PropertyValue::Object(object) => self.write_object(name, declared, object),
            PropertyValue::List(items) => {
                let item_type = declared.item_type().unwrap_or(declared);
                for item in items {
                    self.write_value(name, item_type, item)?;
                }
                Ok(())
            }
        }
    }

    fn write_object(&mut self, name: &str, declared: &TypeRef, object: &dyn XmlObject) -> Result<()> {
        let runtime = self.data.runtime_class(object)?;
        let id = identity(object);
        if self.path.contains(&id) {
            return Err(BindingError::Marshal(format!(
                "a cycle is detected in the object graph at {}",
                runtime
            )));
        }

        self.body.push('<');
        self.body.push_str(name);
        let declared_matches =
            matches!(declared, TypeRef::Class(name) if name == runtime.qualified_name());
        if !declared_matches {
            let qualified = self.qualified_type(&runtime);
            self.uses_xsi = true;
            self.body
                .push_str(&format!(" xsi:type=\"{}\"", escape_xml(&qualified)));
        }
        self.body.push('>');

        self.path.push(id);
        self.write_members(&runtime, object)?;
        self.path.pop();

        self.body.push_str(&format!("</{}>", name));
        Ok(())
    }
}

#[derive(Debug)]
pub struct XmlUnmarshaller {
    data: Arc<ContextData>,
    schema: Option<Arc<CompiledSchema>>,
}

impl Unmarshaller for XmlUnmarshaller {
    fn set_schema(&mut self, schema: Option<Arc<CompiledSchema>>) {
        self.schema = schema;
    }

    fn schema(&self) -> Option<&Arc<CompiledSchema>> {
        self.schema.as_ref()
    }

    fn unmarshal(&self, xml: &str) -> Result<DynamicObject> {
        let document = roxmltree::Document::parse(xml).map_err(|e| BindingError::XmlProcessing {
            details: e.to_string(),
        })?;
        if let Some(schema) = &self.schema {
            schema.validate(xml.as_bytes())?;
        }

        let root = document.root_element();
        let key = (
            root.tag_name().namespace().unwrap_or_default().to_string(),
            root.tag_name().name().to_string(),
        );
        let declared = self.data.elements.get(&key).ok_or_else(|| {
            BindingError::Unmarshal(format!(
                "unexpected element {{{}}}{}; expected elements are {}",
                key.0,
                key.1,
                self.data.expected_elements()
            ))
        })?;
        let class = match self.data.xsi_type(root)? {
            Some(class) => class,
            None => declared.clone(),
        };
        self.data.read_object(root, &class)
    }
}
