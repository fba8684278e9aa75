//! Schema fragment generation, one document per namespace.

use std::collections::{BTreeMap, BTreeSet};

use crate::access::{bound_members, declared_members};
use crate::compiler::escape_xml;
use crate::engine::SchemaOutputSink;
use crate::error::Result;
use crate::model::{ClassLoader, ClassRef, PropertyDescriptor, TypeRef, W3C_XML_SCHEMA_NS_URI};

#[derive(Debug, Default)]
struct SchemaDocument {
    elements: Vec<String>,
    types: Vec<String>,
}

impl SchemaDocument {
    fn render(&self, namespace: &str) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n");
        out.push_str(&format!(
            "<xs:schema version=\"1.0\" xmlns:xs=\"{}\"",
            W3C_XML_SCHEMA_NS_URI
        ));
        if !namespace.is_empty() {
            let namespace = escape_xml(namespace);
            out.push_str(&format!(
                " xmlns:tns=\"{0}\" targetNamespace=\"{0}\"",
                namespace
            ));
        }
        out.push_str(">\n");
        for element in &self.elements {
            out.push_str(element);
        }
        for complex_type in &self.types {
            out.push_str(complex_type);
        }
        out.push_str("</xs:schema>\n");
        out
    }
}

/// Write one `xs:schema` per namespace used by `classes` into `sink`.
///
/// Documents are offered in namespace order with suggested names
/// `schema1.xsd`, `schema2.xsd` and so on. References to classes in another
/// namespace are typed `xs:anyType`, so every fragment stands alone.
pub fn generate_fragments(
    loader: &ClassLoader,
    classes: &[ClassRef],
    sink: &mut dyn SchemaOutputSink,
) -> Result<()> {
    let known: BTreeSet<&str> = classes.iter().map(|c| c.qualified_name()).collect();
    let mut documents: BTreeMap<String, SchemaDocument> = BTreeMap::new();

    for class in classes {
        let type_namespace = loader.type_namespace(class);
        let complex_type = complex_type(loader, class, &type_namespace, &known);
        documents
            .entry(type_namespace.clone())
            .or_default()
            .types
            .push(complex_type);

        if let Some(element) = class.element_name() {
            let element_namespace = loader.element_namespace(class);
            let type_ref = if element_namespace == type_namespace {
                qualified(&type_namespace, &class.type_name())
            } else {
                "xs:anyType".to_string()
            };
            documents
                .entry(element_namespace)
                .or_default()
                .elements
                .push(format!(
                    "  <xs:element name=\"{}\" type=\"{}\"/>\n",
                    element, type_ref
                ));
        }
    }

    for (index, (namespace, document)) in documents.iter().enumerate() {
        let suggested = format!("schema{}.xsd", index + 1);
        if let Some(out) = sink.create_output(namespace, &suggested) {
            out.push_str(&document.render(namespace));
        }
    }
    Ok(())
}

fn complex_type(
    loader: &ClassLoader,
    class: &ClassRef,
    namespace: &str,
    known: &BTreeSet<&str>,
) -> String {
    let mut out = format!("  <xs:complexType name=\"{}\"", class.type_name());
    if class.is_abstract {
        out.push_str(" abstract=\"true\"");
    }
    out.push_str(">\n");

    let parent = loader
        .ancestors(class)
        .into_iter()
        .find(|ancestor| ancestor.is_bindable() && known.contains(ancestor.qualified_name()));

    match parent {
        Some(parent) if loader.type_namespace(&parent) == namespace => {
            out.push_str("    <xs:complexContent>\n");
            out.push_str(&format!(
                "      <xs:extension base=\"{}\">\n",
                qualified(namespace, &parent.type_name())
            ));
            let members: Vec<&PropertyDescriptor> = declared_members(loader, class).collect();
            push_sequence(&mut out, &members, loader, namespace, known, "        ");
            out.push_str("      </xs:extension>\n");
            out.push_str("    </xs:complexContent>\n");
        }
        // no same-namespace base type: inherited members are flattened in
        _ => {
            let members = bound_members(loader, class);
            let members: Vec<&PropertyDescriptor> = members.iter().map(|(_, m)| m).collect();
            push_sequence(&mut out, &members, loader, namespace, known, "    ");
        }
    }

    out.push_str("  </xs:complexType>\n");
    out
}

fn push_sequence(
    out: &mut String,
    members: &[&PropertyDescriptor],
    loader: &ClassLoader,
    namespace: &str,
    known: &BTreeSet<&str>,
    indent: &str,
) {
    if members.is_empty() {
        out.push_str(&format!("{}<xs:sequence/>\n", indent));
        return;
    }
    out.push_str(&format!("{}<xs:sequence>\n", indent));
    for member in members {
        let repeated = matches!(member.declared, TypeRef::Collection(_));
        out.push_str(&format!(
            "{}  <xs:element name=\"{}\" type=\"{}\" minOccurs=\"0\"{}/>\n",
            indent,
            member.element_name(),
            xsd_type(loader, &member.declared, namespace, known),
            if repeated { " maxOccurs=\"unbounded\"" } else { "" }
        ));
    }
    out.push_str(&format!("{}</xs:sequence>\n", indent));
}

fn xsd_type(loader: &ClassLoader, declared: &TypeRef, namespace: &str, known: &BTreeSet<&str>) -> String {
    match declared {
        TypeRef::Scalar(scalar) => format!("xs:{}", scalar.xsd_name()),
        TypeRef::Class(name) => match loader.load_class(name) {
            Some(class)
                if known.contains(class.qualified_name())
                    && loader.type_namespace(&class) == namespace =>
            {
                qualified(namespace, &class.type_name())
            }
            _ => "xs:anyType".to_string(),
        },
        TypeRef::Collection(arguments) => arguments
            .last()
            .map(|item| xsd_type(loader, item, namespace, known))
            .unwrap_or_else(|| "xs:anyType".to_string()),
    }
}

fn qualified(namespace: &str, local: &str) -> String {
    if namespace.is_empty() {
        local.to_string()
    } else {
        format!("tns:{}", local)
    }
}
