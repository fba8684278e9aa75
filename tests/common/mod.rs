//! Shared fixtures for the integration tests.
#![allow(dead_code)]

pub mod mocks;

use std::sync::Arc;

use xml_binder::{
    BindingContextBuilder, ClassDescriptor, ClassLoader, DynamicObject, PackageDescriptor,
    PropertyDescriptor, ResourceLoader, ScalarType, TypeRef, Value, XmlDecl,
};

pub const NS1: &str = "urn:example:ns1";
pub const NS2: &str = "urn:example:ns2";
pub const L2: &str = "L2";

/// External schema document served for [`L2`]
pub const NS2_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
           xmlns:tns="urn:example:ns2"
           targetNamespace="urn:example:ns2">
  <xs:element name="item" type="tns:item"/>
  <xs:complexType name="item">
    <xs:sequence>
      <xs:element name="sku" type="xs:string" minOccurs="0"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>
"#;

/// Two model packages plus a loose class hierarchy:
///
/// - `p1` (NS1, object factory): `Order` root element, `Customer` type
/// - `p2` (NS2, index resource): `Item` root element
/// - `zoo`: abstract `Animal`, `Lion` and `Tiger` subtypes, `Enclosure` root
pub fn class_loader() -> ClassLoader {
    ClassLoader::new()
        .with_package(
            PackageDescriptor::new("p1")
                .with_namespace(NS1)
                .with_object_factory(),
        )
        .with_package(PackageDescriptor::new("p2").with_namespace(NS2).with_index())
        .with_class(
            ClassDescriptor::new("p1", "Order")
                .root_element(XmlDecl::new())
                .property(PropertyDescriptor::accessor(
                    "id",
                    TypeRef::Scalar(ScalarType::Long),
                ))
                .property(PropertyDescriptor::accessor("note", TypeRef::string()))
                .property(PropertyDescriptor::accessor(
                    "customer",
                    TypeRef::class("p1.Customer"),
                )),
        )
        .with_class(
            ClassDescriptor::new("p1", "Customer")
                .xml_type(XmlDecl::new())
                .property(PropertyDescriptor::accessor("name", TypeRef::string())),
        )
        .with_class(
            ClassDescriptor::new("p2", "Item")
                .root_element(XmlDecl::new())
                .property(PropertyDescriptor::accessor("sku", TypeRef::string())),
        )
        .with_class(
            ClassDescriptor::new("zoo", "Animal")
                .xml_type(XmlDecl::new())
                .abstract_class()
                .property(PropertyDescriptor::accessor("name", TypeRef::string())),
        )
        .with_class(
            ClassDescriptor::new("zoo", "Lion")
                .xml_type(XmlDecl::new())
                .extends("zoo.Animal"),
        )
        .with_class(
            ClassDescriptor::new("zoo", "Tiger")
                .xml_type(XmlDecl::new())
                .extends("zoo.Animal"),
        )
        .with_class(
            ClassDescriptor::new("zoo", "Enclosure")
                .root_element(XmlDecl::new())
                .property(PropertyDescriptor::accessor(
                    "animals",
                    TypeRef::list_of(TypeRef::class("zoo.Animal")),
                )),
        )
}

pub fn builder_with(resources: Arc<dyn ResourceLoader>) -> BindingContextBuilder {
    BindingContextBuilder::new(Arc::new(class_loader()), resources)
}

/// `p1` and `p2` registered, with [`L2`] as the external location of `p2`
pub fn registered_builder(resources: Arc<dyn ResourceLoader>) -> BindingContextBuilder {
    let builder = builder_with(resources);
    builder.register_package("p1", None).unwrap();
    builder.register_package("p2", Some(L2)).unwrap();
    builder
}

pub fn order() -> DynamicObject {
    DynamicObject::new("p1.Order")
        .with("id", "42")
        .with("note", "rush")
        .with("customer", DynamicObject::new("p1.Customer").with("name", "Ada"))
}

pub fn enclosure() -> DynamicObject {
    DynamicObject::new("zoo.Enclosure").with(
        "animals",
        vec![
            Value::from(DynamicObject::new("zoo.Lion").with("name", "Leo")),
            Value::from(DynamicObject::new("zoo.Lion").with("name", "Nala")),
        ],
    )
}
