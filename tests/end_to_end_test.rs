//! Registration through marshalling with an attached, partly external schema.

mod common;

use std::sync::Arc;

use common::mocks::SpyResourceLoader;
use common::{L2, NS1, NS2, NS2_XSD, builder_with, enclosure, order, registered_builder};
use tempfile::TempDir;
use xml_binder::{
    BindingError, DefaultResourceLoader, DynamicObject, HttpClientConfig, MemorySchemaSink,
    SchemaMode, Seed, XmlObject,
};

fn root_namespace(xml: &str) -> Option<String> {
    let document = roxmltree::Document::parse(xml).unwrap();
    document
        .root_element()
        .tag_name()
        .namespace()
        .map(str::to_string)
}

#[tokio::test]
async fn test_registered_packages_marshal_under_always() {
    let spy = Arc::new(SpyResourceLoader::new().serving(L2, NS2_XSD));
    let builder = registered_builder(spy.clone()).with_schema_mode(SchemaMode::Always);

    let details = builder.resolve(&Seed::Empty);
    assert_eq!(details.schema_location(), format!("{} {}", NS2, L2));
    assert_eq!(details.context_path().as_deref(), Some("p1:p2"));

    let object = order();
    let marshaller = builder.build_marshaller(&Seed::Empty).await.unwrap();
    let schema = marshaller.schema().expect("schema attached under ALWAYS");
    assert!(schema.namespaces().contains(NS1));
    assert!(schema.namespaces().contains(NS2));
    assert!(schema.system_ids().contains(&L2.to_string()));

    let xml = marshaller.marshal(&object).unwrap();
    assert_eq!(root_namespace(&xml).as_deref(), Some(NS1));
    assert!(xml.contains("<customer><name>Ada</name></customer>"));
    assert_eq!(spy.calls(), 1);
}

#[tokio::test]
async fn test_instance_seed_marshals_with_generated_schema() {
    let builder = registered_builder(Arc::new(SpyResourceLoader::new()))
        .with_schema_mode(SchemaMode::Always);
    let object = order();

    let marshaller = builder.build_marshaller(&Seed::Instance(&object)).await.unwrap();
    let xml = marshaller.marshal(&object).unwrap();
    assert_eq!(root_namespace(&xml).as_deref(), Some(NS1));

    let unmarshaller = builder.build_unmarshaller(&Seed::Instance(&object)).await.unwrap();
    let back = unmarshaller.unmarshal(&xml).unwrap();
    assert_eq!(back.class_name(), "p1.Order");
    assert_eq!(back.get("note").and_then(|v| v.as_text()), Some("rush"));
    let customer = back.get("customer").and_then(|v| v.as_object()).unwrap();
    assert_eq!(customer.class_name(), "p1.Customer");
}

#[tokio::test]
async fn test_attached_schema_rejects_invalid_input() {
    let builder = registered_builder(Arc::new(SpyResourceLoader::new()))
        .with_schema_mode(SchemaMode::Unmarshal);
    let object = order();
    let unmarshaller = builder.build_unmarshaller(&Seed::Instance(&object)).await.unwrap();

    let xml = format!(
        r#"<ns1:order xmlns:ns1="{}"><id>not-a-number</id></ns1:order>"#,
        NS1
    );
    let err = unmarshaller.unmarshal(&xml).unwrap_err();
    assert!(matches!(err, BindingError::Validation { .. }));
    assert!(err.is_xml_error());

    builder.set_schema_mode(SchemaMode::Never);
    let lenient = builder.build_unmarshaller(&Seed::Instance(&object)).await.unwrap();
    assert!(lenient.unmarshal(&xml).is_ok());
}

#[tokio::test]
async fn test_external_schema_from_classpath_root() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(L2), NS2_XSD).unwrap();

    let resources =
        DefaultResourceLoader::new(vec![dir.path().to_path_buf()], HttpClientConfig::default())
            .unwrap();
    let builder = registered_builder(Arc::new(resources)).with_schema_mode(SchemaMode::ExternalXsd);

    let marshaller = builder.build_marshaller(&Seed::Empty).await.unwrap();
    assert!(marshaller.schema().is_some());
    let xml = marshaller.marshal(&order()).unwrap();
    assert_eq!(root_namespace(&xml).as_deref(), Some(NS1));
}

#[tokio::test]
async fn test_external_namespace_is_not_generated() {
    let builder = registered_builder(Arc::new(SpyResourceLoader::new().serving(L2, NS2_XSD)));
    let details = builder.resolve(&Seed::Empty);

    let context = builder.compute_context(&details).unwrap();
    let mut sink = MemorySchemaSink::excluding(details.external_namespaces());
    context.generate_schema_fragments(&mut sink).unwrap();
    assert_eq!(sink.skipped(), &[NS2.to_string()]);

    let sources = builder.schema_sources(&details).await.unwrap();
    let namespaces: Vec<&str> = sources.iter().map(|s| s.namespace.as_str()).collect();
    assert_eq!(namespaces, vec![NS1, NS2]);
    assert_eq!(sources[1].system_id, L2);
}

#[tokio::test]
async fn test_schema_failures_are_xml_errors() {
    let builder = registered_builder(Arc::new(
        SpyResourceLoader::new().serving(L2, "<xs:schema xmlns:xs=\"broken"),
    ));

    let err = builder.build_schema(&Seed::Empty).await.unwrap_err();
    assert!(err.is_xml_error());
    assert!(!err.is_binding_error());
}

#[tokio::test]
async fn test_polymorphic_graph_round_trip() {
    let builder = builder_with(Arc::new(SpyResourceLoader::new())).with_schema_mode(SchemaMode::Always);
    let object = enclosure();

    let marshaller = builder.build_marshaller(&Seed::Instance(&object)).await.unwrap();
    let xml = marshaller.marshal(&object).unwrap();
    assert!(xml.contains("xsi:type=\"lion\""));

    let unmarshaller = builder.build_unmarshaller(&Seed::Instance(&object)).await.unwrap();
    let back = unmarshaller.unmarshal(&xml).unwrap();
    let animals = back.get("animals").and_then(|v| v.as_list()).unwrap();
    assert_eq!(animals.len(), 2);
    assert_eq!(animals[0].as_object().unwrap().class_name(), "zoo.Lion");
}

#[tokio::test]
async fn test_unknown_class_fails_to_marshal() {
    let builder = builder_with(Arc::new(SpyResourceLoader::new()));
    let stranger = DynamicObject::new("nowhere.Thing");

    let details = builder.resolve(&Seed::Instance(&stranger));
    assert!(details.is_empty());

    let marshaller = builder.build_marshaller(&Seed::Instance(&stranger)).await.unwrap();
    let err = marshaller.marshal(&stranger).unwrap_err();
    assert!(err.is_binding_error());
}
