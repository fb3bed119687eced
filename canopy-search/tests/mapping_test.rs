//! Document mapping integration tests

use bytes::Bytes;
use canopy_core::{
    Namespace, Principal, Property, PropertyTypeDefinition, PrimaryResourceType, ResourceId, ResourcePath,
    ResourcePropertySet, ResourceTypeTree, Value, ValueType,
};
use canopy_search::codec::encode_stored;
use canopy_search::{
    reserved, DocumentMapper, MappingError, PropertySelect, SearchDocument,
};
use chrono::{TimeZone, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

fn def(name: &str, value_type: ValueType) -> PropertyTypeDefinition {
    PropertyTypeDefinition::new(Namespace::default_namespace(), name, value_type)
}

fn tree() -> Arc<ResourceTypeTree> {
    let tree = ResourceTypeTree::builder()
        .primary(PrimaryResourceType::new("resource", None).with_property(def("title", ValueType::String)))
        .primary(
            PrimaryResourceType::new("article", Some("resource"))
                .with_property(def("tags", ValueType::String).multiple())
                .with_property(def("meta", ValueType::Json))
                .with_property(def("count", ValueType::Int))
                .with_property(def("published", ValueType::Date))
                .with_property(def("thumbnail", ValueType::Binary)),
        )
        .primary(
            PrimaryResourceType::new("folder", Some("resource"))
                .with_property(def("lang", ValueType::String).inheritable())
                .with_property(def("secret", ValueType::String)),
        )
        .build()
        .unwrap();
    Arc::new(tree)
}

fn mapper() -> DocumentMapper {
    DocumentMapper::new(tree())
}

fn canonical(mapper: &DocumentMapper, field: &str) -> Arc<PropertyTypeDefinition> {
    mapper.field_names().canonical(field).unwrap().clone()
}

fn article(mapper: &DocumentMapper) -> ResourcePropertySet {
    let mut set = ResourcePropertySet::new(ResourcePath::parse("/news/Match-Report").unwrap(), "article", ResourceId(42))
        .with_acl_inherited_from(Some(ResourceId(3)));
    set.add(Property::new(canonical(mapper, "title"), Value::String("Cup Final".into())).unwrap());
    set.add(
        Property::multi(
            canonical(mapper, "tags"),
            vec![Value::String("x".into()), Value::String("y".into()), Value::String("z".into())],
        )
        .unwrap(),
    );
    set
}

fn everyone() -> BTreeSet<Principal> {
    BTreeSet::from([Principal::all()])
}

fn stored_doc(fields: &[(&str, &[u8])]) -> SearchDocument {
    let mut doc = SearchDocument::new();
    doc.add_stored(reserved::URI, Bytes::from_static(b"/a"));
    doc.add_stored(reserved::RESOURCE_TYPE, Bytes::from_static(b"article"));
    for (name, data) in fields {
        doc.add_stored(*name, Bytes::copy_from_slice(data));
    }
    doc
}

#[test]
fn test_multi_value_order_survives_round_trip() {
    let mapper = mapper();
    let doc = mapper.to_document(&article(&mapper), &everyone()).unwrap();
    let props = mapper.property_set(doc).unwrap();
    let tags = props.property(&def("tags", ValueType::String)).unwrap().unwrap();
    let values: Vec<&str> = tags.values().iter().filter_map(Value::as_str).collect();
    assert_eq!(values, vec!["x", "y", "z"]);
}

#[test]
fn test_reserved_fields() {
    let mapper = mapper();
    let doc = mapper.to_document(&article(&mapper), &everyone()).unwrap();
    assert_eq!(doc.indexed(reserved::URI_ANCESTORS).collect::<Vec<_>>(), vec!["/", "/news"]);
    assert_eq!(doc.indexed(reserved::NAME).collect::<Vec<_>>(), vec!["Match-Report"]);
    assert_eq!(doc.indexed(reserved::NAME_LC).collect::<Vec<_>>(), vec!["match-report"]);
    assert_eq!(mapper.resource_id(&doc).unwrap(), ResourceId(42));
    assert_eq!(mapper.acl_inherited_from(&doc).unwrap(), Some(ResourceId(3)));

    let props = mapper.property_set(doc).unwrap();
    assert_eq!(props.path().as_str(), "/news/Match-Report");
    assert_eq!(props.resource_type(), "article");
}

#[test]
fn test_own_acl_has_no_inheritance_source() {
    let mapper = mapper();
    let set = article(&mapper).with_acl_inherited_from(None);
    let doc = mapper.to_document(&set, &everyone()).unwrap();
    assert_eq!(mapper.acl_inherited_from(&doc).unwrap(), None);
}

#[test]
fn test_read_principals_collapse_to_everyone() {
    let mapper = mapper();
    let set = article(&mapper);
    let read = BTreeSet::from([Principal::user("alice"), Principal::all(), Principal::group("staff")]);
    let doc = mapper.to_document(&set, &read).unwrap();
    assert_eq!(mapper.acl_read_principal_names(&doc).unwrap(), vec!["pseudo:all"]);

    let read = BTreeSet::from([Principal::user("alice"), Principal::group("staff")]);
    let doc = mapper.to_document(&set, &read).unwrap();
    let names: BTreeSet<String> = mapper.acl_read_principal_names(&doc).unwrap().into_iter().collect();
    assert_eq!(names, BTreeSet::from(["u:alice".to_string(), "g:staff".to_string()]));
}

#[test]
fn test_empty_read_set_decodes_to_no_principals() {
    let mapper = mapper();
    let doc = mapper.to_document(&article(&mapper), &BTreeSet::new()).unwrap();
    assert!(!doc.has_field(reserved::ACL_READ_PRINCIPALS));
    assert!(mapper.acl_read_principal_names(&doc).unwrap().is_empty());

    let props = mapper.property_set(doc).unwrap();
    assert!(props.acl_read_principal_names().unwrap().is_empty());
}

#[test]
fn test_property_set_answers_reserved_fields() {
    let mapper = mapper();
    let read = BTreeSet::from([Principal::user("alice"), Principal::group("staff")]);
    let doc = mapper.to_document(&article(&mapper), &read).unwrap();

    let props = mapper.property_set(doc.clone()).unwrap();
    assert_eq!(props.id().unwrap(), ResourceId(42));
    assert_eq!(props.acl_inherited_from().unwrap(), Some(ResourceId(3)));
    let names: BTreeSet<String> = props.acl_read_principal_names().unwrap().into_iter().collect();
    assert_eq!(names, BTreeSet::from(["u:alice".to_string(), "g:staff".to_string()]));
    assert!(props.field_names().all(|f| !reserved::is_reserved(f)));

    let mandatory = mapper.property_set(doc.load(&mapper.field_selector(&PropertySelect::None))).unwrap();
    assert!(matches!(mandatory.id(), Err(MappingError::MissingField(f)) if f == reserved::ID));
    assert!(matches!(
        mandatory.acl_inherited_from(),
        Err(MappingError::MissingField(f)) if f == reserved::ACL_INHERITED_FROM
    ));
}

#[test]
fn test_json_shallow_indexing() {
    let mapper = mapper();
    let mut set = article(&mapper);
    let json = r#"{"tags":["news","sports"],"priority":5,"inner":{"x":1}}"#;
    set.add(Property::new(canonical(&mapper, "meta"), Value::Json(json.into())).unwrap());
    let doc = mapper.to_document(&set, &everyone()).unwrap();

    assert_eq!(doc.indexed("meta@tags").count(), 2);
    assert_eq!(doc.indexed("meta@tags^lc").count(), 2);
    assert_eq!(doc.indexed("meta@priority").count(), 1);
    assert!(!doc.has_field("meta@priority^lc"));
    assert!(doc.field_names().iter().all(|f| !f.contains("inner")));
    assert_eq!(doc.stored("meta").count(), 1);
}

#[test]
fn test_bad_json_still_stores_the_value() {
    let mapper = mapper();
    let mut set = article(&mapper);
    set.add(Property::new(canonical(&mapper, "meta"), Value::Json("{not json".into())).unwrap());
    let doc = mapper.to_document(&set, &everyone()).unwrap();
    assert!(doc.field_names().iter().all(|f| !f.starts_with("meta@")));

    let props = mapper.property_set(doc).unwrap();
    let meta = props.property_by_field("meta").unwrap().unwrap();
    assert_eq!(meta.value(), &Value::Json("{not json".into()));
}

#[test]
fn test_string_fields_get_lowercase_variant() {
    let mapper = mapper();
    let doc = mapper.to_document(&article(&mapper), &everyone()).unwrap();
    assert_eq!(doc.indexed("title").collect::<Vec<_>>(), vec!["Cup Final"]);
    assert_eq!(doc.indexed("title^lc").collect::<Vec<_>>(), vec!["cup final"]);
}

#[test]
fn test_binary_and_undeclared_properties_are_skipped() {
    let mapper = mapper();
    let mut set = article(&mapper);
    set.add(
        Property::new(
            canonical(&mapper, "thumbnail"),
            Value::Binary(canopy_core::BinaryValue { content_type: "image/png".into(), data: Bytes::from_static(b"png") }),
        )
        .unwrap(),
    );
    set.add(Property::new(canonical(&mapper, "secret"), Value::String("hidden".into())).unwrap());
    set.add(Property::new(canonical(&mapper, "lang"), Value::String("en".into())).unwrap());
    let doc = mapper.to_document(&set, &everyone()).unwrap();

    assert!(!doc.has_field("thumbnail"));
    assert!(!doc.has_field("secret"));
    assert!(doc.has_field("lang"));
}

#[test]
fn test_typed_values_decode_exactly() {
    let mapper = mapper();
    let mut set = article(&mapper);
    let published = Utc.with_ymd_and_hms(2023, 5, 1, 8, 30, 0).unwrap() + chrono::Duration::microseconds(1500);
    set.add(Property::new(canonical(&mapper, "count"), Value::Int(-7)).unwrap());
    set.add(Property::new(canonical(&mapper, "published"), Value::Date(published)).unwrap());
    let doc = mapper.to_document(&set, &everyone()).unwrap();

    let decoded = mapper.property_set(doc).unwrap().to_property_set().unwrap();
    assert_eq!(decoded.id, ResourceId(42));
    assert_eq!(decoded.property("", "count").unwrap().value(), &Value::Int(-7));
    assert_eq!(decoded.property("", "published").unwrap().value(), &Value::Date(published));
    assert_eq!(decoded.properties().len(), 4);
}

#[test]
fn test_single_valued_field_with_two_occurrences_is_fatal() {
    let mapper = mapper();
    let doc = stored_doc(&[("title", b"one"), ("title", b"two")]);
    let props = mapper.property_set(doc).unwrap();
    assert!(matches!(
        props.property_by_field("title"),
        Err(MappingError::Cardinality { count: 2, .. })
    ));
}

#[test]
fn test_interleaved_occurrences_are_fatal() {
    let mapper = mapper();
    let doc = stored_doc(&[("tags", b"a"), ("title", b"t"), ("tags", b"b")]);
    let props = mapper.property_set(doc).unwrap();
    assert!(matches!(props.property_by_field("tags"), Err(MappingError::FragmentedField(_))));
    assert!(props.property_by_field("title").unwrap().is_some());
}

#[test]
fn test_unknown_field_degrades_to_string() {
    let mapper = mapper();
    let doc = stored_doc(&[("legacy:note", b"first"), ("legacy:note", b"second")]);
    let props = mapper.property_set(doc).unwrap();
    let note = props.property_by_field("legacy:note").unwrap().unwrap();
    assert_eq!(note.definition().value_type, ValueType::String);
    assert!(note.definition().multiple);
    assert_eq!(note.definition().namespace.prefix.as_deref(), Some("legacy"));
    assert_eq!(note.values(), &[Value::String("first".into()), Value::String("second".into())]);
}

#[test]
fn test_missing_path_is_an_error() {
    let mapper = mapper();
    let mut doc = SearchDocument::new();
    doc.add_stored(reserved::RESOURCE_TYPE, encode_stored(&Value::String("article".into())).unwrap());
    assert!(matches!(mapper.property_set(doc), Err(MappingError::MissingField(f)) if f == reserved::URI));
}

#[test]
fn test_selector_limits_loaded_fields() {
    let mapper = mapper();
    let doc = mapper.to_document(&article(&mapper), &everyone()).unwrap();

    let only_title = mapper.field_selector(&PropertySelect::Only(vec![canonical(&mapper, "title")]));
    let props = mapper.property_set(doc.load(&only_title)).unwrap();
    assert_eq!(props.field_names().collect::<Vec<_>>(), vec!["title"]);
    assert!(props.property_by_field("tags").unwrap().is_none());

    let mandatory = doc.load(&mapper.field_selector(&PropertySelect::None));
    assert_eq!(mandatory.field_names(), BTreeSet::from([reserved::URI, reserved::RESOURCE_TYPE]));
    assert!(matches!(mapper.resource_id(&mandatory), Err(MappingError::MissingField(_))));

    let everything = doc.load(&mapper.field_selector(&PropertySelect::All));
    assert_eq!(mapper.property_set(everything).unwrap().properties().unwrap().len(), 2);
}
