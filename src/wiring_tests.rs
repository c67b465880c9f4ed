//! Cross-module wiring exercised end to end, without a live provider
//!
//! Each module's own tests cover it in isolation; these cover the seams:
//! registration feeding template expansion, template expansion feeding the
//! query builders, and the query builders feeding the same registered
//! physical names [`crate::store::Store`] resolves internally. None of
//! these send a request: there is no DynamoDB to answer it.

use aws_sdk_dynamodb::types::AttributeValue;

use crate::{
    builder::IndexQueryBuilder,
    keys::GlobalSecondaryIndexDefinition,
    query::ScanDirection,
    registry, template,
    time_range::TimeRangeQueryBuilder,
    EntityTypeName, EntityTypeNameRef,
};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
struct Order {
    order_id: String,
    customer_email: String,
    status: String,
}

struct OrderMarker;

fn register_order() {
    let _ = registry::register_index_map::<OrderMarker>(
        template::IndexMap::new()
            .with("PK", "ORDER#{order_id}")
            .with("SK", "ORDER#{order_id}")
            .with("GSI1PK", "CUSTOMER#{customer_email}")
            .with("GSI1SK", "STATUS#{status}"),
    );
    registry::register_physical_index(
        "GSI1",
        GlobalSecondaryIndexDefinition {
            index_name: "GSI1",
            hash_key: "PK1",
            range_key: Some("SK1"),
        }
        .into_index(),
    );
}

#[test]
fn write_path_expands_primary_and_secondary_keys_consistently() {
    register_order();

    let order = Order {
        order_id: "o-1".to_owned(),
        customer_email: "alice@example.com".to_owned(),
        status: "SHIPPED".to_owned(),
    };

    let item = crate::codec::to_item(order).unwrap();
    let patterns = registry::lookup_index_map::<OrderMarker>().unwrap();
    let expanded = template::expand(&patterns, &item);

    let (pk, sk) = template::require_primary_key(&expanded).unwrap();
    assert_eq!(pk, "ORDER#o-1");
    assert_eq!(sk, "ORDER#o-1");
    assert_eq!(expanded["GSI1PK"], "CUSTOMER#alice@example.com");
    assert_eq!(expanded["GSI1SK"], "STATUS#SHIPPED");
}

#[test]
fn index_query_builder_resolves_registered_physical_names() {
    register_order();

    let params = IndexQueryBuilder::new()
        .with_partition_key("alice@example.com")
        .with_sort_key_prefix("STATUS#")
        .with_limit(10)
        .build::<OrderMarker>("GSI1")
        .unwrap();

    assert_eq!(params.index_name.as_deref(), Some("GSI1"));
    assert_eq!(params.limit, Some(10));
    assert_eq!(params.names["#key_PK"], "PK1");
    assert_eq!(params.names["#key_SK"], "SK1");
    assert_eq!(
        params.values[":key_PK"],
        AttributeValue::S("CUSTOMER#alice@example.com".into())
    );
}

#[test]
fn base_table_query_falls_back_to_the_primary_key_definition() {
    register_order();

    let params = IndexQueryBuilder::new()
        .with_partition_key("ORDER#o-1")
        .build::<OrderMarker>("")
        .unwrap();

    assert_eq!(params.index_name, None);
    assert_eq!(params.names["#key_PK"], "PK");
}

#[test]
fn time_range_builder_layers_onto_the_same_registered_index() {
    register_order();

    let start = time::OffsetDateTime::from_unix_timestamp(1_000).unwrap();
    let end = time::OffsetDateTime::from_unix_timestamp(2_000).unwrap();

    let params = TimeRangeQueryBuilder::latest()
        .with_partition_key("alice@example.com")
        .between(start, end)
        .build::<OrderMarker>("GSI1")
        .unwrap();

    assert_eq!(params.direction, ScanDirection::Backward);
    assert_eq!(
        params.values[":key_SK_START"].as_s().unwrap(),
        "TIME#1970-01-01T00:16:40Z"
    );
    assert_eq!(
        params.values[":key_SK_END"].as_s().unwrap(),
        "TIME#1970-01-01T00:33:19Z"
    );
}

#[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
struct Widget {
    id: String,
}

#[test]
fn registered_type_round_trips_through_the_discriminator() {
    let name = EntityTypeName::new("wiring_test_widget".to_owned());
    registry::register_type::<Widget>(name.clone()).unwrap();

    let item = crate::codec::to_item(Widget { id: "w1".to_owned() }).unwrap();
    let name_ref = EntityTypeNameRef::from_str("wiring_test_widget");
    assert!(registry::is_registered(name_ref));

    let widget: Widget = registry::deserialize_as(name_ref, item).unwrap();
    assert_eq!(widget, Widget { id: "w1".to_owned() });
}
