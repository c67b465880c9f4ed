#![warn(missing_docs)]
#![deny(missing_debug_implementations)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Generic, type-safe object persistence over a single-table DynamoDB design
//!
//! An application registers each Rust type it wants to persist with an
//! [`EntityTypeName`] and a [`template::IndexMap`] of key patterns, then
//! reaches all storage operations for that type through a [`store::Store`].
//! Keys are never hand-assembled by callers: they are expanded from the
//! entity's own attributes at the moment of each operation, against the
//! pattern table registered once at startup. See the [`template`], and
//! [`registry`] modules for that machinery, [`store`] for the typed
//! operations built on top of it, and [`builder`]/[`time_range`] for
//! constructing ad hoc index queries.

mod error;
#[cfg(test)]
mod wiring_tests;
pub mod builder;
pub mod executor;
pub mod expr;
pub mod keys;
pub mod model;
pub mod query;
pub mod registry;
pub mod store;
pub mod stream;
pub mod template;
pub mod time_range;
pub mod types;

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use serde_dynamo::aws_sdk_dynamodb_1 as codec;

pub use crate::error::Error;

/// The reserved attribute name written on every persisted item to carry its
/// entity-type discriminator
pub const ENTITY_TYPE_ATTRIBUTE: &str = "EntityType";

/// An alias for a DynamoDB item: a flat map of attribute name to value
pub type Item = HashMap<String, AttributeValue>;

/// The name of a registered entity type
///
/// Used both as the value of the reserved [`ENTITY_TYPE_ATTRIBUTE`] and as
/// the key under which a deserializer and key pattern table are registered
/// in the [`registry`] module.
#[aliri_braid::braid(serde)]
pub struct EntityTypeName;

/// A description of the table an application's stores operate against
///
/// Unlike the compile-time key types of a schema-per-type design, a `Table`
/// here only needs to describe where the data lives; the shape of any given
/// entity's keys comes from its registered [`template::IndexMap`] instead.
pub trait Table {
    /// The name of the DynamoDB table
    ///
    /// This is authoritative: callers cannot redirect an individual
    /// operation to a different table name.
    fn table_name(&self) -> &str;

    /// The DynamoDB client used by this table
    fn client(&self) -> &aws_sdk_dynamodb::Client;
}

#[doc(hidden)]
pub mod __private {
    #[cfg(not(feature = "once_cell"))]
    pub type OnceLock<T> = std::sync::OnceLock<T>;

    #[cfg(feature = "once_cell")]
    pub type OnceLock<T> = once_cell::sync::OnceCell<T>;
}

/// Extension trait for [`Table`] providing convenience methods for tests
///
/// Not intended for use in creating or managing production deployments.
pub trait TestTableExt {
    /// Prepare a create-table operation for the base table
    ///
    /// Secondary indexes projected by entities registered through
    /// [`registry::register_physical_index`] are added as global secondary
    /// indexes; local secondary indexes are left to the caller, since they
    /// must be created alongside the base table's key schema and this
    /// helper has no way to learn about them ahead of time.
    fn create_table(
        &self,
        secondary_indexes: &[keys::GlobalSecondaryIndexDefinition],
    ) -> aws_sdk_dynamodb::operation::create_table::builders::CreateTableFluentBuilder;

    /// Prepare a delete-table operation for the base table
    fn delete_table(
        &self,
    ) -> aws_sdk_dynamodb::operation::delete_table::builders::DeleteTableFluentBuilder;
}

impl<T> TestTableExt for T
where
    T: Table,
{
    fn create_table(
        &self,
        secondary_indexes: &[keys::GlobalSecondaryIndexDefinition],
    ) -> aws_sdk_dynamodb::operation::create_table::builders::CreateTableFluentBuilder {
        use aws_sdk_dynamodb::types::{
            AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
            ProjectionType, ScalarAttributeType,
        };

        let mut attribute_names = std::collections::BTreeSet::new();
        attribute_names.insert(keys::PRIMARY_KEY_DEFINITION.hash_key);
        if let Some(range_key) = keys::PRIMARY_KEY_DEFINITION.range_key {
            attribute_names.insert(range_key);
        }

        let mut builder = self
            .client()
            .create_table()
            .set_table_name(Some(self.table_name().into()));

        let mut key_schema = vec![KeySchemaElement::builder()
            .set_attribute_name(Some(keys::PRIMARY_KEY_DEFINITION.hash_key.into()))
            .set_key_type(Some(KeyType::Hash))
            .build()
            .expect("attribute name and key type are always provided")];
        if let Some(range_key) = keys::PRIMARY_KEY_DEFINITION.range_key {
            key_schema.push(
                KeySchemaElement::builder()
                    .set_attribute_name(Some(range_key.into()))
                    .set_key_type(Some(KeyType::Range))
                    .build()
                    .expect("attribute name and key type are always provided"),
            );
        }
        builder = builder.set_key_schema(Some(key_schema));

        for definition in secondary_indexes {
            attribute_names.insert(definition.hash_key);
            if let Some(range_key) = definition.range_key {
                attribute_names.insert(range_key);
            }

            let mut index_schema = vec![KeySchemaElement::builder()
                .set_attribute_name(Some(definition.hash_key.into()))
                .set_key_type(Some(KeyType::Hash))
                .build()
                .expect("attribute name and key type are always provided")];
            if let Some(range_key) = definition.range_key {
                index_schema.push(
                    KeySchemaElement::builder()
                        .set_attribute_name(Some(range_key.into()))
                        .set_key_type(Some(KeyType::Range))
                        .build()
                        .expect("attribute name and key type are always provided"),
                );
            }

            let gsi = GlobalSecondaryIndex::builder()
                .set_index_name(Some(definition.index_name.into()))
                .set_projection(Some(
                    Projection::builder()
                        .set_projection_type(Some(ProjectionType::All))
                        .build(),
                ))
                .set_key_schema(Some(index_schema))
                .build()
                .expect("index name and key schema are always provided");
            builder = builder.global_secondary_indexes(gsi);
        }

        for name in attribute_names {
            let definition = AttributeDefinition::builder()
                .set_attribute_name(Some(name.into()))
                .set_attribute_type(Some(ScalarAttributeType::S))
                .build()
                .expect("attribute name and attribute type are always provided");
            builder = builder.attribute_definitions(definition);
        }

        builder.billing_mode(aws_sdk_dynamodb::types::BillingMode::PayPerRequest)
    }

    fn delete_table(
        &self,
    ) -> aws_sdk_dynamodb::operation::delete_table::builders::DeleteTableFluentBuilder {
        self.client()
            .delete_table()
            .set_table_name(Some(self.table_name().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
    struct TestEntity {
        id: String,
        name: String,
    }

    fn pattern() -> template::IndexMap {
        template::IndexMap::new()
            .with("PK", "TEST#{id}")
            .with("SK", "TEST#{id}")
    }

    #[test]
    fn entity_type_attribute_is_the_reserved_name() {
        assert_eq!(ENTITY_TYPE_ATTRIBUTE, "EntityType");
    }

    #[test]
    fn entity_round_trips_through_codec_and_template_expansion() {
        let entity = TestEntity {
            id: "test1".to_owned(),
            name: "Test".to_owned(),
        };

        let mut item = codec::to_item(entity.clone()).unwrap();
        let expanded = template::expand(&pattern(), &item);
        let (pk, sk) = template::require_primary_key(&expanded).unwrap();
        assert_eq!(pk, "TEST#test1");
        assert_eq!(sk, "TEST#test1");

        item.insert("PK".to_owned(), AttributeValue::S(pk));
        item.insert("SK".to_owned(), AttributeValue::S(sk));
        item.insert(
            ENTITY_TYPE_ATTRIBUTE.to_owned(),
            AttributeValue::S("test_ent".to_owned()),
        );

        let round_tripped: TestEntity = codec::from_item(item).unwrap();
        assert_eq!(round_tripped, entity);
    }
}
