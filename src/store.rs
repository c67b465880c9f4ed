//! The typed, per-entity store built on top of the lower-level pieces
//!
//! [`Store`] is the surface application code actually calls: it composes
//! [`crate::registry`] and [`crate::template`] to turn a scalar identifier or
//! a whole entity into physical keys, injects the [`crate::ENTITY_TYPE_ATTRIBUTE`]
//! discriminator on write, and applies the discriminator-first / direct
//! fallback rule ([`deserialize_item`]) on read. [`query`] and [`stream`] are
//! free functions rather than `Store` methods, since a single query can
//! rehydrate more than one entity kind into a caller-chosen output type.

use std::{collections::HashMap, marker::PhantomData};

use aws_sdk_dynamodb::types::AttributeValue;

use crate::{
    codec,
    error::{ItemDeserializationError, ItemSerializationError},
    executor, expr, model,
    query::QueryParams,
    registry,
    stream::{self, StreamItem, StreamOptions},
    template, EntityTypeName, EntityTypeNameRef, Error, Item, Table, ENTITY_TYPE_ATTRIBUTE,
};

/// Identifies the item an update or delete targets
#[derive(Debug, Clone, Copy)]
pub enum KeyInput<'a> {
    /// A scalar identifier, expanded against `T`'s registered pattern table
    Id(&'a str),

    /// An already-expanded partition/sort key pair
    ExplicitKey {
        /// The partition key value
        pk: &'a str,
        /// The sort key value
        sk: &'a str,
    },
}

/// A typed store for entity type `T` against table `Tb`
///
/// `T` must round-trip through the column-family item format via `serde`;
/// its key shape comes from the [`template::IndexMap`] registered for it
/// through [`registry::register_index_map`], not from `Store` itself.
#[derive(Debug)]
pub struct Store<'a, Tb, T> {
    table: &'a Tb,
    entity_type: EntityTypeName,
    _entity: PhantomData<fn() -> T>,
}

impl<'a, Tb, T> Store<'a, Tb, T>
where
    Tb: Table,
    T: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static,
{
    /// Build a store for `T` against `table`, writing `entity_type` as the
    /// discriminator on every item this store puts
    pub fn new(table: &'a Tb, entity_type: impl Into<EntityTypeName>) -> Self {
        Self {
            table,
            entity_type: entity_type.into(),
            _entity: PhantomData,
        }
    }

    /// Fetch the single item identified by the scalar `id`
    ///
    /// If `T`'s pattern table expands to a non-empty sort key, issues a
    /// direct `GetItem`. Otherwise falls back to a point `Query` on the
    /// partition key alone with `Limit=1`, since the base table's key
    /// schema always has a sort key even when `T` does not use one.
    pub async fn get_one(&self, id: &str) -> Result<T, Error> {
        let patterns = registry::lookup_index_map::<T>()?;
        let expanded = template::expand_with_single_scalar(&patterns, id);

        let pk = expanded.get("PK").cloned().unwrap_or_default();
        let sk = expanded.get("SK").cloned().unwrap_or_default();

        if pk.is_empty() && sk.is_empty() {
            return Err(template::KeyExpansionError::EmptyKey.into());
        }

        if !sk.is_empty() {
            return self.get_by_key(&pk, &sk).await;
        }

        let params = QueryParams::new("#key_PK = :key_PK")
            .name("#key_PK", "PK")
            .value(":key_PK", AttributeValue::S(pk))
            .limit(1);

        let page = executor::execute(self.table, params).await?;
        let item = page
            .items
            .into_iter()
            .next()
            .ok_or_else(|| Error::not_found(self.entity_type.clone(), id))?;

        deserialize_item(item)
    }

    /// Fetch the single item at the explicit partition/sort key pair
    pub async fn get_by_key(&self, pk: &str, sk: &str) -> Result<T, Error> {
        let key = primary_key(pk, sk);
        let output = model::Get::new(key)
            .execute(self.table)
            .await
            .map_err(Error::from)?;

        match output.item {
            Some(item) => deserialize_item(item),
            None => Err(Error::not_found(
                self.entity_type.clone(),
                format!("{pk}/{sk}"),
            )),
        }
    }

    /// Upsert `entity`, injecting the expanded keys and entity-type
    /// discriminator
    pub async fn put(&self, entity: T) -> Result<(), Error> {
        let item = self.prepare_write_item(entity)?;
        model::Put::new(item)
            .execute(self.table)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Put `entity` only if no item currently occupies its primary key
    pub async fn put_if_not_exists(&self, entity: T) -> Result<(), Error> {
        let item = self.prepare_write_item(entity)?;
        let condition = expr::Condition::new("attribute_not_exists(#pk)").name("#pk", "PK");

        let result = model::Put::new(item).condition(condition).execute(self.table).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = Error::from(err);
                if err.is_condition_failed() {
                    Err(Error::already_exists(self.entity_type.clone(), "primary key"))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn prepare_write_item(&self, entity: T) -> Result<Item, Error> {
        let mut item = codec::to_item(entity).map_err(ItemSerializationError::new)?;

        let patterns = registry::lookup_index_map::<T>()?;
        let expanded = template::expand(&patterns, &item);
        template::require_primary_key(&expanded)?;

        for (logical_key, value) in &expanded {
            let physical = physical_attribute_name(logical_key);
            item.insert(physical, AttributeValue::S(value.clone()));
        }

        item.insert(
            ENTITY_TYPE_ATTRIBUTE.to_owned(),
            AttributeValue::S(self.entity_type.as_str().to_owned()),
        );

        Ok(item)
    }

    /// Apply `updates` to the item identified by `key_input`, optionally
    /// gated on `condition`
    pub async fn update_with_condition(
        &self,
        key_input: KeyInput<'_>,
        updates: HashMap<String, AttributeValue>,
        condition: Option<expr::Condition>,
    ) -> Result<(), Error> {
        let key = self.resolve_key(key_input)?;
        let update = build_set_update(updates);

        let update_expr = model::Update::new(key).expression(update);
        let result = match condition {
            Some(condition) => update_expr.condition(condition).execute(self.table).await,
            None => update_expr.execute(self.table).await,
        };

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = Error::from(err);
                if err.is_condition_failed() {
                    Err(Error::not_found(self.entity_type.clone(), "update target"))
                } else {
                    Err(err)
                }
            }
        }
    }

    /// Delete the item identified by the scalar `id`
    ///
    /// Fails with [`Error::is_not_found`] if no item currently occupies that
    /// key; the provider's own `DeleteItem` would otherwise succeed silently.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        let key = self.resolve_key(KeyInput::Id(id))?;
        let condition = expr::Condition::new("attribute_exists(#pk)").name("#pk", "PK");

        let result = model::Delete::new(key).condition(condition).execute(self.table).await;
        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = Error::from(err);
                if err.is_condition_failed() {
                    Err(Error::not_found(self.entity_type.clone(), id))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn resolve_key(&self, key_input: KeyInput<'_>) -> Result<Item, Error> {
        match key_input {
            KeyInput::ExplicitKey { pk, sk } => Ok(primary_key(pk, sk)),
            KeyInput::Id(id) => {
                let patterns = registry::lookup_index_map::<T>()?;
                let expanded = template::expand_with_single_scalar(&patterns, id);
                let (pk, sk) = template::require_primary_key(&expanded)?;
                if sk.is_empty() {
                    return Err(Error::validation(
                        "SK",
                        "entity type has no SK template; use an explicit key instead",
                    ));
                }
                Ok(primary_key(&pk, &sk))
            }
        }
    }

    /// Run `params` as a single query page, deserializing each item as `T`
    pub async fn query(&self, params: QueryParams) -> Result<Vec<T>, Error> {
        query::<T>(self.table, params).await
    }

    /// Stream `params` across pages as `T`, per `options`
    pub fn stream<'s>(
        &'s self,
        params: QueryParams,
        options: StreamOptions,
    ) -> impl futures_core::Stream<Item = Result<StreamItem<T>, Error>> + 's {
        stream::stream_query::<T, Tb>(self.table, params, options)
    }
}

/// Run `params` as a single query page against `table`, deserializing each
/// item as `U`
///
/// Free (not tied to a single [`Store`]) so that a query whose partition can
/// hold more than one entity kind can rehydrate into a caller-supplied
/// output type (an enum, for instance) instead of a single `T`.
pub async fn query<U>(table: &impl Table, params: QueryParams) -> Result<Vec<U>, Error>
where
    U: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let page = executor::execute(table, params).await?;
    page.items.into_iter().map(deserialize_item::<U>).collect()
}

fn primary_key(pk: &str, sk: &str) -> Item {
    [
        ("PK".to_owned(), AttributeValue::S(pk.to_owned())),
        ("SK".to_owned(), AttributeValue::S(sk.to_owned())),
    ]
    .into_iter()
    .collect()
}

fn build_set_update(updates: HashMap<String, AttributeValue>) -> expr::Update {
    let mut names = Vec::with_capacity(updates.len());
    let mut values = Vec::with_capacity(updates.len());
    let mut clauses = Vec::with_capacity(updates.len());

    for (i, (attribute, value)) in updates.into_iter().enumerate() {
        let name_token = format!("#upd_u{i}");
        let value_token = format!(":upd_u{i}");
        clauses.push(format!("{name_token} = {value_token}"));
        names.push((name_token, attribute));
        values.push((value_token, value));
    }

    expr::Update {
        expression: format!("SET {}", clauses.join(", ")),
        names,
        values,
        sensitive_values: Vec::new(),
    }
}

/// Resolve a logical key name (`PK`, `SK`, `GSI1PK`, ...) to the physical
/// attribute name it should be written/queried under
///
/// Base table keys are always physical. A named index tag resolves through
/// [`registry::lookup_physical_index`]; if no override was registered, the
/// logical name is assumed to already be physical.
fn physical_attribute_name(logical_key: &str) -> String {
    if logical_key == "PK" || logical_key == "SK" {
        return logical_key.to_owned();
    }

    if let Some(tag) = logical_key.strip_suffix("PK") {
        if let Some(def) = registry::lookup_physical_index(tag) {
            return def.hash_key().to_owned();
        }
    } else if let Some(tag) = logical_key.strip_suffix("SK") {
        if let Some(def) = registry::lookup_physical_index(tag) {
            if let Some(range_key) = def.range_key() {
                return range_key.to_owned();
            }
        }
    }

    logical_key.to_owned()
}

/// Deserialize a raw item as `T` using the discriminator-first / direct
/// fallback rule
///
/// If the item carries the [`ENTITY_TYPE_ATTRIBUTE`] and that name is
/// registered, the attribute is stripped and the registered deserializer is
/// invoked (downcast to `T`). Otherwise the (stripped) item is deserialized
/// directly as `T`.
pub(crate) fn deserialize_item<T>(mut item: Item) -> Result<T, Error>
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let entity_type = match item.remove(ENTITY_TYPE_ATTRIBUTE) {
        Some(AttributeValue::S(name)) => Some(name),
        _ => None,
    };

    if let Some(name) = &entity_type {
        let name_ref = EntityTypeNameRef::from_str(name);
        if registry::is_registered(name_ref) {
            return registry::deserialize_as::<T>(name_ref, item);
        }
    }

    codec::from_item(item).map_err(|source| ItemDeserializationError::new_untyped(source).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn physical_attribute_name_is_identity_for_primary_key() {
        assert_eq!(physical_attribute_name("PK"), "PK");
        assert_eq!(physical_attribute_name("SK"), "SK");
    }

    #[test]
    fn physical_attribute_name_falls_back_to_logical_name_when_unregistered() {
        assert_eq!(physical_attribute_name("GSI9PK"), "GSI9PK");
    }

    #[test]
    fn physical_attribute_name_resolves_registered_override() {
        registry::register_physical_index(
            "GSI2",
            crate::keys::GlobalSecondaryIndexDefinition {
                index_name: "GSI2",
                hash_key: "PK2",
                range_key: Some("SK2"),
            }
            .into_index(),
        );

        assert_eq!(physical_attribute_name("GSI2PK"), "PK2");
        assert_eq!(physical_attribute_name("GSI2SK"), "SK2");
    }

    #[derive(Debug, serde::Serialize, serde::Deserialize, PartialEq)]
    struct Widget {
        id: String,
        name: String,
    }

    #[test]
    fn deserialize_item_falls_back_without_entity_type() {
        let item = codec::to_item(Widget {
            id: "1".to_owned(),
            name: "Gizmo".to_owned(),
        })
        .unwrap();

        let widget: Widget = deserialize_item(item).unwrap();
        assert_eq!(widget.id, "1");
    }

    #[test]
    fn deserialize_item_strips_entity_type_before_direct_fallback() {
        let mut item = codec::to_item(Widget {
            id: "2".to_owned(),
            name: "Sprocket".to_owned(),
        })
        .unwrap();
        item.insert(
            ENTITY_TYPE_ATTRIBUTE.to_owned(),
            AttributeValue::S("store_test_unregistered_widget".to_owned()),
        );

        let widget: Widget = deserialize_item(item).unwrap();
        assert_eq!(widget.name, "Sprocket");
    }

    #[test]
    fn deserialize_item_uses_registry_when_entity_type_is_registered() {
        let name = EntityTypeName::new("store_test_registered_widget".to_owned());
        registry::register_type::<Widget>(name.clone()).ok();

        let mut item = codec::to_item(Widget {
            id: "3".to_owned(),
            name: "Widget".to_owned(),
        })
        .unwrap();
        item.insert(
            ENTITY_TYPE_ATTRIBUTE.to_owned(),
            AttributeValue::S(name.as_str().to_owned()),
        );

        let widget: Widget = deserialize_item(item).unwrap();
        assert_eq!(widget.id, "3");
    }
}
