//! Process-wide registries binding entity-type names to deserializers and
//! entity types to their key pattern tables
//!
//! Both registries are read-mostly: registration is expected only during
//! process initialisation, and lookups are expected continuously from
//! request-serving code. They are guarded by a [`std::sync::RwLock`],
//! never held across a provider call or a user callback.

use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::RwLock,
};

use crate::{
    error::Error, keys::SecondaryIndexDefinition, template::IndexMap, EntityTypeName,
    EntityTypeNameRef, Item,
};

type DynEntity = Box<dyn Any + Send + Sync>;
type Deserializer = Box<dyn Fn(Item) -> Result<DynEntity, Error> + Send + Sync>;

static TYPE_REGISTRY: RwLock<Option<HashMap<EntityTypeName, Deserializer>>> = RwLock::new(None);
static INDEX_MAP_REGISTRY: RwLock<Option<HashMap<TypeId, IndexMap>>> = RwLock::new(None);
static PHYSICAL_INDEX_REGISTRY: RwLock<Option<HashMap<String, SecondaryIndexDefinition>>> =
    RwLock::new(None);
static UNREGISTERED_TAG_NAMES: RwLock<Option<HashMap<String, (&'static str, &'static str)>>> =
    RwLock::new(None);

/// Register the deserializer for an entity-type name
///
/// `T` must be deserializable from the column-family item format via
/// `serde`. Registering the same name twice is a fatal configuration error
/// ([`Error::is_duplicate_registration`]).
pub fn register_type<T>(name: impl Into<EntityTypeName>) -> Result<(), Error>
where
    T: serde::de::DeserializeOwned + Send + Sync + 'static,
{
    let name = name.into();
    let mut guard = TYPE_REGISTRY.write().expect("type registry lock poisoned");
    let map = guard.get_or_insert_with(HashMap::new);

    if map.contains_key(&name) {
        return Err(Error::duplicate_type_registration(name));
    }

    map.insert(
        name,
        Box::new(|item| {
            let parsed: T = crate::codec::from_item(item)
                .map_err(|source| crate::error::ItemDeserializationError::new_untyped(source))?;
            Ok(Box::new(parsed) as DynEntity)
        }),
    );

    Ok(())
}

/// Register the key pattern table for an entity type
///
/// Registering the same type twice is a fatal configuration error.
pub fn register_index_map<T: 'static>(index_map: IndexMap) -> Result<(), Error> {
    let type_id = TypeId::of::<T>();
    let mut guard = INDEX_MAP_REGISTRY
        .write()
        .expect("index map registry lock poisoned");
    let map = guard.get_or_insert_with(HashMap::new);

    if map.contains_key(&type_id) {
        return Err(Error::duplicate_index_map_registration(
            std::any::type_name::<T>(),
        ));
    }

    map.insert(type_id, index_map);
    Ok(())
}

/// Register the physical attribute mapping for a named secondary index tag
/// (e.g. `"GSI1"`)
///
/// Index tags used in an [`IndexMap`] but never registered here are assumed
/// to already use physical attribute names (the common case where the
/// logical and physical names coincide).
pub fn register_physical_index(tag: impl Into<String>, definition: SecondaryIndexDefinition) {
    let mut guard = PHYSICAL_INDEX_REGISTRY
        .write()
        .expect("physical index registry lock poisoned");
    guard.get_or_insert_with(HashMap::new).insert(tag.into(), definition);
}

/// Look up the key pattern table registered for `T`
pub fn lookup_index_map<T: 'static>() -> Result<IndexMap, Error> {
    let guard = INDEX_MAP_REGISTRY
        .read()
        .expect("index map registry lock poisoned");
    guard
        .as_ref()
        .and_then(|map| map.get(&TypeId::of::<T>()))
        .cloned()
        .ok_or_else(|| Error::unregistered_index_map(std::any::type_name::<T>()))
}

/// Look up the physical attribute mapping registered for an index tag, if
/// the application registered an override for it
pub fn lookup_physical_index(tag: &str) -> Option<SecondaryIndexDefinition> {
    let guard = PHYSICAL_INDEX_REGISTRY
        .read()
        .expect("physical index registry lock poisoned");
    guard.as_ref().and_then(|map| map.get(tag)).copied()
}

/// The physical hash/range attribute names (`<Tag>PK`/`<Tag>SK`) assumed for
/// an index tag with no registered override
///
/// The `&'static str`s are produced by leaking a heap allocation the first
/// time a given `tag` is seen; every later call for the same `tag` reads
/// back the cached pair instead of leaking again, bounding the leak to one
/// allocation per distinct tag for the life of the process.
pub fn unregistered_tag_names(tag: &str) -> (&'static str, &'static str) {
    if let Some(names) = UNREGISTERED_TAG_NAMES
        .read()
        .expect("unregistered tag name cache lock poisoned")
        .as_ref()
        .and_then(|map| map.get(tag))
    {
        return *names;
    }

    let mut guard = UNREGISTERED_TAG_NAMES
        .write()
        .expect("unregistered tag name cache lock poisoned");
    let map = guard.get_or_insert_with(HashMap::new);

    *map.entry(tag.to_owned()).or_insert_with(|| {
        let hash_key: &'static str = Box::leak(format!("{tag}PK").into_boxed_str());
        let range_key: &'static str = Box::leak(format!("{tag}SK").into_boxed_str());
        (hash_key, range_key)
    })
}

/// True if a deserializer is registered under `name`
pub fn is_registered(name: &EntityTypeNameRef) -> bool {
    let guard = TYPE_REGISTRY.read().expect("type registry lock poisoned");
    guard
        .as_ref()
        .is_some_and(|map| map.contains_key(name))
}

/// Deserialize `item` using the registered deserializer for `name`,
/// downcasting the result to `T`
///
/// Returns [`Error::unregistered_type`] if `name` has no registered
/// deserializer, and a deserialization error if the registered deserializer
/// produces a different concrete type than `T` (a sign of a misconfigured
/// registration rather than a data problem).
pub fn deserialize_as<T: 'static>(name: &EntityTypeNameRef, item: Item) -> Result<T, Error> {
    let deserialized = {
        let guard = TYPE_REGISTRY.read().expect("type registry lock poisoned");
        let deserializer = guard
            .as_ref()
            .and_then(|map| map.get(name))
            .ok_or_else(|| Error::unregistered_type(name.to_owned()))?;
        deserializer(item)?
    };

    deserialized
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| Error::unregistered_type(name.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Widget {
        id: String,
    }

    fn widget_item(id: &str) -> Item {
        crate::codec::to_item(serde_json_like_widget(id)).unwrap()
    }

    fn serde_json_like_widget(id: &str) -> Widget {
        Widget { id: id.to_owned() }
    }

    #[test]
    fn register_and_lookup_index_map_round_trips() {
        struct Marker;
        let map = IndexMap::new().with("PK", "W#{id}");
        register_index_map::<Marker>(map.clone()).unwrap();
        let looked_up = lookup_index_map::<Marker>().unwrap();
        assert_eq!(looked_up, map);
    }

    #[test]
    fn duplicate_index_map_registration_is_an_error() {
        struct Marker2;
        register_index_map::<Marker2>(IndexMap::new()).unwrap();
        let err = register_index_map::<Marker2>(IndexMap::new()).unwrap_err();
        assert!(err.is_duplicate_registration());
    }

    #[test]
    fn unregistered_index_map_lookup_is_an_error() {
        struct NeverRegistered;
        let err = lookup_index_map::<NeverRegistered>().unwrap_err();
        assert!(err.is_unregistered());
    }

    #[test]
    fn register_type_round_trips_through_deserialize_as() {
        let name = EntityTypeName::new("registry_test_widget".to_owned());
        register_type::<Widget>(name.clone()).unwrap();
        assert!(is_registered(&name));

        let item = widget_item("abc");
        let widget: Widget = deserialize_as(&name, item).unwrap();
        assert_eq!(widget, Widget { id: "abc".to_owned() });
    }

    #[test]
    fn duplicate_type_registration_is_an_error() {
        let name = EntityTypeName::new("registry_test_dup".to_owned());
        register_type::<Widget>(name.clone()).unwrap();
        let err = register_type::<Widget>(name).unwrap_err();
        assert!(err.is_duplicate_registration());
    }

    #[test]
    fn unregistered_type_lookup_is_an_error() {
        let name = EntityTypeName::new("registry_test_never".to_owned());
        let item = widget_item("x");
        let err = deserialize_as::<Widget>(&name, item).unwrap_err();
        assert!(err.is_unregistered());
    }
}
