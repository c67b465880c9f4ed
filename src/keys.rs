//! Physical key definitions for a single-table design
//!
//! Application code never writes these directly. Instead, an entity is
//! registered with a [`crate::template::IndexMap`] of logical key patterns
//! (`PK`, `SK`, `GSI1PK`, ...), and, for any index tag used in that map that
//! projects onto differently-named physical attributes, a definition from
//! this module is registered alongside it through
//! [`crate::registry::register_physical_index`]. The definitions below are
//! the vocabulary that registry and mapping use to talk about an index's
//! shape; see the [module documentation][crate::builder] for how they are
//! resolved at query time.

/// A key definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub enum KeyDefinition {
    /// The primary key
    Primary(PrimaryKeyDefinition),

    /// A secondary index
    Secondary(SecondaryIndexDefinition),
}

impl KeyDefinition {
    /// The name of the index, if any
    #[inline]
    pub const fn index_name(&self) -> Option<&'static str> {
        match self {
            Self::Primary(_) => None,
            Self::Secondary(def) => Some(def.index_name()),
        }
    }

    /// The hash key
    #[inline]
    pub const fn hash_key(&self) -> &'static str {
        match self {
            Self::Primary(def) => def.hash_key,
            Self::Secondary(def) => def.hash_key(),
        }
    }

    /// The range key, if any
    #[inline]
    pub const fn range_key(&self) -> Option<&'static str> {
        match self {
            Self::Primary(def) => def.range_key,
            Self::Secondary(def) => def.range_key(),
        }
    }
}

impl From<PrimaryKeyDefinition> for KeyDefinition {
    #[inline]
    fn from(def: PrimaryKeyDefinition) -> Self {
        Self::Primary(def)
    }
}

impl From<SecondaryIndexDefinition> for KeyDefinition {
    #[inline]
    fn from(def: SecondaryIndexDefinition) -> Self {
        Self::Secondary(def)
    }
}

/// A primary key definition: the physical partition/sort attribute names
/// for the base table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct PrimaryKeyDefinition {
    /// The hash key
    pub hash_key: &'static str,

    /// The range key, if any
    pub range_key: Option<&'static str>,
}

impl PrimaryKeyDefinition {
    /// Convert into a key definition
    #[inline]
    pub const fn into_key_definition(self) -> KeyDefinition {
        KeyDefinition::Primary(self)
    }
}

/// The physical definition of the base table's primary key: `PK`/`SK`
pub const PRIMARY_KEY_DEFINITION: PrimaryKeyDefinition = PrimaryKeyDefinition {
    hash_key: "PK",
    range_key: Some("SK"),
};

/// A secondary index definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub enum SecondaryIndexDefinition {
    /// A global secondary index
    Global(GlobalSecondaryIndexDefinition),

    /// A local secondary index
    Local(LocalSecondaryIndexDefinition),
}

impl SecondaryIndexDefinition {
    /// Get the name of the index
    #[inline]
    pub const fn index_name(&self) -> &'static str {
        match self {
            Self::Global(def) => def.index_name,
            Self::Local(def) => def.index_name,
        }
    }

    /// Get the physical hash (partition) attribute name of the index
    #[inline]
    pub const fn hash_key(&self) -> &'static str {
        match self {
            Self::Global(def) => def.hash_key,
            Self::Local(def) => def.hash_key,
        }
    }

    /// Get the physical range (sort) attribute name of the index
    #[inline]
    pub const fn range_key(&self) -> Option<&'static str> {
        match self {
            Self::Global(def) => def.range_key,
            Self::Local(def) => Some(def.range_key),
        }
    }

    /// Convert into a key definition
    #[inline]
    pub const fn into_key_definition(self) -> KeyDefinition {
        KeyDefinition::Secondary(self)
    }
}

/// A global secondary index definition
///
/// `index_name` is the physical index name the provider sees (e.g.
/// `"GSI1"`); `hash_key`/`range_key` are the physical attribute names the
/// index projects onto (e.g. `"PK1"`/`"SK1"`), which may differ from the
/// logical tag (`GSI1PK`/`GSI1SK`) used in a [`crate::template::IndexMap`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct GlobalSecondaryIndexDefinition {
    /// The physical name of the index
    pub index_name: &'static str,

    /// The physical hash key attribute of the index
    pub hash_key: &'static str,

    /// The physical range key attribute of the index, if any
    pub range_key: Option<&'static str>,
}

impl GlobalSecondaryIndexDefinition {
    /// Convert into a secondary index definition
    #[inline]
    pub const fn into_index(self) -> SecondaryIndexDefinition {
        SecondaryIndexDefinition::Global(self)
    }
}

/// A local secondary index definition
///
/// The hash key of an LSI is always the table's own partition key; only the
/// range key attribute is unique to the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub struct LocalSecondaryIndexDefinition {
    /// The physical name of the index
    pub index_name: &'static str,

    /// The physical hash key attribute of the table
    pub hash_key: &'static str,

    /// The physical range key attribute of the index
    pub range_key: &'static str,
}

impl LocalSecondaryIndexDefinition {
    /// Convert into a secondary index definition
    #[inline]
    pub const fn into_index(self) -> SecondaryIndexDefinition {
        SecondaryIndexDefinition::Local(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_index_definition_reports_physical_names() {
        let def = GlobalSecondaryIndexDefinition {
            index_name: "GSI1",
            hash_key: "PK1",
            range_key: Some("SK1"),
        }
        .into_index();

        assert_eq!(def.index_name(), "GSI1");
        assert_eq!(def.hash_key(), "PK1");
        assert_eq!(def.range_key(), Some("SK1"));
    }

    #[test]
    fn local_index_definition_shares_table_hash_key() {
        let def = LocalSecondaryIndexDefinition {
            index_name: "LSI1",
            hash_key: "PK",
            range_key: "LSI1SK",
        }
        .into_index();

        assert_eq!(def.index_name(), "LSI1");
        assert_eq!(def.hash_key(), "PK");
        assert_eq!(def.range_key(), Some("LSI1SK"));
    }

    #[test]
    fn primary_key_definition_has_no_index_name() {
        let def = PRIMARY_KEY_DEFINITION.into_key_definition();
        assert_eq!(def.index_name(), None);
        assert_eq!(def.hash_key(), "PK");
        assert_eq!(def.range_key(), Some("SK"));
    }
}
