//! Expression builders
//!
//! These builders compose parameterized DynamoDB expression strings while
//! keeping each fragment's placeholder tokens (`#name`, `:name`) namespaced so
//! that a key condition, a filter, and a condition expression can be combined
//! on the same request without colliding.

use std::fmt;

use aws_sdk_dynamodb::types::AttributeValue;

/// A builder for a key condition expression, used in query operations
///
/// Unlike a compile-time key type, this builder is handed the physical
/// partition/sort attribute names at construction time — they are resolved
/// by the caller (typically [`crate::builder::IndexQueryBuilder`]) from the
/// physical index mapping rather than known at compile time.
#[derive(Clone)]
#[must_use]
pub struct KeyCondition {
    hash_key: &'static str,
    range_key: Option<&'static str>,
    partition_key: AttributeValue,
    sort_key: Option<SortKeyCondition>,
}

impl fmt::Debug for KeyCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyCondition")
            .field("hash_key", &self.hash_key)
            .field("range_key", &self.range_key)
            .field("partition_key", &self.partition_key)
            .field("sort_key", &self.sort_key)
            .finish()
    }
}

const PARTITION_KEY_EXPRESSION: &str = "#key_PK = :key_PK";
const PARTITION_EQ_KEY_EXPRESSION: &str = "#key_PK = :key_PK AND #key_SK = :key_SK";
const PARTITION_BETWEEN_KEY_EXPRESSION: &str =
    "#key_PK = :key_PK AND #key_SK BETWEEN :key_SK_START AND :key_SK_END";
const PARTITION_LT_KEY_EXPRESSION: &str = "#key_PK = :key_PK AND #key_SK < :key_SK";
const PARTITION_LTE_KEY_EXPRESSION: &str = "#key_PK = :key_PK AND #key_SK <= :key_SK";
const PARTITION_GT_KEY_EXPRESSION: &str = "#key_PK = :key_PK AND #key_SK > :key_SK";
const PARTITION_GTE_KEY_EXPRESSION: &str = "#key_PK = :key_PK AND #key_SK >= :key_SK";
const PARTITION_BEGINS_WITH_KEY_EXPRESSION: &str =
    "#key_PK = :key_PK AND begins_with(#key_SK, :key_SK)";

impl KeyCondition {
    /// Start a key condition against the given partition, on an index whose
    /// physical hash/range attribute names are `hash_key`/`range_key`
    ///
    /// # Panics
    ///
    /// Panics if the partition value cannot be serialized to an
    /// `AttributeValue`.
    pub fn in_partition<V: serde::Serialize>(
        hash_key: &'static str,
        range_key: Option<&'static str>,
        partition: V,
    ) -> Self {
        KeyCondition {
            hash_key,
            range_key,
            partition_key: serde_dynamo::to_attribute_value(partition).unwrap(),
            sort_key: None,
        }
    }

    /// Get the item where the sort key is equal to the given value
    pub fn specific_item<V: serde::Serialize>(mut self, sort: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::Equal(
            serde_dynamo::to_attribute_value(sort).unwrap(),
        ));
        self
    }

    /// Get items where the sort key is between the start and end values, inclusive
    pub fn between<V: serde::Serialize>(mut self, start: V, end: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::Between {
            start: serde_dynamo::to_attribute_value(start).unwrap(),
            end: serde_dynamo::to_attribute_value(end).unwrap(),
        });
        self
    }

    /// Get items where the sort key is less than the given value
    pub fn less_than<V: serde::Serialize>(mut self, sort: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::LessThan(
            serde_dynamo::to_attribute_value(sort).unwrap(),
        ));
        self
    }

    /// Get items where the sort key is less than or equal to the given value
    pub fn less_than_or_equal<V: serde::Serialize>(mut self, sort: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::LessThanOrEqual(
            serde_dynamo::to_attribute_value(sort).unwrap(),
        ));
        self
    }

    /// Get items where the sort key is greater than the given value
    pub fn greater_than<V: serde::Serialize>(mut self, sort: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::GreaterThan(
            serde_dynamo::to_attribute_value(sort).unwrap(),
        ));
        self
    }

    /// Get items where the sort key is greater than or equal to the given value
    pub fn greater_than_or_equal<V: serde::Serialize>(mut self, sort: V) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::GreaterThanOrEqual(
            serde_dynamo::to_attribute_value(sort).unwrap(),
        ));
        self
    }

    /// Get items where the sort key begins with the given value
    pub fn begins_with(mut self, sort: impl Into<String>) -> Self {
        self.ensure_range_key();
        self.sort_key = Some(SortKeyCondition::BeginsWith(sort.into()));
        self
    }

    #[inline]
    fn ensure_range_key(&self) {
        assert!(
            self.range_key.is_some(),
            "index on hash key `{}` does not have a range key",
            self.hash_key,
        );
    }

    pub(crate) fn expression(&self) -> &'static str {
        match &self.sort_key {
            Some(SortKeyCondition::Equal(_)) => PARTITION_EQ_KEY_EXPRESSION,
            Some(SortKeyCondition::Between { .. }) => PARTITION_BETWEEN_KEY_EXPRESSION,
            Some(SortKeyCondition::LessThan(_)) => PARTITION_LT_KEY_EXPRESSION,
            Some(SortKeyCondition::LessThanOrEqual(_)) => PARTITION_LTE_KEY_EXPRESSION,
            Some(SortKeyCondition::GreaterThan(_)) => PARTITION_GT_KEY_EXPRESSION,
            Some(SortKeyCondition::GreaterThanOrEqual(_)) => PARTITION_GTE_KEY_EXPRESSION,
            Some(SortKeyCondition::BeginsWith(_)) => PARTITION_BEGINS_WITH_KEY_EXPRESSION,
            None => PARTITION_KEY_EXPRESSION,
        }
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = (&'static str, &'static str)> {
        let names = if let Some(sk) = self.range_key {
            [Some(("#key_PK", self.hash_key)), Some(("#key_SK", sk))]
        } else {
            [Some(("#key_PK", self.hash_key)), None]
        };
        names.into_iter().flatten()
    }

    pub(crate) fn values(self) -> impl Iterator<Item = (&'static str, AttributeValue)> {
        let values = if self.range_key.is_some() {
            match self.sort_key {
                Some(SortKeyCondition::Between { start, end }) => [
                    Some((":key_PK", self.partition_key)),
                    Some((":key_SK_START", start)),
                    Some((":key_SK_END", end)),
                ],
                Some(
                    SortKeyCondition::Equal(v)
                    | SortKeyCondition::LessThan(v)
                    | SortKeyCondition::LessThanOrEqual(v)
                    | SortKeyCondition::GreaterThan(v)
                    | SortKeyCondition::GreaterThanOrEqual(v),
                ) => [
                    Some((":key_PK", self.partition_key)),
                    Some((":key_SK", v)),
                    None,
                ],
                Some(SortKeyCondition::BeginsWith(prefix)) => [
                    Some((":key_PK", self.partition_key)),
                    Some((":key_SK", AttributeValue::S(prefix))),
                    None,
                ],
                None => [Some((":key_PK", self.partition_key)), None, None],
            }
        } else {
            [Some((":key_PK", self.partition_key)), None, None]
        };

        values.into_iter().flatten()
    }
}

#[derive(Debug, Clone)]
#[must_use]
enum SortKeyCondition {
    Equal(AttributeValue),
    Between {
        start: AttributeValue,
        end: AttributeValue,
    },
    LessThan(AttributeValue),
    LessThanOrEqual(AttributeValue),
    GreaterThan(AttributeValue),
    GreaterThanOrEqual(AttributeValue),
    BeginsWith(String),
}

/// A compiled filter expression
#[must_use]
#[derive(Clone)]
pub struct Filter {
    /// The parameterized expression
    pub expression: String,

    /// The attribute names used in the expression
    pub names: Vec<(String, String)>,

    /// The attribute values used in the expression
    pub values: Vec<(String, AttributeValue)>,

    /// The sensitive attribute values used in the expression that should not be logged
    pub sensitive_values: Vec<(String, AttributeValue)>,
}

impl Filter {
    /// Create a new filter expression
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression
                .into()
                .replace('#', "#flt_")
                .replace(':', ":flt_"),
            names: Vec::new(),
            values: Vec::new(),
            sensitive_values: Vec::new(),
        }
    }

    /// Merge another filter into this one, joining with `AND`
    pub fn and(mut self, other: Filter) -> Self {
        self.expression = format!("({}) AND ({})", self.expression, other.expression);
        self.names.extend(other.names);
        self.values.extend(other.values);
        self.sensitive_values.extend(other.sensitive_values);
        self
    }

    /// Add a name to the expression
    pub fn name(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = format!("#flt_{}", name.trim_start_matches('#'));
        self.names.push((name, value.into()));
        self
    }

    /// Add a value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":flt_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.values.push((name, value));
        self
    }

    /// Add a sensitive value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn sensitive_value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":flt_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.sensitive_values.push((name, value));
        self
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("expression", &self.expression)
            .field("names", &self.names)
            .field("values", &self.values)
            .field(
                "sensitive_values",
                &format_args!("<{} values>", self.sensitive_values.len()),
            )
            .finish()
    }
}

/// A compiled update expression
#[derive(Clone)]
#[must_use]
pub struct Update {
    /// The parameterized expression
    pub expression: String,

    /// The attribute names used in the expression
    pub names: Vec<(String, String)>,

    /// The attribute values used in the expression
    pub values: Vec<(String, AttributeValue)>,

    /// The sensitive attribute values used in the expression that should not be logged
    pub sensitive_values: Vec<(String, AttributeValue)>,
}

impl Update {
    /// Create a new update expression
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression
                .into()
                .replace('#', "#upd_")
                .replace(':', ":upd_"),
            names: Vec::new(),
            values: Vec::new(),
            sensitive_values: Vec::new(),
        }
    }

    /// Add a name to the expression
    pub fn name(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = format!("#upd_{}", name.trim_start_matches('#'));
        self.names.push((name, value.into()));
        self
    }

    /// Add a value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":upd_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.values.push((name, value));
        self
    }

    /// Add a sensitive value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn sensitive_value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":upd_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.sensitive_values.push((name, value));
        self
    }
}

impl fmt::Debug for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Update")
            .field("expression", &self.expression)
            .field("names", &self.names)
            .field("values", &self.values)
            .field(
                "sensitive_values",
                &format_args!("<{} values>", self.sensitive_values.len()),
            )
            .finish()
    }
}

#[derive(Clone)]
#[must_use]
/// A compiled condition expression
pub struct Condition {
    /// The parameterized expression
    pub expression: String,

    /// The attribute names used in the expression
    pub names: Vec<(String, String)>,

    /// The attribute values used in the expression
    pub values: Vec<(String, AttributeValue)>,

    /// The sensitive attribute values used in the expression that should not be logged
    pub sensitive_values: Vec<(String, AttributeValue)>,
}

impl Condition {
    /// Create a new condition expression
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression
                .into()
                .replace('#', "#cnd_")
                .replace(':', ":cnd_"),
            names: Vec::new(),
            values: Vec::new(),
            sensitive_values: Vec::new(),
        }
    }

    /// Add a name to the expression
    pub fn name(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = format!("#cnd_{}", name.trim_start_matches('#'));
        self.names.push((name, value.into()));
        self
    }

    /// Add a value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":cnd_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.values.push((name, value));
        self
    }

    /// Add a sensitive value to the expression
    ///
    /// # Panics
    ///
    /// Panics if the given value cannot be serialized to an `AttributeValue`.
    pub fn sensitive_value(mut self, name: &str, value: impl serde::Serialize) -> Self {
        let name = format!(":cnd_{}", name.trim_start_matches(':'));
        let value = serde_dynamo::to_attribute_value(value).unwrap();
        self.sensitive_values.push((name, value));
        self
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("expression", &self.expression)
            .field("names", &self.names)
            .field("values", &self.values)
            .field(
                "sensitive_values",
                &format_args!("<{} values>", self.sensitive_values.len()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_condition_begins_with_uses_physical_names() {
        let kc = KeyCondition::in_partition("PK1", Some("SK1"), "EMAIL#alice@x")
            .begins_with("STATUS#active");

        assert_eq!(
            kc.expression(),
            "#key_PK = :key_PK AND begins_with(#key_SK, :key_SK)"
        );
        let names: Vec<_> = kc.names().collect();
        assert_eq!(names, vec![("#key_PK", "PK1"), ("#key_SK", "SK1")]);
    }

    #[test]
    fn key_condition_between_emits_both_bounds() {
        let kc = KeyCondition::in_partition("PK1", Some("SK1"), "EMAIL#alice@x")
            .between("STATUS#active", "STATUS#pending");

        assert_eq!(
            kc.expression(),
            "#key_PK = :key_PK AND #key_SK BETWEEN :key_SK_START AND :key_SK_END"
        );
        let values: Vec<_> = kc.values().collect();
        assert_eq!(values[0].0, ":key_PK");
        assert_eq!(values[1], (":key_SK_START", AttributeValue::S("STATUS#active".into())));
        assert_eq!(values[2], (":key_SK_END", AttributeValue::S("STATUS#pending".into())));
    }

    #[test]
    #[should_panic(expected = "does not have a range key")]
    fn key_condition_without_range_key_panics_on_sort_operator() {
        let _ = KeyCondition::in_partition("PK", None, "x").begins_with("y");
    }

    #[test]
    fn filter_namespaces_tokens_and_combines_with_and() {
        let a = Filter::new("#status = :status").name("#status", "status").value(":status", "active");
        let b = Filter::new("#age > :age").name("#age", "age").value(":age", 21);

        let combined = a.and(b);
        assert_eq!(
            combined.expression,
            "(#flt_status = :flt_status) AND (#flt_age > :flt_age)"
        );
        assert_eq!(combined.names.len(), 2);
        assert_eq!(combined.values.len(), 2);
    }

    #[test]
    fn condition_and_update_namespace_independently() {
        let cond = Condition::new("attribute_not_exists(#PK)").name("#PK", "PK");
        assert_eq!(cond.expression, "attribute_not_exists(#cnd_PK)");
        assert_eq!(cond.names, vec![("#cnd_PK".to_owned(), "PK".to_owned())]);

        let upd = Update::new("SET #n = :n").name("#n", "name").value(":n", "Ada");
        assert_eq!(upd.expression, "SET #upd_n = :upd_n");
        assert_eq!(upd.names, vec![("#upd_n".to_owned(), "name".to_owned())]);
    }
}
