//! Fluent builder for ad hoc index queries
//!
//! [`IndexQueryBuilder`] accumulates a partition value, an optional mutually
//! exclusive sort-key operator, filter fragments, and paging controls, then
//! [`IndexQueryBuilder::build`] resolves them against a registered type's
//! key pattern table into a [`crate::query::QueryParams`]. [`crate::time_range`]
//! wraps this builder with time-window-specific convenience constructors.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::{
    expr, keys, query::{QueryParams, ScanDirection}, registry, Error,
};

/// An error produced while building an index query
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuilderValidationError {
    /// `with_partition_key` was never called
    #[error("no partition value was supplied")]
    MissingPartitionValue,

    /// The index tag has no registered `<Tag>PK` template
    #[error("unknown index tag `{0}`")]
    UnknownIndexTag(String),
}

#[derive(Clone, Debug)]
enum SortOp {
    Equal(String),
    Prefix(String),
    GreaterThan(String),
    LessThan(String),
    GreaterOrEqual(String),
    LessOrEqual(String),
    Between(String, String),
}

/// A fluent builder for a single index query
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct IndexQueryBuilder {
    partition_value: Option<String>,
    sort_op: Option<SortOp>,
    filter: Option<expr::Filter>,
    limit: Option<u32>,
    direction: ScanDirection,
}

impl IndexQueryBuilder {
    /// Start a new, empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the partition value for the chosen index
    pub fn with_partition_key(mut self, value: impl Into<String>) -> Self {
        self.partition_value = Some(value.into());
        self
    }

    /// Require the sort key to equal `value`
    pub fn with_sort_key(mut self, value: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::Equal(value.into()));
        self
    }

    /// Require the sort key to begin with `prefix`
    pub fn with_sort_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::Prefix(prefix.into()));
        self
    }

    /// Require the sort key to be greater than `value`
    pub fn with_sort_key_greater_than(mut self, value: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::GreaterThan(value.into()));
        self
    }

    /// Require the sort key to be less than `value`
    pub fn with_sort_key_less_than(mut self, value: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::LessThan(value.into()));
        self
    }

    /// Require the sort key to be greater than or equal to `value`
    pub fn with_sort_key_greater_or_equal(mut self, value: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::GreaterOrEqual(value.into()));
        self
    }

    /// Require the sort key to be less than or equal to `value`
    pub fn with_sort_key_less_or_equal(mut self, value: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::LessOrEqual(value.into()));
        self
    }

    /// Require the sort key to be between `start` and `end`, inclusive
    pub fn with_sort_key_between(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.sort_op = Some(SortOp::Between(start.into(), end.into()));
        self
    }

    /// Apply a filter fragment, evaluated after the key condition
    ///
    /// Calling this more than once concatenates fragments with `AND`.
    /// `values` is merged into the attribute-value map under the same
    /// namespacing as the expression's own placeholders.
    pub fn with_filter(
        mut self,
        expression: impl Into<String>,
        values: impl IntoIterator<Item = (String, AttributeValue)>,
    ) -> Self {
        let mut filter = expr::Filter::new(expression);
        for (name, value) in values {
            let key = format!(":flt_{}", name.trim_start_matches(':'));
            filter.values.push((key, value));
        }

        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Cap the number of items evaluated per page
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Scan the index in descending order
    pub fn scan_backward(mut self) -> Self {
        self.direction = ScanDirection::Backward;
        self
    }

    /// Resolve this builder against `T`'s registered key pattern table for
    /// the named index tag (pass `""` for the base table), producing a
    /// neutral query parameter object
    ///
    /// # Errors
    ///
    /// Returns [`BuilderValidationError::MissingPartitionValue`] if
    /// [`Self::with_partition_key`] was never called, and
    /// [`BuilderValidationError::UnknownIndexTag`] if `T` has no
    /// `<index_tag>PK` template registered.
    pub fn build<T: 'static>(self, index_tag: &str) -> Result<QueryParams, Error> {
        let partition_value = self
            .partition_value
            .ok_or(BuilderValidationError::MissingPartitionValue)?;

        let index_map = registry::lookup_index_map::<T>()?;

        let pk_logical = format!("{index_tag}PK");

        let pk_template = index_map
            .get(&pk_logical)
            .ok_or_else(|| BuilderValidationError::UnknownIndexTag(index_tag.to_owned()))?;

        let physical_partition_value = expand_partition_value(pk_template, &partition_value);

        let (hash_key, range_key) = resolve_physical_names(index_tag);

        let mut key_condition = expr::KeyCondition::in_partition(
            hash_key,
            range_key,
            physical_partition_value,
        );

        key_condition = match self.sort_op {
            Some(SortOp::Equal(v)) => key_condition.specific_item(v),
            Some(SortOp::Prefix(v)) => key_condition.begins_with(v),
            Some(SortOp::GreaterThan(v)) => key_condition.greater_than(v),
            Some(SortOp::LessThan(v)) => key_condition.less_than(v),
            Some(SortOp::GreaterOrEqual(v)) => key_condition.greater_than_or_equal(v),
            Some(SortOp::LessOrEqual(v)) => key_condition.less_than_or_equal(v),
            Some(SortOp::Between(start, end)) => key_condition.between(start, end),
            None => key_condition,
        };

        let key_condition_expression = key_condition.expression().to_owned();
        let mut names: HashMap<String, String> = key_condition
            .names()
            .map(|(l, r)| (l.to_owned(), r.to_owned()))
            .collect();
        let mut values: HashMap<String, AttributeValue> = key_condition
            .values()
            .map(|(l, v)| (l.to_owned(), v))
            .collect();

        let mut params = QueryParams::new(key_condition_expression);
        if let Some(limit) = self.limit {
            params = params.limit(limit);
        }
        if !index_tag.is_empty() {
            params = params.index_name(index_tag.to_owned());
        }
        params = params.direction(self.direction);

        if let Some(filter) = self.filter {
            params = params.filter_expression(filter.expression.clone());
            names.extend(filter.names);
            values.extend(filter.values);
            values.extend(filter.sensitive_values);
        }

        for (name, attr) in names {
            params = params.name(name, attr);
        }
        for (name, value) in values {
            params = params.value(name, value);
        }

        Ok(params)
    }
}

/// The literal text preceding the first `{` macro in a template, or the
/// whole template if it has no macro
pub(crate) fn literal_prefix(template: &str) -> &str {
    template.split('{').next().unwrap_or(template)
}

fn expand_partition_value(template: &str, user_value: &str) -> String {
    if user_value.contains('#') {
        user_value.to_owned()
    } else {
        format!("{}{}", literal_prefix(template), user_value)
    }
}

fn resolve_physical_names(index_tag: &str) -> (&'static str, Option<&'static str>) {
    if index_tag.is_empty() {
        return (
            keys::PRIMARY_KEY_DEFINITION.hash_key,
            keys::PRIMARY_KEY_DEFINITION.range_key,
        );
    }

    if let Some(definition) = registry::lookup_physical_index(index_tag) {
        return (definition.hash_key(), definition.range_key());
    }

    let (hash_key, range_key) = registry::unregistered_tag_names(index_tag);
    (hash_key, Some(range_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Widget;

    fn register_widget() {
        let _ = registry::register_index_map::<Widget>(
            crate::template::IndexMap::new()
                .with("PK", "WIDGET#{Id}")
                .with("GSI1PK", "EMAIL#{Email}")
                .with("GSI1SK", "STATUS#{Status}"),
        );
        registry::register_physical_index(
            "GSI1",
            keys::GlobalSecondaryIndexDefinition {
                index_name: "GSI1",
                hash_key: "PK1",
                range_key: Some("SK1"),
            }
            .into_index(),
        );
    }

    #[test]
    fn missing_partition_value_is_a_validation_error() {
        register_widget();
        let err = IndexQueryBuilder::new().build::<Widget>("GSI1").unwrap_err();
        assert!(err.is_key_expansion_or_builder_validation());
    }

    #[test]
    fn unknown_index_tag_is_a_validation_error() {
        register_widget();
        let err = IndexQueryBuilder::new()
            .with_partition_key("alice@x")
            .build::<Widget>("GSI9")
            .unwrap_err();
        assert!(err.is_key_expansion_or_builder_validation());
    }

    #[test]
    fn partition_value_gets_literal_prefix_and_physical_names() {
        register_widget();
        let params = IndexQueryBuilder::new()
            .with_partition_key("alice@x")
            .with_sort_key_prefix("active")
            .build::<Widget>("GSI1")
            .unwrap();

        assert_eq!(params.index_name.as_deref(), Some("GSI1"));
        assert_eq!(
            params.values[":key_PK"],
            AttributeValue::S("EMAIL#alice@x".into())
        );
        assert_eq!(params.names["#key_PK"], "PK1");
        assert_eq!(params.names["#key_SK"], "SK1");
    }

    #[test]
    fn pre_expanded_partition_value_is_used_verbatim() {
        register_widget();
        let params = IndexQueryBuilder::new()
            .with_partition_key("EMAIL#alice@x")
            .build::<Widget>("GSI1")
            .unwrap();

        assert_eq!(
            params.values[":key_PK"],
            AttributeValue::S("EMAIL#alice@x".into())
        );
    }

    #[test]
    fn multiple_filters_concatenate_with_and() {
        register_widget();
        let params = IndexQueryBuilder::new()
            .with_partition_key("alice@x")
            .with_filter("#a = :a", [("a".to_owned(), AttributeValue::S("1".into()))])
            .with_filter("#b = :b", [("b".to_owned(), AttributeValue::S("2".into()))])
            .build::<Widget>("GSI1")
            .unwrap();

        let filter = params.filter_expression.unwrap();
        assert_eq!(filter, "(#flt_a = :flt_a) AND (#flt_b = :flt_b)");
    }
}
