//! The neutral query parameter object passed to the query executor
//!
//! [`QueryParams`] is intentionally provider-agnostic in shape (even though
//! its fields happen to mirror the DynamoDB `Query` API closely): it carries
//! everything [`crate::executor::execute`] needs to issue exactly one
//! `Query` call, with no notion of pagination loops or retries of its own.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;

use crate::Item;

/// The direction a query scans its index in
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanDirection {
    /// Ascending sort key order
    #[default]
    Forward,
    /// Descending sort key order
    Backward,
}

/// A single page request against an index
///
/// The table name is never part of this object: it is always supplied by
/// the store's own configuration, so a caller cannot redirect a query to a
/// different table.
#[derive(Clone, Debug)]
#[must_use]
pub struct QueryParams {
    pub(crate) index_name: Option<String>,
    pub(crate) key_condition_expression: String,
    pub(crate) filter_expression: Option<String>,
    pub(crate) names: HashMap<String, String>,
    pub(crate) values: HashMap<String, AttributeValue>,
    pub(crate) limit: Option<i32>,
    pub(crate) direction: ScanDirection,
    pub(crate) consistent_read: bool,
    pub(crate) exclusive_start_key: Option<Item>,
}

impl QueryParams {
    /// Start a new query against the base table (or an index, if set with
    /// [`Self::index_name`]) with the given key condition expression
    pub fn new(key_condition_expression: impl Into<String>) -> Self {
        Self {
            index_name: None,
            key_condition_expression: key_condition_expression.into(),
            filter_expression: None,
            names: HashMap::new(),
            values: HashMap::new(),
            limit: None,
            direction: ScanDirection::Forward,
            consistent_read: false,
            exclusive_start_key: None,
        }
    }

    /// Target a named secondary index
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// Apply a filter expression, evaluated after the key condition
    pub fn filter_expression(mut self, filter_expression: impl Into<String>) -> Self {
        self.filter_expression = Some(filter_expression.into());
        self
    }

    /// Register a `#name` placeholder
    pub fn name(mut self, placeholder: impl Into<String>, attribute: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), attribute.into());
        self
    }

    /// Register a `:value` placeholder
    pub fn value(mut self, placeholder: impl Into<String>, value: AttributeValue) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }

    /// Cap the number of items evaluated (not necessarily returned) per page
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = i32::try_from(limit).ok();
        self
    }

    /// Set the scan direction
    pub fn direction(mut self, direction: ScanDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Require a strongly consistent read
    ///
    /// Only meaningful against the base table or a local secondary index.
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = consistent_read;
        self
    }

    /// Resume from a previous page's cursor
    pub fn exclusive_start_key(mut self, cursor: Item) -> Self {
        self.exclusive_start_key = Some(cursor);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accumulates_placeholders() {
        let params = QueryParams::new("#pk = :pk")
            .name("#pk", "PK")
            .value(":pk", AttributeValue::S("USER#1".into()))
            .limit(25)
            .direction(ScanDirection::Backward);

        assert_eq!(params.names["#pk"], "PK");
        assert_eq!(params.limit, Some(25));
        assert_eq!(params.direction, ScanDirection::Backward);
    }
}
