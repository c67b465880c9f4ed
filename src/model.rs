//! Low-level point operation builders against a single DynamoDB item
//!
//! These operate directly on physical [`Item`] key maps; they know nothing
//! about key templates or entity types. [`crate::store::Store`] composes
//! them with [`crate::template`]/[`crate::registry`] to provide the typed,
//! per-entity operations applications actually call.

use std::collections::HashMap;

use aws_sdk_dynamodb::{
    error::SdkError,
    operation::{
        delete_item::{DeleteItemError, DeleteItemOutput},
        get_item::{GetItemError, GetItemOutput},
        put_item::{PutItemError, PutItemOutput},
        update_item::{UpdateItemError, UpdateItemOutput},
    },
    types::{ReturnConsumedCapacity, ReturnValue},
};
use tracing::{field, Instrument};

use crate::{expr, Item, Table};

/// A builder for get item operations
#[derive(Debug, Clone)]
#[must_use]
pub struct Get {
    key: Item,
    consistent_read: Option<bool>,
}

impl Get {
    /// Prepare a get item operation
    #[inline]
    pub fn new(key: Item) -> Self {
        Self {
            key,
            consistent_read: None,
        }
    }

    /// Require a consistent read for this operation
    #[inline]
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Execute a single item get request against the given table
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<GetItemOutput, SdkError<GetItemError>> {
        let span = tracing::info_span!(
            "DynamoDB.GetItem",
            span.kind = "client",
            db.system = "dynamodb",
            db.operation = "GetItem",
            db.name = table.table_name(),
            aws.dynamodb.key = ?self.key,
            aws.dynamodb.consistent_read = self.consistent_read,
            aws.dynamodb.consumed_read_capacity = field::Empty,
        );

        let result = table
            .client()
            .get_item()
            .set_key((!self.key.is_empty()).then_some(self.key))
            .set_consistent_read(self.consistent_read)
            .table_name(table.table_name())
            .return_consumed_capacity(ReturnConsumedCapacity::Total)
            .send()
            .instrument(span.clone())
            .await;

        if let Ok(output) = &result {
            record_consumed_read_capacity(&span, output.consumed_capacity.as_ref());
        }

        result
    }
}

/// A builder for put item operations
#[derive(Debug, Default, Clone)]
#[must_use]
pub struct Put {
    item: Item,
}

impl Put {
    /// Prepare a put item operation
    #[inline]
    pub fn new(item: Item) -> Self {
        Self { item }
    }

    /// Apply a typed conditional expression to the operation
    ///
    /// If the condition evaluates to false, then the operation will fail, but
    /// any relevant write capacity units will still be consumed.
    #[inline]
    pub fn condition(self, condition: expr::Condition) -> ConditionalPut {
        ConditionalPut {
            item: self.item,
            condition: Some(condition),
        }
    }

    /// Execute a single item put operation against the given table
    ///
    /// This method will not return any old or new values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<PutItemOutput, SdkError<PutItemError>> {
        ConditionalPut {
            item: self.item,
            condition: None,
        }
        .execute(table)
        .await
    }

    /// Execute a single item put operation against the given table
    /// with some returned values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
        return_value: ReturnValue,
    ) -> Result<PutItemOutput, SdkError<PutItemError>> {
        ConditionalPut {
            item: self.item,
            condition: None,
        }
        .execute_with_return(table, return_value)
        .await
    }
}

/// A put operation that has a condition applied
#[derive(Debug, Clone)]
#[must_use]
pub struct ConditionalPut {
    item: Item,
    condition: Option<expr::Condition>,
}

impl ConditionalPut {
    /// Execute a single item put operation against the given table
    ///
    /// This method will not return any old or new values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<PutItemOutput, SdkError<PutItemError>> {
        self.run(table, None).await
    }

    /// Execute a single item put operation against the given table
    /// with some returned values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
        return_value: ReturnValue,
    ) -> Result<PutItemOutput, SdkError<PutItemError>> {
        self.run(table, Some(return_value)).await
    }

    async fn run<T: Table>(
        self,
        table: &T,
        return_value: Option<ReturnValue>,
    ) -> Result<PutItemOutput, SdkError<PutItemError>> {
        let span = tracing::info_span!(
            "DynamoDB.PutItem",
            span.kind = "client",
            db.system = "dynamodb",
            db.operation = "PutItem",
            db.name = table.table_name(),
            aws.dynamodb.conditional_expression = field::Empty,
            aws.dynamodb.expression_attribute_names = field::Empty,
            aws.dynamodb.expression_attribute_values = field::Empty,
            aws.dynamodb.consumed_write_capacity = field::Empty,
        );

        let mut query = table
            .client()
            .put_item()
            .set_item(Some(self.item))
            .set_return_values(return_value)
            .table_name(table.table_name())
            .return_consumed_capacity(ReturnConsumedCapacity::Total);

        if let Some(condition) = self.condition {
            span.record("aws.dynamodb.conditional_expression", &condition.expression);
            let names = if !condition.names.is_empty() {
                let names: HashMap<_, _> = condition.names.into_iter().collect();
                span.record(
                    "aws.dynamodb.expression_attribute_names",
                    field::debug(&names),
                );
                Some(names)
            } else {
                None
            };

            let values = if !condition.values.is_empty() || !condition.sensitive_values.is_empty() {
                let mut values: Item = condition.values.into_iter().collect();
                span.record(
                    "aws.dynamodb.expression_attribute_values",
                    field::debug(&values),
                );

                values.extend(condition.sensitive_values);

                Some(values)
            } else {
                None
            };

            query = query
                .set_condition_expression(Some(condition.expression))
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
        }

        let result = query.send().instrument(span.clone()).await;

        if let Ok(output) = &result {
            record_consumed_write_capacity(&span, output.consumed_capacity.as_ref());
        }

        result
    }
}

/// A builder for update item operations without an update expression
#[derive(Debug, Clone)]
#[must_use]
pub struct Update {
    key: Item,
}

impl Update {
    /// Prepare a new update item operation
    #[inline]
    pub fn new(key: Item) -> Self {
        Self { key }
    }

    /// The typed update expression to be evaluated
    #[inline]
    pub fn expression(self, update: impl Into<expr::Update>) -> UpdateWithExpr {
        UpdateWithExpr {
            key: self.key,
            update: update.into(),
        }
    }
}

/// A builder for update item operations
#[derive(Debug, Clone)]
#[must_use]
pub struct UpdateWithExpr {
    key: Item,
    update: expr::Update,
}

impl UpdateWithExpr {
    /// Apply a typed conditional expression to the operation
    ///
    /// If the condition evaluates to false, then the operation will fail, but
    /// any relevant write capacity units will still be consumed.
    #[inline]
    pub fn condition(self, condition: expr::Condition) -> ConditionalUpdate {
        ConditionalUpdate {
            key: self.key,
            update: self.update,
            condition: Some(condition),
        }
    }

    /// Execute a single item update operation against the given table
    ///
    /// This method will not return any old or new values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError>> {
        ConditionalUpdate {
            key: self.key,
            update: self.update,
            condition: None,
        }
        .execute(table)
        .await
    }

    /// Execute a single item update operation against the given table,
    /// returning the old and/or new values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
        return_value: ReturnValue,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError>> {
        ConditionalUpdate {
            key: self.key,
            update: self.update,
            condition: None,
        }
        .execute_with_return(table, return_value)
        .await
    }
}

/// A conditional update item operation
#[derive(Debug, Clone)]
#[must_use]
pub struct ConditionalUpdate {
    key: Item,
    update: expr::Update,
    condition: Option<expr::Condition>,
}

impl ConditionalUpdate {
    /// Execute a single item update operation against the given table
    ///
    /// This method will not return any old or new values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError>> {
        self.run(table, None).await
    }

    /// Execute a single item update operation against the given table,
    /// returning the old and/or new values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
        return_value: ReturnValue,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError>> {
        self.run(table, Some(return_value)).await
    }

    async fn run<T: Table>(
        self,
        table: &T,
        return_value: Option<ReturnValue>,
    ) -> Result<UpdateItemOutput, SdkError<UpdateItemError>> {
        let span = tracing::info_span!(
            "DynamoDB.UpdateItem",
            span.kind = "client",
            db.system = "dynamodb",
            db.operation = "UpdateItem",
            db.name = table.table_name(),
            aws.dynamodb.key = ?self.key,
            aws.dynamodb.update_expression = self.update.expression,
            aws.dynamodb.conditional_expression = field::Empty,
            aws.dynamodb.expression_attribute_names = field::Empty,
            aws.dynamodb.expression_attribute_values = field::Empty,
            aws.dynamodb.consumed_write_capacity = field::Empty,
        );

        let mut query = table
            .client()
            .update_item()
            .set_key(Some(self.key))
            .set_update_expression(Some(self.update.expression))
            .set_return_values(return_value)
            .set_table_name(Some(table.table_name().into()))
            .return_consumed_capacity(ReturnConsumedCapacity::Total);

        let (cnd_names, cnd_values, cnd_sensitive_values) = if let Some(condition) = self.condition
        {
            span.record("aws.dynamodb.conditional_expression", &condition.expression);
            query = query.set_condition_expression(Some(condition.expression));
            (
                condition.names,
                condition.values,
                condition.sensitive_values,
            )
        } else {
            Default::default()
        };

        let needs_names = !cnd_names.is_empty() || !self.update.names.is_empty();
        let names = needs_names.then(|| cnd_names.into_iter().chain(self.update.names).collect());

        span.record(
            "aws.dynamodb.expression_attribute_names",
            field::debug(&names),
        );

        let needs_values = !cnd_values.is_empty()
            || !cnd_sensitive_values.is_empty()
            || !self.update.values.is_empty()
            || !self.update.sensitive_values.is_empty();

        let values = if needs_values {
            let mut vals = HashMap::with_capacity(
                cnd_values.len()
                    + cnd_sensitive_values.len()
                    + self.update.values.len()
                    + self.update.sensitive_values.len(),
            );
            vals.extend(cnd_values);
            vals.extend(self.update.values);

            span.record(
                "aws.dynamodb.expression_attribute_values",
                field::debug(&vals),
            );

            vals.extend(cnd_sensitive_values);
            vals.extend(self.update.sensitive_values);

            Some(vals)
        } else {
            None
        };

        query = query
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values);

        let result = query.send().instrument(span.clone()).await;

        if let Ok(output) = &result {
            record_consumed_write_capacity(&span, output.consumed_capacity.as_ref());
        }

        result
    }
}

/// A builder for delete item operations
#[derive(Debug, Clone)]
#[must_use]
pub struct Delete {
    key: Item,
}

impl Delete {
    /// Prepare a new delete operation
    #[inline]
    pub fn new(key: Item) -> Self {
        Self { key }
    }

    /// Apply a typed conditional expression to the operation
    ///
    /// If the condition evaluates to false, then the operation will fail, but
    /// any relevant write capacity units will still be consumed.
    #[inline]
    pub fn condition(self, condition: expr::Condition) -> ConditionalDelete {
        ConditionalDelete {
            key: self.key,
            condition: Some(condition),
        }
    }

    /// Execute a single item delete operation against the given table
    ///
    /// This method will not return the old values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<DeleteItemOutput, SdkError<DeleteItemError>> {
        ConditionalDelete {
            key: self.key,
            condition: None,
        }
        .execute(table)
        .await
    }

    /// Execute a single item delete operation against the given table,
    /// returning the old values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
    ) -> Result<DeleteItemOutput, SdkError<DeleteItemError>> {
        ConditionalDelete {
            key: self.key,
            condition: None,
        }
        .execute_with_return(table)
        .await
    }
}

/// A delete operation that has a condition applied
#[derive(Debug, Clone)]
#[must_use]
pub struct ConditionalDelete {
    condition: Option<expr::Condition>,
    key: Item,
}

impl ConditionalDelete {
    /// Execute a single item delete operation against the given table
    ///
    /// This method will not return the old values.
    pub async fn execute<T: Table>(
        self,
        table: &T,
    ) -> Result<DeleteItemOutput, SdkError<DeleteItemError>> {
        self.run(table, None).await
    }

    /// Execute a single item delete operation against the given table,
    /// returning the old values
    pub async fn execute_with_return<T: Table>(
        self,
        table: &T,
    ) -> Result<DeleteItemOutput, SdkError<DeleteItemError>> {
        self.run(table, Some(ReturnValue::AllOld)).await
    }

    async fn run<T: Table>(
        self,
        table: &T,
        return_value: Option<ReturnValue>,
    ) -> Result<DeleteItemOutput, SdkError<DeleteItemError>> {
        let span = tracing::info_span!(
            "DynamoDB.DeleteItem",
            span.kind = "client",
            db.system = "dynamodb",
            db.operation = "DeleteItem",
            db.name = table.table_name(),
            aws.dynamodb.key = ?self.key,
            aws.dynamodb.conditional_expression = field::Empty,
            aws.dynamodb.expression_attribute_names = field::Empty,
            aws.dynamodb.expression_attribute_values = field::Empty,
            aws.dynamodb.consumed_write_capacity = field::Empty,
        );

        let mut query = table
            .client()
            .delete_item()
            .set_key(Some(self.key))
            .set_return_values(return_value)
            .table_name(table.table_name())
            .return_consumed_capacity(ReturnConsumedCapacity::Total);

        if let Some(condition) = self.condition {
            span.record("aws.dynamodb.conditional_expression", &condition.expression);
            let names = if !condition.names.is_empty() {
                let names: HashMap<_, _> = condition.names.into_iter().collect();
                span.record(
                    "aws.dynamodb.expression_attribute_names",
                    field::debug(&names),
                );
                Some(names)
            } else {
                None
            };

            let values = if !condition.values.is_empty() || !condition.sensitive_values.is_empty() {
                let mut values: Item = condition.values.into_iter().collect();
                span.record(
                    "aws.dynamodb.expression_attribute_values",
                    field::debug(&values),
                );

                values.extend(condition.sensitive_values);

                Some(values)
            } else {
                None
            };

            query = query
                .set_condition_expression(Some(condition.expression))
                .set_expression_attribute_names(names)
                .set_expression_attribute_values(values)
        }

        let result = query.send().instrument(span.clone()).await;

        if let Ok(output) = &result {
            record_consumed_write_capacity(&span, output.consumed_capacity.as_ref());
        }

        result
    }
}

fn record_consumed_read_capacity(
    span: &tracing::Span,
    consumed_capacity: Option<&aws_sdk_dynamodb::types::ConsumedCapacity>,
) {
    if let Some(consumed_capacity) = consumed_capacity {
        span.record(
            "aws.dynamodb.consumed_read_capacity",
            consumed_capacity
                .read_capacity_units()
                .or(consumed_capacity.capacity_units()),
        );
    }
}

fn record_consumed_write_capacity(
    span: &tracing::Span,
    consumed_capacity: Option<&aws_sdk_dynamodb::types::ConsumedCapacity>,
) {
    if let Some(consumed_capacity) = consumed_capacity {
        span.record(
            "aws.dynamodb.consumed_write_capacity",
            consumed_capacity
                .write_capacity_units()
                .or(consumed_capacity.capacity_units()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;

    fn key(pk: &str, sk: &str) -> Item {
        [
            ("PK".to_owned(), AttributeValue::S(pk.to_owned())),
            ("SK".to_owned(), AttributeValue::S(sk.to_owned())),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn put_condition_moves_into_conditional_put() {
        let condition = expr::Condition::new("attribute_not_exists(#pk)").name("#pk", "PK");
        let put = Put::new(key("A", "B")).condition(condition);
        assert!(put.condition.is_some());
    }

    #[test]
    fn update_expression_moves_into_update_with_expr() {
        let update = expr::Update::new("SET #n = :n").name("#n", "name").value(":n", "hi");
        let prepared = Update::new(key("A", "B")).expression(update);
        assert_eq!(prepared.key.len(), 2);
    }
}
