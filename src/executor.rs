//! Query executor: turns one [`crate::query::QueryParams`] into exactly one
//! provider `Query` call
//!
//! The executor does not paginate; [`crate::stream`] drives repeated calls
//! through here page by page. It is responsible only for building the
//! request, instrumenting it the way [`crate::model`] instruments its point
//! operations, and reporting whether a failure is transient or fatal.

use aws_sdk_dynamodb::types::ReturnConsumedCapacity;
use tracing::{field, Instrument};

use crate::{
    query::{QueryParams, ScanDirection},
    Error, Item, Table,
};

/// One page of query results
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// The items returned, in the order the provider returned them
    pub items: Vec<Item>,

    /// The number of items examined before filtering, as reported by the provider
    pub scanned_count: i32,

    /// The cursor to resume from, if the provider indicated more pages remain
    pub last_evaluated_key: Option<Item>,
}

/// Execute a single query page against `table`
///
/// # Errors
///
/// Returns [`Error::is_transient`] for throughput/limit/internal-server
/// conditions a retrying caller should retry, and a non-transient error
/// otherwise. See [`crate::stream`] for the retry loop built on top of this.
pub async fn execute<T: Table>(table: &T, params: QueryParams) -> Result<Page, Error> {
    let span = tracing::info_span!(
        "DynamoDB.Query",
        span.kind = "client",
        db.system = "dynamodb",
        db.operation = "Query",
        db.name = table.table_name(),
        aws.dynamodb.index_name = params.index_name.as_deref(),
        aws.dynamodb.key_condition_expression = params.key_condition_expression,
        aws.dynamodb.filter_expression = params.filter_expression.as_deref(),
        aws.dynamodb.limit = params.limit,
        aws.dynamodb.consistent_read = params.consistent_read,
        aws.dynamodb.scan_forward = matches!(params.direction, ScanDirection::Forward),
        aws.dynamodb.exclusive_start_key = params.exclusive_start_key.as_ref().map(field::debug),
        aws.dynamodb.consumed_read_capacity = field::Empty,
        aws.dynamodb.scanned_count = field::Empty,
        aws.dynamodb.count = field::Empty,
        aws.dynamodb.has_next_page = field::Empty,
    );

    let scan_index_forward = matches!(params.direction, ScanDirection::Forward);

    let result = table
        .client()
        .query()
        .table_name(table.table_name())
        .set_index_name(params.index_name)
        .set_key_condition_expression(Some(params.key_condition_expression))
        .set_filter_expression(params.filter_expression)
        .set_expression_attribute_names((!params.names.is_empty()).then_some(params.names))
        .set_expression_attribute_values((!params.values.is_empty()).then_some(params.values))
        .set_limit(params.limit)
        .set_consistent_read(params.consistent_read.then_some(true))
        .set_scan_index_forward((!scan_index_forward).then_some(false))
        .set_exclusive_start_key(params.exclusive_start_key)
        .return_consumed_capacity(ReturnConsumedCapacity::Total)
        .send()
        .instrument(span.clone())
        .await;

    let output = result.map_err(Error::from)?;

    if let Some(capacity) = output.consumed_capacity() {
        span.record(
            "aws.dynamodb.consumed_read_capacity",
            capacity.read_capacity_units().or(capacity.capacity_units()),
        );
    }
    span.record("aws.dynamodb.scanned_count", output.scanned_count());
    span.record("aws.dynamodb.count", output.count());
    span.record(
        "aws.dynamodb.has_next_page",
        output.last_evaluated_key().is_some(),
    );

    Ok(Page {
        items: output.items.unwrap_or_default(),
        scanned_count: output.scanned_count(),
        last_evaluated_key: output.last_evaluated_key,
    })
}
