use aws_sdk_dynamodb::{
    error::SdkError,
    operation::{
        delete_item::DeleteItemError, get_item::GetItemError, put_item::PutItemError,
        query::QueryError, update_item::UpdateItemError,
    },
};

use crate::EntityTypeName;

/// An error that occurred while interacting with the store
///
/// Errors can be tested against the taxonomy kinds described in the crate
/// documentation (`is_not_found`, `is_condition_failed`, `is_transient`,
/// ...) without needing to know the shape of the underlying provider error.
#[derive(Debug, thiserror::Error)]
#[repr(transparent)]
#[error(transparent)]
pub struct Error(Box<InnerError>);

impl Error {
    /// A point read or delete found no item for the given key
    pub(crate) fn not_found(entity_type: EntityTypeName, key: impl Into<String>) -> Self {
        InnerError::NotFound {
            entity_type,
            key: key.into(),
        }
        .into()
    }

    /// Reserved for callers layering their own idempotency semantics on top
    /// of the store's default upsert `put`
    pub fn already_exists(entity_type: EntityTypeName, key: impl Into<String>) -> Self {
        InnerError::AlreadyExists {
            entity_type,
            key: key.into(),
        }
        .into()
    }

    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        InnerError::Validation {
            field: field.into(),
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn condition_failed(operation: &'static str) -> Self {
        InnerError::ConditionFailed { operation }.into()
    }

    pub(crate) fn unregistered_type(name: EntityTypeName) -> Self {
        InnerError::UnregisteredType(name).into()
    }

    pub(crate) fn unregistered_index_map(type_name: &'static str) -> Self {
        InnerError::UnregisteredIndexMap { type_name }.into()
    }

    pub(crate) fn duplicate_type_registration(name: EntityTypeName) -> Self {
        InnerError::DuplicateRegistration {
            what: format!("entity type `{name}`"),
        }
        .into()
    }

    pub(crate) fn duplicate_index_map_registration(type_name: &'static str) -> Self {
        InnerError::DuplicateRegistration {
            what: format!("index map for `{type_name}`"),
        }
        .into()
    }

    /// The operation was aborted through the ambient cancellation handle
    pub(crate) fn cancelled() -> Self {
        InnerError::Cancelled.into()
    }

    /// True if this is a [`Error::not_found`] error
    pub fn is_not_found(&self) -> bool {
        matches!(&*self.0, InnerError::NotFound { .. })
    }

    /// True if this is a validation error (e.g. an empty key after expansion)
    pub fn is_validation(&self) -> bool {
        matches!(&*self.0, InnerError::Validation { .. })
    }

    /// True if the operation's condition expression evaluated to false
    pub fn is_condition_failed(&self) -> bool {
        matches!(&*self.0, InnerError::ConditionFailed { .. }) || self.is_conditional_check_failed_exception()
    }

    /// True if a needed entity type or index map was never registered
    pub fn is_unregistered(&self) -> bool {
        matches!(
            &*self.0,
            InnerError::UnregisteredType(_) | InnerError::UnregisteredIndexMap { .. }
        )
    }

    /// True if this error comes from registering the same entity type or
    /// index map a second time
    pub fn is_duplicate_registration(&self) -> bool {
        matches!(&*self.0, InnerError::DuplicateRegistration { .. })
    }

    /// True if template expansion or builder validation rejected the input
    pub fn is_key_expansion_or_builder_validation(&self) -> bool {
        matches!(
            &*self.0,
            InnerError::KeyExpansion(_) | InnerError::BuilderValidation(_)
        )
    }

    /// True if the operation was aborted through the ambient cancellation handle
    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.0, InnerError::Cancelled)
    }

    /// True if the underlying provider error is a class that streaming and
    /// retrying callers should treat as retryable: throughput exceeded,
    /// request limit exceeded, or an internal server error
    pub fn is_transient(&self) -> bool {
        self.is_provisioned_throughput_exceeded_exception()
            || self.is_request_limit_exceeded()
            || self.is_internal_server_error()
    }

    /// True if this wraps a provider error that is not retryable
    pub fn is_fatal_provider_error(&self) -> bool {
        matches!(
            &*self.0,
            InnerError::GetItem(_)
                | InnerError::Query(_)
                | InnerError::PutItem(_)
                | InnerError::DeleteItem(_)
                | InnerError::UpdateItem(_)
        ) && !self.is_transient()
            && !self.is_condition_failed()
    }

    /// Returns true if the error is a conditional check failed exception
    ///
    /// See the [AWS documentation][AWS] for more information.
    ///
    /// [AWS]: https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/Expressions.ConditionExpressions.html
    pub fn is_conditional_check_failed_exception(&self) -> bool {
        match &*self.0 {
            InnerError::PutItem(SdkError::ServiceError(e)) => {
                e.err().is_conditional_check_failed_exception()
            }
            InnerError::DeleteItem(SdkError::ServiceError(e)) => {
                e.err().is_conditional_check_failed_exception()
            }
            InnerError::UpdateItem(SdkError::ServiceError(e)) => {
                e.err().is_conditional_check_failed_exception()
            }
            _ => false,
        }
    }

    /// Returns true if the error is a provisioned throughput exceeded exception
    ///
    /// See the [AWS documentation][AWS] for more information.
    ///
    /// [AWS]: https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/WorkingWithTables.html#ProvisionedThroughput
    pub fn is_provisioned_throughput_exceeded_exception(&self) -> bool {
        match &*self.0 {
            InnerError::GetItem(SdkError::ServiceError(e)) => {
                e.err().is_provisioned_throughput_exceeded_exception()
            }
            InnerError::Query(SdkError::ServiceError(e)) => {
                e.err().is_provisioned_throughput_exceeded_exception()
            }
            InnerError::PutItem(SdkError::ServiceError(e)) => {
                e.err().is_provisioned_throughput_exceeded_exception()
            }
            InnerError::DeleteItem(SdkError::ServiceError(e)) => {
                e.err().is_provisioned_throughput_exceeded_exception()
            }
            InnerError::UpdateItem(SdkError::ServiceError(e)) => {
                e.err().is_provisioned_throughput_exceeded_exception()
            }
            _ => false,
        }
    }

    /// Returns true if the error is due to a request limit being exceeded
    ///
    /// See the [AWS documentation][AWS] for more information.
    ///
    /// [AWS]: https://docs.aws.amazon.com/amazondynamodb/latest/developerguide/Limits.html
    pub fn is_request_limit_exceeded(&self) -> bool {
        match &*self.0 {
            InnerError::GetItem(SdkError::ServiceError(e)) => e.err().is_request_limit_exceeded(),
            InnerError::Query(SdkError::ServiceError(e)) => e.err().is_request_limit_exceeded(),
            InnerError::PutItem(SdkError::ServiceError(e)) => e.err().is_request_limit_exceeded(),
            InnerError::DeleteItem(SdkError::ServiceError(e)) => {
                e.err().is_request_limit_exceeded()
            }
            InnerError::UpdateItem(SdkError::ServiceError(e)) => {
                e.err().is_request_limit_exceeded()
            }
            _ => false,
        }
    }

    /// Returns true if the error is an internal server error reported by the provider
    pub fn is_internal_server_error(&self) -> bool {
        match &*self.0 {
            InnerError::GetItem(SdkError::ServiceError(e)) => e.err().is_internal_server_error(),
            InnerError::Query(SdkError::ServiceError(e)) => e.err().is_internal_server_error(),
            InnerError::PutItem(SdkError::ServiceError(e)) => e.err().is_internal_server_error(),
            InnerError::DeleteItem(SdkError::ServiceError(e)) => {
                e.err().is_internal_server_error()
            }
            InnerError::UpdateItem(SdkError::ServiceError(e)) => {
                e.err().is_internal_server_error()
            }
            _ => false,
        }
    }
}

impl<T> From<T> for Error
where
    T: Into<InnerError>,
{
    fn from(e: T) -> Self {
        Self(Box::new(e.into()))
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum InnerError {
    #[error("dynamodb get item error")]
    GetItem(#[from] SdkError<GetItemError>),

    #[error("dynamodb query error")]
    Query(#[from] SdkError<QueryError>),

    #[error("dynamodb put item error")]
    PutItem(#[from] SdkError<PutItemError>),

    #[error("dynamodb delete item error")]
    DeleteItem(#[from] SdkError<DeleteItemError>),

    #[error("dynamodb update item error")]
    UpdateItem(#[from] SdkError<UpdateItemError>),

    #[error("failed to deserialize item")]
    ItemDeserialization(#[from] ItemDeserializationError),

    #[error("failed to serialize item")]
    ItemSerialization(#[from] ItemSerializationError),

    #[error("entity type `{entity_type}` with key `{key}` was not found")]
    NotFound {
        entity_type: EntityTypeName,
        key: String,
    },

    #[error("entity type `{entity_type}` with key `{key}` already exists")]
    AlreadyExists {
        entity_type: EntityTypeName,
        key: String,
    },

    #[error("validation failed for field `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("condition check failed during {operation}")]
    ConditionFailed { operation: &'static str },

    #[error("no deserializer registered for entity type `{0}`")]
    UnregisteredType(EntityTypeName),

    #[error("no index map registered for type `{type_name}`")]
    UnregisteredIndexMap { type_name: &'static str },

    #[error("{what} was already registered")]
    DuplicateRegistration { what: String },

    #[error(transparent)]
    KeyExpansion(#[from] crate::template::KeyExpansionError),

    #[error(transparent)]
    BuilderValidation(#[from] crate::builder::BuilderValidationError),

    #[error("operation was cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
#[error("failed to deserialize item")]
pub(crate) struct ItemDeserializationError {
    #[source]
    source: serde_dynamo::Error,
}

impl ItemDeserializationError {
    #[inline]
    pub(crate) fn new_untyped(source: serde_dynamo::Error) -> Self {
        Self { source }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to serialize item")]
pub(crate) struct ItemSerializationError {
    #[source]
    source: serde_dynamo::Error,
}

impl ItemSerializationError {
    #[inline]
    pub(crate) fn new(source: serde_dynamo::Error) -> Self {
        Self { source }
    }
}
