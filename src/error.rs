//! Error types for query construction and execution

use crate::point::DataType;
use thiserror::Error;

/// Main error type for query planning and execution.
///
/// Construction errors surface synchronously from [`crate::select::select`]
/// and abort the whole plan. Runtime errors are returned by an iterator's
/// `next_point` alongside stream termination.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A call was constructed over an iterator type it does not support.
    ///
    /// The message format is part of the public contract:
    /// `unsupported <fn> iterator type: <type>`.
    #[error("unsupported {call} iterator type: {kind}")]
    UnsupportedIteratorType {
        /// Function name as written in the statement
        call: String,
        /// Point type of the upstream iterator
        kind: DataType,
    },

    /// A referenced field does not exist in any mapped measurement
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// A call was given the wrong number or kind of arguments
    #[error("invalid arguments for {call}: {message}")]
    InvalidArguments {
        /// Function name as written in the statement
        call: String,
        /// What was wrong with the arguments
        message: String,
    },

    /// An expression form the executor cannot evaluate
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The operand types of a binary expression cannot be combined
    #[error("incompatible types in binary expression: {lhs} {op} {rhs}")]
    IncompatibleTypes {
        /// Left operand type
        lhs: DataType,
        /// Operator as written
        op: String,
        /// Right operand type
        rhs: DataType,
    },

    /// Iterators of different point types were handed to a single merge
    #[error("cannot merge iterators of mixed types: {0} and {1}")]
    MixedTypeMerge(DataType, DataType),

    /// The statement is malformed in a way the parser cannot catch
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// Error propagated from a shard iterator
    #[error("shard error: {0}")]
    Shard(String),

    /// IO error surfaced by a collaborator
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for query operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Shorthand for the unsupported-call-type construction error
    pub fn unsupported_call(call: impl Into<String>, kind: DataType) -> Self {
        QueryError::UnsupportedIteratorType {
            call: call.into(),
            kind,
        }
    }
}
