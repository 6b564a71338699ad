//! FILENAME: core/data-model/src/error.rs

use thiserror::Error;

/// Errors shared by the settings registry and the data provider.
///
/// Misuse variants are returned synchronously. The remaining variants carry
/// failures that happen off the caller's stack and reach listeners through
/// the provider's status channel, which is why the enum is `Clone`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("Nested BeginInit is not supported")]
    NestedBeginInit,

    #[error("EndInit called without a matching BeginInit")]
    EndInitWithoutBeginInit,

    #[error("Index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Expected {expected} filter items, got {actual}")]
    FilterArity { expected: usize, actual: usize },

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Field description error: {0}")]
    Descriptions(String),

    #[error("Batch load error: {0}")]
    BatchLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type DataResult<T> = Result<T, DataError>;
