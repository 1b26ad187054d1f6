use std::io;

use thiserror::Error;

use crate::records::RecordId;

/// Failure of a [`KeyValueStore`](crate::storage::KeyValueStore) operation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),

    #[error("storage quota exceeded writing `{key}`: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("storage I/O error for `{key}`")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },
}

/// Failure while mirroring a value into a store or reading it back.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("failed to encode value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("stored value for `{key}` is malformed")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Violation of the record list invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record {0} already exists")]
    DuplicateId(RecordId),

    #[error("record {0} not found")]
    NotFound(RecordId),

    #[error("record {from} cannot change its id to {to}")]
    IdChanged { from: RecordId, to: RecordId },

    #[error("no record id left after {0}")]
    IdExhausted(RecordId),
}
