//! Semantic kind to storage class mapping.
//!
//! This is the only place that decides which [`StorageClass`] a [`SemanticKind`] is stored as;
//! both schema inference and column construction go through it.

use crate::error::{LoaderError, LoaderResult};
use crate::types::{SemanticKind, StorageClass};

/// Storage class for a semantic kind, or `None` if the kind cannot be stored.
pub fn of(kind: SemanticKind) -> Option<StorageClass> {
    match kind {
        SemanticKind::Boolean
        | SemanticKind::Int8
        | SemanticKind::Int16
        | SemanticKind::Int32
        | SemanticKind::Int64 => Some(StorageClass::Integer),
        SemanticKind::Float32 | SemanticKind::Float64 => Some(StorageClass::Real),
        SemanticKind::Decimal => Some(StorageClass::Numeric),
        SemanticKind::Char | SemanticKind::String => Some(StorageClass::Text),
        SemanticKind::Byte | SemanticKind::Bytes => Some(StorageClass::Blob),
        SemanticKind::DateTime | SemanticKind::DateTimeOffset => Some(StorageClass::Text),
        SemanticKind::Uuid | SemanticKind::Nested => Some(StorageClass::Text),
        // Null-only columns default to INTEGER.
        SemanticKind::Null => Some(StorageClass::Integer),
        SemanticKind::Time => None,
    }
}

/// Like [`of`], failing with [`LoaderError::UnsupportedSourceType`] for `column`.
pub fn for_column(column: &str, kind: SemanticKind) -> LoaderResult<StorageClass> {
    of(kind).ok_or_else(|| LoaderError::UnsupportedSourceType {
        column: column.to_string(),
        kind: kind.to_string(),
    })
}
