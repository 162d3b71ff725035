use thiserror::Error;

use crate::{AssetClass, ProviderId};

/// Validation and contract errors exposed by `quotemux-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("provider '{provider}' cannot serve asset class '{asset_class}'")]
    UnsupportedCombination {
        asset_class: AssetClass,
        provider: ProviderId,
    },

    #[error("invalid provider '{value}', expected one of yahoo, polygon, alphavantage")]
    InvalidProvider { value: String },

    #[error("invalid interval '{value}'")]
    InvalidInterval { value: String },
    #[error("invalid range '{value}'")]
    InvalidRange { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("price series timestamps must be strictly ascending (violation at index {index})")]
    SeriesNotAscending { index: usize },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
