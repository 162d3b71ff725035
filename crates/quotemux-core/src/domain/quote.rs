use serde::{Deserialize, Serialize};

use crate::{AssetClass, ProviderId, Symbol, UtcDateTime};

/// Quote fields a single provider may or may not populate.
///
/// Every field is optional; the merge step fills gaps from lower priority
/// providers instead of discarding a partial answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub change_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_close: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ask: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

macro_rules! fill_field {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $dst.$field.is_none() {
                $dst.$field = $src.$field.clone();
            }
        )+
    };
}

impl QuoteFields {
    /// Fill every still-empty field from `other`. Existing values win, so
    /// applying partials in priority order yields first-non-null semantics.
    pub fn fill_missing_from(&mut self, other: &QuoteFields) {
        fill_field!(
            self,
            other,
            price,
            change,
            change_percent,
            open,
            high,
            low,
            previous_close,
            volume,
            bid,
            ask,
            market_cap,
            currency,
        );
    }
}

/// Merged quote returned to callers, with provenance of which providers
/// contributed in priority order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedQuote {
    pub symbol: Symbol,
    pub asset_class: AssetClass,
    #[serde(flatten)]
    pub fields: QuoteFields,
    pub sources: Vec<ProviderId>,
    pub fetched_at: UtcDateTime,
}
