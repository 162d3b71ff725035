use serde::{Deserialize, Serialize};

use crate::{Interval, Symbol, UtcDateTime, ValidationError};

/// Single OHLCV candle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u64>,
}

impl PricePoint {
    fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [
            ("open", self.open),
            ("high", self.high),
            ("low", self.low),
            ("close", self.close),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteValue { field });
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeValue { field });
            }
        }
        Ok(())
    }
}

/// Historical candle series with strictly ascending timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub interval: Interval,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    /// Build a series, enforcing finite non-negative prices and strictly
    /// ascending timestamps.
    pub fn new(
        symbol: Symbol,
        interval: Interval,
        points: Vec<PricePoint>,
    ) -> Result<Self, ValidationError> {
        for (index, point) in points.iter().enumerate() {
            point.validate()?;
            if index > 0 && point.timestamp <= points[index - 1].timestamp {
                return Err(ValidationError::SeriesNotAscending { index });
            }
        }

        Ok(Self {
            symbol,
            interval,
            points,
        })
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Closing prices in timestamp order, the input shape indicators take.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|point| point.close).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}
