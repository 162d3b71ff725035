//! Pure numeric analytics: technical indicators and option Greeks.

pub mod greeks;
pub mod indicators;

pub use greeks::{compute_greeks, Greeks, GreeksError, GreeksInput, OptionType};
pub use indicators::{
    bollinger, ema, macd, rsi, sma, BollingerBand, IndicatorError, IndicatorReport, MacdOutput,
};
