//! Technical indicators over closing-price series.
//!
//! Inputs are chronological closing prices. Outputs are aligned to the end
//! of the input: the last element of any output refers to the most recent
//! close.

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("period must be greater than zero")]
    ZeroPeriod,
    #[error("insufficient data: need at least {required} points, got {got}")]
    InsufficientData { required: usize, got: usize },
}

fn require(values: &[f64], required: usize) -> Result<(), IndicatorError> {
    if values.len() < required {
        return Err(IndicatorError::InsufficientData {
            required,
            got: values.len(),
        });
    }
    Ok(())
}

fn check_period(period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::ZeroPeriod);
    }
    Ok(())
}

/// Simple moving average. Returns one value per full window,
/// `values.len() - period + 1` in total.
pub fn sma(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period(period)?;
    require(values, period)?;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    let mut window_sum: f64 = values[..period].iter().sum();
    out.push(window_sum / period as f64);

    for i in period..values.len() {
        window_sum += values[i] - values[i - period];
        out.push(window_sum / period as f64);
    }
    Ok(out)
}

/// Exponential moving average seeded with the SMA of the first window.
/// Output length matches [`sma`].
pub fn ema(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period(period)?;
    require(values, period)?;

    let alpha = 2.0 / (period as f64 + 1.0);
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);
    let mut current = seed;
    for &value in &values[period..] {
        current = (value - current) * alpha + current;
        out.push(current);
    }
    Ok(out)
}

/// Relative Strength Index with Wilder smoothing.
///
/// Needs `period + 1` points for the first value. When the average loss is
/// zero the RSI saturates at 100.
pub fn rsi(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    check_period(period)?;
    require(values, period + 1)?;

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }
    let mut avg_gain = gains / period as f64;
    let mut avg_loss = losses / period as f64;

    let rsi_value = |avg_gain: f64, avg_loss: f64| {
        if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        }
    };

    let mut out = Vec::with_capacity(values.len() - period);
    out.push(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..values.len() {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        out.push(rsi_value(avg_gain, avg_loss));
    }
    Ok(out)
}

/// MACD(12, 26, 9) output, all three vectors aligned to each other and to
/// the end of the input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacdOutput {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

pub fn macd(values: &[f64]) -> Result<MacdOutput, IndicatorError> {
    require(values, MACD_SLOW + MACD_SIGNAL - 1)?;

    let fast = ema(values, MACD_FAST)?;
    let slow = ema(values, MACD_SLOW)?;

    // Both EMAs end at the last close; align the fast one to the slow one.
    let offset = fast.len() - slow.len();
    let macd_line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, &s)| fast[i + offset] - s)
        .collect();

    let signal = ema(&macd_line, MACD_SIGNAL)?;
    let macd_tail = macd_line[macd_line.len() - signal.len()..].to_vec();
    let histogram: Vec<f64> = macd_tail
        .iter()
        .zip(&signal)
        .map(|(m, s)| m - s)
        .collect();

    Ok(MacdOutput {
        macd: macd_tail,
        signal,
        histogram,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerBand {
    pub middle: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Bollinger Bands over `period` closes at `k` population standard
/// deviations.
pub fn bollinger(
    values: &[f64],
    period: usize,
    k: f64,
) -> Result<Vec<BollingerBand>, IndicatorError> {
    check_period(period)?;
    require(values, period)?;

    let mut out = Vec::with_capacity(values.len() - period + 1);
    for window in values.windows(period) {
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        let stddev = variance.sqrt();
        out.push(BollingerBand {
            middle: mean,
            upper: mean + k * stddev,
            lower: mean - k * stddev,
        });
    }
    Ok(out)
}

/// Latest value of each standard indicator over one series snapshot.
///
/// Indicators whose data requirement is not met come back absent instead
/// of failing the whole report, so a short series still yields the subset
/// it can support.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorReport {
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bollinger: Option<BollingerBand>,
}

impl IndicatorReport {
    pub fn from_closes(closes: &[f64]) -> Self {
        let last = |result: Result<Vec<f64>, IndicatorError>| {
            result.ok().and_then(|values| values.last().copied())
        };
        let macd_out = macd(closes).ok();

        Self {
            sma_20: last(sma(closes, 20)),
            sma_50: last(sma(closes, 50)),
            ema_12: last(ema(closes, 12)),
            ema_26: last(ema(closes, 26)),
            rsi_14: last(rsi(closes, 14)),
            macd: macd_out.as_ref().and_then(|m| m.macd.last().copied()),
            macd_signal: macd_out.as_ref().and_then(|m| m.signal.last().copied()),
            macd_histogram: macd_out.as_ref().and_then(|m| m.histogram.last().copied()),
            bollinger: bollinger(closes, 20, 2.0)
                .ok()
                .and_then(|bands| bands.last().copied()),
        }
    }
}
