//! Black-Scholes pricing and Greeks for European options.
//!
//! Uses the standard closed-form expressions with zero dividend yield.
//! Per-unit conventions follow market practice: vega and rho are per 1%
//! move, theta is per calendar day.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GreeksError {
    #[error("input '{field}' must be a positive finite number")]
    NonPositive { field: &'static str },
    #[error("input '{field}' must be finite")]
    NonFinite { field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GreeksInput {
    pub spot: f64,
    pub strike: f64,
    /// Time to expiry in years.
    pub time_to_expiry: f64,
    /// Annualized volatility as a fraction (0.2 = 20%).
    pub volatility: f64,
    /// Annualized continuously compounded risk-free rate.
    pub risk_free_rate: f64,
    pub option_type: OptionType,
}

/// First, second and third order sensitivities.
///
/// `vomma` and `volga` are the same quantity under two common names;
/// both are reported so callers can use either.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1% volatility move.
    pub vega: f64,
    /// Per 1% rate move.
    pub rho: f64,
    /// Delta decay per year.
    pub charm: f64,
    pub vanna: f64,
    pub vomma: f64,
    pub volga: f64,
    pub speed: f64,
    pub zomma: f64,
    pub color: f64,
}

impl GreeksInput {
    fn validate(&self) -> Result<(), GreeksError> {
        for (field, value) in [
            ("spot", self.spot),
            ("strike", self.strike),
            ("time_to_expiry", self.time_to_expiry),
            ("volatility", self.volatility),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GreeksError::NonPositive { field });
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(GreeksError::NonFinite {
                field: "risk_free_rate",
            });
        }
        Ok(())
    }
}

/// Compute the full Greeks set for a European option.
pub fn compute_greeks(input: &GreeksInput) -> Result<Greeks, GreeksError> {
    input.validate()?;

    let s = input.spot;
    let k = input.strike;
    let t = input.time_to_expiry;
    let sigma = input.volatility;
    let r = input.risk_free_rate;

    let sqrt_t = t.sqrt();
    let sigma_sqrt_t = sigma * sqrt_t;
    let d1 = ((s / k).ln() + (r + sigma * sigma / 2.0) * t) / sigma_sqrt_t;
    let d2 = d1 - sigma_sqrt_t;
    let discount = (-r * t).exp();
    let pdf_d1 = norm_pdf(d1);

    let (price, delta, theta_year, rho) = match input.option_type {
        OptionType::Call => {
            let price = s * norm_cdf(d1) - k * discount * norm_cdf(d2);
            let delta = norm_cdf(d1);
            let theta =
                -(s * pdf_d1 * sigma) / (2.0 * sqrt_t) - r * k * discount * norm_cdf(d2);
            let rho = k * t * discount * norm_cdf(d2);
            (price, delta, theta, rho)
        }
        OptionType::Put => {
            let price = k * discount * norm_cdf(-d2) - s * norm_cdf(-d1);
            let delta = norm_cdf(d1) - 1.0;
            let theta =
                -(s * pdf_d1 * sigma) / (2.0 * sqrt_t) + r * k * discount * norm_cdf(-d2);
            let rho = -k * t * discount * norm_cdf(-d2);
            (price, delta, theta, rho)
        }
    };

    let gamma = pdf_d1 / (s * sigma_sqrt_t);
    let vega = s * pdf_d1 * sqrt_t;

    // Higher-order sensitivities are identical for calls and puts.
    let charm = -pdf_d1 * (2.0 * r * t - d2 * sigma_sqrt_t) / (2.0 * t * sigma_sqrt_t);
    let vanna = -pdf_d1 * d2 / sigma;
    let vomma = vega * d1 * d2 / sigma;
    let speed = -(gamma / s) * (d1 / sigma_sqrt_t + 1.0);
    let zomma = gamma * (d1 * d2 - 1.0) / sigma;
    let color = -pdf_d1 / (2.0 * s * t * sigma_sqrt_t)
        * (1.0 + (2.0 * r * t - d2 * sigma_sqrt_t) * d1 / sigma_sqrt_t);

    Ok(Greeks {
        price,
        delta,
        gamma,
        theta: theta_year / 365.0,
        vega: vega / 100.0,
        rho: rho / 100.0,
        charm,
        vanna,
        vomma,
        volga: vomma,
        speed,
        zomma,
        color,
    })
}

/// Standard normal density.
fn norm_pdf(x: f64) -> f64 {
    (-x * x / 2.0).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Standard normal CDF via the Abramowitz & Stegun 7.1.26 erf
/// approximation, absolute error below 1.5e-7.
fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}
