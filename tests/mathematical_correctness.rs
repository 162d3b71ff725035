// Numerical behavior of the analytics layer against published reference
// values and basic identities.

use quotemux_core::analytics::{
    bollinger, compute_greeks, ema, macd, rsi, sma, GreeksError, GreeksInput, IndicatorError,
    OptionType,
};

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() < tolerance,
        "expected {expected}, got {actual}"
    );
}

#[test]
fn sma_of_a_constant_series_is_the_constant() {
    let values = vec![42.0; 30];
    let out = sma(&values, 10).expect("enough data");
    assert_eq!(out.len(), 21);
    assert!(out.iter().all(|&v| (v - 42.0).abs() < 1e-12));
}

#[test]
fn ema_converges_toward_a_level_shift() {
    // Step from 10 to 20: every EMA value stays between the SMA seed
    // and the new level, approaching 20 monotonically.
    let mut values = vec![10.0; 10];
    values.extend(std::iter::repeat(20.0).take(50));

    let out = ema(&values, 10).expect("enough data");
    let last = *out.last().expect("non-empty");
    assert!(last > 19.9 && last <= 20.0);
    for pair in out.windows(2) {
        assert!(pair[1] >= pair[0]);
    }
}

#[test]
fn ema_reacts_faster_than_sma() {
    let mut values = vec![100.0; 20];
    values.push(110.0);

    let last_sma = *sma(&values, 10).expect("ok").last().expect("non-empty");
    let last_ema = *ema(&values, 10).expect("ok").last().expect("non-empty");
    assert!(last_ema > last_sma);
}

#[test]
fn rsi_stays_within_bounds_on_noisy_data() {
    let values: Vec<f64> = (0..200)
        .map(|i| 100.0 + (i as f64 * 0.83).sin() * 5.0 + (i as f64 * 0.31).cos() * 3.0)
        .collect();

    let out = rsi(&values, 14).expect("enough data");
    assert_eq!(out.len(), values.len() - 14);
    assert!(out.iter().all(|&v| (0.0..=100.0).contains(&v)));
}

#[test]
fn rsi_first_value_matches_hand_computation() {
    // 14 alternating moves: avg gain 1.0, avg loss 0.5, RS = 2.
    let mut values = vec![100.0];
    for i in 0..14 {
        let last = *values.last().expect("non-empty");
        values.push(if i % 2 == 0 { last + 2.0 } else { last - 1.0 });
    }

    let out = rsi(&values, 14).expect("enough data");
    assert_close(out[0], 100.0 - 100.0 / 3.0, 1e-9);
}

#[test]
fn macd_histogram_is_the_line_minus_signal() {
    let values: Vec<f64> = (0..120)
        .map(|i| 50.0 + (i as f64 / 9.0).sin() * 4.0)
        .collect();

    let out = macd(&values).expect("enough data");
    assert_eq!(out.macd.len(), out.signal.len());
    assert_eq!(out.signal.len(), out.histogram.len());
    for i in 0..out.macd.len() {
        assert_close(out.histogram[i], out.macd[i] - out.signal[i], 1e-12);
    }
}

#[test]
fn macd_of_a_constant_series_is_zero() {
    let values = vec![75.0; 60];
    let out = macd(&values).expect("enough data");
    assert!(out.macd.iter().all(|&v| v.abs() < 1e-9));
    assert!(out.signal.iter().all(|&v| v.abs() < 1e-9));
    assert!(out.histogram.iter().all(|&v| v.abs() < 1e-9));
}

#[test]
fn bollinger_bands_collapse_on_constant_data() {
    let values = vec![50.0; 25];
    let out = bollinger(&values, 20, 2.0).expect("enough data");
    for band in out {
        assert_close(band.middle, 50.0, 1e-12);
        assert_close(band.upper, 50.0, 1e-12);
        assert_close(band.lower, 50.0, 1e-12);
    }
}

#[test]
fn bollinger_bands_bracket_the_mean_symmetrically() {
    let values: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 1.1).sin() * 2.0).collect();
    let out = bollinger(&values, 20, 2.0).expect("enough data");
    for band in out {
        assert_close(band.upper - band.middle, band.middle - band.lower, 1e-9);
        assert!(band.upper >= band.middle);
    }
}

#[test]
fn short_series_report_their_requirement() {
    let err = macd(&[1.0; 20]).expect_err("too short");
    assert_eq!(
        err,
        IndicatorError::InsufficientData {
            required: 34,
            got: 20
        }
    );

    let err = rsi(&[1.0; 14], 14).expect_err("needs period + 1");
    assert_eq!(
        err,
        IndicatorError::InsufficientData {
            required: 15,
            got: 14
        }
    );
}

fn greeks_input(option_type: OptionType) -> GreeksInput {
    GreeksInput {
        spot: 100.0,
        strike: 100.0,
        time_to_expiry: 1.0,
        volatility: 0.2,
        risk_free_rate: 0.05,
        option_type,
    }
}

#[test]
fn at_the_money_call_matches_published_values() {
    let greeks = compute_greeks(&greeks_input(OptionType::Call)).expect("valid input");

    assert_close(greeks.price, 10.4506, 1e-3);
    assert_close(greeks.delta, 0.6368, 1e-3);
    assert_close(greeks.gamma, 0.018_762, 1e-5);
    assert_close(greeks.vega, 0.375_24, 1e-4);
    assert_close(greeks.theta, -0.017_573, 1e-5);
    assert_close(greeks.rho, 0.532_32, 1e-4);
}

#[test]
fn out_of_the_money_call_matches_published_values() {
    // Haug: S = 60, K = 65, T = 0.25, sigma = 0.30, r = 0.08.
    let greeks = compute_greeks(&GreeksInput {
        spot: 60.0,
        strike: 65.0,
        time_to_expiry: 0.25,
        volatility: 0.30,
        risk_free_rate: 0.08,
        option_type: OptionType::Call,
    })
    .expect("valid input");

    assert_close(greeks.price, 2.1334, 1e-3);
}

#[test]
fn put_call_parity_holds_across_moneyness() {
    for spot in [60.0, 90.0, 100.0, 140.0] {
        let call = compute_greeks(&GreeksInput {
            spot,
            ..greeks_input(OptionType::Call)
        })
        .expect("valid input");
        let put = compute_greeks(&GreeksInput {
            spot,
            ..greeks_input(OptionType::Put)
        })
        .expect("valid input");

        let discounted_strike = 100.0 * (-0.05f64).exp();
        assert_close(call.price - put.price, spot - discounted_strike, 1e-5);
        assert_close(call.delta - put.delta, 1.0, 1e-9);
        assert_close(call.gamma, put.gamma, 1e-12);
        assert_close(call.vega, put.vega, 1e-12);
    }
}

#[test]
fn deep_out_of_the_money_call_delta_vanishes() {
    let greeks = compute_greeks(&GreeksInput {
        spot: 30.0,
        ..greeks_input(OptionType::Call)
    })
    .expect("valid input");
    assert!(greeks.delta < 1e-3);
    assert!(greeks.price < 1e-2);
}

#[test]
fn gamma_peaks_near_the_money() {
    let atm = compute_greeks(&greeks_input(OptionType::Call)).expect("valid input");
    for spot in [70.0, 140.0] {
        let away = compute_greeks(&GreeksInput {
            spot,
            ..greeks_input(OptionType::Call)
        })
        .expect("valid input");
        assert!(atm.gamma > away.gamma, "gamma at spot {spot}");
    }
}

#[test]
fn vomma_and_volga_report_the_same_number() {
    let greeks = compute_greeks(&greeks_input(OptionType::Put)).expect("valid input");
    assert_eq!(greeks.vomma, greeks.volga);
}

#[test]
fn degenerate_inputs_are_rejected_with_the_field_name() {
    let mut input = greeks_input(OptionType::Call);
    input.spot = 0.0;
    assert_eq!(
        compute_greeks(&input),
        Err(GreeksError::NonPositive { field: "spot" })
    );

    let mut input = greeks_input(OptionType::Put);
    input.time_to_expiry = 0.0;
    assert_eq!(
        compute_greeks(&input),
        Err(GreeksError::NonPositive {
            field: "time_to_expiry"
        })
    );
}
