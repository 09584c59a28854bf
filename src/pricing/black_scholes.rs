//! Closed-form European option values and deltas.

use std::f64::consts::SQRT_2;

use libm::erf;

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / SQRT_2))
}

fn d1(spot: f64, strike: f64, time_to_expiry: f64, rate: f64, sigma: f64) -> f64 {
    ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * time_to_expiry)
        / (sigma * time_to_expiry.sqrt())
}

pub fn call_value(spot: f64, strike: f64, time_to_expiry: f64, rate: f64, sigma: f64) -> f64 {
    if time_to_expiry <= 0.0 {
        return (spot - strike).max(0.0);
    }

    let d1 = d1(spot, strike, time_to_expiry, rate, sigma);
    let d2 = d1 - sigma * time_to_expiry.sqrt();
    spot * norm_cdf(d1) - strike * (-rate * time_to_expiry).exp() * norm_cdf(d2)
}

pub fn put_value(spot: f64, strike: f64, time_to_expiry: f64, rate: f64, sigma: f64) -> f64 {
    if time_to_expiry <= 0.0 {
        return (strike - spot).max(0.0);
    }

    let d1 = d1(spot, strike, time_to_expiry, rate, sigma);
    let d2 = d1 - sigma * time_to_expiry.sqrt();
    strike * (-rate * time_to_expiry).exp() * norm_cdf(-d2) - spot * norm_cdf(-d1)
}

pub fn call_delta(spot: f64, strike: f64, time_to_expiry: f64, rate: f64, sigma: f64) -> f64 {
    if time_to_expiry <= 0.0 {
        return if spot > strike { 1.0 } else { 0.0 };
    }

    norm_cdf(d1(spot, strike, time_to_expiry, rate, sigma))
}

pub fn put_delta(spot: f64, strike: f64, time_to_expiry: f64, rate: f64, sigma: f64) -> f64 {
    if time_to_expiry <= 0.0 {
        return if spot < strike { -1.0 } else { 0.0 };
    }

    norm_cdf(d1(spot, strike, time_to_expiry, rate, sigma)) - 1.0
}
