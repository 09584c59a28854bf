use chrono::{DateTime, Utc};

use crate::pricing::black_scholes::{call_delta, call_value, put_delta, put_value};
use crate::types::instrument::OptionKind;

const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

/// Wall-clock time to expiry in year-fraction units, floored at zero.
pub fn year_fraction(now: DateTime<Utc>, expiry: DateTime<Utc>) -> f64 {
    (expiry - now).num_seconds().max(0) as f64 / SECONDS_PER_YEAR
}

/// Risk-free forward pricing, shared by index and equity futures.
pub fn forward_value(spot: f64, rate: f64, time_to_expiry: f64) -> f64 {
    spot * (rate * time_to_expiry).exp()
}

pub fn option_value(
    kind: OptionKind,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    rate: f64,
    sigma: f64,
) -> f64 {
    match kind {
        OptionKind::Call => call_value(spot, strike, time_to_expiry, rate, sigma),
        OptionKind::Put => put_value(spot, strike, time_to_expiry, rate, sigma),
    }
}

pub fn option_delta(
    kind: OptionKind,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    rate: f64,
    sigma: f64,
) -> f64 {
    match kind {
        OptionKind::Call => call_delta(spot, strike, time_to_expiry, rate, sigma),
        OptionKind::Put => put_delta(spot, strike, time_to_expiry, rate, sigma),
    }
}
