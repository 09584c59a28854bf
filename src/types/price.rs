use std::fmt;
use std::ops::{Add, Sub};

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd)]
pub struct Price(f64);

impl Price {
    pub fn new(value: f64) -> Self {
        assert!(value.is_finite(), "price must be finite");
        assert!(value >= 0.0, "price must be non-negative");

        Price(value)
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{:.2}", self.0)
    }
}

impl From<f64> for Price {
    fn from(value: f64) -> Self {
        Price::new(value)
    }
}

impl Add<f64> for Price {
    type Output = Price;

    fn add(self, rhs: f64) -> Price {
        Price::new(self.0 + rhs)
    }
}

impl Sub for Price {
    type Output = f64;

    fn sub(self, rhs: Price) -> f64 {
        self.0 - rhs.0
    }
}

/// Absorbs the float noise of `price / tick` landing a hair off an exact
/// grid multiple, so grid prices round to themselves.
const TICK_EPSILON: f64 = 1e-9;

pub fn round_down_to_tick(price: f64, tick_size: f64) -> f64 {
    (price / tick_size + TICK_EPSILON).floor() * tick_size
}

pub fn round_up_to_tick(price: f64, tick_size: f64) -> f64 {
    (price / tick_size - TICK_EPSILON).ceil() * tick_size
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: f64 = 0.10;

    #[test]
    fn round_down_never_exceeds_price() {
        for price in [0.0, 0.05, 9.87, 23.41, 100.0, 4321.99] {
            let rounded = round_down_to_tick(price, TICK);
            assert!(rounded <= price + TICK_EPSILON, "price {price}");
            assert!(rounded + TICK > price, "price {price}");
        }
    }

    #[test]
    fn round_up_never_undercuts_price() {
        for price in [0.0, 0.05, 9.87, 23.41, 100.0, 4321.99] {
            let rounded = round_up_to_tick(price, TICK);
            assert!(rounded >= price - TICK_EPSILON, "price {price}");
            assert!(rounded - TICK < price, "price {price}");
        }
    }

    #[test]
    fn rounding_is_idempotent() {
        for price in [0.05, 9.87, 23.41, 99.95, 4321.99] {
            let down = round_down_to_tick(price, TICK);
            assert!((round_down_to_tick(down, TICK) - down).abs() < TICK_EPSILON);

            let up = round_up_to_tick(price, TICK);
            assert!((round_up_to_tick(up, TICK) - up).abs() < TICK_EPSILON);
        }
    }

    #[test]
    fn grid_prices_round_to_themselves() {
        assert!((round_down_to_tick(9.8, TICK) - 9.8).abs() < TICK_EPSILON);
        assert!((round_up_to_tick(9.8, TICK) - 9.8).abs() < TICK_EPSILON);
    }

    #[test]
    #[should_panic(expected = "non-negative")]
    fn price_rejects_negative() {
        let _ = Price::new(-1.0);
    }
}
