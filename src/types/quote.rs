use crate::types::price::Price;

#[derive(Debug, Copy, Clone)]
pub struct Quote {
    pub price: Price,
    pub volume: i64,
}

/// One cycle's desired resting state for an instrument. A missing side
/// means that side is not quoted this cycle.
#[derive(Debug, Clone, Default)]
pub struct QuoteTarget {
    pub bid: Option<Quote>,
    pub ask: Option<Quote>,
}
