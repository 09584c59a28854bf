use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    Call,
    Put,
}

impl fmt::Display for OptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionKind::Call => write!(f, "call"),
            OptionKind::Put => write!(f, "put"),
        }
    }
}

/// Product family plus the static terms that only exist for that family.
/// A catalog entry claiming to be an option without strike and kind fails
/// deserialization at startup instead of surfacing mid-cycle.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InstrumentKind {
    Stock,
    Etf,
    IndexFuture {
        expiry: DateTime<Utc>,
    },
    IndexOption {
        expiry: DateTime<Utc>,
        strike: f64,
        kind: OptionKind,
    },
    EquityFuture {
        expiry: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    pub id: String,
    #[serde(flatten)]
    pub kind: InstrumentKind,
    #[serde(default)]
    pub underlying: Option<String>,
}

impl fmt::Display for Instrument {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.id)
    }
}
