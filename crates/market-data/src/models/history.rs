use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One point of a price chart
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub volume: u64,
}

impl PricePoint {
    pub fn new(timestamp: DateTime<Utc>, price: Decimal, volume: u64) -> Self {
        Self {
            timestamp,
            price,
            volume,
        }
    }
}

/// Returns true if every timestamp is strictly after the previous one.
pub fn is_strictly_increasing(points: &[PricePoint]) -> bool {
    points.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}
