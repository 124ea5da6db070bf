//! Terminal fallback: plausible placeholder data.
//!
//! When cache, store and every provider have failed, the resolver asks the
//! synthesizer for a structurally valid payload. Given a last-known real
//! value it perturbs that value with bounded noise so charts stay
//! continuous; without one it starts from fixed baseline constants.
//!
//! Generation is seeded: the same seed and request key always produce the
//! same numbers.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use crate::models::{
    CompanyProfile, Interval, MarketData, PricePoint, Quote, RequestKey, RequestKind,
};

/// Source tag carried by every synthesized payload.
pub const SYNTHETIC_SOURCE: &str = "SYNTHETIC";

/// Price used when nothing is known about a symbol (100.00).
pub const BASELINE_PRICE: Decimal = Decimal::ONE_HUNDRED;
pub const BASELINE_VOLUME: u64 = 2_500_000;
pub const BASELINE_MARKET_CAP: f64 = 1_000_000_000.0;
pub const BASELINE_PE_RATIO: f64 = 20.0;
pub const BASELINE_BETA: f64 = 1.0;

/// Maximum deviation from the anchor price, in basis points (2%).
const PRICE_JITTER_BPS: i64 = 200;
/// Maximum deviation from the anchor volume, in percent.
const VOLUME_JITTER_PCT: i64 = 20;
/// Maximum move between two consecutive history points, in basis points.
const STEP_JITTER_BPS: i64 = 50;

/// Seeded generator of placeholder payloads.
#[derive(Clone, Debug)]
pub struct Synthesizer {
    seed: u64,
}

impl Synthesizer {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Produce a payload for `key`.
    ///
    /// `anchor` is the last real payload known for the symbol, of any kind.
    /// A payload of the requested kind is perturbed directly; a quote or
    /// history of another kind still lends its price and volume.
    pub fn synthesize(&self, key: &RequestKey, anchor: Option<&MarketData>) -> MarketData {
        let mut rng = self.rng_for(key);
        let symbol = key.symbol.as_str();

        match key.kind {
            RequestKind::Quote => MarketData::Quote(self.quote(symbol, anchor, &mut rng)),
            RequestKind::Details => MarketData::Details(self.profile(symbol, anchor)),
            RequestKind::History(interval) => {
                MarketData::History(self.history(interval, anchor, &mut rng))
            }
            RequestKind::News(_) => MarketData::News(Vec::new()),
        }
    }

    fn rng_for(&self, key: &RequestKey) -> StdRng {
        // FNV-1a keeps the mix stable across builds
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in key
            .symbol
            .as_str()
            .bytes()
            .chain(key.kind.to_string().into_bytes())
        {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        StdRng::seed_from_u64(self.seed ^ hash)
    }

    fn quote(&self, symbol: &str, anchor: Option<&MarketData>, rng: &mut StdRng) -> Quote {
        let reference = anchor
            .and_then(MarketData::reference_price)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(BASELINE_PRICE);
        let volume = anchor
            .and_then(MarketData::reference_volume)
            .unwrap_or(BASELINE_VOLUME);

        let price = perturb_price(reference, PRICE_JITTER_BPS, rng);

        Quote::new(symbol, price, SYNTHETIC_SOURCE)
            .with_range(reference, price.max(reference), price.min(reference))
            .with_volume(perturb_volume(volume, rng))
            .with_previous_close(reference)
    }

    fn profile(&self, symbol: &str, anchor: Option<&MarketData>) -> CompanyProfile {
        if let Some(MarketData::Details(known)) = anchor {
            return CompanyProfile {
                source: Some(SYNTHETIC_SOURCE.to_string()),
                ..known.clone()
            };
        }

        CompanyProfile {
            market_cap: Some(BASELINE_MARKET_CAP),
            pe_ratio: Some(BASELINE_PE_RATIO),
            beta: Some(BASELINE_BETA),
            source: Some(SYNTHETIC_SOURCE.to_string()),
            ..CompanyProfile::with_name(symbol, symbol)
        }
    }

    /// A full series for `interval`, ending now and close to the anchor.
    ///
    /// The walk runs backwards from the anchor price so the newest point
    /// joins up with the last real value.
    fn history(
        &self,
        interval: Interval,
        anchor: Option<&MarketData>,
        rng: &mut StdRng,
    ) -> Vec<PricePoint> {
        let count = interval.bucket_count();
        let step = interval.step();

        let reference = anchor
            .and_then(MarketData::reference_price)
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(BASELINE_PRICE);
        let point_volume = match anchor {
            Some(MarketData::History(points)) => points.last().map(|p| p.volume),
            other => other
                .and_then(MarketData::reference_volume)
                .map(|daily| daily / points_per_session(interval)),
        }
        .unwrap_or(BASELINE_VOLUME / points_per_session(interval));

        let mut prices = Vec::with_capacity(count);
        let mut price = perturb_price(reference, PRICE_JITTER_BPS, rng);
        for _ in 0..count {
            prices.push(price);
            price = perturb_price(price, STEP_JITTER_BPS, rng);
        }
        prices.reverse();

        let end = Utc::now();
        prices
            .into_iter()
            .enumerate()
            .map(|(i, price)| {
                let timestamp = end - step * (count - 1 - i) as i32;
                PricePoint::new(timestamp, price, perturb_volume(point_volume, rng))
            })
            .collect()
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(42)
    }
}

/// How many points of `interval` make up one trading session.
fn points_per_session(interval: Interval) -> u64 {
    match interval {
        Interval::OneDay => 390,
        Interval::OneWeek => 7,
        _ => 1,
    }
}

fn perturb_price(price: Decimal, max_bps: i64, rng: &mut StdRng) -> Decimal {
    let bps = rng.gen_range(-max_bps..=max_bps);
    let factor = Decimal::new(10_000 + bps, 4);
    // Never below one cent
    (price * factor).round_dp(2).max(Decimal::new(1, 2))
}

fn perturb_volume(volume: u64, rng: &mut StdRng) -> u64 {
    let pct = rng.gen_range(-VOLUME_JITTER_PCT..=VOLUME_JITTER_PCT);
    (u128::from(volume) * (100 + pct) as u128 / 100) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{is_strictly_increasing, Symbol};
    use rust_decimal_macros::dec;

    fn key(symbol: &str, kind: RequestKind) -> RequestKey {
        RequestKey::new(Symbol::parse(symbol).unwrap(), kind)
    }

    fn quote_of(data: MarketData) -> Quote {
        Quote::try_from(data).unwrap()
    }

    fn history_of(data: MarketData) -> Vec<PricePoint> {
        match data {
            MarketData::History(points) => points,
            other => panic!("expected history, got {:?}", other),
        }
    }

    fn within(value: Decimal, reference: Decimal, bps: i64) -> bool {
        let tolerance = reference * Decimal::new(bps, 4) + dec!(0.01);
        (value - reference).abs() <= tolerance
    }

    #[test]
    fn test_baseline_quote() {
        let synth = Synthesizer::default();
        let quote = quote_of(synth.synthesize(&key("AAPL", RequestKind::Quote), None));

        assert!(quote.price > Decimal::ZERO);
        assert!(within(quote.price, BASELINE_PRICE, PRICE_JITTER_BPS));
        let volume = quote.volume.unwrap();
        assert!((2_000_000..=3_000_000).contains(&volume));
        assert_eq!(quote.source, SYNTHETIC_SOURCE);
        assert_eq!(quote.previous_close, Some(BASELINE_PRICE));
    }

    #[test]
    fn test_quote_stays_near_anchor() {
        let synth = Synthesizer::new(7);
        let anchor = MarketData::Quote(Quote::new("NVDA", dec!(912.40), "FINNHUB").with_volume(40_000_000));

        let quote = quote_of(synth.synthesize(&key("NVDA", RequestKind::Quote), Some(&anchor)));

        assert!(within(quote.price, dec!(912.40), PRICE_JITTER_BPS));
        let volume = quote.volume.unwrap();
        assert!((32_000_000..=48_000_000).contains(&volume));
        assert!(quote.low.unwrap() <= quote.high.unwrap());
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let a = Synthesizer::new(42);
        let b = Synthesizer::new(42);
        let k = key("MSFT", RequestKind::Quote);

        let first = quote_of(a.synthesize(&k, None));
        let second = quote_of(b.synthesize(&k, None));

        assert_eq!(first.price, second.price);
        assert_eq!(first.volume, second.volume);
    }

    #[test]
    fn test_different_seeds_diverge() {
        let k = key("MSFT", RequestKind::History(Interval::OneDay));

        let first = history_of(Synthesizer::new(1).synthesize(&k, None));
        let second = history_of(Synthesizer::new(2).synthesize(&k, None));

        let first: Vec<_> = first.iter().map(|p| p.price).collect();
        let second: Vec<_> = second.iter().map(|p| p.price).collect();
        assert_ne!(first, second);
    }

    #[test]
    fn test_history_has_exact_bucket_count() {
        let synth = Synthesizer::default();

        for interval in Interval::ALL {
            let points = history_of(synth.synthesize(&key("AAPL", RequestKind::History(interval)), None));

            assert_eq!(points.len(), interval.bucket_count(), "{interval}");
            assert!(is_strictly_increasing(&points), "{interval}");
            assert!(points.iter().all(|p| p.price > Decimal::ZERO));
            assert_eq!(points[1].timestamp - points[0].timestamp, interval.step());
        }
    }

    #[test]
    fn test_history_ends_near_last_quote() {
        let synth = Synthesizer::default();
        let anchor = MarketData::Quote(Quote::new("TSLA", dec!(250), "FINNHUB").with_volume(390_000));

        let points = history_of(synth.synthesize(
            &key("TSLA", RequestKind::History(Interval::OneDay)),
            Some(&anchor),
        ));

        let last = points.last().unwrap();
        assert!(within(last.price, dec!(250), PRICE_JITTER_BPS));
        // Daily volume spread over the session's minutes
        assert!((800..=1_200).contains(&last.volume));
    }

    #[test]
    fn test_baseline_profile() {
        let synth = Synthesizer::default();
        let data = synth.synthesize(&key("XYZ", RequestKind::Details), None);

        let MarketData::Details(profile) = data else {
            panic!("expected details");
        };
        assert_eq!(profile.name.as_deref(), Some("XYZ"));
        assert_eq!(profile.market_cap, Some(BASELINE_MARKET_CAP));
        assert_eq!(profile.pe_ratio, Some(BASELINE_PE_RATIO));
        assert_eq!(profile.beta, Some(BASELINE_BETA));
    }

    #[test]
    fn test_known_profile_is_reused() {
        let synth = Synthesizer::default();
        let anchor = MarketData::Details(CompanyProfile::with_name("AAPL", "Apple Inc.").sector("Technology"));

        let MarketData::Details(profile) = synth.synthesize(&key("AAPL", RequestKind::Details), Some(&anchor)) else {
            panic!("expected details");
        };
        assert_eq!(profile.name.as_deref(), Some("Apple Inc."));
        assert_eq!(profile.source.as_deref(), Some(SYNTHETIC_SOURCE));
    }

    #[test]
    fn test_news_is_empty() {
        let synth = Synthesizer::default();
        let data = synth.synthesize(&key("AAPL", RequestKind::News(10)), None);
        assert_eq!(data, MarketData::News(Vec::new()));
    }
}
