//! Market data models
//!
//! This module contains the core data types for the resolution pipeline:
//! - `types` - Type aliases for common identifiers (ProviderId, HostId)
//! - `symbol` - Validated ticker symbol
//! - `kind` - Request kinds, capability tags, history intervals and the cache key
//! - `quote`, `profile`, `history`, `news` - Payload shapes
//! - `payload` - Kind-erased payload enum (MarketData)
//! - `resolution` - Tagged terminal result (Resolution, Origin)

mod history;
mod kind;
mod news;
mod payload;
mod profile;
mod quote;
mod resolution;
mod symbol;
mod types;

pub use history::{is_strictly_increasing, PricePoint};
pub use kind::{DataKind, Interval, RequestKey, RequestKind};
pub use news::NewsArticle;
pub use payload::MarketData;
pub use profile::CompanyProfile;
pub use quote::Quote;
pub use resolution::{Origin, Resolution};
pub use symbol::Symbol;
pub use types::{HostId, ProviderId};
