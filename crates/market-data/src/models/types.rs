use std::borrow::Cow;

/// Provider identifier - mostly static constants
pub type ProviderId = Cow<'static, str>;

/// Upstream host identity used for pacing (e.g., "finnhub.io")
pub type HostId = Cow<'static, str>;
