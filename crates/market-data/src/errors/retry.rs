/// Classification for retry policy.
///
/// Used by the provider chain to decide what to do after a provider call fails.
///
/// # Behavior Summary
///
/// | Class | Retry same provider? | Try next provider? | Opens backoff window? |
/// |-------|----------------------|--------------------|-----------------------|
/// | `WithBackoff` | Yes, within the attempt budget | After exhausting attempts | Yes, once exhausted |
/// | `NextProvider` | No | Yes | No |
/// | `Never` | No | No | No |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient upstream failure (429, 503, 504, network I/O).
    ///
    /// The call is repeated with exponential backoff. When the attempt
    /// budget runs out the provider enters a backoff window and is skipped
    /// by later requests until the window closes.
    WithBackoff,

    /// The provider cannot serve this request (other 4xx/5xx, parse failure,
    /// invalid payload) but another provider might.
    /// Recorded for observability only.
    NextProvider,

    /// Request-level error or internal pipeline signal. Never retried.
    Never,
}
