//! # serial-limit
//!
//! `serial-limit` provides the runtime-free building blocks of a serialized,
//! rate-limit-aware dispatcher.
//!
//! ## Core Philosophy
//!
//! A remote server tells us how much budget we have left and when it comes back.
//! That information arrives on one task and is consulted from another, so it is
//! held in atomics rather than behind a `Mutex`. Nothing here sleeps or spawns:
//! callers pass the current time in and receive a decision back.
//!
//! ## Key Concepts
//!
//! * **Quota**: advisory remaining-call counter plus the wall-clock instant it resets.
//! * **Hints**: the server's `x-ratelimit-*` and `retry-after` headers, parsed
//!   into plain values by the [`signal`] module.
//! * **Templates**: endpoint URLs with positional placeholders, validated against
//!   the number of supplied parameters before anything is queued.
//!
//! ## Example
//!
//! ```rust
//! use serial_limit::Quota;
//! use serial_limit::QuotaHint;
//!
//! let quota = Quota::new();
//! let now = 1_000;
//!
//! assert!(quota.check(now).is_continue());
//!
//! // Server says: nothing left until t = 6_000ms.
//! quota.observe(QuotaHint {
//!     remaining: Some(0),
//!     reset_at_ms: Some(6_000),
//! });
//! assert!(quota.check(now).is_break());
//! assert!(quota.check(6_000).is_continue());
//! ```

use std::time::Duration;

mod quota;
pub mod signal;
mod template;

pub use quota::Quota;
pub use quota::QuotaHint;
pub use quota::QuotaSnapshot;
pub use signal::ResetUnit;
pub use template::Braces;
pub use template::Placeholders;
pub use template::Template;
pub use template::TemplateError;

/// Reasons why the next request may not be issued yet.
#[derive(Debug, PartialEq)]
pub enum Reason {
    /// Budget is spent until the reset instant.
    Exhausted { retry_after: Duration },
}
