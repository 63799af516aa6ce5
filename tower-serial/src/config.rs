use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use http::HeaderMap;
use http::HeaderValue;
use http::StatusCode;
use http::header::HeaderName;
use http::header::RETRY_AFTER;
use http::header::USER_AGENT;
use serial_limit::ResetUnit;

use crate::clock::Clock;
use crate::request::RequestBuilder;

type DefaultsHook = Arc<dyn Fn(&mut RequestBuilder) + Send + Sync>;

/// Tunables for a [`Dispatcher`](crate::Dispatcher).
///
/// The defaults match Discord-style webhooks: `429` with `retry-after` in
/// seconds, `x-ratelimit-remaining`, and `x-ratelimit-reset` as epoch seconds.
#[derive(Clone)]
pub struct DispatcherConfig {
    pub(crate) attempt_timeout: Duration,
    pub(crate) failure_cooldown: Duration,
    pub(crate) reset_unit: ResetUnit,
    pub(crate) rate_limited_status: StatusCode,
    pub(crate) retry_after_header: HeaderName,
    pub(crate) remaining_header: HeaderName,
    pub(crate) reset_header: HeaderName,
    pub(crate) default_headers: HeaderMap,
    pub(crate) defaults: Option<DefaultsHook>,
    pub(crate) clock: Clock,
}

impl fmt::Debug for DispatcherConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherConfig")
            .field("attempt_timeout", &self.attempt_timeout)
            .field("failure_cooldown", &self.failure_cooldown)
            .field("reset_unit", &self.reset_unit)
            .field("rate_limited_status", &self.rate_limited_status)
            .field("retry_after_header", &self.retry_after_header)
            .field("remaining_header", &self.remaining_header)
            .field("reset_header", &self.reset_header)
            .field("default_headers", &self.default_headers)
            .field("defaults", &self.defaults.as_ref().map(|_| ".."))
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(10),
            failure_cooldown: Duration::from_secs(1),
            reset_unit: ResetUnit::Seconds,
            rate_limited_status: StatusCode::TOO_MANY_REQUESTS,
            retry_after_header: RETRY_AFTER,
            remaining_header: HeaderName::from_static("x-ratelimit-remaining"),
            reset_header: HeaderName::from_static("x-ratelimit-reset"),
            default_headers: HeaderMap::new(),
            defaults: None,
            clock: Clock::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a limit on a single attempt, from waiting for the transport to be
    /// ready until its response arrives.
    ///
    /// An attempt that runs out of time fails like any other transport error.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set how long the engine pauses after a failed attempt.
    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    /// Set the unit of the reset header.
    pub fn with_reset_unit(mut self, unit: ResetUnit) -> Self {
        self.reset_unit = unit;
        self
    }

    /// Set the status code that marks a rate-limit rejection.
    pub fn with_rate_limited_status(mut self, status: StatusCode) -> Self {
        self.rate_limited_status = status;
        self
    }

    /// Override the names of the three rate-limit headers.
    pub fn with_headers(
        mut self,
        retry_after: HeaderName,
        remaining: HeaderName,
        reset: HeaderName,
    ) -> Self {
        self.retry_after_header = retry_after;
        self.remaining_header = remaining;
        self.reset_header = reset;
        self
    }

    /// Add a header to every request built by the dispatcher.
    pub fn with_default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// Shorthand for a default `User-Agent`.
    pub fn with_user_agent(mut self, value: HeaderValue) -> Self {
        self.default_headers.insert(USER_AGENT, value);
        self
    }

    /// Run `hook` on every request before the per-call customizer.
    pub fn with_defaults<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestBuilder) + Send + Sync + 'static,
    {
        self.defaults = Some(Arc::new(hook));
        self
    }

    /// Use `clock` for reset arithmetic.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn failure_cooldown(&self) -> Duration {
        self.failure_cooldown
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    pub(crate) fn apply_defaults(&self, builder: &mut RequestBuilder) {
        for (name, value) in &self.default_headers {
            builder.header(name.clone(), value.clone());
        }
        if let Some(hook) = &self.defaults {
            hook(builder);
        }
    }
}
