//! # Tower Serial
//!
//! `tower-serial` sends requests to a rate-limited HTTP endpoint one at a time,
//! in submission order, while honoring the limits the server reports back.
//!
//! ## How it works
//!
//! A [`Dispatcher`] accepts template parameters from any number of tasks and
//! returns a [`Completion`] right away. A single engine task ([`Worker`]) owns
//! the transport and drains the queue:
//!
//! 1. **Serialization**: at most one request is in flight, and requests go out
//!    in the order they were submitted.
//! 2. **Quota tracking**: `x-ratelimit-remaining` / `x-ratelimit-reset` on each
//!    response update a shared [`QuotaSnapshot`]. When the budget is spent the
//!    engine arms one timer until the reset instant instead of issuing.
//! 3. **Reissue**: a `429` with `retry-after` re-sends the same request after the
//!    wait, ahead of anything queued behind it. The submitter only sees the
//!    final response.
//! 4. **Failure cool-down**: transport errors (and `429`s without a usable
//!    `retry-after`) resolve the completion with [`DispatchError::Transport`] and
//!    pause the engine briefly.
//!
//! Any `tower` service from `http::Request<Bytes>` to `http::Response<Bytes>`
//! can serve as the transport.
//!
//! ## Feature Flags
//!
//! - `json`: `RequestBuilder::json` for serializing request bodies.
//! - `reqwest`: `HttpTransport`, a transport backed by `reqwest::Client`.

mod clock;
mod config;
mod dispatcher;
mod error;
mod layer;
mod metrics;
mod outcome;
mod request;
#[cfg(feature = "reqwest")]
mod transport;
mod work_item;
mod worker;

#[cfg(test)]
mod tests;

pub use clock::Clock;
pub use config::DispatcherConfig;
pub use dispatcher::Dispatcher;
pub use error::DispatchError;
pub use layer::SerialLayer;
pub use metrics::DispatcherStats;
pub use request::Request;
pub use request::RequestBuilder;
pub use request::Response;
pub use serial_limit::QuotaSnapshot;
pub use serial_limit::ResetUnit;
pub use serial_limit::Template;
#[cfg(feature = "reqwest")]
pub use transport::HttpTransport;
pub use work_item::Completion;
pub use worker::Worker;
