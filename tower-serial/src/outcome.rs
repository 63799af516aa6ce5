//! Classification of a finished transport attempt.

use std::time::Duration;

use http::HeaderMap;
use http::header::HeaderName;
use serial_limit::QuotaHint;
use serial_limit::signal;
use tower::BoxError;
use tracing::warn;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::request::Response;

/// What the engine should do with the live item.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Resolve with `response` and record `hint`.
    Delivered { response: Response, hint: QuotaHint },
    /// Reissue the same item after `retry_after`.
    RateLimited { retry_after: Duration },
    /// Resolve with the error and cool down.
    Failed(DispatchError),
}

pub(crate) fn classify(result: Result<Response, BoxError>, config: &DispatcherConfig) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => return Outcome::Failed(DispatchError::Transport(err.to_string())),
    };

    if response.status() == config.rate_limited_status {
        let retry_after = header_str(response.headers(), &config.retry_after_header);
        return match retry_after {
            None => Outcome::Failed(DispatchError::Transport(format!(
                "server responded with {} without {}",
                response.status(),
                config.retry_after_header
            ))),
            Some(value) => match signal::parse_retry_after(value) {
                Some(retry_after) => Outcome::RateLimited { retry_after },
                None => Outcome::Failed(DispatchError::Transport(format!(
                    "unable to parse {}: {:?}",
                    config.retry_after_header, value
                ))),
            },
        };
    }

    let hint = quota_hint(response.headers(), config);
    Outcome::Delivered { response, hint }
}

fn quota_hint(headers: &HeaderMap, config: &DispatcherConfig) -> QuotaHint {
    let remaining = header_str(headers, &config.remaining_header).and_then(|value| {
        let parsed = signal::parse_remaining(value);
        if parsed.is_none() {
            warn!(header = %config.remaining_header, value, "ignoring unparsable quota hint");
        }
        parsed
    });

    let reset_at_ms = header_str(headers, &config.reset_header).and_then(|value| {
        let parsed = signal::parse_reset(value, config.reset_unit);
        if parsed.is_none() {
            warn!(header = %config.reset_header, value, "ignoring unparsable quota hint");
        }
        parsed
    });

    QuotaHint {
        remaining,
        reset_at_ms,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
