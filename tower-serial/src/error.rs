use serial_limit::TemplateError;

/// Errors produced by the serial dispatcher.
///
/// Rate-limit waits are not errors: they only add latency and never reach
/// the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The request could not be built, e.g. the parameter count did not
    /// match the template or the filled URL did not parse.
    ///
    /// Always returned synchronously from `submit`; nothing was queued.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The attempt failed on the wire or the server sent a rate-limit
    /// rejection without a usable `retry-after`.
    ///
    /// The string contains the `Display` representation of the cause.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The dispatch engine stopped before the request was resolved.
    #[error("Dispatcher is closed")]
    Closed,
}

impl From<TemplateError> for DispatchError {
    fn from(err: TemplateError) -> Self {
        DispatchError::InvalidArgument(err.to_string())
    }
}
