use bytes::Bytes;
use serial_limit::Template;
use tower::BoxError;
use tower::Layer;
use tower::Service;

use crate::config::DispatcherConfig;
use crate::dispatcher::Dispatcher;
use crate::request::Response;

/// Turns a transport into a [`Dispatcher`] that accepts template parameters.
///
/// Every call to [`layer`](Layer::layer) spawns a fresh engine with its own
/// queue and quota, so it must run inside a tokio runtime.
#[derive(Clone, Debug)]
pub struct SerialLayer {
    template: Template,
    config: DispatcherConfig,
}

impl SerialLayer {
    /// Create a SerialLayer with the default configuration.
    pub fn new(template: Template) -> Self {
        SerialLayer {
            template,
            config: DispatcherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }
}

impl<S> Layer<S> for SerialLayer
where
    S: Service<http::Request<Bytes>, Response = Response, Error = BoxError> + Send + 'static,
    S::Future: Send,
{
    type Service = Dispatcher;

    fn layer(&self, transport: S) -> Self::Service {
        Dispatcher::new(transport, self.template.clone(), self.config.clone())
    }
}
