use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use serial_limit::Quota;
use serial_limit::QuotaSnapshot;
use serial_limit::Template;
use tokio::sync::mpsc;
use tower::BoxError;
use tower::Service;
use tracing::debug;

use crate::config::DispatcherConfig;
use crate::error::DispatchError;
use crate::metrics::DispatcherMetrics;
use crate::metrics::DispatcherStats;
use crate::request::Request;
use crate::request::RequestBuilder;
use crate::request::Response;
use crate::work_item::Completion;
use crate::work_item::WorkItem;
use crate::worker::Worker;

/// State shared between the submission handles and the engine.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) template: Template,
    pub(crate) config: DispatcherConfig,
    pub(crate) quota: Quota,
    pub(crate) metrics: DispatcherMetrics,
    next_id: AtomicU64,
}

/// Submission handle for a serialized, rate-limit-aware dispatcher.
///
/// Handles are cheap to clone and may be used from any thread. All clones
/// feed the same queue, quota and engine.
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<WorkItem>,
    shared: Arc<Shared>,
}

impl Clone for Dispatcher {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("template", &self.shared.template.as_str())
            .field("quota", &self.shared.quota.snapshot())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher and spawn its engine on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime, like `tokio::spawn`.
    pub fn new<S>(transport: S, template: Template, config: DispatcherConfig) -> Self
    where
        S: Service<http::Request<Bytes>, Response = Response, Error = BoxError> + Send + 'static,
        S::Future: Send,
    {
        let (dispatcher, worker) = Self::pair(transport, template, config);
        tokio::spawn(worker.run());
        dispatcher
    }

    /// Create a dispatcher and the engine that serves it, leaving the caller
    /// to spawn [`Worker::run`].
    pub fn pair<S>(transport: S, template: Template, config: DispatcherConfig) -> (Self, Worker<S>)
    where
        S: Service<http::Request<Bytes>, Response = Response, Error = BoxError>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            template,
            config,
            quota: Quota::new(),
            metrics: DispatcherMetrics::new(),
            next_id: AtomicU64::new(0),
        });
        let worker = Worker::new(transport, rx, Arc::clone(&shared));
        (Self { tx, shared }, worker)
    }

    /// Queue a request built from the template and `params`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidArgument`] without queuing anything
    /// when `params` does not match the template. A stopped engine is not an
    /// error here; see [`enqueue`](Self::enqueue).
    pub fn submit<P: AsRef<str>>(&self, params: &[P]) -> Result<Completion, DispatchError> {
        self.submit_with(|_| {}, params)
    }

    /// Like [`submit`](Self::submit), running `customize` on the request
    /// after the configured defaults.
    pub fn submit_with<F, P>(&self, customize: F, params: &[P]) -> Result<Completion, DispatchError>
    where
        F: FnOnce(&mut RequestBuilder),
        P: AsRef<str>,
    {
        let request = self.prepare(customize, params)?;
        Ok(self.enqueue(request))
    }

    /// Build the request `submit_with` would queue, without queuing it.
    pub fn prepare<F, P>(&self, customize: F, params: &[P]) -> Result<Request, DispatchError>
    where
        F: FnOnce(&mut RequestBuilder),
        P: AsRef<str>,
    {
        let uri = self.shared.template.render(params)?;
        let mut builder = RequestBuilder::new(uri);
        self.shared.config.apply_defaults(&mut builder);
        customize(&mut builder);
        builder.build()
    }

    /// Queue an already built request.
    ///
    /// If the engine has already stopped, the returned completion is
    /// resolved with [`DispatchError::Closed`] before this returns. Otherwise
    /// it resolves only once the engine is done with the request.
    pub fn enqueue(&self, request: Request) -> Completion {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (item, completion) = WorkItem::new(id, request);
        debug!(id, uri = %item.request.uri(), "queued request");
        self.shared.metrics.submitted();

        if let Err(mpsc::error::SendError(item)) = self.tx.send(item) {
            item.resolve(Err(DispatchError::Closed));
        }
        completion
    }

    /// The URL template requests are built from.
    pub fn template(&self) -> &Template {
        &self.shared.template
    }

    /// Configuration the dispatcher was built with.
    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    /// Current quota as last reported by the server.
    pub fn quota(&self) -> QuotaSnapshot {
        self.shared.quota.snapshot()
    }

    /// Counters since the dispatcher was created.
    pub fn stats(&self) -> DispatcherStats {
        self.shared.metrics.snapshot()
    }

    /// True once the engine has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Submit template parameters through `tower`.
///
/// The queue is unbounded, so the service is always ready while the engine runs.
impl Service<Vec<String>> for Dispatcher {
    type Response = Response;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Response, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        if self.tx.is_closed() {
            Poll::Ready(Err(Box::new(DispatchError::Closed)))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, params: Vec<String>) -> Self::Future {
        let submitted = self.submit(&params);
        Box::pin(async move { Ok(submitted?.await?) })
    }
}
