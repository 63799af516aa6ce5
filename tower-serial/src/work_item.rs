use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use pin_project_lite::pin_project;
use tokio::sync::oneshot;
use tracing::trace;

use crate::error::DispatchError;
use crate::request::Request;
use crate::request::Response;

type Slot = oneshot::Sender<Result<Response, DispatchError>>;

/// One queued request plus the sender half of its completion.
pub(crate) struct WorkItem {
    pub(crate) id: u64,
    pub(crate) request: Request,
    completion: Slot,
}

impl fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("uri", self.request.uri())
            .finish()
    }
}

impl WorkItem {
    pub(crate) fn new(id: u64, request: Request) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        let item = Self {
            id,
            request,
            completion: tx,
        };
        (item, Completion { rx, id })
    }

    /// The submitter dropped or cancelled its [`Completion`].
    pub(crate) fn is_cancelled(&self) -> bool {
        self.completion.is_closed()
    }

    /// Resolve the completion. Consumes the item, so this happens once.
    pub(crate) fn resolve(self, result: Result<Response, DispatchError>) {
        if self.completion.send(result).is_err() {
            trace!(id = self.id, "completion dropped before resolution");
        }
    }
}

pin_project! {
    /// Resolves once the dispatcher is done with a submitted request.
    ///
    /// Dropping it before the request is issued cancels the request.
    #[derive(Debug)]
    pub struct Completion {
        #[pin]
        rx: oneshot::Receiver<Result<Response, DispatchError>>,
        id: u64,
    }
}

impl Completion {
    /// Submission sequence number of the request.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Ask the dispatcher not to issue the request.
    ///
    /// Has no effect once the request is on the wire; a result that already
    /// arrived can still be awaited.
    pub fn cancel(&mut self) {
        self.rx.close();
    }
}

impl Future for Completion {
    type Output = Result<Response, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match this.rx.poll(cx) {
            Poll::Ready(Ok(res)) => Poll::Ready(res),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}
