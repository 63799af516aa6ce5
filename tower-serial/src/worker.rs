use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serial_limit::Reason;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio::time::timeout;
use tower::BoxError;
use tower::Service;
use tower::ServiceExt;
use tracing::debug;
use tracing::warn;

use crate::dispatcher::Shared;
use crate::outcome;
use crate::outcome::Outcome;
use crate::request::Response;
use crate::work_item::WorkItem;

/// Where the engine is between two steps.
#[derive(Debug)]
enum State {
    /// Nothing live; consult the quota, then wait for the next item.
    Idle,
    /// Quota exhausted; one timer until the reset instant.
    Backoff(Duration),
    /// An item is claimed and about to go out.
    Live(WorkItem),
    /// The live item was rate limited and goes out again after the wait.
    Reissue(WorkItem, Duration),
    /// An attempt failed; hold off before considering the next item.
    Cooldown(Duration),
}

/// The dispatch engine.
///
/// Owns the receiving end of the pending queue and the transport. Exactly one
/// item is live at a time and every wait is a timer on this task, so callers
/// never block. Obtain one from [`Dispatcher::pair`](crate::Dispatcher::pair)
/// and drive it with [`run`](Worker::run).
#[derive(Debug)]
pub struct Worker<S> {
    transport: S,
    queue: mpsc::UnboundedReceiver<WorkItem>,
    shared: Arc<Shared>,
}

impl<S> Worker<S>
where
    S: Service<http::Request<Bytes>, Response = Response, Error = BoxError>,
{
    pub(crate) fn new(
        transport: S,
        queue: mpsc::UnboundedReceiver<WorkItem>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            transport,
            queue,
            shared,
        }
    }

    /// Process submissions until every [`Dispatcher`](crate::Dispatcher)
    /// handle is dropped and the queue is drained.
    pub async fn run(mut self) {
        let mut state = State::Idle;
        loop {
            state = match state {
                State::Idle => match self.throttle() {
                    Some(wait) => State::Backoff(wait),
                    None => match self.queue.recv().await {
                        Some(item) => self.claim(item),
                        None => break,
                    },
                },
                State::Backoff(wait) => {
                    debug!(?wait, "quota exhausted; backing off");
                    self.shared.metrics.backoff();
                    sleep(wait).await;
                    State::Idle
                }
                State::Live(item) => self.issue(item).await,
                State::Reissue(item, wait) => {
                    sleep(wait).await;
                    if item.is_cancelled() {
                        debug!(id = item.id, "cancelled while awaiting reissue");
                        self.shared.metrics.cancelled();
                        State::Idle
                    } else {
                        State::Live(item)
                    }
                }
                State::Cooldown(wait) => {
                    sleep(wait).await;
                    State::Idle
                }
            };
        }
        debug!("dispatch queue closed; engine stopped");
    }

    fn throttle(&self) -> Option<Duration> {
        let now = self.shared.config.clock.now_ms();
        match self.shared.quota.check(now) {
            ControlFlow::Continue(()) => None,
            ControlFlow::Break(Reason::Exhausted { retry_after }) => Some(retry_after),
        }
    }

    fn claim(&self, item: WorkItem) -> State {
        if item.is_cancelled() {
            debug!(id = item.id, "skipping cancelled request");
            self.shared.metrics.cancelled();
            State::Idle
        } else {
            State::Live(item)
        }
    }

    async fn issue(&mut self, item: WorkItem) -> State {
        let limit = self.shared.config.attempt_timeout;
        let attempt = async {
            match ServiceExt::<http::Request<Bytes>>::ready(&mut self.transport).await {
                Ok(svc) => {
                    debug!(id = item.id, uri = %item.request.uri(), "issuing request");
                    self.shared.metrics.issued();
                    svc.call(item.request.to_http()).await
                }
                Err(err) => Err(err),
            }
        };
        let result = match timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => Err(format!("no response within {limit:?}").into()),
        };
        self.complete(item, result)
    }

    /// React to the end of one attempt.
    fn complete(&self, item: WorkItem, result: Result<Response, BoxError>) -> State {
        match outcome::classify(result, &self.shared.config) {
            Outcome::Delivered { response, hint } => {
                if !hint.is_empty() {
                    debug!(id = item.id, ?hint, "recording quota hint");
                    self.shared.quota.observe(hint);
                }
                self.shared.metrics.delivered();
                item.resolve(Ok(response));
                State::Idle
            }
            Outcome::RateLimited { retry_after } => {
                debug!(id = item.id, ?retry_after, "rate limited; reissuing");
                self.shared.metrics.reissued();
                State::Reissue(item, retry_after)
            }
            Outcome::Failed(err) => {
                let remaining = self.shared.quota.consume_failure();
                warn!(id = item.id, %err, remaining, "request failed; cooling down");
                self.shared.metrics.failed();
                item.resolve(Err(err));
                State::Cooldown(self.shared.config.failure_cooldown)
            }
        }
    }
}
