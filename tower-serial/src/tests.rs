use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use bytes::Bytes;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use http::header::USER_AGENT;
use tokio::time::Instant;
use tokio::time::sleep;
use tower::BoxError;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;
use tower_test::mock;

use super::*;

type Handle = mock::Handle<http::Request<Bytes>, Response>;

// 2023-11-14T22:13:20Z
const T0: u64 = 1_700_000_000_000;

fn config() -> DispatcherConfig {
    DispatcherConfig::default().with_clock(Clock::from_epoch_millis(T0))
}

fn dispatcher(template: &str) -> (Dispatcher, Handle) {
    let (transport, handle) = mock::pair();
    let dispatcher = Dispatcher::new(transport, Template::new(template), config());
    (dispatcher, handle)
}

fn ok() -> Response {
    http::Response::new(Bytes::new())
}

fn response(status: u16, headers: &[(&'static str, &str)]) -> Response {
    let mut builder = http::Response::builder().status(status);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Bytes::new()).unwrap()
}

/// A 200 that spends the last of the budget until `secs` after T0.
fn exhausted_for(secs: u64) -> Response {
    let reset = (T0 / 1_000 + secs).to_string();
    response(
        200,
        &[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)],
    )
}

async fn assert_idle(handle: &mut Handle, window: Duration) {
    tokio::select! {
        req = handle.next_request() => {
            panic!("unexpected request: {:?}", req.map(|(r, _)| r.uri().clone()))
        }
        _ = sleep(window) => {}
    }
}

#[tokio::test(start_paused = true)]
async fn test_fills_template_and_delivers() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/channels/{}/messages/{}");
    assert_eq!(dispatcher.template().param_count(), 2);
    assert_eq!(
        dispatcher.template().as_str(),
        "http://api.test/channels/{}/messages/{}"
    );
    assert_eq!(dispatcher.config().clock().now_ms(), T0);

    let completion = dispatcher.submit(&["42", "7"]).unwrap();

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri(), "http://api.test/channels/42/messages/7");
    assert_eq!(req.method(), Method::GET);
    send.send_response(http::Response::new(Bytes::from_static(b"hello")));

    let response = completion.await.unwrap();
    assert_eq!(response.body(), &Bytes::from_static(b"hello"));

    let stats = dispatcher.stats();
    assert_eq!(stats.submitted, 1);
    assert_eq!(stats.issued, 1);
    assert_eq!(stats.delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_param_mismatch_is_rejected_without_io() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}/{}");

    let err = dispatcher.submit(&["only-one"]).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArgument(_)));

    let err = dispatcher.submit(&["a", "b", "c"]).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArgument(_)));

    assert_idle(&mut handle, Duration::from_secs(1)).await;
    assert_eq!(dispatcher.stats().submitted, 0);
}

#[tokio::test(start_paused = true)]
async fn test_unparsable_url_is_rejected() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let err = dispatcher.submit(&["has space"]).unwrap_err();
    assert!(matches!(err, DispatchError::InvalidArgument(_)));
    assert_idle(&mut handle, Duration::from_secs(1)).await;
}

#[tokio::test(start_paused = true)]
async fn test_one_in_flight_in_submission_order() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();
    let c = dispatcher.submit(&["c"]).unwrap();

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/a");

    // Nothing else goes out while "a" is outstanding.
    assert_idle(&mut handle, Duration::from_secs(5)).await;
    send.send_response(ok());

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/b");
    send.send_response(ok());

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/c");
    send.send_response(ok());

    a.await.unwrap();
    b.await.unwrap();
    c.await.unwrap();
    assert_eq!(dispatcher.stats().issued, 3);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_quota_is_honored() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let (_, send) = handle.next_request().await.unwrap();
    send.send_response(exhausted_for(5));
    a.await.unwrap();

    assert_eq!(
        dispatcher.quota(),
        QuotaSnapshot {
            remaining: 0,
            reset_at_ms: T0 + 5_000,
        }
    );

    let start = Instant::now();
    let b = dispatcher.submit(&["b"]).unwrap();
    let (req, send) = handle.next_request().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(req.uri().path(), "/b");
    assert!(elapsed >= Duration::from_secs(5), "issued after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "issued after {elapsed:?}");

    send.send_response(ok());
    b.await.unwrap();
    assert_eq!(dispatcher.stats().backoffs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_queued_items_wait_for_reset_in_order() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let first = dispatcher.submit(&["first"]).unwrap();
    let (_, send) = handle.next_request().await.unwrap();

    let queued: Vec<_> = ["x", "y", "z"]
        .iter()
        .map(|p| dispatcher.submit(&[p]).unwrap())
        .collect();

    let start = Instant::now();
    send.send_response(exhausted_for(2));
    first.await.unwrap();

    for expected in ["/x", "/y", "/z"] {
        let (req, send) = handle.next_request().await.unwrap();
        assert_eq!(req.uri().path(), expected);
        assert!(start.elapsed() >= Duration::from_secs(2));
        send.send_response(ok());
    }

    for completion in queued {
        completion.await.unwrap();
    }
    // A single timer covers every waiting item.
    assert_eq!(dispatcher.stats().backoffs, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_request_is_reissued_in_place() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let mut a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/a");
    let start = Instant::now();
    send.send_response(response(429, &[("retry-after", "3")]));

    // The same request goes out again, ahead of "b".
    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/a");
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(futures::poll!(&mut a).is_pending());

    send.send_response(http::Response::new(Bytes::from_static(b"second try")));
    let response = a.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), &Bytes::from_static(b"second try"));

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/b");
    send.send_response(ok());
    b.await.unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.issued, 3);
    assert_eq!(stats.reissued, 1);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_without_retry_after_fails() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let (_, send) = handle.next_request().await.unwrap();
    send.send_response(response(429, &[]));

    assert!(matches!(
        a.await.unwrap_err(),
        DispatchError::Transport(_)
    ));
    assert_eq!(dispatcher.stats().reissued, 0);
    assert_eq!(dispatcher.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_with_unparsable_retry_after_fails() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let (_, send) = handle.next_request().await.unwrap();
    send.send_response(response(429, &[("retry-after", "soon")]));

    assert!(matches!(
        a.await.unwrap_err(),
        DispatchError::Transport(_)
    ));
    assert_eq!(dispatcher.stats().reissued, 0);
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_fails_and_cools_down() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();

    let (_, send) = handle.next_request().await.unwrap();
    let start = Instant::now();
    send.send_error("connection reset");

    assert_eq!(
        a.await.unwrap_err(),
        DispatchError::Transport("connection reset".to_string())
    );
    assert_eq!(dispatcher.quota().remaining, -1);

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/b");
    assert!(start.elapsed() >= Duration::from_secs(1));
    send.send_response(ok());
    b.await.unwrap();

    assert_eq!(dispatcher.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_attempt_times_out() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();

    // Hold the responder so the attempt stays open without an answer.
    let (_, _unanswered) = handle.next_request().await.unwrap();
    let start = Instant::now();

    assert!(matches!(a.await.unwrap_err(), DispatchError::Transport(_)));
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(dispatcher.quota().remaining, -1);

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/b");
    // Timeout plus the failure cool-down.
    assert!(start.elapsed() >= Duration::from_secs(11));
    assert!(start.elapsed() < Duration::from_secs(12));
    send.send_response(ok());
    b.await.unwrap();

    assert_eq!(dispatcher.stats().failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_attempt_timeout_is_configurable() {
    let (transport, mut handle) = mock::pair();
    let config = config().with_attempt_timeout(Duration::from_secs(2));
    let dispatcher = Dispatcher::new(transport, Template::new("http://api.test/{}"), config);

    let a = dispatcher.submit(&["a"]).unwrap();
    let (_, _unanswered) = handle.next_request().await.unwrap();
    let start = Instant::now();

    a.await.unwrap_err();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(2), "failed after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "failed after {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_failure_cooldown_is_configurable() {
    let (transport, mut handle) = mock::pair();
    let config = config().with_failure_cooldown(Duration::from_millis(250));
    let dispatcher = Dispatcher::new(transport, Template::new("http://api.test/{}"), config);

    let a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();

    let (_, send) = handle.next_request().await.unwrap();
    let start = Instant::now();
    send.send_error("boom");
    a.await.unwrap_err();

    let (_, send) = handle.next_request().await.unwrap();
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(250), "issued after {elapsed:?}");
    assert!(elapsed < Duration::from_secs(1), "issued after {elapsed:?}");
    send.send_response(ok());
    b.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_item_is_skipped() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let b = dispatcher.submit(&["b"]).unwrap();
    let mut c = dispatcher.submit(&["c"]).unwrap();
    let d = dispatcher.submit(&["d"]).unwrap();

    let (_, send) = handle.next_request().await.unwrap();
    drop(b);
    c.cancel();
    send.send_response(ok());
    a.await.unwrap();

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/d");
    send.send_response(ok());
    d.await.unwrap();

    assert_eq!(c.await.unwrap_err(), DispatchError::Closed);
    assert_eq!(dispatcher.stats().cancelled, 2);
    assert_eq!(dispatcher.stats().issued, 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_while_awaiting_reissue() {
    let (dispatcher, mut handle) = dispatcher("http://api.test/{}");

    let a = dispatcher.submit(&["a"]).unwrap();
    let (_, send) = handle.next_request().await.unwrap();
    send.send_response(response(429, &[("retry-after", "2")]));
    drop(a);

    let b = dispatcher.submit(&["b"]).unwrap();
    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/b");
    send.send_response(ok());
    b.await.unwrap();

    let stats = dispatcher.stats();
    assert_eq!(stats.reissued, 1);
    assert_eq!(stats.cancelled, 1);
}

#[tokio::test(start_paused = true)]
async fn test_defaults_then_customizer() {
    let (transport, mut handle) = mock::pair();
    let config = config()
        .with_user_agent(HeaderValue::from_static("serial-test/1.0"))
        .with_defaults(|req| {
            req.set_header(
                http::header::ACCEPT,
                HeaderValue::from_static("application/json"),
            );
        });
    let dispatcher = Dispatcher::new(transport, Template::new("http://api.test/{}"), config);

    let completion = dispatcher
        .submit_with(
            |req| {
                req.post("payload")
                    .set_header(USER_AGENT, HeaderValue::from_static("override"));
            },
            &["hook"],
        )
        .unwrap();

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.method(), Method::POST);
    assert_eq!(req.body(), &Bytes::from_static(b"payload"));
    assert_eq!(req.headers()[USER_AGENT], "override");
    assert_eq!(req.headers()[http::header::ACCEPT], "application/json");
    send.send_response(ok());
    completion.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_service_via_layer() {
    let (transport, mut handle) = mock::pair();
    let mut svc = ServiceBuilder::new()
        .layer(SerialLayer::new(Template::new("http://api.test/{}")).with_config(config()))
        .service(transport);

    let call = svc
        .ready()
        .await
        .unwrap()
        .call(vec!["layered".to_string()]);
    let call = tokio::spawn(call);

    let (req, send) = handle.next_request().await.unwrap();
    assert_eq!(req.uri().path(), "/layered");
    send.send_response(ok());

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let err = svc.ready().await.unwrap().call(vec![]).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DispatchError>(),
        Some(DispatchError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_stopped_engine_closes_completions() {
    let (transport, _handle) = mock::pair::<http::Request<Bytes>, Response>();
    let (mut dispatcher, worker) =
        Dispatcher::pair(transport, Template::new("http://api.test/{}"), config());
    drop(worker);

    assert!(dispatcher.is_closed());
    // Already resolved by the time it is handed back.
    let mut completion = dispatcher.submit(&["late"]).unwrap();
    assert!(matches!(
        futures::poll!(&mut completion),
        std::task::Poll::Ready(Err(DispatchError::Closed))
    ));

    let ready = futures::poll!(std::future::poll_fn(|cx| {
        Service::<Vec<String>>::poll_ready(&mut dispatcher, cx)
    }));
    assert!(matches!(ready, std::task::Poll::Ready(Err(_))));
}

#[tokio::test]
async fn test_engine_stops_when_handles_dropped() {
    let (transport, _handle) = mock::pair::<http::Request<Bytes>, Response>();
    let (dispatcher, worker) =
        Dispatcher::pair(transport, Template::new("http://api.test/{}"), config());
    let engine = tokio::spawn(worker.run());

    let other = dispatcher.clone();
    drop(dispatcher);
    assert!(!engine.is_finished());
    drop(other);

    engine.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_submitters_are_serialized() {
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let transport = tower::service_fn({
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        move |req: http::Request<Bytes>| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, BoxError>(http::Response::new(Bytes::from(req.uri().path().to_owned())))
            }
        }
    });
    let dispatcher = Dispatcher::new(transport, Template::new("http://api.test/{}"), config());

    let mut handles = vec![];
    for i in 0..20 {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let path = format!("/{i}");
            let response = dispatcher.submit(&[i.to_string()])?.await?;
            assert_eq!(response.body(), path.as_bytes());
            Ok::<_, DispatchError>(())
        }));
    }

    for h in handles {
        h.await.expect("Task panicked").expect("Dispatch failed");
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1, "more than one request in flight");
    assert_eq!(dispatcher.stats().delivered, 20);
}
