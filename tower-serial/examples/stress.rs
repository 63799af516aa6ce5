use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use bytes::Bytes;
use clap::Parser;
use hdrhistogram::Histogram;
use rand::Rng;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio::time::sleep;
use tower::BoxError;
use tower::service_fn;
use tower_serial::DispatchError;
use tower_serial::Dispatcher;
use tower_serial::DispatcherConfig;
use tower_serial::Response;
use tower_serial::Template;

/// Push a burst of requests through a dispatcher against a simulated
/// rate-limited endpoint.
#[derive(Parser, Debug)]
struct Args {
    /// Number of requests to submit
    #[arg(long, default_value_t = 200)]
    requests: usize,

    /// Calls the endpoint allows per window
    #[arg(long, default_value_t = 30)]
    budget: u64,

    /// Length of the endpoint's quota window
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    window: Duration,

    /// Simulated round-trip time per call
    #[arg(long, value_parser = humantime::parse_duration, default_value = "5ms")]
    latency: Duration,

    /// Probability that a call is rejected with 429 regardless of budget
    #[arg(long, default_value_t = 0.02)]
    reject_rate: f64,

    /// Probability that a call fails at the transport level
    #[arg(long, default_value_t = 0.01)]
    error_rate: f64,
}

/// Fixed-window quota, reported the way Discord does.
#[derive(Debug)]
struct Endpoint {
    budget: u64,
    window: Duration,
    started: Instant,
    epoch_ms: u64,
    // (window index, calls used in it)
    used: Mutex<(u64, u64)>,
}

impl Endpoint {
    fn new(budget: u64, window: Duration) -> Self {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            budget,
            window,
            started: Instant::now(),
            epoch_ms,
            used: Mutex::new((0, 0)),
        }
    }

    fn handle(&self, reject_rate: f64) -> Response {
        let window_ms = self.window.as_millis().max(1) as u64;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let index = elapsed_ms / window_ms;
        let reset_at_ms = self.epoch_ms + (index + 1) * window_ms;
        let until_reset = (index + 1) * window_ms - elapsed_ms;

        let mut used = self.used.lock().unwrap_or_else(|e| e.into_inner());
        if used.0 != index {
            *used = (index, 0);
        }

        let rejected = used.1 >= self.budget || rand::rng().random_bool(reject_rate);
        if rejected {
            let retry_after = until_reset.div_ceil(1_000).to_string();
            return http::Response::builder()
                .status(429)
                .header("retry-after", retry_after)
                .body(Bytes::new())
                .unwrap_or_default();
        }

        used.1 += 1;
        let remaining = (self.budget - used.1).to_string();
        let reset = format!("{}.{:03}", reset_at_ms / 1_000, reset_at_ms % 1_000);
        http::Response::builder()
            .status(200)
            .header("x-ratelimit-remaining", remaining)
            .header("x-ratelimit-reset", reset)
            .body(Bytes::from_static(b"ok"))
            .unwrap_or_default()
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();
    let endpoint = Arc::new(Endpoint::new(args.budget, args.window));

    let transport = service_fn({
        let endpoint = endpoint.clone();
        let latency = args.latency;
        let reject_rate = args.reject_rate;
        let error_rate = args.error_rate;
        move |_req: http::Request<Bytes>| {
            let endpoint = endpoint.clone();
            async move {
                sleep(latency).await;
                if rand::rng().random_bool(error_rate) {
                    return Err::<Response, BoxError>("connection reset by peer".into());
                }
                Ok(endpoint.handle(reject_rate))
            }
        }
    });

    let dispatcher = Dispatcher::new(
        transport,
        Template::new("http://simulated.local/items/{}"),
        DispatcherConfig::default().with_failure_cooldown(Duration::from_millis(100)),
    );

    println!("Starting Stress Test...");
    println!(
        "Endpoint: {} calls per {}, {} latency",
        args.budget,
        humantime::format_duration(args.window),
        humantime::format_duration(args.latency)
    );
    println!(
        "Injected: {:.1}% 429s, {:.1}% transport errors\n",
        args.reject_rate * 100.0,
        args.error_rate * 100.0
    );

    let mut hist = Histogram::<u64>::new_with_bounds(1, 3_600_000_000, 3)?;
    let mut tasks = JoinSet::new();
    let start = Instant::now();

    for i in 0..args.requests {
        let completion = dispatcher.submit(&[i.to_string()])?;
        tasks.spawn(async move {
            let submitted = Instant::now();
            let res = completion.await;
            (res, submitted.elapsed())
        });
    }

    let mut delivered = 0;
    let mut failed = 0;
    while let Some(task) = tasks.join_next().await {
        let (res, elapsed) = task?;
        match res {
            Ok(_) => {
                delivered += 1;
                hist.record(elapsed.as_micros() as u64)?;
            }
            Err(DispatchError::Transport(_)) => failed += 1,
            Err(e) => return Err(e.into()),
        }
    }

    let total_duration = start.elapsed();
    let stats = dispatcher.stats();

    println!("Total Duration:  {:.2?}", total_duration);
    println!("Delivered/Total: {}/{}", delivered, args.requests);
    println!(
        "Goodput:         {:.2} req/sec",
        delivered as f64 / total_duration.as_secs_f64()
    );
    if delivered > 0 {
        println!("P50 (Waited):    {}µs", hist.value_at_quantile(0.5));
        println!("P99 (Waited):    {}µs", hist.value_at_quantile(0.99));
        println!("Max (Waited):    {}µs", hist.max());
    }
    println!("Attempts:        {}", stats.issued);
    println!("  └─ Reissued:   {}", stats.reissued);
    println!("  └─ Failed:     {}", failed);
    println!("Backoffs:        {}", stats.backoffs);
    println!("\nStress test complete.");
    Ok(())
}
