//! Post a handful of messages to a Discord webhook, one at a time.
//!
//! ```text
//! RUST_LOG=tower_serial=debug cargo run -p tower-serial --example webhook \
//!     --features json,reqwest -- https://discord.com/api/webhooks/<id>/<token>
//! ```

use std::env;

use http::HeaderValue;
use serde_json::json;
use tower::BoxError;
use tower_serial::Dispatcher;
use tower_serial::DispatcherConfig;
use tower_serial::HttpTransport;
use tower_serial::Template;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let Some(url) = env::args().nth(1) else {
        return Err("usage: webhook <webhook-url>".into());
    };

    let config = DispatcherConfig::default().with_user_agent(HeaderValue::from_static(concat!(
        "tower-serial/",
        env!("CARGO_PKG_VERSION")
    )));
    let dispatcher = Dispatcher::new(HttpTransport::default(), Template::new("{}"), config);

    let mut completions = Vec::new();
    for n in 1..=10 {
        let body = json!({ "content": format!("message {n} of 10") });
        let mut encoded = Ok(());
        let request = dispatcher.prepare(
            |req| {
                encoded = req.json(&body).map(|req| {
                    req.method(http::Method::POST);
                });
            },
            &[url.as_str()],
        )?;
        encoded?;
        completions.push(dispatcher.enqueue(request));
    }

    for completion in completions {
        let id = completion.id();
        match completion.await {
            Ok(response) if response.status().is_success() => {
                info!(id, status = %response.status(), "delivered")
            }
            Ok(response) => warn!(id, status = %response.status(), "rejected by server"),
            Err(err) => warn!(id, %err, "not delivered"),
        }
    }

    let quota = dispatcher.quota();
    info!(
        remaining = quota.remaining,
        reset_at_ms = quota.reset_at_ms,
        stats = ?dispatcher.stats(),
        "done"
    );
    Ok(())
}
