use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use opentelemetry::global;
use opentelemetry::metrics::Counter;

/// Counters exposed by [`Dispatcher::stats`](crate::Dispatcher::stats).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherStats {
    /// Requests accepted by `submit`.
    pub submitted: u64,
    /// Attempts handed to the transport, reissues included.
    pub issued: u64,
    /// Requests resolved with a response.
    pub delivered: u64,
    /// Rate-limit rejections that led to a reissue.
    pub reissued: u64,
    /// Backoff timers armed because the quota was exhausted.
    pub backoffs: u64,
    /// Attempts that failed, resolving the request with an error.
    pub failures: u64,
    /// Requests skipped because the submitter cancelled them.
    pub cancelled: u64,
}

#[derive(Clone, Debug)]
struct Instruments {
    submitted: Counter<u64>,
    issued: Counter<u64>,
    delivered: Counter<u64>,
    reissued: Counter<u64>,
    backoffs: Counter<u64>,
    failures: Counter<u64>,
    cancelled: Counter<u64>,
}

/// OpenTelemetry counters plus an in-process mirror of the same numbers.
#[derive(Debug)]
pub(crate) struct DispatcherMetrics {
    instruments: Instruments,
    submitted: AtomicU64,
    issued: AtomicU64,
    delivered: AtomicU64,
    reissued: AtomicU64,
    backoffs: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
}

impl DispatcherMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("serial_dispatcher");
        let instruments = Instruments {
            submitted: meter.u64_counter("submitted").build(),
            issued: meter.u64_counter("issued").build(),
            delivered: meter.u64_counter("delivered").build(),
            reissued: meter.u64_counter("reissued").build(),
            backoffs: meter.u64_counter("backoffs").build(),
            failures: meter.u64_counter("failures").build(),
            cancelled: meter.u64_counter("cancelled").build(),
        };

        Self {
            instruments,
            submitted: AtomicU64::new(0),
            issued: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            reissued: AtomicU64::new(0),
            backoffs: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
        }
    }

    pub(crate) fn submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.instruments.submitted.add(1, &[]);
    }

    pub(crate) fn issued(&self) {
        self.issued.fetch_add(1, Ordering::Relaxed);
        self.instruments.issued.add(1, &[]);
    }

    pub(crate) fn delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
        self.instruments.delivered.add(1, &[]);
    }

    pub(crate) fn reissued(&self) {
        self.reissued.fetch_add(1, Ordering::Relaxed);
        self.instruments.reissued.add(1, &[]);
    }

    pub(crate) fn backoff(&self) {
        self.backoffs.fetch_add(1, Ordering::Relaxed);
        self.instruments.backoffs.add(1, &[]);
    }

    pub(crate) fn failed(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.instruments.failures.add(1, &[]);
    }

    pub(crate) fn cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
        self.instruments.cancelled.add(1, &[]);
    }

    pub(crate) fn snapshot(&self) -> DispatcherStats {
        DispatcherStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            issued: self.issued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            reissued: self.reissued.load(Ordering::Relaxed),
            backoffs: self.backoffs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}
