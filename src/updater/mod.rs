//! Periodic background fetches with results handed to a consumer over a channel
//!
//! An [`Updater`] owns one tokio task that calls its fetch function at a
//! fixed rate. Each result, `None` for a failed fetch, is sent to the paired
//! [`UpdateReceiver`]; whoever owns the receiver is the context in which the
//! results are consumed.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// One delivered fetch result.
#[derive(Debug, Clone, PartialEq)]
pub struct Update<T> {
    /// Name of the updater that produced it
    pub source: Arc<str>,
    /// Tick number, in start order, monotonic across restarts
    pub seq: u64,
    /// Fetched data, or `None` if the fetch failed
    pub data: Option<T>,
}

type FetchFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct Running {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Fixed-rate fetch driver.
///
/// States: created, started, stopped. A stopped updater may be started again;
/// that begins a fresh schedule with an immediate first tick.
pub struct Updater<T> {
    name: Arc<str>,
    interval: Duration,
    fetch: FetchFn<T>,
    tx: mpsc::UnboundedSender<Update<T>>,
    seq: Arc<AtomicU64>,
    running: Option<Running>,
    /// Task of the last stopped run; may still be finishing a fetch
    stopping: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Updater<T> {
    /// Create an updater and the receiver its results are delivered to.
    ///
    /// Fails on an empty name or a zero interval.
    pub fn new<F, Fut>(
        name: &str,
        interval: Duration,
        fetch: F,
    ) -> Result<(Self, UpdateReceiver<T>)>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        ensure!(!name.is_empty(), "updater name is required");
        ensure!(!interval.is_zero(), "{}: update interval must be positive", name);

        let (tx, rx) = mpsc::unbounded_channel();
        let updater = Self {
            name: Arc::from(name),
            interval,
            fetch: Arc::new(move || fetch().boxed()),
            tx,
            seq: Arc::new(AtomicU64::new(0)),
            running: None,
            stopping: None,
        };
        Ok((updater, UpdateReceiver { rx }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin fetching now and then every interval. No-op while started.
    ///
    /// After a restart the first tick waits for a fetch still in flight from
    /// the previous run. Must be called from within a tokio runtime.
    pub fn start(&mut self) {
        if self.running.is_some() {
            tracing::debug!("{}: already started", self.name);
            return;
        }
        tracing::debug!("{}: starting", self.name);

        let (stop_tx, stop_rx) = watch::channel(false);
        let handle = tokio::spawn(update_loop(
            self.name.clone(),
            self.interval,
            self.fetch.clone(),
            self.tx.clone(),
            self.seq.clone(),
            stop_rx,
            self.stopping.take(),
        ));
        self.running = Some(Running { stop_tx, handle });
    }

    /// Cancel all future ticks. A fetch already in progress finishes and its
    /// result is still delivered. No-op when not started.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            tracing::debug!("{}: stopping", self.name);
            let _ = running.stop_tx.send(true);
            self.stopping = Some(running.handle);
        }
    }
}

impl<T> Drop for Updater<T> {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            let _ = running.stop_tx.send(true);
        }
    }
}

/// Body of the worker task. One fetch at a time; the next tick is not
/// awaited until the current fetch has returned.
async fn update_loop<T: Send + 'static>(
    name: Arc<str>,
    period: Duration,
    fetch: FetchFn<T>,
    tx: mpsc::UnboundedSender<Update<T>>,
    seq: Arc<AtomicU64>,
    mut stop_rx: watch::Receiver<bool>,
    previous: Option<JoinHandle<()>>,
) {
    // Waited for even if stopped meanwhile, so a later run chains behind us.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    let mut ticker = time::interval(period);
    // Nominal schedule is start + n * period; late ticks catch up.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let seq = seq.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("{}: updating (tick {})", name, seq);
        let data = run_fetch(&name, &fetch).await;

        let update = Update {
            source: name.clone(),
            seq,
            data,
        };
        if tx.send(update).is_err() {
            tracing::debug!("{}: receiver dropped, exiting", name);
            break;
        }
    }
    tracing::debug!("{}: stopped", name);
}

/// Run one fetch, turning errors and panics into `None`.
async fn run_fetch<T>(name: &str, fetch: &FetchFn<T>) -> Option<T> {
    let attempt = AssertUnwindSafe(async { (fetch.as_ref())().await }).catch_unwind();
    match attempt.await {
        Ok(Ok(data)) => Some(data),
        Ok(Err(e)) => {
            tracing::warn!("{}: update failed: {:#}", name, e);
            None
        }
        Err(_) => {
            tracing::error!("{}: update panicked", name);
            None
        }
    }
}

/// Consumer side of an [`Updater`].
pub struct UpdateReceiver<T> {
    rx: mpsc::UnboundedReceiver<Update<T>>,
}

impl<T: Send + 'static> UpdateReceiver<T> {
    /// Next update. Suspends until one is available; `None` only once the
    /// updater has been dropped and every delivered update consumed.
    pub async fn recv(&mut self) -> Option<Update<T>> {
        self.rx.recv().await
    }

    /// Deliver every update to `listener` on a dedicated consumer task, in
    /// delivery order.
    pub fn spawn_listener<L>(mut self, mut listener: L) -> JoinHandle<()>
    where
        L: FnMut(Update<T>) + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(update) = self.recv().await {
                listener(update);
            }
        })
    }
}
