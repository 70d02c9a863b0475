//! REST polling fallback.
//!
//! Engaged when the streaming transport has failed: fetches the book
//! once immediately, then on a fixed interval until stopped. Failed
//! fetches are reported and skipped; the loop never backs off and
//! never breaks the circuit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::OrderBookSnapshot;
use crate::venues::VenueFeed;

#[derive(Debug)]
pub enum PollEvent {
    Snapshot(OrderBookSnapshot),
    /// One fetch failed; the loop continues at the same cadence.
    FetchFailed(String),
}

pub struct RestPoller;

impl RestPoller {
    pub fn start(
        feed: Arc<dyn VenueFeed>,
        instrument: String,
        interval: Duration,
        client: reqwest::Client,
        events: mpsc::Sender<PollEvent>,
    ) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(feed, instrument, interval, client, events, shutdown_rx));
        PollerHandle {
            shutdown: shutdown_tx,
            task,
        }
    }
}

pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

async fn run(
    feed: Arc<dyn VenueFeed>,
    instrument: String,
    interval: Duration,
    client: reqwest::Client,
    events: mpsc::Sender<PollEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = feed.venue();
    debug!(%venue, %instrument, ?interval, "polling fallback started");

    // The first tick fires immediately; one fetch in flight at a time.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {}
        }

        let fetched = tokio::select! {
            _ = shutdown.changed() => return,
            result = feed.fetch_book(&client, &instrument) => result,
        };

        match fetched {
            Ok(snapshot) => {
                if events.send(PollEvent::Snapshot(snapshot)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%venue, %instrument, error = %e, "poll fetch failed, skipping");
                if events.send(PollEvent::FetchFailed(e.to_string())).await.is_err() {
                    return;
                }
            }
        }
    }
}
