use bookfeed::{FeedConfig, OrderBookStore, Symbol, Venue, VenueRegistry};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("bookfeed=info".parse()?))
        .init();

    // Usage: bookfeed [venue] [symbol], e.g. `bookfeed bybit BTC-USDT`
    let mut args = std::env::args().skip(1);
    let venue: Venue = match args.next() {
        Some(raw) => raw.parse()?,
        None => Venue::Okx,
    };
    let symbol: Symbol = match args.next() {
        Some(raw) => raw.parse()?,
        None => Symbol::btc_usdt(),
    };

    let config = FeedConfig::default();
    let registry = VenueRegistry::with_defaults(&config);
    let store = OrderBookStore::with_market(registry, config, venue, symbol);

    store.connect().await?;
    tracing::info!(%venue, "watching order book, ctrl-c to stop");

    let mut watch = store.watch();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = watch.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = watch.borrow_and_update().clone();
                if let Some(snapshot) = &state.snapshot {
                    let bid = snapshot.best_bid().map(|l| l.price.to_string());
                    let ask = snapshot.best_ask().map(|l| l.price.to_string());
                    tracing::info!(
                        venue = %state.venue,
                        symbol = %state.symbol,
                        feed = ?state.feed,
                        bid = bid.as_deref().unwrap_or("-"),
                        ask = ask.as_deref().unwrap_or("-"),
                        "book update"
                    );
                } else {
                    tracing::info!(status = ?state.status, error = ?state.last_error, "state change");
                }
            }
        }
    }

    store.disconnect().await;
    Ok(())
}
