mod snapshot;
mod status;
mod venue;

pub use snapshot::{OrderBookSnapshot, PriceLevel};
pub use status::{ConnectionStatus, FeedKind, StoreState};
pub use venue::{Symbol, Venue};
