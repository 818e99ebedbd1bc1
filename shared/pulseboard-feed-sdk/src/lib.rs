//! Pulseboard feed SDK
//!
//! Reconnecting WebSocket consumer for the metrics broadcast feed. The
//! subscriber keeps the last received snapshot across disconnects and
//! exposes its connection state, so dashboards keep rendering stale data
//! instead of going blank while the feed is down.

mod error;
mod subscriber;

pub use error::{FeedError, Result};
pub use subscriber::{FeedConfig, FeedState, FeedSubscriber};

// Consumers work with the same types the server publishes
pub use pulseboard_core::{CategorySummary, Snapshot, SnapshotData, TimeBucketPoint};
