//! Real-time leaderboard fan-out for Time It Right.
//!
//! Two pieces:
//!
//! - [`ConnectionRegistry`]: every live push-channel connection, grouped
//!   by topic and tagged with an optional owning user. Broadcasts never
//!   abort on a single bad connection; failed ones are evicted afterwards.
//! - [`LeaderboardNotifier`]: turns game events into frames
//!   (`leaderboard_update`, `new_high_score`, `rank_change`,
//!   `connection_established`) and hands them to the registry.
//!
//! Notifications are best-effort: the `notify_*` methods log failures and
//! return normally, so a game completion never fails because a broadcast
//! did.

mod error;
mod notifier;
mod registry;

pub use error::NotifyError;
pub use notifier::{CONNECTED_MESSAGE, LeaderboardNotifier};
pub use registry::{
    ConnectionMeta, ConnectionRegistry, DEFAULT_SEND_TIMEOUT, Delivery,
    LEADERBOARD_TOPIC,
};
