//! Game session lifecycle and scoring for Time It Right.
//!
//! This crate owns everything about a single timing attempt and the
//! records around it:
//!
//! 1. **Session state machine**: [`GameSession`] moves from `Active` to
//!    exactly one of `Completed` / `Expired`, and computes its own score.
//! 2. **Scoring**: accuracy, letter [`Grade`]s and the [`ScoreCard`]
//!    handed back after a stop.
//! 3. **Storage**: the [`SessionRepository`] / [`UserRepository`]
//!    traits and an [`InMemoryStore`] implementing both.
//! 4. **Use cases**: [`GameService`] (start, stop, history, leaderboard,
//!    expiry sweep, analytics) and [`Accounts`] (registration + tokens).
//!
//! # How it fits in the stack
//!
//! ```text
//! Leaderboard layer (above)  ← reads leaderboards, fans them out
//!     ↕
//! Session layer (this crate)  ← owns game rules and persistence seams
//!     ↕
//! Protocol layer (below)  ← provides UserId, SessionId, LeaderboardEntry
//! ```

mod accounts;
mod auth;
mod clock;
mod config;
mod error;
mod repository;
mod scoring;
mod service;
mod session;
mod stats;
mod store;

pub use accounts::{Accounts, Registration};
pub use auth::{OpaqueTokenService, Principal, TokenService};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GameConfig, MAX_SESSION_EXPIRE_MINUTES};
pub use error::{ErrorKind, GameError};
pub use repository::{
    GameStore, LeaderboardStanding, SessionRepository, UserRecord,
    UserRepository,
};
pub use scoring::{
    Grade, ScoreCard, accuracy_percentage, feedback_message, grade, round2,
};
pub use service::GameService;
pub use session::{GameSession, SessionStatus};
pub use stats::UserStats;
pub use store::InMemoryStore;
