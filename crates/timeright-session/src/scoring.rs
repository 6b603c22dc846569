//! Scoring rules: accuracy, grades and the post-game score card.

use std::fmt;

use serde::Serialize;
use timeright_protocol::SessionId;

use crate::GameSession;

/// Rounds to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `max(0, 100 * (1 - deviation / target))`, rounded to two decimals.
///
/// Accepts a fractional deviation so leaderboard averages can be scored
/// with the same rule.
pub fn accuracy_percentage(deviation_ms: f64, target_ms: i64) -> f64 {
    if target_ms <= 0 {
        return 0.0;
    }
    let raw = 100.0 * (1.0 - deviation_ms / target_ms as f64);
    round2(raw.max(0.0))
}

/// Letter grade for a deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Grade {
    #[serde(rename = "A+")]
    APlus,
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::APlus => "A+",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a deviation onto a letter grade.
///
/// | deviation (ms) | grade |
/// |---|---|
/// | 0 | A+ |
/// | < 100 | A |
/// | < 500 | B |
/// | < 1000 | C |
/// | < 2000 | D |
/// | otherwise | F |
pub fn grade(deviation_ms: i64) -> Grade {
    match deviation_ms {
        ..=0 => Grade::APlus,
        1..100 => Grade::A,
        100..500 => Grade::B,
        500..1000 => Grade::C,
        1000..2000 => Grade::D,
        _ => Grade::F,
    }
}

/// One-line feedback shown to the player after a stop.
pub fn feedback_message(deviation_ms: i64, target_ms: i64) -> String {
    let seconds = target_ms as f64 / 1000.0;
    match deviation_ms {
        0 => format!("PERFECT! Exactly {seconds} seconds!"),
        1..100 => format!("Excellent! Only {deviation_ms}ms off!"),
        100..500 => format!("Good job! {deviation_ms}ms deviation"),
        _ => format!("Keep practicing! {deviation_ms}ms off target"),
    }
}

/// The result returned to a player who stops a game.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreCard {
    pub session_id: SessionId,
    pub duration_ms: i64,
    pub target_time_ms: i64,
    pub deviation_ms: i64,
    pub accuracy_score: f64,
    pub grade: Grade,
    pub message: String,
}

impl ScoreCard {
    /// Builds a score card for a persisted, completed session. Returns
    /// `None` for anything else.
    pub fn from_session(session: &GameSession, target_ms: i64) -> Option<Self> {
        if !session.is_completed() {
            return None;
        }
        let session_id = session.id()?;
        let duration_ms = session.duration_ms()?;
        let deviation_ms = session.deviation_ms()?;
        Some(Self {
            session_id,
            duration_ms,
            target_time_ms: target_ms,
            deviation_ms,
            accuracy_score: session.accuracy_score(target_ms),
            grade: grade(deviation_ms),
            message: feedback_message(deviation_ms, target_ms),
        })
    }
}
