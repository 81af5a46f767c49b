//! Room settings: difficulty, pacing, and capacity.

use serde::{Deserialize, Serialize};

use crate::constants::{ALLOWED_QUESTION_TIMES, MAX_ROOM_SIZE, MIN_ROOM_SIZE};
use crate::errors::{AppError, AppResult};

/// Question difficulty, which also selects the country pool and the number
/// of questions per game.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    /// Questions per game at this difficulty.
    pub fn question_count(&self) -> u32 {
        match self {
            Difficulty::Easy => 15,
            Difficulty::Medium => 20,
            Difficulty::Hard => 25,
            Difficulty::Expert => 30,
        }
    }
}

/// Game mode. Scoring currently treats all modes identically; the mode is
/// carried through settings and broadcasts for clients.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    Speed,
    Elimination,
}

/// Per-room configuration, set by the host while no game is running.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSettings {
    pub difficulty: Difficulty,
    pub max_room_size: usize,
    /// Seconds per question; one of {10, 15, 20, 30}.
    pub time_per_question: u32,
    pub game_mode: GameMode,
    /// Derived from `difficulty`; recomputed whenever difficulty changes.
    pub question_count: u32,
}

impl Default for RoomSettings {
    fn default() -> Self {
        Self {
            difficulty: Difficulty::Medium,
            max_room_size: MAX_ROOM_SIZE,
            time_per_question: 15,
            game_mode: GameMode::Classic,
            question_count: Difficulty::Medium.question_count(),
        }
    }
}

/// Partial settings update from `UPDATE_ROOM_SETTINGS`.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    pub difficulty: Option<Difficulty>,
    pub max_room_size: Option<usize>,
    pub time_per_question: Option<u32>,
    pub game_mode: Option<GameMode>,
}

impl RoomSettings {
    /// Structural validation of the full settings record.
    pub fn validate(&self) -> AppResult<()> {
        if !(MIN_ROOM_SIZE..=MAX_ROOM_SIZE).contains(&self.max_room_size) {
            return Err(AppError::validation(format!(
                "maxRoomSize must be between {MIN_ROOM_SIZE} and {MAX_ROOM_SIZE}"
            )));
        }
        if !ALLOWED_QUESTION_TIMES.contains(&self.time_per_question) {
            return Err(AppError::validation(
                "timePerQuestion must be one of 10, 15, 20, 30",
            ));
        }
        Ok(())
    }

    /// Apply a patch, rederiving the question count when difficulty changes.
    /// The result is re-validated; the original is untouched on error.
    pub fn apply(&self, patch: &SettingsPatch) -> AppResult<RoomSettings> {
        let mut next = *self;
        if let Some(difficulty) = patch.difficulty {
            next.difficulty = difficulty;
            next.question_count = difficulty.question_count();
        }
        if let Some(size) = patch.max_room_size {
            next.max_room_size = size;
        }
        if let Some(time) = patch.time_per_question {
            next.time_per_question = time;
        }
        if let Some(mode) = patch.game_mode {
            next.game_mode = mode;
        }
        next.validate()?;
        Ok(next)
    }
}
