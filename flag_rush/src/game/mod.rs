//! Game state: phases, questions, answers, and the derived leaderboard.
//!
//! One [`GameState`] lives inside each room and is mutated exclusively by the
//! [`engine`] while the owning room's lock is held. Timers never live here —
//! they are tracked by the engine's [`timers::TimerRegistry`] so room state
//! stays pure data.

pub mod engine;
pub mod timers;

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::questions::Country;
use crate::room::{Difficulty, RoomMember};
use crate::user::UserId;

/// Discrete state of a room's round machine.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    #[default]
    Waiting,
    Starting,
    Question,
    Results,
    Finished,
}

/// One round's question with its timing window.
#[derive(Clone, Debug)]
pub struct GameQuestion {
    /// Zero-based round index.
    pub index: u32,
    pub country: Country,
    /// Four options containing the correct country, shuffled.
    pub options: Vec<Country>,
    /// Country code of the correct answer.
    pub correct_answer: String,
    /// Unix ms when the question was emitted.
    pub start_time: i64,
    /// `start_time + time_per_question * 1000`.
    pub end_time: i64,
}

impl GameQuestion {
    /// The broadcast view: the flag and the options, without revealing which
    /// option matches. The reveal happens in QUESTION_RESULTS.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            index: self.index,
            flag: self.country.flag,
            options: self
                .options
                .iter()
                .map(|c| OptionView {
                    name: c.name,
                    code: c.code,
                })
                .collect(),
            start_time: self.start_time,
            end_time: self.end_time,
        }
    }
}

/// Wire view of a question (no correct answer).
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub index: u32,
    pub flag: &'static str,
    pub options: Vec<OptionView>,
    pub start_time: i64,
    pub end_time: i64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionView {
    pub name: &'static str,
    pub code: &'static str,
}

/// A member's scored answer to one question.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameAnswer {
    pub user_id: UserId,
    pub username: String,
    pub answer: String,
    /// Milliseconds from question start to submission.
    pub time_to_answer: i64,
    pub is_correct: bool,
    pub points_awarded: u32,
    pub timestamp: i64,
}

/// Aggregated standing of one member.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub username: String,
    pub score: u32,
    pub correct_answers: u32,
    /// Mean time-to-answer in ms; zero with no answers.
    pub average_time: i64,
}

/// Summary broadcast with GAME_ENDED.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStats {
    pub total_questions: u32,
    pub total_answers: usize,
    pub correct_answers: usize,
    /// Fraction of answers that were correct, 0.0–1.0.
    pub accuracy: f64,
    /// Mean time-to-answer in ms across all answers.
    pub average_time: i64,
    pub difficulty: Difficulty,
    /// Game duration in ms.
    pub duration: i64,
}

/// Per-room game state. Owned by the room; mutated only by the engine under
/// the room lock.
#[derive(Clone, Debug, Default)]
pub struct GameState {
    pub is_active: bool,
    pub phase: GamePhase,
    pub current_question: Option<GameQuestion>,
    /// Answers for the current round only; reset at each question entry.
    pub answers: Vec<GameAnswer>,
    /// Every answer of the game, append-only while a game runs.
    pub answer_history: Vec<GameAnswer>,
    /// Questions asked so far (equals the current question's 1-based count).
    pub current_question_index: u32,
    pub total_questions: u32,
    pub game_start_time: Option<i64>,
    pub game_end_time: Option<i64>,
    /// Codes of countries already asked this game.
    pub used_countries: HashSet<String>,
    /// Derived cache, recomputed after each submission and at game end.
    pub leaderboard: Vec<LeaderboardEntry>,
}

impl GameState {
    /// True if the given user already answered the current round.
    pub fn has_answered(&self, user_id: &str) -> bool {
        self.answers.iter().any(|a| a.user_id == user_id)
    }

    /// Wire summary included in room views.
    pub fn view(&self) -> GameStateView {
        GameStateView {
            is_active: self.is_active,
            phase: self.phase,
            current_question_index: self.current_question_index,
            total_questions: self.total_questions,
        }
    }
}

/// Wire summary of game state embedded in room views.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub is_active: bool,
    pub phase: GamePhase,
    pub current_question_index: u32,
    pub total_questions: u32,
}

/// Aggregate the leaderboard from the answer history.
///
/// Members with no answers are included with zeros. Sorted by score
/// descending; the sort is stable, so ties keep member insertion order.
pub fn compute_leaderboard(
    history: &[GameAnswer],
    members: &[RoomMember],
) -> Vec<LeaderboardEntry> {
    struct Acc {
        score: u32,
        correct: u32,
        total_time: i64,
        answers: u32,
    }

    let mut by_user: HashMap<&str, Acc> = HashMap::new();
    for answer in history {
        let acc = by_user.entry(answer.user_id.as_str()).or_insert(Acc {
            score: 0,
            correct: 0,
            total_time: 0,
            answers: 0,
        });
        acc.score += answer.points_awarded;
        if answer.is_correct {
            acc.correct += 1;
        }
        acc.total_time += answer.time_to_answer;
        acc.answers += 1;
    }

    let mut entries: Vec<LeaderboardEntry> = members
        .iter()
        .map(|member| {
            let acc = by_user.get(member.user_id.as_str());
            LeaderboardEntry {
                user_id: member.user_id.clone(),
                username: member.username.clone(),
                score: acc.map_or(0, |a| a.score),
                correct_answers: acc.map_or(0, |a| a.correct),
                average_time: acc.map_or(0, |a| {
                    if a.answers == 0 {
                        0
                    } else {
                        a.total_time / i64::from(a.answers)
                    }
                }),
            }
        })
        .collect();

    entries.sort_by(|a, b| b.score.cmp(&a.score));
    entries
}

/// Summarize a finished (or stopped) game.
pub fn compute_stats(state: &GameState, difficulty: Difficulty) -> GameStats {
    let total_answers = state.answer_history.len();
    let correct_answers = state
        .answer_history
        .iter()
        .filter(|a| a.is_correct)
        .count();
    let total_time: i64 = state.answer_history.iter().map(|a| a.time_to_answer).sum();
    let duration = match (state.game_start_time, state.game_end_time) {
        (Some(start), Some(end)) => end - start,
        _ => 0,
    };

    GameStats {
        total_questions: state.current_question_index,
        total_answers,
        correct_answers,
        accuracy: if total_answers == 0 {
            0.0
        } else {
            correct_answers as f64 / total_answers as f64
        },
        average_time: if total_answers == 0 {
            0
        } else {
            total_time / total_answers as i64
        },
        difficulty,
        duration,
    }
}
