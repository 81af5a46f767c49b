//! Flag question provider.
//!
//! The engine depends only on the [`QuestionProvider`] contract: given a
//! difficulty and the set of countries already used this game, produce the
//! next question (a correct country plus three distractors) or `None` when
//! the pool is exhausted. The shipped [`FlagQuestionProvider`] draws from a
//! static tiered country dataset and prefers same-region distractors so the
//! options are plausible.

pub mod countries;

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;

use crate::room::Difficulty;

/// One country record from the static dataset.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Country {
    pub name: &'static str,
    /// Flag emoji shown to players.
    pub flag: &'static str,
    /// ISO 3166-1 alpha-2 code; the canonical answer value.
    pub code: &'static str,
    pub region: &'static str,
}

/// A drawn question before the engine wraps it with timing data.
#[derive(Clone, Debug)]
pub struct DrawnQuestion {
    pub country: Country,
    /// Four options containing `country`, shuffled.
    pub options: Vec<Country>,
}

/// Contract between the game engine and the question source.
pub trait QuestionProvider: Send + Sync {
    /// Draw the next question, avoiding countries whose codes appear in
    /// `used`. Returns `None` when the difficulty pool is exhausted.
    fn next_question(&self, difficulty: Difficulty, used: &HashSet<String>) -> Option<DrawnQuestion>;
}

/// Production provider backed by the embedded country dataset.
#[derive(Default)]
pub struct FlagQuestionProvider;

impl FlagQuestionProvider {
    pub fn new() -> Self {
        Self
    }
}

impl QuestionProvider for FlagQuestionProvider {
    fn next_question(
        &self,
        difficulty: Difficulty,
        used: &HashSet<String>,
    ) -> Option<DrawnQuestion> {
        let pool = countries::pool(difficulty);
        let mut rng = rand::thread_rng();

        let candidates: Vec<&Country> =
            pool.iter().filter(|c| !used.contains(c.code)).collect();
        let correct = (*candidates.choose(&mut rng)?).clone();

        // Distractors: same region first, then anything else in the pool.
        let mut same_region: Vec<&Country> = pool
            .iter()
            .filter(|c| c.code != correct.code && c.region == correct.region)
            .collect();
        same_region.shuffle(&mut rng);

        let mut others: Vec<&Country> = pool
            .iter()
            .filter(|c| c.code != correct.code && c.region != correct.region)
            .collect();
        others.shuffle(&mut rng);

        let mut options: Vec<Country> = same_region
            .into_iter()
            .chain(others)
            .take(3)
            .cloned()
            .collect();
        if options.len() < 3 {
            // Pool too small for a 4-way question.
            return None;
        }
        options.push(correct.clone());
        options.shuffle(&mut rng);

        Some(DrawnQuestion {
            country: correct,
            options,
        })
    }
}
