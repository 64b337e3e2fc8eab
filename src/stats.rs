use std::collections::HashMap;

use uuid::Uuid;

use crate::engine::GameRecord;

/// Long-lived per-user aggregate, updated incrementally across sessions and
/// never recomputed from history.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user_id: String,
    pub total_games: i64,
    /// Sum of score percentages over all games.
    pub total_score: f64,
    pub average_score: f64,
    pub best_scores: HashMap<Uuid, f64>,
    pub play_count: HashMap<Uuid, i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizStats {
    pub quiz_id: Uuid,
    pub total_plays: i64,
    pub total_score: f64,
    pub average_score: f64,
    pub best_score: f64,
}

/// A user's standing on one particular quiz; zeros when they never played it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UserQuizStats {
    pub best_score: f64,
    pub play_count: i64,
}

pub fn score_percentage(record: &GameRecord) -> f64 {
    if record.max_score == 0 {
        return 0.0;
    }
    f64::from(record.score) / f64::from(record.max_score) * 100.0
}

/// Merges one completed game into the user's aggregate, creating it on the
/// first game. The average is recomputed from the running sum so
/// `average_score == total_score / total_games` holds at all times.
pub fn merge_user_stats(existing: Option<UserStats>, record: &GameRecord) -> UserStats {
    let pct = score_percentage(record);
    match existing {
        Some(mut stats) => {
            stats.total_games += 1;
            stats.total_score += pct;
            stats.average_score = stats.total_score / stats.total_games as f64;
            let best = stats.best_scores.entry(record.quiz_id).or_insert(0.0);
            *best = best.max(pct);
            *stats.play_count.entry(record.quiz_id).or_insert(0) += 1;
            stats
        }
        None => UserStats {
            user_id: record.user_id.clone(),
            total_games: 1,
            total_score: pct,
            average_score: pct,
            best_scores: HashMap::from([(record.quiz_id, pct)]),
            play_count: HashMap::from([(record.quiz_id, 1)]),
        },
    }
}

/// Same merge for the per-quiz aggregate.
pub fn merge_quiz_stats(existing: Option<QuizStats>, record: &GameRecord) -> QuizStats {
    let pct = score_percentage(record);
    match existing {
        Some(mut stats) => {
            stats.total_plays += 1;
            stats.total_score += pct;
            stats.average_score = stats.total_score / stats.total_plays as f64;
            stats.best_score = stats.best_score.max(pct);
            stats
        }
        None => QuizStats {
            quiz_id: record.quiz_id,
            total_plays: 1,
            total_score: pct,
            average_score: pct,
            best_score: pct,
        },
    }
}
