use std::borrow::Cow;
use std::collections::HashMap;
use std::error::Error;

use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::engine::GameRecord;
use crate::stats::{self, QuizStats, UserQuizStats, UserStats};

use super::quiz::{BlankAnswer, ChoiceQuestion, Quiz, QuizKind, QuizPayload, SelectQuestion};

type GenericError = Box<dyn Error + Send + Sync>;

pub struct Connection {
    pool: PgPool,
}

impl Connection {
    pub async fn connect<'a>(connection_string: Cow<'a, str>) -> Self {
        let pool = PgPool::connect(&connection_string)
            .await
            .expect("Failed to connect to database");
        Self { pool }
    }

    pub async fn run_migrations(&self) {
        sqlx::migrate!()
            .run(&self.pool)
            .await
            .expect("Migrations failed.");
    }
}

pub trait RetrieveQuiz {
    async fn retrieve_quiz(
        &self,
        title: impl Into<String>,
    ) -> Result<Option<Quiz>, GenericError>;

    async fn retrieve_all_quiz_names(&self) -> Result<Vec<String>, GenericError>;
}

pub trait SaveGameRecord {
    /// Persists the record and folds it into both aggregates before
    /// returning. The whole write is one transaction.
    async fn save_game_record(&self, record: &GameRecord) -> Result<Uuid, GenericError>;
}

pub trait RetrieveStats {
    async fn retrieve_user_stats(&self, user_id: &str)
        -> Result<Option<UserStats>, GenericError>;

    async fn retrieve_quiz_stats(&self, quiz_id: Uuid)
        -> Result<Option<QuizStats>, GenericError>;

    async fn retrieve_user_quiz_stats(
        &self,
        user_id: &str,
        quiz_id: Uuid,
    ) -> Result<UserQuizStats, GenericError>;
}

impl RetrieveQuiz for Connection {
    async fn retrieve_quiz(
        &self,
        title: impl Into<String>,
    ) -> Result<Option<Quiz>, GenericError> {
        let Some(row) = sqlx::query(
            "SELECT uuid, title, kind, time_limit_seconds FROM quizzes WHERE title = $1",
        )
        .bind(title.into())
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let uuid: Uuid = row.try_get("uuid")?;
        let title: String = row.try_get("title")?;
        let kind: String = row.try_get("kind")?;
        let time_limit: i32 = row.try_get("time_limit_seconds")?;

        let Some(kind) = QuizKind::parse(&kind) else {
            log::error!("Quiz {} has unknown kind '{}'", uuid, kind);
            return Ok(None);
        };

        let payload = match kind {
            QuizKind::FillInBlank => self.load_blank_answers(uuid).await?,
            QuizKind::MultipleChoice => self.load_choice_questions(uuid).await?,
            QuizKind::MultipleSelect => self.load_select_question(uuid).await?,
        };

        Ok(Some(Quiz::retrieve(
            uuid,
            title,
            time_limit as u32,
            payload,
        )))
    }

    async fn retrieve_all_quiz_names(&self) -> Result<Vec<String>, GenericError> {
        let rows = sqlx::query("SELECT title FROM quizzes ORDER BY title")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| row.try_get("title"))
            .collect::<Result<_, _>>()?)
    }
}

impl Connection {
    async fn load_blank_answers(&self, quiz_id: Uuid) -> Result<QuizPayload, GenericError> {
        let rows = sqlx::query(
            "SELECT answer, synonyms FROM blank_answers WHERE quiz_id = $1 ORDER BY position",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        let mut answers = Vec::with_capacity(rows.len());
        for row in rows {
            answers.push(BlankAnswer::new(
                row.try_get("answer")?,
                row.try_get("synonyms")?,
            ));
        }
        Ok(QuizPayload::FillInBlank { answers })
    }

    async fn load_choice_questions(&self, quiz_id: Uuid) -> Result<QuizPayload, GenericError> {
        let rows = sqlx::query(
            "SELECT uuid, text, options, correct_option FROM choice_questions \
             WHERE quiz_id = $1 ORDER BY position",
        )
        .bind(quiz_id)
        .fetch_all(&self.pool)
        .await?;

        let mut questions = Vec::with_capacity(rows.len());
        for row in rows {
            let correct: i32 = row.try_get("correct_option")?;
            questions.push(ChoiceQuestion::retrieve(
                row.try_get("uuid")?,
                row.try_get("text")?,
                row.try_get("options")?,
                correct as usize,
            ));
        }
        Ok(QuizPayload::MultipleChoice { questions })
    }

    async fn load_select_question(&self, quiz_id: Uuid) -> Result<QuizPayload, GenericError> {
        let row = sqlx::query(
            "SELECT text, options, correct_indices FROM select_questions WHERE quiz_id = $1",
        )
        .bind(quiz_id)
        .fetch_one(&self.pool)
        .await?;

        let correct: Vec<i32> = row.try_get("correct_indices")?;
        let question = SelectQuestion::new(
            row.try_get("text")?,
            row.try_get("options")?,
            correct.into_iter().map(|i| i as usize).collect(),
        );
        Ok(QuizPayload::MultipleSelect { question })
    }
}

impl SaveGameRecord for Connection {
    async fn save_game_record(&self, record: &GameRecord) -> Result<Uuid, GenericError> {
        let record_id = Uuid::new_v4();
        let pct = stats::score_percentage(record);

        log::debug!(
            "Saving game record {} for user {} on quiz {} ({}%)",
            record_id,
            record.user_id,
            record.quiz_id,
            pct
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO game_records \
             (uuid, user_id, quiz_id, quiz_title, score, max_score, \
              time_spent_seconds, quiz_kind, completed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(record_id)
        .bind(&record.user_id)
        .bind(record.quiz_id)
        .bind(&record.quiz_title)
        .bind(record.score as i32)
        .bind(record.max_score as i32)
        .bind(record.time_spent_seconds)
        .bind(record.quiz_kind.as_str())
        .bind(record.completed_at)
        .execute(&mut *tx)
        .await?;

        // The merges run as upsert arithmetic inside the transaction, so
        // simultaneous completions from other clients cannot lose updates.
        sqlx::query(
            "INSERT INTO user_stats (user_id, total_games, total_score, average_score) \
             VALUES ($1, 1, $2, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 total_games = user_stats.total_games + 1, \
                 total_score = user_stats.total_score + EXCLUDED.total_score, \
                 average_score = (user_stats.total_score + EXCLUDED.total_score) \
                     / (user_stats.total_games + 1)",
        )
        .bind(&record.user_id)
        .bind(pct)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO user_quiz_stats (user_id, quiz_id, best_score, play_count) \
             VALUES ($1, $2, $3, 1) \
             ON CONFLICT (user_id, quiz_id) DO UPDATE SET \
                 best_score = GREATEST(user_quiz_stats.best_score, EXCLUDED.best_score), \
                 play_count = user_quiz_stats.play_count + 1",
        )
        .bind(&record.user_id)
        .bind(record.quiz_id)
        .bind(pct)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO quiz_stats (quiz_id, total_plays, total_score, average_score, best_score) \
             VALUES ($1, 1, $2, $2, $2) \
             ON CONFLICT (quiz_id) DO UPDATE SET \
                 total_plays = quiz_stats.total_plays + 1, \
                 total_score = quiz_stats.total_score + EXCLUDED.total_score, \
                 average_score = (quiz_stats.total_score + EXCLUDED.total_score) \
                     / (quiz_stats.total_plays + 1), \
                 best_score = GREATEST(quiz_stats.best_score, EXCLUDED.best_score)",
        )
        .bind(record.quiz_id)
        .bind(pct)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(record_id)
    }
}

impl RetrieveStats for Connection {
    async fn retrieve_user_stats(
        &self,
        user_id: &str,
    ) -> Result<Option<UserStats>, GenericError> {
        let Some(row) = sqlx::query(
            "SELECT total_games, total_score, average_score FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let per_quiz = sqlx::query(
            "SELECT quiz_id, best_score, play_count FROM user_quiz_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut best_scores = HashMap::with_capacity(per_quiz.len());
        let mut play_count = HashMap::with_capacity(per_quiz.len());
        for row in per_quiz {
            let quiz_id: Uuid = row.try_get("quiz_id")?;
            best_scores.insert(quiz_id, row.try_get::<f64, _>("best_score")?);
            play_count.insert(quiz_id, row.try_get::<i64, _>("play_count")?);
        }

        Ok(Some(UserStats {
            user_id: user_id.to_owned(),
            total_games: row.try_get("total_games")?,
            total_score: row.try_get("total_score")?,
            average_score: row.try_get("average_score")?,
            best_scores,
            play_count,
        }))
    }

    async fn retrieve_quiz_stats(
        &self,
        quiz_id: Uuid,
    ) -> Result<Option<QuizStats>, GenericError> {
        let Some(row) = sqlx::query(
            "SELECT total_plays, total_score, average_score, best_score \
             FROM quiz_stats WHERE quiz_id = $1",
        )
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        Ok(Some(QuizStats {
            quiz_id,
            total_plays: row.try_get("total_plays")?,
            total_score: row.try_get("total_score")?,
            average_score: row.try_get("average_score")?,
            best_score: row.try_get("best_score")?,
        }))
    }

    /// Absent rows are a valid empty state, reported as zeros.
    async fn retrieve_user_quiz_stats(
        &self,
        user_id: &str,
        quiz_id: Uuid,
    ) -> Result<UserQuizStats, GenericError> {
        let row = sqlx::query(
            "SELECT best_score, play_count FROM user_quiz_stats \
             WHERE user_id = $1 AND quiz_id = $2",
        )
        .bind(user_id)
        .bind(quiz_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => UserQuizStats {
                best_score: row.try_get("best_score")?,
                play_count: row.try_get("play_count")?,
            },
            None => UserQuizStats::default(),
        })
    }
}
