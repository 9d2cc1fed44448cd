use chrono::NaiveDateTime;
use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, Row};

use crate::services::spaced_repetition::Progress;

fn to_utc(value: Option<NaiveDateTime>) -> Option<DateTime<Utc>> {
    value.map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Loads the learner's progress for one word, following the saved-word
/// relation that owns it. `None` when the word was saved but never reviewed.
pub async fn get_progress(
    executor: impl PgExecutor<'_>,
    user_id: &str,
    word_id: &str,
) -> Result<Option<Progress>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT wlp."masteryLevel", wlp."reviewInterval", wlp."correctCount",
               wlp."wrongCount", wlp."lastReviewedAt", wlp."nextReviewAt"
        FROM "word_learning_progresses" wlp
        JOIN "user_saved_words" usw ON usw."id" = wlp."userSavedWordId"
        WHERE usw."userId" = $1 AND usw."wordId" = $2
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(word_id)
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else { return Ok(None) };

    Ok(Some(Progress {
        mastery_level: row.try_get("masteryLevel")?,
        review_interval: row.try_get("reviewInterval")?,
        correct_count: row.try_get("correctCount")?,
        wrong_count: row.try_get("wrongCount")?,
        last_reviewed_at: to_utc(row.try_get("lastReviewedAt")?),
        next_review_at: to_utc(row.try_get("nextReviewAt")?),
    }))
}

/// Writes the scheduler's output back, creating the progress row on first
/// review. The insert resolves the owning saved-word row inline so callers
/// stay on (owner, word) coordinates. No-op when the word is not saved.
pub async fn upsert_progress(
    executor: impl PgExecutor<'_>,
    user_id: &str,
    word_id: &str,
    progress: &Progress,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "word_learning_progresses"
            ("id", "userSavedWordId", "masteryLevel", "reviewInterval",
             "correctCount", "wrongCount", "lastReviewedAt", "nextReviewAt")
        SELECT $1, usw."id", $2, $3, $4, $5, $6, $7
        FROM "user_saved_words" usw
        WHERE usw."userId" = $8 AND usw."wordId" = $9
        ON CONFLICT ("userSavedWordId") DO UPDATE SET
            "masteryLevel" = EXCLUDED."masteryLevel",
            "reviewInterval" = EXCLUDED."reviewInterval",
            "correctCount" = EXCLUDED."correctCount",
            "wrongCount" = EXCLUDED."wrongCount",
            "lastReviewedAt" = EXCLUDED."lastReviewedAt",
            "nextReviewAt" = EXCLUDED."nextReviewAt",
            "updatedAt" = NOW()
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(progress.mastery_level)
    .bind(progress.review_interval)
    .bind(progress.correct_count)
    .bind(progress.wrong_count)
    .bind(progress.last_reviewed_at.map(|t| t.naive_utc()))
    .bind(progress.next_review_at.map(|t| t.naive_utc()))
    .bind(user_id)
    .bind(word_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
