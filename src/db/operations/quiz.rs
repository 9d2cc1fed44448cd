use chrono::NaiveDateTime;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, Row};

#[derive(Debug, Clone)]
pub struct QuizSessionRow {
    pub id: String,
    pub user_id: String,
    pub quiz_type: String,
    pub total_questions: i32,
    pub correct_count: i32,
    pub wrong_count: i32,
    pub score: f64,
    pub status: String,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct QuizQuestionRow {
    pub id: String,
    pub session_id: String,
    pub word_id: String,
    pub question_type: String,
    pub question_text: String,
    pub correct_answer: String,
    pub options: Option<Vec<String>>,
    pub user_answer: Option<String>,
    pub is_correct: Option<bool>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub struct NewQuestion {
    pub id: String,
    pub word_id: String,
    pub question_type: String,
    pub question_text: String,
    pub correct_answer: String,
    pub options: Option<Vec<String>>,
}

const SESSION_COLUMNS: &str = r#""id","userId","quizType","totalQuestions","correctCount","wrongCount","score","status","startedAt","endedAt""#;

const QUESTION_COLUMNS: &str = r#""id","quizSessionId","wordId","questionType","questionText","correctAnswer","options","userAnswer","isCorrect","createdAt","updatedAt""#;

fn map_session(row: &PgRow) -> Result<QuizSessionRow, sqlx::Error> {
    Ok(QuizSessionRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        quiz_type: row.try_get("quizType")?,
        total_questions: row.try_get("totalQuestions")?,
        correct_count: row.try_get("correctCount")?,
        wrong_count: row.try_get("wrongCount")?,
        score: row.try_get("score")?,
        status: row.try_get("status")?,
        started_at: row.try_get("startedAt")?,
        ended_at: row.try_get("endedAt")?,
    })
}

fn map_question(row: &PgRow) -> Result<QuizQuestionRow, sqlx::Error> {
    Ok(QuizQuestionRow {
        id: row.try_get("id")?,
        session_id: row.try_get("quizSessionId")?,
        word_id: row.try_get("wordId")?,
        question_type: row.try_get("questionType")?,
        question_text: row.try_get("questionText")?,
        correct_answer: row.try_get("correctAnswer")?,
        options: row
            .try_get::<Option<Json<Vec<String>>>, _>("options")?
            .map(|json| json.0),
        user_answer: row.try_get("userAnswer")?,
        is_correct: row.try_get("isCorrect")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

pub async fn find_active_session(
    executor: impl PgExecutor<'_>,
    user_id: &str,
) -> Result<Option<QuizSessionRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {SESSION_COLUMNS} FROM "quiz_sessions" WHERE "userId" = $1 AND "endedAt" IS NULL LIMIT 1"#
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_session).transpose()
}

pub async fn find_session_for_owner(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    user_id: &str,
) -> Result<Option<QuizSessionRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"SELECT {SESSION_COLUMNS} FROM "quiz_sessions" WHERE "id" = $1 AND "userId" = $2 LIMIT 1"#
    ))
    .bind(session_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_session).transpose()
}

/// Conditional create backing the one-active-session-per-owner invariant:
/// inserts nothing when the owner already has a session with no end time.
/// The ON CONFLICT arm covers the window where two transactions both pass
/// the NOT EXISTS check and race on `uniq_quiz_sessions_active_owner`; the
/// loser gets zero rows instead of a unique-violation error. Returns
/// whether a row was created.
pub async fn create_session_if_absent(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    user_id: &str,
    quiz_type: &str,
    total_questions: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "quiz_sessions" ("id", "userId", "quizType", "totalQuestions")
        SELECT $1, $2, $3, $4
        WHERE NOT EXISTS (
            SELECT 1 FROM "quiz_sessions"
            WHERE "userId" = $2 AND "endedAt" IS NULL
        )
        ON CONFLICT ("userId") WHERE "endedAt" IS NULL DO NOTHING
        "#,
    )
    .bind(session_id)
    .bind(user_id)
    .bind(quiz_type)
    .bind(total_questions)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn insert_question(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    question: &NewQuestion,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "quiz_questions"
            ("id", "quizSessionId", "wordId", "questionType",
             "questionText", "correctAnswer", "options")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(&question.id)
    .bind(session_id)
    .bind(&question.word_id)
    .bind(&question.question_type)
    .bind(&question.question_text)
    .bind(&question.correct_answer)
    .bind(question.options.as_ref().map(Json))
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn list_session_questions(
    executor: impl PgExecutor<'_>,
    session_id: &str,
) -> Result<Vec<QuizQuestionRow>, sqlx::Error> {
    let rows = sqlx::query(&format!(
        r#"SELECT {QUESTION_COLUMNS} FROM "quiz_questions" WHERE "quizSessionId" = $1 ORDER BY "createdAt" ASC"#
    ))
    .bind(session_id)
    .fetch_all(executor)
    .await?;

    rows.iter().map(map_question).collect()
}

pub async fn find_question_in_session(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    question_id: &str,
) -> Result<Option<(QuizQuestionRow, QuizSessionRow)>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT qq."id", qq."quizSessionId", qq."wordId", qq."questionType",
               qq."questionText", qq."correctAnswer", qq."options",
               qq."userAnswer", qq."isCorrect", qq."createdAt", qq."updatedAt",
               qs."id" AS "sessionId", qs."userId", qs."quizType",
               qs."totalQuestions", qs."correctCount", qs."wrongCount",
               qs."score", qs."status", qs."startedAt", qs."endedAt"
        FROM "quiz_questions" qq
        JOIN "quiz_sessions" qs ON qs."id" = qq."quizSessionId"
        WHERE qq."id" = $1 AND qs."id" = $2
        LIMIT 1
        "#,
    )
    .bind(question_id)
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let question = map_question(&row)?;
    let session = QuizSessionRow {
        id: row.try_get("sessionId")?,
        user_id: row.try_get("userId")?,
        quiz_type: row.try_get("quizType")?,
        total_questions: row.try_get("totalQuestions")?,
        correct_count: row.try_get("correctCount")?,
        wrong_count: row.try_get("wrongCount")?,
        score: row.try_get("score")?,
        status: row.try_get("status")?,
        started_at: row.try_get("startedAt")?,
        ended_at: row.try_get("endedAt")?,
    };

    Ok(Some((question, session)))
}

/// Records the grade exactly once: the `"userAnswer" IS NULL` guard makes a
/// concurrent double submission lose with zero rows affected.
pub async fn mark_question_answered(
    executor: impl PgExecutor<'_>,
    question_id: &str,
    user_answer: &str,
    is_correct: bool,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "quiz_questions"
        SET "userAnswer" = $2, "isCorrect" = $3, "updatedAt" = NOW()
        WHERE "id" = $1 AND "userAnswer" IS NULL
        "#,
    )
    .bind(question_id)
    .bind(user_answer)
    .bind(is_correct)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

/// Atomic in-place increment so concurrent submissions for different
/// questions of the same session cannot lose counter updates. The
/// `"endedAt" IS NULL` guard rejects a grade whose session was cancelled or
/// completed after the handler's pre-check; `None` means the session ended
/// and nothing changed. Returns the post-increment counters.
pub async fn increment_session_counters(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    is_correct: bool,
) -> Result<Option<(i32, i32)>, sqlx::Error> {
    let sql = if is_correct {
        r#"
        UPDATE "quiz_sessions"
        SET "correctCount" = "correctCount" + 1, "updatedAt" = NOW()
        WHERE "id" = $1 AND "endedAt" IS NULL
        RETURNING "correctCount", "wrongCount"
        "#
    } else {
        r#"
        UPDATE "quiz_sessions"
        SET "wrongCount" = "wrongCount" + 1, "updatedAt" = NOW()
        WHERE "id" = $1 AND "endedAt" IS NULL
        RETURNING "correctCount", "wrongCount"
        "#
    };

    let row = sqlx::query(sql)
        .bind(session_id)
        .fetch_optional(executor)
        .await?;

    row.map(|row| Ok((row.try_get("correctCount")?, row.try_get("wrongCount")?)))
        .transpose()
}

pub async fn count_unanswered(
    executor: impl PgExecutor<'_>,
    session_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "quiz_questions" WHERE "quizSessionId" = $1 AND "userAnswer" IS NULL"#,
    )
    .bind(session_id)
    .fetch_one(executor)
    .await
}

/// Next-question policy: any unanswered question of the session, picked at
/// random.
pub async fn random_unanswered_question(
    executor: impl PgExecutor<'_>,
    session_id: &str,
) -> Result<Option<QuizQuestionRow>, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {QUESTION_COLUMNS} FROM "quiz_questions"
        WHERE "quizSessionId" = $1 AND "userAnswer" IS NULL
        ORDER BY RANDOM()
        LIMIT 1
        "#
    ))
    .bind(session_id)
    .fetch_optional(executor)
    .await?;

    row.as_ref().map(map_question).transpose()
}

pub async fn complete_session(
    executor: impl PgExecutor<'_>,
    session_id: &str,
    score: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "quiz_sessions"
        SET "endedAt" = NOW(), "score" = $2, "status" = 'completed', "updatedAt" = NOW()
        WHERE "id" = $1
        "#,
    )
    .bind(session_id)
    .bind(score)
    .execute(executor)
    .await?;

    Ok(())
}

/// Ends the session without touching the score. Guarded so a session that
/// ended in the meantime is left alone; returns whether the cancel applied.
pub async fn cancel_session(
    executor: impl PgExecutor<'_>,
    session_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "quiz_sessions"
        SET "endedAt" = NOW(), "status" = 'cancelled', "updatedAt" = NOW()
        WHERE "id" = $1 AND "endedAt" IS NULL
        "#,
    )
    .bind(session_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
