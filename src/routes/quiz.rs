use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::auth::{AuthError, AuthUser};
use crate::cache::keys::{quiz_result_key, QUIZ_RESULT_TTL};
use crate::db::operations::progress;
use crate::db::operations::quiz::{self, NewQuestion, QuizQuestionRow, QuizSessionRow};
use crate::db::operations::words::{select_due_words, PgWordCorpus};
use crate::db::Database;
use crate::response::{success, ApiResponse, AppError};
use crate::services::question_generator::{self, GenerateError, QuizType};
use crate::services::spaced_repetition;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    quiz_type: Option<String>,
    question_per_session: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerRequest {
    user_answer: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionPreview {
    id: String,
    question_type: String,
    question_text: String,
    options: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionCreatedData {
    session_id: String,
    total_questions: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_active_session: Option<bool>,
    questions: Vec<QuestionPreview>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionProgress {
    answered_questions: i32,
    total_questions: i32,
    correct_answers: i32,
    wrong_answers: i32,
    percentage: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnsweredQuestion {
    id: String,
    user_answer: String,
    correct_answer: String,
    is_correct: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NextQuestion {
    id: String,
    quiz_session_id: String,
    question_type: String,
    question_text: String,
    options: Option<Vec<String>>,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FinalStats {
    total_questions: i32,
    correct_answers: i32,
    wrong_answers: i32,
    answered_questions: i32,
    percentage: f64,
    score: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitAnswerData {
    question: AnsweredQuestion,
    session_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_question: Option<NextQuestion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_progress: Option<SessionProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    final_stats: Option<FinalStats>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionDetail {
    id: String,
    quiz_session_id: String,
    question_type: String,
    question_text: String,
    options: Option<Vec<String>>,
    user_answer: Option<String>,
    correct_answer: Option<String>,
    is_correct: Option<bool>,
    has_submitted: bool,
    created_at: String,
    updated_at: String,
    session_progress: SessionProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_question: Option<NextQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResult {
    id: String,
    quiz_type: String,
    status: String,
    total_questions: i32,
    correct_count: i32,
    wrong_count: i32,
    score: f64,
    started_at: String,
    ended_at: Option<String>,
    questions: Vec<ResultQuestion>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultQuestion {
    id: String,
    word_id: String,
    question_type: String,
    question_text: String,
    options: Option<Vec<String>>,
    user_answer: Option<String>,
    correct_answer: String,
    is_correct: Option<bool>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_session))
        .route("/:sessionId/question/:questionId", get(get_question))
        .route(
            "/:sessionId/question/:questionId/check-answer",
            post(submit_answer),
        )
        .route("/:sessionId/cancel", delete(cancel_session))
        .route("/:sessionId/result", get(get_result))
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let quiz_type = parse_quiz_type(payload.quiz_type.as_deref())?;
    let question_count = parse_question_count(payload.question_per_session)?;

    let (db, user) = require_user(&state, &headers)?;

    if let Some(active) = quiz::find_active_session(db.pool(), &user.id).await? {
        return Ok(active_session_response(db.pool(), active).await?.into_response());
    }

    let due_words = select_due_words(db.pool(), &user.id, question_count).await?;
    if due_words.is_empty() {
        return Err(AppError::no_words_available(
            "No words available for quiz. All words are up to date!",
        ));
    }

    let corpus = PgWordCorpus::new(db.pool());
    let mut base = StdRng::from_os_rng();
    let generated = futures::future::try_join_all(due_words.iter().map(|word| {
        let mut rng = StdRng::from_rng(&mut base);
        let corpus = &corpus;
        async move { question_generator::generate(word, quiz_type, corpus, &mut rng).await }
    }))
    .await
    .map_err(map_generate_error)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let total_questions = due_words.len() as i32;

    let questions: Vec<NewQuestion> = due_words
        .iter()
        .zip(generated)
        .map(|(word, question)| NewQuestion {
            id: uuid::Uuid::new_v4().to_string(),
            word_id: word.id.clone(),
            question_type: question.question_type.as_str().to_string(),
            question_text: question.question_text,
            correct_answer: question.correct_answer,
            options: question.options,
        })
        .collect();

    let mut tx = db.pool().begin().await?;
    let created = quiz::create_session_if_absent(
        &mut *tx,
        &session_id,
        &user.id,
        quiz_type.as_str(),
        total_questions,
    )
    .await?;

    if !created {
        // Another request won the race; hand back the session it created.
        tx.rollback().await?;
        let active = quiz::find_active_session(db.pool(), &user.id)
            .await?
            .ok_or_else(|| AppError::conflict("You already have an active quiz session"))?;
        return Ok(active_session_response(db.pool(), active).await?.into_response());
    }

    for question in &questions {
        quiz::insert_question(&mut *tx, &session_id, question).await?;
    }
    tx.commit().await?;

    tracing::info!(
        user_id = %user.id,
        session_id = %session_id,
        quiz_type = quiz_type.as_str(),
        total_questions,
        "quiz session created"
    );

    let data = SessionCreatedData {
        session_id,
        total_questions,
        has_active_session: None,
        questions: questions
            .into_iter()
            .map(|q| QuestionPreview {
                id: q.id,
                question_type: q.question_type,
                question_text: q.question_text,
                options: q.options,
            })
            .collect(),
    };

    Ok((
        StatusCode::CREATED,
        success("Quiz session created successfully.", data),
    )
        .into_response())
}

async fn get_question(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((session_id, question_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers)?;

    let Some((question, session)) =
        quiz::find_question_in_session(db.pool(), &session_id, &question_id).await?
    else {
        return Err(AppError::not_found("Question not found"));
    };

    if session.user_id != user.id {
        return Err(AppError::forbidden(
            "You don't have permission to access this question",
        ));
    }

    let has_submitted = question.user_answer.is_some();
    let next_question = if has_submitted {
        quiz::random_unanswered_question(db.pool(), &session_id)
            .await?
            .map(next_question_view)
    } else {
        None
    };

    let answered = session.correct_count + session.wrong_count;
    let detail = QuestionDetail {
        id: question.id,
        quiz_session_id: question.session_id,
        question_type: question.question_type,
        question_text: question.question_text,
        options: question.options,
        correct_answer: has_submitted.then(|| question.correct_answer),
        user_answer: question.user_answer,
        is_correct: question.is_correct,
        has_submitted,
        created_at: format_naive(question.created_at),
        updated_at: format_naive(question.updated_at),
        session_progress: session_progress(
            answered,
            session.total_questions,
            session.correct_count,
            session.wrong_count,
        ),
        next_question,
    };

    Ok(success("Question retrieved successfully", detail))
}

async fn submit_answer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((session_id, question_id)): Path<(String, String)>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_answer = payload
        .user_answer
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::validation("User answer is required"))?
        .to_string();

    let (db, user) = require_user(&state, &headers)?;

    let Some((question, session)) =
        quiz::find_question_in_session(db.pool(), &session_id, &question_id).await?
    else {
        return Err(AppError::not_found("Question not found or not accessible."));
    };

    if session.user_id != user.id {
        return Err(AppError::forbidden(
            "You are not authorized to answer this question.",
        ));
    }
    ensure_submittable(&question, &session)?;

    let is_correct = grade_answer(&user_answer, &question.correct_answer);

    let mut tx = db.pool().begin().await?;

    let marked = quiz::mark_question_answered(&mut *tx, &question.id, &user_answer, is_correct).await?;
    if marked == 0 {
        // Lost to a concurrent submission; the transaction drops and rolls back.
        return Err(AppError::conflict("Question already answered."));
    }

    let Some((correct_count, wrong_count)) =
        quiz::increment_session_counters(&mut *tx, &session.id, is_correct).await?
    else {
        // The session ended between the pre-check and the grade; the
        // transaction drops and the recorded answer rolls back with it.
        return Err(AppError::conflict("Quiz session has already ended."));
    };

    let current = progress::get_progress(&mut *tx, &user.id, &question.word_id)
        .await?
        .unwrap_or_default();
    let advanced = spaced_repetition::advance(&current, is_correct, Utc::now());
    let updated = progress::upsert_progress(&mut *tx, &user.id, &question.word_id, &advanced).await?;
    if updated == 0 {
        tracing::debug!(
            user_id = %user.id,
            word_id = %question.word_id,
            "word is not in the user's saved list, progress not recorded"
        );
    }

    let remaining = quiz::count_unanswered(&mut *tx, &session.id).await?;

    let answered_question = AnsweredQuestion {
        id: question.id,
        user_answer,
        correct_answer: question.correct_answer,
        is_correct,
    };

    if remaining == 0 {
        let score = completion_score(correct_count, session.total_questions);
        quiz::complete_session(&mut *tx, &session.id, score).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            session_id = %session.id,
            score,
            "quiz session completed"
        );

        let data = SubmitAnswerData {
            question: answered_question,
            session_complete: true,
            next_question: None,
            session_progress: None,
            final_stats: Some(FinalStats {
                total_questions: session.total_questions,
                correct_answers: correct_count,
                wrong_answers: session.total_questions - correct_count,
                answered_questions: session.total_questions,
                percentage: 100.0,
                score,
            }),
        };
        return Ok(success(
            "Answer submitted successfully. Quiz completed!",
            data,
        ));
    }

    let next_question = quiz::random_unanswered_question(&mut *tx, &session.id)
        .await?
        .map(next_question_view);
    tx.commit().await?;

    let answered = session.total_questions - remaining as i32;
    let data = SubmitAnswerData {
        question: answered_question,
        session_complete: false,
        next_question,
        session_progress: Some(session_progress(
            answered,
            session.total_questions,
            correct_count,
            wrong_count,
        )),
        final_stats: None,
    };

    Ok(success("Answer submitted successfully.", data))
}

async fn cancel_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers)?;

    let Some(session) = quiz::find_session_for_owner(db.pool(), &session_id, &user.id).await? else {
        return Err(AppError::not_found("Quiz session not found"));
    };
    if session.ended_at.is_some() {
        return Err(AppError::conflict("Session already ended"));
    }

    let cancelled = quiz::cancel_session(db.pool(), &session.id).await?;
    if !cancelled {
        return Err(AppError::conflict("Session already ended"));
    }

    tracing::info!(user_id = %user.id, session_id = %session.id, "quiz session cancelled");

    Ok(success("Quiz session cancelled", serde_json::Value::Null))
}

async fn get_result(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (db, user) = require_user(&state, &headers)?;

    // The key carries the owner, so a hit for someone else's session is
    // impossible; a non-owner falls through to the owner-scoped lookup.
    let cache = state.cache();
    let cache_key = quiz_result_key(&user.id, &session_id);
    if let Some(cache) = &cache {
        if let Some(cached) = cache.get::<SessionResult>(&cache_key).await {
            return Ok(success("Quiz results retrieved successfully", cached));
        }
    }

    let Some(session) = quiz::find_session_for_owner(db.pool(), &session_id, &user.id).await? else {
        return Err(AppError::not_found(
            "Quiz session not found or not completed yet",
        ));
    };

    let questions = quiz::list_session_questions(db.pool(), &session.id).await?;
    let ended = session.ended_at.is_some();

    let result = SessionResult {
        id: session.id,
        quiz_type: session.quiz_type,
        status: session.status,
        total_questions: session.total_questions,
        correct_count: session.correct_count,
        wrong_count: session.wrong_count,
        score: session.score,
        started_at: format_naive(session.started_at),
        ended_at: session.ended_at.map(format_naive),
        questions: questions
            .into_iter()
            .map(|q| ResultQuestion {
                id: q.id,
                word_id: q.word_id,
                question_type: q.question_type,
                question_text: q.question_text,
                options: q.options,
                user_answer: q.user_answer,
                correct_answer: q.correct_answer,
                is_correct: q.is_correct,
            })
            .collect(),
    };

    // Only finished sessions cache; an active session's counters still move.
    if ended {
        if let Some(cache) = &cache {
            cache.set(&cache_key, &result, QUIZ_RESULT_TTL).await;
        }
    }

    Ok(success("Quiz results retrieved successfully", result))
}

fn require_user(state: &AppState, headers: &HeaderMap) -> Result<(Arc<Database>, AuthUser), AppError> {
    let user = crate::auth::verify_request_token(headers).map_err(|err| match err {
        AuthError::MissingToken => AppError::unauthorized("Authentication token is required"),
        _ => AppError::unauthorized("Invalid or expired authentication token"),
    })?;

    let db = state
        .db()
        .ok_or_else(|| AppError::service_unavailable("Database is not available"))?;

    Ok((db, user))
}

fn parse_quiz_type(value: Option<&str>) -> Result<QuizType, AppError> {
    let raw = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::validation("Quiz type is required"))?;

    QuizType::parse(raw).ok_or_else(|| {
        AppError::validation(
            "Quiz type must be one of [definition_to_word, word_to_definition, mixed]",
        )
    })
}

fn parse_question_count(value: Option<i64>) -> Result<i64, AppError> {
    let count = value.ok_or_else(|| AppError::validation("Number of questions is required"))?;
    if count < 1 {
        return Err(AppError::validation("At least 1 question is required"));
    }
    if count > 50 {
        return Err(AppError::validation("No more than 50 questions allowed"));
    }
    Ok(count)
}

fn map_generate_error(err: GenerateError) -> AppError {
    match err {
        GenerateError::InsufficientData(reason) => AppError::insufficient_data(reason),
        GenerateError::Storage(err) => err.into(),
    }
}

async fn active_session_response(
    pool: &PgPool,
    session: QuizSessionRow,
) -> Result<(StatusCode, Json<ApiResponse<SessionCreatedData>>), AppError> {
    let questions = quiz::list_session_questions(pool, &session.id).await?;

    let data = SessionCreatedData {
        session_id: session.id,
        total_questions: session.total_questions,
        has_active_session: Some(true),
        questions: questions
            .into_iter()
            .map(|q| QuestionPreview {
                id: q.id,
                question_type: q.question_type,
                question_text: q.question_text,
                options: q.options,
            })
            .collect(),
    };

    Ok((
        StatusCode::OK,
        success("You already have an active quiz session", data),
    ))
}

fn next_question_view(question: QuizQuestionRow) -> NextQuestion {
    NextQuestion {
        id: question.id,
        quiz_session_id: question.session_id,
        question_type: question.question_type,
        question_text: question.question_text,
        options: question.options,
        created_at: format_naive(question.created_at),
        updated_at: format_naive(question.updated_at),
    }
}

fn session_progress(answered: i32, total: i32, correct: i32, wrong: i32) -> SessionProgress {
    let percentage = if total > 0 {
        f64::from(answered) / f64::from(total) * 100.0
    } else {
        0.0
    };
    SessionProgress {
        answered_questions: answered,
        total_questions: total,
        correct_answers: correct,
        wrong_answers: wrong,
        percentage,
    }
}

fn format_naive(value: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(value, Utc)
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Submission pre-checks: an answered question and an ended session are both
/// state conflicts, with the answered check taking precedence.
fn ensure_submittable(question: &QuizQuestionRow, session: &QuizSessionRow) -> Result<(), AppError> {
    if question.user_answer.is_some() {
        return Err(AppError::conflict("Question already answered."));
    }
    if session.ended_at.is_some() {
        return Err(AppError::conflict("Quiz session has already ended."));
    }
    Ok(())
}

fn grade_answer(user_answer: &str, correct_answer: &str) -> bool {
    user_answer.to_lowercase() == correct_answer.to_lowercase()
}

fn completion_score(correct: i32, total: i32) -> f64 {
    if total > 0 {
        round2(f64::from(correct) / f64::from(total) * 100.0)
    } else {
        0.0
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use chrono::Utc;

    use super::*;

    fn open_session() -> QuizSessionRow {
        QuizSessionRow {
            id: "session-1".to_string(),
            user_id: "user-1".to_string(),
            quiz_type: "mixed".to_string(),
            total_questions: 4,
            correct_count: 0,
            wrong_count: 0,
            score: 0.0,
            status: "active".to_string(),
            started_at: Utc::now().naive_utc(),
            ended_at: None,
        }
    }

    fn unanswered_question() -> QuizQuestionRow {
        let now = Utc::now().naive_utc();
        QuizQuestionRow {
            id: "question-1".to_string(),
            session_id: "session-1".to_string(),
            word_id: "word-1".to_string(),
            question_type: "definition_to_word".to_string(),
            question_text: "Which word matches this definition?".to_string(),
            correct_answer: "Ephemeral".to_string(),
            options: Some(vec!["Ephemeral".to_string(), "Eternal".to_string()]),
            user_answer: None,
            is_correct: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn open_session_accepts_submission() {
        assert!(ensure_submittable(&unanswered_question(), &open_session()).is_ok());
    }

    #[test]
    fn answered_question_is_a_conflict() {
        let mut question = unanswered_question();
        question.user_answer = Some("eternal".to_string());
        question.is_correct = Some(false);

        let err = ensure_submittable(&question, &open_session()).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "CONFLICT");
    }

    #[test]
    fn ended_session_is_a_conflict() {
        let mut session = open_session();
        session.ended_at = Some(Utc::now().naive_utc());
        session.status = "completed".to_string();

        let err = ensure_submittable(&unanswered_question(), &session).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn answered_check_wins_over_ended_check() {
        let mut question = unanswered_question();
        question.user_answer = Some("ephemeral".to_string());
        let mut session = open_session();
        session.ended_at = Some(Utc::now().naive_utc());

        let err = ensure_submittable(&question, &session).unwrap_err();
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn grading_ignores_case() {
        assert!(grade_answer("ephemeral", "Ephemeral"));
        assert!(grade_answer("EPHEMERAL", "ephemeral"));
        assert!(!grade_answer("eternal", "Ephemeral"));
    }

    #[test]
    fn completion_score_rounds_to_two_decimals() {
        assert_eq!(completion_score(2, 3), 66.67);
        assert_eq!(completion_score(4, 4), 100.0);
        assert_eq!(completion_score(0, 4), 0.0);
        assert_eq!(completion_score(0, 0), 0.0);
    }
}
