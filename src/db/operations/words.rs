use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::services::question_generator::DistractorSource;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordDefinition {
    pub definition: String,
    pub part_of_speech: Option<String>,
}

/// A word with everything the question generator needs, aggregated in one
/// query. Synonyms/antonyms are the related word texts, not relation ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordEntry {
    pub id: String,
    pub word: String,
    pub phonetic: Option<String>,
    pub definitions: Vec<WordDefinition>,
    pub synonyms: Vec<String>,
    pub antonyms: Vec<String>,
}

/// Words due for review for one learner: saved words that either have no
/// progress row yet or whose next review date is today or earlier. The inner
/// join on definitions guarantees every selectable word can produce a
/// definition_to_word question.
pub async fn select_due_words(
    pool: &PgPool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<WordEntry>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        WITH need_to_review AS (
            SELECT usw."wordId"
            FROM "user_saved_words" usw
            LEFT JOIN "word_learning_progresses" wlp
                ON wlp."userSavedWordId" = usw."id"
            WHERE usw."userId" = $1
              AND (wlp."id" IS NULL OR wlp."nextReviewAt"::date <= CURRENT_DATE)
        ),
        definitions_cte AS (
            SELECT wd."wordId",
                   JSON_AGG(JSON_BUILD_OBJECT(
                       'definition', wd."definition",
                       'partOfSpeech', wd."partOfSpeech"
                   )) AS "definitions"
            FROM "word_definitions" wd
            GROUP BY wd."wordId"
        ),
        synonyms_cte AS (
            SELECT ws."wordId", JSON_AGG(DISTINCT s."word") AS "synonyms"
            FROM "word_synonyms" ws
            JOIN "words" s ON s."id" = ws."synonymId"
            GROUP BY ws."wordId"
        ),
        antonyms_cte AS (
            SELECT wa."wordId", JSON_AGG(DISTINCT a."word") AS "antonyms"
            FROM "word_antonyms" wa
            JOIN "words" a ON a."id" = wa."antonymId"
            GROUP BY wa."wordId"
        )
        SELECT w."id", w."word", w."phonetic",
               defs."definitions" AS "definitions",
               COALESCE(syns."synonyms", '[]'::json) AS "synonyms",
               COALESCE(ants."antonyms", '[]'::json) AS "antonyms"
        FROM "words" w
        JOIN definitions_cte defs ON defs."wordId" = w."id"
        LEFT JOIN synonyms_cte syns ON syns."wordId" = w."id"
        LEFT JOIN antonyms_cte ants ON ants."wordId" = w."id"
        WHERE w."id" IN (SELECT "wordId" FROM need_to_review)
        ORDER BY RANDOM()
        LIMIT $2
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(WordEntry {
            id: row.try_get("id")?,
            word: row.try_get("word")?,
            phonetic: row.try_get("phonetic")?,
            definitions: row
                .try_get::<Json<Vec<WordDefinition>>, _>("definitions")?
                .0,
            synonyms: row.try_get::<Json<Vec<String>>, _>("synonyms")?.0,
            antonyms: row.try_get::<Json<Vec<String>>, _>("antonyms")?.0,
        });
    }
    Ok(out)
}

/// Corpus sampling for distractor selection, backed by Postgres. Each sample
/// over-fetches so the generator can dedup and filter before picking three.
#[derive(Clone, Copy)]
pub struct PgWordCorpus<'a> {
    pool: &'a PgPool,
}

impl<'a> PgWordCorpus<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }
}

impl DistractorSource for PgWordCorpus<'_> {
    async fn sample_words(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT w."word"
            FROM "words" w
            WHERE w."id" != $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(exclude_word_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    async fn sample_definitions(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT wd."definition"
            FROM "words" w
            JOIN "word_definitions" wd ON wd."wordId" = w."id"
            WHERE w."id" != $1
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(exclude_word_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    async fn sample_synonym_pool(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT w."word"
            FROM "word_synonyms" ws
            JOIN "words" w ON w."id" = ws."wordId"
            WHERE NOT (ws."wordId" = $1 OR ws."synonymId" = $1)
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(exclude_word_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }

    async fn sample_antonym_pool(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT w."word"
            FROM "word_antonyms" wa
            JOIN "words" w ON w."id" = wa."wordId"
            WHERE NOT (wa."wordId" = $1 OR wa."antonymId" = $1)
            ORDER BY RANDOM()
            LIMIT $2
            "#,
        )
        .bind(exclude_word_id)
        .bind(limit)
        .fetch_all(self.pool)
        .await
    }
}
