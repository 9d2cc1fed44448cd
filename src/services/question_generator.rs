use std::collections::HashSet;

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::operations::words::WordEntry;

/// Distractors drawn per question before dedup/filtering.
const SAMPLE_LIMIT: i64 = 10;
const DISTRACTOR_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizType {
    DefinitionToWord,
    WordToDefinition,
    Mixed,
}

impl QuizType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "definition_to_word" => Some(Self::DefinitionToWord),
            "word_to_definition" => Some(Self::WordToDefinition),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefinitionToWord => "definition_to_word",
            Self::WordToDefinition => "word_to_definition",
            Self::Mixed => "mixed",
        }
    }
}

/// Concrete question shapes. Synonym/antonym are only reachable through
/// `QuizType::Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    DefinitionToWord,
    WordToDefinition,
    Synonym,
    Antonym,
}

impl QuestionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DefinitionToWord => "definition_to_word",
            Self::WordToDefinition => "word_to_definition",
            Self::Synonym => "synonym",
            Self::Antonym => "antonym",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question_type: QuestionKind,
    pub question_text: String,
    pub correct_answer: String,
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error(transparent)]
    Storage(#[from] sqlx::Error),
}

/// Random corpus samples used for distractor selection. Implemented against
/// Postgres in `db::operations::words` and by in-memory stubs in tests; the
/// generator itself never builds storage queries.
#[allow(async_fn_in_trait)]
pub trait DistractorSource {
    async fn sample_words(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error>;

    async fn sample_definitions(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error>;

    /// Words that appear in a synonym relation, excluding relations that
    /// involve the target word.
    async fn sample_synonym_pool(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error>;

    async fn sample_antonym_pool(
        &self,
        exclude_word_id: &str,
        limit: i64,
    ) -> Result<Vec<String>, sqlx::Error>;
}

/// Produces one question for `word` according to the session's quiz type.
/// Mixed tries every kind in random order and falls back to
/// definition_to_word, which always succeeds for a word with a definition.
pub async fn generate<S, R>(
    word: &WordEntry,
    quiz_type: QuizType,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    match quiz_type {
        QuizType::DefinitionToWord => definition_to_word(word, source, rng).await,
        QuizType::WordToDefinition => word_to_definition(word, source, rng).await,
        QuizType::Mixed => mixed(word, source, rng).await,
    }
}

async fn mixed<S, R>(
    word: &WordEntry,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    let mut kinds = [
        QuestionKind::DefinitionToWord,
        QuestionKind::WordToDefinition,
        QuestionKind::Synonym,
        QuestionKind::Antonym,
    ];
    kinds.shuffle(rng);

    for kind in kinds {
        let attempt = match kind {
            QuestionKind::DefinitionToWord => definition_to_word(word, source, rng).await,
            QuestionKind::WordToDefinition => word_to_definition(word, source, rng).await,
            QuestionKind::Synonym => synonym(word, source, rng).await,
            QuestionKind::Antonym => antonym(word, source, rng).await,
        };

        match attempt {
            Ok(question) => return Ok(question),
            Err(GenerateError::InsufficientData(reason)) => {
                tracing::debug!(word = %word.word, kind = kind.as_str(), %reason, "question kind skipped");
            }
            Err(err) => return Err(err),
        }
    }

    definition_to_word(word, source, rng).await
}

async fn definition_to_word<S, R>(
    word: &WordEntry,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    let definition = word.definitions.choose(rng).ok_or_else(|| {
        GenerateError::InsufficientData(format!("word \"{}\" has no definitions", word.word))
    })?;

    let mut distractors = dedup(source.sample_words(&word.id, SAMPLE_LIMIT).await?);
    distractors.retain(|candidate| candidate != &word.word);
    distractors.shuffle(rng);
    distractors.truncate(DISTRACTOR_COUNT);

    let mut options = distractors;
    options.push(word.word.clone());
    options.shuffle(rng);

    Ok(GeneratedQuestion {
        question_type: QuestionKind::DefinitionToWord,
        question_text: format!(
            "Which word matches this definition?\n\n\"{}\"",
            definition.definition
        ),
        correct_answer: word.word.clone(),
        options: Some(options),
    })
}

async fn word_to_definition<S, R>(
    word: &WordEntry,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    let definition = word.definitions.choose(rng).ok_or_else(|| {
        GenerateError::InsufficientData(format!("word \"{}\" has no definitions", word.word))
    })?;

    let mut distractors = dedup(source.sample_definitions(&word.id, SAMPLE_LIMIT).await?);
    distractors.retain(|candidate| candidate != &definition.definition);
    distractors.shuffle(rng);
    distractors.truncate(DISTRACTOR_COUNT);

    let mut options = distractors;
    options.push(definition.definition.clone());
    options.shuffle(rng);

    Ok(GeneratedQuestion {
        question_type: QuestionKind::WordToDefinition,
        question_text: format!(
            "What is the correct definition for the word \"{}\"?",
            word.word
        ),
        correct_answer: definition.definition.clone(),
        options: Some(options),
    })
}

async fn synonym<S, R>(
    word: &WordEntry,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    let pool = source.sample_synonym_pool(&word.id, SAMPLE_LIMIT).await?;
    build_related_question(
        word,
        &word.synonyms,
        pool,
        QuestionKind::Synonym,
        format!("Which word is a synonym of \"{}\"?", word.word),
        rng,
    )
}

async fn antonym<S, R>(
    word: &WordEntry,
    source: &S,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError>
where
    S: DistractorSource,
    R: Rng,
{
    let pool = source.sample_antonym_pool(&word.id, SAMPLE_LIMIT).await?;
    build_related_question(
        word,
        &word.antonyms,
        pool,
        QuestionKind::Antonym,
        format!("Which word is an antonym of \"{}\"?", word.word),
        rng,
    )
}

fn build_related_question<R: Rng>(
    word: &WordEntry,
    related: &[String],
    pool: Vec<String>,
    kind: QuestionKind,
    question_text: String,
    rng: &mut R,
) -> Result<GeneratedQuestion, GenerateError> {
    let correct = related
        .choose(rng)
        .ok_or_else(|| {
            GenerateError::InsufficientData(format!(
                "word \"{}\" has no {} relations",
                word.word,
                kind.as_str()
            ))
        })?
        .clone();

    let mut distractors = dedup(pool);
    distractors.retain(|candidate| candidate != &correct && candidate != &word.word);

    if distractors.len() < DISTRACTOR_COUNT {
        return Err(GenerateError::InsufficientData(format!(
            "not enough {} distractors for \"{}\": required {}, found {}",
            kind.as_str(),
            word.word,
            DISTRACTOR_COUNT,
            distractors.len()
        )));
    }

    distractors.shuffle(rng);
    distractors.truncate(DISTRACTOR_COUNT);

    let mut options = distractors;
    options.push(correct.clone());
    options.shuffle(rng);

    Ok(GeneratedQuestion {
        question_type: kind,
        question_text,
        correct_answer: correct,
        options: Some(options),
    })
}

fn dedup(pool: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    pool.into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}
