pub mod question_generator;
pub mod spaced_repetition;
