pub mod progress;
pub mod quiz;
pub mod words;
