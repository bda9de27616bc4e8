//! Question banks, questions and answer attempts

pub mod database;
pub mod handlers;
pub mod scoring;
pub mod service;

pub use database::SqliteQuizStore;
pub use service::QuizService;
