//! StudyBuddy backend: REST API for generated study material (flashcards,
//! quizzes, summaries, chats), subscription billing, and a no-signup trial
//! tier backed by an in-process session store.

pub mod ai;
pub mod auth;
pub mod billing;
pub mod config;
pub mod db;
pub mod ephemeral;
pub mod error;
pub mod generate;
pub mod models;
pub mod notion;
pub mod repo;
pub mod retry;
pub mod routes;
pub mod schema;
pub mod state;
