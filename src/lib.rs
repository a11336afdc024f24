//! fitlevel - Workout progression engine
//!
//! Turns finished workouts into levels, XP, muscle stats, coins and inventory,
//! persisted per user in a document store.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod exercises;
pub mod progress;
pub mod user;

pub use db::{DocumentStore, MemoryStore, SqliteStore};
pub use engine::ProgressionEngine;
pub use error::ProgressError;
pub use progress::{PlayerProgress, ProgressUpdate};
