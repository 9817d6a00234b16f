//! Plan Coach: progress and quality control for a business-plan workshop.

pub mod coaching;
pub mod config;
pub mod conversation;
pub mod error;
pub mod persistence;
pub mod text;
pub mod workshop;
