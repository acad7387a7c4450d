// filechat - Performance-metric batching and AI response caching over Supabase
// Author: kelexine (https://github.com/kelexine)

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod metrics;
pub mod store;
pub mod utils;

pub use app::{Completion, FileChat};
