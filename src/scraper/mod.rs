pub mod classifier;
pub mod comments;
pub mod controller;
pub mod pagination;
pub mod scheduler;
pub mod task;

// Re-export common types
pub use controller::{RunOptions, RunSummary, ScrapeController};
