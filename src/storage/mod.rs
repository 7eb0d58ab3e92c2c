pub mod output;

// Re-export common functions
pub use output::{write_dataset, write_summary};
