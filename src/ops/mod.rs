pub mod filter;
pub mod progress;
pub mod report;
