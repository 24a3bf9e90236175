pub mod output;
pub mod walker;

pub use output::{create_writer, GuardSummary, OutputFormat, OutputWriter};
pub use walker::FileWalker;
