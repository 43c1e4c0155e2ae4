pub mod consumer;
pub mod error;
pub mod processor;
pub mod report;

pub use consumer::{run_partition_consumer, ShardLag};
pub use error::ProcessorError;
pub use processor::{process_fix, ProcessorConfig};
pub use report::FixOutcome;
