pub mod auth;
pub mod cache;
pub mod error;
pub mod pipeline;
pub mod subscriber;
pub mod topic;
pub mod wire;

pub use cache::DeviceKeyCache;
pub use error::IngestError;
pub use pipeline::process_message;
pub use subscriber::{run as run_subscriber, SubscriberConfig};
pub use wire::LocationFix;
