pub mod canonical;
pub mod error;
pub mod stream;
pub mod types;

pub use canonical::{canonical_json_value, transition_event_hash};
pub use error::DomainError;
pub use stream::{ShardedReceiver, ShardedStream};
pub use types::*;
