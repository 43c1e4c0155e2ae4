pub mod adapter;
pub mod backoff;
pub mod crypto;
pub mod error;
pub mod matcher;
pub mod registry;
pub mod replay;
pub mod webhook;
pub mod worker;

pub use adapter::{Adapter, AdapterSuccess, DeliveryContext};
pub use backoff::backoff as retry_backoff;
pub use crypto::CredentialCipher;
pub use error::DeliveryError;
pub use matcher::{match_event, run_matcher_consumer};
pub use registry::AdapterRegistry;
pub use replay::replay_dlq_entry;
pub use webhook::WebhookAdapter;
pub use worker::{run_worker_pool, WorkerConfig};
