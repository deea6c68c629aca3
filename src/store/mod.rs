pub mod kv;
pub mod notifications;

pub use kv::{KvBackend, ObjectKv};
pub use notifications::{InsertOutcome, Mutation, NotificationStore, StoreConfig};
