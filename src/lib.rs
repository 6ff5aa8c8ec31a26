// TodoStore - Task persistence with SQLite and live query subscriptions

#[cfg(test)]
mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod form;
pub mod record;
pub mod store;
pub mod subscription;
mod table;
mod worker;

// Re-export main types for convenience
pub use config::Config;
pub use error::{StoreError, StoreResult};
pub use form::{FormMode, Saved, Submission, TaskForm};
pub use record::{Priority, TaskDraft, TaskId, TaskRecord};
pub use store::{Completion, TaskStore};
pub use subscription::{Query, QuerySubscription, SubscriptionId};
