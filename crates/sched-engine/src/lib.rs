//! Subscription handling and the periodic broadcast loop.

pub mod error;
pub mod scheduler;
pub mod selector;
pub mod subscription;

pub use error::{EngineError, SelectError};
pub use scheduler::{BroadcastScheduler, SchedulerConfig, TickOutcome, TickSummary};
pub use selector::{MessageSelector, RandomSelector};
pub use subscription::{Command, SubscriptionManager};
