pub mod contacts;
pub mod database;
pub mod error;
pub mod messages;
pub mod schema;

pub use contacts::{AddOutcome, ContactRepo, ContactRow, RemoveOutcome};
pub use database::{Database, DatabaseLocation};
pub use error::StoreError;
pub use messages::{MessageRepo, MessageRow};
