//! JOIN/STOP handling against the subscriber directory.
//!
//! Both operations are idempotent: repeating a command, or losing a race to a
//! concurrent identical command, yields an acknowledgement rather than an
//! error. Only storage failures surface as `Err`.

use tracing::{info, instrument};

use sched_core::{Phone, Reply};
use sched_store::{AddOutcome, ContactRepo, RemoveOutcome, StoreError};

/// Subscriber command parsed from an inbound message body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Join,
    Stop,
}

impl Command {
    /// Trimmed, case-insensitive match. Anything else is `None`.
    pub fn parse(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.eq_ignore_ascii_case("JOIN") {
            Some(Self::Join)
        } else if content.eq_ignore_ascii_case("STOP") {
            Some(Self::Stop)
        } else {
            None
        }
    }
}

#[derive(Clone)]
pub struct SubscriptionManager {
    contacts: ContactRepo,
}

impl SubscriptionManager {
    pub fn new(contacts: ContactRepo) -> Self {
        Self { contacts }
    }

    /// Apply a raw message body from `phone`.
    pub fn handle(&self, phone: &Phone, content: &str) -> Result<Reply, StoreError> {
        match Command::parse(content) {
            Some(Command::Join) => self.subscribe(phone),
            Some(Command::Stop) => self.unsubscribe(phone),
            None => Ok(Reply::InvalidCommand),
        }
    }

    #[instrument(skip(self), fields(phone = %phone))]
    pub fn subscribe(&self, phone: &Phone) -> Result<Reply, StoreError> {
        if self.contacts.exists(phone)? {
            return Ok(Reply::AlreadySubscribed);
        }
        match self.contacts.add(phone)? {
            AddOutcome::Added(contact) => {
                info!(contact_id = %contact.id, "contact subscribed");
                Ok(Reply::Subscribed)
            }
            AddOutcome::AlreadyExists => Ok(Reply::AlreadySubscribed),
        }
    }

    #[instrument(skip(self), fields(phone = %phone))]
    pub fn unsubscribe(&self, phone: &Phone) -> Result<Reply, StoreError> {
        if !self.contacts.exists(phone)? {
            return Ok(Reply::NotSubscribed);
        }
        match self.contacts.remove(phone)? {
            RemoveOutcome::Removed => {
                info!("contact unsubscribed");
                Ok(Reply::Unsubscribed)
            }
            RemoveOutcome::NotFound => Ok(Reply::NotSubscribed),
        }
    }
}
