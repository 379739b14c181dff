use sched_store::MessageRepo;

use crate::error::SelectError;

/// Chooses the text for one broadcast send.
pub trait MessageSelector: Send + Sync {
    fn select(&self) -> Result<String, SelectError>;
}

/// Uniform random pick from the stored message pool.
#[derive(Clone)]
pub struct RandomSelector {
    messages: MessageRepo,
}

impl RandomSelector {
    pub fn new(messages: MessageRepo) -> Self {
        Self { messages }
    }
}

impl MessageSelector for RandomSelector {
    fn select(&self) -> Result<String, SelectError> {
        match self.messages.pick_random()? {
            Some(row) => Ok(row.text),
            None => Err(SelectError::Empty),
        }
    }
}

#[cfg(test)]
pub(crate) use rotating::RotatingSelector;
