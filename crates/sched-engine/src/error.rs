use sched_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("message selection failed: {0}")]
    Select(#[from] SelectError),
}

/// Why no message could be chosen.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("message pool is empty")]
    Empty,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SelectError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Empty => "empty_pool",
            Self::Store(_) => "store_error",
        }
    }
}
