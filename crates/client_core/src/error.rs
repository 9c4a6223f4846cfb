use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("callback queue '{label}' is closed and no longer accepts work")]
    Closed { label: String },
    #[error("callback queue '{label}' must be created inside a tokio runtime")]
    NoRuntime { label: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("refusing to move backwards from {from} (stage {from_stage}) to {to} (stage {to_stage})")]
    Regression {
        from: String,
        from_stage: u8,
        to: String,
        to_stage: u8,
    },
}
