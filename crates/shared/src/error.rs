use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    #[error("channel id '{raw}' is missing the ':' separator between type and id")]
    MissingSeparator { raw: String },
    #[error("channel id '{raw}' has an empty channel type")]
    EmptyType { raw: String },
    #[error("channel id '{raw}' has an empty id")]
    EmptyId { raw: String },
}
