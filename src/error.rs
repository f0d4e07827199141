use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecError {
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),

    #[error("non-finite values in {0}")]
    NonFinite(&'static str),

    #[error("{0} used before initialization")]
    NotInitialized(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to decode checkpoint: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] prost::EncodeError),
}

impl DecError {
    pub fn shape(context: &'static str, expected: &[usize], actual: &[usize]) -> Self {
        DecError::ShapeMismatch {
            context,
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        DecError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DecError>;
