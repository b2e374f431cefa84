use std::{error::Error, fmt, io};

use safetensors::SafeTensorError;

use crate::dist::DistErr;

/// The crate's result type.
pub type Result<T> = std::result::Result<T, StrategyErr>;

/// Failures surfaced by strategies and the framework surface they wrap.
#[derive(Debug)]
pub enum StrategyErr {
    /// Distributed bootstrapping failed.
    Dist(DistErr),
    /// A filesystem operation failed while saving or loading.
    Io(io::Error),
    /// A safetensors file could not be written or parsed.
    Safetensors(SafeTensorError),
    /// A JSON document (config, tokenizer) could not be written or parsed.
    Json(serde_json::Error),
    /// A tensor does not have the shape its destination expects.
    ShapeMismatch {
        name: String,
        got: Vec<usize>,
        expected: Vec<usize>,
    },
    /// A strict state dict load found missing or unexpected keys.
    StateDictMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    /// A checkpoint holds a tensor with a dtype other than `F32`.
    UnsupportedDtype { name: String, dtype: String },
    /// Invalid configuration.
    InvalidConfig(String),
}

impl fmt::Display for StrategyErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dist(e) => write!(f, "distributed init error: {e}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Safetensors(e) => write!(f, "safetensors error: {e}"),
            Self::Json(e) => write!(f, "json error: {e}"),
            Self::ShapeMismatch {
                name,
                got,
                expected,
            } => write!(
                f,
                "shape mismatch for {name}: got {got:?}, expected {expected:?}"
            ),
            Self::StateDictMismatch {
                missing,
                unexpected,
            } => write!(
                f,
                "state dict mismatch, missing keys: {missing:?}, unexpected keys: {unexpected:?}"
            ),
            Self::UnsupportedDtype { name, dtype } => {
                write!(f, "tensor {name} has unsupported dtype {dtype}, expected F32")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl Error for StrategyErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Dist(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::Safetensors(e) => Some(e),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DistErr> for StrategyErr {
    fn from(value: DistErr) -> Self {
        Self::Dist(value)
    }
}

impl From<io::Error> for StrategyErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SafeTensorError> for StrategyErr {
    fn from(value: SafeTensorError) -> Self {
        Self::Safetensors(value)
    }
}

impl From<serde_json::Error> for StrategyErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
