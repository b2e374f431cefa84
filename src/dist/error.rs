use std::{error::Error, fmt, io, num::ParseIntError};

/// Failures while bootstrapping or using a process group.
#[derive(Debug)]
pub enum DistErr {
    /// A required launcher variable isn't set.
    MissingEnv { var: &'static str },
    /// A launcher variable is set but can't be parsed.
    InvalidEnv {
        var: &'static str,
        value: String,
        source: ParseIntError,
    },
    /// The rendezvous endpoint isn't of the form `tcp://[host]:port`.
    InvalidInitMethod(String),
    /// `rank` isn't smaller than `world_size`, or `world_size` is zero.
    InvalidRank { rank: usize, world_size: usize },
    AlreadyInitialized,
    NotInitialized,
    /// A peer broke the rendezvous protocol.
    Protocol(String),
    /// The master didn't become reachable in time.
    Timeout { addr: String },
    Io(io::Error),
    Frame(serde_json::Error),
}

impl fmt::Display for DistErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingEnv { var } => write!(
                f,
                "could not find {var} in the environment, launch every process with a \
                 distributed launcher that sets RANK, LOCAL_RANK, WORLD_SIZE, MASTER_ADDR \
                 and MASTER_PORT"
            ),
            Self::InvalidEnv { var, value, source } => {
                write!(f, "invalid value {value:?} for {var}: {source}")
            }
            Self::InvalidInitMethod(method) => {
                write!(f, "invalid init method {method:?}, expected tcp://[host]:port")
            }
            Self::InvalidRank { rank, world_size } => {
                write!(f, "invalid rank {rank} for world size {world_size}")
            }
            Self::AlreadyInitialized => write!(f, "process group is already initialized"),
            Self::NotInitialized => write!(f, "process group is not initialized"),
            Self::Protocol(msg) => write!(f, "rendezvous protocol error: {msg}"),
            Self::Timeout { addr } => write!(f, "timed out waiting for master at {addr}"),
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Frame(e) => write!(f, "malformed rendezvous frame: {e}"),
        }
    }
}

impl Error for DistErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEnv { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Frame(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DistErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for DistErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Frame(value)
    }
}
