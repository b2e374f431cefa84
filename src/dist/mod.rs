mod env;
mod error;
mod frame;
mod process_group;
mod tcp;

pub use env::{
    DistEnv, LAUNCHER_VARS, LOCAL_RANK, MASTER_ADDR, MASTER_PORT, RANK, WORLD_SIZE,
};
pub use error::DistErr;
pub use process_group::{Backend, ProcessGroup, ProcessGroupTemplate};
pub use tcp::{DEFAULT_INIT_TIMEOUT, TcpProcessGroup, parse_init_method};
