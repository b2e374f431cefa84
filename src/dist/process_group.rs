use std::fmt;

use serde::{Deserialize, Serialize};

use super::DistErr;

/// Collective communication backend requested at init time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Nccl,
    Gloo,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Nccl => f.write_str("nccl"),
            Backend::Gloo => f.write_str("gloo"),
        }
    }
}

/// A set of cooperating processes joined through a rendezvous endpoint.
///
/// Strategies only bootstrap the group; everything after `init_process_group`
/// (collectives, teardown) belongs to the implementation.
#[allow(unused)]
#[trait_variant::make(ProcessGroup: Send)]
pub trait ProcessGroupTemplate {
    /// Joins the group.
    ///
    /// # Arguments
    /// * `backend` - The collective backend to use.
    /// * `init_method` - Rendezvous endpoint, `tcp://[host]:port`.
    /// * `world_size` - Amount of processes in the group.
    /// * `rank` - This process' rank, in `0..world_size`.
    ///
    /// # Returns
    /// An error if the endpoint is malformed, the rank is out of range, the group was
    /// already initialized or the rendezvous fails.
    async fn init_process_group(
        &mut self,
        backend: Backend,
        init_method: &str,
        world_size: usize,
        rank: usize,
    ) -> Result<(), DistErr>;

    /// Binds this process to the accelerator with index `local_rank`.
    fn set_device(&mut self, local_rank: usize) -> Result<(), DistErr>;

    fn is_initialized(&self) -> bool;

    /// This process' rank, once initialized.
    fn rank(&self) -> Option<usize>;

    fn world_size(&self) -> Option<usize>;

    /// Leaves the group. A no-op when not initialized.
    fn destroy(&mut self);
}
