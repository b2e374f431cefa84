pub mod dataloader;
pub mod replay_buffer;
pub mod sampler;

pub use dataloader::{Batches, DataLoader};
pub use replay_buffer::ReplayBuffer;
pub use sampler::DistributedSampler;
