mod base;
mod naive;
mod shard;

pub use base::Strategy;
pub use naive::NaiveStrategy;
pub use shard::{ShardConfig, StateDictShards};
