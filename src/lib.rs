pub mod checkpoint;
pub mod config;
pub mod data;
pub mod dist;
pub mod error;
pub mod nn;
pub mod optim;
pub mod strategies;

pub use config::StrategyConfig;
pub use error::{Result, StrategyErr};
pub use strategies::{NaiveStrategy, ShardConfig, StateDictShards, Strategy};
