use std::{env, path::Path};

use log::{debug, info, warn};

use super::{ShardConfig, StateDictShards, Strategy};
use crate::{
    checkpoint::{PreTrainedModel, PreTrainedTokenizer},
    config::StrategyConfig,
    data::{DataLoader, ReplayBuffer},
    dist::{DistEnv, DistErr, ProcessGroup},
    error::Result,
    nn::{Backward, Module, grad_required_state_dict},
    optim::Optimizer,
};

/// Strategy for a single accelerator. No parallelism is used.
///
/// When the process was started by a distributed launcher it still joins the
/// process group, so it can run next to other ranks (e.g. one model per rank),
/// but it never shards or synchronizes anything itself.
#[derive(Debug)]
pub struct NaiveStrategy<P> {
    process_group: P,
    config: StrategyConfig,
}

impl<P: ProcessGroup> NaiveStrategy<P> {
    /// Creates a new `NaiveStrategy` without touching the process group.
    ///
    /// # Arguments
    /// * `process_group` - The group joined by `setup_distributed`.
    /// * `config` - Strategy knobs.
    pub fn new(process_group: P, config: StrategyConfig) -> Self {
        Self {
            process_group,
            config,
        }
    }

    /// Creates a new `NaiveStrategy` and joins the launcher's process group, if any.
    pub async fn launch(process_group: P, config: StrategyConfig) -> Result<Self> {
        let mut strategy = Self::new(process_group, config);
        strategy.try_init_dist(false).await?;
        Ok(strategy)
    }

    #[inline]
    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    #[inline]
    pub fn process_group(&self) -> &P {
        &self.process_group
    }

    #[inline]
    pub fn process_group_mut(&mut self) -> &mut P {
        &mut self.process_group
    }

    /// Joins the process group described by the process environment.
    ///
    /// See `try_init_dist_with`.
    pub async fn try_init_dist(&mut self, force: bool) -> Result<bool> {
        self.try_init_dist_with(force, |var| env::var(var).ok()).await
    }

    /// Joins the process group described by the launcher variables `lookup` returns.
    ///
    /// # Arguments
    /// * `force` - Whether failing to join is an error.
    /// * `lookup` - Source of the launcher variables.
    ///
    /// # Returns
    /// Whether the process group was joined. Without `force` every failure is logged
    /// and reported as `false`. A group joined before `set_device` fails is destroyed,
    /// so `false` always means no group.
    ///
    /// # Errors
    /// Only with `force`:
    /// * `DistErr::MissingEnv` naming the first absent launcher variable.
    /// * Any other failure, unchanged.
    pub async fn try_init_dist_with<F>(&mut self, force: bool, lookup: F) -> Result<bool>
    where
        F: Fn(&str) -> Option<String>,
    {
        let outcome = match DistEnv::from_lookup(lookup) {
            Ok(env) => self.init_dist(&env).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => Ok(true),
            Err(e) if force => Err(e.into()),
            Err(DistErr::MissingEnv { var }) => {
                info!("{var} is not set, running without a process group");
                Ok(false)
            }
            Err(e) => {
                warn!("distributed init failed, running without a process group: {e}");
                Ok(false)
            }
        }
    }

    async fn init_dist(&mut self, env: &DistEnv) -> std::result::Result<(), DistErr> {
        let init_method = env.init_method();
        debug!(
            rank = env.rank,
            local_rank = env.local_rank,
            world_size = env.world_size;
            "initializing process group at {init_method}"
        );

        self.process_group
            .init_process_group(self.config.backend, &init_method, env.world_size, env.rank)
            .await?;

        if let Err(e) = self.process_group.set_device(env.local_rank) {
            self.process_group.destroy();
            return Err(e);
        }

        Ok(())
    }
}

impl<P: ProcessGroup + Send> Strategy for NaiveStrategy<P> {
    fn name(&self) -> &'static str {
        "naive"
    }

    async fn setup_distributed(&mut self) -> Result<()> {
        self.try_init_dist(false).await.map(|_| ())
    }

    fn is_rank0(&self) -> bool {
        self.process_group.rank().is_none_or(|rank| rank == 0)
    }

    fn backward<M, L, O>(&self, loss: L, model: &mut M, _optimizer: &mut O) -> Result<()>
    where
        M: Module,
        L: Backward<M>,
        O: Optimizer,
    {
        loss.backward(model)
    }

    fn setup_dataloader<'a, B: ReplayBuffer>(
        &self,
        buffer: &'a B,
        pin_memory: bool,
    ) -> Result<DataLoader<'a, B>> {
        let loader = DataLoader::new(buffer, buffer.sample_batch_size())?
            .with_shuffle(true)
            .with_drop_last(true)
            .with_pin_memory(pin_memory);

        Ok(match self.config.seed {
            Some(seed) => loader.with_seed(seed),
            None => loader,
        })
    }

    /// `only_rank0` is accepted for interface parity; there is a single writer.
    fn save_pretrained<M: PreTrainedModel>(
        &self,
        model: &M,
        path: &Path,
        _only_rank0: bool,
        tokenizer: Option<&dyn PreTrainedTokenizer>,
    ) -> Result<()> {
        let model = self.unwrap_model(model);
        model.save_pretrained(path)?;

        if let Some(tokenizer) = tokenizer {
            tokenizer.save_pretrained(path)?;
        }

        Ok(())
    }

    fn model_state_dict_shard<M: Module>(
        &self,
        model: &M,
        config: ShardConfig,
    ) -> StateDictShards {
        let model = self.unwrap_model(model);
        let state_dict = if config.requires_grad_only {
            grad_required_state_dict(model)
        } else {
            model.state_dict()
        };

        StateDictShards::new(state_dict, config.shard_size)
    }
}
