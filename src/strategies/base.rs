use std::{num::NonZeroUsize, path::Path};

use crate::{
    checkpoint::{self, PreTrainedModel, PreTrainedTokenizer},
    data::{DataLoader, DistributedSampler, ReplayBuffer},
    error::Result,
    nn::{Backward, Module},
    optim::Optimizer,
};

use super::{ShardConfig, StateDictShards};

/// How training computation is laid out over accelerators.
///
/// A strategy owns distributed bootstrapping and decides how the primitives of a
/// training step (backward, optimizer step, data loading, checkpointing) run under
/// its layout. Trainers only talk to models through it.
pub trait Strategy {
    /// A stable identifier for the strategy kind.
    fn name(&self) -> &'static str;

    /// Joins the process group described by the launcher environment, if any.
    fn setup_distributed(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether this process should perform rank-0-only side effects.
    fn is_rank0(&self) -> bool;

    /// Backpropagates `loss` into `model`.
    fn backward<M, L, O>(&self, loss: L, model: &mut M, optimizer: &mut O) -> Result<()>
    where
        M: Module,
        L: Backward<M>,
        O: Optimizer;

    fn optimizer_step<M, O>(&self, optimizer: &mut O, model: &mut M) -> Result<()>
    where
        M: Module,
        O: Optimizer,
    {
        optimizer.step(model)
    }

    /// Builds the loader a trainer iterates over for one update round.
    fn setup_dataloader<'a, B: ReplayBuffer>(
        &self,
        buffer: &'a B,
        pin_memory: bool,
    ) -> Result<DataLoader<'a, B>>;

    /// Wraps `model` for this strategy's layout.
    fn prepare<M: Module>(&self, model: M) -> M {
        model
    }

    /// Returns the plain model behind whatever `prepare` wrapped it in.
    fn unwrap_model<'m, M: Module>(&self, model: &'m M) -> &'m M {
        model
    }

    /// Writes the model's full state dict to `path`.
    ///
    /// With `only_rank0`, non-zero ranks skip the write.
    fn save_model<M: Module>(&self, model: &M, path: &Path, only_rank0: bool) -> Result<()> {
        if only_rank0 && !self.is_rank0() {
            return Ok(());
        }

        checkpoint::save_state_dict(&self.unwrap_model(model).state_dict(), path)
    }

    fn load_model<M: Module>(&self, model: &mut M, path: &Path, strict: bool) -> Result<()> {
        let state_dict = checkpoint::load_state_dict(path)?;
        model.load_state_dict(&state_dict, strict)
    }

    fn save_optimizer<O: Optimizer>(
        &self,
        optimizer: &O,
        path: &Path,
        only_rank0: bool,
    ) -> Result<()> {
        if only_rank0 && !self.is_rank0() {
            return Ok(());
        }

        checkpoint::save_state_dict(&optimizer.state_dict(), path)
    }

    fn load_optimizer<O: Optimizer>(&self, optimizer: &mut O, path: &Path) -> Result<()> {
        let state_dict = checkpoint::load_state_dict(path)?;
        optimizer.load_state_dict(&state_dict)
    }

    /// Splits `len` dataset indices among this strategy's data-parallel replicas.
    fn setup_sampler(&self, len: usize) -> Result<DistributedSampler> {
        Ok(DistributedSampler::new(len, NonZeroUsize::MIN, 0)?)
    }

    /// Persists `model`, and `tokenizer` if given, as a pretrained directory at `path`.
    fn save_pretrained<M: PreTrainedModel>(
        &self,
        model: &M,
        path: &Path,
        only_rank0: bool,
        tokenizer: Option<&dyn PreTrainedTokenizer>,
    ) -> Result<()>;

    /// Exports the model's state dict in shards.
    fn model_state_dict_shard<M: Module>(&self, model: &M, config: ShardConfig)
    -> StateDictShards;
}
