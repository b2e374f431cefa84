use crate::{
    error::Result,
    nn::{Module, StateDict},
};

/// Applies accumulated gradients to a model's parameters.
///
/// Concrete update rules live outside this crate; strategies only decide when
/// and over which parameters a step runs.
pub trait Optimizer {
    /// Updates the parameters of `model` from their accumulated gradients.
    ///
    /// # Arguments
    /// * `model` - The model whose parameters are updated.
    ///
    /// # Returns
    /// An error if the model's gradients don't match the optimizer's state.
    fn step<M: Module>(&mut self, model: &mut M) -> Result<()>;

    fn zero_grad<M: Module>(&mut self, model: &mut M) {
        model.zero_grad();
    }

    /// Internal state (moments, step counters) keyed by name.
    fn state_dict(&self) -> StateDict {
        StateDict::new()
    }

    fn load_state_dict(&mut self, _state_dict: &StateDict) -> Result<()> {
        Ok(())
    }
}
