use std::collections::HashSet;

use super::{Parameter, StateDict, Tensor};
use crate::error::{Result, StrategyErr};

/// A model exposing its learnable parameters and persistent buffers by name.
///
/// Names are stable and unique; iteration order is the model's declaration order and
/// is the order every state dict derived from it follows.
pub trait Module {
    fn named_parameters(&self) -> impl Iterator<Item = (&str, &Parameter)>;

    fn named_parameters_mut(&mut self) -> impl Iterator<Item = (&str, &mut Parameter)>;

    /// Non-learnable tensors that are still part of the model's state.
    fn named_buffers(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        std::iter::empty()
    }

    fn named_buffers_mut(&mut self) -> impl Iterator<Item = (&str, &mut Tensor)> {
        std::iter::empty()
    }

    /// Returns the detached values of every parameter followed by every buffer.
    fn state_dict(&self) -> StateDict {
        let params = self.named_parameters().map(|(name, p)| (name, p.detach()));
        let buffers = self.named_buffers().map(|(name, b)| (name, b.clone()));
        params.chain(buffers).collect()
    }

    /// Copies the values in `state_dict` into the model.
    ///
    /// Every shape is validated before anything is written, so a failed load leaves the
    /// model untouched.
    ///
    /// # Arguments
    /// * `state_dict` - The values to load.
    /// * `strict` - Whether missing or unexpected keys are an error.
    ///
    /// # Errors
    /// * `StrategyErr::ShapeMismatch` if a tensor doesn't match its destination.
    /// * `StrategyErr::StateDictMismatch` if `strict` and the key sets differ.
    fn load_state_dict(&mut self, state_dict: &StateDict, strict: bool) -> Result<()> {
        let mut own = HashSet::new();
        let mut missing = Vec::new();

        let params = self.named_parameters().map(|(name, p)| (name, p.data()));
        for (name, current) in params.chain(self.named_buffers()) {
            own.insert(name.to_string());

            let Some(incoming) = state_dict.get(name) else {
                missing.push(name.to_string());
                continue;
            };

            if incoming.shape() != current.shape() {
                return Err(StrategyErr::ShapeMismatch {
                    name: name.to_string(),
                    got: incoming.shape().to_vec(),
                    expected: current.shape().to_vec(),
                });
            }
        }

        let unexpected: Vec<_> = state_dict
            .keys()
            .filter(|k| !own.contains(*k))
            .map(str::to_string)
            .collect();

        if strict && (!missing.is_empty() || !unexpected.is_empty()) {
            return Err(StrategyErr::StateDictMismatch {
                missing,
                unexpected,
            });
        }

        for (name, p) in self.named_parameters_mut() {
            if let Some(incoming) = state_dict.get(name) {
                p.copy_from(name, incoming)?;
            }
        }

        for (name, b) in self.named_buffers_mut() {
            if let Some(incoming) = state_dict.get(name) {
                b.assign(incoming);
            }
        }

        Ok(())
    }

    fn zero_grad(&mut self) {
        for (_, p) in self.named_parameters_mut() {
            p.zero_grad();
        }
    }

    /// Amount of scalar parameters, optionally counting only trainable ones.
    fn num_parameters(&self, trainable_only: bool) -> usize {
        self.named_parameters()
            .filter(|(_, p)| !trainable_only || p.requires_grad())
            .map(|(_, p)| p.numel())
            .sum()
    }
}

/// An ordered collection of named parameters and buffers.
///
/// The simplest `Module`: flat models, adapters and test fixtures.
#[derive(Debug, Clone, Default)]
pub struct ParamDict {
    params: Vec<(String, Parameter)>,
    buffers: Vec<(String, Tensor)>,
}

impl ParamDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a parameter, builder style.
    pub fn with_param(mut self, name: impl Into<String>, param: Parameter) -> Self {
        self.push_param(name, param);
        self
    }

    /// Appends a buffer, builder style.
    pub fn with_buffer(mut self, name: impl Into<String>, buffer: Tensor) -> Self {
        self.buffers.push((name.into(), buffer));
        self
    }

    pub fn push_param(&mut self, name: impl Into<String>, param: Parameter) {
        self.params.push((name.into(), param));
    }

    pub fn param(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    pub fn param_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        self.params.iter_mut().find(|(n, _)| n == name).map(|(_, p)| p)
    }
}

impl Module for ParamDict {
    fn named_parameters(&self) -> impl Iterator<Item = (&str, &Parameter)> {
        self.params.iter().map(|(n, p)| (n.as_str(), p))
    }

    fn named_parameters_mut(&mut self) -> impl Iterator<Item = (&str, &mut Parameter)> {
        self.params.iter_mut().map(|(n, p)| (n.as_str(), p))
    }

    fn named_buffers(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.buffers.iter().map(|(n, b)| (n.as_str(), b))
    }

    fn named_buffers_mut(&mut self) -> impl Iterator<Item = (&str, &mut Tensor)> {
        self.buffers.iter_mut().map(|(n, b)| (n.as_str(), b))
    }
}
