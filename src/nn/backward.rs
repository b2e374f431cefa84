use super::Module;
use crate::error::Result;

/// A differentiable scalar that knows how to push its gradient into a model.
///
/// Implementations accumulate into the parameters of `model` that require gradients,
/// leaving frozen parameters untouched.
pub trait Backward<M: Module> {
    fn backward(self, model: &mut M) -> Result<()>;
}

impl<M, F> Backward<M> for F
where
    M: Module,
    F: FnOnce(&mut M) -> Result<()>,
{
    fn backward(self, model: &mut M) -> Result<()> {
        self(model)
    }
}
