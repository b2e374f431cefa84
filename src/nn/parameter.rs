use ndarray::ArrayD;

use crate::error::{Result, StrategyErr};

/// A dense `f32` tensor of arbitrary rank.
pub type Tensor = ArrayD<f32>;

/// Size in bytes of a single tensor element.
pub const ELEMENT_SIZE: usize = size_of::<f32>();

/// Returns the amount of bytes held by `tensor`.
#[inline]
pub fn tensor_nbytes(tensor: &Tensor) -> usize {
    tensor.len() * ELEMENT_SIZE
}

/// A learnable tensor together with its gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    data: Tensor,
    grad: Option<Tensor>,
    requires_grad: bool,
}

impl Parameter {
    /// Creates a new trainable `Parameter`.
    ///
    /// # Arguments
    /// * `data` - The initial value.
    pub fn new(data: Tensor) -> Self {
        Self {
            data,
            grad: None,
            requires_grad: true,
        }
    }

    /// Creates a new `Parameter` that doesn't track gradients.
    ///
    /// # Arguments
    /// * `data` - The initial value.
    pub fn frozen(data: Tensor) -> Self {
        Self {
            requires_grad: false,
            ..Self::new(data)
        }
    }

    #[inline]
    pub fn data(&self) -> &Tensor {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut Tensor {
        &mut self.data
    }

    #[inline]
    pub fn grad(&self) -> Option<&Tensor> {
        self.grad.as_ref()
    }

    #[inline]
    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }

    /// Enables or disables gradient tracking, dropping any stored gradient when disabled.
    pub fn set_requires_grad(&mut self, requires_grad: bool) {
        self.requires_grad = requires_grad;
        if !requires_grad {
            self.grad = None;
        }
    }

    /// Returns an owned copy of the value, detached from any gradient.
    pub fn detach(&self) -> Tensor {
        self.data.clone()
    }

    #[inline]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        ELEMENT_SIZE
    }

    /// Adds `grad` to the stored gradient.
    ///
    /// Frozen parameters ignore the call.
    ///
    /// # Arguments
    /// * `name` - The parameter's name, used for error reporting.
    /// * `grad` - The incoming gradient.
    ///
    /// # Errors
    /// `StrategyErr::ShapeMismatch` if `grad` doesn't have the parameter's shape.
    pub fn accumulate_grad(&mut self, name: &str, grad: &Tensor) -> Result<()> {
        if !self.requires_grad {
            return Ok(());
        }

        if grad.shape() != self.data.shape() {
            return Err(StrategyErr::ShapeMismatch {
                name: name.to_string(),
                got: grad.shape().to_vec(),
                expected: self.data.shape().to_vec(),
            });
        }

        match &mut self.grad {
            Some(acc) => *acc += grad,
            None => self.grad = Some(grad.clone()),
        }

        Ok(())
    }

    /// Clears the stored gradient.
    #[inline]
    pub fn zero_grad(&mut self) {
        self.grad = None;
    }

    /// Replaces the value, keeping the gradient tracking flag.
    ///
    /// # Errors
    /// `StrategyErr::ShapeMismatch` if `data` doesn't have the current shape.
    pub fn copy_from(&mut self, name: &str, data: &Tensor) -> Result<()> {
        if data.shape() != self.data.shape() {
            return Err(StrategyErr::ShapeMismatch {
                name: name.to_string(),
                got: data.shape().to_vec(),
                expected: self.data.shape().to_vec(),
            });
        }

        self.data.assign(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn ones(shape: &[usize]) -> Tensor {
        ArrayD::ones(IxDyn(shape))
    }

    #[test]
    fn accumulate_grad_sums_successive_calls() {
        let mut p = Parameter::new(ones(&[2, 2]));
        p.accumulate_grad("w", &ones(&[2, 2])).unwrap();
        p.accumulate_grad("w", &ones(&[2, 2])).unwrap();

        assert_eq!(p.grad().unwrap(), &(ones(&[2, 2]) * 2.0));

        p.zero_grad();
        assert!(p.grad().is_none());
    }

    #[test]
    fn frozen_parameter_ignores_gradients() {
        let mut p = Parameter::frozen(ones(&[3]));
        p.accumulate_grad("b", &ones(&[3])).unwrap();
        assert!(p.grad().is_none());
    }

    #[test]
    fn accumulate_grad_rejects_wrong_shape() {
        let mut p = Parameter::new(ones(&[3]));
        let err = p.accumulate_grad("b", &ones(&[4])).unwrap_err();
        assert!(matches!(err, StrategyErr::ShapeMismatch { .. }));
    }

    #[test]
    fn numel_and_element_size() {
        let p = Parameter::new(ones(&[2, 3, 4]));
        assert_eq!(p.numel(), 24);
        assert_eq!(p.element_size(), 4);
        assert_eq!(tensor_nbytes(p.data()), 96);
    }
}
