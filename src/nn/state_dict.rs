use std::collections::HashMap;

use super::{Module, Tensor, parameter::tensor_nbytes};

/// An insertion-ordered mapping from parameter name to tensor value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateDict {
    entries: Vec<(String, Tensor)>,
    index: HashMap<String, usize>,
}

impl StateDict {
    /// Creates an empty `StateDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `tensor` under `name`.
    ///
    /// Re-inserting an existing name replaces its value and keeps its position.
    ///
    /// # Returns
    /// The previous value under `name`, if any.
    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) -> Option<Tensor> {
        let name = name.into();

        if let Some(&i) = self.index.get(&name) {
            return Some(std::mem::replace(&mut self.entries[i].1, tensor));
        }

        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, tensor));
        None
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.entries.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Total amount of bytes held by every tensor.
    pub fn nbytes(&self) -> usize {
        self.entries.iter().map(|(_, t)| tensor_nbytes(t)).sum()
    }
}

impl IntoIterator for StateDict {
    type Item = (String, Tensor);
    type IntoIter = std::vec::IntoIter<(String, Tensor)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<S: Into<String>> FromIterator<(S, Tensor)> for StateDict {
    fn from_iter<I: IntoIterator<Item = (S, Tensor)>>(iter: I) -> Self {
        let mut sd = Self::new();
        for (name, t) in iter {
            sd.insert(name, t);
        }
        sd
    }
}

/// Collects the detached values of the parameters of `model` that require gradients.
///
/// Order follows `model.named_parameters()`; buffers are never included.
pub fn grad_required_state_dict<M: Module>(model: &M) -> StateDict {
    model
        .named_parameters()
        .filter(|(_, p)| p.requires_grad())
        .map(|(name, p)| (name, p.detach()))
        .collect()
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn filled(v: f32, n: usize) -> Tensor {
        ArrayD::from_elem(IxDyn(&[n]), v)
    }

    #[test]
    fn insert_keeps_first_position_on_replace() {
        let mut sd = StateDict::new();
        sd.insert("a", filled(1.0, 1));
        sd.insert("b", filled(2.0, 1));
        let prev = sd.insert("a", filled(3.0, 1));

        assert_eq!(prev, Some(filled(1.0, 1)));
        assert_eq!(sd.keys().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(sd.get("a"), Some(&filled(3.0, 1)));
        assert_eq!(sd.len(), 2);
    }

    #[test]
    fn nbytes_sums_every_tensor() {
        let sd: StateDict = [("a", filled(0.0, 3)), ("b", filled(0.0, 5))]
            .into_iter()
            .collect();
        assert_eq!(sd.nbytes(), 32);
    }
}
