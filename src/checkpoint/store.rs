//! State dict persistence in the safetensors format.
//!
//! Tensors are stored as little-endian `F32`. The safetensors header sorts tensors by
//! name, so the original insertion order is kept in the `__metadata__` table and
//! restored on load.

use std::{borrow::Cow, collections::HashMap, fs, path::Path};

use log::debug;
use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors, View, serialize_to_file};

use crate::{
    error::{Result, StrategyErr},
    nn::{ELEMENT_SIZE, StateDict, Tensor},
};

const ORDER_KEY: &str = "order";
const FORMAT_KEY: &str = "format";
const FORMAT: &str = "rlhf";

/// Owned little-endian view over a tensor, ready to be serialized.
struct F32View {
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl F32View {
    fn new(tensor: &Tensor) -> Self {
        let bytes = tensor.iter().flat_map(|v| v.to_le_bytes()).collect();

        Self {
            shape: tensor.shape().to_vec(),
            bytes,
        }
    }
}

impl View for F32View {
    fn dtype(&self) -> Dtype {
        Dtype::F32
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.bytes)
    }

    fn data_len(&self) -> usize {
        self.bytes.len()
    }
}

/// Writes `state_dict` to `path`, creating parent directories as needed.
///
/// # Errors
/// Any I/O, serialization or JSON error.
pub fn save_state_dict(state_dict: &StateDict, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let order: Vec<&str> = state_dict.keys().collect();
    let metadata = HashMap::from([
        (ORDER_KEY.to_string(), serde_json::to_string(&order)?),
        (FORMAT_KEY.to_string(), FORMAT.to_string()),
    ]);

    let views = state_dict.iter().map(|(name, t)| (name, F32View::new(t)));
    serialize_to_file(views, &Some(metadata), path)?;

    debug!(
        tensors = state_dict.len(),
        bytes = state_dict.nbytes();
        "saved state dict to {}",
        path.display()
    );

    Ok(())
}

/// Reads a state dict written by `save_state_dict`, or any safetensors file holding
/// only `F32` tensors.
///
/// Tensors named by the stored order come first, in that order; any other tensor
/// follows, sorted by name.
///
/// # Errors
/// * Any I/O or parse error.
/// * `StrategyErr::UnsupportedDtype` if a tensor isn't `F32`.
pub fn load_state_dict(path: &Path) -> Result<StateDict> {
    let buf = fs::read(path)?;
    let (_, metadata) = SafeTensors::read_metadata(&buf)?;
    let tensors = SafeTensors::deserialize(&buf)?;

    let stored_order = metadata
        .metadata()
        .as_ref()
        .and_then(|m| m.get(ORDER_KEY))
        .map(|s| serde_json::from_str::<Vec<String>>(s))
        .transpose()?;

    let mut names = stored_order.unwrap_or_default();
    let mut leftovers: Vec<String> = tensors
        .names()
        .into_iter()
        .filter(|name| !names.contains(*name))
        .cloned()
        .collect();
    leftovers.sort();

    // Tensors the stored order doesn't name still load, after the ordered ones.
    names.extend(leftovers);

    let mut state_dict = StateDict::new();
    for name in names {
        let view = tensors.tensor(&name)?;

        if view.dtype() != Dtype::F32 {
            return Err(StrategyErr::UnsupportedDtype {
                name,
                dtype: format!("{:?}", view.dtype()),
            });
        }

        let values: Vec<f32> = view
            .data()
            .chunks_exact(ELEMENT_SIZE)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let got = values.len();
        let tensor = ArrayD::from_shape_vec(IxDyn(view.shape()), values).map_err(|_| {
            StrategyErr::ShapeMismatch {
                name: name.clone(),
                got: vec![got],
                expected: view.shape().to_vec(),
            }
        })?;

        state_dict.insert(name, tensor);
    }

    debug!(tensors = state_dict.len(); "loaded state dict from {}", path.display());

    Ok(state_dict)
}
