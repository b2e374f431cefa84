mod backward;
mod module;
mod parameter;
mod state_dict;

pub use backward::Backward;
pub use module::{Module, ParamDict};
pub use parameter::{ELEMENT_SIZE, Parameter, Tensor, tensor_nbytes};
pub use state_dict::{StateDict, grad_required_state_dict};
