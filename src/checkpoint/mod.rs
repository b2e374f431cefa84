mod pretrained;
mod store;

pub use pretrained::{
    CONFIG_NAME, PreTrainedModel, PreTrainedTokenizer, TOKENIZER_CONFIG_NAME, WEIGHTS_NAME,
    load_pretrained_config, save_tokenizer_config,
};
pub use store::{load_state_dict, save_state_dict};
