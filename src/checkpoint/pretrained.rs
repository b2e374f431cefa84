use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use serde::{Serialize, de::DeserializeOwned};

use super::store::{load_state_dict, save_state_dict};
use crate::{error::Result, nn::Module};

/// File holding a pretrained model's configuration.
pub const CONFIG_NAME: &str = "config.json";
/// File holding a pretrained model's weights.
pub const WEIGHTS_NAME: &str = "model.safetensors";
/// File holding a tokenizer's configuration.
pub const TOKENIZER_CONFIG_NAME: &str = "tokenizer_config.json";

/// A model that can be persisted as a self-describing directory.
pub trait PreTrainedModel: Module {
    type Config: Serialize;

    fn config(&self) -> &Self::Config;

    /// Writes `config.json` and `model.safetensors` into `dir`, creating it if needed.
    ///
    /// # Errors
    /// Any I/O, JSON or serialization error.
    fn save_pretrained(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        write_json(&dir.join(CONFIG_NAME), self.config())?;
        save_state_dict(&self.state_dict(), &dir.join(WEIGHTS_NAME))?;

        info!(
            params = self.num_parameters(false);
            "saved pretrained model to {}",
            dir.display()
        );

        Ok(())
    }

    /// Loads the weights saved by `save_pretrained` into `self`.
    fn load_pretrained_weights(&mut self, dir: &Path, strict: bool) -> Result<()> {
        let state_dict = load_state_dict(&dir.join(WEIGHTS_NAME))?;
        self.load_state_dict(&state_dict, strict)
    }
}

/// A tokenizer that can be persisted next to its model.
pub trait PreTrainedTokenizer {
    /// Writes the tokenizer's files into `dir`, creating it if needed.
    ///
    /// # Returns
    /// The written files.
    fn save_pretrained(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Writes `config` as `tokenizer_config.json` into `dir`, creating it if needed.
pub fn save_tokenizer_config<C: Serialize + ?Sized>(dir: &Path, config: &C) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(TOKENIZER_CONFIG_NAME);
    write_json(&path, config)?;
    Ok(path)
}

/// Reads the `config.json` of a pretrained directory.
pub fn load_pretrained_config<C: DeserializeOwned>(dir: &Path) -> Result<C> {
    let file = File::open(dir.join(CONFIG_NAME))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, value)?;
    w.write_all(b"\n")?;
    w.flush()?;
    Ok(())
}
