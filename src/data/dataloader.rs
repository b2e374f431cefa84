use std::num::NonZeroUsize;

use log::debug;
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::ReplayBuffer;
use crate::error::{Result, StrategyErr};

/// Batches a replay buffer, reshuffling on every epoch.
#[derive(Debug)]
pub struct DataLoader<'a, B: ReplayBuffer> {
    buffer: &'a B,
    batch_size: NonZeroUsize,
    shuffle: bool,
    drop_last: bool,
    pin_memory: bool,
    rng: StdRng,
}

impl<'a, B: ReplayBuffer> DataLoader<'a, B> {
    /// Creates a sequential, non-dropping `DataLoader`.
    ///
    /// # Arguments
    /// * `buffer` - The buffer to batch over.
    /// * `batch_size` - Items per batch.
    ///
    /// # Errors
    /// `StrategyErr::InvalidConfig` if `batch_size` is zero.
    pub fn new(buffer: &'a B, batch_size: usize) -> Result<Self> {
        let batch_size = NonZeroUsize::new(batch_size)
            .ok_or_else(|| StrategyErr::InvalidConfig("batch_size must be > 0".into()))?;

        Ok(Self {
            buffer,
            batch_size,
            shuffle: false,
            drop_last: false,
            pin_memory: false,
            rng: StdRng::from_os_rng(),
        })
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_drop_last(mut self, drop_last: bool) -> Self {
        self.drop_last = drop_last;
        self
    }

    /// Marks batches as destined for page-locked host memory.
    ///
    /// Host tensors are already plain heap buffers, so the flag is only carried for
    /// device-aware consumers.
    pub fn with_pin_memory(mut self, pin_memory: bool) -> Self {
        self.pin_memory = pin_memory;
        self
    }

    /// Reseeds the shuffling RNG, making epoch permutations reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    #[inline]
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    #[inline]
    pub fn drop_last(&self) -> bool {
        self.drop_last
    }

    #[inline]
    pub fn pin_memory(&self) -> bool {
        self.pin_memory
    }

    #[inline]
    pub fn buffer(&self) -> &'a B {
        self.buffer
    }

    /// Number of batches a full epoch yields.
    pub fn len(&self) -> usize {
        let n = self.buffer.len();
        let bs = self.batch_size.get();

        if self.drop_last {
            n / bs
        } else {
            n.div_ceil(bs)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new epoch.
    ///
    /// The index order is fixed when this is called; the returned iterator only
    /// borrows the buffer.
    pub fn iter(&mut self) -> Batches<'a, B> {
        let mut indices: Vec<usize> = (0..self.buffer.len()).collect();
        if self.shuffle {
            indices.shuffle(&mut self.rng);
        }

        if self.drop_last {
            let full = indices.len() - indices.len() % self.batch_size.get();
            indices.truncate(full);
        }

        debug!(
            items = indices.len(),
            batch_size = self.batch_size.get(),
            shuffle = self.shuffle;
            "starting dataloader epoch"
        );

        Batches {
            buffer: self.buffer,
            indices,
            batch_size: self.batch_size.get(),
            cursor: 0,
        }
    }
}

impl<'a, 'l, B: ReplayBuffer> IntoIterator for &'l mut DataLoader<'a, B> {
    type Item = B::Batch;
    type IntoIter = Batches<'a, B>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// The batches of a single epoch.
pub struct Batches<'a, B: ReplayBuffer> {
    buffer: &'a B,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<B: ReplayBuffer> Iterator for Batches<'_, B> {
    type Item = B::Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let items = self.indices[self.cursor..end]
            .iter()
            .map(|&i| self.buffer.get(i))
            .collect();

        self.cursor = end;
        Some(self.buffer.collate(items))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.indices.len() - self.cursor).div_ceil(self.batch_size);
        (left, Some(left))
    }
}

impl<B: ReplayBuffer> ExactSizeIterator for Batches<'_, B> {}
