use std::num::NonZeroUsize;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::dist::DistErr;

/// Splits the indices of a dataset among replicas.
///
/// Properties:
/// - Every replica receives the same amount of indices.
/// - Without `drop_last`, the index list wraps around to pad the tail, so some
///   indices are seen twice per epoch. With it, the tail is truncated instead.
/// - All replicas sharing `seed` and `epoch` agree on the permutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedSampler {
    len: usize,
    num_replicas: NonZeroUsize,
    rank: usize,
    shuffle: bool,
    drop_last: bool,
    seed: u64,
    epoch: u64,
}

impl DistributedSampler {
    /// Creates a shuffling, padding `DistributedSampler`.
    ///
    /// # Errors
    /// `DistErr::InvalidRank` if `rank >= num_replicas`.
    pub fn new(len: usize, num_replicas: NonZeroUsize, rank: usize) -> Result<Self, DistErr> {
        if rank >= num_replicas.get() {
            return Err(DistErr::InvalidRank {
                rank,
                world_size: num_replicas.get(),
            });
        }

        Ok(Self {
            len,
            num_replicas,
            rank,
            shuffle: true,
            drop_last: false,
            seed: 0,
            epoch: 0,
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

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Selects the permutation used by the next `indices` call.
    pub fn set_epoch(&mut self, epoch: u64) {
        self.epoch = epoch;
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    pub fn num_replicas(&self) -> usize {
        self.num_replicas.get()
    }

    /// Amount of indices every replica receives per epoch.
    pub fn num_samples(&self) -> usize {
        let replicas = self.num_replicas.get();
        if self.drop_last {
            self.len / replicas
        } else {
            self.len.div_ceil(replicas)
        }
    }

    /// Returns this replica's indices for the current epoch.
    pub fn indices(&self) -> Vec<usize> {
        let mut all: Vec<usize> = (0..self.len).collect();
        if self.shuffle {
            let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epoch));
            all.shuffle(&mut rng);
        }

        let total = self.num_samples() * self.num_replicas.get();
        let all: Vec<usize> = all.iter().copied().cycle().take(total).collect();

        all.into_iter()
            .skip(self.rank)
            .step_by(self.num_replicas.get())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replicas(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn single_replica_sees_every_index_once() {
        let s = DistributedSampler::new(10, replicas(1), 0)
            .unwrap()
            .with_seed(3);
        let mut idx = s.indices();
        idx.sort();
        assert_eq!(idx, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn replicas_partition_with_wraparound_padding() {
        // 10 items over 3 replicas => 4 each, 2 padded from the front.
        let parts: Vec<_> = (0..3)
            .map(|r| {
                DistributedSampler::new(10, replicas(3), r)
                    .unwrap()
                    .with_shuffle(false)
                    .indices()
            })
            .collect();

        assert_eq!(parts[0], [0, 3, 6, 9]);
        assert_eq!(parts[1], [1, 4, 7, 0]);
        assert_eq!(parts[2], [2, 5, 8, 1]);
    }

    #[test]
    fn drop_last_truncates_tail() {
        let s = DistributedSampler::new(10, replicas(3), 2)
            .unwrap()
            .with_shuffle(false)
            .with_drop_last(true);
        assert_eq!(s.num_samples(), 3);
        assert_eq!(s.indices(), [2, 5, 8]);
    }

    #[test]
    fn out_of_range_rank_is_rejected() {
        assert!(matches!(
            DistributedSampler::new(10, replicas(2), 2),
            Err(DistErr::InvalidRank {
                rank: 2,
                world_size: 2
            })
        ));
    }

    #[test]
    fn epoch_changes_permutation() {
        let mut s = DistributedSampler::new(64, replicas(1), 0)
            .unwrap()
            .with_seed(11);
        let first = s.indices();
        s.set_epoch(1);
        assert_ne!(first, s.indices());
    }
}
