use crate::nn::{StateDict, Tensor, tensor_nbytes};

/// Selects which tensors go into a state dict export and how it is split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardConfig {
    /// Export only parameters that require gradients.
    pub requires_grad_only: bool,
    /// Byte threshold at which a shard is flushed. `None` exports a single shard;
    /// `Some(0)` puts every tensor in its own shard.
    pub shard_size: Option<usize>,
}

impl ShardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requires_grad_only(mut self, requires_grad_only: bool) -> Self {
        self.requires_grad_only = requires_grad_only;
        self
    }

    /// Sets the flush threshold in bytes.
    pub fn with_shard_size(mut self, bytes: usize) -> Self {
        self.shard_size = Some(bytes);
        self
    }
}

/// Lazily splits a state dict into consecutive shards.
///
/// Entries are added to the current shard in order; once the shard's accumulated
/// size reaches the threshold it is yielded, so a shard may overshoot the threshold
/// by its last tensor. A trailing shard is yielded whenever it holds any entry.
#[derive(Debug)]
pub struct StateDictShards {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Whole(Option<StateDict>),
    Chunked {
        entries: std::vec::IntoIter<(String, Tensor)>,
        limit: usize,
    },
}

impl StateDictShards {
    pub fn new(state_dict: StateDict, shard_size: Option<usize>) -> Self {
        let source = match shard_size {
            None => Source::Whole(Some(state_dict)),
            Some(limit) => Source::Chunked {
                entries: state_dict.into_iter(),
                limit,
            },
        };

        Self { source }
    }
}

impl Iterator for StateDictShards {
    type Item = StateDict;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Whole(sd) => sd.take(),
            Source::Chunked { entries, limit } => {
                let mut shard = StateDict::new();
                let mut accumulated = 0;

                for (name, tensor) in entries.by_ref() {
                    accumulated += tensor_nbytes(&tensor);
                    shard.insert(name, tensor);

                    if accumulated >= *limit {
                        return Some(shard);
                    }
                }

                (!shard.is_empty()).then_some(shard)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    fn sized(sizes: &[usize]) -> StateDict {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &n)| (format!("p{i}"), ArrayD::zeros(IxDyn(&[n]))))
            .collect()
    }

    fn keys(shards: StateDictShards) -> Vec<Vec<String>> {
        shards
            .map(|s| s.keys().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn without_shard_size_yields_whole_dict_once() {
        let shards: Vec<_> = StateDictShards::new(sized(&[1, 2, 3]), None).collect();
        assert_eq!(shards.len(), 1);
        assert_eq!(shards[0].len(), 3);
    }

    #[test]
    fn empty_dict_without_shard_size_is_still_yielded() {
        let shards: Vec<_> = StateDictShards::new(StateDict::new(), None).collect();
        assert_eq!(shards, vec![StateDict::new()]);
    }

    #[test]
    fn flushes_when_threshold_is_reached() {
        // 4 bytes per element: 8, 8, 16, 4 bytes against a 16 byte threshold.
        let limit = Some(16);
        let got = keys(StateDictShards::new(sized(&[2, 2, 4, 1]), limit));

        assert_eq!(got, vec![vec!["p0", "p1"], vec!["p2"], vec!["p3"]]);
    }

    #[test]
    fn oversized_tensor_gets_its_own_shard() {
        let limit = Some(8);
        let got = keys(StateDictShards::new(sized(&[100, 1]), limit));

        assert_eq!(got, vec![vec!["p0"], vec!["p1"]]);
    }

    #[test]
    fn zero_sized_tail_is_not_lost() {
        let limit = Some(4);
        let got = keys(StateDictShards::new(sized(&[1, 0]), limit));

        assert_eq!(got, vec![vec!["p0"], vec!["p1"]]);
    }

    #[test]
    fn zero_shard_size_puts_every_tensor_in_its_own_shard() {
        let config = ShardConfig::new().with_shard_size(0);
        let got = keys(StateDictShards::new(sized(&[1, 2, 3]), config.shard_size));

        assert_eq!(got, vec![vec!["p0"], vec!["p1"], vec!["p2"]]);
    }

    #[test]
    fn empty_dict_with_shard_size_yields_nothing() {
        let limit = Some(4);
        assert_eq!(StateDictShards::new(StateDict::new(), limit).count(), 0);
    }
}
