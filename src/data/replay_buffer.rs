/// A map-style store of experiences that a `DataLoader` can batch over.
///
/// Sampling policy (what gets stored, when it gets evicted) is the buffer's own
/// business; loaders only need random access and a way to stack items.
pub trait ReplayBuffer {
    type Item;
    type Batch;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an owned copy of the item at `idx`.
    ///
    /// # Panics
    /// May panic if `idx >= self.len()`.
    fn get(&self, idx: usize) -> Self::Item;

    /// The amount of items a training step consumes.
    fn sample_batch_size(&self) -> usize;

    /// Stacks `items` into a single training batch.
    fn collate(&self, items: Vec<Self::Item>) -> Self::Batch;
}
