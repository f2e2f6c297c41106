//! Per-bin running aggregates
//!
//! Folding and merging are associative and commutative over counts. Sums are
//! floating point, so the executor always merges partials in batch order to
//! keep results bit-identical across runs.

/// Running state for one bin
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupAccumulator {
    pub count: u64,
    pub glucose_sum: f64,
    pub age_sum: f64,
}

impl GroupAccumulator {
    /// Folds one row into the accumulator
    pub fn fold(&mut self, glucose: f64, age: f64) {
        self.count += 1;
        self.glucose_sum += glucose;
        self.age_sum += age;
    }

    /// Adds another accumulator's state into this one
    pub fn merge(&mut self, other: &GroupAccumulator) {
        self.count += other.count;
        self.glucose_sum += other.glucose_sum;
        self.age_sum += other.age_sum;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mean glucose, or `None` for an empty bin
    pub fn avg_glucose(&self) -> Option<f64> {
        (self.count > 0).then(|| self.glucose_sum / self.count as f64)
    }

    /// Mean age, or `None` for an empty bin
    pub fn avg_age(&self) -> Option<f64> {
        (self.count > 0).then(|| self.age_sum / self.count as f64)
    }
}

/// Accumulators indexed by bin rank, created on first observation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatorSet {
    slots: Vec<Option<GroupAccumulator>>,
}

impl AccumulatorSet {
    pub fn new(num_bins: usize) -> Self {
        Self {
            slots: vec![None; num_bins],
        }
    }

    /// Folds one row into the bin at `rank`
    pub fn fold(&mut self, rank: usize, glucose: f64, age: f64) {
        self.slot_mut(rank).fold(glucose, age);
    }

    /// Merges every observed bin of `other` into this set
    pub fn merge(&mut self, other: &AccumulatorSet) {
        for (rank, slot) in other.slots.iter().enumerate() {
            if let Some(acc) = slot {
                self.slot_mut(rank).merge(acc);
            }
        }
    }

    fn slot_mut(&mut self, rank: usize) -> &mut GroupAccumulator {
        if rank >= self.slots.len() {
            self.slots.resize(rank + 1, None);
        }
        self.slots[rank].get_or_insert_with(GroupAccumulator::default)
    }

    pub fn get(&self, rank: usize) -> Option<&GroupAccumulator> {
        self.slots.get(rank).and_then(Option::as_ref)
    }

    /// Observed bins in rank order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &GroupAccumulator)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(rank, slot)| slot.as_ref().map(|acc| (rank, acc)))
    }

    /// Total rows folded across all bins
    pub fn total_count(&self) -> u64 {
        self.iter().map(|(_, acc)| acc.count).sum()
    }
}
