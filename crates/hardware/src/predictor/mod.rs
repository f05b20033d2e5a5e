//! Off-chip load predictor: a hashed perceptron that forecasts, at
//! L1D-miss time, whether a load will be served from the LLC or from
//! DRAM.
//!
//! Each active feature (`PredictorFeature`) owns its own table of
//! `table_size` signed saturating counters in `[counter_min,
//! counter_max]`. A prediction sums one counter per feature; a sum at
//! or above `threshold` predicts off-chip. Training nudges every
//! feature's contributing counter by +1 (off-chip) or -1 (on-chip)
//! after the load resolves, saturating at the table bounds.

use std::collections::HashMap;

use crate::config::{PredictorConfig, PredictorFeature};

/// XOR-folds `hash` down to `bits` bits by repeatedly halving and
/// XORing, matching the compact indexing trick used throughout branch
/// and load predictors: a wide hash is always derivable, a narrow
/// table index is what's actually stored.
#[must_use]
pub fn folded_xor(mut hash: u64, bits: u32) -> u64 {
    let mut width = 64;
    while width > bits {
        let half = width / 2;
        hash = (hash & ((1u64 << half) - 1)) ^ (hash >> half);
        width = half.max(bits);
        if half <= bits {
            break;
        }
    }
    hash & ((1u64 << bits) - 1)
}

/// A one-at-a-time integer mixing hash (Jenkins-style), used to spread
/// correlated inputs (PCs, addresses) across a table before folding.
#[must_use]
pub fn jenkins_hash(key: u64) -> u64 {
    let mut hash = key;
    hash = hash.wrapping_add(hash << 21);
    hash ^= hash >> 24;
    hash = hash.wrapping_add(hash << 3).wrapping_add(hash << 8);
    hash ^= hash >> 14;
    hash = hash.wrapping_add(hash << 2).wrapping_add(hash << 4);
    hash ^= hash >> 28;
    hash = hash.wrapping_add(hash << 31);
    hash
}

/// The raw values a prediction is computed from, captured once at
/// L1D-miss time so training later uses exactly what was predicted on.
#[derive(Debug, Clone, Copy)]
pub struct PredictorInputs {
    /// Load instruction pointer.
    pub pc: u64,
    /// Offset of the access within its virtual page.
    pub page_offset: u64,
    /// PC of the first access observed to this page (0 if none yet).
    pub first_access_pc: u64,
    /// Word offset of the access within its 64B cache line.
    pub cache_line_word_offset: u64,
    /// Folded signature of the last N load PCs.
    pub last_n_signature: u64,
}

/// Table indices touched by one prediction, frozen for training.
#[derive(Debug, Clone)]
pub struct PredictionSnapshot {
    /// `(feature, index)` pairs whose counters contributed to the sum.
    pub indices: Vec<(PredictorFeature, usize)>,
    /// The summed value compared against the threshold.
    pub sum: i32,
    /// The resulting prediction: `true` means "predict off-chip".
    pub predicted_offchip: bool,
}

/// The hashed-perceptron off-chip predictor.
pub struct OffchipPredictor {
    tables: HashMap<PredictorFeature, Vec<i16>>,
    config: PredictorConfig,
    first_access_by_page: HashMap<u64, u64>,
    last_n_pcs: Vec<u64>,
    correct: u64,
    mispredicted_offchip: u64,
    mispredicted_onchip: u64,
}

impl OffchipPredictor {
    /// Builds a predictor with all-zero counter tables.
    #[must_use]
    pub fn new(config: PredictorConfig) -> Self {
        let mut tables = HashMap::new();
        for feature in &config.features {
            tables.insert(*feature, vec![0i16; config.table_size]);
        }
        Self {
            tables,
            config,
            first_access_by_page: HashMap::new(),
            last_n_pcs: Vec::new(),
            correct: 0,
            mispredicted_offchip: 0,
            mispredicted_onchip: 0,
        }
    }

    /// Records a page access's first-touching PC, if the page hasn't
    /// been observed yet. Used to compute the `PcFirstAccess` and
    /// `OffsetFirstAccess` features.
    pub fn observe_page_access(&mut self, page: u64, pc: u64) {
        self.first_access_by_page.entry(page).or_insert(pc);
    }

    fn index_for(&self, feature: PredictorFeature, inputs: &PredictorInputs) -> usize {
        let bits = self.config.table_size.trailing_zeros().max(1);
        let raw = match feature {
            PredictorFeature::Pc => jenkins_hash(inputs.pc),
            PredictorFeature::PcOffset => jenkins_hash(inputs.pc ^ inputs.page_offset),
            PredictorFeature::PcFirstAccess => jenkins_hash(inputs.pc ^ inputs.first_access_pc),
            PredictorFeature::OffsetFirstAccess => {
                jenkins_hash(inputs.page_offset ^ inputs.first_access_pc)
            }
            PredictorFeature::PcCacheLineWordOffset => {
                jenkins_hash(inputs.pc ^ inputs.cache_line_word_offset)
            }
            PredictorFeature::LastNLoadPcs => jenkins_hash(inputs.last_n_signature),
        };
        (folded_xor(raw, bits) as usize) % self.config.table_size
    }

    /// Folds the last N load PCs into one signature, for the
    /// `LastNLoadPcs` feature.
    fn last_n_signature(&self) -> u64 {
        self.last_n_pcs
            .iter()
            .fold(0u64, |acc, &pc| acc.rotate_left(7) ^ pc)
    }

    /// Builds the feature inputs for a load at `pc` touching
    /// `page_offset` within its page, `cache_line_word_offset` within
    /// its cache line.
    #[must_use]
    pub fn inputs_for(&self, pc: u64, page: u64, page_offset: u64, cache_line_word_offset: u64) -> PredictorInputs {
        PredictorInputs {
            pc,
            page_offset,
            first_access_pc: *self.first_access_by_page.get(&page).unwrap_or(&0),
            cache_line_word_offset,
            last_n_signature: self.last_n_signature(),
        }
    }

    /// Predicts whether this L1D miss will resolve off-chip (DRAM)
    /// rather than from the LLC. Returns a snapshot to be handed back
    /// to `train` once the outcome is known.
    #[must_use]
    pub fn predict(&self, inputs: &PredictorInputs) -> PredictionSnapshot {
        let mut indices = Vec::with_capacity(self.config.features.len());
        let mut sum = 0i32;
        for feature in &self.config.features {
            let idx = self.index_for(*feature, inputs);
            sum += i32::from(self.tables[feature][idx]);
            indices.push((*feature, idx));
        }
        let predicted_offchip = sum >= self.config.threshold;
        PredictionSnapshot {
            indices,
            sum,
            predicted_offchip,
        }
    }

    /// Trains on a resolved load: nudges every contributing counter
    /// towards the observed outcome, saturating at the configured
    /// bounds, and records whether the prediction was correct.
    pub fn train(&mut self, snapshot: &PredictionSnapshot, went_offchip: bool) {
        let delta: i16 = if went_offchip { 1 } else { -1 };
        for (feature, idx) in &snapshot.indices {
            if let Some(table) = self.tables.get_mut(feature) {
                let updated = table[*idx] + delta;
                table[*idx] = updated.clamp(self.config.counter_min, self.config.counter_max);
            }
        }

        match (snapshot.predicted_offchip, went_offchip) {
            (true, true) | (false, false) => self.correct += 1,
            (true, false) => self.mispredicted_offchip += 1,
            (false, true) => self.mispredicted_onchip += 1,
        }
    }

    /// Pushes a retiring load's PC into the last-N-PCs history,
    /// trimming to the configured window.
    pub fn record_load_pc(&mut self, pc: u64) {
        self.last_n_pcs.push(pc);
        if self.last_n_pcs.len() > self.config.last_n_load_pcs {
            self.last_n_pcs.remove(0);
        }
    }

    /// `(correct, false off-chip predictions, false on-chip predictions)`
    /// for the final stats report.
    #[must_use]
    pub fn accuracy_counters(&self) -> (u64, u64, u64) {
        (self.correct, self.mispredicted_offchip, self.mispredicted_onchip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PredictorConfig {
        PredictorConfig {
            features: vec![PredictorFeature::Pc],
            table_size: 64,
            counter_max: 31,
            counter_min: -32,
            threshold: 0,
            last_n_load_pcs: 3,
        }
    }

    #[test]
    fn training_saturates_at_bounds() {
        let mut pred = OffchipPredictor::new(cfg());
        let inputs = pred.inputs_for(0x400, 0x1000, 0x40, 2);
        for _ in 0..200 {
            let snap = pred.predict(&inputs);
            pred.train(&snap, true);
        }
        let snap = pred.predict(&inputs);
        assert_eq!(snap.sum, 31);

        for _ in 0..200 {
            let snap = pred.predict(&inputs);
            pred.train(&snap, false);
        }
        let snap = pred.predict(&inputs);
        assert_eq!(snap.sum, -32);
    }

    #[test]
    fn folded_xor_stays_within_bit_width() {
        let v = folded_xor(0xDEAD_BEEF_0000_1234, 10);
        assert!(v < (1 << 10));
    }
}
