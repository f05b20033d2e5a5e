//! Simulation statistics: heartbeat progress lines and the final
//! multi-section report (summary, memory hierarchy, predictor).

use tracing::info;

use crate::cache::sector::CacheStats;

/// Per-CPU instruction/cycle counters and heartbeat cadence.
#[derive(Debug, Default, Clone, Copy)]
pub struct CoreStats {
    /// Instructions retired since the start of measurement.
    pub instructions: u64,
    /// Cycles elapsed since the start of measurement.
    pub cycles: u64,
    /// Instructions retired as of the last heartbeat line.
    last_heartbeat_instructions: u64,
    /// Cycles elapsed as of the last heartbeat line.
    last_heartbeat_cycles: u64,
}

impl CoreStats {
    /// Instructions-per-cycle since the start of measurement.
    #[must_use]
    pub fn ipc(&self) -> f64 {
        if self.cycles == 0 {
            0.0
        } else {
            self.instructions as f64 / self.cycles as f64
        }
    }

    /// Emits a heartbeat line if `heartbeat_instructions` have retired
    /// since the last one, and resets the interval counters.
    pub fn maybe_heartbeat(&mut self, cpu: u8, heartbeat_instructions: u64) {
        if self.instructions - self.last_heartbeat_instructions < heartbeat_instructions {
            return;
        }
        let interval_instructions = self.instructions - self.last_heartbeat_instructions;
        let interval_cycles = self.cycles - self.last_heartbeat_cycles;
        let interval_ipc = if interval_cycles == 0 {
            0.0
        } else {
            interval_instructions as f64 / interval_cycles as f64
        };
        info!(
            cpu,
            instructions = self.instructions,
            cycles = self.cycles,
            ipc = self.ipc(),
            interval_ipc,
            "heartbeat"
        );
        self.last_heartbeat_instructions = self.instructions;
        self.last_heartbeat_cycles = self.cycles;
    }
}

/// Aggregated statistics for the final report, gathered once
/// measurement ends.
#[derive(Debug, Default)]
pub struct SimStats {
    /// Per-CPU core statistics.
    pub cores: Vec<CoreStats>,
    /// Per-cache-level statistics, in hierarchy order.
    pub caches: Vec<(String, CacheStats)>,
    /// `(row-buffer hits, row-buffer misses)`.
    pub dram_row_buffer: (u64, u64),
    /// `(correct, mispredicted-offchip, mispredicted-onchip)`.
    pub predictor_accuracy: (u64, u64, u64),
    /// Total cycles the simulation ran.
    pub total_cycles: u64,
}

impl SimStats {
    /// Logs the final multi-section report at `info` level: a summary
    /// section (IPC per core), a memory section (per-cache hit rates),
    /// and a predictor section (off-chip prediction accuracy).
    pub fn print_sections(&self) {
        info!("==== summary ====");
        for (cpu, core) in self.cores.iter().enumerate() {
            info!(cpu, instructions = core.instructions, cycles = core.cycles, ipc = core.ipc(), "core");
        }
        info!(total_cycles = self.total_cycles, "cycles");

        info!("==== memory ====");
        for (name, stats) in &self.caches {
            let hit_rate = if stats.accesses == 0 {
                0.0
            } else {
                stats.hits as f64 / stats.accesses as f64
            };
            info!(
                cache = %name,
                accesses = stats.accesses,
                hits = stats.hits,
                misses = stats.misses,
                hit_rate,
                mshr_stalls = stats.mshr_stalls,
                pf_useful = stats.pf_useful,
                pf_useless = stats.pf_useless,
                "cache"
            );
        }
        let (rb_hits, rb_misses) = self.dram_row_buffer;
        let rb_total = rb_hits + rb_misses;
        let rb_hit_rate = if rb_total == 0 {
            0.0
        } else {
            rb_hits as f64 / rb_total as f64
        };
        info!(row_buffer_hits = rb_hits, row_buffer_misses = rb_misses, rb_hit_rate, "dram");

        info!("==== predictor ====");
        let (correct, false_offchip, false_onchip) = self.predictor_accuracy;
        let total = correct + false_offchip + false_onchip;
        let accuracy = if total == 0 {
            0.0
        } else {
            correct as f64 / total as f64
        };
        info!(correct, false_offchip, false_onchip, accuracy, "offchip_predictor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipc_is_zero_with_no_cycles() {
        let core = CoreStats::default();
        assert_eq!(core.ipc(), 0.0);
    }

    #[test]
    fn ipc_divides_instructions_by_cycles() {
        let core = CoreStats {
            instructions: 100,
            cycles: 50,
            ..Default::default()
        };
        assert_eq!(core.ipc(), 2.0);
    }
}
