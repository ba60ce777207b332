//! Phase-windowed objective statistics.
//!
//! Long-running training reports moving averages over fixed-size windows of
//! consecutive minibatches ("phases") without retaining per-minibatch
//! history. One record exists per output name, created lazily on first
//! update.

use tracing::info;

/// Lifetime and current-phase objective accumulators for one output.
#[derive(Debug, Default)]
pub struct ObjectiveStats {
    tot_weight: f64,
    tot_objf: f64,
    tot_aux_objf: f64,
    tot_weight_this_phase: f64,
    tot_objf_this_phase: f64,
    tot_aux_objf_this_phase: f64,
    current_phase: usize,
    started: bool,
}

impl ObjectiveStats {
    /// Record one minibatch's totals.
    ///
    /// `minibatch_counter` increases by exactly one per trainer step; the
    /// update that completes a phase flushes that phase's summary and resets
    /// the phase accumulators. Records are created lazily, so the very first
    /// update adopts whatever phase the counter is in (an output may appear
    /// for the first time mid-training); after that, a counter outside the
    /// current phase means the caller violated the ordering contract, which
    /// aborts.
    pub fn update(
        &mut self,
        output_name: &str,
        minibatches_per_phase: usize,
        minibatch_counter: usize,
        weight: f64,
        objf: f64,
        aux_objf: f64,
    ) {
        assert!(minibatches_per_phase > 0);
        let phase = minibatch_counter / minibatches_per_phase;
        if !self.started {
            self.started = true;
            self.current_phase = phase;
        }
        assert_eq!(
            phase, self.current_phase,
            "minibatch counter {minibatch_counter} for '{output_name}' is in phase {phase}, \
             expected phase {}",
            self.current_phase
        );

        self.tot_weight_this_phase += weight;
        self.tot_objf_this_phase += objf;
        self.tot_aux_objf_this_phase += aux_objf;
        self.tot_weight += weight;
        self.tot_objf += objf;
        self.tot_aux_objf += aux_objf;

        if (minibatch_counter + 1) % minibatches_per_phase == 0 {
            self.print_stats_for_this_phase(output_name, minibatches_per_phase);
            self.tot_weight_this_phase = 0.0;
            self.tot_objf_this_phase = 0.0;
            self.tot_aux_objf_this_phase = 0.0;
            self.current_phase += 1;
        }
    }

    fn print_stats_for_this_phase(&self, output_name: &str, minibatches_per_phase: usize) {
        let start_minibatch = self.current_phase * minibatches_per_phase;
        let end_minibatch = start_minibatch + minibatches_per_phase - 1;
        let objf = self.tot_objf_this_phase / self.tot_weight_this_phase;
        if self.tot_aux_objf_this_phase == 0.0 {
            info!(
                "Average objective function for '{output_name}' for minibatches \
                 {start_minibatch}-{end_minibatch} is {objf:.4} over {} frames.",
                self.tot_weight_this_phase
            );
        } else {
            let aux_objf = self.tot_aux_objf_this_phase / self.tot_weight_this_phase;
            info!(
                "Average objective function for '{output_name}' for minibatches \
                 {start_minibatch}-{end_minibatch} is {objf:.4} + {aux_objf:.4} = {:.4} \
                 over {} frames.",
                objf + aux_objf,
                self.tot_weight_this_phase
            );
        }
    }

    /// Emit the lifetime summary for this output.
    ///
    /// Returns true iff any weight was ever accumulated. The
    /// `log-prob-per-frame=` line is parsed by downstream reporting scripts.
    pub fn print_total_stats(&self, output_name: &str) -> bool {
        let objf = self.tot_objf / self.tot_weight;
        if self.tot_aux_objf == 0.0 {
            info!(
                "Overall average objective function for '{output_name}' is {objf:.4} \
                 over {} frames.",
                self.tot_weight
            );
        } else {
            let aux_objf = self.tot_aux_objf / self.tot_weight;
            info!(
                "Overall average objective function for '{output_name}' is \
                 {objf:.4} + {aux_objf:.4} = {:.4} over {} frames.",
                objf + aux_objf,
                self.tot_weight
            );
        }
        info!("[this line is to be parsed by a script:] log-prob-per-frame={objf}");
        self.tot_weight != 0.0
    }

    /// Lifetime accumulated weight.
    pub fn tot_weight(&self) -> f64 {
        self.tot_weight
    }

    /// Lifetime accumulated objective.
    pub fn tot_objf(&self) -> f64 {
        self.tot_objf
    }

    /// Lifetime accumulated auxiliary objective.
    pub fn tot_aux_objf(&self) -> f64 {
        self.tot_aux_objf
    }

    /// Index of the phase currently being accumulated.
    pub fn current_phase(&self) -> usize {
        self.current_phase
    }

    #[cfg(test)]
    pub(crate) fn phase_weight(&self) -> f64 {
        self.tot_weight_this_phase
    }
}
