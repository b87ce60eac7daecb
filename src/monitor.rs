/// Per-sample FLOP estimate of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum FlopEstimate {
    /// No batch measured yet.
    #[default]
    Unmeasured,
    Measured(f64),
    /// Measurement failed once and is never attempted again.
    Disabled,
}

impl FlopEstimate {
    /// Returns the numeric encoding: 0 for unmeasured, -1 for disabled.
    pub fn sentinel(self) -> f64 {
        match self {
            Self::Unmeasured => 0.0,
            Self::Measured(v) => v,
            Self::Disabled => -1.0,
        }
    }
}

/// Performance counters of one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Monitor {
    flops_per_sample: FlopEstimate,
    flop_samples: usize,
    total_flops: f64,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn flops_per_sample(&self) -> FlopEstimate {
        self.flops_per_sample
    }

    /// Folds the cost of one batch of `batch_size` samples into the per-sample average.
    ///
    /// Has no effect once the estimate is disabled.
    pub fn track_avg_flops(&mut self, flops_one_batch: f64, batch_size: usize) {
        let prev = match self.flops_per_sample {
            FlopEstimate::Disabled => return,
            FlopEstimate::Unmeasured => 0.0,
            FlopEstimate::Measured(v) => v,
        };

        let samples = self.flop_samples + batch_size;
        if samples == 0 {
            return;
        }

        let avg = (prev * self.flop_samples as f64 + flops_one_batch) / samples as f64;
        self.flops_per_sample = FlopEstimate::Measured(avg);
        self.flop_samples = samples;
    }

    pub fn disable_flops(&mut self) {
        self.flops_per_sample = FlopEstimate::Disabled;
    }

    /// Adds `batch_size` samples worth of the current estimate to the total, sentinel included.
    pub fn accumulate_flops(&mut self, batch_size: usize) {
        self.total_flops += self.flops_per_sample.sentinel() * batch_size as f64;
    }

    /// Returns the raw accumulator.
    #[inline]
    pub fn total_flops(&self) -> f64 {
        self.total_flops
    }

    /// Returns the total, or `None` if measurement was disabled.
    pub fn reported_total_flops(&self) -> Option<f64> {
        match self.flops_per_sample {
            FlopEstimate::Disabled => None,
            _ => Some(self.total_flops),
        }
    }
}
