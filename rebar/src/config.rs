use crate::device::SecurityPolicy;

/// Series heap settings.
#[derive(Debug, Clone)]
pub struct HeapSettings {
    /// Bytes allocated between collections.
    pub ballast: usize,
    /// When false, ballast exhaustion never schedules a recycle.
    pub gc_enabled: bool,
    /// Capacities handed out for small series, in elements. Larger series
    /// double.
    pub buckets: Vec<usize>,
}

impl Default for HeapSettings {
    fn default() -> Self {
        Self {
            ballast: 3 * 1024 * 1024,
            gc_enabled: true,
            buckets: vec![8, 16, 32, 64, 128, 256, 512, 1024, 2048],
        }
    }
}

impl HeapSettings {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ballast == 0 {
            return Err("ballast must be greater than zero");
        }
        if self.buckets.is_empty() {
            return Err("at least one size bucket is required");
        }
        if self.buckets.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("size buckets must be strictly increasing");
        }
        Ok(())
    }

    /// Capacity for a series that must hold `len` elements.
    pub fn capacity_for(&self, len: usize) -> usize {
        match self.buckets.iter().find(|&&bucket| bucket >= len) {
            Some(&bucket) => bucket,
            None => len.next_power_of_two(),
        }
    }
}

/// Interpreter settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub heap: HeapSettings,
    /// Cells per argument chunk.
    pub chunk_cells: usize,
    /// Evaluation steps between routine signal polls.
    pub eval_dose: u32,
    /// Maximum call depth. Each call also recurses on the native stack, so
    /// the default stays within a 2 MiB thread; hosts that run the
    /// interpreter on a bigger stack raise it.
    pub stack_limit: usize,
    /// Whether REDUCE keeps `|` in its result.
    pub keep_bars: bool,
    pub security: SecurityPolicy,
    /// Log every evaluator step at trace level.
    pub trace: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            heap: HeapSettings::default(),
            chunk_cells: 2048,
            eval_dose: 10_000,
            stack_limit: 128,
            keep_bars: false,
            security: SecurityPolicy::Allow,
            trace: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), &'static str> {
        self.heap.validate()?;
        if self.chunk_cells < 16 {
            return Err("chunk_cells must be at least 16");
        }
        if self.eval_dose == 0 {
            return Err("eval_dose must be greater than zero");
        }
        if self.stack_limit == 0 {
            return Err("stack_limit must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn rejects_unsorted_buckets() {
        let settings = HeapSettings {
            buckets: vec![16, 8],
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn bucket_then_doubling() {
        let settings = HeapSettings::default();
        assert_eq!(settings.capacity_for(0), 8);
        assert_eq!(settings.capacity_for(9), 16);
        assert_eq!(settings.capacity_for(3000), 4096);
    }
}
