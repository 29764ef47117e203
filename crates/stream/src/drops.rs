// Copyright 2025-2026 CEMAXECUTER LLC

use crate::StreamParams;

/// Detects samples lost between stream callbacks using the hardware's
/// wrapping 32-bit sample counter.
///
/// Must see every callback of its stream to keep the expected counter valid.
#[derive(Debug, Clone, Default)]
pub struct DropDetector {
    last_expected: u32,
    valid: bool,
}

impl DropDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report how many samples were lost before the block starting at
    /// `counter`. Always 0 when `reset` is set or no baseline exists yet.
    pub fn update(&mut self, counter: u32, chunk_len: u32, reset: bool) -> u32 {
        let last = self.last_expected;
        self.last_expected = counter.wrapping_add(chunk_len);

        if reset || !self.valid {
            self.valid = true;
            return 0;
        }

        if counter == last {
            return 0;
        }

        if counter < last {
            // counter wrapped past u32::MAX since the last block
            (u32::MAX - last) + counter
        } else {
            counter - last
        }
    }

    /// Same as [`update`](Self::update), reading the counter and block length
    /// from the callback metadata.
    pub fn update_params(&mut self, params: &StreamParams, reset: bool) -> u32 {
        self.update(params.first_sample_num, params.num_samples, reset)
    }

    /// Drop the baseline; the next update reports 0.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NUM_SAMPLES: u32 = 1234;

    #[test]
    fn test_regular_increment() {
        let mut det = DropDetector::new();
        let mut first = 5678u32;

        assert_eq!(det.update(first, NUM_SAMPLES, true), 0, "reset always reports 0");

        first += NUM_SAMPLES;
        assert_eq!(det.update(first, NUM_SAMPLES, false), 0);

        // skip one sample
        first += NUM_SAMPLES + 1;
        assert_eq!(det.update(first, NUM_SAMPLES, false), 1);
    }

    #[test]
    fn test_wrapped_increment() {
        let mut det = DropDetector::new();
        let mut first = u32::MAX - 1;

        assert_eq!(det.update(first, NUM_SAMPLES, true), 0);

        first = first.wrapping_add(NUM_SAMPLES);
        assert_eq!(det.update(first, NUM_SAMPLES, false), 0);
    }

    #[test]
    fn test_maximum_gap_across_wrap() {
        let mut det = DropDetector::new();
        let mut first = u32::MAX - NUM_SAMPLES - 1;

        assert_eq!(det.update(first, NUM_SAMPLES, true), 0);

        first = first.wrapping_add(NUM_SAMPLES);
        assert_eq!(det.update(first, NUM_SAMPLES, false), 0);

        // one short of the expected counter looks like a full wrap of loss
        first = first.wrapping_add(NUM_SAMPLES - 1);
        assert_eq!(det.update(first, NUM_SAMPLES, false), u32::MAX - 1);
    }

    #[test]
    fn test_first_call_has_no_baseline() {
        let mut det = DropDetector::new();
        assert!(!det.is_valid());
        assert_eq!(det.update(1_000_000, NUM_SAMPLES, false), 0);
        assert!(det.is_valid());
        assert_eq!(det.update(1_000_000 + NUM_SAMPLES + 10, NUM_SAMPLES, false), 10);
    }

    #[test]
    fn test_invalidate_resets_baseline() {
        let mut det = DropDetector::new();
        det.update(0, NUM_SAMPLES, true);
        det.invalidate();
        assert_eq!(det.update(99_999, NUM_SAMPLES, false), 0);
    }

    #[test]
    fn test_update_params() {
        let mut det = DropDetector::new();
        let mut params = StreamParams {
            first_sample_num: 100,
            num_samples: 252,
            ..Default::default()
        };
        assert_eq!(det.update_params(&params, false), 0);
        params.first_sample_num += 252 + 3;
        assert_eq!(det.update_params(&params, false), 3);
    }
}
