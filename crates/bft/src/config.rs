//! Committee size and Bracha quorum thresholds.

/// Configuration of one consensus committee.
///
/// `num_validators` is `n`, `max_faulty` is `f`. The thresholds are used
/// verbatim by the state machine; changing a comparison breaks either safety
/// or liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrachaConfig {
    /// Number of validators in the committee (`n`).
    pub num_validators: usize,

    /// Maximum number of Byzantine validators tolerated (`f`).
    pub max_faulty: usize,
}

impl Default for BrachaConfig {
    fn default() -> Self {
        Self {
            num_validators: 4,
            max_faulty: 1,
        }
    }
}

impl BrachaConfig {
    /// Create a config for `n` validators tolerating `f` faults.
    pub fn new(num_validators: usize, max_faulty: usize) -> Self {
        Self {
            num_validators,
            max_faulty,
        }
    }

    /// Set the committee size.
    pub fn with_num_validators(mut self, num_validators: usize) -> Self {
        self.num_validators = num_validators;
        self
    }

    /// Set the fault bound.
    pub fn with_max_faulty(mut self, max_faulty: usize) -> Self {
        self.max_faulty = max_faulty;
        self
    }

    /// ECHOs needed before sending READY: `⌊(n + f + 1) / 2⌋`.
    pub fn echo_quorum(&self) -> u64 {
        ((self.num_validators + self.max_faulty + 1) / 2) as u64
    }

    /// READYs needed before amplifying with our own READY: `f + 1`.
    pub fn ready_quorum(&self) -> u64 {
        (self.max_faulty + 1) as u64
    }

    /// `2f + 1`. Delivery requires strictly more READYs than this.
    pub fn delivery_threshold(&self) -> u64 {
        (2 * self.max_faulty + 1) as u64
    }

    /// Whether `ready_count` READYs deliver a block.
    pub fn delivers(&self, ready_count: u64) -> bool {
        ready_count > self.delivery_threshold()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thresholds_three_validators() {
        let config = BrachaConfig::new(3, 0);
        assert_eq!(config.echo_quorum(), 2);
        assert_eq!(config.ready_quorum(), 1);
        assert!(!config.delivers(1));
        assert!(config.delivers(2));
    }

    #[test]
    fn test_thresholds_four_validators() {
        let config = BrachaConfig::default();
        assert_eq!(config.echo_quorum(), 3);
        assert_eq!(config.ready_quorum(), 2);
        assert_eq!(config.delivery_threshold(), 3);
        assert!(!config.delivers(3));
        assert!(config.delivers(4));
    }

    #[test]
    fn test_echo_quorum_floors() {
        // (5 + 1 + 1) / 2 = 3.5 -> 3
        assert_eq!(BrachaConfig::new(5, 1).echo_quorum(), 3);
        assert_eq!(BrachaConfig::new(7, 2).echo_quorum(), 5);
    }

    #[test]
    fn test_builders() {
        let config = BrachaConfig::default()
            .with_num_validators(7)
            .with_max_faulty(2);
        assert_eq!(config, BrachaConfig::new(7, 2));
    }
}
