//! Scenario identity, status, and mixed-radix decoding.
//!
//! A scenario id enumerates one combination of dimension levels. Dimension
//! 0 is the least significant digit: for sizes `[2, 3]`, ids `0..6` decode
//! to `(0,0) (1,0) (0,1) (1,1) (0,2) (1,2)`.

use crate::error::ScenarioFailure;

/// Lifecycle of one scenario.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScenarioStatus {
    /// Waiting for a worker.
    Ready,
    /// Dispatched to a worker.
    Running,
    /// Recovered from a matching progress log; not re-run.
    PreviouslySucceeded,
    /// The kernel run completed.
    Succeeded,
    /// The kernel run returned an error or panicked.
    Failed,
}

impl ScenarioStatus {
    /// Whether the status can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PreviouslySucceeded | Self::Succeeded | Self::Failed
        )
    }
}

/// Status and metadata of one scenario.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioRecord {
    /// Current status.
    pub status: ScenarioStatus,
    /// One value per experiment metadata column, once the scenario's
    /// levels have been applied.
    pub metadata: Vec<String>,
    /// Set when `status` is [`ScenarioStatus::Failed`].
    pub failure: Option<ScenarioFailure>,
}

impl ScenarioRecord {
    pub(crate) fn ready() -> Self {
        Self {
            status: ScenarioStatus::Ready,
            metadata: Vec::new(),
            failure: None,
        }
    }
}

/// Number of scenarios spanned by `sizes`, or `None` on overflow.
///
/// No dimensions span exactly one scenario.
pub fn scenario_count(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &n| acc.checked_mul(n))
}

/// Level index per dimension for `scenario`.
///
/// `scenario` must be below [`scenario_count`]`(sizes)`.
pub fn decode_scenario(scenario: usize, sizes: &[usize]) -> Vec<usize> {
    let mut modulus = 1usize;
    sizes
        .iter()
        .map(|&size| {
            let level = (scenario / modulus) % size;
            modulus = modulus.saturating_mul(size);
            level
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_three_decodes_least_significant_first() {
        let decoded: Vec<Vec<usize>> = (0..6).map(|id| decode_scenario(id, &[2, 3])).collect();
        assert_eq!(
            decoded,
            vec![
                vec![0, 0],
                vec![1, 0],
                vec![0, 1],
                vec![1, 1],
                vec![0, 2],
                vec![1, 2],
            ]
        );
    }

    #[test]
    fn no_dimensions_is_one_scenario() {
        assert_eq!(scenario_count(&[]), Some(1));
        assert!(decode_scenario(0, &[]).is_empty());
    }

    #[test]
    fn overflowing_product_is_detected() {
        assert_eq!(scenario_count(&[usize::MAX, 2]), None);
        assert_eq!(scenario_count(&[3, 4]), Some(12));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!ScenarioStatus::Ready.is_terminal());
        assert!(!ScenarioStatus::Running.is_terminal());
        assert!(ScenarioStatus::PreviouslySucceeded.is_terminal());
        assert!(ScenarioStatus::Succeeded.is_terminal());
        assert!(ScenarioStatus::Failed.is_terminal());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashSet;

        proptest! {
            #[test]
            fn decoding_is_a_bijection(sizes in prop::collection::vec(1usize..5, 0..4)) {
                let count = scenario_count(&sizes).unwrap();
                let mut seen = HashSet::new();
                for id in 0..count {
                    let levels = decode_scenario(id, &sizes);
                    prop_assert_eq!(levels.len(), sizes.len());
                    for (level, size) in levels.iter().zip(&sizes) {
                        prop_assert!(level < size);
                    }
                    prop_assert!(seen.insert(levels));
                }
                prop_assert_eq!(seen.len(), count);
            }
        }
    }
}
