#![forbid(unsafe_code)]

//! Eligibility thresholds for reward issuance.
//!
//! Pure decisions, no side effects: a confidence-derived score (0-100) on the
//! automatic path, a caller-supplied cumulative score on the manual-claim
//! path. Amounts are integers in the token's smallest unit (18 decimals);
//! no floats anywhere near money.

use ethers::types::U256;

/// Automatic path: eligible at and above this classifier score (inclusive).
pub const AUTO_SCORE_THRESHOLD: u32 = 50;

/// Manual-claim path: eligible at and above this cumulative score (inclusive).
pub const CLAIM_SCORE_THRESHOLD: u64 = 250;

/// Fixed reward per eligible event: 5 whole tokens at 18 decimals.
pub fn reward_amount() -> U256 {
    U256::from(5u64) * U256::exp10(18)
}

/// Outcome of an eligibility check. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityDecision {
    pub eligible: bool,
    /// Reward amount in smallest units; zero when ineligible.
    pub amount: U256,
}

/// Automatic path decision, post-classification.
pub fn decide_auto(observed_score: u32) -> EligibilityDecision {
    if observed_score >= AUTO_SCORE_THRESHOLD {
        EligibilityDecision {
            eligible: true,
            amount: reward_amount(),
        }
    } else {
        EligibilityDecision {
            eligible: false,
            amount: U256::zero(),
        }
    }
}

/// Manual-claim path decision over a pre-accumulated score.
pub fn decide_claim(cumulative_score: u64) -> EligibilityDecision {
    if cumulative_score >= CLAIM_SCORE_THRESHOLD {
        EligibilityDecision {
            eligible: true,
            amount: reward_amount(),
        }
    } else {
        EligibilityDecision {
            eligible: false,
            amount: U256::zero(),
        }
    }
}
