//! Pricing and sizing: fair probabilities, leg correlation, and staking
//! policies.

pub mod correlation;
pub mod devig;
pub mod staking;
