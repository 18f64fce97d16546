//! Cross-component integration tests.

pub mod eth1_voting;
pub mod proposal_flow;
pub mod validator_duties;
