//! # Block Production Test Suite
//!
//! Unified test crate for flows that cross component boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── proposal_flow.rs      # produce -> sign -> accept through ProposerApi
//!     ├── eth1_voting.rs        # vote selection against a populated eth1 chain
//!     └── validator_duties.rs   # attestation data and sync subscriptions together
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bp-tests
//! cargo test -p bp-tests integration::proposal_flow
//!
//! # Benchmarks
//! cargo bench -p bp-tests
//! ```

#![allow(unused_variables)]
#![allow(dead_code)]

pub mod integration;
