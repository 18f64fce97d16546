//! Event schemas published by the proposer

pub mod outbound;

pub use outbound::*;
