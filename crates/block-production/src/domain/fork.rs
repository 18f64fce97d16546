//! Fork schedule.

use serde::{Deserialize, Serialize};
use shared_types::{ChainSpec, Epoch};
use std::fmt;

/// Consensus fork, ordered by activation.
///
/// Each fork's block body is a strict superset of the previous one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForkName {
    /// Genesis fork
    Phase0,
    /// Sync committees
    Altair,
    /// Execution payloads (the merge)
    Bellatrix,
    /// Withdrawals and BLS-to-execution changes
    Capella,
    /// Blob commitments
    Deneb,
}

impl ForkName {
    /// Fork active at `epoch`.
    pub fn from_epoch(epoch: Epoch, spec: &ChainSpec) -> Self {
        if epoch >= spec.deneb_fork_epoch {
            Self::Deneb
        } else if epoch >= spec.capella_fork_epoch {
            Self::Capella
        } else if epoch >= spec.bellatrix_fork_epoch {
            Self::Bellatrix
        } else if epoch >= spec.altair_fork_epoch {
            Self::Altair
        } else {
            Self::Phase0
        }
    }

    /// Blocks carry a sync aggregate.
    pub fn has_sync_aggregate(self) -> bool {
        self >= Self::Altair
    }

    /// Blocks carry an execution payload or its header.
    pub fn has_execution_payload(self) -> bool {
        self >= Self::Bellatrix
    }

    /// Blocks carry BLS-to-execution changes; payloads carry withdrawals.
    pub fn has_withdrawals(self) -> bool {
        self >= Self::Capella
    }

    /// Blocks carry blob KZG commitments.
    pub fn has_blobs(self) -> bool {
        self >= Self::Deneb
    }

    /// Lowercase name, as used on the wire and in metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phase0 => "phase0",
            Self::Altair => "altair",
            Self::Bellatrix => "bellatrix",
            Self::Capella => "capella",
            Self::Deneb => "deneb",
        }
    }
}

impl fmt::Display for ForkName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
