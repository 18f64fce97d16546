//! AcceptSignedBlock: unblind, broadcast and import a signed block.

use super::{cancellable, ProposerService};
use crate::domain::{
    unblind_sidecars, BlockBody, ExecutionField, SignedBeaconBlock, SignedBlockContents,
};
use crate::error::{BlockProductionError, Result};
use crate::events::BlockReceivedEvent;
use shared_types::{Root, SignedBlindedBlobSidecar, SignedBlobSidecar};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

impl ProposerService {
    pub(super) async fn accept(&self, encoded: &[u8], cancel: &CancellationToken) -> Result<Root> {
        let SignedBlockContents {
            signed_block,
            signed_blob_sidecars,
            signed_blinded_blob_sidecars,
        } = SignedBlockContents::decode(encoded)
            .map_err(|e| BlockProductionError::Decode(e.to_string()))?;

        let sidecar_count = signed_blob_sidecars.len() + signed_blinded_blob_sidecars.len();
        if sidecar_count as u64 > self.spec.max_blobs_per_block {
            return Err(BlockProductionError::TooManyBlobs {
                count: sidecar_count,
                max: self.spec.max_blobs_per_block,
            });
        }

        let slot = signed_block.message.slot();
        let expected_fork = self.fork_at_slot(slot);
        if signed_block.message.fork() != expected_fork {
            return Err(BlockProductionError::InvalidRequest(format!(
                "{:?} block at slot {} which belongs to {:?}",
                signed_block.message.fork(),
                slot,
                expected_fork
            )));
        }
        let was_blinded = signed_block.message.is_blinded();
        let (signed_block, sidecars) = if was_blinded {
            self.unblind(signed_block, signed_blinded_blob_sidecars, cancel)
                .await?
        } else {
            (signed_block, signed_blob_sidecars)
        };

        cancellable(cancel, "broadcast block", self.broadcaster.broadcast_block(&signed_block))
            .await?
            .map_err(|e| BlockProductionError::internal("broadcast block", e))?;

        if signed_block.message.fork().has_blobs() && !sidecars.is_empty() {
            let broadcast = self.broadcast_sidecars(&sidecars, cancel).await?;
            if broadcast > 0 {
                cancellable(cancel, "save blob sidecars", self.blob_store.save_blob_sidecars(&sidecars))
                    .await?
                    .map_err(|e| BlockProductionError::internal("save blob sidecars", e))?;
            } else {
                warn!(slot, "No blob sidecar was broadcast, not saving sidecars");
            }
        }

        let root = signed_block.message.canonical_root()?;
        let proposer_index = signed_block.message.proposer_index();
        cancellable(
            cancel,
            "receive block",
            self.block_receiver.receive_block(signed_block.clone(), root),
        )
        .await?
        .map_err(|e| BlockProductionError::internal("receive block", e))?;

        self.prune_pools(&signed_block).await;

        let event = BlockReceivedEvent {
            block_root: root,
            slot,
            proposer_index,
            was_blinded,
            blob_count: sidecars.len(),
            timestamp_ms: self.now_ms(),
        };
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, slot, "Could not publish block received event");
        }

        self.metrics.record_block_proposed();
        info!(slot, block_root = ?root, blinded = was_blinded, blobs = sidecars.len(), "Proposed block");
        Ok(root)
    }

    /// Swap the payload header for the builder's payload and complete the
    /// blinded sidecars.
    async fn unblind(
        &self,
        mut block: SignedBeaconBlock,
        blinded: Vec<SignedBlindedBlobSidecar>,
        cancel: &CancellationToken,
    ) -> Result<(SignedBeaconBlock, Vec<SignedBlobSidecar>)> {
        let header_hash = block
            .message
            .body()
            .execution()
            .map(ExecutionField::block_hash)
            .ok_or_else(|| BlockProductionError::internal("unblind block", "block has no payload header"))?;

        let unblinded = cancellable(
            cancel,
            "unblind block",
            self.builder.submit_blinded_block(&block, &blinded),
        )
        .await?
        .map_err(|e| BlockProductionError::internal("unblind block", e))?;

        if unblinded.payload.block_hash != header_hash {
            return Err(BlockProductionError::internal(
                "unblind block",
                format!(
                    "builder payload hash {:?} does not match committed header {:?}",
                    unblinded.payload.block_hash, header_hash
                ),
            ));
        }
        if let Some(execution) = block.message.body_mut().execution_mut() {
            *execution = ExecutionField::Full(unblinded.payload);
        }

        if !block.message.fork().has_blobs() || blinded.is_empty() {
            return Ok((block, Vec::new()));
        }
        let bundle = unblinded.blobs_bundle.ok_or_else(|| {
            BlockProductionError::internal("unblind blob sidecars", "builder returned no blobs")
        })?;
        let (messages, signatures): (Vec<_>, Vec<_>) = blinded
            .into_iter()
            .map(|sidecar| (sidecar.message, sidecar.signature))
            .unzip();
        let sidecars = unblind_sidecars(messages, &bundle)?
            .into_iter()
            .zip(signatures)
            .map(|(message, signature)| SignedBlobSidecar { message, signature })
            .collect();
        debug!(slot = block.message.slot(), "Unblinded builder block");
        Ok((block, sidecars))
    }

    /// Broadcast each sidecar on its subnet; failures are logged only.
    /// Returns how many went out.
    async fn broadcast_sidecars(
        &self,
        sidecars: &[SignedBlobSidecar],
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let subnet_count = self.spec.max_blobs_per_block.max(1);
        let mut broadcast = 0;
        for sidecar in sidecars {
            let index = sidecar.message.index;
            let subnet = index % subnet_count;
            let sent = cancellable(
                cancel,
                "broadcast blob sidecar",
                self.broadcaster.broadcast_blob_sidecar(subnet, sidecar),
            )
            .await?;
            match sent {
                Ok(()) => broadcast += 1,
                Err(e) => {
                    self.metrics.record_blob_broadcast_failure();
                    error!(error = %e, index, subnet, "Could not broadcast blob sidecar");
                }
            }
        }
        Ok(broadcast)
    }

    /// Drop operations included in an imported block from their pools.
    async fn prune_pools(&self, block: &SignedBeaconBlock) {
        let body = block.message.body();
        let base = body.phase0();
        let pools = &self.pools;

        let results = [
            ("attestations", pools.attestations.remove(&base.attestations).await),
            ("proposer_slashings", pools.proposer_slashings.remove(&base.proposer_slashings).await),
            ("attester_slashings", pools.attester_slashings.remove(&base.attester_slashings).await),
            ("voluntary_exits", pools.voluntary_exits.remove(&base.voluntary_exits).await),
        ];
        for (operation, result) in results {
            if let Err(e) = result {
                warn!(error = %e, operation, "Could not prune included operations");
            }
        }

        if let Some(changes) = body.bls_to_execution_changes() {
            if let Err(e) = pools.bls_to_execution_changes.remove(changes).await {
                warn!(error = %e, operation = "bls_to_execution_changes", "Could not prune included operations");
            }
        }
    }
}
