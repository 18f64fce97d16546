//! Blob sidecar construction and unblinding.

use crate::domain::block::BlockDraft;
use crate::error::{BlockProductionError, Result};
use shared_types::{
    blob_root, BlindedBlobSidecar, BlindedBlobsBundle, BlobSidecar, BlobsBundle, Root,
};

fn check_lengths(commitments: usize, proofs: usize, blobs: usize) -> Result<()> {
    if commitments != proofs || commitments != blobs {
        return Err(BlockProductionError::internal(
            "build blob sidecars",
            format!(
                "bundle length mismatch: {} commitments, {} proofs, {} blobs",
                commitments, proofs, blobs
            ),
        ));
    }
    Ok(())
}

/// Sidecars for a full Deneb block, one per commitment in index order.
pub fn blob_sidecars(
    block: &BlockDraft,
    block_root: Root,
    bundle: &BlobsBundle,
) -> Result<Vec<BlobSidecar>> {
    check_lengths(bundle.kzg_commitments.len(), bundle.proofs.len(), bundle.blobs.len())?;
    Ok(bundle
        .kzg_commitments
        .iter()
        .zip(&bundle.proofs)
        .zip(&bundle.blobs)
        .enumerate()
        .map(|(index, ((commitment, proof), blob))| BlobSidecar {
            block_root,
            index: index as u64,
            slot: block.slot(),
            block_parent_root: block.parent_root(),
            proposer_index: block.proposer_index(),
            blob: blob.clone(),
            kzg_commitment: *commitment,
            kzg_proof: *proof,
        })
        .collect())
}

/// Sidecars for a blinded Deneb block, carrying blob roots.
pub fn blinded_blob_sidecars(
    block: &BlockDraft,
    block_root: Root,
    bundle: &BlindedBlobsBundle,
) -> Result<Vec<BlindedBlobSidecar>> {
    check_lengths(
        bundle.kzg_commitments.len(),
        bundle.proofs.len(),
        bundle.blob_roots.len(),
    )?;
    Ok(bundle
        .kzg_commitments
        .iter()
        .zip(&bundle.proofs)
        .zip(&bundle.blob_roots)
        .enumerate()
        .map(|(index, ((commitment, proof), root))| BlindedBlobSidecar {
            block_root,
            index: index as u64,
            slot: block.slot(),
            block_parent_root: block.parent_root(),
            proposer_index: block.proposer_index(),
            blob_root: *root,
            kzg_commitment: *commitment,
            kzg_proof: *proof,
        })
        .collect())
}

/// Complete blinded sidecars with the blobs revealed by the builder.
pub fn unblind_sidecars(
    sidecars: Vec<BlindedBlobSidecar>,
    bundle: &BlobsBundle,
) -> Result<Vec<BlobSidecar>> {
    if sidecars.len() != bundle.blobs.len() {
        return Err(BlockProductionError::internal(
            "unblind blob sidecars",
            format!(
                "builder returned {} blobs for {} sidecars",
                bundle.blobs.len(),
                sidecars.len()
            ),
        ));
    }
    sidecars
        .into_iter()
        .zip(&bundle.blobs)
        .map(|(sidecar, blob)| {
            let root = blob_root(blob);
            if root != sidecar.blob_root {
                return Err(BlockProductionError::internal(
                    "unblind blob sidecars",
                    format!("blob {} root {:?} != {:?}", sidecar.index, root, sidecar.blob_root),
                ));
            }
            Ok(sidecar.into_full(blob.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::H256;
    use shared_types::{ChainSpec, KzgCommitment, KzgProof};

    fn deneb_block() -> BlockDraft {
        let mut block = BlockDraft::empty(3, &ChainSpec::minimal());
        block.set_header(4, H256::repeat_byte(7));
        block
    }

    fn bundle(n: usize) -> BlobsBundle {
        BlobsBundle {
            kzg_commitments: (0..n).map(|i| KzgCommitment([i as u8; 48])).collect(),
            proofs: (0..n).map(|i| KzgProof([i as u8 + 100; 48])).collect(),
            blobs: (0..n).map(|i| vec![i as u8; 8]).collect(),
        }
    }

    #[test]
    fn test_sidecars_pair_by_index() {
        let root = H256::repeat_byte(1);
        let sidecars = blob_sidecars(&deneb_block(), root, &bundle(3)).unwrap();
        assert_eq!(sidecars.len(), 3);
        for (i, sidecar) in sidecars.iter().enumerate() {
            assert_eq!(sidecar.index, i as u64);
            assert_eq!(sidecar.kzg_commitment, KzgCommitment([i as u8; 48]));
            assert_eq!(sidecar.blob, vec![i as u8; 8]);
            assert_eq!(sidecar.block_root, root);
            assert_eq!(sidecar.slot, 3);
            assert_eq!(sidecar.proposer_index, 4);
            assert_eq!(sidecar.block_parent_root, H256::repeat_byte(7));
        }
    }

    #[test]
    fn test_length_mismatch_is_internal() {
        let mut b = bundle(2);
        b.proofs.pop();
        let err = blob_sidecars(&deneb_block(), H256::zero(), &b).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Internal);
    }

    #[test]
    fn test_unblind_roundtrip_and_root_check() {
        let full = bundle(2);
        let blinded = BlindedBlobsBundle {
            kzg_commitments: full.kzg_commitments.clone(),
            proofs: full.proofs.clone(),
            blob_roots: full.blobs.iter().map(|b| blob_root(b)).collect(),
        };
        let block = deneb_block();
        let blinded_sidecars = blinded_blob_sidecars(&block, H256::zero(), &blinded).unwrap();
        let expected = blob_sidecars(&block, H256::zero(), &full).unwrap();
        assert_eq!(unblind_sidecars(blinded_sidecars.clone(), &full).unwrap(), expected);

        let mut wrong = full.clone();
        wrong.blobs[1] = vec![0xff];
        assert!(unblind_sidecars(blinded_sidecars.clone(), &wrong).is_err());

        let mut short = full;
        short.blobs.pop();
        assert!(unblind_sidecars(blinded_sidecars, &short).is_err());
    }
}
