//! Payload extractor — pure scan over one transaction's witness data.
//!
//! A labitbu embedding is a taproot script-path spend whose control block
//! carries the project's internal key and, somewhere in its trailing bytes, a
//! RIFF container holding the image. The extractor recognizes such inputs and
//! computes a content checksum for the embedded payload. No I/O; malformed
//! input never panics, it just yields no detection.

use sha2::{Digest, Sha256};

use crate::types::{Detection, WitnessTx};

/// X-only internal public key every labitbu reveal commits to.
pub const LABITBU_INTERNAL_KEY: [u8; 32] =
    hex_literal::hex!("96053db5b18967b5a410326ecca687441579225a6d190f398e2180deec6e429e");

/// A candidate control block must be strictly larger than this (the payload
/// alone fills it past this size).
const MIN_CONTROL_BLOCK_LEN: usize = 8192;

/// How many payload bytes the checksum covers, starting at the RIFF marker.
const PAYLOAD_LEN: usize = 8192;

/// Taproot control block layout: 1 header byte, then the 32-byte internal key.
const INTERNAL_KEY_OFFSET: usize = 1;

/// Scan every input of a transaction for embedded labitbu payloads.
///
/// An input qualifies when its witness stack has exactly three elements
/// (script-path spend: signature/args, script, control block) and the control
/// block is large enough to hold an embedded image. Non-qualifying and
/// malformed inputs are skipped, never errors.
pub fn scan_transaction(tx: &WitnessTx) -> Vec<Detection> {
    let mut detections = Vec::new();

    for (index, input) in tx.vin.iter().enumerate() {
        if input.witness.len() != 3 {
            continue;
        }
        let control_block = &input.witness[2];
        if control_block.len() <= MIN_CONTROL_BLOCK_LEN {
            continue;
        }

        if internal_key(control_block) != Some(&LABITBU_INTERNAL_KEY) {
            continue;
        }

        if let Some(checksum) = payload_checksum(control_block) {
            detections.push(Detection {
                vin: index as u32,
                checksum,
            });
        }
    }

    detections
}

/// Extract the x-only internal key from a control block.
///
/// Returns `None` if the buffer is too short to contain the key field.
fn internal_key(control_block: &[u8]) -> Option<&[u8; 32]> {
    control_block
        .get(INTERNAL_KEY_OFFSET..INTERNAL_KEY_OFFSET + 32)?
        .try_into()
        .ok()
}

/// Locate the embedded payload and compute its checksum.
///
/// The payload starts at the first `RIFF` marker in the control block. Up to
/// [`PAYLOAD_LEN`] bytes from there (clipped at the buffer end) are hashed
/// with SHA-256 and rendered as lowercase hex. Returns `None` when no marker
/// is present.
pub fn payload_checksum(control_block: &[u8]) -> Option<String> {
    let start = find_riff(control_block)?;
    let end = (start + PAYLOAD_LEN).min(control_block.len());
    let digest = Sha256::digest(&control_block[start..end]);
    Some(hex::encode(digest))
}

/// Find the offset of the first `RIFF` marker, if any.
fn find_riff(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"RIFF")
}
