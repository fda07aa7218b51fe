//! Sat provenance resolver.
//!
//! A record's sat identity can only be read directly off an unspent output.
//! When the reveal output has been spent, identity is carried forward along
//! the spending chain, but only while each spend consumes the output at input
//! index 0; anything else makes provenance ambiguous and the walk stops
//! rather than guess. The walk is iterative with an explicit depth bound so
//! adversarial or malformed chains cannot run it unbounded.

use tracing::{debug, info, warn};

use labitbu_core::error::IndexerError;
use labitbu_core::store::RecordStore;

use crate::client::ChainClient;

/// Resolve the sat bound to output 0 of `txid`.
///
/// Returns `None` for every unresolvable case: ambiguous spend chain, depth
/// bound exceeded, output without sat ranges, or any network failure along
/// the way. Unresolved records are simply retried on a later run.
pub async fn resolve_sat<C: ChainClient>(client: &C, txid: &str, max_depth: u32) -> Option<u64> {
    let mut current = txid.to_string();
    let mut depth = 0u32;

    loop {
        let output = match client.output(&current, 0).await {
            Ok(output) => output,
            Err(err) => {
                warn!(txid = %current, %err, "output lookup failed");
                return None;
            }
        };

        if !output.spent {
            let sat = output.first_sat();
            if sat.is_none() {
                debug!(txid = %current, "unspent output carries no sat ranges");
            }
            return sat;
        }

        if depth >= max_depth {
            debug!(txid, max_depth, "spend chain exceeds depth bound");
            return None;
        }

        let outspend = match client.outspend(&current, 0).await {
            Ok(outspend) => outspend,
            Err(err) => {
                warn!(txid = %current, %err, "outspend lookup failed");
                return None;
            }
        };

        // The two services can briefly disagree on spend status; treat it as
        // unresolved and let a later run see a consistent view.
        if !outspend.spent {
            debug!(txid = %current, "spend status inconsistent between services");
            return None;
        }

        match (outspend.txid, outspend.vin) {
            (Some(spender), Some(0)) => {
                debug!(from = %current, to = %spender, depth, "following spend");
                current = spender;
                depth += 1;
            }
            (Some(spender), Some(vin)) => {
                debug!(txid = %current, spender = %spender, vin, "spent at non-zero input, ambiguous");
                return None;
            }
            _ => {
                warn!(txid = %current, "outspend reported spent without spender");
                return None;
            }
        }
    }
}

/// Resolve sats for every record still missing one.
///
/// Items are independent: an unresolvable record is skipped and retried on a
/// later run; only store failures abort the batch. Returns how many records
/// were resolved.
pub async fn populate_sats<C: ChainClient, S: RecordStore>(
    client: &C,
    store: &S,
    max_depth: u32,
) -> Result<u64, IndexerError> {
    let pending = store.find_unresolved_sat().await?;
    info!(count = pending.len(), "resolving sats");

    let mut resolved = 0u64;
    for record in pending {
        match resolve_sat(client, &record.txid, max_depth).await {
            Some(sat) => {
                store.update_sat(record.id, sat).await?;
                info!(id = record.id, txid = %record.txid, sat, "sat resolved");
                resolved += 1;
            }
            None => {
                debug!(id = record.id, txid = %record.txid, "sat unresolved this run");
            }
        }
    }
    Ok(resolved)
}
