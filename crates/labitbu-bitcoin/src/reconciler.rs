//! Inscription reconciler.
//!
//! An inscription vouches for an on-chain embedding only when it (a)
//! delegates to the expected template inscription and (b) carries CBOR
//! metadata whose `labitbu` field names a txid recorded for the same sat.
//! That round trip is what stops an unrelated inscription from being accepted
//! merely because it sits on the same sat.
//!
//! Two modes share the candidate check: assignment picks the first passing
//! inscription on a sat for records that have none yet; the validation sweep
//! re-checks already-assigned records, replacing or clearing ones that no
//! longer pass.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use tracing::{debug, info, warn};

use labitbu_core::error::IndexerError;
use labitbu_core::store::RecordStore;

use crate::client::ChainClient;

/// Template inscription every genuine labitbu inscription delegates to.
pub const EXPECTED_DELEGATE: &str =
    "0afcead3c7b6c065ec4e00411aec22f04f8b93d9a81de690bbc161b14d1beb00i0";

/// Why a candidate inscription failed the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckFailure {
    /// No records on file for the sat, so nothing to validate against.
    NoTxidsForSat,
    /// Delegate field missing or not the expected template.
    WrongDelegate,
    /// Inscription carries no metadata.
    NoMetadata,
    /// Metadata undecodable or missing the `labitbu` field.
    NoLabitbuKey,
    /// The claimed txid is not on record for this sat.
    WrongTxid,
    /// A network call failed; the candidate may pass on a later run.
    ApiError,
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoTxidsForSat => write!(f, "no txids for sat"),
            Self::WrongDelegate => write!(f, "wrong delegate"),
            Self::NoMetadata => write!(f, "no metadata"),
            Self::NoLabitbuKey => write!(f, "no labitbu key"),
            Self::WrongTxid => write!(f, "wrong txid"),
            Self::ApiError => write!(f, "api error"),
        }
    }
}

/// Metadata payload, reduced to the field the check consumes.
#[derive(Debug, Deserialize)]
struct LabitbuMetadata {
    #[serde(default)]
    labitbu: Option<String>,
}

/// Decode hex-encoded CBOR metadata and pull out the claimed txid.
fn decode_labitbu_claim(metadata_hex: &str) -> Option<String> {
    let bytes = hex::decode(metadata_hex).ok()?;
    let metadata: LabitbuMetadata = serde_cbor::from_slice(&bytes).ok()?;
    metadata.labitbu
}

/// Run the candidate check against one inscription.
pub async fn check_candidate<C: ChainClient>(
    client: &C,
    inscription_id: &str,
    valid_txids: &[String],
) -> Result<(), CheckFailure> {
    if valid_txids.is_empty() {
        return Err(CheckFailure::NoTxidsForSat);
    }

    let detail = client
        .inscription_detail(inscription_id)
        .await
        .map_err(|_| CheckFailure::ApiError)?;
    if detail.delegate.as_deref() != Some(EXPECTED_DELEGATE) {
        return Err(CheckFailure::WrongDelegate);
    }

    let metadata_hex = client
        .inscription_metadata(inscription_id)
        .await
        .map_err(|_| CheckFailure::ApiError)?;
    let Some(metadata_hex) = metadata_hex.filter(|m| !m.is_empty()) else {
        return Err(CheckFailure::NoMetadata);
    };

    let Some(claimed_txid) = decode_labitbu_claim(&metadata_hex) else {
        return Err(CheckFailure::NoLabitbuKey);
    };

    if valid_txids.iter().any(|txid| *txid == claimed_txid) {
        Ok(())
    } else {
        Err(CheckFailure::WrongTxid)
    }
}

/// Find the first inscription on `sat` that passes the check, skipping
/// `exclude` (the candidate that just failed). Failed candidates are skipped,
/// never fatal.
async fn find_valid_on_sat<C: ChainClient>(
    client: &C,
    sat: u64,
    valid_txids: &[String],
    exclude: Option<&str>,
) -> Option<String> {
    let inscription_ids = match client.inscriptions_for_sat(sat).await {
        Ok(ids) => ids,
        Err(err) => {
            warn!(sat, %err, "inscription listing failed");
            return None;
        }
    };

    for inscription_id in inscription_ids {
        if Some(inscription_id.as_str()) == exclude {
            continue;
        }
        match check_candidate(client, &inscription_id, valid_txids).await {
            Ok(()) => return Some(inscription_id),
            Err(reason) => {
                debug!(sat, inscription_id = %inscription_id, %reason, "candidate rejected");
            }
        }
    }
    None
}

/// Assignment mode: attach a verified inscription to every record that has a
/// resolved sat but no inscription yet. Returns how many records were
/// assigned.
pub async fn assign_inscriptions<C: ChainClient, S: RecordStore>(
    client: &C,
    store: &S,
) -> Result<u64, IndexerError> {
    let pending = store.find_resolved_sat_no_inscription().await?;
    info!(count = pending.len(), "assigning inscriptions");

    // One verdict per sat: every record sharing the sat gets the same
    // inscription (or none, this run).
    let mut verdicts: HashMap<u64, Option<String>> = HashMap::new();
    let mut assigned = 0u64;

    for record in pending {
        let Some(sat) = record.sat else { continue };

        if !verdicts.contains_key(&sat) {
            let valid_txids = store.find_txids_for_sat(sat).await?;
            let verdict = find_valid_on_sat(client, sat, &valid_txids, None).await;
            verdicts.insert(sat, verdict);
        }

        if let Some(Some(inscription_id)) = verdicts.get(&sat) {
            store
                .update_inscription(record.id, Some(inscription_id.as_str()))
                .await?;
            info!(id = record.id, sat, inscription_id = %inscription_id, "inscription assigned");
            assigned += 1;
        } else {
            debug!(id = record.id, sat, "no valid inscription on sat this run");
        }
    }
    Ok(assigned)
}

/// Tally of one validation sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub total: u64,
    pub valid: u64,
    pub invalid: u64,
    /// Invalid entries repaired with an alternative inscription.
    pub replaced: u64,
    /// Invalid entries with no alternative; inscription cleared.
    pub cleared: u64,
    /// Failure reason → occurrence count.
    pub reasons: BTreeMap<String, u64>,
}

/// Validation mode: re-check every record that carries an inscription.
///
/// A record whose inscription no longer passes gets repaired with the first
/// passing alternative on the same sat, or cleared for re-assignment on a
/// later run.
pub async fn validate_assigned<C: ChainClient, S: RecordStore>(
    client: &C,
    store: &S,
) -> Result<SweepReport, IndexerError> {
    let entries = store.find_with_inscription().await?;
    info!(count = entries.len(), "validating assigned inscriptions");

    let mut report = SweepReport {
        total: entries.len() as u64,
        ..SweepReport::default()
    };

    for record in entries {
        let Some(current) = record.inscription_id.clone() else {
            continue;
        };
        let Some(sat) = record.sat else { continue };

        let valid_txids = store.find_txids_for_sat(sat).await?;
        match check_candidate(client, &current, &valid_txids).await {
            Ok(()) => {
                report.valid += 1;
            }
            Err(reason) => {
                report.invalid += 1;
                *report.reasons.entry(reason.to_string()).or_default() += 1;
                warn!(id = record.id, txid = %record.txid, %reason, "inscription failed validation");

                match find_valid_on_sat(client, sat, &valid_txids, Some(&current)).await {
                    Some(replacement) => {
                        store
                            .update_inscription(record.id, Some(replacement.as_str()))
                            .await?;
                        report.replaced += 1;
                        info!(id = record.id, replacement = %replacement, "inscription replaced");
                    }
                    None => {
                        store.update_inscription(record.id, None).await?;
                        report.cleared += 1;
                        info!(id = record.id, "inscription cleared");
                    }
                }
            }
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InscriptionDetail;
    use crate::mock::MockChainClient;
    use labitbu_core::types::NewRecord;
    use labitbu_storage::MemoryStore;

    fn delegate_detail(delegate: &str) -> InscriptionDetail {
        InscriptionDetail {
            delegate: Some(delegate.to_string()),
        }
    }

    fn metadata_hex(txid: &str) -> String {
        let mut map = std::collections::BTreeMap::new();
        map.insert("labitbu".to_string(), txid.to_string());
        hex::encode(serde_cbor::to_vec(&map).unwrap())
    }

    /// Register a fully valid inscription claiming `txid`.
    fn add_valid(client: &mut MockChainClient, id: &str, txid: &str) {
        client
            .details
            .insert(id.into(), delegate_detail(EXPECTED_DELEGATE));
        client.metadata.insert(id.into(), metadata_hex(txid));
    }

    async fn seeded_store(entries: &[(&str, u64)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (txid, sat) in entries {
            store
                .insert_if_absent(&NewRecord {
                    txid: (*txid).into(),
                    vin: 0,
                    checksum: format!("c-{txid}"),
                })
                .await
                .unwrap();
            let id = store.find_by_txid(txid).await.unwrap()[0].id;
            store.update_sat(id, *sat).await.unwrap();
        }
        store
    }

    // ── Candidate check ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn wrong_delegate_fails_regardless_of_metadata() {
        let mut client = MockChainClient::new();
        client
            .details
            .insert("cand".into(), delegate_detail("someoneelsei0"));
        client.metadata.insert("cand".into(), metadata_hex("tx-a"));

        let valid = vec!["tx-a".to_string()];
        assert_eq!(
            check_candidate(&client, "cand", &valid).await,
            Err(CheckFailure::WrongDelegate)
        );
    }

    #[tokio::test]
    async fn valid_claim_passes() {
        let mut client = MockChainClient::new();
        add_valid(&mut client, "cand", "abc");

        let valid = vec!["abc".to_string(), "other".to_string()];
        assert_eq!(check_candidate(&client, "cand", &valid).await, Ok(()));
    }

    #[tokio::test]
    async fn claim_outside_valid_set_is_wrong_txid() {
        let mut client = MockChainClient::new();
        add_valid(&mut client, "cand", "stranger");

        let valid = vec!["abc".to_string()];
        assert_eq!(
            check_candidate(&client, "cand", &valid).await,
            Err(CheckFailure::WrongTxid)
        );
    }

    #[tokio::test]
    async fn missing_metadata_and_bad_cbor() {
        let mut client = MockChainClient::new();
        client
            .details
            .insert("no-meta".into(), delegate_detail(EXPECTED_DELEGATE));

        client
            .details
            .insert("bad-cbor".into(), delegate_detail(EXPECTED_DELEGATE));
        client
            .metadata
            .insert("bad-cbor".into(), "zzzz-not-hex".into());

        client
            .details
            .insert("no-key".into(), delegate_detail(EXPECTED_DELEGATE));
        let unrelated = hex::encode(serde_cbor::to_vec(&42u32).unwrap());
        client.metadata.insert("no-key".into(), unrelated);

        let valid = vec!["abc".to_string()];
        assert_eq!(
            check_candidate(&client, "no-meta", &valid).await,
            Err(CheckFailure::NoMetadata)
        );
        assert_eq!(
            check_candidate(&client, "bad-cbor", &valid).await,
            Err(CheckFailure::NoLabitbuKey)
        );
        assert_eq!(
            check_candidate(&client, "no-key", &valid).await,
            Err(CheckFailure::NoLabitbuKey)
        );
    }

    #[tokio::test]
    async fn network_failure_is_api_error() {
        let client = MockChainClient::new();
        let valid = vec!["abc".to_string()];
        assert_eq!(
            check_candidate(&client, "missing", &valid).await,
            Err(CheckFailure::ApiError)
        );
    }

    #[tokio::test]
    async fn empty_valid_set_short_circuits() {
        let client = MockChainClient::new();
        assert_eq!(
            check_candidate(&client, "cand", &[]).await,
            Err(CheckFailure::NoTxidsForSat)
        );
    }

    // ── Assignment mode ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_passing_candidate_is_assigned_to_all_records_on_sat() {
        let mut client = MockChainClient::new();
        // Listing order matters: the forgery comes first but fails.
        client.sat_inscriptions.insert(
            5000,
            vec!["forgeryi0".into(), "genuinei0".into(), "latei0".into()],
        );
        client
            .details
            .insert("forgeryi0".into(), delegate_detail("wrongi0"));
        add_valid(&mut client, "genuinei0", "tx-a");
        add_valid(&mut client, "latei0", "tx-b");

        let store = seeded_store(&[("tx-a", 5000), ("tx-b", 5000)]).await;
        let assigned = assign_inscriptions(&client, &store).await.unwrap();
        assert_eq!(assigned, 2);

        for txid in ["tx-a", "tx-b"] {
            let rec = &store.find_by_txid(txid).await.unwrap()[0];
            assert_eq!(rec.inscription_id.as_deref(), Some("genuinei0"));
        }
    }

    #[tokio::test]
    async fn no_passing_candidate_leaves_records_unassigned() {
        let mut client = MockChainClient::new();
        client
            .sat_inscriptions
            .insert(5000, vec!["forgeryi0".into()]);
        client
            .details
            .insert("forgeryi0".into(), delegate_detail("wrongi0"));

        let store = seeded_store(&[("tx-a", 5000)]).await;
        assert_eq!(assign_inscriptions(&client, &store).await.unwrap(), 0);
        assert!(store.find_with_inscription().await.unwrap().is_empty());
    }

    // ── Validation sweep ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn sweep_keeps_valid_assignments() {
        let mut client = MockChainClient::new();
        add_valid(&mut client, "goodi0", "tx-a");

        let store = seeded_store(&[("tx-a", 5000)]).await;
        let id = store.find_by_txid("tx-a").await.unwrap()[0].id;
        store.update_inscription(id, Some("goodi0")).await.unwrap();

        let report = validate_assigned(&client, &store).await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.valid, 1);
        assert_eq!(report.invalid, 0);

        let rec = &store.find_by_txid("tx-a").await.unwrap()[0];
        assert_eq!(rec.inscription_id.as_deref(), Some("goodi0"));
    }

    #[tokio::test]
    async fn sweep_replaces_invalidated_assignment() {
        let mut client = MockChainClient::new();
        // Previously assigned inscription now carries the wrong delegate.
        client
            .details
            .insert("revokedi0".into(), delegate_detail("wrongi0"));
        add_valid(&mut client, "goodi0", "tx-a");
        client
            .sat_inscriptions
            .insert(5000, vec!["revokedi0".into(), "goodi0".into()]);

        let store = seeded_store(&[("tx-a", 5000)]).await;
        let id = store.find_by_txid("tx-a").await.unwrap()[0].id;
        store
            .update_inscription(id, Some("revokedi0"))
            .await
            .unwrap();

        let report = validate_assigned(&client, &store).await.unwrap();
        assert_eq!(report.invalid, 1);
        assert_eq!(report.replaced, 1);
        assert_eq!(report.cleared, 0);
        assert_eq!(report.reasons.get("wrong delegate"), Some(&1));

        let rec = &store.find_by_txid("tx-a").await.unwrap()[0];
        assert_eq!(rec.inscription_id.as_deref(), Some("goodi0"));
    }

    #[tokio::test]
    async fn sweep_clears_when_no_alternative_passes() {
        let mut client = MockChainClient::new();
        client
            .details
            .insert("revokedi0".into(), delegate_detail("wrongi0"));
        client
            .sat_inscriptions
            .insert(5000, vec!["revokedi0".into()]);

        let store = seeded_store(&[("tx-a", 5000)]).await;
        let id = store.find_by_txid("tx-a").await.unwrap()[0].id;
        store
            .update_inscription(id, Some("revokedi0"))
            .await
            .unwrap();

        let report = validate_assigned(&client, &store).await.unwrap();
        assert_eq!(report.cleared, 1);
        assert_eq!(report.replaced, 0);

        let rec = &store.find_by_txid("tx-a").await.unwrap()[0];
        assert!(rec.inscription_id.is_none());
        // Back in the assignment queue for the next run.
        assert_eq!(
            store.find_resolved_sat_no_inscription().await.unwrap().len(),
            1
        );
    }
}
