//! The mint auction: a kernel primitive that lets principals bid scrip to
//! have an artifact scored and, if the score warrants it, new scrip minted
//! for the winner — illustrative of a non-trivial economic invariant the
//! core must uphold (Testable Property 7).

use std::collections::HashMap;

use kernel_core::KernelError;
use kernel_ledger::Ledger;
use kernel_store::{Artifact, ArtifactStore};
use parking_lot::Mutex;
use uuid::Uuid;

/// A principal's pending bid to mint scrip against an artifact it owns.
#[derive(Debug, Clone)]
pub struct MintSubmission {
    pub submission_id: String,
    pub principal_id: String,
    pub artifact_id: String,
    pub bid: i64,
    pub tick_submitted: u64,
}

/// Outcome of resolving one auction round.
#[derive(Debug, Clone, Default)]
pub struct MintAuctionResult {
    pub winner_id: Option<String>,
    pub artifact_id: Option<String>,
    pub winning_bid: i64,
    pub price_paid: i64,
    pub score: Option<u64>,
    pub scrip_minted: i64,
    pub ubi_distributed: HashMap<String, i64>,
    pub error: Option<String>,
    pub tick_resolved: u64,
}

/// Scores a winning artifact for mint purposes. Production hosts wire this
/// to an LLM-backed scorer; tests and hosts without one use
/// [`NullMintScorer`]/[`StaticMintScorer`].
pub trait MintScorer: Send + Sync {
    fn score(&self, artifact: &Artifact) -> Option<u64>;
}

/// Always declines to score — minting never happens, matching a host with
/// no scorer wired up.
#[derive(Debug, Default)]
pub struct NullMintScorer;

impl MintScorer for NullMintScorer {
    fn score(&self, _artifact: &Artifact) -> Option<u64> {
        None
    }
}

/// Returns a fixed score for every artifact, for tests exercising the
/// auction mechanics without a real scorer.
#[derive(Debug, Clone, Copy)]
pub struct StaticMintScorer(pub u64);

impl MintScorer for StaticMintScorer {
    fn score(&self, _artifact: &Artifact) -> Option<u64> {
        Some(self.0)
    }
}

/// The in-memory mint auction state machine: pending submissions, held
/// bids, and resolution history.
#[derive(Default)]
pub struct MintAuction {
    submissions: Mutex<HashMap<String, MintSubmission>>,
    held_bids: Mutex<HashMap<String, i64>>,
    history: Mutex<Vec<MintAuctionResult>>,
}

impl MintAuction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(
        &self,
        ledger: &Ledger,
        store: &ArtifactStore,
        principal_id: &str,
        artifact_id: &str,
        bid: i64,
        tick: u64,
    ) -> Result<String, KernelError> {
        let artifact = store
            .get(artifact_id)
            .ok_or_else(|| KernelError::not_found(artifact_id))?;
        if artifact.created_by != principal_id {
            return Err(KernelError::not_authorized(format!(
                "{principal_id} is not the creator of {artifact_id}"
            )));
        }
        if !artifact.executable {
            return Err(KernelError::invalid_argument(format!(
                "artifact {artifact_id} is not executable"
            )));
        }
        if bid <= 0 {
            return Err(KernelError::invalid_argument("bid must be positive"));
        }

        ledger.deduct_scrip(principal_id, bid)?;

        let submission_id = format!("mint_sub_{}", &Uuid::new_v4().simple().to_string()[..8]);
        self.submissions.lock().insert(
            submission_id.clone(),
            MintSubmission {
                submission_id: submission_id.clone(),
                principal_id: principal_id.to_string(),
                artifact_id: artifact_id.to_string(),
                bid,
                tick_submitted: tick,
            },
        );
        *self.held_bids.lock().entry(principal_id.to_string()).or_insert(0) += bid;
        Ok(submission_id)
    }

    pub fn cancel(&self, ledger: &Ledger, principal_id: &str, submission_id: &str) -> bool {
        let submission = {
            let mut submissions = self.submissions.lock();
            match submissions.get(submission_id) {
                Some(sub) if sub.principal_id == principal_id => submissions.remove(submission_id),
                _ => return false,
            }
        };
        let Some(submission) = submission else {
            return false;
        };
        ledger.credit_scrip(principal_id, submission.bid);
        let mut held = self.held_bids.lock();
        let entry = held.entry(principal_id.to_string()).or_insert(0);
        *entry = (*entry - submission.bid).max(0);
        true
    }

    pub fn pending_submissions(&self) -> Vec<MintSubmission> {
        self.submissions.lock().values().cloned().collect()
    }

    pub fn history(&self, limit: usize) -> Vec<MintAuctionResult> {
        let history = self.history.lock();
        history.iter().rev().take(limit).cloned().collect()
    }

    /// Resolves the current round: highest bid wins, pays the second-highest
    /// bid (or `minimum_bid` if solo), losers are refunded in full, the
    /// winner is refunded the overbid delta, the winning artifact is scored
    /// and new scrip minted proportional to `score / mint_ratio`, and (when
    /// `ubi_enabled`) `price_paid` is redistributed among every principal
    /// but the winner.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        ledger: &Ledger,
        store: &ArtifactStore,
        scorer: &dyn MintScorer,
        mint_ratio: u64,
        minimum_bid: i64,
        ubi_enabled: bool,
        tick: u64,
    ) -> MintAuctionResult {
        let mut submissions: Vec<MintSubmission> = {
            let mut guard = self.submissions.lock();
            let subs = guard.values().cloned().collect();
            guard.clear();
            subs
        };
        self.held_bids.lock().clear();

        if submissions.is_empty() {
            let result = MintAuctionResult {
                error: Some("no submissions".to_string()),
                tick_resolved: tick,
                ..Default::default()
            };
            self.history.lock().push(result.clone());
            return result;
        }

        submissions.sort_by(|a, b| b.bid.cmp(&a.bid));
        let winner = submissions[0].clone();
        let price_paid = if submissions.len() > 1 {
            submissions[1].bid
        } else {
            minimum_bid
        };

        for loser in &submissions[1..] {
            ledger.credit_scrip(&loser.principal_id, loser.bid);
        }

        let refund_to_winner = winner.bid - price_paid;
        if refund_to_winner > 0 {
            ledger.credit_scrip(&winner.principal_id, refund_to_winner);
        }

        let ubi_distributed = if ubi_enabled {
            ledger.distribute_ubi(price_paid, Some(&winner.principal_id))
        } else {
            HashMap::new()
        };

        let (score, scrip_minted, error) = match store.get(&winner.artifact_id) {
            Some(artifact) => match scorer.score(&artifact) {
                Some(score) => {
                    let minted = (score / mint_ratio) as i64;
                    if minted > 0 {
                        ledger.credit_scrip(&winner.principal_id, minted);
                    }
                    (Some(score), minted, None)
                }
                None => (None, 0, Some("scoring failed".to_string())),
            },
            None => (None, 0, Some(format!("artifact {} not found", winner.artifact_id))),
        };

        let result = MintAuctionResult {
            winner_id: Some(winner.principal_id.clone()),
            artifact_id: Some(winner.artifact_id.clone()),
            winning_bid: winner.bid,
            price_paid,
            score,
            scrip_minted,
            ubi_distributed,
            error,
            tick_resolved: tick,
        };
        self.history.lock().push(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_core::IdRegistry;
    use kernel_store::{PermissiveValidator, WriteRequest};
    use std::sync::Arc;

    fn setup() -> (Ledger, ArtifactStore, MintAuction) {
        let ledger = Ledger::new();
        let store = ArtifactStore::new(Arc::new(IdRegistry::new()), Arc::new(PermissiveValidator));
        (ledger, store, MintAuction::new())
    }

    fn make_artifact(store: &ArtifactStore, id: &str, creator: &str) {
        store
            .write(WriteRequest {
                id: Some(id.to_string()),
                created_by: creator.to_string(),
                executable: true,
                code: "fn run(args) { 1 }".to_string(),
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn s6_three_bids_vickrey_resolution() {
        let (ledger, store, auction) = setup();
        ledger.credit_scrip("alice", 100);
        ledger.credit_scrip("bob", 70);
        ledger.credit_scrip("carol", 40);
        ledger.ensure_principal("dave");
        make_artifact(&store, "art-alice", "alice");
        make_artifact(&store, "art-bob", "bob");
        make_artifact(&store, "art-carol", "carol");

        auction.submit(&ledger, &store, "alice", "art-alice", 100, 0).unwrap();
        auction.submit(&ledger, &store, "bob", "art-bob", 70, 0).unwrap();
        auction.submit(&ledger, &store, "carol", "art-carol", 40, 0).unwrap();

        let result = auction.resolve(&ledger, &store, &NullMintScorer, 10, 1, true, 0);
        assert_eq!(result.winner_id.as_deref(), Some("alice"));
        assert_eq!(result.price_paid, 70);
        assert_eq!(result.winning_bid, 100);
        // winner refunded the 30 overbid delta.
        assert_eq!(ledger.get_scrip("alice"), 30);
        // losers refunded in full.
        assert_eq!(ledger.get_scrip("bob"), 70);
        assert_eq!(ledger.get_scrip("carol"), 40);
        // price_paid of 70 redistributed as UBI among non-winners.
        assert_eq!(result.ubi_distributed.values().sum::<i64>(), 70);
        assert_eq!(auction.history(1).len(), 1);
    }

    #[test]
    fn solo_submission_pays_minimum_bid() {
        let (ledger, store, auction) = setup();
        ledger.credit_scrip("alice", 50);
        make_artifact(&store, "art-alice", "alice");
        auction.submit(&ledger, &store, "alice", "art-alice", 50, 0).unwrap();

        let result = auction.resolve(&ledger, &store, &NullMintScorer, 10, 1, true, 0);
        assert_eq!(result.price_paid, 1);
        assert_eq!(ledger.get_scrip("alice"), 50 - 1);
    }

    #[test]
    fn cancel_refunds_the_held_bid() {
        let (ledger, store, auction) = setup();
        ledger.credit_scrip("alice", 50);
        make_artifact(&store, "art-alice", "alice");
        let submission_id = auction.submit(&ledger, &store, "alice", "art-alice", 50, 0).unwrap();
        assert_eq!(ledger.get_scrip("alice"), 0);
        assert!(auction.cancel(&ledger, "alice", &submission_id));
        assert_eq!(ledger.get_scrip("alice"), 50);
        assert!(auction.pending_submissions().is_empty());
    }

    #[test]
    fn scoring_mints_scrip_proportional_to_ratio() {
        let (ledger, store, auction) = setup();
        ledger.credit_scrip("alice", 50);
        make_artifact(&store, "art-alice", "alice");
        auction.submit(&ledger, &store, "alice", "art-alice", 50, 0).unwrap();

        let result = auction.resolve(&ledger, &store, &StaticMintScorer(95), 10, 1, true, 0);
        assert_eq!(result.score, Some(95));
        assert_eq!(result.scrip_minted, 9);
    }
}
