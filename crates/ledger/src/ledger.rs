//! The ledger — scrip (integer currency) plus per-principal resource
//! balances (exact decimal), conserved under concurrent mutation.

use std::collections::HashMap;

use kernel_core::KernelError;
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// A principal's full balance sheet.
#[derive(Debug, Clone, Default)]
pub struct BalanceInfo {
    pub scrip: i64,
    pub resources: HashMap<String, Decimal>,
}

#[derive(Debug, Default)]
struct LedgerInner {
    scrip: HashMap<String, i64>,
    resources: HashMap<String, HashMap<String, Decimal>>,
}

impl LedgerInner {
    fn scrip_of(&self, principal_id: &str) -> i64 {
        self.scrip.get(principal_id).copied().unwrap_or(0)
    }

    fn resource_of(&self, principal_id: &str, resource: &str) -> Decimal {
        self.resources
            .get(principal_id)
            .and_then(|r| r.get(resource))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

/// The scrip + resource ledger. All mutation is serialized by a single
/// mutex guarding both maps together: this keeps `transfer_scrip` and
/// `spend_resource` from ever interleaving against the same principal
/// mid-mutation, giving no-overdraft-under-concurrency without
/// per-principal fine-grained locking.
#[derive(Debug, Default)]
pub struct Ledger {
    inner: Mutex<LedgerInner>,
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Ensures a principal has a (possibly zero) balance entry, auto-
    /// creating one. Artifact wallets come into existence this way the
    /// first time they receive a transfer.
    pub fn ensure_principal(&self, principal_id: &str) {
        let mut inner = self.inner.lock();
        inner.scrip.entry(principal_id.to_string()).or_insert(0);
    }

    pub fn principal_exists(&self, principal_id: &str) -> bool {
        self.inner.lock().scrip.contains_key(principal_id)
    }

    // ---- scrip ----

    pub fn get_scrip(&self, principal_id: &str) -> i64 {
        self.inner.lock().scrip_of(principal_id)
    }

    pub fn can_afford_scrip(&self, principal_id: &str, amount: i64) -> bool {
        amount >= 0 && self.get_scrip(principal_id) >= amount
    }

    pub fn credit_scrip(&self, principal_id: &str, amount: i64) {
        let mut inner = self.inner.lock();
        *inner.scrip.entry(principal_id.to_string()).or_insert(0) += amount;
    }

    pub fn deduct_scrip(&self, principal_id: &str, amount: i64) -> Result<(), KernelError> {
        if amount < 0 {
            return Err(KernelError::invalid_argument("deduct amount must be non-negative"));
        }
        let mut inner = self.inner.lock();
        let balance = inner.scrip_of(principal_id);
        if balance < amount {
            return Err(KernelError::InsufficientFunds {
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }
        *inner.scrip.entry(principal_id.to_string()).or_insert(0) -= amount;
        Ok(())
    }

    /// Moves `amount` scrip from `from` to `to`. Auto-creates `to` at zero
    /// if it doesn't exist yet. Fails on non-positive amount or
    /// insufficient funds, leaving both balances untouched.
    pub fn transfer_scrip(&self, from: &str, to: &str, amount: i64) -> Result<(), KernelError> {
        if amount <= 0 {
            return Err(KernelError::invalid_argument(
                "transfer amount must be positive",
            ));
        }
        let mut inner = self.inner.lock();
        let balance = inner.scrip_of(from);
        if balance < amount {
            return Err(KernelError::InsufficientFunds {
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }
        *inner.scrip.entry(from.to_string()).or_insert(0) -= amount;
        *inner.scrip.entry(to.to_string()).or_insert(0) += amount;
        tracing::debug!(from, to, amount, "scrip transferred");
        Ok(())
    }

    pub async fn transfer_scrip_async(
        &self,
        from: &str,
        to: &str,
        amount: i64,
    ) -> Result<(), KernelError> {
        // The mutex is a plain sync mutex: the critical section never
        // spans an await point, so this is safe to call from async
        // contexts without a blocking-pool hop.
        self.transfer_scrip(from, to, amount)
    }

    pub async fn deduct_scrip_async(&self, principal_id: &str, amount: i64) -> Result<(), KernelError> {
        self.deduct_scrip(principal_id, amount)
    }

    pub async fn credit_scrip_async(&self, principal_id: &str, amount: i64) {
        self.credit_scrip(principal_id, amount)
    }

    // ---- resources ----

    pub fn get_resource(&self, principal_id: &str, resource: &str) -> Decimal {
        self.inner.lock().resource_of(principal_id, resource)
    }

    /// Float-API surface over the exact decimal balance: the conversion
    /// goes through a string round-trip rather than a lossy `as f64`/`from`
    /// cast, so consecutive float-facing operations never accumulate drift
    /// against the underlying exact value.
    pub fn get_resource_f64(&self, principal_id: &str, resource: &str) -> f64 {
        self.get_resource(principal_id, resource)
            .to_string()
            .parse()
            .unwrap_or(0.0)
    }

    pub fn credit_resource_f64(&self, principal_id: &str, resource: &str, amount: f64) {
        if let Ok(amount) = Decimal::from_str_exact(&amount.to_string()) {
            self.credit_resource(principal_id, resource, amount);
        }
    }

    pub fn spend_resource_f64(
        &self,
        principal_id: &str,
        resource: &str,
        amount: f64,
    ) -> Result<(), KernelError> {
        let amount = Decimal::from_str_exact(&amount.to_string())
            .map_err(|e| KernelError::invalid_argument(e.to_string()))?;
        self.spend_resource(principal_id, resource, amount)
    }

    pub fn can_spend_resource(&self, principal_id: &str, resource: &str, amount: Decimal) -> bool {
        amount >= Decimal::ZERO && self.get_resource(principal_id, resource) >= amount
    }

    pub fn spend_resource(
        &self,
        principal_id: &str,
        resource: &str,
        amount: Decimal,
    ) -> Result<(), KernelError> {
        if amount < Decimal::ZERO {
            return Err(KernelError::invalid_argument("spend amount must be non-negative"));
        }
        let mut inner = self.inner.lock();
        let balance = inner.resource_of(principal_id, resource);
        if balance < amount {
            return Err(KernelError::InsufficientFunds {
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }
        let entry = inner
            .resources
            .entry(principal_id.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_insert(Decimal::ZERO);
        *entry -= amount;
        Ok(())
    }

    pub fn credit_resource(&self, principal_id: &str, resource: &str, amount: Decimal) {
        let mut inner = self.inner.lock();
        let entry = inner
            .resources
            .entry(principal_id.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_insert(Decimal::ZERO);
        *entry += amount;
    }

    pub fn set_resource(&self, principal_id: &str, resource: &str, amount: Decimal) {
        let mut inner = self.inner.lock();
        inner
            .resources
            .entry(principal_id.to_string())
            .or_default()
            .insert(resource.to_string(), amount);
    }

    pub fn transfer_resource(
        &self,
        from: &str,
        to: &str,
        resource: &str,
        amount: Decimal,
    ) -> Result<(), KernelError> {
        if amount <= Decimal::ZERO {
            return Err(KernelError::invalid_argument(
                "transfer amount must be positive",
            ));
        }
        let mut inner = self.inner.lock();
        let balance = inner.resource_of(from, resource);
        if balance < amount {
            return Err(KernelError::InsufficientFunds {
                required: amount.to_string(),
                available: balance.to_string(),
            });
        }
        {
            let from_entry = inner
                .resources
                .entry(from.to_string())
                .or_default()
                .entry(resource.to_string())
                .or_insert(Decimal::ZERO);
            *from_entry -= amount;
        }
        let to_entry = inner
            .resources
            .entry(to.to_string())
            .or_default()
            .entry(resource.to_string())
            .or_insert(Decimal::ZERO);
        *to_entry += amount;
        Ok(())
    }

    pub fn get_all_resources(&self, principal_id: &str) -> HashMap<String, Decimal> {
        self.inner
            .lock()
            .resources
            .get(principal_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn spend_resource_async(
        &self,
        principal_id: &str,
        resource: &str,
        amount: Decimal,
    ) -> Result<(), KernelError> {
        self.spend_resource(principal_id, resource, amount)
    }

    pub async fn credit_resource_async(&self, principal_id: &str, resource: &str, amount: Decimal) {
        self.credit_resource(principal_id, resource, amount)
    }

    pub async fn transfer_resource_async(
        &self,
        from: &str,
        to: &str,
        resource: &str,
        amount: Decimal,
    ) -> Result<(), KernelError> {
        self.transfer_resource(from, to, resource, amount)
    }

    // ---- aggregate views ----

    pub fn get_all_balances(&self) -> HashMap<String, BalanceInfo> {
        let inner = self.inner.lock();
        let mut out: HashMap<String, BalanceInfo> = HashMap::new();
        for (principal, scrip) in &inner.scrip {
            out.entry(principal.clone()).or_default().scrip = *scrip;
        }
        for (principal, resources) in &inner.resources {
            out.entry(principal.clone()).or_default().resources = resources.clone();
        }
        out
    }

    pub fn get_agent_principal_ids(&self) -> Vec<String> {
        self.inner.lock().scrip.keys().cloned().collect()
    }

    /// Distributes `amount` scrip as universal basic income among every
    /// known principal except `exclude`, integer division with the
    /// remainder handed to the first recipients in iteration order (spec
    /// §4.7 mint auction step 5).
    pub fn distribute_ubi(&self, amount: i64, exclude: Option<&str>) -> HashMap<String, i64> {
        let mut inner = self.inner.lock();
        let mut recipients: Vec<String> = inner
            .scrip
            .keys()
            .filter(|id| Some(id.as_str()) != exclude)
            .cloned()
            .collect();
        recipients.sort();
        if recipients.is_empty() || amount <= 0 {
            return HashMap::new();
        }
        let share = amount / recipients.len() as i64;
        let mut remainder = amount % recipients.len() as i64;
        let mut distributed = HashMap::new();
        for id in &recipients {
            let mut payout = share;
            if remainder > 0 {
                payout += 1;
                remainder -= 1;
            }
            if payout > 0 {
                *inner.scrip.entry(id.clone()).or_insert(0) += payout;
                distributed.insert(id.clone(), payout);
            }
        }
        distributed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_transfer_moves_balance_and_conserves_total() {
        let ledger = Ledger::new();
        ledger.credit_scrip("a", 100);
        ledger.credit_scrip("b", 50);
        ledger.transfer_scrip("a", "b", 30).unwrap();
        assert_eq!(ledger.get_scrip("a"), 70);
        assert_eq!(ledger.get_scrip("b"), 80);
        assert_eq!(ledger.get_scrip("a") + ledger.get_scrip("b"), 150);
    }

    #[test]
    fn s2_overdraft_fails_and_leaves_balances_untouched() {
        let ledger = Ledger::new();
        ledger.credit_scrip("a", 20);
        let err = ledger.transfer_scrip("a", "b", 50).unwrap_err();
        assert!(matches!(err, KernelError::InsufficientFunds { .. }));
        assert!(err.retriable());
        assert_eq!(ledger.get_scrip("a"), 20);
        assert_eq!(ledger.get_scrip("b"), 0);
    }

    #[test]
    fn transfer_from_empty_principal_fails() {
        let ledger = Ledger::new();
        let err = ledger.transfer_scrip("ghost", "b", 1).unwrap_err();
        assert!(matches!(err, KernelError::InsufficientFunds { .. }));
    }

    #[test]
    fn transfer_auto_creates_recipient() {
        let ledger = Ledger::new();
        ledger.credit_scrip("a", 10);
        ledger.transfer_scrip("a", "new-wallet", 5).unwrap();
        assert_eq!(ledger.get_scrip("new-wallet"), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn no_overdraft_under_concurrent_deduct() {
        use std::sync::Arc;
        let ledger = Arc::new(Ledger::new());
        ledger.credit_scrip("a", 100);
        let mut handles = Vec::new();
        for _ in 0..20 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.deduct_scrip_async("a", 10).await.is_ok()
            }));
        }
        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 10);
        assert_eq!(ledger.get_scrip("a"), 0);
    }

    #[test]
    fn resource_spend_respects_exact_decimal_balance() {
        let ledger = Ledger::new();
        ledger.credit_resource("a", "cpu_seconds", Decimal::new(15, 1)); // 1.5
        ledger
            .spend_resource("a", "cpu_seconds", Decimal::new(5, 1)) // 0.5
            .unwrap();
        assert_eq!(ledger.get_resource("a", "cpu_seconds"), Decimal::new(10, 1));
        let err = ledger
            .spend_resource("a", "cpu_seconds", Decimal::new(20, 1))
            .unwrap_err();
        assert!(matches!(err, KernelError::InsufficientFunds { .. }));
    }

    #[test]
    fn distribute_ubi_hands_remainder_to_first_recipients_deterministically() {
        let ledger = Ledger::new();
        ledger.ensure_principal("winner");
        ledger.ensure_principal("alice");
        ledger.ensure_principal("bob");
        ledger.ensure_principal("carol");
        let distributed = ledger.distribute_ubi(10, Some("winner"));
        // 10 / 3 = 3 remainder 1; sorted recipients are alice, bob, carol.
        assert_eq!(distributed.get("alice"), Some(&4));
        assert_eq!(distributed.get("bob"), Some(&3));
        assert_eq!(distributed.get("carol"), Some(&3));
        assert_eq!(distributed.values().sum::<i64>(), 10);
        assert!(!distributed.contains_key("winner"));
    }
}
