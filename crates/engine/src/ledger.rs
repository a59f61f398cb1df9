//! Exactly-once completion accounting.

use std::collections::HashSet;

use parking_lot::Mutex;

use caravan_core::AccountId;

#[derive(Debug, Default)]
struct LedgerInner {
    counted: HashSet<AccountId>,
    total: u64,
}

/// Shared counter of accounts that reached a terminal state this process
/// lifetime.
///
/// One mutex guards both the dedup set and the counter, so an account is
/// counted exactly once no matter how many concurrent tasks finalize it.
/// The `was_in_progress` guard keeps resumed accounts whose run never
/// actually started from inflating the count.
#[derive(Debug, Default)]
pub struct CompletionLedger {
    inner: Mutex<LedgerInner>,
}

impl CompletionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `account_id` if it has not been counted yet and its route was
    /// `InProgress` before the terminal write. Returns the updated total
    /// either way.
    pub fn record_if_first_terminal(&self, account_id: AccountId, was_in_progress: bool) -> u64 {
        let mut inner = self.inner.lock();
        if was_in_progress && !inner.counted.contains(&account_id) {
            inner.counted.insert(account_id);
            inner.total += 1;
        }
        inner.total
    }

    /// The current completion total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.inner.lock().total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_once_per_account() {
        let ledger = CompletionLedger::new();
        let id = AccountId::v4();

        assert_eq!(ledger.record_if_first_terminal(id, true), 1);
        assert_eq!(ledger.record_if_first_terminal(id, true), 1);
        assert_eq!(ledger.total(), 1);
    }

    #[test]
    fn skips_accounts_that_never_started() {
        let ledger = CompletionLedger::new();
        assert_eq!(ledger.record_if_first_terminal(AccountId::v4(), false), 0);
        assert_eq!(ledger.total(), 0);
    }

    #[test]
    fn distinct_accounts_accumulate() {
        let ledger = CompletionLedger::new();
        for i in 1..=5 {
            assert_eq!(ledger.record_if_first_terminal(AccountId::v4(), true), i);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn exact_count_under_concurrency() {
        let ledger = Arc::new(CompletionLedger::new());
        let ids: Vec<AccountId> = (0..64).map(|_| AccountId::v4()).collect();

        let mut handles = Vec::new();
        for id in &ids {
            // Two tasks race to finalize the same account.
            for _ in 0..2 {
                let ledger = Arc::clone(&ledger);
                let id = *id;
                handles.push(tokio::spawn(async move {
                    ledger.record_if_first_terminal(id, true)
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // No double count, no lost count.
        assert_eq!(ledger.total(), 64);
    }
}
