//! Balance ledger trait and in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use domain::{Money, UserId};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::SagaError;

/// A user account as exposed to listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub user_id: UserId,
    #[serde(rename = "balance_cents")]
    pub balance: Money,
}

/// Read/adjust capability over user balances.
#[async_trait]
pub trait BalanceLedger: Send + Sync {
    /// Returns the balance of a user, or `None` if the user has no account.
    async fn get_balance(&self, user_id: UserId) -> Result<Option<Money>, SagaError>;

    /// Adds `delta` (negative to debit) to a balance and returns the new balance.
    ///
    /// An adjustment that would make the balance negative is rejected and
    /// leaves the balance unchanged.
    async fn adjust_balance(&self, user_id: UserId, delta: Money) -> Result<Money, SagaError>;

    /// Lists every account ordered by user ID.
    async fn list_accounts(&self) -> Result<Vec<Account>, SagaError>;
}

/// In-memory balance ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalanceLedger {
    accounts: Arc<RwLock<BTreeMap<UserId, Money>>>,
    failures_left: Arc<AtomicU32>,
}

impl InMemoryBalanceLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger holding the given accounts and opening balances.
    pub fn with_accounts(accounts: impl IntoIterator<Item = (UserId, Money)>) -> Self {
        Self {
            accounts: Arc::new(RwLock::new(accounts.into_iter().collect())),
            failures_left: Arc::default(),
        }
    }

    /// Creates a ledger with the demo accounts.
    pub fn seeded() -> Self {
        Self::with_accounts([
            (UserId::new(1), Money::from_dollars(100)),
            (UserId::new(2), Money::from_dollars(15_000)),
        ])
    }

    /// Makes the next `count` adjustments fail without touching any balance.
    pub fn fail_next_adjustments(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BalanceLedger for InMemoryBalanceLedger {
    async fn get_balance(&self, user_id: UserId) -> Result<Option<Money>, SagaError> {
        Ok(self.accounts.read().await.get(&user_id).copied())
    }

    async fn adjust_balance(&self, user_id: UserId, delta: Money) -> Result<Money, SagaError> {
        if self.take_injected_failure() {
            return Err(SagaError::BalanceLedger(format!(
                "adjustment for user {user_id} rejected"
            )));
        }

        let mut accounts = self.accounts.write().await;
        let balance = accounts
            .get_mut(&user_id)
            .ok_or(SagaError::UnknownUser(user_id))?;

        let updated = balance
            .checked_add(delta)
            .ok_or_else(|| SagaError::BalanceLedger("balance overflow".to_string()))?;
        if updated.is_negative() {
            return Err(SagaError::InsufficientFunds {
                user_id,
                required: -delta,
                available: *balance,
            });
        }

        *balance = updated;
        Ok(updated)
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, SagaError> {
        Ok(self
            .accounts
            .read()
            .await
            .iter()
            .map(|(user_id, balance)| Account {
                user_id: *user_id,
                balance: *balance,
            })
            .collect())
    }
}
