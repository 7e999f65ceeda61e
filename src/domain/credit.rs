//! Stored credit balances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: Uuid,
    /// Minor units, never negative.
    pub balance: i64,
    pub updated_at: DateTime<Utc>,
}

impl CreditAccount {
    pub fn empty(user_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: 0,
            updated_at: now,
        }
    }
}

/// Balance together with the credit held by open reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CreditSummary {
    pub balance: i64,
    pub held: i64,
    pub available: i64,
}

impl CreditSummary {
    pub fn new(balance: i64, held: i64) -> Self {
        Self {
            balance,
            held,
            available: (balance - held).max(0),
        }
    }
}
