//! In-process implementation of the storage and chat ports.
//!
//! Each session works on a snapshot of the whole state. Commit validates the versions of
//! everything the session wrote (and the accounts it locked) against the live state, re-checks
//! slot uniqueness, then publishes the writes in one step.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::domain::{
    format_invoice_number, Booking, BookingRequest, Court, CreditAccount, PaymentMethod,
    PricingRules, Slot, Transaction, TxStatus, Venue,
};
use crate::ports::{ChatDirectory, RepositoryError, RepositoryResult, Session, Store};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    venues: HashMap<Uuid, Venue>,
    courts: HashMap<Uuid, Court>,
    pricing: HashMap<Uuid, PricingRules>,
    bookings: HashMap<Uuid, Booking>,
    transactions: HashMap<Uuid, Transaction>,
    requests: HashMap<Uuid, BookingRequest>,
    accounts: HashMap<Uuid, CreditAccount>,
    /// Bumped whenever a committed session locked the account.
    account_versions: HashMap<Uuid, u64>,
    invoice_counters: HashMap<i32, i64>,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn seed_venue(&self, venue: Venue) {
        self.lock().venues.insert(venue.id, venue);
    }

    pub fn seed_court(&self, court: Court) {
        self.lock().courts.insert(court.id, court);
    }

    pub fn set_pricing(&self, court_id: Uuid, rules: PricingRules) {
        self.lock().pricing.insert(court_id, rules);
    }

    pub fn set_balance(&self, user_id: Uuid, balance: i64) {
        let mut state = self.lock();
        state.accounts.insert(
            user_id,
            CreditAccount {
                user_id,
                balance,
                updated_at: Utc::now(),
            },
        );
        *state.account_versions.entry(user_id).or_default() += 1;
    }

    pub fn balance(&self, user_id: Uuid) -> i64 {
        self.lock()
            .accounts
            .get(&user_id)
            .map(|account| account.balance)
            .unwrap_or(0)
    }

    pub fn booking(&self, id: Uuid) -> Option<Booking> {
        self.lock().bookings.get(&id).cloned()
    }

    pub fn transaction(&self, id: Uuid) -> Option<Transaction> {
        self.lock().transactions.get(&id).cloned()
    }

    pub fn transactions_for(&self, user_id: Uuid) -> Vec<Transaction> {
        let mut txns: Vec<Transaction> = self
            .lock()
            .transactions
            .values()
            .filter(|txn| txn.user_id == user_id)
            .cloned()
            .collect();
        txns.sort_by_key(|txn| txn.created_at);
        txns
    }

    pub fn booking_request(&self, id: Uuid) -> Option<BookingRequest> {
        self.lock().requests.get(&id).cloned()
    }

    /// Overwrites a transaction outside any session, e.g. to age it for a reaper test.
    pub fn put_transaction(&self, txn: Transaction) {
        self.lock().transactions.insert(txn.id, txn);
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn Session>> {
        let snapshot = self.lock().clone();
        Ok(Box::new(InMemorySession {
            live: Arc::clone(&self.state),
            work: snapshot,
            booking_writes: HashMap::new(),
            transaction_writes: HashMap::new(),
            request_writes: HashMap::new(),
            account_locks: HashMap::new(),
            invoice_reads: HashMap::new(),
        }))
    }
}

struct InMemorySession {
    live: Arc<Mutex<MemoryState>>,
    work: MemoryState,
    /// Version each written entity had when this session first wrote it; `None` for inserts.
    booking_writes: HashMap<Uuid, Option<i64>>,
    transaction_writes: HashMap<Uuid, Option<i64>>,
    request_writes: HashMap<Uuid, Option<i64>>,
    account_locks: HashMap<Uuid, u64>,
    invoice_reads: HashMap<i32, i64>,
}

impl InMemorySession {
    fn lock_account(&mut self, user_id: Uuid) {
        let version = self
            .work
            .account_versions
            .get(&user_id)
            .copied()
            .unwrap_or(0);
        self.account_locks.entry(user_id).or_insert(version);
    }

    fn account(&self, user_id: Uuid) -> CreditAccount {
        self.work
            .accounts
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| CreditAccount::empty(user_id, Utc::now()))
    }
}

fn overlapping_confirmed<'a>(
    others: impl Iterator<Item = &'a Booking>,
    booking: &Booking,
) -> Vec<Slot> {
    let mut taken = Vec::new();
    for other in others.filter(|other| {
        other.is_confirmed() && other.court_id == booking.court_id && other.date == booking.date
    }) {
        for slot in other.overlapping(&booking.slots) {
            if !taken.contains(&slot) {
                taken.push(slot);
            }
        }
    }
    taken.sort();
    taken
}

fn check_version(
    kind: &str,
    id: Uuid,
    current: Option<i64>,
    expected: Option<i64>,
) -> RepositoryResult<()> {
    if current != expected {
        return Err(RepositoryError::Conflict(format!(
            "{kind} {id} was modified concurrently"
        )));
    }
    Ok(())
}

#[async_trait]
impl Session for InMemorySession {
    async fn venue(&mut self, id: Uuid) -> RepositoryResult<Option<Venue>> {
        Ok(self.work.venues.get(&id).cloned())
    }

    async fn court(&mut self, id: Uuid) -> RepositoryResult<Option<Court>> {
        Ok(self.work.courts.get(&id).cloned())
    }

    async fn pricing(&mut self, court_id: Uuid) -> RepositoryResult<PricingRules> {
        Ok(self.work.pricing.get(&court_id).cloned().unwrap_or_default())
    }

    async fn confirmed_slots(
        &mut self,
        court_id: Uuid,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<Slot>> {
        let mut slots: Vec<Slot> = self
            .work
            .bookings
            .values()
            .filter(|b| b.is_confirmed() && b.court_id == court_id && b.date == date)
            .flat_map(|b| b.slots.iter().copied())
            .collect();
        slots.sort();
        slots.dedup();
        Ok(slots)
    }

    async fn booking(&mut self, id: Uuid) -> RepositoryResult<Option<Booking>> {
        Ok(self.work.bookings.get(&id).cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> RepositoryResult<()> {
        if self.work.bookings.contains_key(&booking.id) {
            return Err(RepositoryError::Conflict(format!(
                "booking {} already exists",
                booking.id
            )));
        }
        if booking.is_confirmed() {
            let taken = overlapping_confirmed(self.work.bookings.values(), booking);
            if !taken.is_empty() {
                return Err(RepositoryError::SlotTaken(taken));
            }
        }
        self.booking_writes.insert(booking.id, None);
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &mut Booking) -> RepositoryResult<()> {
        let current = self
            .work
            .bookings
            .get(&booking.id)
            .map(|b| b.version)
            .ok_or_else(|| RepositoryError::NotFound(format!("booking {}", booking.id)))?;
        check_version("booking", booking.id, Some(current), Some(booking.version))?;

        if booking.is_confirmed() {
            let taken = overlapping_confirmed(
                self.work.bookings.values().filter(|b| b.id != booking.id),
                booking,
            );
            if !taken.is_empty() {
                return Err(RepositoryError::SlotTaken(taken));
            }
        }

        self.booking_writes.entry(booking.id).or_insert(Some(current));
        booking.version += 1;
        self.work.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn next_invoice_number(&mut self, year: i32) -> RepositoryResult<String> {
        let counter = self.work.invoice_counters.entry(year).or_insert(0);
        self.invoice_reads.entry(year).or_insert(*counter);
        *counter += 1;
        Ok(format_invoice_number(year, *counter))
    }

    async fn transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        Ok(self.work.transactions.get(&id).cloned())
    }

    async fn transaction_by_order(
        &mut self,
        order_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .work
            .transactions
            .values()
            .find(|txn| txn.gateway_order_id.as_deref() == Some(order_id))
            .cloned())
    }

    async fn transaction_by_payment(
        &mut self,
        payment_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        Ok(self
            .work
            .transactions
            .values()
            .find(|txn| txn.gateway_payment_id.as_deref() == Some(payment_id))
            .cloned())
    }

    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        if self.work.transactions.contains_key(&txn.id) {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} already exists",
                txn.id
            )));
        }
        self.transaction_writes.insert(txn.id, None);
        self.work.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn update_transaction(&mut self, txn: &mut Transaction) -> RepositoryResult<()> {
        let current = self
            .work
            .transactions
            .get(&txn.id)
            .map(|t| t.version)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", txn.id)))?;
        check_version("transaction", txn.id, Some(current), Some(txn.version))?;

        self.transaction_writes.entry(txn.id).or_insert(Some(current));
        txn.version += 1;
        self.work.transactions.insert(txn.id, txn.clone());
        Ok(())
    }

    async fn pending_transactions_for(
        &mut self,
        booking_id: Uuid,
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut pending: Vec<Transaction> = self
            .work
            .transactions
            .values()
            .filter(|txn| txn.status == TxStatus::Created && txn.booking_ids.contains(&booking_id))
            .cloned()
            .collect();
        pending.sort_by_key(|txn| txn.created_at);
        Ok(pending)
    }

    async fn stale_transactions(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>> {
        let mut stale: Vec<Transaction> = self
            .work
            .transactions
            .values()
            .filter(|txn| {
                txn.status == TxStatus::Created
                    && txn.method == method
                    && txn.created_at < older_than
            })
            .cloned()
            .collect();
        stale.sort_by_key(|txn| txn.created_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }

    async fn credit_account(&mut self, user_id: Uuid) -> RepositoryResult<CreditAccount> {
        self.lock_account(user_id);
        Ok(self.account(user_id))
    }

    async fn held_credit(&mut self, user_id: Uuid) -> RepositoryResult<i64> {
        Ok(self
            .work
            .transactions
            .values()
            .filter(|txn| txn.user_id == user_id && txn.holds_credit())
            .map(|txn| txn.credit_used)
            .sum())
    }

    async fn adjust_credit(
        &mut self,
        user_id: Uuid,
        delta: i64,
    ) -> RepositoryResult<CreditAccount> {
        self.lock_account(user_id);
        let mut account = self.account(user_id);
        let balance = account.balance + delta;
        if balance < 0 {
            return Err(RepositoryError::InsufficientCredit {
                balance: account.balance,
                requested: -delta,
            });
        }
        account.balance = balance;
        account.updated_at = Utc::now();
        self.work.accounts.insert(user_id, account.clone());
        Ok(account)
    }

    async fn booking_request(&mut self, id: Uuid) -> RepositoryResult<Option<BookingRequest>> {
        Ok(self.work.requests.get(&id).cloned())
    }

    async fn booking_requests_for(
        &mut self,
        booking_id: Uuid,
    ) -> RepositoryResult<Vec<BookingRequest>> {
        let mut requests: Vec<BookingRequest> = self
            .work
            .requests
            .values()
            .filter(|request| request.booking_id == booking_id)
            .cloned()
            .collect();
        requests.sort_by_key(|request| request.created_at);
        Ok(requests)
    }

    async fn insert_booking_request(&mut self, request: &BookingRequest) -> RepositoryResult<()> {
        if self.work.requests.contains_key(&request.id) {
            return Err(RepositoryError::Conflict(format!(
                "booking request {} already exists",
                request.id
            )));
        }
        self.request_writes.insert(request.id, None);
        self.work.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn update_booking_request(
        &mut self,
        request: &mut BookingRequest,
    ) -> RepositoryResult<()> {
        let current = self
            .work
            .requests
            .get(&request.id)
            .map(|r| r.version)
            .ok_or_else(|| RepositoryError::NotFound(format!("booking request {}", request.id)))?;
        check_version("booking request", request.id, Some(current), Some(request.version))?;

        self.request_writes.entry(request.id).or_insert(Some(current));
        request.version += 1;
        self.work.requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let session = *self;
        let mut live = session.live.lock().unwrap_or_else(PoisonError::into_inner);

        for (id, expected) in &session.booking_writes {
            let current = live.bookings.get(id).map(|b| b.version);
            check_version("booking", *id, current, *expected)?;
        }
        for (id, expected) in &session.transaction_writes {
            let current = live.transactions.get(id).map(|t| t.version);
            check_version("transaction", *id, current, *expected)?;
        }
        for (id, expected) in &session.request_writes {
            let current = live.requests.get(id).map(|r| r.version);
            check_version("booking request", *id, current, *expected)?;
        }
        for (user_id, expected) in &session.account_locks {
            let current = live.account_versions.get(user_id).copied().unwrap_or(0);
            if current != *expected {
                return Err(RepositoryError::Conflict(format!(
                    "credit account {user_id} was modified concurrently"
                )));
            }
        }
        for (year, expected) in &session.invoice_reads {
            if live.invoice_counters.get(year).copied().unwrap_or(0) != *expected {
                return Err(RepositoryError::Conflict(format!(
                    "invoice counter {year} was advanced concurrently"
                )));
            }
        }

        for id in session.booking_writes.keys() {
            let Some(booking) = session.work.bookings.get(id) else {
                continue;
            };
            if !booking.is_confirmed() {
                continue;
            }
            let taken = overlapping_confirmed(
                live.bookings
                    .values()
                    .filter(|other| !session.booking_writes.contains_key(&other.id)),
                booking,
            );
            if !taken.is_empty() {
                return Err(RepositoryError::SlotTaken(taken));
            }
        }

        for id in session.booking_writes.keys() {
            if let Some(booking) = session.work.bookings.get(id) {
                live.bookings.insert(*id, booking.clone());
            }
        }
        for id in session.transaction_writes.keys() {
            if let Some(txn) = session.work.transactions.get(id) {
                live.transactions.insert(*id, txn.clone());
            }
        }
        for id in session.request_writes.keys() {
            if let Some(request) = session.work.requests.get(id) {
                live.requests.insert(*id, request.clone());
            }
        }
        for user_id in session.account_locks.keys() {
            if let Some(account) = session.work.accounts.get(user_id) {
                live.accounts.insert(*user_id, account.clone());
            }
            *live.account_versions.entry(*user_id).or_default() += 1;
        }
        for year in session.invoice_reads.keys() {
            if let Some(counter) = session.work.invoice_counters.get(year) {
                live.invoice_counters.insert(*year, *counter);
            }
        }

        Ok(())
    }
}

/// Chat groups kept in process memory.
#[derive(Clone, Default)]
pub struct InMemoryChatDirectory {
    groups: Arc<Mutex<HashMap<Uuid, Vec<Uuid>>>>,
}

impl InMemoryChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn members(&self, booking_id: Uuid) -> Option<Vec<Uuid>> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&booking_id)
            .cloned()
    }
}

#[async_trait]
impl ChatDirectory for InMemoryChatDirectory {
    async fn ensure_group(&self, booking_id: Uuid) -> anyhow::Result<()> {
        self.groups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(booking_id)
            .or_default();
        Ok(())
    }

    async fn add_member(&self, booking_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let mut groups = self.groups.lock().unwrap_or_else(PoisonError::into_inner);
        let members = groups
            .get_mut(&booking_id)
            .ok_or_else(|| anyhow::anyhow!("no chat group for booking {booking_id}"))?;
        if members.contains(&user_id) {
            return Ok(false);
        }
        members.push(user_id);
        Ok(true)
    }
}
