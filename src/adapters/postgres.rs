//! PostgreSQL implementation of the storage and chat ports.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::Postgres;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{
    Booking, BookingKind, BookingRequest, Court, CreditAccount, PaymentMethod, Position,
    PricingRules, RequestStatus, Roster, Slot, TeamId, Transaction, TransactionNotes, TxStatus,
    Venue,
};
use crate::ports::{ChatDirectory, RepositoryError, RepositoryResult, Session, Store};

/// Partial unique index over confirmed `(court_id, date, slot)` rows.
const CONFIRMED_SLOT_INDEX: &str = "booking_slots_confirmed_uniq";
/// Unique index over `gateway_payment_id`; a racing insert of the same payment retries.
const PAYMENT_INDEX: &str = "idx_transactions_payment";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                RepositoryError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.constraint() == Some(PAYMENT_INDEX) => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

fn corrupt(what: &str, value: &str) -> RepositoryError {
    RepositoryError::Database(format!("unexpected {what} '{value}' in database"))
}

fn parse_slots(raw: Vec<String>) -> RepositoryResult<Vec<Slot>> {
    raw.iter()
        .map(|value| value.parse::<Slot>().map_err(|_| corrupt("slot", value)))
        .collect()
}

fn slot_strings(slots: &[Slot]) -> Vec<String> {
    slots.iter().map(Slot::to_string).collect()
}

fn slot_error(err: sqlx::Error, booking: &Booking) -> RepositoryError {
    if let sqlx::Error::Database(db) = &err {
        if db.constraint() == Some(CONFIRMED_SLOT_INDEX) {
            return RepositoryError::SlotTaken(booking.slots.clone());
        }
    }
    err.into()
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn Session>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresSession { tx }))
    }
}

pub struct PostgresSession {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl Session for PostgresSession {
    async fn venue(&mut self, id: Uuid) -> RepositoryResult<Option<Venue>> {
        let row = sqlx::query_as::<_, VenueRow>(
            "SELECT id, name, active, utc_offset_minutes, slot_schedule FROM venues WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(VenueRow::into_domain).transpose()
    }

    async fn court(&mut self, id: Uuid) -> RepositoryResult<Option<Court>> {
        let row = sqlx::query_as::<_, CourtRow>(
            "SELECT id, venue_id, name, active, base_hourly_rate FROM courts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(CourtRow::into_domain))
    }

    async fn pricing(&mut self, court_id: Uuid) -> RepositoryResult<PricingRules> {
        let rules = sqlx::query_scalar::<_, Json<PricingRules>>(
            "SELECT rules FROM court_pricing WHERE court_id = $1",
        )
        .bind(court_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(rules.map(|Json(rules)| rules).unwrap_or_default())
    }

    async fn confirmed_slots(
        &mut self,
        court_id: Uuid,
        date: NaiveDate,
    ) -> RepositoryResult<Vec<Slot>> {
        let slots = sqlx::query_scalar::<_, String>(
            "SELECT slot FROM booking_slots WHERE court_id = $1 AND date = $2 AND confirmed ORDER BY slot",
        )
        .bind(court_id)
        .bind(date)
        .fetch_all(&mut *self.tx)
        .await?;

        parse_slots(slots)
    }

    async fn booking(&mut self, id: Uuid) -> RepositoryResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(BookingRow::into_domain).transpose()
    }

    async fn insert_booking(&mut self, booking: &Booking) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (
                id, owner_id, venue_id, court_id, date, slots, roster, kind, is_public, paid,
                amount, invoice_number, cancellation_reason, refunded_credit,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(booking.id)
        .bind(booking.owner_id)
        .bind(booking.venue_id)
        .bind(booking.court_id)
        .bind(booking.date)
        .bind(slot_strings(&booking.slots))
        .bind(Json(&booking.roster))
        .bind(booking.kind.as_str())
        .bind(booking.is_public)
        .bind(booking.paid)
        .bind(booking.amount)
        .bind(&booking.invoice_number)
        .bind(&booking.cancellation_reason)
        .bind(booking.refunded_credit)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .bind(booking.version)
        .execute(&mut *self.tx)
        .await?;

        for slot in &booking.slots {
            sqlx::query(
                "INSERT INTO booking_slots (booking_id, court_id, date, slot, confirmed) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(booking.id)
            .bind(booking.court_id)
            .bind(booking.date)
            .bind(slot.to_string())
            .bind(booking.is_confirmed())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| slot_error(e, booking))?;
        }

        Ok(())
    }

    async fn update_booking(&mut self, booking: &mut Booking) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE bookings SET
                roster = $2, kind = $3, is_public = $4, paid = $5, amount = $6,
                invoice_number = $7, cancellation_reason = $8, refunded_credit = $9,
                updated_at = $10, version = version + 1
            WHERE id = $1 AND version = $11
            "#,
        )
        .bind(booking.id)
        .bind(Json(&booking.roster))
        .bind(booking.kind.as_str())
        .bind(booking.is_public)
        .bind(booking.paid)
        .bind(booking.amount)
        .bind(&booking.invoice_number)
        .bind(&booking.cancellation_reason)
        .bind(booking.refunded_credit)
        .bind(booking.updated_at)
        .bind(booking.version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "booking {} was modified concurrently",
                booking.id
            )));
        }

        sqlx::query("UPDATE booking_slots SET confirmed = $2 WHERE booking_id = $1")
            .bind(booking.id)
            .bind(booking.is_confirmed())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| slot_error(e, booking))?;

        booking.version += 1;
        Ok(())
    }

    async fn next_invoice_number(&mut self, year: i32) -> RepositoryResult<String> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO invoice_counters (year, last_value) VALUES ($1, 1)
            ON CONFLICT (year) DO UPDATE SET last_value = invoice_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(year)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(crate::domain::format_invoice_number(year, value))
    }

    async fn transaction(&mut self, id: Uuid) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn transaction_by_order(
        &mut self,
        order_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE gateway_order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn transaction_by_payment(
        &mut self,
        payment_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(
            "SELECT * FROM transactions WHERE gateway_payment_id = $1 ORDER BY created_at LIMIT 1",
        )
        .bind(payment_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn insert_transaction(&mut self, txn: &Transaction) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, user_id, booking_ids, paid_for, amount, currency, status, method,
                credit_used, credit_reserved, credit_deducted,
                gateway_order_id, gateway_payment_id, gateway_signature, webhook_verified,
                notes, refunded_amount, refund_id, failure_reason, paid_at,
                created_at, updated_at, version
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23
            )
            "#,
        )
        .bind(txn.id)
        .bind(txn.user_id)
        .bind(&txn.booking_ids)
        .bind(&txn.paid_for)
        .bind(txn.amount)
        .bind(&txn.currency)
        .bind(txn.status.as_str())
        .bind(txn.method.as_str())
        .bind(txn.credit_used)
        .bind(txn.credit_reserved)
        .bind(txn.credit_deducted)
        .bind(&txn.gateway_order_id)
        .bind(&txn.gateway_payment_id)
        .bind(&txn.gateway_signature)
        .bind(txn.webhook_verified)
        .bind(Json(&txn.notes))
        .bind(txn.refunded_amount)
        .bind(&txn.refund_id)
        .bind(&txn.failure_reason)
        .bind(txn.paid_at)
        .bind(txn.created_at)
        .bind(txn.updated_at)
        .bind(txn.version)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_transaction(&mut self, txn: &mut Transaction) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions SET
                booking_ids = $2, paid_for = $3, status = $4,
                credit_used = $5, credit_reserved = $6, credit_deducted = $7,
                gateway_order_id = $8, gateway_payment_id = $9, gateway_signature = $10,
                webhook_verified = $11, notes = $12, refunded_amount = $13, refund_id = $14,
                failure_reason = $15, paid_at = $16, updated_at = $17, version = version + 1
            WHERE id = $1 AND version = $18
            "#,
        )
        .bind(txn.id)
        .bind(&txn.booking_ids)
        .bind(&txn.paid_for)
        .bind(txn.status.as_str())
        .bind(txn.credit_used)
        .bind(txn.credit_reserved)
        .bind(txn.credit_deducted)
        .bind(&txn.gateway_order_id)
        .bind(&txn.gateway_payment_id)
        .bind(&txn.gateway_signature)
        .bind(txn.webhook_verified)
        .bind(Json(&txn.notes))
        .bind(txn.refunded_amount)
        .bind(&txn.refund_id)
        .bind(&txn.failure_reason)
        .bind(txn.paid_at)
        .bind(txn.updated_at)
        .bind(txn.version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "transaction {} was modified concurrently",
                txn.id
            )));
        }

        txn.version += 1;
        Ok(())
    }

    async fn pending_transactions_for(
        &mut self,
        booking_id: Uuid,
    ) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE status = 'created' AND booking_ids @> ARRAY[$1]::UUID[]
            ORDER BY created_at
            "#,
        )
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn stale_transactions(
        &mut self,
        method: PaymentMethod,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT * FROM transactions
            WHERE status = 'created' AND method = $1 AND created_at < $2
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(method.as_str())
        .bind(older_than)
        .bind(limit)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn credit_account(&mut self, user_id: Uuid) -> RepositoryResult<CreditAccount> {
        self.ensure_account(user_id).await?;

        let row = sqlx::query_as::<_, CreditRow>(
            "SELECT user_id, balance, updated_at FROM credit_accounts WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into_domain())
    }

    async fn held_credit(&mut self, user_id: Uuid) -> RepositoryResult<i64> {
        let held = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(SUM(credit_used), 0)::BIGINT FROM transactions
            WHERE user_id = $1 AND credit_reserved AND NOT credit_deducted AND status = 'created'
            "#,
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(held)
    }

    async fn adjust_credit(
        &mut self,
        user_id: Uuid,
        delta: i64,
    ) -> RepositoryResult<CreditAccount> {
        self.ensure_account(user_id).await?;

        let row = sqlx::query_as::<_, CreditRow>(
            r#"
            UPDATE credit_accounts SET balance = balance + $2, updated_at = NOW()
            WHERE user_id = $1 AND balance + $2 >= 0
            RETURNING user_id, balance, updated_at
            "#,
        )
        .bind(user_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            Some(row) => Ok(row.into_domain()),
            None => {
                let balance = sqlx::query_scalar::<_, i64>(
                    "SELECT balance FROM credit_accounts WHERE user_id = $1",
                )
                .bind(user_id)
                .fetch_one(&mut *self.tx)
                .await?;
                Err(RepositoryError::InsufficientCredit {
                    balance,
                    requested: -delta,
                })
            }
        }
    }

    async fn booking_request(&mut self, id: Uuid) -> RepositoryResult<Option<BookingRequest>> {
        let row = sqlx::query_as::<_, BookingRequestRow>(
            "SELECT * FROM booking_requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(BookingRequestRow::into_domain).transpose()
    }

    async fn booking_requests_for(
        &mut self,
        booking_id: Uuid,
    ) -> RepositoryResult<Vec<BookingRequest>> {
        let rows = sqlx::query_as::<_, BookingRequestRow>(
            "SELECT * FROM booking_requests WHERE booking_id = $1 ORDER BY created_at",
        )
        .bind(booking_id)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(BookingRequestRow::into_domain).collect()
    }

    async fn insert_booking_request(&mut self, request: &BookingRequest) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO booking_requests (
                id, booking_id, requester_id, team, position, status, transaction_id,
                created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(request.id)
        .bind(request.booking_id)
        .bind(request.requester_id)
        .bind(request.team.as_str())
        .bind(request.position.as_str())
        .bind(request.status.as_str())
        .bind(request.transaction_id)
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(request.version)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn update_booking_request(
        &mut self,
        request: &mut BookingRequest,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE booking_requests SET
                status = $2, transaction_id = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $5
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.transaction_id)
        .bind(request.updated_at)
        .bind(request.version)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict(format!(
                "booking request {} was modified concurrently",
                request.id
            )));
        }

        request.version += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let session = *self;
        session.tx.commit().await?;
        Ok(())
    }
}

impl PostgresSession {
    async fn ensure_account(&mut self, user_id: Uuid) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO credit_accounts (user_id, balance, updated_at) VALUES ($1, 0, NOW()) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

/// Booking chat groups stored alongside bookings.
#[derive(Clone)]
pub struct PostgresChatDirectory {
    pool: PgPool,
}

impl PostgresChatDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatDirectory for PostgresChatDirectory {
    async fn ensure_group(&self, booking_id: Uuid) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO chat_groups (booking_id, created_at) VALUES ($1, NOW()) ON CONFLICT (booking_id) DO NOTHING",
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_member(&self, booking_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "INSERT INTO chat_members (booking_id, user_id, added_at) VALUES ($1, $2, NOW()) ON CONFLICT DO NOTHING",
        )
        .bind(booking_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct VenueRow {
    id: Uuid,
    name: String,
    active: bool,
    utc_offset_minutes: i32,
    slot_schedule: Vec<String>,
}

impl VenueRow {
    fn into_domain(self) -> RepositoryResult<Venue> {
        Ok(Venue {
            id: self.id,
            name: self.name,
            active: self.active,
            utc_offset_minutes: self.utc_offset_minutes,
            slot_schedule: parse_slots(self.slot_schedule)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CourtRow {
    id: Uuid,
    venue_id: Uuid,
    name: String,
    active: bool,
    base_hourly_rate: i64,
}

impl CourtRow {
    fn into_domain(self) -> Court {
        Court {
            id: self.id,
            venue_id: self.venue_id,
            name: self.name,
            active: self.active,
            base_hourly_rate: self.base_hourly_rate,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    owner_id: Uuid,
    venue_id: Uuid,
    court_id: Uuid,
    date: NaiveDate,
    slots: Vec<String>,
    roster: Json<Roster>,
    kind: String,
    is_public: bool,
    paid: bool,
    amount: i64,
    invoice_number: Option<String>,
    cancellation_reason: Option<String>,
    refunded_credit: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl BookingRow {
    fn into_domain(self) -> RepositoryResult<Booking> {
        let kind = BookingKind::parse(&self.kind).ok_or_else(|| corrupt("booking kind", &self.kind))?;
        Ok(Booking {
            id: self.id,
            owner_id: self.owner_id,
            venue_id: self.venue_id,
            court_id: self.court_id,
            date: self.date,
            slots: parse_slots(self.slots)?,
            roster: self.roster.0,
            kind,
            is_public: self.is_public,
            paid: self.paid,
            amount: self.amount,
            invoice_number: self.invoice_number,
            cancellation_reason: self.cancellation_reason,
            refunded_credit: self.refunded_credit,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    booking_ids: Vec<Uuid>,
    paid_for: Vec<Uuid>,
    amount: i64,
    currency: String,
    status: String,
    method: String,
    credit_used: i64,
    credit_reserved: bool,
    credit_deducted: bool,
    gateway_order_id: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_signature: Option<String>,
    webhook_verified: bool,
    notes: Json<TransactionNotes>,
    refunded_amount: i64,
    refund_id: Option<String>,
    failure_reason: Option<String>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = TxStatus::parse(&self.status)
            .ok_or_else(|| corrupt("transaction status", &self.status))?;
        let method = PaymentMethod::parse(&self.method)
            .ok_or_else(|| corrupt("payment method", &self.method))?;
        Ok(Transaction {
            id: self.id,
            user_id: self.user_id,
            booking_ids: self.booking_ids,
            paid_for: self.paid_for,
            amount: self.amount,
            currency: self.currency,
            status,
            method,
            credit_used: self.credit_used,
            credit_reserved: self.credit_reserved,
            credit_deducted: self.credit_deducted,
            gateway_order_id: self.gateway_order_id,
            gateway_payment_id: self.gateway_payment_id,
            gateway_signature: self.gateway_signature,
            webhook_verified: self.webhook_verified,
            notes: self.notes.0,
            refunded_amount: self.refunded_amount,
            refund_id: self.refund_id,
            failure_reason: self.failure_reason,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CreditRow {
    user_id: Uuid,
    balance: i64,
    updated_at: DateTime<Utc>,
}

impl CreditRow {
    fn into_domain(self) -> CreditAccount {
        CreditAccount {
            user_id: self.user_id,
            balance: self.balance,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BookingRequestRow {
    id: Uuid,
    booking_id: Uuid,
    requester_id: Uuid,
    team: String,
    position: String,
    status: String,
    transaction_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl BookingRequestRow {
    fn into_domain(self) -> RepositoryResult<BookingRequest> {
        Ok(BookingRequest {
            id: self.id,
            booking_id: self.booking_id,
            requester_id: self.requester_id,
            team: TeamId::parse(&self.team).ok_or_else(|| corrupt("team", &self.team))?,
            position: Position::parse(&self.position)
                .ok_or_else(|| corrupt("position", &self.position))?,
            status: RequestStatus::parse(&self.status)
                .ok_or_else(|| corrupt("request status", &self.status))?,
            transaction_id: self.transaction_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}
