//! Validates and records pending bookings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::booking::MAX_SLOTS_PER_BOOKING;
use crate::domain::{
    format_slots, Booking, BookingKind, Court, PlayerSlot, Position, Roster, Slot, TeamId, Venue,
};
use crate::error::AppError;
use crate::ports::Store;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBooking {
    #[serde(skip)]
    pub owner_id: Uuid,
    pub venue_id: Uuid,
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub roster: Vec<RosterEntry>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub complete: bool,
}

/// A requested roster position; no player id keeps the position open as a placeholder.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RosterEntry {
    pub team: TeamId,
    pub position: Position,
    #[serde(default)]
    pub player_id: Option<Uuid>,
}

impl RosterEntry {
    pub fn player(team: TeamId, position: Position, player_id: Uuid) -> Self {
        Self {
            team,
            position,
            player_id: Some(player_id),
        }
    }

    fn into_slot(self) -> PlayerSlot {
        match self.player_id {
            Some(player_id) => PlayerSlot::player(self.team, self.position, player_id),
            None => PlayerSlot::placeholder(self.team, self.position),
        }
    }
}

pub struct SlotLedger {
    store: Arc<dyn Store>,
}

impl SlotLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Records a pending (unpaid) booking after every check passes. Nothing is written on failure.
    pub async fn create_booking(
        &self,
        request: CreateBooking,
        now: DateTime<Utc>,
    ) -> Result<Booking, AppError> {
        let mut session = self.store.begin().await?;

        let venue = session.venue(request.venue_id).await?;
        let court = session.court(request.court_id).await?;
        let confirmed = session
            .confirmed_slots(request.court_id, request.date)
            .await?;

        let roster = validate(&request, venue.as_ref(), court.as_ref(), &confirmed, now)?;
        let court = court
            .ok_or_else(|| AppError::NotFound(format!("Court {} not found", request.court_id)))?;

        let pricing = session.pricing(court.id).await?;
        let amount = pricing.total(&court, request.date, &request.slots);

        let booking = Booking {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            venue_id: request.venue_id,
            court_id: request.court_id,
            date: request.date,
            slots: request.slots,
            roster,
            kind: if request.complete {
                BookingKind::Complete
            } else {
                BookingKind::Booking
            },
            is_public: request.is_public,
            paid: false,
            amount,
            invoice_number: None,
            cancellation_reason: None,
            refunded_credit: 0,
            created_at: now,
            updated_at: now,
            version: 0,
        };

        session.insert_booking(&booking).await?;
        session.commit().await?;

        tracing::info!(
            booking_id = %booking.id,
            court_id = %booking.court_id,
            date = %booking.date,
            slots = %format_slots(&booking.slots),
            amount = booking.amount,
            "Pending booking created"
        );

        Ok(booking)
    }

    pub async fn get_booking(&self, id: Uuid) -> Result<Booking, AppError> {
        let mut session = self.store.begin().await?;
        session
            .booking(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", id)))
    }
}

/// Checks run in a fixed order so the caller always sees the first problem.
fn validate(
    request: &CreateBooking,
    venue: Option<&Venue>,
    court: Option<&Court>,
    confirmed: &[Slot],
    now: DateTime<Utc>,
) -> Result<Roster, AppError> {
    let local_now = match venue {
        Some(venue) => venue.local_now(now),
        None => now.naive_utc(),
    };
    let today = local_now.date();

    if request.date < today {
        return Err(AppError::Validation(format!(
            "date {} is in the past",
            request.date
        )));
    }

    if request.date == today {
        let started: Vec<Slot> = request
            .slots
            .iter()
            .filter(|slot| slot.start() <= local_now.time())
            .copied()
            .collect();
        if !started.is_empty() {
            return Err(AppError::Validation(format!(
                "slot(s) {} have already started",
                format_slots(&started)
            )));
        }
    }

    if request.slots.is_empty() {
        return Err(AppError::Validation(
            "at least one slot is required".to_string(),
        ));
    }
    if request.slots.len() > MAX_SLOTS_PER_BOOKING {
        return Err(AppError::Validation(format!(
            "at most {} slots per booking",
            MAX_SLOTS_PER_BOOKING
        )));
    }
    for (i, slot) in request.slots.iter().enumerate() {
        if request.slots[..i].contains(slot) {
            return Err(AppError::Validation(format!("slot {} is listed twice", slot)));
        }
    }

    let schedule = venue
        .map(Venue::schedule)
        .unwrap_or_else(crate::domain::slot::default_schedule);
    let unscheduled: Vec<Slot> = request
        .slots
        .iter()
        .filter(|slot| !schedule.contains(slot))
        .copied()
        .collect();
    if !unscheduled.is_empty() {
        return Err(AppError::Validation(format!(
            "slot(s) {} are not in the venue schedule",
            format_slots(&unscheduled)
        )));
    }

    let venue = match venue {
        Some(venue) if venue.active => venue,
        Some(_) => {
            return Err(AppError::Validation(format!(
                "venue {} is not accepting bookings",
                request.venue_id
            )))
        }
        None => {
            return Err(AppError::NotFound(format!(
                "Venue {} not found",
                request.venue_id
            )))
        }
    };

    match court {
        Some(court) if court.venue_id != venue.id => {
            return Err(AppError::Validation(format!(
                "court {} does not belong to venue {}",
                court.id, venue.id
            )))
        }
        Some(court) if !court.active => {
            return Err(AppError::Validation(format!(
                "court {} is not accepting bookings",
                court.id
            )))
        }
        Some(_) => {}
        None => {
            return Err(AppError::NotFound(format!(
                "Court {} not found",
                request.court_id
            )))
        }
    }

    let taken: Vec<Slot> = request
        .slots
        .iter()
        .filter(|slot| confirmed.contains(slot))
        .copied()
        .collect();
    if !taken.is_empty() {
        return Err(AppError::SlotConflict(format!(
            "slot(s) {} already booked on this court",
            format_slots(&taken)
        )));
    }

    let roster = Roster::new(request.roster.iter().map(|entry| entry.into_slot()).collect());
    roster.validate()?;
    Ok(roster)
}
