//! Players asking to join an open booking, and the owner's answer.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::booking::MAX_PLAYERS_PER_TEAM;
use crate::domain::{
    BookingKind, BookingRequest, Notification, NotificationKind, Occupant, Position,
    RequestStatus, TeamId,
};
use crate::error::AppError;
use crate::ports::Store;
use crate::services::effects::{EffectDispatcher, SideEffect};
use crate::services::retry_on_conflict;

#[derive(Debug, Clone, Deserialize)]
pub struct RequestToJoin {
    #[serde(skip)]
    pub booking_id: Uuid,
    #[serde(skip)]
    pub requester_id: Uuid,
    pub team: TeamId,
    pub position: Position,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondToRequest {
    #[serde(skip)]
    pub request_id: Uuid,
    #[serde(skip)]
    pub responder_id: Uuid,
    pub accept: bool,
}

pub struct JoinRequestService {
    store: Arc<dyn Store>,
    effects: EffectDispatcher,
}

impl JoinRequestService {
    pub fn new(store: Arc<dyn Store>, effects: EffectDispatcher) -> Self {
        Self { store, effects }
    }

    pub async fn request_to_join(
        &self,
        request: RequestToJoin,
        now: DateTime<Utc>,
    ) -> Result<BookingRequest, AppError> {
        let mut session = self.store.begin().await?;
        let booking = session
            .booking(request.booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", request.booking_id)))?;

        if booking.kind == BookingKind::Cancelled {
            return Err(AppError::Validation(format!(
                "booking {} is cancelled",
                booking.id
            )));
        }
        if !booking.is_public {
            return Err(AppError::Validation(format!(
                "booking {} is not open to join requests",
                booking.id
            )));
        }
        if !booking.paid {
            return Err(AppError::Validation(format!(
                "booking {} is not confirmed yet",
                booking.id
            )));
        }
        if booking.owner_id == request.requester_id
            || booking.roster.contains_player(request.requester_id)
        {
            return Err(AppError::Validation(
                "player is already on this booking".to_string(),
            ));
        }
        if let Some(slot) = booking.roster.get(request.team, request.position) {
            if slot.occupant != Occupant::Placeholder {
                return Err(AppError::Validation(format!(
                    "position {}/{} is taken",
                    request.team, request.position
                )));
            }
        } else if booking.roster.team(request.team).count() >= MAX_PLAYERS_PER_TEAM {
            return Err(AppError::Validation(format!("{} is full", request.team)));
        }

        let existing = session.booking_requests_for(booking.id).await?;
        if existing
            .iter()
            .any(|r| r.requester_id == request.requester_id && r.status.is_open())
        {
            return Err(AppError::Validation(
                "an open request for this booking already exists".to_string(),
            ));
        }

        let created = BookingRequest::new(
            booking.id,
            request.requester_id,
            request.team,
            request.position,
            now,
        );
        session.insert_booking_request(&created).await?;
        session.commit().await?;

        tracing::info!(
            request_id = %created.id,
            booking_id = %booking.id,
            requester_id = %created.requester_id,
            team = %created.team,
            position = %created.position,
            "Join request created"
        );
        self.effects
            .dispatch(vec![SideEffect::Notify(
                Notification::new(
                    booking.owner_id,
                    NotificationKind::JoinRequested,
                    format!(
                        "A player asked to join {} {} on {}",
                        created.team, created.position, booking.date
                    ),
                )
                .for_booking(booking.id),
            )])
            .await;

        Ok(created)
    }

    /// Only the booking owner may answer, and only while the request is pending.
    pub async fn respond(
        &self,
        response: RespondToRequest,
        now: DateTime<Utc>,
    ) -> Result<BookingRequest, AppError> {
        let (request, effects) =
            retry_on_conflict("respond_to_join_request", || self.try_respond(&response, now))
                .await?;

        tracing::info!(
            request_id = %request.id,
            booking_id = %request.booking_id,
            status = request.status.as_str(),
            "Join request answered"
        );
        self.effects.dispatch(effects).await;
        Ok(request)
    }

    async fn try_respond(
        &self,
        response: &RespondToRequest,
        now: DateTime<Utc>,
    ) -> Result<(BookingRequest, Vec<SideEffect>), AppError> {
        let mut session = self.store.begin().await?;
        let mut request = session
            .booking_request(response.request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Booking request {} not found", response.request_id))
            })?;
        let booking = session
            .booking(request.booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Booking {} not found", request.booking_id)))?;

        if booking.owner_id != response.responder_id {
            return Err(AppError::Unauthorized(
                "only the booking owner can answer join requests".to_string(),
            ));
        }
        if request.status != RequestStatus::Pending {
            return Err(AppError::Validation(format!(
                "request is already {}",
                request.status.as_str()
            )));
        }

        let (status, kind, body) = if response.accept {
            (
                RequestStatus::Accepted,
                NotificationKind::JoinAccepted,
                format!(
                    "Your request to join on {} was accepted; complete the payment to take your place",
                    booking.date
                ),
            )
        } else {
            (
                RequestStatus::Rejected,
                NotificationKind::JoinRejected,
                format!("Your request to join on {} was declined", booking.date),
            )
        };
        request.status = status;
        request.updated_at = now;
        session.update_booking_request(&mut request).await?;
        session.commit().await?;

        let effects = vec![SideEffect::Notify(
            Notification::new(request.requester_id, kind, body).for_booking(booking.id),
        )];
        Ok((request, effects))
    }
}
