//! Requests to join an open booking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::{Position, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            "rejected" => Some(RequestStatus::Rejected),
            "completed" => Some(RequestStatus::Completed),
            _ => None,
        }
    }

    /// Still waiting for the requester's payment.
    pub fn is_open(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Accepted)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub requester_id: Uuid,
    pub team: TeamId,
    pub position: Position,
    pub status: RequestStatus,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

impl BookingRequest {
    pub fn new(
        booking_id: Uuid,
        requester_id: Uuid,
        team: TeamId,
        position: Position,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            requester_id,
            team,
            position,
            status: RequestStatus::Pending,
            transaction_id: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn targets(&self, requester_id: Uuid, team: TeamId, position: Position) -> bool {
        self.requester_id == requester_id && self.team == team && self.position == position
    }
}
