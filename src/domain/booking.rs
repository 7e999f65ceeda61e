//! Court bookings and their team rosters.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::slot::Slot;

pub const MAX_SLOTS_PER_BOOKING: usize = 2;
pub const MAX_PLAYERS_PER_TEAM: usize = 2;
pub const MIN_ROSTER_SIZE: usize = 2;
pub const MAX_ROSTER_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingKind {
    Booking,
    Complete,
    Cancelled,
}

impl BookingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingKind::Booking => "Booking",
            BookingKind::Complete => "Complete",
            BookingKind::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Booking" => Some(BookingKind::Booking),
            "Complete" => Some(BookingKind::Complete),
            "Cancelled" => Some(BookingKind::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamId {
    Team1,
    Team2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Left,
    Right,
}

impl TeamId {
    pub fn as_str(&self) -> &'static str {
        match self {
            TeamId::Team1 => "team1",
            TeamId::Team2 => "team2",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "team1" => Some(TeamId::Team1),
            "team2" => Some(TeamId::Team2),
            _ => None,
        }
    }
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Left => "left",
            Position::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Position::Left),
            "right" => Some(Position::Right),
            _ => None,
        }
    }
}

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who holds a roster position. A placeholder keeps the position open for a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupant {
    Player(Uuid),
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerPaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub team: TeamId,
    pub position: Position,
    pub occupant: Occupant,
    pub payment_status: PlayerPaymentStatus,
    pub funding_transaction_id: Option<Uuid>,
}

impl PlayerSlot {
    pub fn player(team: TeamId, position: Position, player_id: Uuid) -> Self {
        Self {
            team,
            position,
            occupant: Occupant::Player(player_id),
            payment_status: PlayerPaymentStatus::Pending,
            funding_transaction_id: None,
        }
    }

    pub fn placeholder(team: TeamId, position: Position) -> Self {
        Self {
            team,
            position,
            occupant: Occupant::Placeholder,
            payment_status: PlayerPaymentStatus::Pending,
            funding_transaction_id: None,
        }
    }

    pub fn player_id(&self) -> Option<Uuid> {
        match self.occupant {
            Occupant::Player(id) => Some(id),
            Occupant::Placeholder => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RosterError {
    #[error("{team} has more than 2 players")]
    TeamTooLarge { team: TeamId },
    #[error("roster must hold between 2 and 4 entries, got {0}")]
    BadSize(usize),
    #[error("roster must contain at least one player")]
    NoPlayers,
    #[error("position {team}/{position} is listed twice")]
    DuplicatePosition { team: TeamId, position: Position },
    #[error("player {0} is listed twice")]
    DuplicatePlayer(Uuid),
}

/// Both teams' positions in one arena, addressed by (team, position).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<PlayerSlot>,
}

impl Roster {
    pub fn new(entries: Vec<PlayerSlot>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[PlayerSlot] {
        &self.entries
    }

    pub fn get(&self, team: TeamId, position: Position) -> Option<&PlayerSlot> {
        self.entries
            .iter()
            .find(|entry| entry.team == team && entry.position == position)
    }

    pub fn team(&self, team: TeamId) -> impl Iterator<Item = &PlayerSlot> {
        self.entries.iter().filter(move |entry| entry.team == team)
    }

    pub fn players(&self) -> Vec<Uuid> {
        self.entries.iter().filter_map(PlayerSlot::player_id).collect()
    }

    pub fn contains_player(&self, player_id: Uuid) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.player_id() == Some(player_id))
    }

    /// Replaces whatever holds `(team, position)`, or inserts a new entry.
    pub fn upsert(&mut self, slot: PlayerSlot) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.team == slot.team && entry.position == slot.position)
        {
            Some(existing) => *existing = slot,
            None => self.entries.push(slot),
        }
    }

    /// Whether any entry held by one of `paid_for` is already funded by a transaction other
    /// than `transaction_id`.
    pub fn funded_by_other(&self, paid_for: &[Uuid], transaction_id: Uuid) -> bool {
        self.entries.iter().any(|entry| {
            entry.player_id().is_some_and(|id| paid_for.contains(&id))
                && entry
                    .funding_transaction_id
                    .is_some_and(|funding| funding != transaction_id)
        })
    }

    /// Marks every entry held by one of `paid_for` as paid by `transaction_id`. Entries already
    /// funded by another transaction keep their funding. Returns how many entries changed.
    pub fn mark_paid(&mut self, paid_for: &[Uuid], transaction_id: Uuid) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            let Some(player_id) = entry.player_id() else {
                continue;
            };
            if entry
                .funding_transaction_id
                .is_some_and(|funding| funding != transaction_id)
            {
                continue;
            }
            if paid_for.contains(&player_id) {
                entry.payment_status = PlayerPaymentStatus::Paid;
                entry.funding_transaction_id = Some(transaction_id);
                changed += 1;
            }
        }
        changed
    }

    /// Distinct funding transactions in roster order.
    pub fn funding_transactions(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for id in self.entries.iter().filter_map(|e| e.funding_transaction_id) {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        ids
    }

    pub fn validate(&self) -> Result<(), RosterError> {
        for team in [TeamId::Team1, TeamId::Team2] {
            if self.team(team).count() > MAX_PLAYERS_PER_TEAM {
                return Err(RosterError::TeamTooLarge { team });
            }
        }

        let size = self.entries.len();
        if !(MIN_ROSTER_SIZE..=MAX_ROSTER_SIZE).contains(&size) {
            return Err(RosterError::BadSize(size));
        }

        let mut seen_positions = Vec::with_capacity(size);
        let mut seen_players = Vec::with_capacity(size);
        for entry in &self.entries {
            let key = (entry.team, entry.position);
            if seen_positions.contains(&key) {
                return Err(RosterError::DuplicatePosition {
                    team: entry.team,
                    position: entry.position,
                });
            }
            seen_positions.push(key);

            if let Some(player_id) = entry.player_id() {
                if seen_players.contains(&player_id) {
                    return Err(RosterError::DuplicatePlayer(player_id));
                }
                seen_players.push(player_id);
            }
        }

        if seen_players.is_empty() {
            return Err(RosterError::NoPlayers);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub venue_id: Uuid,
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
    pub roster: Roster,
    pub kind: BookingKind,
    pub is_public: bool,
    pub paid: bool,
    /// Minor currency units.
    pub amount: i64,
    pub invoice_number: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Total stored credit handed back on cancellation.
    pub refunded_credit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

impl Booking {
    /// Paid and not cancelled: the booking holds its slots.
    pub fn is_confirmed(&self) -> bool {
        self.paid && self.kind != BookingKind::Cancelled
    }

    /// Public bookings are listed for joiners; private ones only to the owner and roster.
    pub fn visible_to(&self, user_id: Uuid) -> bool {
        self.is_public || self.owner_id == user_id || self.roster.contains_player(user_id)
    }

    pub fn overlapping(&self, slots: &[Slot]) -> Vec<Slot> {
        self.slots
            .iter()
            .filter(|slot| slots.contains(slot))
            .copied()
            .collect()
    }
}

pub fn format_invoice_number(year: i32, sequence: i64) -> String {
    format!("INV-{year}-{sequence:06}")
}
