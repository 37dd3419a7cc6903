use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One of the two fixed positions a participant occupies within a
/// conversation. Slot order is assigned at creation and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participant_a: Uuid,
    pub participant_b: Uuid,
    /// Most recently created message, if any. Not FK-enforced: deleting a
    /// message may leave this dangling, which projects as "no preview".
    pub last_message_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub unread_a: i64,
    pub unread_b: i64,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn slot_of(&self, user_id: Uuid) -> Option<Slot> {
        if user_id == self.participant_a {
            Some(Slot::A)
        } else if user_id == self.participant_b {
            Some(Slot::B)
        } else {
            None
        }
    }

    pub fn is_participant(&self, user_id: Uuid) -> bool {
        self.slot_of(user_id).is_some()
    }

    pub fn participant_in(&self, slot: Slot) -> Uuid {
        match slot {
            Slot::A => self.participant_a,
            Slot::B => self.participant_b,
        }
    }

    /// The user occupying the slot opposite to `user_id`, or `None` when
    /// `user_id` is not a participant.
    pub fn other_participant(&self, user_id: Uuid) -> Option<Uuid> {
        self.slot_of(user_id)
            .map(|slot| self.participant_in(slot.other()))
    }

    pub fn unread_in(&self, slot: Slot) -> i64 {
        match slot {
            Slot::A => self.unread_a,
            Slot::B => self.unread_b,
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> Option<i64> {
        self.slot_of(user_id).map(|slot| self.unread_in(slot))
    }
}

/// Normalizes a participant pair so both slot orders map to the same
/// deduplication key.
pub fn unordered_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
