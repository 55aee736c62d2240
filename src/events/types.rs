//! Change event types pushed to streaming clients

use crate::records::{Consultation, FamilyMember, Patient};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier payload for deletions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
}

/// Identifier payload for a removed family membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRef {
    pub family_id: i64,
    pub patient_id: i64,
}

/// A change notification emitted after a successful mutation.
///
/// One variant per entity/action pair; the payload is the entity state after
/// the write, or its identifier for deletions.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    PatientCreated(Patient),
    PatientUpdated(Patient),
    PatientDeleted(EntityRef),
    ConsultationCreated(Consultation),
    ConsultationUpdated(Consultation),
    ConsultationDeleted(EntityRef),
    FamilyMemberAdded(FamilyMember),
    FamilyMemberUpdated(FamilyMember),
    FamilyMemberRemoved(MembershipRef),
}

impl ChangeEvent {
    /// Event name written on the `event:` line
    pub fn name(&self) -> &'static str {
        match self {
            ChangeEvent::PatientCreated(_) => "patient_created",
            ChangeEvent::PatientUpdated(_) => "patient_updated",
            ChangeEvent::PatientDeleted(_) => "patient_deleted",
            ChangeEvent::ConsultationCreated(_) => "consultation_created",
            ChangeEvent::ConsultationUpdated(_) => "consultation_updated",
            ChangeEvent::ConsultationDeleted(_) => "consultation_deleted",
            ChangeEvent::FamilyMemberAdded(_) => "family_member_added",
            ChangeEvent::FamilyMemberUpdated(_) => "family_member_updated",
            ChangeEvent::FamilyMemberRemoved(_) => "family_member_removed",
        }
    }

    /// JSON encoding of the payload alone (no envelope)
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            ChangeEvent::PatientCreated(p) | ChangeEvent::PatientUpdated(p) => {
                serde_json::to_string(p)
            }
            ChangeEvent::ConsultationCreated(c) | ChangeEvent::ConsultationUpdated(c) => {
                serde_json::to_string(c)
            }
            ChangeEvent::FamilyMemberAdded(m) | ChangeEvent::FamilyMemberUpdated(m) => {
                serde_json::to_string(m)
            }
            ChangeEvent::PatientDeleted(r) | ChangeEvent::ConsultationDeleted(r) => {
                serde_json::to_string(r)
            }
            ChangeEvent::FamilyMemberRemoved(r) => serde_json::to_string(r),
        }
    }

    /// Encode into a wire frame
    pub fn to_frame(&self) -> serde_json::Result<SseFrame> {
        Ok(SseFrame {
            event: self.name(),
            data: self.payload_json()?,
        })
    }
}

/// One server-sent message: an event name and a single-line JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: &'static str,
    pub data: String,
}

impl SseFrame {
    /// Text form as written to the stream, blank-line terminated
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Anything that accepts change events after a committed mutation.
///
/// Fire-and-forget: implementations never fail observably.
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: ChangeEvent);
}
