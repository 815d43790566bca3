//! Turn-State Tracker
//!
//! Replays the ordered message sequence to derive each participant's latest
//! output and its output within the current, unfinished turn.
//!
//! Parity advances on two independent triggers, evaluated per message in id
//! order: a stored flag that differs from the current parity (the recorded
//! history is authoritative), and every known participant having produced
//! output in the current turn.

use crate::message::Message;
use crate::types::{ParticipantId, TurnFlag};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnTracker {
    participants: BTreeSet<ParticipantId>,
    parity: TurnFlag,
    turn_outputs: HashMap<ParticipantId, String>,
    last_outputs: HashMap<ParticipantId, String>,
}

impl TurnTracker {
    pub fn new(participants: impl IntoIterator<Item = ParticipantId>) -> Self {
        Self {
            participants: participants.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Rebuild all state from a full, ordered message sequence.
    pub fn replay(&mut self, messages: &[Message]) {
        self.parity = TurnFlag::Even;
        self.turn_outputs.clear();
        self.last_outputs.clear();
        for message in messages {
            self.observe(message);
        }
    }

    /// Advance the state machine by one message.
    ///
    /// Messages from the human placeholder or from participants missing from
    /// the workflow still move parity but are kept out of the output maps.
    pub fn observe(&mut self, message: &Message) {
        if message.turn_flag != self.parity {
            self.parity = message.turn_flag;
            self.turn_outputs.clear();
        }

        match message.participant_id {
            Some(participant) if self.participants.contains(&participant) => {
                self.turn_outputs
                    .insert(participant, message.content.clone());
                self.last_outputs
                    .insert(participant, message.content.clone());
            }
            Some(participant) => {
                trace!(participant, message_id = message.id, "Skipping unknown participant");
            }
            None => {}
        }

        if self.turn_complete() {
            self.parity = self.parity.flipped();
            self.turn_outputs.clear();
        }
    }

    fn turn_complete(&self) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|p| self.turn_outputs.contains_key(p))
    }

    /// Replace the known participant set. Call `replay` afterwards to
    /// re-derive the output maps.
    pub fn set_participants(&mut self, participants: impl IntoIterator<Item = ParticipantId>) {
        self.participants = participants.into_iter().collect();
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.participants.iter().copied()
    }

    /// Flag the next appended message carries.
    pub fn parity(&self) -> TurnFlag {
        self.parity
    }

    pub fn last_output(&self, participant: ParticipantId) -> Option<&str> {
        self.last_outputs.get(&participant).map(String::as_str)
    }

    pub fn turn_output(&self, participant: ParticipantId) -> Option<&str> {
        self.turn_outputs.get(&participant).map(String::as_str)
    }
}
