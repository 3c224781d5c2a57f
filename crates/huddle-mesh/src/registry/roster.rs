//! In-memory roster of the current room.
//!
//! The registry is the only writer of participant entries. Other
//! components submit intents (a signaled join, a local toggle, a polled
//! roster) and get back what changed.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::{Participant, ParticipantFlag, Room};

/// Outcome of merging a polled roster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterDiff {
    /// Known remote participants whose flags changed.
    pub updated: Vec<Participant>,
    /// Known remote participants absent from the polled list.
    pub departed: Vec<String>,
}

impl RosterDiff {
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.departed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Registry {
    room: Option<Room>,
    local: Option<Participant>,
    remotes: HashMap<String, Participant>,
    /// Optimistic local flag changes not yet confirmed by the room service.
    pending: HashMap<ParticipantFlag, DateTime<Utc>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_room(&mut self, room: Room, local: Participant) {
        debug!(room_id = %room.id, participant_id = %local.participant_id, "Registry seeded");
        self.room = Some(room);
        self.local = Some(local);
        self.remotes.clear();
        self.pending.clear();
    }

    pub fn is_in_room(&self) -> bool {
        self.room.is_some()
    }

    pub fn room(&self) -> Option<&Room> {
        self.room.as_ref()
    }

    pub fn local(&self) -> Option<&Participant> {
        self.local.as_ref()
    }

    pub fn local_id(&self) -> Option<&str> {
        self.local.as_ref().map(|p| p.participant_id.as_str())
    }

    pub fn remote(&self, participant_id: &str) -> Option<&Participant> {
        self.remotes.get(participant_id)
    }

    pub fn remotes(&self) -> impl Iterator<Item = &Participant> {
        self.remotes.values()
    }

    pub fn remote_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.remotes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remote participants plus the local one.
    pub fn roster_size(&self) -> usize {
        self.remotes.len() + usize::from(self.local.is_some())
    }

    /// Insert or refresh a remote participant. Returns `true` when the
    /// participant was not known before.
    pub fn upsert_remote(&mut self, participant: Participant) -> bool {
        if self.local_id() == Some(participant.participant_id.as_str()) {
            return false;
        }
        match self.remotes.get_mut(&participant.participant_id) {
            Some(existing) => {
                existing.display_name = participant.display_name;
                existing.role = participant.role;
                existing.last_activity_at = Utc::now();
                false
            }
            None => {
                self.remotes
                    .insert(participant.participant_id.clone(), participant);
                true
            }
        }
    }

    pub fn remove_remote(&mut self, participant_id: &str) -> Option<Participant> {
        self.remotes.remove(participant_id)
    }

    /// Optimistically change a local flag. Returns the updated local
    /// participant, or `None` when not in a room or nothing changed.
    pub fn set_local_flag(&mut self, flag: ParticipantFlag, value: bool) -> Option<Participant> {
        let local = self.local.as_mut()?;
        if local.flag(flag) == value {
            return None;
        }
        let now = Utc::now();
        local.set_flag(flag, value);
        local.last_activity_at = now;
        self.pending.insert(flag, now);
        Some(local.clone())
    }

    /// Apply flags announced by a remote participant.
    pub fn apply_remote_flags(
        &mut self,
        participant_id: &str,
        flags: &[(ParticipantFlag, bool)],
    ) -> Option<Participant> {
        let remote = self.remotes.get_mut(participant_id)?;
        let mut changed = false;
        for &(flag, value) in flags {
            if remote.flag(flag) != value {
                remote.set_flag(flag, value);
                changed = true;
            }
        }
        remote.last_activity_at = Utc::now();
        changed.then(|| remote.clone())
    }

    /// Merge an externally polled roster.
    ///
    /// Flags of known remotes are taken from the update. For the local
    /// participant, a pending optimistic flag survives until an entry at
    /// least as recent as the optimistic change contradicts or confirms it.
    /// Participants only seen here are not added: membership is driven by
    /// signaling.
    pub fn apply_roster_update(&mut self, roster: Vec<Participant>) -> RosterDiff {
        let mut diff = RosterDiff::default();
        let local_id = self.local_id().map(str::to_string);
        let mut seen = Vec::with_capacity(roster.len());

        for incoming in roster {
            if Some(&incoming.participant_id) == local_id.as_ref() {
                self.merge_local(&incoming);
                continue;
            }
            seen.push(incoming.participant_id.clone());
            let Some(existing) = self.remotes.get_mut(&incoming.participant_id) else {
                continue;
            };
            let mut changed = false;
            for flag in ParticipantFlag::ALL {
                if existing.flag(flag) != incoming.flag(flag) {
                    existing.set_flag(flag, incoming.flag(flag));
                    changed = true;
                }
            }
            if incoming.last_activity_at > existing.last_activity_at {
                existing.last_activity_at = incoming.last_activity_at;
            }
            if changed {
                diff.updated.push(existing.clone());
            }
        }

        let mut departed: Vec<String> = self
            .remotes
            .keys()
            .filter(|id| !seen.contains(id))
            .cloned()
            .collect();
        departed.sort();
        diff.departed = departed;
        diff
    }

    fn merge_local(&mut self, incoming: &Participant) {
        let Some(local) = self.local.as_mut() else {
            return;
        };
        for flag in ParticipantFlag::ALL {
            match self.pending.get(&flag).copied() {
                Some(set_at) if incoming.last_activity_at < set_at => {}
                Some(_) => {
                    self.pending.remove(&flag);
                    local.set_flag(flag, incoming.flag(flag));
                }
                None => local.set_flag(flag, incoming.flag(flag)),
            }
        }
    }

    pub fn set_locked(&mut self, locked: bool) -> bool {
        match self.room.as_mut() {
            Some(room) if room.locked != locked => {
                room.locked = locked;
                true
            }
            _ => false,
        }
    }

    /// Record a new quality score. Returns the participant only when the
    /// score actually moved.
    pub fn set_connection_quality(&mut self, participant_id: &str, score: u8) -> Option<Participant> {
        let remote = self.remotes.get_mut(participant_id)?;
        if remote.connection_quality == score {
            return None;
        }
        remote.connection_quality = score;
        Some(remote.clone())
    }

    /// Clear all state. Returns `false` when there was nothing to clear.
    pub fn leave_room(&mut self) -> bool {
        if self.room.is_none() && self.local.is_none() {
            return false;
        }
        self.room = None;
        self.local = None;
        self.remotes.clear();
        self.pending.clear();
        true
    }
}
