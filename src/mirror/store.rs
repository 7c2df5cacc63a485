//! Which mirrors of which source messages are currently live.
//!
//! Best-effort: a fresh store is empty and gets repopulated by the startup backlog scan (and, if
//! configured, the document store).  Losing it only leads to mirrors being recreated.

use serenity::all::{ChannelId, MessageId};
use std::collections::{hash_map, HashMap, HashSet};

/// Target channel to the mirrored message posted there.
pub type MirrorRecord = HashMap<ChannelId, MessageId>;

/// Serialized form of the store, as kept in a document store.
#[derive(Default, serde::Serialize, serde::Deserialize)]
pub struct MirrorDocument {
    #[serde(default)]
    pub mirrors: HashMap<MessageId, MirrorRecord>,
}

/// What [`MirrorStore::adopt`] made of a mirror found on Discord.
#[derive(Debug, PartialEq, Eq)]
pub enum Adoption {
    Added,
    /// That very mirror is already recorded
    Known,
    /// A different mirror is recorded for the target, so the found one is surplus.
    Duplicate { recorded: MessageId },
}

#[derive(Default)]
pub struct MirrorStore(HashMap<MessageId, MirrorRecord>);

impl MirrorStore {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    pub fn get(&self, source_id: MessageId) -> Option<&MirrorRecord> {
        self.0.get(&source_id)
    }

    /// Record a freshly posted mirror.  A mirror already recorded for `target` is never
    /// replaced; its id is returned instead.
    pub fn put(
        &mut self,
        source_id: MessageId,
        target: ChannelId,
        mirrored_id: MessageId,
    ) -> Result<(), MessageId> {
        match self.adopt(source_id, target, mirrored_id) {
            Adoption::Duplicate { recorded } => Err(recorded),
            Adoption::Added | Adoption::Known => Ok(()),
        }
    }

    /// Remove one mirror.  Drops the whole record once no targets remain.
    pub fn remove(&mut self, source_id: MessageId, target: ChannelId) -> Option<MessageId> {
        let hash_map::Entry::Occupied(mut entry) = self.0.entry(source_id) else {
            return None;
        };

        let removed = entry.get_mut().remove(&target);
        if entry.get().is_empty() {
            entry.remove();
        }
        removed
    }

    pub fn targets_of(&self, source_id: MessageId) -> HashSet<ChannelId> {
        self.0
            .get(&source_id)
            .map(|record| record.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Record a mirror found on Discord, unless one is already known for that target.
    pub fn adopt(
        &mut self,
        source_id: MessageId,
        target: ChannelId,
        mirrored_id: MessageId,
    ) -> Adoption {
        match self.0.entry(source_id).or_default().entry(target) {
            hash_map::Entry::Occupied(o) if *o.get() == mirrored_id => Adoption::Known,
            hash_map::Entry::Occupied(o) => Adoption::Duplicate {
                recorded: *o.get(),
            },
            hash_map::Entry::Vacant(v) => {
                v.insert(mirrored_id);
                Adoption::Added
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = (&MessageId, &MirrorRecord)> {
        self.0.iter()
    }
}
