//! What the server hasn't confirmed yet, per experience.
//!
//! The ledger lives in the cache, as the `getUnsyncedLedger` field of the
//! root query, so it is persisted with every snapshot. A row is either the
//! marker `true` (the whole experience only exists offline) or an
//! [`UnsyncedChanges`] listing the parts that changed. A row never stays
//! behind once every part of it has been cleaned up.

use std::collections::{BTreeMap, BTreeSet};

use normcache::Draft;
use serde::{Deserialize, Serialize};

pub const LEDGER_FIELD: &str = "getUnsyncedLedger";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawLedgerEntry", into = "RawLedgerEntry")]
pub enum LedgerEntry {
    NewOffline,
    Unsynced(UnsyncedChanges),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawLedgerEntry {
    Flag(bool),
    Changes(UnsyncedChanges),
}

impl TryFrom<RawLedgerEntry> for LedgerEntry {
    type Error = &'static str;

    fn try_from(raw: RawLedgerEntry) -> Result<Self, Self::Error> {
        match raw {
            RawLedgerEntry::Flag(true) => Ok(LedgerEntry::NewOffline),
            RawLedgerEntry::Flag(false) => Err("a ledger row cannot be `false`"),
            RawLedgerEntry::Changes(changes) => Ok(LedgerEntry::Unsynced(changes)),
        }
    }
}

impl From<LedgerEntry> for RawLedgerEntry {
    fn from(entry: LedgerEntry) -> Self {
        match entry {
            LedgerEntry::NewOffline => RawLedgerEntry::Flag(true),
            LedgerEntry::Unsynced(changes) => RawLedgerEntry::Changes(changes),
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnFieldsChanges {
    #[serde(default, skip_serializing_if = "is_false")]
    pub title: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub description: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionChanges {
    #[serde(default, skip_serializing_if = "is_false")]
    pub name: bool,
    #[serde(rename = "type", default, skip_serializing_if = "is_false")]
    pub type_: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsyncedChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub own_fields: Option<OwnFieldsChanges>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub definitions: BTreeMap<String, DefinitionChanges>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub new_entries: bool,
    /// entry id -> ids of its changed data objects. Stored as
    /// `{entryId: {dataObjectId: true}}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", with = "flag_sets")]
    pub modified_entries: BTreeMap<String, BTreeSet<String>>,
}

mod flag_sets {
    use std::collections::{BTreeMap, BTreeSet};

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        sets: &BTreeMap<String, BTreeSet<String>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let flags: BTreeMap<&String, BTreeMap<&String, bool>> = sets
            .iter()
            .map(|(key, set)| (key, set.iter().map(|id| (id, true)).collect()))
            .collect();
        flags.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, BTreeSet<String>>, D::Error> {
        let flags = BTreeMap::<String, BTreeMap<String, bool>>::deserialize(deserializer)?;
        Ok(flags
            .into_iter()
            .map(|(key, ids)| {
                let set = ids
                    .into_iter()
                    .filter_map(|(id, flag)| flag.then_some(id))
                    .collect();
                (key, set)
            })
            .filter(|(_, set): &(String, BTreeSet<String>)| !set.is_empty())
            .collect())
    }
}

/// The parts of a row a server response has confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerCleanup {
    pub own_fields: bool,
    pub definitions: Vec<String>,
    pub new_entries: bool,
    /// `(entry id, data object ids)`
    pub modified_entries: Vec<(String, Vec<String>)>,
}

impl LedgerCleanup {
    pub fn is_empty(&self) -> bool {
        !self.own_fields
            && self.definitions.is_empty()
            && !self.new_entries
            && self.modified_entries.is_empty()
    }
}

impl UnsyncedChanges {
    pub fn new_entries() -> Self {
        Self {
            new_entries: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.own_fields.is_none()
            && self.definitions.is_empty()
            && !self.new_entries
            && self.modified_entries.is_empty()
    }

    /// Flags are only ever added.
    pub fn merge(&mut self, other: UnsyncedChanges) {
        if let Some(theirs) = other.own_fields {
            let ours = self.own_fields.get_or_insert_with(OwnFieldsChanges::default);
            ours.title |= theirs.title;
            ours.description |= theirs.description;
        }

        for (id, theirs) in other.definitions {
            let ours = self.definitions.entry(id).or_default();
            ours.name |= theirs.name;
            ours.type_ |= theirs.type_;
        }

        self.new_entries |= other.new_entries;

        for (entry_id, data_object_ids) in other.modified_entries {
            self.modified_entries
                .entry(entry_id)
                .or_default()
                .extend(data_object_ids);
        }
    }

    /// Drop the confirmed parts. `None` when nothing is left.
    pub fn apply_cleanup(mut self, cleanup: &LedgerCleanup) -> Option<Self> {
        if cleanup.own_fields {
            self.own_fields = None;
        }

        for id in &cleanup.definitions {
            self.definitions.remove(id);
        }

        if cleanup.new_entries {
            self.new_entries = false;
        }

        for (entry_id, data_object_ids) in &cleanup.modified_entries {
            let Some(changed) = self.modified_entries.get_mut(entry_id) else {
                continue;
            };
            for id in data_object_ids {
                changed.remove(id);
            }
            if changed.is_empty() {
                self.modified_entries.remove(entry_id);
            }
        }

        (!self.is_empty()).then_some(self)
    }
}

/// The ledger as seen through a cache draft.
pub struct UnsyncedLedger<'t> {
    draft: &'t mut Draft,
}

impl<'t> UnsyncedLedger<'t> {
    pub(crate) fn new(draft: &'t mut Draft) -> Self {
        Self { draft }
    }

    /// A missing or unreadable ledger reads as empty. Unreadable rows are
    /// dropped one by one so the rest of the ledger survives the next write.
    pub fn all(&self) -> BTreeMap<String, LedgerEntry> {
        let Some(value) = self.draft.read_root_field(LEDGER_FIELD) else {
            return BTreeMap::new();
        };

        let rows: BTreeMap<String, serde_json::Value> = match serde_json::from_value(value) {
            Ok(rows) => rows,
            Err(e) => {
                log::warn!("Unsynced ledger is unreadable, treating it as empty: {e}");
                return BTreeMap::new();
            }
        };

        rows.into_iter()
            .filter_map(|(id, row)| match serde_json::from_value(row) {
                Ok(entry) => Some((id, entry)),
                Err(e) => {
                    log::warn!("Dropping unreadable unsynced ledger row {id}: {e}");
                    None
                }
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<LedgerEntry> {
        self.all().remove(id)
    }

    pub fn put(&mut self, id: &str, entry: LedgerEntry) {
        let mut ledger = self.all();
        ledger.insert(id.to_string(), entry);
        self.write(&ledger);
    }

    pub fn remove(&mut self, id: &str) {
        self.remove_many(&[id]);
    }

    pub fn remove_many<S: AsRef<str>>(&mut self, ids: &[S]) {
        let mut ledger = self.all();
        let before = ledger.len();
        for id in ids {
            ledger.remove(id.as_ref());
        }
        if ledger.len() != before {
            self.write(&ledger);
        }
    }

    /// Remove the confirmed parts of a structured row, deleting the row once
    /// it is empty. `NewOffline` rows and missing rows are left alone.
    pub fn subtract(&mut self, id: &str, cleanup: &LedgerCleanup) {
        if cleanup.is_empty() {
            return;
        }

        match self.get(id) {
            Some(LedgerEntry::Unsynced(changes)) => match changes.apply_cleanup(cleanup) {
                Some(remaining) => self.put(id, LedgerEntry::Unsynced(remaining)),
                None => self.remove(id),
            },
            Some(LedgerEntry::NewOffline) => {
                log::debug!("Not subtracting from ledger row of offline experience {id}");
            }
            None => {}
        }
    }

    fn write(&mut self, ledger: &BTreeMap<String, LedgerEntry>) {
        match serde_json::to_value(ledger) {
            Ok(value) => self.draft.write_root_field(LEDGER_FIELD, &value),
            Err(e) => log::error!("Failed to encode the unsynced ledger: {e}"),
        }
    }
}
