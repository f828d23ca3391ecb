//! Append-only journal of lifecycle transitions
//!
//! Claims, submissions and disagreements are audit records: every accepted
//! transition leaves an entry naming who moved which record from what status
//! to what status, and when.
use super::deadline::TimeStamp;
use super::error::{EngineError, EngineResult};
use super::role::Action;
use super::store::{Record, RecordStore};

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct JournalEntry {
    #[n(0)]
    pub key: String, // "<record_id>/<seq>/<digest prefix>", empty while hashing
    #[n(1)]
    pub table: String,
    #[n(2)]
    pub record_id: String,
    #[n(3)]
    pub seq: u32,
    #[n(4)]
    pub actor: String,
    #[n(5)]
    pub timestamp: TimeStamp,
    #[n(6)]
    pub action: String,
    #[n(7)]
    pub from: Option<String>,
    #[n(8)]
    pub to: String,
    #[n(9)]
    pub digest: String, // sha256 of the entry encoded with empty key and digest
}

impl Record for JournalEntry {
    const TABLE: &'static str = "journal";
    fn id(&self) -> &str {
        &self.key
    }
}

/// One transition about to be journalled.
pub struct Transition<'a> {
    pub table: &'static str,
    pub record_id: &'a str,
    pub actor: &'a str,
    pub timestamp: TimeStamp,
    pub action: Action,
    pub from: Option<String>,
    pub to: String,
}

impl JournalEntry {
    fn seal(mut self) -> EngineResult<Self> {
        let cbor = minicbor::to_vec(&self)?;
        let digest = sha256::digest(&cbor);
        self.key = format!("{}/{:010}/{}", self.record_id, self.seq, &digest[..16]);
        self.digest = digest;
        Ok(self)
    }

    /// Recomputes the digest and compares it with the stored one.
    pub fn verify(&self) -> EngineResult<bool> {
        let unsealed = JournalEntry {
            key: String::new(),
            digest: String::new(),
            ..self.clone()
        };
        let cbor = minicbor::to_vec(&unsealed)?;
        Ok(sha256::digest(&cbor) == self.digest)
    }
}

fn record_prefix(record_id: &str) -> String {
    format!("{record_id}/")
}

pub fn append<S: RecordStore>(store: &S, transition: Transition<'_>) -> EngineResult<JournalEntry> {
    let written = store
        .scan_prefix::<JournalEntry>(&record_prefix(transition.record_id))?
        .len();
    let seq = u32::try_from(written)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| {
            EngineError::Codec(format!(
                "journal sequence for {} is exhausted",
                transition.record_id
            ))
        })?;
    let entry = JournalEntry {
        key: String::new(),
        table: transition.table.to_string(),
        record_id: transition.record_id.to_string(),
        seq,
        actor: transition.actor.to_string(),
        timestamp: transition.timestamp,
        action: transition.action.to_string(),
        from: transition.from,
        to: transition.to,
        digest: String::new(),
    }
    .seal()?;
    store.insert(&entry)?;
    Ok(entry)
}

/// Entries for one record, oldest first.
pub fn history<S: RecordStore>(store: &S, record_id: &str) -> EngineResult<Vec<JournalEntry>> {
    let mut entries = store.scan_prefix::<JournalEntry>(&record_prefix(record_id))?;
    entries.sort_by(|a, b| (a.seq, &a.key).cmp(&(b.seq, &b.key)));
    Ok(entries)
}
