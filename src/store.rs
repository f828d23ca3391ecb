//! Record store seam and its sled-backed implementation
//!
//! Every record is CBOR encoded and kept in a sled tree named after its table,
//! keyed by record id. Updates are conditional: the caller states the status it
//! expects the stored record to have, and the write is a compare-and-swap on the
//! exact bytes that were checked. Writes that must land together (a record and
//! its natural-key reservation, a revision and the submission it supersedes)
//! run in one sled transaction.
use super::claim::{Claim, ClaimStatus};
use super::config::StoreConfig;
use super::contract::{Contract, ContractStatus};
use super::disagreement::{Disagreement, DisagreementStatus};
use super::document::{DocumentStatus, DocumentSubmission};
use super::error::{EngineError, EngineResult};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

pub trait Record: minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()> {
    const TABLE: &'static str;
    fn id(&self) -> &str;
}

/// A record with a workflow status that conditional updates check against.
pub trait Stateful: Record {
    type Status: Copy + PartialEq + std::fmt::Display;
    fn status(&self) -> Self::Status;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change<R> {
    Upserted(R),
    Removed(String),
}

pub trait RecordStore {
    type Feed<R: Record>: Iterator<Item = Change<R>>;

    /// Inserts a new record; an existing id is a conflict.
    fn insert<R: Record>(&self, record: &R) -> EngineResult<()>;
    /// Inserts a new record and claims `key` in the `index` table for it, atomically.
    /// Returns `false`, writing nothing, when another record already holds `key`.
    fn insert_unique<R: Record>(&self, record: &R, index: &'static str, key: &str) -> EngineResult<bool>;
    /// Inserts `record` and replaces `replaced` in one step, provided the stored
    /// `replaced` still has `expected_status`.
    fn insert_superseding<R: Stateful>(
        &self,
        record: &R,
        replaced: &R,
        expected_status: R::Status,
    ) -> EngineResult<()>;
    fn get<R: Record>(&self, id: &str) -> EngineResult<Option<R>>;
    /// Replaces the stored record if its status still equals `expected_status`.
    fn update<R: Stateful>(&self, record: &R, expected_status: Option<R::Status>) -> EngineResult<()>;
    fn query<R: Record>(&self, filter: impl Fn(&R) -> bool) -> EngineResult<Vec<R>>;
    /// Records whose id starts with `prefix`, in key order.
    fn scan_prefix<R: Record>(&self, prefix: &str) -> EngineResult<Vec<R>>;
    /// Changes made after this call, for every record in `R::TABLE`.
    fn subscribe<R: Record>(&self) -> EngineResult<Self::Feed<R>>;
}

pub struct SledStore {
    instance: Arc<sled::Db>,
    flush_on_write: bool,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Self {
        Self {
            instance,
            flush_on_write: false,
        }
    }

    pub fn open(config: &StoreConfig) -> EngineResult<Self> {
        let db = sled::Config::new()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        Ok(Self {
            instance: Arc::new(db),
            flush_on_write: config.flush_on_write,
        })
    }

    pub fn db(&self) -> &Arc<sled::Db> {
        &self.instance
    }

    fn tree<R: Record>(&self) -> EngineResult<sled::Tree> {
        Ok(self.instance.open_tree(R::TABLE)?)
    }

    fn flush(&self, tree: &sled::Tree) -> EngineResult<()> {
        if self.flush_on_write {
            tree.flush()?;
        }
        Ok(())
    }
}

impl RecordStore for SledStore {
    type Feed<R: Record> = ChangeFeed<R>;

    fn insert<R: Record>(&self, record: &R) -> EngineResult<()> {
        let tree = self.tree::<R>()?;
        let bytes = minicbor::to_vec(record)?;
        if tree
            .compare_and_swap(record.id().as_bytes(), None::<&[u8]>, Some(bytes))?
            .is_err()
        {
            return Err(EngineError::Conflict {
                record: record.id().to_string(),
            });
        }
        self.flush(&tree)
    }

    fn insert_unique<R: Record>(&self, record: &R, index: &'static str, key: &str) -> EngineResult<bool> {
        let tree = self.tree::<R>()?;
        let index_tree = self.instance.open_tree(index)?;
        let bytes = minicbor::to_vec(record)?;
        let id = record.id().as_bytes();

        let inserted = (&index_tree, &tree)
            .transaction(|(index_tx, record_tx)| {
                if index_tx.get(key.as_bytes())?.is_some() {
                    return Ok(false);
                }
                if record_tx.get(id)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(EngineError::Conflict {
                        record: record.id().to_string(),
                    }));
                }
                index_tx.insert(key.as_bytes(), id)?;
                record_tx.insert(id, bytes.as_slice())?;
                Ok(true)
            })
            .map_err(aborted_or_store)?;

        if inserted {
            self.flush(&tree)?;
        } else {
            tracing::debug!(table = R::TABLE, index, key, "natural key already taken");
        }
        Ok(inserted)
    }

    fn insert_superseding<R: Stateful>(
        &self,
        record: &R,
        replaced: &R,
        expected_status: R::Status,
    ) -> EngineResult<()> {
        let tree = self.tree::<R>()?;
        let bytes = minicbor::to_vec(record)?;
        let replaced_bytes = minicbor::to_vec(replaced)?;
        let id = record.id().as_bytes();
        let replaced_id = replaced.id().as_bytes();

        tree.transaction(|tx| {
            let current = tx.get(replaced_id)?.ok_or_else(|| {
                ConflictableTransactionError::Abort(EngineError::NotFound {
                    table: R::TABLE,
                    id: replaced.id().to_string(),
                })
            })?;
            let stored: R = minicbor::decode(&current)
                .map_err(|e| ConflictableTransactionError::Abort(EngineError::from(e)))?;
            if stored.status() != expected_status {
                return Err(ConflictableTransactionError::Abort(EngineError::StaleState {
                    record: replaced.id().to_string(),
                    expected: expected_status.to_string(),
                    actual: stored.status().to_string(),
                }));
            }
            if tx.get(id)?.is_some() {
                return Err(ConflictableTransactionError::Abort(EngineError::Conflict {
                    record: record.id().to_string(),
                }));
            }
            tx.insert(replaced_id, replaced_bytes.as_slice())?;
            tx.insert(id, bytes.as_slice())?;
            Ok(())
        })
        .map_err(aborted_or_store)?;
        self.flush(&tree)
    }

    fn get<R: Record>(&self, id: &str) -> EngineResult<Option<R>> {
        let tree = self.tree::<R>()?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(minicbor::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update<R: Stateful>(&self, record: &R, expected_status: Option<R::Status>) -> EngineResult<()> {
        let tree = self.tree::<R>()?;
        let key = record.id().as_bytes();
        let current = tree.get(key)?.ok_or_else(|| EngineError::NotFound {
            table: R::TABLE,
            id: record.id().to_string(),
        })?;

        if let Some(expected) = expected_status {
            let stored: R = minicbor::decode(&current)?;
            if stored.status() != expected {
                return Err(EngineError::StaleState {
                    record: record.id().to_string(),
                    expected: expected.to_string(),
                    actual: stored.status().to_string(),
                });
            }
        }

        let bytes = minicbor::to_vec(record)?;
        if tree
            .compare_and_swap(key, Some(current.as_ref()), Some(bytes))?
            .is_err()
        {
            return Err(EngineError::Conflict {
                record: record.id().to_string(),
            });
        }
        self.flush(&tree)
    }

    fn query<R: Record>(&self, filter: impl Fn(&R) -> bool) -> EngineResult<Vec<R>> {
        let tree = self.tree::<R>()?;
        let mut out = vec![];
        for item in tree.iter() {
            let (_, bytes) = item?;
            let record: R = minicbor::decode(&bytes)?;
            if filter(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn scan_prefix<R: Record>(&self, prefix: &str) -> EngineResult<Vec<R>> {
        let tree = self.tree::<R>()?;
        tree.scan_prefix(prefix.as_bytes())
            .map(|item| -> EngineResult<R> {
                let (_, bytes) = item?;
                Ok(minicbor::decode(&bytes)?)
            })
            .collect()
    }

    fn subscribe<R: Record>(&self) -> EngineResult<ChangeFeed<R>> {
        let tree = self.tree::<R>()?;
        Ok(ChangeFeed {
            subscriber: tree.watch_prefix(vec![]),
            _record: PhantomData,
        })
    }
}

fn aborted_or_store(error: TransactionError<EngineError>) -> EngineError {
    match error {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => EngineError::Store(e),
    }
}

/// Decoded change events for one table. Blocks on `next()`.
pub struct ChangeFeed<R> {
    subscriber: sled::Subscriber,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> ChangeFeed<R> {
    fn decode(event: sled::Event) -> Option<Change<R>> {
        match event {
            sled::Event::Insert { key, value } => match minicbor::decode::<R>(&value) {
                Ok(record) => Some(Change::Upserted(record)),
                Err(e) => {
                    tracing::warn!(
                        table = R::TABLE,
                        key = %String::from_utf8_lossy(&key),
                        error = %e,
                        "skipping undecodable change"
                    );
                    None
                }
            },
            sled::Event::Remove { key } => {
                Some(Change::Removed(String::from_utf8_lossy(&key).into_owned()))
            }
        }
    }

    /// Waits up to `timeout` for the next decodable change.
    pub fn next_timeout(&mut self, timeout: Duration) -> Option<Change<R>> {
        loop {
            let event = self.subscriber.next_timeout(timeout).ok()?;
            if let Some(change) = Self::decode(event) {
                return Some(change);
            }
        }
    }
}

impl<R: Record> Iterator for ChangeFeed<R> {
    type Item = Change<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let event = self.subscriber.next()?;
            if let Some(change) = Self::decode(event) {
                return Some(change);
            }
        }
    }
}

impl Record for Contract {
    const TABLE: &'static str = "contracts";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Stateful for Contract {
    type Status = ContractStatus;
    fn status(&self) -> ContractStatus {
        self.status
    }
}

impl Record for Claim {
    const TABLE: &'static str = "claims";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Stateful for Claim {
    type Status = ClaimStatus;
    fn status(&self) -> ClaimStatus {
        self.status
    }
}

impl Record for DocumentSubmission {
    const TABLE: &'static str = "documents";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Stateful for DocumentSubmission {
    type Status = DocumentStatus;
    fn status(&self) -> DocumentStatus {
        self.status
    }
}

impl Record for Disagreement {
    const TABLE: &'static str = "disagreements";
    fn id(&self) -> &str {
        &self.id
    }
}

impl Stateful for Disagreement {
    type Status = DisagreementStatus;
    fn status(&self) -> DisagreementStatus {
        self.status
    }
}
