//! Low-level transaction state.
//!
//! This is the handle the façade shares with embedded transactions: status,
//! the registered collection bindings, and the per-binding lock bookkeeping.
//! The façade owns all policy (when collections may be added, who commits);
//! the state only enforces what would corrupt it.

use std::sync::Arc;
use std::time::Duration;

use vellumdb_core::{CollectionId, Error, ErrorCode, Result, TransactionId};

use crate::collection::DocumentCollection;

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Constructed, collections may be registered.
    Created,
    /// Begun; operations may run.
    Running,
    /// Terminal: committed.
    Committed,
    /// Terminal: aborted.
    Aborted,
}

/// How a transaction accesses a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessType {
    /// Read-only access.
    Read,
    /// Read-write access.
    Write,
}

/// Transaction behavior hints, packed as a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionHints(u32);

impl TransactionHints {
    /// No hints.
    pub const NONE: Self = Self(0);
    /// The transaction consists of a single operation.
    pub const SINGLE_OPERATION: u32 = 1;
    /// The transaction never takes collection locks itself.
    pub const LOCK_NEVER: u32 = 1 << 1;

    /// Create hints from a raw bitmap.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw bitmap.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if the given hint bit is set.
    #[must_use]
    pub const fn has(self, hint: u32) -> bool {
        self.0 & hint != 0
    }
}

/// One collection registered with a transaction.
#[derive(Debug)]
pub struct TransactionCollection {
    /// The collection id.
    pub cid: CollectionId,
    /// The registered access type.
    pub access: AccessType,
    /// The resolved collection, filled in lazily.
    pub collection: Option<Arc<DocumentCollection>>,
    /// The lock currently held through this binding.
    locked: Option<AccessType>,
    /// Nesting level that acquired the lock.
    lock_nesting: u32,
}

impl TransactionCollection {
    fn new(cid: CollectionId, access: AccessType, collection: Option<Arc<DocumentCollection>>) -> Self {
        Self { cid, access, collection, locked: None, lock_nesting: 0 }
    }

    /// Returns `true` if a lock of at least the given strength is held.
    #[must_use]
    pub fn is_locked(&self, access: AccessType) -> bool {
        self.locked.is_some_and(|held| held >= access)
    }
}

/// Shared transaction state.
///
/// A top-level façade owns one; embedded façades share it and account for
/// themselves through `nesting_level`.
#[derive(Debug)]
pub struct TransactionState {
    /// The transaction id (caller-supplied or generated).
    pub id: TransactionId,
    status: TransactionStatus,
    /// Number of embedded façades currently attached.
    pub nesting_level: u32,
    /// Hints supplied at `begin`.
    pub hints: TransactionHints,
    /// Optional transaction timeout.
    pub timeout: Option<Duration>,
    /// Whether commits should wait for disk sync.
    pub wait_for_sync: bool,
    /// Set when any operation inside the transaction failed.
    pub had_failed_operations: bool,
    collections: Vec<TransactionCollection>,
}

impl TransactionState {
    /// Fresh state in `Created` status.
    #[must_use]
    pub fn new(id: TransactionId, timeout: Option<Duration>, wait_for_sync: bool) -> Self {
        Self {
            id,
            status: TransactionStatus::Created,
            nesting_level: 0,
            hints: TransactionHints::NONE,
            timeout,
            wait_for_sync,
            had_failed_operations: false,
            collections: Vec::new(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Promote to `Running`.
    ///
    /// Only the top level (`nesting == 0`) actually transitions; embedded
    /// levels are a no-op.
    pub fn begin(&mut self, hints: TransactionHints, nesting: u32) -> Result<()> {
        if nesting > 0 {
            return Ok(());
        }
        if self.status != TransactionStatus::Created {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        self.hints = hints;
        self.status = TransactionStatus::Running;
        Ok(())
    }

    /// Commit; terminal at the top level.
    pub fn commit(&mut self, nesting: u32) -> Result<()> {
        if self.status != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        if nesting == 0 {
            self.release_all_locks();
            self.status = TransactionStatus::Committed;
        }
        Ok(())
    }

    /// Abort; terminal at the top level.
    pub fn abort(&mut self, nesting: u32) -> Result<()> {
        if self.status != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        if nesting == 0 {
            self.release_all_locks();
            self.status = TransactionStatus::Aborted;
        }
        Ok(())
    }

    /// Register a collection with the transaction.
    ///
    /// While `Created`, registrations are unrestricted. While `Running`,
    /// only implicit registrations are accepted (`allow_implicit`), which is
    /// how embedded transactions and runtime lookups add collections. Access
    /// upgrades of an existing binding are only legal while `Created`.
    pub fn add_collection(
        &mut self,
        cid: CollectionId,
        access: AccessType,
        collection: Option<Arc<DocumentCollection>>,
        allow_implicit: bool,
    ) -> Result<()> {
        match self.status {
            TransactionStatus::Committed | TransactionStatus::Aborted => {
                return Err(Error::code(ErrorCode::TransactionInternal));
            }
            TransactionStatus::Running if !allow_implicit => {
                return Err(Error::with_message(
                    ErrorCode::TransactionInternal,
                    format!("collection {cid} not registered with transaction"),
                ));
            }
            _ => {}
        }

        if let Some(existing) = self.collections.iter_mut().find(|c| c.cid == cid) {
            if access > existing.access {
                if self.status != TransactionStatus::Created {
                    return Err(Error::code(ErrorCode::TransactionInternal));
                }
                existing.access = access;
            }
            if existing.collection.is_none() {
                existing.collection = collection;
            }
            return Ok(());
        }

        self.collections.push(TransactionCollection::new(cid, access, collection));
        Ok(())
    }

    /// Find a binding by collection id.
    #[must_use]
    pub fn collection(&self, cid: CollectionId) -> Option<&TransactionCollection> {
        self.collections.iter().find(|c| c.cid == cid)
    }

    /// All registered bindings.
    #[must_use]
    pub fn collections(&self) -> &[TransactionCollection] {
        &self.collections
    }

    /// Acquire a collection lock through a binding.
    ///
    /// Requesting write strength through a read binding is a bookkeeping
    /// error. Re-locking with equal or lesser strength is a no-op.
    pub fn lock(&mut self, cid: CollectionId, access: AccessType, nesting: u32) -> Result<()> {
        if self.status != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        if self.hints.has(TransactionHints::LOCK_NEVER) {
            return Ok(());
        }
        let binding = self
            .collections
            .iter_mut()
            .find(|c| c.cid == cid)
            .ok_or_else(|| Error::code(ErrorCode::TransactionInternal))?;

        if access > binding.access {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        if let Some(held) = binding.locked {
            if held >= access {
                return Ok(());
            }
            return Err(Error::code(ErrorCode::TransactionInternal));
        }

        let collection = binding
            .collection
            .as_ref()
            .ok_or_else(|| Error::code(ErrorCode::TransactionInternal))?;
        match access {
            AccessType::Read => collection.lock().lock_read(),
            AccessType::Write => collection.lock().lock_write(),
        }
        binding.locked = Some(access);
        binding.lock_nesting = nesting;
        Ok(())
    }

    /// Release a collection lock.
    ///
    /// A level that did not acquire the lock must not release it; such calls
    /// are ignored so embedded operations can bracket lock/unlock uniformly.
    pub fn unlock(&mut self, cid: CollectionId, access: AccessType, nesting: u32) -> Result<()> {
        if self.status != TransactionStatus::Running {
            return Err(Error::code(ErrorCode::TransactionInternal));
        }
        if self.hints.has(TransactionHints::LOCK_NEVER) {
            return Ok(());
        }
        let binding = self
            .collections
            .iter_mut()
            .find(|c| c.cid == cid)
            .ok_or_else(|| Error::code(ErrorCode::TransactionInternal))?;

        let Some(held) = binding.locked else {
            return Ok(());
        };
        if binding.lock_nesting != nesting || held != access {
            return Ok(());
        }
        Self::release_binding(binding);
        Ok(())
    }

    /// Returns `true` if a lock of at least the given strength is held on
    /// the collection.
    #[must_use]
    pub fn is_locked(&self, cid: CollectionId, access: AccessType) -> bool {
        self.collection(cid).is_some_and(|c| c.is_locked(access))
    }

    fn release_binding(binding: &mut TransactionCollection) {
        if let (Some(held), Some(collection)) = (binding.locked.take(), binding.collection.as_ref())
        {
            match held {
                AccessType::Read => collection.lock().unlock_read(),
                AccessType::Write => collection.lock().unlock_write(),
            }
        }
        binding.lock_nesting = 0;
    }

    fn release_all_locks(&mut self) {
        for binding in &mut self.collections {
            Self::release_binding(binding);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionType;

    fn users() -> Arc<DocumentCollection> {
        Arc::new(DocumentCollection::new(CollectionId::new(1), "users", CollectionType::Document))
    }

    fn running_state(collection: &Arc<DocumentCollection>) -> TransactionState {
        let mut state = TransactionState::new(TransactionId::default(), None, false);
        state
            .add_collection(collection.id(), AccessType::Write, Some(Arc::clone(collection)), true)
            .expect("add collection");
        state.begin(TransactionHints::NONE, 0).expect("begin");
        state
    }

    #[test]
    fn test_status_transitions() {
        let mut state = TransactionState::new(TransactionId::default(), None, false);
        assert_eq!(state.status(), TransactionStatus::Created);
        state.begin(TransactionHints::NONE, 0).expect("begin");
        assert_eq!(state.status(), TransactionStatus::Running);
        state.commit(0).expect("commit");
        assert_eq!(state.status(), TransactionStatus::Committed);

        // Terminal states reject further transitions.
        assert!(state.begin(TransactionHints::NONE, 0).is_err());
        assert!(state.abort(0).is_err());
    }

    #[test]
    fn test_embedded_begin_is_noop() {
        let mut state = TransactionState::new(TransactionId::default(), None, false);
        state.begin(TransactionHints::NONE, 1).expect("nested begin");
        assert_eq!(state.status(), TransactionStatus::Created);
    }

    #[test]
    fn test_add_collection_after_finish_fails() {
        let coll = users();
        let mut state = running_state(&coll);
        state.commit(0).expect("commit");
        let err = state
            .add_collection(CollectionId::new(9), AccessType::Read, None, true)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionInternal);
    }

    #[test]
    fn test_running_add_requires_implicit() {
        let coll = users();
        let mut state = running_state(&coll);
        let err = state
            .add_collection(CollectionId::new(9), AccessType::Read, None, false)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionInternal);
        state
            .add_collection(CollectionId::new(9), AccessType::Read, None, true)
            .expect("implicit add");
    }

    #[test]
    fn test_lock_bookkeeping() {
        let coll = users();
        let mut state = running_state(&coll);
        let cid = coll.id();

        assert!(!state.is_locked(cid, AccessType::Read));
        state.lock(cid, AccessType::Write, 0).expect("lock");
        assert!(state.is_locked(cid, AccessType::Read));
        assert!(state.is_locked(cid, AccessType::Write));

        // Re-locking with lesser strength is a no-op.
        state.lock(cid, AccessType::Read, 0).expect("relock");

        // A nested level must not release an outer lock.
        state.unlock(cid, AccessType::Write, 1).expect("nested unlock");
        assert!(state.is_locked(cid, AccessType::Write));

        state.unlock(cid, AccessType::Write, 0).expect("unlock");
        assert!(!state.is_locked(cid, AccessType::Read));
    }

    #[test]
    fn test_write_lock_requires_write_binding() {
        let coll = users();
        let mut state = TransactionState::new(TransactionId::default(), None, false);
        state
            .add_collection(coll.id(), AccessType::Read, Some(Arc::clone(&coll)), true)
            .expect("add");
        state.begin(TransactionHints::NONE, 0).expect("begin");

        let err = state.lock(coll.id(), AccessType::Write, 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::TransactionInternal);
    }

    #[test]
    fn test_abort_releases_locks() {
        let coll = users();
        let mut state = running_state(&coll);
        state.lock(coll.id(), AccessType::Write, 0).expect("lock");
        state.abort(0).expect("abort");
        // The collection lock must be free again.
        coll.lock().lock_write();
        coll.lock().unlock_write();
    }
}
