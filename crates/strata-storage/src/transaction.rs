//! Transaction support for Strata stores
//!
//! A transaction is an ordered list of statements submitted as one unit.
//! Each write carries a guard that the store checks against the state seen
//! by that statement (earlier statements of the same transaction included);
//! a failing guard rejects the whole transaction.

use crate::{CommitReceipt, InstanceStore};
use strata_core::{EntityProxy, Error, Guid, Instance, Record, Result};
use tracing::debug;

/// Precondition attached to a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// No precondition
    Any,
    /// Nothing may be stored under the GUID
    Absent,
    /// The stored record must be at exactly this version
    Version(u64),
    /// The GUID must not hold a full entity (absent or proxy only)
    NoFullEntity,
}

impl Guard {
    /// Check the guard against the record currently visible for the GUID
    pub fn check(&self, guid: &Guid, current: Option<&Record>) -> Result<()> {
        let ok = match (self, current) {
            (Guard::Any, _) => true,
            (Guard::Absent, current) => current.is_none(),
            (Guard::Version(v), Some(record)) => record.header().version == *v,
            (Guard::Version(_), None) => false,
            (Guard::NoFullEntity, current) => !matches!(current, Some(Record::Entity(_))),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::conflict_on_commit(format!(
                "{} failed {:?} (stored version {:?})",
                guid,
                self,
                current.map(|r| r.header().version)
            )))
        }
    }
}

/// One store-level write
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Write a new revision of a record
    Put { record: Record, guard: Guard },
    /// Remove every revision of a GUID
    Evict { guid: Guid },
}

impl Statement {
    /// GUID the statement writes to
    pub fn guid(&self) -> &Guid {
        match self {
            Statement::Put { record, .. } => record.guid(),
            Statement::Evict { guid } => guid,
        }
    }
}

/// Builder for an ordered, atomically submitted list of statements
#[derive(Debug, Default)]
pub struct TransactionBuilder {
    statements: Vec<Statement>,
}

impl TransactionBuilder {
    /// Create an empty transaction
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a record under an explicit guard
    pub fn put(&mut self, record: impl Into<Record>, guard: Guard) -> &mut Self {
        self.statements.push(Statement::Put {
            record: record.into(),
            guard,
        });
        self
    }

    /// Write a record whose GUID must not exist yet
    pub fn create(&mut self, record: impl Into<Record>) -> &mut Self {
        self.put(record, Guard::Absent)
    }

    /// Write the next revision of an instance read at `prior_version`
    pub fn replace<T: Instance + Into<Record>>(&mut self, prior_version: u64, next: T) -> &mut Self {
        self.put(next, Guard::Version(prior_version))
    }

    /// Write a proxy unless a full entity is already stored under its GUID
    pub fn put_proxy(&mut self, proxy: EntityProxy) -> &mut Self {
        self.put(proxy, Guard::NoFullEntity)
    }

    /// Write a record unconditionally
    pub fn overwrite(&mut self, record: impl Into<Record>) -> &mut Self {
        self.put(record, Guard::Any)
    }

    /// Remove every revision of a GUID
    pub fn evict(&mut self, guid: Guid) -> &mut Self {
        self.statements.push(Statement::Evict { guid });
        self
    }

    /// Number of statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// Check if the transaction has no statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Borrow the statements in submission order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Take the statements out of the builder
    pub fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    /// Submit every statement as one atomic unit
    pub fn submit(self, store: &dyn InstanceStore) -> Result<CommitReceipt> {
        if self.statements.is_empty() {
            return Err(Error::InvalidState("empty transaction".to_string()));
        }
        debug!("Submitting transaction of {} statements", self.statements.len());
        store.submit(self.statements)
    }
}
