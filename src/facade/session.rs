use super::Database;
use crate::core::{DbError, Result};
use crate::revision::{Revision, RevisionInfo};
use crate::transaction::{CommitReceipt, Transaction};

/// A database handle with at most one open transaction.
///
/// Mirrors a request-scoped session: revision lookups and writes outside an
/// open transaction fail with `NoActiveTransaction`.
#[derive(Debug)]
pub struct Session {
    db: Database,
    transaction: Option<Transaction>,
}

impl Session {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            transaction: None,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.as_ref().is_some_and(Transaction::is_active)
    }

    pub fn begin(&mut self) -> Result<&mut Transaction> {
        if self.in_transaction() {
            return Err(DbError::ContractViolation(
                "session already has an open transaction".to_string(),
            ));
        }
        Ok(self.transaction.insert(self.db.begin()))
    }

    /// The open transaction.
    pub fn transaction(&mut self) -> Result<&mut Transaction> {
        match self.transaction.as_mut() {
            Some(txn) if txn.is_active() => Ok(txn),
            _ => Err(DbError::NoActiveTransaction),
        }
    }

    pub fn set_revision_info(&mut self, info: RevisionInfo) -> Result<()> {
        self.transaction()?.set_revision_info(info)
    }

    pub fn current_revision(&mut self) -> Result<&Revision> {
        self.transaction()?.current_revision()
    }

    pub async fn commit(&mut self) -> Result<CommitReceipt> {
        let mut txn = self.transaction.take().ok_or(DbError::NoActiveTransaction)?;
        txn.commit().await
    }

    pub fn rollback(&mut self) -> Result<()> {
        let mut txn = self.transaction.take().ok_or(DbError::NoActiveTransaction)?;
        txn.rollback()
    }
}
