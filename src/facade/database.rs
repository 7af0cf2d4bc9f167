use super::Session;
use crate::activity::{Activity, ActivityDeriver, ActivityDetail};
use crate::config::EngineConfig;
use crate::core::{Result, Row};
use crate::lifecycle::{Maintenance, StateValidator};
use crate::lineage::LineageWriter;
use crate::query::{AttributeChange, HistoryReader, HistoryRow};
use crate::revision::{Revision, RevisionLedger};
use crate::storage::InMemoryStorage;
use crate::transaction::{CommitHook, HookPipeline, ObjectRef, Transaction};
use crate::versioned::{Versioned, VersionedSchema};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// State shared by a database handle and every transaction it began.
#[derive(Debug)]
pub(crate) struct EngineShared {
    pub(crate) storage: RwLock<InMemoryStorage>,
    pub(crate) schema: VersionedSchema,
    pub(crate) config: EngineConfig,
    pub(crate) ledger: RevisionLedger,
}

/// An in-memory store of versioned entities.
///
/// Cheap to clone; clones share storage, ledger and hooks registered so far.
///
/// ```
/// # use catalog_revisions::{Database, EngineConfig, VersionedSchema};
/// # fn main() -> catalog_revisions::Result<()> {
/// let schema = VersionedSchema::builder().build()?;
/// let db = Database::open(schema, EngineConfig::default())?;
/// assert_eq!(
///     db.hooks(),
///     vec!["state_validator", "lineage_writer", "activity_deriver"]
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    shared: Arc<EngineShared>,
    hooks: Arc<HookPipeline>,
}

impl Database {
    /// Creates every live, history and system table and registers the
    /// default commit hooks.
    pub fn open(schema: VersionedSchema, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let mut storage = InMemoryStorage::new();
        schema.install(&mut storage)?;

        let mut hooks = HookPipeline::new();
        hooks.register(Arc::new(StateValidator));
        hooks.register(Arc::new(LineageWriter));
        if config.emit_activities {
            hooks.register(Arc::new(ActivityDeriver));
        }

        log::info!(
            "opened database with {} versioned and {} plain tables",
            schema.tables().len(),
            schema.plain_tables().len()
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                storage: RwLock::new(storage),
                ledger: RevisionLedger::new(&config),
                schema,
                config,
            }),
            hooks: Arc::new(hooks),
        })
    }

    pub fn with_defaults(schema: VersionedSchema) -> Result<Self> {
        Self::open(schema, EngineConfig::default())
    }

    /// Appends a hook after the defaults. Transactions begun earlier keep the
    /// pipeline they started with.
    pub fn register_hook(&mut self, hook: Arc<dyn CommitHook>) {
        Arc::make_mut(&mut self.hooks).register(hook);
    }

    pub fn hooks(&self) -> Vec<&'static str> {
        self.hooks.list_hooks()
    }

    pub fn schema(&self) -> &VersionedSchema {
        &self.shared.schema
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Starts a transaction. Nothing is visible to others until commit.
    ///
    /// # Examples
    ///
    /// ```
    /// # use catalog_revisions::{Database, VersionedSchema};
    /// # tokio_test::block_on(async {
    /// # let db = Database::with_defaults(VersionedSchema::builder().build().unwrap()).unwrap();
    /// let mut txn = db.begin();
    /// let revision = txn.current_revision().unwrap().id();
    /// let receipt = txn.commit().await.unwrap();
    /// assert_eq!(receipt.revision_id, Some(revision));
    /// # });
    /// ```
    pub fn begin(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.shared), Arc::clone(&self.hooks))
    }

    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    /// Physical removal, for tests and compaction only.
    pub fn maintenance(&self) -> Maintenance {
        Maintenance::new(Arc::clone(&self.shared))
    }

    async fn read<R>(&self, query: impl FnOnce(&HistoryReader<'_>) -> Result<R>) -> Result<R> {
        let storage = self.shared.storage.read().await;
        query(&HistoryReader::new(&storage, &self.shared.schema))
    }

    /// Committed row of any table.
    pub async fn get(&self, table: &str, id: &str) -> Result<Option<Row>> {
        let storage = self.shared.storage.read().await;
        storage.get_row(table, &ObjectRef::new(table, id).key())
    }

    pub async fn load<T: Versioned>(&self, id: &str) -> Result<Option<T>> {
        self.get(T::TABLE, id)
            .await?
            .map(|row| T::from_row(&row))
            .transpose()
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        self.shared.storage.read().await.row_count(table)
    }

    pub async fn lineage(&self, table: &str, id: &str) -> Result<Vec<HistoryRow>> {
        self.read(|reader| reader.lineage(table, id)).await
    }

    pub async fn as_of(
        &self,
        table: &str,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<HistoryRow>> {
        self.read(|reader| reader.as_of(table, id, at)).await
    }

    pub async fn current_history(&self, table: &str, id: &str) -> Result<Option<HistoryRow>> {
        self.read(|reader| reader.current_history(table, id)).await
    }

    pub async fn reconstruct<T: Versioned>(
        &self,
        id: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<T>> {
        self.read(|reader| reader.reconstruct::<T>(id, at)).await
    }

    pub async fn diff(
        &self,
        table: &str,
        id: &str,
        from_revision: Uuid,
        to_revision: Uuid,
    ) -> Result<Vec<AttributeChange>> {
        self.read(|reader| reader.diff(table, id, from_revision, to_revision))
            .await
    }

    pub async fn revision(&self, id: Uuid) -> Result<Option<Revision>> {
        self.read(|reader| reader.revision(id)).await
    }

    pub async fn revisions(&self) -> Result<Vec<Revision>> {
        self.read(|reader| reader.revisions()).await
    }

    pub async fn revision_contents(&self, revision: Uuid) -> Result<Vec<ObjectRef>> {
        self.read(|reader| reader.revision_contents(revision)).await
    }

    pub async fn activities(&self) -> Result<Vec<Activity>> {
        self.read(|reader| reader.activities()).await
    }

    pub async fn activities_for(&self, object_id: &str) -> Result<Vec<Activity>> {
        self.read(|reader| reader.activities_for(object_id)).await
    }

    pub async fn activity_details(&self, activity_id: Uuid) -> Result<Vec<ActivityDetail>> {
        self.read(|reader| reader.activity_details(activity_id)).await
    }
}
