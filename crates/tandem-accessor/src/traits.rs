//! The [`Accessor`] trait defining one logical store connection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use tandem_types::{
    AccessError, AccessResult, Key, PagedList, Record, Specification, Statement,
    TransactionContext,
};

/// Returns [`AccessError::Cancelled`] if the token has fired.
pub fn check_cancelled(cancel: Option<&CancellationToken>) -> AccessResult<()> {
    match cancel {
        Some(token) if token.is_cancelled() => Err(AccessError::Cancelled),
        _ => Ok(()),
    }
}

/// One logical connection to a backing store.
///
/// Implementations must be thread-safe (`Send + Sync`). Writes (`add`,
/// `update`, ...) are staged as a unit of work and become durable on
/// [`Accessor::save_changes`]. While enlisted in a [`TransactionContext`],
/// saved work stays invisible to other scopes until [`Accessor::commit`].
///
/// Every async method accepts an optional cancellation token. The default
/// bodies check the token once and delegate to the sync form; backends with
/// real suspension points and composites override them.
#[async_trait]
pub trait Accessor: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    // -- queries ----------------------------------------------------------

    /// Execute a raw statement returning rows of `entity_type`.
    fn query(&self, entity_type: &str, statement: &Statement) -> AccessResult<Vec<Record>>;

    /// Whether a record with `key` exists. Tracked (unsaved) records are
    /// consulted before the store.
    fn exists(&self, entity_type: &str, key: &Key) -> AccessResult<bool>;

    /// Whether any record satisfies `spec`.
    fn exists_by(&self, spec: &dyn Specification) -> AccessResult<bool>;

    /// Look up a record by primary key.
    fn find(&self, entity_type: &str, key: &Key) -> AccessResult<Option<Record>>;

    /// Look up several records by primary key, skipping missing ones.
    fn find_many(&self, entity_type: &str, keys: &[Key]) -> AccessResult<Vec<Record>> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = self.find(entity_type, key)? {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// Every record satisfying `spec`, in the specification's order.
    /// Paging is ignored.
    fn find_list(&self, spec: &dyn Specification) -> AccessResult<Vec<Record>>;

    /// The page of matching records requested by `spec`.
    fn find_paging_list(&self, spec: &dyn Specification) -> AccessResult<PagedList>;

    // -- unit of work -----------------------------------------------------

    /// Stage a new record.
    fn add(&self, record: &Record) -> AccessResult<()>;

    fn add_range(&self, records: &[Record]) -> AccessResult<()> {
        records.iter().try_for_each(|r| self.add(r))
    }

    /// Track an existing record without scheduling a write.
    fn attach(&self, record: &Record) -> AccessResult<()>;

    fn attach_range(&self, records: &[Record]) -> AccessResult<()> {
        records.iter().try_for_each(|r| self.attach(r))
    }

    /// Stage removal of a record.
    fn remove(&self, record: &Record) -> AccessResult<()>;

    fn remove_range(&self, records: &[Record]) -> AccessResult<()> {
        records.iter().try_for_each(|r| self.remove(r))
    }

    /// Stage replacement of a record's fields.
    fn update(&self, record: &Record) -> AccessResult<()>;

    fn update_range(&self, records: &[Record]) -> AccessResult<()> {
        records.iter().try_for_each(|r| self.update(r))
    }

    /// Apply staged work. Returns the number of records written.
    fn save_changes(&self) -> AccessResult<usize>;

    // -- lifecycle --------------------------------------------------------

    /// Create the backing database if missing. Returns `true` if the
    /// database exists afterwards, `false` if it could not be created.
    fn try_create_database(&self) -> AccessResult<bool>;

    /// Point this accessor at another connection.
    fn change_connection(&self, connection: &str) -> AccessResult<()>;

    /// Release the connection.
    fn dispose(&self) -> AccessResult<()>;

    // -- transaction participation ----------------------------------------

    /// Join a transaction scope. Saved work is held back until commit.
    fn enlist(&self, tx: &TransactionContext) -> AccessResult<()>;

    /// Vote on completing the scope. After a successful prepare, commit
    /// must not fail for reasons under the member's control.
    fn prepare(&self, tx: &TransactionContext) -> AccessResult<()>;

    /// Make the scope's saved work durable.
    fn commit(&self, tx: &TransactionContext) -> AccessResult<()>;

    /// Discard the work done inside the scope. Changes staged before
    /// enlistment stay staged.
    fn rollback(&self, tx: &TransactionContext) -> AccessResult<()>;

    /// A handle whose calls run inside `tx`, for accessors that open their
    /// own transactions per call. The caller must have enlisted `self` in
    /// `tx` first. Plain stores return `None`: enlistment already binds
    /// every later call to the scope.
    fn joined(&self, _tx: &TransactionContext) -> Option<Arc<dyn Accessor>> {
        None
    }

    // -- async surface ----------------------------------------------------

    async fn query_async(
        &self,
        entity_type: &str,
        statement: &Statement,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        check_cancelled(cancel)?;
        self.query(entity_type, statement)
    }

    async fn exists_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        check_cancelled(cancel)?;
        self.exists(entity_type, key)
    }

    async fn exists_by_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        check_cancelled(cancel)?;
        self.exists_by(spec)
    }

    async fn find_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Option<Record>> {
        check_cancelled(cancel)?;
        self.find(entity_type, key)
    }

    async fn find_many_async(
        &self,
        entity_type: &str,
        keys: &[Key],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        check_cancelled(cancel)?;
        self.find_many(entity_type, keys)
    }

    async fn find_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        check_cancelled(cancel)?;
        self.find_list(spec)
    }

    async fn find_paging_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<PagedList> {
        check_cancelled(cancel)?;
        self.find_paging_list(spec)
    }

    async fn add_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.add(record)
    }

    async fn add_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.add_range(records)
    }

    async fn attach_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.attach(record)
    }

    async fn attach_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.attach_range(records)
    }

    async fn remove_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.remove(record)
    }

    async fn remove_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.remove_range(records)
    }

    async fn update_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.update(record)
    }

    async fn update_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.update_range(records)
    }

    async fn save_changes_async(&self, cancel: Option<&CancellationToken>) -> AccessResult<usize> {
        check_cancelled(cancel)?;
        self.save_changes()
    }

    async fn try_create_database_async(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        check_cancelled(cancel)?;
        self.try_create_database()
    }

    async fn dispose_async(&self, cancel: Option<&CancellationToken>) -> AccessResult<()> {
        check_cancelled(cancel)?;
        self.dispose()
    }
}
