use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_dispatch::{DispatchableAccessors, DispatcherFactory};
use tandem_types::{
    AccessResult, Key, PagedList, Record, RedundancyMode, Specification, Statement,
    TransactionContext,
};

use crate::fanout::Fanout;
use crate::policy::RedundantAccessor;

/// Full replicas: reads fail over, writes replicate atomically.
///
/// Reads go to the first healthy member in priority order. Every write runs
/// on all members inside one transaction, so either every mirror holds the
/// change after the call returns or none does.
pub struct MirroringAccessor {
    fanout: Fanout,
}

impl MirroringAccessor {
    pub fn new(
        members: Vec<AccessorDescriptor>,
        factory: &dyn DispatcherFactory,
    ) -> AccessResult<Self> {
        Ok(Self {
            fanout: Fanout::new(RedundancyMode::Mirroring, factory.base(members)?),
        })
    }
}

impl RedundantAccessor for MirroringAccessor {
    fn redundancy_mode(&self) -> RedundancyMode {
        self.fanout.mode()
    }

    fn dispatchable(&self) -> &DispatchableAccessors {
        self.fanout.dispatch()
    }
}

#[async_trait]
impl Accessor for MirroringAccessor {
    fn name(&self) -> &str {
        self.fanout.name()
    }

    fn query(&self, entity_type: &str, statement: &Statement) -> AccessResult<Vec<Record>> {
        self.fanout.read(|a| a.query(entity_type, statement))
    }

    fn exists(&self, entity_type: &str, key: &Key) -> AccessResult<bool> {
        self.fanout.read(|a| a.exists(entity_type, key))
    }

    fn exists_by(&self, spec: &dyn Specification) -> AccessResult<bool> {
        self.fanout.read(|a| a.exists_by(spec))
    }

    fn find(&self, entity_type: &str, key: &Key) -> AccessResult<Option<Record>> {
        self.fanout.read(|a| a.find(entity_type, key))
    }

    fn find_many(&self, entity_type: &str, keys: &[Key]) -> AccessResult<Vec<Record>> {
        self.fanout.read(|a| a.find_many(entity_type, keys))
    }

    fn find_list(&self, spec: &dyn Specification) -> AccessResult<Vec<Record>> {
        self.fanout.read(|a| a.find_list(spec))
    }

    fn find_paging_list(&self, spec: &dyn Specification) -> AccessResult<PagedList> {
        self.fanout.read(|a| a.find_paging_list(spec))
    }

    fn add(&self, record: &Record) -> AccessResult<()> {
        self.fanout.write(|a| a.add(record))
    }

    fn add_range(&self, records: &[Record]) -> AccessResult<()> {
        self.fanout.write(|a| a.add_range(records))
    }

    fn attach(&self, record: &Record) -> AccessResult<()> {
        self.fanout.write(|a| a.attach(record))
    }

    fn attach_range(&self, records: &[Record]) -> AccessResult<()> {
        self.fanout.write(|a| a.attach_range(records))
    }

    fn remove(&self, record: &Record) -> AccessResult<()> {
        self.fanout.write(|a| a.remove(record))
    }

    fn remove_range(&self, records: &[Record]) -> AccessResult<()> {
        self.fanout.write(|a| a.remove_range(records))
    }

    fn update(&self, record: &Record) -> AccessResult<()> {
        self.fanout.write(|a| a.update(record))
    }

    fn update_range(&self, records: &[Record]) -> AccessResult<()> {
        self.fanout.write(|a| a.update_range(records))
    }

    fn save_changes(&self) -> AccessResult<usize> {
        self.fanout.write(|a| a.save_changes())
    }

    fn try_create_database(&self) -> AccessResult<bool> {
        self.fanout.try_create_database()
    }

    fn change_connection(&self, _connection: &str) -> AccessResult<()> {
        self.fanout.change_connection()
    }

    fn dispose(&self) -> AccessResult<()> {
        self.fanout.dispose()
    }

    fn enlist(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.fanout.enlist(tx)
    }

    fn prepare(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.fanout.prepare(tx)
    }

    fn commit(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.fanout.commit(tx)
    }

    fn rollback(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.fanout.rollback(tx)
    }

    fn joined(&self, tx: &TransactionContext) -> Option<Arc<dyn Accessor>> {
        Some(Arc::new(Self {
            fanout: self.fanout.joined(tx),
        }))
    }

    async fn query_async(
        &self,
        entity_type: &str,
        statement: &Statement,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.query_async(entity_type, statement, inv.cancellation()).await }
                    .boxed()
            })
            .await
    }

    async fn exists_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.exists_async(entity_type, key, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn exists_by_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.exists_by_async(spec, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn find_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Option<Record>> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.find_async(entity_type, key, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn find_many_async(
        &self,
        entity_type: &str,
        keys: &[Key],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.find_many_async(entity_type, keys, inv.cancellation()).await }
                    .boxed()
            })
            .await
    }

    async fn find_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.find_list_async(spec, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn find_paging_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<PagedList> {
        self.fanout
            .read_async(cancel, move |a, inv| {
                async move { a.find_paging_list_async(spec, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn add_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.add_async(record, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn add_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.add_range_async(records, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn attach_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.attach_async(record, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn attach_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.attach_range_async(records, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn remove_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.remove_async(record, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn remove_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.remove_range_async(records, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn update_async(
        &self,
        record: &Record,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.update_async(record, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn update_range_async(
        &self,
        records: &[Record],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<()> {
        self.fanout
            .write_async(cancel, move |a, inv| {
                async move { a.update_range_async(records, inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn save_changes_async(&self, cancel: Option<&CancellationToken>) -> AccessResult<usize> {
        self.fanout
            .write_async(cancel, |a, inv| {
                async move { a.save_changes_async(inv.cancellation()).await }.boxed()
            })
            .await
    }

    async fn try_create_database_async(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        self.fanout.try_create_database_async(cancel).await
    }

    async fn dispose_async(&self, cancel: Option<&CancellationToken>) -> AccessResult<()> {
        self.fanout.dispose_async(cancel).await
    }
}
