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

/// Every operation, read or write, is replayed on every member.
///
/// Reads and writes share one transactional dispatcher. A read returns the
/// highest-priority member's result after every member answered; a read or
/// write fails as a whole if any member fails.
pub struct CompositingAccessor {
    fanout: Fanout,
}

impl CompositingAccessor {
    pub fn new(
        members: Vec<AccessorDescriptor>,
        factory: &dyn DispatcherFactory,
    ) -> AccessResult<Self> {
        Ok(Self {
            fanout: Fanout::new(RedundancyMode::Compositing, factory.compositing(members)?),
        })
    }
}

impl RedundantAccessor for CompositingAccessor {
    fn redundancy_mode(&self) -> RedundancyMode {
        self.fanout.mode()
    }

    fn dispatchable(&self) -> &DispatchableAccessors {
        self.fanout.dispatch()
    }
}

#[async_trait]
impl Accessor for CompositingAccessor {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{order, store};
    use tandem_accessor::InMemoryAccessor;
    use tandem_dispatch::StandardDispatcherFactory;
    use tandem_types::AccessError;

    fn composite() -> (Arc<InMemoryAccessor>, Arc<InMemoryAccessor>, CompositingAccessor) {
        let (a, da) = store("a", 1.0, vec![order(1, "eu", 10)]);
        let (b, db) = store("b", 2.0, vec![order(1, "eu", 99)]);
        let composite = CompositingAccessor::new(vec![db, da], &StandardDispatcherFactory).unwrap();
        (a, b, composite)
    }

    #[test]
    fn one_handle_serves_both_sides() {
        let (_a, _b, c) = composite();
        assert_eq!(c.redundancy_mode(), RedundancyMode::Compositing);
        assert!(!c.dispatchable().writing_separation());
        assert!(c.dispatchable().is_shared());
        assert_eq!(c.name(), "compositing[a,b]");
    }

    #[test]
    fn reads_replay_on_every_member() {
        let (a, b, c) = composite();
        let found = c.find("order", &Key::from(1)).unwrap().unwrap();
        assert_eq!(found.field("amount"), Some(&serde_json::json!(10)));
        assert_eq!(a.invocations(), 1);
        assert_eq!(b.invocations(), 1);
    }

    #[test]
    fn read_fails_if_any_member_fails() {
        let (_a, b, c) = composite();
        b.set_available(false);
        let err = c.find("order", &Key::from(1)).unwrap_err();
        assert_eq!(err, AccessError::unavailable("b", "store offline"));
    }

    #[test]
    fn writes_are_all_or_nothing() {
        let (a, b, c) = composite();
        c.add(&order(2, "us", 5)).unwrap();
        assert_eq!(c.save_changes().unwrap(), 1);
        assert!(a.durable("order", &Key::from(2)).is_some());
        assert!(b.durable("order", &Key::from(2)).is_some());

        c.add(&order(3, "us", 5)).unwrap();
        b.set_refuse_prepare(true);
        assert!(c.save_changes().is_err());
        assert!(a.durable("order", &Key::from(3)).is_none());
        assert!(b.durable("order", &Key::from(3)).is_none());
    }

    #[test]
    fn failed_read_keeps_staged_writes() {
        let (a, b, c) = composite();
        c.add(&order(7, "eu", 1)).unwrap();
        b.set_available(false);
        assert!(c.exists("order", &Key::from(7)).is_err());
        assert_eq!(a.pending_len(), 1);

        b.set_available(true);
        assert_eq!(c.save_changes().unwrap(), 1);
        assert!(a.durable("order", &Key::from(7)).is_some());
        assert!(b.durable("order", &Key::from(7)).is_some());
    }

    #[test]
    fn joined_view_reads_its_own_scope() {
        let (a, b, c) = composite();
        let tx = TransactionContext::begin();
        c.enlist(&tx).unwrap();
        let bound = c.joined(&tx).unwrap();
        bound.add(&order(8, "eu", 1)).unwrap();
        assert_eq!(bound.save_changes().unwrap(), 1);
        assert!(bound.exists("order", &Key::from(8)).unwrap());

        let err = c.exists("order", &Key::from(8)).unwrap_err();
        assert!(matches!(err, AccessError::Transaction { .. }));

        c.rollback(&tx).unwrap();
        assert!(!c.exists("order", &Key::from(8)).unwrap());
        assert!(!a.in_transaction() && !b.in_transaction());
    }

    #[test]
    fn create_database_is_conjunctive_over_members() {
        let (a, b, c) = composite();
        b.set_refuse_create(true);
        assert!(!c.try_create_database().unwrap());
        assert!(a.database_created());
    }

    #[tokio::test]
    async fn async_paging_list_comes_from_highest_priority_member() {
        let (_a, _b, c) = composite();
        let spec = tandem_types::QuerySpec::for_type("order").page(0, 10);
        let page = c.find_paging_list_async(&spec, None).await.unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0].field("amount"), Some(&serde_json::json!(10)));
        assert_eq!(c.writing_dispatcher().current_source().unwrap().name(), "b");
    }
}
