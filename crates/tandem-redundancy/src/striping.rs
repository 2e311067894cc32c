use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_dispatch::{DispatchableAccessors, DispatcherFactory};
use tandem_types::{
    AccessResult, Key, PagedList, Paging, Record, RedundancyMode, Specification, Statement,
    TransactionContext,
};

use crate::fanout::Fanout;
use crate::policy::RedundantAccessor;

/// Disjoint shards: every shard holds a slice of the data, not a replica.
///
/// Reads and writes both traverse every shard inside one transaction. Read
/// results are aggregated instead of selected: lists are concatenated in
/// shard priority order, `exists` is true if any shard has a match, `find`
/// returns the first shard's hit. A paging list asks each shard only for its
/// leading rows up to the end of the requested page, then cuts the page out
/// of the merged rows. Which rows a shard accepts on write is decided by the
/// shard itself.
pub struct StripingAccessor {
    fanout: Fanout,
}

impl StripingAccessor {
    pub fn new(
        members: Vec<AccessorDescriptor>,
        factory: &dyn DispatcherFactory,
    ) -> AccessResult<Self> {
        Ok(Self {
            fanout: Fanout::new(RedundancyMode::Striping, factory.transaction(members)?),
        })
    }
}

impl RedundantAccessor for StripingAccessor {
    fn redundancy_mode(&self) -> RedundancyMode {
        self.fanout.mode()
    }

    fn dispatchable(&self) -> &DispatchableAccessors {
        self.fanout.dispatch()
    }
}

fn concat(shards: Vec<Vec<Record>>) -> Vec<Record> {
    shards.into_iter().flatten().collect()
}

fn any(shards: Vec<bool>) -> bool {
    shards.into_iter().any(|hit| hit)
}

fn first_hit(shards: Vec<Option<Record>>) -> Option<Record> {
    shards.into_iter().flatten().next()
}

/// Merge per-shard matches into the specification's order. The sort is
/// stable, so equal rows keep shard priority order.
fn merge(spec: &dyn Specification, shards: Vec<Vec<Record>>) -> Vec<Record> {
    let mut rows = concat(shards);
    rows.sort_by(|a, b| spec.compare(a, b));
    rows
}

/// A paged request as one shard sees it: same filter and order, paging
/// replaced by `paging`.
struct Window<'a> {
    spec: &'a dyn Specification,
    paging: Paging,
}

impl<'a> Window<'a> {
    /// Rows from the top of every shard through the end of the page.
    fn through(spec: &'a dyn Specification, paging: Paging) -> Self {
        Self {
            spec,
            paging: paging.prefix(),
        }
    }
}

impl Specification for Window<'_> {
    fn entity_type(&self) -> &str {
        self.spec.entity_type()
    }

    fn is_satisfied_by(&self, record: &Record) -> bool {
        self.spec.is_satisfied_by(record)
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        self.spec.compare(a, b)
    }

    fn paging(&self) -> Option<Paging> {
        Some(self.paging)
    }
}

/// Cut `paging` out of the shards' windows. Every row of the page lies in
/// some shard's window; the total is the sum of the shards' totals.
fn merge_pages(spec: &dyn Specification, paging: Paging, shards: Vec<PagedList>) -> PagedList {
    let total_count = shards.iter().map(|page| page.total_count).sum();
    let shard_count = shards.len();
    let rows = merge(spec, shards.into_iter().map(|page| page.items).collect());
    debug!(
        entity_type = spec.entity_type(),
        shards = shard_count,
        fetched = rows.len(),
        total = total_count,
        "merged striped paging list"
    );
    PagedList {
        items: rows
            .into_iter()
            .skip(paging.offset())
            .take(paging.page_size)
            .collect(),
        page_index: paging.page_index,
        page_size: paging.page_size,
        total_count,
    }
}

#[async_trait]
impl Accessor for StripingAccessor {
    fn name(&self) -> &str {
        self.fanout.name()
    }

    fn query(&self, entity_type: &str, statement: &Statement) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_all(|a| a.query(entity_type, statement))
            .map(concat)
    }

    fn exists(&self, entity_type: &str, key: &Key) -> AccessResult<bool> {
        self.fanout.read_all(|a| a.exists(entity_type, key)).map(any)
    }

    fn exists_by(&self, spec: &dyn Specification) -> AccessResult<bool> {
        self.fanout.read_all(|a| a.exists_by(spec)).map(any)
    }

    fn find(&self, entity_type: &str, key: &Key) -> AccessResult<Option<Record>> {
        self.fanout
            .read_all(|a| a.find(entity_type, key))
            .map(first_hit)
    }

    fn find_many(&self, entity_type: &str, keys: &[Key]) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_all(|a| a.find_many(entity_type, keys))
            .map(concat)
    }

    fn find_list(&self, spec: &dyn Specification) -> AccessResult<Vec<Record>> {
        let shards = self.fanout.read_all(|a| a.find_list(spec))?;
        Ok(merge(spec, shards))
    }

    fn find_paging_list(&self, spec: &dyn Specification) -> AccessResult<PagedList> {
        let Some(paging) = spec.paging() else {
            let shards = self.fanout.read_all(|a| a.find_list(spec))?;
            return Ok(PagedList::unpaged(merge(spec, shards)));
        };
        let window = Window::through(spec, paging);
        let shards = self.fanout.read_all(|a| a.find_paging_list(&window))?;
        Ok(merge_pages(spec, paging, shards))
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

    /// Sum over shards; each shard wrote its own slice.
    fn save_changes(&self) -> AccessResult<usize> {
        let counts = self.fanout.write_all(|a| a.save_changes())?;
        Ok(counts.into_iter().sum())
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
            .read_all_async(cancel, move |a, inv| {
                async move { a.query_async(entity_type, statement, inv.cancellation()).await }
                    .boxed()
            })
            .await
            .map(concat)
    }

    async fn exists_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        self.fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.exists_async(entity_type, key, inv.cancellation()).await }.boxed()
            })
            .await
            .map(any)
    }

    async fn exists_by_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        self.fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.exists_by_async(spec, inv.cancellation()).await }.boxed()
            })
            .await
            .map(any)
    }

    async fn find_async(
        &self,
        entity_type: &str,
        key: &Key,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Option<Record>> {
        self.fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.find_async(entity_type, key, inv.cancellation()).await }.boxed()
            })
            .await
            .map(first_hit)
    }

    async fn find_many_async(
        &self,
        entity_type: &str,
        keys: &[Key],
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        self.fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.find_many_async(entity_type, keys, inv.cancellation()).await }
                    .boxed()
            })
            .await
            .map(concat)
    }

    async fn find_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<Vec<Record>> {
        let shards = self
            .fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.find_list_async(spec, inv.cancellation()).await }.boxed()
            })
            .await?;
        Ok(merge(spec, shards))
    }

    async fn find_paging_list_async(
        &self,
        spec: &dyn Specification,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<PagedList> {
        let Some(paging) = spec.paging() else {
            return self
                .find_list_async(spec, cancel)
                .await
                .map(PagedList::unpaged);
        };
        let window = Window::through(spec, paging);
        let window = &window;
        let shards = self
            .fanout
            .read_all_async(cancel, move |a, inv| {
                async move { a.find_paging_list_async(window, inv.cancellation()).await }.boxed()
            })
            .await?;
        Ok(merge_pages(spec, paging, shards))
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
        let counts = self
            .fanout
            .write_all_async(cancel, |a, inv| {
                async move { a.save_changes_async(inv.cancellation()).await }.boxed()
            })
            .await?;
        Ok(counts.into_iter().sum())
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
    use serde_json::json;
    use tandem_accessor::InMemoryAccessor;
    use tandem_dispatch::StandardDispatcherFactory;
    use tandem_types::QuerySpec;

    /// Even ids on stripe "even", odd ids on stripe "odd", 12 eu rows each
    /// side of which 6 match `amount >= 50`.
    fn stripes() -> (Arc<InMemoryAccessor>, Arc<InMemoryAccessor>, StripingAccessor) {
        let even_rows = (0..12).map(|i| order(i * 2, "eu", if i < 6 { 50 + i } else { i }));
        let odd_rows = (0..12).map(|i| order(i * 2 + 1, "eu", if i < 6 { 60 + i } else { i }));
        let (even, de) = store("even", 1.0, even_rows.collect());
        let (odd, dodd) = store("odd", 2.0, odd_rows.collect());
        let striping = StripingAccessor::new(vec![de, dodd], &StandardDispatcherFactory).unwrap();
        (even, odd, striping)
    }

    fn rich_orders() -> QuerySpec {
        QuerySpec::for_type("order")
            .filter(|r| r.field("amount").and_then(|v| v.as_i64()).is_some_and(|a| a >= 50))
            .order_by("amount")
    }

    #[test]
    fn built_from_transaction_handles() {
        let (_even, _odd, s) = stripes();
        assert_eq!(s.redundancy_mode(), RedundancyMode::Striping);
        assert!(!s.dispatchable().writing_separation());
        assert!(!s.dispatchable().is_shared());
    }

    #[test]
    fn find_list_returns_every_shards_matches() {
        let (even, odd, s) = stripes();
        let spec = rich_orders();
        let expected = even.find_list(&spec).unwrap().len() + odd.find_list(&spec).unwrap().len();
        let rows = s.find_list(&spec).unwrap();
        assert_eq!(rows.len(), expected);
        assert_eq!(rows.len(), 12);
        let amounts: Vec<i64> = rows
            .iter()
            .filter_map(|r| r.field("amount").and_then(|v| v.as_i64()))
            .collect();
        let mut sorted = amounts.clone();
        sorted.sort();
        assert_eq!(amounts, sorted);
    }

    #[test]
    fn paging_merges_shards_into_one_logical_set() {
        let (_even, _odd, s) = stripes();
        let first = s.find_paging_list(&rich_orders().page(0, 10)).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first.total_count, 12);
        assert!(first.has_next_page());
        assert_eq!(first.items[0].field("amount"), Some(&json!(50)));

        let second = s.find_paging_list(&rich_orders().page(1, 10)).unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second.items[1].field("amount"), Some(&json!(65)));
    }

    #[test]
    fn shards_are_asked_only_through_the_requested_page() {
        let (even, odd, s) = stripes();
        let spec = QuerySpec::for_type("order").order_by("amount");
        let paging = Paging::new(1, 3);
        let window = Window::through(&spec, paging);
        assert_eq!(window.paging(), Some(Paging::new(0, 6)));

        let shard = even.find_paging_list(&window).unwrap();
        assert_eq!(shard.len(), 6);
        assert_eq!(shard.total_count, 12);

        let all = s.find_list(&spec).unwrap();
        let page = s.find_paging_list(&spec.clone().page(1, 3)).unwrap();
        assert_eq!(page.total_count, 24);
        assert_eq!(page.page_index, 1);
        assert_eq!(page.items, all[3..6].to_vec());
        assert_eq!(odd.find_paging_list(&window).unwrap().len(), 6);
    }

    #[test]
    fn merge_pages_cuts_from_shard_windows() {
        let spec = QuerySpec::for_type("order").order_by("amount");
        let left = PagedList::paginate(
            vec![order(1, "eu", 1), order(3, "eu", 3), order(5, "eu", 5)],
            Paging::new(0, 3),
        );
        let right = PagedList {
            items: vec![order(2, "eu", 2), order(4, "eu", 4)],
            page_index: 0,
            page_size: 3,
            total_count: 9,
        };
        let page = merge_pages(&spec, Paging::new(1, 2), vec![left, right]);
        assert_eq!(page.total_count, 12);
        let ids: Vec<String> = page.items.iter().map(|r| r.key.to_string()).collect();
        assert_eq!(ids, vec!["3", "4"]);
        assert!(page.has_next_page());
    }

    #[test]
    fn lookups_aggregate_across_shards() {
        let (_even, odd, s) = stripes();
        assert!(s.exists("order", &Key::from(3)).unwrap());
        assert!(!s.exists("order", &Key::from(999)).unwrap());
        let hit = s.find("order", &Key::from(3)).unwrap().unwrap();
        assert_eq!(hit.field("amount"), Some(&json!(61)));
        assert_eq!(odd.invocations(), 3);

        let many = s
            .find_many("order", &[Key::from(0), Key::from(1), Key::from(500)])
            .unwrap();
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn writes_land_on_the_admitting_shard() {
        let even = Arc::new(InMemoryAccessor::new("even").admitting(|r| {
            r.key.components()[0].as_i64().is_some_and(|id| id % 2 == 0)
        }));
        let odd = Arc::new(InMemoryAccessor::new("odd").admitting(|r| {
            r.key.components()[0].as_i64().is_some_and(|id| id % 2 == 1)
        }));
        let s = StripingAccessor::new(
            vec![
                AccessorDescriptor::new("even", even.clone()).with_priority(1.0),
                AccessorDescriptor::new("odd", odd.clone()).with_priority(2.0),
            ],
            &StandardDispatcherFactory,
        )
        .unwrap();

        s.add_range(&[order(10, "eu", 1), order(11, "eu", 1), order(12, "eu", 1)])
            .unwrap();
        assert_eq!(s.save_changes().unwrap(), 3);
        assert_eq!(even.durable_count("order"), 2);
        assert_eq!(odd.durable_count("order"), 1);
    }

    #[tokio::test]
    async fn async_paging_matches_sync() {
        let (_even, _odd, s) = stripes();
        let spec = rich_orders().page(0, 10);
        let page = s.find_paging_list_async(&spec, None).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page.total_count, 12);
        assert_eq!(page.total_pages(), 2);
    }
}
