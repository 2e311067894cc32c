//! Plumbing shared by every redundancy policy.
//!
//! A [`Fanout`] owns the [`DispatchableAccessors`] of one group and knows how
//! to route a call to its reading or writing handle. The policy types only
//! decide which route each [`Accessor`] method takes and, for striping, how
//! per-member results are combined.
//!
//! A fanout bound to a transaction (see [`Fanout::joined`]) passes it to
//! every dispatcher call, so its members run inside that scope instead of
//! opening their own.

use std::sync::Arc;

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_dispatch::{DispatchableAccessors, Dispatcher};
use tandem_equalizer::{BoxFuture, Invocation};
use tandem_types::{AccessError, AccessResult, RedundancyMode, TransactionContext};

#[derive(Clone)]
pub(crate) struct Fanout {
    name: String,
    mode: RedundancyMode,
    dispatch: DispatchableAccessors,
    scope: Option<TransactionContext>,
}

impl Fanout {
    pub(crate) fn new(mode: RedundancyMode, dispatch: DispatchableAccessors) -> Self {
        let names: Vec<&str> = dispatch.members().iter().map(|m| m.name()).collect();
        let name = format!("{mode}[{}]", names.join(","));
        info!(
            policy = %mode,
            members = names.len(),
            writing_separation = dispatch.writing_separation(),
            "redundancy policy built"
        );
        Self {
            name,
            mode,
            dispatch,
            scope: None,
        }
    }

    /// The same group, with every call running inside `tx`.
    pub(crate) fn joined(&self, tx: &TransactionContext) -> Self {
        Self {
            scope: Some(tx.clone()),
            ..self.clone()
        }
    }

    fn scope(&self) -> Option<&TransactionContext> {
        self.scope.as_ref()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn mode(&self) -> RedundancyMode {
        self.mode
    }

    pub(crate) fn dispatch(&self) -> &DispatchableAccessors {
        &self.dispatch
    }

    fn reading(&self) -> &Dispatcher {
        self.dispatch.reading_dispatcher()
    }

    fn writing(&self) -> &Dispatcher {
        self.dispatch.writing_dispatcher()
    }

    fn members(&self) -> &[AccessorDescriptor] {
        self.dispatch.members()
    }

    // -- routing ------------------------------------------------------------

    pub(crate) fn read<R, F>(&self, mut op: F) -> AccessResult<R>
    where
        F: FnMut(&dyn Accessor) -> AccessResult<R>,
    {
        self.reading().invoke_one(self.scope(), |accessor, _| op(accessor))
    }

    pub(crate) fn read_all<R, F>(&self, mut op: F) -> AccessResult<Vec<R>>
    where
        F: FnMut(&dyn Accessor) -> AccessResult<R>,
    {
        self.reading().invoke_all(self.scope(), |accessor, _| op(accessor))
    }

    pub(crate) fn write<R, F>(&self, mut op: F) -> AccessResult<R>
    where
        F: FnMut(&dyn Accessor) -> AccessResult<R>,
    {
        self.writing().invoke_one(self.scope(), |accessor, _| op(accessor))
    }

    pub(crate) fn write_all<R, F>(&self, mut op: F) -> AccessResult<Vec<R>>
    where
        F: FnMut(&dyn Accessor) -> AccessResult<R>,
    {
        self.writing().invoke_all(self.scope(), |accessor, _| op(accessor))
    }

    pub(crate) async fn read_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<R>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        self.reading().invoke_one_async(self.scope(), cancel, op).await
    }

    pub(crate) async fn read_all_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        self.reading().invoke_all_async(self.scope(), cancel, op).await
    }

    pub(crate) async fn write_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<R>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        self.writing().invoke_one_async(self.scope(), cancel, op).await
    }

    pub(crate) async fn write_all_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        self.writing().invoke_all_async(self.scope(), cancel, op).await
    }

    // -- lifecycle ----------------------------------------------------------

    /// Read side AND, when writes are separated, write side.
    pub(crate) fn try_create_database(&self) -> AccessResult<bool> {
        let read_side = all(
            self.reading()
                .invoke_all(self.scope(), |a, _| a.try_create_database())?,
        );
        if !read_side || !self.dispatch.writing_separation() {
            return Ok(read_side);
        }
        let write_side = self
            .writing()
            .invoke_all(self.scope(), |a, _| a.try_create_database())?;
        Ok(all(write_side))
    }

    pub(crate) async fn try_create_database_async(
        &self,
        cancel: Option<&CancellationToken>,
    ) -> AccessResult<bool> {
        let read_side = all(
            self.reading()
                .invoke_all_async(self.scope(), cancel, |a, inv| {
                    async move { a.try_create_database_async(inv.cancellation()).await }.boxed()
                })
                .await?,
        );
        if !read_side || !self.dispatch.writing_separation() {
            return Ok(read_side);
        }
        let write_side = self
            .writing()
            .invoke_all_async(self.scope(), cancel, |a, inv| {
                async move { a.try_create_database_async(inv.cancellation()).await }.boxed()
            })
            .await?;
        Ok(all(write_side))
    }

    pub(crate) fn change_connection(&self) -> AccessResult<()> {
        Err(AccessError::unsupported(format!(
            "change_connection on {}",
            self.name
        )))
    }

    pub(crate) fn dispose(&self) -> AccessResult<()> {
        debug!(accessor = %self.name, "disposing members");
        self.dispatch
            .disposer()
            .invoke(|member, _| member.accessor().dispose())
            .map(drop)
    }

    pub(crate) async fn dispose_async(&self, cancel: Option<&CancellationToken>) -> AccessResult<()> {
        debug!(accessor = %self.name, "disposing members");
        self.dispatch
            .disposer()
            .invoke_async(cancel, |member, inv| {
                async move { member.accessor().dispose_async(inv.cancellation()).await }.boxed()
            })
            .await
            .map(drop)
    }

    // -- transaction participation -------------------------------------------

    /// Enlist every member in `tx`. Calls join the scope only through a
    /// [`joined`](Self::joined) fanout.
    pub(crate) fn enlist(&self, tx: &TransactionContext) -> AccessResult<()> {
        let members = self.members();
        for (index, member) in members.iter().enumerate() {
            if let Err(e) = member.accessor().enlist(tx) {
                for enlisted in &members[..index] {
                    if let Err(undo) = enlisted.accessor().rollback(tx) {
                        warn!(member = enlisted.name(), error = %undo, "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    pub(crate) fn prepare(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.members()
            .iter()
            .try_for_each(|member| member.accessor().prepare(tx))
    }

    pub(crate) fn commit(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.members()
            .iter()
            .try_for_each(|member| member.accessor().commit(tx))
    }

    /// Every member is asked to roll back, even after one refuses.
    pub(crate) fn rollback(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.dispatch
            .disposer()
            .invoke(|member, _| member.accessor().rollback(tx))
            .map(drop)
    }
}

fn all(results: Vec<bool>) -> bool {
    results.into_iter().all(|ok| ok)
}
