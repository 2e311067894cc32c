use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use tandem_types::{AccessError, AccessResult, TransactionContext};
use tokio_util::sync::CancellationToken;

use crate::equalizer::{Equalizer, Participant, Ranked};
use crate::invocation::Invocation;

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Enlistment of every member in one transaction. Rolls back on drop unless
/// completed, so early returns, panics and dropped futures all abort.
struct Scope<'a, T: Participant> {
    members: &'a [T],
    tx: &'a TransactionContext,
    enlisted: usize,
    finished: bool,
}

impl<'a, T: Participant> Scope<'a, T> {
    fn open(members: &'a [T], tx: &'a TransactionContext) -> AccessResult<Self> {
        let mut scope = Self {
            members,
            tx,
            enlisted: 0,
            finished: false,
        };
        for member in members {
            member.enlist(tx)?;
            scope.enlisted += 1;
        }
        debug!(transaction = %tx.id().short_id(), members = members.len(), "transaction opened");
        Ok(scope)
    }

    fn abort(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        for member in &self.members[..self.enlisted] {
            if let Err(e) = member.rollback(self.tx) {
                warn!(member = member.label(), error = %e, "rollback failed");
            }
        }
        warn!(transaction = %self.tx.id().short_id(), "transaction aborted");
    }

    /// Prepare every member, then commit every member.
    fn complete(&mut self) -> AccessResult<()> {
        for member in self.members {
            if let Err(e) = member.prepare(self.tx) {
                self.abort();
                return Err(e);
            }
        }
        self.finished = true;
        for (index, member) in self.members.iter().enumerate() {
            if let Err(e) = member.commit(self.tx) {
                error!(
                    transaction = %self.tx.id().short_id(),
                    member = member.label(),
                    committed = index,
                    error = %e,
                    "commit failed after prepare; outcome in doubt"
                );
                for rest in &self.members[index + 1..] {
                    if let Err(e) = rest.rollback(self.tx) {
                        warn!(member = rest.label(), error = %e, "rollback failed");
                    }
                }
                return Err(e);
            }
        }
        debug!(transaction = %self.tx.id().short_id(), "transaction committed");
        Ok(())
    }
}

impl<T: Participant> Drop for Scope<'_, T> {
    fn drop(&mut self) {
        self.abort();
    }
}

// ---------------------------------------------------------------------------
// TransactionTraversal
// ---------------------------------------------------------------------------

/// All-or-nothing strategy: every member runs the operation inside one
/// [`TransactionContext`].
///
/// The scope is opened by enlisting every member, the operation runs on each
/// member in priority order, and the scope completes (prepare all, then
/// commit all) only if every invocation succeeded. The first failure rolls
/// back every enlisted member and is returned unwrapped.
#[derive(Clone, Debug)]
pub struct TransactionTraversal<T> {
    equalizer: Equalizer<T>,
}

impl<T: Participant> TransactionTraversal<T> {
    pub fn new(equalizer: Equalizer<T>) -> Self {
        Self { equalizer }
    }

    pub fn equalizer(&self) -> &Equalizer<T> {
        &self.equalizer
    }

    pub fn members(&self) -> &[T] {
        self.equalizer.members()
    }

    /// Results in member order.
    pub fn invoke<R, F>(&self, mut op: F) -> AccessResult<Vec<R>>
    where
        F: FnMut(&T, &Invocation) -> AccessResult<R>,
    {
        let tx = TransactionContext::begin();
        let members = self.equalizer.members();
        let mut scope = Scope::open(members, &tx)?;
        let invocation = Invocation::transactional(tx.clone(), None);
        let mut results = Vec::with_capacity(members.len());
        for member in members {
            results.push(op(member, &invocation)?);
        }
        scope.complete()?;
        Ok(results)
    }

    /// Async form of [`Self::invoke`]. The token travels inside the
    /// [`Invocation`] handed to each member.
    pub async fn invoke_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&'s T, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        let tx = TransactionContext::begin();
        let members = self.equalizer.members();
        let invocation = Invocation::transactional(tx.clone(), cancel.cloned());
        invocation.check()?;
        let mut scope = Scope::open(members, &tx)?;
        let mut results = Vec::with_capacity(members.len());
        for member in members {
            invocation.check()?;
            results.push(op(member, invocation.clone()).await?);
        }
        invocation.check()?;
        scope.complete()?;
        Ok(results)
    }

    /// Run `op` on every member inside an enclosing transaction whose scope
    /// already enlisted them. Completion and rollback belong to that scope.
    pub fn invoke_in<R, F>(&self, tx: &TransactionContext, mut op: F) -> AccessResult<Vec<R>>
    where
        F: FnMut(&T, &Invocation) -> AccessResult<R>,
    {
        let invocation = Invocation::transactional(tx.clone(), None);
        self.equalizer
            .members()
            .iter()
            .map(|member| op(member, &invocation))
            .collect()
    }

    pub async fn invoke_in_async<'s, R, F>(
        &'s self,
        tx: &TransactionContext,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&'s T, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        let invocation = Invocation::transactional(tx.clone(), cancel.cloned());
        let mut results = Vec::with_capacity(self.equalizer.len());
        for member in self.equalizer.members() {
            invocation.check()?;
            results.push(op(member, invocation.clone()).await?);
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// PlainTraversal
// ---------------------------------------------------------------------------

/// Visit-everyone strategy without a transaction.
///
/// Every member is invoked even after another member failed; the first
/// error is returned once the traversal ends. Members that completed are
/// never rolled back. Cancellation stops the traversal where it is.
#[derive(Clone, Debug)]
pub struct PlainTraversal<T> {
    equalizer: Equalizer<T>,
}

impl<T: Ranked> PlainTraversal<T> {
    pub fn new(equalizer: Equalizer<T>) -> Self {
        Self { equalizer }
    }

    pub fn members(&self) -> &[T] {
        self.equalizer.members()
    }

    pub fn invoke<R, F>(&self, mut op: F) -> AccessResult<Vec<R>>
    where
        F: FnMut(&T, &Invocation) -> AccessResult<R>,
    {
        let invocation = Invocation::default();
        let mut outcome = Outcome::with_capacity(self.equalizer.len());
        for member in self.equalizer.members() {
            outcome.record(member.label(), op(member, &invocation));
        }
        outcome.finish()
    }

    pub async fn invoke_async<'s, R, F>(
        &'s self,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&'s T, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        let invocation = Invocation::new(cancel);
        let mut outcome = Outcome::with_capacity(self.equalizer.len());
        for member in self.equalizer.members() {
            invocation.check()?;
            outcome.record(member.label(), op(member, invocation.clone()).await);
        }
        outcome.finish()
    }
}

/// Results of a plain traversal, keeping only the first error.
struct Outcome<R> {
    results: Vec<R>,
    first_error: Option<AccessError>,
}

impl<R> Outcome<R> {
    fn with_capacity(n: usize) -> Self {
        Self {
            results: Vec::with_capacity(n),
            first_error: None,
        }
    }

    fn record(&mut self, member: &str, result: AccessResult<R>) {
        match result {
            Ok(value) => self.results.push(value),
            Err(e) => {
                warn!(member, error = %e, "member failed during plain traversal");
                self.first_error.get_or_insert(e);
            }
        }
    }

    fn finish(self) -> AccessResult<Vec<R>> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equalizer::tests::{entries, journal, Stub};
    use futures_util::FutureExt;

    fn traversal(stubs: Vec<Stub>) -> TransactionTraversal<Stub> {
        TransactionTraversal::new(Equalizer::new(stubs).unwrap())
    }

    #[test]
    fn every_member_invoked_then_two_phase_commit() {
        let j = journal();
        let t = traversal(vec![Stub::new("b", 2.0, &j), Stub::new("a", 1.0, &j)]);
        let results = t.invoke(|p, inv| {
            assert!(inv.transaction().is_some());
            p.call()
        });
        assert_eq!(results.unwrap(), vec!["a", "b"]);
        assert_eq!(
            entries(&j),
            vec![
                "a:enlist", "b:enlist", "a:call", "b:call", "a:prepare", "b:prepare", "a:commit",
                "b:commit"
            ]
        );
    }

    #[test]
    fn one_failure_rolls_back_everyone() {
        let j = journal();
        let t = traversal(vec![
            Stub::new("a", 1.0, &j),
            Stub::new("b", 2.0, &j).failing(),
            Stub::new("c", 3.0, &j),
        ]);
        let err = t.invoke(|p, _| p.call()).unwrap_err();
        assert_eq!(err, AccessError::unavailable("b", "down"));
        let log = entries(&j);
        assert!(!log.iter().any(|e| e.ends_with(":commit")));
        assert!(!log.contains(&"c:call".to_string()));
        for name in ["a", "b", "c"] {
            assert!(log.contains(&format!("{name}:rollback")));
        }
    }

    #[test]
    fn refused_prepare_aborts_without_commit() {
        let j = journal();
        let t = traversal(vec![
            Stub::new("a", 1.0, &j),
            Stub::new("b", 2.0, &j).refusing(),
        ]);
        let err = t.invoke(|p, _| p.call()).unwrap_err();
        assert_eq!(err, AccessError::unavailable("b", "prepare refused"));
        let log = entries(&j);
        assert!(!log.iter().any(|e| e.ends_with(":commit")));
        assert!(log.contains(&"a:rollback".to_string()));
    }

    #[test]
    fn transactions_are_distinct_per_call() {
        let j = journal();
        let t = traversal(vec![Stub::new("a", 1.0, &j)]);
        let first = t.invoke(|_, inv| Ok(inv.transaction().unwrap().id())).unwrap();
        let second = t.invoke(|_, inv| Ok(inv.transaction().unwrap().id())).unwrap();
        assert_ne!(first[0], second[0]);
    }

    #[tokio::test]
    async fn async_cancellation_rolls_back() {
        let j = journal();
        let t = traversal(vec![Stub::new("a", 1.0, &j), Stub::new("b", 2.0, &j)]);
        let token = CancellationToken::new();
        let err = t
            .invoke_async(Some(&token), |p, _inv| {
                let token = token.clone();
                async move {
                    let r = p.call();
                    token.cancel();
                    r
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        let log = entries(&j);
        assert_eq!(log.iter().filter(|e| e.ends_with(":call")).count(), 1);
        assert!(log.contains(&"a:rollback".to_string()));
        assert!(log.contains(&"b:rollback".to_string()));
    }

    #[tokio::test]
    async fn async_success_commits() {
        let j = journal();
        let t = traversal(vec![Stub::new("a", 1.0, &j), Stub::new("b", 2.0, &j)]);
        let results = t
            .invoke_async(None, |p, _inv| async move { p.call() }.boxed())
            .await
            .unwrap();
        assert_eq!(results, vec!["a", "b"]);
        assert!(entries(&j).contains(&"b:commit".to_string()));
    }

    #[test]
    fn joined_traversal_leaves_completion_to_the_enclosing_scope() {
        let j = journal();
        let t = traversal(vec![Stub::new("a", 1.0, &j), Stub::new("b", 2.0, &j)]);
        let outer = TransactionContext::begin();
        let seen = t
            .invoke_in(&outer, |p, inv| {
                p.record("call");
                Ok(inv.transaction().map(TransactionContext::id))
            })
            .unwrap();
        assert_eq!(seen, vec![Some(outer.id()), Some(outer.id())]);
        assert_eq!(entries(&j), vec!["a:call", "b:call"]);
    }

    #[test]
    fn plain_traversal_visits_all_and_keeps_first_error() {
        let j = journal();
        let plain = PlainTraversal::new(
            Equalizer::new(vec![
                Stub::new("a", 1.0, &j).failing(),
                Stub::new("b", 2.0, &j),
                Stub::new("c", 3.0, &j).failing(),
            ])
            .unwrap(),
        );
        let err = plain.invoke(|p, _| p.call()).unwrap_err();
        assert_eq!(err, AccessError::unavailable("a", "down"));
        assert_eq!(entries(&j), vec!["a:call", "b:call", "c:call"]);
    }

    #[tokio::test]
    async fn plain_traversal_does_not_undo_on_cancel() {
        let j = journal();
        let plain = PlainTraversal::new(
            Equalizer::new(vec![Stub::new("a", 1.0, &j), Stub::new("b", 2.0, &j)]).unwrap(),
        );
        let token = CancellationToken::new();
        let err = plain
            .invoke_async(Some(&token), |p, _inv| {
                let token = token.clone();
                async move {
                    let r = p.call();
                    token.cancel();
                    r
                }
                .boxed()
            })
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(entries(&j), vec!["a:call"]);
    }
}
