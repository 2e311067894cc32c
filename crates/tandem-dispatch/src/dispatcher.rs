use std::fmt;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_equalizer::{
    BoxFuture, Equalizer, ExceptionSwitching, Invocation, TransactionTraversal,
};
use tandem_types::{AccessError, AccessResult, TransactionContext};

/// Which equalizer a [`Dispatcher`] drives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchKind {
    /// First healthy member serves.
    Switching,
    /// Every member, inside one transaction.
    Transaction,
}

enum Strategy {
    Switching(ExceptionSwitching<AccessorDescriptor>),
    Transaction(TransactionTraversal<AccessorDescriptor>),
}

/// A named handle over one invocation strategy.
///
/// `invoke_one` yields a single result: the serving member's under
/// switching, the highest-priority member's under a transaction (after every
/// member ran and committed). `invoke_all` yields one result per member that
/// ran, in priority order.
///
/// Every call takes an optional enclosing `scope`. Without one, a
/// transactional dispatcher opens and completes its own transaction per
/// call. With one, the members must already be enlisted in it: the call
/// runs inside it and completion is left to whoever enlisted them.
///
/// Members are handed the transaction through the [`Invocation`]; a member
/// that offers a [`joined`](Accessor::joined) handle is called through that
/// handle, which is how composites nest inside other composites.
pub struct Dispatcher {
    name: String,
    strategy: Strategy,
    current: Mutex<Option<AccessorDescriptor>>,
}

impl Dispatcher {
    /// A dispatcher that fails over between `members`.
    pub fn switching(
        name: impl Into<String>,
        members: Vec<AccessorDescriptor>,
    ) -> AccessResult<Self> {
        let strategy = Strategy::Switching(ExceptionSwitching::new(Equalizer::new(members)?));
        Ok(Self::with_strategy(name.into(), strategy))
    }

    /// A dispatcher that runs every call on all `members` atomically.
    pub fn transaction(
        name: impl Into<String>,
        members: Vec<AccessorDescriptor>,
    ) -> AccessResult<Self> {
        let strategy = Strategy::Transaction(TransactionTraversal::new(Equalizer::new(members)?));
        Ok(Self::with_strategy(name.into(), strategy))
    }

    fn with_strategy(name: String, strategy: Strategy) -> Self {
        Self {
            name,
            strategy,
            current: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DispatchKind {
        match self.strategy {
            Strategy::Switching(_) => DispatchKind::Switching,
            Strategy::Transaction(_) => DispatchKind::Transaction,
        }
    }

    /// Members in visiting order.
    pub fn members(&self) -> &[AccessorDescriptor] {
        match &self.strategy {
            Strategy::Switching(s) => s.members(),
            Strategy::Transaction(t) => t.members(),
        }
    }

    /// The member that most recently served (or was invoked by) this
    /// dispatcher. `None` before the first call.
    pub fn current_source(&self) -> Option<AccessorDescriptor> {
        self.current.lock().expect("lock poisoned").clone()
    }

    /// Record `member` as serving and pick the handle to call it through.
    fn bind(&self, member: &AccessorDescriptor, invocation: &Invocation) -> Arc<dyn Accessor> {
        trace!(dispatcher = %self.name, member = member.name(), "dispatching");
        *self.current.lock().expect("lock poisoned") = Some(member.clone());
        let accessor = member.accessor();
        invocation
            .transaction()
            .and_then(|tx| accessor.joined(tx))
            .unwrap_or_else(|| Arc::clone(accessor))
    }

    pub fn invoke_one<R, F>(
        &self,
        scope: Option<&TransactionContext>,
        mut op: F,
    ) -> AccessResult<R>
    where
        F: FnMut(&dyn Accessor, &Invocation) -> AccessResult<R>,
    {
        match &self.strategy {
            Strategy::Switching(s) => s.invoke_with(&invocation(scope, None), |member, inv| {
                op(self.bind(member, inv).as_ref(), inv)
            }),
            Strategy::Transaction(t) => {
                let results = match scope {
                    Some(tx) => {
                        t.invoke_in(tx, |member, inv| op(self.bind(member, inv).as_ref(), inv))?
                    }
                    None => t.invoke(|member, inv| op(self.bind(member, inv).as_ref(), inv))?,
                };
                first(results)
            }
        }
    }

    pub fn invoke_all<R, F>(
        &self,
        scope: Option<&TransactionContext>,
        mut op: F,
    ) -> AccessResult<Vec<R>>
    where
        F: FnMut(&dyn Accessor, &Invocation) -> AccessResult<R>,
    {
        match &self.strategy {
            Strategy::Switching(s) => s
                .invoke_with(&invocation(scope, None), |member, inv| {
                    op(self.bind(member, inv).as_ref(), inv)
                })
                .map(|value| vec![value]),
            Strategy::Transaction(t) => match scope {
                Some(tx) => {
                    t.invoke_in(tx, |member, inv| op(self.bind(member, inv).as_ref(), inv))
                }
                None => t.invoke(|member, inv| op(self.bind(member, inv).as_ref(), inv)),
            },
        }
    }

    pub async fn invoke_one_async<'s, R, F>(
        &'s self,
        scope: Option<&TransactionContext>,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<R>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        match &self.strategy {
            Strategy::Switching(s) => {
                s.invoke_async(invocation(scope, cancel), |member, inv| {
                    op(self.bind(member, &inv), inv)
                })
                .await
            }
            Strategy::Transaction(t) => {
                let results = match scope {
                    Some(tx) => {
                        t.invoke_in_async(tx, cancel, |member, inv| {
                            op(self.bind(member, &inv), inv)
                        })
                        .await?
                    }
                    None => {
                        t.invoke_async(cancel, |member, inv| op(self.bind(member, &inv), inv))
                            .await?
                    }
                };
                first(results)
            }
        }
    }

    pub async fn invoke_all_async<'s, R, F>(
        &'s self,
        scope: Option<&TransactionContext>,
        cancel: Option<&CancellationToken>,
        op: F,
    ) -> AccessResult<Vec<R>>
    where
        R: Send,
        F: Fn(Arc<dyn Accessor>, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        match &self.strategy {
            Strategy::Switching(s) => s
                .invoke_async(invocation(scope, cancel), |member, inv| {
                    op(self.bind(member, &inv), inv)
                })
                .await
                .map(|value| vec![value]),
            Strategy::Transaction(t) => match scope {
                Some(tx) => {
                    t.invoke_in_async(tx, cancel, |member, inv| op(self.bind(member, &inv), inv))
                        .await
                }
                None => {
                    t.invoke_async(cancel, |member, inv| op(self.bind(member, &inv), inv))
                        .await
                }
            },
        }
    }
}

/// A call inside `scope`, or a plain one.
fn invocation(
    scope: Option<&TransactionContext>,
    cancel: Option<&CancellationToken>,
) -> Invocation {
    match scope {
        Some(tx) => Invocation::transactional(tx.clone(), cancel.cloned()),
        None => Invocation::new(cancel),
    }
}

/// The highest-priority member's result.
fn first<R>(results: Vec<R>) -> AccessResult<R> {
    results
        .into_iter()
        .next()
        .ok_or_else(|| AccessError::Configuration("traversal produced no results".into()))
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<&str> = self.members().iter().map(|m| m.name()).collect();
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("kind", &self.kind())
            .field("members", &members)
            .finish()
    }
}
