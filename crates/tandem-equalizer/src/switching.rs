use futures_util::future::BoxFuture;
use tracing::{debug, warn};

use tandem_types::{AccessError, AccessResult};

use crate::equalizer::{Equalizer, Ranked};
use crate::invocation::Invocation;

/// Failover strategy: the first member to succeed serves the call.
///
/// Members are tried in priority order with an explicit cursor. A failure
/// advances the cursor; no member after the first success is invoked. When
/// every member fails, the last member's error is returned exactly as
/// produced. Earlier errors are collected and logged, then dropped.
///
/// Cancellation is not treated as a member failure: a cancelled call stops
/// the loop immediately.
#[derive(Clone, Debug)]
pub struct ExceptionSwitching<T> {
    equalizer: Equalizer<T>,
}

impl<T: Ranked> ExceptionSwitching<T> {
    pub fn new(equalizer: Equalizer<T>) -> Self {
        Self { equalizer }
    }

    pub fn equalizer(&self) -> &Equalizer<T> {
        &self.equalizer
    }

    pub fn members(&self) -> &[T] {
        self.equalizer.members()
    }

    /// Invoke `op` with a fresh, non-transactional [`Invocation`].
    pub fn invoke<R, F>(&self, op: F) -> AccessResult<R>
    where
        F: FnMut(&T, &Invocation) -> AccessResult<R>,
    {
        self.invoke_with(&Invocation::default(), op)
    }

    pub fn invoke_with<R, F>(&self, invocation: &Invocation, mut op: F) -> AccessResult<R>
    where
        F: FnMut(&T, &Invocation) -> AccessResult<R>,
    {
        let members = self.equalizer.members();
        let mut suppressed: Vec<AccessError> = Vec::new();
        let mut cursor = 0;
        loop {
            invocation.check()?;
            let member = &members[cursor];
            match op(member, invocation) {
                Ok(value) => {
                    note_recovery(member.label(), &suppressed);
                    return Ok(value);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    cursor += 1;
                    if cursor == members.len() {
                        give_up(member.label(), &suppressed, &e);
                        return Err(e);
                    }
                    warn!(member = member.label(), error = %e, "member failed; switching to next");
                    suppressed.push(e);
                }
            }
        }
    }

    /// Async form of [`Self::invoke_with`]. The invocation (and its
    /// cancellation token) is cloned into each attempt.
    pub async fn invoke_async<'s, R, F>(&'s self, invocation: Invocation, op: F) -> AccessResult<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&'s T, Invocation) -> BoxFuture<'s, AccessResult<R>> + Send + Sync,
    {
        let members = self.equalizer.members();
        let mut suppressed: Vec<AccessError> = Vec::new();
        let mut cursor = 0;
        loop {
            invocation.check()?;
            let member = &members[cursor];
            match op(member, invocation.clone()).await {
                Ok(value) => {
                    note_recovery(member.label(), &suppressed);
                    return Ok(value);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    cursor += 1;
                    if cursor == members.len() {
                        give_up(member.label(), &suppressed, &e);
                        return Err(e);
                    }
                    warn!(member = member.label(), error = %e, "member failed; switching to next");
                    suppressed.push(e);
                }
            }
        }
    }
}

fn note_recovery(served_by: &str, suppressed: &[AccessError]) {
    if !suppressed.is_empty() {
        debug!(
            member = served_by,
            failed_before = suppressed.len(),
            "served after failover"
        );
    }
}

fn give_up(last: &str, suppressed: &[AccessError], error: &AccessError) {
    for earlier in suppressed {
        debug!(error = %earlier, "suppressed failover error");
    }
    warn!(
        member = last,
        failures = suppressed.len() + 1,
        error = %error,
        "every member failed"
    );
}
