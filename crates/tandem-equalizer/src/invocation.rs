use tokio_util::sync::CancellationToken;

use tandem_types::{AccessError, AccessResult, TransactionContext};

/// Per-call context handed to every member of a traversal.
///
/// Carries the explicit transaction scope (if any) and the caller's
/// cancellation token, so both reach each member the same way.
#[derive(Clone, Debug, Default)]
pub struct Invocation {
    transaction: Option<TransactionContext>,
    cancellation: Option<CancellationToken>,
}

impl Invocation {
    /// A non-transactional invocation.
    pub fn new(cancel: Option<&CancellationToken>) -> Self {
        Self {
            transaction: None,
            cancellation: cancel.cloned(),
        }
    }

    /// An invocation inside `tx`.
    pub fn transactional(tx: TransactionContext, cancel: Option<CancellationToken>) -> Self {
        Self {
            transaction: Some(tx),
            cancellation: cancel,
        }
    }

    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Fail with [`AccessError::Cancelled`] if the token has fired.
    pub fn check(&self) -> AccessResult<()> {
        if self.is_cancelled() {
            Err(AccessError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_plain_and_live() {
        let inv = Invocation::default();
        assert!(inv.transaction().is_none());
        assert!(inv.check().is_ok());
    }

    #[test]
    fn cancelled_token_is_observed() {
        let token = CancellationToken::new();
        let inv = Invocation::new(Some(&token));
        assert!(inv.check().is_ok());
        token.cancel();
        assert_eq!(inv.check(), Err(AccessError::Cancelled));
    }

    #[test]
    fn transactional_carries_scope() {
        let tx = TransactionContext::begin();
        let inv = Invocation::transactional(tx.clone(), None);
        assert_eq!(inv.transaction(), Some(&tx));
    }
}
