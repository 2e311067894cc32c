use tandem_accessor::AccessorDescriptor;
use tandem_types::{AccessError, AccessResult, TransactionContext};

/// A member with a precedence. Lower values are visited first.
pub trait Ranked {
    fn priority(&self) -> f64;

    /// Name used in logs.
    fn label(&self) -> &str;
}

/// A member that can take part in a transactional traversal.
pub trait Participant: Ranked + Send + Sync {
    fn enlist(&self, tx: &TransactionContext) -> AccessResult<()>;
    fn prepare(&self, tx: &TransactionContext) -> AccessResult<()>;
    fn commit(&self, tx: &TransactionContext) -> AccessResult<()>;
    fn rollback(&self, tx: &TransactionContext) -> AccessResult<()>;
}

impl Ranked for AccessorDescriptor {
    fn priority(&self) -> f64 {
        AccessorDescriptor::priority(self)
    }

    fn label(&self) -> &str {
        self.name()
    }
}

impl Participant for AccessorDescriptor {
    fn enlist(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.accessor().enlist(tx)
    }

    fn prepare(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.accessor().prepare(tx)
    }

    fn commit(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.accessor().commit(tx)
    }

    fn rollback(&self, tx: &TransactionContext) -> AccessResult<()> {
        self.accessor().rollback(tx)
    }
}

/// A stable, priority-ordered, non-empty sequence of members.
///
/// The order is fixed at construction and never changes afterwards.
#[derive(Clone, Debug)]
pub struct Equalizer<T> {
    members: Vec<T>,
}

impl<T: Ranked> Equalizer<T> {
    /// Order `members` by ascending priority, keeping registration order for
    /// ties. Fails with [`AccessError::Configuration`] if `members` is empty.
    pub fn new(mut members: Vec<T>) -> AccessResult<Self> {
        if members.is_empty() {
            return Err(AccessError::Configuration(
                "an equalizer needs at least one member".into(),
            ));
        }
        members.sort_by(|a, b| a.priority().total_cmp(&b.priority()));
        Ok(Self { members })
    }

    /// Members in visiting order.
    pub fn members(&self) -> &[T] {
        &self.members
    }

    /// The highest-precedence member.
    pub fn first(&self) -> &T {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; kept for the `len`/`is_empty` pairing.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn into_members(self) -> Vec<T> {
        self.members
    }
}
