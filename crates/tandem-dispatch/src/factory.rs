use std::fmt;
use std::sync::Arc;

use tandem_accessor::AccessorDescriptor;
use tandem_equalizer::{Equalizer, PlainTraversal};
use tandem_types::AccessResult;

use crate::dispatcher::Dispatcher;

/// Reading and writing handles for one group of redundant accessors, plus
/// the plain traversal used to dispose them.
#[derive(Clone)]
pub struct DispatchableAccessors {
    reading: Arc<Dispatcher>,
    writing: Arc<Dispatcher>,
    disposer: Arc<PlainTraversal<AccessorDescriptor>>,
    writing_separation: bool,
}

impl DispatchableAccessors {
    pub fn new(
        reading: Arc<Dispatcher>,
        writing: Arc<Dispatcher>,
        writing_separation: bool,
    ) -> AccessResult<Self> {
        let disposer = PlainTraversal::new(Equalizer::new(writing.members().to_vec())?);
        Ok(Self {
            reading,
            writing,
            disposer: Arc::new(disposer),
            writing_separation,
        })
    }

    pub fn reading_dispatcher(&self) -> &Dispatcher {
        &self.reading
    }

    pub fn writing_dispatcher(&self) -> &Dispatcher {
        &self.writing
    }

    pub fn disposer(&self) -> &PlainTraversal<AccessorDescriptor> {
        &self.disposer
    }

    /// `true` when reads and writes go through different strategies, so
    /// lifecycle checks must consult both sides.
    pub fn writing_separation(&self) -> bool {
        self.writing_separation
    }

    /// Every member, in priority order.
    pub fn members(&self) -> &[AccessorDescriptor] {
        self.writing.members()
    }

    /// Both handles are one dispatcher.
    pub fn is_shared(&self) -> bool {
        Arc::ptr_eq(&self.reading, &self.writing)
    }
}

impl fmt::Debug for DispatchableAccessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchableAccessors")
            .field("reading", &self.reading)
            .field("writing", &self.writing)
            .field("writing_separation", &self.writing_separation)
            .finish()
    }
}

/// Builds [`DispatchableAccessors`] for the redundancy policies.
pub trait DispatcherFactory: Send + Sync {
    /// Switching reads, transactional writes (mirroring).
    fn base(&self, members: Vec<AccessorDescriptor>) -> AccessResult<DispatchableAccessors>;

    /// Transactional reads and writes on separate handles (striping).
    fn transaction(&self, members: Vec<AccessorDescriptor>)
        -> AccessResult<DispatchableAccessors>;

    /// One transactional handle for both sides (compositing).
    fn compositing(&self, members: Vec<AccessorDescriptor>)
        -> AccessResult<DispatchableAccessors>;
}

/// The stock factory: dispatchers named `reading` and `writing`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StandardDispatcherFactory;

impl DispatcherFactory for StandardDispatcherFactory {
    fn base(&self, members: Vec<AccessorDescriptor>) -> AccessResult<DispatchableAccessors> {
        let reading = Dispatcher::switching("reading", members.clone())?;
        let writing = Dispatcher::transaction("writing", members)?;
        DispatchableAccessors::new(Arc::new(reading), Arc::new(writing), true)
    }

    fn transaction(
        &self,
        members: Vec<AccessorDescriptor>,
    ) -> AccessResult<DispatchableAccessors> {
        // Both sides traverse every member, so reads and writes are not
        // separated even though the handles are distinct.
        let reading = Dispatcher::transaction("reading", members.clone())?;
        let writing = Dispatcher::transaction("writing", members)?;
        DispatchableAccessors::new(Arc::new(reading), Arc::new(writing), false)
    }

    fn compositing(
        &self,
        members: Vec<AccessorDescriptor>,
    ) -> AccessResult<DispatchableAccessors> {
        let shared = Arc::new(Dispatcher::transaction("compositing", members)?);
        DispatchableAccessors::new(Arc::clone(&shared), shared, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchKind;
    use tandem_accessor::{Accessor, InMemoryAccessor};
    use tandem_types::{AccessError, Key};

    fn members() -> (Vec<Arc<InMemoryAccessor>>, Vec<AccessorDescriptor>) {
        let names = ["a", "b", "c"];
        let stores: Vec<Arc<InMemoryAccessor>> = names
            .iter()
            .map(|n| Arc::new(InMemoryAccessor::new(*n)))
            .collect();
        let descriptors = names
            .iter()
            .zip(&stores)
            .enumerate()
            .map(|(i, (n, s))| AccessorDescriptor::new(*n, s.clone()).with_priority(i as f64))
            .collect();
        (stores, descriptors)
    }

    #[test]
    fn base_separates_reads_from_writes() {
        let (_, descriptors) = members();
        let d = StandardDispatcherFactory.base(descriptors).unwrap();
        assert!(d.writing_separation());
        assert!(!d.is_shared());
        assert_eq!(d.reading_dispatcher().kind(), DispatchKind::Switching);
        assert_eq!(d.writing_dispatcher().kind(), DispatchKind::Transaction);
        assert_eq!(d.reading_dispatcher().name(), "reading");
        assert_eq!(d.writing_dispatcher().name(), "writing");
        assert_eq!(d.members().len(), 3);
    }

    #[test]
    fn transaction_has_two_transactional_handles() {
        let (_, descriptors) = members();
        let d = StandardDispatcherFactory.transaction(descriptors).unwrap();
        assert!(!d.writing_separation());
        assert!(!d.is_shared());
        assert_eq!(d.reading_dispatcher().kind(), DispatchKind::Transaction);
    }

    #[test]
    fn compositing_shares_one_handle() {
        let (_, descriptors) = members();
        let d = StandardDispatcherFactory.compositing(descriptors).unwrap();
        assert!(d.is_shared());
        assert!(!d.writing_separation());

        d.reading_dispatcher()
            .invoke_one(None, |acc, _| acc.exists("order", &Key::from(1)))
            .unwrap();
        assert_eq!(d.writing_dispatcher().current_source().unwrap().name(), "c");
    }

    #[test]
    fn disposer_visits_every_member() {
        let (stores, descriptors) = members();
        let d = StandardDispatcherFactory.base(descriptors).unwrap();
        stores[0].set_available(false);
        d.disposer()
            .invoke(|m, _| m.accessor().dispose())
            .unwrap();
        assert!(stores.iter().all(|s| s.is_disposed()));
    }

    #[test]
    fn empty_group_is_a_configuration_error() {
        let err = StandardDispatcherFactory.compositing(Vec::new()).unwrap_err();
        assert!(matches!(err, AccessError::Configuration(_)));
    }
}
