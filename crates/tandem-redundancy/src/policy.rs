use std::sync::Arc;

use tracing::debug;

use tandem_accessor::{Accessor, AccessorDescriptor};
use tandem_dispatch::{DispatchableAccessors, Dispatcher, DispatcherFactory};
use tandem_equalizer::Equalizer;
use tandem_types::{AccessError, AccessResult, RedundancyMode};

use crate::compositing::CompositingAccessor;
use crate::mirroring::MirroringAccessor;
use crate::striping::StripingAccessor;

/// Introspection shared by the multi-member policies.
pub trait RedundantAccessor: Accessor {
    fn redundancy_mode(&self) -> RedundancyMode;

    fn dispatchable(&self) -> &DispatchableAccessors;

    fn reading_dispatcher(&self) -> &Dispatcher {
        self.dispatchable().reading_dispatcher()
    }

    fn writing_dispatcher(&self) -> &Dispatcher {
        self.dispatchable().writing_dispatcher()
    }

    /// Members in priority order.
    fn members(&self) -> &[AccessorDescriptor] {
        self.dispatchable().members()
    }
}

/// Wrap `members` in the policy named by `mode`.
///
/// A single member is returned as is, whatever the mode. With
/// [`RedundancyMode::None`] and several members, the highest-priority member
/// is returned unwrapped.
pub fn build_policy(
    mode: RedundancyMode,
    members: Vec<AccessorDescriptor>,
    factory: &dyn DispatcherFactory,
) -> AccessResult<Arc<dyn Accessor>> {
    if members.is_empty() {
        return Err(AccessError::Configuration(
            "no accessors to build a redundancy policy from".into(),
        ));
    }
    if members.len() == 1 {
        return Ok(Arc::clone(members[0].accessor()));
    }
    debug!(policy = %mode, members = members.len(), "building redundancy policy");
    let built: Arc<dyn Accessor> = match mode {
        RedundancyMode::None => {
            let ordered = Equalizer::new(members)?;
            Arc::clone(ordered.first().accessor())
        }
        RedundancyMode::Compositing => Arc::new(CompositingAccessor::new(members, factory)?),
        RedundancyMode::Mirroring => Arc::new(MirroringAccessor::new(members, factory)?),
        RedundancyMode::Striping => Arc::new(StripingAccessor::new(members, factory)?),
    };
    Ok(built)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{order, store};
    use tandem_dispatch::StandardDispatcherFactory;
    use tandem_types::{Key, QuerySpec};

    #[test]
    fn empty_is_a_configuration_error() {
        let err = build_policy(RedundancyMode::Mirroring, Vec::new(), &StandardDispatcherFactory)
            .err()
            .unwrap();
        assert!(matches!(err, AccessError::Configuration(_)));
    }

    #[test]
    fn singleton_is_transparent_under_every_mode() {
        for mode in [
            RedundancyMode::None,
            RedundancyMode::Compositing,
            RedundancyMode::Mirroring,
            RedundancyMode::Striping,
        ] {
            let (a, da) = store("a", 1.0, vec![order(1, "eu", 10)]);
            let built = build_policy(mode, vec![da], &StandardDispatcherFactory).unwrap();
            assert_eq!(built.name(), "a");

            let direct = a.find_list(&QuerySpec::for_type("order")).unwrap();
            let wrapped = built.find_list(&QuerySpec::for_type("order")).unwrap();
            assert_eq!(direct, wrapped);

            a.set_available(false);
            assert_eq!(
                built.exists("order", &Key::from(1)).unwrap_err(),
                a.exists("order", &Key::from(1)).unwrap_err()
            );
            assert!(!a.in_transaction());
        }
    }

    #[test]
    fn none_picks_highest_priority_member() {
        let (_b, db) = store("b", 2.0, Vec::new());
        let (_a, da) = store("a", 1.0, Vec::new());
        let built = build_policy(RedundancyMode::None, vec![db, da], &StandardDispatcherFactory)
            .unwrap();
        assert_eq!(built.name(), "a");
    }

    #[test]
    fn composites_nest_inside_composites() {
        let (a1, d1) = store("a1", 1.0, Vec::new());
        let (a2, d2) = store("a2", 2.0, Vec::new());
        let (b1, d3) = store("b1", 1.0, Vec::new());
        let (b2, d4) = store("b2", 2.0, Vec::new());
        let factory = StandardDispatcherFactory;
        let left = Arc::new(CompositingAccessor::new(vec![d1, d2], &factory).unwrap());
        let right = Arc::new(CompositingAccessor::new(vec![d3, d4], &factory).unwrap());
        let mirror = MirroringAccessor::new(
            vec![
                AccessorDescriptor::new("left", left.clone()).with_priority(1.0),
                AccessorDescriptor::new("right", right.clone()).with_priority(2.0),
            ],
            &factory,
        )
        .unwrap();

        mirror.add(&order(1, "eu", 1)).unwrap();
        assert_eq!(mirror.save_changes().unwrap(), 1);
        for s in [&a1, &a2, &b1, &b2] {
            assert!(s.durable("order", &Key::from(1)).is_some());
            assert!(!s.in_transaction());
        }

        b2.set_available(false);
        assert!(mirror.add(&order(2, "eu", 1)).is_err());
        for s in [&a1, &a2, &b1] {
            assert!(!s.in_transaction());
            assert_eq!(s.pending_len(), 0);
        }
        assert!(mirror.find("order", &Key::from(1)).unwrap().is_some());
        assert_eq!(left.reading_dispatcher().current_source().unwrap().name(), "a2");
    }

    #[test]
    fn modes_build_their_policy() {
        let cases = [
            (RedundancyMode::Compositing, "compositing[a,b]"),
            (RedundancyMode::Mirroring, "mirroring[a,b]"),
            (RedundancyMode::Striping, "striping[a,b]"),
        ];
        for (mode, name) in cases {
            let (_a, da) = store("a", 1.0, Vec::new());
            let (_b, db) = store("b", 2.0, Vec::new());
            let built = build_policy(mode, vec![db, da], &StandardDispatcherFactory).unwrap();
            assert_eq!(built.name(), name);
        }
    }
}
