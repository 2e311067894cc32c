use tandem_accessor::AccessorDescriptor;
use tandem_types::AccessMode;

/// Keep the descriptors whose declared access mode may serve `requested`.
///
/// A descriptor is kept iff its mode is a bitwise subset of the normalized
/// request (see [`AccessMode::admits`]): asking for `READ` or `WRITE` also
/// admits `READ_WRITE` accessors, and asking for `READ_WRITE` admits every
/// accessor. Order is preserved and filtering twice changes nothing.
pub fn filter_accessors(
    accessors: &[AccessorDescriptor],
    requested: AccessMode,
) -> Vec<AccessorDescriptor> {
    accessors
        .iter()
        .filter(|d| requested.admits(d.access_mode()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tandem_accessor::InMemoryAccessor;

    fn described(name: &str, mode: AccessMode) -> AccessorDescriptor {
        AccessorDescriptor::new(name, Arc::new(InMemoryAccessor::new(name))).with_access_mode(mode)
    }

    fn names(ds: &[AccessorDescriptor]) -> Vec<&str> {
        ds.iter().map(|d| d.name()).collect()
    }

    fn pool() -> Vec<AccessorDescriptor> {
        vec![
            described("reader", AccessMode::READ),
            described("writer", AccessMode::WRITE),
            described("both", AccessMode::READ_WRITE),
            described("split", AccessMode::READ | AccessMode::WRITE),
        ]
    }

    #[test]
    fn read_request_admits_readers_and_read_write() {
        let kept = filter_accessors(&pool(), AccessMode::READ);
        assert_eq!(names(&kept), vec!["reader", "both"]);
    }

    #[test]
    fn write_request_admits_writers_and_read_write() {
        let kept = filter_accessors(&pool(), AccessMode::WRITE);
        assert_eq!(names(&kept), vec!["writer", "both"]);
    }

    #[test]
    fn read_write_request_admits_everyone() {
        let kept = filter_accessors(&pool(), AccessMode::READ_WRITE);
        assert_eq!(names(&kept), vec!["reader", "writer", "both", "split"]);
    }

    #[test]
    fn none_admits_nothing() {
        assert!(filter_accessors(&pool(), AccessMode::NONE).is_empty());
        let blank = vec![described("blank", AccessMode::NONE)];
        assert!(filter_accessors(&blank, AccessMode::READ_WRITE).is_empty());
    }

    proptest! {
        #[test]
        fn filtering_is_idempotent(
            modes in proptest::collection::vec(0u8..8, 0..10),
            requested in 0u8..8,
        ) {
            let accessors: Vec<AccessorDescriptor> = modes
                .iter()
                .enumerate()
                .map(|(i, bits)| {
                    let mode = AccessMode::from_bits(*bits).unwrap_or(AccessMode::NONE);
                    described(&format!("m{i}"), mode)
                })
                .collect();
            let requested = AccessMode::from_bits(requested).unwrap_or(AccessMode::NONE);
            let once = filter_accessors(&accessors, requested);
            let twice = filter_accessors(&once, requested);
            prop_assert_eq!(names(&once), names(&twice));
        }
    }
}
