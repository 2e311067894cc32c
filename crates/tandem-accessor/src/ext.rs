use tandem_types::{AccessResult, Entity, Key, Record, Specification, Statement};

use crate::traits::Accessor;

/// Typed helpers over any [`Accessor`], including `dyn Accessor` and
/// composites.
pub trait AccessorExt: Accessor {
    /// Look up a typed entity by key.
    fn find_entity<E: Entity>(&self, key: &Key) -> AccessResult<Option<E>> {
        self.find(E::ENTITY_TYPE, key)?
            .map(|record| record.to_entity())
            .transpose()
    }

    /// Execute a raw statement and decode every row.
    fn query_as<E: Entity>(&self, statement: &Statement) -> AccessResult<Vec<E>> {
        self.query(E::ENTITY_TYPE, statement)?
            .iter()
            .map(Record::to_entity)
            .collect()
    }

    /// Decode every record matching `spec`.
    fn find_list_as<E: Entity>(&self, spec: &dyn Specification) -> AccessResult<Vec<E>> {
        self.find_list(spec)?.iter().map(Record::to_entity).collect()
    }

    fn exists_entity<E: Entity>(&self, key: &Key) -> AccessResult<bool> {
        self.exists(E::ENTITY_TYPE, key)
    }

    fn add_entity<E: Entity>(&self, entity: &E) -> AccessResult<()> {
        self.add(&Record::from_entity(entity)?)
    }

    fn update_entity<E: Entity>(&self, entity: &E) -> AccessResult<()> {
        self.update(&Record::from_entity(entity)?)
    }

    fn remove_entity<E: Entity>(&self, entity: &E) -> AccessResult<()> {
        self.remove(&Record::from_entity(entity)?)
    }
}

impl<A: Accessor + ?Sized> AccessorExt for A {}
