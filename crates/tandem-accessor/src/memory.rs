use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use tandem_types::{
    AccessError, AccessResult, Key, PagedList, Record, Specification, Statement,
    TransactionContext, TransactionId,
};

use crate::traits::Accessor;

/// Canonical key -> record.
type Table = BTreeMap<String, Record>;
/// Entity type -> table.
type Tables = BTreeMap<String, Table>;
type Admission = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

#[derive(Clone, Debug)]
enum Change {
    Add(Record),
    Attach(Record),
    Update(Record),
    Remove(Record),
}

impl Change {
    fn record(&self) -> &Record {
        match self {
            Self::Add(r) | Self::Attach(r) | Self::Update(r) | Self::Remove(r) => r,
        }
    }
}

struct ActiveTransaction {
    id: TransactionId,
    shadow: Tables,
    /// Unit of work as it stood at enlistment; restored on rollback.
    staged: Vec<Change>,
    prepared: bool,
}

struct MemoryState {
    connection: String,
    database_created: bool,
    disposed: bool,
    committed: Tables,
    pending: Vec<Change>,
    transaction: Option<ActiveTransaction>,
    last_statement: Option<Statement>,
}

impl MemoryState {
    /// Rows visible to this accessor: the transaction shadow while enlisted.
    fn view(&self) -> &Tables {
        self.transaction
            .as_ref()
            .map_or(&self.committed, |tx| &tx.shadow)
    }

    /// Latest staged change for a key, if any.
    fn tracked(&self, entity_type: &str, key: &Key) -> Option<&Change> {
        self.pending.iter().rev().find(|c| {
            let r = c.record();
            r.entity_type == entity_type && r.key == *key
        })
    }

    fn matching(&self, spec: &dyn Specification) -> Vec<Record> {
        let mut rows: Vec<Record> = self
            .view()
            .get(spec.entity_type())
            .map(|table| {
                table
                    .values()
                    .filter(|r| spec.is_satisfied_by(r))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| spec.compare(a, b));
        rows
    }
}

/// Apply staged changes to `target`. Leaves `target` untouched on error.
fn apply(target: &mut Tables, pending: &[Change]) -> AccessResult<usize> {
    let mut next = target.clone();
    let mut written = 0;
    for change in pending {
        let record = change.record();
        let key = record.key.canonical();
        match change {
            Change::Attach(_) => {}
            Change::Add(_) => {
                let table = next.entry(record.entity_type.clone()).or_default();
                if table.contains_key(&key) {
                    return Err(AccessError::DuplicateKey {
                        entity_type: record.entity_type.clone(),
                        key: record.key.to_string(),
                    });
                }
                table.insert(key, record.clone());
                written += 1;
            }
            Change::Update(_) => {
                let slot = next
                    .get_mut(&record.entity_type)
                    .and_then(|t| t.get_mut(&key))
                    .ok_or_else(|| not_found(record))?;
                *slot = record.clone();
                written += 1;
            }
            Change::Remove(_) => {
                next.get_mut(&record.entity_type)
                    .and_then(|t| t.remove(&key))
                    .ok_or_else(|| not_found(record))?;
                written += 1;
            }
        }
    }
    *target = next;
    Ok(written)
}

fn not_found(record: &Record) -> AccessError {
    AccessError::NotFound {
        entity_type: record.entity_type.clone(),
        key: record.key.to_string(),
    }
}

/// In-memory accessor backed by `BTreeMap` tables.
///
/// Intended for tests and embedding. It honours the full [`Accessor`]
/// contract, including transaction enlistment (one scope at a time), and
/// exposes switches to simulate an offline store or a refusing participant.
///
/// Raw statements are not parsed: `query` returns the rows of the entity
/// type whose key starts with the statement's positional parameters.
pub struct InMemoryAccessor {
    name: String,
    state: Mutex<MemoryState>,
    available: AtomicBool,
    refuse_prepare: AtomicBool,
    refuse_create: AtomicBool,
    invocations: AtomicUsize,
    admission: Option<Admission>,
}

impl InMemoryAccessor {
    /// Create an empty, available accessor.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            state: Mutex::new(MemoryState {
                connection: format!("memory://{name}"),
                database_created: false,
                disposed: false,
                committed: Tables::new(),
                pending: Vec::new(),
                transaction: None,
                last_statement: None,
            }),
            name,
            available: AtomicBool::new(true),
            refuse_prepare: AtomicBool::new(false),
            refuse_create: AtomicBool::new(false),
            invocations: AtomicUsize::new(0),
            admission: None,
        }
    }

    /// Only keep records for which `admits` returns `true`; others are
    /// silently skipped on write. Emulates one stripe of a sharded store.
    pub fn admitting<F>(mut self, admits: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.admission = Some(Arc::new(admits));
        self
    }

    /// Insert durable rows directly, bypassing the unit of work.
    pub fn seeded(self, records: impl IntoIterator<Item = Record>) -> Self {
        {
            let mut state = self.state.lock().expect("lock poisoned");
            for record in records {
                if self.admits(&record) {
                    state
                        .committed
                        .entry(record.entity_type.clone())
                        .or_default()
                        .insert(record.key.canonical(), record);
                }
            }
        }
        self
    }

    /// Simulate the store going offline (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every subsequent `prepare` vote no.
    pub fn set_refuse_prepare(&self, refuse: bool) {
        self.refuse_prepare.store(refuse, Ordering::SeqCst);
    }

    /// Make `try_create_database` report that the database cannot be created.
    pub fn set_refuse_create(&self, refuse: bool) {
        self.refuse_create.store(refuse, Ordering::SeqCst);
    }

    pub fn database_created(&self) -> bool {
        self.state.lock().expect("lock poisoned").database_created
    }

    /// Number of data and lifecycle calls received (transaction
    /// participation calls are not counted).
    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    pub fn reset_invocations(&self) {
        self.invocations.store(0, Ordering::SeqCst);
    }

    /// A committed row, ignoring any open transaction.
    pub fn durable(&self, entity_type: &str, key: &Key) -> Option<Record> {
        let state = self.state.lock().expect("lock poisoned");
        state
            .committed
            .get(entity_type)
            .and_then(|t| t.get(&key.canonical()))
            .cloned()
    }

    /// Number of committed rows of `entity_type`.
    pub fn durable_count(&self, entity_type: &str) -> usize {
        let state = self.state.lock().expect("lock poisoned");
        state.committed.get(entity_type).map_or(0, |t| t.len())
    }

    /// Number of staged, unsaved changes.
    pub fn pending_len(&self) -> usize {
        self.state.lock().expect("lock poisoned").pending.len()
    }

    pub fn connection(&self) -> String {
        self.state.lock().expect("lock poisoned").connection.clone()
    }

    pub fn last_statement(&self) -> Option<Statement> {
        self.state.lock().expect("lock poisoned").last_statement.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.state.lock().expect("lock poisoned").transaction.is_some()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().expect("lock poisoned").disposed
    }

    fn admits(&self, record: &Record) -> bool {
        self.admission.as_ref().map_or(true, |admits| admits(record))
    }

    /// Lock the state for a counted call.
    fn enter(&self) -> AccessResult<MutexGuard<'_, MemoryState>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.guard()
    }

    /// Lock the state, failing if the store is offline or disposed.
    fn guard(&self) -> AccessResult<MutexGuard<'_, MemoryState>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(AccessError::unavailable(&self.name, "store offline"));
        }
        let state = self.state.lock().expect("lock poisoned");
        if state.disposed {
            return Err(AccessError::unavailable(&self.name, "accessor disposed"));
        }
        Ok(state)
    }

    fn stage(&self, records: &[Record], change: fn(Record) -> Change) -> AccessResult<()> {
        let mut state = self.enter()?;
        for record in records {
            if self.admits(record) {
                state.pending.push(change(record.clone()));
            } else {
                debug!(accessor = %self.name, key = %record.key, "record not admitted by stripe; skipped");
            }
        }
        Ok(())
    }

    fn active<'a>(
        &self,
        state: &'a mut MemoryState,
        tx: &TransactionContext,
    ) -> AccessResult<&'a mut ActiveTransaction> {
        match state.transaction.as_mut() {
            Some(active) if active.id == tx.id() => Ok(active),
            _ => Err(AccessError::Transaction {
                transaction: tx.id(),
                reason: format!("{} is not enlisted", self.name),
            }),
        }
    }
}

impl Default for InMemoryAccessor {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl Accessor for InMemoryAccessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, entity_type: &str, statement: &Statement) -> AccessResult<Vec<Record>> {
        let mut state = self.enter()?;
        if statement.text.trim().is_empty() {
            return Err(AccessError::InvalidStatement("empty statement".into()));
        }
        state.last_statement = Some(statement.clone());
        Ok(state
            .view()
            .get(entity_type)
            .map(|table| {
                table
                    .values()
                    .filter(|r| r.key.starts_with(&statement.params))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn exists(&self, entity_type: &str, key: &Key) -> AccessResult<bool> {
        let state = self.enter()?;
        if let Some(change) = state.tracked(entity_type, key) {
            return Ok(!matches!(change, Change::Remove(_)));
        }
        Ok(state
            .view()
            .get(entity_type)
            .is_some_and(|t| t.contains_key(&key.canonical())))
    }

    fn exists_by(&self, spec: &dyn Specification) -> AccessResult<bool> {
        let state = self.enter()?;
        Ok(state
            .view()
            .get(spec.entity_type())
            .is_some_and(|t| t.values().any(|r| spec.is_satisfied_by(r))))
    }

    fn find(&self, entity_type: &str, key: &Key) -> AccessResult<Option<Record>> {
        let state = self.enter()?;
        if let Some(change) = state.tracked(entity_type, key) {
            return Ok(match change {
                Change::Remove(_) => None,
                other => Some(other.record().clone()),
            });
        }
        Ok(state
            .view()
            .get(entity_type)
            .and_then(|t| t.get(&key.canonical()))
            .cloned())
    }

    fn find_list(&self, spec: &dyn Specification) -> AccessResult<Vec<Record>> {
        let state = self.enter()?;
        Ok(state.matching(spec))
    }

    fn find_paging_list(&self, spec: &dyn Specification) -> AccessResult<PagedList> {
        let state = self.enter()?;
        let rows = state.matching(spec);
        Ok(match spec.paging() {
            Some(paging) => PagedList::paginate(rows, paging),
            None => PagedList::unpaged(rows),
        })
    }

    fn add(&self, record: &Record) -> AccessResult<()> {
        self.stage(std::slice::from_ref(record), Change::Add)
    }

    fn add_range(&self, records: &[Record]) -> AccessResult<()> {
        self.stage(records, Change::Add)
    }

    fn attach(&self, record: &Record) -> AccessResult<()> {
        self.stage(std::slice::from_ref(record), Change::Attach)
    }

    fn attach_range(&self, records: &[Record]) -> AccessResult<()> {
        self.stage(records, Change::Attach)
    }

    fn remove(&self, record: &Record) -> AccessResult<()> {
        self.stage(std::slice::from_ref(record), Change::Remove)
    }

    fn remove_range(&self, records: &[Record]) -> AccessResult<()> {
        self.stage(records, Change::Remove)
    }

    fn update(&self, record: &Record) -> AccessResult<()> {
        self.stage(std::slice::from_ref(record), Change::Update)
    }

    fn update_range(&self, records: &[Record]) -> AccessResult<()> {
        self.stage(records, Change::Update)
    }

    fn save_changes(&self) -> AccessResult<usize> {
        let mut state = self.enter()?;
        let pending = std::mem::take(&mut state.pending);
        let state = &mut *state;
        let target = match state.transaction.as_mut() {
            Some(tx) => &mut tx.shadow,
            None => &mut state.committed,
        };
        match apply(target, &pending) {
            Ok(written) => {
                debug!(accessor = %self.name, written, "changes saved");
                Ok(written)
            }
            Err(e) => {
                state.pending = pending;
                Err(e)
            }
        }
    }

    fn try_create_database(&self) -> AccessResult<bool> {
        let mut state = self.enter()?;
        if !state.database_created && self.refuse_create.load(Ordering::SeqCst) {
            return Ok(false);
        }
        if !state.database_created {
            debug!(accessor = %self.name, "database created");
            state.database_created = true;
        }
        Ok(true)
    }

    fn change_connection(&self, connection: &str) -> AccessResult<()> {
        let mut state = self.enter()?;
        state.connection = connection.to_string();
        Ok(())
    }

    fn dispose(&self) -> AccessResult<()> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().expect("lock poisoned");
        state.disposed = true;
        state.transaction = None;
        state.pending.clear();
        Ok(())
    }

    fn enlist(&self, tx: &TransactionContext) -> AccessResult<()> {
        let mut state = self.guard()?;
        if let Some(active) = &state.transaction {
            if active.id == tx.id() {
                return Ok(());
            }
            return Err(AccessError::Transaction {
                transaction: tx.id(),
                reason: format!("{} already enlisted in {}", self.name, active.id),
            });
        }
        let shadow = state.committed.clone();
        let staged = state.pending.clone();
        state.transaction = Some(ActiveTransaction {
            id: tx.id(),
            shadow,
            staged,
            prepared: false,
        });
        debug!(accessor = %self.name, transaction = %tx.id().short_id(), "enlisted");
        Ok(())
    }

    fn prepare(&self, tx: &TransactionContext) -> AccessResult<()> {
        let mut state = self.guard()?;
        let active = self.active(&mut state, tx)?;
        if self.refuse_prepare.load(Ordering::SeqCst) {
            return Err(AccessError::Transaction {
                transaction: tx.id(),
                reason: format!("{} refused to prepare", self.name),
            });
        }
        active.prepared = true;
        Ok(())
    }

    fn commit(&self, tx: &TransactionContext) -> AccessResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        let active = self.active(&mut state, tx)?;
        if !active.prepared {
            return Err(AccessError::Transaction {
                transaction: tx.id(),
                reason: format!("{} committed before prepare", self.name),
            });
        }
        let shadow = std::mem::take(&mut active.shadow);
        state.committed = shadow;
        state.transaction = None;
        debug!(accessor = %self.name, transaction = %tx.id().short_id(), "committed");
        Ok(())
    }

    fn rollback(&self, tx: &TransactionContext) -> AccessResult<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.transaction.as_ref().is_some_and(|a| a.id == tx.id()) {
            if let Some(active) = state.transaction.take() {
                state.pending = active.staged;
            }
            debug!(accessor = %self.name, transaction = %tx.id().short_id(), "rolled back");
        }
        Ok(())
    }
}

impl fmt::Debug for InMemoryAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryAccessor")
            .field("name", &self.name)
            .field("available", &self.available.load(Ordering::SeqCst))
            .field("invocations", &self.invocations())
            .finish()
    }
}
