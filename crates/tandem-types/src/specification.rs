use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// An externally supplied filter/sort/paging predicate.
///
/// Accessors evaluate it against their own rows; the dispatch layer only
/// uses [`Specification::compare`] and [`Specification::paging`] when it has
/// to merge results from several stripes.
pub trait Specification: Send + Sync {
    /// Entity type this specification selects from.
    fn entity_type(&self) -> &str;

    /// Returns `true` if the record matches the filter.
    fn is_satisfied_by(&self, record: &Record) -> bool;

    /// Result ordering. Records comparing equal keep their source order.
    fn compare(&self, _a: &Record, _b: &Record) -> Ordering {
        Ordering::Equal
    }

    /// Requested page, if any.
    fn paging(&self) -> Option<Paging> {
        None
    }
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Zero-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Paging {
    pub page_index: usize,
    pub page_size: usize,
}

impl Paging {
    pub fn new(page_index: usize, page_size: usize) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    /// Number of rows skipped before this page.
    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }

    /// First page covering every row up to the end of this one.
    pub fn prefix(&self) -> Paging {
        let end = self.page_index.saturating_add(1).saturating_mul(self.page_size);
        Paging::new(0, end)
    }
}

/// One page of results plus the size of the whole matching set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagedList {
    pub items: Vec<Record>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
}

impl PagedList {
    /// Cut one page out of an already filtered and ordered result set.
    pub fn paginate(all: Vec<Record>, paging: Paging) -> Self {
        let total_count = all.len();
        let items = all
            .into_iter()
            .skip(paging.offset())
            .take(paging.page_size)
            .collect();
        Self {
            items,
            page_index: paging.page_index,
            page_size: paging.page_size,
            total_count,
        }
    }

    /// Wrap a full result set as a single page.
    pub fn unpaged(all: Vec<Record>) -> Self {
        let total_count = all.len();
        Self {
            items: all,
            page_index: 0,
            page_size: total_count,
            total_count,
        }
    }

    /// Number of pages needed for `total_count` rows.
    pub fn total_pages(&self) -> usize {
        if self.page_size == 0 {
            0
        } else {
            self.total_count.div_ceil(self.page_size)
        }
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index.saturating_add(1) < self.total_pages()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// QuerySpec
// ---------------------------------------------------------------------------

type RecordPredicate = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Builder-style [`Specification`] over record fields.
#[derive(Clone)]
pub struct QuerySpec {
    entity_type: String,
    equals: Vec<(String, Value)>,
    predicate: Option<RecordPredicate>,
    order_by: Vec<(String, bool)>,
    paging: Option<Paging>,
}

impl QuerySpec {
    /// Match every record of `entity_type`.
    pub fn for_type(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            equals: Vec::new(),
            predicate: None,
            order_by: Vec::new(),
            paging: None,
        }
    }

    /// Require `field == value`.
    pub fn field_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.equals.push((field.into(), value.into()));
        self
    }

    /// Require an arbitrary predicate (combined with other filters by AND).
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Ascending order on a field; later calls break ties of earlier ones.
    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by.push((field.into(), false));
        self
    }

    /// Descending order on a field.
    pub fn order_by_desc(mut self, field: impl Into<String>) -> Self {
        self.order_by.push((field.into(), true));
        self
    }

    /// Request one page of results.
    pub fn page(mut self, page_index: usize, page_size: usize) -> Self {
        self.paging = Some(Paging::new(page_index, page_size));
        self
    }
}

impl Specification for QuerySpec {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn is_satisfied_by(&self, record: &Record) -> bool {
        record.entity_type == self.entity_type
            && self
                .equals
                .iter()
                .all(|(field, value)| record.field(field) == Some(value))
            && self.predicate.as_ref().map_or(true, |p| p(record))
    }

    fn compare(&self, a: &Record, b: &Record) -> Ordering {
        for (field, descending) in &self.order_by {
            let ord = compare_values(
                a.field(field).unwrap_or(&Value::Null),
                b.field(field).unwrap_or(&Value::Null),
            );
            let ord = if *descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn paging(&self) -> Option<Paging> {
        self.paging
    }
}

impl fmt::Debug for QuerySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySpec")
            .field("entity_type", &self.entity_type)
            .field("equals", &self.equals)
            .field("has_predicate", &self.predicate.is_some())
            .field("order_by", &self.order_by)
            .field("paging", &self.paging)
            .finish()
    }
}

/// Total order over JSON values: null < bool < number < string < other.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.total_cmp(&y)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)).then_with(|| a.to_string().cmp(&b.to_string())),
    }
}
