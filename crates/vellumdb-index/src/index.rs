//! The index capability surface.
//!
//! Every index kind is one variant of [`IndexType`]; capabilities are
//! dispatched over the kind rather than through open subtyping. The planner
//! only ever talks to the capability methods (`supports_filter_condition`,
//! `supports_sort_condition`, `specialize_condition`) and the iterator
//! factories; entry maintenance is driven by the owning collection.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use vellumdb_core::{
    AttributePath, CmpOp, Condition, Error, ErrorCode, Result, SortCondition, Value,
};

use crate::descriptor::{IndexDescriptor, IndexType};
use crate::iterator::IndexIterator;
use crate::keys::SortKey;

/// Cost estimate for filtering through an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterCosts {
    /// Whether the index can evaluate the condition at all.
    pub supported: bool,
    /// Estimated number of items left after applying the condition.
    pub estimated_items: u64,
    /// Estimated cost of producing them.
    pub estimated_cost: f64,
}

impl FilterCosts {
    fn unsupported(items_in: u64) -> Self {
        Self { supported: false, estimated_items: items_in, estimated_cost: 0.0 }
    }
}

/// Cost estimate for sorting through an index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortCosts {
    /// Whether the index yields entries in the requested order.
    pub supported: bool,
    /// Estimated cost of the sorted scan (or of sorting externally when
    /// unsupported).
    pub estimated_cost: f64,
    /// Number of leading sort attributes the index covers.
    pub covered_attributes: usize,
}

/// Selectivity assumed for one equality match.
const EQUALITY_SELECTIVITY: f64 = 1.0 / 100.0;
/// Selectivity assumed for one range restriction.
const RANGE_SELECTIVITY: f64 = 1.0 / 2.0;
/// Assumed fraction of an edge collection sharing one vertex.
const EDGE_SELECTIVITY: f64 = 1.0 / 500.0;

/// Cost of sorting `items` entries externally.
#[must_use]
pub fn external_sort_cost(items: u64) -> f64 {
    if items == 0 {
        0.0
    } else {
        items as f64 * (items as f64).log2()
    }
}

/// Per-field constraint extracted from an `AND` node.
#[derive(Debug, Default, Clone)]
struct FieldConstraint {
    has_eq: bool,
    in_len: Option<usize>,
    has_range: bool,
}

/// An index over one collection's documents.
///
/// Entries map a composite key (one value per indexed field) to the set of
/// document keys carrying it. Sorted kinds rely on the map order; unsorted
/// kinds use the same representation but refuse sort pushdown.
#[derive(Debug)]
pub struct Index {
    descriptor: IndexDescriptor,
    entries: RwLock<BTreeMap<SortKey, BTreeSet<String>>>,
}

impl Index {
    /// Create an empty index from its descriptor.
    #[must_use]
    pub fn new(descriptor: IndexDescriptor) -> Self {
        Self { descriptor, entries: RwLock::new(BTreeMap::new()) }
    }

    /// The descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.descriptor
    }

    /// The index kind.
    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.descriptor.index_type
    }

    /// The ordered indexed attribute paths.
    #[must_use]
    pub fn fields(&self) -> &[AttributePath] {
        &self.descriptor.fields
    }

    /// Whether entries are kept in sort order.
    #[must_use]
    pub fn is_sorted(&self) -> bool {
        self.descriptor.index_type.is_sorted()
    }

    /// Whether documents lacking an indexed attribute are left out.
    #[must_use]
    pub fn sparse(&self) -> bool {
        self.descriptor.sparse
    }

    /// Number of documents currently indexed.
    #[must_use]
    pub fn num_entries(&self) -> u64 {
        self.entries.read().values().map(|keys| keys.len() as u64).sum()
    }

    /// Serialise the descriptor, optionally with figures.
    #[must_use]
    pub fn to_value(&self, with_figures: bool) -> Value {
        let mut value = self.descriptor.to_value();
        if with_figures {
            if let Value::Object(attrs) = &mut value {
                attrs.insert(
                    "figures".to_string(),
                    Value::object([("count", Value::from(self.num_entries()))]),
                );
            }
        }
        value
    }

    // ------------------------------------------------------------------
    // Entry maintenance
    // ------------------------------------------------------------------

    /// Compute the composite key a document contributes, or `None` when a
    /// sparse index skips it.
    fn key_for(&self, doc: &Value) -> Option<SortKey> {
        let mut values = Vec::with_capacity(self.descriptor.fields.len());
        for field in &self.descriptor.fields {
            match doc.get_path(field) {
                Some(v) if !v.is_null() => values.push(v.clone()),
                _ if self.descriptor.sparse => return None,
                _ => values.push(Value::Null),
            }
        }
        Some(SortKey(values))
    }

    /// Index a document.
    ///
    /// Fails with `UniqueConstraintViolated` when a unique index already
    /// holds the same field tuple for a different document.
    pub fn insert_document(&self, key: &str, doc: &Value) -> Result<()> {
        let Some(sort_key) = self.key_for(doc) else {
            return Ok(());
        };
        let mut entries = self.entries.write();
        if self.descriptor.unique {
            if let Some(existing) = entries.get(&sort_key) {
                if !existing.is_empty() && !existing.contains(key) {
                    return Err(Error::with_message(
                        ErrorCode::UniqueConstraintViolated,
                        format!("unique constraint violated in index {}", self.descriptor.id),
                    ));
                }
            }
        }
        entries.entry(sort_key).or_default().insert(key.to_string());
        Ok(())
    }

    /// Remove a document from the index.
    pub fn remove_document(&self, key: &str, doc: &Value) {
        let Some(sort_key) = self.key_for(doc) else {
            return;
        };
        let mut entries = self.entries.write();
        if let Some(keys) = entries.get_mut(&sort_key) {
            keys.remove(key);
            if keys.is_empty() {
                entries.remove(&sort_key);
            }
        }
    }

    /// Drop all entries.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    // ------------------------------------------------------------------
    // Capability surface
    // ------------------------------------------------------------------

    /// Extract the per-field constraints an `AND` node places on this
    /// index's fields.
    fn analyze_condition(&self, node: &Condition, variable: &str) -> Vec<FieldConstraint> {
        let mut constraints = vec![FieldConstraint::default(); self.descriptor.fields.len()];
        for member in node.members() {
            let Some(accessed) = member.as_cmp().and_then(|c| c.accessed_for(variable)) else {
                continue;
            };
            let Some(pos) =
                self.descriptor.fields.iter().position(|f| f == accessed.path)
            else {
                continue;
            };
            match accessed.op {
                CmpOp::Eq => constraints[pos].has_eq = true,
                CmpOp::In => {
                    if let Some(items) = accessed.value.as_array() {
                        constraints[pos].in_len = Some(items.len());
                    }
                }
                CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => constraints[pos].has_range = true,
                CmpOp::Ne | CmpOp::NotIn => {}
            }
        }
        constraints
    }

    /// Ask the index whether (and how cheaply) it can evaluate a filter.
    #[must_use]
    pub fn supports_filter_condition(
        &self,
        node: &Condition,
        variable: &str,
        items_in: u64,
    ) -> FilterCosts {
        let constraints = self.analyze_condition(node, variable);

        match self.descriptor.index_type {
            IndexType::Fulltext => FilterCosts::unsupported(items_in),
            IndexType::Primary => {
                let c = &constraints[0];
                if c.has_eq || c.in_len.is_some() {
                    let items = c.in_len.unwrap_or(1) as u64;
                    FilterCosts {
                        supported: true,
                        estimated_items: items,
                        estimated_cost: items as f64,
                    }
                } else {
                    FilterCosts::unsupported(items_in)
                }
            }
            IndexType::Edge => {
                // Lookups are by vertex: the leading `_from` field.
                if constraints[0].has_eq || constraints[0].in_len.is_some() {
                    let factor = constraints[0].in_len.unwrap_or(1) as f64;
                    let items = (items_in as f64 * EDGE_SELECTIVITY * factor).max(1.0);
                    FilterCosts {
                        supported: true,
                        estimated_items: items as u64,
                        estimated_cost: items,
                    }
                } else {
                    FilterCosts::unsupported(items_in)
                }
            }
            IndexType::Hash => {
                // Every indexed field must be pinned by an equality.
                if !constraints.iter().all(|c| c.has_eq || c.in_len.is_some()) {
                    return FilterCosts::unsupported(items_in);
                }
                let mut items = items_in as f64;
                for c in &constraints {
                    items *= EQUALITY_SELECTIVITY * c.in_len.unwrap_or(1) as f64;
                }
                let items = if self.descriptor.unique { 1.0 } else { items.max(1.0) };
                FilterCosts {
                    supported: true,
                    estimated_items: items as u64,
                    estimated_cost: items,
                }
            }
            IndexType::Skiplist | IndexType::Persistent => {
                // An equality prefix, optionally followed by one range.
                let mut eq_prefix = 0;
                for c in &constraints {
                    if c.has_eq || c.in_len.is_some() {
                        eq_prefix += 1;
                    } else {
                        break;
                    }
                }
                let range_next =
                    constraints.get(eq_prefix).is_some_and(|c| c.has_range);
                if eq_prefix == 0 && !range_next {
                    return FilterCosts::unsupported(items_in);
                }
                let mut items = items_in as f64;
                for c in constraints.iter().take(eq_prefix) {
                    items *= EQUALITY_SELECTIVITY * c.in_len.unwrap_or(1) as f64;
                }
                if range_next {
                    items *= RANGE_SELECTIVITY;
                }
                let items = items.max(1.0);
                let lookup = if items_in > 0 { (items_in as f64).log2() } else { 0.0 };
                FilterCosts {
                    supported: true,
                    estimated_items: items as u64,
                    estimated_cost: lookup + items,
                }
            }
        }
    }

    /// Ask the index whether it can produce entries in the requested sort
    /// order.
    #[must_use]
    pub fn supports_sort_condition(
        &self,
        sort: &SortCondition,
        variable: &str,
        items_in: u64,
    ) -> SortCosts {
        if !self.is_sorted()
            || sort.is_empty()
            || !sort.is_only_attribute_access()
            || !sort.is_unidirectional()
        {
            return SortCosts {
                supported: false,
                estimated_cost: external_sort_cost(items_in),
                covered_attributes: 0,
            };
        }

        let covered = sort.covered_attributes(variable, &self.descriptor.fields);
        if covered == 0 || covered < sort.num_attributes() {
            return SortCosts {
                supported: false,
                estimated_cost: external_sort_cost(items_in),
                covered_attributes: covered,
            };
        }

        SortCosts {
            supported: true,
            estimated_cost: items_in as f64 / (covered as f64 + 1.0),
            covered_attributes: covered,
        }
    }

    /// Rewrite an `AND` node to the subset of comparisons this index can
    /// evaluate directly; the remainder stays with the caller as a
    /// post-filter.
    #[must_use]
    pub fn specialize_condition(&self, node: &Condition, variable: &str) -> Condition {
        let constraints = self.analyze_condition(node, variable);

        // Which fields may contribute, and with which operator classes.
        let keep = |pos: usize, op: CmpOp| -> bool {
            match self.descriptor.index_type {
                IndexType::Fulltext => false,
                IndexType::Primary | IndexType::Edge => {
                    matches!(op, CmpOp::Eq | CmpOp::In) && (pos == 0 || self.descriptor.index_type == IndexType::Edge)
                }
                IndexType::Hash => {
                    constraints.iter().all(|c| c.has_eq || c.in_len.is_some())
                        && matches!(op, CmpOp::Eq | CmpOp::In)
                }
                IndexType::Skiplist | IndexType::Persistent => {
                    let mut eq_prefix = 0;
                    for c in &constraints {
                        if c.has_eq || c.in_len.is_some() {
                            eq_prefix += 1;
                        } else {
                            break;
                        }
                    }
                    match op {
                        CmpOp::Eq | CmpOp::In => pos < eq_prefix,
                        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => pos == eq_prefix,
                        CmpOp::Ne | CmpOp::NotIn => false,
                    }
                }
            }
        };

        let kept = node
            .members()
            .iter()
            .filter(|member| {
                member
                    .as_cmp()
                    .and_then(|c| c.accessed_for(variable))
                    .and_then(|accessed| {
                        self.descriptor
                            .fields
                            .iter()
                            .position(|f| f == accessed.path)
                            .map(|pos| (pos, accessed.op))
                    })
                    .is_some_and(|(pos, op)| keep(pos, op))
            })
            .cloned()
            .collect();

        Condition::And(kept)
    }

    // ------------------------------------------------------------------
    // Iterator factories
    // ------------------------------------------------------------------

    fn collect_keys(&self, matches: impl Fn(&SortKey) -> bool, reverse: bool) -> Vec<String> {
        let entries = self.entries.read();
        let mut keys = Vec::new();
        for (sort_key, doc_keys) in entries.iter() {
            if matches(sort_key) {
                keys.extend(doc_keys.iter().cloned());
            }
        }
        if reverse {
            keys.reverse();
        }
        keys
    }

    /// Iterate all entries in index order.
    #[must_use]
    pub fn all_iterator(&self, reverse: bool) -> IndexIterator {
        IndexIterator::from_keys(self.collect_keys(|_| true, reverse))
    }

    /// Yield entries starting at an arbitrary position.
    ///
    /// The starting point is arbitrary but stable for a given entry set; it
    /// is not uniformly random.
    #[must_use]
    pub fn any_iterator(&self) -> IndexIterator {
        let mut keys = self.collect_keys(|_| true, false);
        if !keys.is_empty() {
            let pivot = keys.len() / 2;
            keys.rotate_left(pivot);
        }
        IndexIterator::from_keys(keys)
    }

    /// Iterate entries whose composite key starts with the given search
    /// values (an array value, one element per leading field).
    #[must_use]
    pub fn iterator_for_slice(&self, search: &Value, reverse: bool) -> IndexIterator {
        let Some(prefix) = search.as_array() else {
            return IndexIterator::empty();
        };
        IndexIterator::from_keys(self.collect_keys(|key| key.starts_with(prefix), reverse))
    }

    /// Iterate entries matching a specialized `AND` node.
    #[must_use]
    pub fn iterator_for_condition(
        &self,
        node: &Condition,
        variable: &str,
        reverse: bool,
    ) -> IndexIterator {
        // Collect (field position, op, value) triples once.
        let mut tests = Vec::new();
        for member in node.members() {
            let Some(accessed) = member.as_cmp().and_then(|c| c.accessed_for(variable)) else {
                continue;
            };
            if let Some(pos) = self.descriptor.fields.iter().position(|f| f == accessed.path) {
                tests.push((pos, accessed.op, accessed.value.clone()));
            }
        }

        IndexIterator::from_keys(self.collect_keys(
            |key| {
                tests.iter().all(|(pos, op, value)| {
                    let Some(entry_value) = key.0.get(*pos) else {
                        return false;
                    };
                    let cmp = entry_value.compare(value);
                    match op {
                        CmpOp::Eq => cmp == Ordering::Equal,
                        CmpOp::Ne => cmp != Ordering::Equal,
                        CmpOp::Lt => cmp == Ordering::Less,
                        CmpOp::Le => cmp != Ordering::Greater,
                        CmpOp::Gt => cmp == Ordering::Greater,
                        CmpOp::Ge => cmp != Ordering::Less,
                        CmpOp::In => value.as_array().is_some_and(|items| {
                            items.iter().any(|i| entry_value.compare(i) == Ordering::Equal)
                        }),
                        CmpOp::NotIn => value.as_array().is_some_and(|items| {
                            items.iter().all(|i| entry_value.compare(i) != Ordering::Equal)
                        }),
                    }
                })
            },
            reverse,
        ))
    }

    /// Invoke a callback for every indexed document key, in index order,
    /// until it returns `false`.
    pub fn invoke_on_all_elements(&self, mut callback: impl FnMut(&str) -> bool) {
        for key in self.collect_keys(|_| true, false) {
            if !callback(&key) {
                break;
            }
        }
    }

    /// Like [`invoke_on_all_elements`](Self::invoke_on_all_elements), but the
    /// key set is snapshotted up front so the callback may remove entries.
    pub fn invoke_on_all_elements_for_removal(&self, mut callback: impl FnMut(&str) -> bool) {
        let snapshot = self.collect_keys(|_| true, false);
        for key in snapshot {
            if !callback(&key) {
                break;
            }
        }
    }
}
