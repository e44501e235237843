//! Index selection for filter and sort conditions.
//!
//! The input is a DNF filter root (`OR` of `AND`s of comparisons) over one
//! bound variable, plus an optional sort condition. The AND-clause planner
//! costs every candidate index and specializes the winning clause; the
//! OR-tree planner aggregates the per-clause decisions; `sort_ors`
//! canonicalises single-attribute OR chains so ranges come out in ascending
//! value order.

use std::cmp::Ordering;
use std::sync::Arc;

use vellumdb_core::{
    path_to_string, CmpOp, Condition, ErrorCode, Operand, Result, SortCondition, Value,
};
use vellumdb_index::{FilterCosts, Index, IndexHandle};

use crate::transaction::Transaction;

/// Cost factor applied when a filter has to be evaluated without an index.
const FULL_SCAN_PENALTY: f64 = 1.5;

/// Outcome of the OR-tree planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexUsage {
    /// Every AND clause can be answered through its chosen index.
    pub supports_filter: bool,
    /// At least one chosen index also delivers the requested order.
    pub supports_sort: bool,
    /// The OR root was successfully normalised by [`sort_ors`].
    pub sorted: bool,
}

/// One clause of the OR root, flattened for sorting.
///
/// Clauses live in this dense vector and sorting permutes positions; the
/// rebuilt tree and handle vector are assembled from `position` afterwards.
struct ConditionPart {
    /// Original position of the AND clause under the OR root.
    position: usize,
    /// Dotted attribute path of the comparison.
    path: String,
    /// Operator, normalised to attribute-on-the-left form.
    op: CmpOp,
    /// The constant side (for `IN`: the whole array).
    value: Value,
}

impl ConditionPart {
    /// The lower bound this clause imposes, with its inclusivity.
    ///
    /// `<`/`<=` impose none. `IN` bounds by its whole array value, which by
    /// the type order sorts after every scalar.
    fn lower_bound(&self) -> Option<(&Value, bool)> {
        match self.op {
            CmpOp::Eq | CmpOp::Ge | CmpOp::In => Some((&self.value, true)),
            CmpOp::Gt => Some((&self.value, false)),
            _ => None,
        }
    }

    fn is_empty_in(&self) -> bool {
        self.op == CmpOp::In && self.value.as_array().is_some_and(<[Value]>::is_empty)
    }
}

/// Replace the constant side of the single comparison under an AND clause.
fn set_clause_constant(clause: &mut Condition, value: Value) {
    let Condition::And(members) = clause else {
        return;
    };
    let Some(Condition::Cmp(cmp)) = members.first_mut() else {
        return;
    };
    if cmp.rhs.is_constant() {
        cmp.rhs = Operand::Constant(value);
    } else {
        cmp.lhs = Operand::Constant(value);
    }
}

/// Union two `IN` arrays: concatenate, sort by the value order, drop
/// duplicates.
fn unionized_array(a: &[Value], b: &[Value]) -> Vec<Value> {
    let mut merged: Vec<Value> = a.iter().chain(b.iter()).cloned().collect();
    merged.sort_by(Value::compare);
    merged.dedup_by(|x, y| x.compare(y) == Ordering::Equal);
    merged
}

/// Sort the OR clauses over one attribute into ascending value order.
///
/// Returns `false` (leaving a partially canonicalised root behind is fine,
/// the caller then treats the condition as unsortable) if any clause is not
/// a single comparison, operators are `!=`/`NOT IN`, clauses reference
/// different attributes, or the clause and handle counts disagree.
/// Adjacent `IN` clauses are merged into the first one and emptied
/// duplicates dropped from the rebuilt root. The handle vector is permuted
/// the same way.
pub fn sort_ors(
    root: &mut Condition,
    variable: &str,
    used_indexes: &mut Vec<IndexHandle>,
) -> bool {
    let n = root.members().len();
    if n < 2 {
        return true;
    }
    if n != used_indexes.len() {
        // The caller attaches one index per OR clause; anything else means
        // we should not have been called.
        debug_assert!(false, "clause / index count mismatch");
        return false;
    }

    let mut parts = Vec::with_capacity(n);
    for (position, clause) in root.members().iter().enumerate() {
        let Condition::And(members) = clause else {
            return false;
        };
        if members.len() != 1 {
            return false;
        }
        let Some(comparison) = members[0].as_cmp() else {
            return false;
        };
        if matches!(comparison.op, CmpOp::Ne | CmpOp::NotIn) {
            return false;
        }
        let Some(accessed) = comparison.accessed_for(variable) else {
            return false;
        };
        if accessed.op == CmpOp::In && !accessed.value.is_array() {
            return false;
        }
        parts.push(ConditionPart {
            position,
            path: path_to_string(accessed.path),
            op: accessed.op,
            value: accessed.value.clone(),
        });
    }

    // All clauses must target the same attribute.
    if parts.windows(2).any(|pair| pair[0].path != pair[1].path) {
        return false;
    }

    // Merge every IN array into the first one.
    let mut previous_in: Option<usize> = None;
    for i in 0..n {
        if parts[i].op != CmpOp::In {
            continue;
        }
        match previous_in {
            None => previous_in = Some(i),
            Some(first) => {
                let merged = unionized_array(
                    parts[first].value.as_array().unwrap_or_default(),
                    parts[i].value.as_array().unwrap_or_default(),
                );
                parts[first].value = Value::Array(merged.clone());
                parts[i].value = Value::Array(Vec::new());
                set_clause_constant(
                    &mut root.members_mut()[parts[first].position],
                    Value::Array(merged),
                );
                set_clause_constant(
                    &mut root.members_mut()[parts[i].position],
                    Value::Array(Vec::new()),
                );
            }
        }
    }

    // Sort by attribute, then lower bound; a missing bound sorts first and
    // an inclusive bound before an exclusive one. The sort is stable, so
    // equal clauses keep their input order.
    parts.sort_by(|lhs, rhs| {
        let by_path = lhs.path.cmp(&rhs.path);
        if by_path != Ordering::Equal {
            return by_path;
        }
        match (lhs.lower_bound(), rhs.lower_bound()) {
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (None, None) => Ordering::Equal,
            (Some((lv, li)), Some((rv, ri))) => {
                let by_value = lv.compare(rv);
                if by_value != Ordering::Equal {
                    return by_value;
                }
                match (li, ri) {
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    _ => Ordering::Equal,
                }
            }
        }
    });

    // Rebuild the OR root and the handle vector in sorted order, dropping
    // clauses whose IN array was emptied by the merge.
    let old_members = std::mem::take(root.members_mut());
    let old_indexes = std::mem::take(used_indexes);
    for part in &parts {
        if part.is_empty_in() {
            continue;
        }
        root.members_mut().push(old_members[part.position].clone());
        used_indexes.push(old_indexes[part.position].clone());
    }
    true
}

/// Pick the cheapest index for one AND clause plus sort condition.
///
/// The clause is rewritten to the winner's specialised form; the winning
/// handle is appended to `used_indexes` and `is_sparse` reflects the winner.
/// Returns `(supports_filter, supports_sort)`; `(false, false)` when no
/// index qualifies.
#[allow(clippy::too_many_arguments)]
pub(crate) fn find_index_handle_for_and_node(
    indexes: &[Arc<Index>],
    node: &mut Condition,
    variable: &str,
    sort_condition: &SortCondition,
    items_in_collection: u64,
    used_indexes: &mut Vec<IndexHandle>,
    is_sparse: &mut bool,
) -> (bool, bool) {
    let mut best: Option<Arc<Index>> = None;
    let mut best_cost = 0.0;
    let mut best_supports_filter = false;
    let mut best_supports_sort = false;

    for index in indexes {
        let mut items_in_index = items_in_collection;

        let filter: FilterCosts = index.supports_filter_condition(node, variable, items_in_index);
        let (supports_filter, filter_cost) = if filter.supported {
            // The filter reduces the number of items left to sort.
            items_in_index = filter.estimated_items;
            (true, filter.estimated_cost)
        } else {
            (false, items_in_index as f64 * FULL_SCAN_PENALTY)
        };

        let is_only_attribute_access =
            !sort_condition.is_empty() && sort_condition.is_only_attribute_access();

        let mut supports_sort = false;
        let mut sort_cost = 0.0;
        if sort_condition.is_unidirectional() {
            // Only a sorted index can deliver the requested order; anything
            // else pays for an external sort of the remaining items.
            let costs = index.supports_sort_condition(sort_condition, variable, items_in_index);
            if index.is_sorted() && costs.supported {
                supports_sort = true;
            }
            sort_cost = costs.estimated_cost;
        }

        if !supports_sort && is_only_attribute_access && node.is_only_equality_match(variable) {
            // The index cannot sort, but an all-equality filter over exactly
            // the sort attributes pins every sort key to one value: no
            // sorting is needed.
            let covered = sort_condition.covered_attributes(variable, index.fields());
            if covered == sort_condition.num_attributes()
                && (index.is_sorted() || index.fields().len() == sort_condition.num_attributes())
            {
                sort_cost = 0.0;
            }
        }

        if !supports_filter && !supports_sort {
            continue;
        }

        let total_cost = filter_cost + sort_cost;
        if best.is_none() || total_cost < best_cost {
            best = Some(Arc::clone(index));
            best_cost = total_cost;
            best_supports_filter = supports_filter;
            best_supports_sort = supports_sort;
        }
    }

    let Some(best) = best else {
        return (false, false);
    };

    *node = best.specialize_condition(node, variable);
    *is_sparse = best.sparse();
    used_indexes.push(IndexHandle::new(best));

    (best_supports_filter, best_supports_sort)
}

impl Transaction {
    /// Pick the best index handles for a DNF filter root plus sort
    /// condition.
    ///
    /// Appends one handle per AND clause to `used_indexes` and specialises
    /// the clauses in place. When some clause yields a sort-only index, all
    /// other choices are discarded and only that index is kept -- unless it
    /// is sparse, which cannot deliver a complete sorted view.
    #[allow(clippy::too_many_arguments)]
    pub fn get_best_index_handles_for_filter_condition(
        &self,
        collection_name: &str,
        root: &mut Condition,
        variable: &str,
        sort_condition: &SortCondition,
        items_in_collection: u64,
        used_indexes: &mut Vec<IndexHandle>,
    ) -> Result<IndexUsage> {
        // Only meaningful after DNF transformation.
        assert!(matches!(root, Condition::Or(_)), "filter root must be an OR node");

        let indexes = self.indexes_for_collection(collection_name)?;

        let mut can_use_for_filter = !root.members().is_empty();
        let mut can_use_for_sort = false;
        let mut is_sparse = false;

        let clause_count = root.members().len();
        for i in 0..clause_count {
            let (supports_filter, supports_sort) = find_index_handle_for_and_node(
                &indexes,
                &mut root.members_mut()[i],
                variable,
                sort_condition,
                items_in_collection,
                used_indexes,
                &mut is_sparse,
            );

            if supports_sort && !supports_filter {
                // Sort-only index: stop searching and keep only this one.
                debug_assert!(!used_indexes.is_empty());
                if used_indexes.len() > 1 {
                    let sort_index = used_indexes
                        .pop()
                        .ok_or_else(|| {
                            vellumdb_core::Error::code(ErrorCode::Internal)
                        })?;
                    used_indexes.clear();
                    used_indexes.push(sort_index);
                }
                if is_sparse {
                    // A sparse index may exclude documents, so it cannot
                    // stand in for a sorted view of the whole collection.
                    used_indexes.clear();
                }
                return Ok(IndexUsage {
                    supports_filter: false,
                    supports_sort: !used_indexes.is_empty(),
                    sorted: false,
                });
            }

            can_use_for_filter &= supports_filter;
            can_use_for_sort |= supports_sort;
        }

        let mut sorted = false;
        if can_use_for_filter {
            sorted = sort_ors(root, variable, used_indexes);
        }

        Ok(IndexUsage {
            supports_filter: can_use_for_filter,
            supports_sort: can_use_for_sort,
            sorted,
        })
    }

    /// Pick the best index for a pure sort condition (no filter).
    ///
    /// Only non-sparse, sorted indexes qualify. Returns `(false, found)`
    /// and the number of covered sort attributes of the winner.
    pub fn get_index_for_sort_condition(
        &self,
        collection_name: &str,
        sort_condition: &SortCondition,
        variable: &str,
        items_in_index: u64,
        used_indexes: &mut Vec<IndexHandle>,
    ) -> Result<(bool, bool, usize)> {
        let mut covered_attributes = 0;

        if sort_condition.is_empty()
            || !sort_condition.is_only_attribute_access()
            || !sort_condition.is_unidirectional()
        {
            // No sort condition an index could support.
            return Ok((false, false, covered_attributes));
        }

        let mut best: Option<Arc<Index>> = None;
        let mut best_cost = 0.0;
        for index in self.indexes_for_collection(collection_name)? {
            if index.sparse() {
                // A sparse index may exclude documents, so it cannot give a
                // sorted view of the entire collection.
                continue;
            }
            let costs = index.supports_sort_condition(sort_condition, variable, items_in_index);
            if !(index.is_sorted() && costs.supported) {
                continue;
            }
            if best.is_none() || costs.estimated_cost < best_cost {
                best_cost = costs.estimated_cost;
                covered_attributes = costs.covered_attributes;
                best = Some(index);
            }
        }

        let found = best.is_some();
        if let Some(best) = best {
            used_indexes.push(IndexHandle::new(best));
        }
        Ok((false, found, covered_attributes))
    }

    /// Capability passthrough: ask an index whether it supports a filter.
    pub fn supports_filter_condition(
        &self,
        index_handle: Option<&IndexHandle>,
        condition: &Condition,
        variable: &str,
        items_in_index: u64,
    ) -> Result<FilterCosts> {
        let handle = index_handle.ok_or_else(|| {
            vellumdb_core::Error::with_message(
                ErrorCode::BadParameter,
                "the index id cannot be empty",
            )
        })?;
        Ok(handle.index().supports_filter_condition(condition, variable, items_in_index))
    }

    /// The fields of an index plus its `(is_sorted, is_sparse)` flags.
    pub fn get_index_features(
        &self,
        index_handle: Option<&IndexHandle>,
    ) -> Result<(Vec<Vec<String>>, bool, bool)> {
        let handle = index_handle.ok_or_else(|| {
            vellumdb_core::Error::with_message(
                ErrorCode::BadParameter,
                "the index id cannot be empty",
            )
        })?;
        let index = handle.index();
        Ok((index.fields().to_vec(), index.is_sorted(), index.sparse()))
    }
}
