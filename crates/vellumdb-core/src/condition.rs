//! Filter and sort condition trees.
//!
//! The planner consumes filters in disjunctive normal form: an outer `OR`
//! whose members are `AND` nodes over binary comparisons between an attribute
//! access on one bound variable and a constant. This module only defines the
//! tree shapes and their accessors; normalisation and index selection live in
//! the façade crate.

use crate::value::Value;

/// An attribute path: the name parts of a (possibly nested) attribute access.
pub type AttributePath = Vec<String>;

/// Build an attribute path from dotted notation (`"a.b.c"`).
#[must_use]
pub fn attribute_path(dotted: &str) -> AttributePath {
    dotted.split('.').map(str::to_string).collect()
}

/// Render an attribute path in dotted notation.
#[must_use]
pub fn path_to_string(path: &[String]) -> String {
    path.join(".")
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `IN`
    In,
    /// `NOT IN`
    NotIn,
}

impl CmpOp {
    /// Mirror the operator for swapped operands (`a < b` ⇔ `b > a`).
    ///
    /// `IN`/`NOT IN` have no mirrored form.
    #[must_use]
    pub const fn mirrored(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Eq,
            Self::Ne => Self::Ne,
            Self::Lt => Self::Gt,
            Self::Le => Self::Ge,
            Self::Gt => Self::Lt,
            Self::Ge => Self::Le,
            Self::In | Self::NotIn => return None,
        })
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// An attribute access on a bound variable.
    Attribute {
        /// The bound variable name.
        variable: String,
        /// The attribute path below the variable.
        path: AttributePath,
    },
    /// A constant value.
    Constant(Value),
}

impl Operand {
    /// Attribute-access operand constructor.
    #[must_use]
    pub fn attribute(variable: impl Into<String>, path: AttributePath) -> Self {
        Self::Attribute { variable: variable.into(), path }
    }

    /// Constant operand constructor.
    #[must_use]
    pub fn constant(value: impl Into<Value>) -> Self {
        Self::Constant(value.into())
    }

    /// Returns `true` for constants.
    #[must_use]
    pub const fn is_constant(&self) -> bool {
        matches!(self, Self::Constant(_))
    }
}

/// A binary comparison between two operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    /// The operator.
    pub op: CmpOp,
    /// Left-hand side.
    pub lhs: Operand,
    /// Right-hand side.
    pub rhs: Operand,
}

/// A comparison normalised to attribute-on-the-left form.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessedComparison<'a> {
    /// The operator as if the attribute were the left operand.
    pub op: CmpOp,
    /// The attribute path below the variable.
    pub path: &'a AttributePath,
    /// The constant side.
    pub value: &'a Value,
}

impl Comparison {
    /// Normalise this comparison to attribute-on-the-left form for the given
    /// variable.
    ///
    /// Returns `None` when neither side is an attribute access on `variable`,
    /// when the other side is not constant, or when an `IN` has its attribute
    /// on the right (there is no mirrored form for `IN`).
    #[must_use]
    pub fn accessed_for(&self, variable: &str) -> Option<AccessedComparison<'_>> {
        if let Operand::Attribute { variable: var, path } = &self.lhs {
            if var == variable {
                if let Operand::Constant(value) = &self.rhs {
                    return Some(AccessedComparison { op: self.op, path, value });
                }
                return None;
            }
        }
        if let Operand::Attribute { variable: var, path } = &self.rhs {
            if var == variable {
                if let Operand::Constant(value) = &self.lhs {
                    let op = self.op.mirrored()?;
                    return Some(AccessedComparison { op, path, value });
                }
            }
        }
        None
    }
}

/// A filter condition tree.
///
/// After DNF transformation the root is `Or(And(Cmp…), …)`; arbitrary nesting
/// is representable but the planner refuses shapes it cannot handle.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// N-ary disjunction.
    Or(Vec<Condition>),
    /// N-ary conjunction.
    And(Vec<Condition>),
    /// A leaf comparison.
    Cmp(Comparison),
}

impl Condition {
    /// Leaf comparison constructor.
    #[must_use]
    pub fn cmp(op: CmpOp, lhs: Operand, rhs: Operand) -> Self {
        Self::Cmp(Comparison { op, lhs, rhs })
    }

    /// Convenience: `variable.path <op> constant`.
    #[must_use]
    pub fn attr_cmp(
        op: CmpOp,
        variable: impl Into<String>,
        path: &str,
        value: impl Into<Value>,
    ) -> Self {
        Self::cmp(op, Operand::attribute(variable, attribute_path(path)), Operand::constant(value))
    }

    /// The members of an `Or`/`And` node; a leaf has none.
    #[must_use]
    pub fn members(&self) -> &[Condition] {
        match self {
            Self::Or(members) | Self::And(members) => members,
            Self::Cmp(_) => &[],
        }
    }

    /// Mutable members of an `Or`/`And` node.
    pub fn members_mut(&mut self) -> &mut Vec<Condition> {
        match self {
            Self::Or(members) | Self::And(members) => members,
            Self::Cmp(_) => unreachable!("leaf conditions have no members"),
        }
    }

    /// The comparison, if this is a leaf.
    #[must_use]
    pub const fn as_cmp(&self) -> Option<&Comparison> {
        match self {
            Self::Cmp(cmp) => Some(cmp),
            _ => None,
        }
    }

    /// Returns `true` if this `And` node consists solely of equality matches
    /// (`==`) on the given variable.
    #[must_use]
    pub fn is_only_equality_match(&self, variable: &str) -> bool {
        let Self::And(members) = self else {
            return false;
        };
        !members.is_empty()
            && members.iter().all(|m| {
                m.as_cmp()
                    .and_then(|c| c.accessed_for(variable))
                    .is_some_and(|a| a.op == CmpOp::Eq)
            })
    }
}

/// One field of a sort condition.
#[derive(Debug, Clone, PartialEq)]
pub struct SortField {
    /// The bound variable.
    pub variable: String,
    /// The attribute path below the variable.
    pub path: AttributePath,
    /// Sort direction.
    pub ascending: bool,
}

/// A sort condition over attribute accesses on one variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SortCondition {
    fields: Vec<SortField>,
    only_attribute_access: bool,
}

impl SortCondition {
    /// A sort over plain attribute accesses.
    #[must_use]
    pub fn new(fields: Vec<SortField>) -> Self {
        Self { fields, only_attribute_access: true }
    }

    /// A sort that also contains computed expressions.
    ///
    /// Such a sort can never be pushed into an index; the fields are kept for
    /// cost estimation only.
    #[must_use]
    pub fn with_expressions(fields: Vec<SortField>) -> Self {
        Self { fields, only_attribute_access: false }
    }

    /// The empty sort condition.
    #[must_use]
    pub fn empty() -> Self {
        Self { fields: Vec::new(), only_attribute_access: true }
    }

    /// Convenience constructor: ascending sort over dotted paths.
    #[must_use]
    pub fn ascending(variable: &str, paths: &[&str]) -> Self {
        Self::new(
            paths
                .iter()
                .map(|p| SortField {
                    variable: variable.to_string(),
                    path: attribute_path(p),
                    ascending: true,
                })
                .collect(),
        )
    }

    /// The sort fields.
    #[must_use]
    pub fn fields(&self) -> &[SortField] {
        &self.fields
    }

    /// Returns `true` if there is nothing to sort.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of sort attributes.
    #[must_use]
    pub fn num_attributes(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if every field sorts in the same direction.
    #[must_use]
    pub fn is_unidirectional(&self) -> bool {
        !self.fields.is_empty()
            && self.fields.iter().all(|f| f.ascending == self.fields[0].ascending)
    }

    /// Returns `true` if every field sorts ascending.
    #[must_use]
    pub fn is_ascending(&self) -> bool {
        self.fields.iter().all(|f| f.ascending)
    }

    /// Returns `true` if the sort consists solely of attribute accesses.
    #[must_use]
    pub const fn is_only_attribute_access(&self) -> bool {
        self.only_attribute_access
    }

    /// Number of leading sort attributes covered by the given index fields,
    /// in order.
    #[must_use]
    pub fn covered_attributes(&self, variable: &str, index_fields: &[AttributePath]) -> usize {
        let mut covered = 0;
        for (field, index_field) in self.fields.iter().zip(index_fields.iter()) {
            if field.variable != variable || &field.path != index_field {
                break;
            }
            covered += 1;
        }
        covered
    }
}
