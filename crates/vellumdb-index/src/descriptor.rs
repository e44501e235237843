//! Index descriptors.
//!
//! A descriptor carries everything the planner needs to reason about an
//! index without touching its entries: type, fields, uniqueness and
//! sparseness. Descriptors also travel over the wire, so they convert to and
//! from tagged-tree values.

use serde::{Deserialize, Serialize};

use vellumdb_core::{attribute_path, path_to_string, AttributePath, IndexId, Value};

/// The fixed set of index kinds.
///
/// The capability surface is small; new kinds extend this enum and the
/// dispatch in the index module rather than introducing open subtyping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    /// The always-present primary index over `_key`.
    Primary,
    /// The edge index over `_from`/`_to` of an edge collection.
    Edge,
    /// Hash index: equality lookups only.
    Hash,
    /// Skiplist index: sorted, supports ranges and sort pushdown.
    Skiplist,
    /// Engine-backed persistent index; planner-wise behaves like a skiplist.
    Persistent,
    /// Fulltext index; opaque to the planner.
    Fulltext,
}

impl IndexType {
    /// The declared type string used in descriptors.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Edge => "edge",
            Self::Hash => "hash",
            Self::Skiplist => "skiplist",
            Self::Persistent => "persistent",
            Self::Fulltext => "fulltext",
        }
    }

    /// Look up a kind by its declared type string.
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        Some(match name {
            "primary" => Self::Primary,
            "edge" => Self::Edge,
            "hash" => Self::Hash,
            "skiplist" => Self::Skiplist,
            "persistent" => Self::Persistent,
            "fulltext" => Self::Fulltext,
            _ => return None,
        })
    }

    /// Whether entries of this kind are kept in sort order.
    #[must_use]
    pub const fn is_sorted(self) -> bool {
        matches!(self, Self::Skiplist | Self::Persistent)
    }
}

/// Static description of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDescriptor {
    /// The index id, unique within its collection.
    pub id: IndexId,
    /// The index kind.
    pub index_type: IndexType,
    /// Ordered indexed attribute paths.
    pub fields: Vec<AttributePath>,
    /// Whether the index rejects duplicate field tuples.
    pub unique: bool,
    /// Whether documents lacking an indexed attribute are left out.
    pub sparse: bool,
}

impl IndexDescriptor {
    /// Descriptor of the primary index.
    #[must_use]
    pub fn primary(id: IndexId) -> Self {
        Self {
            id,
            index_type: IndexType::Primary,
            fields: vec![attribute_path("_key")],
            unique: true,
            sparse: false,
        }
    }

    /// Descriptor of the edge index.
    #[must_use]
    pub fn edge(id: IndexId) -> Self {
        Self {
            id,
            index_type: IndexType::Edge,
            fields: vec![attribute_path("_from"), attribute_path("_to")],
            unique: false,
            sparse: false,
        }
    }

    /// Descriptor of a secondary index over dotted field paths.
    #[must_use]
    pub fn secondary(id: IndexId, index_type: IndexType, fields: &[&str]) -> Self {
        Self {
            id,
            index_type,
            fields: fields.iter().map(|f| attribute_path(f)).collect(),
            unique: false,
            sparse: false,
        }
    }

    /// Mark the index unique.
    #[must_use]
    pub const fn with_unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Mark the index sparse.
    #[must_use]
    pub const fn with_sparse(mut self, sparse: bool) -> Self {
        self.sparse = sparse;
        self
    }

    /// Serialise the descriptor as a tagged-tree value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::String(self.id.to_string())),
            ("type", Value::String(self.index_type.type_name().to_string())),
            (
                "fields",
                Value::Array(
                    self.fields.iter().map(|f| Value::String(path_to_string(f))).collect(),
                ),
            ),
            ("unique", Value::Bool(self.unique)),
            ("sparse", Value::Bool(self.sparse)),
        ])
    }

    /// Reconstruct a descriptor from a tagged-tree value.
    ///
    /// Used on coordinators, which see indexes only as descriptors in the
    /// cluster plan. Returns `None` when mandatory attributes are missing or
    /// the type string is unknown.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_str()?.parse::<u64>().ok()?;
        let index_type = IndexType::from_type_name(value.get("type")?.as_str()?)?;
        let fields = value
            .get("fields")?
            .as_array()?
            .iter()
            .map(|f| f.as_str().map(attribute_path))
            .collect::<Option<Vec<_>>>()?;
        let unique = matches!(value.get("unique"), Some(Value::Bool(true)));
        let sparse = matches!(value.get("sparse"), Some(Value::Bool(true)));
        Some(Self { id: IndexId::new(id), index_type, fields, unique, sparse })
    }
}

/// Validate the textual form of an index identifier.
#[must_use]
pub fn validate_index_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_round_trip() {
        for t in [
            IndexType::Primary,
            IndexType::Edge,
            IndexType::Hash,
            IndexType::Skiplist,
            IndexType::Persistent,
            IndexType::Fulltext,
        ] {
            assert_eq!(IndexType::from_type_name(t.type_name()), Some(t));
        }
        assert_eq!(IndexType::from_type_name("geo"), None);
    }

    #[test]
    fn test_descriptor_value_round_trip() {
        let desc = IndexDescriptor::secondary(IndexId::new(7), IndexType::Skiplist, &["a.b", "c"])
            .with_sparse(true);
        let value = desc.to_value();
        assert_eq!(IndexDescriptor::from_value(&value), Some(desc));
    }

    #[test]
    fn test_descriptor_from_value_rejects_unknown_type() {
        let mut value = IndexDescriptor::primary(IndexId::new(0)).to_value();
        if let Value::Object(attrs) = &mut value {
            attrs.insert("type".to_string(), Value::from("geo"));
        }
        assert_eq!(IndexDescriptor::from_value(&value), None);
    }

    #[test]
    fn test_validate_index_id() {
        assert!(validate_index_id("123"));
        assert!(!validate_index_id(""));
        assert!(!validate_index_id("12a"));
    }
}
