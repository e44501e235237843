//! Document identity codec.
//!
//! A document is addressed either by its full id `<collection>/<key>` or by
//! its `_key` alone when the collection is known. On the wire the `_id`
//! attribute may appear as a literal string or as a custom-tagged 9-byte blob
//! carrying the collection id; decoding the blob form requires a name
//! resolver and a `_key` source.

use crate::error::{Error, ErrorCode, Result};
use crate::ids::{CollectionId, Revision};
use crate::value::Value;

/// Reserved attribute: the document key.
pub const ATTR_KEY: &str = "_key";
/// Reserved attribute: the full document id.
pub const ATTR_ID: &str = "_id";
/// Reserved attribute: the document revision.
pub const ATTR_REV: &str = "_rev";
/// Output-only attribute: the revision replaced by a write.
pub const ATTR_OLD_REV: &str = "_oldRev";
/// Output-only attribute: the previous document body.
pub const ATTR_OLD: &str = "old";
/// Output-only attribute: the new document body.
pub const ATTR_NEW: &str = "new";

/// Tag byte of the custom-encoded `_id` blob.
pub const ID_CUSTOM_TAG: u8 = 0xf3;

/// Resolves collection names and ids.
///
/// Implemented by the database handle; the codec only needs the lookup
/// surface. `collection_name_cluster` is the cluster-aware variant a
/// coordinator uses, where the collection may exist only in the plan.
pub trait CollectionNameResolver {
    /// Resolve a locally known collection name to its id.
    fn collection_id(&self, name: &str) -> Option<CollectionId>;

    /// Resolve a collection id to its locally known name.
    fn collection_name(&self, cid: CollectionId) -> Option<String>;

    /// Cluster-aware name lookup; defaults to the local lookup.
    fn collection_name_cluster(&self, cid: CollectionId) -> Option<String> {
        self.collection_name(cid)
    }
}

/// Encode a collection id as a custom-tagged `_id` blob.
///
/// Byte 0 is the tag, bytes 1..9 the little-endian collection id.
#[must_use]
pub fn encode_custom_id(cid: CollectionId) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(9);
    bytes.push(ID_CUSTOM_TAG);
    bytes.extend_from_slice(&cid.as_u64().to_le_bytes());
    bytes
}

/// Decode a custom-tagged `_id` blob back into a collection id.
#[must_use]
pub fn decode_custom_id(bytes: &[u8]) -> Option<CollectionId> {
    if bytes.len() != 9 || bytes[0] != ID_CUSTOM_TAG {
        return None;
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[1..9]);
    Some(CollectionId::new(u64::from_le_bytes(raw)))
}

/// Extract the `_key` from a value.
///
/// From an object this is the `_key` attribute, which must be a string;
/// from a string it is the whole string, or the suffix after the first `/`
/// if one is present. Every failure yields the empty string, which callers
/// translate into the appropriate key/handle error.
#[must_use]
pub fn extract_key(value: &Value) -> String {
    match value {
        Value::Object(_) => match value.get(ATTR_KEY) {
            Some(Value::String(key)) => key.clone(),
            _ => String::new(),
        },
        Value::String(s) => match s.find('/') {
            Some(pos) => s[pos + 1..].to_string(),
            None => s.clone(),
        },
        _ => String::new(),
    }
}

/// Extract the `_id` from a value and render it as `<collection>/<key>`.
///
/// If `value` is an object its `_id` attribute is taken; a plain string is
/// returned as-is. Otherwise the attribute must be a custom-tagged blob: the
/// embedded collection id is resolved through `resolver` and the `_key` is
/// searched in `value` first, then in `base`. A missing or non-string `_key`
/// is a hard `DocumentTypeInvalid` failure -- the codec never fabricates
/// keys.
pub fn extract_id_string(
    resolver: &dyn CollectionNameResolver,
    value: &Value,
    base: Option<&Value>,
) -> Result<String> {
    let id = if value.is_object() { value.get(ATTR_ID).unwrap_or(&Value::Null) } else { value };

    if let Some(id) = id.as_str() {
        return Ok(id.to_string());
    }

    let Some(cid) = id.as_custom().and_then(decode_custom_id) else {
        return Err(Error::code(ErrorCode::DocumentTypeInvalid));
    };

    let key = value
        .get(ATTR_KEY)
        .or_else(|| base.and_then(|b| b.get(ATTR_KEY)))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::code(ErrorCode::DocumentTypeInvalid))?;

    let name = resolver
        .collection_name_cluster(cid)
        .ok_or_else(|| Error::with_message(ErrorCode::Internal, format!("unknown collection id {cid}")))?;

    Ok(format!("{name}/{key}"))
}

/// Extract the `_rev` of an object as an opaque token.
///
/// Accepts a string or an integer token; anything else (including a missing
/// attribute) yields `None`.
#[must_use]
pub fn extract_revision(value: &Value) -> Option<Revision> {
    match value.get(ATTR_REV) {
        Some(Value::String(token)) => Some(Revision::new(token.clone())),
        Some(Value::Int(token)) => Some(Revision::new(token.to_string())),
        _ => None,
    }
}

/// Build the identity object reported for a write: `_id`, `_key`, `_rev`,
/// optionally `_oldRev`, `old` and `new`.
pub fn build_document_identity(
    resolver: &dyn CollectionNameResolver,
    cid: CollectionId,
    key: &str,
    rev: &Revision,
    old_rev: Option<&Revision>,
    old: Option<&Value>,
    new: Option<&Value>,
) -> Result<Value> {
    let name = resolver
        .collection_name(cid)
        .ok_or_else(|| Error::with_message(ErrorCode::Internal, format!("unknown collection id {cid}")))?;

    let mut attrs = vec![
        (ATTR_ID.to_string(), Value::String(format!("{name}/{key}"))),
        (ATTR_KEY.to_string(), Value::String(key.to_string())),
        (ATTR_REV.to_string(), Value::String(rev.as_str().to_string())),
    ];
    if let Some(old_rev) = old_rev {
        attrs.push((ATTR_OLD_REV.to_string(), Value::String(old_rev.as_str().to_string())));
    }
    if let Some(old) = old {
        attrs.push((ATTR_OLD.to_string(), old.clone()));
    }
    if let Some(new) = new {
        attrs.push((ATTR_NEW.to_string(), new.clone()));
    }
    Ok(Value::object(attrs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapResolver {
        by_id: HashMap<u64, String>,
    }

    impl MapResolver {
        fn new(entries: &[(u64, &str)]) -> Self {
            Self { by_id: entries.iter().map(|(id, n)| (*id, (*n).to_string())).collect() }
        }
    }

    impl CollectionNameResolver for MapResolver {
        fn collection_id(&self, name: &str) -> Option<CollectionId> {
            self.by_id
                .iter()
                .find(|(_, n)| n.as_str() == name)
                .map(|(id, _)| CollectionId::new(*id))
        }

        fn collection_name(&self, cid: CollectionId) -> Option<String> {
            self.by_id.get(&cid.as_u64()).cloned()
        }
    }

    #[test]
    fn test_extract_key_from_handle_string() {
        assert_eq!(extract_key(&Value::from("users/42")), "42");
        assert_eq!(extract_key(&Value::from("42")), "42");
    }

    #[test]
    fn test_extract_key_from_object() {
        let doc = Value::object([("_key", Value::from("42"))]);
        assert_eq!(extract_key(&doc), "42");

        // Non-string keys fail with the empty string.
        let doc = Value::object([("_key", Value::from(7i64))]);
        assert_eq!(extract_key(&doc), "");
        assert_eq!(extract_key(&Value::from(7i64)), "");
    }

    #[test]
    fn test_extract_id_string_literal() {
        let resolver = MapResolver::new(&[]);
        let doc = Value::object([("_id", Value::from("users/abc"))]);
        assert_eq!(extract_id_string(&resolver, &doc, None).unwrap(), "users/abc");
    }

    #[test]
    fn test_extract_id_string_custom_blob() {
        let resolver = MapResolver::new(&[(0x123, "users")]);
        let doc = Value::object([
            ("_id", Value::Custom(encode_custom_id(CollectionId::new(0x123)))),
            ("_key", Value::from("abc")),
        ]);
        assert_eq!(extract_id_string(&resolver, &doc, None).unwrap(), "users/abc");
    }

    #[test]
    fn test_extract_id_string_key_from_base() {
        let resolver = MapResolver::new(&[(9, "orders")]);
        let id = Value::Custom(encode_custom_id(CollectionId::new(9)));
        let base = Value::object([("_key", Value::from("77"))]);
        assert_eq!(extract_id_string(&resolver, &id, Some(&base)).unwrap(), "orders/77");
    }

    #[test]
    fn test_extract_id_string_missing_key_is_fatal() {
        let resolver = MapResolver::new(&[(9, "orders")]);
        let doc = Value::object([("_id", Value::Custom(encode_custom_id(CollectionId::new(9))))]);
        let err = extract_id_string(&resolver, &doc, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::DocumentTypeInvalid);
    }

    #[test]
    fn test_extract_id_string_rejects_bad_tag() {
        let resolver = MapResolver::new(&[]);
        let doc = Value::object([
            ("_id", Value::Custom(vec![0x00, 1, 2, 3, 4, 5, 6, 7, 8])),
            ("_key", Value::from("x")),
        ]);
        let err = extract_id_string(&resolver, &doc, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::DocumentTypeInvalid);
    }

    #[test]
    fn test_build_document_identity() {
        let resolver = MapResolver::new(&[(5, "users")]);
        let rev = Revision::new("R2");
        let old_rev = Revision::new("R1");
        let identity = build_document_identity(
            &resolver,
            CollectionId::new(5),
            "42",
            &rev,
            Some(&old_rev),
            None,
            None,
        )
        .unwrap();

        assert_eq!(identity.get(ATTR_ID).and_then(Value::as_str), Some("users/42"));
        assert_eq!(identity.get(ATTR_KEY).and_then(Value::as_str), Some("42"));
        assert_eq!(identity.get(ATTR_REV).and_then(Value::as_str), Some("R2"));
        assert_eq!(identity.get(ATTR_OLD_REV).and_then(Value::as_str), Some("R1"));
        assert!(identity.get(ATTR_OLD).is_none());
    }

    #[test]
    fn test_custom_id_codec_round_trip() {
        let cid = CollectionId::new(0x0102_0304_0506_0708);
        let bytes = encode_custom_id(cid);
        assert_eq!(bytes.len(), 9);
        assert_eq!(bytes[0], ID_CUSTOM_TAG);
        assert_eq!(decode_custom_id(&bytes), Some(cid));
        assert_eq!(decode_custom_id(&bytes[..8]), None);
    }
}
