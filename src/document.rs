// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document validation and payload assembly.
//!
//! Raw caller values are screened here before anything touches a revision
//! tree: the value must be a JSON object, `_id` must be a usable string when
//! required, and top-level underscore fields must come from the reserved
//! allow-list. Validation failures never mutate engine state.
//!
//! The stored body is the caller's non-underscore fields only; `_id`, `_rev`
//! and `_deleted` are reattached when a document is read back.

use serde_json::{json, Map, Value};

use crate::error::Error;
use crate::revision::RevId;

/// Reserved top-level fields accepted on input. Anything else starting with
/// an underscore fails the write with `doc_validation`.
pub const RESERVED_FIELDS: [&str; 6] = [
    "_id",
    "_rev",
    "_deleted",
    "_revs_info",
    "_conflicts",
    "_local_seq",
];

/// A validated, normalized edit extracted from a raw caller value.
#[derive(Debug, Clone)]
pub(crate) struct ParsedDoc {
    /// Caller-supplied id, if any.
    pub id: Option<String>,
    /// Caller-supplied revision, if any.
    pub rev: Option<RevId>,
    /// `_deleted: true` was present.
    pub deleted: bool,
    /// Non-underscore caller fields.
    pub body: Map<String, Value>,
}

/// Validate and normalize a raw document value.
///
/// `require_id` distinguishes `put`/`remove` (id mandatory) from `post` and
/// `bulk_docs` slots (id generated later when absent).
pub(crate) fn parse_document(raw: &Value, require_id: bool) -> Result<ParsedDoc, Error> {
    let fields = raw.as_object().ok_or(Error::NotAnObject)?;

    let id = match fields.get("_id") {
        None if require_id => return Err(Error::MissingId),
        None => None,
        Some(value) => Some(validate_id(value)?),
    };

    let mut rev = None;
    let mut deleted = false;
    let mut body = Map::new();

    for (key, value) in fields {
        match key.as_str() {
            "_id" => {}
            "_rev" => {
                let s = value
                    .as_str()
                    .ok_or_else(|| Error::bad_request("Invalid rev format"))?;
                rev = Some(RevId::parse(s)?);
            }
            "_deleted" => {
                deleted = value
                    .as_bool()
                    .ok_or_else(|| Error::bad_request("_deleted must be a boolean"))?;
            }
            // Output-only reserved fields are stripped on input.
            "_revs_info" | "_conflicts" | "_local_seq" => {}
            k if k.starts_with('_') => {
                return Err(Error::DocValidation { field: k.to_string() });
            }
            _ => {
                body.insert(key.clone(), value.clone());
            }
        }
    }

    Ok(ParsedDoc { id, rev, deleted, body })
}

/// Check an `_id` value: must be a non-empty string not starting with `_`.
pub(crate) fn validate_id(value: &Value) -> Result<String, Error> {
    let s = value.as_str().ok_or(Error::InvalidId)?;
    if s.is_empty() {
        return Err(Error::InvalidId);
    }
    if s.starts_with('_') {
        return Err(Error::ReservedId);
    }
    Ok(s.to_string())
}

/// Loose extraction for `remove`: only `_id` and `_rev` matter, any other
/// fields on the passed document are ignored rather than validated.
pub(crate) fn extract_id_rev(raw: &Value) -> Result<(String, RevId), Error> {
    let fields = raw.as_object().ok_or(Error::NotAnObject)?;
    let id = match fields.get("_id") {
        None => return Err(Error::MissingId),
        Some(value) => validate_id(value)?,
    };
    let rev = match fields.get("_rev") {
        None => return Err(Error::bad_request("_rev is required to remove a document")),
        Some(value) => {
            let s = value
                .as_str()
                .ok_or_else(|| Error::bad_request("Invalid rev format"))?;
            RevId::parse(s)?
        }
    };
    Ok((id, rev))
}

/// Reattach identity fields to a stored live body.
pub(crate) fn assemble(id: &str, rev: &RevId, body: &Map<String, Value>) -> Value {
    let mut out = body.clone();
    out.insert("_id".into(), Value::String(id.to_string()));
    out.insert("_rev".into(), Value::String(rev.to_string()));
    Value::Object(out)
}

/// The tombstone stub: exactly `{_id, _rev, _deleted: true}`.
pub(crate) fn tombstone(id: &str, rev: &RevId) -> Value {
    json!({
        "_id": id,
        "_rev": rev.to_string(),
        "_deleted": true,
    })
}

/// Generate a document id for `post`-style creates. Same 32-char hex form
/// as instance ids and random digests.
pub(crate) fn generate_doc_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_document() {
        let doc = json!({"_id": "foo", "a": 1, "nested": {"b": true}});
        let parsed = parse_document(&doc, true).unwrap();
        assert_eq!(parsed.id.as_deref(), Some("foo"));
        assert!(parsed.rev.is_none());
        assert!(!parsed.deleted);
        assert_eq!(parsed.body.len(), 2);
        assert_eq!(parsed.body["a"], json!(1));
    }

    #[test]
    fn test_parse_rejects_non_objects() {
        for raw in [json!([]), json!("str"), json!(12), json!(true), Value::Null] {
            assert_eq!(parse_document(&raw, false).unwrap_err(), Error::NotAnObject);
        }
    }

    #[test]
    fn test_parse_missing_id() {
        let doc = json!({"a": 1});
        assert_eq!(parse_document(&doc, true).unwrap_err(), Error::MissingId);
        // post-style: absent id is fine
        let parsed = parse_document(&doc, false).unwrap();
        assert!(parsed.id.is_none());
    }

    #[test]
    fn test_parse_bad_ids() {
        for bad in [json!({}), json!([]), json!(12), json!(true), Value::Null, json!("")] {
            let doc = json!({"_id": bad});
            assert_eq!(parse_document(&doc, true).unwrap_err(), Error::InvalidId);
        }
        let doc = json!({"_id": "_underscored_id"});
        assert_eq!(parse_document(&doc, true).unwrap_err(), Error::ReservedId);
    }

    #[test]
    fn test_parse_reserved_field_rejected() {
        let doc = json!({"_id": "foo", "_zing": 11});
        assert_eq!(
            parse_document(&doc, true).unwrap_err(),
            Error::DocValidation { field: "_zing".into() }
        );
    }

    #[test]
    fn test_parse_allow_listed_fields_stripped() {
        let doc = json!({
            "_id": "foo",
            "_revs_info": [],
            "_conflicts": [],
            "_local_seq": 9,
            "kept": true,
        });
        let parsed = parse_document(&doc, true).unwrap();
        assert_eq!(parsed.body.len(), 1);
        assert!(parsed.body.contains_key("kept"));
    }

    #[test]
    fn test_parse_rev_and_deleted() {
        let doc = json!({"_id": "foo", "_rev": "3-abc", "_deleted": true});
        let parsed = parse_document(&doc, true).unwrap();
        assert_eq!(parsed.rev.unwrap().to_string(), "3-abc");
        assert!(parsed.deleted);
    }

    #[test]
    fn test_parse_bad_rev_and_deleted() {
        let doc = json!({"_id": "foo", "_rev": "nonsense"});
        assert_eq!(parse_document(&doc, true).unwrap_err().status(), 400);

        let doc = json!({"_id": "foo", "_rev": 3});
        assert_eq!(parse_document(&doc, true).unwrap_err().status(), 400);

        let doc = json!({"_id": "foo", "_deleted": "yes"});
        assert_eq!(parse_document(&doc, true).unwrap_err().status(), 400);
    }

    #[test]
    fn test_extract_id_rev() {
        let doc = json!({"_id": "foo", "_rev": "1-abc", "junk": 1, "_zing": 2});
        let (id, rev) = extract_id_rev(&doc).unwrap();
        assert_eq!(id, "foo");
        assert_eq!(rev.to_string(), "1-abc");
    }

    #[test]
    fn test_extract_requires_rev() {
        let doc = json!({"_id": "foo"});
        let err = extract_id_rev(&doc).unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.name(), "bad_request");
    }

    #[test]
    fn test_assemble_reattaches_identity() {
        let rev = RevId::parse("1-abc").unwrap();
        let body = json!({"a": 1}).as_object().cloned().unwrap();
        let doc = assemble("foo", &rev, &body);
        assert_eq!(doc["_id"], "foo");
        assert_eq!(doc["_rev"], "1-abc");
        assert_eq!(doc["a"], 1);
        assert!(doc.get("_deleted").is_none());
    }

    #[test]
    fn test_tombstone_shape() {
        let rev = RevId::parse("2-b").unwrap();
        let stub = tombstone("foo", &rev);
        let fields = stub.as_object().unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(stub["_id"], "foo");
        assert_eq!(stub["_rev"], "2-b");
        assert_eq!(stub["_deleted"], true);
    }

    #[test]
    fn test_generated_ids_unique() {
        assert_ne!(generate_doc_id(), generate_doc_id());
    }

    #[test]
    fn test_generated_ids_are_simple_hex() {
        let id = generate_doc_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')));
    }
}
