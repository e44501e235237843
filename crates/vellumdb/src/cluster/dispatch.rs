//! Shard-dispatch RPC surface.
//!
//! Coordinators route CRUD through [`ShardDispatch::send`]; shard leaders
//! replay writes to followers through [`ShardDispatch::send_to_server`]. The
//! wire-level HTTP client behind the trait is out of scope and supplied by
//! the embedder (or a mock in tests).

use std::collections::BTreeMap;
use std::time::Duration;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Unreserved characters stay literal; everything else is percent-encoded.
const PATH_SEGMENT: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

use vellumdb_core::{OperationOptions, Result};

use crate::cluster::response::ResponseCode;

/// Header injected when the sender already holds the collection locks and
/// the receiving server must not re-lock.
pub const NOLOCK_HEADER: &str = "x-vellum-nolock";

/// Request methods used by the dispatch paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl RequestMethod {
    /// The method name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// A request to a shard server.
#[derive(Debug, Clone)]
pub struct ShardRequest {
    /// Request method.
    pub method: RequestMethod,
    /// URL path (already encoded).
    pub path: String,
    /// Query parameters.
    pub query: Vec<(String, String)>,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body, if any.
    pub body: Option<String>,
    /// How long the sender is willing to wait.
    pub timeout: Duration,
}

impl ShardRequest {
    /// A request with no query, headers or body.
    #[must_use]
    pub fn new(method: RequestMethod, path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout,
        }
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Set a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Append the option flags as query parameters.
    #[must_use]
    pub fn with_operation_options(mut self, options: &OperationOptions) -> Self {
        let flags = [
            ("waitForSync", options.wait_for_sync),
            ("ignoreRevs", options.ignore_revs),
            ("returnOld", options.return_old),
            ("returnNew", options.return_new),
            ("silent", options.silent),
        ];
        for (name, value) in flags {
            self.query.push((name.to_string(), value.to_string()));
        }
        self
    }
}

/// A response from a shard server.
#[derive(Debug, Clone)]
pub struct ShardResponse {
    /// Response code.
    pub code: ResponseCode,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Raw response body.
    pub body: String,
}

impl ShardResponse {
    /// A response with no headers.
    #[must_use]
    pub fn new(code: ResponseCode, body: impl Into<String>) -> Self {
        Self { code, headers: BTreeMap::new(), body: body.into() }
    }
}

/// The shard-routing RPC.
///
/// `send` routes a request to the shard responsible for the document it
/// names; `send_to_server` addresses one specific server, which is how
/// follower replication works.
pub trait ShardDispatch: Send + Sync {
    /// Route a request through the shard routing layer.
    fn send(&self, request: ShardRequest) -> Result<ShardResponse>;

    /// Send a request to a specific server.
    fn send_to_server(&self, server: &str, request: ShardRequest) -> Result<ShardResponse>;
}

/// Percent-encode a path segment.
#[must_use]
pub fn url_encode(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// `/_db/<db>/_api/document/<collection>`
#[must_use]
pub fn document_path(database: &str, collection: &str) -> String {
    format!("/_db/{}/_api/document/{}", url_encode(database), url_encode(collection))
}

/// `/_db/<db>/_api/document/<collection>/<key>`
#[must_use]
pub fn document_key_path(database: &str, collection: &str, key: &str) -> String {
    format!("{}/{}", document_path(database, collection), url_encode(key))
}

/// `/_db/<db>/_api/collection/<collection>/<suffix>`
#[must_use]
pub fn collection_path(database: &str, collection: &str, suffix: &str) -> String {
    format!(
        "/_db/{}/_api/collection/{}/{}",
        url_encode(database),
        url_encode(collection),
        suffix
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_encoded() {
        assert_eq!(document_path("_system", "users"), "/_db/_system/_api/document/users");
        assert_eq!(
            document_key_path("db", "a b", "k/1"),
            "/_db/db/_api/document/a%20b/k%2F1"
        );
        assert_eq!(
            collection_path("db", "users", "truncate"),
            "/_db/db/_api/collection/users/truncate"
        );
    }

    #[test]
    fn test_operation_options_query_flags() {
        let mut options = OperationOptions::new();
        options.wait_for_sync = true;
        options.return_new = true;
        let request =
            ShardRequest::new(RequestMethod::Post, "/x", Duration::from_secs(1))
                .with_operation_options(&options);

        let get = |name: &str| {
            request.query.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
        };
        assert_eq!(get("waitForSync"), Some("true"));
        assert_eq!(get("returnNew"), Some("true"));
        assert_eq!(get("silent"), Some("false"));
    }
}
