//! The coordinator CRUD pipeline.
//!
//! Coordinators never touch documents themselves; every operation is routed
//! through the shard-dispatch RPC and the response code is mapped back to an
//! error kind. Only the single-document variants are routed; array input is
//! not implemented on coordinators.
//!
//! Response-code mapping, as observed on the wire:
//!
//! | code | meaning |
//! |------|---------|
//! | 200  | success |
//! | 201  | success, write was synced |
//! | 202  | success |
//! | 400  | parse body for `errorNum`/`errorMessage` |
//! | 404  | document not found (collection not found for inserts) |
//! | 409  | unique constraint violated |
//! | 412  | revision conflict |
//! | else | internal |

use vellumdb_core::{
    extract_key, extract_revision, from_json_str, to_json_string, Error, ErrorCode,
    OperationOptions, Result, Value,
};

use crate::cluster::{
    collection_path, document_key_path, document_path, RequestMethod, ShardRequest,
    NOLOCK_HEADER,
};
use crate::cluster::response::ResponseCode;
use crate::transaction::result::OperationResult;
use crate::transaction::Transaction;

/// Header carrying the expected revision of a conditional operation.
const IF_MATCH: &str = "if-match";

impl Transaction {
    fn send_to_shard(&self, request: ShardRequest) -> Result<crate::cluster::ShardResponse> {
        let dispatch = self.database().dispatch().ok_or_else(|| {
            Error::with_message(ErrorCode::Internal, "no shard dispatch configured")
        })?;
        dispatch.send(request)
    }

    fn shard_request(&self, method: RequestMethod, path: String) -> ShardRequest {
        let mut request =
            ShardRequest::new(method, path, self.database().config().request_timeout);
        if let Some(shards) = self.nolock_shards() {
            let mut names: Vec<&str> = shards.iter().map(String::as_str).collect();
            names.sort_unstable();
            request = request.with_header(NOLOCK_HEADER, names.join(";"));
        }
        request
    }

    pub(crate) fn document_coordinator(
        &self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        if value.is_array() {
            // The multi-document variant is not implemented on coordinators.
            return Err(Error::code(ErrorCode::NotImplemented));
        }

        let key = extract_key(value);
        if key.is_empty() {
            return Ok(OperationResult::from_code(ErrorCode::DocumentKeyBad));
        }

        let mut request = self.shard_request(
            RequestMethod::Get,
            document_key_path(self.database().name(), collection, &key),
        );
        if !options.ignore_revs {
            if let Some(revision) = extract_revision(value) {
                request = request.with_header(IF_MATCH, revision.as_str().to_string());
            }
        }

        let response = self.send_to_shard(request)?;
        Ok(match response.code {
            ResponseCode::Ok | ResponseCode::PreconditionFailed => {
                let code = if response.code == ResponseCode::Ok {
                    ErrorCode::NoError
                } else {
                    ErrorCode::Conflict
                };
                match parse_shard_body(&response.body) {
                    Ok(payload) => OperationResult::with_payload(Some(payload), code, false),
                    Err(result) => result,
                }
            }
            ResponseCode::NotFound => OperationResult::from_code(ErrorCode::DocumentNotFound),
            _ => OperationResult::from_code(ErrorCode::Internal),
        })
    }

    pub(crate) fn insert_coordinator(
        &self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        if value.is_array() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }

        let request = self
            .shard_request(
                RequestMethod::Post,
                document_path(self.database().name(), collection),
            )
            .with_operation_options(options)
            .with_body(to_json_string(value)?);

        let response = self.send_to_shard(request)?;
        Ok(match response.code {
            ResponseCode::Accepted | ResponseCode::Created => {
                match parse_shard_body(&response.body) {
                    Ok(payload) => OperationResult::with_payload(
                        Some(payload),
                        ErrorCode::NoError,
                        response.code == ResponseCode::Created,
                    ),
                    Err(result) => result,
                }
            }
            ResponseCode::PreconditionFailed => OperationResult::from_code(ErrorCode::Conflict),
            ResponseCode::Bad => bad_shard_response(&response.body),
            ResponseCode::NotFound => OperationResult::from_code(ErrorCode::CollectionNotFound),
            ResponseCode::Conflict => {
                OperationResult::from_code(ErrorCode::UniqueConstraintViolated)
            }
            _ => OperationResult::from_code(ErrorCode::Internal),
        })
    }

    pub(crate) fn modify_coordinator(
        &self,
        collection: &str,
        new_value: &Value,
        options: &OperationOptions,
        is_patch: bool,
    ) -> Result<OperationResult> {
        if new_value.is_array() {
            return Err(Error::code(if is_patch {
                ErrorCode::NotImplemented
            } else {
                ErrorCode::DocumentTypeInvalid
            }));
        }

        let key = extract_key(new_value);
        if key.is_empty() {
            return Ok(OperationResult::from_code(ErrorCode::DocumentKeyBad));
        }

        let method = if is_patch { RequestMethod::Patch } else { RequestMethod::Put };
        let mut request = self
            .shard_request(
                method,
                document_key_path(self.database().name(), collection, &key),
            )
            .with_operation_options(options)
            .with_body(to_json_string(new_value)?);
        if !options.ignore_revs {
            if let Some(revision) = extract_revision(new_value) {
                request = request.with_header(IF_MATCH, revision.as_str().to_string());
            }
        }

        let response = self.send_to_shard(request)?;
        // 409 and 412 deliberately share the parse path with the success
        // codes: the shard still reports the document identity.
        Ok(match response.code {
            ResponseCode::Conflict
            | ResponseCode::PreconditionFailed
            | ResponseCode::Accepted
            | ResponseCode::Created => {
                let code = match response.code {
                    ResponseCode::Conflict => ErrorCode::UniqueConstraintViolated,
                    ResponseCode::PreconditionFailed => ErrorCode::Conflict,
                    _ => ErrorCode::NoError,
                };
                match parse_shard_body(&response.body) {
                    Ok(payload) => OperationResult::with_payload(
                        Some(payload),
                        code,
                        response.code == ResponseCode::Created,
                    ),
                    Err(result) => result,
                }
            }
            ResponseCode::Bad => bad_shard_response(&response.body),
            ResponseCode::NotFound => OperationResult::from_code(ErrorCode::DocumentNotFound),
            _ => OperationResult::from_code(ErrorCode::Internal),
        })
    }

    pub(crate) fn remove_coordinator(
        &self,
        collection: &str,
        value: &Value,
        options: &OperationOptions,
    ) -> Result<OperationResult> {
        if value.is_array() {
            return Err(Error::code(ErrorCode::NotImplemented));
        }

        let key = extract_key(value);
        if key.is_empty() {
            return Ok(OperationResult::from_code(ErrorCode::DocumentKeyBad));
        }

        let mut request = self
            .shard_request(
                RequestMethod::Delete,
                document_key_path(self.database().name(), collection, &key),
            )
            .with_operation_options(options);
        if !options.ignore_revs {
            if let Some(revision) = extract_revision(value) {
                request = request.with_header(IF_MATCH, revision.as_str().to_string());
            }
        }

        let response = self.send_to_shard(request)?;
        Ok(match response.code {
            ResponseCode::Ok | ResponseCode::Accepted | ResponseCode::PreconditionFailed => {
                let code = if response.code == ResponseCode::PreconditionFailed {
                    ErrorCode::Conflict
                } else {
                    ErrorCode::NoError
                };
                match parse_shard_body(&response.body) {
                    Ok(payload) => OperationResult::with_payload(
                        Some(payload),
                        code,
                        response.code != ResponseCode::Accepted,
                    ),
                    Err(result) => result,
                }
            }
            ResponseCode::Bad => bad_shard_response(&response.body),
            ResponseCode::NotFound => OperationResult::from_code(ErrorCode::DocumentNotFound),
            _ => OperationResult::from_code(ErrorCode::Internal),
        })
    }

    pub(crate) fn truncate_coordinator(
        &self,
        collection: &str,
        _options: &OperationOptions,
    ) -> Result<OperationResult> {
        let request = self.shard_request(
            RequestMethod::Put,
            collection_path(self.database().name(), collection, "truncate"),
        );
        let response = self.send_to_shard(request)?;
        Ok(if response.code.is_success() {
            OperationResult::ok()
        } else {
            OperationResult::from_code(ErrorCode::Internal)
        })
    }

    pub(crate) fn count_coordinator(&self, collection: &str) -> Result<OperationResult> {
        let request = self.shard_request(
            RequestMethod::Get,
            collection_path(self.database().name(), collection, "count"),
        );
        let response = self.send_to_shard(request)?;
        if response.code != ResponseCode::Ok {
            return Ok(OperationResult::from_code(ErrorCode::Internal));
        }
        Ok(match parse_shard_body(&response.body) {
            Ok(payload) => {
                let count = payload.get("count").and_then(Value::as_number).unwrap_or(0.0);
                OperationResult::with_payload(
                    Some(Value::Int(count as i64)),
                    ErrorCode::NoError,
                    false,
                )
            }
            Err(result) => result,
        })
    }
}

/// Parse a shard response body; parse failures become `Internal` results
/// carrying the raw body and the parser message.
fn parse_shard_body(body: &str) -> std::result::Result<Value, OperationResult> {
    from_json_str(body).map_err(|parse_error| {
        OperationResult::with_message(
            ErrorCode::Internal,
            format!("response from shard server not parseable: {body}:{parse_error}"),
        )
    })
}

/// Map a `400` response: the body carries `errorNum` and `errorMessage`.
fn bad_shard_response(body: &str) -> OperationResult {
    match from_json_str(body) {
        Ok(parsed) => {
            let code = parsed
                .get("errorNum")
                .and_then(Value::as_int)
                .and_then(ErrorCode::from_num)
                .unwrap_or(ErrorCode::Internal);
            let message = parsed
                .get("errorMessage")
                .and_then(Value::as_str)
                .unwrap_or("invalid request sent to shard server")
                .to_string();
            OperationResult::with_message(code, message)
        }
        Err(_) => {
            OperationResult::with_message(ErrorCode::Internal, "invalid request sent to shard server")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_shard_response_parses_error_body() {
        let body = format!(
            r#"{{"error":true,"errorNum":{},"errorMessage":"key exists"}}"#,
            ErrorCode::UniqueConstraintViolated.num()
        );
        let result = bad_shard_response(&body);
        assert_eq!(result.code, ErrorCode::UniqueConstraintViolated);
        assert_eq!(result.message.as_deref(), Some("key exists"));
    }

    #[test]
    fn test_bad_shard_response_with_garbage_body() {
        let result = bad_shard_response("{not json");
        assert_eq!(result.code, ErrorCode::Internal);
    }

    #[test]
    fn test_parse_shard_body_reports_raw_body() {
        let result = parse_shard_body("{oops").unwrap_err();
        assert_eq!(result.code, ErrorCode::Internal);
        assert!(result.message.as_deref().is_some_and(|m| m.contains("{oops")));
    }
}
