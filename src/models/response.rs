//! Response envelope returned at the boundary of the pool core.

use crate::error::{DbError, DbResult};
use serde::Serialize;

/// `{success, data?, message?, suggestion?}` envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Response<T> {
    /// Whether the operation succeeded
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// What the caller might try next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Whether retrying the same call may succeed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            suggestion: None,
            retryable: false,
        }
    }

    pub fn error(err: &DbError) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(err.to_string()),
            suggestion: err.suggestion().map(str::to_string),
            retryable: err.is_retryable(),
        }
    }
}

impl<T> From<DbResult<T>> for Response<T> {
    fn from(result: DbResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(err) => Self::error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let json = serde_json::to_value(Response::ok(vec![1, 2])).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("message").is_none());
        assert!(json.get("retryable").is_none());
    }

    #[test]
    fn test_error_envelope() {
        let result: DbResult<()> = Err(DbError::query(DbError::database(
            "Table 'shop.nope' doesn't exist",
            Some("42S02".to_string()),
            "Check the SQL syntax and referenced objects",
        )));
        let json = serde_json::to_value(Response::from(result)).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(
            json["message"],
            "Failed to execute query: Database error: Table 'shop.nope' doesn't exist"
        );
        assert_eq!(
            json["suggestion"],
            "Check the SQL syntax and referenced objects"
        );
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_retryable_flag() {
        let response: Response<()> = Response::error(&DbError::queue_limit(3));
        assert!(response.retryable);
        assert!(!response.success);
    }
}
