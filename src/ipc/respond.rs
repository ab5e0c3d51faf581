//! Wire envelopes. One JSON object per response; engine errors map to stable
//! codes with the violation list carried in `details` so the hosting UI can
//! render every problem at once.

use crate::error::EngineError;
use serde_json::json;

pub fn ok(id: &str, result: serde_json::Value) -> serde_json::Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(
    id: &str,
    code: &str,
    message: impl Into<String>,
    details: Option<serde_json::Value>,
) -> serde_json::Value {
    let mut error = json!({
        "code": code,
        "message": message.into(),
    });
    if let Some(d) = details {
        error["details"] = d;
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn engine_err(id: &str, error: &EngineError) -> serde_json::Value {
    let details = match error {
        EngineError::Validation(violations) => Some(json!({
            "violations": violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>(),
            "rules": violations,
        })),
        _ => None,
    };
    err(id, error.code(), error.to_string(), details)
}
