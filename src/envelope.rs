//! Decoding of the `{"result": <code>, ...}` wrapper every API call returns.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{PCloudError, Result};

/// Decode a response body.
///
/// Code `0` yields the payload (every field except `result`). Any other code
/// becomes [`PCloudError::Api`] carrying that exact code. Bodies that are not
/// a JSON object with a numeric `result` are [`PCloudError::MalformedResponse`].
pub fn decode(body: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| PCloudError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let Value::Object(mut object) = value else {
        return Err(PCloudError::MalformedResponse(
            "expected a JSON object".to_string(),
        ));
    };

    let code = object
        .remove("result")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| {
            PCloudError::MalformedResponse("missing numeric 'result' field".to_string())
        })?;

    if code == 0 {
        return Ok(object);
    }

    let message = object
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("Unknown error")
        .to_string();
    Err(PCloudError::api(code, message))
}

/// Shape a decoded payload into a typed value.
pub fn parse_payload<T: DeserializeOwned>(payload: Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(payload))
        .map_err(|e| PCloudError::MalformedResponse(format!("unexpected payload shape: {e}")))
}
