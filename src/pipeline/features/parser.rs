use serde_json::Value;

use super::types::ExtractedFeatures;
use super::FeatureError;

/// Parse the model's reply into a feature vector.
///
/// Accepts a bare JSON object, a ```json fenced block, or the first
/// `{ ... }` span in surrounding prose. Entries are coerced leniently:
/// numbers pass through, numeric strings are parsed, anything else becomes 0.
/// The vector is truncated to `expected_len` but never padded; the analyzer
/// only evaluates indices present on both sides.
pub fn parse_feature_response(
    response: &str,
    expected_len: usize,
) -> Result<ExtractedFeatures, FeatureError> {
    let json = locate_json(response)
        .ok_or_else(|| FeatureError::ResponseParsing("No JSON object in response".into()))?;

    let features = json
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| FeatureError::ResponseParsing("Missing \"features\" array".into()))?;

    if features.len() != expected_len {
        tracing::warn!(
            got = features.len(),
            expected = expected_len,
            "Feature array length does not match catalog"
        );
    }

    let vector: Vec<f64> = features
        .iter()
        .take(expected_len)
        .map(coerce_number)
        .collect();

    Ok(ExtractedFeatures {
        payload: json,
        vector,
    })
}

fn locate_json(response: &str) -> Option<Value> {
    let trimmed = response.trim();
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(start) = trimmed.find("```json") {
        let body_start = start + 7;
        if let Some(end) = trimmed[body_start..].find("```") {
            if let Ok(v) = serde_json::from_str(trimmed[body_start..body_start + end].trim()) {
                return Some(v);
            }
        }
    }

    let open = trimmed.find('{')?;
    let close = trimmed.rfind('}')?;
    if close <= open {
        return None;
    }
    serde_json::from_str(&trimmed[open..=close]).ok()
}

fn coerce_number(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0),
        _ => 0.0,
    }
}
