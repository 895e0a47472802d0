// Providers disagree on field names. Each lookup tries an ordered list of
// candidate keys and takes the first one that is present and not null.

use serde_json::Value;

pub const JOB_ID_KEYS: &[&str] = &["jobId", "job_id", "id"];
pub const OUTPUT_KEYS: &[&str] = &["diarization", "segments", "result"];

pub fn first_present<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let object = value.as_object()?;
    keys.iter()
        .filter_map(|key| object.get(*key))
        .find(|v| !v.is_null())
}

/// Job identifier from a job-creation response. Numeric ids are accepted.
pub fn job_id(body: &Value) -> Option<String> {
    match first_present(body, JOB_ID_KEYS)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Result payload of a finished job: looked up under `output` first, then at
/// the top level.
pub fn output_payload(body: &Value) -> Option<&Value> {
    body.get("output")
        .and_then(|output| first_present(output, OUTPUT_KEYS))
        .or_else(|| first_present(body, OUTPUT_KEYS))
}
