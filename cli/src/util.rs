use chrono::DateTime;
use serde_json::{Value, json};

pub fn exit_error(code: &str, message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": code,
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", pretty(&err));
    std::process::exit(1);
}

/// Machine-readable failure on stderr; returns the exit code.
pub fn report_error(code: &str, message: &str) -> i32 {
    let err = json!({
        "error": code,
        "message": message
    });
    eprintln!("{}", pretty(&err));
    1
}

pub fn print_json(value: &Value) -> i32 {
    println!("{}", pretty(value));
    0
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// RFC 3339 for set timestamps, `null` for unset (zero) ones.
pub fn timestamp(ts: i64) -> Value {
    if ts <= 0 {
        return Value::Null;
    }
    DateTime::from_timestamp(ts, 0)
        .map(|dt| json!(dt.to_rfc3339()))
        .unwrap_or_else(|| json!(ts))
}

pub fn optional_timestamp(ts: Option<i64>) -> Value {
    ts.map(timestamp).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_timestamps_are_null() {
        assert_eq!(timestamp(0), Value::Null);
        assert_eq!(optional_timestamp(None), Value::Null);
        assert_eq!(
            timestamp(1_700_000_000),
            json!("2023-11-14T22:13:20+00:00")
        );
    }
}
