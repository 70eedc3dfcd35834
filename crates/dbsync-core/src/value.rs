use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::types::ColumnKind;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";
const TYPE_KEY: &str = "$type";
const VALUE_KEY: &str = "$value";

/// Typed scalar read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Arbitrary-precision number kept in its textual form.
    Decimal(String),
    Text(String),
    Uuid(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

/// A manifest value could not be decoded for its column.
#[derive(Debug, Clone, Error)]
#[error("cannot decode {kind} value: {message}")]
pub struct ValueError {
    pub kind: &'static str,
    pub message: String,
}

impl Value {
    /// Natural kind of a non-null value.
    pub fn kind(&self) -> Option<ColumnKind> {
        let kind = match self {
            Value::Null => return None,
            Value::Bool(_) => ColumnKind::Boolean,
            Value::Int(_) => ColumnKind::Integer,
            Value::Float(_) => ColumnKind::Float,
            Value::Decimal(_) => ColumnKind::Decimal,
            Value::Text(_) => ColumnKind::Text,
            Value::Uuid(_) => ColumnKind::Uuid,
            Value::Timestamp(_) => ColumnKind::Timestamp,
            Value::Date(_) => ColumnKind::Date,
            Value::Time(_) => ColumnKind::Time,
            Value::Bytes(_) => ColumnKind::Bytes,
            Value::Json(_) => ColumnKind::Json,
        };
        Some(kind)
    }

    /// Encode for a column of `kind`.
    ///
    /// A value that would not decode back to itself under `kind`, such as a
    /// blob stored in a text column of a file store, is written as
    /// `{"$type": <kind>, "$value": <plain form>}` so reading the manifest
    /// never depends on the declared type.
    pub fn to_manifest_json(&self, kind: ColumnKind) -> JsonValue {
        let plain = self.to_json();
        if plain.is_null() {
            return plain;
        }
        let faithful = Value::from_json(kind, &plain)
            .map(|decoded| decoded.same_as(self))
            .unwrap_or(false);
        match self.kind() {
            Some(actual) if !faithful => {
                let mut tagged = serde_json::Map::new();
                tagged.insert(TYPE_KEY.to_string(), JsonValue::from(actual.as_str()));
                tagged.insert(VALUE_KEY.to_string(), plain);
                JsonValue::Object(tagged)
            }
            _ => plain,
        }
    }

    fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Float(left), Value::Float(right)) if left.is_nan() && right.is_nan() => true,
            _ => self == other,
        }
    }

    /// Encode into the manifest representation.
    ///
    /// Timestamps become RFC 3339 UTC with microseconds, binary becomes
    /// standard base64, decimals stay textual. Non-finite floats are written
    /// as the strings `NaN`, `Infinity` and `-Infinity`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(value) => JsonValue::Bool(*value),
            Value::Int(value) => JsonValue::from(*value),
            Value::Float(value) => match serde_json::Number::from_f64(*value) {
                Some(number) => JsonValue::Number(number),
                None => JsonValue::String(non_finite_label(*value).to_string()),
            },
            Value::Decimal(value) | Value::Text(value) | Value::Uuid(value) => {
                JsonValue::String(value.clone())
            }
            Value::Timestamp(value) => {
                JsonValue::String(value.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            Value::Date(value) => JsonValue::String(value.format(DATE_FORMAT).to_string()),
            Value::Time(value) => JsonValue::String(value.format(TIME_FORMAT).to_string()),
            Value::Bytes(value) => JsonValue::String(BASE64.encode(value)),
            Value::Json(value) => value.clone(),
        }
    }

    /// Decode a manifest value for a column of the given kind.
    ///
    /// Decoding is driven by the JSON shape first and refined by the kind, so
    /// a value that was read as text from a loosely typed store survives the
    /// round trip unchanged. Values tagged by [`Value::to_manifest_json`]
    /// decode by their tag.
    pub fn from_json(kind: ColumnKind, json: &JsonValue) -> Result<Value, ValueError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        if let Some((tagged, inner)) = split_tag(json) {
            return match tagged {
                ColumnKind::Json => Ok(Value::Json(inner.clone())),
                _ if inner.is_null() || inner.is_object() || inner.is_array() => Err(ValueError {
                    kind: tagged.as_str(),
                    message: format!("unexpected tagged value {inner}"),
                }),
                _ => Value::from_json(tagged, inner),
            };
        }
        if kind == ColumnKind::Json {
            return Ok(Value::Json(json.clone()));
        }

        match json {
            JsonValue::Bool(value) => Ok(Value::Bool(*value)),
            JsonValue::Number(number) => Ok(decode_number(kind, number)),
            JsonValue::String(text) => decode_text(kind, text),
            other => Err(ValueError {
                kind: kind.as_str(),
                message: format!("unexpected json value {other}"),
            }),
        }
    }

    /// Reshape a value for a column of `kind` on another engine.
    ///
    /// File stores are loosely typed, so a boolean may arrive as an integer
    /// and a timestamp as text. Values that cannot be reshaped are returned
    /// unchanged and left to the target's own casts.
    pub fn conform(self, kind: ColumnKind) -> Value {
        match (kind, self) {
            (_, Value::Null) => Value::Null,
            (ColumnKind::Boolean, Value::Int(value)) => Value::Bool(value != 0),
            (ColumnKind::Boolean, Value::Text(text)) => match text.trim() {
                "1" | "t" | "true" | "TRUE" | "True" => Value::Bool(true),
                "0" | "f" | "false" | "FALSE" | "False" => Value::Bool(false),
                _ => Value::Text(text),
            },
            (ColumnKind::Integer, Value::Bool(value)) => Value::Int(i64::from(value)),
            (ColumnKind::Integer, Value::Text(text) | Value::Decimal(text)) => {
                match text.trim().parse::<i64>() {
                    Ok(value) => Value::Int(value),
                    Err(_) => Value::Text(text),
                }
            }
            (ColumnKind::Float, Value::Int(value)) => Value::Float(value as f64),
            (ColumnKind::Float, Value::Text(text) | Value::Decimal(text)) => {
                match text.trim().parse::<f64>() {
                    Ok(value) => Value::Float(value),
                    Err(_) => Value::Text(text),
                }
            }
            (ColumnKind::Decimal, Value::Int(value)) => Value::Decimal(value.to_string()),
            (ColumnKind::Decimal, Value::Float(value)) if value.is_finite() => {
                Value::Decimal(value.to_string())
            }
            (ColumnKind::Decimal, Value::Text(text)) => Value::Decimal(text),
            (ColumnKind::Text, Value::Decimal(text) | Value::Uuid(text)) => Value::Text(text),
            (ColumnKind::Uuid, Value::Text(text)) => Value::Uuid(text),
            (ColumnKind::Timestamp, Value::Text(text)) => parse_loose_timestamp(&text)
                .map(Value::Timestamp)
                .unwrap_or(Value::Text(text)),
            (ColumnKind::Date, Value::Text(text)) => {
                parse_date(&text).map(Value::Date).unwrap_or(Value::Text(text))
            }
            (ColumnKind::Date, Value::Timestamp(value)) => Value::Date(value.date_naive()),
            (ColumnKind::Time, Value::Text(text)) => {
                parse_time(&text).map(Value::Time).unwrap_or(Value::Text(text))
            }
            (ColumnKind::Bytes, Value::Text(text)) => Value::Bytes(text.into_bytes()),
            (ColumnKind::Json, Value::Text(text)) => match serde_json::from_str(&text) {
                Ok(json) => Value::Json(json),
                Err(_) => Value::Json(JsonValue::String(text)),
            },
            (ColumnKind::Json, Value::Json(json)) => Value::Json(json),
            (ColumnKind::Json, other) => Value::Json(other.to_json()),
            (_, other) => other,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// `{"$type": <known kind>, "$value": ...}` with nothing else.
fn split_tag(json: &JsonValue) -> Option<(ColumnKind, &JsonValue)> {
    let object = json.as_object()?;
    if object.len() != 2 {
        return None;
    }
    let kind = ColumnKind::from_name(object.get(TYPE_KEY)?.as_str()?)?;
    Some((kind, object.get(VALUE_KEY)?))
}

fn decode_number(kind: ColumnKind, number: &serde_json::Number) -> Value {
    match kind {
        ColumnKind::Float => Value::Float(number.as_f64().unwrap_or_default()),
        ColumnKind::Decimal => Value::Decimal(number.to_string()),
        _ => match number.as_i64() {
            Some(value) => Value::Int(value),
            None => Value::Float(number.as_f64().unwrap_or_default()),
        },
    }
}

fn decode_text(kind: ColumnKind, text: &str) -> Result<Value, ValueError> {
    let value = match kind {
        ColumnKind::Timestamp => DateTime::parse_from_rfc3339(text)
            .map(|parsed| Value::Timestamp(parsed.with_timezone(&Utc)))
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        ColumnKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Value::Date)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        ColumnKind::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map(Value::Time)
            .unwrap_or_else(|_| Value::Text(text.to_string())),
        ColumnKind::Bytes => BASE64
            .decode(text)
            .map(Value::Bytes)
            .map_err(|err| ValueError {
                kind: kind.as_str(),
                message: err.to_string(),
            })?,
        ColumnKind::Float => match text {
            "NaN" => Value::Float(f64::NAN),
            "Infinity" => Value::Float(f64::INFINITY),
            "-Infinity" => Value::Float(f64::NEG_INFINITY),
            _ => Value::Text(text.to_string()),
        },
        ColumnKind::Decimal => Value::Decimal(text.to_string()),
        ColumnKind::Uuid => Value::Uuid(text.to_string()),
        _ => Value::Text(text.to_string()),
    };
    Ok(value)
}

fn non_finite_label(value: f64) -> &'static str {
    if value.is_nan() {
        "NaN"
    } else if value.is_sign_negative() {
        "-Infinity"
    } else {
        "Infinity"
    }
}

/// Parse the loose timestamp spellings found in file-based stores.
///
/// Accepts RFC 3339 and `YYYY-MM-DD HH:MM:SS[.ffffff]` with or without a
/// `T` separator; naive values are taken as UTC.
pub fn parse_loose_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}

/// Textual timestamp layout used when writing into file-based stores.
pub fn format_naive_utc(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

pub fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub fn format_time(value: &NaiveTime) -> String {
    value.format(TIME_FORMAT).to_string()
}

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_are_utc_with_microseconds() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::microseconds(6);
        let json = Value::Timestamp(ts).to_json();
        assert_eq!(json, JsonValue::String("2024-01-02T03:04:05.000006Z".into()));
        assert_eq!(
            Value::from_json(ColumnKind::Timestamp, &json).unwrap(),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn bytes_travel_as_base64() {
        let json = Value::Bytes(vec![0, 159, 146, 150]).to_json();
        assert_eq!(json, JsonValue::String("AJ+Slg==".into()));
        assert_eq!(
            Value::from_json(ColumnKind::Bytes, &json).unwrap(),
            Value::Bytes(vec![0, 159, 146, 150])
        );
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let err = Value::from_json(ColumnKind::Bytes, &JsonValue::String("***".into()))
            .expect_err("invalid base64");
        assert_eq!(err.kind, "bytes");
    }

    #[test]
    fn decimals_keep_their_text() {
        let json = Value::Decimal("12.50".into()).to_json();
        assert_eq!(
            Value::from_json(ColumnKind::Decimal, &json).unwrap(),
            Value::Decimal("12.50".into())
        );
    }

    #[test]
    fn floats_keep_fraction_and_non_finite_values() {
        let json = Value::Float(3.0).to_json();
        assert_eq!(
            Value::from_json(ColumnKind::Float, &json).unwrap(),
            Value::Float(3.0)
        );
        let json = Value::Float(f64::INFINITY).to_json();
        assert_eq!(json, JsonValue::String("Infinity".into()));
        assert_eq!(
            Value::from_json(ColumnKind::Float, &json).unwrap(),
            Value::Float(f64::INFINITY)
        );
    }

    #[test]
    fn text_in_typed_column_survives() {
        let json = Value::Text("not a date".into()).to_json();
        assert_eq!(
            Value::from_json(ColumnKind::Timestamp, &json).unwrap(),
            Value::Text("not a date".into())
        );
    }

    #[test]
    fn json_columns_keep_nested_values() {
        let nested = serde_json::json!({"b": [1, 2], "a": "x"});
        let json = Value::Json(nested.clone()).to_json();
        assert_eq!(
            Value::from_json(ColumnKind::Json, &json).unwrap(),
            Value::Json(nested)
        );
    }

    #[test]
    fn mismatched_values_are_tagged_with_their_own_kind() {
        let blob = Value::Bytes(vec![0x00, 0xff]);
        let json = blob.to_manifest_json(ColumnKind::Text);
        assert_eq!(json, serde_json::json!({"$type": "bytes", "$value": "AP8="}));
        assert_eq!(Value::from_json(ColumnKind::Text, &json).unwrap(), blob);

        let int = Value::Int(5);
        let json = int.to_manifest_json(ColumnKind::Decimal);
        assert_eq!(Value::from_json(ColumnKind::Decimal, &json).unwrap(), int);

        let plain = Value::Text("hi".into()).to_manifest_json(ColumnKind::Text);
        assert_eq!(plain, JsonValue::String("hi".into()));
        assert_eq!(Value::Null.to_manifest_json(ColumnKind::Bytes), JsonValue::Null);
    }

    #[test]
    fn json_that_looks_like_a_tag_is_wrapped() {
        let lookalike = Value::Json(serde_json::json!({"$type": "text", "$value": "x"}));
        let json = lookalike.to_manifest_json(ColumnKind::Json);
        assert_eq!(json["$type"], "json");
        assert_eq!(Value::from_json(ColumnKind::Json, &json).unwrap(), lookalike);

        let other = Value::Json(serde_json::json!({"$type": "widget", "$value": 1}));
        let json = other.to_manifest_json(ColumnKind::Json);
        assert_eq!(json, serde_json::json!({"$type": "widget", "$value": 1}));
    }

    #[test]
    fn conform_reshapes_loosely_typed_values() {
        assert_eq!(Value::Int(1).conform(ColumnKind::Boolean), Value::Bool(true));
        assert_eq!(Value::Bool(false).conform(ColumnKind::Integer), Value::Int(0));
        assert_eq!(Value::Int(2).conform(ColumnKind::Float), Value::Float(2.0));
        assert_eq!(
            Value::Int(7).conform(ColumnKind::Decimal),
            Value::Decimal("7".into())
        );
        assert_eq!(
            Value::Text("2024-05-06 07:08:09".into()).conform(ColumnKind::Timestamp),
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
        );
        assert_eq!(
            Value::Text(r#"{"a":1}"#.into()).conform(ColumnKind::Json),
            Value::Json(serde_json::json!({"a": 1}))
        );
        assert_eq!(
            Value::Text("maybe".into()).conform(ColumnKind::Boolean),
            Value::Text("maybe".into())
        );
        assert_eq!(Value::Null.conform(ColumnKind::Json), Value::Null);
    }

    #[test]
    fn parses_loose_timestamps() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_loose_timestamp("2024-05-06 07:08:09"), Some(expected));
        assert_eq!(parse_loose_timestamp("2024-05-06T07:08:09"), Some(expected));
        assert_eq!(
            parse_loose_timestamp("2024-05-06 09:08:09+02:00"),
            Some(expected)
        );
        assert_eq!(parse_loose_timestamp("2024-05-06T07:08:09Z"), Some(expected));
        assert_eq!(parse_loose_timestamp("yesterday"), None);
    }
}
