//! Parsing and validation of the model's extraction reply.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::prompt::{BillField, rule_for};
use crate::error::PipelineError;
use crate::pipeline::types::Message;

/// Parse a raw reply into exactly `expected_count` bill records.
///
/// Absent, null or blank fields fall back to their [`DefaultRule`](super::prompt::DefaultRule),
/// with `today` standing in for the date rule.
pub fn parse_bills(
    raw: &str,
    expected_count: usize,
    today: NaiveDate,
) -> Result<Vec<Message>, PipelineError> {
    let body = strip_code_fence(raw);

    let value: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::MalformedResponse(format!("reply is not valid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(PipelineError::MalformedResponse(format!(
                "expected a JSON array, got {}",
                kind_of(&other)
            )));
        }
    };

    if items.len() != expected_count {
        return Err(PipelineError::CardinalityMismatch {
            expected: expected_count,
            actual: items.len(),
        });
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(record) = item else {
                return Err(PipelineError::MalformedResponse(format!(
                    "record {index} is {}, expected an object",
                    kind_of(item)
                )));
            };
            parse_record(index, record, today)
        })
        .collect()
}

fn parse_record(
    index: usize,
    record: &Map<String, Value>,
    today: NaiveDate,
) -> Result<Message, PipelineError> {
    let value = |field| field_value(index, record, field, today);

    let subject = text_field(index, &value(BillField::Subject)?, BillField::Subject)?;
    let company = text_field(index, &value(BillField::Company)?, BillField::Company)?;
    let date = date_field(index, &value(BillField::Date)?)?;
    let amount = amount_field(index, &value(BillField::Amount)?)?;

    if amount.is_sign_negative() && !amount.is_zero() {
        warn!(index, %amount, company = %company, "Extracted bill has a negative amount");
    }

    Ok(Message {
        subject,
        company,
        date,
        amount,
    })
}

/// The field's value, or its default when absent, null or a blank string.
fn field_value(
    index: usize,
    record: &Map<String, Value>,
    field: BillField,
    today: NaiveDate,
) -> Result<Value, PipelineError> {
    match record.get(field.key()) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) if s.trim().is_empty() => {}
        Some(other) => return Ok(other.clone()),
    }

    debug!(index, field = field.key(), "Applying default");
    rule_for(field)
        .map(|rule| rule.default.value(today))
        .ok_or_else(|| {
            PipelineError::MalformedResponse(format!(
                "record {index} has no {} and no default applies",
                field.key()
            ))
        })
}

fn text_field(index: usize, value: &Value, field: BillField) -> Result<String, PipelineError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(index, field, other)),
    }
}

fn date_field(index: usize, value: &Value) -> Result<NaiveDate, PipelineError> {
    value
        .as_str()
        .and_then(normalize_date)
        .ok_or_else(|| invalid(index, BillField::Date, value))
}

fn amount_field(index: usize, value: &Value) -> Result<Decimal, PipelineError> {
    let amount = match value {
        Value::Number(n) => normalize_amount(&n.to_string()),
        Value::String(s) => normalize_amount(s),
        _ => None,
    };
    amount.ok_or_else(|| invalid(index, BillField::Amount, value))
}

fn invalid(index: usize, field: BillField, value: &Value) -> PipelineError {
    PipelineError::MalformedResponse(format!(
        "record {index} has an invalid {}: {value}",
        field.key()
    ))
}

/// Accept an ISO-8601 calendar date, or a date-time whose date part is kept.
pub fn normalize_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Parse an amount, tolerating currency symbols, thousands separators and
/// scientific notation.
pub fn normalize_amount(input: &str) -> Option<Decimal> {
    let cleaned: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

/// Remove one surrounding markdown code fence, if the whole reply is fenced.
///
/// The info string ("json") may sit on its own line or run straight into the
/// array.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return trimmed;
    };
    inner
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
