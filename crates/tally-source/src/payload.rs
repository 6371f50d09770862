//! Structured decoding of the remote feed payload.
//!
//! Two envelopes are understood:
//!
//! - a JSON object with a `data` member: `{"data": ...}`
//! - a single assignment of the `data` variable: `data = <json>`
//!
//! The `data` value is either row-oriented (an array of objects) or
//! column-oriented (an object of equal-length arrays).

use serde_json::Value;
use tally_core::{RawRecord, SalesRecord};

use crate::{Error, Result};

const DATA_VAR: &str = "data";

/// Decode a raw payload into sales records.
pub fn parse_payload(bytes: &[u8]) -> Result<Vec<SalesRecord>> {
  let text = std::str::from_utf8(bytes)
    .map_err(|e| Error::SourceMalformed(format!("payload is not UTF-8: {e}")))?;

  let data = extract_data(text)?;
  let rows = into_rows(data)?;

  rows
    .into_iter()
    .enumerate()
    .map(|(i, row)| {
      SalesRecord::from_raw(row)
        .map_err(|e| Error::SourceMalformed(format!("row {i}: {e}")))
    })
    .collect()
}

fn extract_data(text: &str) -> Result<Value> {
  let trimmed = text.trim_start();

  if trimmed.starts_with('{') {
    let mut doc: Value = serde_json::from_str(trimmed)
      .map_err(|e| Error::SourceMalformed(format!("invalid JSON: {e}")))?;
    return doc
      .get_mut(DATA_VAR)
      .map(Value::take)
      .ok_or_else(missing_data);
  }

  let rhs = assignment_rhs(text).ok_or_else(missing_data)?;
  // Only the first JSON document after `=` is read; anything after it is
  // ignored rather than interpreted.
  serde_json::Deserializer::from_str(rhs)
    .into_iter::<Value>()
    .next()
    .ok_or_else(missing_data)?
    .map_err(|e| Error::SourceMalformed(format!("invalid JSON after `data =`: {e}")))
}

/// Find a line of the form `data = ...` and return everything after `=`.
fn assignment_rhs(text: &str) -> Option<&str> {
  let mut offset = 0;
  for line in text.split_inclusive('\n') {
    let start = offset + (line.len() - line.trim_start().len());
    offset += line.len();

    let Some(rest) = line.trim_start().strip_prefix(DATA_VAR) else {
      continue;
    };
    let rest_trimmed = rest.trim_start();
    if rest_trimmed.starts_with('=') && !rest_trimmed.starts_with("==") {
      let eq = start + DATA_VAR.len() + (rest.len() - rest_trimmed.len());
      return text.get(eq + 1..);
    }
  }
  None
}

fn missing_data() -> Error {
  Error::SourceMalformed(format!("payload does not define `{DATA_VAR}`"))
}

fn into_rows(data: Value) -> Result<Vec<RawRecord>> {
  match data {
    Value::Array(items) => items
      .into_iter()
      .enumerate()
      .map(|(i, item)| match item {
        Value::Object(row) => Ok(row),
        other => Err(Error::SourceMalformed(format!(
          "row {i} is not an object: {other}"
        ))),
      })
      .collect(),
    Value::Object(columns) => columns_to_rows(columns),
    other => Err(Error::SourceMalformed(format!(
      "`{DATA_VAR}` is neither rows nor columns: {other}"
    ))),
  }
}

fn columns_to_rows(columns: serde_json::Map<String, Value>) -> Result<Vec<RawRecord>> {
  let mut arrays = Vec::with_capacity(columns.len());
  for (name, values) in columns {
    match values {
      Value::Array(values) => arrays.push((name, values)),
      _ => {
        return Err(Error::SourceMalformed(format!(
          "column {name:?} is not an array"
        )));
      }
    }
  }

  let (first, len) = arrays
    .first()
    .map_or((String::new(), 0), |(name, v)| (name.clone(), v.len()));
  if let Some((name, values)) = arrays.iter().find(|(_, v)| v.len() != len) {
    return Err(Error::SourceMalformed(format!(
      "column {name:?} has {} values but {first:?} has {len}",
      values.len()
    )));
  }

  let mut rows = vec![RawRecord::new(); len];
  for (name, values) in arrays {
    for (row, value) in rows.iter_mut().zip(values) {
      row.insert(name.clone(), value);
    }
  }
  Ok(rows)
}
