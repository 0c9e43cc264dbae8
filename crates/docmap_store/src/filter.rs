//! Filter evaluation.
//!
//! Implements the query dialect understood by [`crate::InMemoryStore`]:
//! implicit equality, comparison operators, `$in`/`$nin`, `$exists`,
//! literal `$regex`, and the `$and`/`$or`/`$nor`/`$not` combinators.
//! Dotted paths traverse embedded documents and fan out over arrays.

use crate::error::{StoreError, StoreResult};
use docmap_codec::{Document, Regex, Value};
use std::cmp::Ordering;

/// Returns true if `doc` satisfies `filter`.
pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter.iter() {
        let holds = match key {
            "$and" => all_of(doc, condition)?.iter().all(|m| *m),
            "$or" => all_of(doc, condition)?.iter().any(|m| *m),
            "$nor" => !all_of(doc, condition)?.iter().any(|m| *m),
            op if op.starts_with('$') => {
                return Err(StoreError::invalid_filter(format!(
                    "unknown top-level operator {op}"
                )))
            }
            path => {
                let candidates = resolve(doc, path);
                field_matches(&candidates, condition)?
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn all_of(doc: &Document, condition: &Value) -> StoreResult<Vec<bool>> {
    let Some(clauses) = condition.as_array() else {
        return Err(StoreError::invalid_filter("logical operator expects an array"));
    };
    clauses
        .iter()
        .map(|clause| match clause.as_document() {
            Some(sub) => matches(doc, sub),
            None => Err(StoreError::invalid_filter("logical clause must be a document")),
        })
        .collect()
}

/// Collects every value reachable at `path`.
///
/// When the final value is an array both the array and its elements are
/// candidates, so equality on an array field matches any element.
pub(crate) fn resolve<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    resolve_in_document(doc, &segments, &mut out);
    out
}

fn resolve_in_document<'a>(doc: &'a Document, segments: &[&str], out: &mut Vec<&'a Value>) {
    if let Some((first, rest)) = segments.split_first() {
        if let Some(value) = doc.get(first) {
            resolve_in_value(value, rest, out);
        }
    }
}

fn resolve_in_value<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((first, rest)) = segments.split_first() else {
        out.push(value);
        if let Value::Array(items) = value {
            out.extend(items.iter());
        }
        return;
    };
    match value {
        Value::Document(inner) => resolve_in_document(inner, segments, out),
        Value::Array(items) => {
            if let Ok(index) = first.parse::<usize>() {
                if let Some(item) = items.get(index) {
                    resolve_in_value(item, rest, out);
                }
            }
            for item in items {
                if let Value::Document(inner) = item {
                    resolve_in_document(inner, segments, out);
                }
            }
        }
        _ => {}
    }
}

fn is_operator_document(condition: &Value) -> bool {
    condition
        .as_document()
        .and_then(|d| d.keys().next())
        .is_some_and(|k| k.starts_with('$'))
}

fn field_matches(candidates: &[&Value], condition: &Value) -> StoreResult<bool> {
    if !is_operator_document(condition) {
        return match condition {
            Value::Regex(regex) => any_regex(candidates, regex),
            _ => Ok(equals_any(candidates, condition)),
        };
    }
    let Some(ops) = condition.as_document() else {
        return Ok(false);
    };
    for (op, operand) in ops.iter() {
        let holds = match op {
            "$eq" => equals_any(candidates, operand),
            "$ne" => !equals_any(candidates, operand),
            "$gt" => compares(candidates, operand, |o| o == Ordering::Greater),
            "$gte" => compares(candidates, operand, |o| o != Ordering::Less),
            "$lt" => compares(candidates, operand, |o| o == Ordering::Less),
            "$lte" => compares(candidates, operand, |o| o != Ordering::Greater),
            "$in" => in_list(candidates, operand)?,
            "$nin" => !in_list(candidates, operand)?,
            "$exists" => {
                let expected = operand.as_bool().ok_or_else(|| {
                    StoreError::invalid_filter("$exists expects a boolean")
                })?;
                candidates.is_empty() != expected
            }
            "$regex" => {
                let regex = match operand {
                    Value::Regex(regex) => regex.clone(),
                    Value::Text(pattern) => {
                        let options = ops.get("$options").and_then(Value::as_text).unwrap_or("");
                        Regex::new(pattern.clone(), options)
                    }
                    _ => return Err(StoreError::invalid_filter("$regex expects a pattern")),
                };
                any_regex(candidates, &regex)?
            }
            "$options" => true,
            "$not" => !field_matches(candidates, operand)?,
            other => {
                return Err(StoreError::invalid_filter(format!(
                    "unknown operator {other}"
                )))
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match a.compare(b) {
        Some(ordering) => ordering == Ordering::Equal,
        None => a == b,
    }
}

fn equals_any(candidates: &[&Value], operand: &Value) -> bool {
    if operand.is_null() && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|c| values_equal(c, operand))
}

fn compares(candidates: &[&Value], operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates
        .iter()
        .filter_map(|c| c.compare(operand))
        .any(accept)
}

fn in_list(candidates: &[&Value], operand: &Value) -> StoreResult<bool> {
    let Some(options) = operand.as_array() else {
        return Err(StoreError::invalid_filter("$in expects an array"));
    };
    Ok(options.iter().any(|option| equals_any(candidates, option)))
}

fn any_regex(candidates: &[&Value], regex: &Regex) -> StoreResult<bool> {
    let literal = LiteralPattern::parse(regex)?;
    Ok(candidates
        .iter()
        .filter_map(|c| c.as_text())
        .any(|text| literal.matches(text)))
}

/// The regex subset this store evaluates: an escaped literal with optional
/// `^` and `$` anchors.
struct LiteralPattern {
    literal: String,
    anchored_start: bool,
    anchored_end: bool,
    case_insensitive: bool,
}

impl LiteralPattern {
    fn parse(regex: &Regex) -> StoreResult<Self> {
        let unsupported = || StoreError::UnsupportedRegex {
            pattern: regex.pattern.clone(),
        };
        let mut body = regex.pattern.as_str();
        let anchored_start = body.starts_with('^');
        if anchored_start {
            body = &body[1..];
        }

        let mut literal = String::with_capacity(body.len());
        let mut anchored_end = false;
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => literal.push(chars.next().ok_or_else(unsupported)?),
                '$' if chars.peek().is_none() => anchored_end = true,
                c if "^$.|?*+()[]{}".contains(c) => return Err(unsupported()),
                c => literal.push(c),
            }
        }

        let case_insensitive = regex.options.contains('i');
        if case_insensitive {
            literal = literal.to_lowercase();
        }
        Ok(Self {
            literal,
            anchored_start,
            anchored_end,
            case_insensitive,
        })
    }

    fn matches(&self, text: &str) -> bool {
        let lowered;
        let text = if self.case_insensitive {
            lowered = text.to_lowercase();
            lowered.as_str()
        } else {
            text
        };
        match (self.anchored_start, self.anchored_end) {
            (true, true) => text == self.literal,
            (true, false) => text.starts_with(&self.literal),
            (false, true) => text.ends_with(&self.literal),
            (false, false) => text.contains(&self.literal),
        }
    }
}
