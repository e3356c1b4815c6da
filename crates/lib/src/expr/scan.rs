//! Reference scanning for template expressions.
//!
//! Expressions reach other values by name through `variables('X')` and
//! `parameters('X')` calls. Scanning splits an expression into literal text
//! and those references so callers can check that every variable reference
//! lands on a key that actually exists.
//!
//! # Example
//!
//! ```
//! use kubearm_lib::expr::{parse, Reference, Segment};
//!
//! let segments = parse("[concat(variables('prefix'), 'nic')]").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("[concat(".to_string()),
//!     Segment::Reference(Reference::Variable("prefix".to_string())),
//!     Segment::Literal(", 'nic')]".to_string()),
//! ]);
//! ```

use serde_json::Value;
use thiserror::Error;

/// A named reference inside an expression.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Reference {
  /// `variables('name')`
  Variable(String),
  /// `parameters('name')`
  Parameter(String),
}

/// A segment of a scanned expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Text that is not a reference.
  Literal(String),
  /// A variable or parameter reference.
  Reference(Reference),
}

/// Errors that can occur while scanning an expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
  #[error("unclosed reference at position {0}")]
  Unclosed(usize),

  #[error("reference name must be a quoted literal at position {0}")]
  Dynamic(usize),
}

const VARIABLES: &str = "variables(";
const PARAMETERS: &str = "parameters(";

/// Whether a string is evaluated by the template engine.
///
/// A leading `[[` escapes a literal bracket and is not an expression.
pub fn is_expression(value: &str) -> bool {
  value.starts_with('[') && value.ends_with(']') && !value.starts_with("[[")
}

/// Split a string into literal text and references.
///
/// # Errors
///
/// Returns an error if a reference is unterminated or names its target with
/// anything other than a single-quoted literal.
pub fn parse(input: &str) -> Result<Vec<Segment>, ReferenceError> {
  let mut segments = Vec::new();
  let mut literal_start = 0;
  let mut pos = 0;

  while pos < input.len() {
    let rest = &input[pos..];
    let boundary = pos == 0 || !is_ident_byte(input.as_bytes()[pos - 1]);

    let matched = if !boundary {
      None
    } else if rest.starts_with(VARIABLES) {
      Some((VARIABLES.len(), true))
    } else if rest.starts_with(PARAMETERS) {
      Some((PARAMETERS.len(), false))
    } else {
      None
    };

    match matched {
      Some((prefix_len, is_variable)) => {
        let (name, consumed) = read_quoted_name(input, pos, pos + prefix_len)?;

        if literal_start < pos {
          segments.push(Segment::Literal(input[literal_start..pos].to_string()));
        }
        let reference = if is_variable {
          Reference::Variable(name)
        } else {
          Reference::Parameter(name)
        };
        segments.push(Segment::Reference(reference));

        pos = consumed;
        literal_start = pos;
      }
      None => {
        pos += rest.chars().next().map_or(1, char::len_utf8);
      }
    }
  }

  if literal_start < input.len() {
    segments.push(Segment::Literal(input[literal_start..].to_string()));
  }

  Ok(segments)
}

/// Names of all variables referenced by one expression, in first-seen order.
pub fn variable_references(input: &str) -> Result<Vec<String>, ReferenceError> {
  let mut names: Vec<String> = Vec::new();
  for segment in parse(input)? {
    if let Segment::Reference(Reference::Variable(name)) = segment
      && !names.contains(&name)
    {
      names.push(name);
    }
  }
  Ok(names)
}

/// Variable references of every expression string nested anywhere in a value.
///
/// Plain (non-expression) strings are data, not code, and are skipped.
pub fn value_variable_references(value: &Value) -> Result<Vec<String>, ReferenceError> {
  let mut names = Vec::new();
  collect_value_references(value, &mut names)?;
  Ok(names)
}

fn collect_value_references(value: &Value, names: &mut Vec<String>) -> Result<(), ReferenceError> {
  match value {
    Value::String(s) if is_expression(s) => {
      for name in variable_references(s)? {
        if !names.contains(&name) {
          names.push(name);
        }
      }
    }
    Value::Array(items) => {
      for item in items {
        collect_value_references(item, names)?;
      }
    }
    Value::Object(map) => {
      // Keys can be expressions too, e.g. user-assigned identity maps.
      for (key, item) in map {
        if is_expression(key) {
          for name in variable_references(key)? {
            if !names.contains(&name) {
              names.push(name);
            }
          }
        }
        collect_value_references(item, names)?;
      }
    }
    _ => {}
  }
  Ok(())
}

fn is_ident_byte(b: u8) -> bool {
  b.is_ascii_alphanumeric() || b == b'_'
}

/// Read `'name')` starting at `start`; returns the name and the index after `)`.
fn read_quoted_name(input: &str, call_pos: usize, start: usize) -> Result<(String, usize), ReferenceError> {
  let bytes = input.as_bytes();
  let mut i = start;

  while i < bytes.len() && bytes[i].is_ascii_whitespace() {
    i += 1;
  }
  if i >= bytes.len() {
    return Err(ReferenceError::Unclosed(call_pos));
  }
  if bytes[i] != b'\'' {
    return Err(ReferenceError::Dynamic(call_pos));
  }
  i += 1;

  let name_start = i;
  while i < bytes.len() && bytes[i] != b'\'' {
    i += 1;
  }
  if i >= bytes.len() {
    return Err(ReferenceError::Unclosed(call_pos));
  }
  let name = input[name_start..i].to_string();
  i += 1;

  while i < bytes.len() && bytes[i].is_ascii_whitespace() {
    i += 1;
  }
  if i >= bytes.len() || bytes[i] != b')' {
    return Err(ReferenceError::Unclosed(call_pos));
  }

  Ok((name, i + 1))
}
