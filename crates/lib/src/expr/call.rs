//! Shallow call parsing.
//!
//! Enough structure to read the outermost call of an expression and its
//! top-level arguments. Nested calls stay as text.

use super::scan::is_expression;

/// The outermost function call of an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
  pub name: String,
  /// Top-level arguments, whitespace-normalized.
  pub args: Vec<String>,
}

/// The text between the outer brackets of an expression.
pub fn strip_brackets(value: &str) -> Option<&str> {
  if is_expression(value) {
    Some(&value[1..value.len() - 1])
  } else {
    None
  }
}

/// Parse `name(arg, ...)` where the closing paren ends the input.
///
/// Returns `None` for anything else, including indexed calls such as
/// `variables('a')[0]`.
pub fn parse_call(inner: &str) -> Option<Call> {
  let inner = inner.trim();
  let open = inner.find('(')?;
  let name = &inner[..open];
  if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
    return None;
  }

  let close = matching_paren(inner, open)?;
  if close != inner.len() - 1 {
    return None;
  }

  Some(Call {
    name: name.to_string(),
    args: split_args(&inner[open + 1..close]),
  })
}

/// Split an argument list at top-level commas.
pub fn split_args(input: &str) -> Vec<String> {
  let mut args = Vec::new();
  let mut depth = 0usize;
  let mut in_quote = false;
  let mut start = 0;

  for (i, c) in input.char_indices() {
    match c {
      '\'' => in_quote = !in_quote,
      '(' | '[' if !in_quote => depth += 1,
      ')' | ']' if !in_quote => depth = depth.saturating_sub(1),
      ',' if !in_quote && depth == 0 => {
        args.push(normalize(&input[start..i]));
        start = i + 1;
      }
      _ => {}
    }
  }

  let last = normalize(&input[start..]);
  if !last.is_empty() || !args.is_empty() {
    args.push(last);
  }
  args
}

/// Drop whitespace outside of quoted literals.
pub fn normalize(input: &str) -> String {
  let mut out = String::with_capacity(input.len());
  let mut in_quote = false;
  for c in input.chars() {
    if c == '\'' {
      in_quote = !in_quote;
    }
    if in_quote || !c.is_whitespace() {
      out.push(c);
    }
  }
  out
}

/// The text of a quoted literal argument, with doubled quotes collapsed.
pub fn unquote(arg: &str) -> Option<String> {
  let arg = arg.trim();
  if arg.len() >= 2 && arg.starts_with('\'') && arg.ends_with('\'') {
    Some(arg[1..arg.len() - 1].replace("''", "'"))
  } else {
    None
  }
}

fn matching_paren(input: &str, open: usize) -> Option<usize> {
  let mut depth = 0usize;
  let mut in_quote = false;
  for (i, c) in input[open..].char_indices() {
    match c {
      '\'' => in_quote = !in_quote,
      '(' if !in_quote => depth += 1,
      ')' if !in_quote => {
        depth -= 1;
        if depth == 0 {
          return Some(open + i);
        }
      }
      _ => {}
    }
  }
  None
}
