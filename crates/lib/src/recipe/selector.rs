//! Line selector evaluation for recipe metadata.
//!
//! A recipe line may end with a selector comment that decides whether the
//! line applies to the environment being built:
//!
//! ```yaml
//! build:
//!   skip: True  # [py27 or osx]
//! requirements:
//!   run:
//!     - futures  # [py < 30]
//! ```
//!
//! # Grammar
//!
//! ```text
//! expr    := or
//! or      := and ("or" and)*
//! and     := not ("and" not)*
//! not     := "not" not | cmp
//! cmp     := atom (("==" | "!=" | "<" | "<=" | ">" | ">=") atom)?
//! atom    := IDENT | INT | "(" expr ")"
//! ```
//!
//! Identifiers that are not defined evaluate to false, and any comparison
//! involving them is false.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors from parsing a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
  #[error("unexpected character '{0}' at position {1}")]
  UnexpectedChar(char, usize),

  #[error("unexpected end of selector")]
  UnexpectedEnd,

  #[error("unexpected token '{0}'")]
  UnexpectedToken(String),
}

/// A value a selector identifier can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorValue {
  Bool(bool),
  Int(i64),
}

/// Identifier bindings visible to selectors.
pub type Namespace = BTreeMap<String, SelectorValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
  Ident(String),
  Int(i64),
  Op(&'static str),
  LParen,
  RParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Val {
  Bool(bool),
  Int(i64),
  Undefined,
}

impl Val {
  fn truthy(self) -> bool {
    match self {
      Val::Bool(b) => b,
      Val::Int(i) => i != 0,
      Val::Undefined => false,
    }
  }
}

/// Split a line into its content and trailing selector, if it has one.
///
/// `"  - futures  # [py27]"` becomes `Some(("  - futures  ", "py27"))`.
pub fn split_selector(line: &str) -> Option<(&str, &str)> {
  let trimmed = line.trim_end();
  if !trimmed.ends_with(']') {
    return None;
  }
  let hash = trimmed.rfind('#')?;
  let rest = trimmed[hash + 1..].trim_start();
  let inner = rest.strip_prefix('[')?.strip_suffix(']')?;
  Some((&line[..hash], inner.trim()))
}

/// Evaluate a selector expression against a namespace.
pub fn evaluate(selector: &str, namespace: &Namespace) -> Result<bool, SelectorError> {
  let tokens = tokenize(selector)?;
  let mut parser = Parser {
    tokens: &tokens,
    pos: 0,
    namespace,
  };
  let value = parser.or()?;
  if let Some(tok) = parser.tokens.get(parser.pos) {
    return Err(SelectorError::UnexpectedToken(format!("{:?}", tok)));
  }
  Ok(value.truthy())
}

fn tokenize(input: &str) -> Result<Vec<Token>, SelectorError> {
  let mut tokens = Vec::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    match ch {
      c if c.is_whitespace() => {}
      '(' => tokens.push(Token::LParen),
      ')' => tokens.push(Token::RParen),
      '=' | '!' | '<' | '>' => {
        let followed_by_eq = matches!(chars.peek(), Some((_, '=')));
        if followed_by_eq {
          chars.next();
        }
        let op = match (ch, followed_by_eq) {
          ('=', true) => "==",
          ('!', true) => "!=",
          ('<', true) => "<=",
          ('>', true) => ">=",
          ('<', false) => "<",
          ('>', false) => ">",
          _ => return Err(SelectorError::UnexpectedChar(ch, pos)),
        };
        tokens.push(Token::Op(op));
      }
      c if c.is_ascii_digit() => {
        let mut digits = c.to_string();
        while let Some((_, d)) = chars.peek().copied().filter(|(_, d)| d.is_ascii_digit()) {
          digits.push(d);
          chars.next();
        }
        let value = digits.parse().map_err(|_| SelectorError::UnexpectedChar(c, pos))?;
        tokens.push(Token::Int(value));
      }
      c if c.is_ascii_alphabetic() || c == '_' => {
        let mut ident = c.to_string();
        while let Some((_, d)) = chars
          .peek()
          .copied()
          .filter(|(_, d)| d.is_ascii_alphanumeric() || *d == '_')
        {
          ident.push(d);
          chars.next();
        }
        tokens.push(Token::Ident(ident));
      }
      other => return Err(SelectorError::UnexpectedChar(other, pos)),
    }
  }

  Ok(tokens)
}

struct Parser<'a> {
  tokens: &'a [Token],
  pos: usize,
  namespace: &'a Namespace,
}

impl Parser<'_> {
  fn peek_ident(&self, word: &str) -> bool {
    matches!(self.tokens.get(self.pos), Some(Token::Ident(id)) if id == word)
  }

  fn or(&mut self) -> Result<Val, SelectorError> {
    let mut value = self.and()?.truthy();
    while self.peek_ident("or") {
      self.pos += 1;
      let rhs = self.and()?.truthy();
      value = value || rhs;
    }
    Ok(Val::Bool(value))
  }

  fn and(&mut self) -> Result<Val, SelectorError> {
    let mut value = self.not()?.truthy();
    while self.peek_ident("and") {
      self.pos += 1;
      let rhs = self.not()?.truthy();
      value = value && rhs;
    }
    Ok(Val::Bool(value))
  }

  fn not(&mut self) -> Result<Val, SelectorError> {
    if self.peek_ident("not") {
      self.pos += 1;
      return Ok(Val::Bool(!self.not()?.truthy()));
    }
    self.cmp()
  }

  fn cmp(&mut self) -> Result<Val, SelectorError> {
    let lhs = self.atom()?;
    let Some(Token::Op(op)) = self.tokens.get(self.pos) else {
      return Ok(lhs);
    };
    let op = *op;
    self.pos += 1;
    let rhs = self.atom()?;

    let result = match (lhs, rhs) {
      (Val::Int(a), Val::Int(b)) => match op {
        "==" => a == b,
        "!=" => a != b,
        "<" => a < b,
        "<=" => a <= b,
        ">" => a > b,
        ">=" => a >= b,
        _ => false,
      },
      (Val::Bool(a), Val::Bool(b)) => match op {
        "==" => a == b,
        "!=" => a != b,
        _ => false,
      },
      _ => false,
    };
    Ok(Val::Bool(result))
  }

  fn atom(&mut self) -> Result<Val, SelectorError> {
    let tok = self.tokens.get(self.pos).cloned().ok_or(SelectorError::UnexpectedEnd)?;
    self.pos += 1;
    match tok {
      Token::Int(i) => Ok(Val::Int(i)),
      Token::Ident(id) => Ok(match self.namespace.get(&id) {
        Some(SelectorValue::Bool(b)) => Val::Bool(*b),
        Some(SelectorValue::Int(i)) => Val::Int(*i),
        None => Val::Undefined,
      }),
      Token::LParen => {
        let value = self.or()?;
        match self.tokens.get(self.pos) {
          Some(Token::RParen) => {
            self.pos += 1;
            Ok(value)
          }
          Some(other) => Err(SelectorError::UnexpectedToken(format!("{:?}", other))),
          None => Err(SelectorError::UnexpectedEnd),
        }
      }
      other => Err(SelectorError::UnexpectedToken(format!("{:?}", other))),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn ns() -> Namespace {
    let mut ns = Namespace::new();
    ns.insert("py".into(), SelectorValue::Int(27));
    ns.insert("py27".into(), SelectorValue::Bool(true));
    ns.insert("py3k".into(), SelectorValue::Bool(false));
    ns.insert("linux".into(), SelectorValue::Bool(true));
    ns.insert("osx".into(), SelectorValue::Bool(false));
    ns
  }

  mod split {
    use super::*;

    #[test]
    fn finds_trailing_selector() {
      assert_eq!(split_selector("  - futures  # [py27]"), Some(("  - futures  ", "py27")));
    }

    #[test]
    fn tolerates_spacing() {
      assert_eq!(split_selector("skip: True #[ not linux ]  "), Some(("skip: True ", "not linux")));
    }

    #[test]
    fn plain_comment_is_not_a_selector() {
      assert_eq!(split_selector("name: foo  # the name"), None);
      assert_eq!(split_selector("  - python"), None);
    }
  }

  mod eval {
    use super::*;

    #[test]
    fn identifiers() {
      assert!(evaluate("py27", &ns()).unwrap());
      assert!(!evaluate("py3k", &ns()).unwrap());
      assert!(!evaluate("win", &ns()).unwrap());
    }

    #[test]
    fn boolean_operators() {
      assert!(evaluate("py27 and linux", &ns()).unwrap());
      assert!(evaluate("osx or linux", &ns()).unwrap());
      assert!(!evaluate("not linux", &ns()).unwrap());
      assert!(evaluate("not (osx or py3k)", &ns()).unwrap());
    }

    #[test]
    fn comparisons() {
      assert!(evaluate("py < 30", &ns()).unwrap());
      assert!(evaluate("py==27", &ns()).unwrap());
      assert!(!evaluate("py >= 35", &ns()).unwrap());
      assert!(evaluate("py != 35 and linux", &ns()).unwrap());
    }

    #[test]
    fn undefined_comparisons_are_false() {
      assert!(!evaluate("np >= 110", &ns()).unwrap());
      assert!(!evaluate("np < 110", &ns()).unwrap());
    }

    #[test]
    fn malformed_selectors_error() {
      assert_eq!(evaluate("py27 and", &ns()), Err(SelectorError::UnexpectedEnd));
      assert!(matches!(evaluate("py $ 2", &ns()), Err(SelectorError::UnexpectedChar('$', 3))));
      assert!(evaluate("(py27", &ns()).is_err());
      assert!(evaluate("py27 linux", &ns()).is_err());
    }
  }
}
