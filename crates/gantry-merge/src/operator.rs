//! Operator token parsing.
//!
//! Operators are `(( ... ))` tokens embedded in layer values. Scalar
//! operators occupy a value position; sequence directives occupy the
//! first element of a sequence value and govern how that layer's items
//! combine with the already-merged sequence.

use gantry_core::NodePath;

/// A parsed scalar-position operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarOp {
    /// Copy the value at another path once merging completes.
    Grab(NodePath),
    /// Concatenate literals and referenced scalars into one string.
    Concat(Vec<ConcatPart>),
    /// Placeholder that a later layer must overwrite.
    Param(String),
    /// Emit the wrapped expression literally for downstream tooling.
    Defer(String),
    /// Reference to a secret store path and field.
    Secret(SecretMarker),
    /// Remove this path after all layers merge.
    Prune,
}

/// One argument of a `(( concat ... ))` operator.
#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPart {
    /// A quoted literal.
    Literal(String),
    /// A reference to a scalar elsewhere in the document.
    Ref(NodePath),
}

/// A secret reference: `(( secret db/creds:password ))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretMarker {
    /// Slash-separated secret store path.
    pub path: String,
    /// Field within the secret record.
    pub field: String,
}

impl SecretMarker {
    /// Canonical textual form of this reference.
    #[must_use]
    pub fn canonical(&self) -> String {
        format!("(( secret {}:{} ))", self.path, self.field)
    }
}

/// A sequence-combination directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeqDirective {
    /// Insert this layer's items after the existing items.
    Append,
    /// Insert this layer's items before the existing items.
    Prepend,
    /// Merge elements sharing the named identity field; append the rest.
    MergeOn(String),
    /// Replace the existing sequence wholesale.
    Replace,
}

/// Result of attempting to parse a scalar operator from a string value.
#[derive(Debug)]
pub enum OpParse {
    /// Not an operator token at all; treat as a plain string.
    NotAnOp,
    /// A recognized operator.
    Op(ScalarOp),
    /// Shaped like an operator but malformed; the reason is attached.
    Invalid(String),
}

/// Extract the inner expression of a `(( ... ))` token, if the string is
/// one.
fn inner_expr(s: &str) -> Option<&str> {
    let t = s.trim();
    let body = t.strip_prefix("((")?.strip_suffix("))")?;
    Some(body.trim())
}

/// Parse a scalar-position operator.
pub fn parse_scalar_op(s: &str) -> OpParse {
    let Some(inner) = inner_expr(s) else {
        return OpParse::NotAnOp;
    };

    if inner.is_empty() {
        return OpParse::Invalid("empty operator".to_string());
    }

    let (word, rest) = match inner.split_once(char::is_whitespace) {
        Some((w, r)) => (w, r.trim()),
        None => (inner, ""),
    };

    match word {
        "grab" => parse_grab(rest),
        "concat" => parse_concat(rest),
        "param" => {
            if rest.is_empty() {
                OpParse::Invalid("param requires a message".to_string())
            } else {
                OpParse::Op(ScalarOp::Param(unquote(rest).to_string()))
            }
        }
        "defer" => {
            if rest.is_empty() {
                OpParse::Invalid("defer requires an expression".to_string())
            } else {
                OpParse::Op(ScalarOp::Defer(rest.to_string()))
            }
        }
        "secret" => parse_secret(rest),
        "prune" => {
            if rest.is_empty() {
                OpParse::Op(ScalarOp::Prune)
            } else {
                OpParse::Invalid("prune takes no arguments".to_string())
            }
        }
        // Sequence directives are only meaningful as a first sequence
        // element; in scalar position they are malformed.
        "append" | "prepend" | "replace" | "merge" => OpParse::Invalid(format!(
            "'{word}' is a sequence directive and cannot appear as a value"
        )),
        other => OpParse::Invalid(format!("unknown operator '{other}'")),
    }
}

fn parse_grab(rest: &str) -> OpParse {
    if rest.is_empty() || rest.split_whitespace().count() != 1 {
        return OpParse::Invalid("grab requires exactly one path".to_string());
    }

    match NodePath::parse(rest) {
        Ok(path) => OpParse::Op(ScalarOp::Grab(path)),
        Err(e) => OpParse::Invalid(e.to_string()),
    }
}

fn parse_concat(rest: &str) -> OpParse {
    let tokens = match tokenize(rest) {
        Ok(tokens) => tokens,
        Err(reason) => return OpParse::Invalid(reason),
    };

    if tokens.is_empty() {
        return OpParse::Invalid("concat requires at least one argument".to_string());
    }

    let mut parts = Vec::with_capacity(tokens.len());
    for token in tokens {
        match token {
            Token::Quoted(lit) => parts.push(ConcatPart::Literal(lit)),
            Token::Word(word) => match NodePath::parse(&word) {
                Ok(path) => parts.push(ConcatPart::Ref(path)),
                Err(e) => return OpParse::Invalid(e.to_string()),
            },
        }
    }

    OpParse::Op(ScalarOp::Concat(parts))
}

fn parse_secret(rest: &str) -> OpParse {
    if rest.is_empty() || rest.split_whitespace().count() != 1 {
        return OpParse::Invalid("secret requires exactly one path:field reference".to_string());
    }

    let Some((path, field)) = rest.rsplit_once(':') else {
        return OpParse::Invalid("secret reference must be path:field".to_string());
    };

    if path.is_empty() || field.is_empty() {
        return OpParse::Invalid("secret path and field cannot be empty".to_string());
    }

    OpParse::Op(ScalarOp::Secret(SecretMarker {
        path: path.to_string(),
        field: field.to_string(),
    }))
}

/// Parse a sequence-combination directive from the first element of a
/// sequence value. Returns `None` when the element is not a directive.
#[must_use]
pub fn parse_seq_directive(first: &serde_yaml::Value) -> Option<SeqDirective> {
    let s = first.as_str()?;
    let inner = inner_expr(s)?;

    match inner {
        "append" => Some(SeqDirective::Append),
        "prepend" => Some(SeqDirective::Prepend),
        "replace" => Some(SeqDirective::Replace),
        _ => {
            let key = inner.strip_prefix("merge on")?.trim();
            if key.is_empty() || key.split_whitespace().count() != 1 {
                return None;
            }
            Some(SeqDirective::MergeOn(key.to_string()))
        }
    }
}

enum Token {
    Word(String),
    Quoted(String),
}

/// Split an operator argument list into words and double-quoted literals.
fn tokenize(input: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' {
            chars.next();
            let mut lit = String::new();
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some(ch) => lit.push(ch),
                    None => return Err("unterminated quoted literal".to_string()),
                }
            }
            tokens.push(Token::Quoted(lit));
        } else {
            let mut word = String::new();
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() {
                    break;
                }
                word.push(ch);
                chars.next();
            }
            tokens.push(Token::Word(word));
        }
    }

    Ok(tokens)
}

fn unquote(s: &str) -> &str {
    let t = s.trim();
    t.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(t)
}
