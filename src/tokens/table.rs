use std::fmt;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::construct::tree::NodeId;

/// Marker occupying the high 16 bits of an encoded-number handle.
pub const NUMBER_MARKER: u64 = 0x48C0;

/// The substring every string handle contains.
pub const STRING_MARKER: &str = "${TfToken[";

/// Matches `${TfToken[<id>]}` occurrences inside strings.
pub(crate) static HANDLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{TfToken\[(\d+)\]\}").expect("handle regex"));

/// A deferred expression, interned in the app's [`TokenTable`] and stood in
/// for by a string or number handle until synthesis resolves it.
#[derive(Clone)]
pub enum Token {
    /// A reference to an attribute of an element, encoded `${<fqn>.<attr>}`.
    /// `attribute` is `None` for elements referenced bare, like variables.
    Ref {
        target: NodeId,
        attribute: Option<String>,
    },
    /// A Terraform function call, encoded `${<name>(<arg>, …)}`.
    Fn { name: String, args: Vec<Value> },
    /// Arbitrary expression text emitted verbatim.
    Raw { expression: String },
    /// A deferred computation returning a token handle or a concrete value.
    Lazy { producer: Rc<dyn Fn() -> Value> },
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ref { target, attribute } => f
                .debug_struct("Ref")
                .field("target", target)
                .field("attribute", attribute)
                .finish(),
            Token::Fn { name, args } => f
                .debug_struct("Fn")
                .field("name", name)
                .field("args", args)
                .finish(),
            Token::Raw { expression } => {
                f.debug_struct("Raw").field("expression", expression).finish()
            }
            Token::Lazy { .. } => f.write_str("Lazy { .. }"),
        }
    }
}

/// Append-only interning table for tokens. Owned by the app: two apps
/// synthesizing in one process each carry their own table, so ids never
/// cross runs. An id is never reused.
#[derive(Default)]
pub struct TokenTable {
    tokens: Vec<Token>,
}

impl TokenTable {
    pub fn new() -> TokenTable {
        TokenTable { tokens: Vec::new() }
    }

    /// Intern `token` and return its string handle `"${TfToken[<id>]}"`.
    pub fn create(&mut self, token: Token) -> String {
        let id = self.tokens.len();
        self.tokens.push(token);
        format!("${{TfToken[{}]}}", id)
    }

    /// Intern `token` and return a number handle: an f64 whose raw bits carry
    /// the marker and id. The value must round-trip bit-for-bit; arithmetic on
    /// it produces nonsense, callers treat it as opaque.
    ///
    /// The encoding carries 16 id bits; past 65 535 interned tokens a number
    /// handle can no longer be represented and NaN is returned.
    pub fn create_number(&mut self, token: Token) -> f64 {
        let id = self.tokens.len();
        if id > 0xFFFF {
            tracing::error!(id, "number token id exceeds the 16-bit handle range");
            return f64::NAN;
        }
        self.tokens.push(token);
        encode_number_id(id)
    }

    pub fn get(&self, id: usize) -> Option<&Token> {
        self.tokens.get(id)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn encode_number_id(id: usize) -> f64 {
    let high_word = 0x48C0_0000u64 | id as u64;
    f64::from_bits(high_word << 32)
}

/// Decode a number handle back to its token id, if the marker matches.
pub fn number_token_id(n: f64) -> Option<usize> {
    let bits = n.to_bits();
    if bits >> 48 == NUMBER_MARKER {
        Some(((bits >> 32) & 0xFFFF) as usize)
    } else {
        None
    }
}

/// Whether a raw JSON number holds an encoded handle.
pub(crate) fn json_number_token_id(n: &serde_json::Number) -> Option<usize> {
    n.as_f64().and_then(number_token_id)
}

/// True when the string contains at least one token handle.
pub fn string_contains_tokens(s: &str) -> bool {
    s.contains(STRING_MARKER)
}

/// Recursively scan a value for token handles: marker substrings in strings,
/// marker bits in numbers, or either inside containers.
pub fn contains_tokens(value: &Value) -> bool {
    match value {
        Value::String(s) => string_contains_tokens(s),
        Value::Number(n) => json_number_token_id(n).is_some(),
        Value::Array(items) => items.iter().any(contains_tokens),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| string_contains_tokens(k) || contains_tokens(v)),
        _ => false,
    }
}

/// Collect every token id reachable in a value, without resolving anything.
pub(crate) fn collect_token_ids(value: &Value, out: &mut Vec<usize>) {
    match value {
        Value::String(s) => collect_string_token_ids(s, out),
        Value::Number(n) => {
            if let Some(id) = json_number_token_id(n) {
                out.push(id);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_token_ids(item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                collect_string_token_ids(key, out);
                collect_token_ids(item, out);
            }
        }
        _ => {}
    }
}

fn collect_string_token_ids(s: &str, out: &mut Vec<usize>) {
    for cap in HANDLE_RE.captures_iter(s) {
        if let Ok(id) = cap[1].parse::<usize>() {
            out.push(id);
        }
    }
}
