use serde_json::{Map, Value};

use crate::construct::tree::{NodeId, Tree};
use crate::elements::element_fqn;
use crate::errors::{Result, SynthError};
use crate::stack::cross_stack;
use crate::tokens::table::{json_number_token_id, Token, TokenTable, HANDLE_RE};

/// Lazy producers may chain; past this depth the chain is declared cyclic.
const MAX_LAZY_DEPTH: usize = 32;

/// Walks values inside one stack, replacing token handles with Terraform
/// expression text. References that cross stack boundaries are routed through
/// the cross-stack rewriter, which registers the paired output and
/// remote-state elements as a side effect.
pub struct Resolver<'a> {
    tree: &'a mut Tree,
    tokens: &'a TokenTable,
    stack: NodeId,
    path: Vec<String>,
    lazy_depth: usize,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a mut Tree, tokens: &'a TokenTable, stack: NodeId) -> Resolver<'a> {
        Resolver {
            tree,
            tokens,
            stack,
            path: Vec::new(),
            lazy_depth: 0,
        }
    }

    /// Resolve every token handle in `value`. Values without handles pass
    /// through unchanged.
    pub fn resolve(&mut self, value: &Value) -> Result<Value> {
        match value {
            Value::Null | Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match json_number_token_id(n) {
                Some(id) => match self.resolve_token_id(id)? {
                    Some(replacement) => Ok(replacement),
                    None => Ok(value.clone()),
                },
                None => Ok(value.clone()),
            },
            Value::String(s) => self.resolve_string(s),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    self.path.push(i.to_string());
                    let resolved = self.resolve(item);
                    self.path.pop();
                    out.push(resolved?);
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (key, item) in map {
                    self.path.push(key.clone());
                    let resolved_key = match self.resolve_string(key)? {
                        Value::String(k) => k,
                        other => stringify(&other),
                    };
                    let resolved = self.resolve(item);
                    self.path.pop();
                    out.insert(resolved_key, resolved?);
                }
                Ok(Value::Object(out))
            }
        }
    }

    /// Scan a string for `${TfToken[<id>]}` occurrences.
    ///
    /// A whole-string handle preserves the replacement's type; embedded
    /// handles are stringified and concatenated with the literal fragments.
    /// Unknown ids leave the handle textually intact.
    fn resolve_string(&mut self, s: &str) -> Result<Value> {
        let matches: Vec<(usize, usize, usize)> = HANDLE_RE
            .captures_iter(s)
            .filter_map(|cap| {
                let m = cap.get(0)?;
                let id = cap[1].parse::<usize>().ok()?;
                Some((m.start(), m.end(), id))
            })
            .collect();

        if matches.is_empty() {
            return Ok(Value::String(s.to_string()));
        }

        if matches.len() == 1 && matches[0].0 == 0 && matches[0].1 == s.len() {
            return match self.resolve_token_id(matches[0].2)? {
                Some(replacement) => Ok(replacement),
                None => Ok(Value::String(s.to_string())),
            };
        }

        let mut out = String::new();
        let mut cursor = 0;
        for (start, end, id) in matches {
            out.push_str(&s[cursor..start]);
            match self.resolve_token_id(id)? {
                Some(replacement) => out.push_str(&stringify(&replacement)),
                None => out.push_str(&s[start..end]),
            }
            cursor = end;
        }
        out.push_str(&s[cursor..]);
        Ok(Value::String(out))
    }

    /// Resolve one interned token. `None` means the id is unknown and the
    /// caller keeps the original handle text.
    fn resolve_token_id(&mut self, id: usize) -> Result<Option<Value>> {
        let token = match self.tokens.get(id) {
            Some(token) => token.clone(),
            None => {
                tracing::debug!(id, "leaving unknown token handle intact");
                return Ok(None);
            }
        };
        self.resolve_token(&token).map(Some)
    }

    fn resolve_token(&mut self, token: &Token) -> Result<Value> {
        match token {
            Token::Ref { target, attribute } => self
                .ref_replacement(*target, attribute.as_deref())
                .map(Value::String),
            Token::Fn { name, args } => {
                let expr = self.fn_expression(name, args)?;
                Ok(Value::String(format!("${{{}}}", expr)))
            }
            Token::Raw { expression } => Ok(Value::String(expression.clone())),
            Token::Lazy { producer } => {
                if self.lazy_depth >= MAX_LAZY_DEPTH {
                    return Err(SynthError::UnresolvedToken {
                        path: self.path.join("."),
                        reason: "lazy token chain exceeded the resolution depth limit (is a producer returning itself?)".to_string(),
                    });
                }
                self.lazy_depth += 1;
                let produced = producer();
                let resolved = self.resolve(&produced);
                self.lazy_depth -= 1;
                resolved
            }
        }
    }

    /// The interpolation a reference resolves to: `${fqn.attr}` inside its
    /// own stack, a remote-state read when it crosses stacks.
    fn ref_replacement(&mut self, target: NodeId, attribute: Option<&str>) -> Result<String> {
        match self.tree.containing_stack(target) {
            Some(source_stack) if source_stack != self.stack => {
                cross_stack::rewrite_foreign_ref(self.tree, target, attribute, self.stack)
            }
            _ => Ok(format!("${{{}}}", ref_expression(self.tree, target, attribute))),
        }
    }

    /// The bare (unwrapped) expression for a token, used in function-argument
    /// position.
    fn expression(&mut self, token: &Token) -> Result<String> {
        match token {
            Token::Ref { target, attribute } => {
                let wrapped = self.ref_replacement(*target, attribute.as_deref())?;
                Ok(unwrap_interpolation(&wrapped))
            }
            Token::Fn { name, args } => self.fn_expression(name, args),
            Token::Raw { expression } => Ok(expression.clone()),
            Token::Lazy { .. } => {
                let produced = self.resolve_token(token)?;
                self.arg_expression(&produced)
            }
        }
    }

    fn fn_expression(&mut self, name: &str, args: &[Value]) -> Result<String> {
        let mut rendered = Vec::with_capacity(args.len());
        for arg in args {
            rendered.push(self.arg_expression(arg)?);
        }
        Ok(format!("{}({})", name, rendered.join(", ")))
    }

    /// Render a value as Terraform expression text: strings quoted, numbers
    /// and booleans bare, arrays and objects in HCL literal syntax, nested
    /// token handles embedded as expressions.
    fn arg_expression(&mut self, value: &Value) -> Result<String> {
        match value {
            Value::Null => Ok("null".to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Number(n) => match json_number_token_id(n).and_then(|id| self.tokens.get(id)) {
                Some(token) => {
                    let token = token.clone();
                    self.expression(&token)
                }
                None => Ok(n.to_string()),
            },
            Value::String(s) => self.string_arg_expression(s),
            Value::Array(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in items {
                    rendered.push(self.arg_expression(item)?);
                }
                Ok(format!("[{}]", rendered.join(", ")))
            }
            Value::Object(map) => {
                let mut rendered = Vec::with_capacity(map.len());
                for (key, item) in map {
                    rendered.push(format!(
                        "{} = {}",
                        object_key_expression(key),
                        self.arg_expression(item)?
                    ));
                }
                Ok(format!("{{{}}}", rendered.join(", ")))
            }
        }
    }

    fn string_arg_expression(&mut self, s: &str) -> Result<String> {
        let matches: Vec<(usize, usize, usize)> = HANDLE_RE
            .captures_iter(s)
            .filter_map(|cap| {
                let m = cap.get(0)?;
                let id = cap[1].parse::<usize>().ok()?;
                Some((m.start(), m.end(), id))
            })
            .collect();

        if matches.is_empty() {
            return Ok(quote_string(s));
        }

        // A whole-string handle is a bare expression, not a quoted string.
        if matches.len() == 1 && matches[0].0 == 0 && matches[0].1 == s.len() {
            let token = self.tokens.get(matches[0].2).cloned();
            return match token {
                Some(token) => self.expression(&token),
                None => Ok(quote_string(s)),
            };
        }

        // Mixed literal text and handles: a quoted template string with the
        // handles re-wrapped as interpolations.
        let mut out = String::from("\"");
        let mut cursor = 0;
        for (start, end, id) in matches {
            out.push_str(&escape_string(&s[cursor..start]));
            match self.tokens.get(id).cloned() {
                Some(token) => {
                    let expr = self.expression(&token)?;
                    out.push_str("${");
                    out.push_str(&expr);
                    out.push('}');
                }
                None => out.push_str(&escape_string(&s[start..end])),
            }
            cursor = end;
        }
        out.push_str(&escape_string(&s[cursor..]));
        out.push('"');
        Ok(out)
    }
}

/// The `fqn[.attr]` text a reference encodes.
pub(crate) fn ref_expression(tree: &Tree, target: NodeId, attribute: Option<&str>) -> String {
    let fqn = element_fqn(tree, target);
    match attribute {
        Some(attr) => format!("{}.{}", fqn, attr),
        None => fqn,
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Strip the `${…}` wrapper off a single interpolation.
fn unwrap_interpolation(s: &str) -> String {
    match s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(inner) => inner.to_string(),
        None => s.to_string(),
    }
}

fn quote_string(s: &str) -> String {
    format!("\"{}\"", escape_string(s))
}

fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Bare identifiers stay bare in object expressions; anything else is quoted.
fn object_key_expression(key: &str) -> String {
    let mut chars = key.chars();
    let bare = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if bare {
        key.to_string()
    } else {
        quote_string(key)
    }
}
