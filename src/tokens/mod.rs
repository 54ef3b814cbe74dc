pub mod resolver;
pub mod table;

use std::rc::Rc;

use serde_json::Value;

use crate::tokens::table::{Token, TokenTable};

/// Intern a Terraform function call, e.g. `join("-", ["a", "b"])`, and return
/// its string handle.
pub fn fn_token(table: &mut TokenTable, name: &str, args: Vec<Value>) -> String {
    table.create(Token::Fn {
        name: name.to_string(),
        args,
    })
}

/// Intern raw expression text emitted verbatim at resolution time.
pub fn raw_token(table: &mut TokenTable, expression: &str) -> String {
    table.create(Token::Raw {
        expression: expression.to_string(),
    })
}

/// Intern a deferred computation. The producer runs during synthesis and may
/// return a concrete value or further token handles.
pub fn lazy_token(table: &mut TokenTable, producer: Rc<dyn Fn() -> Value>) -> String {
    table.create(Token::Lazy { producer })
}
