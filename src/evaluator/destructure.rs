//! Binding targets for `let`, `for` and function parameters.
//!
//! A target is an identifier (binds the whole value), `_` (discards it) or a vector
//! form of further targets binding positionally. Inside a vector target, `& rest` binds
//! every remaining element as a Vector.

use crate::ast::Form;
use crate::collections::Vector;
use crate::spec::Rule;
use crate::value::Value;
use crate::{Error, Failure};

const IGNORE: &str = "_";
const REST: &str = "&";

/// Split the items of a vector target into positional targets and the optional rest target
fn split_rest(target: &Form, items: &[Form]) -> Result<(usize, Option<usize>), Error> {
    match items.iter().position(|item| item.as_identifier() == Some(REST)) {
        None => Ok((items.len(), None)),
        Some(at) if at + 2 == items.len() => Ok((at, Some(at + 1))),
        Some(_) => Err(Error::malformed(
            target.to_string(),
            "'&' must be followed by exactly one target",
        )),
    }
}

/// Bind `value` against `target`, returning the name/value pairs in binding order
pub(crate) fn destructure(target: &Form, value: Value) -> Result<Vec<(String, Value)>, Error> {
    let mut bindings = Vec::new();
    bind(target, value, &mut bindings)?;
    Ok(bindings)
}

fn bind(target: &Form, value: Value, bindings: &mut Vec<(String, Value)>) -> Result<(), Error> {
    if let Some(name) = target.as_identifier() {
        if name != IGNORE {
            bindings.push((name.to_owned(), value));
        }
        return Ok(());
    }
    let Some(items) = target.vector_items() else {
        return Err(Error::malformed(
            target.to_string(),
            "binding target should be an identifier or a vector",
        ));
    };
    let Value::Vector(elements) = value else {
        return Err(Error::Raised(Failure::TypeMismatch(format!(
            "cannot destructure {} with {target}",
            value.data_type()
        ))));
    };

    let (positional, rest) = split_rest(target, items)?;
    for (i, item) in items[..positional].iter().enumerate() {
        let element = elements.nth(i).cloned().unwrap_or(Value::Nil);
        bind(item, element, bindings)?;
    }
    if let Some(rest) = rest {
        let remaining: Vector = elements.iter().skip(positional).cloned().collect();
        bind(&items[rest], Value::Vector(remaining), bindings)?;
    }
    Ok(())
}

/// Implicit arity rule of a parameter vector: `ArityIs(n)`, or `ArityAtLeast(n)` with a rest target
pub(crate) fn parameter_arity(params: &Form) -> Result<Rule, Error> {
    let Some(items) = params.vector_items() else {
        return Err(Error::malformed(
            params.to_string(),
            "parameters should be a vector",
        ));
    };
    let rule = match split_rest(params, items)? {
        (positional, None) => Rule::ArityIs(positional),
        (positional, Some(_)) => Rule::ArityAtLeast(positional),
    };
    Ok(rule)
}
