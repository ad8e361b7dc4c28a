//! Form trees consumed by the evaluator.
//!
//! A [`Form`] is either a literal token carrying a ready-made [`Value`], an identifier
//! token, or a list `(head ...args)` of further forms. Collection literals are plain
//! lists headed by a constructor identifier: `[a b]` is `(make-vector a b)`, `{k v}` is
//! `(make-hashmap k v)` and `#{a}` is `(make-hashset a)`. `Display` renders them back in
//! literal form.

use std::fmt;

use crate::value::Value;

pub(crate) const MAKE_VECTOR: &str = "make-vector";
pub(crate) const MAKE_HASHMAP: &str = "make-hashmap";
pub(crate) const MAKE_HASHSET: &str = "make-hashset";

/// Source position of a token, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Form {
    /// Literal token: evaluates to the wrapped value
    Literal(Value, Position),
    /// Identifier token: resolved through the environments
    Identifier(String, Position),
    /// List form `(head ...args)`
    List(Vec<Form>, Position),
}

impl Form {
    pub fn literal(value: impl Into<Value>) -> Self {
        Form::Literal(value.into(), Position::default())
    }

    pub fn identifier(name: impl Into<String>) -> Self {
        Form::Identifier(name.into(), Position::default())
    }

    pub fn list(forms: Vec<Form>) -> Self {
        Form::List(forms, Position::default())
    }

    /// Build `(make-vector ...forms)`
    pub fn vector(forms: Vec<Form>) -> Self {
        let mut items = Vec::with_capacity(forms.len() + 1);
        items.push(Form::identifier(MAKE_VECTOR));
        items.extend(forms);
        Form::list(items)
    }

    pub fn position(&self) -> Position {
        match self {
            Form::Literal(_, position) | Form::Identifier(_, position) | Form::List(_, position) => {
                *position
            }
        }
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            Form::Identifier(name, _) => Some(name),
            _ => None,
        }
    }

    fn constructor_items(&self, constructor: &str) -> Option<&[Form]> {
        match self {
            Form::List(items, _) => match items.split_first() {
                Some((head, rest)) if head.as_identifier() == Some(constructor) => Some(rest),
                _ => None,
            },
            _ => None,
        }
    }

    /// Element forms of a vector literal `[a b]`
    pub fn vector_items(&self) -> Option<&[Form]> {
        self.constructor_items(MAKE_VECTOR)
    }

    pub fn is_hashmap_literal(&self) -> bool {
        self.constructor_items(MAKE_HASHMAP).is_some()
    }

    /// Prepend `prev` as the first argument of this form (`->` threading)
    pub(crate) fn thread_first(self, prev: Form) -> Form {
        match self {
            Form::List(mut items, position) if !items.is_empty() => {
                items.insert(1, prev);
                Form::List(items, position)
            }
            other => {
                let position = other.position();
                Form::List(vec![other, prev], position)
            }
        }
    }

    /// Append `prev` as the last argument of this form (`->>` threading)
    pub(crate) fn thread_last(self, prev: Form) -> Form {
        match self {
            Form::List(mut items, position) if !items.is_empty() => {
                items.push(prev);
                Form::List(items, position)
            }
            other => {
                let position = other.position();
                Form::List(vec![other, prev], position)
            }
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Form::Literal(value, _) => write!(f, "{value}"),
            Form::Identifier(name, _) => write!(f, "{name}"),
            Form::List(items, _) => {
                if let Some(elements) = self.vector_items() {
                    return write_joined(f, "[", elements, "]");
                }
                if let Some(entries) = self.constructor_items(MAKE_HASHMAP) {
                    return write_joined(f, "{", entries, "}");
                }
                if let Some(members) = self.constructor_items(MAKE_HASHSET) {
                    return write_joined(f, "#{", members, "}");
                }
                write_joined(f, "(", items, ")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, open: &str, forms: &[Form], close: &str) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, form) in forms.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{form}")?;
    }
    write!(f, "{close}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threading_rewrites() {
        let call = Form::list(vec![Form::identifier("f"), Form::literal(1)]);
        let prev = Form::identifier("x");

        let cases = vec![
            (call.clone().thread_first(prev.clone()), "(f x 1)"),
            (call.clone().thread_last(prev.clone()), "(f 1 x)"),
            (Form::identifier("g").thread_first(prev.clone()), "(g x)"),
            (Form::identifier("g").thread_last(prev.clone()), "(g x)"),
        ];

        for (i, (actual, expected)) in cases.iter().enumerate() {
            assert_eq!(actual.to_string(), *expected, "threading case #{}", i + 1);
        }
    }

    #[test]
    fn test_vector_literal_detection() {
        let vector = Form::vector(vec![Form::identifier("a"), Form::literal(2)]);
        assert_eq!(vector.vector_items().map(<[Form]>::len), Some(2));
        assert_eq!(vector.to_string(), "[a 2]");
        assert!(Form::identifier("a").vector_items().is_none());
        assert!(!vector.is_hashmap_literal());
    }

    #[test]
    fn test_collection_literals_render_in_source_form() {
        let hashmap = Form::list(vec![
            Form::identifier(MAKE_HASHMAP),
            Form::literal(Value::Keyword("spec".to_owned())),
            Form::vector(vec![Form::literal(1)]),
        ]);
        assert!(hashmap.is_hashmap_literal());
        assert_eq!(hashmap.to_string(), "{:spec [1]}");

        let hashset = Form::list(vec![Form::identifier(MAKE_HASHSET), Form::literal(2)]);
        assert_eq!(hashset.to_string(), "#{2}");
        assert_eq!(Form::list(vec![Form::identifier(MAKE_VECTOR)]).to_string(), "[]");
    }
}
