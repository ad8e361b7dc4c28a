//! nanamilang - a small Lisp-family language runtime
//!
//! This crate provides a tree-walking evaluator over a closed set of dynamically typed
//! values. Every value has structural (content based) equality and hashing, so the
//! persistent collections built on top of them behave the same no matter how a value
//! was constructed.
//!
//! ```text
//! (defn square [x] (* x x))
//! (map square [1 2 3])          ; [1 4 9]
//! (map :name [{:name "a"}])     ; ["a"]
//! (-> 5 (+ 1) (* 2))            ; 12
//! ```
//!
//! ## Two failure channels
//!
//! - **Host-fatal errors** ([`Error`]) abort the current top-level evaluation: spec
//!   violations, unbound identifiers, malformed special forms.
//! - **Data-level failures** ([`Failure`]) raised inside a builtin body are turned into
//!   [`value::Exception`] values by the evaluator. They are returned like any other value
//!   and every special form short-circuits on them.
//!
//! ## Modules
//!
//! - `value`: the value model (variants, hashing, truthiness, formatting)
//! - `collections`: persistent Vector, Set and Map
//! - `ast`: the form tree consumed by the evaluator
//! - `spec`: declarative arity and type contracts checked before every call
//! - `builtinops`: builtin function table and the caller-owned registry
//! - `evaluator`: environments, the eval loop and the special-form table
//! - `loader`: module loading for `require` and `import`
//! - `reader`: source text to form trees (feature `reader`)

use std::fmt;

use crate::ast::Position;
use crate::spec::Rule;
use crate::value::DataType;

/// Maximum nesting depth accepted by the reader
pub const MAX_PARSE_DEPTH: usize = 128;

/// Width `prn` truncates its joined output to
pub const DEFAULT_DISPLAY_WIDTH: usize = 67;

/// Number of frames rendered when an exception traceback is displayed
pub const DEFAULT_TRACEBACK_LIMIT: usize = 10;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (bad tokens, malformed literals)
    InvalidSyntax,
    /// Input ended before the form was complete (unterminated string, unclosed brackets)
    Incomplete,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
    /// A literal does not fit the host representation (integer overflow, invalid date)
    ImplementationLimit,
}

/// A structured error providing detailed information about a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    pub position: Position,
    /// Context snippet from the input showing where the error occurred (max 40 chars)
    pub context: Option<String>,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, position: Position) -> Self {
        ParseError {
            kind,
            message: message.into(),
            position,
            context: None,
        }
    }

    /// Attach the text following the error offset as context
    pub fn with_context(mut self, input: &str, error_offset: usize) -> Self {
        const MAX_CONTEXT: usize = 40;

        let context: String = input
            .get(error_offset..)
            .unwrap_or_default()
            .chars()
            .take(MAX_CONTEXT)
            .collect();
        if !context.is_empty() {
            self.context = Some(context.replace('\n', "\\n").replace('\r', ""));
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ParseError at {}: {}", self.position, self.message)?;
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Failures raised inside builtin logic.
///
/// These never abort evaluation: the evaluator wraps them into an Exception value
/// carrying the position of the call and the active frames.
#[derive(Debug, Clone, PartialEq, Hash, thiserror::Error)]
pub enum Failure {
    #[error("division by zero")]
    DivisionByZero,
    #[error("integer overflow in '{0}'")]
    IntegerOverflow(&'static str),
    #[error("expected an even number of map entries, got {0}")]
    OddArity(usize),
    #[error("{0}")]
    TypeMismatch(String),
    #[error("failed to write output: {0}")]
    Io(String),
    #[error("{0}")]
    User(String),
}

impl Failure {
    /// Short name of the failure kind, used when exceptions are displayed
    pub fn name(&self) -> &'static str {
        match self {
            Failure::DivisionByZero => "DivisionByZero",
            Failure::IntegerOverflow(_) => "IntegerOverflow",
            Failure::OddArity(_) => "OddArityError",
            Failure::TypeMismatch(_) => "TypeMismatch",
            Failure::Io(_) => "IOError",
            Failure::User(_) => "Error",
        }
    }
}

/// Host-fatal errors: the program or the interpreter configuration is invalid.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Parse(ParseError),
    #[error("SpecViolation: '{callee}' violates {rule}, received: [{received}]")]
    SpecViolation {
        callee: String,
        rule: Rule,
        received: String,
    },
    #[error("UnboundIdentifier: '{name}' at {position}")]
    UnboundIdentifier { name: String, position: Position },
    #[error("InvalidNativeType: {data_type} cannot wrap {native}")]
    InvalidNativeType { data_type: DataType, native: String },
    #[error("MalformedForm: {form}: {message}")]
    MalformedForm { form: String, message: String },
    #[error("NotCallable: {value} is not a Function")]
    NotCallable { value: String },
    /// A data-level failure that has not yet been turned into an Exception value
    #[error("{0}")]
    Raised(#[from] Failure),
}

impl Error {
    pub(crate) fn malformed(form: impl Into<String>, message: impl Into<String>) -> Self {
        Error::MalformedForm {
            form: form.into(),
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(message: impl Into<String>) -> Self {
        Error::Raised(Failure::TypeMismatch(message.into()))
    }
}

pub mod ast;
pub mod builtinops;
pub mod collections;
pub mod evaluator;
pub mod loader;
pub mod spec;
pub mod value;

#[cfg(feature = "reader")]
pub mod reader;

pub use crate::builtinops::{Descriptor, Registry};
pub use crate::evaluator::{Config, Evaluator};
pub use crate::value::Value;
