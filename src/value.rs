//! This module defines the closed set of runtime values. The main enum, [`Value`],
//! covers every variant the language knows about: scalars, persistent collections,
//! callables, exception values, type tags and opaque host handles.
//!
//! Equality and hashing are structural. Two independently built values with the same
//! variant and equal content are equal and hash equal, and collections combine the
//! hashes of their elements (order-sensitive for Vector, order-insensitive for Set and
//! Map). Callables and host handles have no content to compare, so they use the
//! identity of the shared descriptor or handle.

use std::fmt;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::rc::Rc;

use chrono::NaiveDate;

use crate::Error;
use crate::Failure;
use crate::ast::Position;
use crate::builtinops::{Function, Macro};
use crate::collections::{Map, Set, Vector};
use crate::evaluator::Evaluator;

/// Variant tags of the closed value union
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataType {
    Nil,
    Undefined,
    Boolean,
    String,
    Character,
    Date,
    IntegerNumber,
    FloatNumber,
    Keyword,
    Symbol,
    Vector,
    Set,
    Map,
    Function,
    Macro,
    Exception,
    Type,
    Object,
    Instance,
}

impl DataType {
    pub const ALL: [DataType; 19] = [
        DataType::Nil,
        DataType::Undefined,
        DataType::Boolean,
        DataType::String,
        DataType::Character,
        DataType::Date,
        DataType::IntegerNumber,
        DataType::FloatNumber,
        DataType::Keyword,
        DataType::Symbol,
        DataType::Vector,
        DataType::Set,
        DataType::Map,
        DataType::Function,
        DataType::Macro,
        DataType::Exception,
        DataType::Type,
        DataType::Object,
        DataType::Instance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            DataType::Nil => "Nil",
            DataType::Undefined => "Undefined",
            DataType::Boolean => "Boolean",
            DataType::String => "String",
            DataType::Character => "Character",
            DataType::Date => "Date",
            DataType::IntegerNumber => "IntegerNumber",
            DataType::FloatNumber => "FloatNumber",
            DataType::Keyword => "Keyword",
            DataType::Symbol => "Symbol",
            DataType::Vector => "Vector",
            DataType::Set => "Set",
            DataType::Map => "Map",
            DataType::Function => "Function",
            DataType::Macro => "Macro",
            DataType::Exception => "Exception",
            DataType::Type => "Type",
            DataType::Object => "Object",
            DataType::Instance => "Instance",
        }
    }

    pub fn from_name(name: &str) -> Option<DataType> {
        DataType::ALL.into_iter().find(|data_type| data_type.name() == name)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A variant or a capability grouping over several variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeConstraint {
    Exactly(DataType),
    /// IntegerNumber or FloatNumber
    Numeric,
    /// Vector, Set or Map
    Collection,
    /// Function or Macro
    Callable,
    Any,
}

impl TypeConstraint {
    pub fn admits(self, value: &Value) -> bool {
        let data_type = value.data_type();
        match self {
            TypeConstraint::Exactly(expected) => data_type == expected,
            TypeConstraint::Numeric => {
                matches!(data_type, DataType::IntegerNumber | DataType::FloatNumber)
            }
            TypeConstraint::Collection => {
                matches!(data_type, DataType::Vector | DataType::Set | DataType::Map)
            }
            TypeConstraint::Callable => matches!(data_type, DataType::Function | DataType::Macro),
            TypeConstraint::Any => true,
        }
    }

    pub fn from_name(name: &str) -> Option<TypeConstraint> {
        match name {
            "Numeric" => Some(TypeConstraint::Numeric),
            "Collection" => Some(TypeConstraint::Collection),
            "Callable" => Some(TypeConstraint::Callable),
            "Any" | "Base" => Some(TypeConstraint::Any),
            other => DataType::from_name(other).map(TypeConstraint::Exactly),
        }
    }
}

impl From<DataType> for TypeConstraint {
    fn from(data_type: DataType) -> Self {
        TypeConstraint::Exactly(data_type)
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeConstraint::Exactly(data_type) => write!(f, "{data_type}"),
            TypeConstraint::Numeric => f.write_str("Numeric"),
            TypeConstraint::Collection => f.write_str("Collection"),
            TypeConstraint::Callable => f.write_str("Callable"),
            TypeConstraint::Any => f.write_str("Any"),
        }
    }
}

/// Host representation wrapped by a value
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    None,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Char(char),
    Date(NaiveDate),
    /// Elements of a Vector or Set, or the flat key/value sequence of a Map
    Items(Vec<Value>),
    Type(DataType),
    /// Values that wrap nothing but themselves: callables, exceptions, host handles
    Opaque(Value),
}

/// Hooks a host object exposes to the language
pub trait HostObject: fmt::Debug {
    fn type_name(&self) -> &str;

    fn attribute(&self, _name: &str) -> Option<Value> {
        None
    }

    fn attribute_names(&self) -> Vec<String> {
        Vec::new()
    }

    fn call(&self, _evaluator: &Evaluator, _args: Vec<Value>) -> Result<Value, Error> {
        Err(Error::NotCallable {
            value: format!("#<object {}>", self.type_name()),
        })
    }
}

/// Shared handle to a host object; equal only to clones of itself
#[derive(Debug, Clone)]
pub struct Handle(Rc<dyn HostObject>);

impl Handle {
    pub fn new(object: impl HostObject + 'static) -> Self {
        Handle(Rc::new(object))
    }

    pub fn object(&self) -> &dyn HostObject {
        self.0.as_ref()
    }

    fn address(&self) -> usize {
        Rc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

/// A call frame active while an exception was raised
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub name: String,
    pub position: Position,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.name, self.position)
    }
}

#[derive(Debug)]
struct ExceptionData {
    failure: Failure,
    position: Position,
    traceback: Vec<Frame>,
}

/// First-class representation of a failure; position and traceback are fixed at creation
#[derive(Debug, Clone)]
pub struct Exception(Rc<ExceptionData>);

impl Exception {
    pub fn new(failure: Failure, position: Position, traceback: Vec<Frame>) -> Self {
        Exception(Rc::new(ExceptionData {
            failure,
            position,
            traceback,
        }))
    }

    pub fn failure(&self) -> &Failure {
        &self.0.failure
    }

    pub fn position(&self) -> Position {
        self.0.position
    }

    pub fn traceback(&self) -> &[Frame] {
        &self.0.traceback
    }

    /// Render the innermost `limit` frames, outermost first
    pub fn format_traceback(&self, limit: usize) -> String {
        let frames = self.traceback();
        let skipped = frames.len().saturating_sub(limit);
        let mut lines = Vec::with_capacity(frames.len() - skipped + 2);
        lines.push(format!("{}: {}", self.failure().name(), self.failure()));
        if skipped > 0 {
            lines.push(format!("  ... {skipped} more frame(s)"));
        }
        for frame in &frames[skipped..] {
            lines.push(format!("  in {frame}"));
        }
        lines.join("\n")
    }
}

impl PartialEq for Exception {
    fn eq(&self, other: &Self) -> bool {
        self.failure() == other.failure() && self.position() == other.position()
    }
}

/// Runtime value
///
/// To build values in code and tests, use the `From` conversions:
/// `Value::from(42)`, `Value::from("text")`, `Value::from(vec![1, 2])` (a Vector).
#[derive(Clone)]
pub enum Value {
    Nil,
    /// The value of a name that was never bound
    Undefined,
    Boolean(bool),
    String(String),
    Character(char),
    Date(NaiveDate),
    IntegerNumber(i64),
    FloatNumber(f64),
    Keyword(String),
    Symbol(String),
    Vector(Vector),
    Set(Set),
    Map(Map),
    Function(Function),
    Macro(Macro),
    Exception(Exception),
    Type(DataType),
    /// Opaque host object handle (a module, a class)
    Object(Handle),
    /// Opaque host object-instance handle
    Instance(Handle),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Nil => DataType::Nil,
            Value::Undefined => DataType::Undefined,
            Value::Boolean(_) => DataType::Boolean,
            Value::String(_) => DataType::String,
            Value::Character(_) => DataType::Character,
            Value::Date(_) => DataType::Date,
            Value::IntegerNumber(_) => DataType::IntegerNumber,
            Value::FloatNumber(_) => DataType::FloatNumber,
            Value::Keyword(_) => DataType::Keyword,
            Value::Symbol(_) => DataType::Symbol,
            Value::Vector(_) => DataType::Vector,
            Value::Set(_) => DataType::Set,
            Value::Map(_) => DataType::Map,
            Value::Function(_) => DataType::Function,
            Value::Macro(_) => DataType::Macro,
            Value::Exception(_) => DataType::Exception,
            Value::Type(_) => DataType::Type,
            Value::Object(_) => DataType::Object,
            Value::Instance(_) => DataType::Instance,
        }
    }

    /// Build a value of `data_type` around a host representation
    pub fn construct(data_type: DataType, native: Native) -> Result<Value, Error> {
        let value = match (data_type, native) {
            (DataType::Nil, Native::None) => Value::Nil,
            (DataType::Undefined, Native::None) => Value::Undefined,
            (DataType::Boolean, Native::Bool(b)) => Value::Boolean(b),
            (DataType::String, Native::Text(s)) => Value::String(s),
            (DataType::Keyword, Native::Text(s)) => Value::Keyword(s),
            (DataType::Symbol, Native::Text(s)) => Value::Symbol(s),
            (DataType::Character, Native::Char(c)) => Value::Character(c),
            (DataType::Date, Native::Date(d)) => Value::Date(d),
            (DataType::IntegerNumber, Native::Integer(n)) => Value::IntegerNumber(n),
            (DataType::FloatNumber, Native::Float(x)) => Value::FloatNumber(x),
            (DataType::Vector, Native::Items(items)) => Value::Vector(Vector::from_iter(items)),
            (DataType::Set, Native::Items(items)) => Value::Set(Set::from_iter(items)),
            (DataType::Map, Native::Items(items)) => {
                let count = items.len();
                Value::Map(Map::from_flat(items).map_err(|_| Error::InvalidNativeType {
                    data_type,
                    native: format!("an odd item sequence of length {count}"),
                })?)
            }
            (DataType::Type, Native::Type(t)) => Value::Type(t),
            (expected, Native::Opaque(value)) if value.data_type() == expected => value,
            (data_type, native) => {
                return Err(Error::InvalidNativeType {
                    data_type,
                    native: format!("{native:?}"),
                });
            }
        };
        Ok(value)
    }

    /// The host representation this value wraps
    pub fn native(&self) -> Native {
        match self {
            Value::Nil | Value::Undefined => Native::None,
            Value::Boolean(b) => Native::Bool(*b),
            Value::String(s) | Value::Keyword(s) | Value::Symbol(s) => Native::Text(s.clone()),
            Value::Character(c) => Native::Char(*c),
            Value::Date(d) => Native::Date(*d),
            Value::IntegerNumber(n) => Native::Integer(*n),
            Value::FloatNumber(x) => Native::Float(*x),
            Value::Vector(v) => Native::Items(v.iter().cloned().collect()),
            Value::Set(s) => Native::Items(s.iter().cloned().collect()),
            Value::Map(m) => Native::Items(
                m.iter()
                    .flat_map(|(k, v)| [k.clone(), v.clone()])
                    .collect(),
            ),
            Value::Type(t) => Native::Type(*t),
            Value::Function(_)
            | Value::Macro(_)
            | Value::Exception(_)
            | Value::Object(_)
            | Value::Instance(_) => Native::Opaque(self.clone()),
        }
    }

    pub fn structural_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }

    /// Only Nil, Undefined and false are falsy
    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Undefined | Value::Boolean(false))
    }

    /// Re-readable rendering, same as `Display`
    pub fn format(&self) -> String {
        self.to_string()
    }

    /// Bare rendering used by `str`: strings and characters without quoting, nil as empty
    pub fn plain_text(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::String(s) => s.clone(),
            Value::Character(c) => c.to_string(),
            other => other.format(),
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Value::Exception(_))
    }

    /// Elements of a collection or the characters of a string, in iteration order.
    /// Map entries are yielded as `[key value]` vectors.
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Vector(v) => Some(v.iter().cloned().collect()),
            Value::Set(s) => Some(s.iter().cloned().collect()),
            Value::Map(m) => Some(
                m.iter()
                    .map(|(k, v)| Value::Vector(Vector::from_iter([k.clone(), v.clone()])))
                    .collect(),
            ),
            Value::String(s) => Some(s.chars().map(Value::Character).collect()),
            _ => None,
        }
    }
}

/// -0.0 and 0.0 share one representation, as do all NaNs
fn canonical_float_bits(x: f64) -> u64 {
    if x == 0.0 {
        0.0f64.to_bits()
    } else if x.is_nan() {
        f64::NAN.to_bits()
    } else {
        x.to_bits()
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.data_type().hash(state);
        match self {
            Value::Nil | Value::Undefined => {}
            Value::Boolean(b) => b.hash(state),
            Value::String(s) | Value::Keyword(s) | Value::Symbol(s) => s.hash(state),
            Value::Character(c) => c.hash(state),
            Value::Date(d) => d.hash(state),
            Value::IntegerNumber(n) => n.hash(state),
            Value::FloatNumber(x) => canonical_float_bits(*x).hash(state),
            Value::Vector(v) => v.structural_hash().hash(state),
            Value::Set(s) => s.structural_hash().hash(state),
            Value::Map(m) => m.structural_hash().hash(state),
            Value::Function(f) => f.identity().hash(state),
            Value::Macro(m) => m.name().hash(state),
            Value::Exception(e) => {
                e.failure().hash(state);
                e.position().hash(state);
            }
            Value::Type(t) => t.hash(state),
            Value::Object(h) | Value::Instance(h) => h.address().hash(state),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) | (Value::Undefined, Value::Undefined) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b))
            | (Value::Keyword(a), Value::Keyword(b))
            | (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Character(a), Value::Character(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::IntegerNumber(a), Value::IntegerNumber(b)) => a == b,
            (Value::FloatNumber(a), Value::FloatNumber(b)) => {
                canonical_float_bits(*a) == canonical_float_bits(*b)
            }
            (Value::Vector(a), Value::Vector(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a.identity() == b.identity(),
            (Value::Macro(a), Value::Macro(b)) => a.name() == b.name(),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Object(a), Value::Object(b)) | (Value::Instance(a), Value::Instance(b)) => {
                a == b
            }
            _ => false, // Different variants are never equal
        }
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Exception(e) => write!(
                f,
                "Exception({}: {} at {})",
                e.failure().name(),
                e.failure(),
                e.position()
            ),
            other => write!(f, "{}({other})", other.data_type()),
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

fn write_sequence<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    write!(f, "{open}")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "{close}")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Undefined => write!(f, "undefined"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::String(s) => write_escaped(f, s),
            Value::Character(c) => write!(f, "\\{c}"),
            Value::Date(d) => write!(f, "#{}", d.format("%Y-%m-%d")),
            Value::IntegerNumber(n) => write!(f, "{n}"),
            Value::FloatNumber(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::FloatNumber(x) => write!(f, "{x}"),
            Value::Keyword(k) => write!(f, ":{k}"),
            Value::Symbol(s) => write!(f, "'{s}"),
            Value::Vector(v) => write_sequence(f, "[", v.iter(), "]"),
            Value::Set(s) => write_sequence(f, "#{", s.iter(), "}"),
            Value::Map(m) => write_sequence(f, "{", m.iter().flat_map(|(k, v)| [k, v]), "}"),
            Value::Function(function) => write!(f, "{}", function.name()),
            Value::Macro(m) => write!(f, "{}", m.name()),
            Value::Exception(e) => write!(
                f,
                "#<exception {} {:?} at {}>",
                e.failure().name(),
                e.failure().to_string(),
                e.position()
            ),
            Value::Type(t) => write!(f, "{t}"),
            Value::Object(h) => write!(f, "#<object {}>", h.object().type_name()),
            Value::Instance(h) => write!(f, "#<instance {}>", h.object().type_name()),
        }
    }
}

// From trait implementations for Value - enables .into() conversion
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Value::Character(c)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::FloatNumber(x)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Value {
            fn from(n: $int_type) -> Self {
                Value::IntegerNumber(i64::from(n))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(i64);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Vector(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(arr: [T; N]) -> Self {
        Value::Vector(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for keywords in code and tests
pub fn kw<S: AsRef<str>>(name: S) -> Value {
    Value::Keyword(name.as_ref().to_owned())
}

/// Helper for symbols in code and tests
pub fn sym<S: AsRef<str>>(name: S) -> Value {
    Value::Symbol(name.as_ref().to_owned())
}

/// Helper for building values from anything convertible
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn map_of(pairs: Vec<(Value, Value)>) -> Value {
        Value::Map(
            Map::from_flat(pairs.into_iter().flat_map(|(k, v)| [k, v]).collect()).unwrap(),
        )
    }

    #[test]
    fn test_truthiness_data_driven() {
        let test_cases = vec![
            (Value::Nil, false),
            (Value::Undefined, false),
            (val(false), false),
            (val(true), true),
            (val(0), true),
            (val(0.0), true),
            (val(""), true),
            (val(Vec::<i64>::new()), true),
            (Value::Set(Set::default()), true),
            (Value::Map(Map::default()), true),
            (kw("k"), true),
        ];

        for (i, (value, expected)) in test_cases.iter().enumerate() {
            assert_eq!(value.truthy(), *expected, "truthiness case #{}: {value:?}", i + 1);
        }
    }

    #[test]
    fn test_format_and_plain_text() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let test_cases = vec![
            (Value::Nil, "nil", ""),
            (val(true), "true", "true"),
            (val(42), "42", "42"),
            (val(3.0), "3.0", "3.0"),
            (val(2.5), "2.5", "2.5"),
            (val("a \"b\"\n"), "\"a \\\"b\\\"\\n\"", "a \"b\"\n"),
            (val('x'), "\\x", "x"),
            (val(date), "#2024-02-29", "#2024-02-29"),
            (kw("name"), ":name", ":name"),
            (sym("foo"), "'foo", "'foo"),
            (val(vec![val(1), val("s")]), "[1 \"s\"]", "[1 \"s\"]"),
            (map_of(vec![(kw("k"), val(1))]), "{:k 1}", "{:k 1}"),
            (Value::Type(DataType::Vector), "Vector", "Vector"),
        ];

        for (i, (value, format, plain)) in test_cases.iter().enumerate() {
            assert_eq!(value.format(), *format, "format case #{}", i + 1);
            assert_eq!(value.plain_text(), *plain, "plain_text case #{}", i + 1);
        }
    }

    #[test]
    fn test_construct_checks_native_type() {
        let test_cases = vec![
            (DataType::Boolean, Native::Bool(true), Some(val(true))),
            (DataType::Boolean, Native::Integer(1), None),
            (DataType::Keyword, Native::Text("k".into()), Some(kw("k"))),
            (DataType::FloatNumber, Native::Integer(1), None),
            (DataType::Nil, Native::None, Some(Value::Nil)),
            (
                DataType::Vector,
                Native::Items(vec![val(1), val(2)]),
                Some(val([1, 2])),
            ),
            (DataType::Map, Native::Items(vec![kw("a")]), None),
            (DataType::Function, Native::Opaque(val(1)), None),
        ];

        for (i, (data_type, native, expected)) in test_cases.into_iter().enumerate() {
            match (Value::construct(data_type, native), expected) {
                (Ok(actual), Some(expected)) => assert_eq!(actual, expected, "case #{}", i + 1),
                (Err(Error::InvalidNativeType { .. }), None) => {}
                (other, expected) => panic!("case #{}: got {other:?}, expected {expected:?}", i + 1),
            }
        }
    }

    #[test]
    fn test_native_round_trips_through_construct() {
        let values = vec![
            val(7),
            val("s"),
            kw("k"),
            val([1, 2, 3]),
            map_of(vec![(kw("a"), val(1)), (kw("b"), val(2))]),
        ];
        for value in values {
            let rebuilt = Value::construct(value.data_type(), value.native()).unwrap();
            assert_eq!(rebuilt, value);
        }
    }

    #[test]
    fn test_collection_hash_order_sensitivity() {
        let set_a = Value::Set(Set::from_iter([val(1), val(2), val(3)]));
        let set_b = Value::Set(Set::from_iter([val(3), val(1), val(2)]));
        assert_eq!(set_a.structural_hash(), set_b.structural_hash());
        assert_eq!(set_a, set_b);

        let map_a = map_of(vec![(kw("a"), val(1)), (kw("b"), val(2))]);
        let map_b = map_of(vec![(kw("b"), val(2)), (kw("a"), val(1))]);
        assert_eq!(map_a.structural_hash(), map_b.structural_hash());

        let vec_a = val([1, 2]);
        let vec_b = val([2, 1]);
        assert_ne!(vec_a.structural_hash(), vec_b.structural_hash());
        assert_ne!(vec_a, vec_b);

        // Same elements, different variant
        assert_ne!(set_a.structural_hash(), val([1, 2, 3]).structural_hash());
        assert_ne!(val(1), val(1.0));
    }

    #[test]
    fn test_exception_traceback_rendering() {
        let frames = (0..4)
            .map(|i| Frame {
                name: format!("f{i}"),
                position: Position::new(i + 1, 1),
            })
            .collect();
        let exception = Exception::new(Failure::DivisionByZero, Position::new(4, 3), frames);
        assert_eq!(
            exception.format_traceback(2),
            "DivisionByZero: division by zero\n  ... 2 more frame(s)\n  in f2 at 3:1\n  in f3 at 4:1"
        );
        assert_eq!(exception.position(), Position::new(4, 3));
    }

    #[test]
    fn test_exception_hash_follows_failure_kind() {
        let at = Position::new(1, 1);
        let exception = |failure| Value::Exception(Exception::new(failure, at, Vec::new()));

        // Both failures render the same message
        assert_eq!(
            Failure::TypeMismatch("x".to_owned()).to_string(),
            Failure::User("x".to_owned()).to_string()
        );
        let mismatch = exception(Failure::TypeMismatch("x".to_owned()));
        let user = exception(Failure::User("x".to_owned()));
        assert_ne!(mismatch, user);
        assert_ne!(mismatch.structural_hash(), user.structural_hash());

        let again = exception(Failure::TypeMismatch("x".to_owned()));
        assert_eq!(mismatch, again);
        assert_eq!(mismatch.structural_hash(), again.structural_hash());
    }

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Nil),
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::IntegerNumber),
            any::<f64>().prop_map(Value::FloatNumber),
            "[a-z]{0,6}".prop_map(Value::String),
            "[a-z]{1,6}".prop_map(Value::Keyword),
            any::<char>().prop_map(Value::Character),
        ]
    }

    fn nested() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(|items| val(items)),
                prop::collection::vec(inner, 0..4).prop_map(|items| Value::Set(Set::from_iter(items))),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_rebuilt_values_hash_and_compare_equal(value in nested()) {
            let rebuilt = Value::construct(value.data_type(), value.native()).unwrap();
            prop_assert_eq!(value.structural_hash(), rebuilt.structural_hash());
            prop_assert_eq!(&value, &rebuilt);
        }

        #[test]
        fn prop_set_hash_ignores_insertion_order(items in prop::collection::vec(scalar(), 0..8)) {
            let forward = Set::from_iter(items.clone());
            let backward = Set::from_iter(items.into_iter().rev());
            prop_assert_eq!(forward.structural_hash(), backward.structural_hash());
        }
    }
}
