//! Builtin operations and the caller-owned registry.
//!
//! Every builtin is described by a [`Descriptor`] (name, usage forms, docstring, kind and
//! [`Spec`]) built alongside its implementation. The [`Registry`] maps names to
//! installed functions and macros; an evaluator owns its registry, and embedders add
//! their own procedures with [`Registry::install`] before handing it over.
//!
//! ## Functions vs Macros
//!
//! - **Functions** receive fully evaluated arguments, validated against their spec
//!   (e.g. `+`, `get`, `map`)
//! - **Macros** receive their argument forms unevaluated and control evaluation order
//!   themselves (e.g. `if`, `and`, `let`). Their implementations live in the evaluator.
//!
//! ## Error Handling
//!
//! A spec violation is host-fatal. Failures inside a builtin body (division by zero,
//! integer overflow, odd map entries) are returned as `Error::Raised` and become
//! Exception values at the call site.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with the signature
//!    `fn(&Evaluator, Vec<Value>) -> Result<Value, Error>`
//! 2. **Describe it** with `Descriptor::function(..)` and a spec covering every shape
//!    the body relies on
//! 3. **Register it** in [`Registry::standard`]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{Form, MAKE_HASHMAP, MAKE_HASHSET, MAKE_VECTOR};
use crate::collections::{Map, Set, Vector};
use crate::evaluator::closure::Closure;
use crate::evaluator::{self, Evaluator, Expansion, Scope};
use crate::loader::Refer;
use crate::spec::Spec;
use crate::value::{DataType, TypeConstraint, Value};
use crate::{Error, Failure};

/// Canonical signature of a builtin function body
pub type OperationFn = dyn Fn(&Evaluator, Vec<Value>) -> Result<Value, Error>;

/// Canonical signature of a macro: unevaluated argument forms, the current lexical scope
pub type MacroFn = fn(&[Form], &mut Scope, &Evaluator) -> Result<Expansion, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Function,
    Macro,
}

/// Metadata attached to every function and macro
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub name: String,
    pub forms: Vec<String>,
    pub docstring: Option<String>,
    pub kind: Kind,
    pub spec: Spec,
}

impl Descriptor {
    pub fn function(name: impl Into<String>) -> Self {
        Self::with_kind(name, Kind::Function)
    }

    pub fn special_form(name: impl Into<String>) -> Self {
        Self::with_kind(name, Kind::Macro)
    }

    fn with_kind(name: impl Into<String>, kind: Kind) -> Self {
        Descriptor {
            name: name.into(),
            forms: Vec::new(),
            docstring: None,
            kind,
            spec: Spec::new(),
        }
    }

    pub fn form(mut self, form: impl Into<String>) -> Self {
        self.forms.push(form.into());
        self
    }

    pub fn doc(mut self, docstring: impl Into<String>) -> Self {
        self.docstring = Some(docstring.into());
        self
    }

    pub fn spec(mut self, spec: Spec) -> Self {
        self.spec = spec;
        self
    }
}

#[derive(Clone)]
enum Body {
    Builtin(Rc<OperationFn>),
    Closure(Rc<Closure>),
}

/// A callable value: a builtin or a user closure
#[derive(Clone)]
pub struct Function {
    descriptor: Rc<Descriptor>,
    body: Body,
}

impl Function {
    pub fn builtin(
        descriptor: Descriptor,
        body: impl Fn(&Evaluator, Vec<Value>) -> Result<Value, Error> + 'static,
    ) -> Self {
        Function {
            descriptor: Rc::new(descriptor),
            body: Body::Builtin(Rc::new(body)),
        }
    }

    pub(crate) fn closure(descriptor: Descriptor, closure: Closure) -> Self {
        Function {
            descriptor: Rc::new(descriptor),
            body: Body::Closure(Rc::new(closure)),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Usage forms, for diagnostics
    pub fn forms(&self) -> Vec<String> {
        match &self.body {
            Body::Closure(closure) => closure.forms(self.name()),
            Body::Builtin(_) => self.descriptor.forms.clone(),
        }
    }

    /// Two handles are the same function iff they share a descriptor
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.descriptor) as usize
    }

    /// Validate `args` against the descriptor's `Spec`, then run the body
    pub fn call(&self, evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
        self.descriptor.spec.validate(&self.descriptor.name, &args)?;
        match &self.body {
            Body::Builtin(op) => op(evaluator, args),
            Body::Closure(closure) => closure.invoke(evaluator, self, args),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.descriptor.name)
    }
}

#[derive(Clone)]
pub struct Macro {
    descriptor: Rc<Descriptor>,
    handler: MacroFn,
}

impl Macro {
    pub fn new(descriptor: Descriptor, handler: MacroFn) -> Self {
        Macro {
            descriptor: Rc::new(descriptor),
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub(crate) fn expand(
        &self,
        forms: &[Form],
        scope: &mut Scope,
        evaluator: &Evaluator,
    ) -> Result<Expansion, Error> {
        self.descriptor.spec.validate_forms(self.name(), forms)?;
        (self.handler)(forms, scope, evaluator)
    }
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Macro({})", self.descriptor.name)
    }
}

/// Name to builtin mapping owned by whoever constructs the evaluator
#[derive(Debug, Clone, Default)]
pub struct Registry {
    macros: HashMap<String, Macro>,
    functions: HashMap<String, Function>,
}

impl Registry {
    /// The special forms only; no functions
    pub fn empty() -> Self {
        let mut registry = Registry::default();
        for (descriptor, handler) in builtin_macros() {
            registry.install_macro(descriptor, handler);
        }
        registry
    }

    /// Every builtin macro and function
    pub fn standard() -> Self {
        let mut registry = Registry::empty();
        for (descriptor, body) in builtin_functions() {
            registry.functions.insert(
                descriptor.name.clone(),
                Function {
                    descriptor: Rc::new(descriptor),
                    body: Body::Builtin(body),
                },
            );
        }
        registry
    }

    /// Install (or replace) a builtin function
    pub fn install(
        &mut self,
        descriptor: Descriptor,
        callback: impl Fn(&Evaluator, Vec<Value>) -> Result<Value, Error> + 'static,
    ) {
        debug!(name = %descriptor.name, "installing builtin function");
        let function = Function::builtin(descriptor, callback);
        self.functions.insert(function.name().to_owned(), function);
    }

    pub fn install_macro(&mut self, descriptor: Descriptor, handler: MacroFn) {
        let special_form = Macro::new(descriptor, handler);
        self.macros.insert(special_form.name().to_owned(), special_form);
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn find_macro(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// All descriptors, sorted by name
    pub fn descriptors(&self) -> Vec<&Descriptor> {
        let mut all: Vec<&Descriptor> = self
            .macros
            .values()
            .map(Macro::descriptor)
            .chain(self.functions.values().map(Function::descriptor))
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

fn builtin_macros() -> Vec<(Descriptor, MacroFn)> {
    vec![
        (
            Descriptor::special_form("do")
                .form("(do form1 form2 ...)")
                .doc("Evaluates forms in order, returning the last result"),
            evaluator::eval_do,
        ),
        (
            Descriptor::special_form("->")
                .form("(-> x form1 form2 ...)")
                .doc("Threads x as the first argument through the forms")
                .spec(Spec::new().arity_at_least_one()),
            evaluator::eval_thread_first,
        ),
        (
            Descriptor::special_form("->>")
                .form("(->> x form1 form2 ...)")
                .doc("Threads x as the last argument through the forms")
                .spec(Spec::new().arity_at_least_one()),
            evaluator::eval_thread_last,
        ),
        (
            Descriptor::special_form("if")
                .form("(if condition then)")
                .form("(if condition then else)")
                .doc("Evaluates then or else depending on the condition")
                .spec(Spec::new().arity_variants(&[2, 3])),
            evaluator::eval_if,
        ),
        (
            Descriptor::special_form("when")
                .form("(when condition then)")
                .doc("Evaluates then when the condition is truthy, otherwise nil")
                .spec(Spec::new().arity_is(2)),
            evaluator::eval_when,
        ),
        (
            Descriptor::special_form("cond")
                .form("(cond condition1 expr1 condition2 expr2 ...)")
                .doc("Evaluates the expression paired with the first truthy condition")
                .spec(Spec::new().arity_even()),
            evaluator::eval_cond,
        ),
        (
            Descriptor::special_form("comment")
                .form("(comment ...)")
                .doc("Ignores its forms and returns nil"),
            evaluator::eval_comment,
        ),
        (
            Descriptor::special_form("and")
                .form("(and form1 form2 ...)")
                .doc("Returns the first falsy result, or the last one"),
            evaluator::eval_and,
        ),
        (
            Descriptor::special_form("or")
                .form("(or form1 form2 ...)")
                .doc("Returns the first truthy result, or the last one"),
            evaluator::eval_or,
        ),
        (
            Descriptor::special_form("fn")
                .form("(fn [param1 param2 ...] body ...)")
                .form("(fn name [param1 param2 ...] body ...)")
                .doc("Creates a closure and binds it in the current lexical scope")
                .spec(Spec::new().arity_at_least_one()),
            evaluator::eval_fn,
        ),
        (
            Descriptor::special_form("def")
                .form("(def name value)")
                .doc("Binds a value in the module environment")
                .spec(Spec::new().arity_is(2)),
            evaluator::eval_def,
        ),
        (
            Descriptor::special_form("defn")
                .form("(defn name [param1 param2 ...] body ...)")
                .form("(defn name \"docstring\" {:spec [...]} [param1 param2 ...] body ...)")
                .doc("Creates a function and binds it in the module environment")
                .spec(Spec::new().arity_at_least(2)),
            evaluator::eval_defn,
        ),
        (
            Descriptor::special_form("let")
                .form("(let [target1 value1 target2 value2 ...] body ...)")
                .doc("Evaluates body with the bindings in a new lexical scope")
                .spec(Spec::new().arity_at_least_one()),
            evaluator::eval_let,
        ),
        (
            Descriptor::special_form("for")
                .form("(for [target vector] body)")
                .doc("Evaluates body for every element of a Vector, collecting the results")
                .spec(Spec::new().arity_is(2)),
            evaluator::eval_for,
        ),
        (
            Descriptor::special_form("require")
                .form("(require 'module)")
                .form("(require ['module :refer :all])")
                .form("(require ['module :refer ['name1 'name2 ...]])")
                .doc("Loads a module into the module environment")
                .spec(Spec::new().arity_is(1)),
            evaluator::eval_require,
        ),
    ]
}

//
// Builtin Function Implementations
//

fn chains(chains: &[&[TypeConstraint]]) -> Vec<Vec<TypeConstraint>> {
    chains.iter().map(|chain| chain.to_vec()).collect()
}

const ANY: TypeConstraint = TypeConstraint::Any;
const COLLECTION: TypeConstraint = TypeConstraint::Collection;
const NUMERIC: TypeConstraint = TypeConstraint::Numeric;
const FUNCTION: TypeConstraint = TypeConstraint::Exactly(DataType::Function);
const KEYWORD: TypeConstraint = TypeConstraint::Exactly(DataType::Keyword);
const STRING: TypeConstraint = TypeConstraint::Exactly(DataType::String);
const VECTOR: TypeConstraint = TypeConstraint::Exactly(DataType::Vector);
const INTEGER: TypeConstraint = TypeConstraint::Exactly(DataType::IntegerNumber);

/// Move the arguments out of a call whose spec already fixed their count
fn take<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], Error> {
    let count = args.len();
    args.try_into()
        .map_err(|_| Error::mismatch(format!("'{name}' expected {N} arguments, got {count}")))
}

fn apply(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    match take::<2>("apply", args)? {
        [function, Value::Vector(arguments)] => {
            evaluator.apply(&function, arguments.iter().cloned().collect())
        }
        [_, other] => Err(Error::mismatch(format!(
            "'apply' needs a Vector of arguments, got {}",
            other.data_type()
        ))),
    }
}

fn identity(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = take::<1>("identity", args)?;
    Ok(value)
}

fn conj(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let Some(collection) = args.next() else {
        return Ok(Value::Vector(Vector::new()));
    };
    let result = match collection {
        Value::Nil => Value::Vector(args.collect()),
        Value::Vector(v) => Value::Vector(v.conj(args)),
        Value::Set(s) => Value::Set(s.conj(args)),
        Value::Map(m) => Value::Map(m.conj(args)?),
        other if args.len() == 0 => other,
        other => {
            return Err(Error::mismatch(format!(
                "cannot conj onto {}",
                other.data_type()
            )));
        }
    };
    Ok(result)
}

fn get_spec() -> Spec {
    let set = TypeConstraint::Exactly(DataType::Set);
    let map = TypeConstraint::Exactly(DataType::Map);
    let object = TypeConstraint::Exactly(DataType::Object);
    let instance = TypeConstraint::Exactly(DataType::Instance);
    Spec::new()
        .arity_variants(&[2, 3])
        .arguments_type_chain_variants(chains(&[
            &[set, ANY],
            &[set, ANY, ANY],
            &[VECTOR, INTEGER],
            &[VECTOR, INTEGER, ANY],
            &[map, ANY],
            &[map, ANY, ANY],
            &[instance, KEYWORD],
            &[instance, KEYWORD, ANY],
            &[object, KEYWORD],
            &[object, KEYWORD, ANY],
            &[STRING, INTEGER],
            &[STRING, INTEGER, ANY],
        ]))
}

fn get(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let (Some(collection), Some(key)) = (args.next(), args.next()) else {
        return Err(Error::mismatch("'get' needs a collection and a key"));
    };
    let default = args.next().unwrap_or(Value::Nil);
    let found = match (&collection, &key) {
        (Value::Set(s), _) => s.get(&key, default),
        (Value::Vector(v), Value::IntegerNumber(i)) => v.get(*i, default),
        (Value::Map(m), _) => m.get(&key, default),
        (Value::Object(h) | Value::Instance(h), Value::Keyword(name)) => {
            h.object().attribute(name).unwrap_or(default)
        }
        (Value::String(s), Value::IntegerNumber(i)) => usize::try_from(*i)
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map_or(default, Value::Character),
        _ => {
            return Err(Error::mismatch(format!(
                "cannot get {} from {}",
                key.data_type(),
                collection.data_type()
            )));
        }
    };
    Ok(found)
}

/// `(:k coll)` and `(:k coll default)`: a keyword used as an accessor
pub(crate) fn keyword_get(
    evaluator: &Evaluator,
    keyword: Value,
    args: Vec<Value>,
) -> Result<Value, Error> {
    let mut args = args.into_iter();
    let mut get_args = Vec::with_capacity(3);
    get_args.extend(args.next());
    get_args.push(keyword);
    get_args.extend(args);
    get_spec().validate("get", &get_args)?;
    get(evaluator, get_args)
}

fn str_concat(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::String(args.iter().map(Value::plain_text).collect()))
}

fn make_vector(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Vector(args.into_iter().collect()))
}

fn make_hashset(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Set(args.into_iter().collect()))
}

fn make_hashmap(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Map(Map::from_flat(args)?))
}

/// Parse `'name` or `['name :refer :all]` / `['name :refer ['a 'b]]`
pub(crate) fn module_request(name: &str, request: &Value) -> Result<Option<(String, Refer)>, Error> {
    let items = match request {
        Value::Symbol(module) => return Ok(Some((module.clone(), Refer::None))),
        Value::Vector(items) if items.is_empty() => return Ok(None),
        Value::Vector(items) => items,
        other => {
            return Err(Error::mismatch(format!(
                "'{name}' needs a Symbol or a Vector, got {}",
                other.data_type()
            )));
        }
    };
    let Some(Value::Symbol(module)) = items.nth(0) else {
        return Err(Error::mismatch(format!("'{name}': module name should be a Symbol")));
    };
    let options = Map::from_flat(items.iter().skip(1).cloned().collect())?;
    let refer = match options.get(&Value::Keyword("refer".to_owned()), Value::Nil) {
        Value::Nil => Refer::None,
        Value::Keyword(k) if k == "all" => Refer::All,
        Value::Vector(names) => Refer::Names(
            names
                .iter()
                .map(|n| match n {
                    Value::Symbol(s) => Ok(s.clone()),
                    other => Err(Error::mismatch(format!(
                        "'{name}': :refer names should be Symbols, got {other}"
                    ))),
                })
                .collect::<Result<Vec<_>, Error>>()?,
        ),
        other => {
            return Err(Error::mismatch(format!(
                "'{name}': :refer should be :all or a Vector, got {other}"
            )));
        }
    };
    Ok(Some((module.clone(), refer)))
}

fn import(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [request] = take::<1>("import", args)?;
    if let Some((module, refer)) = module_request("import", &request)? {
        evaluator.import_module(&module, &refer);
    }
    Ok(Value::Nil)
}

fn not(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let [value] = take::<1>("not", args)?;
    Ok(Value::Boolean(!value.truthy()))
}

fn equals(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    Ok(Value::Boolean(args.windows(2).all(|pair| pair[0] == pair[1])))
}

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Result<Number, Error> {
        match value {
            Value::IntegerNumber(n) => Ok(Number::Int(*n)),
            Value::FloatNumber(x) => Ok(Number::Float(*x)),
            other => Err(Error::mismatch(format!(
                "expected a number, got {}",
                other.data_type()
            ))),
        }
    }

    #[expect(clippy::cast_precision_loss)] // mixed arithmetic promotes to float
    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    fn is_zero(self) -> bool {
        match self {
            Number::Int(n) => n == 0,
            Number::Float(x) => x == 0.0,
        }
    }

    fn into_value(self) -> Value {
        match self {
            Number::Int(n) => Value::IntegerNumber(n),
            Number::Float(x) => Value::FloatNumber(x),
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

// Macro to generate the integer-preserving arithmetic folds
macro_rules! checked_arithmetic {
    ($name:ident, $checked:ident, $op:tt, $op_str:expr) => {
        fn $name(a: Number, b: Number) -> Result<Number, Failure> {
            match (a, b) {
                (Number::Int(a), Number::Int(b)) => a
                    .$checked(b)
                    .map(Number::Int)
                    .ok_or(Failure::IntegerOverflow($op_str)),
                (a, b) => Ok(Number::Float(a.as_f64() $op b.as_f64())),
            }
        }
    };
}

checked_arithmetic!(add, checked_add, +, "+");
checked_arithmetic!(subtract, checked_sub, -, "-");
checked_arithmetic!(multiply, checked_mul, *, "*");

fn divide(a: Number, b: Number) -> Result<Number, Failure> {
    if b.is_zero() {
        return Err(Failure::DivisionByZero);
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

/// Remainder taking the sign of the divisor
fn modulo(a: Number, b: Number) -> Result<Number, Failure> {
    if b.is_zero() {
        return Err(Failure::DivisionByZero);
    }
    match (a, b) {
        (Number::Int(a), Number::Int(b)) => {
            let r = a.checked_rem(b).ok_or(Failure::IntegerOverflow("mod"))?;
            Ok(Number::Int(if r != 0 && (r < 0) != (b < 0) { r + b } else { r }))
        }
        (a, b) => {
            let (a, b) = (a.as_f64(), b.as_f64());
            let r = a % b;
            Ok(Number::Float(if r != 0.0 && (r < 0.0) != (b < 0.0) { r + b } else { r }))
        }
    }
}

/// Left fold over numeric arguments; a single argument is returned unchanged
fn fold(
    args: &[Value],
    empty: Option<Number>,
    op: fn(Number, Number) -> Result<Number, Failure>,
) -> Result<Value, Error> {
    let mut numbers = args.iter().map(Number::of);
    let first = match numbers.next() {
        Some(first) => first?,
        None => {
            return empty
                .map(Number::into_value)
                .ok_or_else(|| Error::mismatch("expected at least one number"));
        }
    };
    let result = numbers.try_fold(first, |acc, next| Ok::<_, Error>(op(acc, next?)?))?;
    Ok(result.into_value())
}

// Macro to generate chained numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $($ordering:pat_param)|+) => {
        fn $name(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
            let numbers = args.iter().map(Number::of).collect::<Result<Vec<_>, _>>()?;
            let holds = numbers
                .windows(2)
                .all(|pair| matches!(pair[0].compare(pair[1]), Some($($ordering)|+)));
            Ok(Value::Boolean(holds))
        }
    };
}

numeric_comparison!(less_than, Ordering::Less);
numeric_comparison!(greater_than, Ordering::Greater);
numeric_comparison!(less_or_equal, Ordering::Less | Ordering::Equal);
numeric_comparison!(greater_or_equal, Ordering::Greater | Ordering::Equal);

fn reduce(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let (function, initial, collection) = match args.len() {
        2 => {
            let [function, collection] = take::<2>("reduce", args)?;
            (function, None, collection)
        }
        _ => {
            let [function, initial, collection] = take::<3>("reduce", args)?;
            (function, Some(initial), collection)
        }
    };
    let items = collection
        .items()
        .ok_or_else(|| Error::mismatch("'reduce' needs a collection or a string"))?;

    let mut items = initial.into_iter().chain(items);
    let Some(mut accumulated) = items.next() else {
        return evaluator.apply(&function, Vec::new());
    };
    for item in items {
        accumulated = evaluator.apply(&function, vec![accumulated, item])?;
        if accumulated.is_exception() {
            return Ok(accumulated);
        }
    }
    Ok(accumulated)
}

fn mapping_spec() -> Spec {
    Spec::new()
        .arity_is(2)
        .arguments_type_chain_variants(chains(&[
            &[KEYWORD, COLLECTION],
            &[FUNCTION, STRING],
            &[FUNCTION, COLLECTION],
        ]))
}

/// Apply `function` (or a keyword accessor) to every item, stopping at the first exception
fn each_result(
    evaluator: &Evaluator,
    name: &str,
    args: Vec<Value>,
    mut visit: impl FnMut(Value, Value),
) -> Result<Option<Value>, Error> {
    let [function, collection] = take::<2>(name, args)?;
    let items = collection
        .items()
        .ok_or_else(|| Error::mismatch(format!("'{name}' needs a collection or a string")))?;
    for item in items {
        let result = match &function {
            Value::Keyword(_) => keyword_get(evaluator, function.clone(), vec![item.clone()])?,
            callable => evaluator.apply(callable, vec![item.clone()])?,
        };
        if result.is_exception() {
            return Ok(Some(result));
        }
        visit(item, result);
    }
    Ok(None)
}

fn map(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut mapped = Vec::new();
    if let Some(exception) = each_result(evaluator, "map", args, |_, result| mapped.push(result))? {
        return Ok(exception);
    }
    Ok(Value::Vector(mapped.into_iter().collect()))
}

fn filter(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let mut kept = Vec::new();
    let exception = each_result(evaluator, "filter", args, |item, result| {
        if result.truthy() {
            kept.push(item);
        }
    })?;
    if let Some(exception) = exception {
        return Ok(exception);
    }
    Ok(Value::Vector(kept.into_iter().collect()))
}

fn truncated(text: String, width: usize) -> String {
    if text.chars().count() <= width {
        return text;
    }
    let mut cut: String = text.chars().take(width).collect();
    cut.push_str("...");
    cut
}

fn prn(evaluator: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let line = args
        .iter()
        .map(Value::format)
        .collect::<Vec<_>>()
        .join(" ");
    evaluator.write_line(&truncated(line, evaluator.config().display_width))?;
    Ok(Value::Nil)
}

fn error(_: &Evaluator, args: Vec<Value>) -> Result<Value, Error> {
    let message = args
        .iter()
        .map(Value::plain_text)
        .collect::<Vec<_>>()
        .join(" ");
    Err(Error::Raised(Failure::User(message)))
}

type Builtin = fn(&Evaluator, Vec<Value>) -> Result<Value, Error>;

fn builtin_functions() -> Vec<(Descriptor, Rc<OperationFn>)> {
    let numeric_fold = |empty: Option<i64>, op: fn(Number, Number) -> Result<Number, Failure>| {
        move |_: &Evaluator, args: Vec<Value>| fold(&args, empty.map(Number::Int), op)
    };

    let plain: Vec<(Descriptor, Builtin)> = vec![
        (
            Descriptor::function("apply")
                .form("(apply function arguments)")
                .doc("Calls a function with the elements of a Vector as arguments")
                .spec(
                    Spec::new()
                        .arity_is(2)
                        .arguments_type_chain_variants(chains(&[&[FUNCTION, VECTOR]])),
                ),
            apply,
        ),
        (
            Descriptor::function("identity")
                .form("(identity something)")
                .doc("Returns its argument")
                .spec(Spec::new().arity_is(1)),
            identity,
        ),
        (
            Descriptor::function("conj")
                .form("(conj collection element1 element2 ...)")
                .doc("Returns a new collection with the elements added"),
            conj,
        ),
        (
            Descriptor::function("get")
                .form("(get collection-string-or-object key)")
                .form("(get collection-string-or-object key default)")
                .doc("Looks a key, index or attribute up, returning default (nil) when missing")
                .spec(get_spec()),
            get,
        ),
        (
            Descriptor::function("str")
                .form("(str something1 something2 ...)")
                .doc("Concatenates the plain text of its arguments"),
            str_concat,
        ),
        (
            Descriptor::function(MAKE_VECTOR)
                .form("(make-vector element1 element2 ...)")
                .doc("Creates a Vector"),
            make_vector,
        ),
        (
            Descriptor::function(MAKE_HASHSET)
                .form("(make-hashset element1 element2 ...)")
                .doc("Creates a Set"),
            make_hashset,
        ),
        (
            Descriptor::function(MAKE_HASHMAP)
                .form("(make-hashmap key1 value1 key2 value2 ...)")
                .doc("Creates a Map")
                .spec(Spec::new().arity_even()),
            make_hashmap,
        ),
        (
            Descriptor::function("import")
                .form("(import 'name)")
                .form("(import ['name :refer :all])")
                .form("(import ['name :refer ['attribute1 'attribute2 ...]])")
                .doc("Imports a host object and binds it in the module environment")
                .spec(Spec::new().arity_is(1).arguments_type_chain_variants(chains(&[
                    &[TypeConstraint::Exactly(DataType::Symbol)],
                    &[VECTOR],
                ]))),
            import,
        ),
        (
            Descriptor::function("not")
                .form("(not something)")
                .doc("Returns the inverted truthiness of its argument")
                .spec(Spec::new().arity_is(1)),
            not,
        ),
        (
            Descriptor::function("=")
                .form("(= something1 something2 ...)")
                .doc("Checks that all arguments are structurally equal")
                .spec(Spec::new().arity_at_least_one()),
            equals,
        ),
        (
            Descriptor::function("<")
                .form("(< number1 number2 ...)")
                .doc("Checks that numbers are strictly increasing")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            less_than,
        ),
        (
            Descriptor::function(">")
                .form("(> number1 number2 ...)")
                .doc("Checks that numbers are strictly decreasing")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            greater_than,
        ),
        (
            Descriptor::function("<=")
                .form("(<= number1 number2 ...)")
                .doc("Checks that numbers are non-decreasing")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            less_or_equal,
        ),
        (
            Descriptor::function(">=")
                .form("(>= number1 number2 ...)")
                .doc("Checks that numbers are non-increasing")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            greater_or_equal,
        ),
        (
            Descriptor::function("reduce")
                .form("(reduce function collection-or-string)")
                .form("(reduce function initial collection-or-string)")
                .doc("Folds the elements with a two-argument function")
                .spec(Spec::new().arity_variants(&[2, 3]).arguments_type_chain_variants(
                    chains(&[
                        &[FUNCTION, STRING],
                        &[FUNCTION, ANY, STRING],
                        &[FUNCTION, COLLECTION],
                        &[FUNCTION, ANY, COLLECTION],
                    ]),
                )),
            reduce,
        ),
        (
            Descriptor::function("map")
                .form("(map function-or-keyword collection-or-string)")
                .doc("Collects the results of applying a function or keyword accessor")
                .spec(mapping_spec()),
            map,
        ),
        (
            Descriptor::function("filter")
                .form("(filter function-or-keyword collection-or-string)")
                .doc("Keeps the elements for which a function or keyword accessor is truthy")
                .spec(mapping_spec()),
            filter,
        ),
        (
            Descriptor::function("prn")
                .form("(prn something1 something2 ...)")
                .doc("Prints the formatted arguments to the standard output"),
            prn,
        ),
        (
            Descriptor::function("error")
                .form("(error message-part1 message-part2 ...)")
                .doc("Returns an Exception carrying the joined message"),
            error,
        ),
    ];

    let arithmetic = vec![
        (
            Descriptor::function("+")
                .form("(+ number1 number2 ...)")
                .doc("Sums numbers, 0 without arguments")
                .spec(Spec::new().each_argument_type_is(NUMERIC)),
            numeric_fold(Some(0), add),
        ),
        (
            Descriptor::function("-")
                .form("(- number1 number2 ...)")
                .doc("Subtracts the rest of the numbers from the first")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            numeric_fold(None, subtract),
        ),
        (
            Descriptor::function("*")
                .form("(* number1 number2 ...)")
                .doc("Multiplies numbers, 1 without arguments")
                .spec(Spec::new().each_argument_type_is(NUMERIC)),
            numeric_fold(Some(1), multiply),
        ),
        (
            Descriptor::function("/")
                .form("(/ number1 number2 ...)")
                .doc("Divides the first number by the rest")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            numeric_fold(None, divide),
        ),
        (
            Descriptor::function("mod")
                .form("(mod number1 number2 ...)")
                .doc("Remainder of dividing the first number by the rest")
                .spec(Spec::new().arity_at_least_one().each_argument_type_is(NUMERIC)),
            numeric_fold(None, modulo),
        ),
    ];

    plain
        .into_iter()
        .map(|(descriptor, body)| (descriptor, Rc::new(body) as Rc<OperationFn>))
        .chain(
            arithmetic
                .into_iter()
                .map(|(descriptor, body)| (descriptor, Rc::new(body) as Rc<OperationFn>)),
        )
        .collect()
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{kw, sym, val};
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    enum Outcome {
        Returns(Value),
        Raises,
        Violates,
    }
    use Outcome::*;

    fn success<T: Into<Value>>(value: T) -> Outcome {
        Returns(value.into())
    }

    fn map_of(items: Vec<Value>) -> Value {
        Value::Map(Map::from_flat(items).unwrap())
    }

    fn run_builtin(evaluator: &Evaluator, name: &str, args: &[Value]) -> Result<Value, Error> {
        let function = evaluator
            .registry()
            .find_function(name)
            .unwrap_or_else(|| panic!("builtin '{name}' is not registered"))
            .clone();
        function.call(evaluator, args.to_vec())
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_functions_data_driven() {
        let evaluator = Evaluator::new(Registry::standard());
        let pairs = map_of(vec![kw("a"), val(1), kw("b"), val(2)]);
        let set = Value::Set(Set::from_iter([val(1), val("x")]));

        macro_rules! test {
            ($name:expr, $args:expr, $expected:expr) => {{
                let args: &[Value] = $args;
                ($name, args.to_vec(), $expected)
            }};
        }

        let test_cases: Vec<(&str, Vec<Value>, Outcome)> = vec![
            // Arithmetic keeps integers until a float joins in
            test!("+", &[], success(0)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &[val(1), val(2.0)], success(3.0)),
            test!("+", &[val(i64::MAX), val(1)], Raises),
            test!("+", &[val("1")], Violates),
            test!("-", &[val(5)], success(5)),
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[], Violates),
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[val(2), val(1.5)], success(3.0)),
            test!("/", &[val(7), val(2)], success(3.5)),
            test!("/", &[val(4), val(2)], success(2.0)),
            test!("/", &[val(9)], success(9)),
            test!("/", &[val(1), val(0)], Raises),
            test!("mod", &[val(7), val(3)], success(1)),
            test!("mod", &[val(-7), val(3)], success(2)),
            test!("mod", &[val(7), val(-3)], success(-2)),
            test!("mod", &[val(7.5), val(2)], success(1.5)),
            test!("mod", &[val(1), val(0)], Raises),
            // Chained comparisons
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(3), val(2)], success(false)),
            test!("<", &[val(1)], success(true)),
            test!(">", &[val(3), val(2.5), val(1)], success(true)),
            test!("<=", &[val(1), val(1), val(2)], success(true)),
            test!(">=", &[val(2), val(3)], success(false)),
            test!("<", &[val(1), val("2")], Violates),
            test!(">", &[], Violates),
            // Structural equality
            test!("=", &[val(1)], success(true)),
            test!("=", &[val([1, 2]), val([1, 2]), val([1, 2])], success(true)),
            test!("=", &[val(1), val(1.0)], success(false)),
            test!("=", &[], Violates),
            test!("not", &[Value::Nil], success(true)),
            test!("not", &[val(0)], success(false)),
            test!("not", &[], Violates),
            test!("identity", &[kw("k")], success(kw("k"))),
            // Collections
            test!("conj", &[], success(Vec::<Value>::new())),
            test!("conj", &[val(5)], success(5)),
            test!("conj", &[Value::Nil, val(1), val(2)], success([1, 2])),
            test!("conj", &[val([1]), val(2)], success([1, 2])),
            test!("conj", &[pairs.clone(), val(vec![kw("c"), val(3)])], success(
                map_of(vec![kw("a"), val(1), kw("b"), val(2), kw("c"), val(3)])
            )),
            test!("conj", &[pairs.clone(), val(vec![kw("c")])], Raises),
            test!("conj", &[val(1), val(2)], Raises),
            test!("get", &[pairs.clone(), kw("a")], success(1)),
            test!("get", &[pairs.clone(), kw("z"), val(0)], success(0)),
            test!("get", &[val([10, 20]), val(1)], success(20)),
            test!("get", &[val([10, 20]), val(5)], success(Value::Nil)),
            test!("get", &[set.clone(), val("x")], success("x")),
            test!("get", &[val("abc"), val(2)], success('c')),
            test!("get", &[val([10]), kw("a")], Violates),
            test!("get", &[pairs.clone()], Violates),
            test!("make-hashmap", &[], success(Value::Map(Map::default()))),
            test!("make-hashmap", &[kw("a")], Violates),
            test!("make-hashset", &[val(1), val(1)], success(Value::Set(Set::from_iter([val(1)])))),
            test!("make-vector", &[val(1), val("a")], success(vec![val(1), val("a")])),
            test!("str", &[val("a"), val(1), Value::Nil, val('c'), kw("k")], success("a1c:k")),
            test!("str", &[], success("")),
            test!("error", &[val("boom"), val(1)], Raises),
            test!("apply", &[val(1), val([1])], Violates),
            test!("import", &[val(1)], Violates),
            test!("import", &[val(Vec::<Value>::new())], success(Value::Nil)),
            test!("map", &[kw("a"), val(vec![pairs.clone(), pairs.clone()])], success([1, 1])),
            test!("map", &[val(1), val([1])], Violates),
            test!("filter", &[kw("b"), val(vec![pairs.clone(), map_of(vec![])])], success(vec![pairs.clone()])),
            test!("reduce", &[val(1), val([1])], Violates),
        ];

        for (i, (name, args, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("builtin case #{} ({name})", i + 1);
            match (run_builtin(&evaluator, name, args), expected) {
                (Ok(actual), Returns(expected)) => assert_eq!(&actual, expected, "{test_id}"),
                (Err(Error::Raised(_)), Raises) => {}
                (Err(Error::SpecViolation { callee, .. }), Violates) => {
                    assert_eq!(callee, *name, "{test_id}");
                }
                (actual, expected) => panic!("{test_id}: expected {expected:?}, got {actual:?}"),
            }
        }
    }

    #[test]
    fn test_higher_order_builtins_call_back() {
        let evaluator = Evaluator::new(Registry::standard());
        let plus = Value::Function(evaluator.registry().find_function("+").unwrap().clone());
        let not = Value::Function(evaluator.registry().find_function("not").unwrap().clone());

        let test_cases = vec![
            ("apply", vec![plus.clone(), val([1, 2, 3])], val(6)),
            ("reduce", vec![plus.clone(), val([1, 2, 3])], val(6)),
            ("reduce", vec![plus.clone(), val(10), val([1, 2])], val(13)),
            // Singleton without initial: the function is never called
            ("reduce", vec![not.clone(), val(["only"])], val("only")),
            // Empty with initial returns it
            ("reduce", vec![not.clone(), val(7), val(Vec::<Value>::new())], val(7)),
            // Empty without initial calls the function with no arguments
            ("reduce", vec![plus.clone(), val(Vec::<Value>::new())], val(0)),
            ("map", vec![not.clone(), val([true, false])], val([false, true])),
            ("filter", vec![not.clone(), val(vec![Value::Nil, val(1), val(false)])], val(vec![Value::Nil, val(false)])),
            ("map", vec![not.clone(), val("ab")], val([false, false])),
        ];

        for (i, (name, args, expected)) in test_cases.iter().enumerate() {
            let actual = run_builtin(&evaluator, name, args).unwrap();
            assert_eq!(&actual, expected, "callback case #{} ({name})", i + 1);
        }
    }

    #[test]
    fn test_exceptions_from_callbacks_propagate() {
        let evaluator = Evaluator::new(Registry::standard());
        let divide = Value::Function(evaluator.registry().find_function("/").unwrap().clone());

        let mapped = run_builtin(&evaluator, "map", &[divide.clone(), val("x")]);
        assert!(matches!(mapped, Err(Error::SpecViolation { .. })));

        let reduced = run_builtin(&evaluator, "reduce", &[divide, val([1, 0, 2])]).unwrap();
        match reduced {
            Value::Exception(exception) => {
                assert_eq!(exception.failure(), &Failure::DivisionByZero);
                assert_eq!(exception.traceback().last().map(|f| f.name.as_str()), Some("/"));
            }
            other => panic!("expected an Exception, got {other:?}"),
        }
    }

    #[test]
    fn test_module_request_parsing() {
        let test_cases = vec![
            (sym("lib"), Some(("lib".to_owned(), Refer::None))),
            (val(vec![sym("lib")]), Some(("lib".to_owned(), Refer::None))),
            (
                val(vec![sym("lib"), kw("refer"), kw("all")]),
                Some(("lib".to_owned(), Refer::All)),
            ),
            (
                val(vec![sym("lib"), kw("refer"), val(vec![sym("a"), sym("b")])]),
                Some(("lib".to_owned(), Refer::Names(vec!["a".into(), "b".into()]))),
            ),
            (val(Vec::<Value>::new()), None),
        ];
        for (i, (request, expected)) in test_cases.iter().enumerate() {
            assert_eq!(
                module_request("require", request).unwrap(),
                *expected,
                "request #{}",
                i + 1
            );
        }

        let bad_requests = vec![
            val(1),
            val(vec![val("lib")]),
            val(vec![sym("lib"), kw("refer")]),
            val(vec![sym("lib"), kw("refer"), kw("some")]),
            val(vec![sym("lib"), kw("refer"), val(vec![val(1)])]),
        ];
        for request in bad_requests {
            assert!(module_request("require", &request).is_err(), "{request}");
        }
    }

    #[test]
    fn test_install_replaces_and_describes() {
        let mut registry = Registry::standard();
        registry.install(
            Descriptor::function("answer")
                .form("(answer)")
                .doc("The answer")
                .spec(Spec::new().arity_is(0)),
            |_, _| Ok(Value::IntegerNumber(42)),
        );
        let evaluator = Evaluator::new(registry);
        assert_eq!(run_builtin(&evaluator, "answer", &[]).unwrap(), val(42));
        assert!(matches!(
            run_builtin(&evaluator, "answer", &[val(1)]),
            Err(Error::SpecViolation { .. })
        ));

        let names: Vec<&str> = evaluator
            .registry()
            .descriptors()
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert!(names.contains(&"answer"));
        assert!(names.contains(&"let"));
        assert!(names.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_prn_truncates_to_display_width() {
        assert_eq!(truncated("abc".to_owned(), 3), "abc");
        assert_eq!(truncated("abcdef".to_owned(), 3), "abc...");
        assert_eq!(truncated(String::new(), 0), "");
    }
}
