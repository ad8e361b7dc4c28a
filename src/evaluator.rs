//! Tree-walking evaluator.
//!
//! Evaluation threads two environments: a lexical [`Scope`] created fresh for every
//! `let`/`for` body and function call, and the module [`Environment`] mutated only by
//! `def`, `defn`, `require` and `import`.
//!
//! A list form whose head names a macro hands its unevaluated argument forms to the
//! macro, which returns an [`Expansion`]: either a final value, or a form to keep
//! evaluating in the same scope (`->`, `if`, the tail of `do`). Any other list form
//! evaluates its head and then its arguments left to right, stopping at the first
//! Exception value, and applies the result.

pub mod closure;
pub mod destructure;

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io::{self, Write};
use std::rc::Rc;

use tracing::{debug, trace, warn};

use crate::ast::{Form, Position};
use crate::builtinops::{Registry, keyword_get, module_request};
use crate::evaluator::closure::Closure;
use crate::evaluator::destructure::destructure;
use crate::loader::{Loader, NoLoader, Refer};
use crate::spec::Spec;
use crate::value::{Exception, Frame, Value};
use crate::{DEFAULT_DISPLAY_WIDTH, DEFAULT_TRACEBACK_LIMIT, Error, Failure};

/// Result of expanding a macro
#[derive(Debug, Clone, PartialEq)]
pub enum Expansion {
    Value(Value),
    /// Evaluate this form next, in the same scope
    Reduce(Form),
}

/// Lexical bindings; cloning shares structure
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: im::HashMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn define(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_owned(), value);
    }
}

/// Module-level bindings
#[derive(Debug, Default)]
pub struct Environment {
    name: String,
    bindings: HashMap<String, Value>,
}

impl Environment {
    pub fn new(name: impl Into<String>) -> Self {
        Environment {
            name: name.into(),
            bindings: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Width `prn` truncates its joined output to
    pub display_width: usize,
    /// Frames rendered by [`Evaluator::report`]
    pub traceback_limit: usize,
    /// Name of the module environment top-level forms are evaluated in
    pub module_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            display_width: DEFAULT_DISPLAY_WIDTH,
            traceback_limit: DEFAULT_TRACEBACK_LIMIT,
            module_name: "__main__".to_owned(),
        }
    }
}

pub struct Evaluator {
    registry: Registry,
    loader: Box<dyn Loader>,
    config: Config,
    /// Module environment currently evaluated in
    module: RefCell<Rc<RefCell<Environment>>>,
    /// Modules loaded by `require`, by name
    loaded: RefCell<HashMap<String, Rc<RefCell<Environment>>>>,
    /// Active calls, innermost last
    frames: RefCell<Vec<Frame>>,
    /// Position of the call being applied
    position: Cell<Position>,
    anonymous: Cell<usize>,
    output: RefCell<Box<dyn Write>>,
}

impl Evaluator {
    pub fn new(registry: Registry) -> Self {
        Self::with_config(registry, Config::default())
    }

    pub fn with_config(registry: Registry, config: Config) -> Self {
        let module = Rc::new(RefCell::new(Environment::new(config.module_name.as_str())));
        Evaluator {
            registry,
            loader: Box::new(NoLoader),
            config,
            module: RefCell::new(module),
            loaded: RefCell::new(HashMap::new()),
            frames: RefCell::new(Vec::new()),
            position: Cell::new(Position::default()),
            anonymous: Cell::new(0),
            output: RefCell::new(Box::new(io::stdout())),
        }
    }

    #[must_use]
    pub fn with_loader(mut self, loader: impl Loader + 'static) -> Self {
        self.loader = Box::new(loader);
        self
    }

    /// Redirect `prn` output
    #[must_use]
    pub fn with_output(self, output: impl Write + 'static) -> Self {
        self.output.replace(Box::new(output));
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look a name up in the current module environment
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.module_env().borrow().get(name).cloned()
    }

    /// Bind a name in the current module environment
    pub fn define(&self, name: &str, value: Value) {
        self.module_env().borrow_mut().define(name, value);
    }

    /// Module bindings sorted by name
    pub fn bindings(&self) -> Vec<(String, Value)> {
        let module = self.module_env();
        let mut bindings: Vec<(String, Value)> = module
            .borrow()
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        bindings.sort_by(|a, b| a.0.cmp(&b.0));
        bindings
    }

    /// Evaluate a top-level form in a fresh lexical scope.
    ///
    /// Data-level failures come back as `Ok(Value::Exception(..))`; only host-fatal
    /// errors are returned as `Err`.
    pub fn eval(&self, form: &Form) -> Result<Value, Error> {
        let mut scope = Scope::new();
        let result = self.eval_in(form, &mut scope);
        self.catch(result, form.position())
    }

    /// Read `source` and evaluate each of its forms as its own top-level form.
    ///
    /// A form that raises or fails does not stop the forms after it; only a parse
    /// error rejects the whole source.
    #[cfg(feature = "reader")]
    pub fn eval_each(&self, source: &str) -> Result<Vec<Result<Value, Error>>, Error> {
        let forms = crate::reader::read_all(source)?;
        Ok(forms.iter().map(|form| self.eval(form)).collect())
    }

    /// Evaluate every form of `source` and return the outcome of the last one.
    /// Earlier forms that raise or fail are logged.
    #[cfg(feature = "reader")]
    pub fn eval_source(&self, source: &str) -> Result<Value, Error> {
        let mut outcomes = self.eval_each(source)?;
        let last = outcomes.pop().unwrap_or(Ok(Value::Nil));
        for outcome in &outcomes {
            match outcome {
                Ok(value) if value.is_exception() => {
                    warn!(exception = %value, "top-level form raised an exception");
                }
                Err(error) => warn!(%error, "top-level form failed"),
                Ok(_) => {}
            }
        }
        last
    }

    /// Call a callable value with already evaluated arguments.
    ///
    /// Functions, keywords (as accessors) and host objects are callable. A failure
    /// raised by the callee becomes an Exception value stamped with the position of the
    /// call and the active frames.
    pub fn apply(&self, callee: &Value, args: Vec<Value>) -> Result<Value, Error> {
        let name = match callee {
            Value::Function(function) => function.name().to_owned(),
            Value::Keyword(_) => callee.format(),
            Value::Object(handle) | Value::Instance(handle) => {
                handle.object().type_name().to_owned()
            }
            other => {
                return Err(Error::NotCallable {
                    value: other.format(),
                });
            }
        };
        let position = self.position.get();
        trace!(callee = %name, arguments = args.len(), %position, "applying");

        self.frames.borrow_mut().push(Frame { name, position });
        let result = match callee {
            Value::Function(function) => function.call(self, args),
            Value::Object(handle) | Value::Instance(handle) => handle.object().call(self, args),
            _ => keyword_get(self, callee.clone(), args),
        };
        let result = self.catch(result, position);
        self.frames.borrow_mut().pop();
        result
    }

    /// Render a result for display: exceptions with their position and traceback
    pub fn report(&self, value: &Value) -> String {
        match value {
            Value::Exception(exception) => format!(
                "{}:{}: {}",
                self.config.module_name,
                exception.position(),
                exception.format_traceback(self.config.traceback_limit)
            ),
            other => other.format(),
        }
    }

    pub(crate) fn write_line(&self, line: &str) -> Result<(), Error> {
        let mut output = self.output.borrow_mut();
        writeln!(output, "{line}").map_err(|e| Failure::Io(e.to_string()))?;
        Ok(())
    }

    pub(crate) fn eval_in(&self, form: &Form, scope: &mut Scope) -> Result<Value, Error> {
        let mut current = Cow::Borrowed(form);
        loop {
            let expansion = match current.as_ref() {
                Form::Literal(value, _) => return Ok(value.clone()),
                Form::Identifier(name, position) => return self.resolve(name, *position, scope),
                Form::List(items, position) => self.eval_list(items, *position, scope)?,
            };
            match expansion {
                Expansion::Value(value) => return Ok(value),
                Expansion::Reduce(next) => current = Cow::Owned(next),
            }
        }
    }

    /// Evaluate forms in order, returning the last value or the first Exception
    pub(crate) fn eval_body(&self, body: &[Form], scope: &mut Scope) -> Result<Value, Error> {
        let mut last = Value::Nil;
        for form in body {
            last = self.eval_in(form, scope)?;
            if last.is_exception() {
                break;
            }
        }
        Ok(last)
    }

    fn resolve(&self, name: &str, position: Position, scope: &Scope) -> Result<Value, Error> {
        if let Some(value) = scope.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.lookup(name) {
            return Ok(value);
        }
        if let Some(function) = self.registry.find_function(name) {
            return Ok(Value::Function(function.clone()));
        }
        if let Some(special_form) = self.registry.find_macro(name) {
            return Ok(Value::Macro(special_form.clone()));
        }
        Err(Error::UnboundIdentifier {
            name: name.to_owned(),
            position,
        })
    }

    fn eval_list(
        &self,
        items: &[Form],
        position: Position,
        scope: &mut Scope,
    ) -> Result<Expansion, Error> {
        let Some((head, rest)) = items.split_first() else {
            return Ok(Expansion::Value(Value::Nil));
        };

        if let Some(name) = head.as_identifier()
            && let Some(special_form) = self.registry.find_macro(name)
        {
            trace!(name, %position, "expanding macro");
            return special_form.expand(rest, scope, self);
        }

        let callee = self.eval_in(head, scope)?;
        if callee.is_exception() {
            return Ok(Expansion::Value(callee));
        }
        let mut args = Vec::with_capacity(rest.len());
        for form in rest {
            let value = self.eval_in(form, scope)?;
            if value.is_exception() {
                return Ok(Expansion::Value(value));
            }
            args.push(value);
        }

        let previous = self.position.replace(position);
        let result = self.apply(&callee, args);
        self.position.set(previous);
        result.map(Expansion::Value)
    }

    fn exception(&self, failure: Failure, position: Position) -> Value {
        Value::Exception(Exception::new(
            failure,
            position,
            self.frames.borrow().clone(),
        ))
    }

    /// Turn a raised failure into an Exception value
    fn catch(&self, result: Result<Value, Error>, position: Position) -> Result<Value, Error> {
        match result {
            Err(Error::Raised(failure)) => Ok(self.exception(failure, position)),
            other => other,
        }
    }

    /// Destructure into `scope`, returning the Exception when the value does not fit
    fn bind_target(
        &self,
        target: &Form,
        value: Value,
        scope: &mut Scope,
    ) -> Result<Option<Value>, Error> {
        match destructure(target, value) {
            Ok(bindings) => {
                for (name, value) in bindings {
                    scope.define(&name, value);
                }
                Ok(None)
            }
            Err(Error::Raised(failure)) => Ok(Some(self.exception(failure, target.position()))),
            Err(error) => Err(error),
        }
    }

    fn next_anonymous_name(&self) -> String {
        let n = self.anonymous.get() + 1;
        self.anonymous.set(n);
        format!("fn-{n}")
    }

    pub(crate) fn module_env(&self) -> Rc<RefCell<Environment>> {
        self.module.borrow().clone()
    }

    /// Run `f` with `module` as the module environment
    pub(crate) fn within_module<T>(
        &self,
        module: Rc<RefCell<Environment>>,
        f: impl FnOnce(&Self) -> T,
    ) -> T {
        let previous = self.module.replace(module);
        let result = f(self);
        self.module.replace(previous);
        result
    }

    #[cfg(feature = "reader")]
    fn eval_module_source(&self, source: &str) -> Result<Vec<Result<Value, Error>>, Error> {
        self.eval_each(source)
    }

    #[cfg(not(feature = "reader"))]
    fn eval_module_source(&self, _source: &str) -> Result<Vec<Result<Value, Error>>, Error> {
        warn!("built without the reader, module sources cannot be evaluated");
        Ok(Vec::new())
    }

    /// Load `module` once, then bind its definitions as `module/name`, and unqualified
    /// for referred names
    pub(crate) fn require_module(&self, module: &str, refer: &Refer) {
        let cached = self.loaded.borrow().get(module).cloned();
        let environment = match cached {
            Some(environment) => environment,
            None => {
                let Some(source) = self.loader.source(module) else {
                    warn!(module, "module not found");
                    return;
                };
                debug!(module, "loading module");
                let environment = Rc::new(RefCell::new(Environment::new(module)));
                self.loaded
                    .borrow_mut()
                    .insert(module.to_owned(), environment.clone());
                match self.within_module(environment.clone(), |evaluator| {
                    evaluator.eval_module_source(&source)
                }) {
                    Ok(outcomes) => {
                        for outcome in outcomes {
                            match outcome {
                                Ok(value) if value.is_exception() => {
                                    warn!(module, exception = %value, "module form raised an exception");
                                }
                                Err(error) => warn!(module, %error, "module form failed"),
                                Ok(_) => {}
                            }
                        }
                    }
                    Err(error) => warn!(module, %error, "module failed to load"),
                }
                environment
            }
        };

        let target = self.module_env();
        if Rc::ptr_eq(&environment, &target) {
            return;
        }
        let definitions: Vec<(String, Value)> = environment
            .borrow()
            .iter()
            .filter(|(name, _)| !name.contains('/'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        let mut target = target.borrow_mut();
        for (name, value) in &definitions {
            target.define(format!("{module}/{name}"), value.clone());
            if refer.includes(name) {
                target.define(name.as_str(), value.clone());
            }
        }
        if let Refer::Names(names) = refer {
            for name in names {
                if !definitions.iter().any(|(defined, _)| defined == name) {
                    warn!(module, name = name.as_str(), "referred name is not defined");
                }
            }
        }
    }

    /// Bind the host object registered as `module`, and its referred attributes
    pub(crate) fn import_module(&self, module: &str, refer: &Refer) {
        let Some(object) = self.loader.host_object(module) else {
            warn!(module, "host object not found");
            return;
        };
        debug!(module, "importing host object");
        let target = self.module_env();
        let mut target = target.borrow_mut();
        if let Value::Object(handle) | Value::Instance(handle) = &object {
            let names = match refer {
                Refer::None => Vec::new(),
                Refer::All => handle.object().attribute_names(),
                Refer::Names(names) => names.clone(),
            };
            for name in names {
                match handle.object().attribute(&name) {
                    Some(attribute) => target.define(name, attribute),
                    None => warn!(module, name = name.as_str(), "attribute not found"),
                }
            }
        }
        target.define(module, object);
    }
}

//
// Builtin Macros
//

/// Return early with an Exception value
macro_rules! propagate {
    ($value:expr) => {{
        let value = $value;
        if value.is_exception() {
            return Ok(Expansion::Value(value));
        }
        value
    }};
}

pub(crate) fn eval_do(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let Some((last, init)) = forms.split_last() else {
        return Ok(Expansion::Value(Value::Nil));
    };
    for form in init {
        propagate!(evaluator.eval_in(form, scope)?);
    }
    Ok(Expansion::Reduce(last.clone()))
}

fn thread(
    name: &str,
    forms: &[Form],
    rewrite: fn(Form, Form) -> Form,
) -> Result<Expansion, Error> {
    let Some((first, rest)) = forms.split_first() else {
        return Err(Error::malformed(name, "nothing to thread"));
    };
    let threaded = rest
        .iter()
        .cloned()
        .fold(first.clone(), |prev, next| rewrite(next, prev));
    Ok(Expansion::Reduce(threaded))
}

pub(crate) fn eval_thread_first(
    forms: &[Form],
    _scope: &mut Scope,
    _evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    thread("->", forms, Form::thread_first)
}

pub(crate) fn eval_thread_last(
    forms: &[Form],
    _scope: &mut Scope,
    _evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    thread("->>", forms, Form::thread_last)
}

pub(crate) fn eval_if(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let (condition, then, otherwise) = match forms {
        [condition, then] => (condition, then, None),
        [condition, then, otherwise] => (condition, then, Some(otherwise)),
        _ => return Err(Error::malformed("if", "expected a condition and one or two branches")),
    };
    let condition = propagate!(evaluator.eval_in(condition, scope)?);
    if condition.truthy() {
        Ok(Expansion::Reduce(then.clone()))
    } else {
        Ok(otherwise.map_or(Expansion::Value(Value::Nil), |form| {
            Expansion::Reduce(form.clone())
        }))
    }
}

pub(crate) fn eval_when(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [condition, then] = forms else {
        return Err(Error::malformed("when", "expected a condition and a body"));
    };
    let condition = propagate!(evaluator.eval_in(condition, scope)?);
    if condition.truthy() {
        Ok(Expansion::Reduce(then.clone()))
    } else {
        Ok(Expansion::Value(Value::Nil))
    }
}

pub(crate) fn eval_cond(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    for clause in forms.chunks_exact(2) {
        let condition = propagate!(evaluator.eval_in(&clause[0], scope)?);
        if condition.truthy() {
            return Ok(Expansion::Reduce(clause[1].clone()));
        }
    }
    Ok(Expansion::Value(Value::Nil))
}

pub(crate) fn eval_comment(
    _forms: &[Form],
    _scope: &mut Scope,
    _evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    Ok(Expansion::Value(Value::Nil))
}

pub(crate) fn eval_and(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let mut last = Value::Boolean(true);
    for form in forms {
        last = propagate!(evaluator.eval_in(form, scope)?);
        if !last.truthy() {
            break;
        }
    }
    Ok(Expansion::Value(last))
}

pub(crate) fn eval_or(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let mut last = Value::Nil;
    for form in forms {
        last = propagate!(evaluator.eval_in(form, scope)?);
        if last.truthy() {
            break;
        }
    }
    Ok(Expansion::Value(last))
}

pub(crate) fn eval_fn(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let (name, rest) = match forms {
        [Form::Identifier(name, _), rest @ ..] => (name.clone(), rest),
        _ => (evaluator.next_anonymous_name(), forms),
    };
    let [params, body @ ..] = rest else {
        return Err(Error::malformed("fn", "missing parameter vector"));
    };
    let function = Closure::build(
        evaluator,
        name.clone(),
        params,
        body,
        scope.clone(),
        Spec::new(),
        None,
    )?;
    scope.define(&name, Value::Function(function));
    Ok(Expansion::Reduce(Form::Identifier(name, params.position())))
}

pub(crate) fn eval_def(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [Form::Identifier(name, _), form] = forms else {
        return Err(Error::malformed("def", "expected a name and a value"));
    };
    let value = propagate!(evaluator.eval_in(form, scope)?);
    evaluator.define(name, value.clone());
    Ok(Expansion::Value(value))
}

pub(crate) fn eval_defn(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [Form::Identifier(name, _), rest @ ..] = forms else {
        return Err(Error::malformed("defn", "expected a name"));
    };
    let mut rest = rest;

    let mut docstring = None;
    if let [Form::Literal(Value::String(doc), _), tail @ ..] = rest
        && !tail.is_empty()
    {
        docstring = Some(doc.clone());
        rest = tail;
    }

    let mut spec = Spec::new();
    if let [spec_map, tail @ ..] = rest
        && spec_map.is_hashmap_literal()
    {
        let value = evaluator.eval_in(spec_map, scope)?;
        if value.is_exception() {
            return Ok(Expansion::Value(value));
        }
        spec = Spec::from_value(&value)
            .map_err(|message| Error::malformed(spec_map.to_string(), message))?;
        rest = tail;
    }

    let [params, body @ ..] = rest else {
        return Err(Error::malformed(name.as_str(), "missing parameter vector"));
    };
    let function = Closure::build(
        evaluator,
        name.clone(),
        params,
        body,
        scope.clone(),
        spec,
        docstring,
    )?;
    let value = Value::Function(function);
    evaluator.define(name, value.clone());
    Ok(Expansion::Value(value))
}

pub(crate) fn eval_let(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [bindings, body @ ..] = forms else {
        return Err(Error::malformed("let", "expected a binding vector"));
    };
    let Some(pairs) = bindings.vector_items() else {
        return Err(Error::malformed(bindings.to_string(), "bindings should be a vector"));
    };
    if pairs.len() % 2 != 0 {
        return Err(Error::malformed(
            bindings.to_string(),
            "bindings should come in target/value pairs",
        ));
    }

    let mut inner = scope.clone();
    for pair in pairs.chunks_exact(2) {
        let value = propagate!(evaluator.eval_in(&pair[1], &mut inner)?);
        if let Some(exception) = evaluator.bind_target(&pair[0], value, &mut inner)? {
            return Ok(Expansion::Value(exception));
        }
    }
    Ok(Expansion::Value(evaluator.eval_body(body, &mut inner)?))
}

pub(crate) fn eval_for(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [header, body] = forms else {
        return Err(Error::malformed("for", "expected a binding vector and a body"));
    };
    let Some([target, collection]) = header.vector_items() else {
        return Err(Error::malformed(header.to_string(), "expected [target vector]"));
    };

    let items = match propagate!(evaluator.eval_in(collection, scope)?) {
        Value::Vector(items) => items,
        other => {
            let failure = Failure::TypeMismatch(format!(
                "'for' needs a Vector, got {}",
                other.data_type()
            ));
            return Ok(Expansion::Value(evaluator.exception(failure, collection.position())));
        }
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items.iter() {
        let mut inner = scope.clone();
        if let Some(exception) = evaluator.bind_target(target, item.clone(), &mut inner)? {
            return Ok(Expansion::Value(exception));
        }
        results.push(propagate!(evaluator.eval_in(body, &mut inner)?));
    }
    Ok(Expansion::Value(Value::Vector(results.into_iter().collect())))
}

pub(crate) fn eval_require(
    forms: &[Form],
    scope: &mut Scope,
    evaluator: &Evaluator,
) -> Result<Expansion, Error> {
    let [request] = forms else {
        return Err(Error::malformed("require", "expected a module request"));
    };
    let value = propagate!(evaluator.eval_in(request, scope)?);
    match module_request("require", &value) {
        Ok(Some((module, refer))) => evaluator.require_module(&module, &refer),
        Ok(None) => {}
        Err(Error::Raised(failure)) => {
            return Ok(Expansion::Value(evaluator.exception(failure, request.position())));
        }
        Err(error) => return Err(error),
    }
    Ok(Expansion::Value(Value::Nil))
}
