//! User-defined functions built by `fn` and `defn`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::Error;
use crate::ast::Form;
use crate::builtinops::{Descriptor, Function};
use crate::evaluator::destructure::{destructure, parameter_arity};
use crate::evaluator::{Environment, Evaluator, Scope};
use crate::spec::Spec;
use crate::value::Value;

/// Parameters, body and captured lexical scope of a user function
pub(crate) struct Closure {
    params: Form,
    body: Vec<Form>,
    captured: Scope,
    /// Module the function was defined in; names it does not capture resolve there
    module: Weak<RefCell<Environment>>,
}

impl Closure {
    /// Build the function value. The parameter arity becomes the first rule of its spec,
    /// followed by any `user_spec` rules.
    pub(crate) fn build(
        evaluator: &Evaluator,
        name: String,
        params: &Form,
        body: &[Form],
        captured: Scope,
        user_spec: Spec,
        docstring: Option<String>,
    ) -> Result<Function, Error> {
        let arity = parameter_arity(params)?;
        let mut descriptor = Descriptor::function(name.as_str())
            .form(format!("({name} {params})"))
            .spec(Spec::new().rule(arity).extend(user_spec));
        if let Some(docstring) = docstring {
            descriptor = descriptor.doc(docstring);
        }
        let closure = Closure {
            params: params.clone(),
            body: body.to_vec(),
            captured,
            module: Rc::downgrade(&evaluator.module_env()),
        };
        Ok(Function::closure(descriptor, closure))
    }

    pub(crate) fn forms(&self, name: &str) -> Vec<String> {
        vec![format!("({name} {})", self.params)]
    }

    /// Run the body with the arguments bound. The function is bound to its own name
    /// first, so it can call itself without a reference cycle through the scope.
    pub(crate) fn invoke(
        &self,
        evaluator: &Evaluator,
        function: &Function,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        let mut scope = self.captured.clone();
        scope.define(function.name(), Value::Function(function.clone()));
        for (name, value) in destructure(&self.params, Value::Vector(args.into_iter().collect()))? {
            scope.define(&name, value);
        }

        match self.module.upgrade() {
            Some(module) => {
                evaluator.within_module(module, |evaluator| evaluator.eval_body(&self.body, &mut scope))
            }
            None => evaluator.eval_body(&self.body, &mut scope),
        }
    }
}
