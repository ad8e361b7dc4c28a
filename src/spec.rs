//! Declarative call contracts.
//!
//! A [`Spec`] is an ordered list of [`Rule`]s checked against the raw argument list of a
//! call before the callee runs. The first violated rule aborts the call with
//! [`Error::SpecViolation`]. Macros receive unevaluated forms, so only the arity rules of
//! their spec are checked.

use std::fmt;

use crate::Error;
use crate::ast::Form;
use crate::value::{TypeConstraint, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    ArityIs(usize),
    ArityAtLeast(usize),
    ArityAtLeastOne,
    ArityEven,
    ArityVariants(Vec<usize>),
    EachArgumentTypeIs(TypeConstraint),
    /// The argument types must positionally match at least one of the chains
    ArgumentsTypeChainVariants(Vec<Vec<TypeConstraint>>),
}

impl Rule {
    /// `None` for rules that look at argument types rather than count
    fn admits_count(&self, count: usize) -> Option<bool> {
        match self {
            Rule::ArityIs(n) => Some(count == *n),
            Rule::ArityAtLeast(n) => Some(count >= *n),
            Rule::ArityAtLeastOne => Some(count >= 1),
            Rule::ArityEven => Some(count % 2 == 0),
            Rule::ArityVariants(counts) => Some(counts.contains(&count)),
            Rule::EachArgumentTypeIs(_) | Rule::ArgumentsTypeChainVariants(_) => None,
        }
    }

    pub fn admits(&self, args: &[Value]) -> bool {
        match self {
            Rule::EachArgumentTypeIs(constraint) => args.iter().all(|arg| constraint.admits(arg)),
            Rule::ArgumentsTypeChainVariants(chains) => chains.iter().any(|chain| {
                chain.len() == args.len()
                    && chain
                        .iter()
                        .zip(args)
                        .all(|(constraint, arg)| constraint.admits(arg))
            }),
            arity => arity.admits_count(args.len()).unwrap_or(true),
        }
    }

    /// Build a rule from its dash-case name and argument, e.g. `:arity-is 2`
    pub fn from_value(name: &str, argument: Option<&Value>) -> Result<Rule, String> {
        let count = |value: Option<&Value>| match value {
            Some(Value::IntegerNumber(n)) => {
                usize::try_from(*n).map_err(|_| format!("'{name}' needs a non-negative count"))
            }
            _ => Err(format!("'{name}' needs an integer count")),
        };
        let rule = match name {
            "arity-is" => Rule::ArityIs(count(argument)?),
            "arity-at-least" => Rule::ArityAtLeast(count(argument)?),
            "arity-at-least-one" => Rule::ArityAtLeastOne,
            "arity-even" => Rule::ArityEven,
            "arity-variants" => {
                let counts = vector_items(argument, name)?
                    .iter()
                    .map(|item| count(Some(item)))
                    .collect::<Result<Vec<_>, _>>()?;
                Rule::ArityVariants(counts)
            }
            "each-argument-type-is" => Rule::EachArgumentTypeIs(constraint(argument)?),
            "arguments-type-chain-variants" => {
                let chains = vector_items(argument, name)?
                    .iter()
                    .map(|chain| {
                        vector_items(Some(chain), name)?
                            .iter()
                            .map(|item| constraint(Some(item)))
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Rule::ArgumentsTypeChainVariants(chains)
            }
            other => return Err(format!("unknown rule '{other}'")),
        };
        Ok(rule)
    }
}

fn vector_items(value: Option<&Value>, name: &str) -> Result<Vec<Value>, String> {
    match value {
        Some(Value::Vector(items)) => Ok(items.iter().cloned().collect()),
        _ => Err(format!("'{name}' needs a Vector argument")),
    }
}

fn constraint(value: Option<&Value>) -> Result<TypeConstraint, String> {
    match value {
        Some(Value::String(name)) => {
            TypeConstraint::from_name(name).ok_or_else(|| format!("unknown type '{name}'"))
        }
        Some(Value::Type(data_type)) => Ok(TypeConstraint::Exactly(*data_type)),
        _ => Err("type names must be Strings".to_owned()),
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    write!(f, "]")
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::ArityIs(n) => write!(f, "ArityIs({n})"),
            Rule::ArityAtLeast(n) => write!(f, "ArityAtLeast({n})"),
            Rule::ArityAtLeastOne => write!(f, "ArityAtLeastOne"),
            Rule::ArityEven => write!(f, "ArityEven"),
            Rule::ArityVariants(counts) => {
                write!(f, "ArityVariants(")?;
                write_list(f, counts)?;
                write!(f, ")")
            }
            Rule::EachArgumentTypeIs(constraint) => write!(f, "EachArgumentTypeIs({constraint})"),
            Rule::ArgumentsTypeChainVariants(chains) => {
                write!(f, "ArgumentsTypeChainVariants([")?;
                for (i, chain) in chains.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_list(f, chain)?;
                }
                write!(f, "])")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spec {
    rules: Vec<Rule>,
}

impl Spec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn arity_is(self, n: usize) -> Self {
        self.rule(Rule::ArityIs(n))
    }

    pub fn arity_at_least(self, n: usize) -> Self {
        self.rule(Rule::ArityAtLeast(n))
    }

    pub fn arity_at_least_one(self) -> Self {
        self.rule(Rule::ArityAtLeastOne)
    }

    pub fn arity_even(self) -> Self {
        self.rule(Rule::ArityEven)
    }

    pub fn arity_variants(self, counts: &[usize]) -> Self {
        self.rule(Rule::ArityVariants(counts.to_vec()))
    }

    pub fn each_argument_type_is(self, constraint: impl Into<TypeConstraint>) -> Self {
        self.rule(Rule::EachArgumentTypeIs(constraint.into()))
    }

    pub fn arguments_type_chain_variants(self, chains: Vec<Vec<TypeConstraint>>) -> Self {
        self.rule(Rule::ArgumentsTypeChainVariants(chains))
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Append the rules of `other` after this spec's own
    pub fn extend(mut self, other: Spec) -> Self {
        self.rules.extend(other.rules);
        self
    }

    /// Check evaluated arguments of a function call
    pub fn validate(&self, callee: &str, args: &[Value]) -> Result<(), Error> {
        match self.rules.iter().find(|rule| !rule.admits(args)) {
            Some(rule) => Err(Error::SpecViolation {
                callee: callee.to_owned(),
                rule: rule.clone(),
                received: join_display(args),
            }),
            None => Ok(()),
        }
    }

    /// Check the argument count of a macro call
    pub fn validate_forms(&self, callee: &str, forms: &[Form]) -> Result<(), Error> {
        let violated = self
            .rules
            .iter()
            .find(|rule| rule.admits_count(forms.len()) == Some(false));
        match violated {
            Some(rule) => Err(Error::SpecViolation {
                callee: callee.to_owned(),
                rule: rule.clone(),
                received: join_display(forms),
            }),
            None => Ok(()),
        }
    }

    /// Parse a `defn` spec-map: `{:spec [[:arity-is 1] [:each-argument-type-is "String"]]}`
    pub fn from_value(spec_map: &Value) -> Result<Spec, String> {
        let Value::Map(map) = spec_map else {
            return Err(format!("expected a spec Map, got {}", spec_map.data_type()));
        };
        let rules = match map.get(&Value::Keyword("spec".to_owned()), Value::Nil) {
            Value::Nil => return Ok(Spec::new()),
            Value::Vector(rules) => rules,
            other => return Err(format!(":spec must be a Vector, got {}", other.data_type())),
        };
        rules.iter().try_fold(Spec::new(), |spec, entry| {
            let Value::Vector(parts) = entry else {
                return Err(format!("each rule must be a Vector, got {entry}"));
            };
            match parts.nth(0) {
                Some(Value::Keyword(name)) => Ok(spec.rule(Rule::from_value(name, parts.nth(1))?)),
                _ => Err(format!("rule {entry} must start with a Keyword")),
            }
        })
    }
}

fn join_display<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::collections::Map;
    use crate::value::{DataType, kw, val};
    use pretty_assertions::assert_eq;

    fn numeric() -> TypeConstraint {
        TypeConstraint::Numeric
    }

    #[test]
    fn test_rules_data_driven() {
        let test_cases = vec![
            (Rule::ArityIs(2), vec![val(1), val(2)], true),
            (Rule::ArityIs(2), vec![val(1)], false),
            (Rule::ArityAtLeast(1), vec![], false),
            (Rule::ArityAtLeastOne, vec![val(1)], true),
            (Rule::ArityAtLeastOne, vec![], false),
            (Rule::ArityEven, vec![], true),
            (Rule::ArityEven, vec![val(1), val(2), val(3)], false),
            (Rule::ArityVariants(vec![2, 3]), vec![val(1), val(2), val(3)], true),
            (Rule::ArityVariants(vec![2, 3]), vec![val(1)], false),
            (Rule::EachArgumentTypeIs(numeric()), vec![val(1), val(2.5)], true),
            (Rule::EachArgumentTypeIs(numeric()), vec![val(1), val("2")], false),
            (Rule::EachArgumentTypeIs(numeric()), vec![], true),
            (
                Rule::ArgumentsTypeChainVariants(vec![
                    vec![DataType::Function.into(), DataType::Vector.into()],
                    vec![DataType::Keyword.into(), TypeConstraint::Collection],
                ]),
                vec![kw("k"), val([1])],
                true,
            ),
            (
                Rule::ArgumentsTypeChainVariants(vec![vec![
                    DataType::Keyword.into(),
                    TypeConstraint::Collection,
                ]]),
                vec![kw("k"), val("not a collection")],
                false,
            ),
            (
                Rule::ArgumentsTypeChainVariants(vec![vec![DataType::Keyword.into()]]),
                vec![kw("k"), val(1)],
                false,
            ),
        ];

        for (i, (rule, args, expected)) in test_cases.iter().enumerate() {
            assert_eq!(rule.admits(args), *expected, "rule case #{}: {rule}", i + 1);
        }
    }

    #[test]
    fn test_validate_fails_fast_on_first_rule() {
        let spec = Spec::new().arity_is(1).each_argument_type_is(numeric());
        assert!(spec.validate("inc", &[val(1)]).is_ok());

        match spec.validate("inc", &[]) {
            Err(Error::SpecViolation { callee, rule, .. }) => {
                assert_eq!(callee, "inc");
                assert_eq!(rule, Rule::ArityIs(1));
            }
            other => panic!("expected SpecViolation, got {other:?}"),
        }

        let err = spec.validate("inc", &[val("x")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SpecViolation: 'inc' violates EachArgumentTypeIs(Numeric), received: [\"x\"]"
        );
    }

    #[test]
    fn test_validate_forms_checks_arity_only() {
        let spec = Spec::new().arity_variants(&[2, 3]).each_argument_type_is(numeric());
        let forms = vec![Form::identifier("a"), Form::literal("b")];
        assert!(spec.validate_forms("if", &forms).is_ok());
        assert!(spec.validate_forms("if", &forms[..1]).is_err());
    }

    #[test]
    fn test_spec_from_value() {
        let rules = val(vec![
            val(vec![kw("arity-is"), val(1)]),
            val(vec![kw("each-argument-type-is"), val("IntegerNumber")]),
            val(vec![kw("arity-variants"), val([1, 2])]),
            val(vec![
                kw("arguments-type-chain-variants"),
                val(vec![val(["String", "Any"])]),
            ]),
        ]);
        let spec_map = Value::Map(Map::from_flat(vec![kw("spec"), rules]).unwrap());

        let spec = Spec::from_value(&spec_map).unwrap();
        assert_eq!(
            spec.rules(),
            &[
                Rule::ArityIs(1),
                Rule::EachArgumentTypeIs(DataType::IntegerNumber.into()),
                Rule::ArityVariants(vec![1, 2]),
                Rule::ArgumentsTypeChainVariants(vec![vec![
                    DataType::String.into(),
                    TypeConstraint::Any
                ]]),
            ]
        );

        let empty = Value::Map(Map::default());
        assert!(Spec::from_value(&empty).unwrap().is_empty());

        let bad_cases = vec![
            val(1),
            Value::Map(Map::from_flat(vec![kw("spec"), val(1)]).unwrap()),
            Value::Map(Map::from_flat(vec![kw("spec"), val(vec![val([kw("nope")])])]).unwrap()),
            Value::Map(
                Map::from_flat(vec![
                    kw("spec"),
                    val(vec![val(vec![kw("each-argument-type-is"), val("Bogus")])]),
                ])
                .unwrap(),
            ),
        ];
        for (i, bad) in bad_cases.iter().enumerate() {
            assert!(Spec::from_value(bad).is_err(), "bad spec-map #{}", i + 1);
        }
    }
}
