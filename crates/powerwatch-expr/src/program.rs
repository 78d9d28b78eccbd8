//! Compiled predicates

use std::fmt;
use std::sync::Arc;

use cel_interpreter::{Context, Program};

use crate::check::check;
use crate::{Activation, CompileError, CompileResult, EvalError, EvalResult, Schema, Type};

/// A CEL expression that parsed, type-checked against a schema and yields
/// `bool`.
#[derive(Clone)]
pub struct Predicate {
    source: String,
    variables: Vec<(String, Type)>,
    program: Arc<Program>,
}

impl Predicate {
    /// Compile `source`, rejecting it unless it type-checks to bool.
    pub fn compile(source: &str, schema: &Schema) -> CompileResult<Self> {
        let ast = cel_parser::parse(source).map_err(syntax)?;
        let checked = check(&ast, schema)?;
        if checked.output != Type::Bool {
            return Err(CompileError::OutputType {
                expected: Type::Bool,
                found: checked.output,
            });
        }

        let program = Program::compile(source).map_err(syntax)?;
        Ok(Self {
            source: source.to_string(),
            variables: checked.variables.into_iter().collect(),
            program: Arc::new(program),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against `act`. Every variable the expression reads must be
    /// bound with its declared type.
    pub fn test(&self, act: &Activation) -> EvalResult<bool> {
        let mut context = Context::default();
        for (name, declared) in &self.variables {
            let value = act
                .get(name)
                .ok_or_else(|| EvalError::Unbound(name.clone()))?;
            let found = value.type_of();
            if found != *declared {
                return Err(EvalError::Binding {
                    name: name.clone(),
                    expected: declared.clone(),
                    found,
                });
            }
            context.add_variable_from_value(name.clone(), value.to_cel());
        }

        match self.program.execute(&context) {
            Ok(cel_interpreter::Value::Bool(b)) => Ok(b),
            Ok(other) => Err(EvalError::NotBool(format!("{other:?}"))),
            Err(e) => Err(EvalError::Execution(e.to_string())),
        }
    }
}

fn syntax(e: impl fmt::Display) -> CompileError {
    CompileError::Syntax(e.to_string())
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("source", &self.source)
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Schema {
        Schema::new()
            .with("powerType", Type::Int)
            .with("online", Type::Bool)
            .with("scope", Type::String)
    }

    fn event(online: bool, power_type: i64, scope: &str) -> Activation {
        Activation::new()
            .bind("online", online)
            .bind("powerType", power_type)
            .bind("scope", scope)
    }

    fn run(src: &str, act: &Activation) -> EvalResult<bool> {
        Predicate::compile(src, &schema()).unwrap().test(act)
    }

    #[test]
    fn evaluates_default_policies() {
        let down = event(false, 1, "global");
        let up = event(true, 1, "global");
        let generator = event(false, 2, "global");

        assert_eq!(run("!online && powerType == 1", &down), Ok(true));
        assert_eq!(run("!online && powerType == 1", &up), Ok(false));
        assert_eq!(run("!online && powerType == 1", &generator), Ok(false));
        assert_eq!(run("online && powerType == 1", &up), Ok(true));
    }

    #[test]
    fn string_functions_and_membership() {
        let act = event(false, 3, "1p");
        assert_eq!(run("scope.startsWith('1')", &act), Ok(true));
        assert_eq!(run("scope.endsWith('c')", &act), Ok(false));
        assert_eq!(run("scope.contains('p')", &act), Ok(true));
        assert_eq!(run("size(scope) == 2", &act), Ok(true));
        assert_eq!(run("powerType in [1, 3]", &act), Ok(true));
        assert_eq!(run("scope in ['global', 'local']", &act), Ok(false));
        assert_eq!(run("\"1\" + 'p' == scope", &act), Ok(true));
    }

    #[test]
    fn ternary_evaluates_one_branch() {
        // The other branch would divide by zero.
        let act = event(true, 1, "");
        assert_eq!(run("online ? true : 1 / (powerType - 1) > 0", &act), Ok(true));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let act = event(true, 1, "");
        assert!(matches!(
            run("10 / (powerType - 1) > 0", &act),
            Err(EvalError::Execution(_))
        ));
    }

    #[test]
    fn predicate_requires_bool_output() {
        assert_eq!(
            Predicate::compile("powerType", &schema()).unwrap_err(),
            CompileError::OutputType {
                expected: Type::Bool,
                found: Type::Int
            }
        );
        assert!(matches!(
            Predicate::compile("scope", &schema()),
            Err(CompileError::OutputType { .. })
        ));
        assert!(Predicate::compile("online", &schema()).is_ok());
    }

    #[test]
    fn syntax_errors_are_reported() {
        for src in ["online &&", "(powerType == 1", "powerType ==== 1"] {
            assert!(
                matches!(Predicate::compile(src, &schema()), Err(CompileError::Syntax(_))),
                "{src} should not parse"
            );
        }
    }

    #[test]
    fn unbound_and_mistyped_bindings_fail() {
        let partial = Activation::new().bind("online", true);
        assert_eq!(
            run("powerType == 1", &partial),
            Err(EvalError::Unbound("powerType".into()))
        );

        let wrong = Activation::new().bind("online", 1_i64);
        assert_eq!(
            run("!online", &wrong),
            Err(EvalError::Binding {
                name: "online".into(),
                expected: Type::Bool,
                found: Type::Int
            })
        );
    }

    #[test]
    fn unread_variables_need_no_binding() {
        let act = Activation::new().bind("online", false);
        assert_eq!(run("!online", &act), Ok(true));
    }

    #[test]
    fn displays_source() {
        let predicate = Predicate::compile("!online", &schema()).unwrap();
        assert_eq!(predicate.to_string(), "!online");
        assert_eq!(predicate.source(), "!online");
    }
}
