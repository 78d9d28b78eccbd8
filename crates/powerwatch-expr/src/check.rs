//! Static type checking over the CEL syntax tree

use std::collections::BTreeMap;

use cel_parser::{ArithmeticOp, Atom, Expression, Member, RelationOp, UnaryOp};

use crate::{CompileError, CompileResult, Schema, Type};

/// Type of a checked expression and the variables it reads
#[derive(Debug)]
pub(crate) struct Checked {
    pub output: Type,
    pub variables: BTreeMap<String, Type>,
}

pub(crate) fn check(expr: &Expression, schema: &Schema) -> CompileResult<Checked> {
    let mut checker = Checker {
        schema,
        variables: BTreeMap::new(),
    };
    let output = checker.infer(expr)?;
    Ok(Checked {
        output,
        variables: checker.variables,
    })
}

struct Checker<'a> {
    schema: &'a Schema,
    variables: BTreeMap<String, Type>,
}

impl Checker<'_> {
    fn infer(&mut self, expr: &Expression) -> CompileResult<Type> {
        match expr {
            Expression::Atom(atom) => atom_type(atom),

            Expression::Ident(name) => {
                let ty = self.schema.get(name.as_str()).cloned().ok_or_else(|| {
                    CompileError::UndeclaredIdent {
                        name: name.to_string(),
                    }
                })?;
                self.variables.insert(name.to_string(), ty.clone());
                Ok(ty)
            }

            Expression::Unary(op, operand) => {
                let ty = self.infer(operand)?;
                match op {
                    UnaryOp::Not | UnaryOp::DoubleNot if ty == Type::Bool => Ok(ty),
                    UnaryOp::Minus | UnaryOp::DoubleMinus
                        if matches!(ty, Type::Int | Type::Double) =>
                    {
                        Ok(ty)
                    }
                    _ => Err(type_error(format!("cannot apply unary operator to {ty}"))),
                }
            }

            Expression::And(l, r) | Expression::Or(l, r) => {
                let (l, r) = (self.infer(l)?, self.infer(r)?);
                if l == Type::Bool && r == Type::Bool {
                    Ok(Type::Bool)
                } else {
                    Err(type_error(format!("logical operator on {l} and {r}")))
                }
            }

            Expression::Ternary(cond, then, otherwise) => {
                let cond = self.infer(cond)?;
                if cond != Type::Bool {
                    return Err(type_error(format!("condition is {cond}, expected bool")));
                }
                let (then, otherwise) = (self.infer(then)?, self.infer(otherwise)?);
                if then != otherwise {
                    return Err(type_error(format!("branches yield {then} and {otherwise}")));
                }
                Ok(then)
            }

            Expression::Arithmetic(l, op, r) => {
                let (l, r) = (self.infer(l)?, self.infer(r)?);
                arithmetic_type(op, l, r)
            }

            Expression::Relation(l, op, r) => {
                let (l, r) = (self.infer(l)?, self.infer(r)?);
                relation_type(op, &l, &r)
            }

            Expression::List(items) => {
                let mut types = items.iter().map(|item| self.infer(item));
                let Some(first) = types.next() else {
                    return Err(type_error("empty list literals have no element type"));
                };
                let first = first?;
                for ty in types {
                    let ty = ty?;
                    if ty != first {
                        return Err(type_error(format!("list mixes {first} and {ty}")));
                    }
                }
                Ok(Type::List(Box::new(first)))
            }

            Expression::Member(target, member) => {
                let target = self.infer(target)?;
                match member.as_ref() {
                    Member::Index(index) => {
                        let index = self.infer(index)?;
                        match (target, index) {
                            (Type::List(elem), Type::Int | Type::Uint) => Ok(*elem),
                            (target, index) => {
                                Err(type_error(format!("cannot index {target} with {index}")))
                            }
                        }
                    }
                    Member::Attribute(name) => Err(CompileError::Unsupported(format!(
                        "field selection '.{name}'"
                    ))),
                    _ => Err(CompileError::Unsupported("message construction".into())),
                }
            }

            Expression::FunctionCall(func, target, args) => {
                let Expression::Ident(name) = func.as_ref() else {
                    return Err(CompileError::Unsupported("computed function name".into()));
                };
                let target = target.as_deref().map(|t| self.infer(t)).transpose()?;
                let args = args
                    .iter()
                    .map(|arg| self.infer(arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                function_type(name.as_str(), target, &args)
            }

            _ => Err(CompileError::Unsupported("map literal".into())),
        }
    }
}

fn type_error(message: impl Into<String>) -> CompileError {
    CompileError::Type(message.into())
}

fn atom_type(atom: &Atom) -> CompileResult<Type> {
    match atom {
        Atom::Int(_) => Ok(Type::Int),
        Atom::UInt(_) => Ok(Type::Uint),
        Atom::Float(_) => Ok(Type::Double),
        Atom::Bool(_) => Ok(Type::Bool),
        Atom::String(_) => Ok(Type::String),
        _ => Err(CompileError::Unsupported("null and bytes literals".into())),
    }
}

fn arithmetic_type(op: &ArithmeticOp, l: Type, r: Type) -> CompileResult<Type> {
    let ok = l == r
        && match op {
            ArithmeticOp::Add => l.is_numeric() || matches!(l, Type::String | Type::List(_)),
            ArithmeticOp::Modulus => matches!(l, Type::Int | Type::Uint),
            _ => l.is_numeric(),
        };
    if ok {
        Ok(l)
    } else {
        Err(type_error(format!("arithmetic on {l} and {r}")))
    }
}

fn relation_type(op: &RelationOp, l: &Type, r: &Type) -> CompileResult<Type> {
    let comparable = |a: &Type, b: &Type| a == b || (a.is_numeric() && b.is_numeric());
    let ok = match op {
        RelationOp::Equals | RelationOp::NotEquals => comparable(l, r),
        RelationOp::In => matches!(r, Type::List(elem) if comparable(l, elem)),
        _ => (l.is_numeric() && r.is_numeric()) || (*l == Type::String && *r == Type::String),
    };
    if ok {
        Ok(Type::Bool)
    } else {
        Err(type_error(format!("cannot compare {l} with {r}")))
    }
}

fn function_type(name: &str, target: Option<Type>, args: &[Type]) -> CompileResult<Type> {
    let converts = |t: &Type| t.is_numeric() || *t == Type::String;

    let ty = match (name, target.as_ref(), args) {
        ("size", Some(t), []) | ("size", None, [t])
            if matches!(t, Type::String | Type::List(_)) =>
        {
            Type::Int
        }
        ("startsWith" | "endsWith" | "matches" | "contains", Some(Type::String), [Type::String]) => {
            Type::Bool
        }
        ("contains", Some(Type::List(elem)), [arg]) if **elem == *arg => Type::Bool,
        ("int", None, [t]) if converts(t) => Type::Int,
        ("uint", None, [t]) if converts(t) => Type::Uint,
        ("double", None, [t]) if converts(t) => Type::Double,
        ("string", None, [t]) if converts(t) || *t == Type::Bool => Type::String,
        (
            "size" | "startsWith" | "endsWith" | "matches" | "contains" | "int" | "uint"
            | "double" | "string",
            ..,
        ) => {
            return Err(type_error(format!("invalid arguments to {name}()")));
        }
        _ => {
            return Err(CompileError::UnknownFunction {
                name: name.to_string(),
            });
        }
    };
    Ok(ty)
}
