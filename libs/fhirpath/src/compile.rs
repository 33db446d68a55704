//! AST → bound tree lowering
//!
//! One walk over the AST resolves every function against the invocation
//! table, validates arity, pre-builds literal values and captures
//! `Expr`/`AnyAtRoot`/`TypeSpecifier` arguments as unevaluated subtrees.
//! The bound tree is immutable and shared across evaluations.

use crate::ast::{
    AdditiveOperator, AstNode, EqualityOperator, InequalityOperator, MembershipOperator,
    MultiplicativeOperator, OrOperator, PolarityOperator, QualifiedIdentifier, TypeOperator,
};
use crate::error::{Error, Result};
use crate::ops::arithmetic::ArithOp;
use crate::parser;
use crate::registry::{self, FunctionSpec, ParamKind, UserFunctionSpec, UserInvocationTable};
use crate::value::Value;
use std::sync::Arc;

/// A compiled expression: source text plus its bound tree.
#[derive(Debug)]
pub struct CompiledExpression {
    source: String,
    pub(crate) root: BoundNode,
}

impl CompiledExpression {
    /// Parse and bind an expression.
    pub fn compile(source: &str, user_table: Option<&UserInvocationTable>) -> Result<Self> {
        let ast = parser::parse(source)?;
        let compiler = Compiler { user_table };
        let root = compiler.bind(&ast)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Possibly-qualified type name (`Quantity`, `System.String`, `FHIR.code`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TypeName {
    pub namespace: Option<String>,
    pub name: String,
}

impl TypeName {
    fn from_qualified(q: &QualifiedIdentifier) -> Result<Self> {
        match q.parts.as_slice() {
            [name] => Ok(TypeName {
                namespace: None,
                name: name.clone(),
            }),
            [ns, name] => Ok(TypeName {
                namespace: Some(ns.clone()),
                name: name.clone(),
            }),
            _ => Err(Error::Type(format!(
                "invalid type specifier '{}'",
                q.dotted()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BoolOpKind {
    And,
    Or,
    Xor,
    Implies,
}

/// Bound evaluator tree. Each variant knows how to produce a collection
/// from an input focus; the evaluator walks it.
#[derive(Debug)]
pub(crate) enum BoundNode {
    Literal(Value),
    Empty,
    This,
    Index,
    Total,
    EnvVar(Arc<str>),
    Member(Arc<str>),
    Invocation {
        target: Box<BoundNode>,
        invocation: Box<BoundNode>,
    },
    Function(BoundFunction),
    UserFunction {
        name: String,
        spec: UserFunctionSpec,
        args: Vec<BoundNode>,
    },
    Indexer {
        target: Box<BoundNode>,
        index: Box<BoundNode>,
    },
    Polarity {
        negative: bool,
        operand: Box<BoundNode>,
    },
    Arith {
        op: ArithOp,
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    Concat {
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    Union {
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    Equality {
        op: EqualityOperator,
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    Inequality {
        op: InequalityOperator,
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    Membership {
        op: MembershipOperator,
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    BoolOp {
        op: BoolOpKind,
        left: Box<BoundNode>,
        right: Box<BoundNode>,
    },
    TypeOp {
        op: TypeOperator,
        operand: Box<BoundNode>,
        type_name: TypeName,
    },
}

/// One bound standard-library call.
#[derive(Debug)]
pub(crate) struct BoundFunction {
    pub spec: &'static FunctionSpec,
    pub args: Vec<BoundArg>,
}

/// A bound argument, shaped by its declared parameter kind.
#[derive(Debug)]
pub(crate) enum BoundArg {
    /// Lazily evaluated per item.
    Expr(BoundNode),
    /// Lazily evaluated against the evaluation root.
    Root(BoundNode),
    /// Literal type-name capture.
    Type(TypeName),
    /// Eagerly evaluated and coerced at call time.
    Value { node: BoundNode, kind: ParamKind },
}

struct Compiler<'a> {
    user_table: Option<&'a UserInvocationTable>,
}

impl<'a> Compiler<'a> {
    fn bind(&self, ast: &AstNode) -> Result<BoundNode> {
        match ast {
            AstNode::TermExpression { term } => self.bind(term),
            AstNode::ParenthesizedTerm { expression } => self.bind(expression),
            AstNode::InvocationTerm { invocation } => self.bind(invocation),
            AstNode::LiteralTerm { literal } => self.bind(literal),

            AstNode::ExternalConstantTerm { constant } => {
                Ok(BoundNode::EnvVar(Arc::from(constant.as_str())))
            }

            AstNode::MemberInvocation { identifier } => {
                Ok(BoundNode::Member(Arc::from(identifier.as_str())))
            }
            AstNode::ThisInvocation => Ok(BoundNode::This),
            AstNode::IndexInvocation => Ok(BoundNode::Index),
            AstNode::TotalInvocation => Ok(BoundNode::Total),

            AstNode::FunctionInvocation {
                function_name,
                parameters,
            } => self.bind_function(function_name, parameters),

            AstNode::InvocationExpression {
                expression,
                invocation,
            } => Ok(BoundNode::Invocation {
                target: Box::new(self.bind(expression)?),
                invocation: Box::new(self.bind(invocation)?),
            }),

            AstNode::IndexerExpression { collection, index } => Ok(BoundNode::Indexer {
                target: Box::new(self.bind(collection)?),
                index: Box::new(self.bind(index)?),
            }),

            AstNode::PolarityExpression {
                operator,
                expression,
            } => Ok(BoundNode::Polarity {
                negative: *operator == PolarityOperator::Minus,
                operand: Box::new(self.bind(expression)?),
            }),

            AstNode::MultiplicativeExpression {
                left,
                operator,
                right,
            } => {
                let op = match operator {
                    MultiplicativeOperator::Multiply => ArithOp::Mul,
                    MultiplicativeOperator::Divide => ArithOp::Div,
                    MultiplicativeOperator::Div => ArithOp::DivInt,
                    MultiplicativeOperator::Mod => ArithOp::Mod,
                };
                Ok(BoundNode::Arith {
                    op,
                    left: Box::new(self.bind(left)?),
                    right: Box::new(self.bind(right)?),
                })
            }

            AstNode::AdditiveExpression {
                left,
                operator,
                right,
            } => {
                let left = Box::new(self.bind(left)?);
                let right = Box::new(self.bind(right)?);
                match operator {
                    AdditiveOperator::Plus => Ok(BoundNode::Arith {
                        op: ArithOp::Add,
                        left,
                        right,
                    }),
                    AdditiveOperator::Minus => Ok(BoundNode::Arith {
                        op: ArithOp::Sub,
                        left,
                        right,
                    }),
                    AdditiveOperator::Concat => Ok(BoundNode::Concat { left, right }),
                }
            }

            AstNode::UnionExpression { left, right } => Ok(BoundNode::Union {
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::EqualityExpression {
                left,
                operator,
                right,
            } => Ok(BoundNode::Equality {
                op: *operator,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::InequalityExpression {
                left,
                operator,
                right,
            } => Ok(BoundNode::Inequality {
                op: *operator,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::MembershipExpression {
                left,
                operator,
                right,
            } => Ok(BoundNode::Membership {
                op: *operator,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::AndExpression { left, right } => Ok(BoundNode::BoolOp {
                op: BoolOpKind::And,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::OrExpression {
                left,
                operator,
                right,
            } => Ok(BoundNode::BoolOp {
                op: match operator {
                    OrOperator::Or => BoolOpKind::Or,
                    OrOperator::Xor => BoolOpKind::Xor,
                },
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::ImpliesExpression { left, right } => Ok(BoundNode::BoolOp {
                op: BoolOpKind::Implies,
                left: Box::new(self.bind(left)?),
                right: Box::new(self.bind(right)?),
            }),

            AstNode::TypeExpression {
                expression,
                operator,
                type_specifier,
            } => Ok(BoundNode::TypeOp {
                op: *operator,
                operand: Box::new(self.bind(expression)?),
                type_name: TypeName::from_qualified(type_specifier)?,
            }),

            AstNode::NullLiteral => Ok(BoundNode::Empty),
            AstNode::BooleanLiteral(b) => Ok(BoundNode::Literal(Value::boolean(*b))),
            AstNode::StringLiteral(s) => Ok(BoundNode::Literal(Value::string(s.as_str()))),
            AstNode::IntegerLiteral(i) => Ok(BoundNode::Literal(Value::integer(*i))),
            AstNode::NumberLiteral(d) => Ok(BoundNode::Literal(Value::decimal(*d))),
            AstNode::LongNumberLiteral(i) => Ok(BoundNode::Literal(Value::long(*i))),
            AstNode::DateLiteral(date, precision) => Ok(BoundNode::Literal(
                Value::date_with_precision(*date, *precision),
            )),
            AstNode::DateTimeLiteral(dt, precision, offset) => Ok(BoundNode::Literal(
                Value::datetime_with_precision_and_offset(*dt, *precision, *offset),
            )),
            AstNode::TimeLiteral(time, precision) => Ok(BoundNode::Literal(
                Value::time_with_precision(*time, *precision),
            )),
            AstNode::QuantityLiteral { value, unit } => {
                Ok(BoundNode::Literal(Value::quantity(*value, unit.as_str())))
            }
        }
    }

    fn bind_function(&self, name: &str, parameters: &[AstNode]) -> Result<BoundNode> {
        // User functions shadow nothing: they extend the table.
        if let Some(table) = self.user_table {
            if let Some(user_spec) = table.get(name) {
                if !user_spec.arity.iter().any(|sig| sig.len() == parameters.len()) {
                    return Err(Error::Arity {
                        name: name.to_string(),
                        actual: parameters.len(),
                    });
                }
                let args = parameters
                    .iter()
                    .map(|p| self.bind(p))
                    .collect::<Result<Vec<_>>>()?;
                return Ok(BoundNode::UserFunction {
                    name: name.to_string(),
                    spec: user_spec.clone(),
                    args,
                });
            }
        }

        let spec =
            registry::lookup(name).ok_or_else(|| Error::UnknownFunction(name.to_string()))?;

        let signature = spec
            .arity
            .iter()
            .find(|sig| sig.len() == parameters.len())
            .ok_or_else(|| Error::Arity {
                name: name.to_string(),
                actual: parameters.len(),
            })?;

        let mut args = Vec::with_capacity(parameters.len());
        for (param, kind) in parameters.iter().zip(signature.iter()) {
            let arg = match kind {
                ParamKind::Expr => BoundArg::Expr(self.bind(param)?),
                ParamKind::AnyAtRoot => BoundArg::Root(self.bind(param)?),
                ParamKind::TypeSpecifier | ParamKind::Identifier => {
                    let q = qualified_name_of(param).ok_or_else(|| {
                        Error::Type(format!(
                            "{}() expects a type specifier argument",
                            spec.name
                        ))
                    })?;
                    BoundArg::Type(TypeName::from_qualified(&q)?)
                }
                value_kind => BoundArg::Value {
                    node: self.bind(param)?,
                    kind: *value_kind,
                },
            };
            args.push(arg);
        }

        Ok(BoundNode::Function(BoundFunction { spec, args }))
    }
}

/// Reinterpret an argument expression as a dotted name (`Quantity`,
/// `System.String`); used for type-specifier parameters.
fn qualified_name_of(ast: &AstNode) -> Option<QualifiedIdentifier> {
    fn walk(ast: &AstNode, parts: &mut Vec<String>) -> bool {
        match ast {
            AstNode::TermExpression { term } => walk(term, parts),
            AstNode::InvocationTerm { invocation } => walk(invocation, parts),
            AstNode::MemberInvocation { identifier } => {
                parts.push(identifier.clone());
                true
            }
            AstNode::InvocationExpression {
                expression,
                invocation,
            } => walk(expression, parts) && walk(invocation, parts),
            _ => false,
        }
    }

    let mut parts = Vec::new();
    if walk(ast, &mut parts) && !parts.is_empty() {
        Some(QualifiedIdentifier::new(parts))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> Result<CompiledExpression> {
        CompiledExpression::compile(source, None)
    }

    #[test]
    fn binds_navigation_chains() {
        let compiled = compile("Patient.name.given").unwrap();
        assert!(matches!(compiled.root, BoundNode::Invocation { .. }));
    }

    #[test]
    fn unknown_function_is_rejected_at_compile_time() {
        let err = compile("name.frobnicate()").unwrap_err();
        assert!(matches!(err, Error::UnknownFunction(_)));
    }

    #[test]
    fn arity_is_validated_at_compile_time() {
        let err = compile("name.substring()").unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
        let err = compile("name.where()").unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
        assert!(compile("name.substring(0, 2)").is_ok());
    }

    #[test]
    fn type_specifier_arguments_are_captured() {
        let compiled = compile("value.ofType(System.Quantity)").unwrap();
        fn find_function(node: &BoundNode) -> Option<&BoundFunction> {
            match node {
                BoundNode::Function(f) => Some(f),
                BoundNode::Invocation { target, invocation } => {
                    find_function(invocation).or_else(|| find_function(target))
                }
                _ => None,
            }
        }
        let function = find_function(&compiled.root).unwrap();
        match &function.args[0] {
            BoundArg::Type(t) => {
                assert_eq!(t.namespace.as_deref(), Some("System"));
                assert_eq!(t.name, "Quantity");
            }
            _ => panic!("expected a type capture"),
        }
    }

    #[test]
    fn non_type_argument_to_of_type_fails() {
        assert!(compile("value.ofType(1 + 1)").is_err());
    }

    #[test]
    fn user_functions_extend_the_table() {
        let mut table = UserInvocationTable::new();
        table.insert(
            "shout".into(),
            UserFunctionSpec {
                func: Arc::new(|input, _args| Ok(input.clone())),
                arity: vec![vec![]],
                nullable: false,
            },
        );
        assert!(CompiledExpression::compile("name.shout()", Some(&table)).is_ok());
        let err = CompiledExpression::compile("name.shout(1)", Some(&table)).unwrap_err();
        assert!(matches!(err, Error::Arity { .. }));
    }

    #[test]
    fn syntax_errors_propagate() {
        assert!(matches!(compile("name..x"), Err(Error::Syntax(_))));
    }
}
