//! Abstract syntax tree for FHIRPath expressions
//!
//! Variants are named after the grammar rule alternatives of the official
//! FHIRPath grammar (fhirpath.g4), so a bound tree or a serialized dump can
//! be related back to the grammar directly.

use crate::value::{DatePrecision, DateTimePrecision, TimePrecision};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};

/// AST node for a FHIRPath expression
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    // Expression rule alternatives
    /// term
    TermExpression { term: Box<AstNode> },

    /// expression '.' invocation
    InvocationExpression {
        expression: Box<AstNode>,
        invocation: Box<AstNode>,
    },

    /// expression '[' expression ']'
    IndexerExpression {
        collection: Box<AstNode>,
        index: Box<AstNode>,
    },

    /// ('+' | '-') expression
    PolarityExpression {
        operator: PolarityOperator,
        expression: Box<AstNode>,
    },

    /// expression ('*' | '/' | 'div' | 'mod') expression
    MultiplicativeExpression {
        left: Box<AstNode>,
        operator: MultiplicativeOperator,
        right: Box<AstNode>,
    },

    /// expression ('+' | '-' | '&') expression
    AdditiveExpression {
        left: Box<AstNode>,
        operator: AdditiveOperator,
        right: Box<AstNode>,
    },

    /// expression ('is' | 'as') typeSpecifier
    TypeExpression {
        expression: Box<AstNode>,
        operator: TypeOperator,
        type_specifier: QualifiedIdentifier,
    },

    /// expression '|' expression
    UnionExpression {
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    /// expression ('<=' | '<' | '>' | '>=') expression
    InequalityExpression {
        left: Box<AstNode>,
        operator: InequalityOperator,
        right: Box<AstNode>,
    },

    /// expression ('=' | '~' | '!=' | '!~') expression
    EqualityExpression {
        left: Box<AstNode>,
        operator: EqualityOperator,
        right: Box<AstNode>,
    },

    /// expression ('in' | 'contains') expression
    MembershipExpression {
        left: Box<AstNode>,
        operator: MembershipOperator,
        right: Box<AstNode>,
    },

    /// expression 'and' expression
    AndExpression {
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    /// expression ('or' | 'xor') expression
    OrExpression {
        left: Box<AstNode>,
        operator: OrOperator,
        right: Box<AstNode>,
    },

    /// expression 'implies' expression
    ImpliesExpression {
        left: Box<AstNode>,
        right: Box<AstNode>,
    },

    // Term rule alternatives
    /// invocation
    InvocationTerm { invocation: Box<AstNode> },

    /// literal
    LiteralTerm { literal: Box<AstNode> },

    /// '%' (identifier | STRING)
    ExternalConstantTerm { constant: String },

    /// '(' expression ')'
    ParenthesizedTerm { expression: Box<AstNode> },

    // Invocation rule alternatives
    /// identifier
    MemberInvocation { identifier: String },

    /// identifier '(' paramList? ')'
    FunctionInvocation {
        function_name: String,
        parameters: Vec<AstNode>,
    },

    /// '$this'
    ThisInvocation,

    /// '$index'
    IndexInvocation,

    /// '$total'
    TotalInvocation,

    // Literal rule alternatives
    /// '{' '}'
    NullLiteral,

    /// 'true' | 'false'
    BooleanLiteral(bool),

    /// STRING
    StringLiteral(String),

    /// NUMBER without a decimal point
    IntegerLiteral(i64),

    /// NUMBER with a decimal point
    NumberLiteral(Decimal),

    /// LONGNUMBER (`L` suffix)
    LongNumberLiteral(i64),

    /// DATE with its written precision
    DateLiteral(NaiveDate, DatePrecision),

    /// DATETIME; offset seconds east of UTC, `None` when unzoned
    DateTimeLiteral(DateTime<Utc>, DateTimePrecision, Option<i32>),

    /// TIME with its written precision
    TimeLiteral(NaiveTime, TimePrecision),

    /// NUMBER unit
    QuantityLiteral { value: Decimal, unit: String },
}

/// Dotted type or member name: identifier ('.' identifier)*
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedIdentifier {
    pub parts: Vec<String>,
}

impl QualifiedIdentifier {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    pub fn single(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
        }
    }

    pub fn dotted(&self) -> String {
        self.parts.join(".")
    }
}

/// '+' | '-'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarityOperator {
    Plus,
    Minus,
}

/// '*' | '/' | 'div' | 'mod'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultiplicativeOperator {
    Multiply,
    Divide,
    Div,
    Mod,
}

/// '+' | '-' | '&'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdditiveOperator {
    Plus,
    Minus,
    Concat,
}

/// 'is' | 'as'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperator {
    Is,
    As,
}

/// '<=' | '<' | '>' | '>='
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InequalityOperator {
    LessThanOrEqual,
    LessThan,
    GreaterThan,
    GreaterThanOrEqual,
}

/// '=' | '~' | '!=' | '!~'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityOperator {
    Equal,
    Equivalent,
    NotEqual,
    NotEquivalent,
}

/// 'in' | 'contains'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipOperator {
    In,
    Contains,
}

/// 'or' | 'xor'
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrOperator {
    Or,
    Xor,
}

impl InequalityOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            InequalityOperator::LessThanOrEqual => "<=",
            InequalityOperator::LessThan => "<",
            InequalityOperator::GreaterThan => ">",
            InequalityOperator::GreaterThanOrEqual => ">=",
        }
    }
}

impl AstNode {
    /// The grammar-alternative name of this node.
    pub fn rule_name(&self) -> &'static str {
        match self {
            AstNode::TermExpression { .. } => "TermExpression",
            AstNode::InvocationExpression { .. } => "InvocationExpression",
            AstNode::IndexerExpression { .. } => "IndexerExpression",
            AstNode::PolarityExpression { .. } => "PolarityExpression",
            AstNode::MultiplicativeExpression { .. } => "MultiplicativeExpression",
            AstNode::AdditiveExpression { .. } => "AdditiveExpression",
            AstNode::TypeExpression { .. } => "TypeExpression",
            AstNode::UnionExpression { .. } => "UnionExpression",
            AstNode::InequalityExpression { .. } => "InequalityExpression",
            AstNode::EqualityExpression { .. } => "EqualityExpression",
            AstNode::MembershipExpression { .. } => "MembershipExpression",
            AstNode::AndExpression { .. } => "AndExpression",
            AstNode::OrExpression { .. } => "OrExpression",
            AstNode::ImpliesExpression { .. } => "ImpliesExpression",
            AstNode::InvocationTerm { .. } => "InvocationTerm",
            AstNode::LiteralTerm { .. } => "LiteralTerm",
            AstNode::ExternalConstantTerm { .. } => "ExternalConstantTerm",
            AstNode::ParenthesizedTerm { .. } => "ParenthesizedTerm",
            AstNode::MemberInvocation { .. } => "MemberInvocation",
            AstNode::FunctionInvocation { .. } => "FunctionInvocation",
            AstNode::ThisInvocation => "ThisInvocation",
            AstNode::IndexInvocation => "IndexInvocation",
            AstNode::TotalInvocation => "TotalInvocation",
            AstNode::NullLiteral => "NullLiteral",
            AstNode::BooleanLiteral(_) => "BooleanLiteral",
            AstNode::StringLiteral(_) => "StringLiteral",
            AstNode::IntegerLiteral(_) => "IntegerLiteral",
            AstNode::NumberLiteral(_) => "NumberLiteral",
            AstNode::LongNumberLiteral(_) => "LongNumberLiteral",
            AstNode::DateLiteral(..) => "DateLiteral",
            AstNode::DateTimeLiteral(..) => "DateTimeLiteral",
            AstNode::TimeLiteral(..) => "TimeLiteral",
            AstNode::QuantityLiteral { .. } => "QuantityLiteral",
        }
    }

    /// Serialize as the `{ type, text?, children? }` dump used by the CLI.
    pub fn to_json(&self) -> JsonValue {
        fn node(name: &str, text: Option<String>, children: Vec<JsonValue>) -> JsonValue {
            let mut obj = serde_json::Map::new();
            obj.insert("type".into(), json!(name));
            if let Some(text) = text {
                obj.insert("text".into(), json!(text));
            }
            if !children.is_empty() {
                obj.insert("children".into(), JsonValue::Array(children));
            }
            JsonValue::Object(obj)
        }

        let name = self.rule_name();
        match self {
            AstNode::TermExpression { term } => node(name, None, vec![term.to_json()]),
            AstNode::InvocationExpression {
                expression,
                invocation,
            } => node(name, None, vec![expression.to_json(), invocation.to_json()]),
            AstNode::IndexerExpression { collection, index } => {
                node(name, None, vec![collection.to_json(), index.to_json()])
            }
            AstNode::PolarityExpression {
                operator,
                expression,
            } => {
                let sym = match operator {
                    PolarityOperator::Plus => "+",
                    PolarityOperator::Minus => "-",
                };
                node(name, Some(sym.into()), vec![expression.to_json()])
            }
            AstNode::MultiplicativeExpression {
                left,
                operator,
                right,
            } => {
                let sym = match operator {
                    MultiplicativeOperator::Multiply => "*",
                    MultiplicativeOperator::Divide => "/",
                    MultiplicativeOperator::Div => "div",
                    MultiplicativeOperator::Mod => "mod",
                };
                node(name, Some(sym.into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::AdditiveExpression {
                left,
                operator,
                right,
            } => {
                let sym = match operator {
                    AdditiveOperator::Plus => "+",
                    AdditiveOperator::Minus => "-",
                    AdditiveOperator::Concat => "&",
                };
                node(name, Some(sym.into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::TypeExpression {
                expression,
                operator,
                type_specifier,
            } => {
                let sym = match operator {
                    TypeOperator::Is => "is",
                    TypeOperator::As => "as",
                };
                node(
                    name,
                    Some(format!("{} {}", sym, type_specifier.dotted())),
                    vec![expression.to_json()],
                )
            }
            AstNode::UnionExpression { left, right } => {
                node(name, Some("|".into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::InequalityExpression {
                left,
                operator,
                right,
            } => node(
                name,
                Some(operator.symbol().into()),
                vec![left.to_json(), right.to_json()],
            ),
            AstNode::EqualityExpression {
                left,
                operator,
                right,
            } => {
                let sym = match operator {
                    EqualityOperator::Equal => "=",
                    EqualityOperator::Equivalent => "~",
                    EqualityOperator::NotEqual => "!=",
                    EqualityOperator::NotEquivalent => "!~",
                };
                node(name, Some(sym.into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::MembershipExpression {
                left,
                operator,
                right,
            } => {
                let sym = match operator {
                    MembershipOperator::In => "in",
                    MembershipOperator::Contains => "contains",
                };
                node(name, Some(sym.into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::AndExpression { left, right } => {
                node(name, Some("and".into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::OrExpression {
                left,
                operator,
                right,
            } => {
                let sym = match operator {
                    OrOperator::Or => "or",
                    OrOperator::Xor => "xor",
                };
                node(name, Some(sym.into()), vec![left.to_json(), right.to_json()])
            }
            AstNode::ImpliesExpression { left, right } => node(
                name,
                Some("implies".into()),
                vec![left.to_json(), right.to_json()],
            ),
            AstNode::InvocationTerm { invocation } => node(name, None, vec![invocation.to_json()]),
            AstNode::LiteralTerm { literal } => node(name, None, vec![literal.to_json()]),
            AstNode::ExternalConstantTerm { constant } => {
                node(name, Some(format!("%{}", constant)), vec![])
            }
            AstNode::ParenthesizedTerm { expression } => node(name, None, vec![expression.to_json()]),
            AstNode::MemberInvocation { identifier } => node(name, Some(identifier.clone()), vec![]),
            AstNode::FunctionInvocation {
                function_name,
                parameters,
            } => node(
                name,
                Some(function_name.clone()),
                parameters.iter().map(|p| p.to_json()).collect(),
            ),
            AstNode::ThisInvocation => node(name, Some("$this".into()), vec![]),
            AstNode::IndexInvocation => node(name, Some("$index".into()), vec![]),
            AstNode::TotalInvocation => node(name, Some("$total".into()), vec![]),
            AstNode::NullLiteral => node(name, Some("{}".into()), vec![]),
            AstNode::BooleanLiteral(b) => node(name, Some(b.to_string()), vec![]),
            AstNode::StringLiteral(s) => node(name, Some(s.clone()), vec![]),
            AstNode::IntegerLiteral(i) => node(name, Some(i.to_string()), vec![]),
            AstNode::NumberLiteral(d) => node(name, Some(d.to_string()), vec![]),
            AstNode::LongNumberLiteral(i) => node(name, Some(format!("{}L", i)), vec![]),
            AstNode::DateLiteral(date, precision) => {
                node(name, Some(crate::value::format_date(date, *precision)), vec![])
            }
            AstNode::DateTimeLiteral(dt, precision, offset) => node(
                name,
                Some(crate::value::format_datetime(dt, *precision, *offset)),
                vec![],
            ),
            AstNode::TimeLiteral(t, precision) => {
                node(name, Some(crate::value::format_time(t, *precision)), vec![])
            }
            AstNode::QuantityLiteral { value, unit } => {
                node(name, Some(format!("{} '{}'", value, unit)), vec![])
            }
        }
    }
}
