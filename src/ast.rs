//! Syntax tree shared by the analyzer, interpreter and generator.
//!
//! The parser builds these nodes once; the analyzer then fills in the
//! resolution slots (`ty`, `variable`, `function`) in place, after which the
//! tree is treated as read-only by both sinks.

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::environment::{Function, Type, Variable};

#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub type_name: String,
    pub constant: bool,
    pub value: Option<Expression>,
    pub variable: Option<Variable>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub name: String,
    pub parameters: Vec<String>,
    pub parameter_type_names: Vec<String>,
    pub return_type_name: Option<String>,
    pub statements: Vec<Statement>,
    pub function: Option<Function>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Expression(Expression),
    Declaration {
        name: String,
        type_name: Option<String>,
        value: Option<Expression>,
        variable: Option<Variable>,
    },
    Assignment {
        receiver: Expression,
        value: Expression,
    },
    If {
        condition: Expression,
        then_statements: Vec<Statement>,
        else_statements: Vec<Statement>,
    },
    For {
        initializer: Option<(String, Expression)>,
        condition: Expression,
        increment: Option<(String, Expression)>,
        statements: Vec<Statement>,
    },
    While {
        condition: Expression,
        statements: Vec<Statement>,
    },
    Return {
        value: Expression,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal {
        value: Literal,
        ty: Option<Type>,
    },
    Group {
        expression: Box<Expression>,
        ty: Option<Type>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
        ty: Option<Type>,
    },
    Access {
        receiver: Option<Box<Expression>>,
        name: String,
        variable: Option<Variable>,
    },
    Function {
        receiver: Option<Box<Expression>>,
        name: String,
        arguments: Vec<Expression>,
        function: Option<Function>,
    },
}

impl Expression {
    pub fn literal(value: Literal) -> Self {
        Expression::Literal { value, ty: None }
    }

    /// The resolved type of this expression, filled by the analyzer.
    /// `Access` and `Function` expressions derive it from their binding.
    pub fn ty(&self) -> Option<Type> {
        match self {
            Expression::Literal { ty, .. }
            | Expression::Group { ty, .. }
            | Expression::Binary { ty, .. } => ty.clone(),
            Expression::Access { variable, .. } => {
                variable.as_ref().map(|variable| variable.ty().clone())
            }
            Expression::Function { function, .. } => {
                function.as_ref().map(|function| function.return_type().clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Character(char),
    String(String),
    Integer(BigInt),
    Decimal(BigDecimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let op = match symbol {
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "<" => BinaryOp::Less,
            "<=" => BinaryOp::LessEqual,
            ">" => BinaryOp::Greater,
            ">=" => BinaryOp::GreaterEqual,
            "==" => BinaryOp::Equal,
            "!=" => BinaryOp::NotEqual,
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Subtract,
            "*" => BinaryOp::Multiply,
            "/" => BinaryOp::Divide,
            _ => return None,
        };
        Some(op)
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
        }
    }
}
