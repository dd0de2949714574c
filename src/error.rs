use thiserror::Error;

/// Failure from the lexer or parser, positioned at a byte index into the
/// source text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} (index {index})")]
pub struct ParseError {
    pub message: String,
    pub index: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, index: usize) -> Self {
        Self {
            message: message.into(),
            index,
        }
    }
}

/// Failure from the analyzer, interpreter or generator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SemanticError {
    #[error("Unknown type '{0}'")]
    UnknownType(String),
    #[error("Undefined variable '{0}'")]
    UndefinedVariable(String),
    #[error("Undefined function '{name}/{arity}'")]
    UndefinedFunction { name: String, arity: usize },
    #[error("Type '{type_name}' has no field '{field}'")]
    UndefinedField { type_name: String, field: String },
    #[error("Type '{type_name}' has no method '{method}/{arity}'")]
    UndefinedMethod {
        type_name: String,
        method: String,
        arity: usize,
    },
    #[error("'{0}' is already defined in this scope")]
    Redefinition(String),
    #[error("Expected type {expected}, received {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("Function '{name}' expects {expected} arguments, received {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("A main/0 function with return type Integer is required")]
    MissingMain,
    #[error("Integer literal out of 32-bit range")]
    IntegerOutOfRange,
    #[error("Decimal literal out of 64-bit float range")]
    DecimalOutOfRange,
    #[error("Only a function call may be used as a statement")]
    InvalidStatementExpression,
    #[error("Assignment target must be an access expression")]
    InvalidAssignmentTarget,
    #[error("Assignment to constant '{0}'")]
    AssignmentToConstant(String),
    #[error("Declaration of '{0}' has neither a type nor a value")]
    MissingDeclarationType(String),
    #[error("Constant '{0}' requires a value")]
    UninitializedConstant(String),
    #[error("The {0} body must not be empty")]
    EmptyBody(&'static str),
    #[error("Grouped expression must contain a binary expression")]
    InvalidGroup,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Invariant violated: {message}")]
    Invariant { message: &'static str },
}
