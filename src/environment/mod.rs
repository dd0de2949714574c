//! Types, variables, functions and the scope tree.
//!
//! Everything here is a cheap `Rc` handle. The embedder builds an
//! [`Environment`] (the eight builtin types plus a root scope), registers
//! host types and functions through it, and hands it to the analyzer and
//! interpreter. Type equality is nominal, by name.

mod scope;
mod value;

pub use scope::Scope;
pub use value::Value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::error::SemanticError;

const BUILTIN_TYPES: [&str; 8] = [
    "Any",
    "Nil",
    "Comparable",
    "Boolean",
    "Integer",
    "Decimal",
    "Character",
    "String",
];

#[derive(Clone)]
pub struct Type {
    inner: Rc<TypeInner>,
}

struct TypeInner {
    name: String,
    jvm_name: String,
    fields: RefCell<HashMap<String, Variable>>,
    methods: RefCell<HashMap<(String, usize), Function>>,
}

impl Type {
    pub fn new(name: impl Into<String>, jvm_name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(TypeInner {
                name: name.into(),
                jvm_name: jvm_name.into(),
                fields: RefCell::new(HashMap::new()),
                methods: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn jvm_name(&self) -> &str {
        &self.inner.jvm_name
    }

    pub fn define_field(&self, variable: Variable) -> Result<Variable, SemanticError> {
        let mut fields = self.inner.fields.borrow_mut();
        let name = variable.name().to_string();
        if fields.contains_key(&name) {
            return Err(SemanticError::Redefinition(name));
        }
        fields.insert(name, variable.clone());
        Ok(variable)
    }

    pub fn define_method(&self, function: Function) -> Result<Function, SemanticError> {
        let mut methods = self.inner.methods.borrow_mut();
        let key = (function.name().to_string(), function.arity());
        if methods.contains_key(&key) {
            return Err(SemanticError::Redefinition(key.0));
        }
        methods.insert(key, function.clone());
        Ok(function)
    }

    pub fn field(&self, name: &str) -> Result<Variable, SemanticError> {
        self.inner.fields.borrow().get(name).cloned().ok_or_else(|| {
            SemanticError::UndefinedField {
                type_name: self.inner.name.clone(),
                field: name.to_string(),
            }
        })
    }

    /// Looks up a method by name and arity. Methods count their receiver as
    /// parameter 0, so the arity includes it.
    pub fn method(&self, name: &str, arity: usize) -> Result<Function, SemanticError> {
        self.inner
            .methods
            .borrow()
            .get(&(name.to_string(), arity))
            .cloned()
            .ok_or_else(|| SemanticError::UndefinedMethod {
                type_name: self.inner.name.clone(),
                method: name.to_string(),
                arity,
            })
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.inner.name)
    }
}

#[derive(Debug, Clone)]
pub struct Variable {
    inner: Rc<VariableInner>,
}

#[derive(Debug)]
struct VariableInner {
    name: String,
    jvm_name: String,
    ty: Type,
    constant: bool,
    value: RefCell<Value>,
}

impl Variable {
    pub fn new(
        name: impl Into<String>,
        jvm_name: impl Into<String>,
        ty: Type,
        constant: bool,
        value: Value,
    ) -> Self {
        Self {
            inner: Rc::new(VariableInner {
                name: name.into(),
                jvm_name: jvm_name.into(),
                ty,
                constant,
                value: RefCell::new(value),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn jvm_name(&self) -> &str {
        &self.inner.jvm_name
    }

    pub fn ty(&self) -> &Type {
        &self.inner.ty
    }

    pub fn constant(&self) -> bool {
        self.inner.constant
    }

    pub fn value(&self) -> Value {
        self.inner.value.borrow().clone()
    }

    pub fn set_value(&self, value: Value) {
        *self.inner.value.borrow_mut() = value;
    }
}

/// Runtime state (the current value) is excluded: two variables are equal
/// when their declarations agree.
impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
            && self.inner.jvm_name == other.inner.jvm_name
            && self.inner.ty == other.inner.ty
            && self.inner.constant == other.inner.constant
    }
}

pub type Implementation = Rc<dyn Fn(Vec<Value>) -> Result<Value, SemanticError>>;

#[derive(Clone)]
pub struct Function {
    inner: Rc<FunctionInner>,
}

struct FunctionInner {
    name: String,
    jvm_name: String,
    parameter_types: Vec<Type>,
    return_type: Type,
    implementation: Implementation,
}

impl Function {
    pub fn new(
        name: impl Into<String>,
        jvm_name: impl Into<String>,
        parameter_types: Vec<Type>,
        return_type: Type,
        implementation: impl Fn(Vec<Value>) -> Result<Value, SemanticError> + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(FunctionInner {
                name: name.into(),
                jvm_name: jvm_name.into(),
                parameter_types,
                return_type,
                implementation: Rc::new(implementation),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn jvm_name(&self) -> &str {
        &self.inner.jvm_name
    }

    pub fn parameter_types(&self) -> &[Type] {
        &self.inner.parameter_types
    }

    pub fn return_type(&self) -> &Type {
        &self.inner.return_type
    }

    pub fn arity(&self) -> usize {
        self.inner.parameter_types.len()
    }

    pub fn invoke(&self, arguments: Vec<Value>) -> Result<Value, SemanticError> {
        if arguments.len() != self.arity() {
            return Err(SemanticError::ArityMismatch {
                name: self.inner.name.clone(),
                expected: self.arity(),
                found: arguments.len(),
            });
        }
        (self.inner.implementation)(arguments)
    }
}

/// The implementation closure is opaque; equality covers the signature.
impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        self.inner.name == other.inner.name
            && self.inner.jvm_name == other.inner.jvm_name
            && self.inner.parameter_types == other.inner.parameter_types
            && self.inner.return_type == other.inner.return_type
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({}/{})", self.inner.name, self.arity())
    }
}

/// The embedder's builder handle: the type registry plus the root scope that
/// host bindings are defined into.
#[derive(Debug, Clone)]
pub struct Environment {
    inner: Rc<EnvironmentInner>,
}

#[derive(Debug)]
struct EnvironmentInner {
    types: RefCell<HashMap<String, Type>>,
    scope: Scope,
}

impl Environment {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for name in BUILTIN_TYPES {
            types.insert(name.to_string(), Type::new(name, name));
        }
        Self {
            inner: Rc::new(EnvironmentInner {
                types: RefCell::new(types),
                scope: Scope::root(),
            }),
        }
    }

    /// An environment with the standard host bindings: `print` (one `Any`
    /// argument, returns `Nil`, emitted as `System.out.println`) writing the
    /// rendered value to stdout.
    pub fn standard() -> Result<Self, SemanticError> {
        let environment = Self::new();
        let any = environment.get_type("Any")?;
        let nil = environment.get_type("Nil")?;
        environment.define_function("print", "System.out.println", vec![any], nil, |arguments| {
            for argument in &arguments {
                println!("{argument}");
            }
            Ok(Value::Nil)
        })?;
        Ok(environment)
    }

    pub fn register_type(&self, ty: Type) -> Result<Type, SemanticError> {
        let mut types = self.inner.types.borrow_mut();
        let name = ty.name().to_string();
        if types.contains_key(&name) {
            return Err(SemanticError::Redefinition(name));
        }
        types.insert(name, ty.clone());
        Ok(ty)
    }

    pub fn get_type(&self, name: &str) -> Result<Type, SemanticError> {
        self.inner
            .types
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| SemanticError::UnknownType(name.to_string()))
    }

    /// The concrete type of a runtime value, derived from its payload kind.
    pub fn type_of(&self, value: &Value) -> Result<Type, SemanticError> {
        self.get_type(value.type_name())
    }

    /// Defines a host function in the root scope.
    pub fn define_function(
        &self,
        name: impl Into<String>,
        jvm_name: impl Into<String>,
        parameter_types: Vec<Type>,
        return_type: Type,
        implementation: impl Fn(Vec<Value>) -> Result<Value, SemanticError> + 'static,
    ) -> Result<Function, SemanticError> {
        self.inner.scope.define_function(Function::new(
            name,
            jvm_name,
            parameter_types,
            return_type,
            implementation,
        ))
    }

    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

/// The assignability relation: `Any` accepts anything, `Comparable` accepts
/// the four ordered primitive types, and everything else requires nominal
/// equality.
pub fn require_assignable(target: &Type, actual: &Type) -> Result<(), SemanticError> {
    let assignable = match target.name() {
        "Any" => true,
        "Comparable" => {
            matches!(actual.name(), "Integer" | "Decimal" | "Character" | "String")
                || target == actual
        }
        _ => target == actual,
    };
    if assignable {
        Ok(())
    } else {
        Err(SemanticError::TypeMismatch {
            expected: target.name().to_string(),
            found: actual.name().to_string(),
        })
    }
}
