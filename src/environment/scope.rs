use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::SemanticError;

use super::{Function, Variable};

/// A node in the parent-linked scope tree. `Scope` is a cheap handle:
/// cloning shares the node, so a method can capture its defining scope by
/// reference while block execution hands out fresh children.
#[derive(Debug, Clone)]
pub struct Scope {
    inner: Rc<RefCell<ScopeInner>>,
}

#[derive(Debug)]
struct ScopeInner {
    parent: Option<Scope>,
    variables: HashMap<String, Variable>,
    functions: HashMap<(String, usize), Function>,
}

impl Scope {
    pub fn root() -> Self {
        Self::new(None)
    }

    pub fn child(&self) -> Self {
        Self::new(Some(self.clone()))
    }

    fn new(parent: Option<Scope>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ScopeInner {
                parent,
                variables: HashMap::new(),
                functions: HashMap::new(),
            })),
        }
    }

    /// Defines a variable in this scope. A name may shadow a definition in a
    /// parent scope but not repeat one in this scope.
    pub fn define_variable(&self, variable: Variable) -> Result<Variable, SemanticError> {
        let mut inner = self.inner.borrow_mut();
        let name = variable.name().to_string();
        if inner.variables.contains_key(&name) {
            return Err(SemanticError::Redefinition(name));
        }
        inner.variables.insert(name, variable.clone());
        Ok(variable)
    }

    pub fn define_function(&self, function: Function) -> Result<Function, SemanticError> {
        let mut inner = self.inner.borrow_mut();
        let key = (function.name().to_string(), function.arity());
        if inner.functions.contains_key(&key) {
            return Err(SemanticError::Redefinition(key.0));
        }
        inner.functions.insert(key, function.clone());
        Ok(function)
    }

    /// Resolves a variable here or in the closest ancestor defining it.
    pub fn lookup_variable(&self, name: &str) -> Result<Variable, SemanticError> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let inner = scope.inner.borrow();
            if let Some(variable) = inner.variables.get(name) {
                return Ok(variable.clone());
            }
            current = inner.parent.clone();
        }
        Err(SemanticError::UndefinedVariable(name.to_string()))
    }

    pub fn lookup_function(&self, name: &str, arity: usize) -> Result<Function, SemanticError> {
        let key = (name.to_string(), arity);
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            let inner = scope.inner.borrow();
            if let Some(function) = inner.functions.get(&key) {
                return Ok(function.clone());
            }
            current = inner.parent.clone();
        }
        Err(SemanticError::UndefinedFunction {
            name: key.0,
            arity,
        })
    }
}

/// Handle identity: two handles are equal when they name the same node.
impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
