use std::mem;

use num_traits::ToPrimitive;

use crate::ast::{BinaryOp, Expression, Field, Literal, Method, Source, Statement};
use crate::environment::{
    Environment, Function, Scope, Type, Value, Variable, require_assignable,
};
use crate::error::SemanticError;

/// Resolves names and types across a parsed tree, rejecting ill-typed
/// programs. Annotations are written into the tree in place: every
/// expression receives a type and every field, method, declaration, access
/// and call receives its binding.
pub struct Analyzer {
    environment: Environment,
    scope: Scope,
}

impl Analyzer {
    pub fn new(environment: &Environment) -> Self {
        Self {
            environment: environment.clone(),
            scope: environment.scope().child(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Visits fields, then methods, then requires `main/0` returning
    /// `Integer`.
    pub fn analyze(&mut self, source: &mut Source) -> Result<(), SemanticError> {
        for field in &mut source.fields {
            self.visit_field(field)?;
        }
        for method in &mut source.methods {
            self.visit_method(method)?;
        }
        let main = self
            .scope
            .lookup_function("main", 0)
            .map_err(|_| SemanticError::MissingMain)?;
        if main.return_type().name() != "Integer" {
            return Err(SemanticError::MissingMain);
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &mut Field) -> Result<(), SemanticError> {
        let ty = self.environment.get_type(&field.type_name)?;
        match &mut field.value {
            // The value is visited before the variable is defined, so a
            // field cannot reference itself in its initializer.
            Some(value) => {
                self.visit_expression(value)?;
                require_assignable(&ty, &resolved_type(value)?)?;
            }
            None if field.constant => {
                return Err(SemanticError::UninitializedConstant(field.name.clone()));
            }
            None => {}
        }
        let variable = self.scope.define_variable(Variable::new(
            &field.name,
            &field.name,
            ty,
            field.constant,
            Value::Nil,
        ))?;
        field.variable = Some(variable);
        Ok(())
    }

    fn visit_method(&mut self, method: &mut Method) -> Result<(), SemanticError> {
        let mut parameter_types = Vec::with_capacity(method.parameter_type_names.len());
        for name in &method.parameter_type_names {
            parameter_types.push(self.environment.get_type(name)?);
        }
        let return_type = match &method.return_type_name {
            Some(name) => self.environment.get_type(name)?,
            None => self.environment.get_type("Nil")?,
        };

        // Defined before the body is visited so the method can recurse.
        let function = self.scope.define_function(Function::new(
            &method.name,
            &method.name,
            parameter_types.clone(),
            return_type.clone(),
            |_| Ok(Value::Nil),
        ))?;
        method.function = Some(function);

        self.scoped(|analyzer| {
            for (parameter, ty) in method.parameters.iter().zip(&parameter_types) {
                analyzer.scope.define_variable(Variable::new(
                    parameter,
                    parameter,
                    ty.clone(),
                    false,
                    Value::Nil,
                ))?;
            }
            // Return statements resolve the enclosing method's return type
            // through this binding.
            analyzer.scope.define_variable(Variable::new(
                "returnType",
                "returnType",
                return_type.clone(),
                false,
                Value::Nil,
            ))?;
            for statement in &mut method.statements {
                analyzer.visit_statement(statement)?;
            }
            Ok(())
        })
    }

    fn visit_statement(&mut self, statement: &mut Statement) -> Result<(), SemanticError> {
        match statement {
            Statement::Expression(expression) => {
                if !matches!(expression, Expression::Function { .. }) {
                    return Err(SemanticError::InvalidStatementExpression);
                }
                self.visit_expression(expression)
            }
            Statement::Declaration {
                name,
                type_name,
                value,
                variable,
            } => {
                if let Some(value) = value.as_mut() {
                    self.visit_expression(value)?;
                }
                let ty = match (type_name.as_deref(), value.as_ref()) {
                    (Some(type_name), Some(value)) => {
                        let ty = self.environment.get_type(type_name)?;
                        require_assignable(&ty, &resolved_type(value)?)?;
                        ty
                    }
                    (Some(type_name), None) => self.environment.get_type(type_name)?,
                    (None, Some(value)) => resolved_type(value)?,
                    (None, None) => {
                        return Err(SemanticError::MissingDeclarationType(name.clone()));
                    }
                };
                let defined = self
                    .scope
                    .define_variable(Variable::new(name.as_str(), name.as_str(), ty, false, Value::Nil))?;
                *variable = Some(defined);
                Ok(())
            }
            Statement::Assignment { receiver, value } => {
                if !matches!(receiver, Expression::Access { .. }) {
                    return Err(SemanticError::InvalidAssignmentTarget);
                }
                self.visit_expression(receiver)?;
                self.visit_expression(value)?;
                require_assignable(&resolved_type(receiver)?, &resolved_type(value)?)
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                self.visit_expression(condition)?;
                self.require_boolean(condition)?;
                if then_statements.is_empty() {
                    return Err(SemanticError::EmptyBody("if"));
                }
                self.scoped(|analyzer| {
                    for statement in then_statements.iter_mut() {
                        analyzer.visit_statement(statement)?;
                    }
                    Ok(())
                })?;
                self.scoped(|analyzer| {
                    for statement in else_statements.iter_mut() {
                        analyzer.visit_statement(statement)?;
                    }
                    Ok(())
                })
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                if statements.is_empty() {
                    return Err(SemanticError::EmptyBody("for"));
                }
                self.scoped(|analyzer| {
                    if let Some((name, expression)) = initializer.as_mut() {
                        analyzer.visit_expression(expression)?;
                        let ty = resolved_type(expression)?;
                        analyzer.scope.define_variable(Variable::new(
                            name.as_str(),
                            name.as_str(),
                            ty,
                            false,
                            Value::Nil,
                        ))?;
                    }
                    analyzer.visit_expression(condition)?;
                    analyzer.require_boolean(condition)?;
                    if let Some((name, expression)) = increment.as_mut() {
                        analyzer.visit_expression(expression)?;
                        let variable = analyzer.scope.lookup_variable(name)?;
                        let ty = resolved_type(expression)?;
                        if variable.ty() != &ty {
                            return Err(SemanticError::TypeMismatch {
                                expected: variable.ty().name().to_string(),
                                found: ty.name().to_string(),
                            });
                        }
                    }
                    analyzer.scoped(|analyzer| {
                        for statement in statements.iter_mut() {
                            analyzer.visit_statement(statement)?;
                        }
                        Ok(())
                    })
                })
            }
            Statement::While {
                condition,
                statements,
            } => {
                self.visit_expression(condition)?;
                self.require_boolean(condition)?;
                self.scoped(|analyzer| {
                    for statement in statements.iter_mut() {
                        analyzer.visit_statement(statement)?;
                    }
                    Ok(())
                })
            }
            Statement::Return { value } => {
                self.visit_expression(value)?;
                let return_type = self.scope.lookup_variable("returnType")?;
                require_assignable(return_type.ty(), &resolved_type(value)?)
            }
        }
    }

    fn visit_expression(&mut self, expression: &mut Expression) -> Result<(), SemanticError> {
        match expression {
            Expression::Literal { value, ty } => {
                *ty = Some(self.literal_type(value)?);
                Ok(())
            }
            Expression::Group { expression, ty } => {
                if !matches!(expression.as_ref(), Expression::Binary { .. }) {
                    return Err(SemanticError::InvalidGroup);
                }
                self.visit_expression(expression)?;
                *ty = Some(resolved_type(expression)?);
                Ok(())
            }
            Expression::Binary {
                op,
                left,
                right,
                ty,
            } => {
                self.visit_expression(left)?;
                self.visit_expression(right)?;
                *ty = Some(self.binary_type(*op, &resolved_type(left)?, &resolved_type(right)?)?);
                Ok(())
            }
            Expression::Access {
                receiver,
                name,
                variable,
            } => {
                let resolved = match receiver {
                    Some(receiver) => {
                        self.visit_expression(receiver)?;
                        resolved_type(receiver)?.field(name)?
                    }
                    None => self.scope.lookup_variable(name)?,
                };
                *variable = Some(resolved);
                Ok(())
            }
            Expression::Function {
                receiver,
                name,
                arguments,
                function,
            } => {
                let mut argument_types = Vec::with_capacity(arguments.len());
                for argument in arguments.iter_mut() {
                    self.visit_expression(argument)?;
                    argument_types.push(resolved_type(argument)?);
                }
                let resolved = match receiver {
                    Some(receiver) => {
                        self.visit_expression(receiver)?;
                        let receiver_type = resolved_type(receiver)?;
                        let method = receiver_type.method(name, argument_types.len() + 1)?;
                        // Parameter 0 is the receiver; arguments line up
                        // against parameters 1..n.
                        let parameter_types = method.parameter_types();
                        if let Some(first) = parameter_types.first() {
                            require_assignable(first, &receiver_type)?;
                        }
                        for (parameter, argument) in
                            parameter_types.iter().skip(1).zip(&argument_types)
                        {
                            require_assignable(parameter, argument)?;
                        }
                        method
                    }
                    None => {
                        let resolved = self.scope.lookup_function(name, argument_types.len())?;
                        for (parameter, argument) in
                            resolved.parameter_types().iter().zip(&argument_types)
                        {
                            require_assignable(parameter, argument)?;
                        }
                        resolved
                    }
                };
                *function = Some(resolved);
                Ok(())
            }
        }
    }

    fn binary_type(
        &self,
        op: BinaryOp,
        left: &Type,
        right: &Type,
    ) -> Result<Type, SemanticError> {
        match op {
            BinaryOp::And | BinaryOp::Or => {
                let boolean = self.environment.get_type("Boolean")?;
                require_assignable(&boolean, left)?;
                require_assignable(&boolean, right)?;
                Ok(boolean)
            }
            BinaryOp::Less
            | BinaryOp::LessEqual
            | BinaryOp::Greater
            | BinaryOp::GreaterEqual
            | BinaryOp::Equal
            | BinaryOp::NotEqual => {
                let comparable = self.environment.get_type("Comparable")?;
                require_assignable(&comparable, left)?;
                require_assignable(&comparable, right)?;
                if left != right {
                    return Err(SemanticError::TypeMismatch {
                        expected: left.name().to_string(),
                        found: right.name().to_string(),
                    });
                }
                self.environment.get_type("Boolean")
            }
            BinaryOp::Add => {
                if left.name() == "String" || right.name() == "String" {
                    return self.environment.get_type("String");
                }
                self.numeric_operands(left, right)
            }
            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
                self.numeric_operands(left, right)
            }
        }
    }

    /// The left operand must be `Integer` or `Decimal` and the right must
    /// match it; the result takes the left operand's type.
    fn numeric_operands(&self, left: &Type, right: &Type) -> Result<Type, SemanticError> {
        if !matches!(left.name(), "Integer" | "Decimal") {
            return Err(SemanticError::TypeMismatch {
                expected: "Integer".to_string(),
                found: left.name().to_string(),
            });
        }
        require_assignable(left, right)?;
        Ok(left.clone())
    }

    fn literal_type(&self, literal: &Literal) -> Result<Type, SemanticError> {
        match literal {
            Literal::Nil => self.environment.get_type("Nil"),
            Literal::Boolean(_) => self.environment.get_type("Boolean"),
            Literal::Character(_) => self.environment.get_type("Character"),
            Literal::String(_) => self.environment.get_type("String"),
            Literal::Integer(value) => {
                if value.to_i32().is_none() {
                    return Err(SemanticError::IntegerOutOfRange);
                }
                self.environment.get_type("Integer")
            }
            Literal::Decimal(value) => match value.to_f64() {
                Some(converted) if converted.is_finite() => self.environment.get_type("Decimal"),
                _ => Err(SemanticError::DecimalOutOfRange),
            },
        }
    }

    fn require_boolean(&self, condition: &Expression) -> Result<(), SemanticError> {
        require_assignable(
            &self.environment.get_type("Boolean")?,
            &resolved_type(condition)?,
        )
    }

    /// Runs `f` in a fresh child scope, restoring the previous scope on
    /// every exit path.
    fn scoped<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, SemanticError>,
    ) -> Result<T, SemanticError> {
        let child = self.scope.child();
        let previous = mem::replace(&mut self.scope, child);
        let result = f(self);
        self.scope = previous;
        result
    }
}

fn resolved_type(expression: &Expression) -> Result<Type, SemanticError> {
    expression.ty().ok_or(SemanticError::Invariant {
        message: "expression type not resolved",
    })
}
