use std::cmp::Ordering;
use std::rc::Rc;

use bigdecimal::RoundingMode;
use num_traits::Zero;

use crate::ast::{BinaryOp, Expression, Field, Literal, Method, Source, Statement};
use crate::environment::{Environment, Function, Scope, Value, Variable};
use crate::error::SemanticError;

/// Control-flow marker for statement execution. `Return` carries a value out
/// of the enclosing function; it is distinct from the error channel.
enum Flow {
    Normal,
    Return(Value),
}

/// AST-walking evaluator. Runs against a possibly non-annotated tree: name
/// resolution happens dynamically against the scope tree, and type checking
/// is replaced by runtime payload checks.
pub struct Interpreter {
    evaluator: Evaluator,
    scope: Scope,
}

impl Interpreter {
    pub fn new(environment: &Environment) -> Self {
        Self {
            evaluator: Evaluator {
                environment: environment.clone(),
            },
            scope: environment.scope().child(),
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Defines the source's fields and methods, then invokes `main/0` and
    /// returns its value.
    pub fn run(&mut self, source: &Source) -> Result<Value, SemanticError> {
        for field in &source.fields {
            self.evaluator.define_field(&self.scope, field)?;
        }
        for method in &source.methods {
            self.evaluator.define_method(&self.scope, method)?;
        }
        let main = self
            .scope
            .lookup_function("main", 0)
            .map_err(|_| SemanticError::MissingMain)?;
        main.invoke(Vec::new())
    }
}

#[derive(Clone)]
struct Evaluator {
    environment: Environment,
}

impl Evaluator {
    fn define_field(&self, scope: &Scope, field: &Field) -> Result<(), SemanticError> {
        let ty = self.environment.get_type(&field.type_name)?;
        let value = match &field.value {
            Some(expression) => self.evaluate(scope, expression)?,
            None => Value::Nil,
        };
        scope.define_variable(Variable::new(
            &field.name,
            &field.name,
            ty,
            field.constant,
            value,
        ))?;
        Ok(())
    }

    /// Installs the method as a function closing over its defining scope.
    /// Invocation binds arguments in a fresh child of that scope, executes
    /// the body, and maps a `Return` flow to the call's value (`Nil` when
    /// the body falls off the end).
    fn define_method(&self, scope: &Scope, method: &Method) -> Result<(), SemanticError> {
        let mut parameter_types = Vec::with_capacity(method.parameter_type_names.len());
        for name in &method.parameter_type_names {
            parameter_types.push(self.environment.get_type(name)?);
        }
        let return_type = match &method.return_type_name {
            Some(name) => self.environment.get_type(name)?,
            None => self.environment.get_type("Nil")?,
        };

        let evaluator = self.clone();
        let defining_scope = scope.clone();
        let parameters = method.parameters.clone();
        let bound_types = parameter_types.clone();
        let body: Rc<[Statement]> = method.statements.clone().into();
        let implementation = move |arguments: Vec<Value>| {
            let scope = defining_scope.child();
            for ((parameter, ty), argument) in
                parameters.iter().zip(&bound_types).zip(arguments)
            {
                scope.define_variable(Variable::new(
                    parameter,
                    parameter,
                    ty.clone(),
                    false,
                    argument,
                ))?;
            }
            for statement in body.iter() {
                if let Flow::Return(value) = evaluator.execute(&scope, statement)? {
                    return Ok(value);
                }
            }
            Ok(Value::Nil)
        };

        scope.define_function(Function::new(
            &method.name,
            &method.name,
            parameter_types,
            return_type,
            implementation,
        ))?;
        Ok(())
    }

    fn execute_block(
        &self,
        scope: &Scope,
        statements: &[Statement],
    ) -> Result<Flow, SemanticError> {
        for statement in statements {
            if let Flow::Return(value) = self.execute(scope, statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn execute(&self, scope: &Scope, statement: &Statement) -> Result<Flow, SemanticError> {
        match statement {
            Statement::Expression(expression) => {
                self.evaluate(scope, expression)?;
                Ok(Flow::Normal)
            }
            Statement::Declaration {
                name,
                type_name,
                value,
                ..
            } => {
                let ty = match type_name {
                    Some(type_name) => self.environment.get_type(type_name)?,
                    None => self.environment.get_type("Any")?,
                };
                let value = match value {
                    Some(expression) => self.evaluate(scope, expression)?,
                    None => Value::Nil,
                };
                scope.define_variable(Variable::new(name.as_str(), name.as_str(), ty, false, value))?;
                Ok(Flow::Normal)
            }
            Statement::Assignment { receiver, value } => {
                let value = self.evaluate(scope, value)?;
                self.assign(scope, receiver, value)?;
                Ok(Flow::Normal)
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                let branch = if self.evaluate(scope, condition)?.as_boolean()? {
                    then_statements
                } else {
                    else_statements
                };
                self.execute_block(&scope.child(), branch)
            }
            Statement::While {
                condition,
                statements,
            } => {
                while self.evaluate(scope, condition)?.as_boolean()? {
                    if let Flow::Return(value) = self.execute_block(&scope.child(), statements)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                // The loop scope holds the induction variable; each
                // iteration's body runs in a fresh child of it.
                let loop_scope = scope.child();
                if let Some((name, expression)) = initializer {
                    let value = self.evaluate(&loop_scope, expression)?;
                    let ty = self.environment.get_type("Any")?;
                    loop_scope.define_variable(Variable::new(
                        name.as_str(),
                        name.as_str(),
                        ty,
                        false,
                        value,
                    ))?;
                }
                while self.evaluate(&loop_scope, condition)?.as_boolean()? {
                    if let Flow::Return(value) =
                        self.execute_block(&loop_scope.child(), statements)?
                    {
                        return Ok(Flow::Return(value));
                    }
                    if let Some((name, expression)) = increment {
                        let value = self.evaluate(&loop_scope, expression)?;
                        let variable = loop_scope.lookup_variable(name)?;
                        if variable.constant() {
                            return Err(SemanticError::AssignmentToConstant(name.clone()));
                        }
                        variable.set_value(value);
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::Return { value } => Ok(Flow::Return(self.evaluate(scope, value)?)),
        }
    }

    fn assign(
        &self,
        scope: &Scope,
        receiver: &Expression,
        value: Value,
    ) -> Result<(), SemanticError> {
        let Expression::Access {
            receiver: target,
            name,
            ..
        } = receiver
        else {
            return Err(SemanticError::InvalidAssignmentTarget);
        };
        let variable = match target {
            Some(target) => {
                let object = self.evaluate(scope, target)?;
                self.environment.type_of(&object)?.field(name)?
            }
            None => scope.lookup_variable(name)?,
        };
        if variable.constant() {
            return Err(SemanticError::AssignmentToConstant(name.clone()));
        }
        variable.set_value(value);
        Ok(())
    }

    fn evaluate(&self, scope: &Scope, expression: &Expression) -> Result<Value, SemanticError> {
        match expression {
            Expression::Literal { value, .. } => Ok(match value {
                Literal::Nil => Value::Nil,
                Literal::Boolean(value) => Value::Boolean(*value),
                Literal::Character(value) => Value::Character(*value),
                Literal::String(value) => Value::String(value.clone()),
                Literal::Integer(value) => Value::Integer(value.clone()),
                Literal::Decimal(value) => Value::Decimal(value.clone()),
            }),
            Expression::Group { expression, .. } => self.evaluate(scope, expression),
            Expression::Binary {
                op, left, right, ..
            } => self.binary(scope, *op, left, right),
            Expression::Access { receiver, name, .. } => match receiver {
                Some(receiver) => {
                    let object = self.evaluate(scope, receiver)?;
                    Ok(self.environment.type_of(&object)?.field(name)?.value())
                }
                None => Ok(scope.lookup_variable(name)?.value()),
            },
            Expression::Function {
                receiver,
                name,
                arguments,
                ..
            } => match receiver {
                Some(receiver) => {
                    let object = self.evaluate(scope, receiver)?;
                    let method = self
                        .environment
                        .type_of(&object)?
                        .method(name, arguments.len() + 1)?;
                    let mut values = Vec::with_capacity(arguments.len() + 1);
                    values.push(object);
                    for argument in arguments {
                        values.push(self.evaluate(scope, argument)?);
                    }
                    method.invoke(values)
                }
                None => {
                    let function = scope.lookup_function(name, arguments.len())?;
                    let mut values = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        values.push(self.evaluate(scope, argument)?);
                    }
                    function.invoke(values)
                }
            },
        }
    }

    fn binary(
        &self,
        scope: &Scope,
        op: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Result<Value, SemanticError> {
        match op {
            // The right operand must not be evaluated when the left decides.
            BinaryOp::And => {
                if !self.evaluate(scope, left)?.as_boolean()? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.evaluate(scope, right)?.as_boolean()?))
            }
            BinaryOp::Or => {
                if self.evaluate(scope, left)?.as_boolean()? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.evaluate(scope, right)?.as_boolean()?))
            }
            BinaryOp::Equal => {
                Ok(Value::Boolean(
                    self.evaluate(scope, left)? == self.evaluate(scope, right)?,
                ))
            }
            BinaryOp::NotEqual => {
                Ok(Value::Boolean(
                    self.evaluate(scope, left)? != self.evaluate(scope, right)?,
                ))
            }
            BinaryOp::Less => self.comparison(scope, left, right, Ordering::is_lt),
            BinaryOp::LessEqual => self.comparison(scope, left, right, Ordering::is_le),
            BinaryOp::Greater => self.comparison(scope, left, right, Ordering::is_gt),
            BinaryOp::GreaterEqual => self.comparison(scope, left, right, Ordering::is_ge),
            BinaryOp::Add => {
                let left = self.evaluate(scope, left)?;
                let right = self.evaluate(scope, right)?;
                match (left, right) {
                    (Value::String(left), right) => Ok(Value::String(format!("{left}{right}"))),
                    (left, Value::String(right)) => Ok(Value::String(format!("{left}{right}"))),
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left + right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left + right))
                    }
                    (left, right) => Err(numeric_mismatch(&left, &right)),
                }
            }
            BinaryOp::Subtract => {
                let left = self.evaluate(scope, left)?;
                let right = self.evaluate(scope, right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left - right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left - right))
                    }
                    (left, right) => Err(numeric_mismatch(&left, &right)),
                }
            }
            BinaryOp::Multiply => {
                let left = self.evaluate(scope, left)?;
                let right = self.evaluate(scope, right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left * right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left * right))
                    }
                    (left, right) => Err(numeric_mismatch(&left, &right)),
                }
            }
            BinaryOp::Divide => {
                let left = self.evaluate(scope, left)?;
                let right = self.evaluate(scope, right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        if right.is_zero() {
                            return Err(SemanticError::DivisionByZero);
                        }
                        Ok(Value::Integer(left / right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        if right.is_zero() {
                            return Err(SemanticError::DivisionByZero);
                        }
                        // The quotient keeps the dividend's scale, rounding
                        // half to even.
                        let scale = left.fractional_digit_count();
                        let quotient = left / right;
                        Ok(Value::Decimal(
                            quotient.with_scale_round(scale, RoundingMode::HalfEven),
                        ))
                    }
                    (left, right) => Err(numeric_mismatch(&left, &right)),
                }
            }
        }
    }

    fn comparison(
        &self,
        scope: &Scope,
        left: &Expression,
        right: &Expression,
        accept: impl Fn(Ordering) -> bool,
    ) -> Result<Value, SemanticError> {
        let left = self.evaluate(scope, left)?;
        let right = self.evaluate(scope, right)?;
        Ok(Value::Boolean(accept(compare(&left, &right)?)))
    }
}

/// Natural ordering for the four comparable payload kinds; operands of
/// differing kinds do not compare.
fn compare(left: &Value, right: &Value) -> Result<Ordering, SemanticError> {
    match (left, right) {
        (Value::Integer(left), Value::Integer(right)) => Ok(left.cmp(right)),
        (Value::Decimal(left), Value::Decimal(right)) => Ok(left.cmp(right)),
        (Value::Character(left), Value::Character(right)) => Ok(left.cmp(right)),
        (Value::String(left), Value::String(right)) => Ok(left.cmp(right)),
        _ => Err(SemanticError::TypeMismatch {
            expected: left.type_name().to_string(),
            found: right.type_name().to_string(),
        }),
    }
}

fn numeric_mismatch(left: &Value, right: &Value) -> SemanticError {
    SemanticError::TypeMismatch {
        expected: left.type_name().to_string(),
        found: right.type_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use indoc::indoc;
    use num_bigint::BigInt;

    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;

    use super::*;

    /// An environment whose `print` captures output instead of writing to
    /// stdout.
    fn capturing_environment() -> (Environment, Rc<RefCell<Vec<String>>>) {
        let environment = Environment::new();
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);
        let any = environment.get_type("Any").expect("builtin type");
        let nil = environment.get_type("Nil").expect("builtin type");
        environment
            .define_function("print", "System.out.println", vec![any], nil, move |arguments| {
                for argument in &arguments {
                    sink.borrow_mut().push(argument.to_string());
                }
                Ok(Value::Nil)
            })
            .expect("define print");
        (environment, output)
    }

    fn run(source: &str) -> Result<Value, SemanticError> {
        let (environment, _) = capturing_environment();
        run_in(source, &environment)
    }

    fn run_in(source: &str, environment: &Environment) -> Result<Value, SemanticError> {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let program = parse_tokens(tokens).expect("parse should succeed");
        Interpreter::new(environment).run(&program)
    }

    fn integer(value: i64) -> Value {
        Value::Integer(BigInt::from(value))
    }

    #[test]
    fn runs_main_and_returns_its_value() {
        let value = run("DEF main(): Integer DO RETURN 40 + 2; END").expect("run");
        assert_eq!(value, integer(42));
    }

    #[test]
    fn missing_main_is_a_runtime_failure() {
        let err = run("DEF helper(): Integer DO RETURN 0; END").expect_err("expected failure");
        assert_eq!(err, SemanticError::MissingMain);
    }

    #[test]
    fn fields_default_to_nil_and_are_visible_to_methods() {
        let value = run(indoc! {"
            LET x: Integer;
            LET y: Integer = 3;
            DEF main(): Integer DO
                IF x == NIL DO RETURN y; END
                RETURN 0;
            END
        "})
        .expect("run");
        assert_eq!(value, integer(3));
    }

    #[test]
    fn short_circuit_skips_the_right_operand() {
        let (environment, _) = capturing_environment();
        let calls = Rc::new(RefCell::new(0));
        let observed = Rc::clone(&calls);
        let boolean = environment.get_type("Boolean").expect("builtin type");
        environment
            .define_function("bomb", "bomb", Vec::new(), boolean, move |_| {
                *observed.borrow_mut() += 1;
                Err(SemanticError::DivisionByZero)
            })
            .expect("define bomb");

        let value = run_in(
            indoc! {"
                DEF main(): Integer DO
                    IF FALSE && bomb() DO RETURN 1; ELSE RETURN 0; END
                END
            "},
            &environment,
        )
        .expect("run");
        assert_eq!(value, integer(0));
        assert_eq!(*calls.borrow(), 0);

        let value = run_in(
            indoc! {"
                DEF main(): Integer DO
                    IF TRUE || bomb() DO RETURN 1; ELSE RETURN 0; END
                END
            "},
            &environment,
        )
        .expect("run");
        assert_eq!(value, integer(1));
        assert_eq!(*calls.borrow(), 0);
    }

    #[test]
    fn arithmetic_is_arbitrary_precision() {
        let value = run(indoc! {"
            DEF main(): Integer DO RETURN 1000000 * 1000000; END
        "})
        .expect("run");
        assert_eq!(value, Value::Integer(BigInt::from(1_000_000_000_000u64)));
    }

    #[test]
    fn decimal_division_rounds_half_to_even() {
        let (environment, output) = capturing_environment();
        run_in(
            indoc! {"
                DEF main(): Integer DO
                    print(1.0 / 4.0);
                    print(3.0 / 4.0);
                    print(1.0 / 3.0);
                    RETURN 0;
                END
            "},
            &environment,
        )
        .expect("run");
        assert_eq!(*output.borrow(), vec!["0.2", "0.8", "0.3"]);
    }

    #[test]
    fn division_by_zero_fails() {
        let err = run("DEF main(): Integer DO RETURN 1 / 0; END").expect_err("expected failure");
        assert_eq!(err, SemanticError::DivisionByZero);

        let err = run(indoc! {"
            DEF main(): Integer DO
                print(1.0 / 0.0);
                RETURN 0;
            END
        "})
        .expect_err("expected failure");
        assert_eq!(err, SemanticError::DivisionByZero);
    }

    #[test]
    fn integer_division_truncates() {
        let value = run("DEF main(): Integer DO RETURN 7 / 2; END").expect("run");
        assert_eq!(value, integer(3));
        let value = run("DEF main(): Integer DO RETURN -7 / 2; END").expect("run");
        assert_eq!(value, integer(-3));
    }

    #[test]
    fn string_concatenation_renders_values() {
        let (environment, output) = capturing_environment();
        run_in(
            indoc! {r#"
                DEF main(): Integer DO
                    print("n = " + 42);
                    print(1.5 + "!");
                    print("" + NIL);
                    RETURN 0;
                END
            "#},
            &environment,
        )
        .expect("run");
        assert_eq!(*output.borrow(), vec!["n = 42", "1.5!", "nil"]);
    }

    #[test]
    fn comparisons_require_matching_kinds() {
        let value = run(indoc! {r#"
            DEF main(): Integer DO
                IF 'a' < 'b' && "abc" < "abd" DO RETURN 1; END
                RETURN 0;
            END
        "#})
        .expect("run");
        assert_eq!(value, integer(1));

        let err = run(indoc! {"
            DEF main(): Integer DO
                IF 1 < 1.5 DO RETURN 1; END
                RETURN 0;
            END
        "})
        .expect_err("expected failure");
        assert!(matches!(err, SemanticError::TypeMismatch { .. }));
    }

    #[test]
    fn decimal_equality_is_scale_sensitive() {
        let value = run(indoc! {"
            DEF main(): Integer DO
                IF 1.0 == 1.00 DO RETURN 1; END
                IF 1.0 == 1.0 DO RETURN 2; END
                RETURN 0;
            END
        "})
        .expect("run");
        assert_eq!(value, integer(2));
    }

    #[test]
    fn equality_is_structural_across_kinds() {
        let value = run(indoc! {"
            DEF main(): Integer DO
                IF 1 == 1.0 DO RETURN 1; END
                IF NIL == NIL DO RETURN 2; END
                RETURN 0;
            END
        "})
        .expect("run");
        assert_eq!(value, integer(2));
    }

    #[test]
    fn while_loop_runs_and_returns_through_frames() {
        let value = run(indoc! {"
            DEF main(): Integer DO
                LET n = 0;
                WHILE n < 10 DO
                    IF n == 7 DO RETURN n; END
                    n = n + 1;
                END
                RETURN 0;
            END
        "})
        .expect("run");
        assert_eq!(value, integer(7));
    }

    #[test]
    fn for_loop_increments_after_each_iteration() {
        let (environment, output) = capturing_environment();
        let value = run_in(
            indoc! {"
                DEF main(): Integer DO
                    LET sum = 0;
                    FOR (i = 0; i < 4; i = i + 1)
                        sum = sum + i;
                        print(i);
                    END
                    RETURN sum;
                END
            "},
            &environment,
        )
        .expect("run");
        assert_eq!(value, integer(6));
        assert_eq!(*output.borrow(), vec!["0", "1", "2", "3"]);
    }

    #[test]
    fn loop_body_declarations_do_not_leak_across_iterations() {
        let value = run(indoc! {"
            DEF main(): Integer DO
                FOR (i = 0; i < 3; i = i + 1)
                    LET x = i;
                END
                RETURN 0;
            END
        "})
        .expect("redeclaring x each iteration should succeed");
        assert_eq!(value, integer(0));
    }

    #[test]
    fn assignment_to_constant_fails() {
        let err = run(indoc! {"
            LET CONST x: Integer = 1;
            DEF main(): Integer DO
                x = 2;
                RETURN 0;
            END
        "})
        .expect_err("expected failure");
        assert_eq!(err, SemanticError::AssignmentToConstant("x".to_string()));
    }

    #[test]
    fn methods_close_over_their_defining_scope() {
        let value = run(indoc! {"
            LET base: Integer = 10;
            DEF bump(n: Integer): Integer DO RETURN base + n; END
            DEF main(): Integer DO RETURN bump(5); END
        "})
        .expect("run");
        assert_eq!(value, integer(15));
    }

    #[test]
    fn recursion_terminates_with_return() {
        let value = run(indoc! {"
            DEF fact(n: Integer): Integer DO
                IF n <= 1 DO RETURN 1; END
                RETURN n * fact(n - 1);
            END
            DEF main(): Integer DO RETURN fact(10); END
        "})
        .expect("run");
        assert_eq!(value, integer(3_628_800));
    }

    #[test]
    fn falling_off_a_method_returns_nil() {
        let value = run(indoc! {"
            DEF side() DO print(1); END
            DEF main(): Integer DO
                IF side() == NIL DO RETURN 1; END
                RETURN 0;
            END
        "})
        .expect("run");
        assert_eq!(value, integer(1));
    }

    #[test]
    fn method_calls_dispatch_on_the_receiver_type() {
        let (environment, _) = capturing_environment();
        let string = environment.get_type("String").expect("builtin type");
        let integer_type = environment.get_type("Integer").expect("builtin type");
        string
            .define_method(Function::new(
                "size",
                "length",
                vec![string.clone()],
                integer_type,
                |arguments| match arguments.first() {
                    Some(Value::String(value)) => Ok(Value::Integer(BigInt::from(value.len()))),
                    _ => Err(SemanticError::Invariant {
                        message: "size expects a string receiver",
                    }),
                },
            ))
            .expect("define size");

        let value = run_in(
            indoc! {r#"
                DEF main(): Integer DO RETURN "four".size(); END
            "#},
            &environment,
        )
        .expect("run");
        assert_eq!(value, integer(4));
    }

    #[test]
    fn scope_is_restored_after_every_statement() {
        let (environment, _) = capturing_environment();
        let tokens = tokenize(indoc! {"
            DEF main(): Integer DO
                LET x = 1;
                IF TRUE DO LET y = 2; END
                RETURN x;
            END
        "})
        .expect("tokenize should succeed");
        let program = parse_tokens(tokens).expect("parse should succeed");
        let mut interpreter = Interpreter::new(&environment);
        interpreter.run(&program).expect("run");

        // Nothing from inside the program leaks into the interpreter's own
        // scope or the embedder's root scope.
        assert!(interpreter.scope().lookup_variable("x").is_err());
        assert!(environment.scope().lookup_variable("x").is_err());
        assert!(environment.scope().lookup_function("main", 0).is_err());
    }
}
