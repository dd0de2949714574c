use crate::ast::{Expression, Field, Literal, Method, Source, Statement};
use crate::error::SemanticError;

/// Emits an analyzed tree as a `Main` class in the target language.
///
/// The output is assembled in an owned buffer and only handed out on
/// success, so a failure mid-way produces no partial output. All names come
/// from the resolved bindings' jvm names; an unresolved slot means the tree
/// was never analyzed and is reported as an invariant violation.
pub struct Generator {
    output: String,
    indent: usize,
}

impl Generator {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            indent: 0,
        }
    }

    pub fn generate(mut self, source: &Source) -> Result<String, SemanticError> {
        self.output.push_str("public class Main {");
        self.newline(0);

        // Fields are grouped without blank lines; one blank line separates
        // the group from the synthetic main.
        for field in &source.fields {
            self.newline(1);
            self.field(field)?;
        }
        if !source.fields.is_empty() {
            self.newline(0);
        }

        self.newline(1);
        self.output
            .push_str("public static void main(String[] args) {");
        self.newline(2);
        self.output.push_str("System.exit(new Main().main());");
        self.newline(1);
        self.output.push('}');
        self.newline(0);

        for method in &source.methods {
            self.newline(1);
            self.indent = 1;
            self.method(method)?;
            self.newline(0);
        }
        self.newline(0);
        self.output.push('}');
        Ok(self.output)
    }

    fn field(&mut self, field: &Field) -> Result<(), SemanticError> {
        let variable = field.variable.as_ref().ok_or_else(unresolved)?;
        if field.constant {
            self.output.push_str("final ");
        }
        self.output.push_str(variable.ty().jvm_name());
        self.output.push(' ');
        self.output.push_str(variable.jvm_name());
        if let Some(value) = &field.value {
            self.output.push_str(" = ");
            self.expression(value)?;
        }
        self.output.push(';');
        Ok(())
    }

    fn method(&mut self, method: &Method) -> Result<(), SemanticError> {
        let function = method.function.as_ref().ok_or_else(unresolved)?;
        self.output.push_str(function.return_type().jvm_name());
        self.output.push(' ');
        self.output.push_str(function.jvm_name());
        self.output.push('(');
        for (i, (parameter, ty)) in method
            .parameters
            .iter()
            .zip(function.parameter_types())
            .enumerate()
        {
            if i > 0 {
                self.output.push_str(", ");
            }
            self.output.push_str(ty.jvm_name());
            self.output.push(' ');
            self.output.push_str(parameter);
        }
        self.output.push_str(") ");
        self.block(&method.statements)
    }

    fn statement(&mut self, statement: &Statement) -> Result<(), SemanticError> {
        match statement {
            Statement::Expression(expression) => {
                self.expression(expression)?;
                self.output.push(';');
            }
            Statement::Declaration {
                value, variable, ..
            } => {
                let variable = variable.as_ref().ok_or_else(unresolved)?;
                self.output.push_str(variable.ty().jvm_name());
                self.output.push(' ');
                self.output.push_str(variable.jvm_name());
                if let Some(value) = value {
                    self.output.push_str(" = ");
                    self.expression(value)?;
                }
                self.output.push(';');
            }
            Statement::Assignment { receiver, value } => {
                self.expression(receiver)?;
                self.output.push_str(" = ");
                self.expression(value)?;
                self.output.push(';');
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                self.output.push_str("if (");
                self.expression(condition)?;
                self.output.push_str(") ");
                self.block(then_statements)?;
                if !else_statements.is_empty() {
                    self.output.push_str(" else ");
                    self.block(else_statements)?;
                }
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                self.output.push_str("for (");
                if let Some((name, expression)) = initializer {
                    self.output.push(' ');
                    self.output.push_str(name);
                    self.output.push_str(" = ");
                    self.expression(expression)?;
                }
                self.output.push_str(" ;");
                self.output.push(' ');
                self.expression(condition)?;
                self.output.push_str(" ;");
                if let Some((name, expression)) = increment {
                    self.output.push(' ');
                    self.output.push_str(name);
                    self.output.push_str(" = ");
                    self.expression(expression)?;
                }
                self.output.push_str(" ) ");
                self.block(statements)?;
            }
            Statement::While {
                condition,
                statements,
            } => {
                self.output.push_str("while (");
                self.expression(condition)?;
                self.output.push_str(") ");
                self.block(statements)?;
            }
            Statement::Return { value } => {
                self.output.push_str("return ");
                self.expression(value)?;
                self.output.push(';');
            }
        }
        Ok(())
    }

    /// Emits `{}` for an empty block; otherwise one statement per line at
    /// the increased indent. The indent is decremented before any failure
    /// propagates, keeping the writer balanced.
    fn block(&mut self, statements: &[Statement]) -> Result<(), SemanticError> {
        if statements.is_empty() {
            self.output.push_str("{}");
            return Ok(());
        }
        self.output.push('{');
        self.indent += 1;
        let result = self.block_statements(statements);
        self.indent -= 1;
        result?;
        self.newline(self.indent);
        self.output.push('}');
        Ok(())
    }

    fn block_statements(&mut self, statements: &[Statement]) -> Result<(), SemanticError> {
        for statement in statements {
            self.newline(self.indent);
            self.statement(statement)?;
        }
        Ok(())
    }

    fn expression(&mut self, expression: &Expression) -> Result<(), SemanticError> {
        match expression {
            Expression::Literal { value, .. } => self.literal(value),
            Expression::Group { expression, .. } => {
                self.output.push('(');
                self.expression(expression)?;
                self.output.push(')');
            }
            Expression::Binary {
                op, left, right, ..
            } => {
                self.expression(left)?;
                self.output.push(' ');
                self.output.push_str(op.symbol());
                self.output.push(' ');
                self.expression(right)?;
            }
            Expression::Access {
                receiver, variable, ..
            } => {
                let variable = variable.as_ref().ok_or_else(unresolved)?;
                if let Some(receiver) = receiver {
                    self.expression(receiver)?;
                    self.output.push('.');
                }
                self.output.push_str(variable.jvm_name());
            }
            Expression::Function {
                receiver,
                arguments,
                function,
                ..
            } => {
                let function = function.as_ref().ok_or_else(unresolved)?;
                if let Some(receiver) = receiver {
                    self.expression(receiver)?;
                    self.output.push('.');
                }
                self.output.push_str(function.jvm_name());
                self.output.push('(');
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        self.output.push_str(", ");
                    }
                    self.expression(argument)?;
                }
                self.output.push(')');
            }
        }
        Ok(())
    }

    fn literal(&mut self, literal: &Literal) {
        match literal {
            Literal::Nil => self.output.push_str("null"),
            Literal::Boolean(value) => {
                self.output.push_str(if *value { "true" } else { "false" });
            }
            Literal::Character(value) => {
                self.output.push('\'');
                self.output.push(*value);
                self.output.push('\'');
            }
            Literal::String(value) => {
                self.output.push('"');
                self.output.push_str(value);
                self.output.push('"');
            }
            Literal::Integer(value) => self.output.push_str(&value.to_string()),
            Literal::Decimal(value) => self.output.push_str(&value.to_string()),
        }
    }

    fn newline(&mut self, indent: usize) {
        self.output.push('\n');
        for _ in 0..indent {
            self.output.push_str("    ");
        }
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn generate(source: &Source) -> Result<String, SemanticError> {
    Generator::new().generate(source)
}

fn unresolved() -> SemanticError {
    SemanticError::Invariant {
        message: "generator requires an analyzed tree",
    }
}
