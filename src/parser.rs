use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use crate::ast::{BinaryOp, Expression, Field, Literal, Method, Source, Statement};
use crate::error::ParseError;
use crate::token::{Token, TokenKind};

/// Recursive-descent parser over the lexer's token sequence.
///
/// Every failure carries a byte index: the offending token's start when the
/// stream still has tokens, otherwise the end of the last token.
pub struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token<'a>>) -> Self {
        Self { tokens, pos: 0 }
    }

    /// Parses `source ::= field* method*`. Every field must precede every
    /// method, and nothing may follow the method list.
    pub fn parse_source(mut self) -> Result<Source, ParseError> {
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while self.peek_literal("LET") {
            fields.push(self.parse_field()?);
        }
        while self.peek_literal("DEF") {
            methods.push(self.parse_method()?);
        }
        if self.has(0) {
            return Err(self.error("'DEF'"));
        }
        Ok(Source { fields, methods })
    }

    fn parse_field(&mut self) -> Result<Field, ParseError> {
        self.expect_literal("LET")?;
        let constant = self.match_literal("CONST");
        let name = self.expect_identifier()?;
        self.expect_literal(":")?;
        let type_name = self.expect_identifier()?;
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_literal(";")?;
        Ok(Field {
            name,
            type_name,
            constant,
            value,
            variable: None,
        })
    }

    fn parse_method(&mut self) -> Result<Method, ParseError> {
        self.expect_literal("DEF")?;
        let name = self.expect_identifier()?;
        self.expect_literal("(")?;
        let mut parameters = Vec::new();
        let mut parameter_type_names = Vec::new();
        if !self.peek_literal(")") {
            loop {
                parameters.push(self.expect_identifier()?);
                self.expect_literal(":")?;
                parameter_type_names.push(self.expect_identifier()?);
                if !self.match_literal(",") {
                    break;
                }
            }
        }
        self.expect_literal(")")?;
        let return_type_name = if self.match_literal(":") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.expect_literal("DO")?;
        let mut statements = Vec::new();
        while !self.peek_literal("END") {
            statements.push(self.parse_statement()?);
        }
        self.expect_literal("END")?;
        Ok(Method {
            name,
            parameters,
            parameter_type_names,
            return_type_name,
            statements,
            function: None,
        })
    }

    pub fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        if self.peek_literal("LET") {
            return self.parse_declaration();
        }
        if self.peek_literal("IF") {
            return self.parse_if();
        }
        if self.peek_literal("FOR") {
            return self.parse_for();
        }
        if self.peek_literal("WHILE") {
            return self.parse_while();
        }
        if self.peek_literal("RETURN") {
            return self.parse_return();
        }
        let expression = self.parse_expression()?;
        if self.match_literal("=") {
            let value = self.parse_expression()?;
            self.expect_literal(";")?;
            return Ok(Statement::Assignment {
                receiver: expression,
                value,
            });
        }
        self.expect_literal(";")?;
        Ok(Statement::Expression(expression))
    }

    fn parse_declaration(&mut self) -> Result<Statement, ParseError> {
        self.expect_literal("LET")?;
        let name = self.expect_identifier()?;
        let type_name = if self.match_literal(":") {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        let value = if self.match_literal("=") {
            Some(self.parse_expression()?)
        } else {
            None
        };
        self.expect_literal(";")?;
        Ok(Statement::Declaration {
            name,
            type_name,
            value,
            variable: None,
        })
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        self.expect_literal("IF")?;
        let condition = self.parse_expression()?;
        self.expect_literal("DO")?;
        let mut then_statements = Vec::new();
        while !self.peek_literal("ELSE") && !self.peek_literal("END") {
            then_statements.push(self.parse_statement()?);
        }
        let mut else_statements = Vec::new();
        if self.match_literal("ELSE") {
            while !self.peek_literal("END") {
                else_statements.push(self.parse_statement()?);
            }
        }
        self.expect_literal("END")?;
        Ok(Statement::If {
            condition,
            then_statements,
            else_statements,
        })
    }

    fn parse_for(&mut self) -> Result<Statement, ParseError> {
        self.expect_literal("FOR")?;
        self.expect_literal("(")?;
        let initializer = if self.peek_literal(";") {
            None
        } else {
            let name = self.expect_identifier()?;
            self.expect_literal("=")?;
            Some((name, self.parse_expression()?))
        };
        self.expect_literal(";")?;
        let condition = self.parse_expression()?;
        self.expect_literal(";")?;
        let increment = if self.peek_literal(")") {
            None
        } else {
            let name = self.expect_identifier()?;
            self.expect_literal("=")?;
            Some((name, self.parse_expression()?))
        };
        self.expect_literal(")")?;
        let mut statements = Vec::new();
        while !self.peek_literal("END") {
            statements.push(self.parse_statement()?);
        }
        self.expect_literal("END")?;
        Ok(Statement::For {
            initializer,
            condition,
            increment,
            statements,
        })
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        self.expect_literal("WHILE")?;
        let condition = self.parse_expression()?;
        self.expect_literal("DO")?;
        let mut statements = Vec::new();
        while !self.peek_literal("END") {
            statements.push(self.parse_statement()?);
        }
        self.expect_literal("END")?;
        Ok(Statement::While {
            condition,
            statements,
        })
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        self.expect_literal("RETURN")?;
        let value = self.parse_expression()?;
        self.expect_literal(";")?;
        Ok(Statement::Return { value })
    }

    pub fn parse_expression(&mut self) -> Result<Expression, ParseError> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_equality()?;
        while let Some(op) = self.match_operator(&["&&", "||"]) {
            let right = self.parse_equality()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_equality(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_additive()?;
        while let Some(op) = self.match_operator(&["<", "<=", ">", ">=", "==", "!="]) {
            let right = self.parse_additive()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_additive(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_multiplicative()?;
        while let Some(op) = self.match_operator(&["+", "-"]) {
            let right = self.parse_multiplicative()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_secondary()?;
        while let Some(op) = self.match_operator(&["*", "/"]) {
            let right = self.parse_secondary()?;
            expression = binary(op, expression, right);
        }
        Ok(expression)
    }

    /// `secondary ::= primary ('.' ID ('(' args? ')')?)*` — dotted chains of
    /// field accesses and method calls on the left-hand value.
    fn parse_secondary(&mut self) -> Result<Expression, ParseError> {
        let mut expression = self.parse_primary()?;
        while self.match_literal(".") {
            let name = self.expect_identifier()?;
            expression = if self.match_literal("(") {
                let arguments = self.parse_arguments()?;
                Expression::Function {
                    receiver: Some(Box::new(expression)),
                    name,
                    arguments,
                    function: None,
                }
            } else {
                Expression::Access {
                    receiver: Some(Box::new(expression)),
                    name,
                    variable: None,
                }
            };
        }
        Ok(expression)
    }

    fn parse_primary(&mut self) -> Result<Expression, ParseError> {
        if self.match_literal("NIL") {
            return Ok(Expression::literal(Literal::Nil));
        }
        if self.match_literal("TRUE") {
            return Ok(Expression::literal(Literal::Boolean(true)));
        }
        if self.match_literal("FALSE") {
            return Ok(Expression::literal(Literal::Boolean(false)));
        }

        let Some(token) = self.tokens.get(self.pos).copied() else {
            return Err(self.error("expression"));
        };
        match token.kind {
            TokenKind::Integer => {
                self.advance();
                let value = BigInt::from_str(token.literal)
                    .map_err(|_| ParseError::new("Invalid integer literal.", token.index))?;
                Ok(Expression::literal(Literal::Integer(value)))
            }
            TokenKind::Decimal => {
                self.advance();
                let value = BigDecimal::from_str(token.literal)
                    .map_err(|_| ParseError::new("Invalid decimal literal.", token.index))?;
                Ok(Expression::literal(Literal::Decimal(value)))
            }
            TokenKind::Character => {
                self.advance();
                let content = decode_escapes(quoted_content(token.literal));
                let mut chars = content.chars();
                match (chars.next(), chars.next()) {
                    (Some(character), None) => {
                        Ok(Expression::literal(Literal::Character(character)))
                    }
                    _ => Err(ParseError::new("Invalid character literal.", token.index)),
                }
            }
            TokenKind::String => {
                self.advance();
                let content = decode_escapes(quoted_content(token.literal));
                Ok(Expression::literal(Literal::String(content)))
            }
            TokenKind::Operator if token.literal == "(" => {
                self.advance();
                let expression = self.parse_expression()?;
                self.expect_literal(")")?;
                Ok(Expression::Group {
                    expression: Box::new(expression),
                    ty: None,
                })
            }
            TokenKind::Identifier => {
                self.advance();
                let name = token.literal.to_string();
                if self.match_literal("(") {
                    let arguments = self.parse_arguments()?;
                    Ok(Expression::Function {
                        receiver: None,
                        name,
                        arguments,
                        function: None,
                    })
                } else {
                    Ok(Expression::Access {
                        receiver: None,
                        name,
                        variable: None,
                    })
                }
            }
            _ => Err(self.error("expression")),
        }
    }

    /// Parses `args ::= expr (',' expr)*` up to and including the closing
    /// `)`; the opening `(` has already been consumed.
    fn parse_arguments(&mut self) -> Result<Vec<Expression>, ParseError> {
        let mut arguments = Vec::new();
        if !self.peek_literal(")") {
            arguments.push(self.parse_expression()?);
            while self.match_literal(",") {
                if self.peek_literal(")") {
                    return Err(ParseError::new(
                        "Unexpected trailing comma before ')'.",
                        self.error_index(),
                    ));
                }
                arguments.push(self.parse_expression()?);
            }
        }
        self.expect_literal(")")?;
        Ok(arguments)
    }

    fn has(&self, offset: usize) -> bool {
        self.pos + offset < self.tokens.len()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn peek_literal(&self, literal: &str) -> bool {
        self.tokens
            .get(self.pos)
            .is_some_and(|token| token.literal == literal)
    }

    fn match_literal(&mut self, literal: &str) -> bool {
        if self.peek_literal(literal) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_literal(&mut self, literal: &str) -> Result<(), ParseError> {
        if self.match_literal(literal) {
            return Ok(());
        }
        Err(self.error(&format!("'{literal}'")))
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.tokens.get(self.pos) {
            Some(token) if token.kind == TokenKind::Identifier => {
                let name = token.literal.to_string();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error("identifier")),
        }
    }

    fn match_operator(&mut self, symbols: &[&str]) -> Option<BinaryOp> {
        let token = self.tokens.get(self.pos)?;
        if token.kind != TokenKind::Operator || !symbols.contains(&token.literal) {
            return None;
        }
        let op = BinaryOp::from_symbol(token.literal)?;
        self.advance();
        Some(op)
    }

    fn error(&self, expected: &str) -> ParseError {
        ParseError::new(format!("Expected {expected}."), self.error_index())
    }

    fn error_index(&self) -> usize {
        if let Some(token) = self.tokens.get(self.pos) {
            return token.index;
        }
        match self.tokens.last() {
            Some(last) => last.end(),
            None => 0,
        }
    }
}

fn binary(op: BinaryOp, left: Expression, right: Expression) -> Expression {
    Expression::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        ty: None,
    }
}

fn quoted_content(literal: &str) -> &str {
    literal
        .strip_prefix(['\'', '"'])
        .and_then(|rest| rest.strip_suffix(['\'', '"']))
        .unwrap_or(literal)
}

fn decode_escapes(content: &str) -> String {
    let mut decoded = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            decoded.push(c);
            continue;
        }
        match chars.next() {
            Some('b') => decoded.push('\u{0008}'),
            Some('n') => decoded.push('\n'),
            Some('r') => decoded.push('\r'),
            Some('t') => decoded.push('\t'),
            // The lexer only admits ' " \ beyond the ones above.
            Some(other) => decoded.push(other),
            None => decoded.push(c),
        }
    }
    decoded
}

pub fn parse_tokens<'a>(tokens: Vec<Token<'a>>) -> Result<Source, ParseError> {
    Parser::new(tokens).parse_source()
}

#[cfg(test)]
mod tests {
    use crate::lexer::tokenize;

    use super::*;

    fn parse(source: &str) -> Result<Source, ParseError> {
        parse_tokens(tokenize(source).expect("tokenize should succeed"))
    }

    fn parse_single_statement(source: &str) -> Statement {
        let tokens = tokenize(source).expect("tokenize should succeed");
        let mut parser = Parser::new(tokens);
        parser.parse_statement().expect("parse should succeed")
    }

    fn access(name: &str) -> Expression {
        Expression::Access {
            receiver: None,
            name: name.to_string(),
            variable: None,
        }
    }

    #[test]
    fn parses_assignment_statement() {
        let statement = parse_single_statement("x = y + 1;");
        let expected = Statement::Assignment {
            receiver: access("x"),
            value: Expression::Binary {
                op: BinaryOp::Add,
                left: Box::new(access("y")),
                right: Box::new(Expression::literal(Literal::Integer(BigInt::from(1)))),
                ty: None,
            },
        };
        assert_eq!(statement, expected);
    }

    #[test]
    fn parses_field_with_modifiers() {
        let source = parse("LET CONST PI: Decimal = 3.14;").expect("parse should succeed");
        assert_eq!(source.fields.len(), 1);
        let field = &source.fields[0];
        assert_eq!(field.name, "PI");
        assert_eq!(field.type_name, "Decimal");
        assert!(field.constant);
        assert_eq!(
            field.value,
            Some(Expression::literal(Literal::Decimal(
                BigDecimal::from_str("3.14").expect("valid decimal")
            )))
        );
    }

    #[test]
    fn parses_method_signature() {
        let source =
            parse("DEF add(x: Integer, y: Integer): Integer DO RETURN x + y; END")
                .expect("parse should succeed");
        assert_eq!(source.methods.len(), 1);
        let method = &source.methods[0];
        assert_eq!(method.name, "add");
        assert_eq!(method.parameters, vec!["x", "y"]);
        assert_eq!(method.parameter_type_names, vec!["Integer", "Integer"]);
        assert_eq!(method.return_type_name.as_deref(), Some("Integer"));
        assert_eq!(method.statements.len(), 1);
    }

    #[test]
    fn precedence_layers_bind_tighter_downward() {
        let statement = parse_single_statement("r = a || b == c + d * e;");
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        // ((a) || (b == (c + (d * e))))
        let Expression::Binary { op: BinaryOp::Or, right, .. } = value else {
            panic!("expected || at the top");
        };
        let Expression::Binary { op: BinaryOp::Equal, right, .. } = *right else {
            panic!("expected == below ||");
        };
        let Expression::Binary { op: BinaryOp::Add, right, .. } = *right else {
            panic!("expected + below ==");
        };
        assert!(matches!(
            *right,
            Expression::Binary { op: BinaryOp::Multiply, .. }
        ));
    }

    #[test]
    fn binary_operators_associate_left() {
        let statement = parse_single_statement("r = a - b - c;");
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        let Expression::Binary { op: BinaryOp::Subtract, left, right, .. } = value else {
            panic!("expected - at the top");
        };
        assert!(matches!(
            *left,
            Expression::Binary { op: BinaryOp::Subtract, .. }
        ));
        assert_eq!(*right, access("c"));
    }

    #[test]
    fn dotted_chains_build_accesses_and_calls() {
        let statement = parse_single_statement("obj.field.run(1);");
        let Statement::Expression(expression) = statement else {
            panic!("expected expression statement");
        };
        let Expression::Function { receiver, name, arguments, .. } = expression else {
            panic!("expected method call");
        };
        assert_eq!(name, "run");
        assert_eq!(arguments.len(), 1);
        let receiver = receiver.expect("call has a receiver");
        assert_eq!(
            *receiver,
            Expression::Access {
                receiver: Some(Box::new(access("obj"))),
                name: "field".to_string(),
                variable: None,
            }
        );
    }

    #[test]
    fn decodes_literal_escapes() {
        let statement = parse_single_statement(r#"s = "a\tb\\c\"";"#);
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            Expression::literal(Literal::String("a\tb\\c\"".to_string()))
        );

        let statement = parse_single_statement(r"c = '\n';");
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        assert_eq!(value, Expression::literal(Literal::Character('\n')));
    }

    #[test]
    fn number_literals_keep_their_sign() {
        let statement = parse_single_statement("x = -5;");
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        assert_eq!(
            value,
            Expression::literal(Literal::Integer(BigInt::from(-5)))
        );
    }

    #[test]
    fn parses_for_statement_with_optional_slots() {
        let statement =
            parse_single_statement("FOR (i = 0; i < 10; i = i + 1) print(i); END");
        let Statement::For { initializer, increment, statements, .. } = statement else {
            panic!("expected for statement");
        };
        assert_eq!(initializer.expect("initializer").0, "i");
        assert_eq!(increment.expect("increment").0, "i");
        assert_eq!(statements.len(), 1);

        let statement = parse_single_statement("FOR (; running; ) step(); END");
        let Statement::For { initializer, increment, .. } = statement else {
            panic!("expected for statement");
        };
        assert!(initializer.is_none());
        assert!(increment.is_none());
    }

    #[test]
    fn field_after_method_is_rejected() {
        let err = parse("DEF main(): Integer DO RETURN 0; END LET x: Integer;")
            .expect_err("expected failure");
        assert_eq!(err.message, "Expected 'DEF'.");
        assert_eq!(err.index, 37);
    }

    #[test]
    fn error_uses_the_offending_token_index() {
        // The literal `1` at index 7 is not the expected ':'.
        let err = parse("LET x: 1;").expect_err("expected failure");
        assert_eq!(err, ParseError::new("Expected identifier.".to_string(), 7));
    }

    #[test]
    fn error_at_end_of_stream_points_past_the_last_token() {
        let err = parse("LET x: Integer").expect_err("expected failure");
        assert_eq!(err, ParseError::new("Expected ';'.".to_string(), 14));
    }

    #[test]
    fn rejects_trailing_comma_in_arguments() {
        let tokens = tokenize("f(1, );").expect("tokenize should succeed");
        let mut parser = Parser::new(tokens);
        let err = parser.parse_statement().expect_err("expected failure");
        assert_eq!(err.message, "Unexpected trailing comma before ')'.");
        assert_eq!(err.index, 5);
    }

    #[test]
    fn group_wraps_parenthesized_expressions() {
        let statement = parse_single_statement("x = (a + b) * c;");
        let Statement::Assignment { value, .. } = statement else {
            panic!("expected assignment");
        };
        let Expression::Binary { op: BinaryOp::Multiply, left, .. } = value else {
            panic!("expected * at the top");
        };
        assert!(matches!(*left, Expression::Group { .. }));
    }
}
