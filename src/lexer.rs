use crate::error::ParseError;
use crate::token::{Token, TokenKind};

const ESCAPABLE: &str = "bnrt'\"\\";

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    /// Lexes the next token, skipping any leading whitespace. Returns `None`
    /// once the input is exhausted.
    pub fn next_token(&mut self) -> Result<Option<Token<'a>>, ParseError> {
        self.consume_while(char::is_whitespace);

        let start = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(None);
        };

        let token = match ch {
            c if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            c if c.is_ascii_digit() => self.read_number(start),
            '+' | '-' if self.char_at(self.pos + 1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number(start)
            }
            '\'' => self.read_character(start)?,
            '"' => self.read_string(start)?,
            _ => self.read_operator(start),
        };
        Ok(Some(token))
    }

    fn read_identifier(&mut self, start: usize) -> Token<'a> {
        self.consume_char();
        self.consume_while(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        self.emit(TokenKind::Identifier, start)
    }

    fn read_number(&mut self, start: usize) -> Token<'a> {
        if matches!(self.peek_char(), Some('+' | '-')) {
            self.consume_char();
        }
        self.consume_while(|c| c.is_ascii_digit());

        // A '.' only belongs to the number when a digit follows; otherwise it
        // is left for the next token (an operator).
        if self.peek_char() == Some('.')
            && self.char_at(self.pos + 1).is_some_and(|c| c.is_ascii_digit())
        {
            self.consume_char();
            self.consume_while(|c| c.is_ascii_digit());
            return self.emit(TokenKind::Decimal, start);
        }
        self.emit(TokenKind::Integer, start)
    }

    fn read_character(&mut self, start: usize) -> Result<Token<'a>, ParseError> {
        self.consume_char();
        match self.peek_char() {
            Some('\\') => {
                self.consume_char();
                self.read_escape()?;
            }
            Some('\'') | None => {
                return Err(ParseError::new("Expected a character literal", self.pos));
            }
            Some(_) => {
                self.consume_char();
            }
        }
        if self.peek_char() != Some('\'') {
            return Err(ParseError::new(
                "Expected ''' to close character literal",
                self.pos,
            ));
        }
        self.consume_char();
        Ok(self.emit(TokenKind::Character, start))
    }

    fn read_string(&mut self, start: usize) -> Result<Token<'a>, ParseError> {
        self.consume_char();
        loop {
            match self.peek_char() {
                None => return Err(ParseError::new("Unterminated string literal", self.pos)),
                Some('\n') => {
                    return Err(ParseError::new(
                        "String literal contains a literal newline",
                        self.pos,
                    ));
                }
                Some('"') => {
                    self.consume_char();
                    return Ok(self.emit(TokenKind::String, start));
                }
                Some('\\') => {
                    self.consume_char();
                    self.read_escape()?;
                }
                Some(_) => {
                    self.consume_char();
                }
            }
        }
    }

    fn read_escape(&mut self) -> Result<(), ParseError> {
        let index = self.pos;
        match self.consume_char() {
            Some(c) if ESCAPABLE.contains(c) => Ok(()),
            _ => Err(ParseError::new("Invalid escape sequence", index)),
        }
    }

    fn read_operator(&mut self, start: usize) -> Token<'a> {
        let Some(ch) = self.consume_char() else {
            return self.emit(TokenKind::Operator, start);
        };
        // Maximal munch: ';' stands alone, then the two-character operators.
        let next = self.peek_char();
        let compound = match ch {
            '<' | '>' | '!' | '=' => next == Some('='),
            '&' => next == Some('&'),
            '|' => next == Some('|'),
            _ => false,
        };
        if compound {
            self.consume_char();
        }
        self.emit(TokenKind::Operator, start)
    }

    fn emit(&self, kind: TokenKind, start: usize) -> Token<'a> {
        Token::new(kind, &self.input[start..self.pos], start)
    }

    fn consume_while<P>(&mut self, keep_predicate: P)
    where
        P: Fn(char) -> bool,
    {
        while let Some(c) = self.peek_char() {
            if !keep_predicate(c) {
                break;
            }
            self.consume_char();
        }
    }

    fn char_at(&self, index: usize) -> Option<char> {
        if index >= self.input.len() {
            None
        } else {
            self.input[index..].chars().next()
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.char_at(self.pos)
    }

    fn consume_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, ParseError> {
    Lexer::new(input).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_literals<'a>(tokens: &[Token<'a>]) -> Vec<(TokenKind, &'a str, usize)> {
        tokens
            .iter()
            .map(|token| (token.kind, token.literal, token.index))
            .collect()
    }

    #[test]
    fn lexes_declaration() {
        let tokens = tokenize("LET x = 1;").expect("tokenize should succeed");
        let expected = vec![
            (TokenKind::Identifier, "LET", 0),
            (TokenKind::Identifier, "x", 4),
            (TokenKind::Operator, "=", 6),
            (TokenKind::Integer, "1", 8),
            (TokenKind::Operator, ";", 9),
        ];
        assert_eq!(kinds_and_literals(&tokens), expected);
    }

    #[test]
    fn signed_decimal_is_one_token() {
        let tokens = tokenize("-1.5").expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![(TokenKind::Decimal, "-1.5", 0)]
        );
    }

    #[test]
    fn detached_sign_is_an_operator() {
        let tokens = tokenize("- 1").expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![(TokenKind::Operator, "-", 0), (TokenKind::Integer, "1", 2)]
        );
    }

    #[test]
    fn trailing_dot_stays_out_of_the_number() {
        let tokens = tokenize("1.toString()").expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![
                (TokenKind::Integer, "1", 0),
                (TokenKind::Operator, ".", 1),
                (TokenKind::Identifier, "toString", 2),
                (TokenKind::Operator, "(", 10),
                (TokenKind::Operator, ")", 11),
            ]
        );
    }

    #[test]
    fn identifiers_may_contain_hyphens() {
        let tokens = tokenize("foo-bar _x2").expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![
                (TokenKind::Identifier, "foo-bar", 0),
                (TokenKind::Identifier, "_x2", 8),
            ]
        );
    }

    #[test]
    fn compound_operators_use_maximal_munch() {
        let tokens = tokenize("<= >= == != && || < ! &").expect("tokenize should succeed");
        let literals = tokens.iter().map(|token| token.literal).collect::<Vec<_>>();
        assert_eq!(literals, vec!["<=", ">=", "==", "!=", "&&", "||", "<", "!", "&"]);
    }

    #[test]
    fn character_literal_with_escape() {
        let tokens = tokenize(r"'\n'").expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![(TokenKind::Character, r"'\n'", 0)]
        );
    }

    #[test]
    fn string_literal_preserves_escapes_verbatim() {
        let tokens = tokenize(r#""a\"b""#).expect("tokenize should succeed");
        assert_eq!(
            kinds_and_literals(&tokens),
            vec![(TokenKind::String, r#""a\"b""#, 0)]
        );
    }

    #[test]
    fn errors_on_empty_character_literal() {
        let err = tokenize("''").expect_err("expected failure");
        assert_eq!(err.index, 1);
    }

    #[test]
    fn errors_on_unclosed_character_literal() {
        let err = tokenize("'ab'").expect_err("expected failure");
        assert_eq!(err.index, 2);
    }

    #[test]
    fn errors_on_invalid_escape() {
        let err = tokenize(r#""a\q""#).expect_err("expected failure");
        assert_eq!(err, ParseError::new("Invalid escape sequence", 3));
    }

    #[test]
    fn errors_on_unterminated_string() {
        let err = tokenize("\"abc").expect_err("expected failure");
        assert_eq!(err, ParseError::new("Unterminated string literal", 4));
    }

    #[test]
    fn errors_on_newline_inside_string() {
        let err = tokenize("\"ab\ncd\"").expect_err("expected failure");
        assert_eq!(err.index, 3);
    }

    #[test]
    fn relexing_a_literal_yields_the_same_token() {
        let source = r#"LET s = "a\tb"; LET c = '\''; LET n = -42;"#;
        for token in tokenize(source).expect("tokenize should succeed") {
            let relexed = tokenize(token.literal).expect("re-lex should succeed");
            assert_eq!(relexed.len(), 1);
            assert_eq!(relexed[0].kind, token.kind);
            assert_eq!(relexed[0].literal, token.literal);
        }
    }
}
