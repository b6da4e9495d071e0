use std::fmt;

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Int(i64),
    Float(f64),
    /// Quoted string; may itself contain placeholders.
    Str(String),
    /// Body of a `{...}` placeholder.
    Placeholder(String),
    True,
    False,
    Null,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Contains,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Int(n) => write!(f, "{}", n),
            Token::Float(n) => write!(f, "{}", n),
            Token::Str(s) => write!(f, "\"{}\"", s),
            Token::Placeholder(p) => write!(f, "{{{}}}", p),
            Token::True => f.write_str("true"),
            Token::False => f.write_str("false"),
            Token::Null => f.write_str("null"),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Percent => f.write_str("%"),
            Token::Bang => f.write_str("!"),
            Token::EqEq => f.write_str("=="),
            Token::NotEq => f.write_str("!="),
            Token::Lt => f.write_str("<"),
            Token::Le => f.write_str("<="),
            Token::Gt => f.write_str(">"),
            Token::Ge => f.write_str(">="),
            Token::And => f.write_str("&&"),
            Token::Or => f.write_str("||"),
            Token::Contains => f.write_str("contains"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

struct Lexer<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    i: usize,
}

/// Split a statement into tokens.
///
/// A lone `=` is read as `==`, and `===`/`!==` as `==`/`!=`; there is no
/// assignment operator.
pub fn tokenize(src: &str) -> Result<Vec<Spanned>, ExprError> {
    let mut lexer = Lexer {
        src,
        chars: src.char_indices().collect(),
        i: 0,
    };
    let mut tokens = Vec::new();
    while let Some(spanned) = lexer.next_token()? {
        tokens.push(spanned);
    }
    Ok(tokens)
}

impl<'a> Lexer<'a> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).map(|(_, c)| *c)
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.i + offset).map(|(_, c)| *c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.i).map_or(self.src.len(), |(pos, _)| *pos)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ExprError> {
        while self.peek().is_some_and(char::is_whitespace) {
            self.i += 1;
        }
        let pos = self.offset();
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '0'..='9' => self.number()?,
            '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
            '"' | '\'' => self.string(c)?,
            '{' => self.placeholder()?,
            'a'..='z' | 'A'..='Z' | '_' => self.word()?,
            _ => {
                self.i += 1;
                match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '=' => {
                        if self.eat('=') {
                            self.eat('=');
                        }
                        Token::EqEq
                    }
                    '!' => {
                        if self.eat('=') {
                            self.eat('=');
                            Token::NotEq
                        } else {
                            Token::Bang
                        }
                    }
                    '<' => {
                        if self.eat('=') {
                            Token::Le
                        } else {
                            Token::Lt
                        }
                    }
                    '>' => {
                        if self.eat('=') {
                            Token::Ge
                        } else {
                            Token::Gt
                        }
                    }
                    '&' if self.eat('&') => Token::And,
                    '|' if self.eat('|') => Token::Or,
                    '}' => return Err(ExprError::new(pos, "unmatched '}'")),
                    other => {
                        return Err(ExprError::new(pos, format!("unexpected character '{}'", other)))
                    }
                }
            }
        };
        Ok(Some(Spanned { token, pos }))
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let start = self.offset();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            match c {
                '0'..='9' => self.i += 1,
                '.' if !is_float => {
                    is_float = true;
                    self.i += 1;
                }
                'e' | 'E' => {
                    is_float = true;
                    self.i += 1;
                    if matches!(self.peek(), Some('+') | Some('-')) {
                        self.i += 1;
                    }
                }
                _ => break,
            }
        }
        let text = &self.src[start..self.offset()];
        if !is_float {
            if let Ok(n) = text.parse::<i64>() {
                return Ok(Token::Int(n));
            }
        }
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ExprError::new(start, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, quote: char) -> Result<Token, ExprError> {
        let start = self.offset();
        self.i += 1;
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ExprError::new(start, "unterminated string"));
            };
            self.i += 1;
            match c {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => {
                    let Some(escaped) = self.peek() else {
                        return Err(ExprError::new(start, "unterminated string"));
                    };
                    self.i += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        'r' => '\r',
                        other => other,
                    });
                }
                other => out.push(other),
            }
        }
    }

    /// `{path}` with at most one nested placeholder level: `{a.{b}}`.
    fn placeholder(&mut self) -> Result<Token, ExprError> {
        let start = self.offset();
        self.i += 1;
        let body_start = self.offset();
        let mut depth = 1;
        while let Some(c) = self.peek() {
            match c {
                '{' => {
                    depth += 1;
                    if depth > 2 {
                        return Err(ExprError::new(
                            self.offset(),
                            "placeholders nest at most one level deep",
                        ));
                    }
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.src[body_start..self.offset()].trim().to_string();
                        self.i += 1;
                        if body.is_empty() {
                            return Err(ExprError::new(start, "empty placeholder"));
                        }
                        return Ok(Token::Placeholder(body));
                    }
                }
                _ => {}
            }
            self.i += 1;
        }
        Err(ExprError::new(start, "unterminated placeholder"))
    }

    fn word(&mut self) -> Result<Token, ExprError> {
        let start = self.offset();
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.i += 1;
        }
        let word = &self.src[start..self.offset()];
        match word {
            "true" => Ok(Token::True),
            "false" => Ok(Token::False),
            "null" | "undefined" => Ok(Token::Null),
            "and" => Ok(Token::And),
            "or" => Ok(Token::Or),
            "not" => Ok(Token::Bang),
            "contains" => Ok(Token::Contains),
            other => Err(ExprError::new(
                start,
                format!("unknown identifier '{}' (reference values as {{path}})", other),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        tokenize(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_lone_equals_is_equality() {
        assert_eq!(
            kinds("{a} = 1"),
            vec![Token::Placeholder("a".into()), Token::EqEq, Token::Int(1)]
        );
        assert_eq!(kinds("1 === 1")[1], Token::EqEq);
        assert_eq!(kinds("1 !== 2")[1], Token::NotEq);
        assert_eq!(kinds("1 <= 2")[1], Token::Le);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42 3.5 .5 1e3"), vec![
            Token::Int(42),
            Token::Float(3.5),
            Token::Float(0.5),
            Token::Float(1000.0),
        ]);
    }

    #[test]
    fn test_strings_keep_braces_and_equals() {
        assert_eq!(kinds(r#"'a = {b}'"#), vec![Token::Str("a = {b}".into())]);
        assert_eq!(kinds(r#""say \"hi\"""#), vec![Token::Str("say \"hi\"".into())]);
    }

    #[test]
    fn test_nested_placeholder() {
        assert_eq!(
            kinds("{items.{state.i}}"),
            vec![Token::Placeholder("items.{state.i}".into())]
        );
        assert!(tokenize("{a.{b.{c}}}").is_err());
    }

    #[test]
    fn test_errors_carry_position() {
        let err = tokenize("{a} == foo").unwrap_err();
        assert_eq!(err.position, 7);
        assert!(tokenize("'open").is_err());
        assert!(tokenize("{a").is_err());
        assert!(tokenize("a & b").is_err());
        assert!(tokenize("1 }").is_err());
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            kinds("true and not false or null"),
            vec![Token::True, Token::And, Token::Bang, Token::False, Token::Or, Token::Null]
        );
    }
}
