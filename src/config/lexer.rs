//! Tokenizer for protobuf text format.

use super::parser::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    /// Unparsed numeric literal; sign is a separate `Symbol('-')`.
    Number(String),
    /// String literal with escapes decoded.
    Str(String),
    Symbol(char),
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Ident(s) => format!("'{}'", s),
            Token::Number(s) => format!("number {}", s),
            Token::Str(s) => format!("string {:?}", s),
            Token::Symbol(c) => format!("'{}'", c),
            Token::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub token: Token,
    pub pos: Pos,
}

/// Tokenize `text` completely; the last token is always `Eof`.
pub(crate) fn tokenize(text: &str) -> Result<Vec<Spanned>, ParseError> {
    Lexer::new(text).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn malformed(&self, pos: Pos, reason: impl Into<String>) -> ParseError {
        ParseError::MalformedText {
            reason: reason.into(),
            line: pos.line,
            column: pos.column,
        }
    }

    fn run(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut out = Vec::new();
        loop {
            self.skip_trivia();
            let pos = self.pos();
            let Some(&c) = self.chars.peek() else {
                out.push(Spanned {
                    token: Token::Eof,
                    pos,
                });
                return Ok(out);
            };

            let token = if c.is_ascii_alphabetic() || c == '_' {
                Token::Ident(self.take_while(|c| c.is_ascii_alphanumeric() || c == '_'))
            } else if c.is_ascii_digit() || c == '.' {
                self.number(pos)?
            } else if c == '"' || c == '\'' {
                Token::Str(self.string(pos)?)
            } else if "{}[]<>:,;-".contains(c) {
                self.bump();
                Token::Symbol(c)
            } else {
                return Err(self.malformed(pos, format!("unexpected character '{}'", c)));
            };
            out.push(Spanned { token, pos });
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if !pred(c) {
                break;
            }
            s.push(c);
            self.bump();
        }
        s
    }

    fn number(&mut self, pos: Pos) -> Result<Token, ParseError> {
        let mut s = String::new();
        let hex = {
            let mut ahead = self.chars.clone();
            ahead.next() == Some('0') && matches!(ahead.next(), Some('x' | 'X'))
        };
        while let Some(&c) = self.chars.peek() {
            let exponent_sign = (c == '+' || c == '-')
                && !hex
                && matches!(s.chars().last(), Some('e' | 'E'));
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || exponent_sign {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if s == "." {
            return Err(self.malformed(pos, "unexpected '.'"));
        }
        Ok(Token::Number(s))
    }

    fn string(&mut self, pos: Pos) -> Result<String, ParseError> {
        let Some(quote) = self.bump() else {
            return Err(self.malformed(pos, "unterminated string"));
        };
        // Bytes, so `\x` escapes can spell out multi-byte UTF-8 sequences.
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.malformed(pos, "unterminated string")),
                Some(c) if c == quote => {
                    return String::from_utf8(bytes)
                        .map_err(|_| self.malformed(pos, "string is not valid UTF-8"));
                }
                Some('\\') => {
                    let escape_pos = self.pos();
                    match self.bump() {
                        Some('n') => bytes.push(b'\n'),
                        Some('t') => bytes.push(b'\t'),
                        Some('r') => bytes.push(b'\r'),
                        Some('0') => bytes.push(0),
                        Some('\\') => bytes.push(b'\\'),
                        Some('"') => bytes.push(b'"'),
                        Some('\'') => bytes.push(b'\''),
                        Some('x') => {
                            let mut hex = String::new();
                            while hex.len() < 2 {
                                match self.chars.peek() {
                                    Some(&c) if c.is_ascii_hexdigit() => {
                                        hex.push(c);
                                        self.bump();
                                    }
                                    _ => break,
                                }
                            }
                            let byte = u8::from_str_radix(&hex, 16)
                                .map_err(|_| self.malformed(escape_pos, "invalid \\x escape"))?;
                            bytes.push(byte);
                        }
                        Some(other) => {
                            return Err(self.malformed(
                                escape_pos,
                                format!("unknown escape '\\{}'", other),
                            ));
                        }
                        None => return Err(self.malformed(pos, "unterminated string")),
                    }
                }
                Some(c) => bytes.extend_from_slice(c.encode_utf8(&mut [0; 4]).as_bytes()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(text: &str) -> Vec<Token> {
        tokenize(text).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            tokens("train { batch_size: 1000 } # trailing"),
            vec![
                Token::Ident("train".into()),
                Token::Symbol('{'),
                Token::Ident("batch_size".into()),
                Token::Symbol(':'),
                Token::Number("1000".into()),
                Token::Symbol('}'),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokens("1e-3 .5 0x1F 2.5f"),
            vec![
                Token::Number("1e-3".into()),
                Token::Number(".5".into()),
                Token::Number("0x1F".into()),
                Token::Number("2.5f".into()),
                Token::Eof,
            ]
        );
        assert_eq!(
            tokens("-4"),
            vec![Token::Symbol('-'), Token::Number("4".into()), Token::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            tokens(r#""a\"b\n" 'c\x41'"#),
            vec![
                Token::Str("a\"b\n".into()),
                Token::Str("cA".into()),
                Token::Eof
            ]
        );
    }

    #[test]
    fn test_hex_escapes_decode_as_utf8() {
        assert_eq!(
            tokens(r#""caf\xc3\xa9" "\xe2\x82\xac5""#),
            vec![
                Token::Str("café".into()),
                Token::Str("€5".into()),
                Token::Eof
            ]
        );
        let err = tokenize(r#"name: "\xe9t\xe9""#).unwrap_err();
        assert!(matches!(err, ParseError::MalformedText { line: 1, column: 7, .. }));
    }

    #[test]
    fn test_positions() {
        let spanned = tokenize("a:\n  b").unwrap();
        assert_eq!(spanned[2].pos, Pos { line: 2, column: 3 });
    }

    #[test]
    fn test_unterminated_string() {
        let err = tokenize("path: \"oops").unwrap_err();
        assert!(matches!(err, ParseError::MalformedText { line: 1, .. }));
    }

    #[test]
    fn test_unexpected_character() {
        assert!(tokenize("a: @").is_err());
    }
}
