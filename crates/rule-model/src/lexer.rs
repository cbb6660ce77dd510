// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::{ast::Quote, error::ParseError};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// A path or keyword, e.g. `@request.auth.id`, `client.owner`, `true`, `NOT`
    Ident(String),
    String { value: String, quote: Quote },
    Number(String),
    /// `:name` immediately following a path
    Modifier(String),
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    AnyEq,
    AnyNeq,
    AnyLt,
    AnyLte,
    AnyGt,
    AnyGte,
    And,
    Or,
    LParen,
    RParen,
}

impl TokenKind {
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(ident) => format!("'{ident}'"),
            TokenKind::String { .. } => "string".to_string(),
            TokenKind::Number(raw) => format!("number '{raw}'"),
            TokenKind::Modifier(name) => format!("':{name}'"),
            TokenKind::Eq => "'='".to_string(),
            TokenKind::Neq => "'!='".to_string(),
            TokenKind::Lt => "'<'".to_string(),
            TokenKind::Lte => "'<='".to_string(),
            TokenKind::Gt => "'>'".to_string(),
            TokenKind::Gte => "'>='".to_string(),
            TokenKind::AnyEq => "'?='".to_string(),
            TokenKind::AnyNeq => "'?!='".to_string(),
            TokenKind::AnyLt => "'?<'".to_string(),
            TokenKind::AnyLte => "'?<='".to_string(),
            TokenKind::AnyGt => "'?>'".to_string(),
            TokenKind::AnyGte => "'?>='".to_string(),
            TokenKind::And => "'&&'".to_string(),
            TokenKind::Or => "'||'".to_string(),
            TokenKind::LParen => "'('".to_string(),
            TokenKind::RParen => "')'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token's first character
    pub offset: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        source,
        chars: source.char_indices().peekable(),
        previous_end: None,
    };
    let mut tokens = vec![];
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

struct Lexer<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    /// Offset just past the previous token
    previous_end: Option<usize>,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '@'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

impl Lexer<'_> {
    fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        self.skip_trivia();

        let Some((offset, c)) = self.chars.next() else {
            return Ok(None);
        };

        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '=' => TokenKind::Eq,
            '!' if self.eat('=') => TokenKind::Neq,
            '<' if self.eat('=') => TokenKind::Lte,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Gte,
            '>' => TokenKind::Gt,
            '?' => self.any_operator(offset)?,
            '&' if self.eat('&') => TokenKind::And,
            '|' if self.eat('|') => TokenKind::Or,
            '"' => self.string(offset, Quote::Double)?,
            '\'' => self.string(offset, Quote::Single)?,
            ':' => self.modifier(offset)?,
            c if c.is_ascii_digit() => self.number(offset),
            '-' | '+' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number(offset),
            c if is_ident_start(c) => {
                let end = self.take_while(is_ident_continue);
                TokenKind::Ident(self.source[offset..end].to_string())
            }
            c => {
                return Err(ParseError::UnexpectedToken {
                    found: format!("'{c}'"),
                    offset,
                });
            }
        };

        self.previous_end = Some(self.position());
        Ok(Some(Token { kind, offset }))
    }

    fn position(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.source.len(), |(offset, _)| *offset)
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some((_, c)) if c.is_whitespace() => {
                    self.chars.next();
                }
                Some((offset, '/')) if self.source[*offset..].starts_with("//") => {
                    self.take_while(|c| c != '\n');
                }
                _ => return,
            }
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    /// Consume characters while `predicate` holds. Returns the offset just past the last
    /// consumed character.
    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> usize {
        while let Some((_, c)) = self.chars.peek() {
            if !predicate(*c) {
                break;
            }
            self.chars.next();
        }
        self.position()
    }

    fn any_operator(&mut self, offset: usize) -> Result<TokenKind, ParseError> {
        let kind = match self.peek() {
            Some('=') => TokenKind::AnyEq,
            Some('!') => {
                self.chars.next();
                if self.peek() != Some('=') {
                    return Err(ParseError::UnexpectedToken {
                        found: "'?!'".to_string(),
                        offset,
                    });
                }
                TokenKind::AnyNeq
            }
            Some('<') => {
                self.chars.next();
                return Ok(if self.eat('=') {
                    TokenKind::AnyLte
                } else {
                    TokenKind::AnyLt
                });
            }
            Some('>') => {
                self.chars.next();
                return Ok(if self.eat('=') {
                    TokenKind::AnyGte
                } else {
                    TokenKind::AnyGt
                });
            }
            _ => {
                return Err(ParseError::UnexpectedToken {
                    found: "'?'".to_string(),
                    offset,
                });
            }
        };
        self.chars.next();
        Ok(kind)
    }

    fn string(&mut self, offset: usize, quote: Quote) -> Result<TokenKind, ParseError> {
        let delimiter = match quote {
            Quote::Double => '"',
            Quote::Single => '\'',
        };

        let mut value = String::new();
        loop {
            match self.chars.next() {
                None => return Err(ParseError::UnterminatedString { offset }),
                Some((_, c)) if c == delimiter => break,
                Some((escape_offset, '\\')) => match self.chars.next() {
                    Some((_, c)) if c == '\\' || c == '"' || c == '\'' => value.push(c),
                    Some((_, c)) => {
                        return Err(ParseError::InvalidEscape {
                            escape: c,
                            offset: escape_offset,
                        });
                    }
                    None => return Err(ParseError::UnterminatedString { offset }),
                },
                Some((_, c)) => value.push(c),
            }
        }

        Ok(TokenKind::String { value, quote })
    }

    fn number(&mut self, offset: usize) -> TokenKind {
        let mut end = self.take_while(|c| c.is_ascii_digit());
        if self.peek() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|(_, c)| c.is_ascii_digit()) {
                self.chars.next();
                end = self.take_while(|c| c.is_ascii_digit());
            }
        }
        TokenKind::Number(self.source[offset..end].to_string())
    }

    /// A modifier is attached to the path right before it: `tags:length`, never `tags :length`.
    fn modifier(&mut self, offset: usize) -> Result<TokenKind, ParseError> {
        let attached = self.previous_end == Some(offset);
        if !attached || !self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(ParseError::UnexpectedToken {
                found: "':'".to_string(),
                offset,
            });
        }
        let start = offset + 1;
        let end = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        Ok(TokenKind::Modifier(self.source[start..end].to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn operators() {
        assert_eq!(
            kinds("= != < <= > >= ?= ?!= ?< ?<= ?> ?>= && || ( )"),
            vec![
                TokenKind::Eq,
                TokenKind::Neq,
                TokenKind::Lt,
                TokenKind::Lte,
                TokenKind::Gt,
                TokenKind::Gte,
                TokenKind::AnyEq,
                TokenKind::AnyNeq,
                TokenKind::AnyLt,
                TokenKind::AnyLte,
                TokenKind::AnyGt,
                TokenKind::AnyGte,
                TokenKind::And,
                TokenKind::Or,
                TokenKind::LParen,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn paths_modifiers_and_literals() {
        assert_eq!(
            kinds(r#"@request.body.tags:length>=2 && name='O\'Brien' || n = -1.5"#),
            vec![
                TokenKind::Ident("@request.body.tags".into()),
                TokenKind::Modifier("length".into()),
                TokenKind::Gte,
                TokenKind::Number("2".into()),
                TokenKind::And,
                TokenKind::Ident("name".into()),
                TokenKind::Eq,
                TokenKind::String {
                    value: "O'Brien".into(),
                    quote: Quote::Single
                },
                TokenKind::Or,
                TokenKind::Ident("n".into()),
                TokenKind::Eq,
                TokenKind::Number("-1.5".into()),
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("uid = \"u1\" // owner only\n&& true"),
            vec![
                TokenKind::Ident("uid".into()),
                TokenKind::Eq,
                TokenKind::String {
                    value: "u1".into(),
                    quote: Quote::Double
                },
                TokenKind::And,
                TokenKind::Ident("true".into()),
            ]
        );
    }

    #[test]
    fn offsets() {
        let tokens = tokenize("a  != 'x'").unwrap();
        let offsets: Vec<_> = tokens.iter().map(|token| token.offset).collect();
        assert_eq!(offsets, vec![0, 3, 6]);
    }

    #[test]
    fn errors() {
        assert_eq!(
            tokenize(r#"name = "abc"#),
            Err(ParseError::UnterminatedString { offset: 7 })
        );
        assert_eq!(
            tokenize(r#"name = "a\nb""#),
            Err(ParseError::InvalidEscape {
                escape: 'n',
                offset: 9
            })
        );
        assert_eq!(
            tokenize("a # b"),
            Err(ParseError::UnexpectedToken {
                found: "'#'".into(),
                offset: 2
            })
        );
        assert_eq!(
            tokenize("tags :length > 0"),
            Err(ParseError::UnexpectedToken {
                found: "':'".into(),
                offset: 5
            })
        );
        assert_eq!(
            tokenize(":length"),
            Err(ParseError::UnexpectedToken {
                found: "':'".into(),
                offset: 0
            })
        );
        assert_eq!(
            tokenize("a & b"),
            Err(ParseError::UnexpectedToken {
                found: "'&'".into(),
                offset: 2
            })
        );
    }
}
