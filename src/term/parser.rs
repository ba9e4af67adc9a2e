//! Recursive descent parser over the KIF token stream.
//!
//! Top level parses a sequence of terms; `(` opens a list, `"` an escaped
//! string atom, `?` a variable, `;` a line comment. Errors carry the
//! 1-based line and column of the offending token.

use text_size::TextSize;
use thiserror::Error;

use super::lexer::{Lexer, Token, TokenKind};
use super::Term;

/// A malformed S-expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at {line}:{col}: {message}")]
pub struct ParseError {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

/// Byte-offset to 1-based line/column conversion.
struct LineIndex {
    line_starts: Vec<u32>,
}

impl LineIndex {
    fn new(input: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in input.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        Self { line_starts }
    }

    fn line_col(&self, offset: TextSize) -> (u32, u32) {
        let offset: u32 = offset.into();
        let line = self
            .line_starts
            .partition_point(|&start| start <= offset)
            .saturating_sub(1);
        (line as u32 + 1, offset - self.line_starts[line] + 1)
    }
}

struct Parser<'a> {
    tokens: Vec<Token<'a>>,
    pos: usize,
    lines: LineIndex,
    end: TextSize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        let tokens: Vec<Token<'a>> = Lexer::new(input)
            .filter(|t| !matches!(t.kind, TokenKind::Whitespace | TokenKind::Comment))
            .collect();
        Self {
            tokens,
            pos: 0,
            lines: LineIndex::new(input),
            end: TextSize::new(input.len() as u32),
        }
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, offset: TextSize, message: impl Into<String>) -> ParseError {
        let (line, col) = self.lines.line_col(offset);
        ParseError {
            line,
            col,
            message: message.into(),
        }
    }

    fn error_eof(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.end, message)
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        let Some(token) = self.bump() else {
            return Err(self.error_eof("unexpected end of input"));
        };
        match token.kind {
            TokenKind::LParen => self.list(token.offset),
            TokenKind::Str => self.string_atom(&token),
            TokenKind::UnterminatedStr => {
                Err(self.error_at(token.offset, "unterminated string literal"))
            }
            TokenKind::Variable => {
                if token.text.len() < 2 {
                    Err(self.error_at(token.offset, "empty variable name"))
                } else {
                    Ok(Term::var(token.text))
                }
            }
            TokenKind::Symbol => Ok(Term::atom(token.text)),
            TokenKind::RParen => Err(self.error_at(token.offset, "unexpected ')'")),
            TokenKind::Error => Err(self.error_at(
                token.offset,
                format!("invalid character {:?}", token.text),
            )),
            TokenKind::Whitespace | TokenKind::Comment => unreachable!("trivia filtered"),
        }
    }

    fn list(&mut self, open: TextSize) -> Result<Term, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None => {
                    return Err(self.error_at(open, "unclosed '(' before end of input"));
                }
                Some(token) if token.kind == TokenKind::RParen => {
                    self.bump();
                    return Ok(Term::list(items));
                }
                Some(_) => items.push(self.term()?),
            }
        }
    }

    fn string_atom(&self, token: &Token<'a>) -> Result<Term, ParseError> {
        let body = &token.text[1..token.text.len() - 1];
        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars();
        while let Some(c) = chars.next() {
            if c != '\\' {
                out.push(c);
                continue;
            }
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('\\') => out.push('\\'),
                Some('"') => out.push('"'),
                other => {
                    let shown = other.map(String::from).unwrap_or_default();
                    return Err(self.error_at(
                        token.offset,
                        format!("invalid escape \\{shown} in string"),
                    ));
                }
            }
        }
        Ok(Term::atom(&out))
    }
}

/// Parse every top-level term in `input`.
pub fn parse_all(input: &str) -> Result<Vec<Term>, ParseError> {
    let mut parser = Parser::new(input);
    let mut terms = Vec::new();
    while parser.peek().is_some() {
        terms.push(parser.term()?);
    }
    Ok(terms)
}

/// Parse exactly one term; trailing content is an error.
pub fn parse_one(input: &str) -> Result<Term, ParseError> {
    let mut parser = Parser::new(input);
    let term = parser.term()?;
    if let Some(extra) = parser.peek() {
        return Err(parser.error_at(extra.offset, "trailing content after term"));
    }
    Ok(term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_lists() {
        let t = parse_one("(=> (and (p ?x) (q ?x)) (r ?x))").unwrap();
        assert_eq!(t.operator().unwrap().as_str(), "=>");
        assert_eq!(t.len(), 3);
        assert_eq!(t.get(1).unwrap().operator().unwrap().as_str(), "and");
    }

    #[test]
    fn parses_strings_with_escapes() {
        let t = parse_one(r#"(says Alice "line\none \"two\"")"#).unwrap();
        assert_eq!(
            t.get(2).unwrap().as_atom().unwrap().as_str(),
            "line\none \"two\""
        );
    }

    #[test]
    fn parses_multiple_top_level_terms() {
        let terms = parse_all("(p A) ; comment\n(q B)").unwrap();
        assert_eq!(terms.len(), 2);
        assert_eq!(terms[1].to_string(), "(q B)");
    }

    #[test]
    fn empty_variable_is_rejected() {
        let err = parse_one("(p ?)").unwrap_err();
        assert!(err.message.contains("empty variable"));
        assert_eq!((err.line, err.col), (1, 4));
    }

    #[test]
    fn unclosed_list_is_rejected() {
        let err = parse_one("(p (q A)").unwrap_err();
        assert!(err.message.contains("unclosed"));
    }

    #[test]
    fn unterminated_string_is_rejected() {
        let err = parse_one("(p \"oops").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn error_positions_are_line_based() {
        let err = parse_all("(p A)\n(q ?)").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn round_trip_examples() {
        for src in [
            "(subclass Dog Mammal)",
            "(=> (and (p ?x) (q ?x)) (r ?x))",
            "(says Alice \"two words\")",
            "(not (alive Socrates))",
            "(forall (?x ?y) (=> (parent ?x ?y) (child ?y ?x)))",
        ] {
            let t = parse_one(src).unwrap();
            assert_eq!(parse_one(&t.to_string()).unwrap(), t);
        }
    }
}
