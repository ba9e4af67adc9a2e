//! Logos-based lexer for the KIF surface syntax.

use logos::Logos;
use text_size::TextSize;

/// A token with its kind, text and byte offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub offset: TextSize,
}

/// Lexer wrapping the logos-generated tokenizer.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, LogosToken>,
    offset: u32,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            inner: LogosToken::lexer(input),
            offset: 0,
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let logos_token = self.inner.next()?;
        let text = self.inner.slice();
        let offset = TextSize::new(self.offset);
        self.offset += text.len() as u32;

        let kind = match logos_token {
            Ok(t) => t.into(),
            Err(()) => TokenKind::Error,
        };

        Some(Token { kind, text, offset })
    }
}

/// Token kinds the parser consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Whitespace,
    Comment,
    LParen,
    RParen,
    /// A complete quoted string, including both quotes.
    Str,
    /// A quoted string that never closed before end of input.
    UnterminatedStr,
    /// `?name` (possibly just `?`, rejected by the parser).
    Variable,
    Symbol,
    Error,
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogosToken {
    #[regex(r"[ \t\r\n]+")]
    Whitespace,

    #[regex(r";[^\n]*")]
    Comment,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[regex(r#""([^"\\]|\\.)*""#, priority = 3)]
    Str,

    #[regex(r#""([^"\\]|\\.)*"#, priority = 2)]
    UnterminatedStr,

    #[regex(r#"\?[^ \t\r\n()";]*"#)]
    Variable,

    #[regex(r#"[^ \t\r\n()";?][^ \t\r\n()";]*"#)]
    Symbol,
}

impl From<LogosToken> for TokenKind {
    fn from(t: LogosToken) -> TokenKind {
        match t {
            LogosToken::Whitespace => TokenKind::Whitespace,
            LogosToken::Comment => TokenKind::Comment,
            LogosToken::LParen => TokenKind::LParen,
            LogosToken::RParen => TokenKind::RParen,
            LogosToken::Str => TokenKind::Str,
            LogosToken::UnterminatedStr => TokenKind::UnterminatedStr,
            LogosToken::Variable => TokenKind::Variable,
            LogosToken::Symbol => TokenKind::Symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .filter(|t| t.kind != TokenKind::Whitespace)
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn lexes_basic_forms() {
        assert_eq!(
            kinds("(subclass Dog ?x)"),
            [
                TokenKind::LParen,
                TokenKind::Symbol,
                TokenKind::Symbol,
                TokenKind::Variable,
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn lexes_strings_and_comments() {
        assert_eq!(
            kinds("\"a b\" ; trailing\nx"),
            [TokenKind::Str, TokenKind::Comment, TokenKind::Symbol]
        );
    }

    #[test]
    fn unterminated_string_is_flagged() {
        assert_eq!(kinds("\"oops"), [TokenKind::UnterminatedStr]);
    }

    #[test]
    fn operators_are_symbols() {
        assert_eq!(kinds("=> <=> ="), [TokenKind::Symbol; 3]);
    }
}
