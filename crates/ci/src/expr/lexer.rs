//! Tokenizer for expression source.

use super::ExprError;
use super::value::parse_number;
use miette::SourceSpan;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Ident(String),
    Str(String),
    Number(f64),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    Comma,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Eof,
}

#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset into the full source
    pub offset: usize,
    pub len: usize,
}

impl Token {
    pub fn span(&self) -> SourceSpan {
        (self.offset, self.len.max(1)).into()
    }
}

/// Tokenize `source[start..end]`; offsets in the result refer to `source`.
pub(crate) fn tokenize(source: &str, start: usize, end: usize) -> Result<Vec<Token>, ExprError> {
    let text = &source[start..end];
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let begin = i;
        let kind = match c {
            b'(' => {
                i += 1;
                TokenKind::LParen
            }
            b')' => {
                i += 1;
                TokenKind::RParen
            }
            b'[' => {
                i += 1;
                TokenKind::LBracket
            }
            b']' => {
                i += 1;
                TokenKind::RBracket
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                i += 1;
                TokenKind::Dot
            }
            b',' => {
                i += 1;
                TokenKind::Comma
            }
            b'!' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Ne
            }
            b'!' => {
                i += 1;
                TokenKind::Not
            }
            b'=' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Eq
            }
            b'<' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Le
            }
            b'<' => {
                i += 1;
                TokenKind::Lt
            }
            b'>' if bytes.get(i + 1) == Some(&b'=') => {
                i += 2;
                TokenKind::Ge
            }
            b'>' => {
                i += 1;
                TokenKind::Gt
            }
            b'&' if bytes.get(i + 1) == Some(&b'&') => {
                i += 2;
                TokenKind::And
            }
            b'|' if bytes.get(i + 1) == Some(&b'|') => {
                i += 2;
                TokenKind::Or
            }
            b'\'' => {
                let (value, next) = lex_string(source, start, text, i)?;
                i = next;
                TokenKind::Str(value)
            }
            b'0'..=b'9' | b'.' | b'-' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && (bytes[j].is_ascii_alphanumeric()
                        || bytes[j] == b'.'
                        || ((bytes[j] == b'-' || bytes[j] == b'+')
                            && matches!(bytes[j - 1], b'e' | b'E')))
                {
                    j += 1;
                }
                let literal = &text[i..j];
                let value = parse_number(literal).filter(|_| literal != "-").ok_or_else(|| {
                    ExprError::syntax(
                        source,
                        (start + i, j - i).into(),
                        format!("invalid number `{literal}`"),
                    )
                })?;
                i = j;
                TokenKind::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                let mut j = i + 1;
                while j < bytes.len()
                    && (bytes[j].is_ascii_alphanumeric() || bytes[j] == b'_' || bytes[j] == b'-')
                {
                    j += 1;
                }
                let word = &text[i..j];
                i = j;
                match word {
                    "true" => TokenKind::True,
                    "false" => TokenKind::False,
                    "null" => TokenKind::Null,
                    _ => TokenKind::Ident(word.to_string()),
                }
            }
            _ => {
                let ch = text[i..].chars().next().unwrap_or('?');
                return Err(ExprError::syntax(
                    source,
                    (start + i, ch.len_utf8()).into(),
                    format!("unexpected character `{ch}`"),
                ));
            }
        };

        tokens.push(Token {
            kind,
            offset: start + begin,
            len: i - begin,
        });
    }

    tokens.push(Token {
        kind: TokenKind::Eof,
        offset: end,
        len: 0,
    });
    Ok(tokens)
}

/// Lex a single-quoted string starting at `text[i]`; `''` escapes a quote.
fn lex_string(
    source: &str,
    start: usize,
    text: &str,
    i: usize,
) -> Result<(String, usize), ExprError> {
    let mut value = String::new();
    let mut chars = text[i + 1..].char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        if ch == '\'' {
            if chars.peek().is_some_and(|(_, next)| *next == '\'') {
                chars.next();
                value.push('\'');
                continue;
            }
            return Ok((value, i + 1 + pos + 1));
        }
        value.push(ch);
    }
    Err(ExprError::syntax(
        source,
        (start + i, text.len() - i).into(),
        "unterminated string literal".to_string(),
    ))
}
