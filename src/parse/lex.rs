//! Tokenizing LC-3 assembly.
//!
//! The [`Tokenizer`] lazily turns source text into [`Token`]s, each carrying
//! its source coordinates (row, column, length) and the text of the line it
//! came from. There are only four token kinds: numbers, strings, end-of-line
//! markers, and invalid tokens left behind by lex errors.
//!
//! The raw lexing is done with a small [`logos`] lexer; the `Tokenizer`
//! wrapper layers on the line discipline:
//! - comments (`;` to end of line) vanish,
//! - blank and comment-only lines produce nothing at all,
//! - exactly one [`TokenKind::Eol`] separates non-empty logical lines,
//! - a comma is consumed together with the token before it and never
//!   surfaces,
//! - `:` and whitespace delimit tokens.
//!
//! Anything that parses as `[bBxX#]?-?digits` in the prefix's base becomes a
//! number; in liberal mode an extra leading `0` before the base prefix is
//! accepted (`0x1F`, `0b11`). Everything else is a string. String *literals*
//! span from an unescaped `"` to the next unescaped `"` or end of line;
//! backslash pairs are kept verbatim, since escape expansion is the
//! encoder's job.

use logos::{Lexer, Logos};

/// Errors raised while tokenizing.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum LexErr {
    /// String literal is missing an end quotation mark.
    UnclosedStrLit,
    /// A character the lexer has no token for.
    #[default]
    InvalidSymbol,
}

impl std::fmt::Display for LexErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LexErr::UnclosedStrLit => f.write_str("unclosed string literal"),
            LexErr::InvalidSymbol => f.write_str("unrecognized symbol"),
        }
    }
}
impl std::error::Error for LexErr {}
impl crate::err::Error for LexErr {
    fn help(&self) -> Option<std::borrow::Cow<str>> {
        match self {
            LexErr::UnclosedStrLit => Some("add a quote to the end of the string literal".into()),
            LexErr::InvalidSymbol => Some("this character does not start any token".into()),
        }
    }
}

/// The raw lexemes under the [`Tokenizer`].
#[derive(Debug, Logos, PartialEq)]
#[logos(skip r"[ \t:]+", error = LexErr)]
enum RawToken {
    #[regex(r"\r?\n")]
    Newline,

    #[regex(r";[^\r\n]*")]
    Comment,

    #[token(",")]
    Comma,

    /// A string literal. The callback consumes to the closing quote and
    /// yields the inner text with escapes untouched.
    #[token("\"", lex_str_literal)]
    StrLiteral(String),

    /// Any other run of non-delimiter characters.
    #[regex(r#"[^ \t\r\n,:;"]+"#)]
    Word,
}

fn lex_str_literal(lx: &mut Lexer<'_, RawToken>) -> Result<String, LexErr> {
    let rem = lx.remainder().lines().next().unwrap_or("");

    // Find the closing quote: the next '"' not preceded by a backslash.
    let close = rem
        .match_indices('"')
        .map(|(n, _)| n)
        .find(|&n| !matches!(rem.get((n.wrapping_sub(1))..(n + 1)), Some("\\\"")));

    match close {
        Some(len) => {
            lx.bump(len + 1);
            Ok(rem[..len].to_string())
        }
        None => {
            lx.bump(rem.len());
            Err(LexErr::UnclosedStrLit)
        }
    }
}

/// What a [`Token`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A numeric literal.
    Num(i32),
    /// Anything that is not a number: mnemonics, labels, registers,
    /// pseudo-ops, string literals.
    Str(String),
    /// The boundary between two non-empty logical lines.
    Eol,
    /// A lex error; the payload says what went wrong.
    Invalid(LexErr),
}

/// One lexeme with its source coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token's kind and payload.
    pub kind: TokenKind,
    /// Zero-based line number.
    pub row: u32,
    /// Zero-based column of the token's first character.
    pub col: u32,
    /// Length of the lexeme in bytes.
    pub len: u32,
    /// The text of the line the token came from.
    pub line: String,
}

/// A lazy producer of [`Token`]s.
pub struct Tokenizer<'s> {
    src: &'s str,
    raw: std::iter::Peekable<logos::SpannedIter<'s, RawToken>>,
    /// Byte index where each line starts.
    line_starts: Vec<usize>,
    liberal: bool,
    /// Whether anything has been produced since the last EOL.
    line_has_tokens: bool,
}

impl<'s> Tokenizer<'s> {
    /// Creates a tokenizer over `src`. Liberal mode admits `0x`/`0b`
    /// numeric prefixes.
    pub fn new(src: &'s str, liberal: bool) -> Self {
        let line_starts = std::iter::once(0)
            .chain(src.match_indices('\n').map(|(i, _)| i + 1))
            .collect();

        Tokenizer {
            src,
            raw: RawToken::lexer(src).spanned().peekable(),
            line_starts,
            liberal,
            line_has_tokens: false,
        }
    }

    /// The row containing byte index `pos`.
    fn row_of(&self, pos: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= pos) - 1
    }

    /// The text of line `row`, without its newline.
    fn line_text(&self, row: usize) -> &'s str {
        let start = self.line_starts[row];
        let end = self
            .line_starts
            .get(row + 1)
            .map(|&n| n - 1)
            .unwrap_or(self.src.len());
        self.src[start..end].trim_end_matches('\r')
    }

    fn token_at(&self, kind: TokenKind, span: std::ops::Range<usize>) -> Token {
        let row = self.row_of(span.start);
        Token {
            kind,
            row: row as u32,
            col: (span.start - self.line_starts[row]) as u32,
            len: span.len() as u32,
            line: self.line_text(row).to_string(),
        }
    }

    /// Consumes a comma directly following the token just produced.
    fn eat_trailing_comma(&mut self) {
        if matches!(self.raw.peek(), Some((Ok(RawToken::Comma), _))) {
            self.raw.next();
        }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some((raw, span)) = self.raw.next() else {
                // Terminate the final line if it produced anything.
                if self.line_has_tokens {
                    self.line_has_tokens = false;
                    let end = self.src.len();
                    return Some(self.token_at(TokenKind::Eol, end..end));
                }
                return None;
            };

            match raw {
                Ok(RawToken::Newline) => {
                    if self.line_has_tokens {
                        self.line_has_tokens = false;
                        return Some(self.token_at(TokenKind::Eol, span.start..span.start));
                    }
                }
                Ok(RawToken::Comment) => {}
                // A comma with nothing before it on the line; skip it.
                Ok(RawToken::Comma) => {}
                Ok(RawToken::StrLiteral(text)) => {
                    self.line_has_tokens = true;
                    self.eat_trailing_comma();
                    return Some(self.token_at(TokenKind::Str(text), span));
                }
                Ok(RawToken::Word) => {
                    self.line_has_tokens = true;
                    self.eat_trailing_comma();
                    let text = &self.src[span.clone()];
                    let kind = match convert_string_to_num(text, self.liberal) {
                        Some(n) => TokenKind::Num(n),
                        None => TokenKind::Str(text.to_string()),
                    };
                    return Some(self.token_at(kind, span));
                }
                Err(e) => {
                    self.line_has_tokens = true;
                    return Some(self.token_at(TokenKind::Invalid(e), span));
                }
            }
        }
    }
}

/// Tries to read `s` as a numeric literal: `[bBxX#]?-?digits`, where the
/// prefix selects the base (`b` = 2, `x` = 16, `#` or none = 10). Liberal
/// mode also strips a single leading `0` before a base prefix.
///
/// Returns `None` on bad digits for the base, an empty digit string, or
/// overflow out of `i32`.
pub(crate) fn convert_string_to_num(s: &str, liberal: bool) -> Option<i32> {
    let mut rest = s;

    if liberal {
        if let Some(stripped) = rest.strip_prefix('0') {
            if stripped.starts_with(['b', 'B', 'x', 'X']) {
                rest = stripped;
            }
        }
    }

    let base = match rest.chars().next()? {
        'b' | 'B' => {
            rest = &rest[1..];
            2
        }
        'x' | 'X' => {
            rest = &rest[1..];
            16
        }
        '#' => {
            rest = &rest[1..];
            10
        }
        _ => 10,
    };

    let negative = match rest.strip_prefix('-') {
        Some(r) => {
            rest = r;
            true
        }
        None => false,
    };

    if rest.is_empty() || !rest.chars().all(|c| c.is_digit(base)) {
        return None;
    }

    let magnitude = i64::from_str_radix(rest, base).ok()?;
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok()
}
