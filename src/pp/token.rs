//! Raw preprocessor tokens.
//!
//! The preprocessor runs over its own token stream, not the GLSL lexer's:
//! it must keep whitespace and newlines (directives are line-oriented) and
//! treat every word uniformly, keywords included. Macro bodies additionally
//! carry the [`PTok::Arg`] and [`PTok::Paste`] markers resolved at
//! definition time.

use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum PTok {
    /// Identifier or keyword.
    Word(String),
    /// Any numeric literal, kept as raw text.
    Number(String),
    /// String literal with quotes.
    Str(String),
    /// Character literal with quotes.
    CharLit(String),
    /// Operator or punctuation.
    Punct(&'static str),
    /// Horizontal whitespace and comments, collapsed.
    Whitespace,
    Newline,
    /// Macro parameter substitution marker, resolved at `#define` time.
    /// `stringize` marks a `#param` use.
    Arg { index: usize, stringize: bool },
    /// `##` between two body tokens.
    Paste,
    /// A character that fits no token.
    Other(char),
}

impl PTok {
    pub fn word(text: impl Into<String>) -> Self {
        Self::Word(text.into())
    }

    /// True for whitespace and newlines.
    pub fn is_space(&self) -> bool {
        matches!(self, Self::Whitespace | Self::Newline)
    }

    pub fn as_word(&self) -> Option<&str> {
        match self {
            Self::Word(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for PTok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Word(text) | Self::Number(text) | Self::Str(text) | Self::CharLit(text) => {
                f.write_str(text)
            }
            Self::Punct(text) => f.write_str(text),
            Self::Whitespace => f.write_str(" "),
            Self::Newline => f.write_str("\n"),
            Self::Arg { index, stringize } => {
                // only reachable when printing an unsubstituted macro body
                if *stringize {
                    write!(f, "#<{index}>")
                } else {
                    write!(f, "<{index}>")
                }
            }
            Self::Paste => f.write_str("##"),
            Self::Other(c) => write!(f, "{c}"),
        }
    }
}

/// Joins tokens back into text. Adjacent words/numbers would merge, but the
/// stream always keeps its whitespace tokens, so plain concatenation is
/// enough.
pub fn tokens_to_text(tokens: &[PTok]) -> String {
    let mut out = String::new();
    for token in tokens {
        use fmt::Write as _;
        let _ = write!(out, "{token}");
    }
    out
}

/// Original (unexpanded) argument text for stringize, with runs of
/// whitespace collapsed to one space and the ends trimmed.
pub fn stringize(tokens: &[PTok]) -> String {
    let mut out = String::from("\"");
    let mut pending_space = false;
    for token in tokens {
        if token.is_space() {
            pending_space = !out.ends_with('"');
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        let text = token.to_string();
        for c in text.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
    }
    out.push('"');
    out
}

/// Line-oriented scanner feeding the preprocessor. Handles backslash-newline
/// continuations and turns comments into whitespace.
pub struct PLexer<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
}

impl<'a> PLexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
        }
    }

    /// Lexes the whole input, pairing each token with its line number.
    pub fn run(source: &str) -> Vec<(PTok, u32)> {
        let mut lexer = PLexer::new(source);
        let mut tokens = Vec::new();
        while let Some(item) = lexer.next_token() {
            tokens.push(item);
        }
        tokens
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.source.as_bytes().get(self.offset + ahead).copied()
    }

    fn bump(&mut self) {
        if self.peek(0) == Some(b'\n') {
            self.line += 1;
        }
        self.offset += 1;
    }

    /// Skips backslash-newline continuations; returns true if any were
    /// consumed.
    fn skip_continuations(&mut self) -> bool {
        let mut any = false;
        loop {
            if self.peek(0) == Some(b'\\') && self.peek(1) == Some(b'\n') {
                self.bump();
                self.bump();
                any = true;
            } else if self.peek(0) == Some(b'\\')
                && self.peek(1) == Some(b'\r')
                && self.peek(2) == Some(b'\n')
            {
                self.bump();
                self.bump();
                self.bump();
                any = true;
            } else {
                return any;
            }
        }
    }

    fn next_token(&mut self) -> Option<(PTok, u32)> {
        self.skip_continuations();
        let line = self.line;
        let b = self.peek(0)?;

        // whitespace run, comments folded in
        if matches!(b, b' ' | b'\t' | b'\r')
            || (b == b'/' && matches!(self.peek(1), Some(b'/' | b'*')))
        {
            let mut saw_any = false;
            loop {
                self.skip_continuations();
                match self.peek(0) {
                    Some(b' ' | b'\t' | b'\r') => {
                        self.bump();
                        saw_any = true;
                    }
                    Some(b'/') if self.peek(1) == Some(b'/') => {
                        while !matches!(self.peek(0), None | Some(b'\n')) {
                            self.bump();
                        }
                        saw_any = true;
                    }
                    Some(b'/') if self.peek(1) == Some(b'*') => {
                        self.bump();
                        self.bump();
                        while self.peek(0).is_some() {
                            if self.peek(0) == Some(b'*') && self.peek(1) == Some(b'/') {
                                self.bump();
                                self.bump();
                                break;
                            }
                            self.bump();
                        }
                        saw_any = true;
                    }
                    _ => break,
                }
            }
            if saw_any {
                return Some((PTok::Whitespace, line));
            }
        }

        let b = self.peek(0)?;
        if b == b'\n' {
            self.bump();
            return Some((PTok::Newline, line));
        }

        if matches!(b, b'a'..=b'z' | b'A'..=b'Z' | b'_') {
            // accumulated, not sliced: a continuation may split the word
            let mut word = String::new();
            loop {
                self.skip_continuations();
                match self.peek(0) {
                    Some(b @ (b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')) => {
                        word.push(b as char);
                        self.bump();
                    }
                    _ => break,
                }
            }
            return Some((PTok::Word(word), line));
        }

        if b.is_ascii_digit() || (b == b'.' && matches!(self.peek(1), Some(b'0'..=b'9'))) {
            return Some((self.number(), line));
        }

        if b == b'"' || b == b'\'' {
            return Some((self.quoted(b), line));
        }

        Some((self.punct(), line))
    }

    /// Greedy pp-number: digits, letters, dots and exponent signs, which
    /// covers every C and GLSL literal form including suffixes.
    fn number(&mut self) -> PTok {
        let mut text = String::new();
        loop {
            self.skip_continuations();
            match self.peek(0) {
                Some(b @ (b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'_')) => {
                    text.push(b as char);
                    self.bump();
                }
                Some(b @ (b'+' | b'-'))
                    if matches!(text.bytes().last(), Some(b'e' | b'E' | b'p' | b'P')) =>
                {
                    text.push(b as char);
                    self.bump();
                }
                _ => break,
            }
        }
        PTok::Number(text)
    }

    fn quoted(&mut self, quote: u8) -> PTok {
        let start = self.offset;
        self.bump();
        while let Some(b) = self.peek(0) {
            if b == b'\\' {
                self.bump();
                self.bump();
                continue;
            }
            if b == quote || b == b'\n' {
                break;
            }
            self.bump();
        }
        if self.peek(0) == Some(quote) {
            self.bump();
        }
        let text = self.source[start..self.offset].to_string();
        if quote == b'"' {
            PTok::Str(text)
        } else {
            PTok::CharLit(text)
        }
    }

    fn punct(&mut self) -> PTok {
        // longest match first
        const THREE: [&str; 2] = ["<<=", ">>="];
        const TWO: [&str; 19] = [
            "##", "&&", "||", "^^", "==", "!=", "<=", ">=", "<<", ">>", "+=", "-=", "*=", "/=",
            "%=", "&=", "|=", "^=", "++",
        ];
        const TWO_EXTRA: [&str; 1] = ["--"];
        const ONE: [&str; 25] = [
            "#", "(", ")", "[", "]", "{", "}", ",", ";", ":", "?", ".", "+", "-", "*", "/", "%",
            "<", ">", "=", "!", "~", "&", "|", "^",
        ];
        let rest = &self.source[self.offset..];
        for table in [&THREE[..], &TWO[..], &TWO_EXTRA[..], &ONE[..]] {
            for &p in table {
                if rest.starts_with(p) {
                    for _ in 0..p.len() {
                        self.bump();
                    }
                    return PTok::Punct(p);
                }
            }
        }
        let c = rest.chars().next().unwrap_or('\0');
        self.offset += c.len_utf8();
        PTok::Other(c)
    }
}

#[cfg(test)]
mod tests {
    use super::{stringize, PLexer, PTok};

    fn toks(source: &str) -> Vec<PTok> {
        PLexer::run(source).into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn words_and_numbers() {
        assert_eq!(
            toks("foo 1.5e-3f"),
            vec![
                PTok::word("foo"),
                PTok::Whitespace,
                PTok::Number("1.5e-3f".into()),
            ]
        );
    }

    #[test]
    fn line_continuation_joins_lines() {
        assert_eq!(
            toks("a\\\nb"),
            vec![PTok::word("ab")],
            "continuation must splice the word"
        );
    }

    #[test]
    fn comments_become_whitespace() {
        assert_eq!(
            toks("a/* x */b // y\nc"),
            vec![
                PTok::word("a"),
                PTok::Whitespace,
                PTok::word("b"),
                PTok::Whitespace,
                PTok::Newline,
                PTok::word("c"),
            ]
        );
    }

    #[test]
    fn hash_tokens() {
        assert_eq!(
            toks("# ## #"),
            vec![
                PTok::Punct("#"),
                PTok::Whitespace,
                PTok::Punct("##"),
                PTok::Whitespace,
                PTok::Punct("#"),
            ]
        );
    }

    #[test]
    fn lines_tracked() {
        let tokens = PLexer::run("a\nb\nc");
        assert_eq!(tokens[0].1, 1);
        assert_eq!(tokens[2].1, 2);
        assert_eq!(tokens[4].1, 3);
    }

    #[test]
    fn stringize_collapses_space() {
        let tokens = toks("a  +  \"x\"");
        assert_eq!(stringize(&tokens), "\"a + \\\"x\\\"\"");
    }
}
