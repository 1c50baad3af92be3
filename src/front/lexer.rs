//! GLSL tokenizer.
//!
//! Tokenization never fails: characters that fit no token become
//! [`TokenValue::Invalid`] and surface as syntax errors during parsing.
//! Comments are not tokens; they are collected separately together with
//! the index of the token that follows them, which is how marker comments
//! get attached to syntax-tree nodes later.

#[derive(Clone, Debug, PartialEq)]
pub enum TokenValue {
    Identifier(String),
    IntConstant { value: i64, unsigned: bool },
    FloatConstant(f64),
    BoolConstant(bool),
    /// A stray preprocessor line left in post-preprocessor text, e.g.
    /// `#version 430 core`. Stored with the leading `#` stripped.
    Directive(String),

    // qualifiers
    Const,
    In,
    Out,
    Inout,
    Uniform,
    Buffer,
    Shared,
    Attribute,
    Varying,
    Coherent,
    Volatile,
    Restrict,
    Readonly,
    Writeonly,
    Layout,
    Centroid,
    Flat,
    Smooth,
    Noperspective,
    Patch,
    Invariant,
    Precise,
    Precision,
    HighP,
    MediumP,
    LowP,

    // declarations and control flow
    Struct,
    Void,
    While,
    For,
    Do,
    If,
    Else,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Discard,

    // punctuation
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    Comma,
    Semicolon,
    Colon,
    Question,
    Dot,

    // operators
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    LeftShiftAssign,
    RightShiftAssign,
    AndAssign,
    XorAssign,
    OrAssign,
    Increment,
    Decrement,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    LeftAngle,
    RightAngle,
    LeftShift,
    RightShift,
    Plus,
    Dash,
    Star,
    Slash,
    Percent,
    Bang,
    Tilde,
    Ampersand,
    Caret,
    VerticalBar,

    Invalid(char),
}

impl TokenValue {
    /// Identifier text, if this token is one.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Self::Identifier(name) => Some(name),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub value: TokenValue,
    pub line: u32,
    pub column: u32,
    /// Byte offset of the token start in the source.
    pub start: usize,
}

/// A comment, attached to the position of the token that follows it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
    /// Index into the token vec of the first token after this comment.
    pub next_token: usize,
    pub line: u32,
    pub column: u32,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub comments: Vec<Comment>,
}

pub fn tokenize(source: &str) -> TokenStream {
    let mut lexer = Lexer::new(source);
    let mut stream = TokenStream::default();
    while let Some(item) = lexer.next_item() {
        match item {
            Item::Token(value, line, column, start) => stream.tokens.push(Token {
                value,
                line,
                column,
                start,
            }),
            Item::Comment(text, line, column) => stream.comments.push(Comment {
                text,
                next_token: stream.tokens.len(),
                line,
                column,
            }),
        }
    }
    // fix up comment indices that point past the end
    let len = stream.tokens.len();
    for comment in &mut stream.comments {
        comment.next_token = comment.next_token.min(len);
    }
    stream
}

enum Item {
    Token(TokenValue, u32, u32, usize),
    Comment(String, u32, u32),
}

struct Lexer<'a> {
    source: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.source.as_bytes().get(self.offset + ahead).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek(0)?;
        self.offset += 1;
        if b == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(b)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(0), Some(b' ' | b'\t' | b'\r' | b'\n')) {
            self.bump();
        }
    }

    fn next_item(&mut self) -> Option<Item> {
        self.skip_whitespace();
        let b = self.peek(0)?;
        let (line, column, start) = (self.line, self.column, self.offset);

        if b == b'/' && self.peek(1) == Some(b'/') {
            while !matches!(self.peek(0), None | Some(b'\n')) {
                self.bump();
            }
            let text = self.source[start..self.offset].to_string();
            return Some(Item::Comment(text, line, column));
        }
        if b == b'/' && self.peek(1) == Some(b'*') {
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
            let text = self.source[start..self.offset].to_string();
            return Some(Item::Comment(text, line, column));
        }

        let value = match b {
            b'#' => {
                self.bump();
                while !matches!(self.peek(0), None | Some(b'\n')) {
                    self.bump();
                }
                TokenValue::Directive(self.source[start + 1..self.offset].trim().to_string())
            }
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.word(start),
            b'0'..=b'9' => self.number(start),
            b'.' if matches!(self.peek(1), Some(b'0'..=b'9')) => self.number(start),
            _ => self.punctuation(),
        };
        Some(Item::Token(value, line, column, start))
    }

    fn word(&mut self, start: usize) -> TokenValue {
        while matches!(
            self.peek(0),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.bump();
        }
        match &self.source[start..self.offset] {
            "const" => TokenValue::Const,
            "in" => TokenValue::In,
            "out" => TokenValue::Out,
            "inout" => TokenValue::Inout,
            "uniform" => TokenValue::Uniform,
            "buffer" => TokenValue::Buffer,
            "shared" => TokenValue::Shared,
            "attribute" => TokenValue::Attribute,
            "varying" => TokenValue::Varying,
            "coherent" => TokenValue::Coherent,
            "volatile" => TokenValue::Volatile,
            "restrict" => TokenValue::Restrict,
            "readonly" => TokenValue::Readonly,
            "writeonly" => TokenValue::Writeonly,
            "layout" => TokenValue::Layout,
            "centroid" => TokenValue::Centroid,
            "flat" => TokenValue::Flat,
            "smooth" => TokenValue::Smooth,
            "noperspective" => TokenValue::Noperspective,
            "patch" => TokenValue::Patch,
            "invariant" => TokenValue::Invariant,
            "precise" => TokenValue::Precise,
            "precision" => TokenValue::Precision,
            "highp" => TokenValue::HighP,
            "mediump" => TokenValue::MediumP,
            "lowp" => TokenValue::LowP,
            "struct" => TokenValue::Struct,
            "void" => TokenValue::Void,
            "while" => TokenValue::While,
            "for" => TokenValue::For,
            "do" => TokenValue::Do,
            "if" => TokenValue::If,
            "else" => TokenValue::Else,
            "switch" => TokenValue::Switch,
            "case" => TokenValue::Case,
            "default" => TokenValue::Default,
            "break" => TokenValue::Break,
            "continue" => TokenValue::Continue,
            "return" => TokenValue::Return,
            "discard" => TokenValue::Discard,
            "true" => TokenValue::BoolConstant(true),
            "false" => TokenValue::BoolConstant(false),
            word => TokenValue::Identifier(word.to_string()),
        }
    }

    fn number(&mut self, start: usize) -> TokenValue {
        if self.peek(0) == Some(b'0') && matches!(self.peek(1), Some(b'x' | b'X')) {
            self.bump();
            self.bump();
            let digits = self.offset;
            while matches!(
                self.peek(0),
                Some(b'0'..=b'9' | b'a'..=b'f' | b'A'..=b'F')
            ) {
                self.bump();
            }
            let value = fold_digits(&self.source[digits..self.offset], 16);
            let unsigned = self.int_suffix();
            return TokenValue::IntConstant {
                value: value as i64,
                unsigned,
            };
        }

        let mut float = false;
        while matches!(self.peek(0), Some(b'0'..=b'9')) {
            self.bump();
        }
        if self.peek(0) == Some(b'.') {
            float = true;
            self.bump();
            while matches!(self.peek(0), Some(b'0'..=b'9')) {
                self.bump();
            }
        }
        if matches!(self.peek(0), Some(b'e' | b'E')) {
            let digit_at = |n| matches!(self.peek(n), Some(b'0'..=b'9'));
            let signed = matches!(self.peek(1), Some(b'+' | b'-'));
            if digit_at(1) || (signed && digit_at(2)) {
                float = true;
                self.bump();
                if signed {
                    self.bump();
                }
                while matches!(self.peek(0), Some(b'0'..=b'9')) {
                    self.bump();
                }
            }
        }

        let text = &self.source[start..self.offset];
        if matches!(self.peek(0), Some(b'f' | b'F')) {
            self.bump();
            return TokenValue::FloatConstant(text.parse().unwrap_or(0.0));
        }
        if matches!(self.peek(0), Some(b'l' | b'L')) && matches!(self.peek(1), Some(b'f' | b'F')) {
            self.bump();
            self.bump();
            return TokenValue::FloatConstant(text.parse().unwrap_or(0.0));
        }
        if float {
            return TokenValue::FloatConstant(text.parse().unwrap_or(0.0));
        }

        // leading zero means octal
        let value = if text.len() > 1 && text.starts_with('0') {
            fold_digits(&text[1..], 8)
        } else {
            fold_digits(text, 10)
        };
        let unsigned = self.int_suffix();
        TokenValue::IntConstant {
            value: value as i64,
            unsigned,
        }
    }

    fn int_suffix(&mut self) -> bool {
        if matches!(self.peek(0), Some(b'u' | b'U')) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn punctuation(&mut self) -> TokenValue {
        use TokenValue as Tv;
        let eat = |lexer: &mut Self, n: usize, value: Tv| {
            for _ in 0..n {
                lexer.bump();
            }
            value
        };
        let (b, b1, b2) = (self.peek(0), self.peek(1), self.peek(2));
        match b {
            Some(b'(') => eat(self, 1, Tv::LeftParen),
            Some(b')') => eat(self, 1, Tv::RightParen),
            Some(b'[') => eat(self, 1, Tv::LeftBracket),
            Some(b']') => eat(self, 1, Tv::RightBracket),
            Some(b'{') => eat(self, 1, Tv::LeftBrace),
            Some(b'}') => eat(self, 1, Tv::RightBrace),
            Some(b',') => eat(self, 1, Tv::Comma),
            Some(b';') => eat(self, 1, Tv::Semicolon),
            Some(b':') => eat(self, 1, Tv::Colon),
            Some(b'?') => eat(self, 1, Tv::Question),
            Some(b'.') => eat(self, 1, Tv::Dot),
            Some(b'~') => eat(self, 1, Tv::Tilde),
            Some(b'+') => match b1 {
                Some(b'+') => eat(self, 2, Tv::Increment),
                Some(b'=') => eat(self, 2, Tv::AddAssign),
                _ => eat(self, 1, Tv::Plus),
            },
            Some(b'-') => match b1 {
                Some(b'-') => eat(self, 2, Tv::Decrement),
                Some(b'=') => eat(self, 2, Tv::SubAssign),
                _ => eat(self, 1, Tv::Dash),
            },
            Some(b'*') => match b1 {
                Some(b'=') => eat(self, 2, Tv::MulAssign),
                _ => eat(self, 1, Tv::Star),
            },
            Some(b'/') => match b1 {
                Some(b'=') => eat(self, 2, Tv::DivAssign),
                _ => eat(self, 1, Tv::Slash),
            },
            Some(b'%') => match b1 {
                Some(b'=') => eat(self, 2, Tv::ModAssign),
                _ => eat(self, 1, Tv::Percent),
            },
            Some(b'<') => match (b1, b2) {
                (Some(b'<'), Some(b'=')) => eat(self, 3, Tv::LeftShiftAssign),
                (Some(b'<'), _) => eat(self, 2, Tv::LeftShift),
                (Some(b'='), _) => eat(self, 2, Tv::LessEqual),
                _ => eat(self, 1, Tv::LeftAngle),
            },
            Some(b'>') => match (b1, b2) {
                (Some(b'>'), Some(b'=')) => eat(self, 3, Tv::RightShiftAssign),
                (Some(b'>'), _) => eat(self, 2, Tv::RightShift),
                (Some(b'='), _) => eat(self, 2, Tv::GreaterEqual),
                _ => eat(self, 1, Tv::RightAngle),
            },
            Some(b'=') => match b1 {
                Some(b'=') => eat(self, 2, Tv::Equal),
                _ => eat(self, 1, Tv::Assign),
            },
            Some(b'!') => match b1 {
                Some(b'=') => eat(self, 2, Tv::NotEqual),
                _ => eat(self, 1, Tv::Bang),
            },
            Some(b'&') => match b1 {
                Some(b'&') => eat(self, 2, Tv::LogicalAnd),
                Some(b'=') => eat(self, 2, Tv::AndAssign),
                _ => eat(self, 1, Tv::Ampersand),
            },
            Some(b'|') => match b1 {
                Some(b'|') => eat(self, 2, Tv::LogicalOr),
                Some(b'=') => eat(self, 2, Tv::OrAssign),
                _ => eat(self, 1, Tv::VerticalBar),
            },
            Some(b'^') => match b1 {
                Some(b'^') => eat(self, 2, Tv::LogicalXor),
                Some(b'=') => eat(self, 2, Tv::XorAssign),
                _ => eat(self, 1, Tv::Caret),
            },
            _ => {
                // non-ASCII or unrecognized byte
                let c = self.source[self.offset..].chars().next().unwrap_or('\0');
                self.offset += c.len_utf8();
                self.column += 1;
                Tv::Invalid(c)
            }
        }
    }
}

fn fold_digits(text: &str, radix: u64) -> u64 {
    text.bytes().fold(0u64, |acc, b| {
        let digit = match b {
            b'0'..=b'9' => (b - b'0') as u64,
            b'a'..=b'f' => (b - b'a' + 10) as u64,
            b'A'..=b'F' => (b - b'A' + 10) as u64,
            _ => 0,
        };
        acc.wrapping_mul(radix).wrapping_add(digit)
    })
}
