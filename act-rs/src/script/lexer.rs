//! Dual-mode, regex-driven tokenizer.
//!
//! The lexer scans lazily: every call to [`Lexer::next`] tries each token
//! pattern of the active mode, in table order, anchored at the current
//! offset, and takes the first non-empty match.  Two pattern sets exist:
//!
//! | Mode | Used for |
//! |------|----------|
//! | language | the full grammar |
//! | template | the literal body of `` `…` `` and `{…}` templates |
//!
//! Mode switches happen on delimiter tokens unless the previous token was an
//! unescaped backslash:
//!
//! | Mode | Token | New mode |
//! |------|-------|----------|
//! | language | `{` or `` ` `` | template |
//! | template | `{` | language |
//! | language | `}` | template |
//! | template | `}` or `` ` `` | language |
//!
//! A bare `}` in language mode always re-enters template mode; nesting is
//! carried entirely by these toggles.
//!
//! Bytes that match nothing produce an [`TokenKind::Unknown`] token; the
//! lexer itself never fails on input.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::SyntaxError;
use crate::script::ops::{OPERATORS, SENTENCE_ENDS};
use crate::script::keywords::PREFIXES;

// ── Token ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Placeholder before the first token is read.
    Start,
    SentenceEnd,
    Str,
    Url,
    Comment,
    Insert,
    Operator,
    Space,
    LParen,
    RParen,
    Do,
    End,
    List,
    Dot,
    Call,
    Bang,
    Variable,
    CssProp,
    Attribute,
    Dimension,
    Number,
    Id,
    Tag,
    Path,
    Property,
    Arrow,
    Prefix,
    Word,
    Colon,
    Comma,
    LCurly,
    RCurly,
    LBrace,
    RBrace,
    Backtick,
    Backslash,
    UnclosedComment,
    UnclosedString,
    Unknown,
    /// Template-mode literal text.
    Content,
}

impl TokenKind {
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Start => "start",
            TokenKind::SentenceEnd => "sentence_end",
            TokenKind::Str => "string",
            TokenKind::Url => "url",
            TokenKind::Comment => "comment",
            TokenKind::Insert => "insert",
            TokenKind::Operator => "operator",
            TokenKind::Space => "space",
            TokenKind::LParen => "lparen",
            TokenKind::RParen => "rparen",
            TokenKind::Do => "do",
            TokenKind::End => "end",
            TokenKind::List => "list",
            TokenKind::Dot => "dot",
            TokenKind::Call => "call",
            TokenKind::Bang => "bang",
            TokenKind::Variable => "variable",
            TokenKind::CssProp => "css_prop",
            TokenKind::Attribute => "attribute",
            TokenKind::Dimension => "dimension",
            TokenKind::Number => "number",
            TokenKind::Id => "id",
            TokenKind::Tag => "tag",
            TokenKind::Path => "path",
            TokenKind::Property => "property",
            TokenKind::Arrow => "arrow",
            TokenKind::Prefix => "prefix",
            TokenKind::Word => "word",
            TokenKind::Colon => "colon",
            TokenKind::Comma => "comma",
            TokenKind::LCurly => "lcurly",
            TokenKind::RCurly => "rcurly",
            TokenKind::LBrace => "lbrace",
            TokenKind::RBrace => "rbrace",
            TokenKind::Backtick => "backtick",
            TokenKind::Backslash => "backslash",
            TokenKind::UnclosedComment => "unclosed_comment",
            TokenKind::UnclosedString => "unclosed_string",
            TokenKind::Unknown => "unknown",
            TokenKind::Content => "content",
        }
    }

    /// Tokens that start a value (literal, selector, composite, scope…).
    pub fn is_value(self) -> bool {
        matches!(
            self,
            TokenKind::Arrow
                | TokenKind::Str
                | TokenKind::Url
                | TokenKind::Path
                | TokenKind::List
                | TokenKind::Prefix
                | TokenKind::Dot
                | TokenKind::LCurly
                | TokenKind::Backtick
                | TokenKind::Word
                | TokenKind::Number
                | TokenKind::CssProp
                | TokenKind::Dimension
                | TokenKind::Attribute
                | TokenKind::Variable
                | TokenKind::Id
                | TokenKind::Property
                | TokenKind::Tag
                | TokenKind::LParen
                | TokenKind::Do
                | TokenKind::LBrace
        )
    }

    /// Tokens that continue an expression with a postfix form.
    pub fn is_postfix(self) -> bool {
        matches!(
            self,
            TokenKind::Bang
                | TokenKind::Call
                | TokenKind::Colon
                | TokenKind::Dot
                | TokenKind::Insert
                | TokenKind::LBrace
                | TokenKind::LParen
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lexed token.  `column` is the column just past the token's last
/// character.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    /// Byte offset of the first character.
    pub index: usize,
    pub line: usize,
    pub column: usize,
}

impl Token {
    fn start() -> Self {
        Token { kind: TokenKind::Start, value: String::new(), index: 0, line: 0, column: 0 }
    }

    /// Byte offset just past the token.
    pub fn index_end(&self) -> usize {
        self.index + self.value.len()
    }
}

// ── Pattern tables ────────────────────────────────────────────────────────────

struct Patterns {
    lang: Vec<(TokenKind, Regex)>,
    tpl: Vec<(TokenKind, Regex)>,
    /// Insert marker as it may appear at the very start of the input.
    insert_at_start: Regex,
}

const WORD: &str = r"[a-zA-Z0-9_\-]+";

fn lang_sources() -> Vec<(TokenKind, String)> {
    let sentence_end = SENTENCE_ENDS
        .iter()
        .map(|(s, _)| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");
    let operator = OPERATORS
        .iter()
        .map(|(s, _)| format!(r"\s+{}\s+", regex::escape(s)))
        .collect::<Vec<_>>()
        .join("|");
    let prefix = format!(
        r"\b(?:{})\b",
        PREFIXES.iter().map(|(name, _)| *name).collect::<Vec<_>>().join("|")
    );

    vec![
        (TokenKind::SentenceEnd, sentence_end),
        (TokenKind::Str, r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#.into()),
        (
            TokenKind::Url,
            r"https?://(?:www\.)?[-a-zA-Z0-9@:%._+~#=]{2,256}\.[a-z]{2,63}\b[-a-zA-Z0-9@:%_+.~#?&/=]*".into(),
        ),
        (TokenKind::Comment, r"/\*[\s\S]*?\*/|//.*".into()),
        (TokenKind::Insert, r"\s+<<\s+".into()),
        (TokenKind::Operator, operator),
        (TokenKind::Space, r"\s+".into()),
        (TokenKind::LParen, r"\(".into()),
        (TokenKind::RParen, r"\)".into()),
        (TokenKind::Do, r"\bdo\b".into()),
        (TokenKind::End, r"\bend\b".into()),
        (TokenKind::List, r"\.\.\.".into()),
        (TokenKind::Dot, r"\.".into()),
        (TokenKind::Call, r"!:".into()),
        (TokenKind::Bang, r"!".into()),
        (TokenKind::Variable, format!(r"\${WORD}")),
        (TokenKind::CssProp, format!(r"\*{WORD}")),
        (TokenKind::Attribute, format!(r"@{WORD}")),
        (TokenKind::Dimension, r"-?\d+(?:\.\d+)?[a-z%]+".into()),
        (TokenKind::Number, r"-?\d+(?:\.\d+)?".into()),
        (TokenKind::Id, format!(r"#{WORD}")),
        (TokenKind::Tag, format!(r"<{WORD}>")),
        (TokenKind::Path, r"/\b[-a-zA-Z0-9@:%_+.~#?&/=]*".into()),
        (TokenKind::Property, format!(r":{WORD}")),
        (TokenKind::Arrow, r"->".into()),
        (TokenKind::Prefix, prefix),
        (TokenKind::Word, WORD.into()),
        (TokenKind::Colon, r":".into()),
        (TokenKind::Comma, r",".into()),
        (TokenKind::LCurly, r"\{".into()),
        (TokenKind::RCurly, r"\}".into()),
        (TokenKind::LBrace, r"\[".into()),
        (TokenKind::RBrace, r"\]".into()),
        (TokenKind::Backtick, r"`".into()),
        (TokenKind::Backslash, r"\\".into()),
        (TokenKind::UnclosedComment, r"/\*".into()),
        (TokenKind::UnclosedString, r#"["']"#.into()),
        (TokenKind::Unknown, r"(?s).".into()),
    ]
}

fn tpl_sources() -> Vec<(TokenKind, String)> {
    vec![
        (TokenKind::LCurly, r"\{".into()),
        (TokenKind::RCurly, r"\}".into()),
        (TokenKind::Backtick, r"`".into()),
        (TokenKind::Backslash, r"\\".into()),
        (TokenKind::Content, r"[^{}`\\]+".into()),
    ]
}

fn compile(sources: Vec<(TokenKind, String)>) -> Result<Vec<(TokenKind, Regex)>, regex::Error> {
    sources
        .into_iter()
        .map(|(kind, src)| Ok((kind, Regex::new(&format!("^(?:{src})"))?)))
        .collect()
}

fn patterns() -> &'static Result<Patterns, regex::Error> {
    static PATTERNS: OnceLock<Result<Patterns, regex::Error>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        Ok(Patterns {
            lang: compile(lang_sources())?,
            tpl: compile(tpl_sources())?,
            insert_at_start: Regex::new(r"^(?:\s*<<\s+)")?,
        })
    })
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

pub struct Lexer {
    input: String,
    index: usize,
    tpl_mode: bool,
    was_backslash: bool,
    /// `[previous, current]`.
    tokens: [Token; 2],
    line: usize,
    column: usize,
    patterns: &'static Patterns,
    trace: bool,
}

impl Lexer {
    /// Create a lexer over `code`.  A trailing `"\n;"` is appended so the
    /// last sentence is always terminated.  The lexer is positioned before
    /// the first token; call [`next`](Self::next) to read it.
    pub fn new(code: &str) -> Result<Self, SyntaxError> {
        let patterns = match patterns() {
            Ok(p) => p,
            Err(e) => {
                return Err(SyntaxError {
                    message: format!("invalid token pattern: {e}"),
                    line: 0,
                    column: 0,
                    token: Token::start(),
                })
            }
        };
        Ok(Lexer {
            input: format!("{code}\n;"),
            index: 0,
            tpl_mode: false,
            was_backslash: false,
            tokens: [Token::start(), Token::start()],
            line: 1,
            column: 0,
            patterns,
            trace: false,
        })
    }

    /// Emit a `trace!` event for every token read.
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn has_more_tokens(&self) -> bool {
        self.input.len() > self.index
    }

    pub fn tpl_mode(&self) -> bool {
        self.tpl_mode
    }

    fn set_tpl_mode(&mut self, tpl_mode: bool) {
        tracing::trace!(template = tpl_mode, "lexer mode switch");
        self.tpl_mode = tpl_mode;
    }

    fn match_at(&self) -> Option<(TokenKind, usize)> {
        let rest = &self.input[self.index..];
        let table = if self.tpl_mode { &self.patterns.tpl } else { &self.patterns.lang };

        for (kind, re) in table {
            let re = if *kind == TokenKind::Insert && self.index == 0 {
                &self.patterns.insert_at_start
            } else {
                re
            };
            if let Some(m) = re.find(rest) {
                if m.end() > 0 {
                    return Some((*kind, m.end()));
                }
            }
        }
        None
    }

    /// Advance to the next token, skipping comments.
    pub fn next(&mut self) -> &mut Self {
        while self.has_more_tokens() {
            let Some((kind, len)) = self.match_at() else {
                let step = self.input[self.index..].chars().next().map_or(1, char::len_utf8);
                self.index += step;
                continue;
            };

            let start = self.index;
            let value = self.input[start..start + len].to_owned();
            self.index += len;

            if !self.was_backslash {
                match (self.tpl_mode, kind) {
                    (false, TokenKind::LCurly | TokenKind::Backtick) => self.set_tpl_mode(true),
                    (true, TokenKind::LCurly) => self.set_tpl_mode(false),
                    (false, TokenKind::RCurly) => self.set_tpl_mode(true),
                    (true, TokenKind::RCurly | TokenKind::Backtick) => self.set_tpl_mode(false),
                    _ => {}
                }
            }
            self.was_backslash = kind == TokenKind::Backslash && !self.was_backslash;

            match value.rfind('\n') {
                Some(last) => {
                    self.line += value.matches('\n').count();
                    self.column = value.len() - last - 1;
                }
                None => self.column += value.len(),
            }

            let token = Token { kind, value, index: start, line: self.line, column: self.column };
            if self.trace {
                tracing::trace!(kind = %token.kind, value = %token.value, line = token.line, "token");
            }
            self.tokens.swap(0, 1);
            self.tokens[1] = token;

            if kind == TokenKind::Comment {
                continue;
            }
            return self;
        }
        self
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[1]
    }

    pub fn prev(&self) -> &Token {
        &self.tokens[0]
    }

    pub fn token_is(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek().kind)
    }

    /// Sentence terminators and scope closers.
    pub fn token_is_end(&self) -> bool {
        self.token_is(&[TokenKind::SentenceEnd, TokenKind::RParen, TokenKind::End, TokenKind::RCurly])
    }

    pub fn token_is_value(&self) -> bool {
        self.peek().kind.is_value()
    }

    pub fn token_is_postfix(&self) -> bool {
        self.peek().kind.is_postfix()
    }

    /// True when the current token's trimmed text names a binary operator.
    pub fn token_is_operator(&self) -> bool {
        let text = self.peek().value.trim();
        OPERATORS.iter().any(|(op, _)| *op == text)
    }

    pub fn fail(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            line: self.line,
            column: self.column,
            token: self.peek().clone(),
        }
    }

    pub fn expect(&mut self, kinds: &[TokenKind]) -> Result<&mut Self, SyntaxError> {
        if self.token_is(kinds) {
            return Ok(self);
        }
        let names: Vec<&str> = kinds.iter().map(|k| k.name()).collect();
        Err(self.fail(format!(
            "Unexpected {} \"{}\", expected a token of type {}.",
            self.peek().kind,
            self.peek().value,
            names.join(", ")
        )))
    }

    pub fn expect_value(&mut self) -> Result<&mut Self, SyntaxError> {
        if self.token_is_value() {
            return Ok(self);
        }
        Err(self.fail(format!(
            "Unexpected {} \"{}\", expected a value token.",
            self.peek().kind,
            self.peek().value
        )))
    }

    /// Advance only if the current token is one of `kinds`.
    pub fn next_if(&mut self, kinds: &[TokenKind]) -> bool {
        if self.token_is(kinds) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Step past the current token and any following whitespace.
    pub fn consume(&mut self) -> &mut Self {
        self.next().fwd()
    }

    /// Skip whitespace tokens.
    pub fn fwd(&mut self) -> &mut Self {
        while self.has_more_tokens() && self.next_if(&[TokenKind::Space]) {}
        self
    }

    /// Skip whitespace and comma tokens.
    pub fn fwd_with_comma(&mut self) -> &mut Self {
        while self.has_more_tokens() && self.next_if(&[TokenKind::Space, TokenKind::Comma]) {}
        self
    }
}
