//! Recursive-descent parser.
//!
//! # Grammar (informal)
//!
//! ```text
//! scope      := sentence (terminator sentence)*
//! sentence   := expression (ws expression)? terminator
//! expression := value (postfix | operator expression)*
//! terminator := ';' | '&' | '?' | 'else?' | '>>' | end-of-scope
//! ```
//!
//! A sentence whose first expression is followed by whitespace and another
//! value has an explicit target: `#out :text_content = 1` evaluates
//! `:text_content = 1` against `#out`.
//!
//! There is no precedence table.  After each value the parser loops over
//! postfix forms and operators in textual order, and the right operand of
//! an operator stops at the next operator, so every chain associates to the
//! left.  A word naming a keyword switches to comma/operator-delimited
//! argument parsing instead.
//!
//! The parser never recovers: the first unexpected token aborts the parse
//! with a [`SyntaxError`].

use std::rc::Rc;

use crate::config::Config;
use crate::error::SyntaxError;
use crate::script::keywords;
use crate::script::lexer::{Lexer, Token, TokenKind};
use crate::script::node::{
    Expr, ExprKind, FunctionDef, Node, NodeKind, Part, Scope, ScopeMeta, Sentence, Span, Template,
};
use crate::script::ops::{self, BinOp};
use crate::script::value::Dimension;

type PResult<T> = Result<T, SyntaxError>;

const MAX_URL_LEN: usize = 2048;

/// Parse `code` into its root scope.
pub fn parse(code: &str, config: &Config) -> PResult<Rc<Scope>> {
    let root = Parser::new(code, config)?.parse()?;
    if config.debug_parser {
        tracing::debug!(sentences = root.sentences.len(), root = ?root, "parse finished");
    }
    Ok(root)
}

/// Map the character after a backslash to the character it stands for.
/// Unknown escapes stand for themselves.
pub fn escape_char(c: char) -> char {
    match c {
        'n' => '\n',
        'r' => '\r',
        't' => '\t',
        'b' => '\u{8}',
        'f' => '\u{c}',
        other => other,
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(escape_char(next));
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub struct Parser<'c> {
    lexer: Lexer,
    code: Rc<str>,
    config: &'c Config,
}

impl<'c> Parser<'c> {
    pub fn new(code: &str, config: &'c Config) -> PResult<Self> {
        let mut lexer = Lexer::new(code)?.with_trace(config.debug_lexer);
        lexer.next();
        Ok(Parser { lexer, code: Rc::from(code), config })
    }

    pub fn parse(mut self) -> PResult<Rc<Scope>> {
        let meta = ScopeMeta::root(Rc::clone(&self.code));
        let start = self.lexer.peek().clone();
        let mut sentences = Vec::new();

        while self.lexer.has_more_tokens() {
            if let Some(sentence) = self.parse_sentence(&meta)? {
                sentences.push(sentence);
            }
            self.lexer
                .expect(&[TokenKind::SentenceEnd, TokenKind::RParen, TokenKind::End, TokenKind::Space])?
                .next();
        }

        let span = Span::between(&start, self.lexer.peek());
        Ok(Rc::new(Scope { meta, sentences, span }))
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    /// Span from `start` to the end of the last consumed token.
    fn span_from(&self, start: Span) -> Span {
        Span { end: self.lexer.prev().index_end().max(start.end), ..start }
    }

    fn expr(&self, kind: ExprKind, scope: &Rc<ScopeMeta>, span: Span) -> Node {
        Node::new(NodeKind::Expr(Box::new(Expr { kind, scope: Rc::clone(scope) })), span)
    }

    fn unexpected(&self, while_parsing: &str) -> SyntaxError {
        let token = self.lexer.peek();
        self.lexer.fail(format!(
            "Unexpected token {} \"{}\" while parsing {while_parsing}.",
            token.kind, token.value
        ))
    }

    // ── Sentences ─────────────────────────────────────────────────────────────

    fn parse_sentence(&mut self, scope: &Rc<ScopeMeta>) -> PResult<Option<Sentence>> {
        self.lexer.fwd();
        if self.lexer.token_is_end() {
            return Ok(None);
        }

        let start = self.lexer.peek().clone();
        let mut target = None;
        let mut value = self.parse_expression(scope, &[])?;

        if self.lexer.next_if(&[TokenKind::Space]) && self.lexer.fwd().token_is_value() {
            target = Some(value);
            value = self.parse_expression(scope, &[])?;
        }

        let end = self.lexer.fwd().peek();
        let mode = if end.kind == TokenKind::SentenceEnd { ops::sentence_mode(&end.value) } else { Default::default() };
        let span = Span::between(&start, end);

        Ok(Some(Sentence { target, value, mode, span, scope: Rc::clone(scope) }))
    }

    // ── Expressions ───────────────────────────────────────────────────────────

    fn parse_expression(&mut self, scope: &Rc<ScopeMeta>, skip: &[TokenKind]) -> PResult<Node> {
        let mut l = None;

        if self.lexer.token_is_value() {
            l = Some(self.parse_value(scope)?);
        } else if !self.lexer.token_is(&[TokenKind::Insert]) {
            return Err(self.unexpected("an expression. A value token or an insert token were expected"));
        }

        if self.lexer.token_is(skip) {
            return l.ok_or_else(|| self.unexpected("an expression"));
        }

        if let Some(node) = l.take() {
            let is_keyword = matches!(&node.kind, NodeKind::Word(w) if keywords::is_keyword(w));
            l = Some(if is_keyword { self.parse_keyword(scope, node)? } else { node });
        }

        let inner_skip: Vec<TokenKind> = skip.iter().copied().chain([TokenKind::Insert]).collect();

        while !self.lexer.token_is_end() && self.lexer.has_more_tokens() {
            if self.lexer.token_is(skip) {
                break;
            }
            let kind = self.lexer.peek().kind;
            if kind == TokenKind::Insert {
                l = Some(self.parse_insert(scope, l, &inner_skip)?);
                continue;
            }
            let Some(left) = l.take() else {
                return Err(self.unexpected("an expression"));
            };
            l = Some(if kind.is_postfix() {
                match kind {
                    TokenKind::Bang => self.parse_call_empty(scope, left)?,
                    TokenKind::Call => self.parse_call(scope, left, &inner_skip)?,
                    TokenKind::Colon => self.parse_act(scope, left, &inner_skip)?,
                    TokenKind::Dot => self.parse_member(scope, left)?,
                    TokenKind::LBrace => self.parse_subscript(scope, left)?,
                    _ => self.parse_call_parens(scope, left, &inner_skip)?,
                }
            } else if self.lexer.token_is_operator() {
                self.parse_operator(scope, left, &inner_skip)?
            } else {
                l = Some(left);
                break;
            });
        }

        l.ok_or_else(|| self.unexpected("an expression"))
    }

    fn parse_operator(&mut self, scope: &Rc<ScopeMeta>, l: Node, skip: &[TokenKind]) -> PResult<Node> {
        let Some(op) = ops::lookup(self.lexer.peek().value.trim()) else {
            return Err(self.unexpected("an operator"));
        };
        if op == BinOp::Insert {
            return self.parse_insert(scope, Some(l), skip);
        }

        let start = l.span;
        self.lexer.consume();
        let r_skip: Vec<TokenKind> = [TokenKind::Operator].into_iter().chain(skip.iter().copied()).collect();
        let r = self.parse_expression(scope, &r_skip)?;
        Ok(self.expr(ExprKind::Binary { op, l, r }, scope, self.span_from(start)))
    }

    fn parse_keyword(&mut self, scope: &Rc<ScopeMeta>, l: Node) -> PResult<Node> {
        let start = l.span;
        let name = l.name().unwrap_or_default().to_owned();
        let mut args = Vec::new();
        self.lexer.fwd();

        while !self.lexer.next_if(&[TokenKind::Comma])
            && self.lexer.has_more_tokens()
            && !self.lexer.token_is_end()
            && !self.lexer.token_is_operator()
        {
            args.push(self.parse_expression(scope, &[])?);
            self.lexer.fwd();
        }

        Ok(self.expr(ExprKind::Keyword { name, args }, scope, self.span_from(start)))
    }

    fn parse_member(&mut self, scope: &Rc<ScopeMeta>, l: Node) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::Dot])?;
        let start = l.span;
        let mut keys = Vec::new();

        while self.lexer.has_more_tokens() && self.lexer.next_if(&[TokenKind::Dot]) {
            self.lexer.expect(&[
                TokenKind::Word,
                TokenKind::Attribute,
                TokenKind::CssProp,
                TokenKind::Variable,
                TokenKind::LParen,
            ])?;
            keys.push(self.parse_value(scope)?);
        }

        Ok(self.expr(ExprKind::Member { l, keys }, scope, self.span_from(start)))
    }

    fn parse_subscript(&mut self, scope: &Rc<ScopeMeta>, l: Node) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::LBrace])?;
        let start = l.span;
        let mut indices = Vec::new();

        while self.lexer.has_more_tokens() && self.lexer.next_if(&[TokenKind::LBrace]) {
            self.lexer.fwd().expect_value()?;
            indices.push(self.parse_expression(scope, &[TokenKind::RBrace])?);
            self.lexer.fwd().expect(&[TokenKind::RBrace])?.next();
        }

        Ok(self.expr(ExprKind::Subscript { l, indices }, scope, self.span_from(start)))
    }

    fn parse_call_empty(&mut self, scope: &Rc<ScopeMeta>, l: Node) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::Bang])?.next();
        let start = l.span;
        Ok(self.expr(ExprKind::Call { l, args: Vec::new() }, scope, self.span_from(start)))
    }

    fn parse_insert(&mut self, scope: &Rc<ScopeMeta>, l: Option<Node>, skip: &[TokenKind]) -> PResult<Node> {
        let insert_token = self.lexer.expect(&[TokenKind::Insert])?.peek().clone();
        self.lexer.next().fwd();
        let start = match &l {
            Some(node) => node.span,
            None => Span::between(&insert_token, &insert_token),
        };
        let r = self.parse_expression(scope, skip)?;
        Ok(self.expr(ExprKind::Insert { l, r }, scope, self.span_from(start)))
    }

    fn parse_call(&mut self, scope: &Rc<ScopeMeta>, l: Node, skip: &[TokenKind]) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::Call])?.consume();
        let start = l.span;
        let mut args = Vec::new();

        while !self.lexer.token_is(&[TokenKind::Comma])
            && !self.lexer.token_is_end()
            && self.lexer.has_more_tokens()
        {
            if self.lexer.token_is(skip) {
                break;
            }
            args.push(self.parse_expression(scope, skip)?);
            self.lexer.fwd();
        }

        Ok(self.expr(ExprKind::Call { l, args }, scope, self.span_from(start)))
    }

    fn parse_call_parens(&mut self, scope: &Rc<ScopeMeta>, l: Node, skip: &[TokenKind]) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::LParen])?.consume();
        let start = l.span;
        let mut args = Vec::new();
        let mut closed = false;

        while self.lexer.has_more_tokens() {
            if self.lexer.next_if(&[TokenKind::RParen]) {
                closed = true;
                break;
            }
            if self.lexer.token_is(skip) {
                break;
            }
            args.push(self.parse_expression(scope, skip)?);
            self.lexer.fwd_with_comma();
        }

        if !closed && !self.lexer.token_is(skip) {
            return Err(self.unexpected("call arguments. A closing parenthesis was expected"));
        }
        Ok(self.expr(ExprKind::Call { l, args }, scope, self.span_from(start)))
    }

    fn parse_act(&mut self, scope: &Rc<ScopeMeta>, l: Node, skip: &[TokenKind]) -> PResult<Node> {
        self.lexer.expect(&[TokenKind::Colon])?.consume();
        let start = l.span;
        let mut args = Vec::new();

        while !self.lexer.next_if(&[TokenKind::Comma])
            && !self.lexer.token_is_end()
            && self.lexer.has_more_tokens()
        {
            if self.lexer.token_is(skip) {
                break;
            }
            args.push(self.parse_expression(scope, skip)?);
            self.lexer.fwd();
        }

        Ok(self.expr(ExprKind::Act { l, args }, scope, self.span_from(start)))
    }

    // ── Values ────────────────────────────────────────────────────────────────

    fn parse_value(&mut self, scope: &Rc<ScopeMeta>) -> PResult<Node> {
        self.lexer.expect_value()?;
        let start = self.lexer.peek().clone();

        let kind = match start.kind {
            TokenKind::List => return self.parse_spread(scope),
            TokenKind::Prefix => return self.parse_prefixed(scope),
            TokenKind::Arrow => self.parse_function(scope)?,
            TokenKind::Str => NodeKind::Str(unescape(strip_quotes(&start.value))),
            TokenKind::Url => NodeKind::Url(self.parse_url(&start.value)?),
            TokenKind::Path => NodeKind::Url(self.parse_path(&start.value)?),
            TokenKind::Dot => {
                let word = self.lexer.next().expect(&[TokenKind::Word])?.peek();
                NodeKind::Class(format!(".{}", word.value))
            }
            TokenKind::LCurly => {
                NodeKind::SelectorTemplate(self.parse_template(scope, TokenKind::LCurly, TokenKind::RCurly)?)
            }
            TokenKind::Backtick => {
                NodeKind::Template(self.parse_template(scope, TokenKind::Backtick, TokenKind::Backtick)?)
            }
            TokenKind::LParen | TokenKind::Do => NodeKind::Scope(self.parse_scope(scope)?),
            TokenKind::LBrace => self.parse_collection(scope)?,
            _ => self.parse_simple(scope, &start)?,
        };

        let node = Node::new(kind, Span::between(&start, self.lexer.peek()));
        self.lexer.next();
        Ok(node)
    }

    fn parse_simple(&self, scope: &Rc<ScopeMeta>, token: &Token) -> PResult<NodeKind> {
        let v = token.value.as_str();
        let tail = || v.get(1..).unwrap_or_default().to_owned();
        Ok(match token.kind {
            TokenKind::Word => NodeKind::Word(v.to_owned()),
            TokenKind::Number => match v.parse() {
                Ok(n) => NodeKind::Number(n),
                Err(_) => return Err(self.lexer.fail(format!("Invalid number \"{v}\"."))),
            },
            TokenKind::Dimension => match Dimension::parse(v) {
                Some(Dimension { number, unit }) => NodeKind::Dimension { number, unit },
                None => return Err(self.lexer.fail(format!("Invalid dimension \"{v}\"."))),
            },
            TokenKind::CssProp => NodeKind::CssProperty(tail()),
            TokenKind::Attribute => NodeKind::Attribute(tail()),
            TokenKind::Variable => NodeKind::Variable { name: tail(), scope: Rc::clone(scope) },
            TokenKind::Property => NodeKind::Property(tail()),
            TokenKind::Id => NodeKind::Id(v.to_owned()),
            TokenKind::Tag => NodeKind::Tag(v.trim_start_matches('<').trim_end_matches('>').to_owned()),
            _ => return Err(self.unexpected("a value")),
        })
    }

    fn parse_spread(&mut self, scope: &Rc<ScopeMeta>) -> PResult<Node> {
        let start = Span::between(self.lexer.peek(), self.lexer.peek());
        self.lexer.expect(&[TokenKind::List])?.next();
        let value = self.parse_expression(scope, &[])?;
        Ok(Node::new(NodeKind::Spread(Box::new(value)), self.span_from(start)))
    }

    fn parse_prefixed(&mut self, scope: &Rc<ScopeMeta>) -> PResult<Node> {
        let token = self.lexer.expect(&[TokenKind::Prefix])?.peek().clone();
        self.lexer.next().fwd().expect_value()?;
        let value = self.parse_value(scope)?;
        let span = self.span_from(Span::between(&token, &token));
        Ok(self.expr(ExprKind::Prefix { prefix: token.value, value }, scope, span))
    }

    fn parse_scope(&mut self, parent: &Rc<ScopeMeta>) -> PResult<Rc<Scope>> {
        let start = self.lexer.peek().clone();
        let end_kind = if self.lexer.expect(&[TokenKind::LParen, TokenKind::Do])?.token_is(&[TokenKind::Do]) {
            TokenKind::End
        } else {
            TokenKind::RParen
        };
        self.lexer.next();

        let meta = ScopeMeta::child(parent);
        let mut sentences = Vec::new();

        while !self.lexer.token_is(&[end_kind]) && self.lexer.has_more_tokens() {
            if let Some(sentence) = self.parse_sentence(&meta)? {
                sentences.push(sentence);
            }
            if self.lexer.token_is_end() && !self.lexer.token_is(&[end_kind]) {
                self.lexer.next().fwd();
            }
        }

        self.lexer.expect(&[end_kind])?;
        let span = Span::between(&start, self.lexer.peek());
        Ok(Rc::new(Scope { meta, sentences, span }))
    }

    fn parse_collection(&mut self, scope: &Rc<ScopeMeta>) -> PResult<NodeKind> {
        self.lexer.expect(&[TokenKind::LBrace])?.consume();

        if self.lexer.next_if(&[TokenKind::Colon]) {
            self.lexer.fwd().expect(&[TokenKind::RBrace])?;
            return Ok(NodeKind::Object(Vec::new()));
        }
        if self.lexer.fwd().token_is(&[TokenKind::RBrace]) {
            return Ok(NodeKind::Array(Vec::new()));
        }

        let initial = self.parse_expression(scope, &[TokenKind::Colon])?;
        self.lexer.fwd();

        if self.lexer.next_if(&[TokenKind::Comma])
            || self.lexer.token_is_value()
            || self.lexer.token_is(&[TokenKind::RBrace])
        {
            self.lexer.fwd();
            return Ok(NodeKind::Array(self.parse_array(scope, initial)?));
        }
        if self.lexer.next_if(&[TokenKind::Colon]) {
            self.lexer.fwd();
            let object_scope = ScopeMeta::child(scope);
            return Ok(NodeKind::Object(self.parse_object(&object_scope, initial)?));
        }

        Err(self.unexpected("a collection. Only colon, comma, rbrace and value tokens were expected"))
    }

    fn parse_array(&mut self, scope: &Rc<ScopeMeta>, first: Node) -> PResult<Vec<Node>> {
        let mut items = vec![first];
        self.lexer.fwd();

        while !self.lexer.token_is(&[TokenKind::RBrace]) && self.lexer.has_more_tokens() {
            items.push(self.parse_expression(scope, &[TokenKind::Colon])?);
            self.lexer.fwd_with_comma();
        }

        self.lexer.expect(&[TokenKind::RBrace])?;
        Ok(items)
    }

    fn parse_object(&mut self, scope: &Rc<ScopeMeta>, first_key: Node) -> PResult<Vec<(Node, Node)>> {
        let first_value = self.parse_expression(scope, &[TokenKind::Colon])?;
        let mut entries = vec![(first_key, first_value)];
        self.lexer.fwd_with_comma();

        while !self.lexer.token_is(&[TokenKind::RBrace]) && self.lexer.has_more_tokens() {
            let key = self.parse_expression(scope, &[TokenKind::Colon])?;
            self.lexer.fwd().expect(&[TokenKind::Colon])?.consume();
            let value = self.parse_expression(scope, &[TokenKind::Colon])?;
            entries.push((key, value));
            self.lexer.fwd_with_comma();
        }

        self.lexer.expect(&[TokenKind::RBrace])?;
        Ok(entries)
    }

    fn parse_function(&mut self, scope: &Rc<ScopeMeta>) -> PResult<NodeKind> {
        self.lexer
            .expect(&[TokenKind::Arrow])?
            .next()
            .fwd()
            .expect(&[TokenKind::Variable, TokenKind::List, TokenKind::LParen, TokenKind::Do])?;

        let mut params = Vec::new();
        let mut rest = None;

        while self.lexer.token_is(&[TokenKind::Variable]) && self.lexer.has_more_tokens() {
            params.push(self.lexer.peek().value[1..].to_owned());
            self.lexer.next().fwd();
        }

        if self.lexer.next_if(&[TokenKind::List]) {
            self.lexer.expect(&[TokenKind::Variable])?;
            rest = Some(self.lexer.peek().value[1..].to_owned());
            self.lexer.next().fwd();
        }

        let body = self.parse_scope(scope)?;
        Ok(NodeKind::Function(Rc::new(FunctionDef { params, rest, body })))
    }

    fn parse_template(
        &mut self,
        scope: &Rc<ScopeMeta>,
        start_kind: TokenKind,
        end_kind: TokenKind,
    ) -> PResult<Rc<Template>> {
        let start = self.lexer.peek().clone();
        let meta = ScopeMeta::child(scope);
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut sentences = Vec::new();

        self.lexer.expect(&[start_kind])?.next();

        while !self.lexer.token_is(&[end_kind]) && self.lexer.has_more_tokens() {
            if self.lexer.next_if(&[TokenKind::LCurly]) {
                while !self.lexer.tpl_mode() && self.lexer.has_more_tokens() {
                    match self.parse_sentence(&meta)? {
                        Some(sentence) => {
                            sentences.push(sentence);
                            if !text.is_empty() {
                                parts.push(Part::Text(std::mem::take(&mut text)));
                            }
                            parts.push(Part::Slot(sentences.len() - 1));
                        }
                        None => {
                            self.lexer.next();
                        }
                    }
                }
                self.lexer.next();
            }

            if self.lexer.token_is(&[end_kind, TokenKind::LCurly]) {
                continue;
            } else if self.lexer.next_if(&[TokenKind::Backslash]) {
                let mut chars = self.lexer.peek().value.chars();
                if let Some(c) = chars.next() {
                    text.push(escape_char(c));
                    text.push_str(chars.as_str());
                }
            } else {
                text.push_str(&self.lexer.peek().value);
            }

            self.lexer.next();
        }

        self.lexer.expect(&[end_kind])?;
        if !text.is_empty() {
            parts.push(Part::Text(text));
        }

        let scope = if sentences.is_empty() {
            None
        } else {
            let span = Span::between(&start, self.lexer.peek());
            Some(Rc::new(Scope { meta, sentences, span }))
        };
        Ok(Rc::new(Template { parts, scope }))
    }

    fn parse_url(&self, url: &str) -> PResult<String> {
        self.check_url(url, &["http", "https", "ws", "wss", "file"])
    }

    fn parse_path(&self, path: &str) -> PResult<String> {
        let url = format!("{}{path}", self.config.origin.trim_end_matches('/'));
        self.check_url(&url, &["http", "https"])
    }

    fn check_url(&self, url: &str, schemes: &[&str]) -> PResult<String> {
        if url.len() > MAX_URL_LEN {
            return Err(self.lexer.fail(format!("URL exceeds maximum length of {MAX_URL_LEN} characters.")));
        }
        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(self.lexer.fail(format!("Invalid URL \"{url}\"")));
        };
        let scheme = scheme.to_ascii_lowercase();
        if rest.is_empty() && scheme != "file" {
            return Err(self.lexer.fail(format!("Invalid URL \"{url}\"")));
        }
        if !schemes.contains(&scheme.as_str()) {
            let allowed: Vec<String> = schemes.iter().map(|s| format!("{s}:")).collect();
            return Err(self.lexer.fail(format!(
                "Invalid protocol \"{scheme}:\" in URL \"{url}\". Only {} are allowed.",
                allowed.join(", ")
            )));
        }
        Ok(url.to_owned())
    }
}

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 { &s[1..s.len() - 1] } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    use crate::script::node::Mode;

    fn root(src: &str) -> Rc<Scope> {
        parse(src, &Config::default()).unwrap_or_else(|e| panic!("{src:?}: {e}"))
    }

    fn first(src: &str) -> Node {
        root(src).sentences[0].value.clone()
    }

    /// Compact s-expression rendering of a node, for shape assertions.
    fn shape(node: &Node) -> String {
        match &node.kind {
            NodeKind::Number(n) => format!("{n}"),
            NodeKind::Str(s) => format!("{s:?}"),
            NodeKind::Dimension { number, unit } => format!("{number}{unit}"),
            NodeKind::Variable { name, .. } => format!("${name}"),
            NodeKind::Property(p) => format!(":{p}"),
            NodeKind::Attribute(a) => format!("@{a}"),
            NodeKind::CssProperty(c) => format!("*{c}"),
            NodeKind::Word(w) | NodeKind::Id(w) | NodeKind::Class(w) | NodeKind::Url(w) => w.clone(),
            NodeKind::Tag(t) => format!("<{t}>"),
            NodeKind::Spread(v) => format!("...{}", shape(v)),
            NodeKind::Array(items) => {
                format!("[{}]", items.iter().map(shape).collect::<Vec<_>>().join(" "))
            }
            NodeKind::Object(entries) => format!(
                "[{}]",
                entries.iter().map(|(k, v)| format!("{}: {}", shape(k), shape(v))).collect::<Vec<_>>().join(" ")
            ),
            NodeKind::Scope(s) => format!("({} sentences)", s.sentences.len()),
            NodeKind::Function(f) => format!("(-> {:?} {:?})", f.params, f.rest),
            NodeKind::Template(_) | NodeKind::SelectorTemplate(_) => "`tpl`".into(),
            NodeKind::Expr(e) => match &e.kind {
                ExprKind::Binary { op, l, r } => format!("({} {} {})", op.name(), shape(l), shape(r)),
                ExprKind::Insert { l, r } => {
                    format!("(insert {} {})", l.as_ref().map_or("_".into(), shape), shape(r))
                }
                ExprKind::Keyword { name, args } => {
                    format!("({name} {})", args.iter().map(shape).collect::<Vec<_>>().join(" "))
                }
                ExprKind::Prefix { prefix, value } => format!("({prefix} {})", shape(value)),
                ExprKind::Member { l, keys } => {
                    format!("(. {} {})", shape(l), keys.iter().map(shape).collect::<Vec<_>>().join(" "))
                }
                ExprKind::Subscript { l, indices } => {
                    format!("([] {} {})", shape(l), indices.iter().map(shape).collect::<Vec<_>>().join(" "))
                }
                ExprKind::Call { l, args } => {
                    format!("(call {} {})", shape(l), args.iter().map(shape).collect::<Vec<_>>().join(" "))
                }
                ExprKind::Act { l, args } => {
                    format!("(act {} {})", shape(l), args.iter().map(shape).collect::<Vec<_>>().join(" "))
                }
            },
        }
    }

    #[test]
    fn operators_chain_left_to_right() {
        assert_eq!(shape(&first("2 + 3 * 4")), "(mul (add 2 3) 4)");
        assert_eq!(shape(&first("$a = 1 + 2")), "(add (set $a 1) 2)");
        assert_eq!(shape(&first("1 is 1 and 2")), "(and (is 1 1) 2)");
    }

    #[test]
    fn postfix_binds_before_operators() {
        assert_eq!(shape(&first("$a.b + $c.d * 2")), "(mul (add (. $a b) (. $c d)) 2)");
        assert_eq!(shape(&first("$a[1] - 1")), "(sub ([] $a 1) 1)");
    }

    #[test]
    fn explicit_target() {
        let r = root("#out :text = 1");
        let s = &r.sentences[0];
        assert_eq!(shape(s.target.as_ref().unwrap()), "#out");
        assert_eq!(shape(&s.value), "(set :text 1)");
    }

    #[test]
    fn sentence_modes() {
        let r = root("$a ? $b else? $c; $d & $e >> $f");
        let modes: Vec<Mode> = r.sentences.iter().map(|s| s.mode).collect();
        assert_eq!(modes, vec![Mode::Condition, Mode::Branch, Mode::Sync, Mode::Async, Mode::Fwd, Mode::Sync]);
    }

    #[test]
    fn keyword_arguments() {
        assert_eq!(shape(&first("if $a (1) else (2)")), "(if $a (1 sentences) else (1 sentences))");
        assert_eq!(shape(&first("for $i from 1 to 3 ($x)")), "(for $i from 1 to 3 (1 sentences))");
        assert_eq!(shape(&first("break 1 + 2")), "(break (add 1 2))");
    }

    #[test]
    fn call_forms() {
        assert_eq!(shape(&first("f!")), "(call f )");
        assert_eq!(shape(&first("f(1, $a)")), "(call f 1 $a)");
        assert_eq!(shape(&first("f!: 1 2")), "(call f 1 2)");
        assert_eq!(shape(&first("*margin: 1px 2px")), "(act *margin 1px 2px)");
    }

    #[test]
    fn insert_forms() {
        assert_eq!(shape(&first("$a << 1")), "(insert $a 1)");
        assert_eq!(shape(&first("<< \"x\"")), "(insert _ \"x\")");
    }

    #[test]
    fn collections() {
        assert_eq!(shape(&first("[]")), "[]");
        assert_eq!(shape(&first("[:]")), "[]");
        assert_eq!(shape(&first("[1, 2 3]")), "[1 2 3]");
        assert_eq!(shape(&first("[a: 1, b: 2]")), "[a: 1 b: 2]");
        assert_eq!(shape(&first("[...$a, 1]")), "[...$a 1]");
        assert!(matches!(first("[:]").kind, NodeKind::Object(_)));
        assert!(matches!(first("[]").kind, NodeKind::Array(_)));
    }

    #[test]
    fn empty_collection_keeps_following_sentence() {
        let r = root("$a = []; $b = 1");
        assert_eq!(r.sentences.len(), 2);
        assert_eq!(shape(&r.sentences[1].value), "(set $b 1)");
    }

    #[test]
    fn functions_and_scopes() {
        assert_eq!(shape(&first("-> $a ...$rest ($a)")), "(-> [\"a\"] Some(\"rest\"))");
        assert_eq!(shape(&first("do 1; 2 end")), "(2 sentences)");
    }

    #[test]
    fn selector_values() {
        assert_eq!(shape(&first("<div>")), "<div>");
        assert_eq!(shape(&first(".item")), ".item");
        assert_eq!(shape(&first("#main")), "#main");
        assert_eq!(shape(&first("not $a")), "(not $a)");
    }

    #[test]
    fn string_escapes() {
        assert_eq!(shape(&first(r#""a\"b\n\{""#)), r#""a\"b\n{""#);
        assert_eq!(shape(&first(r"'\q'")), "\"q\"");
    }

    #[test]
    fn template_parts() {
        let node = first("`a {$x} b\\{c`");
        let NodeKind::Template(tpl) = &node.kind else { panic!("not a template") };
        assert_eq!(
            tpl.parts,
            vec![Part::Text("a ".into()), Part::Slot(0), Part::Text(" b{c".into())]
        );
        assert_eq!(tpl.scope.as_ref().unwrap().sentences.len(), 1);
    }

    #[test]
    fn template_without_slots() {
        let node = first("`plain`");
        let NodeKind::Template(tpl) = &node.kind else { panic!("not a template") };
        assert!(tpl.scope.is_none());
        assert_eq!(tpl.parts, vec![Part::Text("plain".into())]);
    }

    #[test]
    fn paths_resolve_against_origin() {
        let config = Config { origin: "https://example.com".into(), ..Config::default() };
        let r = parse("/api/items", &config).unwrap();
        assert_eq!(shape(&r.sentences[0].value), "https://example.com/api/items");
    }

    #[test]
    fn syntax_errors_carry_position() {
        let err = parse("$a = (1\n, 2)", &Config::default()).unwrap_err();
        assert_eq!(err.token.kind, TokenKind::Comma);
        assert_eq!(err.line, 2);

        assert!(parse("[1, 2", &Config::default()).is_err());
        assert!(parse("f(1", &Config::default()).is_err());
        assert!(parse("`open", &Config::default()).is_err());
        assert!(parse("a }", &Config::default()).is_err());
    }

    #[test]
    fn empty_source() {
        assert!(root("").sentences.is_empty());
        assert!(root(" ; ;\n").sentences.is_empty());
    }
}
