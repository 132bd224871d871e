//! Mode-stacked scanner turning PHP source text into tokens.
//!
//! The scanner keeps a stack of modes so that nested contexts unwind
//! correctly: `{$expr}` inside a double-quoted string pushes a scripting
//! mode whose closing `}` returns to the enclosing string, heredocs push a
//! mode that watches line starts for the closing label, and `$var[`/`$var->`
//! inside strings enter restricted offset/property modes.
//!
//! One `next_token` call emits exactly one token (or `Eof`). Whitespace and
//! comments are emitted as trivia tokens so that concatenating the literal
//! text of every token reproduces the source byte-for-byte; the parser
//! filters trivia out.

use crate::token::{Pos, Token, TokenKind, keyword_kind};

/// Scanner mode. The active mode is the top of the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Mode {
    /// Outside script tags; bytes pass through as inline HTML.
    Initial,
    /// Ordinary PHP code. `brace_depth` tracks `{`/`}` nesting so that the
    /// `}` closing a `{$…}` string interpolation can be told apart from
    /// braces belonging to the embedded expression.
    Scripting { brace_depth: u32 },
    /// Inside an interpolated double-quoted string.
    DoubleQuotes,
    /// Inside a backtick (shell-exec) string.
    Backtick,
    /// Inside an interpolating heredoc body.
    Heredoc { label: String },
    /// Inside a nowdoc body; no interpolation.
    Nowdoc { label: String },
    /// After `${` in a string: expecting a bare variable name.
    LookingForVarname,
    /// After `$var` in a string with `->` ahead: expecting arrow + name.
    LookingForProperty { seen_arrow: bool },
    /// After `$var` in a string with `[` ahead: restricted subscript.
    VarOffset,
}

/// The scanner itself. Construct with [`Lexer::new`], then pull tokens with
/// [`Lexer::next_token`] until `Eof`, or use [`tokenize`] to collect them all.
#[derive(Debug)]
pub struct Lexer {
    src: Vec<u8>,
    pos: usize,
    line: u32,
    column: u32,
    modes: Vec<Mode>,
}

/// Scans the entire source, returning every token including the final `Eof`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    tokens
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            src: source.as_bytes().to_vec(),
            pos: 0,
            line: 1,
            column: 1,
            modes: vec![Mode::Initial],
        }
    }

    fn here(&self) -> Pos {
        Pos { offset: self.pos, line: self.line, column: self.column }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.src.get(self.pos + ahead).copied()
    }

    /// True if the bytes at the current position start with `s`,
    /// compared case-insensitively.
    fn looking_at_nocase(&self, s: &str) -> bool {
        let bytes = s.as_bytes();
        self.src.len() - self.pos >= bytes.len()
            && self.src[self.pos..self.pos + bytes.len()]
                .iter()
                .zip(bytes)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    fn looking_at(&self, s: &str) -> bool {
        self.src[self.pos..].starts_with(s.as_bytes())
    }

    /// Consumes `n` bytes, updating line/column through every byte.
    fn advance(&mut self, n: usize) {
        for _ in 0..n {
            if let Some(&b) = self.src.get(self.pos) {
                self.pos += 1;
                if b == b'\n' {
                    self.line += 1;
                    self.column = 1;
                } else {
                    self.column += 1;
                }
            }
        }
    }

    fn make(&self, kind: TokenKind, start: Pos) -> Token {
        let text = String::from_utf8_lossy(&self.src[start.offset..self.pos]).into_owned();
        Token { kind, text, pos: start }
    }

    fn at_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    /// Emits the next token according to the active mode.
    pub fn next_token(&mut self) -> Token {
        if self.at_eof() {
            return Token::new(TokenKind::Eof, "", self.here());
        }
        match self.modes.last().cloned().unwrap_or(Mode::Initial) {
            Mode::Initial => self.lex_initial(),
            Mode::Scripting { .. } => self.lex_scripting(),
            Mode::DoubleQuotes => self.lex_double_quotes(),
            Mode::Backtick => self.lex_backtick(),
            Mode::Heredoc { label } => self.lex_heredoc(&label, true),
            Mode::Nowdoc { label } => self.lex_heredoc(&label, false),
            Mode::LookingForVarname => self.lex_varname(),
            Mode::LookingForProperty { seen_arrow } => self.lex_property(seen_arrow),
            Mode::VarOffset => self.lex_var_offset(),
        }
    }

    // --- Initial mode ---

    fn lex_initial(&mut self) -> Token {
        let start = self.here();
        if self.looking_at_nocase("<?php") {
            let after = self.peek_at(5);
            // The long open tag requires a following whitespace byte or EOF.
            if after.is_none() || matches!(after, Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.advance(5);
                self.modes.push(Mode::Scripting { brace_depth: 0 });
                return self.make(TokenKind::OpenTag, start);
            }
        }
        if self.looking_at("<?=") {
            self.advance(3);
            self.modes.push(Mode::Scripting { brace_depth: 0 });
            return self.make(TokenKind::OpenTagEcho, start);
        }
        // Inline text runs to the next candidate open tag or EOF.
        while !self.at_eof() {
            if self.peek() == Some(b'<') && self.peek_at(1) == Some(b'?') {
                if self.looking_at("<?=") {
                    break;
                }
                if self.looking_at_nocase("<?php") {
                    let after = self.peek_at(5);
                    if after.is_none() || matches!(after, Some(b' ' | b'\t' | b'\r' | b'\n')) {
                        break;
                    }
                }
            }
            self.advance(1);
        }
        self.make(TokenKind::InlineHtml, start)
    }

    // --- Scripting mode ---

    fn lex_scripting(&mut self) -> Token {
        let start = self.here();
        let b = match self.peek() {
            Some(b) => b,
            None => return Token::new(TokenKind::Eof, "", start),
        };

        // Whitespace is a token of its own; the parser filters it.
        if matches!(b, b' ' | b'\t' | b'\r' | b'\n') {
            while matches!(self.peek(), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                self.advance(1);
            }
            return self.make(TokenKind::Whitespace, start);
        }

        if self.looking_at("?>") {
            self.advance(2);
            self.modes.pop();
            return self.make(TokenKind::CloseTag, start);
        }

        // Comments before operator dispatch; `#[` is an attribute, not a comment.
        if self.looking_at("/*") {
            let doc = self.looking_at("/**") && self.peek_at(3) != Some(b'/');
            self.advance(2);
            while !self.at_eof() && !self.looking_at("*/") {
                self.advance(1);
            }
            self.advance(2);
            let kind = if doc { TokenKind::DocComment } else { TokenKind::Comment };
            return self.make(kind, start);
        }
        if self.looking_at("//") || (b == b'#' && self.peek_at(1) != Some(b'[')) {
            while !self.at_eof() && self.peek() != Some(b'\n') && !self.looking_at("?>") {
                self.advance(1);
            }
            return self.make(TokenKind::Comment, start);
        }
        if self.looking_at("#[") {
            self.advance(2);
            return self.make(TokenKind::AttributeStart, start);
        }

        if b.is_ascii_digit() || (b == b'.' && self.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            return self.lex_number(start);
        }

        // Binary string prefix: b'…' / b"…" behaves as the plain literal.
        if (b == b'b' || b == b'B') && matches!(self.peek_at(1), Some(b'\'' | b'"')) {
            self.advance(1);
            return match self.peek() {
                Some(b'\'') => self.lex_single_quoted(start),
                _ => self.lex_double_quoted_open(start),
            };
        }

        if b == b'\'' {
            return self.lex_single_quoted(start);
        }
        if b == b'"' {
            return self.lex_double_quoted_open(start);
        }
        if b == b'`' {
            self.advance(1);
            self.modes.push(Mode::Backtick);
            return self.make(TokenKind::Backtick, start);
        }
        if self.looking_at("<<<") {
            return self.lex_heredoc_start(start);
        }

        if b == b'$' {
            if self.peek_at(1).is_some_and(is_ident_start) {
                self.advance(1);
                while self.peek().is_some_and(is_ident_continue) {
                    self.advance(1);
                }
                return self.make(TokenKind::Variable, start);
            }
            self.advance(1);
            return self.make(TokenKind::Dollar, start);
        }

        if is_ident_start(b) {
            return self.lex_name(start);
        }
        if b == b'\\' && self.peek_at(1).is_some_and(is_ident_start) {
            return self.lex_name(start);
        }

        if b == b'(' {
            if let Some(token) = self.try_lex_cast(start) {
                return token;
            }
        }

        self.lex_operator(start)
    }

    /// Identifier / qualified name / keyword / magic constant.
    fn lex_name(&mut self, start: Pos) -> Token {
        let fully_qualified = self.peek() == Some(b'\\');
        if fully_qualified {
            self.advance(1);
        }
        let first_start = self.pos;
        self.scan_ident();
        let first = String::from_utf8_lossy(&self.src[first_start..self.pos]).into_owned();

        let mut segments = 1;
        while self.peek() == Some(b'\\') && self.peek_at(1).is_some_and(is_ident_start) {
            self.advance(1);
            self.scan_ident();
            segments += 1;
        }

        if fully_qualified {
            return self.make(TokenKind::FullyQualifiedName, start);
        }
        if segments > 1 {
            if first.eq_ignore_ascii_case("namespace") {
                return self.make(TokenKind::RelativeName, start);
            }
            return self.make(TokenKind::QualifiedName, start);
        }
        if let Some(kind) = keyword_kind(&first) {
            // `yield from` fuses into a single token, internal whitespace kept.
            if kind == TokenKind::KwYield {
                let mark = (self.pos, self.line, self.column);
                let mut ahead = 0;
                while matches!(self.peek_at(ahead), Some(b' ' | b'\t' | b'\r' | b'\n')) {
                    ahead += 1;
                }
                if ahead > 0 {
                    self.advance(ahead);
                    if self.looking_at_nocase("from")
                        && !self.peek_at(4).is_some_and(is_ident_continue)
                    {
                        self.advance(4);
                        return self.make(TokenKind::YieldFrom, start);
                    }
                    (self.pos, self.line, self.column) = mark;
                }
            }
            return self.make(kind, start);
        }
        self.make(TokenKind::Identifier, start)
    }

    fn scan_ident(&mut self) {
        while self.peek().is_some_and(is_ident_continue) {
            self.advance(1);
        }
    }

    fn lex_number(&mut self, start: Pos) -> Token {
        let digits = |lexer: &mut Self, pred: fn(u8) -> bool| {
            while let Some(b) = lexer.peek() {
                if pred(b) || (b == b'_' && lexer.peek_at(1).is_some_and(pred)) {
                    lexer.advance(1);
                } else {
                    break;
                }
            }
        };
        if self.peek() == Some(b'0') {
            match self.peek_at(1) {
                Some(b'x' | b'X') => {
                    self.advance(2);
                    digits(self, |b| b.is_ascii_hexdigit());
                    return self.make(TokenKind::IntLiteral, start);
                }
                Some(b'b' | b'B') => {
                    self.advance(2);
                    digits(self, |b| b == b'0' || b == b'1');
                    return self.make(TokenKind::IntLiteral, start);
                }
                Some(b'o' | b'O') => {
                    self.advance(2);
                    digits(self, |b| (b'0'..=b'7').contains(&b));
                    return self.make(TokenKind::IntLiteral, start);
                }
                _ => {}
            }
        }
        let mut float = false;
        digits(self, |b| b.is_ascii_digit());
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            float = true;
            self.advance(1);
            digits(self, |b| b.is_ascii_digit());
        } else if self.peek() == Some(b'.') && self.src.get(start.offset) != Some(&b'.') {
            // Trailing-dot float like `1.` unless the dot starts an ellipsis
            // or member-ish context; `1..` never occurs in valid code anyway.
            if self.peek_at(1) != Some(b'.') {
                float = true;
                self.advance(1);
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut ahead = 1;
            if matches!(self.peek_at(1), Some(b'+' | b'-')) {
                ahead = 2;
            }
            if self.peek_at(ahead).is_some_and(|b| b.is_ascii_digit()) {
                float = true;
                self.advance(ahead);
                digits(self, |b| b.is_ascii_digit());
            }
        }
        let kind = if float { TokenKind::FloatLiteral } else { TokenKind::IntLiteral };
        self.make(kind, start)
    }

    fn lex_single_quoted(&mut self, start: Pos) -> Token {
        self.advance(1); // opening quote
        while let Some(b) = self.peek() {
            if b == b'\\' && matches!(self.peek_at(1), Some(b'\\' | b'\'')) {
                self.advance(2);
            } else if b == b'\'' {
                self.advance(1);
                return self.make(TokenKind::SingleQuoted, start);
            } else {
                self.advance(1);
            }
        }
        // Unterminated: surface what we have as an illegal token.
        self.make(TokenKind::Illegal, start)
    }

    /// Pre-scans a double-quoted literal to decide constant vs. interpolated.
    fn lex_double_quoted_open(&mut self, start: Pos) -> Token {
        let mut scan = self.pos + 1;
        let mut interpolated = false;
        while let Some(&b) = self.src.get(scan) {
            match b {
                b'\\' => scan += 2,
                b'"' => break,
                b'$' => {
                    if self.src.get(scan + 1).is_some_and(|&c| is_ident_start(c) || c == b'{') {
                        interpolated = true;
                        break;
                    }
                    scan += 1;
                }
                b'{' => {
                    if self.src.get(scan + 1) == Some(&b'$') {
                        interpolated = true;
                        break;
                    }
                    scan += 1;
                }
                _ => scan += 1,
            }
        }
        if interpolated {
            self.advance(1);
            self.modes.push(Mode::DoubleQuotes);
            return self.make(TokenKind::DoubleQuote, start);
        }
        // Constant string: emit it whole, quotes included.
        self.advance(1);
        while let Some(b) = self.peek() {
            if b == b'\\' && self.peek_at(1).is_some() {
                self.advance(2);
            } else if b == b'"' {
                self.advance(1);
                return self.make(TokenKind::DoubleQuoted, start);
            } else {
                self.advance(1);
            }
        }
        self.make(TokenKind::Illegal, start)
    }

    fn lex_heredoc_start(&mut self, start: Pos) -> Token {
        self.advance(3);
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.advance(1);
        }
        let quote = match self.peek() {
            Some(q @ (b'\'' | b'"')) => {
                self.advance(1);
                Some(q)
            }
            _ => None,
        };
        let label_start = self.pos;
        self.scan_ident();
        let label = String::from_utf8_lossy(&self.src[label_start..self.pos]).into_owned();
        if label.is_empty() {
            return self.make(TokenKind::Illegal, start);
        }
        if let Some(q) = quote {
            if self.peek() == Some(q) {
                self.advance(1);
            } else {
                return self.make(TokenKind::Illegal, start);
            }
        }
        if self.peek() == Some(b'\r') {
            self.advance(1);
        }
        if self.peek() == Some(b'\n') {
            self.advance(1);
        }
        let mode = if quote == Some(b'\'') {
            Mode::Nowdoc { label }
        } else {
            Mode::Heredoc { label }
        };
        self.modes.push(mode);
        self.make(TokenKind::StartHeredoc, start)
    }

    /// Looks for the closing label at the current position, which must be a
    /// line start. Returns the byte length of indentation + label on a match.
    fn heredoc_end_at(&self, at: usize, label: &str) -> Option<usize> {
        let mut scan = at;
        while matches!(self.src.get(scan), Some(b' ' | b'\t')) {
            scan += 1;
        }
        let bytes = label.as_bytes();
        if !self.src[scan..].starts_with(bytes) {
            return None;
        }
        let after = self.src.get(scan + bytes.len());
        // Label ends the body when followed by anything that cannot continue
        // an identifier (`;`, newline, operators) or by end of input.
        if after.is_none() || !after.copied().is_some_and(is_ident_continue) {
            Some(scan + bytes.len() - at)
        } else {
            None
        }
    }

    fn at_line_start(&self) -> bool {
        self.pos == 0 || self.src.get(self.pos - 1) == Some(&b'\n')
    }

    fn lex_heredoc(&mut self, label: &str, interpolating: bool) -> Token {
        let start = self.here();
        if self.at_line_start() {
            if let Some(len) = self.heredoc_end_at(self.pos, label) {
                self.advance(len);
                self.modes.pop();
                return self.make(TokenKind::EndHeredoc, start);
            }
        }
        if interpolating {
            if let Some(token) = self.lex_interp_special(start) {
                return token;
            }
        }
        // Fragment: run until an interpolation trigger or a line whose start
        // carries the closing label.
        loop {
            let Some(b) = self.peek() else { break };
            if interpolating && self.interp_trigger() {
                break;
            }
            self.advance(1);
            if b == b'\n' && self.heredoc_end_at(self.pos, label).is_some() {
                break;
            }
            if interpolating && b == b'\\' && self.peek().is_some() {
                self.advance(1);
            }
        }
        self.make(TokenKind::StringFragment, start)
    }

    /// True when the bytes at the cursor begin `$ident`, `${` or `{$`.
    fn interp_trigger(&self) -> bool {
        match self.peek() {
            Some(b'$') => self.peek_at(1).is_some_and(|c| is_ident_start(c) || c == b'{'),
            Some(b'{') => self.peek_at(1) == Some(b'$'),
            _ => false,
        }
    }

    /// Handles `$var`, `${…}` and `{$` at the cursor inside any interpolating
    /// string mode. Returns `None` when the cursor is not on a trigger.
    fn lex_interp_special(&mut self, start: Pos) -> Option<Token> {
        match self.peek() {
            Some(b'$') if self.peek_at(1).is_some_and(is_ident_start) => {
                self.advance(1);
                self.scan_ident();
                // `->prop` and `[offset]` continue the simple interpolation.
                if self.peek() == Some(b'-')
                    && self.peek_at(1) == Some(b'>')
                    && self.peek_at(2).is_some_and(is_ident_start)
                {
                    self.modes.push(Mode::LookingForProperty { seen_arrow: false });
                } else if self.peek() == Some(b'[') {
                    self.modes.push(Mode::VarOffset);
                }
                Some(self.make(TokenKind::Variable, start))
            }
            Some(b'$') if self.peek_at(1) == Some(b'{') => {
                self.advance(2);
                self.modes.push(Mode::LookingForVarname);
                Some(self.make(TokenKind::DollarOpenCurly, start))
            }
            Some(b'{') if self.peek_at(1) == Some(b'$') => {
                self.advance(1);
                self.modes.push(Mode::Scripting { brace_depth: 0 });
                Some(self.make(TokenKind::CurlyOpen, start))
            }
            _ => None,
        }
    }

    fn lex_double_quotes(&mut self) -> Token {
        let start = self.here();
        if self.peek() == Some(b'"') {
            self.advance(1);
            self.modes.pop();
            return self.make(TokenKind::DoubleQuote, start);
        }
        if let Some(token) = self.lex_interp_special(start) {
            return token;
        }
        while let Some(b) = self.peek() {
            if b == b'"' || self.interp_trigger() {
                break;
            }
            self.advance(1);
            if b == b'\\' && self.peek().is_some() {
                self.advance(1);
            }
        }
        self.make(TokenKind::StringFragment, start)
    }

    fn lex_backtick(&mut self) -> Token {
        let start = self.here();
        if self.peek() == Some(b'`') {
            self.advance(1);
            self.modes.pop();
            return self.make(TokenKind::Backtick, start);
        }
        if let Some(token) = self.lex_interp_special(start) {
            return token;
        }
        while let Some(b) = self.peek() {
            if b == b'`' || self.interp_trigger() {
                break;
            }
            self.advance(1);
            if b == b'\\' && self.peek().is_some() {
                self.advance(1);
            }
        }
        self.make(TokenKind::StringFragment, start)
    }

    fn lex_varname(&mut self) -> Token {
        let start = self.here();
        if self.peek().is_some_and(is_ident_start) {
            // Peek past the name: `}` or `[` keeps this a simple varname.
            let mut ahead = 1;
            while self.peek_at(ahead).is_some_and(is_ident_continue) {
                ahead += 1;
            }
            if matches!(self.peek_at(ahead), Some(b'}' | b'[')) {
                self.advance(ahead);
                *self.modes.last_mut().expect("mode stack never empty") =
                    Mode::Scripting { brace_depth: 0 };
                return self.make(TokenKind::VarName, start);
            }
        }
        // Not a simple `${name…}`: fall back to a full expression context.
        *self.modes.last_mut().expect("mode stack never empty") = Mode::Scripting { brace_depth: 0 };
        self.lex_scripting()
    }

    fn lex_property(&mut self, seen_arrow: bool) -> Token {
        let start = self.here();
        if !seen_arrow {
            self.advance(2);
            *self.modes.last_mut().expect("mode stack never empty") =
                Mode::LookingForProperty { seen_arrow: true };
            return self.make(TokenKind::Arrow, start);
        }
        self.scan_ident();
        self.modes.pop();
        self.make(TokenKind::Identifier, start)
    }

    fn lex_var_offset(&mut self) -> Token {
        let start = self.here();
        match self.peek() {
            Some(b'[') => {
                self.advance(1);
                self.make(TokenKind::LeftBracket, start)
            }
            Some(b']') => {
                self.advance(1);
                self.modes.pop();
                self.make(TokenKind::RightBracket, start)
            }
            Some(b'-') => {
                self.advance(1);
                self.make(TokenKind::Minus, start)
            }
            Some(b'$') if self.peek_at(1).is_some_and(is_ident_start) => {
                self.advance(1);
                self.scan_ident();
                self.make(TokenKind::Variable, start)
            }
            Some(b) if b.is_ascii_digit() => {
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.advance(1);
                }
                self.make(TokenKind::IntLiteral, start)
            }
            Some(b) if is_ident_start(b) => {
                self.scan_ident();
                self.make(TokenKind::Identifier, start)
            }
            _ => {
                self.advance(1);
                self.modes.pop();
                self.make(TokenKind::Illegal, start)
            }
        }
    }

    /// Speculative `(type)` scan; backtracks to a plain `(` on failure.
    fn try_lex_cast(&mut self, start: Pos) -> Option<Token> {
        let mark = (self.pos, self.line, self.column);
        self.advance(1);
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.advance(1);
        }
        let word_start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.advance(1);
        }
        let word = String::from_utf8_lossy(&self.src[word_start..self.pos]).to_ascii_lowercase();
        let kind = match word.as_str() {
            "int" | "integer" => TokenKind::IntCast,
            "float" | "double" | "real" => TokenKind::FloatCast,
            "string" | "binary" => TokenKind::StringCast,
            "array" => TokenKind::ArrayCast,
            "object" => TokenKind::ObjectCast,
            "bool" | "boolean" => TokenKind::BoolCast,
            "unset" => TokenKind::UnsetCast,
            _ => {
                (self.pos, self.line, self.column) = mark;
                return None;
            }
        };
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.advance(1);
        }
        if self.peek() == Some(b')') {
            self.advance(1);
            Some(self.make(kind, start))
        } else {
            (self.pos, self.line, self.column) = mark;
            None
        }
    }

    fn lex_operator(&mut self, start: Pos) -> Token {
        // Longest match first.
        const THREE: &[(&str, TokenKind)] = &[
            ("===", TokenKind::Identical),
            ("!==", TokenKind::NotIdentical),
            ("<=>", TokenKind::Spaceship),
            ("**=", TokenKind::PowAssign),
            ("<<=", TokenKind::ShlAssign),
            (">>=", TokenKind::ShrAssign),
            ("??=", TokenKind::CoalesceAssign),
            ("...", TokenKind::Ellipsis),
            ("?->", TokenKind::NullsafeArrow),
        ];
        const TWO: &[(&str, TokenKind)] = &[
            ("==", TokenKind::Equal),
            ("!=", TokenKind::NotEqual),
            ("<>", TokenKind::NotEqual),
            ("<=", TokenKind::LessEqual),
            (">=", TokenKind::GreaterEqual),
            ("&&", TokenKind::BooleanAnd),
            ("||", TokenKind::BooleanOr),
            ("<<", TokenKind::Shl),
            (">>", TokenKind::Shr),
            ("++", TokenKind::Inc),
            ("--", TokenKind::Dec),
            ("+=", TokenKind::PlusAssign),
            ("-=", TokenKind::MinusAssign),
            ("*=", TokenKind::StarAssign),
            ("/=", TokenKind::SlashAssign),
            ("%=", TokenKind::PercentAssign),
            (".=", TokenKind::DotAssign),
            ("&=", TokenKind::AmpAssign),
            ("|=", TokenKind::PipeAssign),
            ("^=", TokenKind::CaretAssign),
            ("**", TokenKind::Pow),
            ("??", TokenKind::Coalesce),
            ("::", TokenKind::DoubleColon),
            ("->", TokenKind::Arrow),
            ("=>", TokenKind::DoubleArrow),
        ];
        for &(text, kind) in THREE {
            if self.looking_at(text) {
                self.advance(3);
                return self.make(kind, start);
            }
        }
        for &(text, kind) in TWO {
            if self.looking_at(text) {
                self.advance(2);
                return self.make(kind, start);
            }
        }
        let b = self.peek().unwrap_or(0);
        self.advance(1);
        let kind = match b {
            b';' => TokenKind::Semicolon,
            b',' => TokenKind::Comma,
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'{' => {
                if let Some(Mode::Scripting { brace_depth }) = self.modes.last_mut() {
                    *brace_depth += 1;
                }
                TokenKind::LeftBrace
            }
            b'}' => {
                let enclosing_is_string = self.modes.len() >= 2
                    && matches!(
                        self.modes[self.modes.len() - 2],
                        Mode::DoubleQuotes | Mode::Backtick | Mode::Heredoc { .. } | Mode::Nowdoc { .. }
                    );
                if let Some(Mode::Scripting { brace_depth }) = self.modes.last_mut() {
                    if *brace_depth > 0 {
                        *brace_depth -= 1;
                    } else if enclosing_is_string {
                        // This brace closes a `{$…}` interpolation; return to
                        // the enclosing string mode.
                        self.modes.pop();
                    }
                }
                TokenKind::RightBrace
            }
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b':' => TokenKind::Colon,
            b'?' => TokenKind::Question,
            b'@' => TokenKind::At,
            b'\\' => TokenKind::Backslash,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'.' => TokenKind::Dot,
            b'=' => TokenKind::Assign,
            b'<' => TokenKind::Less,
            b'>' => TokenKind::Greater,
            b'!' => TokenKind::Bang,
            b'&' => TokenKind::Ampersand,
            b'|' => TokenKind::Pipe,
            b'^' => TokenKind::Caret,
            b'~' => TokenKind::Tilde,
            _ => TokenKind::Illegal,
        };
        self.make(kind, start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| !k.is_trivia() && *k != TokenKind::Eof)
            .collect()
    }

    #[test]
    fn round_trips_source_text() {
        let sources = [
            "<?php echo \"a $b c {$d->e} f\"; ?>tail",
            "plain text only",
            "<?php $x = <<<EOT\nhello $name\nEOT;\n",
            "<?php // comment\n$a = 1 + 2.5e3;",
            "<?php $s = 'it\\'s';",
        ];
        for src in sources {
            let joined: String = tokenize(src).iter().map(|t| t.text.as_str()).collect();
            assert_eq!(joined, src, "round trip failed for {src:?}");
        }
    }

    #[test]
    fn open_tag_requires_boundary() {
        // `<?phpx` is not an open tag.
        let tokens = tokenize("<?phpx");
        assert_eq!(tokens[0].kind, TokenKind::InlineHtml);
    }

    #[test]
    fn short_echo_tag() {
        let kinds = kinds("<?= 1 ?>");
        assert_eq!(
            kinds,
            vec![TokenKind::OpenTagEcho, TokenKind::IntLiteral, TokenKind::CloseTag]
        );
    }

    #[test]
    fn double_quote_prescan_constant_vs_interpolated() {
        assert_eq!(kinds("<?php \"abc\";"), vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuoted,
            TokenKind::Semicolon
        ]);
        assert_eq!(kinds("<?php \"a$b\";"), vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuote,
            TokenKind::StringFragment,
            TokenKind::Variable,
            TokenKind::DoubleQuote,
            TokenKind::Semicolon
        ]);
        // Escaped dollar stays constant.
        assert_eq!(kinds("<?php \"a\\$b\";"), vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuoted,
            TokenKind::Semicolon
        ]);
    }

    #[test]
    fn curly_interpolation_returns_to_string_mode() {
        let kinds = kinds("<?php \"x{$a['k']}y\";");
        assert_eq!(kinds, vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuote,
            TokenKind::StringFragment,
            TokenKind::CurlyOpen,
            TokenKind::Variable,
            TokenKind::LeftBracket,
            TokenKind::SingleQuoted,
            TokenKind::RightBracket,
            TokenKind::RightBrace,
            TokenKind::StringFragment,
            TokenKind::DoubleQuote,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn string_property_interpolation() {
        let kinds = kinds("<?php \"$obj->name!\";");
        assert_eq!(kinds, vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuote,
            TokenKind::Variable,
            TokenKind::Arrow,
            TokenKind::Identifier,
            TokenKind::StringFragment,
            TokenKind::DoubleQuote,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn string_offset_interpolation() {
        let kinds = kinds("<?php \"$a[0]$a[k]$a[$i]\";");
        assert_eq!(kinds, vec![
            TokenKind::OpenTag,
            TokenKind::DoubleQuote,
            TokenKind::Variable,
            TokenKind::LeftBracket,
            TokenKind::IntLiteral,
            TokenKind::RightBracket,
            TokenKind::Variable,
            TokenKind::LeftBracket,
            TokenKind::Identifier,
            TokenKind::RightBracket,
            TokenKind::Variable,
            TokenKind::LeftBracket,
            TokenKind::Variable,
            TokenKind::RightBracket,
            TokenKind::DoubleQuote,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn heredoc_and_nowdoc() {
        let kinds = kinds("<?php $x = <<<EOT\nline $v\nEOT;\n$y = <<<'RAW'\nno $interp\nRAW;\n");
        assert_eq!(kinds, vec![
            TokenKind::OpenTag,
            TokenKind::Variable,
            TokenKind::Assign,
            TokenKind::StartHeredoc,
            TokenKind::StringFragment,
            TokenKind::Variable,
            TokenKind::StringFragment,
            TokenKind::EndHeredoc,
            TokenKind::Semicolon,
            TokenKind::Variable,
            TokenKind::Assign,
            TokenKind::StartHeredoc,
            TokenKind::StringFragment,
            TokenKind::EndHeredoc,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn indented_heredoc_end() {
        let tokens = tokenize("<?php $x = <<<EOT\n  body\n  EOT;\n");
        let end = tokens.iter().find(|t| t.kind == TokenKind::EndHeredoc).unwrap();
        assert_eq!(end.text, "  EOT");
    }

    #[test]
    fn casts_and_parens() {
        assert_eq!(kinds("<?php (int) $x;"), vec![
            TokenKind::OpenTag,
            TokenKind::IntCast,
            TokenKind::Variable,
            TokenKind::Semicolon
        ]);
        assert_eq!(kinds("<?php ( integer ) $x;"), vec![
            TokenKind::OpenTag,
            TokenKind::IntCast,
            TokenKind::Variable,
            TokenKind::Semicolon
        ]);
        // Not a cast: plain grouping.
        assert_eq!(kinds("<?php (intval) ;")[1], TokenKind::LeftParen);
    }

    #[test]
    fn number_forms() {
        let tokens: Vec<_> = tokenize("<?php 0xFF 0b101 0o17 017 1_000_000 1.5e-3 .5 10")
            .into_iter()
            .filter(|t| matches!(t.kind, TokenKind::IntLiteral | TokenKind::FloatLiteral))
            .map(|t| (t.kind, t.text))
            .collect();
        assert_eq!(tokens, vec![
            (TokenKind::IntLiteral, "0xFF".to_owned()),
            (TokenKind::IntLiteral, "0b101".to_owned()),
            (TokenKind::IntLiteral, "0o17".to_owned()),
            (TokenKind::IntLiteral, "017".to_owned()),
            (TokenKind::IntLiteral, "1_000_000".to_owned()),
            (TokenKind::FloatLiteral, "1.5e-3".to_owned()),
            (TokenKind::FloatLiteral, ".5".to_owned()),
            (TokenKind::IntLiteral, "10".to_owned()),
        ]);
    }

    #[test]
    fn qualified_name_forms() {
        assert_eq!(kinds("<?php A\\B \\A\\B namespace\\A;"), vec![
            TokenKind::OpenTag,
            TokenKind::QualifiedName,
            TokenKind::FullyQualifiedName,
            TokenKind::RelativeName,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn yield_from_fuses() {
        let tokens = tokenize("<?php yield  from $g;");
        let fused = tokens.iter().find(|t| t.kind == TokenKind::YieldFrom).unwrap();
        assert_eq!(fused.text, "yield  from");
    }

    #[test]
    fn attribute_start_vs_hash_comment() {
        assert_eq!(kinds("<?php #[Attr] # plain\n$x;"), vec![
            TokenKind::OpenTag,
            TokenKind::AttributeStart,
            TokenKind::Identifier,
            TokenKind::RightBracket,
            TokenKind::Variable,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn dollar_dollar_variable() {
        assert_eq!(kinds("<?php $$name;"), vec![
            TokenKind::OpenTag,
            TokenKind::Dollar,
            TokenKind::Variable,
            TokenKind::Semicolon,
        ]);
    }

    #[test]
    fn line_comment_stops_at_close_tag() {
        let kinds = kinds("<?php // note ?>after");
        assert_eq!(kinds, vec![TokenKind::OpenTag, TokenKind::CloseTag, TokenKind::InlineHtml]);
    }
}
