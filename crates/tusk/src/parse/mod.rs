//! Token stream → syntax tree.
//!
//! Statements dispatch on their first significant token; expressions use a
//! Pratt precedence climber (see `expr.rs`). On malformed input the parser
//! records an error, emits a `Bad` node and resynchronizes at the next `;`,
//! `}` or open tag, so a single mistake does not cascade.

mod expr;

pub use expr::decode_double_quoted;

use crate::{
    ast::{
        AttributeSpec, CatchClause, ClassDecl, ClassKind, ClassMember, Decl, DeclKind, Expr,
        ExprKind, FuncDecl, MemberModifiers, Param, Program, PropHook, Stmt, StmtKind, SwitchCase,
        TraitAdaptation, TypeExpr, UseItem, UseKind, Visibility, contains_yield,
    },
    lexer::tokenize,
    token::{Pos, Token, TokenKind},
};

/// A parse diagnostic with the position it was raised at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub pos: Pos,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error: {} at {}", self.message, self.pos)
    }
}

/// Parses a full source file. Always returns a tree; any recorded errors
/// correspond to `Bad` nodes inside it.
pub fn parse(source: &str) -> (Program, Vec<ParseError>) {
    let tokens: Vec<Token> = tokenize(source)
        .into_iter()
        .filter(|t| !t.kind.is_trivia())
        .collect();
    let mut parser = Parser { tokens, index: 0, errors: Vec::new() };
    let program = parser.parse_program();
    (program, parser.errors)
}

pub(crate) struct Parser {
    pub(crate) tokens: Vec<Token>,
    pub(crate) index: usize,
    pub(crate) errors: Vec<ParseError>,
}

impl Parser {
    // --- cursor helpers ---

    pub(crate) fn cur(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    pub(crate) fn kind(&self) -> TokenKind {
        self.cur().kind
    }

    pub(crate) fn kind_at(&self, ahead: usize) -> TokenKind {
        self.tokens
            .get(self.index + ahead)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    pub(crate) fn pos(&self) -> Pos {
        self.cur().pos
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.cur().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    pub(crate) fn accept(&mut self, kind: TokenKind) -> Option<Token> {
        (self.kind() == kind).then(|| self.bump())
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Token {
        if self.kind() == kind {
            self.bump()
        } else {
            self.error(format!("expected {kind}, found {}", self.kind()));
            Token::new(kind, "", self.pos())
        }
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.errors.push(ParseError { message: message.into(), pos: self.pos() });
    }

    /// Skips ahead to the next statement boundary after an error.
    pub(crate) fn resync(&mut self) {
        loop {
            match self.kind() {
                TokenKind::Eof | TokenKind::RightBrace | TokenKind::OpenTag | TokenKind::OpenTagEcho => return,
                TokenKind::Semicolon | TokenKind::CloseTag => {
                    self.bump();
                    return;
                }
                _ => {
                    self.bump();
                }
            }
        }
    }

    /// `;` or the statement-terminating `?>`; EOF also closes a statement.
    fn expect_stmt_end(&mut self) {
        match self.kind() {
            TokenKind::Semicolon => {
                self.bump();
            }
            TokenKind::CloseTag | TokenKind::Eof => {}
            _ => {
                self.error(format!("expected ';', found {}", self.kind()));
                self.resync();
            }
        }
    }

    // --- program ---

    fn parse_program(&mut self) -> Program {
        let mut stmts = Vec::new();
        while self.kind() != TokenKind::Eof {
            if let Some(stmt) = self.parse_top_token() {
                stmts.push(stmt);
            }
        }
        let strict_types = stmts.iter().any(|s| match &s.kind {
            StmtKind::Declare { directives, .. } => directives.iter().any(|(name, value)| {
                name.eq_ignore_ascii_case("strict_types")
                    && matches!(value.kind, ExprKind::Int(1))
            }),
            _ => false,
        });
        Program { stmts, strict_types }
    }

    /// Handles the tag-level tokens that interleave statements; returns a
    /// statement when one starts here.
    fn parse_top_token(&mut self) -> Option<Stmt> {
        match self.kind() {
            TokenKind::InlineHtml => {
                let token = self.bump();
                Some(Stmt::new(StmtKind::InlineHtml(token.text.into_bytes()), token.pos))
            }
            TokenKind::OpenTag | TokenKind::CloseTag => {
                self.bump();
                None
            }
            TokenKind::OpenTagEcho => {
                let pos = self.bump().pos;
                let exprs = self.parse_expr_list_until_stmt_end();
                Some(Stmt::new(StmtKind::Echo(exprs), pos))
            }
            _ => Some(self.parse_stmt()),
        }
    }

    fn parse_expr_list_until_stmt_end(&mut self) -> Vec<Expr> {
        let mut exprs = vec![self.parse_expr_root()];
        while self.accept(TokenKind::Comma).is_some() {
            exprs.push(self.parse_expr_root());
        }
        self.expect_stmt_end();
        exprs
    }

    // --- statements ---

    pub(crate) fn parse_stmt(&mut self) -> Stmt {
        let pos = self.pos();
        match self.kind() {
            TokenKind::Semicolon => {
                self.bump();
                Stmt::new(StmtKind::Empty, pos)
            }
            TokenKind::CloseTag | TokenKind::OpenTag => {
                self.bump();
                Stmt::new(StmtKind::Empty, pos)
            }
            TokenKind::InlineHtml => {
                let token = self.bump();
                Stmt::new(StmtKind::InlineHtml(token.text.into_bytes()), token.pos)
            }
            TokenKind::OpenTagEcho => {
                self.bump();
                let exprs = self.parse_expr_list_until_stmt_end();
                Stmt::new(StmtKind::Echo(exprs), pos)
            }
            TokenKind::LeftBrace => {
                self.bump();
                let body = self.parse_stmts_until(TokenKind::RightBrace);
                self.expect(TokenKind::RightBrace);
                Stmt::new(StmtKind::Block(body), pos)
            }
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwSwitch => self.parse_switch(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwDo => self.parse_do_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwForeach => self.parse_foreach(),
            TokenKind::KwBreak | TokenKind::KwContinue => self.parse_break_continue(),
            TokenKind::KwReturn => {
                self.bump();
                let value = if matches!(self.kind(), TokenKind::Semicolon | TokenKind::CloseTag | TokenKind::Eof)
                {
                    None
                } else {
                    Some(self.parse_expr_root())
                };
                self.expect_stmt_end();
                Stmt::new(StmtKind::Return(value), pos)
            }
            TokenKind::KwGoto => {
                self.bump();
                let label = self.expect(TokenKind::Identifier).text;
                self.expect_stmt_end();
                Stmt::new(StmtKind::Goto(label), pos)
            }
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwThrow => {
                self.bump();
                let value = self.parse_expr_root();
                self.expect_stmt_end();
                Stmt::new(StmtKind::Throw(value), pos)
            }
            TokenKind::KwEcho => {
                self.bump();
                let exprs = self.parse_expr_list_until_stmt_end();
                Stmt::new(StmtKind::Echo(exprs), pos)
            }
            TokenKind::KwGlobal => {
                self.bump();
                let mut names = vec![self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned()];
                while self.accept(TokenKind::Comma).is_some() {
                    names.push(self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned());
                }
                self.expect_stmt_end();
                Stmt::new(StmtKind::Global(names), pos)
            }
            TokenKind::KwStatic if self.kind_at(1) == TokenKind::Variable => {
                self.bump();
                let mut vars = Vec::new();
                loop {
                    let name = self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned();
                    let init = self.accept(TokenKind::Assign).map(|_| self.parse_expr_root());
                    vars.push((name, init));
                    if self.accept(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                self.expect_stmt_end();
                Stmt::new(StmtKind::StaticVars(vars), pos)
            }
            TokenKind::KwUnset => {
                self.bump();
                self.expect(TokenKind::LeftParen);
                let mut targets = vec![self.parse_expr_root()];
                while self.accept(TokenKind::Comma).is_some() {
                    if self.kind() == TokenKind::RightParen {
                        break;
                    }
                    targets.push(self.parse_expr_root());
                }
                self.expect(TokenKind::RightParen);
                self.expect_stmt_end();
                Stmt::new(StmtKind::Unset(targets), pos)
            }
            TokenKind::KwDeclare => self.parse_declare(),
            TokenKind::KwConst => {
                self.bump();
                let entries = self.parse_const_entries();
                self.expect_stmt_end();
                Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Const(entries), pos }), pos)
            }
            TokenKind::KwNamespace
                if self.kind_at(1) != TokenKind::Backslash =>
            {
                self.parse_namespace()
            }
            TokenKind::KwUse => self.parse_use(),
            TokenKind::KwFunction
                if self.kind_at(1) == TokenKind::Identifier
                    || (self.kind_at(1) == TokenKind::Ampersand
                        && self.kind_at(2) == TokenKind::Identifier) =>
            {
                let func = self.parse_function_decl(Vec::new());
                Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Function(func), pos }), pos)
            }
            TokenKind::KwAbstract
            | TokenKind::KwFinal
            | TokenKind::KwReadonly
            | TokenKind::KwClass
            | TokenKind::KwInterface
            | TokenKind::KwTrait => self.parse_class_like(Vec::new()),
            TokenKind::KwEnum if self.kind_at(1) == TokenKind::Identifier => {
                self.parse_class_like(Vec::new())
            }
            TokenKind::AttributeStart => {
                let attrs = self.parse_attribute_groups();
                match self.kind() {
                    TokenKind::KwFunction => {
                        let func = self.parse_function_decl(attrs);
                        Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Function(func), pos }), pos)
                    }
                    TokenKind::KwAbstract
                    | TokenKind::KwFinal
                    | TokenKind::KwReadonly
                    | TokenKind::KwClass
                    | TokenKind::KwInterface
                    | TokenKind::KwTrait
                    | TokenKind::KwEnum => self.parse_class_like(attrs),
                    _ => {
                        self.error("attributes must precede a declaration");
                        self.resync();
                        Stmt::new(StmtKind::Bad, pos)
                    }
                }
            }
            TokenKind::Identifier if self.kind_at(1) == TokenKind::Colon => {
                let name = self.bump().text;
                self.bump(); // `:`
                Stmt::new(StmtKind::Label(name), pos)
            }
            TokenKind::Identifier if self.cur().text.eq_ignore_ascii_case("__halt_compiler") => {
                self.bump();
                self.accept(TokenKind::LeftParen);
                self.accept(TokenKind::RightParen);
                self.accept(TokenKind::Semicolon);
                // Everything after __halt_compiler(); is data, not code.
                self.index = self.tokens.len() - 1;
                Stmt::new(StmtKind::HaltCompiler, pos)
            }
            TokenKind::Eof => Stmt::new(StmtKind::Empty, pos),
            _ => {
                let before = self.index;
                let expr = self.parse_expr_root();
                if matches!(expr.kind, ExprKind::Bad) && self.index == before {
                    // The expression parser could not consume anything; eat
                    // the offending token so the statement loop always makes
                    // progress, then resynchronize.
                    self.error(format!("unexpected {}", self.kind()));
                    if self.kind() != TokenKind::Eof {
                        self.bump();
                    }
                    self.resync();
                    return Stmt::new(StmtKind::Bad, pos);
                }
                self.expect_stmt_end();
                Stmt::new(StmtKind::Expr(expr), pos)
            }
        }
    }

    pub(crate) fn parse_stmts_until(&mut self, end: TokenKind) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while self.kind() != end && self.kind() != TokenKind::Eof {
            stmts.push(self.parse_stmt());
        }
        stmts
    }

    /// A loop/branch body: either `{ … }` or a single statement. The
    /// alternative `: … endX;` syntax is handled by the individual
    /// constructs since each has its own end keyword.
    fn parse_body(&mut self) -> Vec<Stmt> {
        if self.kind() == TokenKind::LeftBrace {
            self.bump();
            let body = self.parse_stmts_until(TokenKind::RightBrace);
            self.expect(TokenKind::RightBrace);
            body
        } else {
            vec![self.parse_stmt()]
        }
    }

    /// Alternative-syntax body: statements until one of `stops`.
    fn parse_alt_body(&mut self, stops: &[TokenKind]) -> Vec<Stmt> {
        let mut stmts = Vec::new();
        while !stops.contains(&self.kind()) && self.kind() != TokenKind::Eof {
            stmts.push(self.parse_stmt());
        }
        stmts
    }

    fn parse_if(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let cond = self.parse_expr_root();
        self.expect(TokenKind::RightParen);

        if self.accept(TokenKind::Colon).is_some() {
            // if (…): … elseif (…): … else: … endif;
            const STOPS: &[TokenKind] = &[TokenKind::KwElseif, TokenKind::KwElse, TokenKind::KwEndif];
            let then = self.parse_alt_body(STOPS);
            let mut elseifs = Vec::new();
            let mut else_ = None;
            loop {
                match self.kind() {
                    TokenKind::KwElseif => {
                        self.bump();
                        self.expect(TokenKind::LeftParen);
                        let c = self.parse_expr_root();
                        self.expect(TokenKind::RightParen);
                        self.expect(TokenKind::Colon);
                        elseifs.push((c, self.parse_alt_body(STOPS)));
                    }
                    TokenKind::KwElse => {
                        self.bump();
                        self.expect(TokenKind::Colon);
                        else_ = Some(self.parse_alt_body(&[TokenKind::KwEndif]));
                    }
                    _ => break,
                }
            }
            self.expect(TokenKind::KwEndif);
            self.expect_stmt_end();
            return Stmt::new(StmtKind::If { cond, then, elseifs, else_ }, pos);
        }

        let then = self.parse_body();
        let mut elseifs = Vec::new();
        let mut else_ = None;
        loop {
            match self.kind() {
                TokenKind::KwElseif => {
                    self.bump();
                    self.expect(TokenKind::LeftParen);
                    let c = self.parse_expr_root();
                    self.expect(TokenKind::RightParen);
                    elseifs.push((c, self.parse_body()));
                }
                TokenKind::KwElse if self.kind_at(1) == TokenKind::KwIf => {
                    // `else if` parses as else { if … }.
                    self.bump();
                    else_ = Some(vec![self.parse_if()]);
                    break;
                }
                TokenKind::KwElse => {
                    self.bump();
                    else_ = Some(self.parse_body());
                    break;
                }
                _ => break,
            }
        }
        Stmt::new(StmtKind::If { cond, then, elseifs, else_ }, pos)
    }

    fn parse_switch(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let subject = self.parse_expr_root();
        self.expect(TokenKind::RightParen);
        let alt = if self.accept(TokenKind::Colon).is_some() {
            true
        } else {
            self.expect(TokenKind::LeftBrace);
            false
        };
        let mut cases = Vec::new();
        loop {
            match self.kind() {
                TokenKind::KwCase => {
                    self.bump();
                    let test = self.parse_expr_root();
                    if self.accept(TokenKind::Colon).is_none() {
                        self.accept(TokenKind::Semicolon);
                    }
                    let body = self.parse_alt_body(&[
                        TokenKind::KwCase,
                        TokenKind::KwDefault,
                        TokenKind::RightBrace,
                        TokenKind::KwEndswitch,
                    ]);
                    cases.push(SwitchCase { test: Some(test), body });
                }
                TokenKind::KwDefault => {
                    self.bump();
                    if self.accept(TokenKind::Colon).is_none() {
                        self.accept(TokenKind::Semicolon);
                    }
                    let body = self.parse_alt_body(&[
                        TokenKind::KwCase,
                        TokenKind::KwDefault,
                        TokenKind::RightBrace,
                        TokenKind::KwEndswitch,
                    ]);
                    cases.push(SwitchCase { test: None, body });
                }
                _ => break,
            }
        }
        if alt {
            self.expect(TokenKind::KwEndswitch);
            self.expect_stmt_end();
        } else {
            self.expect(TokenKind::RightBrace);
        }
        Stmt::new(StmtKind::Switch { subject, cases }, pos)
    }

    fn parse_while(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let cond = self.parse_expr_root();
        self.expect(TokenKind::RightParen);
        let body = if self.accept(TokenKind::Colon).is_some() {
            let body = self.parse_alt_body(&[TokenKind::KwEndwhile]);
            self.expect(TokenKind::KwEndwhile);
            self.expect_stmt_end();
            body
        } else {
            self.parse_body()
        };
        Stmt::new(StmtKind::While { cond, body }, pos)
    }

    fn parse_do_while(&mut self) -> Stmt {
        let pos = self.bump().pos;
        let body = self.parse_body();
        self.expect(TokenKind::KwWhile);
        self.expect(TokenKind::LeftParen);
        let cond = self.parse_expr_root();
        self.expect(TokenKind::RightParen);
        self.expect_stmt_end();
        Stmt::new(StmtKind::DoWhile { body, cond }, pos)
    }

    fn parse_for(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let init = self.parse_for_exprs(TokenKind::Semicolon);
        self.expect(TokenKind::Semicolon);
        let cond = self.parse_for_exprs(TokenKind::Semicolon);
        self.expect(TokenKind::Semicolon);
        let step = self.parse_for_exprs(TokenKind::RightParen);
        self.expect(TokenKind::RightParen);
        let body = if self.accept(TokenKind::Colon).is_some() {
            let body = self.parse_alt_body(&[TokenKind::KwEndfor]);
            self.expect(TokenKind::KwEndfor);
            self.expect_stmt_end();
            body
        } else {
            self.parse_body()
        };
        Stmt::new(StmtKind::For { init, cond, step, body }, pos)
    }

    fn parse_for_exprs(&mut self, end: TokenKind) -> Vec<Expr> {
        let mut exprs = Vec::new();
        if self.kind() == end {
            return exprs;
        }
        exprs.push(self.parse_expr_root());
        while self.accept(TokenKind::Comma).is_some() {
            exprs.push(self.parse_expr_root());
        }
        exprs
    }

    fn parse_foreach(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let subject = self.parse_expr_root();
        self.expect(TokenKind::KwAs);
        let mut by_ref = self.accept(TokenKind::Ampersand).is_some();
        let mut first = self.parse_foreach_target();
        let (key_var, value_var) = if self.accept(TokenKind::DoubleArrow).is_some() {
            if by_ref {
                self.error("key of foreach cannot be by reference");
            }
            by_ref = self.accept(TokenKind::Ampersand).is_some();
            let value = self.parse_foreach_target();
            (Some(first), value)
        } else {
            first = Self::to_destructure(first);
            (None, first)
        };
        let value_var = Self::to_destructure(value_var);
        self.expect(TokenKind::RightParen);
        let body = if self.accept(TokenKind::Colon).is_some() {
            let body = self.parse_alt_body(&[TokenKind::KwEndforeach]);
            self.expect(TokenKind::KwEndforeach);
            self.expect_stmt_end();
            body
        } else {
            self.parse_body()
        };
        Stmt::new(StmtKind::Foreach { subject, key_var, value_var, by_ref, body }, pos)
    }

    fn parse_foreach_target(&mut self) -> Expr {
        // A foreach target is a writable expression or a destructuring
        // pattern; parsing at ternary level keeps `as $k => $v` unambiguous
        // because `=>` is never an operator.
        self.parse_expr_bp(expr::BP_TERNARY + 1)
    }

    fn parse_break_continue(&mut self) -> Stmt {
        let token = self.bump();
        let is_break = token.kind == TokenKind::KwBreak;
        let level = if self.kind() == TokenKind::IntLiteral {
            let text = self.bump().text.replace('_', "");
            text.parse::<u32>().unwrap_or(1).max(1)
        } else {
            1
        };
        self.expect_stmt_end();
        let kind = if is_break { StmtKind::Break(level) } else { StmtKind::Continue(level) };
        Stmt::new(kind, token.pos)
    }

    fn parse_try(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftBrace);
        let body = self.parse_stmts_until(TokenKind::RightBrace);
        self.expect(TokenKind::RightBrace);
        let mut catches = Vec::new();
        while self.kind() == TokenKind::KwCatch {
            self.bump();
            self.expect(TokenKind::LeftParen);
            let mut types = vec![self.parse_name()];
            while self.accept(TokenKind::Pipe).is_some() {
                types.push(self.parse_name());
            }
            let var = self
                .accept(TokenKind::Variable)
                .map(|t| t.text.trim_start_matches('$').to_owned());
            self.expect(TokenKind::RightParen);
            self.expect(TokenKind::LeftBrace);
            let catch_body = self.parse_stmts_until(TokenKind::RightBrace);
            self.expect(TokenKind::RightBrace);
            catches.push(CatchClause { types, var, body: catch_body });
        }
        let finally = if self.accept(TokenKind::KwFinally).is_some() {
            self.expect(TokenKind::LeftBrace);
            let block = self.parse_stmts_until(TokenKind::RightBrace);
            self.expect(TokenKind::RightBrace);
            Some(block)
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            self.error("try requires at least one catch or finally");
        }
        Stmt::new(StmtKind::Try { body, catches, finally }, pos)
    }

    fn parse_declare(&mut self) -> Stmt {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let mut directives = Vec::new();
        loop {
            let name = self.expect(TokenKind::Identifier).text;
            self.expect(TokenKind::Assign);
            let value = self.parse_expr_root();
            directives.push((name, value));
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen);
        let body = match self.kind() {
            TokenKind::LeftBrace => Some(self.parse_body()),
            TokenKind::Colon => {
                self.bump();
                let body = self.parse_alt_body(&[TokenKind::KwEnddeclare]);
                self.expect(TokenKind::KwEnddeclare);
                self.expect_stmt_end();
                Some(body)
            }
            _ => {
                self.expect_stmt_end();
                None
            }
        };
        Stmt::new(StmtKind::Declare { directives, body }, pos)
    }

    // --- declarations ---

    /// A name at declaration/type/catch position: identifier or any of the
    /// qualified forms, stored as written.
    pub(crate) fn parse_name(&mut self) -> String {
        match self.kind() {
            TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::FullyQualifiedName
            | TokenKind::RelativeName
            | TokenKind::KwArray
            | TokenKind::KwCallable
            | TokenKind::KwStatic => self.bump().text,
            _ => {
                self.error(format!("expected name, found {}", self.kind()));
                String::new()
            }
        }
    }

    fn parse_namespace(&mut self) -> Stmt {
        let pos = self.bump().pos;
        let name = match self.kind() {
            TokenKind::Identifier | TokenKind::QualifiedName => Some(self.bump().text),
            _ => None,
        };
        let body = if self.kind() == TokenKind::LeftBrace {
            self.bump();
            let body = self.parse_stmts_until(TokenKind::RightBrace);
            self.expect(TokenKind::RightBrace);
            Some(body)
        } else {
            self.expect_stmt_end();
            None
        };
        Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Namespace { name, body }, pos }), pos)
    }

    fn parse_use(&mut self) -> Stmt {
        let pos = self.bump().pos;
        let kind = match self.kind() {
            TokenKind::KwFunction => {
                self.bump();
                UseKind::Function
            }
            TokenKind::KwConst => {
                self.bump();
                UseKind::Const
            }
            _ => UseKind::Class,
        };
        let mut items = Vec::new();
        loop {
            let path = self.parse_name().trim_start_matches('\\').to_owned();
            let alias = self.accept(TokenKind::KwAs).map(|_| self.expect(TokenKind::Identifier).text);
            items.push(UseItem { path, alias });
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect_stmt_end();
        Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Use { kind, items }, pos }), pos)
    }

    fn parse_const_entries(&mut self) -> Vec<(String, Expr)> {
        let mut entries = Vec::new();
        loop {
            let name = self.parse_member_name();
            self.expect(TokenKind::Assign);
            entries.push((name, self.parse_expr_root()));
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        entries
    }

    /// A member name: identifiers plus semi-reserved keywords.
    pub(crate) fn parse_member_name(&mut self) -> String {
        if self.kind() == TokenKind::Identifier || self.kind().is_semi_reserved() {
            self.bump().text
        } else {
            self.error(format!("expected member name, found {}", self.kind()));
            String::new()
        }
    }

    pub(crate) fn parse_function_decl(&mut self, attrs: Vec<AttributeSpec>) -> FuncDecl {
        self.expect(TokenKind::KwFunction);
        let by_ref_return = self.accept(TokenKind::Ampersand).is_some();
        let name = self.parse_member_name();
        let params = self.parse_params();
        let return_type = self.parse_optional_return_type();
        self.expect(TokenKind::LeftBrace);
        let body = self.parse_stmts_until(TokenKind::RightBrace);
        self.expect(TokenKind::RightBrace);
        let is_generator = contains_yield(&body);
        FuncDecl {
            name,
            params,
            return_type,
            body: Some(body),
            by_ref_return,
            is_generator,
            attrs,
        }
    }

    pub(crate) fn parse_optional_return_type(&mut self) -> Option<TypeExpr> {
        self.accept(TokenKind::Colon).map(|_| self.parse_type())
    }

    pub(crate) fn parse_params(&mut self) -> Vec<Param> {
        self.expect(TokenKind::LeftParen);
        let mut params = Vec::new();
        while self.kind() != TokenKind::RightParen && self.kind() != TokenKind::Eof {
            params.push(self.parse_param());
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen);
        params
    }

    fn parse_param(&mut self) -> Param {
        let attrs = if self.kind() == TokenKind::AttributeStart {
            self.parse_attribute_groups()
        } else {
            Vec::new()
        };
        // Promotion modifiers on constructor parameters.
        let mut promotion: Option<MemberModifiers> = None;
        loop {
            let visibility = match self.kind() {
                TokenKind::KwPublic => Some(Visibility::Public),
                TokenKind::KwProtected => Some(Visibility::Protected),
                TokenKind::KwPrivate => Some(Visibility::Private),
                TokenKind::KwReadonly => {
                    self.bump();
                    promotion.get_or_insert_with(MemberModifiers::default).is_readonly = true;
                    continue;
                }
                _ => break,
            };
            self.bump();
            let modifiers = promotion.get_or_insert_with(MemberModifiers::default);
            if self.set_visibility_suffix() {
                modifiers.set_visibility = visibility;
            } else {
                modifiers.visibility = visibility;
            }
        }
        let ty = self.parse_optional_type();
        let by_ref = self.accept(TokenKind::Ampersand).is_some();
        let variadic = self.accept(TokenKind::Ellipsis).is_some();
        let name = self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned();
        let default = self.accept(TokenKind::Assign).map(|_| self.parse_expr_root());
        Param { name, ty, default, by_ref, variadic, promotion, attrs }
    }

    /// Consumes `(set)` after a visibility keyword; true when present.
    fn set_visibility_suffix(&mut self) -> bool {
        if self.kind() == TokenKind::LeftParen
            && self.kind_at(1) == TokenKind::Identifier
            && self.tokens[self.index + 1].text.eq_ignore_ascii_case("set")
            && self.kind_at(2) == TokenKind::RightParen
        {
            self.bump();
            self.bump();
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn parse_attribute_groups(&mut self) -> Vec<AttributeSpec> {
        let mut attrs = Vec::new();
        while self.kind() == TokenKind::AttributeStart {
            self.bump();
            loop {
                let name = self.parse_name();
                let args = if self.kind() == TokenKind::LeftParen {
                    let (args, _) = self.parse_args();
                    args
                } else {
                    Vec::new()
                };
                attrs.push(AttributeSpec { name, args });
                if self.accept(TokenKind::Comma).is_none() {
                    break;
                }
                if self.kind() == TokenKind::RightBracket {
                    break;
                }
            }
            self.expect(TokenKind::RightBracket);
        }
        attrs
    }

    fn parse_class_like(&mut self, attrs: Vec<AttributeSpec>) -> Stmt {
        let pos = self.pos();
        let mut is_abstract = false;
        let mut is_final = false;
        let mut is_readonly = false;
        loop {
            match self.kind() {
                TokenKind::KwAbstract => {
                    self.bump();
                    is_abstract = true;
                }
                TokenKind::KwFinal => {
                    self.bump();
                    is_final = true;
                }
                TokenKind::KwReadonly => {
                    self.bump();
                    is_readonly = true;
                }
                _ => break,
            }
        }
        let kind = match self.kind() {
            TokenKind::KwClass => ClassKind::Class,
            TokenKind::KwInterface => ClassKind::Interface,
            TokenKind::KwTrait => ClassKind::Trait,
            TokenKind::KwEnum => ClassKind::Enum,
            other => {
                self.error(format!("expected class declaration, found {other}"));
                self.resync();
                return Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Bad, pos }), pos);
            }
        };
        self.bump();
        let name = self.expect(TokenKind::Identifier).text;

        let enum_backing = if kind == ClassKind::Enum && self.accept(TokenKind::Colon).is_some() {
            Some(self.parse_type())
        } else {
            None
        };

        let mut extends = Vec::new();
        if self.accept(TokenKind::KwExtends).is_some() {
            extends.push(self.parse_name());
            while self.accept(TokenKind::Comma).is_some() {
                if kind != ClassKind::Interface {
                    self.error("classes may extend only one class");
                }
                extends.push(self.parse_name());
            }
        }
        let mut implements = Vec::new();
        if self.accept(TokenKind::KwImplements).is_some() {
            implements.push(self.parse_name());
            while self.accept(TokenKind::Comma).is_some() {
                implements.push(self.parse_name());
            }
        }

        self.expect(TokenKind::LeftBrace);
        let mut members = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            members.push(self.parse_class_member());
        }
        self.expect(TokenKind::RightBrace);

        let decl = ClassDecl {
            kind,
            name,
            is_abstract,
            is_final,
            is_readonly,
            extends,
            implements,
            enum_backing,
            members,
            attrs,
        };
        Stmt::new(StmtKind::Decl(Decl { kind: DeclKind::Class(decl), pos }), pos)
    }

    /// Class-body recognizer: accumulates modifiers until a member
    /// introducer appears, then routes to the member builder.
    fn parse_class_member(&mut self) -> ClassMember {
        let attrs = if self.kind() == TokenKind::AttributeStart {
            self.parse_attribute_groups()
        } else {
            Vec::new()
        };

        let mut modifiers = MemberModifiers::default();
        loop {
            match self.kind() {
                TokenKind::KwPublic | TokenKind::KwProtected | TokenKind::KwPrivate => {
                    let visibility = match self.kind() {
                        TokenKind::KwPublic => Visibility::Public,
                        TokenKind::KwProtected => Visibility::Protected,
                        _ => Visibility::Private,
                    };
                    self.bump();
                    if self.set_visibility_suffix() {
                        modifiers.set_visibility = Some(visibility);
                    } else {
                        modifiers.visibility = Some(visibility);
                    }
                }
                TokenKind::KwStatic => {
                    self.bump();
                    modifiers.is_static = true;
                }
                TokenKind::KwAbstract => {
                    self.bump();
                    modifiers.is_abstract = true;
                }
                TokenKind::KwFinal => {
                    self.bump();
                    modifiers.is_final = true;
                }
                TokenKind::KwReadonly => {
                    self.bump();
                    modifiers.is_readonly = true;
                }
                TokenKind::KwVar => {
                    self.bump();
                    modifiers.visibility = Some(Visibility::Public);
                }
                _ => break,
            }
        }

        match self.kind() {
            TokenKind::KwFunction => {
                self.bump();
                let by_ref_return = self.accept(TokenKind::Ampersand).is_some();
                let name = self.parse_member_name();
                let params = self.parse_params();
                let return_type = self.parse_optional_return_type();
                let body = if self.accept(TokenKind::Semicolon).is_some() {
                    None
                } else {
                    self.expect(TokenKind::LeftBrace);
                    let body = self.parse_stmts_until(TokenKind::RightBrace);
                    self.expect(TokenKind::RightBrace);
                    Some(body)
                };
                let is_generator = body.as_deref().is_some_and(contains_yield);
                ClassMember::Method {
                    modifiers,
                    func: FuncDecl { name, params, return_type, body, by_ref_return, is_generator, attrs },
                }
            }
            TokenKind::KwConst => {
                self.bump();
                // Optional constant type, ignored at runtime.
                if self.kind() != TokenKind::Identifier || self.kind_at(1) != TokenKind::Assign {
                    if matches!(
                        self.kind(),
                        TokenKind::Identifier | TokenKind::KwArray | TokenKind::Question
                    ) && self.kind_at(1) != TokenKind::Assign
                    {
                        let _ = self.parse_optional_type();
                    }
                }
                let entries = self.parse_const_entries();
                self.expect_stmt_end();
                ClassMember::Const { modifiers, entries, attrs }
            }
            TokenKind::KwUse => {
                self.bump();
                let mut traits = vec![self.parse_name()];
                while self.accept(TokenKind::Comma).is_some() {
                    traits.push(self.parse_name());
                }
                let adaptations = if self.kind() == TokenKind::LeftBrace {
                    self.bump();
                    let list = self.parse_trait_adaptations();
                    self.expect(TokenKind::RightBrace);
                    list
                } else {
                    self.expect_stmt_end();
                    Vec::new()
                };
                ClassMember::TraitUse { traits, adaptations }
            }
            TokenKind::KwCase => {
                self.bump();
                let name = self.parse_member_name();
                let value = self.accept(TokenKind::Assign).map(|_| self.parse_expr_root());
                self.expect_stmt_end();
                ClassMember::EnumCase { name, value, attrs }
            }
            _ => {
                // Property: optional type then `$name`.
                let ty = if self.kind() == TokenKind::Variable {
                    None
                } else {
                    self.parse_optional_type()
                };
                if self.kind() != TokenKind::Variable {
                    self.error(format!("unexpected {} in class body", self.kind()));
                    self.resync();
                    return ClassMember::Property {
                        modifiers,
                        ty: None,
                        entries: Vec::new(),
                        hooks: Vec::new(),
                        attrs,
                    };
                }
                let mut entries = Vec::new();
                loop {
                    let name = self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned();
                    let default = self.accept(TokenKind::Assign).map(|_| self.parse_expr_root());
                    entries.push((name, default));
                    if self.accept(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                let hooks = if self.kind() == TokenKind::LeftBrace {
                    self.bump();
                    let hooks = self.parse_prop_hooks();
                    self.expect(TokenKind::RightBrace);
                    hooks
                } else {
                    self.expect_stmt_end();
                    Vec::new()
                };
                ClassMember::Property { modifiers, ty, entries, hooks, attrs }
            }
        }
    }

    fn parse_prop_hooks(&mut self) -> Vec<PropHook> {
        let mut hooks = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            let pos = self.pos();
            let name = self.parse_member_name();
            let is_get = name.eq_ignore_ascii_case("get");
            if !is_get && !name.eq_ignore_ascii_case("set") {
                self.error(format!("unknown property hook `{name}`"));
            }
            let body = if self.accept(TokenKind::DoubleArrow).is_some() {
                let value = self.parse_expr_root();
                self.expect_stmt_end();
                vec![Stmt::new(StmtKind::Return(Some(value)), pos)]
            } else {
                self.expect(TokenKind::LeftBrace);
                let body = self.parse_stmts_until(TokenKind::RightBrace);
                self.expect(TokenKind::RightBrace);
                body
            };
            hooks.push(PropHook { is_get, body });
        }
        hooks
    }

    fn parse_trait_adaptations(&mut self) -> Vec<TraitAdaptation> {
        let mut adaptations = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            // `Name::method` or bare `method`.
            let first = self.parse_name();
            let (trait_name, method) = if self.accept(TokenKind::DoubleColon).is_some() {
                (Some(first), self.parse_member_name())
            } else {
                (None, first)
            };
            match self.kind() {
                TokenKind::KwInsteadof => {
                    self.bump();
                    let mut excluded = vec![self.parse_name()];
                    while self.accept(TokenKind::Comma).is_some() {
                        excluded.push(self.parse_name());
                    }
                    self.expect_stmt_end();
                    adaptations.push(TraitAdaptation::InsteadOf {
                        trait_name: trait_name.unwrap_or_default(),
                        method,
                        excluded,
                    });
                }
                TokenKind::KwAs => {
                    self.bump();
                    let visibility = match self.kind() {
                        TokenKind::KwPublic => {
                            self.bump();
                            Some(Visibility::Public)
                        }
                        TokenKind::KwProtected => {
                            self.bump();
                            Some(Visibility::Protected)
                        }
                        TokenKind::KwPrivate => {
                            self.bump();
                            Some(Visibility::Private)
                        }
                        _ => None,
                    };
                    let alias = if self.kind() == TokenKind::Identifier || self.kind().is_semi_reserved()
                    {
                        Some(self.parse_member_name())
                    } else {
                        None
                    };
                    self.expect_stmt_end();
                    adaptations.push(TraitAdaptation::As { trait_name, method, visibility, alias });
                }
                other => {
                    self.error(format!("expected insteadof or as, found {other}"));
                    self.resync();
                }
            }
        }
        adaptations
    }
}
