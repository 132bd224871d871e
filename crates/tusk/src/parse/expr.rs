//! Expression parsing: Pratt precedence climbing, literals, strings with
//! interpolation, closures, `match`, and the type parser.

use super::Parser;
use crate::{
    ast::{
        Arg, ArrayItem, BinaryOp, CastKind, ClosureExpr, ClosureUse, Expr, ExprKind, IncludeKind,
        InterpPart, MagicConst, MatchArm, MemberName, Param, Stmt, StmtKind, TypeExpr, TypeKind,
        UnaryOp, contains_yield,
    },
    token::TokenKind,
};

// Binding powers, low to high. Left-associative operators re-enter the loop
// with `lbp + 1`; right-associative with `lbp`.
pub(crate) const BP_OR: u8 = 2;
pub(crate) const BP_XOR: u8 = 4;
pub(crate) const BP_AND: u8 = 6;
pub(crate) const BP_ASSIGN: u8 = 8;
pub(crate) const BP_TERNARY: u8 = 10;
pub(crate) const BP_COALESCE: u8 = 12;
pub(crate) const BP_BOOL_OR: u8 = 14;
pub(crate) const BP_BOOL_AND: u8 = 16;
pub(crate) const BP_BIT_OR: u8 = 18;
pub(crate) const BP_BIT_XOR: u8 = 20;
pub(crate) const BP_BIT_AND: u8 = 22;
pub(crate) const BP_EQUALITY: u8 = 24;
pub(crate) const BP_COMPARISON: u8 = 26;
pub(crate) const BP_SHIFT: u8 = 28;
pub(crate) const BP_ADDITIVE: u8 = 30;
pub(crate) const BP_MULTIPLICATIVE: u8 = 32;
pub(crate) const BP_INSTANCEOF: u8 = 34;
pub(crate) const BP_UNARY: u8 = 36;
pub(crate) const BP_POW: u8 = 38;
pub(crate) const BP_NEW: u8 = 40;
pub(crate) const BP_POSTFIX: u8 = 42;

/// Binary operators dispatched through the main loop: token → (power, op,
/// right-assoc).
fn binary_op(kind: TokenKind) -> Option<(u8, BinaryOp, bool)> {
    use TokenKind as T;
    let entry = match kind {
        T::KwOr => (BP_OR, BinaryOp::Or, false),
        T::KwXor => (BP_XOR, BinaryOp::Xor, false),
        T::KwAnd => (BP_AND, BinaryOp::And, false),
        T::BooleanOr => (BP_BOOL_OR, BinaryOp::Or, false),
        T::BooleanAnd => (BP_BOOL_AND, BinaryOp::And, false),
        T::Pipe => (BP_BIT_OR, BinaryOp::BitOr, false),
        T::Caret => (BP_BIT_XOR, BinaryOp::BitXor, false),
        T::Ampersand => (BP_BIT_AND, BinaryOp::BitAnd, false),
        T::Equal => (BP_EQUALITY, BinaryOp::Eq, false),
        T::NotEqual => (BP_EQUALITY, BinaryOp::NotEq, false),
        T::Identical => (BP_EQUALITY, BinaryOp::Identical, false),
        T::NotIdentical => (BP_EQUALITY, BinaryOp::NotIdentical, false),
        T::Less => (BP_COMPARISON, BinaryOp::Lt, false),
        T::LessEqual => (BP_COMPARISON, BinaryOp::Le, false),
        T::Greater => (BP_COMPARISON, BinaryOp::Gt, false),
        T::GreaterEqual => (BP_COMPARISON, BinaryOp::Ge, false),
        T::Spaceship => (BP_COMPARISON, BinaryOp::Spaceship, false),
        T::Shl => (BP_SHIFT, BinaryOp::Shl, false),
        T::Shr => (BP_SHIFT, BinaryOp::Shr, false),
        T::Plus => (BP_ADDITIVE, BinaryOp::Add, false),
        T::Minus => (BP_ADDITIVE, BinaryOp::Sub, false),
        T::Dot => (BP_ADDITIVE, BinaryOp::Concat, false),
        T::Star => (BP_MULTIPLICATIVE, BinaryOp::Mul, false),
        T::Slash => (BP_MULTIPLICATIVE, BinaryOp::Div, false),
        T::Percent => (BP_MULTIPLICATIVE, BinaryOp::Mod, false),
        T::Pow => (BP_POW, BinaryOp::Pow, true),
        _ => return None,
    };
    Some(entry)
}

impl Parser {
    pub(crate) fn parse_expr_root(&mut self) -> Expr {
        self.parse_expr_bp(0)
    }

    pub(crate) fn parse_expr_bp(&mut self, min_bp: u8) -> Expr {
        let mut lhs = self.parse_prefix();
        loop {
            let kind = self.kind();

            if let Some((lbp, op, right)) = binary_op(kind) {
                if lbp < min_bp {
                    break;
                }
                self.bump();
                let rhs = self.parse_expr_bp(if right { lbp } else { lbp + 1 });
                let pos = lhs.pos;
                lhs = Expr::new(
                    ExprKind::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) },
                    pos,
                );
                continue;
            }

            match kind {
                k if k.is_assign_op() => {
                    if BP_ASSIGN < min_bp {
                        break;
                    }
                    lhs = self.parse_assignment(lhs);
                }
                TokenKind::Question => {
                    if BP_TERNARY < min_bp {
                        break;
                    }
                    self.bump();
                    let pos = lhs.pos;
                    let then = if self.kind() == TokenKind::Colon {
                        None
                    } else {
                        Some(Box::new(self.parse_expr_root()))
                    };
                    self.expect(TokenKind::Colon);
                    let else_ = Box::new(self.parse_expr_bp(BP_TERNARY));
                    lhs = Expr::new(ExprKind::Ternary { cond: Box::new(lhs), then, else_ }, pos);
                }
                TokenKind::Coalesce => {
                    if BP_COALESCE < min_bp {
                        break;
                    }
                    self.bump();
                    let pos = lhs.pos;
                    let rhs = self.parse_expr_bp(BP_COALESCE);
                    lhs = Expr::new(
                        ExprKind::Coalesce { lhs: Box::new(lhs), rhs: Box::new(rhs) },
                        pos,
                    );
                }
                TokenKind::KwInstanceof => {
                    if BP_INSTANCEOF < min_bp {
                        break;
                    }
                    self.bump();
                    let pos = lhs.pos;
                    let class = Box::new(self.parse_expr_bp(BP_UNARY));
                    lhs = Expr::new(ExprKind::Instanceof { expr: Box::new(lhs), class }, pos);
                }
                TokenKind::LeftParen
                | TokenKind::Arrow
                | TokenKind::NullsafeArrow
                | TokenKind::DoubleColon
                | TokenKind::LeftBracket
                | TokenKind::Inc
                | TokenKind::Dec => {
                    if BP_POSTFIX < min_bp {
                        break;
                    }
                    lhs = self.parse_postfix(lhs);
                }
                _ => break,
            }
        }
        lhs
    }

    fn parse_assignment(&mut self, lhs: Expr) -> Expr {
        let pos = lhs.pos;
        let target = Box::new(Self::to_destructure(lhs));
        let op_token = self.bump();
        match op_token.kind {
            TokenKind::Assign => {
                if self.accept(TokenKind::Ampersand).is_some() {
                    let value = Box::new(self.parse_expr_bp(BP_ASSIGN));
                    Expr::new(ExprKind::AssignRef { target, value }, pos)
                } else {
                    let value = Box::new(self.parse_expr_bp(BP_ASSIGN));
                    Expr::new(ExprKind::Assign { target, value }, pos)
                }
            }
            TokenKind::CoalesceAssign => {
                let value = Box::new(self.parse_expr_bp(BP_ASSIGN));
                Expr::new(ExprKind::CoalesceAssign { target, value }, pos)
            }
            other => {
                let op = match other.compound_assign_op() {
                    Some(TokenKind::Plus) => BinaryOp::Add,
                    Some(TokenKind::Minus) => BinaryOp::Sub,
                    Some(TokenKind::Star) => BinaryOp::Mul,
                    Some(TokenKind::Slash) => BinaryOp::Div,
                    Some(TokenKind::Percent) => BinaryOp::Mod,
                    Some(TokenKind::Pow) => BinaryOp::Pow,
                    Some(TokenKind::Dot) => BinaryOp::Concat,
                    Some(TokenKind::Ampersand) => BinaryOp::BitAnd,
                    Some(TokenKind::Pipe) => BinaryOp::BitOr,
                    Some(TokenKind::Caret) => BinaryOp::BitXor,
                    Some(TokenKind::Shl) => BinaryOp::Shl,
                    _ => BinaryOp::Shr,
                };
                let value = Box::new(self.parse_expr_bp(BP_ASSIGN));
                Expr::new(ExprKind::CompoundAssign { op, target, value }, pos)
            }
        }
    }

    /// Rewrites array literals into destructuring patterns when they appear
    /// at a write position, recursing into nested elements.
    pub(crate) fn to_destructure(expr: Expr) -> Expr {
        match expr.kind {
            ExprKind::Array(items) => {
                let pos = expr.pos;
                let items = items
                    .into_iter()
                    .map(|mut item| {
                        item.value = Self::to_destructure(item.value);
                        Some(item)
                    })
                    .collect();
                Expr::new(ExprKind::List(items), pos)
            }
            ExprKind::List(items) => {
                let pos = expr.pos;
                let items = items
                    .into_iter()
                    .map(|slot| {
                        slot.map(|mut item| {
                            item.value = Self::to_destructure(item.value);
                            item
                        })
                    })
                    .collect();
                Expr::new(ExprKind::List(items), pos)
            }
            _ => expr,
        }
    }

    // --- postfix ---

    fn parse_postfix(&mut self, lhs: Expr) -> Expr {
        let pos = lhs.pos;
        match self.kind() {
            TokenKind::LeftParen => {
                let (args, first_class) = self.parse_args();
                let call = Expr::new(ExprKind::Call { callee: Box::new(lhs), args }, pos);
                if first_class {
                    Expr::new(ExprKind::FirstClassCallable(Box::new(call)), pos)
                } else {
                    call
                }
            }
            TokenKind::Arrow | TokenKind::NullsafeArrow => {
                let nullsafe = self.bump().kind == TokenKind::NullsafeArrow;
                let method = self.parse_member_selector();
                if self.kind() == TokenKind::LeftParen {
                    let (args, first_class) = self.parse_args();
                    let call = Expr::new(
                        ExprKind::MethodCall { object: Box::new(lhs), method, args, nullsafe },
                        pos,
                    );
                    if first_class {
                        Expr::new(ExprKind::FirstClassCallable(Box::new(call)), pos)
                    } else {
                        call
                    }
                } else {
                    Expr::new(ExprKind::Prop { object: Box::new(lhs), name: method, nullsafe }, pos)
                }
            }
            TokenKind::DoubleColon => {
                self.bump();
                match self.kind() {
                    TokenKind::Variable => {
                        let name = self.bump().text.trim_start_matches('$').to_owned();
                        Expr::new(ExprKind::StaticProp { class: Box::new(lhs), name }, pos)
                    }
                    TokenKind::KwClass => {
                        self.bump();
                        Expr::new(
                            ExprKind::ClassConst { class: Box::new(lhs), name: "class".to_owned() },
                            pos,
                        )
                    }
                    TokenKind::LeftBrace => {
                        self.bump();
                        let name_expr = self.parse_expr_root();
                        self.expect(TokenKind::RightBrace);
                        let (args, first_class) = self.parse_args();
                        let call = Expr::new(
                            ExprKind::StaticCall {
                                class: Box::new(lhs),
                                method: MemberName::Expr(Box::new(name_expr)),
                                args,
                            },
                            pos,
                        );
                        if first_class {
                            Expr::new(ExprKind::FirstClassCallable(Box::new(call)), pos)
                        } else {
                            call
                        }
                    }
                    _ => {
                        let name = self.parse_member_name();
                        if self.kind() == TokenKind::LeftParen {
                            let (args, first_class) = self.parse_args();
                            let call = Expr::new(
                                ExprKind::StaticCall {
                                    class: Box::new(lhs),
                                    method: MemberName::Name(name),
                                    args,
                                },
                                pos,
                            );
                            if first_class {
                                Expr::new(ExprKind::FirstClassCallable(Box::new(call)), pos)
                            } else {
                                call
                            }
                        } else {
                            Expr::new(ExprKind::ClassConst { class: Box::new(lhs), name }, pos)
                        }
                    }
                }
            }
            TokenKind::LeftBracket => {
                self.bump();
                let index = if self.kind() == TokenKind::RightBracket {
                    None
                } else {
                    Some(Box::new(self.parse_expr_root()))
                };
                self.expect(TokenKind::RightBracket);
                Expr::new(ExprKind::Index { base: Box::new(lhs), index }, pos)
            }
            TokenKind::Inc | TokenKind::Dec => {
                let inc = self.bump().kind == TokenKind::Inc;
                Expr::new(ExprKind::PostIncDec { inc, target: Box::new(lhs) }, pos)
            }
            _ => lhs,
        }
    }

    /// The selector after `->`/`?->`: a plain name, `$var`, or `{expr}`.
    fn parse_member_selector(&mut self) -> MemberName {
        match self.kind() {
            TokenKind::Variable => {
                let token = self.bump();
                let name = token.text.trim_start_matches('$').to_owned();
                MemberName::Expr(Box::new(Expr::new(ExprKind::Variable(name), token.pos)))
            }
            TokenKind::LeftBrace => {
                self.bump();
                let expr = self.parse_expr_root();
                self.expect(TokenKind::RightBrace);
                MemberName::Expr(Box::new(expr))
            }
            _ => MemberName::Name(self.parse_member_name()),
        }
    }

    /// Call arguments. The second return is true for the first-class
    /// callable form `(...)`.
    pub(crate) fn parse_args(&mut self) -> (Vec<Arg>, bool) {
        self.expect(TokenKind::LeftParen);
        if self.kind() == TokenKind::Ellipsis && self.kind_at(1) == TokenKind::RightParen {
            self.bump();
            self.bump();
            return (Vec::new(), true);
        }
        let mut args = Vec::new();
        while self.kind() != TokenKind::RightParen && self.kind() != TokenKind::Eof {
            let unpack = self.accept(TokenKind::Ellipsis).is_some();
            let name = if !unpack
                && (self.kind() == TokenKind::Identifier || self.kind().is_semi_reserved())
                && self.kind_at(1) == TokenKind::Colon
            {
                let name = self.bump().text;
                self.bump(); // `:`
                Some(name)
            } else {
                None
            };
            let value = self.parse_expr_root();
            args.push(Arg { name, value, unpack });
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen);
        (args, false)
    }

    // --- prefix ---

    fn parse_prefix(&mut self) -> Expr {
        let pos = self.pos();
        match self.kind() {
            TokenKind::IntLiteral => {
                let text = self.bump().text;
                Expr::new(parse_int_literal(&text), pos)
            }
            TokenKind::FloatLiteral => {
                let text = self.bump().text.replace('_', "");
                Expr::new(ExprKind::Float(text.parse().unwrap_or(0.0)), pos)
            }
            TokenKind::SingleQuoted => {
                let text = self.bump().text;
                Expr::new(ExprKind::Str(decode_single_quoted(strip_quotes(&text, b'\''))), pos)
            }
            TokenKind::DoubleQuoted => {
                let text = self.bump().text;
                Expr::new(ExprKind::Str(decode_double_quoted(strip_quotes(&text, b'"'))), pos)
            }
            TokenKind::DoubleQuote => {
                self.bump();
                let parts = self.parse_interp_parts(TokenKind::DoubleQuote, true);
                self.expect(TokenKind::DoubleQuote);
                Expr::new(collapse_interp(parts), pos)
            }
            TokenKind::Backtick => {
                self.bump();
                let parts = self.parse_interp_parts(TokenKind::Backtick, true);
                self.expect(TokenKind::Backtick);
                Expr::new(ExprKind::ShellExec(parts), pos)
            }
            TokenKind::StartHeredoc => {
                let opener = self.bump().text;
                let nowdoc = opener.contains('\'');
                let mut parts = self.parse_interp_parts(TokenKind::EndHeredoc, !nowdoc);
                let end = self.expect(TokenKind::EndHeredoc).text;
                let indent_len = end.len() - end.trim_start_matches([' ', '\t']).len();
                trim_heredoc(&mut parts, &end[..indent_len]);
                Expr::new(collapse_interp(parts), pos)
            }
            TokenKind::Variable => {
                let name = self.bump().text.trim_start_matches('$').to_owned();
                Expr::new(ExprKind::Variable(name), pos)
            }
            TokenKind::Dollar => {
                self.bump();
                let inner = match self.kind() {
                    TokenKind::LeftBrace => {
                        self.bump();
                        let expr = self.parse_expr_root();
                        self.expect(TokenKind::RightBrace);
                        expr
                    }
                    _ => self.parse_expr_bp(BP_POSTFIX),
                };
                Expr::new(ExprKind::VarVar(Box::new(inner)), pos)
            }
            TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::FullyQualifiedName
            | TokenKind::RelativeName => {
                let text = self.bump().text;
                Expr::new(ExprKind::Ident(text), pos)
            }
            TokenKind::KwTrue => {
                self.bump();
                Expr::new(ExprKind::Bool(true), pos)
            }
            TokenKind::KwFalse => {
                self.bump();
                Expr::new(ExprKind::Bool(false), pos)
            }
            TokenKind::KwNull => {
                self.bump();
                Expr::new(ExprKind::Null, pos)
            }
            TokenKind::MagicLine => self.magic(MagicConst::Line),
            TokenKind::MagicFile => self.magic(MagicConst::File),
            TokenKind::MagicDir => self.magic(MagicConst::Dir),
            TokenKind::MagicFunction => self.magic(MagicConst::Function),
            TokenKind::MagicClass => self.magic(MagicConst::Class),
            TokenKind::MagicMethod => self.magic(MagicConst::Method),
            TokenKind::MagicNamespace => self.magic(MagicConst::Namespace),
            TokenKind::MagicTrait => self.magic(MagicConst::Trait),
            TokenKind::KwStatic => match self.kind_at(1) {
                TokenKind::KwFunction => {
                    self.bump();
                    self.parse_closure(true)
                }
                TokenKind::KwFn => {
                    self.bump();
                    self.parse_arrow_fn(true)
                }
                _ => {
                    self.bump();
                    Expr::new(ExprKind::Ident("static".to_owned()), pos)
                }
            },
            TokenKind::KwFunction => self.parse_closure(false),
            TokenKind::KwFn => self.parse_arrow_fn(false),
            TokenKind::AttributeStart => {
                // Attributes on closures are parsed and dropped; nothing at
                // runtime reads them.
                let _attrs = self.parse_attribute_groups();
                match self.kind() {
                    TokenKind::KwStatic if self.kind_at(1) == TokenKind::KwFn => {
                        self.bump();
                        self.parse_arrow_fn(true)
                    }
                    TokenKind::KwStatic => {
                        self.bump();
                        self.parse_closure(true)
                    }
                    TokenKind::KwFn => self.parse_arrow_fn(false),
                    _ => self.parse_closure(false),
                }
            }
            TokenKind::KwNew => self.parse_new(),
            TokenKind::KwClone => {
                self.bump();
                let operand = self.parse_expr_bp(BP_NEW);
                Expr::new(ExprKind::Clone(Box::new(operand)), pos)
            }
            TokenKind::Minus => self.unary(UnaryOp::Neg),
            TokenKind::Plus => self.unary(UnaryOp::Plus),
            TokenKind::Bang => self.unary(UnaryOp::Not),
            TokenKind::Tilde => self.unary(UnaryOp::BitNot),
            TokenKind::Inc | TokenKind::Dec => {
                let inc = self.bump().kind == TokenKind::Inc;
                let target = Box::new(self.parse_expr_bp(BP_UNARY));
                Expr::new(ExprKind::PreIncDec { inc, target }, pos)
            }
            k if k.is_cast() => {
                let kind = match self.bump().kind {
                    TokenKind::IntCast => CastKind::Int,
                    TokenKind::FloatCast => CastKind::Float,
                    TokenKind::StringCast => CastKind::String,
                    TokenKind::ArrayCast => CastKind::Array,
                    TokenKind::ObjectCast => CastKind::Object,
                    TokenKind::BoolCast => CastKind::Bool,
                    _ => CastKind::Unset,
                };
                let expr = Box::new(self.parse_expr_bp(BP_UNARY));
                Expr::new(ExprKind::Cast { kind, expr }, pos)
            }
            TokenKind::At => {
                self.bump();
                let operand = Box::new(self.parse_expr_bp(BP_UNARY));
                Expr::new(ExprKind::ErrorSuppress(operand), pos)
            }
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expr_root();
                self.expect(TokenKind::RightParen);
                expr
            }
            TokenKind::LeftBracket => {
                self.bump();
                let items = self.parse_array_items(TokenKind::RightBracket);
                self.expect(TokenKind::RightBracket);
                Expr::new(build_array_or_list(items), pos)
            }
            TokenKind::KwArray if self.kind_at(1) == TokenKind::LeftParen => {
                self.bump();
                self.bump();
                let items = self.parse_array_items(TokenKind::RightParen);
                self.expect(TokenKind::RightParen);
                Expr::new(build_array_or_list(items), pos)
            }
            TokenKind::KwList => {
                self.bump();
                self.expect(TokenKind::LeftParen);
                let items = self.parse_array_items(TokenKind::RightParen);
                self.expect(TokenKind::RightParen);
                Expr::new(ExprKind::List(items), pos)
            }
            TokenKind::KwPrint => {
                self.bump();
                let operand = Box::new(self.parse_expr_bp(BP_ASSIGN));
                Expr::new(ExprKind::Print(operand), pos)
            }
            TokenKind::KwYield => {
                self.bump();
                if self.starts_expression() {
                    let first = self.parse_expr_bp(BP_ASSIGN);
                    if self.accept(TokenKind::DoubleArrow).is_some() {
                        let value = self.parse_expr_bp(BP_ASSIGN);
                        Expr::new(
                            ExprKind::Yield {
                                key: Some(Box::new(first)),
                                value: Some(Box::new(value)),
                            },
                            pos,
                        )
                    } else {
                        Expr::new(ExprKind::Yield { key: None, value: Some(Box::new(first)) }, pos)
                    }
                } else {
                    Expr::new(ExprKind::Yield { key: None, value: None }, pos)
                }
            }
            TokenKind::YieldFrom => {
                self.bump();
                let operand = Box::new(self.parse_expr_bp(BP_ASSIGN));
                Expr::new(ExprKind::YieldFrom(operand), pos)
            }
            TokenKind::KwThrow => {
                self.bump();
                let operand = Box::new(self.parse_expr_bp(BP_ASSIGN));
                Expr::new(ExprKind::Throw(operand), pos)
            }
            TokenKind::KwExit => {
                self.bump();
                let arg = if self.accept(TokenKind::LeftParen).is_some() {
                    let arg = if self.kind() == TokenKind::RightParen {
                        None
                    } else {
                        Some(Box::new(self.parse_expr_root()))
                    };
                    self.expect(TokenKind::RightParen);
                    arg
                } else {
                    None
                };
                Expr::new(ExprKind::Exit(arg), pos)
            }
            TokenKind::KwInclude => self.include(IncludeKind::Include),
            TokenKind::KwIncludeOnce => self.include(IncludeKind::IncludeOnce),
            TokenKind::KwRequire => self.include(IncludeKind::Require),
            TokenKind::KwRequireOnce => self.include(IncludeKind::RequireOnce),
            TokenKind::KwIsset => {
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
                Expr::new(ExprKind::Isset(targets), pos)
            }
            TokenKind::KwEmpty => {
                self.bump();
                self.expect(TokenKind::LeftParen);
                let operand = Box::new(self.parse_expr_root());
                self.expect(TokenKind::RightParen);
                Expr::new(ExprKind::Empty(operand), pos)
            }
            TokenKind::KwEval => {
                self.bump();
                self.expect(TokenKind::LeftParen);
                let operand = Box::new(self.parse_expr_root());
                self.expect(TokenKind::RightParen);
                Expr::new(ExprKind::Eval(operand), pos)
            }
            TokenKind::KwMatch => self.parse_match(),
            other => {
                self.error(format!("unexpected {other} in expression"));
                Expr::new(ExprKind::Bad, pos)
            }
        }
    }

    fn magic(&mut self, constant: MagicConst) -> Expr {
        let pos = self.bump().pos;
        Expr::new(ExprKind::MagicConst(constant), pos)
    }

    fn unary(&mut self, op: UnaryOp) -> Expr {
        let pos = self.bump().pos;
        let operand = Box::new(self.parse_expr_bp(BP_UNARY));
        Expr::new(ExprKind::Unary { op, operand }, pos)
    }

    fn include(&mut self, kind: IncludeKind) -> Expr {
        let pos = self.bump().pos;
        let expr = Box::new(self.parse_expr_bp(BP_ASSIGN));
        Expr::new(ExprKind::Include { kind, expr }, pos)
    }

    /// True when the current token can begin an expression; used to decide
    /// whether `yield` has an operand.
    fn starts_expression(&self) -> bool {
        !matches!(
            self.kind(),
            TokenKind::Semicolon
                | TokenKind::Comma
                | TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::Colon
                | TokenKind::CloseTag
                | TokenKind::DoubleArrow
                | TokenKind::Eof
        )
    }

    fn parse_new(&mut self) -> Expr {
        let pos = self.bump().pos;
        let class = match self.kind() {
            TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::FullyQualifiedName
            | TokenKind::RelativeName => {
                let text = self.bump().text;
                Expr::new(ExprKind::Ident(text), pos)
            }
            TokenKind::KwStatic => {
                self.bump();
                Expr::new(ExprKind::Ident("static".to_owned()), pos)
            }
            TokenKind::Variable => {
                let name = self.bump().text.trim_start_matches('$').to_owned();
                let base = Expr::new(ExprKind::Variable(name), pos);
                // Allow `new $factory->class_name(…)`-style member chains.
                self.continue_class_ref(base)
            }
            TokenKind::LeftParen => {
                self.bump();
                let expr = self.parse_expr_root();
                self.expect(TokenKind::RightParen);
                expr
            }
            other => {
                self.error(format!("expected class name after new, found {other}"));
                Expr::new(ExprKind::Bad, pos)
            }
        };
        let args = if self.kind() == TokenKind::LeftParen {
            let (args, _) = self.parse_args();
            args
        } else {
            Vec::new()
        };
        Expr::new(ExprKind::New { class: Box::new(class), args }, pos)
    }

    fn continue_class_ref(&mut self, mut base: Expr) -> Expr {
        loop {
            match self.kind() {
                TokenKind::Arrow | TokenKind::NullsafeArrow => {
                    let pos = base.pos;
                    let nullsafe = self.bump().kind == TokenKind::NullsafeArrow;
                    let name = self.parse_member_selector();
                    base = Expr::new(
                        ExprKind::Prop { object: Box::new(base), name, nullsafe },
                        pos,
                    );
                }
                TokenKind::LeftBracket => {
                    let pos = base.pos;
                    self.bump();
                    let index = if self.kind() == TokenKind::RightBracket {
                        None
                    } else {
                        Some(Box::new(self.parse_expr_root()))
                    };
                    self.expect(TokenKind::RightBracket);
                    base = Expr::new(ExprKind::Index { base: Box::new(base), index }, pos);
                }
                _ => return base,
            }
        }
    }

    fn parse_closure(&mut self, is_static: bool) -> Expr {
        let pos = self.expect(TokenKind::KwFunction).pos;
        let by_ref_return = self.accept(TokenKind::Ampersand).is_some();
        let params = self.parse_params();
        let mut uses = Vec::new();
        if self.accept(TokenKind::KwUse).is_some() {
            self.expect(TokenKind::LeftParen);
            loop {
                let by_ref = self.accept(TokenKind::Ampersand).is_some();
                let name = self.expect(TokenKind::Variable).text.trim_start_matches('$').to_owned();
                uses.push(ClosureUse { name, by_ref });
                if self.accept(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::RightParen);
        }
        let return_type = self.parse_optional_return_type();
        self.expect(TokenKind::LeftBrace);
        let body = self.parse_stmts_until(TokenKind::RightBrace);
        self.expect(TokenKind::RightBrace);
        let is_generator = contains_yield(&body);
        Expr::new(
            ExprKind::Closure(Box::new(ClosureExpr {
                params,
                uses,
                return_type,
                body,
                by_ref_return,
                is_static,
                is_arrow: false,
                is_generator,
            })),
            pos,
        )
    }

    fn parse_arrow_fn(&mut self, is_static: bool) -> Expr {
        let pos = self.expect(TokenKind::KwFn).pos;
        let by_ref_return = self.accept(TokenKind::Ampersand).is_some();
        let params = self.parse_params();
        let return_type = self.parse_optional_return_type();
        self.expect(TokenKind::DoubleArrow);
        let body_pos = self.pos();
        let body_expr = self.parse_expr_root();
        let is_generator = matches!(
            body_expr.kind,
            ExprKind::Yield { .. } | ExprKind::YieldFrom(_)
        );
        let body = vec![Stmt::new(StmtKind::Return(Some(body_expr)), body_pos)];
        Expr::new(
            ExprKind::Closure(Box::new(ClosureExpr {
                params,
                uses: Vec::new(),
                return_type,
                body,
                by_ref_return,
                is_static,
                is_arrow: true,
                is_generator,
            })),
            pos,
        )
    }

    fn parse_match(&mut self) -> Expr {
        let pos = self.bump().pos;
        self.expect(TokenKind::LeftParen);
        let subject = Box::new(self.parse_expr_root());
        self.expect(TokenKind::RightParen);
        self.expect(TokenKind::LeftBrace);
        let mut arms = Vec::new();
        while self.kind() != TokenKind::RightBrace && self.kind() != TokenKind::Eof {
            let conds = if self.accept(TokenKind::KwDefault).is_some() {
                None
            } else {
                let mut conds = vec![self.parse_expr_root()];
                while self.accept(TokenKind::Comma).is_some() {
                    if self.kind() == TokenKind::DoubleArrow {
                        break;
                    }
                    conds.push(self.parse_expr_root());
                }
                Some(conds)
            };
            self.expect(TokenKind::DoubleArrow);
            let body = self.parse_expr_root();
            arms.push(MatchArm { conds, body });
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBrace);
        Expr::new(ExprKind::Match { subject, arms }, pos)
    }

    /// Array elements for both literal syntaxes. `None` slots mark skipped
    /// positions, which only destructuring accepts.
    fn parse_array_items(&mut self, end: TokenKind) -> Vec<Option<ArrayItem>> {
        let mut items = Vec::new();
        while self.kind() != end && self.kind() != TokenKind::Eof {
            if self.kind() == TokenKind::Comma {
                self.bump();
                items.push(None);
                continue;
            }
            let unpack = self.accept(TokenKind::Ellipsis).is_some();
            let mut by_ref = self.accept(TokenKind::Ampersand).is_some();
            let first = self.parse_expr_root();
            let item = if self.accept(TokenKind::DoubleArrow).is_some() {
                by_ref = self.accept(TokenKind::Ampersand).is_some();
                let value = self.parse_expr_root();
                ArrayItem { key: Some(first), value, by_ref, unpack }
            } else {
                ArrayItem { key: None, value: first, by_ref, unpack }
            };
            items.push(Some(item));
            if self.accept(TokenKind::Comma).is_none() {
                break;
            }
        }
        items
    }

    // --- interpolated string parts ---

    fn parse_interp_parts(&mut self, end: TokenKind, decode: bool) -> Vec<InterpPart> {
        let mut parts = Vec::new();
        loop {
            match self.kind() {
                k if k == end => break,
                TokenKind::Eof => break,
                TokenKind::StringFragment => {
                    let text = self.bump().text.into_bytes();
                    let bytes = if decode { decode_double_quoted(&text) } else { text };
                    parts.push(InterpPart::Lit(bytes));
                }
                TokenKind::Variable => {
                    let token = self.bump();
                    let pos = token.pos;
                    let name = token.text.trim_start_matches('$').to_owned();
                    let mut expr = Expr::new(ExprKind::Variable(name), pos);
                    // Simple `$var->prop` / `$var[offset]` continuations.
                    if self.kind() == TokenKind::Arrow {
                        self.bump();
                        let prop = self.expect(TokenKind::Identifier).text;
                        expr = Expr::new(
                            ExprKind::Prop {
                                object: Box::new(expr),
                                name: MemberName::Name(prop),
                                nullsafe: false,
                            },
                            pos,
                        );
                    } else if self.kind() == TokenKind::LeftBracket {
                        self.bump();
                        let index = self.parse_string_offset();
                        self.expect(TokenKind::RightBracket);
                        expr = Expr::new(
                            ExprKind::Index { base: Box::new(expr), index: Some(Box::new(index)) },
                            pos,
                        );
                    }
                    parts.push(InterpPart::Expr(expr));
                }
                TokenKind::DollarOpenCurly => {
                    let pos = self.bump().pos;
                    let expr = if self.kind() == TokenKind::VarName {
                        let name = self.bump().text;
                        let mut expr = Expr::new(ExprKind::Variable(name), pos);
                        while self.kind() == TokenKind::LeftBracket {
                            self.bump();
                            let index = self.parse_expr_root();
                            self.expect(TokenKind::RightBracket);
                            expr = Expr::new(
                                ExprKind::Index {
                                    base: Box::new(expr),
                                    index: Some(Box::new(index)),
                                },
                                pos,
                            );
                        }
                        expr
                    } else {
                        let inner = self.parse_expr_root();
                        Expr::new(ExprKind::VarVar(Box::new(inner)), pos)
                    };
                    self.expect(TokenKind::RightBrace);
                    parts.push(InterpPart::Expr(expr));
                }
                TokenKind::CurlyOpen => {
                    self.bump();
                    let expr = self.parse_expr_root();
                    self.expect(TokenKind::RightBrace);
                    parts.push(InterpPart::Expr(expr));
                }
                other => {
                    self.error(format!("unexpected {other} in string"));
                    self.bump();
                }
            }
        }
        parts
    }

    /// The restricted offset inside `$var[…]` in a string: an integer, a
    /// bare word (taken as a string key) or another variable.
    fn parse_string_offset(&mut self) -> Expr {
        let pos = self.pos();
        match self.kind() {
            TokenKind::IntLiteral => {
                let text = self.bump().text;
                Expr::new(parse_int_literal(&text), pos)
            }
            TokenKind::Minus => {
                self.bump();
                let text = self.expect(TokenKind::IntLiteral).text;
                match parse_int_literal(&text) {
                    ExprKind::Int(i) => Expr::new(ExprKind::Int(-i), pos),
                    other => Expr::new(other, pos),
                }
            }
            TokenKind::Variable => {
                let name = self.bump().text.trim_start_matches('$').to_owned();
                Expr::new(ExprKind::Variable(name), pos)
            }
            _ => {
                let word = self.expect(TokenKind::Identifier).text;
                Expr::new(ExprKind::Str(word.into_bytes()), pos)
            }
        }
    }

    // --- types ---

    pub(crate) fn parse_optional_type(&mut self) -> Option<TypeExpr> {
        match self.kind() {
            TokenKind::Question
            | TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::FullyQualifiedName
            | TokenKind::RelativeName
            | TokenKind::KwArray
            | TokenKind::KwCallable
            | TokenKind::KwStatic
            | TokenKind::KwNull
            | TokenKind::KwTrue
            | TokenKind::KwFalse => Some(self.parse_type()),
            _ => None,
        }
    }

    pub(crate) fn parse_type(&mut self) -> TypeExpr {
        let nullable = self.accept(TokenKind::Question).is_some();
        let first = self.parse_type_name();
        if self.kind() == TokenKind::Pipe {
            let mut names = vec![first];
            while self.accept(TokenKind::Pipe).is_some() {
                names.push(self.parse_type_name());
            }
            return TypeExpr { nullable, kind: TypeKind::Union(names) };
        }
        // `&` continues an intersection only when a type name follows;
        // otherwise it is the by-ref marker of a parameter.
        if self.kind() == TokenKind::Ampersand
            && matches!(
                self.kind_at(1),
                TokenKind::Identifier
                    | TokenKind::QualifiedName
                    | TokenKind::FullyQualifiedName
                    | TokenKind::RelativeName
            )
        {
            let mut names = vec![first];
            while self.kind() == TokenKind::Ampersand
                && matches!(
                    self.kind_at(1),
                    TokenKind::Identifier
                        | TokenKind::QualifiedName
                        | TokenKind::FullyQualifiedName
                        | TokenKind::RelativeName
                )
            {
                self.bump();
                names.push(self.parse_type_name());
            }
            return TypeExpr { nullable, kind: TypeKind::Intersection(names) };
        }
        TypeExpr { nullable, kind: TypeKind::Simple(first) }
    }

    fn parse_type_name(&mut self) -> String {
        match self.kind() {
            TokenKind::Identifier
            | TokenKind::QualifiedName
            | TokenKind::FullyQualifiedName
            | TokenKind::RelativeName => self.bump().text,
            TokenKind::KwArray => {
                self.bump();
                "array".to_owned()
            }
            TokenKind::KwCallable => {
                self.bump();
                "callable".to_owned()
            }
            TokenKind::KwStatic => {
                self.bump();
                "static".to_owned()
            }
            TokenKind::KwNull => {
                self.bump();
                "null".to_owned()
            }
            TokenKind::KwTrue => {
                self.bump();
                "true".to_owned()
            }
            TokenKind::KwFalse => {
                self.bump();
                "false".to_owned()
            }
            other => {
                self.error(format!("expected type name, found {other}"));
                String::new()
            }
        }
    }
}

fn build_array_or_list(items: Vec<Option<ArrayItem>>) -> ExprKind {
    if items.iter().any(Option::is_none) {
        ExprKind::List(items)
    } else {
        ExprKind::Array(items.into_iter().flatten().collect())
    }
}

/// An interpolated literal whose parts are all constant folds back into a
/// plain string.
fn collapse_interp(parts: Vec<InterpPart>) -> ExprKind {
    if parts.iter().all(|p| matches!(p, InterpPart::Lit(_))) {
        let mut bytes = Vec::new();
        for part in parts {
            if let InterpPart::Lit(b) = part {
                bytes.extend_from_slice(&b);
            }
        }
        ExprKind::Str(bytes)
    } else {
        ExprKind::Interp(parts)
    }
}

/// Removes the closing-label indentation from every line and the newline
/// that separates the body from the label.
fn trim_heredoc(parts: &mut Vec<InterpPart>, indent: &str) {
    // Drop the final newline (it belongs to the closing label).
    if let Some(InterpPart::Lit(bytes)) = parts.last_mut() {
        if bytes.ends_with(b"\r\n") {
            bytes.truncate(bytes.len() - 2);
        } else if bytes.ends_with(b"\n") {
            bytes.truncate(bytes.len() - 1);
        }
    }
    if indent.is_empty() {
        return;
    }
    let indent = indent.as_bytes();
    let mut at_line_start = true;
    for part in parts.iter_mut() {
        match part {
            InterpPart::Lit(bytes) => {
                let mut out = Vec::with_capacity(bytes.len());
                let mut i = 0;
                while i < bytes.len() {
                    if at_line_start && bytes[i..].starts_with(indent) {
                        i += indent.len();
                    }
                    at_line_start = false;
                    if i < bytes.len() {
                        out.push(bytes[i]);
                        if bytes[i] == b'\n' {
                            at_line_start = true;
                        }
                        i += 1;
                    }
                }
                *bytes = out;
            }
            InterpPart::Expr(_) => at_line_start = false,
        }
    }
}

fn strip_quotes(text: &str, quote: u8) -> &[u8] {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == quote).map_or(0, |i| i + 1);
    let end = bytes.iter().rposition(|&b| b == quote).unwrap_or(bytes.len());
    if start <= end { &bytes[start..end] } else { &[] }
}

/// Single-quoted bodies know two escapes; everything else is literal.
fn decode_single_quoted(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && matches!(bytes[i + 1], b'\\' | b'\'') {
            out.push(bytes[i + 1]);
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

/// Escape decoding for double-quoted, heredoc and backtick bodies: the named
/// escapes, octal, `\xHH` and `\u{…}`. Unknown escapes keep their backslash.
pub fn decode_double_quoted(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let escape = bytes[i + 1];
        i += 2;
        match escape {
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'v' => out.push(0x0B),
            b'f' => out.push(0x0C),
            b'e' => out.push(0x1B),
            b'\\' => out.push(b'\\'),
            b'$' => out.push(b'$'),
            b'"' => out.push(b'"'),
            b'`' => out.push(b'`'),
            b'0'..=b'7' => {
                let mut value = u32::from(escape - b'0');
                let mut count = 1;
                while count < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    value = value * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    count += 1;
                }
                out.push((value & 0xFF) as u8);
            }
            b'x' | b'X' => {
                let mut value = 0u32;
                let mut count = 0;
                while count < 2 && i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                    value = value * 16 + u32::from((bytes[i] as char).to_digit(16).unwrap_or(0));
                    i += 1;
                    count += 1;
                }
                if count == 0 {
                    out.extend_from_slice(b"\\x");
                } else {
                    out.push(value as u8);
                }
            }
            b'u' => {
                if i < bytes.len() && bytes[i] == b'{' {
                    let close = bytes[i..].iter().position(|&b| b == b'}');
                    if let Some(offset) = close {
                        let digits = &bytes[i + 1..i + offset];
                        let text = String::from_utf8_lossy(digits);
                        if let Ok(cp) = u32::from_str_radix(&text, 16) {
                            if let Some(c) = char::from_u32(cp) {
                                let mut buffer = [0u8; 4];
                                out.extend_from_slice(c.encode_utf8(&mut buffer).as_bytes());
                                i += offset + 1;
                                continue;
                            }
                        }
                    }
                }
                out.extend_from_slice(b"\\u");
            }
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    out
}

/// Integer literal text → value, honoring every radix form, underscore
/// separators, and the int→float promotion on overflow.
pub(crate) fn parse_int_literal(text: &str) -> ExprKind {
    let cleaned = text.replace('_', "");
    let lower = cleaned.to_ascii_lowercase();
    let (radix, digits) = if let Some(rest) = lower.strip_prefix("0x") {
        (16, rest)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (2, rest)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (8, rest)
    } else if lower.len() > 1
        && lower.starts_with('0')
        && lower.bytes().all(|b| (b'0'..=b'7').contains(&b))
    {
        (8, &lower[1..])
    } else {
        (10, lower.as_str())
    };
    match i64::from_str_radix(digits, radix) {
        Ok(value) => ExprKind::Int(value),
        Err(_) => match u128::from_str_radix(digits, radix) {
            Ok(value) => ExprKind::Float(value as f64),
            Err(_) => ExprKind::Float(cleaned.parse().unwrap_or(0.0)),
        },
    }
}
