//! Lexical token kinds and the keyword table.
//!
//! Token kinds partition the way the scanner sees source text: punctuation,
//! operators, literals, identifiers/names, keywords, casts, script tags and
//! trivia. Keywords are case-insensitive in PHP, so the table lookup lowers
//! the candidate before matching.

use strum::{Display, IntoStaticStr};

/// Source position of a token or syntax node.
///
/// `offset` is a byte offset into the source; `line` and `column` are
/// 1-based. Multi-line tokens (heredocs, block comments, inline HTML) record
/// the position of their first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn start() -> Self {
        Self { offset: 0, line: 1, column: 1 }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {} column {}", self.line, self.column)
    }
}

/// A single lexical token: kind, the literal source text it covers, and the
/// position of its first byte.
///
/// The literal text is the exact source slice, so concatenating the text of
/// every token emitted for a file reproduces the file byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Pos,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, pos: Pos) -> Self {
        Self { kind, text: text.into(), pos }
    }
}

/// Enumerates every lexical category the scanner can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TokenKind {
    // --- script tags and passthrough text ---
    /// `<?php` (or `<?` short form when recognized).
    OpenTag,
    /// `<?=`, an open tag that behaves as `echo`.
    OpenTagEcho,
    /// `?>`; returns the scanner to inline-HTML mode.
    CloseTag,
    /// Text outside script tags, passed through verbatim.
    InlineHtml,

    // --- trivia ---
    Whitespace,
    /// `// …`, `# …` or `/* … */`.
    Comment,
    /// `/** … */`.
    DocComment,

    // --- literals ---
    IntLiteral,
    FloatLiteral,
    /// A complete single-quoted string, quotes included.
    SingleQuoted,
    /// A complete double-quoted string with no interpolation, quotes included.
    DoubleQuoted,
    /// The `"` opening or closing an interpolated string.
    DoubleQuote,
    /// A literal run inside an interpolated string, backtick or heredoc.
    StringFragment,
    /// The `` ` `` opening or closing a shell-exec string.
    Backtick,
    /// `<<<LABEL`, `<<<"LABEL"` or `<<<'LABEL'` including the trailing newline.
    StartHeredoc,
    /// The closing heredoc label, including its indentation.
    EndHeredoc,

    // --- names ---
    /// `$name`.
    Variable,
    /// A bare variable name inside `${…}`.
    VarName,
    Identifier,
    /// `A\B`.
    QualifiedName,
    /// `\A\B`.
    FullyQualifiedName,
    /// `namespace\A`.
    RelativeName,

    // --- punctuation ---
    Semicolon,
    Comma,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Colon,
    /// `::`
    DoubleColon,
    /// `->`
    Arrow,
    /// `?->`
    NullsafeArrow,
    /// `=>`
    DoubleArrow,
    Question,
    /// `??`
    Coalesce,
    At,
    Dollar,
    /// `${` opening a braced variable name inside a string.
    DollarOpenCurly,
    /// `{` immediately before `$` inside an interpolated string.
    CurlyOpen,
    Backslash,
    /// `...`
    Ellipsis,
    /// `#[`
    AttributeStart,

    // --- operators ---
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    /// `**`
    Pow,
    Dot,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,
    PowAssign,
    DotAssign,
    AmpAssign,
    PipeAssign,
    CaretAssign,
    ShlAssign,
    ShrAssign,
    /// `??=`
    CoalesceAssign,
    /// `==`
    Equal,
    /// `!=` or `<>`
    NotEqual,
    /// `===`
    Identical,
    /// `!==`
    NotIdentical,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    /// `<=>`
    Spaceship,
    /// `&&`
    BooleanAnd,
    /// `||`
    BooleanOr,
    Bang,
    Ampersand,
    Pipe,
    Caret,
    Tilde,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `++`
    Inc,
    /// `--`
    Dec,

    // --- casts ---
    IntCast,
    FloatCast,
    StringCast,
    ArrayCast,
    ObjectCast,
    BoolCast,
    UnsetCast,

    // --- keywords ---
    KwAbstract,
    KwAnd,
    KwArray,
    KwAs,
    KwBreak,
    KwCallable,
    KwCase,
    KwCatch,
    KwClass,
    KwClone,
    KwConst,
    KwContinue,
    KwDeclare,
    KwDefault,
    KwDo,
    KwEcho,
    KwElse,
    KwElseif,
    KwEmpty,
    KwEnddeclare,
    KwEndfor,
    KwEndforeach,
    KwEndif,
    KwEndswitch,
    KwEndwhile,
    KwEnum,
    KwEval,
    /// `exit` or its alias `die`.
    KwExit,
    KwExtends,
    KwFinal,
    KwFinally,
    KwFn,
    KwFor,
    KwForeach,
    KwFunction,
    KwGlobal,
    KwGoto,
    KwIf,
    KwImplements,
    KwInclude,
    KwIncludeOnce,
    KwInstanceof,
    KwInsteadof,
    KwInterface,
    KwIsset,
    KwList,
    KwMatch,
    KwNamespace,
    KwNew,
    KwOr,
    KwPrint,
    KwPrivate,
    KwProtected,
    KwPublic,
    KwReadonly,
    KwRequire,
    KwRequireOnce,
    KwReturn,
    KwStatic,
    KwSwitch,
    KwThrow,
    KwTrait,
    KwTry,
    KwUnset,
    KwUse,
    KwVar,
    KwWhile,
    KwXor,
    KwYield,
    /// `yield from`, lexed as one token including the internal whitespace.
    YieldFrom,
    KwTrue,
    KwFalse,
    KwNull,

    // --- magic constants ---
    MagicLine,
    MagicFile,
    MagicDir,
    MagicFunction,
    MagicClass,
    MagicMethod,
    MagicNamespace,
    MagicTrait,

    // --- control ---
    /// A byte the scanner could not place in any category.
    Illegal,
    Eof,
}

/// Looks up the keyword kind for an identifier, case-insensitively.
///
/// Returns `None` for plain identifiers. `self`, `parent` and type names like
/// `int` are deliberately not keywords; the parser gives them meaning from
/// context.
pub fn keyword_kind(ident: &str) -> Option<TokenKind> {
    use TokenKind::*;
    let lowered = ident.to_ascii_lowercase();
    let kind = match lowered.as_str() {
        "abstract" => KwAbstract,
        "and" => KwAnd,
        "array" => KwArray,
        "as" => KwAs,
        "break" => KwBreak,
        "callable" => KwCallable,
        "case" => KwCase,
        "catch" => KwCatch,
        "class" => KwClass,
        "clone" => KwClone,
        "const" => KwConst,
        "continue" => KwContinue,
        "declare" => KwDeclare,
        "default" => KwDefault,
        "do" => KwDo,
        "echo" => KwEcho,
        "else" => KwElse,
        "elseif" => KwElseif,
        "empty" => KwEmpty,
        "enddeclare" => KwEnddeclare,
        "endfor" => KwEndfor,
        "endforeach" => KwEndforeach,
        "endif" => KwEndif,
        "endswitch" => KwEndswitch,
        "endwhile" => KwEndwhile,
        "enum" => KwEnum,
        "eval" => KwEval,
        "exit" | "die" => KwExit,
        "extends" => KwExtends,
        "final" => KwFinal,
        "finally" => KwFinally,
        "fn" => KwFn,
        "for" => KwFor,
        "foreach" => KwForeach,
        "function" => KwFunction,
        "global" => KwGlobal,
        "goto" => KwGoto,
        "if" => KwIf,
        "implements" => KwImplements,
        "include" => KwInclude,
        "include_once" => KwIncludeOnce,
        "instanceof" => KwInstanceof,
        "insteadof" => KwInsteadof,
        "interface" => KwInterface,
        "isset" => KwIsset,
        "list" => KwList,
        "match" => KwMatch,
        "namespace" => KwNamespace,
        "new" => KwNew,
        "or" => KwOr,
        "print" => KwPrint,
        "private" => KwPrivate,
        "protected" => KwProtected,
        "public" => KwPublic,
        "readonly" => KwReadonly,
        "require" => KwRequire,
        "require_once" => KwRequireOnce,
        "return" => KwReturn,
        "static" => KwStatic,
        "switch" => KwSwitch,
        "throw" => KwThrow,
        "trait" => KwTrait,
        "try" => KwTry,
        "unset" => KwUnset,
        "use" => KwUse,
        "var" => KwVar,
        "while" => KwWhile,
        "xor" => KwXor,
        "yield" => KwYield,
        "true" => KwTrue,
        "false" => KwFalse,
        "null" => KwNull,
        "__line__" => MagicLine,
        "__file__" => MagicFile,
        "__dir__" => MagicDir,
        "__function__" => MagicFunction,
        "__class__" => MagicClass,
        "__method__" => MagicMethod,
        "__namespace__" => MagicNamespace,
        "__trait__" => MagicTrait,
        _ => return None,
    };
    Some(kind)
}

impl TokenKind {
    /// True for whitespace and comments, which the parser filters out.
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::Whitespace | Self::Comment | Self::DocComment)
    }

    /// True for every keyword kind, including the literal keywords
    /// `true`/`false`/`null` and the magic constants.
    pub fn is_keyword(self) -> bool {
        let idx = self as u32;
        idx >= Self::KwAbstract as u32 && idx <= Self::MagicTrait as u32
    }

    /// True for cast tokens produced by the speculative `(type)` scan.
    pub fn is_cast(self) -> bool {
        matches!(
            self,
            Self::IntCast
                | Self::FloatCast
                | Self::StringCast
                | Self::ArrayCast
                | Self::ObjectCast
                | Self::BoolCast
                | Self::UnsetCast
        )
    }

    /// Maps a compound-assignment token to the underlying binary operation
    /// token; `None` for anything that is not a compound assignment.
    pub fn compound_assign_op(self) -> Option<Self> {
        let op = match self {
            Self::PlusAssign => Self::Plus,
            Self::MinusAssign => Self::Minus,
            Self::StarAssign => Self::Star,
            Self::SlashAssign => Self::Slash,
            Self::PercentAssign => Self::Percent,
            Self::PowAssign => Self::Pow,
            Self::DotAssign => Self::Dot,
            Self::AmpAssign => Self::Ampersand,
            Self::PipeAssign => Self::Pipe,
            Self::CaretAssign => Self::Caret,
            Self::ShlAssign => Self::Shl,
            Self::ShrAssign => Self::Shr,
            _ => return None,
        };
        Some(op)
    }

    /// True for any assignment operator, simple or compound, including `??=`.
    pub fn is_assign_op(self) -> bool {
        self == Self::Assign || self == Self::CoalesceAssign || self.compound_assign_op().is_some()
    }

    /// Member-visibility and class-member modifiers.
    pub fn is_member_modifier(self) -> bool {
        matches!(
            self,
            Self::KwPublic
                | Self::KwProtected
                | Self::KwPrivate
                | Self::KwStatic
                | Self::KwAbstract
                | Self::KwFinal
                | Self::KwReadonly
                | Self::KwVar
        )
    }

    /// Keywords that may still be used as method, constant or property names
    /// after `->`, `?->` and `::`.
    ///
    /// PHP reserves keywords only at statement/expression positions; as
    /// member names they degrade to plain identifiers.
    pub fn is_semi_reserved(self) -> bool {
        self.is_keyword()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(keyword_kind("ECHO"), Some(TokenKind::KwEcho));
        assert_eq!(keyword_kind("Echo"), Some(TokenKind::KwEcho));
        assert_eq!(keyword_kind("echo"), Some(TokenKind::KwEcho));
    }

    #[test]
    fn die_is_exit_alias() {
        assert_eq!(keyword_kind("die"), Some(TokenKind::KwExit));
        assert_eq!(keyword_kind("DIE"), Some(TokenKind::KwExit));
    }

    #[test]
    fn non_keywords_fall_through() {
        assert_eq!(keyword_kind("self"), None);
        assert_eq!(keyword_kind("parent"), None);
        assert_eq!(keyword_kind("strlen"), None);
    }

    #[test]
    fn compound_assign_maps_to_binary_op() {
        assert_eq!(TokenKind::DotAssign.compound_assign_op(), Some(TokenKind::Dot));
        assert_eq!(TokenKind::CoalesceAssign.compound_assign_op(), None);
        assert!(TokenKind::CoalesceAssign.is_assign_op());
    }

    #[test]
    fn keyword_range_predicate() {
        assert!(TokenKind::KwAbstract.is_keyword());
        assert!(TokenKind::KwNull.is_keyword());
        assert!(TokenKind::MagicTrait.is_keyword());
        assert!(!TokenKind::Identifier.is_keyword());
        assert!(!TokenKind::Eof.is_keyword());
    }
}
