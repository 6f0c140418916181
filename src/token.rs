// Token kinds and the keyword table. Mirrors the closed TokenType enum of
// the reference lexer: delimiters, one/two-char operators, compound
// assignment, literal kinds, and the fixed keyword set from spec section 6.

use std::collections::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen, RightParen, LeftBrace, RightBrace,
    LeftBracket, RightBracket, Comma, Dot, Minus, Plus,
    Semicolon, Slash, Star, Colon, At, Tilde, Percent,

    Bang, BangEqual,
    Equal, EqualEqual,
    Greater, GreaterEqual,
    Less, LessEqual,
    Arrow,

    And, Or,

    BitAnd, BitOr, Xor, ShiftLeft, ShiftRight,

    PlusEqual, MinusEqual, StarEqual, SlashEqual,
    PercentEqual, BitAndEqual, BitOrEqual, XorEqual,

    Identifier, String, Integer, Float, Char, InterpolatedStringStart,

    // Keywords
    Object, When, Asm, Async, Await, Break, Case, Catch,
    Class, Const, Continue, Default, Delete, Do, Else, Enum,
    False, For, Function, Goto, If, Import, In, Is, Lock,
    DunderLock, LockDunder,
    Namespace, New, Not, NullLiteral, Operator, Print, Input,
    Return, Sizeof, Struct, Switch, This, Throw, True, Try,
    Typedef, Union, Using, Volatile, While,

    Int, FloatType, CharType, Bool, Void,

    ScopeResolution,

    Eof,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: u32,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: u32) -> Self {
        Token { kind, lexeme: lexeme.into(), line }
    }
}

lazy_static! {
    pub static ref KEYWORDS: HashMap<&'static str, TokenKind> = {
        use TokenKind::*;
        let mut m = HashMap::new();
        m.insert("object", Object);
        m.insert("when", When);
        m.insert("asm", Asm);
        m.insert("async", Async);
        m.insert("await", Await);
        m.insert("and", And);
        m.insert("or", Or);
        m.insert("bitand", BitAnd);
        m.insert("bitor", BitOr);
        m.insert("break", Break);
        m.insert("case", Case);
        m.insert("catch", Catch);
        m.insert("char", CharType);
        m.insert("class", Class);
        m.insert("const", Const);
        m.insert("continue", Continue);
        m.insert("default", Default);
        m.insert("delete", Delete);
        m.insert("do", Do);
        m.insert("else", Else);
        m.insert("enum", Enum);
        m.insert("false", False);
        m.insert("float", FloatType);
        m.insert("for", For);
        m.insert("function", Function);
        m.insert("goto", Goto);
        m.insert("if", If);
        m.insert("import", Import);
        m.insert("in", In);
        m.insert("is", Is);
        m.insert("int", Int);
        m.insert("lock", Lock);
        m.insert("__lock", DunderLock);
        m.insert("lock__", LockDunder);
        m.insert("namespace", Namespace);
        m.insert("new", New);
        m.insert("not", Not);
        m.insert("nullptr", NullLiteral);
        m.insert("operator", Operator);
        m.insert("print", Print);
        m.insert("input", Input);
        m.insert("return", Return);
        m.insert("sizeof", Sizeof);
        m.insert("struct", Struct);
        m.insert("switch", Switch);
        m.insert("this", This);
        m.insert("throw", Throw);
        m.insert("true", True);
        m.insert("try", Try);
        m.insert("typedef", Typedef);
        m.insert("union", Union);
        m.insert("using", Using);
        m.insert("void", Void);
        m.insert("volatile", Volatile);
        m.insert("while", While);
        m.insert("bool", Bool);
        m.insert("xor", Xor);
        m
    };
}
