//! SQL Tokens - the atomic units of SQL output.
//!
//! Tokens are dialect-agnostic representations that serialize
//! to dialect-specific strings. Bound values travel as [`Token::Param`]
//! and are collected, in placeholder order, when a stream is serialized.

use serde_json::Value;

use super::dialect::{Dialect, SqlDialect};

/// SQL Token - every possible element in a SQL statement.
///
/// Adding a new variant here will cause compile errors everywhere
/// it needs to be handled (exhaustive matching).
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // === Keywords ===
    Select,
    From,
    Where,
    And,
    Or,
    Not,
    As,
    On,
    Join,
    Full,
    Outer,
    Cross,
    GroupBy,
    OrderBy,
    Asc,
    Desc,
    NullsLast,
    Limit,
    Offset,
    Case,
    When,
    Then,
    Else,
    End,
    In,
    Like,
    ILike,
    IsNull,
    IsNotNull,
    Exists,
    Distinct,
    With,
    True,
    False,
    Cast,
    Interval,
    AtTimeZone,

    // === Punctuation ===
    Comma,
    Dot,
    Star,
    LParen,
    RParen,

    // === Operators ===
    Eq,
    Ne,
    Lt,
    Gt,
    Lte,
    Gte,
    Plus,
    Minus,
    Mul,
    Div,

    // === Whitespace / Formatting ===
    Space,
    Newline,
    Indent(usize),

    // === Dynamic Content ===
    /// Simple identifier (table, column, alias)
    Ident(String),
    /// Qualified identifier: schema.table or just table
    QualifiedIdent {
        schema: Option<String>,
        name: String,
    },
    /// Integer literal
    LitInt(i64),
    /// String literal
    LitString(String),
    /// Boolean literal
    LitBool(bool),
    /// NULL literal
    LitNull,

    /// Bound parameter. Serializes to the dialect placeholder and
    /// contributes its value to the argument list.
    Param(Value),

    // === Function Names ===
    FunctionName(String),

    // === Escape Hatch ===
    /// Raw SQL passed directly to output without escaping.
    ///
    /// # Security Warning
    ///
    /// **Never pass user input to this variant.** Raw SQL is not sanitized
    /// and can lead to SQL injection vulnerabilities. Only use with:
    /// - Trusted, static SQL fragments
    /// - Expressions owned by the metrics view catalog
    ///
    /// For user-provided values, use `Token::Param`.
    Raw(String),
}

impl Token {
    /// Serialize this token on its own.
    ///
    /// A `Param` renders as the first placeholder of the dialect; use
    /// [`TokenStream::serialize_with_args`] to number parameters.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.write(dialect, &mut Vec::new())
    }

    fn write(&self, dialect: Dialect, args: &mut Vec<Value>) -> String {
        match self {
            // Keywords
            Token::Select => "SELECT".into(),
            Token::From => "FROM".into(),
            Token::Where => "WHERE".into(),
            Token::And => "AND".into(),
            Token::Or => "OR".into(),
            Token::Not => "NOT".into(),
            Token::As => "AS".into(),
            Token::On => "ON".into(),
            Token::Join => "JOIN".into(),
            Token::Full => "FULL".into(),
            Token::Outer => "OUTER".into(),
            Token::Cross => "CROSS".into(),
            Token::GroupBy => "GROUP BY".into(),
            Token::OrderBy => "ORDER BY".into(),
            Token::Asc => "ASC".into(),
            Token::Desc => "DESC".into(),
            Token::NullsLast => "NULLS LAST".into(),
            Token::Limit => "LIMIT".into(),
            Token::Offset => "OFFSET".into(),
            Token::Case => "CASE".into(),
            Token::When => "WHEN".into(),
            Token::Then => "THEN".into(),
            Token::Else => "ELSE".into(),
            Token::End => "END".into(),
            Token::In => "IN".into(),
            Token::Like => "LIKE".into(),
            Token::ILike => "ILIKE".into(),
            Token::IsNull => "IS NULL".into(),
            Token::IsNotNull => "IS NOT NULL".into(),
            Token::Exists => "EXISTS".into(),
            Token::Distinct => "DISTINCT".into(),
            Token::With => "WITH".into(),
            Token::True => "TRUE".into(),
            Token::False => "FALSE".into(),
            Token::Cast => "CAST".into(),
            Token::Interval => "INTERVAL".into(),
            Token::AtTimeZone => "AT TIME ZONE".into(),

            // Punctuation
            Token::Comma => ",".into(),
            Token::Dot => ".".into(),
            Token::Star => "*".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),

            // Operators
            Token::Eq => "=".into(),
            Token::Ne => "<>".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::Lte => "<=".into(),
            Token::Gte => ">=".into(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),

            // Whitespace
            Token::Space => " ".into(),
            Token::Newline => "\n".into(),
            Token::Indent(n) => "  ".repeat(*n),

            // Dynamic - dialect-specific formatting
            Token::Ident(name) => dialect.quote_identifier(name),
            Token::QualifiedIdent { schema, name } => match schema {
                Some(s) => format!(
                    "{}.{}",
                    dialect.quote_identifier(s),
                    dialect.quote_identifier(name)
                ),
                None => dialect.quote_identifier(name),
            },
            Token::LitInt(n) => n.to_string(),
            Token::LitString(s) => dialect.quote_string(s),
            Token::LitBool(b) => dialect.format_bool(*b).into(),
            Token::LitNull => "NULL".into(),

            Token::Param(value) => {
                args.push(value.clone());
                dialect.placeholder(args.len())
            }

            Token::FunctionName(name) => name.to_uppercase(),

            // Escape hatch
            Token::Raw(s) => s.clone(),
        }
    }
}

/// A stream of tokens that can be serialized to SQL.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenStream {
    tokens: Vec<Token>,
}

impl TokenStream {
    /// Create an empty token stream.
    pub fn new() -> Self {
        Self { tokens: vec![] }
    }

    /// Push a single token.
    pub fn push(&mut self, token: Token) -> &mut Self {
        self.tokens.push(token);
        self
    }

    /// Append another token stream.
    pub fn append(&mut self, other: &TokenStream) -> &mut Self {
        self.tokens.extend(other.tokens.iter().cloned());
        self
    }

    /// Serialize all tokens to a SQL string, discarding bound values.
    pub fn serialize(&self, dialect: Dialect) -> String {
        self.serialize_with_args(dialect).0
    }

    /// Serialize all tokens and collect bound values in placeholder order.
    pub fn serialize_with_args(&self, dialect: Dialect) -> (String, Vec<Value>) {
        let mut args = Vec::new();
        let sql = self
            .tokens
            .iter()
            .map(|t| t.write(dialect, &mut args))
            .collect();
        (sql, args)
    }

    // Convenience methods for common tokens
    pub fn space(&mut self) -> &mut Self {
        self.push(Token::Space)
    }
    pub fn newline(&mut self) -> &mut Self {
        self.push(Token::Newline)
    }
    pub fn indent(&mut self, n: usize) -> &mut Self {
        self.push(Token::Indent(n))
    }
    pub fn comma(&mut self) -> &mut Self {
        self.push(Token::Comma)
    }
    pub fn lparen(&mut self) -> &mut Self {
        self.push(Token::LParen)
    }
    pub fn rparen(&mut self) -> &mut Self {
        self.push(Token::RParen)
    }
}
