//! Filter expression language.
//!
//! A closed grammar of comparisons joined by boolean combinators. Text is checked for
//! unsafe tokens, stray characters and unknown identifiers before it is parsed, and
//! nothing in the input is ever executed: the result is a plain tree that
//! [`crate::filter`] walks.
//!
//! ```text
//! expr       := and_expr (("or" | "|") and_expr)*
//! and_expr   := not_expr (("and" | "&") not_expr)*
//! not_expr   := ("not" | "~") not_expr | "(" expr ")" | bool | comparison
//! comparison := operand ("<" | "<=" | ">" | ">=" | "==" | "!=") operand
//! operand    := column | col["Column Name"] | number | 'text' | "text" | bool
//! ```

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

use crate::dataset::{format_number, Schema};
use crate::error::RejectionReason;

/// Identifiers that are refused outright, whatever the dataset's columns are.
pub const DENYLIST: &[&str] = &[
    "import",
    "importlib",
    "exec",
    "eval",
    "compile",
    "open",
    "file",
    "os",
    "sys",
    "subprocess",
    "system",
    "popen",
    "spawn",
    "shutil",
    "socket",
    "pickle",
    "marshal",
    "ctypes",
    "globals",
    "locals",
    "vars",
    "getattr",
    "setattr",
    "delattr",
    "lambda",
    "builtins",
    "breakpoint",
    "input",
    "exit",
    "quit",
];

const PUNCTUATION: &[char] = &[
    '&', '|', '~', '<', '>', '=', '!', '(', ')', '[', ']', ',', '.', '\'', '"',
];

#[derive(Debug, Clone, PartialEq, Eq, Copy, serde::Serialize, serde::Deserialize)]
pub enum CmpOp {
    Lt,
    LtEq,
    Gt,
    GtEq,
    Eq,
    NotEq,
}

impl CmpOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
        }
    }

    /// Applies the operator to an ordering of `left` relative to `right`.
    /// `None` (incomparable, e.g. NaN) only satisfies `!=`.
    pub fn test(&self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::{Equal, Greater, Less};
        match (self, ordering) {
            (CmpOp::NotEq, None) => true,
            (_, None) => false,
            (CmpOp::Lt, Some(o)) => o == Less,
            (CmpOp::LtEq, Some(o)) => o != Greater,
            (CmpOp::Gt, Some(o)) => o == Greater,
            (CmpOp::GtEq, Some(o)) => o != Less,
            (CmpOp::Eq, Some(o)) => o == Equal,
            (CmpOp::NotEq, Some(o)) => o != Equal,
        }
    }
}

/// A column resolved against a schema at validation time.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    name: String,
    index: usize,
}

impl ColumnRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnRef),
    Number(f64),
    Text(String),
    Bool(bool),
}

/// Validated predicate tree. Every [`ColumnRef`] in it names a column of the schema
/// it was validated against; there is no public way to build one otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Comparison {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
    Constant(bool),
    And(Box<FilterExpression>, Box<FilterExpression>),
    Or(Box<FilterExpression>, Box<FilterExpression>),
    Not(Box<FilterExpression>),
}

impl FilterExpression {
    /// Names of all referenced columns, in first-seen order.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            FilterExpression::Comparison { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Column(c) = operand {
                        if !out.contains(&c.name.as_str()) {
                            out.push(&c.name);
                        }
                    }
                }
            }
            FilterExpression::Constant(_) => {}
            FilterExpression::And(l, r) | FilterExpression::Or(l, r) => {
                l.collect_columns(out);
                r.collect_columns(out);
            }
            FilterExpression::Not(e) => e.collect_columns(out),
        }
    }

    /// True when every column reference points at the same name in `schema`.
    pub fn is_bound_to(&self, schema: &Schema) -> bool {
        match self {
            FilterExpression::Comparison { left, right, .. } => [left, right].iter().all(|o| {
                match o {
                    Operand::Column(c) => schema
                        .columns()
                        .get(c.index)
                        .is_some_and(|col| col.name == c.name),
                    _ => true,
                }
            }),
            FilterExpression::Constant(_) => true,
            FilterExpression::And(l, r) | FilterExpression::Or(l, r) => {
                l.is_bound_to(schema) && r.is_bound_to(schema)
            }
            FilterExpression::Not(e) => e.is_bound_to(schema),
        }
    }

    /// Re-resolve column positions by name against another schema. Columns the
    /// schema lacks are pointed past the end of every record and read as null.
    pub fn rebind(&self, schema: &Schema) -> FilterExpression {
        let operand = |o: &Operand| match o {
            Operand::Column(c) => Operand::Column(ColumnRef {
                name: c.name.clone(),
                index: schema.index_of(&c.name).unwrap_or(usize::MAX),
            }),
            other => other.clone(),
        };
        match self {
            FilterExpression::Comparison { left, op, right } => FilterExpression::Comparison {
                left: operand(left),
                op: *op,
                right: operand(right),
            },
            FilterExpression::Constant(b) => FilterExpression::Constant(*b),
            FilterExpression::And(l, r) => {
                FilterExpression::And(Box::new(l.rebind(schema)), Box::new(r.rebind(schema)))
            }
            FilterExpression::Or(l, r) => {
                FilterExpression::Or(Box::new(l.rebind(schema)), Box::new(r.rebind(schema)))
            }
            FilterExpression::Not(e) => FilterExpression::Not(Box::new(e.rebind(schema))),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(c) if is_plain_identifier(&c.name) => f.write_str(&c.name),
            Operand::Column(c) => write!(f, "col[{}]", quoted(&c.name)),
            Operand::Number(n) => f.write_str(&format_number(*n)),
            Operand::Text(s) => f.write_str(&quoted(s)),
            Operand::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpression::Comparison { left, op, right } => {
                write!(f, "{} {} {}", left, op.as_str(), right)
            }
            FilterExpression::Constant(b) => write!(f, "{}", b),
            FilterExpression::And(l, r) => write!(f, "({} and {})", l, r),
            FilterExpression::Or(l, r) => write!(f, "({} or {})", l, r),
            FilterExpression::Not(e) => write!(f, "not {}", e),
        }
    }
}

/// Strings have no escapes, so pick the quote character the value does not contain.
fn quoted(s: &str) -> String {
    if s.contains('"') {
        format!("'{}'", s)
    } else {
        format!("\"{}\"", s)
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !is_reserved(s)
}

fn is_reserved(s: &str) -> bool {
    matches!(
        s.to_lowercase().as_str(),
        "and" | "or" | "not" | "true" | "false" | "col"
    )
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Identifier(String),
    Number(f64),
    String(String),
    Bool(bool),
    Cmp(CmpOp),
    /// A lone `=`; kept so the parser can suggest `==`.
    Assign,
    And,
    Or,
    Not,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Invalid(char, usize),
    Unterminated(usize),
}

fn is_allowed_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c.is_whitespace() || PUNCTUATION.contains(&c)
}

fn dunder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"__\w*__").expect("dunder pattern is valid"))
}

/// Lexes the whole input without failing; problems are recorded as
/// `Invalid`/`Unterminated` tokens so the safety checks can see every identifier
/// first.
fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(pos, c)) = chars.peek() {
        match c {
            _ if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            '[' => {
                tokens.push(Token::LBracket);
                chars.next();
            }
            ']' => {
                tokens.push(Token::RBracket);
                chars.next();
            }
            ',' => {
                tokens.push(Token::Comma);
                chars.next();
            }
            '&' => {
                chars.next();
                // Accept `&&` as a single conjunction.
                if chars.peek().is_some_and(|&(_, nc)| nc == '&') {
                    chars.next();
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.peek().is_some_and(|&(_, nc)| nc == '|') {
                    chars.next();
                }
                tokens.push(Token::Or);
            }
            '~' => {
                tokens.push(Token::Not);
                chars.next();
            }
            '<' | '>' | '=' | '!' => {
                chars.next();
                let followed_by_eq = chars.peek().is_some_and(|&(_, nc)| nc == '=');
                if followed_by_eq {
                    chars.next();
                }
                let token = match (c, followed_by_eq) {
                    ('<', false) => Token::Cmp(CmpOp::Lt),
                    ('<', true) => Token::Cmp(CmpOp::LtEq),
                    ('>', false) => Token::Cmp(CmpOp::Gt),
                    ('>', true) => Token::Cmp(CmpOp::GtEq),
                    ('=', true) => Token::Cmp(CmpOp::Eq),
                    ('=', false) => Token::Assign,
                    ('!', true) => Token::Cmp(CmpOp::NotEq),
                    // A lone `!` negates, like `~`.
                    _ => Token::Not,
                };
                tokens.push(token);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, sc) in chars.by_ref() {
                    if sc == quote {
                        closed = true;
                        break;
                    } else {
                        value.push(sc);
                    }
                }
                if closed {
                    tokens.push(Token::String(value));
                } else {
                    tokens.push(Token::Unterminated(pos));
                }
            }
            '.' | '0'..='9' => {
                let starts_number = c.is_ascii_digit()
                    || input[pos + 1..]
                        .chars()
                        .next()
                        .is_some_and(|nc| nc.is_ascii_digit());
                if !starts_number {
                    tokens.push(Token::Dot);
                    chars.next();
                    continue;
                }
                let mut num = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    let exponent_allowed = !num.contains(['e', 'E']);
                    if nc.is_ascii_digit() || nc == '.' {
                        num.push(nc);
                        chars.next();
                    } else if (nc == 'e' || nc == 'E') && exponent_allowed {
                        num.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Trailing identifier characters make this a malformed literal like `3abc`.
                let mut trailing = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    if nc.is_alphanumeric() || nc == '_' {
                        trailing.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match num.parse::<f64>() {
                    Ok(n) if trailing.is_empty() => tokens.push(Token::Number(n)),
                    _ => tokens.push(Token::Identifier(format!("{}{}", num, trailing))),
                }
            }
            _ if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&(_, nc)) = chars.peek() {
                    if nc.is_alphanumeric() || nc == '_' {
                        ident.push(nc);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match ident.to_lowercase().as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "true" => tokens.push(Token::Bool(true)),
                    "false" => tokens.push(Token::Bool(false)),
                    _ => tokens.push(Token::Identifier(ident)),
                }
            }
            _ => {
                tokens.push(Token::Invalid(c, pos));
                chars.next();
            }
        }
    }
    tokens
}

/// Runs the rejection rules in order: unsafe tokens, malformed characters, unknown
/// identifiers. Bare identifiers that parse as numbers become number tokens.
fn screen(text: &str, tokens: Vec<Token>, schema: &Schema) -> Result<Vec<Token>, RejectionReason> {
    if let Some(m) = dunder_pattern().find(text) {
        return Err(RejectionReason::Unsafe {
            token: m.as_str().to_string(),
        });
    }
    for token in &tokens {
        if let Token::Identifier(ident) = token {
            let lower = ident.to_lowercase();
            if DENYLIST.contains(&lower.as_str()) {
                return Err(RejectionReason::Unsafe {
                    token: ident.clone(),
                });
            }
        }
    }
    // Characters outside the allowed set anywhere in the text, including inside quotes.
    if let Some((position, ch)) = text.char_indices().find(|&(_, c)| !is_allowed_char(c)) {
        return Err(RejectionReason::Malformed { ch, position });
    }
    for token in &tokens {
        match token {
            Token::Invalid(ch, position) => {
                return Err(RejectionReason::Malformed {
                    ch: *ch,
                    position: *position,
                })
            }
            Token::Unterminated(position) => {
                return Err(RejectionReason::UnterminatedString {
                    position: *position,
                })
            }
            _ => {}
        }
    }

    let mut screened = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter().peekable();
    while let Some(token) = iter.next() {
        match token {
            Token::Identifier(ident) => {
                if schema.contains(&ident) {
                    screened.push(Token::Identifier(ident));
                } else if ident == "col" && iter.peek() == Some(&Token::LBracket) {
                    screened.push(Token::Identifier(ident));
                } else if let Ok(n) = ident.parse::<f64>() {
                    screened.push(Token::Number(n));
                } else {
                    return Err(RejectionReason::UnknownColumn { name: ident });
                }
            }
            other => screened.push(other),
        }
    }
    Ok(screened)
}

fn syntax(msg: impl Into<String>) -> RejectionReason {
    RejectionReason::Syntax(msg.into())
}

fn describe(token: &Token) -> String {
    match token {
        Token::Identifier(s) => format!("`{}`", s),
        Token::Number(n) => format!("`{}`", format_number(*n)),
        Token::String(s) => format!("\"{}\"", s),
        Token::Bool(b) => format!("`{}`", b),
        Token::Cmp(op) => format!("`{}`", op.as_str()),
        Token::Assign => "`=`".to_string(),
        Token::And => "`and`".to_string(),
        Token::Or => "`or`".to_string(),
        Token::Not => "`not`".to_string(),
        Token::LParen => "`(`".to_string(),
        Token::RParen => "`)`".to_string(),
        Token::LBracket => "`[`".to_string(),
        Token::RBracket => "`]`".to_string(),
        Token::Comma => "`,`".to_string(),
        Token::Dot => "`.`".to_string(),
        Token::Invalid(c, _) => format!("'{}'", c),
        Token::Unterminated(_) => "unterminated string".to_string(),
    }
}

type Parsed<'a, T> = Result<(T, &'a [Token]), RejectionReason>;

fn parse_or<'a>(tokens: &'a [Token], schema: &Schema) -> Parsed<'a, FilterExpression> {
    let (mut left, mut rest) = parse_and(tokens, schema)?;
    while rest.first() == Some(&Token::Or) {
        let (right, remaining) = parse_and(&rest[1..], schema)?;
        left = FilterExpression::Or(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_and<'a>(tokens: &'a [Token], schema: &Schema) -> Parsed<'a, FilterExpression> {
    let (mut left, mut rest) = parse_not(tokens, schema)?;
    while rest.first() == Some(&Token::And) {
        let (right, remaining) = parse_not(&rest[1..], schema)?;
        left = FilterExpression::And(Box::new(left), Box::new(right));
        rest = remaining;
    }
    Ok((left, rest))
}

fn parse_not<'a>(tokens: &'a [Token], schema: &Schema) -> Parsed<'a, FilterExpression> {
    match tokens.first() {
        None => Err(syntax("Unexpected end of expression")),
        Some(Token::Not) => {
            let (inner, rest) = parse_not(&tokens[1..], schema)?;
            Ok((FilterExpression::Not(Box::new(inner)), rest))
        }
        Some(Token::LParen) => {
            let (inner, rest) = parse_or(&tokens[1..], schema)?;
            match rest.first() {
                Some(Token::RParen) => Ok((inner, &rest[1..])),
                Some(t) => Err(syntax(format!("Expected `)` but found {}", describe(t)))),
                None => Err(syntax("Unmatched parenthesis")),
            }
        }
        // A boolean literal not followed by a comparison is a constant predicate.
        Some(Token::Bool(b)) if !matches!(tokens.get(1), Some(Token::Cmp(_) | Token::Assign)) => {
            Ok((FilterExpression::Constant(*b), &tokens[1..]))
        }
        Some(_) => parse_comparison(tokens, schema),
    }
}

fn parse_comparison<'a>(tokens: &'a [Token], schema: &Schema) -> Parsed<'a, FilterExpression> {
    let (left, rest) = parse_operand(tokens, schema)?;
    let op = match rest.first() {
        Some(Token::Cmp(op)) => *op,
        Some(Token::Assign) => return Err(syntax("Use `==` for equality, not `=`")),
        Some(t) => {
            return Err(syntax(format!(
                "Expected a comparison operator after {} but found {}",
                left,
                describe(t)
            )))
        }
        None => {
            return Err(syntax(format!(
                "Expected a comparison operator after {}",
                left
            )))
        }
    };
    let (right, rest) = parse_operand(&rest[1..], schema)?;
    if let Some(Token::Cmp(_) | Token::Assign) = rest.first() {
        return Err(syntax("Chained comparisons are not supported; combine them with `and`"));
    }
    Ok((FilterExpression::Comparison { left, op, right }, rest))
}

fn parse_operand<'a>(tokens: &'a [Token], schema: &Schema) -> Parsed<'a, Operand> {
    match tokens.first() {
        None => Err(syntax("Missing operand")),
        Some(Token::Number(n)) => Ok((Operand::Number(*n), &tokens[1..])),
        Some(Token::String(s)) => Ok((Operand::Text(s.clone()), &tokens[1..])),
        Some(Token::Bool(b)) => Ok((Operand::Bool(*b), &tokens[1..])),
        Some(Token::Identifier(name)) if name == "col" && tokens.get(1) == Some(&Token::LBracket) => {
            // col["Column Name"] for names that are not plain identifiers
            let column = match tokens.get(2) {
                Some(Token::String(s)) | Some(Token::Identifier(s)) => s.clone(),
                _ => return Err(syntax("col[] must contain a quoted column name")),
            };
            if tokens.get(3) != Some(&Token::RBracket) {
                return Err(syntax("Unmatched bracket in col[]"));
            }
            let index = schema
                .index_of(&column)
                .ok_or_else(|| RejectionReason::UnknownColumn {
                    name: column.clone(),
                })?;
            Ok((
                Operand::Column(ColumnRef {
                    name: column,
                    index,
                }),
                &tokens[4..],
            ))
        }
        Some(Token::Identifier(name)) => {
            let index = schema
                .index_of(name)
                .ok_or_else(|| RejectionReason::UnknownColumn { name: name.clone() })?;
            Ok((
                Operand::Column(ColumnRef {
                    name: name.clone(),
                    index,
                }),
                &tokens[1..],
            ))
        }
        Some(t) => Err(syntax(format!("Expected a column or value but found {}", describe(t)))),
    }
}

/// Validates and parses filter text against the dataset's schema.
pub fn validate(text: &str, schema: &Schema) -> Result<FilterExpression, RejectionReason> {
    let tokens = screen(text, tokenize(text), schema)?;
    if tokens.is_empty() {
        return Err(syntax("Empty expression"));
    }
    let (expr, rest) = parse_or(&tokens, schema)?;
    match rest.first() {
        None => Ok(expr),
        Some(Token::RParen) => Err(syntax("Unmatched closing parenthesis")),
        Some(t) => Err(syntax(format!("Unexpected {} after expression", describe(t)))),
    }
}

/// Like [`validate`], but blank text means "no expression filter".
pub fn compile_filter(
    text: &str,
    schema: &Schema,
) -> Result<Option<FilterExpression>, RejectionReason> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    validate(text, schema).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Column, Schema};

    fn schema() -> Schema {
        Schema::new(
            vec![
                Column::text("Name"),
                Column::text("SMILES"),
                Column::numeric("MW"),
                Column::numeric("LogP"),
                Column::numeric("Heavy Atoms"),
            ],
            "SMILES",
        )
        .unwrap()
    }

    fn col_ref(name: &str, index: usize) -> Operand {
        Operand::Column(ColumnRef {
            name: name.to_string(),
            index,
        })
    }

    #[test]
    fn test_tokenize_simple() {
        let tokens = tokenize("MW > 300 & LogP < 5");
        assert_eq!(
            tokens,
            vec![
                Token::Identifier("MW".to_string()),
                Token::Cmp(CmpOp::Gt),
                Token::Number(300.0),
                Token::And,
                Token::Identifier("LogP".to_string()),
                Token::Cmp(CmpOp::Lt),
                Token::Number(5.0),
            ]
        );
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens = tokenize("a != b, c >= d, e <= f, g == h, i = j");
        let ops: Vec<&Token> = tokens
            .iter()
            .filter(|t| matches!(t, Token::Cmp(_) | Token::Assign))
            .collect();
        assert_eq!(
            ops,
            vec![
                &Token::Cmp(CmpOp::NotEq),
                &Token::Cmp(CmpOp::GtEq),
                &Token::Cmp(CmpOp::LtEq),
                &Token::Cmp(CmpOp::Eq),
                &Token::Assign,
            ]
        );
    }

    #[test]
    fn test_tokenize_numbers() {
        assert_eq!(tokenize(".5"), vec![Token::Number(0.5)]);
        assert_eq!(tokenize("1e3"), vec![Token::Number(1000.0)]);
        assert_eq!(tokenize("2.25"), vec![Token::Number(2.25)]);
    }

    #[test]
    fn test_tokenize_strings_and_keywords() {
        assert_eq!(
            tokenize("Name == 'benzene' OR not True"),
            vec![
                Token::Identifier("Name".to_string()),
                Token::Cmp(CmpOp::Eq),
                Token::String("benzene".to_string()),
                Token::Or,
                Token::Not,
                Token::Bool(true),
            ]
        );
        assert_eq!(tokenize("\"unterminated"), vec![Token::Unterminated(0)]);
    }

    #[test]
    fn test_parse_and_binds_tighter_than_or() {
        let expr = validate("MW > 1 or MW < 2 and LogP == 3", &schema()).unwrap();
        match expr {
            FilterExpression::Or(left, right) => {
                assert!(matches!(*left, FilterExpression::Comparison { .. }));
                assert!(matches!(*right, FilterExpression::And(_, _)));
            }
            other => panic!("expected Or at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_parentheses_override_precedence() {
        let expr = validate("(MW > 1 | MW < 2) & LogP == 3", &schema()).unwrap();
        assert!(matches!(expr, FilterExpression::And(_, _)));
    }

    #[test]
    fn test_parse_not_binds_tighter_than_and() {
        let expr = validate("~ MW > 1 & LogP < 2", &schema()).unwrap();
        match expr {
            FilterExpression::And(left, _) => {
                assert!(matches!(*left, FilterExpression::Not(_)))
            }
            other => panic!("expected And at the root, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_comparison_tree() {
        let expr = validate("MW > 300 & LogP < 5", &schema()).unwrap();
        assert_eq!(
            expr,
            FilterExpression::And(
                Box::new(FilterExpression::Comparison {
                    left: col_ref("MW", 2),
                    op: CmpOp::Gt,
                    right: Operand::Number(300.0),
                }),
                Box::new(FilterExpression::Comparison {
                    left: col_ref("LogP", 3),
                    op: CmpOp::Lt,
                    right: Operand::Number(5.0),
                }),
            )
        );
    }

    #[test]
    fn test_parse_col_bracket_syntax() {
        let expr = validate("col[\"Heavy Atoms\"] >= 10", &schema()).unwrap();
        assert_eq!(expr.columns(), vec!["Heavy Atoms"]);
        assert_eq!(expr.to_string(), "col[\"Heavy Atoms\"] >= 10");
    }

    #[test]
    fn test_reject_dunder_anywhere() {
        for text in [
            "__import__('os')",
            "MW > 300 & __class__ == 1",
            "Name == '__builtins__'",
        ] {
            let err = validate(text, &schema()).unwrap_err();
            assert!(err.is_safety_violation(), "{} gave {:?}", text, err);
        }
    }

    #[test]
    fn test_reject_denylisted_identifiers() {
        for text in ["os == 1", "MW > 1 and eval", "SYSTEM != 2", "import"] {
            let err = validate(text, &schema()).unwrap_err();
            assert!(err.is_safety_violation(), "{} gave {:?}", text, err);
        }
    }

    #[test]
    fn test_unsafe_checked_before_malformed() {
        let err = validate("exec(MW; 1)", &schema()).unwrap_err();
        assert!(err.is_safety_violation());
    }

    #[test]
    fn test_reject_malformed_characters() {
        let err = validate("MW > 300 + 1", &schema()).unwrap_err();
        assert_eq!(
            err,
            RejectionReason::Malformed {
                ch: '+',
                position: 9
            }
        );
        let err = validate("Name == 'a;b'", &schema()).unwrap_err();
        assert!(matches!(err, RejectionReason::Malformed { ch: ';', .. }));
    }

    #[test]
    fn test_reject_unknown_columns() {
        let err = validate("Weight > 3", &schema()).unwrap_err();
        assert_eq!(
            err,
            RejectionReason::UnknownColumn {
                name: "Weight".to_string()
            }
        );
        let err = validate("col['Nope'] > 3", &schema()).unwrap_err();
        assert!(matches!(err, RejectionReason::UnknownColumn { .. }));
    }

    #[test]
    fn test_numeric_identifiers_are_literals() {
        let expr = validate("MW < inf", &schema()).unwrap();
        assert!(matches!(
            expr,
            FilterExpression::Comparison {
                right: Operand::Number(n),
                ..
            } if n.is_infinite()
        ));
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("MW >", "Missing operand"),
            ("MW = 3", "=="),
            ("(MW > 3", "Unmatched"),
            ("MW > 3)", "Unmatched closing"),
            ("1 < MW < 5", "Chained"),
            ("MW", "comparison operator"),
            ("MW > 3 and", "end of expression"),
        ];
        for (text, needle) in cases {
            match validate(text, &schema()) {
                Err(RejectionReason::Syntax(msg)) => {
                    assert!(msg.contains(needle), "{}: {}", text, msg)
                }
                other => panic!("{} should be a syntax error, got {:?}", text, other),
            }
        }
    }

    #[test]
    fn test_boolean_constants() {
        assert_eq!(
            validate("true", &schema()).unwrap(),
            FilterExpression::Constant(true)
        );
        let expr = validate("not false and MW > 1", &schema()).unwrap();
        assert!(matches!(expr, FilterExpression::And(_, _)));
    }

    #[test]
    fn test_compile_filter_blank_is_none() {
        assert_eq!(compile_filter("   ", &schema()).unwrap(), None);
        assert!(compile_filter("MW > 1", &schema()).unwrap().is_some());
    }

    #[test]
    fn test_display_round_trips_through_validate() {
        let s = schema();
        let expr = validate("not (MW > 300 | Name == 'x') & LogP <= 5", &s).unwrap();
        let reparsed = validate(&expr.to_string(), &s).unwrap();
        assert_eq!(expr, reparsed);
    }

    #[test]
    fn test_display_picks_free_quote() {
        let s = schema();
        let expr = validate(r#"Name == 'say "hi"'"#, &s).unwrap();
        assert_eq!(expr.to_string(), r#"Name == 'say "hi"'"#);
        assert_eq!(validate(&expr.to_string(), &s).unwrap(), expr);
    }

    #[test]
    fn test_rebind_to_other_schema() {
        let expr = validate("LogP < 5", &schema()).unwrap();
        let other = Schema::new(
            vec![Column::numeric("LogP"), Column::text("SMILES")],
            "SMILES",
        )
        .unwrap();
        assert!(!expr.is_bound_to(&other));
        let rebound = expr.rebind(&other);
        assert!(rebound.is_bound_to(&other));
    }
}
