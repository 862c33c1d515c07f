//! Policy condition language.
//!
//! A small boolean expression language over the call and its context:
//!
//! ```text
//! params.amount > 1000 && user.role != 'admin'
//! 'get_balance' in session.previous_calls
//! time.hour < 9 || time.hour > 17
//! matches(params.to, "^ext-") and not has(params.memo)
//! ```
//!
//! The grammar lives in `grammar.lalrpop` and is compiled by the crate's
//! build script. Everything that can be checked statically is checked while
//! parsing: unknown variables, unknown functions, arity and regex syntax.

use lalrpop_util::lexer::Token;
use lalrpop_util::lalrpop_mod;
use toolguard_tool::Pattern;

/// Parse error with byte offset into the source
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at {position}: {message}")]
pub struct ParseError {
    /// Byte offset
    pub position: usize,
    /// What went wrong
    pub message: String,
}

impl ParseError {
    fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CompareOp {
    /// Operator as written
    #[must_use]
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Built-in function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// `len(x)`: length of a string, list or object
    Len,
    /// `contains(haystack, needle)`
    Contains,
    /// `starts_with(s, prefix)`
    StartsWith,
    /// `ends_with(s, suffix)`
    EndsWith,
    /// `lower(s)`
    Lower,
    /// `has(path)`: the path resolves to a non-null value
    Has,
}

impl Function {
    fn lookup(name: &str) -> Option<(Self, usize)> {
        Some(match name {
            "len" => (Self::Len, 1),
            "contains" => (Self::Contains, 2),
            "starts_with" => (Self::StartsWith, 2),
            "ends_with" => (Self::EndsWith, 2),
            "lower" => (Self::Lower, 1),
            "has" => (Self::Has, 1),
            _ => return None,
        })
    }

    /// Function name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Len => "len",
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Lower => "lower",
            Self::Has => "has",
        }
    }
}

/// Literal value in an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Number
    Number(f64),
    /// Quoted string
    String(String),
}

/// Policy expression AST
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyExpr {
    /// Literal value
    Literal(Literal),
    /// Dotted variable path, e.g. `params.amount`
    Path(Vec<String>),
    /// List literal
    List(Vec<PolicyExpr>),
    /// Logical negation
    Not(Box<PolicyExpr>),
    /// Short-circuit conjunction
    And(Box<PolicyExpr>, Box<PolicyExpr>),
    /// Short-circuit disjunction
    Or(Box<PolicyExpr>, Box<PolicyExpr>),
    /// Comparison
    Compare {
        /// Operator
        op: CompareOp,
        /// Left operand
        left: Box<PolicyExpr>,
        /// Right operand
        right: Box<PolicyExpr>,
    },
    /// Membership test, `item in collection`
    In {
        /// Needle
        item: Box<PolicyExpr>,
        /// List or string
        collection: Box<PolicyExpr>,
    },
    /// Function call
    Call {
        /// Function
        func: Function,
        /// Arguments, arity already checked
        args: Vec<PolicyExpr>,
    },
    /// `matches(subject, "regex")`, regex compiled at parse time
    Matches {
        /// String operand
        subject: Box<PolicyExpr>,
        /// Compiled pattern
        pattern: Pattern,
    },
}

impl PolicyExpr {
    /// Path expression from dotted text, e.g. `params.amount`
    #[must_use]
    pub fn path(dotted: &str) -> Self {
        Self::Path(dotted.split('.').map(str::to_string).collect())
    }

    /// Conjunction of two expressions
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Negation
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

lalrpop_mod!(#[allow(clippy::all)] grammar);

type GrammarError<'input> = lalrpop_util::ParseError<usize, Token<'input>, ParseError>;

impl From<GrammarError<'_>> for ParseError {
    fn from(err: GrammarError<'_>) -> Self {
        match err {
            GrammarError::InvalidToken { location } => {
                Self::new(location, "unexpected character or unterminated string")
            }
            GrammarError::UnrecognizedEof { location, expected } => Self::new(
                location,
                format!("unexpected end of input, expected {}", expected.join(" or ")),
            ),
            GrammarError::UnrecognizedToken {
                token: (start, token, _),
                expected,
            } => Self::new(
                start,
                format!("unexpected '{}', expected {}", token, expected.join(" or ")),
            ),
            GrammarError::ExtraToken {
                token: (start, token, _),
            } => Self::new(start, format!("unexpected '{}' after expression", token)),
            GrammarError::User { error } => error,
        }
    }
}

/// Check that a path names something the evaluator can resolve
fn check_path(start: usize, path: &[String]) -> Result<(), ParseError> {
    let ok = match path {
        [root, rest @ ..] if root == "params" || root == "metadata" => !rest.is_empty(),
        [root, field] => matches!(
            (root.as_str(), field.as_str()),
            ("tool", "name")
                | ("user", "id" | "role" | "permissions")
                | ("session", "id" | "conversation_id" | "previous_calls")
                | ("time", "hour")
                | ("request", "ip")
        ),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ParseError::new(start, format!("unknown variable '{}'", path.join("."))))
    }
}

/// Resolve a function call, checking name, arity and `matches()` regex
fn call(start: usize, name: &str, args: Vec<PolicyExpr>) -> Result<PolicyExpr, ParseError> {
    if name == "matches" {
        return match <[PolicyExpr; 2]>::try_from(args) {
            Ok([subject, PolicyExpr::Literal(Literal::String(source))]) => {
                let pattern = Pattern::new(&source).map_err(|e| {
                    ParseError::new(start, format!("invalid regex in matches(): {}", e))
                })?;
                Ok(PolicyExpr::Matches {
                    subject: Box::new(subject),
                    pattern,
                })
            }
            _ => Err(ParseError::new(
                start,
                "matches() takes a value and a string literal regex",
            )),
        };
    }

    let (func, arity) = Function::lookup(name)
        .ok_or_else(|| ParseError::new(start, format!("unknown function '{}'", name)))?;
    if args.len() != arity {
        return Err(ParseError::new(
            start,
            format!("{}() takes {} argument(s), got {}", name, arity, args.len()),
        ));
    }
    if func == Function::Has && !matches!(args[0], PolicyExpr::Path(_)) {
        return Err(ParseError::new(start, "has() takes a variable path"));
    }

    Ok(PolicyExpr::Call { func, args })
}

fn number(start: usize, text: &str) -> Result<f64, ParseError> {
    text.replace('_', "")
        .parse::<f64>()
        .map_err(|_| ParseError::new(start, format!("bad number '{}'", text)))
}

/// Strip the quotes off a string token and resolve escapes
fn unquote(token: &str) -> String {
    let inner = token
        .get(1..token.len().saturating_sub(1))
        .unwrap_or_default();
    let mut text = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            text.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => text.push('\n'),
            Some('t') => text.push('\t'),
            Some(other) => text.push(other),
            None => {}
        }
    }
    text
}

/// Parser for the condition language, generated from `grammar.lalrpop`
pub struct PolicyParser {
    inner: grammar::ExprParser,
}

impl PolicyParser {
    /// Create a new parser
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: grammar::ExprParser::new(),
        }
    }

    /// Parse a condition
    ///
    /// # Errors
    ///
    /// Returns error on syntax errors, unknown variables or functions,
    /// wrong arity, or an invalid regex in `matches`
    pub fn parse(&self, source: &str) -> Result<PolicyExpr, ParseError> {
        self.inner.parse(source).map_err(ParseError::from)
    }
}

impl Default for PolicyParser {
    fn default() -> Self {
        Self::new()
    }
}
