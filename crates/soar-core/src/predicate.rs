//! Hand-written recursive-descent parser and evaluator for the binding
//! `where` clause and step `if`/`condition` expressions (spec §4.2, §9).
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ( "||" and_expr )*
//! and_expr   := comparison ( "&&" comparison )*
//! comparison := "(" expr ")" | path op literal | path "IN" "[" literal_list "]"
//!             | path "." "contains" "(" literal ")"
//! op         := "==" | "!=" | ">=" | "<=" | ">" | "<"
//! literal    := string | number | "true" | "false" | "null"
//! path       := ident ( "." ident )*
//! ```
//!
//! Parse failures and evaluation against missing paths both evaluate to
//! `false` (fail-closed, per the Open Question decision recorded in
//! DESIGN.md) rather than propagating an error to the caller — the caller
//! logs the failure and moves on to the next binding.

use soar_contracts::value::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    #[error("unexpected end of predicate")]
    UnexpectedEnd,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("unterminated string literal")]
    UnterminatedString,
}

/// Evaluate `expression` against `data`. Returns `false` on any parse or
/// evaluation failure rather than propagating an error — callers that need
/// to log the failure should call [`parse`] themselves.
pub fn evaluate(expression: &str, data: &Value) -> bool {
    match parse(expression) {
        Ok(ast) => ast.eval(data),
        Err(_) => false,
    }
}

/// Parse `expression` into an [`Expr`] tree, or a [`PredicateError`] if the
/// text doesn't match the grammar above.
pub fn parse(expression: &str) -> Result<Expr, PredicateError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(PredicateError::UnexpectedToken(format!("{:?}", parser.tokens[parser.pos])));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare { path: String, op: CompareOp, literal: Literal },
    In { path: String, values: Vec<Literal> },
    Contains { path: String, value: Literal },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompareOp {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl Literal {
    fn matches(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Literal::Null, None) => true,
            (Literal::Null, Some(Value::Null)) => true,
            (_, None) => false,
            (Literal::String(s), Some(Value::String(v))) => s == v,
            (Literal::Number(n), Some(Value::Number(v))) => (n - v).abs() < f64::EPSILON,
            (Literal::Bool(b), Some(Value::Bool(v))) => b == v,
            _ => false,
        }
    }

    fn compare(&self, value: Option<&Value>, op: CompareOp) -> bool {
        match op {
            CompareOp::Eq => self.matches(value),
            CompareOp::Ne => !self.matches(value),
            _ => {
                let (Literal::Number(lhs), Some(Value::Number(rhs))) = (self, value) else {
                    return false;
                };
                match op {
                    CompareOp::Ge => rhs >= lhs,
                    CompareOp::Le => rhs <= lhs,
                    CompareOp::Gt => rhs > lhs,
                    CompareOp::Lt => rhs < lhs,
                    CompareOp::Eq | CompareOp::Ne => unreachable!(),
                }
            }
        }
    }
}

impl Expr {
    pub fn eval(&self, data: &Value) -> bool {
        match self {
            Expr::Or(l, r) => l.eval(data) || r.eval(data),
            Expr::And(l, r) => l.eval(data) && r.eval(data),
            Expr::Compare { path, op, literal } => literal.compare(data.get_path(path), *op),
            Expr::In { path, values } => {
                let resolved = data.get_path(path);
                values.iter().any(|v| v.matches(resolved))
            }
            Expr::Contains { path, value } => match data.get_path(path) {
                Some(Value::Array(items)) => items.iter().any(|item| value.matches(Some(item))),
                Some(Value::String(s)) => {
                    matches!(value, Literal::String(needle) if s.contains(needle.as_str()))
                }
                _ => false,
            },
        }
    }
}

/// Evaluate a binding's filter map (`field -> value | [values]`); all
/// entries must match, an entry whose value is an array means "any of"
/// (spec §4.2 "Conjunction").
pub fn matches_filter(filter: &std::collections::BTreeMap<String, Value>, data: &Value) -> bool {
    filter.iter().all(|(field, expected)| {
        let actual = data.get_path(field);
        match expected {
            Value::Array(options) => options.iter().any(|opt| Some(opt) == actual),
            other => Some(other) == actual,
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Number(f64),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    And,
    Or,
    In,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PredicateError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(PredicateError::UnterminatedString);
                }
                tokens.push(Token::String(s));
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("=="));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!="));
                i += 2;
            }
            '>' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(">="));
                i += 2;
            }
            '<' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("<="));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(">"));
                i += 1;
            }
            '<' => {
                tokens.push(Token::Op("<"));
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n: f64 = text
                    .parse()
                    .map_err(|_| PredicateError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Number(n));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "IN" | "in" => tokens.push(Token::In),
                    "true" => tokens.push(Token::Ident("true".into())),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(PredicateError::UnexpectedToken(other.to_string())),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn parse_or(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, PredicateError> {
        let mut left = self.parse_atom()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_atom()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Expr, PredicateError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_or()?;
            match self.advance() {
                Some(Token::RParen) => return Ok(inner),
                other => return Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
            }
        }

        let path = match self.advance() {
            Some(Token::Ident(p)) => p,
            other => return Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
        };

        // `path.contains(literal)`
        if let Some(rest) = path.strip_suffix(".contains") {
            if matches!(self.peek(), Some(Token::LParen)) {
                self.advance();
                let value = self.parse_literal()?;
                match self.advance() {
                    Some(Token::RParen) => {
                        return Ok(Expr::Contains { path: rest.to_string(), value })
                    }
                    other => return Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
                }
            }
        }

        match self.advance() {
            Some(Token::Op(op)) => {
                let literal = self.parse_literal()?;
                let op = match op {
                    "==" => CompareOp::Eq,
                    "!=" => CompareOp::Ne,
                    ">=" => CompareOp::Ge,
                    "<=" => CompareOp::Le,
                    ">" => CompareOp::Gt,
                    "<" => CompareOp::Lt,
                    _ => unreachable!(),
                };
                Ok(Expr::Compare { path, op, literal })
            }
            Some(Token::In) => {
                match self.advance() {
                    Some(Token::LBracket) => {}
                    other => return Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
                }
                let mut values = Vec::new();
                loop {
                    values.push(self.parse_literal()?);
                    match self.peek() {
                        Some(Token::Comma) => {
                            self.advance();
                        }
                        Some(Token::RBracket) => {
                            self.advance();
                            break;
                        }
                        other => {
                            return Err(PredicateError::UnexpectedToken(format!("{other:?}")))
                        }
                    }
                }
                Ok(Expr::In { path, values })
            }
            other => Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, PredicateError> {
        match self.advance() {
            Some(Token::String(s)) => Ok(Literal::String(s)),
            Some(Token::Number(n)) => Ok(Literal::Number(n)),
            Some(Token::Ident(word)) if word == "true" => Ok(Literal::Bool(true)),
            Some(Token::Ident(word)) if word == "false" => Ok(Literal::Bool(false)),
            Some(Token::Ident(word)) if word == "null" => Ok(Literal::Null),
            other => Err(PredicateError::UnexpectedToken(format!("{other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> Value {
        serde_json::json!({
            "severity": "high",
            "score": 9,
            "tags": ["ransomware", "lateral-movement"],
            "category": "malware"
        })
        .into()
    }

    #[test]
    fn evaluates_equality() {
        assert!(evaluate("severity == 'high'", &data()));
        assert!(!evaluate("severity == 'low'", &data()));
    }

    #[test]
    fn evaluates_numeric_comparison() {
        assert!(evaluate("score >= 7", &data()));
        assert!(!evaluate("score < 7", &data()));
    }

    #[test]
    fn evaluates_membership() {
        assert!(evaluate("tags.contains('ransomware')", &data()));
        assert!(!evaluate("tags.contains('phishing')", &data()));
    }

    #[test]
    fn evaluates_in_set() {
        assert!(evaluate("category IN ['malware','phishing']", &data()));
        assert!(!evaluate("category IN ['benign']", &data()));
    }

    #[test]
    fn evaluates_conjunction_and_disjunction() {
        assert!(evaluate("severity == 'high' && score >= 7", &data()));
        assert!(evaluate("severity == 'low' || score >= 7", &data()));
        assert!(!evaluate("severity == 'low' && score >= 7", &data()));
    }

    #[test]
    fn missing_field_is_not_equal_not_error() {
        assert!(evaluate("missing_field != 'anything'", &data()));
        assert!(!evaluate("missing_field == 'anything'", &data()));
    }

    #[test]
    fn malformed_predicate_fails_closed() {
        assert!(!evaluate("severity ==", &data()));
        assert!(!evaluate("not a predicate at all &&&", &data()));
        assert!(parse("severity ==").is_err());
    }

    #[test]
    fn filter_map_conjunction_with_any_of() {
        let mut filter = std::collections::BTreeMap::new();
        filter.insert("severity".to_string(), Value::Array(vec!["high".into(), "critical".into()]));
        filter.insert("category".to_string(), Value::from("malware"));
        assert!(matches_filter(&filter, &data()));

        filter.insert("category".to_string(), Value::from("benign"));
        assert!(!matches_filter(&filter, &data()));
    }
}
