//! Filter expressions for the `filter[]` query parameter.
//!
//! ManageIQ accepts one expression per `filter[]` value. Consecutive
//! expressions are AND-ed; an expression starting with `or ` is OR-ed with
//! the previous one.
//!
//! # Examples
//!
//! ```
//! use manageiq_client::filters::Q;
//! use serde_json::json;
//!
//! let q = Q::eq("name", json!("web-01")).and(Q::new("id", ">", json!(10)));
//! assert_eq!(q.as_filters(), vec!["name='web-01'", "id>10"]);
//!
//! let q = Q::eq("power_state", json!("on")).or(Q::eq("power_state", json!("suspended")));
//! assert_eq!(q.as_filters(), vec!["power_state='on'", "or power_state='suspended'"]);
//! ```

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Joiner {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    joiner: Joiner,
    field: String,
    op: String,
    value: Value,
}

impl Condition {
    fn render(&self, first: bool) -> String {
        let expr = format!("{}{}{}", self.field, self.op, render_value(&self.value));
        if !first && self.joiner == Joiner::Or {
            format!("or {}", expr)
        } else {
            expr
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => quote(s),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Single-quote `s`; fall back to double quotes when it holds a single quote,
/// and backslash-escape the quote character if it holds both.
fn quote(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// A structured query that projects to filter expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Q {
    conditions: Vec<Condition>,
}

impl Q {
    /// `field <op> value`, e.g. `Q::new("id", ">", json!(3))`.
    pub fn new(field: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
        Self {
            conditions: vec![Condition {
                joiner: Joiner::And,
                field: field.into(),
                op: op.into(),
                value,
            }],
        }
    }

    /// Equality constraint.
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self::new(field, "=", value)
    }

    /// Conjunction of equality constraints, in iteration order.
    pub fn from_pairs<K, I>(pairs: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        pairs
            .into_iter()
            .fold(Q::default(), |q, (field, value)| q.and(Q::eq(field, value)))
    }

    /// Both `self` and `other`.
    pub fn and(mut self, other: Q) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// `self` or the first condition of `other`; the rest of `other` keeps its joiners.
    pub fn or(mut self, other: Q) -> Self {
        let mut rest = other.conditions.into_iter();
        if let Some(mut head) = rest.next() {
            head.joiner = Joiner::Or;
            self.conditions.push(head);
        }
        self.conditions.extend(rest);
        self
    }

    /// True when the query has no conditions.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// The ordered `filter[]` values.
    pub fn as_filters(&self) -> Vec<String> {
        self.conditions
            .iter()
            .enumerate()
            .map(|(i, c)| c.render(i == 0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_pairs_is_conjunctive() {
        let q = Q::from_pairs([("name", json!("x")), ("vendor", json!("vmware"))]);
        assert_eq!(q.as_filters(), vec!["name='x'", "vendor='vmware'"]);
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(Q::eq("retired", json!(true)).as_filters(), vec!["retired=true"]);
        assert_eq!(Q::eq("owner", Value::Null).as_filters(), vec!["owner=null"]);
        assert_eq!(Q::eq("id", json!(42)).as_filters(), vec!["id=42"]);
    }

    #[test]
    fn test_quotes_inside_strings() {
        assert_eq!(Q::eq("name", json!("O'Brien")).as_filters(), vec![r#"name="O'Brien""#]);
        assert_eq!(Q::eq("name", json!(r#"say "hi""#)).as_filters(), vec![r#"name='say "hi"'"#]);
        assert_eq!(
            Q::eq("name", json!(r#"it's "odd""#)).as_filters(),
            vec![r#"name='it\'s "odd"'"#]
        );
    }

    #[test]
    fn test_empty_query() {
        let q = Q::from_pairs(Vec::<(String, Value)>::new());
        assert!(q.is_empty());
        assert!(q.as_filters().is_empty());
    }
}
