use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::types::Value;

use crate::error::StoreError;
use crate::schema::is_filter_column;

static FILTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*(!=|<=|>=|=|<|>)\s*(.*?)\s*$")
        .expect("valid filter regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn from_sql(op: &str) -> Option<Self> {
        Some(match op {
            "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }
}

/// One `column <op> value` predicate over a whitelisted scalar column.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    column: &'static str,
    op: CompareOp,
    value: Value,
}

impl Filter {
    pub fn new(column: &str, op: CompareOp, value: impl Into<Value>) -> Result<Self, StoreError> {
        let column = crate::schema::FILTER_COLUMNS
            .iter()
            .copied()
            .find(|c| *c == column)
            .ok_or_else(|| StoreError::InvalidData(format!("cannot filter on {column:?}")))?;
        Ok(Filter {
            column,
            op,
            value: value.into(),
        })
    }

    pub fn column(&self) -> &str {
        self.column
    }

    pub fn op(&self) -> CompareOp {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// SQL fragment with a single numbered placeholder.
    pub(crate) fn clause(&self, placeholder: usize) -> String {
        debug_assert!(is_filter_column(self.column));
        format!("{} {} ?{placeholder}", self.column, self.op.sql())
    }
}

/// Integers first, then reals, otherwise text with optional quotes removed.
fn parse_value(raw: &str) -> Value {
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Real(f);
    }
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(raw);
    Value::Text(unquoted.to_string())
}

impl FromStr for Filter {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = FILTER_RE
            .captures(s)
            .ok_or_else(|| StoreError::InvalidData(format!("not a filter: {s:?}")))?;
        let op = CompareOp::from_sql(&caps[2])
            .ok_or_else(|| StoreError::InvalidData(format!("bad operator in {s:?}")))?;
        Filter::new(&caps[1], op, parse_value(&caps[3]))
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.column, self.op.sql())?;
        match &self.value {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(t) => write!(f, "{t}"),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_regex_compiles() {
        let re = LazyLock::force(&FILTER_RE);
        assert!(re.is_match("id>=1"));
        assert!(!re.is_match("no operator here"));
    }

    #[test]
    fn test_parse_operators() {
        let cases = [
            ("polarization_angle=0", CompareOp::Eq),
            ("polarization_angle != 0", CompareOp::Ne),
            ("polarization_angle<0", CompareOp::Lt),
            ("polarization_angle<=0", CompareOp::Le),
            ("polarization_angle>0", CompareOp::Gt),
            ("polarization_angle>=0", CompareOp::Ge),
        ];
        for (text, op) in cases {
            let filter: Filter = text.parse().unwrap();
            assert_eq!(filter.op(), op, "{text}");
            assert_eq!(filter.column(), "polarization_angle");
        }
    }

    #[test]
    fn test_parse_values() {
        let f: Filter = "frequency_points=1000".parse().unwrap();
        assert_eq!(f.value(), &Value::Integer(1000));
        let f: Filter = "structure_1_x_span>=99.5".parse().unwrap();
        assert_eq!(f.value(), &Value::Real(99.5));
        let f: Filter = "structure_1_material='Au (Gold) - Palik'".parse().unwrap();
        assert_eq!(f.value(), &Value::Text("Au (Gold) - Palik".into()));
    }

    #[test]
    fn test_unknown_column_rejected() {
        assert!("lambdas=1".parse::<Filter>().is_err());
        assert!("nonsense".parse::<Filter>().is_err());
        assert!(Filter::new("id; DROP TABLE x", CompareOp::Eq, 1).is_err());
    }

    #[test]
    fn test_clause() {
        let f = Filter::new("id", CompareOp::Gt, 3).unwrap();
        assert_eq!(f.clause(2), "id > ?2");
        assert_eq!(f.to_string(), "id>3");
    }
}
