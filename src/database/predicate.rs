//! Typed WHERE-clause composition.
//!
//! Column names are `&'static str` so only compiled-in identifiers can reach
//! the SQL text; every value is pushed as a bound parameter.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};

use super::models::Repository;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Repository> for SqlValue {
    fn from(value: Repository) -> Self {
        SqlValue::Text(value.as_str().to_string())
    }
}

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
    fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => " = ",
            CompareOp::Ne => " <> ",
            CompareOp::Lt => " < ",
            CompareOp::Le => " <= ",
            CompareOp::Gt => " > ",
            CompareOp::Ge => " >= ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    True,
    Compare {
        column: &'static str,
        op: CompareOp,
        value: SqlValue,
    },
    In {
        column: &'static str,
        values: Vec<SqlValue>,
    },
    IsNull(&'static str),
    NotNull(&'static str),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn compare(column: &'static str, op: CompareOp, value: impl Into<SqlValue>) -> Self {
        Predicate::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ge(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    pub fn lt(column: &'static str, value: impl Into<SqlValue>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn in_list<V: Into<SqlValue>>(
        column: &'static str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// `AND` of the given predicates with `True` operands dropped.
    pub fn all(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        let parts: Vec<Predicate> = predicates
            .into_iter()
            .filter(|p| *p != Predicate::True)
            .collect();
        match parts.len() {
            0 => Predicate::True,
            1 => parts.into_iter().next().unwrap_or(Predicate::True),
            _ => Predicate::And(parts),
        }
    }

    pub fn any(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(predicates.into_iter().collect())
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::all([self, other])
    }

    /// Restrict `column` to one repository; `None` means all repositories.
    pub fn repo(column: &'static str, repo: Option<Repository>) -> Self {
        match repo {
            Some(repo) => Predicate::eq(column, repo),
            None => Predicate::True,
        }
    }

    /// Half-open time window `[from, to)`; absent bounds are unbounded.
    pub fn window(
        column: &'static str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        Predicate::all([
            from.map(|f| Predicate::ge(column, f)).unwrap_or(Predicate::True),
            to.map(|t| Predicate::lt(column, t)).unwrap_or(Predicate::True),
        ])
    }

    /// Append ` WHERE <predicate>` to the builder.
    pub fn push_where(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE ");
        self.push_to(builder);
    }

    pub fn push_to(&self, builder: &mut QueryBuilder<'_, Sqlite>) {
        match self {
            Predicate::True => {
                builder.push("1 = 1");
            }
            Predicate::Compare { column, op, value } => {
                builder.push(*column).push(op.as_sql());
                push_value(builder, value);
            }
            Predicate::In { column, values } => {
                if values.is_empty() {
                    builder.push("0 = 1");
                    return;
                }
                builder.push(*column).push(" IN (");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        builder.push(", ");
                    }
                    push_value(builder, value);
                }
                builder.push(")");
            }
            Predicate::IsNull(column) => {
                builder.push(*column).push(" IS NULL");
            }
            Predicate::NotNull(column) => {
                builder.push(*column).push(" IS NOT NULL");
            }
            Predicate::And(parts) => push_group(builder, parts, " AND ", "1 = 1"),
            Predicate::Or(parts) => push_group(builder, parts, " OR ", "0 = 1"),
        }
    }
}

fn push_group(
    builder: &mut QueryBuilder<'_, Sqlite>,
    parts: &[Predicate],
    joiner: &str,
    empty: &str,
) {
    if parts.is_empty() {
        builder.push(empty);
        return;
    }
    builder.push("(");
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            builder.push(joiner);
        }
        part.push_to(builder);
    }
    builder.push(")");
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &SqlValue) {
    match value {
        SqlValue::Text(text) => builder.push_bind(text.clone()),
        SqlValue::Int(int) => builder.push_bind(*int),
        SqlValue::Timestamp(ts) => builder.push_bind(*ts),
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn render(predicate: &Predicate) -> String {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM t");
        predicate.push_where(&mut builder);
        builder.sql().to_string()
    }

    #[test]
    fn test_user_values_are_bound_not_inlined() {
        let hostile = "eips' OR '1'='1";
        let sql = render(&Predicate::eq("repo", hostile));
        assert_eq!(sql, "SELECT * FROM t WHERE repo = ?");
        assert!(!sql.contains(hostile));
    }

    #[test]
    fn test_nested_groups() {
        let predicate = Predicate::all([
            Predicate::repo("repo", Some(Repository::Ercs)),
            Predicate::any([
                Predicate::in_list("to_status", ["Final", "Living"]),
                Predicate::IsNull("from_status"),
            ]),
        ]);
        assert_eq!(
            render(&predicate),
            "SELECT * FROM t WHERE (repo = ? AND (to_status IN (?, ?) OR from_status IS NULL))"
        );
    }

    #[test]
    fn test_unbounded_window_collapses_to_true() {
        assert_eq!(Predicate::window("changed_at", None, None), Predicate::True);
        assert_eq!(Predicate::repo("repo", None), Predicate::True);

        let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let sql = render(&Predicate::window("changed_at", Some(from), None));
        assert_eq!(sql, "SELECT * FROM t WHERE changed_at >= ?");
    }

    #[test]
    fn test_empty_in_list_matches_nothing() {
        let values: Vec<i64> = Vec::new();
        assert_eq!(
            render(&Predicate::in_list("number", values)),
            "SELECT * FROM t WHERE 0 = 1"
        );
    }
}
