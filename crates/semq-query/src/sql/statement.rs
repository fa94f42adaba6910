//! The resolved relational statement and its SQL rendering.

use serde::Serialize;

use semq_description::SortDirection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl JoinKind {
    fn keyword(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

/// Where the rows of a join clause come from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSource {
    Table(String),
    /// Independent subqueries whose `id` columns are unioned.
    Union(Vec<Statement>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinClause {
    pub alias: String,
    pub source: TableSource,
    pub kind: JoinKind,
    /// `None` only for the first clause of a statement.
    pub join_condition: Option<String>,
    pub where_fragment: String,
}

impl JoinClause {
    #[must_use]
    pub fn table(alias: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            source: TableSource::Table(table.into()),
            kind: JoinKind::Inner,
            join_condition: None,
            where_fragment: String::new(),
        }
    }

    /// Conjoin a predicate to this clause's where fragment.
    pub fn and_where(&mut self, predicate: &str) {
        if predicate.is_empty() {
            return;
        }
        if self.where_fragment.is_empty() {
            self.where_fragment = predicate.to_string();
        } else {
            self.where_fragment = format!("{} AND {predicate}", self.where_fragment);
        }
    }

    fn source_sql(&self) -> String {
        match &self.source {
            TableSource::Table(name) => format!("{name} {}", self.alias),
            TableSource::Union(parts) => {
                let parts: Vec<String> = parts.iter().map(Statement::to_sql).collect();
                format!("({}) {}", parts.join(" UNION "), self.alias)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortField {
    pub label: String,
    pub column: String,
    pub direction: SortDirection,
}

/// An executable join plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// Column holding the result entity id.
    pub select_field: String,
    pub joins: Vec<JoinClause>,
    pub sort_fields: Vec<SortField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// The statement provably returns no rows.
    pub empty: bool,
}

impl Statement {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            select_field: String::new(),
            joins: Vec::new(),
            sort_fields: Vec::new(),
            limit: None,
            offset: None,
            empty: true,
        }
    }

    #[must_use]
    pub fn new(select_field: impl Into<String>, joins: Vec<JoinClause>) -> Self {
        Self {
            select_field: select_field.into(),
            joins,
            sort_fields: Vec::new(),
            limit: None,
            offset: None,
            empty: false,
        }
    }

    /// Render as SQLite SQL.
    #[must_use]
    pub fn to_sql(&self) -> String {
        let Some((first, rest)) = self.joins.split_first() else {
            return "SELECT NULL AS id WHERE 0".to_string();
        };
        if self.empty {
            return "SELECT NULL AS id WHERE 0".to_string();
        }

        // With sort columns a page can match once per sort value. Grouping
        // keeps one row per page so LIMIT and OFFSET count pages.
        let grouped = !self.sort_fields.is_empty();
        let mut sql = if grouped {
            format!("SELECT {} AS id", self.select_field)
        } else {
            format!("SELECT DISTINCT {} AS id", self.select_field)
        };
        for (i, field) in self.sort_fields.iter().enumerate() {
            sql.push_str(&format!(
                ", {}({}) AS sort{i}",
                aggregate(field.direction),
                field.column
            ));
        }
        sql.push_str(&format!(" FROM {}", first.source_sql()));

        let mut conditions: Vec<&str> = Vec::new();
        if !first.where_fragment.is_empty() {
            conditions.push(&first.where_fragment);
        }
        for clause in rest {
            sql.push_str(&format!(" {} {}", clause.kind.keyword(), clause.source_sql()));
            let mut on: Vec<&str> = Vec::new();
            if let Some(condition) = &clause.join_condition {
                on.push(condition);
            }
            match clause.kind {
                JoinKind::LeftOuter if !clause.where_fragment.is_empty() => {
                    on.push(&clause.where_fragment);
                }
                JoinKind::Inner if !clause.where_fragment.is_empty() => {
                    conditions.push(&clause.where_fragment);
                }
                _ => {}
            }
            if on.is_empty() {
                sql.push_str(" ON 1");
            } else {
                sql.push_str(&format!(" ON {}", on.join(" AND ")));
            }
        }

        if !conditions.is_empty() {
            let wrapped: Vec<String> = conditions.iter().map(|c| format!("({c})")).collect();
            sql.push_str(&format!(" WHERE {}", wrapped.join(" AND ")));
        }

        if grouped {
            sql.push_str(&format!(" GROUP BY {}", self.select_field));
            let order: Vec<String> = self
                .sort_fields
                .iter()
                .enumerate()
                .map(|(i, f)| format!("sort{i} {}", f.direction.keyword()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }

        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }
        sql
    }
}

/// The value a multi-valued page sorts by: its first value in the
/// requested direction.
fn aggregate(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "MIN",
        SortDirection::Desc => "MAX",
    }
}
