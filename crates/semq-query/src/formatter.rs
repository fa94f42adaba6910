//! Output formatting for results, plans and plan explanations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

use crate::compiler::{CompiledQuery, Plan};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
    Markdown,
}

/// A single row in a query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultRow {
    pub fields: HashMap<String, serde_json::Value>,
}

/// A complete query result set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<ResultRow>,
    pub total: usize,
}

/// Format query results in the specified output format.
#[must_use]
pub fn format_results(result: &QueryResult, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(result),
        OutputFormat::Table => format_table(result),
        OutputFormat::Markdown => format_markdown(result),
    }
}

fn format_json(result: &QueryResult) -> String {
    serde_json::to_string_pretty(result).unwrap_or_else(|_| "[]".to_string())
}

fn format_table(result: &QueryResult) -> String {
    Grid::of(result).map_or_else(|| "(no results)".to_string(), |grid| grid.to_text())
}

fn format_markdown(result: &QueryResult) -> String {
    Grid::of(result).map_or_else(|| "*No results*\n".to_string(), |grid| grid.to_markdown())
}

/// Result rows flattened to display strings. The `page` column comes
/// first and the print request columns follow by name.
struct Grid {
    header: Vec<String>,
    cells: Vec<Vec<String>>,
}

impl Grid {
    fn of(result: &QueryResult) -> Option<Self> {
        let first = result.rows.first()?;
        let mut header: Vec<String> = first.fields.keys().cloned().collect();
        header.sort_by(|a, b| (a != "page", a).cmp(&(b != "page", b)));
        let cells = result
            .rows
            .iter()
            .map(|row| header.iter().map(|column| cell(row.fields.get(column))).collect())
            .collect();
        Some(Self { header, cells })
    }

    fn widths(&self) -> Vec<usize> {
        self.header
            .iter()
            .enumerate()
            .map(|(i, name)| {
                self.cells
                    .iter()
                    .map(|row| row[i].chars().count())
                    .fold(name.chars().count(), usize::max)
            })
            .collect()
    }

    /// Columns padded to their widest cell and separated by ` | `.
    fn to_text(&self) -> String {
        let widths = self.widths();
        let line = |values: &[String]| {
            let padded: Vec<String> = values
                .iter()
                .zip(&widths)
                .map(|(value, &width)| format!("{value:width$}"))
                .collect();
            format!("{}\n", padded.join(" | ").trim_end())
        };
        let rule: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();

        let mut output = line(self.header.as_slice());
        let _ = writeln!(output, "{}", rule.join("-+-"));
        for row in &self.cells {
            output.push_str(&line(row.as_slice()));
        }
        output
    }

    fn to_markdown(&self) -> String {
        let line = |values: &[String]| format!("| {} |\n", values.join(" | "));
        let rule = vec!["---".to_string(); self.header.len()];

        let mut output = line(self.header.as_slice());
        output.push_str(&line(rule.as_slice()));
        for row in &self.cells {
            output.push_str(&line(row.as_slice()));
        }
        output
    }
}

/// Display text of a field. Missing fields and nulls show as `null`;
/// multiple values are joined with commas.
fn cell(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => "null".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|item| cell(Some(item)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => other.to_string(),
    }
}

/// Format a compiled plan: the query text for its backend, followed by
/// any diagnostics.
#[must_use]
pub fn format_plan(compiled: &CompiledQuery, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(compiled).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Table => {
            let mut output = compiled.plan.render();
            output.push('\n');
            for diagnostic in &compiled.diagnostics {
                let _ = writeln!(output, "-- {diagnostic}");
            }
            output
        }
        OutputFormat::Markdown => {
            let language = match compiled.plan {
                Plan::Sql(_) => "sql",
                Plan::Sparql(_) => "sparql",
            };
            let mut output = format!("```{language}\n{}\n```\n", compiled.plan.render());
            if !compiled.diagnostics.is_empty() {
                output.push_str("\n**Diagnostics**\n\n");
                for diagnostic in &compiled.diagnostics {
                    let _ = writeln!(output, "- {diagnostic}");
                }
            }
            output
        }
    }
}

/// Describe how a plan was assembled: the segment list of a relational
/// plan, or the parts of a graph condition.
#[must_use]
pub fn format_explain(compiled: &CompiledQuery, format: OutputFormat) -> String {
    let result = explain_rows(compiled);
    let mut output = format_results(&result, format);
    if format != OutputFormat::Json {
        let _ = write!(output, "\nfingerprint: {}", compiled.fingerprint);
        if compiled.is_degraded() {
            let _ = write!(output, "\ndiagnostics: {}", compiled.diagnostics.len());
        }
        output.push('\n');
    }
    output
}

fn explain_rows(compiled: &CompiledQuery) -> QueryResult {
    let mut rows = Vec::new();
    match &compiled.plan {
        Plan::Sql(plan) => {
            for segment in &plan.segments {
                let mut fields = HashMap::new();
                fields.insert("alias".to_string(), serde_json::json!(segment.alias));
                fields.insert(
                    "kind".to_string(),
                    serde_json::to_value(segment.kind).unwrap_or(serde_json::Value::Null),
                );
                fields.insert(
                    "table".to_string(),
                    segment
                        .join_table
                        .as_ref()
                        .map_or(serde_json::Value::Null, |t| serde_json::json!(t)),
                );
                fields.insert("where".to_string(), serde_json::json!(segment.where_fragment));
                let children: Vec<String> = segment
                    .components
                    .iter()
                    .map(|c| format!("t{}", c.segment))
                    .collect();
                fields.insert("children".to_string(), serde_json::json!(children.join(" ")));
                rows.push(ResultRow { fields });
            }
        }
        Plan::Sparql(query) => {
            let condition = &query.condition;
            let mut push = |part: &str, text: &str| {
                let mut fields = HashMap::new();
                fields.insert("part".to_string(), serde_json::json!(part));
                fields.insert("text".to_string(), serde_json::json!(text));
                rows.push(ResultRow { fields });
            };
            push("kind", &format!("{:?}", condition.kind));
            push("safe", &condition.is_safe.to_string());
            for pattern in &condition.cogent {
                push("cogent", pattern);
            }
            for filter in &condition.filters {
                push("filter", filter);
            }
            for pattern in condition.weak.values() {
                push("weak", pattern);
            }
        }
    }
    let total = rows.len();
    QueryResult { rows, total }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparql::condition::Condition;
    use crate::sparql::GraphQuery;
    use semq_core::{Diagnostic, DiagnosticReason};

    fn sample_result() -> QueryResult {
        let mut row1 = HashMap::new();
        row1.insert("page".to_string(), serde_json::json!("Berlin"));
        row1.insert("Population".to_string(), serde_json::json!(["3600000"]));
        row1.insert("Located in".to_string(), serde_json::json!(["Germany"]));

        let mut row2 = HashMap::new();
        row2.insert("page".to_string(), serde_json::json!("Hamburg"));
        row2.insert("Population".to_string(), serde_json::json!(["1800000"]));
        row2.insert("Located in".to_string(), serde_json::json!([]));

        QueryResult {
            rows: vec![ResultRow { fields: row1 }, ResultRow { fields: row2 }],
            total: 2,
        }
    }

    fn sample_plan() -> CompiledQuery {
        CompiledQuery {
            plan: Plan::Sparql(GraphQuery {
                condition: Condition::pattern("?result rdf:type wiki:Category-3ACity .", &["?result"]),
                order: Vec::new(),
                limit: None,
                offset: None,
            }),
            diagnostics: vec![Diagnostic::truncated("[[Category:Port]]", "query truncated: too large")],
            fingerprint: "abc".to_string(),
            print_requests: Vec::new(),
        }
    }

    #[test]
    fn format_as_json() {
        let result = sample_result();
        let output = format_results(&result, OutputFormat::Json);
        assert!(output.contains("Berlin"));
        assert!(output.contains("Hamburg"));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["total"], 2);
    }

    #[test]
    fn format_as_table_puts_page_first() {
        let result = sample_result();
        let output = format_results(&result, OutputFormat::Table);
        let header = output.lines().next().unwrap();
        assert!(header.starts_with("page"));
        assert!(header.contains("Located in"));
        assert!(output.contains("3600000"));
        assert!(output.contains("---"));
    }

    #[test]
    fn format_as_markdown() {
        let result = sample_result();
        let output = format_results(&result, OutputFormat::Markdown);
        assert!(output.starts_with("| page |"));
        assert!(output.contains("| ---"));
        assert!(output.contains("Berlin"));
    }

    #[test]
    fn table_pads_columns_to_widest_cell() {
        let output = format_results(&sample_result(), OutputFormat::Table);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "page    | Located in | Population");
        assert_eq!(lines[1], "--------+------------+-----------");
        assert_eq!(lines[2], "Berlin  | Germany    | 3600000");
        assert_eq!(lines[3], "Hamburg |            | 1800000");
    }

    #[test]
    fn format_empty_result() {
        let result = QueryResult {
            rows: vec![],
            total: 0,
        };
        assert_eq!(format_results(&result, OutputFormat::Table), "(no results)");
        assert_eq!(
            format_results(&result, OutputFormat::Markdown),
            "*No results*\n"
        );
    }

    #[test]
    fn plan_lists_diagnostics_after_query() {
        let output = format_plan(&sample_plan(), OutputFormat::Table);
        assert!(output.starts_with("PREFIX") || output.starts_with("SELECT"));
        assert!(output.contains("-- truncated: [[Category:Port]]"));

        let markdown = format_plan(&sample_plan(), OutputFormat::Markdown);
        assert!(markdown.starts_with("```sparql\n"));
        assert!(markdown.contains("**Diagnostics**"));
    }

    #[test]
    fn plan_json_carries_backend_tag() {
        let output = format_plan(&sample_plan(), OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["plan"]["backend"], "sparql");
        assert_eq!(
            parsed["diagnostics"][0]["reason"],
            serde_json::to_value(DiagnosticReason::Truncated).unwrap()
        );
    }

    #[test]
    fn explain_graph_condition() {
        let output = format_explain(&sample_plan(), OutputFormat::Table);
        assert!(output.contains("cogent"));
        assert!(output.contains("Category-3ACity"));
        assert!(output.contains("fingerprint: abc"));
        assert!(output.contains("diagnostics: 1"));
    }
}
