//! Runs relational plans against the SQLite store.
//!
//! Takes a [`CompiledQuery`] and an [`IndexManager`], executes the
//! statement and fills in the requested print columns.

use std::collections::HashMap;

use semq_core::{DataItem, EntityId, Result, SemqError};
use semq_description::{PrintKind, PrintRequest};
use semq_index::IndexManager;

use crate::compiler::{CompiledQuery, Plan};
use crate::formatter::{QueryResult, ResultRow};

/// Execute a compiled relational plan against the index.
///
/// Each result page yields one row with a `page` column plus one column
/// per print request.
///
/// # Errors
///
/// Returns [`SemqError::Config`] for graph plans, which the store cannot
/// run, and [`SemqError::Index`] if the statement fails.
pub fn execute(index: &IndexManager, compiled: &CompiledQuery) -> Result<QueryResult> {
    let Plan::Sql(plan) = &compiled.plan else {
        return Err(SemqError::Config(
            "graph plans cannot be executed against the SQLite store".to_string(),
        ));
    };

    let sql = plan.to_sql();
    tracing::debug!(%sql, "executing statement");

    let ids = index.query_ids(&sql)?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(page) = index.page_for(id)? else {
            tracing::debug!(%id, "statement returned an id with no page");
            continue;
        };
        let mut fields = HashMap::new();
        let title = page.prefixed_text();
        for request in &compiled.print_requests {
            fields.insert(request.label.clone(), print_value(index, id, &title, request)?);
        }
        fields.insert("page".to_string(), serde_json::Value::String(title));
        rows.push(ResultRow { fields });
    }

    let total = rows.len();
    Ok(QueryResult { rows, total })
}

fn print_value(
    index: &IndexManager,
    id: EntityId,
    page: &str,
    request: &PrintRequest,
) -> Result<serde_json::Value> {
    let values: Vec<serde_json::Value> = match &request.kind {
        PrintKind::ThisPage => return Ok(serde_json::Value::String(page.to_string())),
        PrintKind::Categories => index
            .categories_of(id)?
            .iter()
            .map(|c| serde_json::Value::String(c.text()))
            .collect(),
        PrintKind::Property(property) => index
            .property_values(id, property)?
            .iter()
            .map(data_value)
            .collect(),
    };
    Ok(serde_json::Value::Array(values))
}

fn data_value(item: &DataItem) -> serde_json::Value {
    match item {
        DataItem::Number(n) => serde_json::json!(n),
        DataItem::Boolean(b) => serde_json::Value::Bool(*b),
        DataItem::Page(page) => serde_json::Value::String(page.prefixed_text()),
        other => serde_json::Value::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{compile, Backend};
    use crate::context::Collaborators;
    use semq_core::{CompilerConfig, DataItem, DiagnosticReason, HierarchyKind, ValueType, WikiPage};
    use proptest::prelude::*;
    use semq_description::{Comparator, Description, Query, SortDirection, SortKey};

    fn city(index: &IndexManager, name: &str, category: &str, population: f64, country: &str) {
        let page = WikiPage::page(name);
        index
            .add_category(&page, &WikiPage::category(category))
            .unwrap();
        index
            .add_value(
                &page,
                &WikiPage::property("Population"),
                &DataItem::Number(population),
            )
            .unwrap();
        index
            .add_value(
                &page,
                &WikiPage::property("Located in"),
                &DataItem::Page(WikiPage::page(country)),
            )
            .unwrap();
    }

    fn setup_index() -> IndexManager {
        let index = IndexManager::in_memory().unwrap();
        index
            .set_property_type(&WikiPage::property("Population"), ValueType::Number)
            .unwrap();
        index
            .set_property_type(&WikiPage::property("Located in"), ValueType::Page)
            .unwrap();
        index
            .add_subordinate(
                &WikiPage::category("Capital"),
                &WikiPage::category("City"),
                HierarchyKind::Class,
            )
            .unwrap();
        city(&index, "Berlin", "Capital", 3_600_000.0, "Germany");
        city(&index, "Hamburg", "City", 1_800_000.0, "Germany");
        city(&index, "Bonn", "City", 330_000.0, "Germany");
        city(&index, "Paris", "Capital", 2_100_000.0, "France");
        index
    }

    fn run(index: &IndexManager, query: &Query) -> (Vec<String>, CompiledQuery) {
        let compiled = compile(
            query,
            Backend::Sql,
            Collaborators::from_store(index),
            &CompilerConfig::default(),
        )
        .unwrap();
        let result = execute(index, &compiled).unwrap();
        let pages = result
            .rows
            .iter()
            .filter_map(|r| r.fields.get("page").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect();
        (pages, compiled)
    }

    fn sorted(mut pages: Vec<String>) -> Vec<String> {
        pages.sort();
        pages
    }

    fn large_cities() -> Description {
        Description::conjunction([
            Description::class(WikiPage::category("City")),
            Description::value(
                WikiPage::property("Population"),
                Comparator::Geq,
                DataItem::Number(1_000_000.0),
            ),
        ])
    }

    #[test]
    fn large_cities_include_subcategory_members() {
        let index = setup_index();
        let (pages, compiled) = run(&index, &Query::new(large_cities()));
        assert!(!compiled.is_degraded());
        assert_eq!(sorted(pages), vec!["Berlin", "Hamburg", "Paris"]);
    }

    #[test]
    fn sorting_and_limit_apply() {
        let index = setup_index();
        let query = Query::new(large_cities())
            .sorted_by(SortKey::property(
                WikiPage::property("Population"),
                SortDirection::Desc,
            ))
            .with_limit(2);
        let (pages, _) = run(&index, &query);
        assert_eq!(pages, vec!["Berlin", "Paris"]);
    }

    fn founded(index: &IndexManager) {
        use chrono::{TimeZone, Utc};
        let founded = WikiPage::property("Founded");
        index.set_property_type(&founded, ValueType::Time).unwrap();
        for (name, year) in [("Berlin", 1237), ("Hamburg", 1189), ("Bonn", 1949)] {
            let time = Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap();
            index
                .add_value(&WikiPage::page(name), &founded, &DataItem::Time(time))
                .unwrap();
        }
    }

    fn founded_compared(comparator: Comparator) -> Description {
        use chrono::{TimeZone, Utc};
        Description::conjunction([
            Description::class(WikiPage::category("City")),
            Description::value(
                WikiPage::property("Founded"),
                comparator,
                DataItem::Time(Utc.with_ymd_and_hms(1200, 1, 1, 0, 0, 0).unwrap()),
            ),
        ])
    }

    #[test]
    fn time_comparisons_use_julian_days() {
        let index = setup_index();
        founded(&index);

        let (pages, compiled) = run(&index, &Query::new(founded_compared(Comparator::Less)));
        assert!(compiled.plan.render().contains("o_sortkey < 21"));
        assert_eq!(pages, vec!["Hamburg"]);

        let (pages, _) = run(&index, &Query::new(founded_compared(Comparator::Greater)));
        assert_eq!(sorted(pages), vec!["Berlin", "Bonn"]);
    }

    #[test]
    fn sorting_by_time_follows_the_calendar() {
        let index = setup_index();
        founded(&index);
        let query = Query::new(Description::some_property(
            WikiPage::property("Founded"),
            Description::Thing,
        ))
        .sorted_by(SortKey::property(
            WikiPage::property("Founded"),
            SortDirection::Asc,
        ));
        let (pages, _) = run(&index, &query);
        assert_eq!(pages, vec!["Hamburg", "Berlin", "Bonn"]);
    }

    #[test]
    fn boolean_values_compare_as_zero_or_one() {
        let index = setup_index();
        let coastal = WikiPage::property("Coastal");
        index.set_property_type(&coastal, ValueType::Boolean).unwrap();
        for (name, value) in [("Berlin", false), ("Hamburg", true), ("Bonn", false)] {
            index
                .add_value(&WikiPage::page(name), &coastal, &DataItem::Boolean(value))
                .unwrap();
        }
        let is_coastal = |value: bool| {
            Query::new(Description::conjunction([
                Description::class(WikiPage::category("City")),
                Description::value(coastal.clone(), Comparator::Eq, DataItem::Boolean(value)),
            ]))
        };

        let (pages, compiled) = run(&index, &is_coastal(true));
        assert!(compiled.plan.render().contains("o_value = 1"));
        assert_eq!(pages, vec!["Hamburg"]);

        let (pages, compiled) = run(&index, &is_coastal(false));
        assert!(compiled.plan.render().contains("o_value = 0"));
        assert_eq!(sorted(pages), vec!["Berlin", "Bonn"]);
    }

    #[test]
    fn paging_counts_pages_not_sort_values() {
        let index = setup_index();
        index
            .add_value(
                &WikiPage::page("Berlin"),
                &WikiPage::property("Population"),
                &DataItem::Number(3_500_000.0),
            )
            .unwrap();
        let by_population = || {
            Query::new(large_cities()).sorted_by(SortKey::property(
                WikiPage::property("Population"),
                SortDirection::Desc,
            ))
        };

        let (first, _) = run(&index, &by_population().with_limit(2));
        assert_eq!(first, vec!["Berlin", "Paris"]);

        let mut second_page = by_population().with_limit(2);
        second_page.offset = Some(1);
        let (second, _) = run(&index, &second_page);
        assert_eq!(second, vec!["Paris", "Hamburg"]);
    }

    #[test]
    fn sorting_by_page_name() {
        let index = setup_index();
        let query = Query::new(Description::class(WikiPage::category("City")))
            .sorted_by(SortKey::page(SortDirection::Asc));
        let (pages, _) = run(&index, &query);
        assert_eq!(pages, vec!["Berlin", "Bonn", "Hamburg", "Paris"]);
    }

    #[test]
    fn disjunction_is_union_of_its_branches() {
        let index = setup_index();
        let a = Description::value(
            WikiPage::property("Located in"),
            Comparator::Eq,
            DataItem::Page(WikiPage::page("France")),
        );
        let b = Description::value(
            WikiPage::property("Population"),
            Comparator::Less,
            DataItem::Number(1_000_000.0),
        );
        let (only_a, _) = run(&index, &Query::new(a.clone()));
        let (only_b, _) = run(&index, &Query::new(b.clone()));
        let (either, _) = run(&index, &Query::new(Description::disjunction([a, b])));

        let mut union = only_a;
        union.extend(only_b);
        union.sort();
        union.dedup();
        assert_eq!(sorted(either), union);
        assert_eq!(union, vec!["Bonn", "Paris"]);
    }

    #[test]
    fn disjunction_inside_conjunction_keeps_branch_scopes() {
        let index = setup_index();
        let q = Description::conjunction([
            Description::class(WikiPage::category("City")),
            Description::disjunction([
                Description::value(
                    WikiPage::property("Population"),
                    Comparator::Greater,
                    DataItem::Number(3_000_000.0),
                ),
                Description::value(
                    WikiPage::property("Population"),
                    Comparator::Less,
                    DataItem::Number(500_000.0),
                ),
            ]),
        ]);
        let (pages, _) = run(&index, &Query::new(q));
        assert_eq!(sorted(pages), vec!["Berlin", "Bonn"]);
    }

    #[test]
    fn nested_page_property() {
        let index = setup_index();
        index
            .add_category(&WikiPage::page("Germany"), &WikiPage::category("Country"))
            .unwrap();
        let q = Description::some_property(
            WikiPage::property("Located in"),
            Description::class(WikiPage::category("Country")),
        );
        let (pages, _) = run(&index, &Query::new(q));
        assert_eq!(sorted(pages), vec!["Berlin", "Bonn", "Hamburg"]);
    }

    #[test]
    fn negated_page_value() {
        let index = setup_index();
        let q = Description::conjunction([
            Description::class(WikiPage::category("Capital")),
            Description::page_value(Comparator::Neq, DataItem::Page(WikiPage::page("Berlin"))),
        ]);
        let (pages, _) = run(&index, &Query::new(q));
        assert_eq!(pages, vec!["Paris"]);
    }

    #[test]
    fn concept_cycle_still_executes() {
        let index = setup_index();
        let concept = WikiPage::concept("Capitals");
        index
            .store_concept(
                &concept,
                &Description::conjunction([
                    Description::class(WikiPage::category("Capital")),
                    Description::concept(concept.clone()),
                ]),
            )
            .unwrap();
        let (pages, compiled) = run(&index, &Query::new(Description::concept(concept)));
        assert_eq!(
            compiled
                .diagnostics
                .iter()
                .filter(|d| d.reason == DiagnosticReason::CycleDetected)
                .count(),
            1
        );
        assert_eq!(sorted(pages), vec!["Berlin", "Paris"]);
    }

    #[test]
    fn print_requests_fill_columns() {
        let index = setup_index();
        let q = Description::page_value(Comparator::Eq, DataItem::Page(WikiPage::page("Berlin")))
            .with_print_request(PrintRequest::property(WikiPage::property("Population")))
            .with_print_request(PrintRequest::categories());
        let compiled = compile(
            &Query::new(q),
            Backend::Sql,
            Collaborators::from_store(&index),
            &CompilerConfig::default(),
        )
        .unwrap();
        let result = execute(&index, &compiled).unwrap();
        assert_eq!(result.total, 1);
        let row = &result.rows[0];
        assert_eq!(row.fields["Population"], serde_json::json!([3_600_000.0]));
        assert_eq!(row.fields["Categories"], serde_json::json!(["Capital"]));
    }

    #[test]
    fn nothing_returns_no_rows() {
        let index = setup_index();
        let (pages, _) = run(&index, &Query::new(Description::class(WikiPage::category("Village"))));
        assert!(pages.is_empty());
    }

    #[test]
    fn graph_plans_are_rejected() {
        let index = setup_index();
        let compiled = compile(
            &Query::new(large_cities()),
            Backend::Sparql,
            Collaborators::from_store(&index),
            &CompilerConfig::default(),
        )
        .unwrap();
        assert!(matches!(
            execute(&index, &compiled),
            Err(SemqError::Config(_))
        ));
    }

    fn comparator() -> impl Strategy<Value = Comparator> {
        prop_oneof![
            Just(Comparator::Eq),
            Just(Comparator::Neq),
            Just(Comparator::Less),
            Just(Comparator::Greater),
            Just(Comparator::Leq),
            Just(Comparator::Geq),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn disjunction_matches_union_for_any_thresholds(
            a in 0u32..4_000_000,
            ca in comparator(),
            b in 0u32..4_000_000,
            cb in comparator(),
        ) {
            let index = setup_index();
            let population = |c: Comparator, n: u32| {
                Description::value(
                    WikiPage::property("Population"),
                    c,
                    DataItem::Number(f64::from(n)),
                )
            };
            let (only_a, _) = run(&index, &Query::new(population(ca, a)));
            let (only_b, _) = run(&index, &Query::new(population(cb, b)));
            let (either, _) = run(
                &index,
                &Query::new(Description::disjunction([population(ca, a), population(cb, b)])),
            );
            let mut union = only_a;
            union.extend(only_b);
            union.sort();
            union.dedup();
            prop_assert_eq!(sorted(either), union);
        }
    }
}
