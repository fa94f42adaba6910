//! SQL encodings of data items and comparator predicates.

use semq_core::{julian_day, DataItem, EntityId, ValueType};
use semq_description::Comparator;

/// Entity table.
pub const ID_TABLE: &str = "smw_object_ids";
/// Category membership table.
pub const INST_TABLE: &str = "smw_fpt_inst";

/// Value table holding properties of the given type.
#[must_use]
pub fn value_table(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Page => "smw_di_wikipage",
        ValueType::Number => "smw_di_number",
        ValueType::Time => "smw_di_time",
        ValueType::Text => "smw_di_blob",
        ValueType::Boolean => "smw_di_bool",
    }
}

/// Column of a value table that literal comparisons and sorting use.
#[must_use]
pub fn value_column(value_type: ValueType) -> &'static str {
    match value_type {
        ValueType::Page => "o_id",
        ValueType::Number | ValueType::Time => "o_sortkey",
        ValueType::Text => "o_blob",
        ValueType::Boolean => "o_value",
    }
}

/// Quote a string as an SQL literal.
#[must_use]
pub fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

/// Translate a `*`/`?` wildcard pattern into a LIKE pattern escaped with
/// `\`.
#[must_use]
pub fn like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' => out.push('%'),
            '?' => out.push('_'),
            other => out.push(other),
        }
    }
    out
}

/// SQL literal for a non-page datum.
#[must_use]
pub fn encode(datum: &DataItem) -> String {
    match datum {
        DataItem::Number(n) => n.to_string(),
        DataItem::Time(t) => julian_day(t).to_string(),
        DataItem::Text(s) => quote(s),
        DataItem::Boolean(b) => u8::from(*b).to_string(),
        DataItem::Page(page) => quote(&page.sort_key()),
    }
}

/// `column <op> value`, with LIKE patterns translated.
#[must_use]
pub fn comparison(column: &str, comparator: Comparator, datum: &DataItem) -> String {
    match comparator {
        Comparator::Like | Comparator::NotLike => {
            let text = match datum {
                DataItem::Text(s) => s.clone(),
                DataItem::Page(page) => page.sort_key(),
                other => other.to_string(),
            };
            format!(
                "{column} {comparator} {} ESCAPE '\\'",
                quote(&like_pattern(&text))
            )
        }
        _ => format!("{column} {comparator} {}", encode(datum)),
    }
}

/// `column = id` or `column IN (...)`, negated on request.
#[must_use]
pub fn id_predicate(column: &str, ids: &[EntityId], negated: bool) -> String {
    match (ids, negated) {
        ([id], false) => format!("{column} = {id}"),
        ([id], true) => format!("{column} != {id}"),
        _ => {
            let list: Vec<String> = ids.iter().map(EntityId::to_string).collect();
            let op = if negated { "NOT IN" } else { "IN" };
            format!("{column} {op} ({})", list.join(", "))
        }
    }
}
