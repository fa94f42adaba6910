//! Data items: the typed values a query can compare against.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Namespace of ordinary content pages.
pub const NS_MAIN: i32 = 0;
/// Namespace of category pages.
pub const NS_CATEGORY: i32 = 14;
/// Namespace of property pages.
pub const NS_PROPERTY: i32 = 102;
/// Namespace of concept pages.
pub const NS_CONCEPT: i32 = 108;

/// Julian day number of the Unix epoch.
const UNIX_EPOCH_JULIAN_DAY: f64 = 2_440_587.5;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// A page identity: namespace plus title.
///
/// Categories, properties and concepts are pages too; they differ only by
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawWikiPage")]
pub struct WikiPage {
    pub namespace: i32,
    pub title: String,
}

#[derive(Deserialize)]
struct RawWikiPage {
    #[serde(default)]
    namespace: i32,
    title: String,
}

impl From<RawWikiPage> for WikiPage {
    fn from(raw: RawWikiPage) -> Self {
        Self::new(raw.namespace, raw.title)
    }
}

impl WikiPage {
    #[must_use]
    pub fn new(namespace: i32, title: impl Into<String>) -> Self {
        Self {
            namespace,
            title: title.into().replace(' ', "_"),
        }
    }

    #[must_use]
    pub fn page(title: impl Into<String>) -> Self {
        Self::new(NS_MAIN, title)
    }

    #[must_use]
    pub fn category(title: impl Into<String>) -> Self {
        Self::new(NS_CATEGORY, title)
    }

    #[must_use]
    pub fn property(title: impl Into<String>) -> Self {
        Self::new(NS_PROPERTY, title)
    }

    #[must_use]
    pub fn concept(title: impl Into<String>) -> Self {
        Self::new(NS_CONCEPT, title)
    }

    /// Title as displayed (underscores shown as spaces).
    #[must_use]
    pub fn text(&self) -> String {
        self.title.replace('_', " ")
    }

    /// Key used to order pages.
    #[must_use]
    pub fn sort_key(&self) -> String {
        self.text()
    }

    /// Title with its namespace prefix, e.g. `Category:City`.
    #[must_use]
    pub fn prefixed_text(&self) -> String {
        match namespace_name(self.namespace) {
            Some("") => self.text(),
            Some(name) => format!("{name}:{}", self.text()),
            None => format!("{}:{}", self.namespace, self.text()),
        }
    }
}

impl fmt::Display for WikiPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.prefixed_text())
    }
}

/// Canonical name of a well-known namespace.
#[must_use]
pub fn namespace_name(namespace: i32) -> Option<&'static str> {
    match namespace {
        NS_MAIN => Some(""),
        NS_CATEGORY => Some("Category"),
        NS_PROPERTY => Some("Property"),
        NS_CONCEPT => Some("Concept"),
        _ => None,
    }
}

/// Namespace name for display, falling back to the number.
#[must_use]
pub fn namespace_name_or_number(namespace: i32) -> String {
    namespace_name(namespace).map_or_else(|| namespace.to_string(), str::to_string)
}

/// Store-assigned identity of a page. Valid ids are positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub i64);

impl EntityId {
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The datatype of a property's values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    Text,
    Boolean,
    Time,
    #[default]
    Page,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Boolean => "boolean",
            Self::Time => "time",
            Self::Page => "page",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "text" | "string" => Ok(Self::Text),
            "boolean" => Ok(Self::Boolean),
            "time" | "date" => Ok(Self::Time),
            "page" => Ok(Self::Page),
            other => Err(format!("unknown value type '{other}'")),
        }
    }
}

/// A single typed datum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum DataItem {
    Number(f64),
    Text(String),
    Boolean(bool),
    Time(DateTime<Utc>),
    Page(WikiPage),
}

impl DataItem {
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Text(_) => ValueType::Text,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Time(_) => ValueType::Time,
            Self::Page(_) => ValueType::Page,
        }
    }

    #[must_use]
    pub fn as_page(&self) -> Option<&WikiPage> {
        match self {
            Self::Page(page) => Some(page),
            _ => None,
        }
    }
}

impl fmt::Display for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Self::Page(p) => write!(f, "{p}"),
        }
    }
}

/// Convert a point in time to its (fractional) Julian day number.
#[must_use]
pub fn julian_day(time: &DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / MILLIS_PER_DAY + UNIX_EPOCH_JULIAN_DAY
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn julian_day_of_j2000_epoch() {
        let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((julian_day(&j2000) - 2_451_545.0).abs() < f64::EPSILON);
    }

    #[test]
    fn page_titles_normalize_spaces() {
        let page = WikiPage::page("New York");
        assert_eq!(page.title, "New_York");
        assert_eq!(page.sort_key(), "New York");
        assert_eq!(WikiPage::category("Big city").to_string(), "Category:Big city");
        assert_eq!(WikiPage::new(3000, "X").to_string(), "3000:X");

        let parsed: WikiPage = serde_json::from_str(r#"{"title":"New York"}"#).unwrap();
        assert_eq!(parsed, page);
    }

    #[test]
    fn data_item_json_shape() {
        let item = DataItem::Number(5.0);
        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(json, r#"{"type":"number","value":5.0}"#);
        let back: DataItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, item);
    }

    #[test]
    fn value_type_from_str() {
        assert_eq!("Number".parse::<ValueType>(), Ok(ValueType::Number));
        assert_eq!("string".parse::<ValueType>(), Ok(ValueType::Text));
        assert!("blob".parse::<ValueType>().is_err());
    }

    #[test]
    fn entity_ids_must_be_positive() {
        assert!(EntityId(1).is_valid());
        assert!(!EntityId(0).is_valid());
        assert!(!EntityId(-4).is_valid());
    }
}
