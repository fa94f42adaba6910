//! IRIs, local names and typed literals of the RDF export.

use chrono::SecondsFormat;

use semq_core::{DataItem, WikiPage};

pub const RDF_IRI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const XSD_IRI: &str = "http://www.w3.org/2001/XMLSchema#";
pub const SWIVT_IRI: &str = "http://semantic-mediawiki.org/swivt/1.0#";

/// Encodes pages and data items as SPARQL terms under a base IRI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoder {
    base_iri: String,
}

impl Encoder {
    #[must_use]
    pub fn new(base_iri: impl Into<String>) -> Self {
        Self {
            base_iri: base_iri.into(),
        }
    }

    /// IRI a prefix stands for, if the export defines it.
    #[must_use]
    pub fn namespace_iri(&self, prefix: &str) -> Option<String> {
        match prefix {
            "wiki" => Some(self.base_iri.clone()),
            "property" => Some(format!("{}Property-3A", self.base_iri)),
            "rdf" => Some(RDF_IRI.to_string()),
            "xsd" => Some(XSD_IRI.to_string()),
            "swivt" => Some(SWIVT_IRI.to_string()),
            _ => None,
        }
    }

    /// `wiki:` term of a page, namespace included.
    #[must_use]
    pub fn page(&self, page: &WikiPage) -> String {
        format!("wiki:{}", local_name(&page.prefixed_text()))
    }

    /// `property:` term used in predicate position.
    #[must_use]
    pub fn property(&self, property: &WikiPage) -> String {
        format!("property:{}", local_name(&property.text()))
    }

    /// Term for a datum. Pages become `wiki:` terms, everything else a
    /// typed literal.
    #[must_use]
    pub fn datum(&self, datum: &DataItem) -> String {
        match datum {
            DataItem::Number(n) => format!("\"{n}\"^^xsd:double"),
            DataItem::Boolean(b) => format!("\"{b}\"^^xsd:boolean"),
            DataItem::Time(t) => format!(
                "\"{}\"^^xsd:dateTime",
                t.to_rfc3339_opts(SecondsFormat::Secs, true)
            ),
            DataItem::Text(s) => string_literal(s),
            DataItem::Page(page) => self.page(page),
        }
    }

    /// Prefixes a term produced by [`Encoder::datum`] depends on.
    #[must_use]
    pub fn datum_prefixes(datum: &DataItem) -> &'static [&'static str] {
        match datum {
            DataItem::Number(_) | DataItem::Boolean(_) | DataItem::Time(_) => &["xsd"],
            DataItem::Text(_) => &[],
            DataItem::Page(_) => &["wiki"],
        }
    }
}

/// Local name of a title in the export: spaces become `_`, and every
/// byte outside `[A-Za-z0-9_]` is written as `-XX`.
#[must_use]
pub fn local_name(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.replace(' ', "_").bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'_' {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("-{byte:02X}"));
        }
    }
    out
}

/// A quoted plain string literal.
#[must_use]
pub fn string_literal(text: &str) -> String {
    let escaped = text
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

/// Anchored regular expression for a `*`/`?` wildcard pattern.
#[must_use]
pub fn regex_pattern(pattern: &str) -> String {
    let mut out = String::from("^");
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '\\' | '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' => {
                out.push('\\');
                out.push(c);
            }
            other => out.push(other),
        }
    }
    out.push('$');
    out
}
