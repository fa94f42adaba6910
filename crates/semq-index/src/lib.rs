//! # semq-index
//!
//! SQLite-backed store for semq.
//!
//! Holds entities, category membership, the sub-category and sub-property
//! relations, typed property values and concept definitions in the table
//! layout the relational backend compiles against. It implements every
//! compiler collaborator ([`HierarchyLookup`], [`EntityLookup`],
//! [`ConceptStore`]) and can run a rendered statement, which makes it the
//! fixture the compiler is tested against.

pub mod cache;
pub mod fixture;

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use semq_core::{
    julian_day, DataItem, EntityId, EntityLookup, HierarchyKind, HierarchyLookup, LookupError,
    SemqError, ValueType, WikiPage,
};
use semq_description::{ConceptStore, Description};

pub use cache::CachedLookup;
pub use fixture::Fixture;

/// Entity table.
pub const ID_TABLE: &str = "smw_object_ids";
/// Category membership table.
pub const INST_TABLE: &str = "smw_fpt_inst";

/// The IndexManager manages the SQLite store.
#[derive(Debug)]
pub struct IndexManager {
    conn: Connection,
}

impl IndexManager {
    /// Open or create a store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SemqError> {
        let conn = Connection::open(path).map_err(|e| SemqError::Index(e.to_string()))?;
        let mgr = Self { conn };
        mgr.create_schema()?;
        Ok(mgr)
    }

    /// Create an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if schema creation fails.
    pub fn in_memory() -> Result<Self, SemqError> {
        let conn = Connection::open_in_memory().map_err(|e| SemqError::Index(e.to_string()))?;
        let mgr = Self { conn };
        mgr.create_schema()?;
        Ok(mgr)
    }

    fn create_schema(&self) -> Result<(), SemqError> {
        self.conn
            .execute_batch(
                "
            CREATE TABLE IF NOT EXISTS smw_object_ids (
                smw_id INTEGER PRIMARY KEY AUTOINCREMENT,
                smw_namespace INTEGER NOT NULL,
                smw_title TEXT NOT NULL,
                smw_sortkey TEXT NOT NULL,
                UNIQUE (smw_namespace, smw_title)
            );

            CREATE TABLE IF NOT EXISTS smw_fpt_inst (
                s_id INTEGER NOT NULL,
                o_id INTEGER NOT NULL,
                PRIMARY KEY (s_id, o_id)
            );

            CREATE TABLE IF NOT EXISTS smw_fpt_subc (
                s_id INTEGER NOT NULL,
                o_id INTEGER NOT NULL,
                PRIMARY KEY (s_id, o_id)
            );

            CREATE TABLE IF NOT EXISTS smw_fpt_subp (
                s_id INTEGER NOT NULL,
                o_id INTEGER NOT NULL,
                PRIMARY KEY (s_id, o_id)
            );

            CREATE TABLE IF NOT EXISTS smw_fpt_type (
                s_id INTEGER PRIMARY KEY,
                o_type TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_fpt_conc (
                s_id INTEGER PRIMARY KEY,
                concept_desc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_di_wikipage (
                s_id INTEGER NOT NULL,
                p_id INTEGER NOT NULL,
                o_id INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_di_number (
                s_id INTEGER NOT NULL,
                p_id INTEGER NOT NULL,
                o_sortkey REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_di_time (
                s_id INTEGER NOT NULL,
                p_id INTEGER NOT NULL,
                o_serialized TEXT NOT NULL,
                o_sortkey REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_di_blob (
                s_id INTEGER NOT NULL,
                p_id INTEGER NOT NULL,
                o_blob TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS smw_di_bool (
                s_id INTEGER NOT NULL,
                p_id INTEGER NOT NULL,
                o_value INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_inst_o ON smw_fpt_inst(o_id);
            CREATE INDEX IF NOT EXISTS idx_wikipage_sp ON smw_di_wikipage(s_id, p_id);
            CREATE INDEX IF NOT EXISTS idx_number_sp ON smw_di_number(s_id, p_id);
            CREATE INDEX IF NOT EXISTS idx_time_sp ON smw_di_time(s_id, p_id);
            CREATE INDEX IF NOT EXISTS idx_blob_sp ON smw_di_blob(s_id, p_id);
            CREATE INDEX IF NOT EXISTS idx_bool_sp ON smw_di_bool(s_id, p_id);
            ",
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;

        Ok(())
    }

    /// Id of `page`, creating the entity if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the insert fails.
    pub fn ensure_entity(&self, page: &WikiPage) -> Result<EntityId, SemqError> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO smw_object_ids (smw_namespace, smw_title, smw_sortkey)
                 VALUES (?1, ?2, ?3)",
                params![page.namespace, page.title, page.sort_key()],
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;

        let id: i64 = self
            .conn
            .query_row(
                "SELECT smw_id FROM smw_object_ids WHERE smw_namespace = ?1 AND smw_title = ?2",
                params![page.namespace, page.title],
                |row| row.get(0),
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(EntityId(id))
    }

    /// Record that `page` is a member of `category`.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the insert fails.
    pub fn add_category(&self, page: &WikiPage, category: &WikiPage) -> Result<(), SemqError> {
        let s_id = self.ensure_entity(page)?;
        let o_id = self.ensure_entity(category)?;
        self.insert_pair("smw_fpt_inst", s_id, o_id)
    }

    /// Record that `child` is a direct sub-category or sub-property of
    /// `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the insert fails.
    pub fn add_subordinate(
        &self,
        child: &WikiPage,
        parent: &WikiPage,
        kind: HierarchyKind,
    ) -> Result<(), SemqError> {
        let s_id = self.ensure_entity(child)?;
        let o_id = self.ensure_entity(parent)?;
        self.insert_pair(hierarchy_table(kind), s_id, o_id)
    }

    fn insert_pair(&self, table: &str, s_id: EntityId, o_id: EntityId) -> Result<(), SemqError> {
        self.conn
            .execute(
                &format!("INSERT OR IGNORE INTO {table} (s_id, o_id) VALUES (?1, ?2)"),
                params![s_id.0, o_id.0],
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(())
    }

    /// Declare the datatype of a property.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the insert fails.
    pub fn set_property_type(
        &self,
        property: &WikiPage,
        value_type: ValueType,
    ) -> Result<(), SemqError> {
        let s_id = self.ensure_entity(property)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO smw_fpt_type (s_id, o_type) VALUES (?1, ?2)",
                params![s_id.0, value_type.to_string()],
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(())
    }

    /// Store one property value of `subject`.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the insert fails.
    pub fn add_value(
        &self,
        subject: &WikiPage,
        property: &WikiPage,
        value: &DataItem,
    ) -> Result<(), SemqError> {
        let s_id = self.ensure_entity(subject)?.0;
        let p_id = self.ensure_entity(property)?.0;
        let result = match value {
            DataItem::Page(page) => {
                let o_id = self.ensure_entity(page)?.0;
                self.conn.execute(
                    "INSERT INTO smw_di_wikipage (s_id, p_id, o_id) VALUES (?1, ?2, ?3)",
                    params![s_id, p_id, o_id],
                )
            }
            DataItem::Number(n) => self.conn.execute(
                "INSERT INTO smw_di_number (s_id, p_id, o_sortkey) VALUES (?1, ?2, ?3)",
                params![s_id, p_id, n],
            ),
            DataItem::Time(t) => self.conn.execute(
                "INSERT INTO smw_di_time (s_id, p_id, o_serialized, o_sortkey)
                 VALUES (?1, ?2, ?3, ?4)",
                params![s_id, p_id, t.to_rfc3339(), julian_day(t)],
            ),
            DataItem::Text(s) => self.conn.execute(
                "INSERT INTO smw_di_blob (s_id, p_id, o_blob) VALUES (?1, ?2, ?3)",
                params![s_id, p_id, s],
            ),
            DataItem::Boolean(b) => self.conn.execute(
                "INSERT INTO smw_di_bool (s_id, p_id, o_value) VALUES (?1, ?2, ?3)",
                params![s_id, p_id, i64::from(*b)],
            ),
        };
        result.map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(())
    }

    /// Store (or replace) the definition of a concept.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Serialization`] if the description cannot be
    /// encoded and [`SemqError::Index`] if the insert fails.
    pub fn store_concept(
        &self,
        concept: &WikiPage,
        definition: &Description,
    ) -> Result<(), SemqError> {
        let s_id = self.ensure_entity(concept)?;
        let json =
            serde_json::to_string(definition).map_err(|e| SemqError::Serialization(e.to_string()))?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO smw_fpt_conc (s_id, concept_desc) VALUES (?1, ?2)",
                params![s_id.0, json],
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(())
    }

    /// Page stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the query fails.
    pub fn page_for(&self, id: EntityId) -> Result<Option<WikiPage>, SemqError> {
        self.conn
            .query_row(
                "SELECT smw_namespace, smw_title FROM smw_object_ids WHERE smw_id = ?1",
                params![id.0],
                |row| Ok(WikiPage::new(row.get(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(|e| SemqError::Index(e.to_string()))
    }

    /// Run a statement whose first column is an entity id and collect
    /// those ids in row order.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the statement fails.
    pub fn query_ids(&self, sql: &str) -> Result<Vec<EntityId>, SemqError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SemqError::Index(format!("{e} in: {sql}")))?;

        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| SemqError::Index(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SemqError::Index(e.to_string()))?;

        Ok(ids.into_iter().map(EntityId).collect())
    }

    /// Categories `id` is directly a member of, by sort key.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the query fails.
    pub fn categories_of(&self, id: EntityId) -> Result<Vec<WikiPage>, SemqError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.smw_namespace, c.smw_title
                 FROM smw_fpt_inst i
                 JOIN smw_object_ids c ON c.smw_id = i.o_id
                 WHERE i.s_id = ?1
                 ORDER BY c.smw_sortkey",
            )
            .map_err(|e| SemqError::Index(e.to_string()))?;

        let categories = stmt
            .query_map(params![id.0], |row| {
                Ok(WikiPage::new(row.get(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| SemqError::Index(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(categories)
    }

    /// Values `id` has for `property`, decoded according to the
    /// property's declared type.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the query fails or a stored value
    /// cannot be decoded.
    pub fn property_values(
        &self,
        id: EntityId,
        property: &WikiPage,
    ) -> Result<Vec<DataItem>, SemqError> {
        let Some(p_id) = self.id_for(property)? else {
            return Ok(Vec::new());
        };
        let value_type = self.property_type(property)?;
        let sql = match value_type {
            ValueType::Page => {
                "SELECT o.smw_namespace, o.smw_title FROM smw_di_wikipage v
                 JOIN smw_object_ids o ON o.smw_id = v.o_id
                 WHERE v.s_id = ?1 AND v.p_id = ?2 ORDER BY o.smw_sortkey"
            }
            ValueType::Number => {
                "SELECT o_sortkey FROM smw_di_number WHERE s_id = ?1 AND p_id = ?2 ORDER BY o_sortkey"
            }
            ValueType::Time => {
                "SELECT o_serialized FROM smw_di_time WHERE s_id = ?1 AND p_id = ?2 ORDER BY o_sortkey"
            }
            ValueType::Text => {
                "SELECT o_blob FROM smw_di_blob WHERE s_id = ?1 AND p_id = ?2 ORDER BY o_blob"
            }
            ValueType::Boolean => {
                "SELECT o_value FROM smw_di_bool WHERE s_id = ?1 AND p_id = ?2 ORDER BY o_value"
            }
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| SemqError::Index(e.to_string()))?;
        let values = stmt
            .query_map(params![id.0, p_id.0], |row| {
                Ok(match value_type {
                    ValueType::Page => {
                        DataItem::Page(WikiPage::new(row.get(0)?, row.get::<_, String>(1)?))
                    }
                    ValueType::Number => DataItem::Number(row.get(0)?),
                    ValueType::Time => {
                        let serialized: String = row.get(0)?;
                        let time = DateTime::parse_from_rfc3339(&serialized).map_err(|e| {
                            rusqlite::Error::FromSqlConversionFailure(
                                0,
                                rusqlite::types::Type::Text,
                                Box::new(e),
                            )
                        })?;
                        DataItem::Time(time.with_timezone(&Utc))
                    }
                    ValueType::Text => DataItem::Text(row.get(0)?),
                    ValueType::Boolean => DataItem::Boolean(row.get::<_, i64>(0)? != 0),
                })
            })
            .map_err(|e| SemqError::Index(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(values)
    }

    /// Get count of stored entities.
    ///
    /// # Errors
    ///
    /// Returns [`SemqError::Index`] if the query fails.
    pub fn count(&self) -> Result<u64, SemqError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM smw_object_ids", [], |row| row.get(0))
            .map_err(|e| SemqError::Index(e.to_string()))?;
        Ok(count as u64)
    }
}

fn hierarchy_table(kind: HierarchyKind) -> &'static str {
    match kind {
        HierarchyKind::Class => "smw_fpt_subc",
        HierarchyKind::Property => "smw_fpt_subp",
    }
}

fn lookup_failed(collaborator: &'static str, key: &WikiPage, e: impl ToString) -> LookupError {
    LookupError::Failed {
        collaborator,
        key: key.to_string(),
        reason: e.to_string(),
    }
}

impl HierarchyLookup for IndexManager {
    fn children_of(
        &self,
        page: &WikiPage,
        kind: HierarchyKind,
    ) -> Result<Vec<WikiPage>, LookupError> {
        let sql = format!(
            "SELECT c.smw_namespace, c.smw_title
             FROM {} r
             JOIN smw_object_ids c ON c.smw_id = r.s_id
             JOIN smw_object_ids p ON p.smw_id = r.o_id
             WHERE p.smw_namespace = ?1 AND p.smw_title = ?2
             ORDER BY c.smw_sortkey",
            hierarchy_table(kind)
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| lookup_failed("hierarchy", page, e))?;

        let children = stmt
            .query_map(params![page.namespace, page.title], |row| {
                Ok(WikiPage::new(row.get(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| lookup_failed("hierarchy", page, e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| lookup_failed("hierarchy", page, e))?;

        Ok(children)
    }
}

impl EntityLookup for IndexManager {
    fn id_for(&self, page: &WikiPage) -> Result<Option<EntityId>, LookupError> {
        self.conn
            .query_row(
                "SELECT smw_id FROM smw_object_ids WHERE smw_namespace = ?1 AND smw_title = ?2",
                params![page.namespace, page.title],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|id| id.map(EntityId))
            .map_err(|e| lookup_failed("entity", page, e))
    }

    fn property_type(&self, property: &WikiPage) -> Result<ValueType, LookupError> {
        let declared: Option<String> = self
            .conn
            .query_row(
                "SELECT t.o_type FROM smw_fpt_type t
                 JOIN smw_object_ids i ON i.smw_id = t.s_id
                 WHERE i.smw_namespace = ?1 AND i.smw_title = ?2",
                params![property.namespace, property.title],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| lookup_failed("entity", property, e))?;

        match declared {
            Some(name) => name
                .parse()
                .map_err(|e: String| lookup_failed("entity", property, e)),
            None => Ok(ValueType::default()),
        }
    }
}

impl ConceptStore for IndexManager {
    fn definition_of(&self, concept: &WikiPage) -> Result<Option<Description>, LookupError> {
        let stored: Option<String> = self
            .conn
            .query_row(
                "SELECT c.concept_desc FROM smw_fpt_conc c
                 JOIN smw_object_ids i ON i.smw_id = c.s_id
                 WHERE i.smw_namespace = ?1 AND i.smw_title = ?2",
                params![concept.namespace, concept.title],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| lookup_failed("concept", concept, e))?;

        stored
            .map(|json| serde_json::from_str(&json).map_err(|e| lookup_failed("concept", concept, e)))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semq_description::Comparator;

    #[test]
    fn create_in_memory_store() {
        let index = IndexManager::in_memory().unwrap();
        assert_eq!(index.count().unwrap(), 0);
    }

    #[test]
    fn ensure_entity_is_idempotent() {
        let index = IndexManager::in_memory().unwrap();
        let a = index.ensure_entity(&WikiPage::page("Berlin")).unwrap();
        let b = index.ensure_entity(&WikiPage::page("Berlin")).unwrap();
        assert_eq!(a, b);
        assert!(a.is_valid());
        assert_eq!(index.count().unwrap(), 1);
        assert_eq!(index.page_for(a).unwrap(), Some(WikiPage::page("Berlin")));
    }

    #[test]
    fn id_for_unknown_page_is_none() {
        let index = IndexManager::in_memory().unwrap();
        assert_eq!(index.id_for(&WikiPage::page("Nowhere")).unwrap(), None);
    }

    #[test]
    fn children_of_reads_direct_subcategories_only() {
        let index = IndexManager::in_memory().unwrap();
        let city = WikiPage::category("City");
        let capital = WikiPage::category("Capital");
        let hanseatic = WikiPage::category("Hanseatic capital");
        index
            .add_subordinate(&capital, &city, HierarchyKind::Class)
            .unwrap();
        index
            .add_subordinate(&hanseatic, &capital, HierarchyKind::Class)
            .unwrap();

        let children = index.children_of(&city, HierarchyKind::Class).unwrap();
        assert_eq!(children, vec![capital]);
        assert!(index
            .children_of(&city, HierarchyKind::Property)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn property_type_defaults_to_page() {
        let index = IndexManager::in_memory().unwrap();
        let population = WikiPage::property("Population");
        assert_eq!(index.property_type(&population).unwrap(), ValueType::Page);
        index
            .set_property_type(&population, ValueType::Number)
            .unwrap();
        assert_eq!(index.property_type(&population).unwrap(), ValueType::Number);
    }

    #[test]
    fn concept_definitions_roundtrip() {
        let index = IndexManager::in_memory().unwrap();
        let concept = WikiPage::concept("Big cities");
        let definition = Description::value(
            WikiPage::property("Population"),
            Comparator::Geq,
            DataItem::Number(1_000_000.0),
        );
        assert_eq!(index.definition_of(&concept).unwrap(), None);
        index.store_concept(&concept, &definition).unwrap();
        assert_eq!(index.definition_of(&concept).unwrap(), Some(definition));
    }

    #[test]
    fn query_ids_runs_raw_sql() {
        let index = IndexManager::in_memory().unwrap();
        let berlin = WikiPage::page("Berlin");
        index
            .add_value(
                &berlin,
                &WikiPage::property("Population"),
                &DataItem::Number(3_600_000.0),
            )
            .unwrap();
        let ids = index
            .query_ids("SELECT s_id FROM smw_di_number WHERE o_sortkey > 1000000")
            .unwrap();
        assert_eq!(ids, vec![index.ensure_entity(&berlin).unwrap()]);
    }

    #[test]
    fn categories_of_lists_direct_membership() {
        let index = IndexManager::in_memory().unwrap();
        let berlin = WikiPage::page("Berlin");
        index.add_category(&berlin, &WikiPage::category("City")).unwrap();
        index
            .add_category(&berlin, &WikiPage::category("Capital"))
            .unwrap();
        let id = index.ensure_entity(&berlin).unwrap();
        assert_eq!(
            index.categories_of(id).unwrap(),
            vec![WikiPage::category("Capital"), WikiPage::category("City")]
        );
    }

    #[test]
    fn property_values_decode_by_declared_type() {
        use chrono::TimeZone;

        let index = IndexManager::in_memory().unwrap();
        let berlin = WikiPage::page("Berlin");
        let founded = WikiPage::property("Founded");
        let located = WikiPage::property("Located in");
        index.set_property_type(&founded, ValueType::Time).unwrap();
        let t = Utc.with_ymd_and_hms(1237, 10, 28, 0, 0, 0).unwrap();
        index.add_value(&berlin, &founded, &DataItem::Time(t)).unwrap();
        index
            .add_value(&berlin, &located, &DataItem::Page(WikiPage::page("Germany")))
            .unwrap();

        let id = index.ensure_entity(&berlin).unwrap();
        assert_eq!(
            index.property_values(id, &founded).unwrap(),
            vec![DataItem::Time(t)]
        );
        assert_eq!(
            index.property_values(id, &located).unwrap(),
            vec![DataItem::Page(WikiPage::page("Germany"))]
        );
        assert!(index
            .property_values(id, &WikiPage::property("Unknown"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_sql_is_index_error() {
        let index = IndexManager::in_memory().unwrap();
        let err = index.query_ids("SELECT nope FROM nowhere").unwrap_err();
        assert!(matches!(err, SemqError::Index(_)));
    }
}
