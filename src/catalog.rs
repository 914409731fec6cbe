//! Table registry.
//!
//! The catalog maps table ids to their backing heap files, schemas, and
//! human-readable names. It is a thin, thread-safe registry: the storage and
//! execution layers look tables up here but never mutate table metadata.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::heap::HeapFile;
use crate::tuple::Schema;

/// Errors from catalog lookups.
#[derive(Debug)]
pub enum CatalogError {
    /// No table registered under this id.
    UnknownTable(u32),
    /// No table registered under this name.
    UnknownTableName(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::UnknownTable(id) => write!(f, "unknown table id {}", id),
            CatalogError::UnknownTableName(name) => write!(f, "unknown table {:?}", name),
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug)]
struct TableEntry {
    file: Arc<HeapFile>,
    name: String,
}

/// Thread-safe table id ↔ (heap file, name, schema) registry.
#[derive(Debug)]
pub struct Catalog {
    tables: RwLock<HashMap<u32, TableEntry>>,
}

impl Catalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `file` under `name`, returning the table id.
    ///
    /// Re-registering an id or a name replaces the previous entry.
    pub fn add_table(&self, file: Arc<HeapFile>, name: impl Into<String>) -> u32 {
        let name = name.into();
        let table_id = file.table_id();
        let mut tables = self.tables.write();
        tables.retain(|_, entry| entry.name != name);
        tables.insert(table_id, TableEntry { file, name });
        table_id
    }

    /// Returns the heap file backing `table_id`.
    pub fn file(&self, table_id: u32) -> Result<Arc<HeapFile>, CatalogError> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| Arc::clone(&entry.file))
            .ok_or(CatalogError::UnknownTable(table_id))
    }

    /// Returns the schema of `table_id`.
    pub fn schema(&self, table_id: u32) -> Result<Arc<Schema>, CatalogError> {
        self.file(table_id).map(|file| Arc::clone(file.schema()))
    }

    /// Returns the registered name of `table_id`.
    pub fn table_name(&self, table_id: u32) -> Result<String, CatalogError> {
        self.tables
            .read()
            .get(&table_id)
            .map(|entry| entry.name.clone())
            .ok_or(CatalogError::UnknownTable(table_id))
    }

    /// Looks a table id up by name.
    pub fn table_id(&self, name: &str) -> Result<u32, CatalogError> {
        self.tables
            .read()
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
            .ok_or_else(|| CatalogError::UnknownTableName(name.to_string()))
    }

    /// Returns the ids of all registered tables.
    pub fn table_ids(&self) -> Vec<u32> {
        self.tables.read().keys().copied().collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::FieldType;
    use tempfile::tempdir;

    fn open_file(dir: &std::path::Path, name: &str) -> Arc<HeapFile> {
        let schema = Arc::new(Schema::anonymous(vec![FieldType::Int]));
        Arc::new(HeapFile::open(dir.join(name), schema, 256).unwrap())
    }

    #[test]
    fn test_lookups_by_id_and_name() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let file = open_file(dir.path(), "users");
        let table_id = catalog.add_table(Arc::clone(&file), "users");

        assert_eq!(table_id, file.table_id());
        assert_eq!(catalog.table_name(table_id).unwrap(), "users");
        assert_eq!(catalog.table_id("users").unwrap(), table_id);
        assert_eq!(catalog.schema(table_id).unwrap(), *file.schema());
        assert_eq!(catalog.table_ids(), vec![table_id]);
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let catalog = Catalog::new();
        assert!(matches!(
            catalog.file(42),
            Err(CatalogError::UnknownTable(42))
        ));
        assert!(matches!(
            catalog.table_id("nope"),
            Err(CatalogError::UnknownTableName(_))
        ));
    }

    #[test]
    fn test_reregistering_a_name_replaces_the_table() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new();
        let old = catalog.add_table(open_file(dir.path(), "a"), "t");
        let new = catalog.add_table(open_file(dir.path(), "b"), "t");

        assert_ne!(old, new);
        assert_eq!(catalog.table_id("t").unwrap(), new);
        assert!(catalog.file(old).is_err());
    }
}
