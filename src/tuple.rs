//! Tuples, schemas, and record identifiers.
//!
//! A [`Schema`] is an ordered sequence of typed, optionally named fields and
//! fully determines the fixed on-disk size of its tuples. A [`Tuple`] pairs a
//! schema with one [`Field`] value per position and, once stored, carries a
//! [`RecordId`] locating its slot on disk.

use std::fmt;
use std::sync::Arc;

use crate::datum::{Field, FieldType};
use crate::storage::PageId;

/// A reference to a specific tuple slot on a specific page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    /// Page holding the tuple.
    pub page_id: PageId,
    /// Slot number within the page.
    pub slot: usize,
}

impl RecordId {
    /// Creates a new record identifier.
    pub const fn new(page_id: PageId, slot: usize) -> Self {
        Self { page_id, slot }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.page_id, self.slot)
    }
}

/// An ordered, optionally named sequence of field types.
///
/// Two schemas are equal iff their ordered type sequences are equal; field
/// names are documentation only and ignored by `PartialEq`.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<(FieldType, Option<String>)>,
}

impl Schema {
    /// Creates a schema from `(type, name)` pairs.
    pub fn new(fields: Vec<(FieldType, Option<String>)>) -> Self {
        Self { fields }
    }

    /// Creates a schema of anonymous fields.
    pub fn anonymous(types: Vec<FieldType>) -> Self {
        Self {
            fields: types.into_iter().map(|t| (t, None)).collect(),
        }
    }

    /// Convenience constructor from parallel type/name slices.
    pub fn named(types: &[FieldType], names: &[&str]) -> Self {
        debug_assert_eq!(types.len(), names.len());
        Self {
            fields: types
                .iter()
                .zip(names)
                .map(|(t, n)| (*t, Some(n.to_string())))
                .collect(),
        }
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the schema has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the type of field `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of range.
    pub fn field_type(&self, i: usize) -> FieldType {
        self.fields[i].0
    }

    /// Returns the name of field `i`, if it has one.
    pub fn field_name(&self, i: usize) -> Option<&str> {
        self.fields[i].1.as_deref()
    }

    /// Returns the index of the first field with the given name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|(_, n)| n.as_deref() == Some(name))
    }

    /// Returns the fixed byte size of a tuple conforming to this schema.
    pub fn byte_size(&self) -> usize {
        self.fields.iter().map(|(t, _)| t.byte_size()).sum()
    }

    /// Iterates over the `(type, name)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldType, Option<&str>)> {
        self.fields.iter().map(|(t, n)| (*t, n.as_deref()))
    }

    /// Concatenates two schemas, `left` fields first.
    pub fn merge(left: &Schema, right: &Schema) -> Schema {
        let mut fields = left.fields.clone();
        fields.extend(right.fields.iter().cloned());
        Schema { fields }
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .zip(&other.fields)
                .all(|((a, _), (b, _))| a == b)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (ty, name)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match name {
                Some(name) => write!(f, "{} {}", name, ty)?,
                None => write!(f, "{}", ty)?,
            }
        }
        Ok(())
    }
}

/// A schema-conforming row, optionally located on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    /// Creates a tuple from a schema and one value per field.
    ///
    /// # Panics
    ///
    /// Panics if the value count or any value type disagrees with the schema.
    pub fn new(schema: Arc<Schema>, fields: Vec<Field>) -> Self {
        assert_eq!(schema.len(), fields.len(), "field count mismatch");
        for (i, field) in fields.iter().enumerate() {
            assert_eq!(
                schema.field_type(i),
                field.field_type(),
                "field {} type mismatch",
                i
            );
        }
        Self {
            schema,
            fields,
            record_id: None,
        }
    }

    /// Returns the tuple's schema.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the value of field `i`.
    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    /// Replaces the value of field `i`.
    ///
    /// # Panics
    ///
    /// Panics if the new value's type disagrees with the schema.
    pub fn set_field(&mut self, i: usize, value: Field) {
        assert_eq!(
            self.schema.field_type(i),
            value.field_type(),
            "field {} type mismatch",
            i
        );
        self.fields[i] = value;
    }

    /// Iterates over the field values in order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    /// Returns where this tuple lives on disk, if it has been stored.
    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    /// Stamps or clears the tuple's disk location.
    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Concatenates two tuples under the merged schema. The result carries
    /// no record id.
    pub fn join(left: &Tuple, right: &Tuple) -> Tuple {
        let schema = Arc::new(Schema::merge(&left.schema, &right.schema));
        let fields = left
            .fields
            .iter()
            .chain(&right.fields)
            .cloned()
            .collect();
        Tuple {
            schema,
            fields,
            record_id: None,
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, "\t")?;
            }
            write!(f, "{}", field)?;
        }
        Ok(())
    }
}
