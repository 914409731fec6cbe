//! Heap page: a fixed-size block of tuple slots with a use bitmap.
//!
//! # Layout
//!
//! ```text
//! +--------------------+ offset 0
//! | header bitmap      |  ceil(num_slots / 8) bytes, bit i set => slot i used
//! +--------------------+ offset header_size
//! | slot 0             |  tuple_size bytes each
//! | slot 1             |
//! | ...                |
//! +--------------------+
//! | zero padding       |  up to page_size
//! +--------------------+
//! ```
//!
//! Bit `i` lives in header byte `i / 8` at bit position `i % 8`. The slot
//! count is chosen so that every slot plus its header bit fits the page:
//! `num_slots = (page_size * 8) / (tuple_size * 8 + 1)`.
//!
//! Besides the byte image, a page carries two in-memory-only pieces of
//! state: a dirty mark naming the last writer transaction, and a
//! *before-image* — the byte snapshot taken when the page was read (and
//! refreshed at commit) that abort restoration and update logging work from.

use std::sync::Arc;

use bytes::BufMut;

use crate::datum::Field;
use crate::storage::PageId;
use crate::tuple::{RecordId, Schema, Tuple};
use crate::tx::TransactionId;

use super::error::HeapError;

/// Returns the number of tuple slots a page of `page_size` bytes can hold
/// for tuples of `tuple_size` bytes: each slot costs its byte width plus one
/// header bit.
pub const fn slots_per_page(page_size: usize, tuple_size: usize) -> usize {
    (page_size * 8) / (tuple_size * 8 + 1)
}

/// Returns the header bitmap size in bytes for `num_slots` slots.
pub const fn header_size(num_slots: usize) -> usize {
    num_slots.div_ceil(8)
}

/// An in-memory heap page.
///
/// The byte image produced by [`encode`](Self::encode) is the canonical
/// persisted form; [`decode`](Self::decode) parses one and `encode ∘ decode`
/// is the identity on well-formed images (images whose vacant slots are
/// zeroed).
#[derive(Debug)]
pub struct HeapPage {
    pid: PageId,
    schema: Arc<Schema>,
    page_size: usize,
    header: Vec<u8>,
    slots: Vec<Option<Tuple>>,
    dirty: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// Parses a page from its byte image.
    ///
    /// The image length defines the page size. The parsed image also becomes
    /// the page's initial before-image.
    ///
    /// # Errors
    ///
    /// Returns `HeapError::Corrupted` if the page cannot hold a single tuple
    /// of this schema, and a serialization error if a used slot fails to
    /// parse.
    pub fn decode(pid: PageId, schema: Arc<Schema>, image: &[u8]) -> Result<Self, HeapError> {
        let page_size = image.len();
        let tuple_size = schema.byte_size();
        let num_slots = slots_per_page(page_size, tuple_size);
        if num_slots == 0 {
            return Err(HeapError::Corrupted(format!(
                "page of {} bytes cannot hold a {}-byte tuple",
                page_size, tuple_size
            )));
        }

        let header = image[..header_size(num_slots)].to_vec();
        let mut slots = Vec::with_capacity(num_slots);
        for slot in 0..num_slots {
            if header[slot / 8] & (1 << (slot % 8)) == 0 {
                slots.push(None);
                continue;
            }
            let start = header_size(num_slots) + slot * tuple_size;
            let mut buf = &image[start..start + tuple_size];
            let mut fields = Vec::with_capacity(schema.len());
            for (ty, _) in schema.iter() {
                fields.push(Field::read_from(&mut buf, ty)?);
            }
            let mut tuple = Tuple::new(Arc::clone(&schema), fields);
            tuple.set_record_id(Some(RecordId::new(pid, slot)));
            slots.push(Some(tuple));
        }

        Ok(Self {
            pid,
            schema,
            page_size,
            header,
            slots,
            dirty: None,
            before_image: image.to_vec(),
        })
    }

    /// Produces the canonical byte image of this page.
    ///
    /// Vacant slots and trailing padding are zeroed.
    pub fn encode(&self) -> Vec<u8> {
        let tuple_size = self.schema.byte_size();
        let mut image = Vec::with_capacity(self.page_size);
        image.put_slice(&self.header);
        for slot in &self.slots {
            match slot {
                Some(tuple) => {
                    for field in tuple.fields() {
                        // Widths were validated on the way in, so encoding
                        // a stored tuple cannot fail.
                        field
                            .write_to(&mut image)
                            .expect("stored tuple must serialize");
                    }
                }
                None => image.put_bytes(0, tuple_size),
            }
        }
        image.resize(self.page_size, 0);
        image
    }

    /// Returns this page's identifier.
    pub fn page_id(&self) -> PageId {
        self.pid
    }

    /// Returns the tuple schema of this page.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Returns the total number of tuple slots.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of vacant slots.
    pub fn free_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_none()).count()
    }

    /// Returns the number of stored tuples.
    pub fn tuple_count(&self) -> usize {
        self.slots.len() - self.free_slot_count()
    }

    /// Returns true if the header bit for `slot` is set.
    pub fn is_slot_used(&self, slot: usize) -> bool {
        self.header[slot / 8] & (1 << (slot % 8)) != 0
    }

    /// Sets or clears the header bit for `slot`.
    pub fn mark_slot_used(&mut self, slot: usize, used: bool) {
        if used {
            self.header[slot / 8] |= 1 << (slot % 8);
        } else {
            self.header[slot / 8] &= !(1 << (slot % 8));
        }
    }

    /// Stores `tuple` in the first vacant slot and stamps its record id.
    ///
    /// # Errors
    ///
    /// `HeapError::SchemaMismatch` if the tuple's schema differs from the
    /// page's, `HeapError::PageFull` if every slot is in use.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> Result<(), HeapError> {
        if **tuple.schema() != *self.schema {
            return Err(HeapError::SchemaMismatch);
        }
        let slot = self
            .slots
            .iter()
            .position(|slot| slot.is_none())
            .ok_or(HeapError::PageFull(self.pid))?;

        tuple.set_record_id(Some(RecordId::new(self.pid, slot)));
        self.slots[slot] = Some(tuple.clone());
        self.mark_slot_used(slot, true);
        Ok(())
    }

    /// Removes `tuple` from its slot, clearing the header bit.
    ///
    /// # Errors
    ///
    /// `HeapError::MissingRecordId` if the tuple has never been stored,
    /// `HeapError::WrongPage` if its record id names another page, and
    /// `HeapError::SlotVacant` if the slot is not in use.
    pub fn delete_tuple(&mut self, tuple: &Tuple) -> Result<(), HeapError> {
        let rid = tuple.record_id().ok_or(HeapError::MissingRecordId)?;
        if rid.page_id != self.pid {
            return Err(HeapError::WrongPage { rid, pid: self.pid });
        }
        if rid.slot >= self.slots.len() || !self.is_slot_used(rid.slot) {
            return Err(HeapError::SlotVacant {
                pid: self.pid,
                slot: rid.slot,
            });
        }
        self.slots[rid.slot] = None;
        self.mark_slot_used(rid.slot, false);
        Ok(())
    }

    /// Iterates over the stored tuples in slot order.
    ///
    /// The iterator borrows the page; callers wanting to restart simply
    /// request a fresh one.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.slots.iter().filter_map(|slot| slot.as_ref())
    }

    /// Returns the transaction that last dirtied this page, or `None` if the
    /// page is clean.
    pub fn dirty(&self) -> Option<TransactionId> {
        self.dirty
    }

    /// Marks the page dirty with its last writer, or clean with `None`.
    pub fn set_dirty(&mut self, tid: Option<TransactionId>) {
        self.dirty = tid;
    }

    /// Returns the before-image bytes captured at decode time (or at the
    /// last commit).
    pub fn before_image_bytes(&self) -> &[u8] {
        &self.before_image
    }

    /// Reconstructs a page from the before-image snapshot.
    pub fn before_image(&self) -> Result<HeapPage, HeapError> {
        HeapPage::decode(self.pid, Arc::clone(&self.schema), &self.before_image)
    }

    /// Replaces the before-image with the current contents. Called when the
    /// page reaches disk at commit.
    pub fn set_before_image(&mut self) {
        self.before_image = self.encode();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::FieldType;

    const PAGE_SIZE: usize = 1024;

    fn schema() -> Arc<Schema> {
        Arc::new(Schema::named(&[FieldType::Int, FieldType::Int], &["a", "b"]))
    }

    fn pid() -> PageId {
        PageId::new(1, 0)
    }

    fn blank_page() -> HeapPage {
        HeapPage::decode(pid(), schema(), &vec![0u8; PAGE_SIZE]).unwrap()
    }

    fn tuple(a: i32, b: i32) -> Tuple {
        Tuple::new(schema(), vec![Field::Int(a), Field::Int(b)])
    }

    #[test]
    fn test_slot_geometry() {
        // 8-byte tuples on a 1024-byte page: 8192 bits / 65 bits per slot.
        assert_eq!(slots_per_page(PAGE_SIZE, 8), 126);
        assert_eq!(header_size(126), 16);
        assert_eq!(blank_page().num_slots(), 126);
    }

    #[test]
    fn test_header_bit_count_matches_tuple_count() {
        let mut page = blank_page();
        for i in 0..5 {
            page.insert_tuple(&mut tuple(i, i)).unwrap();
        }
        let bits: u32 = page.encode()[..header_size(page.num_slots())]
            .iter()
            .map(|b| b.count_ones())
            .sum();
        assert_eq!(bits as usize, page.tuple_count());
        assert_eq!(page.tuple_count() + page.free_slot_count(), page.num_slots());
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut page = blank_page();
        for i in 0..10 {
            page.insert_tuple(&mut tuple(i, -i)).unwrap();
        }
        let image = page.encode();
        assert_eq!(image.len(), PAGE_SIZE);

        let reparsed = HeapPage::decode(pid(), schema(), &image).unwrap();
        assert_eq!(reparsed.encode(), image);
        assert_eq!(reparsed.tuple_count(), 10);
        let values: Vec<i32> = reparsed
            .iter()
            .map(|t| match t.field(0) {
                Field::Int(v) => *v,
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(values, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_insert_stamps_record_id() {
        let mut page = blank_page();
        let mut t = tuple(7, 8);
        page.insert_tuple(&mut t).unwrap();
        assert_eq!(t.record_id(), Some(RecordId::new(pid(), 0)));
        assert!(page.is_slot_used(0));
    }

    #[test]
    fn test_insert_fills_first_free_slot() {
        let mut page = blank_page();
        let mut t0 = tuple(0, 0);
        let mut t1 = tuple(1, 1);
        let mut t2 = tuple(2, 2);
        page.insert_tuple(&mut t0).unwrap();
        page.insert_tuple(&mut t1).unwrap();
        page.delete_tuple(&t0).unwrap();
        page.insert_tuple(&mut t2).unwrap();
        assert_eq!(t2.record_id().unwrap().slot, 0);
    }

    #[test]
    fn test_insert_rejects_wrong_schema() {
        let mut page = blank_page();
        let other = Arc::new(Schema::anonymous(vec![FieldType::Int]));
        let mut t = Tuple::new(other, vec![Field::Int(1)]);
        assert!(matches!(
            page.insert_tuple(&mut t),
            Err(HeapError::SchemaMismatch)
        ));
    }

    #[test]
    fn test_insert_into_full_page() {
        let mut page = blank_page();
        for i in 0..page.num_slots() {
            page.insert_tuple(&mut tuple(i as i32, 0)).unwrap();
        }
        assert_eq!(page.free_slot_count(), 0);
        assert!(matches!(
            page.insert_tuple(&mut tuple(-1, -1)),
            Err(HeapError::PageFull(_))
        ));
    }

    #[test]
    fn test_delete_clears_slot() {
        let mut page = blank_page();
        let mut t = tuple(3, 4);
        page.insert_tuple(&mut t).unwrap();
        page.delete_tuple(&t).unwrap();
        assert!(!page.is_slot_used(0));
        assert_eq!(page.tuple_count(), 0);

        // Deleting again finds the slot vacant.
        assert!(matches!(
            page.delete_tuple(&t),
            Err(HeapError::SlotVacant { .. })
        ));
    }

    #[test]
    fn test_delete_rejects_foreign_record() {
        let mut page = blank_page();
        let mut t = tuple(1, 2);
        t.set_record_id(Some(RecordId::new(PageId::new(1, 9), 0)));
        assert!(matches!(
            page.delete_tuple(&t),
            Err(HeapError::WrongPage { .. })
        ));

        let unstamped = tuple(1, 2);
        assert!(matches!(
            page.delete_tuple(&unstamped),
            Err(HeapError::MissingRecordId)
        ));
    }

    #[test]
    fn test_dirty_tracking() {
        let mut page = blank_page();
        assert_eq!(page.dirty(), None);
        let tid = TransactionId::new();
        page.set_dirty(Some(tid));
        assert_eq!(page.dirty(), Some(tid));
        page.set_dirty(None);
        assert_eq!(page.dirty(), None);
    }

    #[test]
    fn test_before_image_restores_old_contents() {
        let mut page = blank_page();
        let mut t = tuple(1, 2);
        page.insert_tuple(&mut t).unwrap();
        page.set_before_image();

        let mut t2 = tuple(3, 4);
        page.insert_tuple(&mut t2).unwrap();
        assert_eq!(page.tuple_count(), 2);

        let restored = page.before_image().unwrap();
        assert_eq!(restored.tuple_count(), 1);
        assert_eq!(restored.iter().next().unwrap().field(0), &Field::Int(1));
    }

    #[test]
    fn test_page_too_small_for_tuple() {
        let err = HeapPage::decode(pid(), schema(), &[0u8; 4]).unwrap_err();
        assert!(matches!(err, HeapError::Corrupted(_)));
    }
}
