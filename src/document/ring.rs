//! The ring of open documents.
//!
//! All open inputs live in one circular sequence with a single current
//! document; commands operate on the current one and switching documents
//! is just a move of the current index.

use super::Document;

/// Circular collection of open documents.
///
/// The vector order is the ring order; `current` indexes the active
/// document.  An empty ring has no current document and means the pager is
/// done.
#[derive(Debug, Default)]
pub struct DocumentRing {
    docs: Vec<Document>,
    current: usize,
}

impl DocumentRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// The active document.
    ///
    /// Panics if the ring is empty; the event loop exits before that.
    pub fn current(&self) -> &Document {
        &self.docs[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Document {
        &mut self.docs[self.current]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.docs.iter()
    }

    /// All documents except the current one, in ring order starting after
    /// it.
    pub fn others_mut(&mut self) -> impl Iterator<Item = &mut Document> {
        let current = self.current;
        let len = self.docs.len();
        self.docs
            .iter_mut()
            .enumerate()
            .filter(move |(i, _)| len > 0 && *i != current)
            .map(|(_, d)| d)
    }

    /// Find a document by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.docs.iter().position(|d| d.name == name)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Document> {
        self.docs.get_mut(index)
    }

    /// Make the document at `index` current.
    pub fn move_here(&mut self, index: usize) {
        if index < self.docs.len() {
            self.current = index;
        }
    }

    /// Add a document to the ring.
    ///
    /// If a document with the same name already exists it is not replaced;
    /// it just becomes current when `new_current` asks for that.  Returns
    /// whether the document was newly inserted.
    pub fn add(&mut self, doc: Document, new_current: bool) -> bool {
        if let Some(index) = self.find(&doc.name) {
            if new_current {
                self.current = index;
            }
            return false;
        }

        if self.docs.is_empty() {
            self.docs.push(doc);
            self.current = 0;
            return true;
        }

        // Insert before the current document; the new one either takes the
        // current slot or sits at the current one's back in ring order.
        self.docs.insert(self.current, doc);
        if !new_current {
            self.current += 1;
        }
        true
    }

    /// Remove the current document; its successor becomes current.
    ///
    /// Returns the removed document so the caller can release resources.
    pub fn kill_current(&mut self) -> Option<Document> {
        if self.docs.is_empty() {
            return None;
        }
        let doc = self.docs.remove(self.current);
        if self.current >= self.docs.len() {
            self.current = 0;
        }
        Some(doc)
    }

    /// Names of all documents in ring order starting behind the current
    /// one, for the open-files list.
    pub fn names_from_prev(&self) -> Vec<String> {
        let len = self.docs.len();
        (0..len)
            .map(|i| {
                let idx = (self.current + len - 1 - i) % len;
                self.docs[idx].name.clone()
            })
            .collect()
    }
}
