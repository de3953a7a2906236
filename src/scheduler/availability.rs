use std::collections::HashSet;

use common::id::ObjectId;

/// Which objects are currently present in the local object store. No
/// payload, no persistence; rebuilt from the store notification stream.
#[derive(Default)]
pub struct ObjectIndex {
    present: HashSet<ObjectId>,
}

impl ObjectIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns false when the object was already present.
    pub fn insert(&mut self, id: ObjectId) -> bool {
        self.present.insert(id)
    }

    /// Returns false when the object was not present.
    pub fn remove(&mut self, id: &ObjectId) -> bool {
        self.present.remove(id)
    }

    #[inline]
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.present.contains(id)
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }
}
