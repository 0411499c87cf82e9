use snip_core::ShortCode;
use std::collections::{HashMap, HashSet};

/// Groups short codes by the owner that created them.
///
/// Codes are kept in creation order, so listings come back in the order
/// the owner shortened them. The index knows nothing about the deleted
/// flag; callers filter on the records themselves.
#[derive(Debug, Default, Clone)]
pub struct OwnerIndex {
    owners: HashMap<String, Vec<ShortCode>>,
}

impl OwnerIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `code` as created by `owner_id`.
    pub fn insert(&mut self, owner_id: &str, code: ShortCode) {
        self.owners.entry(owner_id.to_owned()).or_default().push(code);
    }

    /// Forgets `code` for `owner_id`. Used when a replayed record replaces an older one.
    pub fn remove(&mut self, owner_id: &str, code: &ShortCode) {
        if let Some(codes) = self.owners.get_mut(owner_id) {
            codes.retain(|owned| owned != code);
            if codes.is_empty() {
                self.owners.remove(owner_id);
            }
        }
    }

    /// Returns the codes created by `owner_id`, oldest first.
    pub fn codes(&self, owner_id: &str) -> &[ShortCode] {
        self.owners.get(owner_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Filters `requested` down to the codes owned by `owner_id`.
    ///
    /// The result keeps request order and drops duplicates. Codes belonging
    /// to other owners are left out without any signal, so callers cannot
    /// probe for the existence of someone else's code.
    pub fn owned(&self, owner_id: &str, requested: &[ShortCode]) -> Vec<ShortCode> {
        let mine: HashSet<&ShortCode> = self.codes(owner_id).iter().collect();
        let mut seen = HashSet::with_capacity(requested.len());

        requested
            .iter()
            .filter(|code| mine.contains(code) && seen.insert(*code))
            .cloned()
            .collect()
    }

    /// Number of owners with at least one indexed code.
    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }
}
