use std::collections::HashMap;

use super::EntityId;

const ALIAS_SLOTS: usize = u8::MAX as usize + 1;

/// One-byte entity aliases, dense from zero, lowest free slot first.
#[derive(Debug, Clone)]
pub struct AliasTable {
    slots: Vec<Option<EntityId>>,
    by_id: HashMap<EntityId, u8>,
}

impl Default for AliasTable {
    fn default() -> Self {
        Self {
            slots: vec![None; ALIAS_SLOTS],
            by_id: HashMap::new(),
        }
    }
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Already aliased ids keep their alias.
    pub fn assign(&mut self, id: EntityId) -> Option<u8> {
        if let Some(alias) = self.by_id.get(&id) {
            return Some(*alias);
        }
        let slot = self.slots.iter().position(Option::is_none)?;
        let alias = slot as u8;
        self.slots[slot] = Some(id);
        self.by_id.insert(id, alias);
        Some(alias)
    }

    pub fn release(&mut self, id: EntityId) -> Option<u8> {
        let alias = self.by_id.remove(&id)?;
        self.slots[alias as usize] = None;
        Some(alias)
    }

    pub fn resolve(&self, alias: u8) -> Option<EntityId> {
        self.slots[alias as usize]
    }

    pub fn alias_of(&self, id: EntityId) -> Option<u8> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reuses_lowest_free_alias() {
        let mut table = AliasTable::new();
        assert_eq!(table.assign(100), Some(0));
        assert_eq!(table.assign(200), Some(1));
        assert_eq!(table.assign(300), Some(2));
        assert_eq!(table.assign(200), Some(1));

        assert_eq!(table.release(100), Some(0));
        assert_eq!(table.resolve(0), None);
        assert_eq!(table.assign(400), Some(0));
        assert_eq!(table.resolve(0), Some(400));
        assert_eq!(table.alias_of(300), Some(2));
    }

    #[test]
    fn exhausts_after_256() {
        let mut table = AliasTable::new();
        for id in 0..256 {
            assert_eq!(table.assign(id), Some(id as u8));
        }
        assert_eq!(table.assign(1000), None);
        table.release(7);
        assert_eq!(table.assign(1000), Some(7));
    }
}
