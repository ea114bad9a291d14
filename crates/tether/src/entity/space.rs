use std::collections::HashMap;

use super::SpaceId;

/// Key/value data of the space the player currently occupies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpaceData {
    space_id: Option<SpaceId>,
    values: HashMap<String, String>,
}

impl SpaceData {
    pub fn space_id(&self) -> Option<SpaceId> {
        self.space_id
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn init(&mut self, space_id: SpaceId, values: impl IntoIterator<Item = (String, String)>) {
        self.space_id = Some(space_id);
        self.values = values.into_iter().collect();
    }

    /// Returns false when the data belongs to a different space.
    pub fn set(&mut self, space_id: SpaceId, key: String, value: String) -> bool {
        if !self.adopt(space_id) {
            return false;
        }
        self.values.insert(key, value);
        true
    }

    pub fn remove(&mut self, space_id: SpaceId, key: &str) -> bool {
        if self.space_id != Some(space_id) {
            return false;
        }
        self.values.remove(key).is_some()
    }

    pub fn clear(&mut self) {
        self.space_id = None;
        self.values.clear();
    }

    fn adopt(&mut self, space_id: SpaceId) -> bool {
        match self.space_id {
            Some(current) => current == space_id,
            None => {
                self.space_id = Some(space_id);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_other_spaces() {
        let mut space = SpaceData::default();
        space.init(3, [("_mapping".to_string(), "spaces/xinshoucun".to_string())]);
        assert!(space.set(3, "weather".into(), "rain".into()));
        assert!(!space.set(4, "weather".into(), "snow".into()));
        assert_eq!(space.get("weather"), Some("rain"));
        assert!(!space.remove(4, "weather"));
        assert!(space.remove(3, "weather"));
        assert_eq!(space.len(), 1);

        space.clear();
        assert_eq!(space.space_id(), None);
        assert!(space.is_empty());
    }
}
