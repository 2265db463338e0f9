//! Storage adapter contract.
//!
//! The editor core consumes this trait; real deployments put a database or
//! filesystem behind it. Whatever a storage method returns is the
//! authoritative persisted form — callers replace their in-memory state
//! with it rather than assuming their input was stored verbatim.

use crate::model::Scheme;
use std::collections::HashMap;

pub trait SchemeStorage {
    /// `Ok(None)` when no scheme has that id.
    fn get_scheme(&self, id: &str) -> Result<Option<Scheme>, String>;

    /// Persist a new scheme; the returned copy carries its assigned id.
    fn create_scheme(&mut self, scheme: Scheme) -> Result<Scheme, String>;

    /// Overwrite an existing scheme. Unknown ids are an error.
    fn save_scheme(&mut self, id: &str, scheme: Scheme) -> Result<Scheme, String>;

    fn delete_scheme(&mut self, id: &str) -> Result<(), String>;

    /// `(id, name)` pairs of all stored schemes, id-sorted.
    fn list_schemes(&self) -> Result<Vec<(String, String)>, String>;
}

/// Keeps schemes in a map. Used by tests and as the local fallback when no
/// backend is configured.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    schemes: HashMap<String, Scheme>,
    next_id: u64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchemeStorage for InMemoryStorage {
    fn get_scheme(&self, id: &str) -> Result<Option<Scheme>, String> {
        Ok(self.schemes.get(id).cloned())
    }

    fn create_scheme(&mut self, mut scheme: Scheme) -> Result<Scheme, String> {
        self.next_id += 1;
        let id = format!("scheme-{}", self.next_id);
        scheme.id = Some(id.clone());
        self.schemes.insert(id, scheme.clone());
        Ok(scheme)
    }

    fn save_scheme(&mut self, id: &str, mut scheme: Scheme) -> Result<Scheme, String> {
        if !self.schemes.contains_key(id) {
            return Err(format!("scheme {id:?} does not exist"));
        }
        scheme.id = Some(id.to_string());
        self.schemes.insert(id.to_string(), scheme.clone());
        Ok(scheme)
    }

    fn delete_scheme(&mut self, id: &str) -> Result<(), String> {
        self.schemes
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| format!("scheme {id:?} does not exist"))
    }

    fn list_schemes(&self) -> Result<Vec<(String, String)>, String> {
        let mut listing: Vec<(String, String)> = self
            .schemes
            .iter()
            .map(|(id, scheme)| (id.clone(), scheme.name.clone()))
            .collect();
        listing.sort();
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::SchemeContainer;
    use crate::geometry::Area;
    use crate::id::ItemId;
    use crate::model::{Item, Shape};

    #[test]
    fn create_assigns_an_id() {
        let mut storage = InMemoryStorage::new();
        let created = storage
            .create_scheme(Scheme {
                name: "first".to_string(),
                ..Scheme::default()
            })
            .unwrap();
        let id = created.id.clone().unwrap();
        let loaded = storage.get_scheme(&id).unwrap().unwrap();
        assert_eq!(loaded.name, "first");
    }

    #[test]
    fn save_requires_existing_id() {
        let mut storage = InMemoryStorage::new();
        assert!(storage.save_scheme("nope", Scheme::default()).is_err());
    }

    #[test]
    fn scheme_survives_save_load_roundtrip() {
        let mut item = Item::new(ItemId::intern("stored"), "Stored", Shape::default());
        item.area = Area::new(5.0, 6.0, 70.0, 80.0);
        item.area.r = 12.0;
        let container = SchemeContainer::from_scheme(Scheme {
            name: "roundtrip".to_string(),
            items: vec![item],
            ..Scheme::default()
        });

        let mut storage = InMemoryStorage::new();
        let created = storage.create_scheme(container.to_scheme()).unwrap();
        let id = created.id.clone().unwrap();
        let loaded = storage.get_scheme(&id).unwrap().unwrap();
        let reloaded = SchemeContainer::from_scheme(loaded);

        assert_eq!(
            serde_json::to_value(created).unwrap()["items"],
            serde_json::to_value(reloaded.to_scheme()).unwrap()["items"],
        );
    }
}
