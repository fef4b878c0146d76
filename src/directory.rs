//! Entity directory
//!
//! Supplies the ordered list of entities a run processes. The engine
//! calls `list_all` once per run and never mutates what it gets back.

use crate::config::EntitiesConfig;
use crate::schema::Entity;

pub trait EntityDirectory: Send + Sync {
    /// Ordered, read-only snapshot of every participating entity.
    fn list_all(&self) -> Vec<Entity>;
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    entities: Vec<Entity>,
}

impl StaticDirectory {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    /// `CLIENT-001 .. CLIENT-{count}` with display names `Client 1 ..`.
    pub fn generated(count: usize) -> Self {
        let entities = (1..=count)
            .map(|i| Entity::new(format!("CLIENT-{i:03}"), format!("Client {i}")))
            .collect();
        Self { entities }
    }

    pub fn from_config(cfg: &EntitiesConfig) -> Self {
        match cfg {
            EntitiesConfig::Generate { generate } => Self::generated(*generate),
            EntitiesConfig::List { list } => Self::new(list.clone()),
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

impl EntityDirectory for StaticDirectory {
    fn list_all(&self) -> Vec<Entity> {
        self.entities.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_codes_are_zero_padded_and_ordered() {
        let dir = StaticDirectory::generated(12);
        let all = dir.list_all();

        assert_eq!(all.len(), 12);
        assert_eq!(all[0], Entity::new("CLIENT-001", "Client 1"));
        assert_eq!(all[11].code, "CLIENT-012");
    }

    #[test]
    fn explicit_list_keeps_order() {
        let cfg = EntitiesConfig::List {
            list: vec![Entity::new("B", "Beta"), Entity::new("A", "Alpha")],
        };
        let codes: Vec<_> = StaticDirectory::from_config(&cfg)
            .list_all()
            .into_iter()
            .map(|e| e.code)
            .collect();

        assert_eq!(codes, vec!["B", "A"]);
    }
}
