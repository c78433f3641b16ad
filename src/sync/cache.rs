use indexmap::IndexMap;

use crate::model::{Project, Task, TeamMember};

/// Anything the cache can key by id.
pub trait Entity: Clone {
    fn id(&self) -> u64;
}

impl Entity for Task {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Entity for Project {
    fn id(&self) -> u64 {
        self.id
    }
}

impl Entity for TeamMember {
    fn id(&self) -> u64 {
        self.id
    }
}

/// Ordered local mirror of one entity list. Order is the server's list
/// order, with newly created entities appended.
#[derive(Debug, Clone)]
pub struct EntityCache<T> {
    items: IndexMap<u64, T>,
}

impl<T> Default for EntityCache<T> {
    fn default() -> Self {
        EntityCache {
            items: IndexMap::new(),
        }
    }
}

impl<T: Entity> EntityCache<T> {
    pub fn new() -> Self {
        EntityCache::default()
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items.into_iter().map(|item| (item.id(), item)).collect();
    }

    pub fn get(&self, id: u64) -> Option<&T> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut T> {
        self.items.get_mut(&id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.items.contains_key(&id)
    }

    /// Mutate an entity in place and return its state from before the
    /// mutation. `None` if `id` is not cached.
    pub fn update<F>(&mut self, id: u64, f: F) -> Option<T>
    where
        F: FnOnce(&mut T),
    {
        let item = self.items.get_mut(&id)?;
        let before = item.clone();
        f(item);
        Some(before)
    }

    /// Insert or replace, keeping the position of an existing entry.
    pub fn upsert(&mut self, item: T) {
        self.items.insert(item.id(), item);
    }

    /// Remove an entity, returning its position so it can be restored.
    pub fn remove(&mut self, id: u64) -> Option<(usize, T)> {
        let (index, _, item) = self.items.shift_remove_full(&id)?;
        Some((index, item))
    }

    /// Put an entity back at `index` (clamped to the current length).
    pub fn restore_at(&mut self, index: usize, item: T) {
        let index = index.min(self.items.len());
        self.items.shift_insert(index, item.id(), item);
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskStatus;

    fn cache() -> EntityCache<Task> {
        let mut cache = EntityCache::new();
        cache.replace_all(vec![Task::new(1, "a"), Task::new(2, "b"), Task::new(3, "c")]);
        cache
    }

    fn ids(cache: &EntityCache<Task>) -> Vec<u64> {
        cache.iter().map(|t| t.id).collect()
    }

    #[test]
    fn update_returns_previous_state() {
        let mut cache = cache();
        let before = cache.update(2, |t| t.status = TaskStatus::Done).unwrap();
        assert_eq!(before.status, TaskStatus::Todo);
        assert_eq!(cache.get(2).unwrap().status, TaskStatus::Done);
        assert!(cache.update(9, |_| {}).is_none());
    }

    #[test]
    fn remove_then_restore_keeps_order() {
        let mut cache = cache();
        let (index, task) = cache.remove(2).unwrap();
        assert_eq!(ids(&cache), vec![1, 3]);
        cache.restore_at(index, task);
        assert_eq!(ids(&cache), vec![1, 2, 3]);
    }

    #[test]
    fn restore_past_end_appends() {
        let mut cache = cache();
        let (_, task) = cache.remove(1).unwrap();
        cache.restore_at(10, task);
        assert_eq!(ids(&cache), vec![2, 3, 1]);
    }

    #[test]
    fn upsert_keeps_position() {
        let mut cache = cache();
        cache.upsert(Task::new(1, "renamed"));
        cache.upsert(Task::new(4, "d"));
        assert_eq!(ids(&cache), vec![1, 2, 3, 4]);
        assert_eq!(cache.get(1).unwrap().title, "renamed");
    }
}
