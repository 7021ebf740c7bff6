//! In-memory todo list and the rules for merging changes into it.

use std::collections::HashSet;

use shared::{
    domain::TodoId,
    protocol::{Todo, TodoChange},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merge {
    Prepended,
    Replaced,
    Removed,
    Unchanged,
}

/// Newest-first list holding each todo id at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoList {
    items: Vec<Todo>,
}

impl TodoList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole list. Duplicate ids keep their first occurrence.
    pub fn replace_all(&mut self, items: Vec<Todo>) {
        let mut seen = HashSet::with_capacity(items.len());
        self.items = items.into_iter().filter(|todo| seen.insert(todo.id)).collect();
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[Todo] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: TodoId) -> Option<&Todo> {
        self.items.iter().find(|todo| todo.id == id)
    }

    fn position(&self, id: TodoId) -> Option<usize> {
        self.items.iter().position(|todo| todo.id == id)
    }

    /// Replaces the entry with the same id in place, or prepends a new one.
    pub fn upsert(&mut self, todo: Todo) -> Merge {
        match self.position(todo.id) {
            Some(index) if self.items[index] == todo => Merge::Unchanged,
            Some(index) => {
                self.items[index] = todo;
                Merge::Replaced
            }
            None => {
                self.items.insert(0, todo);
                Merge::Prepended
            }
        }
    }

    /// Prepends `todo` unless its id is already listed; an existing entry is
    /// never overwritten.
    pub fn insert_if_absent(&mut self, todo: Todo) -> Merge {
        if self.position(todo.id).is_some() {
            return Merge::Unchanged;
        }
        self.items.insert(0, todo);
        Merge::Prepended
    }

    pub fn remove(&mut self, id: TodoId) -> Option<Todo> {
        self.position(id).map(|index| self.items.remove(index))
    }

    /// Sets the flag and returns the previous value, or `None` if the id is absent.
    pub fn set_completed(&mut self, id: TodoId, completed: bool) -> Option<bool> {
        let todo = self.items.iter_mut().find(|todo| todo.id == id)?;
        Some(std::mem::replace(&mut todo.completed, completed))
    }

    /// Applying the same change twice leaves the list as applying it once.
    pub fn apply_change(&mut self, change: TodoChange) -> Merge {
        match change {
            TodoChange::Upserted(todo) => self.upsert(todo),
            TodoChange::Deleted { id, .. } => match self.remove(id) {
                Some(_) => Merge::Removed,
                None => Merge::Unchanged,
            },
        }
    }
}
