use std::cmp::Ordering;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    Name,
    Size,
    Created,
}

/// A resource that can be shown in a selectable, filterable list.
pub trait Listed: Clone {
    /// Stable identity used for selection.
    fn key(&self) -> &str;
    fn name(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;

    fn size(&self) -> Option<u64> {
        None
    }

    /// Extra text the filter matches against besides the name.
    fn search_terms(&self) -> Vec<&str> {
        vec![]
    }

    fn matches(&self, filter: &str) -> bool {
        let needle = filter.to_lowercase();
        std::iter::once(self.name())
            .chain(self.search_terms())
            .any(|term| term.to_lowercase().contains(&needle))
    }
}

#[derive(Debug, Clone)]
pub struct ListState<T: Listed> {
    items: Vec<T>,
    selected: Option<String>,
    filter: String,
    sort: Option<(SortKey, bool)>,
}

impl<T: Listed> Default for ListState<T> {
    fn default() -> Self {
        ListState {
            items: vec![],
            selected: None,
            filter: String::new(),
            sort: None,
        }
    }
}

impl<T: Listed> ListState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the items. The selection survives if its item is still present.
    pub fn load(&mut self, items: Vec<T>) {
        self.items = items;
        if let Some(key) = &self.selected {
            if !self.items.iter().any(|item| item.key() == key) {
                self.selected = None;
            }
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.items.iter().find(|item| item.key() == key)
    }

    /// Returns false when no item has the given key.
    pub fn select(&mut self, key: &str) -> bool {
        if self.get(key).is_some() {
            self.selected = Some(key.to_string());
            true
        } else {
            false
        }
    }

    pub fn selected(&self) -> Option<&T> {
        self.selected.as_deref().and_then(|key| self.get(key))
    }

    pub fn selected_key(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Sorts by `key`; sorting by the current key again flips the direction.
    pub fn sort_by(&mut self, key: SortKey) {
        self.sort = match self.sort {
            Some((current, ascending)) if current == key => Some((key, !ascending)),
            _ => Some((key, true)),
        };
    }

    pub fn sort(&self) -> Option<(SortKey, bool)> {
        self.sort
    }

    pub fn visible(&self) -> Vec<&T> {
        let filter = self.filter.trim();
        let mut visible: Vec<&T> = self
            .items
            .iter()
            .filter(|item| filter.is_empty() || item.matches(filter))
            .collect();

        if let Some((key, ascending)) = self.sort {
            visible.sort_by(|a, b| {
                let ordering = compare(*a, *b, key);
                if ascending { ordering } else { ordering.reverse() }
            });
        }
        visible
    }
}

fn compare<T: Listed>(a: &T, b: &T, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name().to_lowercase().cmp(&b.name().to_lowercase()),
        SortKey::Size => a.size().cmp(&b.size()),
        SortKey::Created => a.created_at().cmp(&b.created_at()),
    }
}
