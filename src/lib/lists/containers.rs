use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::types::{ListState, Listed};
use crate::lib::resources::types::{ComposeGroups, ContainerViewModel, group_by_compose};

impl Listed for ContainerViewModel {
    fn key(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn search_terms(&self) -> Vec<&str> {
        let mut terms = vec![self.image.as_str()];
        if let Some(project) = &self.compose_project {
            terms.push(project);
        }
        terms
    }
}

/// Container list with collapsible compose project groups.
#[derive(Debug, Clone, Default)]
pub struct ContainerList {
    pub list: ListState<ContainerViewModel>,
    collapsed: HashSet<String>,
}

impl ContainerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loading expands every group again.
    pub fn load(&mut self, containers: Vec<ContainerViewModel>) {
        self.list.load(containers);
        self.collapsed.clear();
    }

    pub fn toggle_group(&mut self, project: &str) {
        if !self.collapsed.remove(project) {
            self.collapsed.insert(project.to_string());
        }
    }

    pub fn is_expanded(&self, project: &str) -> bool {
        !self.collapsed.contains(project)
    }

    pub fn running_count(&self) -> usize {
        self.list.items().iter().filter(|c| c.is_running()).count()
    }

    /// Visible containers grouped by compose project.
    pub fn groups(&self) -> ComposeGroups<'_> {
        group_by_compose(self.list.visible())
    }
}
