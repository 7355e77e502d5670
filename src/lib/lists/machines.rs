use chrono::{DateTime, Utc};

use super::types::{ListState, Listed};
use crate::lib::resources::types::MachineViewModel;

impl Listed for MachineViewModel {
    fn key(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn size(&self) -> Option<u64> {
        Some(self.disk_gb as u64)
    }

    fn search_terms(&self) -> Vec<&str> {
        vec![self.distro.display_name.as_str()]
    }
}

pub type MachineList = ListState<MachineViewModel>;

impl ListState<MachineViewModel> {
    pub fn running_count(&self) -> usize {
        self.items().iter().filter(|m| m.is_running()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::resources::fixtures;

    #[test]
    fn counts_running_machines() {
        let mut list = MachineList::new();
        list.load(fixtures::sample_machines(Utc::now()));
        assert_eq!(list.running_count(), 1);

        list.set_filter("alpine linux");
        assert_eq!(list.visible()[0].name, "alpine-dev");
    }
}
