use chrono::{DateTime, Utc};

use super::types::{ListState, Listed};
use crate::lib::resources::types::VolumeViewModel;

impl Listed for VolumeViewModel {
    fn key(&self) -> &str {
        &self.name
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn size(&self) -> Option<u64> {
        self.size_bytes
    }

    fn search_terms(&self) -> Vec<&str> {
        vec![self.driver.as_str()]
    }
}

pub type VolumeList = ListState<VolumeViewModel>;

impl ListState<VolumeViewModel> {
    /// Sum over volumes whose size the daemon reported.
    pub fn total_size(&self) -> u64 {
        self.items().iter().filter_map(|v| v.size_bytes).sum()
    }

    pub fn in_use_count(&self) -> usize {
        self.items().iter().filter(|v| v.in_use).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::resources::fixtures;

    #[test]
    fn total_size_skips_unknown() {
        let mut list = VolumeList::new();
        list.load(fixtures::sample_volumes(Utc::now()));
        assert_eq!(list.total_size(), 245_000_000 + 850_000 + 2_100_000_000);
        assert_eq!(list.in_use_count(), 2);
    }
}
