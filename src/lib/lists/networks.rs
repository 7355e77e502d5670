use chrono::{DateTime, Utc};

use super::types::{ListState, Listed};
use crate::lib::resources::types::NetworkViewModel;

impl Listed for NetworkViewModel {
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
        vec![self.driver.as_str()]
    }
}

pub type NetworkList = ListState<NetworkViewModel>;

impl ListState<NetworkViewModel> {
    /// Networks the user created, leaving out bridge/host/none.
    pub fn custom(&self) -> Vec<&NetworkViewModel> {
        self.items().iter().filter(|n| !n.is_system()).collect()
    }
}
