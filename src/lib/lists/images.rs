use chrono::{DateTime, Utc};

use super::types::{ListState, Listed};
use crate::lib::resources::types::{ImageStats, ImageViewModel, calculate_image_stats};

impl Listed for ImageViewModel {
    fn key(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.repository
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn size(&self) -> Option<u64> {
        Some(self.size_bytes)
    }

    fn search_terms(&self) -> Vec<&str> {
        vec![self.tag.as_str(), self.id.trim_start_matches("sha256:")]
    }
}

/// Image list whose detail pane always shows something once images exist.
#[derive(Debug, Clone, Default)]
pub struct ImageList {
    pub list: ListState<ImageViewModel>,
}

impl ImageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, images: Vec<ImageViewModel>) {
        self.list.load(images);
        if self.list.selected().is_none() {
            if let Some(id) = self.list.items().first().map(|i| i.id.clone()) {
                self.list.select(&id);
            }
        }
    }

    pub fn stats(&self) -> ImageStats {
        calculate_image_stats(self.list.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::resources::fixtures;

    #[test]
    fn first_image_selected_on_load() {
        let mut images = ImageList::new();
        images.load(fixtures::sample_images(Utc::now()));
        assert_eq!(images.list.selected().unwrap().repository, "nginx");

        let redis = images.list.items()[2].id.clone();
        images.list.select(&redis);
        images.load(fixtures::sample_images(Utc::now()));
        assert_eq!(images.list.selected().unwrap().repository, "redis");

        images.load(vec![]);
        assert!(images.list.selected().is_none());
    }

    #[test]
    fn stats_count_unused() {
        let mut images = ImageList::new();
        images.load(fixtures::sample_images(Utc::now()));
        let stats = images.stats();
        assert_eq!(stats.total_count, 7);
        assert_eq!(stats.unused_count, 2);
        assert_eq!(stats.unused_size, 7_800_000 + 320_000_000);
    }

    #[test]
    fn filter_matches_tag_and_id() {
        let mut images = ImageList::new();
        images.load(fixtures::sample_images(Utc::now()));
        images.list.set_filter("alpine");
        // redis:alpine and alpine:3.19
        assert_eq!(images.list.visible().len(), 2);
        images.list.set_filter("9e6b8d");
        assert_eq!(images.list.visible()[0].repository, "alpine");
    }
}
