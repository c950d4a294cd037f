//! Task selection filters.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filter terms used to pick the initial task set for graph traversals.
/// Terms are combined with union semantics: a task matching any term is
/// selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub task_ids: Vec<Uuid>,
    pub task_tags: Vec<String>,
    pub app_ids: Vec<Uuid>,
    pub app_tags: Vec<String>,
}

impl TaskFilter {
    /// An empty filter selects every task.
    pub fn is_empty(&self) -> bool {
        self.task_ids.is_empty()
            && self.task_tags.is_empty()
            && self.app_ids.is_empty()
            && self.app_tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        assert!(TaskFilter::default().is_empty());
        let filter = TaskFilter {
            task_tags: vec!["finance".to_string()],
            ..Default::default()
        };
        assert!(!filter.is_empty());
    }
}
