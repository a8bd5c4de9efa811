use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::{parse_id, Activity, SlotCorrection};
use crate::repository::ActivityRepository;
use crate::search::{ActivityPage, ActivityQuery, Pagination};
use crate::{CoreError, CoreResult};

/// Read side of the activity catalog, plus slot reconciliation.
pub struct ActivityService {
    repo: Arc<dyn ActivityRepository>,
}

impl ActivityService {
    pub fn new(repo: Arc<dyn ActivityRepository>) -> Self {
        Self { repo }
    }

    pub async fn list_activities(&self, query: &ActivityQuery) -> CoreResult<ActivityPage> {
        let (activities, total) = self
            .repo
            .list_activities(query)
            .await
            .map_err(CoreError::internal)?;
        let pagination = Pagination::new(query, activities.len(), total);
        Ok(ActivityPage { activities, pagination })
    }

    pub async fn get_activity(&self, raw_id: &str) -> CoreResult<Activity> {
        if raw_id.trim().is_empty() {
            return Err(CoreError::validation("Activity ID is required"));
        }
        let id = parse_id(raw_id, "activity")?;
        self.repo
            .get_activity(id)
            .await
            .map_err(CoreError::internal)?
            .ok_or_else(|| CoreError::not_found("Activity not found"))
    }

    pub async fn count_activities(&self) -> CoreResult<i64> {
        self.repo.count_activities().await.map_err(CoreError::internal)
    }

    /// Recomputes `available_slots` from capacity and booking counts.
    pub async fn reconcile_slots(&self) -> CoreResult<Vec<SlotCorrection>> {
        let corrections = self.repo.reconcile_slots().await.map_err(CoreError::internal)?;
        for c in &corrections {
            warn!(
                "Slot counter drift on activity {}: recorded {}, corrected to {}",
                c.activity_id, c.recorded, c.corrected
            );
        }
        if corrections.is_empty() {
            debug!("Slot reconciliation found no drift");
        }
        Ok(corrections)
    }
}
