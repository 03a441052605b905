//! Visibility-filtered entity queries.
//!
//! These bypass the event store entirely and read the precomputed
//! `visible_to_user_ids` sets on the views.

use std::sync::Arc;

use sales_intel_core::error::Result;

use crate::store::{
    ActivityFilter, ActivityView, ActivityViewStore, OpportunityView, OpportunityViewStore,
};

pub struct VisibilityQueries {
    opportunities: Arc<dyn OpportunityViewStore>,
    activities: Arc<dyn ActivityViewStore>,
}

impl VisibilityQueries {
    pub fn new(
        opportunities: Arc<dyn OpportunityViewStore>,
        activities: Arc<dyn ActivityViewStore>,
    ) -> Self {
        Self {
            opportunities,
            activities,
        }
    }

    /// Active opportunities the user may read.
    pub async fn opportunities_visible_to(&self, user_id: &str) -> Result<Vec<OpportunityView>> {
        self.opportunities.visible_to(user_id).await
    }

    /// Active activities the user may read, filtered.
    pub async fn activities_visible_to(
        &self,
        user_id: &str,
        filter: &ActivityFilter,
    ) -> Result<Vec<ActivityView>> {
        self.activities.visible_to(user_id, filter).await
    }
}
