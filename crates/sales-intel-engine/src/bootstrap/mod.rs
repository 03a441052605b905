//! Application wiring.
//!
//! [`Backbone`] constructs the whole engine with injected dependencies:
//! stores, event store, event bus, projections (subscriptions wired),
//! command handlers and the query surface. The bus and stores are
//! lifecycle-managed values created here once and shared by `Arc`;
//! nothing reaches for ambient globals.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use sales_intel_core::config::SyncSettings;

use crate::events::{EventBus, EventStore, InMemoryEventStore};
use crate::odoo::connector::SourceConnector;
use crate::projections::{
    AccessMatrixProjection, ActivityViewProjection, DashboardMetricsProjection,
    OpportunityViewProjection, ProjectionRuntime, UserProfileProjection,
};
use crate::queries::{AccessQueries, DashboardQueries, HealthQueries, VisibilityQueries};
use crate::store::{
    AccessMatrixStore, ActivityViewStore, DashboardMetricsStore, InMemoryAccessMatrixStore,
    InMemoryActivityViewStore, InMemoryDashboardMetricsStore, InMemoryOpportunityViewStore,
    InMemoryRawStore, InMemorySyncJobStore, InMemoryUserProfileStore, OpportunityViewStore,
    RawStore, SyncJobStore, UserProfileStore,
};
use crate::sync::{Commands, SyncHandler, SyncService};

/// Initialise structured logging. `RUST_LOG` controls the filter, `info`
/// is the default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// The fully wired engine.
pub struct Backbone {
    pub settings: SyncSettings,
    pub raw_store: Arc<dyn RawStore>,
    pub event_store: Arc<dyn EventStore>,
    pub bus: Arc<EventBus>,
    pub profiles: Arc<dyn UserProfileStore>,
    pub opportunities: Arc<dyn OpportunityViewStore>,
    pub activities: Arc<dyn ActivityViewStore>,
    pub matrices: Arc<dyn AccessMatrixStore>,
    pub metrics: Arc<dyn DashboardMetricsStore>,
    pub jobs: Arc<dyn SyncJobStore>,
    pub runtime: ProjectionRuntime,
    pub access_projection: Arc<AccessMatrixProjection>,
    pub metrics_projection: Arc<DashboardMetricsProjection>,
    pub sync_handler: Arc<SyncHandler>,
    pub commands: Arc<Commands>,
    pub access_queries: Arc<AccessQueries>,
    pub dashboard_queries: Arc<DashboardQueries>,
    pub visibility: Arc<VisibilityQueries>,
    pub health: Arc<HealthQueries>,
}

impl Backbone {
    /// Build the engine on the in-memory store drivers and wire every
    /// projection to the bus.
    pub async fn in_memory(settings: SyncSettings) -> Self {
        let raw_store: Arc<dyn RawStore> = Arc::new(InMemoryRawStore::new());
        let event_store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let bus = Arc::new(EventBus::new());
        let profiles: Arc<dyn UserProfileStore> = Arc::new(InMemoryUserProfileStore::new());
        let opportunities: Arc<dyn OpportunityViewStore> =
            Arc::new(InMemoryOpportunityViewStore::new());
        let activities: Arc<dyn ActivityViewStore> = Arc::new(InMemoryActivityViewStore::new());
        let matrices: Arc<dyn AccessMatrixStore> =
            Arc::new(InMemoryAccessMatrixStore::new(settings.view_expiry));
        let metrics: Arc<dyn DashboardMetricsStore> =
            Arc::new(InMemoryDashboardMetricsStore::new(settings.view_expiry));
        let jobs: Arc<dyn SyncJobStore> = Arc::new(InMemorySyncJobStore::new());

        let user_profile_projection = Arc::new(UserProfileProjection::new(profiles.clone()));
        let opportunity_projection = Arc::new(OpportunityViewProjection::new(
            opportunities.clone(),
            profiles.clone(),
            raw_store.clone(),
        ));
        let activity_projection = Arc::new(ActivityViewProjection::new(
            activities.clone(),
            opportunities.clone(),
            profiles.clone(),
        ));
        let access_projection = Arc::new(AccessMatrixProjection::new(
            matrices.clone(),
            profiles.clone(),
            opportunities.clone(),
            event_store.clone(),
        ));
        let metrics_projection = Arc::new(DashboardMetricsProjection::new(
            metrics.clone(),
            matrices.clone(),
            profiles.clone(),
            opportunities.clone(),
            event_store.clone(),
        ));

        let mut runtime = ProjectionRuntime::new(event_store.clone());
        runtime.register(user_profile_projection);
        runtime.register(opportunity_projection);
        runtime.register(activity_projection);
        runtime.register(access_projection.clone());
        runtime.register(metrics_projection.clone());
        runtime.wire_subscriptions(&bus).await;

        let sync_handler = Arc::new(SyncHandler::new(
            raw_store.clone(),
            event_store.clone(),
            bus.clone(),
            settings.clone(),
        ));
        let commands = Arc::new(Commands::new(
            event_store.clone(),
            bus.clone(),
            raw_store.clone(),
            profiles.clone(),
        ));

        let access_queries = Arc::new(AccessQueries::new(
            matrices.clone(),
            access_projection.clone(),
            settings.view_freshness,
        ));
        let dashboard_queries = Arc::new(DashboardQueries::new(
            metrics.clone(),
            metrics_projection.clone(),
            access_queries.clone(),
            settings.view_freshness,
        ));
        let visibility = Arc::new(VisibilityQueries::new(
            opportunities.clone(),
            activities.clone(),
        ));
        let health = Arc::new(HealthQueries::new(
            event_store.clone(),
            profiles.clone(),
            opportunities.clone(),
            activities.clone(),
            matrices.clone(),
            metrics.clone(),
            jobs.clone(),
        ));

        Self {
            settings,
            raw_store,
            event_store,
            bus,
            profiles,
            opportunities,
            activities,
            matrices,
            metrics,
            jobs,
            runtime,
            access_projection,
            metrics_projection,
            sync_handler,
            commands,
            access_queries,
            dashboard_queries,
            visibility,
            health,
        }
    }

    /// Sync service bound to a source connector.
    pub fn sync_service(&self, connector: Arc<dyn SourceConnector>) -> SyncService {
        SyncService::new(self.jobs.clone(), self.sync_handler.clone(), connector)
    }
}
