//! Client facade: owns configuration, HTTP client and schema cache, and hands out bulk
//! collections that share them.

use std::sync::Arc;

use crate::bulk::{
    BulkCollection, BulkEvents, BulkRecord, BulkUsersEdit, BulkWorkflowTrigger, Event, RecordContext, WorkflowTriggerRequest,
    admit,
};
use crate::bulk_response::ChunkResult;
use crate::config::ClientConfig;
use crate::errors::Result;
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::schema::SchemaCache;
use crate::sender::{ChunkSender, ResponseMode};

/// Entry point for workflow triggers, event tracking and bulk user edits.
///
/// # Example
/// ```ignore
/// let client = Suprsend::new("workspace_key", "workspace_secret")?;
/// let mut bulk = client.bulk_events();
/// bulk.append(events)?;
/// let response = bulk.trigger().await?;
/// println!("{response}");
/// ```
#[derive(Clone)]
pub struct Suprsend<C: HttpClient = ReqwestHttpClient> {
    config: Arc<ClientConfig>,
    schemas: Arc<SchemaCache>,
    client: C,
}

impl Suprsend<ReqwestHttpClient> {
    /// Client for the default base URL.
    pub fn new(workspace_key: impl Into<String>, workspace_secret: impl Into<String>) -> Result<Self> {
        Self::from_config(ClientConfig::new(workspace_key, workspace_secret))
    }

    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let client = ReqwestHttpClient::from_config(&config)?;
        Self::with_client(config, client)
    }
}

impl<C: HttpClient> Suprsend<C> {
    /// Client over any [`HttpClient`] implementation. The config is normalized and validated.
    pub fn with_client(config: ClientConfig, client: C) -> Result<Self> {
        let config = config.normalized()?;
        tracing::debug!(base_url = %config.base_url, "Client created");
        Ok(Self {
            config: Arc::new(config),
            schemas: Arc::new(SchemaCache::new()),
            client,
        })
    }

    /// Share an existing schema cache instead of the client's own.
    pub fn with_schema_cache(mut self, schemas: Arc<SchemaCache>) -> Self {
        self.schemas = schemas;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn schemas(&self) -> &Arc<SchemaCache> {
        &self.schemas
    }

    fn collection<R: BulkRecord>(&self) -> BulkCollection<R, C> {
        BulkCollection::new(Arc::clone(&self.config), Arc::clone(&self.schemas), self.client.clone())
    }

    pub fn bulk_workflows(&self) -> BulkWorkflowTrigger<C> {
        self.collection()
    }

    pub fn bulk_events(&self) -> BulkEvents<C> {
        self.collection()
    }

    pub fn bulk_users(&self) -> BulkUsersEdit<C> {
        self.collection()
    }

    /// Trigger one workflow.
    ///
    /// Invalid or oversized requests are returned as `Err`; delivery outcomes, including
    /// transport failures, come back as a [`ChunkResult`].
    pub async fn trigger_workflow(&self, request: &WorkflowTriggerRequest) -> Result<ChunkResult> {
        self.send_single(request).await
    }

    /// Track one event. Same error contract as [`trigger_workflow`](Self::trigger_workflow).
    pub async fn track_event(&self, event: &Event) -> Result<ChunkResult> {
        self.send_single(event).await
    }

    async fn send_single<R: BulkRecord>(&self, record: &R) -> Result<ChunkResult> {
        let ctx = RecordContext {
            config: &self.config,
            schemas: &self.schemas,
        };
        let limits = R::limits(&self.config.limits);
        let admitted = admit(record, 0, &ctx, &limits, false)?;

        let sender = ChunkSender::new(
            self.client.clone(),
            Arc::clone(&self.config),
            R::endpoint(&self.config.base_url),
            ResponseMode::AllOrNothing,
        );
        Ok(sender.send_one(&admitted.payload).await)
    }
}
