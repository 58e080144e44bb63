//! One CRM client: the resolver, guard, association pipeline, and writer
//! built over a single [`CrmApi`] and sharing one [`ErrorLog`].

use std::sync::Arc;
use std::time::Duration;

use cdr_sync_core::crm::CrmApi;

use crate::associations::AssociationPipeline;
use crate::config::HubspotConfig;
use crate::engagement::EngagementWriter;
use crate::error_log::ErrorLog;
use crate::guard::DuplicateGuard;
use crate::resolver::ContactResolver;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub search_delay: Duration,
    pub association_batch_size: usize,
    pub source_label: String,
}

impl ClientSettings {
    pub fn from_config(config: &HubspotConfig) -> Self {
        Self {
            search_delay: Duration::from_millis(config.search_delay_ms),
            association_batch_size: config.association_batch_size,
            source_label: config.source_label.clone(),
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self::from_config(&HubspotConfig::default())
    }
}

#[derive(Clone)]
pub struct CrmClient {
    pub resolver: ContactResolver,
    pub guard: DuplicateGuard,
    pub associations: AssociationPipeline,
    pub writer: EngagementWriter,
    log: ErrorLog,
}

impl CrmClient {
    pub fn new(crm: Arc<dyn CrmApi>, settings: &ClientSettings) -> Self {
        let log = ErrorLog::new();
        let resolver = ContactResolver::new(crm.clone(), settings.search_delay, log.clone());
        let guard = DuplicateGuard::new(crm.clone(), log.clone());
        let associations = AssociationPipeline::new(crm.clone(), settings.association_batch_size);
        let writer = EngagementWriter::new(
            crm,
            resolver.clone(),
            guard.clone(),
            associations.clone(),
            settings.source_label.clone(),
            log.clone(),
        );
        Self {
            resolver,
            guard,
            associations,
            writer,
            log,
        }
    }

    pub fn error_log(&self) -> &ErrorLog {
        &self.log
    }
}
