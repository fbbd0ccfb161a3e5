use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::errors::ServiceError;
use crate::events::{self, Event, EventSender};
use crate::evidence::validate_for_case;
use crate::gateway::{CaseNote, DisputeGateway, HttpDisputeGateway};
use crate::models::{CaseId, DisputeCase, EvidencePackage};
use crate::schema::{parse_requests, ParsedSchema};
use crate::workflow::{spawn_workbench, WorkbenchHandle, WorkbenchSettings};

/// Service for working dispute cases
#[derive(Clone)]
pub struct DisputeService {
    gateway: Arc<dyn DisputeGateway>,
    event_sender: EventSender,
    config: Arc<EngineConfig>,
}

impl DisputeService {
    /// Creates a new dispute service instance
    pub fn new(
        gateway: Arc<dyn DisputeGateway>,
        event_sender: EventSender,
        config: EngineConfig,
    ) -> Self {
        Self {
            gateway,
            event_sender,
            config: Arc::new(config),
        }
    }

    /// Wires the HTTP gateway and an event channel from configuration. The
    /// receiver is handed back for the caller to drain.
    pub fn from_config(config: EngineConfig) -> Result<(Self, mpsc::Receiver<Event>), ServiceError> {
        let gateway = HttpDisputeGateway::new(&config)?;
        let (event_sender, event_rx) = events::channel(config.event_channel_capacity);
        info!(base_url = %config.gateway_base_url, "dispute service configured");
        Ok((Self::new(Arc::new(gateway), event_sender, config), event_rx))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Starts a workbench for one editing session.
    pub fn open_workbench(&self) -> WorkbenchHandle {
        spawn_workbench(
            Arc::clone(&self.gateway),
            self.event_sender.clone(),
            WorkbenchSettings::from_config(&self.config),
        )
    }

    /// Klarna requirements of a case, empty for other vendors.
    pub fn requirements(&self, case: &DisputeCase) -> ParsedSchema {
        parse_requests(case.requests_raw.as_ref())
    }

    /// Runs the vendor rules against a package without opening the case.
    pub fn check_package(
        &self,
        case: &DisputeCase,
        package: &EvidencePackage,
    ) -> Result<(), ServiceError> {
        validate_for_case(case, package, self.config.note_max_chars)
    }

    /// Notes for the case detail view.
    #[instrument(skip(self))]
    pub async fn case_notes(&self, case_id: &CaseId) -> Result<Vec<CaseNote>, ServiceError> {
        let detail = self.gateway.get_case_detail(case_id).await?;
        Ok(detail.notes)
    }
}
