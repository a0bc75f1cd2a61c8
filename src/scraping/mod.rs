pub mod afas_live;
pub mod base;
pub mod johan_cruijff_arena;
pub mod melkweg;
pub mod paradiso;
pub mod ticketmaster_nl;
pub mod ziggo_dome;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Event, Source};

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("http error: {0}")]
    Http(String),
    #[error("non-success status {status} for {url}")]
    Status { url: String, status: u16 },
}

/// A venue agenda that can be fetched and normalized into events.
///
/// Failures come back as `Err` values; implementations log the cause and never panic.
#[async_trait]
pub trait Connector: Send + Sync {
    fn source(&self) -> Source;
    async fn fetch_events(&self) -> Result<Vec<Event>, ConnectorError>;
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct SourceInfo {
    pub id: String,
    pub name: String,
}

/// The fixed venue registry, built once at startup.
pub fn default_connectors() -> Vec<Arc<dyn Connector>> {
    vec![
        Arc::new(paradiso::Paradiso),
        Arc::new(melkweg::Melkweg),
        Arc::new(afas_live::AfasLive),
        Arc::new(ziggo_dome::ZiggoDome),
        Arc::new(ticketmaster_nl::TicketmasterNl),
        Arc::new(johan_cruijff_arena::JohanCruijffArena),
    ]
}

pub fn list_sources(connectors: &[Arc<dyn Connector>]) -> Vec<SourceInfo> {
    connectors
        .iter()
        .map(|connector| SourceInfo {
            id: connector.source().id().to_string(),
            name: connector.source().display_name().to_string(),
        })
        .collect()
}
