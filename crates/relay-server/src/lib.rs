//! Stream Relay Server Library
//!
//! This module exposes the server components for testing and embedding.

pub mod api;
pub mod config;
pub mod error;
pub mod relay;
pub mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use relay_media::TransportFactory;

use crate::relay::{RelayService, SessionRegistry};

/// Create and configure the server application with the built-in transports.
///
/// Must be called from within a tokio runtime; the relay service's reaper is
/// spawned here.
pub fn create_app(config: config::Config) -> Result<(axum::Router, Arc<RelayService>)> {
    create_app_with(config, &TransportFactory::with_defaults())
}

/// Like [`create_app`], picking the transport from `factory`
pub fn create_app_with(
    config: config::Config,
    factory: &TransportFactory,
) -> Result<(axum::Router, Arc<RelayService>)> {
    let transport = factory.create(&config.relay.transport)?;
    let first_sink = format!("{}/0", config.relay.media_host.trim_end_matches('/'));
    transport.check_sink_url(&first_sink).with_context(|| {
        format!(
            "media host {} cannot be written by the {} transport",
            config.relay.media_host,
            transport.name()
        )
    })?;
    tracing::info!(
        transport = transport.name(),
        media_host = %config.relay.media_host,
        "Relay transport ready"
    );

    let registry = Arc::new(SessionRegistry::new(
        transport,
        config.relay.media_host.clone(),
        config.relay.worker_config(),
    ));
    let relay = RelayService::start(registry, config.relay.replay_delay());
    let app_state = state::AppState::new(relay.clone());
    let router = api::create_router(app_state);
    Ok((router, relay))
}
