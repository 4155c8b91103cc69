//! Agent runtime
//!
//! Runs both agents in one process over a shared admission registry. Each
//! agent owns its gateway client, deadline scheduler and long-poll loop, and
//! handles every update on its own task.

use crate::admission::{
    open_db, AdmissionRegistry, AdmissionStateMachine, InMemoryAdmissionRegistry,
    SledAdmissionRegistry,
};
use crate::agent::{AgentIdentity, AgentLabel, AgentRoster};
use crate::arbiter::DutyArbiter;
use crate::clock::{Clock, SystemClock};
use crate::config::DuetConfig;
use crate::coordinator::EventCoordinator;
use crate::error::ApiError;
use crate::gateway::{MessagingGateway, TelegramGateway};
use crate::moderation::ChatSettings;
use crate::presence::PresenceOracle;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Open the admission registry and chat settings.
///
/// Both live in one sled database unless `storage.in_memory` is set.
pub fn open_storage(
    config: &DuetConfig,
) -> Result<(Arc<dyn AdmissionRegistry>, Arc<ChatSettings>), ApiError> {
    let default_anti_link = config.moderation.anti_link;
    if config.storage.in_memory {
        info!("Using in-memory admission registry and chat settings");
        return Ok((
            Arc::new(InMemoryAdmissionRegistry::new()),
            Arc::new(ChatSettings::new(default_anti_link)),
        ));
    }
    let path = config.storage.resolve_registry_path()?;
    info!(path = %path.display(), "Opening admission registry");
    let db = open_db(&path)?;
    let registry = SledAdmissionRegistry::from_db(&db)?;
    let settings = ChatSettings::open(&db, default_anti_link)?;
    Ok((Arc::new(registry), Arc::new(settings)))
}

/// One agent with everything it needs to serve updates
pub struct AgentRuntime {
    identity: AgentIdentity,
    gateway: Arc<TelegramGateway>,
    coordinator: Arc<EventCoordinator>,
}

impl AgentRuntime {
    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn coordinator(&self) -> &Arc<EventCoordinator> {
        &self.coordinator
    }

    /// Long-poll until shutdown is signalled
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let label = self.identity.label;
        let username = self.identity.username.clone();
        let mut offset: Option<i64> = None;

        info!(agent = %label, platform_id = self.identity.platform_id, "Agent polling for updates");
        loop {
            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                polled = self.gateway.poll_updates(offset) => polled,
            };

            let updates = match polled {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(agent = %label, error = %e, "Polling for updates failed");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                let Some(event) = update.into_event(username.as_deref()) else {
                    continue;
                };
                let coordinator = Arc::clone(&self.coordinator);
                tokio::spawn(async move {
                    let kind = event.kind();
                    match coordinator.handle(event).await {
                        Ok(handled) => debug!(agent = %label, kind, ?handled, "Event handled"),
                        Err(e) => error!(agent = %label, kind, error = %e, "Event handling failed"),
                    }
                });
            }
        }
        info!(agent = %label, "Agent stopped polling");
    }

    pub async fn stop(&self) {
        self.coordinator.admissions().stop().await;
    }
}

/// Resolve both identities and assemble the two agents.
///
/// Identity resolution failures are fatal.
pub async fn build_agents(
    config: &DuetConfig,
    registry: Arc<dyn AdmissionRegistry>,
    settings: Arc<ChatSettings>,
    clock: Arc<dyn Clock>,
) -> Result<Vec<AgentRuntime>, ApiError> {
    let gateway_a = Arc::new(TelegramGateway::new(&config.gateway, &config.agents.a.token)?);
    let gateway_b = Arc::new(TelegramGateway::new(&config.gateway, &config.agents.b.token)?);

    let name_a = config.agents.a.display_name(AgentLabel::A);
    let name_b = config.agents.b.display_name(AgentLabel::B);
    let (a, b) = tokio::join!(
        AgentIdentity::resolve(AgentLabel::A, &name_a, gateway_a.as_ref()),
        AgentIdentity::resolve(AgentLabel::B, &name_b, gateway_b.as_ref()),
    );
    let roster = AgentRoster::new(a?, b?)?;
    let policy = config.arbitration.duty_policy();

    let mut agents = Vec::with_capacity(2);
    for (label, gateway) in [(AgentLabel::A, gateway_a), (AgentLabel::B, gateway_b)] {
        let identity = roster.get(label).clone();
        let port: Arc<dyn MessagingGateway> = gateway.clone();

        let arbiter = DutyArbiter::new(
            identity.clone(),
            roster.partner_of(label).clone(),
            PresenceOracle::new(Arc::clone(&port)),
            policy,
        );
        let admissions = AdmissionStateMachine::new(
            label,
            Arc::clone(&port),
            Arc::clone(&registry),
            Arc::clone(&clock),
            config.admission.to_admission_config(),
        );
        admissions.start();

        let coordinator = EventCoordinator::new(
            roster.clone(),
            arbiter,
            admissions,
            port,
            Arc::clone(&clock),
            Arc::clone(&settings),
            config.moderation.owner_id,
        );

        info!(
            agent = %label,
            platform_id = identity.platform_id,
            username = identity.username.as_deref().unwrap_or("-"),
            "Agent ready"
        );
        agents.push(AgentRuntime {
            identity,
            gateway,
            coordinator: Arc::new(coordinator),
        });
    }
    Ok(agents)
}

/// Run both agents until Ctrl-C
pub async fn run(config: DuetConfig) -> Result<(), ApiError> {
    config.validate()?;
    let (registry, settings) = open_storage(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let agents = build_agents(&config, registry, settings, clock).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    futures::future::join_all(agents.iter().map(|agent| agent.run(shutdown_rx.clone()))).await;
    futures::future::join_all(agents.iter().map(|agent| agent.stop())).await;
    signal.abort();

    info!("All agents stopped");
    Ok(())
}
