//! Terminal subsystem wiring.
//!
//! One-time initialization and teardown of the terminal stack: configuration
//! in, session manager plus gateway out. Outer subsystems (the WebSocket
//! server, observability endpoints) talk to the gateway and to `stats()`;
//! nothing here is process-global.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::bridge::TerminalGateway;
use crate::config::TerminalConfig;
use crate::session::{ManagerStats, TerminalManager};

/// The assembled terminal subsystem.
pub struct TerminalSubsystem {
    manager: Arc<TerminalManager>,
    gateway: Arc<TerminalGateway>,
}

impl TerminalSubsystem {
    /// Builds the subsystem from configuration and starts the idle sweeper.
    ///
    /// Fails when the subsystem is disabled in configuration. A sweep
    /// interval of zero leaves the sweeper off; expired sessions are then
    /// only reclaimed by explicit `sweep_expired` calls.
    pub fn init(config: &TerminalConfig) -> Result<Self> {
        anyhow::ensure!(config.enabled, "terminal subsystem is disabled");

        let manager = Arc::new(TerminalManager::new(
            config.max_sessions,
            config.idle_timeout(),
        ));

        if let Some(interval) = config.sweep_interval() {
            manager.start_sweeper(interval);
        }

        let gateway = Arc::new(TerminalGateway::new(Arc::clone(&manager), config));

        info!(
            max_sessions = config.max_sessions,
            idle_timeout_secs = config.idle_timeout_secs,
            shell = %config.shell_command,
            "Terminal subsystem initialized"
        );

        Ok(Self { manager, gateway })
    }

    /// Returns the gateway consumed by the WebSocket server.
    pub fn gateway(&self) -> Arc<TerminalGateway> {
        Arc::clone(&self.gateway)
    }

    /// Returns the session manager.
    pub fn manager(&self) -> Arc<TerminalManager> {
        Arc::clone(&self.manager)
    }

    /// Returns session counts for observability endpoints.
    pub fn stats(&self) -> ManagerStats {
        self.manager.stats()
    }

    /// Tears the subsystem down: stops the sweeper and every session.
    pub async fn shutdown(&self) {
        let removed = self.manager.shutdown().await;
        info!(removed = removed, "Terminal subsystem shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TerminalConfig;

    fn test_config() -> TerminalConfig {
        TerminalConfig {
            shell_command: "/bin/sh".to_string(),
            max_sessions: 2,
            idle_timeout_secs: 0,
            sweep_interval_secs: 0,
            ..TerminalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_init_and_shutdown() {
        let subsystem = TerminalSubsystem::init(&test_config()).unwrap();
        assert_eq!(subsystem.stats().active, 0);
        assert_eq!(subsystem.stats().max, 2);

        let session = subsystem
            .manager()
            .create_session("/bin/sh", 24, 80)
            .await
            .unwrap();
        assert_eq!(subsystem.stats().active, 1);
        assert!(session.is_active());

        subsystem.shutdown().await;
        assert_eq!(subsystem.stats().active, 0);
    }

    #[tokio::test]
    async fn test_init_rejects_disabled_subsystem() {
        let config = TerminalConfig {
            enabled: false,
            ..test_config()
        };
        assert!(TerminalSubsystem::init(&config).is_err());
    }
}
