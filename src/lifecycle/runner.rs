//! Run loop driver.

use crate::config::RunnerConfig;
use crate::error::ServerError;
use crate::lifecycle::signals::RunningFlag;
use crate::resilience::backoff_delay;
use crate::server::Server;

/// Totals of a finished run loop.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub io_errors: u64,
}

/// Iterate `server` until `flag` is cleared, then shut it down.
///
/// I/O errors are retried with backoff; once more than
/// `max_consecutive_io_errors` happen in a row the loop aborts with the last
/// one. `shutdown` is called exactly once on every exit path where the server
/// was active.
pub async fn run(server: &mut Server, flag: &RunningFlag, config: &RunnerConfig) -> Result<RunSummary, ServerError> {
    let mut summary = RunSummary::default();
    let mut consecutive_errors = 0u32;

    let outcome = loop {
        if !flag.is_running() {
            break Ok(());
        }
        match server.iterate(true).await {
            Ok(_) => {
                summary.iterations += 1;
                consecutive_errors = 0;
            }
            Err(ServerError::Io(e)) => {
                summary.io_errors += 1;
                consecutive_errors += 1;
                if consecutive_errors > config.max_consecutive_io_errors {
                    tracing::error!(
                        error = %e,
                        consecutive_errors,
                        "Too many consecutive I/O errors, aborting run loop"
                    );
                    break Err(ServerError::Io(e));
                }
                let delay = backoff_delay(consecutive_errors, config);
                tracing::warn!(error = %e, consecutive_errors, delay = ?delay, "Iteration failed, backing off");
                tokio::time::sleep(delay).await;
            }
            Err(e) => break Err(e),
        }
    };

    tracing::info!(
        iterations = summary.iterations,
        io_errors = summary.io_errors,
        "Run loop finished"
    );

    let shutdown = if server.state().is_active() {
        server.shutdown()
    } else {
        Ok(())
    };
    outcome?;
    shutdown?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::server::ServerState;
    use std::time::Duration;

    fn test_config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.endpoints = vec!["opc.tcp://127.0.0.1:0/".to_string()];
        config.scheduler.clock_interval_ms = 0;
        config
    }

    #[tokio::test]
    async fn cleared_flag_still_shuts_down() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();

        let flag = RunningFlag::new();
        flag.stop();
        let summary = run(&mut server, &flag, &RunnerConfig::default()).await.unwrap();

        assert_eq!(summary, RunSummary::default());
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_clearing_flag_ends_loop() {
        let mut server = Server::new(test_config());
        server.create().await.unwrap();

        let flag = RunningFlag::new();
        let stopper = flag.clone();
        server
            .add_timed_callback(
                tokio::time::Instant::now() + Duration::from_millis(120),
                move |_: &mut crate::address_space::AddressSpace| stopper.stop(),
            )
            .unwrap();

        let summary = run(&mut server, &flag, &RunnerConfig::default()).await.unwrap();
        assert!(summary.iterations >= 1);
        assert_eq!(summary.io_errors, 0);
        assert_eq!(server.state(), ServerState::Stopped);
    }

    #[tokio::test]
    async fn uncreated_server_is_reported() {
        let mut server = Server::new(test_config());
        let result = run(&mut server, &RunningFlag::new(), &RunnerConfig::default()).await;
        assert!(matches!(result, Err(ServerError::InvalidState { .. })));
        assert_eq!(server.state(), ServerState::Uninitialized);
    }
}
