//! Authentication manager: drives the device-activation handshake to
//! completion, retrying forever at the error interval until the operator
//! either completes the login or interrupts the process.

use log::{error, info, warn};

use crate::client::{TadoApi, TadoClient, TadoClientError};
use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::models::tado::DeviceActivationStatus;
use crate::token::TokenStore;

/// Authenticate against the Tado API, blocking until a ready client exists.
///
/// Returns `None` only when the user interrupts; every other failure is
/// logged and retried after `ERROR_RETRY_INTERVAL`.
pub fn authenticate(cfg: &Config, store: &TokenStore, interrupt: &Interrupt) -> Option<TadoClient> {
    let retry_secs = cfg.error_retry_interval.as_secs_f64();
    loop {
        if interrupt.interrupted() {
            info!("Authentication interrupted by user.");
            return None;
        }

        if !store.exists() {
            info!("No token file found. Starting authentication process...");
        }

        let client = match TadoClient::new(store.clone(), interrupt.clone()) {
            Ok(client) => client,
            Err(TadoClientError::Interrupted) => {
                info!("Authentication interrupted by user.");
                return None;
            }
            Err(e) => {
                error!("Login error: {}. Retrying in {} seconds...", e, retry_secs);
                if !interrupt.sleep(cfg.error_retry_interval) {
                    info!("Authentication interrupted by user.");
                    return None;
                }
                continue;
            }
        };

        match activation_step(&client) {
            Ok(DeviceActivationStatus::Completed) => {
                info!("Login successful.");
                return Some(client);
            }
            Ok(status) => {
                warn!(
                    "Login failed. Current status: {}. Retrying in {} seconds...",
                    status, retry_secs
                );
            }
            Err(TadoClientError::Interrupted) => {
                info!("Authentication interrupted by user.");
                return None;
            }
            Err(e) => {
                error!("Login error: {}. Retrying in {} seconds...", e, retry_secs);
            }
        }

        if !interrupt.sleep(cfg.error_retry_interval) {
            info!("Authentication interrupted by user.");
            return None;
        }
    }
}

/// One activation attempt: on PENDING, surface the verification URL to the
/// operator (stdout, once per observation), run the blocking activation step
/// and re-query. Returns the final status for the caller to judge.
pub fn activation_step<C: TadoApi>(client: &C) -> Result<DeviceActivationStatus, TadoClientError> {
    let mut status = client.device_activation_status();
    if status == DeviceActivationStatus::Pending {
        println!("Please visit the following URL to authenticate:");
        if let Some(url) = client.device_verification_url() {
            println!("{}", url);
        }
        client.device_activation()?;
        status = client.device_activation_status();
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tado::DeviceActivationStatus::{Completed, NotStarted, Pending};
    use crate::services::fake::{ApiCall, FakeTado};

    #[test]
    fn already_completed_needs_no_activation() {
        let fake = FakeTado::new().statuses(&[Completed]);
        assert_eq!(activation_step(&fake).expect("step ok"), Completed);
        assert!(!fake.calls().contains(&ApiCall::DeviceActivation));
    }

    #[test]
    fn pending_runs_activation_then_requeries() {
        let fake = FakeTado::new()
            .statuses(&[Pending, Completed])
            .verification_url("https://login.tado.com/verify/ABC123");
        assert_eq!(activation_step(&fake).expect("step ok"), Completed);
        assert_eq!(fake.calls(), vec![ApiCall::DeviceActivation]);
    }

    #[test]
    fn status_sequence_ending_in_completed_terminates() {
        let fake = FakeTado::new().statuses(&[NotStarted, NotStarted, Completed]);
        let mut steps = 0;
        loop {
            steps += 1;
            assert!(steps <= 10, "should have completed within the sequence");
            if activation_step(&fake).expect("step ok") == Completed {
                break;
            }
        }
        assert_eq!(steps, 3);
    }

    #[test]
    fn status_never_completing_never_reports_success() {
        let fake = FakeTado::new().statuses(&[NotStarted]);
        for _ in 0..25 {
            assert_ne!(activation_step(&fake).expect("step ok"), Completed);
        }
    }

    #[test]
    fn activation_errors_propagate() {
        let fake = FakeTado::new().statuses(&[Pending]).failing_activation();
        let err = activation_step(&fake).expect_err("activation fails");
        assert!(matches!(err, TadoClientError::Transport(_)));
    }
}
