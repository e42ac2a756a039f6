//! The monitoring loop: presence first, then every zone in listing order,
//! then sleep. Any error backs the loop off by `ERROR_RETRY_INTERVAL` and
//! the cycle restarts; only a user interrupt ends the loop.

use log::{error, info};

use crate::client::{TadoApi, TadoClientError};
use crate::config::Config;
use crate::interrupt::Interrupt;
use crate::services::{presence, zones};

/// Run monitoring cycles until interrupted. Never returns otherwise.
pub fn run_loop<C: TadoApi>(client: &C, cfg: &Config, interrupt: &Interrupt) {
    info!("Monitoring zones for window status and temperature limits...");
    loop {
        if interrupt.interrupted() {
            info!("Monitoring interrupted by user.");
            return;
        }

        let wait = match run_cycle(client, cfg) {
            Ok(()) => cfg.checking_interval,
            Err(TadoClientError::Interrupted) => {
                info!("Monitoring interrupted by user.");
                return;
            }
            Err(e) => {
                error!(
                    "Monitoring error: {}. Retrying in {} seconds...",
                    e,
                    cfg.error_retry_interval.as_secs_f64()
                );
                cfg.error_retry_interval
            }
        };

        if !interrupt.sleep(wait) {
            info!("Monitoring interrupted by user.");
            return;
        }
    }
}

/// One full cycle from fresh remote state. Presence is always evaluated
/// before the zone pass; zones run in the order the remote lists them.
pub fn run_cycle<C: TadoApi>(client: &C, cfg: &Config) -> Result<(), TadoClientError> {
    presence::update_home_status(client)?;

    for zone in client.get_zones()? {
        zones::evaluate_zone(client, cfg, &zone)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tado::{HomePresence, Power};
    use crate::services::fake::{ApiCall, FakeTado};
    use std::time::Duration;

    fn test_config() -> Config {
        let mut cfg = Config::from_env().expect("default config");
        cfg.min_temp = 5;
        cfg.max_temp = 20;
        cfg.enable_temp_limit = true;
        cfg.checking_interval = Duration::from_millis(1);
        cfg.error_retry_interval = Duration::from_millis(1);
        cfg
    }

    #[test]
    fn cycle_evaluates_presence_before_zones_in_listing_order() {
        let fake = FakeTado::new()
            .presence(HomePresence::Home)
            .device("A", true, true)
            .heating_zone(7, "First", Power::On, 18.0)
            .heating_zone(3, "Second", Power::On, 18.0);
        run_cycle(&fake, &test_config()).expect("cycle ok");

        let calls = fake.calls();
        let presence_read = calls.iter().position(|c| *c == ApiCall::GetHomeState).expect("presence read");
        let first_zone_read = calls
            .iter()
            .position(|c| matches!(c, ApiCall::GetZoneState(_)))
            .expect("zone read");
        assert!(presence_read < first_zone_read);

        let zone_order: Vec<i64> = calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::GetZoneState(id) => Some(*id),
                _ => None,
            })
            .collect();
        assert_eq!(zone_order, vec![7, 3]);
    }

    #[test]
    fn cycle_error_propagates_without_zone_evaluation() {
        let fake = FakeTado::new()
            .presence(HomePresence::Home)
            .failing_mobile_devices()
            .heating_zone(1, "A", Power::On, 30.0);
        let err = run_cycle(&fake, &test_config()).expect_err("propagates");
        assert!(matches!(err, TadoClientError::Transport(_)));
        assert!(!fake.calls().contains(&ApiCall::GetZones));
    }

    #[test]
    fn unchanged_remote_state_produces_one_write_across_cycles() {
        let fake = FakeTado::new()
            .presence(HomePresence::Away)
            .device("A", true, true)
            .heating_zone(1, "A", Power::On, 22.0);
        let cfg = test_config();
        run_cycle(&fake, &cfg).expect("first cycle");
        run_cycle(&fake, &cfg).expect("second cycle");
        assert_eq!(
            fake.writes(),
            vec![
                ApiCall::SetHome,
                ApiCall::SetZoneOverlay {
                    zone: 1,
                    duration_secs: 0,
                    celsius: 20.0
                }
            ]
        );
    }

    #[test]
    fn loop_exits_immediately_when_already_interrupted() {
        let fake = FakeTado::new().presence(HomePresence::Home);
        let interrupt = Interrupt::new();
        interrupt.trigger();
        run_loop(&fake, &test_config(), &interrupt);
        assert!(fake.calls().is_empty());
    }

    #[test]
    fn loop_exits_when_a_blocking_call_reports_interruption() {
        // An interrupt raised during a cycle surfaces as
        // TadoClientError::Interrupted from the client; the loop must treat
        // it as a clean exit, not a retryable error.
        struct InterruptingApi {
            inner: FakeTado,
        }
        impl TadoApi for InterruptingApi {
            fn device_activation_status(&self) -> crate::models::tado::DeviceActivationStatus {
                self.inner.device_activation_status()
            }
            fn device_verification_url(&self) -> Option<String> {
                self.inner.device_verification_url()
            }
            fn device_activation(&self) -> Result<(), TadoClientError> {
                self.inner.device_activation()
            }
            fn get_home_state(&self) -> Result<crate::models::tado::HomeState, TadoClientError> {
                Err(TadoClientError::Interrupted)
            }
            fn get_mobile_devices(&self) -> Result<Vec<crate::models::tado::MobileDevice>, TadoClientError> {
                self.inner.get_mobile_devices()
            }
            fn set_home(&self) -> Result<(), TadoClientError> {
                self.inner.set_home()
            }
            fn set_away(&self) -> Result<(), TadoClientError> {
                self.inner.set_away()
            }
            fn get_zones(&self) -> Result<Vec<crate::models::tado::Zone>, TadoClientError> {
                self.inner.get_zones()
            }
            fn get_zone_state(
                &self,
                zone: crate::models::tado::ZoneId,
            ) -> Result<crate::models::tado::ZoneState, TadoClientError> {
                self.inner.get_zone_state(zone)
            }
            fn get_open_window_detected(
                &self,
                zone: crate::models::tado::ZoneId,
            ) -> Result<crate::models::tado::OpenWindowDetected, TadoClientError> {
                self.inner.get_open_window_detected(zone)
            }
            fn set_open_window(&self, zone: crate::models::tado::ZoneId) -> Result<(), TadoClientError> {
                self.inner.set_open_window(zone)
            }
            fn set_zone_overlay(
                &self,
                zone: crate::models::tado::ZoneId,
                duration_secs: i64,
                celsius: f64,
            ) -> Result<(), TadoClientError> {
                self.inner.set_zone_overlay(zone, duration_secs, celsius)
            }
        }

        let api = InterruptingApi { inner: FakeTado::new() };
        let interrupt = Interrupt::new();
        // Must return rather than spin on the error path.
        run_loop(&api, &test_config(), &interrupt);
    }
}
