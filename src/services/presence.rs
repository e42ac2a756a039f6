//! Presence evaluation: derive the at-home device set from mobile-device
//! geofencing and flip the remote HOME/AWAY mode when it disagrees.

use log::info;

use crate::client::{TadoApi, TadoClientError};
use crate::models::tado::{HomePresence, MobileDevice};

/// One presence pass: read mode and devices fresh, transition if needed.
///
/// Returns the names of the devices currently judged at home. Errors are not
/// retried here; the scheduler owns the backoff policy.
pub fn update_home_status<C: TadoApi>(client: &C) -> Result<Vec<String>, TadoClientError> {
    let presence = client.get_home_state()?.presence;
    let devices_home = at_home_device_names(&client.get_mobile_devices()?);

    if devices_home.is_empty() && presence == Some(HomePresence::Home) {
        info!("No devices at home. Switching to AWAY mode.");
        client.set_away()?;
    } else if !devices_home.is_empty() && presence == Some(HomePresence::Away) {
        info!("Devices at home: {}. Switching to HOME mode.", devices_home.join(", "));
        client.set_home()?;
    }

    Ok(devices_home)
}

/// Devices counted as at home: geo-tracking enabled, a location present, and
/// that location's `atHome` flag set. Devices missing `settings` or
/// `location` simply do not contribute.
fn at_home_device_names(devices: &[MobileDevice]) -> Vec<String> {
    devices
        .iter()
        .filter(|d| {
            d.settings
                .as_ref()
                .and_then(|s| s.geo_tracking_enabled)
                .unwrap_or(false)
        })
        .filter(|d| d.location.as_ref().and_then(|l| l.at_home).unwrap_or(false))
        .filter_map(|d| d.name.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake::{ApiCall, FakeTado};

    #[test]
    fn at_home_set_requires_tracking_location_and_flag() {
        let json = std::fs::read_to_string("tests/data/mobile-devices.json").expect("fixture present");
        let devices: Vec<MobileDevice> = serde_json::from_str(&json).expect("parse mobile devices");

        // Fixture: Anna (tracked, at home), Ben (tracked, away), Chris (no
        // geo tracking), Dana (no location payload), Eve (no settings).
        assert_eq!(at_home_device_names(&devices), vec!["Anna".to_string()]);
    }

    #[test]
    fn away_to_home_transition_logs_and_sets_home() {
        let fake = FakeTado::new().presence(HomePresence::Away).device("A", true, true);
        let home = update_home_status(&fake).expect("update ok");
        assert_eq!(home, vec!["A".to_string()]);
        assert_eq!(fake.writes(), vec![ApiCall::SetHome]);
    }

    #[test]
    fn home_to_away_transition_when_nobody_home() {
        let fake = FakeTado::new()
            .presence(HomePresence::Home)
            .device("A", true, false)
            .device("B", false, true);
        let home = update_home_status(&fake).expect("update ok");
        assert!(home.is_empty());
        assert_eq!(fake.writes(), vec![ApiCall::SetAway]);
    }

    #[test]
    fn no_write_when_mode_already_matches() {
        let home_and_home = FakeTado::new().presence(HomePresence::Home).device("A", true, true);
        update_home_status(&home_and_home).expect("update ok");
        assert!(home_and_home.writes().is_empty());

        let away_and_away = FakeTado::new().presence(HomePresence::Away).device("A", true, false);
        update_home_status(&away_and_away).expect("update ok");
        assert!(away_and_away.writes().is_empty());
    }

    #[test]
    fn incomplete_device_payloads_do_not_contribute_or_fail() {
        let fake = FakeTado::new()
            .presence(HomePresence::Home)
            .device_without_location("NoLoc")
            .device_without_settings("NoSettings");
        let home = update_home_status(&fake).expect("update ok");
        assert!(home.is_empty());
        assert_eq!(fake.writes(), vec![ApiCall::SetAway]);
    }

    #[test]
    fn second_pass_on_unchanged_devices_issues_no_further_write() {
        let fake = FakeTado::new().presence(HomePresence::Away).device("A", true, true);
        update_home_status(&fake).expect("first pass");
        update_home_status(&fake).expect("second pass");
        assert_eq!(fake.writes(), vec![ApiCall::SetHome]);
    }

    #[test]
    fn read_errors_propagate_to_the_caller() {
        let fake = FakeTado::new().presence(HomePresence::Home).failing_mobile_devices();
        let err = update_home_status(&fake).expect_err("propagates");
        assert!(matches!(err, TadoClientError::Transport(_)));
        assert!(fake.writes().is_empty());
    }
}
