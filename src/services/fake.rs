//! Recording in-memory [`TadoApi`] implementation for tests.
//!
//! Writes mutate the fake's own snapshot (`set_home` flips the stored
//! presence, an overlay rewrites the stored setpoint), so repeated cycles
//! against unchanged input demonstrate that no duplicate writes are issued.

use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::client::{TadoApi, TadoClientError};
use crate::models::tado::*;

#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    DeviceActivation,
    GetHomeState,
    GetMobileDevices,
    SetHome,
    SetAway,
    GetZones,
    GetZoneState(i64),
    GetOpenWindowDetected(i64),
    SetOpenWindow(i64),
    SetZoneOverlay {
        zone: i64,
        duration_secs: i64,
        celsius: f64,
    },
}

impl ApiCall {
    fn is_write(&self) -> bool {
        matches!(
            self,
            ApiCall::SetHome | ApiCall::SetAway | ApiCall::SetOpenWindow(_) | ApiCall::SetZoneOverlay { .. }
        )
    }
}

#[derive(Default)]
pub struct FakeTado {
    statuses: RefCell<Vec<DeviceActivationStatus>>,
    verification_url: Option<String>,
    fail_activation: bool,
    presence: RefCell<Option<HomePresence>>,
    mobile_devices: Vec<MobileDevice>,
    zones: Vec<Zone>,
    zone_states: RefCell<BTreeMap<i64, ZoneState>>,
    fail_mobile_devices: bool,
    calls: RefCell<Vec<ApiCall>>,
}

impl FakeTado {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activation statuses reported in order; the last one repeats forever.
    pub fn statuses(self, statuses: &[DeviceActivationStatus]) -> Self {
        *self.statuses.borrow_mut() = statuses.to_vec();
        self
    }

    pub fn verification_url(mut self, url: &str) -> Self {
        self.verification_url = Some(url.to_string());
        self
    }

    pub fn failing_activation(mut self) -> Self {
        self.fail_activation = true;
        self
    }

    pub fn presence(self, presence: HomePresence) -> Self {
        *self.presence.borrow_mut() = Some(presence);
        self
    }

    pub fn device(mut self, name: &str, geo_tracking: bool, at_home: bool) -> Self {
        self.mobile_devices.push(MobileDevice {
            name: Some(name.to_string()),
            settings: Some(MobileDeviceSettings {
                geo_tracking_enabled: Some(geo_tracking),
                ..Default::default()
            }),
            location: Some(MobileDeviceLocation {
                at_home: Some(at_home),
                ..Default::default()
            }),
            ..Default::default()
        });
        self
    }

    pub fn device_without_location(mut self, name: &str) -> Self {
        self.mobile_devices.push(MobileDevice {
            name: Some(name.to_string()),
            settings: Some(MobileDeviceSettings {
                geo_tracking_enabled: Some(true),
                ..Default::default()
            }),
            location: None,
            ..Default::default()
        });
        self
    }

    pub fn device_without_settings(mut self, name: &str) -> Self {
        self.mobile_devices.push(MobileDevice {
            name: Some(name.to_string()),
            ..Default::default()
        });
        self
    }

    pub fn mobile_devices(mut self, devices: Vec<MobileDevice>) -> Self {
        self.mobile_devices = devices;
        self
    }

    pub fn failing_mobile_devices(mut self) -> Self {
        self.fail_mobile_devices = true;
        self
    }

    pub fn heating_zone(self, id: i64, name: &str, power: Power, celsius: f64) -> Self {
        let state = ZoneState {
            setting: Some(ZoneSetting {
                r#type: Some(ZoneType::Heating),
                power: Some(power),
                temperature: Some(Temperature {
                    celsius: Some(celsius),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        };
        self.zone(id, name, ZoneType::Heating, state)
    }

    pub fn zone(mut self, id: i64, name: &str, zone_type: ZoneType, state: ZoneState) -> Self {
        self.zones.push(Zone {
            id: Some(ZoneId(id)),
            name: Some(name.to_string()),
            r#type: Some(zone_type),
            ..Default::default()
        });
        self.zone_states.borrow_mut().insert(id, state);
        self
    }

    pub fn open_window(self, id: i64) -> Self {
        if let Some(state) = self.zone_states.borrow_mut().get_mut(&id) {
            state.open_window_detected = Some(true);
        }
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.borrow().clone()
    }

    pub fn writes(&self) -> Vec<ApiCall> {
        self.calls.borrow().iter().filter(|c| c.is_write()).cloned().collect()
    }

    fn record(&self, call: ApiCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl TadoApi for FakeTado {
    fn device_activation_status(&self) -> DeviceActivationStatus {
        let mut statuses = self.statuses.borrow_mut();
        if statuses.len() > 1 {
            statuses.remove(0)
        } else {
            statuses.first().copied().unwrap_or(DeviceActivationStatus::NotStarted)
        }
    }

    fn device_verification_url(&self) -> Option<String> {
        self.verification_url.clone()
    }

    fn device_activation(&self) -> Result<(), TadoClientError> {
        self.record(ApiCall::DeviceActivation);
        if self.fail_activation {
            Err(TadoClientError::Transport("simulated activation failure".into()))
        } else {
            Ok(())
        }
    }

    fn get_home_state(&self) -> Result<HomeState, TadoClientError> {
        self.record(ApiCall::GetHomeState);
        Ok(HomeState {
            presence: *self.presence.borrow(),
            ..Default::default()
        })
    }

    fn get_mobile_devices(&self) -> Result<Vec<MobileDevice>, TadoClientError> {
        self.record(ApiCall::GetMobileDevices);
        if self.fail_mobile_devices {
            return Err(TadoClientError::Transport("simulated network failure".into()));
        }
        Ok(self.mobile_devices.clone())
    }

    fn set_home(&self) -> Result<(), TadoClientError> {
        self.record(ApiCall::SetHome);
        *self.presence.borrow_mut() = Some(HomePresence::Home);
        Ok(())
    }

    fn set_away(&self) -> Result<(), TadoClientError> {
        self.record(ApiCall::SetAway);
        *self.presence.borrow_mut() = Some(HomePresence::Away);
        Ok(())
    }

    fn get_zones(&self) -> Result<Vec<Zone>, TadoClientError> {
        self.record(ApiCall::GetZones);
        Ok(self.zones.clone())
    }

    fn get_zone_state(&self, zone: ZoneId) -> Result<ZoneState, TadoClientError> {
        self.record(ApiCall::GetZoneState(zone.0));
        Ok(self.zone_states.borrow().get(&zone.0).cloned().unwrap_or_default())
    }

    fn get_open_window_detected(&self, zone: ZoneId) -> Result<OpenWindowDetected, TadoClientError> {
        self.record(ApiCall::GetOpenWindowDetected(zone.0));
        let detected = self
            .zone_states
            .borrow()
            .get(&zone.0)
            .and_then(|s| s.open_window_detected)
            .unwrap_or(false);
        Ok(OpenWindowDetected {
            open_window_detected: Some(detected),
        })
    }

    fn set_open_window(&self, zone: ZoneId) -> Result<(), TadoClientError> {
        // The detected flag is left set: the remote keeps reporting it until
        // the open-window timeout elapses, and deduplicates the activation.
        self.record(ApiCall::SetOpenWindow(zone.0));
        Ok(())
    }

    fn set_zone_overlay(&self, zone: ZoneId, duration_secs: i64, celsius: f64) -> Result<(), TadoClientError> {
        self.record(ApiCall::SetZoneOverlay {
            zone: zone.0,
            duration_secs,
            celsius,
        });
        if let Some(state) = self.zone_states.borrow_mut().get_mut(&zone.0) {
            if let Some(setting) = state.setting.as_mut() {
                setting.temperature = Some(Temperature {
                    celsius: Some(celsius),
                    ..Default::default()
                });
            }
        }
        Ok(())
    }
}
