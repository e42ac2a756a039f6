//! Per-zone policy: open-window activation and temperature clamping.

use log::info;

use crate::client::{TadoApi, TadoClientError};
use crate::config::Config;
use crate::models::tado::{Power, Zone, ZoneId, ZoneSetting, ZoneType};

/// Indefinite override; the remote keeps it until cleared.
const OVERLAY_INDEFINITE: i64 = 0;

/// One policy pass over a single zone, from fresh remote state.
///
/// Open-window activation is re-issued every cycle the flag holds; the
/// remote deduplicates the activation, so no local memory is kept.
pub fn evaluate_zone<C: TadoApi>(client: &C, cfg: &Config, zone: &Zone) -> Result<(), TadoClientError> {
    let Some(zone_id) = zone.id else {
        return Ok(());
    };
    let zone_name = zone.name.as_deref().unwrap_or("unnamed zone");

    let state = client.get_zone_state(zone_id)?;

    if client
        .get_open_window_detected(zone_id)?
        .open_window_detected
        .unwrap_or(false)
    {
        info!("{}: Open window detected. Activating OpenWindow mode.", zone_name);
        client.set_open_window(zone_id)?;
    }

    if cfg.enable_temp_limit {
        clamp_temperature(client, cfg, zone_id, zone_name, state.setting.as_ref())?;
    }

    Ok(())
}

/// Clamp the target temperature of an actively heating zone to the
/// configured bounds. Comparisons are strict: a reading exactly at a bound
/// is left untouched.
fn clamp_temperature<C: TadoApi>(
    client: &C,
    cfg: &Config,
    zone_id: ZoneId,
    zone_name: &str,
    setting: Option<&ZoneSetting>,
) -> Result<(), TadoClientError> {
    let Some(setting) = setting else {
        return Ok(());
    };
    if setting.r#type != Some(ZoneType::Heating) || setting.power != Some(Power::On) {
        return Ok(());
    }
    let Some(current) = setting.temperature.as_ref().and_then(|t| t.celsius) else {
        return Ok(());
    };

    if current > f64::from(cfg.max_temp) {
        client.set_zone_overlay(zone_id, OVERLAY_INDEFINITE, f64::from(cfg.max_temp))?;
        info!("{}: Temp {}°C > max {}°C. Lowering.", zone_name, current, cfg.max_temp);
    } else if current < f64::from(cfg.min_temp) {
        client.set_zone_overlay(zone_id, OVERLAY_INDEFINITE, f64::from(cfg.min_temp))?;
        info!("{}: Temp {}°C < min {}°C. Raising.", zone_name, current, cfg.min_temp);
    }

    Ok(())
}
