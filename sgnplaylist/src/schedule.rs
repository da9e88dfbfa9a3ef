//! Évaluation des fenêtres de diffusion
//!
//! Fonction pure de l'élément et de l'instant : aucune erreur ne remonte,
//! une valeur mal formée rend simplement l'élément inéligible.

use crate::error::{Error, Result};
use crate::model::PlaylistItem;
use chrono::{Datelike, NaiveDateTime, NaiveTime};
use tracing::debug;

/// Parse une heure `HH:MM` ou `HH:MM:SS`
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| Error::InvalidTime(value.to_string()))
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Vérifie que les jours sont dans 0..=6
fn validate_days(days: &[u8]) -> Result<()> {
    match days.iter().find(|d| **d > 6) {
        Some(day) => Err(Error::InvalidDay(*day)),
        None => Ok(()),
    }
}

/// Indique si l'élément peut être diffusé à l'instant `now`
///
/// - sans contrainte : toujours éligible
/// - jours : le jour courant (0 = dimanche) doit figurer dans la liste
/// - début seul : `heure >= début` ; fin seule : `heure < fin`
/// - début == fin : toute la journée
/// - fenêtre de nuit (fin < début) : `heure >= début` ou `heure < fin`
pub fn is_eligible(item: &PlaylistItem, now: NaiveDateTime) -> bool {
    match check_window(item, now) {
        Ok(eligible) => eligible,
        Err(e) => {
            debug!(item = %item.id, "Schedule rejected: {}", e);
            false
        }
    }
}

fn check_window(item: &PlaylistItem, now: NaiveDateTime) -> Result<bool> {
    if let Some(days) = item.days_of_week.as_deref().filter(|d| !d.is_empty()) {
        validate_days(days)?;
        let today = now.weekday().num_days_from_sunday() as u8;
        if !days.contains(&today) {
            return Ok(false);
        }
    }

    let start = non_empty(&item.start_time).map(parse_time_of_day).transpose()?;
    let end = non_empty(&item.end_time).map(parse_time_of_day).transpose()?;
    let time = now.time();

    let eligible = match (start, end) {
        (None, None) => true,
        (Some(start), None) => time >= start,
        (None, Some(end)) => time < end,
        (Some(start), Some(end)) if start == end => true,
        (Some(start), Some(end)) if start < end => start <= time && time < end,
        (Some(start), Some(end)) => time >= start || time < end,
    };
    Ok(eligible)
}
