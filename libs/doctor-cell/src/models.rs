use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::NaiveTime;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

static HH_MM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("static HH:MM pattern")
});

pub const MINUTES_PER_DAY: u32 = 24 * 60;
pub const MIN_SLOT_DURATION_MINUTES: u32 = 5;
pub const MAX_SLOT_DURATION_MINUTES: u32 = 180;
pub const DEFAULT_SLOT_DURATION_MINUTES: u32 = 15;

// ==============================================================================
// TIME OF DAY
// ==============================================================================

/// Doctor-local wall-clock time, stored as minutes since midnight.
///
/// Only strict 24-hour `HH:MM` text parses; `9:00`, `24:00` and `09:00:00`
/// are all rejected. No timezone conversion is ever applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn parse(text: &str) -> Option<Self> {
        let caps = HH_MM.captures(text)?;
        let hours: u16 = caps[1].parse().ok()?;
        let minutes: u16 = caps[2].parse().ok()?;
        Some(TimeOfDay(hours * 60 + minutes))
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then(|| TimeOfDay(minutes as u16))
    }

    pub fn hm(hours: u32, minutes: u32) -> Option<Self> {
        if minutes >= 60 {
            return None;
        }
        Self::from_minutes(hours * 60 + minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.0 as u32
    }

    /// `None` once the result would cross midnight.
    pub fn plus_minutes(&self, minutes: u32) -> Option<Self> {
        Self::from_minutes(self.minutes() + minutes)
    }

    pub fn to_naive_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.minutes() / 60, self.minutes() % 60, 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeOfDay::parse(s).ok_or_else(|| format!("'{}' is not a valid HH:MM time", s))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ==============================================================================
// CONSULTATION TYPES AND FEES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsultationType {
    Chat,
    Voice,
    Video,
    InPerson,
}

impl ConsultationType {
    pub const ALL: [ConsultationType; 4] = [
        ConsultationType::Chat,
        ConsultationType::Voice,
        ConsultationType::Video,
        ConsultationType::InPerson,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsultationType::Chat => "chat",
            ConsultationType::Voice => "voice",
            ConsultationType::Video => "video",
            ConsultationType::InPerson => "in-person",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == text)
    }
}

impl fmt::Display for ConsultationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fee per consultation type. A type with no entry costs nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeTable(BTreeMap<ConsultationType, f64>);

impl FeeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Negative and non-finite amounts are stored as zero.
    pub fn with_fee(mut self, consultation_type: ConsultationType, amount: f64) -> Self {
        self.set(consultation_type, amount);
        self
    }

    pub fn set(&mut self, consultation_type: ConsultationType, amount: f64) {
        let amount = if amount.is_finite() && amount > 0.0 { amount } else { 0.0 };
        self.0.insert(consultation_type, amount);
    }

    pub fn fee_for(&self, consultation_type: ConsultationType) -> f64 {
        self.0.get(&consultation_type).copied().unwrap_or(0.0)
    }
}

// ==============================================================================
// DOCTOR AVAILABILITY PROFILE
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl AvailabilityWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Read-only scheduling inputs owned by the doctor record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorAvailabilityProfile {
    pub doctor_id: String,
    /// `None` when the doctor has not configured working hours.
    pub window: Option<AvailabilityWindow>,
    pub slot_duration_minutes: u32,
    pub fees: FeeTable,
}

impl DoctorAvailabilityProfile {
    pub fn new(doctor_id: impl Into<String>, window: Option<AvailabilityWindow>, slot_duration_minutes: u32) -> Self {
        Self {
            doctor_id: doctor_id.into(),
            window,
            slot_duration_minutes,
            fees: FeeTable::new(),
        }
    }

    pub fn with_fees(mut self, fees: FeeTable) -> Self {
        self.fees = fees;
        self
    }

    pub fn fee_for(&self, consultation_type: ConsultationType) -> f64 {
        self.fees.fee_for(consultation_type)
    }

    /// The day's slot start times; empty when no window is configured.
    pub fn daily_grid(&self) -> Vec<TimeOfDay> {
        match self.window {
            Some(window) => crate::services::slots::generate_slot_grid(
                window.start,
                window.end,
                self.slot_duration_minutes as i64,
            ),
            None => Vec::new(),
        }
    }
}

// Error types specific to doctor operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DoctorError {
    #[error("Doctor not found")]
    NotFound,

    #[error("Doctor availability profile is invalid: {0}")]
    InvalidProfile(String),

    #[error("Doctor directory unavailable: {0}")]
    Directory(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_strict_hh_mm() {
        assert_eq!(TimeOfDay::parse("09:15").map(|t| t.minutes()), Some(555));
        assert_eq!(TimeOfDay::parse("23:59").map(|t| t.minutes()), Some(1439));
        assert_eq!(TimeOfDay::parse("00:00").map(|t| t.minutes()), Some(0));

        for bad in ["9:15", "24:00", "12:60", "09:15:00", " 09:15", "0915", ""] {
            assert!(TimeOfDay::parse(bad).is_none(), "{bad} should not parse");
        }
    }

    #[test]
    fn formats_zero_padded() {
        let t = TimeOfDay::hm(7, 5).unwrap();
        assert_eq!(t.to_string(), "07:05");
        assert_eq!(serde_json::to_value(t).unwrap(), serde_json::json!("07:05"));
        assert_eq!(t.plus_minutes(55).unwrap().to_string(), "08:00");
        assert!(TimeOfDay::hm(23, 50).unwrap().plus_minutes(10).is_none());
    }

    #[test]
    fn consultation_types_use_wire_names() {
        assert_eq!(
            serde_json::to_value(ConsultationType::InPerson).unwrap(),
            serde_json::json!("in-person")
        );
        assert_eq!(ConsultationType::parse("video"), Some(ConsultationType::Video));
        assert_eq!(ConsultationType::parse("Video"), None);
    }

    #[test]
    fn missing_fee_defaults_to_zero() {
        let fees = FeeTable::new()
            .with_fee(ConsultationType::Chat, 200.0)
            .with_fee(ConsultationType::Voice, -5.0);

        assert_eq!(fees.fee_for(ConsultationType::Chat), 200.0);
        assert_eq!(fees.fee_for(ConsultationType::Voice), 0.0);
        assert_eq!(fees.fee_for(ConsultationType::InPerson), 0.0);
    }
}
