use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SettingsError};

pub const MIN_TEMP_C: f32 = 10.0;
pub const MAX_TEMP_C: f32 = 50.0;
pub const TEMP_STEP_C: f32 = 0.5;
pub const MIN_CHECK_PERIOD_S: u32 = 10;
pub const MAX_CHECK_PERIOD_S: u32 = 3_600;
pub const CHECK_PERIOD_STEP_S: u32 = 10;
pub const MIN_DISPLAY_TIMEOUT_MS: u64 = 1_000;
pub const MAX_DISPLAY_TIMEOUT_MS: u64 = 60_000;
pub const DISPLAY_TIMEOUT_STEP_MS: u64 = 1_000;
pub const MAX_TEMP_CORRECTION_C: f32 = 5.0;
pub const TEMP_CORRECTION_STEP_C: f32 = 0.1;

/// Compiled-in tunables. Not user editable from the menu.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub debounce_ms: u64,
    pub actuation_grace_ms: u64,
    pub evaluate_interval_ms: u64,
    pub travel_overdue_ms: u64,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            actuation_grace_ms: 1_500,
            evaluate_interval_ms: 5_000,
            travel_overdue_ms: 60_000,
            min_valid_temp_c: -40.0,
            max_valid_temp_c: 85.0,
        }
    }
}

/// The single persisted record. Saved wholesale on every change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSettings {
    pub low_temp_c: f32,
    pub high_temp_c: f32,
    pub check_period_s: u32,
    pub display_timeout_ms: u64,
    pub temp_correction_c: f32,
    pub inverted: bool,
}

impl Default for PersistedSettings {
    fn default() -> Self {
        Self {
            low_temp_c: 22.0,
            high_temp_c: 25.0,
            check_period_s: 20,
            display_timeout_ms: 5_000,
            temp_correction_c: 0.0,
            inverted: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "camelCase")]
pub enum SettingChange {
    LowTemp(f32),
    HighTemp(f32),
    CheckPeriod(u32),
    DisplayTimeout(u64),
    TempCorrection(f32),
    Inverted(bool),
}

/// Editable fields in menu order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingField {
    HighTemp,
    LowTemp,
    CheckPeriod,
    DisplayTimeout,
    TempCorrection,
    Inverted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub controller: ControllerConfig,
    pub settings: PersistedSettings,
    #[serde(default)]
    pub mqtt: MqttConfig,
}

impl PersistedSettings {
    pub fn decode(raw: &str) -> Result<Self, ConfigError> {
        let mut settings: Self = serde_json::from_str(raw)?;
        settings.sanitize();
        Ok(settings)
    }

    pub fn encode(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        if !self.low_temp_c.is_finite() || !self.high_temp_c.is_finite() {
            self.low_temp_c = defaults.low_temp_c;
            self.high_temp_c = defaults.high_temp_c;
        }
        self.low_temp_c = self.low_temp_c.clamp(MIN_TEMP_C, MAX_TEMP_C);
        self.high_temp_c = self.high_temp_c.clamp(MIN_TEMP_C, MAX_TEMP_C);
        if self.low_temp_c >= self.high_temp_c {
            self.low_temp_c = defaults.low_temp_c;
            self.high_temp_c = defaults.high_temp_c;
        }

        let period = self
            .check_period_s
            .clamp(MIN_CHECK_PERIOD_S, MAX_CHECK_PERIOD_S);
        self.check_period_s = period - period % CHECK_PERIOD_STEP_S;

        self.display_timeout_ms = self
            .display_timeout_ms
            .clamp(MIN_DISPLAY_TIMEOUT_MS, MAX_DISPLAY_TIMEOUT_MS);

        self.temp_correction_c = if self.temp_correction_c.is_finite() {
            self.temp_correction_c
                .clamp(-MAX_TEMP_CORRECTION_C, MAX_TEMP_CORRECTION_C)
        } else {
            0.0
        };
    }

    /// Applies one menu edit. Returns whether the record changed.
    pub fn apply(&mut self, change: SettingChange) -> Result<bool, SettingsError> {
        match change {
            SettingChange::LowTemp(value) => {
                check_range("lowTemp", value, MIN_TEMP_C, MAX_TEMP_C)?;
                if value >= self.high_temp_c {
                    return Err(SettingsError::ThresholdOrder {
                        low: value,
                        high: self.high_temp_c,
                    });
                }
                Ok(replace_f32(&mut self.low_temp_c, value))
            }
            SettingChange::HighTemp(value) => {
                check_range("highTemp", value, MIN_TEMP_C, MAX_TEMP_C)?;
                if value <= self.low_temp_c {
                    return Err(SettingsError::ThresholdOrder {
                        low: self.low_temp_c,
                        high: value,
                    });
                }
                Ok(replace_f32(&mut self.high_temp_c, value))
            }
            SettingChange::CheckPeriod(seconds) => {
                check_range(
                    "checkPeriod",
                    seconds as f32,
                    MIN_CHECK_PERIOD_S as f32,
                    MAX_CHECK_PERIOD_S as f32,
                )?;
                Ok(replace(&mut self.check_period_s, seconds))
            }
            SettingChange::DisplayTimeout(ms) => {
                check_range(
                    "displayTimeout",
                    ms as f32,
                    MIN_DISPLAY_TIMEOUT_MS as f32,
                    MAX_DISPLAY_TIMEOUT_MS as f32,
                )?;
                Ok(replace(&mut self.display_timeout_ms, ms))
            }
            SettingChange::TempCorrection(value) => {
                check_range(
                    "tempCorrection",
                    value,
                    -MAX_TEMP_CORRECTION_C,
                    MAX_TEMP_CORRECTION_C,
                )?;
                Ok(replace_f32(&mut self.temp_correction_c, value))
            }
            SettingChange::Inverted(inverted) => Ok(replace(&mut self.inverted, inverted)),
        }
    }

    /// Turns encoder detents on a menu entry into the edit they request.
    /// Bounds are not applied here; `apply` rejects out of range results.
    pub fn stepped(&self, field: SettingField, clicks: i32) -> SettingChange {
        match field {
            SettingField::HighTemp => {
                SettingChange::HighTemp(self.high_temp_c + clicks as f32 * TEMP_STEP_C)
            }
            SettingField::LowTemp => {
                SettingChange::LowTemp(self.low_temp_c + clicks as f32 * TEMP_STEP_C)
            }
            SettingField::CheckPeriod => {
                let delta = clicks.saturating_mul(CHECK_PERIOD_STEP_S as i32);
                SettingChange::CheckPeriod(self.check_period_s.saturating_add_signed(delta))
            }
            SettingField::DisplayTimeout => {
                let delta = (clicks as i64).saturating_mul(DISPLAY_TIMEOUT_STEP_MS as i64);
                SettingChange::DisplayTimeout(self.display_timeout_ms.saturating_add_signed(delta))
            }
            SettingField::TempCorrection => SettingChange::TempCorrection(
                self.temp_correction_c + clicks as f32 * TEMP_CORRECTION_STEP_C,
            ),
            SettingField::Inverted => {
                // Any odd number of detents flips the toggle.
                SettingChange::Inverted(self.inverted ^ (clicks % 2 != 0))
            }
        }
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), SettingsError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn replace_f32(slot: &mut f32, value: f32) -> bool {
    if (*slot - value).abs() > f32::EPSILON {
        *slot = value;
        true
    } else {
        false
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot != value {
        *slot = value;
        true
    } else {
        false
    }
}
