use crate::{
    config::{ControllerConfig, PersistedSettings},
    error::SensorInvalid,
    types::{ActuationRequest, Position},
};

/// Advisory only. The arbiter decides whether the request is serviced.
pub fn evaluate(
    current_temp_c: f32,
    settings: &PersistedSettings,
    position: Position,
) -> Option<ActuationRequest> {
    if position == Position::Ambiguous || !current_temp_c.is_finite() {
        return None;
    }

    if current_temp_c >= settings.high_temp_c && position != Position::FullyOpen {
        Some(ActuationRequest::Open)
    } else if current_temp_c < settings.low_temp_c && position != Position::FullyClosed {
        Some(ActuationRequest::Close)
    } else {
        None
    }
}

/// Last known good indoor temperature, correction applied.
#[derive(Debug, Clone, Default)]
pub struct TemperatureTracker {
    last_valid_c: Option<f32>,
    last_update_ms: Option<u64>,
    last_read_failed: bool,
}

impl TemperatureTracker {
    pub fn with_last_known(last_valid_c: Option<f32>) -> Self {
        Self {
            last_valid_c: last_valid_c.filter(|temp| temp.is_finite()),
            ..Self::default()
        }
    }

    pub fn update(
        &mut self,
        raw_c: f32,
        correction_c: f32,
        config: &ControllerConfig,
        now_ms: u64,
    ) -> Result<f32, SensorInvalid> {
        if !raw_c.is_finite() || !(config.min_valid_temp_c..=config.max_valid_temp_c).contains(&raw_c)
        {
            self.last_read_failed = true;
            return Err(SensorInvalid { reading: raw_c });
        }

        let corrected = raw_c + correction_c;
        self.last_valid_c = Some(corrected);
        self.last_update_ms = Some(now_ms);
        self.last_read_failed = false;
        Ok(corrected)
    }

    pub fn current_c(&self) -> Option<f32> {
        self.last_valid_c
    }

    /// True when the latest reading was usable.
    pub fn is_valid(&self) -> bool {
        self.last_valid_c.is_some() && !self.last_read_failed
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }
}
