use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Position {
    FullyClosed,
    FullyOpen,
    PartiallyOpen,
    Ambiguous,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FullyClosed => "FULLY_CLOSED",
            Self::FullyOpen => "FULLY_OPEN",
            Self::PartiallyOpen => "PARTIALLY_OPEN",
            Self::Ambiguous => "AMBIGUOUS",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationState {
    Idle,
    Opening,
    Closing,
}

impl OperationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Opening => "OPENING",
            Self::Closing => "CLOSING",
        }
    }

    pub fn is_idle(self) -> bool {
        self == Self::Idle
    }
}

/// Direction of travel, also used as the resolver hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActuatorCommand {
    DriveOpen,
    DriveClose,
    Stop,
}

impl ActuatorCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DriveOpen => "DRIVE_OPEN",
            Self::DriveClose => "DRIVE_CLOSE",
            Self::Stop => "STOP",
        }
    }

    pub fn drive(direction: Direction) -> Self {
        match direction {
            Direction::Open => Self::DriveOpen,
            Direction::Close => Self::DriveClose,
        }
    }

    /// Physical output for a mechanism mounted the other way round.
    pub fn oriented(self, inverted: bool) -> Self {
        match (self, inverted) {
            (Self::DriveOpen, true) => Self::DriveClose,
            (Self::DriveClose, true) => Self::DriveOpen,
            (command, _) => command,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActuationRequest {
    Open,
    Close,
}

impl ActuationRequest {
    pub fn direction(self) -> Direction {
        match self {
            Self::Open => Direction::Open,
            Self::Close => Direction::Close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Automatic,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JogCommand {
    Open,
    Stop,
    Close,
}

impl JogCommand {
    pub fn command(self) -> ActuatorCommand {
        match self {
            Self::Open => ActuatorCommand::DriveOpen,
            Self::Stop => ActuatorCommand::Stop,
            Self::Close => ActuatorCommand::DriveClose,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeCause {
    ColdBoot,
    TimerExpired,
    ExternalSignal,
    Unknown,
}

impl WakeCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ColdBoot => "COLD_BOOT",
            Self::TimerExpired => "TIMER_EXPIRED",
            Self::ExternalSignal => "EXTERNAL_SIGNAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Only a periodic timer wake may go straight back to sleep.
    pub fn presents_ui(self) -> bool {
        !matches!(self, Self::TimerExpired)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    #[serde(rename = "currentTemp")]
    pub current_temp: Option<f32>,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    /// Milliseconds since the last usable reading.
    #[serde(rename = "readingAgeMs")]
    pub reading_age_ms: Option<u64>,
    #[serde(rename = "batteryPercent")]
    pub battery_percent: Option<u8>,
    #[serde(rename = "lowTemp")]
    pub low_temp: f32,
    #[serde(rename = "highTemp")]
    pub high_temp: f32,
    #[serde(rename = "checkPeriodSec")]
    pub check_period_s: u32,
    pub position: &'static str,
    pub operation: &'static str,
    #[serde(rename = "inProgress")]
    pub in_progress: bool,
    #[serde(rename = "travelOverdue")]
    pub travel_overdue: bool,
    #[serde(rename = "wakeCause")]
    pub wake_cause: &'static str,
    #[serde(rename = "displayOn")]
    pub display_on: bool,
    #[serde(rename = "lastRejection")]
    pub last_rejection: Option<String>,
}
