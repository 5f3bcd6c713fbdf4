use core::time::Duration;

use serde::Serialize;

use crate::{
    config::PersistedSettings,
    types::{OperationState, WakeCause},
};

/// Sleep source as reported by the platform at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawWakeCause {
    PowerOn,
    Timer,
    Ext0,
    Ext1,
    Gpio,
    Other(u32),
    Undefined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeSignal {
    Button,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SleepInstruction {
    HaltUntilTimer(Duration),
    HaltUntilSignal(WakeSignal),
    HaltUntilEither { timer: Duration, signal: WakeSignal },
}

impl SleepInstruction {
    pub fn timer(&self) -> Option<Duration> {
        match *self {
            Self::HaltUntilTimer(timer) | Self::HaltUntilEither { timer, .. } => Some(timer),
            Self::HaltUntilSignal(_) => None,
        }
    }

    pub fn signal(&self) -> Option<WakeSignal> {
        match *self {
            Self::HaltUntilSignal(signal) | Self::HaltUntilEither { signal, .. } => Some(signal),
            Self::HaltUntilTimer(_) => None,
        }
    }
}

/// Actuation in progress is an absolute veto.
pub fn should_sleep(display_idle_expired: bool, operation: OperationState) -> bool {
    operation.is_idle() && display_idle_expired
}

pub fn classify_wake(raw: RawWakeCause) -> WakeCause {
    match raw {
        RawWakeCause::PowerOn => WakeCause::ColdBoot,
        RawWakeCause::Timer => WakeCause::TimerExpired,
        RawWakeCause::Ext0 | RawWakeCause::Ext1 | RawWakeCause::Gpio => WakeCause::ExternalSignal,
        RawWakeCause::Other(_) | RawWakeCause::Undefined => WakeCause::Unknown,
    }
}

/// The device always arms both the check-period timer and the button.
pub fn sleep_instruction(settings: &PersistedSettings) -> SleepInstruction {
    SleepInstruction::HaltUntilEither {
        timer: Duration::from_secs(u64::from(settings.check_period_s)),
        signal: WakeSignal::Button,
    }
}

#[derive(Debug, Clone)]
pub struct DisplayIdleTimer {
    last_activity_ms: Option<u64>,
    timeout_ms: u64,
}

impl DisplayIdleTimer {
    /// Starts running for wakes that show the UI, already expired otherwise.
    pub fn for_wake(wake: WakeCause, timeout_ms: u64, now_ms: u64) -> Self {
        Self {
            last_activity_ms: wake.presents_ui().then_some(now_ms),
            timeout_ms,
        }
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity_ms = Some(now_ms);
    }

    pub fn set_timeout(&mut self, timeout_ms: u64) {
        self.timeout_ms = timeout_ms;
    }

    pub fn expired(&self, now_ms: u64) -> bool {
        match self.last_activity_ms {
            Some(last) => now_ms.saturating_sub(last) >= self.timeout_ms,
            None => true,
        }
    }
}
