pub mod arbiter;
pub mod config;
pub mod controller;
pub mod debounce;
pub mod error;
pub mod hysteresis;
pub mod menu;
pub mod position;
pub mod retained;
pub mod sleep;
pub mod topics;
pub mod types;

pub use arbiter::ActuationArbiter;
pub use config::{
    ControllerConfig, MqttConfig, PersistedSettings, RuntimeConfig, SettingChange, SettingField,
};
pub use controller::{BootContext, ControllerAction, EventOutcome, MenuEvent, WindowController};
pub use debounce::{DebouncedInput, EndstopLatch, RawSample};
pub use error::{ConfigError, EventError, Rejection, SensorInvalid, SettingsError};
pub use menu::{MenuItem, MenuMode, MenuNavigator};
pub use retained::{RetainedState, RETAINED_LEN};
pub use sleep::{RawWakeCause, SleepInstruction, WakeSignal};
pub use topics::*;
pub use types::{
    ActuationRequest, ActuatorCommand, ControllerStatus, Direction, JogCommand, OperationState,
    Position, RequestOrigin, WakeCause,
};
