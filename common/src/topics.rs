pub const TOPIC_SENSOR_TEMP: &str = "window/sensor/temperature";
pub const TOPIC_SENSOR_BATTERY: &str = "window/sensor/battery";

pub const TOPIC_CONTROLLER_STATE: &str = "window/controller/state";

pub const TOPIC_CMD_OPEN: &str = "window/cmnd/open";
pub const TOPIC_CMD_CLOSE: &str = "window/cmnd/close";
pub const TOPIC_CMD_JOG: &str = "window/cmnd/jog";
pub const TOPIC_CMD_RESET: &str = "window/cmnd/reset";
pub const TOPIC_CMD_SETTING: &str = "window/cmnd/setting";
