use std::{
    collections::HashMap,
    future,
    io::ErrorKind,
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use window_common::{
    sleep::classify_wake, ActuatorCommand, BootContext, ControllerAction, ControllerConfig,
    EndstopLatch, EventError, JogCommand, MenuEvent, MenuNavigator, PersistedSettings, RawSample,
    RawWakeCause, RetainedState, RuntimeConfig, SettingChange, SleepInstruction, WakeSignal,
    WindowController, RETAINED_LEN, TOPIC_CMD_CLOSE, TOPIC_CMD_JOG, TOPIC_CMD_OPEN,
    TOPIC_CMD_RESET, TOPIC_CMD_SETTING, TOPIC_CONTROLLER_STATE, TOPIC_SENSOR_BATTERY,
    TOPIC_SENSOR_TEMP,
};

const TICK_INTERVAL: Duration = Duration::from_millis(50);
const SENSOR_READ_INTERVAL_MS: u64 = 2_000;
const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Travel below which the closed endstop is pressed.
const LOW_RELEASE: f32 = 0.02;
/// Travel at which the partial endstop lets go, i.e. the window is fully open.
const HIGH_RELEASE: f32 = 0.95;
const FULL_TRAVEL_MS: u64 = 8_000;

#[derive(Clone)]
struct AppState {
    /// `None` while the simulated device is halted.
    controller: Arc<Mutex<Option<WindowController>>>,
    rig: Arc<Mutex<SimulatedRig>>,
    menu: Arc<Mutex<MenuNavigator>>,
    button: Arc<Notify>,
    config: Arc<ControllerConfig>,
    mqtt: AsyncClient,
    store: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ButtonResponse {
    woke: bool,
}

#[derive(Debug)]
enum DispatchError {
    Asleep,
    Event(EventError),
}

#[derive(Debug, Clone, Copy)]
struct SensorReading {
    temp_c: Option<f32>,
    battery_percent: Option<u8>,
}

/// Servo, window and both endstop switches. Edges go through the same latch
/// an interrupt handler would use on the device.
#[derive(Debug)]
struct SimulatedRig {
    travel: f32,
    command: ActuatorCommand,
    /// Servo mounted the other way round; mirrors the Invert setting.
    inverted_mount: bool,
    last_advance_ms: u64,
    low_level: bool,
    high_level: bool,
    low: EndstopLatch,
    high: EndstopLatch,
    ambient_c: Option<f32>,
    battery_percent: Option<u8>,
}

fn endstop_levels(travel: f32) -> (bool, bool) {
    (
        travel < LOW_RELEASE,
        (LOW_RELEASE..HIGH_RELEASE).contains(&travel),
    )
}

impl SimulatedRig {
    fn at(travel: f32, now_ms: u64) -> Self {
        let travel = travel.clamp(0.0, 1.0);
        let (low_level, high_level) = endstop_levels(travel);
        Self {
            travel,
            command: ActuatorCommand::Stop,
            inverted_mount: false,
            last_advance_ms: now_ms,
            low_level,
            high_level,
            low: EndstopLatch::new(low_level),
            high: EndstopLatch::new(high_level),
            ambient_c: None,
            battery_percent: None,
        }
    }

    fn closed(now_ms: u64) -> Self {
        Self::at(0.0, now_ms)
    }

    fn drive(&mut self, command: ActuatorCommand, now_ms: u64) {
        self.advance(now_ms);
        self.command = command;
    }

    fn advance(&mut self, now_ms: u64) {
        let elapsed = now_ms.saturating_sub(self.last_advance_ms);
        self.last_advance_ms = now_ms;
        let delta = elapsed as f32 / FULL_TRAVEL_MS as f32;

        self.travel = match self.command.oriented(self.inverted_mount) {
            ActuatorCommand::DriveOpen => (self.travel + delta).min(1.0),
            ActuatorCommand::DriveClose => (self.travel - delta).max(0.0),
            ActuatorCommand::Stop => self.travel,
        };

        let (low, high) = endstop_levels(self.travel);
        if low != self.low_level {
            self.low_level = low;
            self.low.record(low);
        }
        if high != self.high_level {
            self.high_level = high;
            self.high.record(high);
        }
    }

    fn seated(&self) -> (bool, bool) {
        (self.low_level, self.high_level)
    }

    fn take_samples(&self) -> (RawSample, RawSample) {
        (self.low.take(), self.high.take())
    }

    fn reading(&self) -> SensorReading {
        SensorReading {
            temp_c: self.ambient_c,
            battery_percent: self.battery_percent,
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.mqtt.port);

    let mut mqtt_options = MqttOptions::new("window-controller-rust", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.mqtt.user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.mqtt.pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    let now_ms = monotonic_ms();
    let rig = SimulatedRig::closed(now_ms);
    // RTC memory reads as zeros after power-on.
    let controller = boot_controller(
        &runtime.controller,
        runtime.settings.clone(),
        RawWakeCause::PowerOn,
        &[0; RETAINED_LEN],
        rig.seated(),
        now_ms,
    );

    let app_state = AppState {
        controller: Arc::new(Mutex::new(Some(controller))),
        rig: Arc::new(Mutex::new(rig)),
        menu: Arc::new(Mutex::new(MenuNavigator::new())),
        button: Arc::new(Notify::new()),
        config: Arc::new(runtime.controller),
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_control_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/open", post(handle_open))
        .route("/api/close", post(handle_close))
        .route("/api/jog", post(handle_jog))
        .route("/api/reset", post(handle_reset))
        .route("/api/button", post(handle_button))
        .route("/api/encoder", post(handle_encoder))
        .route("/api/temperature", post(handle_set_temperature))
        .route("/api/settings", put(handle_put_settings))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

fn boot_controller(
    config: &ControllerConfig,
    settings: PersistedSettings,
    raw_wake: RawWakeCause,
    retained: &[u8; RETAINED_LEN],
    (low_seated, high_seated): (bool, bool),
    now_ms: u64,
) -> WindowController {
    let wake_cause = classify_wake(raw_wake);
    let retained = RetainedState::restore(retained);
    info!(
        "boot: wake cause {} ({raw_wake:?}), last travel {:?}",
        wake_cause.as_str(),
        retained.last_travel
    );

    WindowController::new(
        config.clone(),
        settings,
        BootContext {
            wake_cause,
            retained,
            low_seated,
            high_seated,
        },
        now_ms,
    )
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_TEMP,
        TOPIC_SENSOR_BATTERY,
        TOPIC_CMD_OPEN,
        TOPIC_CMD_CLOSE,
        TOPIC_CMD_JOG,
        TOPIC_CMD_RESET,
        TOPIC_CMD_SETTING,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_sensor_read_ms: Option<u64> = None;

        loop {
            interval.tick().await;
            let now_ms = monotonic_ms();

            let (low, high, reading) = {
                let mut rig = app_state.rig.lock().await;
                rig.advance(now_ms);
                let (low, high) = rig.take_samples();
                (low, high, rig.reading())
            };

            let actions = {
                let mut guard = app_state.controller.lock().await;
                let Some(controller) = guard.as_mut() else {
                    continue;
                };

                let read_due = last_sensor_read_ms
                    .map(|last| now_ms.saturating_sub(last) >= SENSOR_READ_INTERVAL_MS)
                    .unwrap_or(true);
                if read_due {
                    last_sensor_read_ms = Some(now_ms);
                    apply_reading(controller, reading, now_ms);
                }

                controller.tick(now_ms, low, high)
            };

            if let Some(instruction) = execute_actions(&app_state, actions).await {
                halt(&app_state, instruction).await;
                last_sensor_read_ms = None;
            }
        }
    });
}

fn apply_reading(controller: &mut WindowController, reading: SensorReading, now_ms: u64) {
    match reading.temp_c {
        Some(raw_c) => {
            if let Err(err) = controller.update_temperature(raw_c, now_ms) {
                warn!("temperature reading rejected: {err}");
            }
        }
        None => debug!("no temperature reading yet"),
    }
    if let Some(percent) = reading.battery_percent {
        controller.update_battery(percent);
    }
}

/// Runs actions in order. Returns the sleep instruction if one was reached;
/// anything after it is dropped.
async fn execute_actions(
    app_state: &AppState,
    actions: Vec<ControllerAction>,
) -> Option<SleepInstruction> {
    for action in actions {
        match action {
            ControllerAction::Actuate(command) => {
                info!("actuator: {}", command.as_str());
                let inverted = app_state
                    .controller
                    .lock()
                    .await
                    .as_ref()
                    .map(|controller| controller.settings().inverted);
                let mut rig = app_state.rig.lock().await;
                if let Some(inverted) = inverted {
                    rig.inverted_mount = inverted;
                }
                rig.drive(command, monotonic_ms());
            }
            ControllerAction::Delay(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
            ControllerAction::Render => publish_state(app_state).await,
            ControllerAction::DisplayPower(on) => {
                info!("display {}", if on { "on" } else { "off" });
                if !on {
                    app_state.menu.lock().await.home();
                }
            }
            ControllerAction::SaveSettings => {
                if let Err(err) = persist_settings(app_state).await {
                    warn!("failed to persist settings: {err:#}");
                }
            }
            ControllerAction::Sleep(instruction) => return Some(instruction),
        }
    }
    None
}

/// Simulated deep sleep. Only the retained bytes survive; the controller is
/// rebuilt from them, the stored settings and fresh endstop levels.
async fn halt(app_state: &AppState, instruction: SleepInstruction) {
    let retained = {
        let mut guard = app_state.controller.lock().await;
        match guard.take() {
            Some(controller) => controller.retained().encode(),
            None => return,
        }
    };

    app_state.menu.lock().await.home();
    // Servo output is unpowered during deep sleep.
    app_state
        .rig
        .lock()
        .await
        .drive(ActuatorCommand::Stop, monotonic_ms());

    info!(
        "halting: timer {:?}, wake signal {:?}",
        instruction.timer(),
        instruction.signal()
    );
    let raw_wake = wait_for_wake(&app_state.button, instruction).await;

    let settings = match app_state.store.load_runtime_config().await {
        Ok(runtime) => runtime.settings,
        Err(err) => {
            warn!("failed to load settings on wake: {err:#}");
            PersistedSettings::default()
        }
    };

    let now_ms = monotonic_ms();
    let seated = {
        let mut rig = app_state.rig.lock().await;
        rig.advance(now_ms);
        // Edges from before the halt are gone with the old interrupt state.
        rig.take_samples();
        rig.seated()
    };

    let controller = boot_controller(
        &app_state.config,
        settings,
        raw_wake,
        &retained,
        seated,
        now_ms,
    );
    *app_state.controller.lock().await = Some(controller);
}

async fn wait_for_wake(button: &Notify, instruction: SleepInstruction) -> RawWakeCause {
    let timer = async {
        match instruction.timer() {
            Some(duration) => tokio::time::sleep(duration).await,
            None => future::pending().await,
        }
    };
    let signal = async {
        match instruction.signal() {
            Some(WakeSignal::Button) => button.notified().await,
            None => future::pending().await,
        }
    };

    tokio::select! {
        () = timer => RawWakeCause::Timer,
        () = signal => RawWakeCause::Ext0,
    }
}

async fn dispatch_event(app_state: &AppState, event: MenuEvent) -> Result<(), DispatchError> {
    let now_ms = monotonic_ms();
    let outcome = {
        let mut guard = app_state.controller.lock().await;
        let Some(controller) = guard.as_mut() else {
            // Any input while halted is just the wake button.
            info!("controller asleep, {event:?} dropped and wake requested");
            app_state.button.notify_one();
            return Err(DispatchError::Asleep);
        };
        controller.handle_event(event, now_ms)
    };

    if let Err(err) = outcome.result {
        info!("menu event {event:?} refused: {err}");
    }
    // Sleep is only ever decided by the control loop.
    let _ = execute_actions(app_state, outcome.actions).await;

    outcome.result.map_err(DispatchError::Event)
}

async fn publish_state(app_state: &AppState) {
    let now_ms = monotonic_ms();
    let payload = {
        let guard = app_state.controller.lock().await;
        let Some(controller) = guard.as_ref() else {
            return;
        };
        serde_json::to_vec(&controller.status(now_ms))
    };

    match payload {
        Ok(body) => {
            if let Err(err) =
                app_state
                    .mqtt
                    .try_publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
            {
                warn!("controller state publish failed: {err}");
            }
        }
        Err(err) => warn!("controller state serialization failed: {err}"),
    }
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;
    let message = message.trim();

    match topic.as_str() {
        TOPIC_SENSOR_TEMP => {
            let temp = message
                .parse::<f32>()
                .with_context(|| format!("invalid temperature payload {message:?}"))?;
            app_state.rig.lock().await.ambient_c = Some(temp);
        }
        TOPIC_SENSOR_BATTERY => {
            let percent = message
                .parse::<u8>()
                .with_context(|| format!("invalid battery payload {message:?}"))?;
            app_state.rig.lock().await.battery_percent = Some(percent);
        }
        TOPIC_CMD_OPEN => {
            let _ = dispatch_event(app_state, MenuEvent::OpenRequested).await;
        }
        TOPIC_CMD_CLOSE => {
            let _ = dispatch_event(app_state, MenuEvent::CloseRequested).await;
        }
        TOPIC_CMD_JOG => {
            let jog = parse_jog(message)
                .with_context(|| format!("unknown jog direction {message:?}"))?;
            let _ = dispatch_event(app_state, MenuEvent::ManualJog(jog)).await;
        }
        TOPIC_CMD_RESET => {
            let _ = dispatch_event(app_state, MenuEvent::ResetRequested).await;
        }
        TOPIC_CMD_SETTING => {
            let change = serde_json::from_str::<SettingChange>(message)
                .context("invalid setting change payload")?;
            let _ = dispatch_event(app_state, MenuEvent::ConfigChanged(change)).await;
        }
        _ => {}
    }

    Ok(())
}

fn parse_jog(value: &str) -> Option<JogCommand> {
    match value.to_ascii_lowercase().as_str() {
        "open" => Some(JogCommand::Open),
        "close" => Some(JogCommand::Close),
        "stop" => Some(JogCommand::Stop),
        _ => None,
    }
}

async fn handle_get_status(State(state): State<AppState>) -> axum::response::Response {
    let now_ms = monotonic_ms();
    let guard = state.controller.lock().await;
    match guard.as_ref() {
        Some(controller) => Json(controller.status(now_ms)).into_response(),
        None => error_response(StatusCode::SERVICE_UNAVAILABLE, "Controller is asleep"),
    }
}

async fn event_response(state: AppState, event: MenuEvent) -> axum::response::Response {
    match dispatch_event(&state, event).await {
        Ok(()) => handle_get_status(State(state)).await,
        Err(DispatchError::Asleep) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Controller was asleep; wake requested",
        ),
        Err(DispatchError::Event(err @ EventError::Rejected(_))) => {
            error_response(StatusCode::CONFLICT, &err.to_string())
        }
        Err(DispatchError::Event(err @ EventError::Settings(_))) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
    }
}

async fn handle_open(State(state): State<AppState>) -> impl IntoResponse {
    event_response(state, MenuEvent::OpenRequested).await
}

async fn handle_close(State(state): State<AppState>) -> impl IntoResponse {
    event_response(state, MenuEvent::CloseRequested).await
}

async fn handle_jog(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("dir") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'dir' parameter");
    };
    let Some(jog) = parse_jog(value) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Invalid direction. Use 'open', 'close' or 'stop'",
        );
    };

    event_response(state, MenuEvent::ManualJog(jog)).await
}

async fn handle_reset(State(state): State<AppState>) -> impl IntoResponse {
    event_response(state, MenuEvent::ResetRequested).await
}

/// Encoder click. While halted it only wakes the device.
async fn handle_button(State(state): State<AppState>) -> impl IntoResponse {
    if state.controller.lock().await.is_none() {
        state.button.notify_one();
        return (StatusCode::ACCEPTED, Json(ButtonResponse { woke: true })).into_response();
    }

    let event = state.menu.lock().await.click();
    event_response(state, event).await
}

async fn handle_encoder(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("clicks") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'clicks' parameter");
    };
    let Ok(clicks) = value.parse::<i32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid clicks value");
    };

    let settings = state
        .controller
        .lock()
        .await
        .as_ref()
        .map(|controller| controller.settings().clone());
    let event = match settings {
        Some(settings) => state.menu.lock().await.rotate(clicks, &settings),
        None => MenuEvent::Activity,
    };
    event_response(state, event).await
}

async fn handle_set_temperature(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let Ok(temp) = value.parse::<f32>() else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid temperature value");
    };

    // Picked up by the next sensor read, like a real probe.
    state.rig.lock().await.ambient_c = Some(temp);
    StatusCode::NO_CONTENT.into_response()
}

async fn handle_put_settings(
    State(state): State<AppState>,
    Json(change): Json<SettingChange>,
) -> impl IntoResponse {
    event_response(state, MenuEvent::ConfigChanged(change)).await
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("WINDOW_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.window"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => {
                let mut runtime = serde_json::from_slice::<RuntimeConfig>(&raw)
                    .with_context(|| format!("malformed {}", self.runtime_path.display()))?;
                runtime.settings.sanitize();
                Ok(runtime)
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

async fn persist_settings(state: &AppState) -> anyhow::Result<()> {
    let Some(settings) = state
        .controller
        .lock()
        .await
        .as_ref()
        .map(|controller| controller.settings().clone())
    else {
        return Ok(());
    };

    let mut runtime = state.store.load_runtime_config().await?;
    runtime.settings = settings;
    state.store.save_runtime_config(&runtime).await
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
