use core::{
    ptr::{addr_of, addr_of_mut},
    sync::atomic::{AtomicI32, Ordering},
};
use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use dht_sensor::dht11;
use esp_idf_hal::{
    delay::Ets,
    gpio::{
        AnyIOPin, AnyInputPin, IOPin, Input, InputOutput, InputPin, InterruptType, PinDriver, Pull,
    },
    ledc::{config::TimerConfig, LedcDriver, LedcTimerDriver, Resolution},
    prelude::*,
};
use esp_idf_svc::{
    log::EspLogger,
    nvs::{EspDefaultNvsPartition, EspNvs},
};
use log::{info, warn};

use window_common::{
    sleep::classify_wake, ActuatorCommand, BootContext, ControllerAction, ControllerConfig,
    DebouncedInput, EndstopLatch, MenuEvent, MenuNavigator, PersistedSettings, RawWakeCause,
    RetainedState, SleepInstruction, WakeSignal, WindowController, RETAINED_LEN,
};

const NVS_NAMESPACE: &str = "window";
const NVS_SETTINGS_KEY: &str = "settings_json";
const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const TICK_INTERVAL: Duration = Duration::from_millis(10);
/// DHT11 cannot be sampled faster than once a second.
const SENSOR_READ_INTERVAL_MS: u64 = 2_000;

const ENC_L_PIN: i32 = 1;
const ENC_R_PIN: i32 = 2;
const ENC_BTN_PIN: i32 = 3;
const LOW_ENDSTOP_PIN: i32 = 4;
const HIGH_ENDSTOP_PIN: i32 = 5;
const DHT11_PIN: i32 = 8;
const ENCODER_EDGES_PER_DETENT: i32 = 2;

const SERVO_FREQ_HZ: u32 = 50;
const SERVO_PERIOD_US: u32 = 20_000;
const SERVO_CLOSE_PULSE_US: u32 = 1_000;
const SERVO_OPEN_PULSE_US: u32 = 2_000;

static LOW_ENDSTOP: EndstopLatch = EndstopLatch::new(false);
static HIGH_ENDSTOP: EndstopLatch = EndstopLatch::new(false);
static BUTTON: EndstopLatch = EndstopLatch::new(false);
static ENCODER_EDGES: AtomicI32 = AtomicI32::new(0);

/// Survives deep sleep. Loaded from the image (all zeros) on power-on.
#[link_section = ".rtc.data"]
static mut RETAINED: [u8; RETAINED_LEN] = [0; RETAINED_LEN];

struct NvsStore {
    partition: EspDefaultNvsPartition,
}

/// Continuous-rotation servo on LEDC.
struct Servo {
    ledc: LedcDriver<'static>,
    max_duty: u32,
}

struct TemperatureProbe {
    pin: PinDriver<'static, AnyIOPin, InputOutput>,
    delay: Ets,
}

struct Inputs {
    low: PinDriver<'static, AnyInputPin, Input>,
    high: PinDriver<'static, AnyInputPin, Input>,
    button: PinDriver<'static, AnyInputPin, Input>,
    encoder: PinDriver<'static, AnyInputPin, Input>,
}

struct Hardware {
    servo: Servo,
    nvs_store: NvsStore,
    menu: MenuNavigator,
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let raw_wake = raw_wake_cause();
    let retained = RetainedState::restore(&load_retained());

    let nvs_store = NvsStore {
        partition: EspDefaultNvsPartition::take()?,
    };
    let settings = nvs_store.load_settings().unwrap_or_else(|err| {
        warn!("failed to load settings from NVS: {err:#}");
        PersistedSettings::default()
    });

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    if let Err(err) = add_current_task_to_watchdog() {
        warn!("failed to register control loop with watchdog: {err:#}");
    }

    let peripherals = Peripherals::take()?;
    let pins = peripherals.pins;
    let mut inputs = Inputs {
        low: watch_input(pins.gpio4.downgrade_input(), on_low_endstop_edge)?,
        high: watch_input(pins.gpio5.downgrade_input(), on_high_endstop_edge)?,
        button: watch_input(pins.gpio3.downgrade_input(), on_button_edge)?,
        encoder: watch_input(pins.gpio1.downgrade_input(), on_encoder_edge)?,
    };
    // ENC_R is only sampled from the encoder interrupt.
    let mut enc_r = PinDriver::input(pins.gpio2.downgrade_input())?;
    enc_r.set_pull(Pull::Up)?;

    let servo = Servo::new(
        LedcTimerDriver::new(
            peripherals.ledc.timer0,
            &TimerConfig::default()
                .frequency(SERVO_FREQ_HZ.Hz().into())
                .resolution(Resolution::Bits14),
        )?,
        peripherals.ledc.channel0,
        pins.gpio6.downgrade(),
    )
    .context("servo init failed")?;
    let mut probe = TemperatureProbe::new(pins.gpio8.downgrade())?;

    let now_ms = monotonic_ms();
    // Seated switches pull the line low.
    let low_seated = inputs.low.is_low();
    let high_seated = inputs.high.is_low();
    LOW_ENDSTOP.reset(low_seated);
    HIGH_ENDSTOP.reset(high_seated);
    BUTTON.reset(inputs.button.is_low());
    ENCODER_EDGES.store(0, Ordering::Release);

    let wake_cause = classify_wake(raw_wake);
    info!(
        "boot: wake cause {} ({raw_wake:?}), last travel {:?}, endstops low={low_seated} high={high_seated}",
        wake_cause.as_str(),
        retained.last_travel
    );

    let mut controller = WindowController::new(
        ControllerConfig::default(),
        settings,
        BootContext {
            wake_cause,
            retained,
            low_seated,
            high_seated,
        },
        now_ms,
    );
    let mut button = DebouncedInput::new(
        inputs.button.is_low(),
        controller.config.debounce_ms,
        now_ms,
    );
    let mut hardware = Hardware {
        servo,
        nvs_store,
        menu: MenuNavigator::new(),
    };
    let mut last_sensor_read_ms: Option<u64> = None;

    loop {
        feed_watchdog();
        let now_ms = monotonic_ms();

        let read_due = last_sensor_read_ms
            .map(|last| now_ms.saturating_sub(last) >= SENSOR_READ_INTERVAL_MS)
            .unwrap_or(true);
        if read_due {
            last_sensor_read_ms = Some(now_ms);
            // A failed read counts as an invalid sample.
            let raw_c = probe.read_celsius().unwrap_or(f32::NAN);
            if let Err(err) = controller.update_temperature(raw_c, now_ms) {
                warn!("temperature reading rejected: {err}");
            }
        }

        if let Some(change) = button.ingest(BUTTON.poll(inputs.button.is_low()), now_ms) {
            if change.level {
                let event = hardware.menu.click();
                dispatch(&mut controller, &mut hardware, event, now_ms);
            }
        }

        let detents = take_encoder_detents();
        if detents != 0 {
            let event = hardware.menu.rotate(detents, controller.settings());
            dispatch(&mut controller, &mut hardware, event, now_ms);
        }

        // Interrupts only count edges; the level comes from the pin now.
        let low = LOW_ENDSTOP.poll(inputs.low.is_low());
        let high = HIGH_ENDSTOP.poll(inputs.high.is_low());
        let actions = controller.tick(now_ms, low, high);
        if let Some(instruction) = execute_actions(&mut hardware, &controller, actions) {
            enter_deep_sleep(&mut hardware, &controller, instruction);
        }

        inputs.rearm();
        thread::sleep(TICK_INTERVAL);
    }
}

fn dispatch(
    controller: &mut WindowController,
    hardware: &mut Hardware,
    event: MenuEvent,
    now_ms: u64,
) {
    let outcome = controller.handle_event(event, now_ms);
    if let Err(err) = outcome.result {
        warn!("menu event {event:?} refused: {err}");
    }
    // Sleep is only decided by the tick.
    let _ = execute_actions(hardware, controller, outcome.actions);
}

fn execute_actions(
    hardware: &mut Hardware,
    controller: &WindowController,
    actions: Vec<ControllerAction>,
) -> Option<SleepInstruction> {
    for action in actions {
        match action {
            ControllerAction::Actuate(command) => {
                if let Err(err) = hardware.servo.apply(command) {
                    warn!("servo command {} failed: {err:#}", command.as_str());
                } else {
                    info!("actuator: {}", command.as_str());
                }
            }
            ControllerAction::Delay(ms) => thread::sleep(Duration::from_millis(ms)),
            ControllerAction::Render => render(controller, &hardware.menu),
            ControllerAction::DisplayPower(on) => {
                info!("display {}", if on { "on" } else { "off" });
                if !on {
                    hardware.menu.home();
                }
            }
            ControllerAction::SaveSettings => {
                if let Err(err) = hardware.nvs_store.save_settings(controller.settings()) {
                    warn!("failed to persist settings: {err:#}");
                }
            }
            ControllerAction::Sleep(instruction) => return Some(instruction),
        }
    }
    None
}

fn render(controller: &WindowController, menu: &MenuNavigator) {
    if let Some(item) = menu.selected() {
        info!("[screen] menu > {}", item.label());
        return;
    }

    let status = controller.status(monotonic_ms());
    info!(
        "[screen] temp={:?} low={} high={} position={} op={} overdue={}",
        status.current_temp,
        status.low_temp,
        status.high_temp,
        status.position,
        status.operation,
        status.travel_overdue
    );
}

fn enter_deep_sleep(
    hardware: &mut Hardware,
    controller: &WindowController,
    instruction: SleepInstruction,
) -> ! {
    if let Err(err) = hardware.servo.apply(ActuatorCommand::Stop) {
        warn!("failed to release servo before sleep: {err:#}");
    }
    store_retained(controller.retained().encode());

    info!(
        "entering deep sleep: timer {:?}, wake signal {:?}",
        instruction.timer(),
        instruction.signal()
    );

    unsafe {
        if let Some(timer) = instruction.timer() {
            let micros = timer.as_micros().try_into().unwrap_or(u64::MAX);
            esp_idf_svc::sys::esp_sleep_enable_timer_wakeup(micros);
        }
        if let Some(WakeSignal::Button) = instruction.signal() {
            // Digital pull-ups are off in deep sleep; keep the RTC one on.
            esp_idf_svc::sys::rtc_gpio_pullup_en(ENC_BTN_PIN);
            esp_idf_svc::sys::rtc_gpio_pulldown_dis(ENC_BTN_PIN);
            esp_idf_svc::sys::esp_sleep_enable_ext0_wakeup(ENC_BTN_PIN, 0);
        }
        esp_idf_svc::sys::esp_deep_sleep_start()
    }
}

fn raw_wake_cause() -> RawWakeCause {
    let reset_reason = unsafe { esp_idf_svc::sys::esp_reset_reason() };
    if reset_reason != esp_idf_svc::sys::esp_reset_reason_t_ESP_RST_DEEPSLEEP {
        return RawWakeCause::PowerOn;
    }

    let cause = unsafe { esp_idf_svc::sys::esp_sleep_get_wakeup_cause() };
    match cause {
        esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => RawWakeCause::Timer,
        esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0 => RawWakeCause::Ext0,
        esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 => RawWakeCause::Ext1,
        esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO => RawWakeCause::Gpio,
        esp_idf_svc::sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_UNDEFINED => RawWakeCause::Undefined,
        other => RawWakeCause::Other(other as u32),
    }
}

fn load_retained() -> [u8; RETAINED_LEN] {
    unsafe { addr_of!(RETAINED).read() }
}

fn store_retained(raw: [u8; RETAINED_LEN]) {
    unsafe { addr_of_mut!(RETAINED).write(raw) }
}

fn watch_input(
    pin: AnyInputPin,
    on_edge: fn(),
) -> anyhow::Result<PinDriver<'static, AnyInputPin, Input>> {
    let mut driver = PinDriver::input(pin)?;
    driver.set_pull(Pull::Up)?;
    driver.set_interrupt_type(InterruptType::AnyEdge)?;
    unsafe { driver.subscribe(on_edge)? };
    driver.enable_interrupt()?;
    Ok(driver)
}

impl Inputs {
    /// The GPIO driver disables an interrupt after it fires.
    fn rearm(&mut self) {
        for (name, driver) in [
            ("low endstop", &mut self.low),
            ("high endstop", &mut self.high),
            ("button", &mut self.button),
            ("encoder", &mut self.encoder),
        ] {
            if let Err(err) = driver.enable_interrupt() {
                warn!("failed to re-arm {name} interrupt: {err}");
            }
        }
    }
}

// Interrupt context: touch atomics only.

fn pin_is_low(pin: i32) -> bool {
    unsafe { esp_idf_svc::sys::gpio_get_level(pin) == 0 }
}

fn on_low_endstop_edge() {
    LOW_ENDSTOP.record(pin_is_low(LOW_ENDSTOP_PIN));
}

fn on_high_endstop_edge() {
    HIGH_ENDSTOP.record(pin_is_low(HIGH_ENDSTOP_PIN));
}

fn on_button_edge() {
    BUTTON.record(pin_is_low(ENC_BTN_PIN));
}

fn on_encoder_edge() {
    if pin_is_low(ENC_L_PIN) == pin_is_low(ENC_R_PIN) {
        ENCODER_EDGES.fetch_sub(1, Ordering::AcqRel);
    } else {
        ENCODER_EDGES.fetch_add(1, Ordering::AcqRel);
    }
}

fn take_encoder_detents() -> i32 {
    let edges = ENCODER_EDGES.load(Ordering::Acquire);
    let detents = edges / ENCODER_EDGES_PER_DETENT;
    if detents != 0 {
        ENCODER_EDGES.fetch_sub(detents * ENCODER_EDGES_PER_DETENT, Ordering::AcqRel);
    }
    detents
}

impl Servo {
    fn new(
        timer: LedcTimerDriver<'static>,
        channel: esp_idf_hal::ledc::CHANNEL0,
        pin: AnyIOPin,
    ) -> anyhow::Result<Self> {
        let mut ledc = LedcDriver::new(channel, timer, pin)?;
        let max_duty = ledc.get_max_duty();
        ledc.set_duty(0)?;
        Ok(Self { ledc, max_duty })
    }

    fn apply(&mut self, command: ActuatorCommand) -> anyhow::Result<()> {
        let duty = match command {
            ActuatorCommand::DriveOpen => self.duty_for(SERVO_OPEN_PULSE_US),
            ActuatorCommand::DriveClose => self.duty_for(SERVO_CLOSE_PULSE_US),
            // No pulses at all stops the servo and saves the holding current.
            ActuatorCommand::Stop => 0,
        };
        self.ledc.set_duty(duty)?;
        Ok(())
    }

    fn duty_for(&self, pulse_us: u32) -> u32 {
        pulse_us * self.max_duty / SERVO_PERIOD_US
    }
}

impl TemperatureProbe {
    fn new(pin: AnyIOPin) -> anyhow::Result<Self> {
        let mut pin = PinDriver::input_output_od(pin)?;
        pin.set_pull(Pull::Up)?;
        pin.set_high()?;
        Ok(Self { pin, delay: Ets })
    }

    fn read_celsius(&mut self) -> Option<f32> {
        if let Err(err) = self.pin.set_high() {
            warn!("failed to set DHT11 line high before read: {err:?}");
            return None;
        }

        match dht11::blocking::read(&mut self.delay, &mut self.pin) {
            Ok(reading) => Some(f32::from(reading.temperature)),
            Err(err) => {
                warn!("failed to read DHT11 on GPIO{DHT11_PIN}: {err:?}");
                None
            }
        }
    }
}

impl NvsStore {
    fn load_settings(&self) -> anyhow::Result<PersistedSettings> {
        let nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let mut buffer = vec![0_u8; 1024];

        match nvs.get_str(NVS_SETTINGS_KEY, &mut buffer)? {
            Some(value) => Ok(PersistedSettings::decode(value)?),
            None => Ok(PersistedSettings::default()),
        }
    }

    fn save_settings(&self, settings: &PersistedSettings) -> anyhow::Result<()> {
        let mut nvs = EspNvs::new(self.partition.clone(), NVS_NAMESPACE, true)?;
        let payload = settings.encode()?;
        nvs.set_str(NVS_SETTINGS_KEY, &payload)?;
        Ok(())
    }
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_svc::sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_init(&config) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_init failed with code {}", rc))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_svc::sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if rc == esp_idf_svc::sys::ESP_OK || rc == esp_idf_svc::sys::ESP_ERR_INVALID_STATE {
        return Ok(());
    }
    Err(anyhow!("esp_task_wdt_add failed with code {}", rc))
}

fn feed_watchdog() {
    let _ = unsafe { esp_idf_svc::sys::esp_task_wdt_reset() };
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
