use crate::{
    arbiter::ActuationArbiter,
    config::{ControllerConfig, PersistedSettings, SettingChange},
    debounce::{DebouncedInput, RawSample},
    error::{EventError, Rejection, SensorInvalid},
    hysteresis::{self, TemperatureTracker},
    position,
    retained::RetainedState,
    sleep::{self, DisplayIdleTimer, SleepInstruction},
    types::{
        ActuationRequest, ActuatorCommand, ControllerStatus, JogCommand, OperationState, Position,
        RequestOrigin, WakeCause,
    },
};

/// Side effects for the front-end to execute, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerAction {
    Actuate(ActuatorCommand),
    /// Blocking pause before the next action or tick.
    Delay(u64),
    Render,
    DisplayPower(bool),
    SaveSettings,
    Sleep(SleepInstruction),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MenuEvent {
    OpenRequested,
    CloseRequested,
    ManualJog(JogCommand),
    ConfigChanged(SettingChange),
    ResetRequested,
    /// Encoder turn or click that only navigates.
    Activity,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventOutcome {
    pub actions: Vec<ControllerAction>,
    pub result: Result<(), EventError>,
}

/// What the platform knows at boot, before the first tick.
#[derive(Debug, Clone, Copy)]
pub struct BootContext {
    pub wake_cause: WakeCause,
    pub retained: RetainedState,
    pub low_seated: bool,
    pub high_seated: bool,
}

/// Every piece of mutable controller state, owned in one place.
#[derive(Debug, Clone)]
pub struct WindowController {
    pub config: ControllerConfig,
    settings: PersistedSettings,

    low: DebouncedInput,
    high: DebouncedInput,
    position: Position,
    arbiter: ActuationArbiter,

    temperature: TemperatureTracker,
    battery_percent: Option<u8>,

    display: DisplayIdleTimer,
    display_on: bool,
    wake_cause: WakeCause,

    last_evaluation_ms: Option<u64>,
    render_pending: bool,
    last_rejection: Option<Rejection>,
}

impl WindowController {
    pub fn new(
        config: ControllerConfig,
        mut settings: PersistedSettings,
        boot: BootContext,
        now_ms: u64,
    ) -> Self {
        settings.sanitize();
        let arbiter = ActuationArbiter::new(&config, boot.retained.last_travel);
        let position = position::resolve(boot.low_seated, boot.high_seated, arbiter.last_travel());

        Self {
            low: DebouncedInput::new(boot.low_seated, config.debounce_ms, now_ms),
            high: DebouncedInput::new(boot.high_seated, config.debounce_ms, now_ms),
            position,
            arbiter,
            temperature: TemperatureTracker::with_last_known(boot.retained.last_temp_c),
            battery_percent: None,
            display: DisplayIdleTimer::for_wake(
                boot.wake_cause,
                settings.display_timeout_ms,
                now_ms,
            ),
            display_on: boot.retained.oled_enabled,
            wake_cause: boot.wake_cause,
            last_evaluation_ms: None,
            render_pending: true,
            last_rejection: None,
            config,
            settings,
        }
    }

    pub fn settings(&self) -> &PersistedSettings {
        &self.settings
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn operation_state(&self) -> OperationState {
        self.arbiter.state()
    }

    /// Gate for the "operation in progress" indicator.
    pub fn in_progress(&self) -> bool {
        self.arbiter.in_progress()
    }

    pub fn wake_cause(&self) -> WakeCause {
        self.wake_cause
    }

    pub fn is_display_on(&self) -> bool {
        self.display_on
    }

    pub fn current_temp_c(&self) -> Option<f32> {
        self.temperature.current_c()
    }

    pub fn battery_percent(&self) -> Option<u8> {
        self.battery_percent
    }

    pub fn update_temperature(&mut self, raw_c: f32, now_ms: u64) -> Result<f32, SensorInvalid> {
        let corrected = self.temperature.update(
            raw_c,
            self.settings.temp_correction_c,
            &self.config,
            now_ms,
        )?;
        self.render_pending = true;
        Ok(corrected)
    }

    pub fn update_battery(&mut self, percent: u8) {
        let percent = percent.min(100);
        if self.battery_percent != Some(percent) {
            self.battery_percent = Some(percent);
            self.render_pending = true;
        }
    }

    pub fn handle_event(&mut self, event: MenuEvent, now_ms: u64) -> EventOutcome {
        let mut actions = Vec::new();
        self.display.touch(now_ms);
        if !self.display_on {
            self.display_on = true;
            actions.push(ControllerAction::DisplayPower(true));
        }
        self.render_pending = true;

        let result = match event {
            MenuEvent::OpenRequested => self.user_request(ActuationRequest::Open, now_ms, &mut actions),
            MenuEvent::CloseRequested => {
                self.user_request(ActuationRequest::Close, now_ms, &mut actions)
            }
            MenuEvent::ManualJog(jog) => {
                actions.extend(self.arbiter.jog(jog));
                self.refresh_position();
                Ok(())
            }
            MenuEvent::ConfigChanged(change) => match self.settings.apply(change) {
                Ok(changed) => {
                    if changed {
                        self.display.set_timeout(self.settings.display_timeout_ms);
                        actions.push(ControllerAction::SaveSettings);
                    }
                    Ok(())
                }
                Err(err) => Err(err.into()),
            },
            MenuEvent::ResetRequested => {
                self.settings = PersistedSettings::default();
                self.display.set_timeout(self.settings.display_timeout_ms);
                actions.push(ControllerAction::SaveSettings);
                Ok(())
            }
            MenuEvent::Activity => Ok(()),
        };

        EventOutcome {
            actions: self.oriented(actions),
            result,
        }
    }

    pub fn tick(
        &mut self,
        now_ms: u64,
        low: impl Into<RawSample>,
        high: impl Into<RawSample>,
    ) -> Vec<ControllerAction> {
        let mut actions = Vec::new();

        let low_changed = self.low.ingest(low.into(), now_ms).is_some();
        let high_changed = self.high.ingest(high.into(), now_ms).is_some();
        if low_changed || high_changed {
            self.refresh_position();
        }

        let finished = self.arbiter.on_position(self.position, now_ms);
        if !finished.is_empty() {
            self.render_pending = true;
            actions.extend(finished);
        }

        // The operator has the mechanism while a jog drives.
        if self.evaluation_due(now_ms) && !self.arbiter.is_jogging() {
            self.last_evaluation_ms = Some(now_ms);
            self.evaluate_hysteresis(now_ms, &mut actions);
        }

        let display_wanted = !self.display.expired(now_ms);
        if !display_wanted && self.arbiter.is_jogging() {
            actions.extend(self.arbiter.jog(JogCommand::Stop));
        }
        if display_wanted != self.display_on {
            self.display_on = display_wanted;
            self.render_pending |= display_wanted;
            actions.push(ControllerAction::DisplayPower(display_wanted));
        }

        if self.render_pending {
            self.render_pending = false;
            if self.display_on {
                actions.push(ControllerAction::Render);
            }
        }

        if self.last_evaluation_ms.is_some()
            && sleep::should_sleep(self.display.expired(now_ms), self.arbiter.state())
        {
            actions.push(ControllerAction::Sleep(sleep::sleep_instruction(
                &self.settings,
            )));
        }

        self.oriented(actions)
    }

    /// Snapshot to carry through the next halt.
    pub fn retained(&self) -> RetainedState {
        RetainedState {
            oled_enabled: self.display_on,
            last_travel: self.arbiter.last_travel(),
            last_temp_c: self.temperature.current_c(),
        }
    }

    pub fn status(&self, now_ms: u64) -> ControllerStatus {
        ControllerStatus {
            current_temp: self.temperature.current_c(),
            sensor_valid: self.temperature.is_valid(),
            reading_age_ms: self
                .temperature
                .last_update_ms()
                .map(|at| now_ms.saturating_sub(at)),
            battery_percent: self.battery_percent,
            low_temp: self.settings.low_temp_c,
            high_temp: self.settings.high_temp_c,
            check_period_s: self.settings.check_period_s,
            position: self.position.as_str(),
            operation: self.arbiter.state().as_str(),
            in_progress: self.arbiter.in_progress(),
            travel_overdue: self.arbiter.is_overdue(now_ms),
            wake_cause: self.wake_cause.as_str(),
            display_on: self.display_on,
            last_rejection: self.last_rejection.map(|rejection| rejection.to_string()),
        }
    }

    fn user_request(
        &mut self,
        request: ActuationRequest,
        now_ms: u64,
        actions: &mut Vec<ControllerAction>,
    ) -> Result<(), EventError> {
        match self
            .arbiter
            .request(request, RequestOrigin::User, self.position, now_ms)
        {
            Ok(started) => {
                actions.extend(started);
                self.last_rejection = None;
                self.refresh_position();
                Ok(())
            }
            Err(rejection) => {
                self.last_rejection = Some(rejection);
                Err(rejection.into())
            }
        }
    }

    fn evaluation_due(&self, now_ms: u64) -> bool {
        self.last_evaluation_ms
            .map(|last| now_ms.saturating_sub(last) >= self.config.evaluate_interval_ms)
            .unwrap_or(true)
    }

    fn evaluate_hysteresis(&mut self, now_ms: u64, actions: &mut Vec<ControllerAction>) {
        if !self.temperature.is_valid() {
            return;
        }
        let Some(temp_c) = self.temperature.current_c() else {
            return;
        };
        let Some(request) = hysteresis::evaluate(temp_c, &self.settings, self.position) else {
            return;
        };

        match self
            .arbiter
            .request(request, RequestOrigin::Automatic, self.position, now_ms)
        {
            Ok(started) => {
                actions.extend(started);
                self.render_pending = true;
                self.refresh_position();
            }
            // The running operation already covers it.
            Err(Rejection::Busy(_)) => {}
            Err(rejection) => self.last_rejection = Some(rejection),
        }
    }

    fn refresh_position(&mut self) {
        let resolved = position::resolve(
            self.low.confirmed(),
            self.high.confirmed(),
            self.arbiter.last_travel(),
        );
        if resolved != self.position {
            self.position = resolved;
            self.render_pending = true;
        }
    }

    fn oriented(&self, mut actions: Vec<ControllerAction>) -> Vec<ControllerAction> {
        for action in &mut actions {
            if let ControllerAction::Actuate(command) = action {
                *command = command.oriented(self.settings.inverted);
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        debounce::EndstopLatch,
        error::SettingsError,
        sleep::WakeSignal,
        types::Direction,
    };

    fn boot(wake_cause: WakeCause, low: bool, high: bool) -> BootContext {
        BootContext {
            wake_cause,
            retained: RetainedState::default(),
            low_seated: low,
            high_seated: high,
        }
    }

    fn controller(boot: BootContext) -> WindowController {
        WindowController::new(
            ControllerConfig::default(),
            PersistedSettings::default(),
            boot,
            0,
        )
    }

    /// Ticks every 10 ms over `[from, to)` with steady endstop levels.
    fn run(
        controller: &mut WindowController,
        from: u64,
        to: u64,
        low: bool,
        high: bool,
    ) -> Vec<ControllerAction> {
        let mut actions = Vec::new();
        let mut now = from;
        while now < to {
            actions.extend(controller.tick(now, low, high));
            now += 10;
        }
        actions
    }

    fn actuations(actions: &[ControllerAction]) -> Vec<ActuatorCommand> {
        actions
            .iter()
            .filter_map(|action| match action {
                ControllerAction::Actuate(command) => Some(*command),
                _ => None,
            })
            .collect()
    }

    fn sleeps(actions: &[ControllerAction]) -> usize {
        actions
            .iter()
            .filter(|action| matches!(action, ControllerAction::Sleep(_)))
            .count()
    }

    #[test]
    fn hot_room_opens_closed_window() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        assert_eq!(controller.position(), Position::FullyClosed);
        controller.update_temperature(26.0, 0).unwrap();

        let actions = controller.tick(0, true, false);

        assert_eq!(
            actions[..2],
            [
                ControllerAction::Actuate(ActuatorCommand::DriveOpen),
                ControllerAction::Delay(1_500),
            ]
        );
        assert_eq!(controller.operation_state(), OperationState::Opening);
        assert!(controller.in_progress());
    }

    #[test]
    fn opening_stops_when_both_endstops_release() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.update_temperature(26.0, 0).unwrap();
        controller.tick(0, true, false);

        let leaving = run(&mut controller, 10, 500, false, true);
        assert!(actuations(&leaving).is_empty());
        assert_eq!(controller.position(), Position::PartiallyOpen);

        let arriving = run(&mut controller, 2_000, 2_100, false, false);

        assert_eq!(actuations(&arriving), vec![ActuatorCommand::Stop]);
        assert_eq!(controller.position(), Position::FullyOpen);
        assert_eq!(controller.operation_state(), OperationState::Idle);
    }

    #[test]
    fn close_request_while_opening_is_busy() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.update_temperature(26.0, 0).unwrap();
        controller.tick(0, true, false);

        let outcome = controller.handle_event(MenuEvent::CloseRequested, 100);

        assert_eq!(
            outcome.result,
            Err(EventError::Rejected(Rejection::Busy(OperationState::Opening)))
        );
        assert!(actuations(&outcome.actions).is_empty());
        assert_eq!(controller.operation_state(), OperationState::Opening);
        assert_eq!(
            controller.status(100).last_rejection.as_deref(),
            Some("actuator busy: OPENING in progress")
        );
    }

    #[test]
    fn contradictory_endstops_block_automatic_operation() {
        let mut controller = controller(boot(WakeCause::ColdBoot, true, true));
        controller.update_temperature(35.0, 0).unwrap();

        let actions = run(&mut controller, 0, 20_000, true, true);

        assert_eq!(controller.position(), Position::Ambiguous);
        assert!(actuations(&actions).is_empty());
        assert_eq!(controller.operation_state(), OperationState::Idle);
        assert_eq!(controller.status(20_000).position, "AMBIGUOUS");
    }

    #[test]
    fn timer_wake_opens_then_sleeps_after_terminal() {
        let mut boot = boot(WakeCause::TimerExpired, true, false);
        boot.retained = RetainedState {
            oled_enabled: false,
            last_travel: Some(Direction::Close),
            last_temp_c: Some(23.0),
        };
        let mut controller = controller(boot);
        controller.update_temperature(25.5, 0).unwrap();

        let first = controller.tick(0, true, false);
        assert_eq!(actuations(&first), vec![ActuatorCommand::DriveOpen]);
        assert_eq!(sleeps(&first), 0);

        let travelling = run(&mut controller, 1_500, 3_000, false, true);
        assert_eq!(sleeps(&travelling), 0);

        let arrived = run(&mut controller, 3_000, 3_100, false, false);
        assert_eq!(actuations(&arrived), vec![ActuatorCommand::Stop]);
        let stop_at = arrived
            .iter()
            .position(|action| *action == ControllerAction::Actuate(ActuatorCommand::Stop))
            .unwrap();
        let sleep_at = arrived
            .iter()
            .position(|action| matches!(action, ControllerAction::Sleep(_)))
            .unwrap();
        assert!(stop_at < sleep_at);
        assert_eq!(
            arrived[sleep_at],
            ControllerAction::Sleep(SleepInstruction::HaltUntilEither {
                timer: Duration::from_secs(20),
                signal: WakeSignal::Button,
            })
        );

        let all = [first, travelling, arrived].concat();
        assert!(!all.contains(&ControllerAction::DisplayPower(true)));
        assert!(!all.contains(&ControllerAction::Render));
    }

    #[test]
    fn timer_wake_in_band_sleeps_on_first_tick() {
        let mut boot = boot(WakeCause::TimerExpired, true, false);
        boot.retained.oled_enabled = false;
        let mut controller = controller(boot);
        controller.update_temperature(23.0, 0).unwrap();

        let actions = controller.tick(0, true, false);

        assert_eq!(sleeps(&actions), 1);
        assert!(actuations(&actions).is_empty());
    }

    #[test]
    fn sleep_is_vetoed_while_actuating() {
        let mut controller = controller(boot(WakeCause::TimerExpired, false, false));
        controller.handle_event(MenuEvent::OpenRequested, 0);

        // Display timeout long past, endstops never reach terminal.
        let actions = run(&mut controller, 0, 30_000, true, true);

        assert_eq!(sleeps(&actions), 0);
        assert!(!controller.status(30_000).travel_overdue);
        assert!(controller.status(60_000).travel_overdue);
    }

    #[test]
    fn cold_boot_without_history_recovers_through_user_open() {
        let mut controller = controller(boot(WakeCause::ColdBoot, false, false));
        assert_eq!(controller.position(), Position::Ambiguous);

        let outcome = controller.handle_event(MenuEvent::OpenRequested, 0);
        assert_eq!(outcome.result, Ok(()));
        assert_eq!(controller.position(), Position::FullyOpen);

        let actions = run(&mut controller, 10, 1_600, false, false);

        assert_eq!(actuations(&actions), vec![ActuatorCommand::Stop]);
        assert_eq!(controller.operation_state(), OperationState::Idle);
    }

    #[test]
    fn invalid_reading_skips_evaluation() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.update_temperature(26.0, 0).unwrap();
        assert!(controller.update_temperature(f32::NAN, 0).is_err());

        let skipped = controller.tick(0, true, false);
        assert!(actuations(&skipped).is_empty());
        assert_eq!(controller.current_temp_c(), Some(26.0));
        assert_eq!(controller.status(1_500).reading_age_ms, Some(1_500));

        controller.update_temperature(26.0, 4_000).unwrap();
        let resumed = run(&mut controller, 10, 5_010, true, false);
        assert_eq!(actuations(&resumed), vec![ActuatorCommand::DriveOpen]);
    }

    #[test]
    fn temperature_correction_applies_before_thresholds() {
        let mut settings = PersistedSettings::default();
        settings.temp_correction_c = 1.5;
        let mut controller = WindowController::new(
            ControllerConfig::default(),
            settings,
            boot(WakeCause::ExternalSignal, true, false),
            0,
        );

        assert_eq!(controller.update_temperature(23.5, 0), Ok(25.0));
        let actions = controller.tick(0, true, false);
        assert_eq!(actuations(&actions), vec![ActuatorCommand::DriveOpen]);
    }

    #[test]
    fn inverted_mechanism_swaps_drive_direction() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        let outcome =
            controller.handle_event(MenuEvent::ConfigChanged(SettingChange::Inverted(true)), 0);
        assert!(outcome.actions.contains(&ControllerAction::SaveSettings));

        let outcome = controller.handle_event(MenuEvent::OpenRequested, 10);

        assert_eq!(actuations(&outcome.actions), vec![ActuatorCommand::DriveClose]);
        assert_eq!(controller.operation_state(), OperationState::Opening);
    }

    #[test]
    fn manual_jog_drives_without_changing_state() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));

        let outcome = controller.handle_event(MenuEvent::ManualJog(JogCommand::Open), 0);
        assert_eq!(actuations(&outcome.actions), vec![ActuatorCommand::DriveOpen]);
        assert_eq!(controller.operation_state(), OperationState::Idle);

        // Endstops change under a jog but nothing terminates or stops.
        let actions = run(&mut controller, 10, 3_000, false, false);
        assert!(actuations(&actions).is_empty());
    }

    fn booted_with_hint(low: bool, high: bool, hint: Direction) -> WindowController {
        let retained = RetainedState {
            last_travel: Some(hint),
            ..RetainedState::default()
        };
        controller(BootContext {
            retained,
            ..boot(WakeCause::ExternalSignal, low, high)
        })
    }

    #[test]
    fn seated_endstop_read_at_boot_survives_latched_ticks() {
        let low_latch = EndstopLatch::new(false);
        let high_latch = EndstopLatch::new(false);
        low_latch.reset(true);
        high_latch.reset(false);
        let mut controller = booted_with_hint(true, false, Direction::Close);
        controller.update_temperature(18.0, 0).unwrap();

        let mut actions = Vec::new();
        for now in (0..120_000).step_by(10) {
            actions.extend(controller.tick(now, low_latch.take(), high_latch.take()));
        }

        assert_eq!(controller.position(), Position::FullyClosed);
        assert_eq!(controller.operation_state(), OperationState::Idle);
        assert!(actuations(&actions).is_empty());
        assert!(sleeps(&actions) > 0);
    }

    #[test]
    fn jogging_closed_from_fully_open_lets_a_hot_room_reopen() {
        let mut controller = booted_with_hint(false, false, Direction::Open);
        assert_eq!(controller.position(), Position::FullyOpen);

        controller.handle_event(MenuEvent::ManualJog(JogCommand::Close), 0);
        assert_eq!(controller.position(), Position::PartiallyOpen);
        controller.handle_event(MenuEvent::ManualJog(JogCommand::Stop), 1_000);
        controller.update_temperature(27.0, 1_000).unwrap();

        let actions = run(&mut controller, 1_000, 19_000, false, false);

        assert_eq!(
            actuations(&actions)[..2],
            [ActuatorCommand::DriveOpen, ActuatorCommand::Stop]
        );
        assert_eq!(controller.position(), Position::FullyOpen);
    }

    #[test]
    fn jogging_open_past_both_switches_is_ambiguous() {
        let mut controller = booted_with_hint(false, false, Direction::Close);
        assert_eq!(controller.position(), Position::PartiallyOpen);

        controller.handle_event(MenuEvent::ManualJog(JogCommand::Open), 0);
        controller.handle_event(MenuEvent::ManualJog(JogCommand::Stop), 500);
        run(&mut controller, 500, 1_000, false, false);

        assert_eq!(controller.position(), Position::Ambiguous);
        assert_eq!(controller.retained().last_travel, None);
    }

    #[test]
    fn hysteresis_waits_until_jog_ends() {
        let mut controller = booted_with_hint(false, false, Direction::Open);
        controller.update_temperature(27.0, 0).unwrap();

        let outcome = controller.handle_event(MenuEvent::ManualJog(JogCommand::Close), 0);
        assert_eq!(actuations(&outcome.actions), vec![ActuatorCommand::DriveClose]);
        let during_jog = run(&mut controller, 0, 4_000, false, false);
        assert!(actuations(&during_jog).is_empty());

        // Display timeout ends the jog, then automatic control resumes.
        let after = run(&mut controller, 4_000, 6_000, false, false);
        assert_eq!(
            actuations(&after),
            vec![ActuatorCommand::Stop, ActuatorCommand::DriveOpen]
        );
    }

    #[test]
    fn jog_overrides_automatic_operation() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.update_temperature(26.0, 0).unwrap();
        controller.tick(0, true, false);
        assert!(controller.in_progress());

        let outcome = controller.handle_event(MenuEvent::ManualJog(JogCommand::Stop), 200);

        assert_eq!(actuations(&outcome.actions), vec![ActuatorCommand::Stop]);
        assert_eq!(controller.operation_state(), OperationState::Idle);
    }

    #[test]
    fn requests_never_overlap() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, false, true));
        let events = [
            MenuEvent::OpenRequested,
            MenuEvent::CloseRequested,
            MenuEvent::OpenRequested,
            MenuEvent::ManualJog(JogCommand::Stop),
            MenuEvent::CloseRequested,
            MenuEvent::OpenRequested,
        ];

        let mut accepted = 0;
        for (step, event) in events.into_iter().enumerate() {
            let before = controller.operation_state();
            let outcome = controller.handle_event(event, step as u64 * 10);
            if matches!(event, MenuEvent::OpenRequested | MenuEvent::CloseRequested) {
                if before.is_idle() {
                    assert_eq!(outcome.result, Ok(()));
                    accepted += 1;
                } else {
                    assert_eq!(outcome.result, Err(EventError::Rejected(Rejection::Busy(before))));
                    assert_eq!(controller.operation_state(), before);
                }
            }
        }
        assert_eq!(accepted, 2);
    }

    #[test]
    fn invalid_setting_is_reported_and_not_saved() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));

        let outcome =
            controller.handle_event(MenuEvent::ConfigChanged(SettingChange::HighTemp(21.0)), 0);

        assert_eq!(
            outcome.result,
            Err(EventError::Settings(SettingsError::ThresholdOrder {
                low: 22.0,
                high: 21.0
            }))
        );
        assert!(!outcome.actions.contains(&ControllerAction::SaveSettings));
        assert_eq!(controller.settings().high_temp_c, 25.0);
    }

    #[test]
    fn reset_restores_defaults_and_saves() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.handle_event(MenuEvent::ConfigChanged(SettingChange::CheckPeriod(600)), 0);

        let outcome = controller.handle_event(MenuEvent::ResetRequested, 10);

        assert!(outcome.actions.contains(&ControllerAction::SaveSettings));
        assert_eq!(controller.settings(), &PersistedSettings::default());
    }

    #[test]
    fn display_powers_down_then_device_sleeps() {
        let mut boot = boot(WakeCause::ExternalSignal, true, false);
        boot.retained.oled_enabled = false;
        let mut controller = controller(boot);
        controller.update_temperature(23.0, 0).unwrap();

        let first = controller.tick(0, true, false);
        assert_eq!(
            first,
            vec![ControllerAction::DisplayPower(true), ControllerAction::Render]
        );

        let awake = run(&mut controller, 10, 5_000, true, false);
        assert_eq!(sleeps(&awake), 0);

        let expired = controller.tick(5_000, true, false);
        assert_eq!(expired[0], ControllerAction::DisplayPower(false));
        assert_eq!(sleeps(&expired), 1);
        assert!(!controller.retained().oled_enabled);
    }

    #[test]
    fn menu_activity_keeps_display_awake() {
        let mut controller = controller(boot(WakeCause::ColdBoot, true, false));
        controller.tick(0, true, false);

        controller.handle_event(MenuEvent::Activity, 4_000);
        let actions = run(&mut controller, 4_000, 8_990, true, false);

        assert_eq!(sleeps(&actions), 0);
        assert!(controller.is_display_on());
    }

    #[test]
    fn retained_snapshot_carries_travel_and_temperature() {
        let mut controller = controller(boot(WakeCause::ExternalSignal, true, false));
        controller.update_temperature(26.0, 0).unwrap();
        controller.tick(0, true, false);

        let retained = controller.retained();

        assert_eq!(retained.last_travel, Some(Direction::Open));
        assert_eq!(retained.last_temp_c, Some(26.0));

        let rebooted = WindowController::new(
            ControllerConfig::default(),
            PersistedSettings::default(),
            BootContext {
                wake_cause: WakeCause::TimerExpired,
                retained: RetainedState::restore(&retained.encode()),
                low_seated: false,
                high_seated: false,
            },
            0,
        );
        assert_eq!(rebooted.position(), Position::FullyOpen);
        assert_eq!(rebooted.current_temp_c(), Some(26.0));
    }

    #[test]
    fn battery_level_passes_through() {
        let mut controller = controller(boot(WakeCause::ColdBoot, true, false));
        controller.update_battery(140);
        assert_eq!(controller.battery_percent(), Some(100));
        assert_eq!(controller.status(0).battery_percent, Some(100));
    }
}
