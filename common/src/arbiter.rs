//! Single owner of [`OperationState`].
//!
//! Automatic operations end only at their terminal endstop combination.
//! Manual jogs bypass terminal detection entirely and leave the state `Idle`;
//! a jog issued mid-operation abandons that operation. A driving jog moves
//! the mechanism somewhere the endstops cannot pin down, so it also rewrites
//! the travel hint: jogging closed leaves `Close` (partially open at worst),
//! jogging open forgets the hint until an automatic or user open re-learns it.

use crate::{
    config::ControllerConfig,
    controller::ControllerAction,
    error::Rejection,
    position::terminal_for,
    types::{
        ActuationRequest, ActuatorCommand, Direction, JogCommand, OperationState, Position,
        RequestOrigin,
    },
};

#[derive(Debug, Clone, Copy)]
struct ActiveTravel {
    direction: Direction,
    started_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ActuationArbiter {
    state: OperationState,
    active: Option<ActiveTravel>,
    last_travel: Option<Direction>,
    jogging: bool,
    grace_ms: u64,
    overdue_ms: u64,
}

impl ActuationArbiter {
    pub fn new(config: &ControllerConfig, last_travel: Option<Direction>) -> Self {
        Self {
            state: OperationState::Idle,
            active: None,
            last_travel,
            jogging: false,
            grace_ms: config.actuation_grace_ms,
            overdue_ms: config.travel_overdue_ms,
        }
    }

    pub fn state(&self) -> OperationState {
        self.state
    }

    /// Direction of the running or most recent automatic operation.
    pub fn last_travel(&self) -> Option<Direction> {
        self.last_travel
    }

    /// A jog drive is running until its `Stop`.
    pub fn is_jogging(&self) -> bool {
        self.jogging
    }

    pub fn in_progress(&self) -> bool {
        !self.state.is_idle()
    }

    pub fn is_overdue(&self, now_ms: u64) -> bool {
        self.active
            .map(|travel| now_ms.saturating_sub(travel.started_ms) >= self.overdue_ms)
            .unwrap_or(false)
    }

    pub fn request(
        &mut self,
        request: ActuationRequest,
        origin: RequestOrigin,
        position: Position,
        now_ms: u64,
    ) -> Result<Vec<ControllerAction>, Rejection> {
        if self.in_progress() {
            return Err(Rejection::Busy(self.state));
        }

        if position == Position::Ambiguous && origin == RequestOrigin::Automatic {
            return Err(Rejection::AmbiguousPosition);
        }

        let direction = request.direction();
        if position == terminal_for(direction) {
            return Err(Rejection::AlreadyThere(position));
        }

        self.state = match direction {
            Direction::Open => OperationState::Opening,
            Direction::Close => OperationState::Closing,
        };
        self.active = Some(ActiveTravel {
            direction,
            started_ms: now_ms,
        });
        self.last_travel = Some(direction);
        self.jogging = false;

        let mut actions = vec![ControllerAction::Actuate(ActuatorCommand::drive(direction))];
        if self.grace_ms > 0 {
            // Lets the mechanism leave the seated endstop before readings count.
            actions.push(ControllerAction::Delay(self.grace_ms));
        }
        Ok(actions)
    }

    /// Terminal detection. Called with every freshly resolved position.
    pub fn on_position(&mut self, position: Position, now_ms: u64) -> Vec<ControllerAction> {
        let Some(travel) = self.active else {
            return Vec::new();
        };

        if now_ms.saturating_sub(travel.started_ms) < self.grace_ms {
            return Vec::new();
        }

        if position != terminal_for(travel.direction) {
            return Vec::new();
        }

        self.finish();
        vec![ControllerAction::Actuate(ActuatorCommand::Stop)]
    }

    pub fn jog(&mut self, jog: JogCommand) -> Vec<ControllerAction> {
        if self.active.is_some() {
            self.finish();
        }
        match jog {
            JogCommand::Open => {
                self.last_travel = None;
                self.jogging = true;
            }
            JogCommand::Close => {
                self.last_travel = Some(Direction::Close);
                self.jogging = true;
            }
            JogCommand::Stop => self.jogging = false,
        }
        vec![ControllerAction::Actuate(jog.command())]
    }

    fn finish(&mut self) {
        self.state = OperationState::Idle;
        self.active = None;
    }
}
