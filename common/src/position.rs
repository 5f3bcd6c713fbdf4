//! Endstop combination to [`Position`].
//!
//! The low endstop is seated only at the closed stop. The high endstop is
//! seated in the short band just after the mechanism leaves the closed stop.
//! Past that band both are free, which looks the same whether the window is
//! fully open or still travelling, so the direction of the last automatic
//! travel decides:
//!
//! | low    | high   | last travel | position        |
//! |--------|--------|-------------|-----------------|
//! | seated | free   | any         | `FullyClosed`   |
//! | free   | seated | any         | `PartiallyOpen` |
//! | seated | seated | any         | `Ambiguous`     |
//! | free   | free   | `Open`      | `FullyOpen`     |
//! | free   | free   | `Close`     | `PartiallyOpen` |
//! | free   | free   | none        | `Ambiguous`     |

use crate::types::{Direction, Position};

pub fn resolve(low_seated: bool, high_seated: bool, last_travel: Option<Direction>) -> Position {
    match (low_seated, high_seated) {
        (true, false) => Position::FullyClosed,
        (false, true) => Position::PartiallyOpen,
        (true, true) => Position::Ambiguous,
        (false, false) => match last_travel {
            Some(Direction::Open) => Position::FullyOpen,
            Some(Direction::Close) => Position::PartiallyOpen,
            None => Position::Ambiguous,
        },
    }
}

/// Position an automatic operation in `direction` ends at.
pub fn terminal_for(direction: Direction) -> Position {
    match direction {
        Direction::Open => Position::FullyOpen,
        Direction::Close => Position::FullyClosed,
    }
}
