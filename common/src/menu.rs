//! Encoder menu navigation. Turns detents and clicks into [`MenuEvent`]s;
//! drawing the menu is the display driver's business.

use crate::{
    config::{PersistedSettings, SettingField},
    controller::MenuEvent,
    types::JogCommand,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Open,
    Close,
    Setting(SettingField),
    Jog,
    Reset,
    Exit,
}

impl MenuItem {
    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Setting(SettingField::HighTemp) => "Temp. open",
            Self::Setting(SettingField::LowTemp) => "Temp. close",
            Self::Setting(SettingField::CheckPeriod) => "PERIOD (s)",
            Self::Setting(SettingField::DisplayTimeout) => "DISPLAY (s)",
            Self::Setting(SettingField::TempCorrection) => "Temp. corr.",
            Self::Setting(SettingField::Inverted) => "Invert",
            Self::Jog => "JOG",
            Self::Reset => "RESET",
            Self::Exit => "<<< EXIT",
        }
    }
}

pub const MENU_ITEMS: [MenuItem; 11] = [
    MenuItem::Open,
    MenuItem::Close,
    MenuItem::Setting(SettingField::HighTemp),
    MenuItem::Setting(SettingField::LowTemp),
    MenuItem::Setting(SettingField::CheckPeriod),
    MenuItem::Setting(SettingField::DisplayTimeout),
    MenuItem::Setting(SettingField::TempCorrection),
    MenuItem::Setting(SettingField::Inverted),
    MenuItem::Jog,
    MenuItem::Reset,
    MenuItem::Exit,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuMode {
    /// Main screen, menu hidden.
    Home,
    Browsing(usize),
    Editing(SettingField),
    /// Turning drives the actuator directly, a click stops it.
    Jogging,
}

#[derive(Debug, Clone)]
pub struct MenuNavigator {
    mode: MenuMode,
}

impl Default for MenuNavigator {
    fn default() -> Self {
        Self::new()
    }
}

impl MenuNavigator {
    pub fn new() -> Self {
        Self {
            mode: MenuMode::Home,
        }
    }

    pub fn mode(&self) -> MenuMode {
        self.mode
    }

    pub fn selected(&self) -> Option<MenuItem> {
        match self.mode {
            MenuMode::Browsing(index) => MENU_ITEMS.get(index).copied(),
            MenuMode::Editing(field) => Some(MenuItem::Setting(field)),
            MenuMode::Jogging => Some(MenuItem::Jog),
            MenuMode::Home => None,
        }
    }

    /// Back to the main screen, e.g. when the display powers down.
    pub fn home(&mut self) {
        self.mode = MenuMode::Home;
    }

    /// `clicks` is positive clockwise.
    pub fn rotate(&mut self, clicks: i32, settings: &PersistedSettings) -> MenuEvent {
        match self.mode {
            MenuMode::Home => MenuEvent::Activity,
            MenuMode::Browsing(index) => {
                let len = MENU_ITEMS.len() as i32;
                let next = (index as i32 + clicks).rem_euclid(len);
                self.mode = MenuMode::Browsing(next as usize);
                MenuEvent::Activity
            }
            MenuMode::Editing(field) => MenuEvent::ConfigChanged(settings.stepped(field, clicks)),
            MenuMode::Jogging => match clicks.signum() {
                1 => MenuEvent::ManualJog(JogCommand::Open),
                -1 => MenuEvent::ManualJog(JogCommand::Close),
                _ => MenuEvent::Activity,
            },
        }
    }

    pub fn click(&mut self) -> MenuEvent {
        match self.mode {
            MenuMode::Home => {
                self.mode = MenuMode::Browsing(0);
                MenuEvent::Activity
            }
            MenuMode::Browsing(index) => {
                let Some(item) = MENU_ITEMS.get(index).copied() else {
                    self.mode = MenuMode::Home;
                    return MenuEvent::Activity;
                };
                match item {
                    MenuItem::Open => {
                        self.mode = MenuMode::Home;
                        MenuEvent::OpenRequested
                    }
                    MenuItem::Close => {
                        self.mode = MenuMode::Home;
                        MenuEvent::CloseRequested
                    }
                    MenuItem::Setting(field) => {
                        self.mode = MenuMode::Editing(field);
                        MenuEvent::Activity
                    }
                    MenuItem::Jog => {
                        self.mode = MenuMode::Jogging;
                        MenuEvent::Activity
                    }
                    MenuItem::Reset => {
                        self.mode = MenuMode::Home;
                        MenuEvent::ResetRequested
                    }
                    MenuItem::Exit => {
                        self.mode = MenuMode::Home;
                        MenuEvent::Activity
                    }
                }
            }
            MenuMode::Editing(field) => {
                self.mode = MenuMode::Browsing(index_of(MenuItem::Setting(field)));
                MenuEvent::Activity
            }
            MenuMode::Jogging => {
                self.mode = MenuMode::Browsing(index_of(MenuItem::Jog));
                MenuEvent::ManualJog(JogCommand::Stop)
            }
        }
    }
}

fn index_of(item: MenuItem) -> usize {
    MENU_ITEMS
        .iter()
        .position(|candidate| *candidate == item)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::SettingChange;

    fn browse_to(menu: &mut MenuNavigator, item: MenuItem) {
        let settings = PersistedSettings::default();
        menu.home();
        menu.click();
        menu.rotate(index_of(item) as i32, &settings);
        assert_eq!(menu.selected(), Some(item));
    }

    #[test]
    fn first_click_opens_menu_without_acting() {
        let mut menu = MenuNavigator::new();
        assert_eq!(menu.click(), MenuEvent::Activity);
        assert_eq!(menu.selected(), Some(MenuItem::Open));
    }

    #[test]
    fn open_and_close_items_issue_requests() {
        let mut menu = MenuNavigator::new();

        browse_to(&mut menu, MenuItem::Open);
        assert_eq!(menu.click(), MenuEvent::OpenRequested);
        assert_eq!(menu.mode(), MenuMode::Home);

        browse_to(&mut menu, MenuItem::Close);
        assert_eq!(menu.click(), MenuEvent::CloseRequested);
    }

    #[test]
    fn browsing_wraps_both_ways() {
        let settings = PersistedSettings::default();
        let mut menu = MenuNavigator::new();
        menu.click();

        menu.rotate(-1, &settings);
        assert_eq!(menu.selected(), Some(MenuItem::Exit));
        menu.rotate(2, &settings);
        assert_eq!(menu.selected(), Some(MenuItem::Close));
    }

    #[test]
    fn editing_steps_the_selected_setting() {
        let settings = PersistedSettings::default();
        let mut menu = MenuNavigator::new();
        browse_to(&mut menu, MenuItem::Setting(SettingField::HighTemp));
        menu.click();

        assert_eq!(
            menu.rotate(2, &settings),
            MenuEvent::ConfigChanged(SettingChange::HighTemp(26.0))
        );
        assert_eq!(
            menu.rotate(-3, &settings),
            MenuEvent::ConfigChanged(SettingChange::HighTemp(23.5))
        );

        assert_eq!(menu.click(), MenuEvent::Activity);
        assert_eq!(
            menu.selected(),
            Some(MenuItem::Setting(SettingField::HighTemp))
        );
        assert_eq!(menu.mode(), MenuMode::Browsing(2));
    }

    #[test]
    fn jog_mode_drives_by_direction_and_click_stops() {
        let settings = PersistedSettings::default();
        let mut menu = MenuNavigator::new();
        browse_to(&mut menu, MenuItem::Jog);
        menu.click();

        assert_eq!(
            menu.rotate(1, &settings),
            MenuEvent::ManualJog(JogCommand::Open)
        );
        assert_eq!(
            menu.rotate(-4, &settings),
            MenuEvent::ManualJog(JogCommand::Close)
        );
        assert_eq!(menu.click(), MenuEvent::ManualJog(JogCommand::Stop));
        assert_eq!(menu.selected(), Some(MenuItem::Jog));
    }

    #[test]
    fn reset_and_exit_return_home() {
        let mut menu = MenuNavigator::new();

        browse_to(&mut menu, MenuItem::Reset);
        assert_eq!(menu.click(), MenuEvent::ResetRequested);
        assert_eq!(menu.mode(), MenuMode::Home);

        browse_to(&mut menu, MenuItem::Exit);
        assert_eq!(menu.click(), MenuEvent::Activity);
        assert_eq!(menu.mode(), MenuMode::Home);
    }

    #[test]
    fn turning_on_home_screen_is_only_activity() {
        let mut menu = MenuNavigator::new();
        assert_eq!(
            menu.rotate(5, &PersistedSettings::default()),
            MenuEvent::Activity
        );
        assert_eq!(menu.mode(), MenuMode::Home);
    }
}
