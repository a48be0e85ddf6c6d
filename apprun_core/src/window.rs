//! Window configuration requested by the host.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::str::FromStr;

/// Name of the configuration page produced by [`WindowSetup::prc_data`].
pub const WINDOW_PAGE_NAME: &str = "setupWindow";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    Hidden,
    Onscreen,
    Fullscreen,
    Embedded,
}

impl WindowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowType::Hidden => "hidden",
            WindowType::Onscreen => "onscreen",
            WindowType::Fullscreen => "fullscreen",
            WindowType::Embedded => "embedded",
        }
    }
}

impl FromStr for WindowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hidden" => Ok(WindowType::Hidden),
            "onscreen" => Ok(WindowType::Onscreen),
            "fullscreen" => Ok(WindowType::Fullscreen),
            "embedded" => Ok(WindowType::Embedded),
            other => Err(format!("unknown window type '{other}'")),
        }
    }
}

/// Parameters of one `setupWindow` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSetup {
    pub window_type: WindowType,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    /// Native handle of the embedding window, used when embedded.
    pub parent: u64,
    pub subprocess_window: String,
}

impl WindowSetup {
    pub fn new(window_type: WindowType) -> Self {
        Self {
            window_type,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            parent: 0,
            subprocess_window: String::new(),
        }
    }

    fn is_embedded(&self) -> bool {
        self.window_type == WindowType::Embedded
    }

    fn wants_origin(&self) -> bool {
        self.x != 0 || self.y != 0 || self.is_embedded()
    }

    fn wants_size(&self) -> bool {
        self.width != 0 || self.height != 0
    }

    /// Configuration page text for a window that has not been opened yet.
    pub fn prc_data(&self) -> String {
        let mut data = String::new();
        data.push_str(if self.window_type == WindowType::Hidden {
            "window-type none\n"
        } else {
            "window-type onscreen\n"
        });
        data.push_str(if self.window_type == WindowType::Fullscreen {
            "fullscreen 1\n"
        } else {
            "fullscreen 0\n"
        });
        if self.is_embedded() {
            let _ = write!(
                data,
                "parent-window-handle {}\nsubprocess-window {}\n",
                self.parent, self.subprocess_window
            );
        } else {
            data.push_str("parent-window-handle 0\nsubprocess-window \n");
        }
        if self.wants_origin() {
            let _ = writeln!(data, "win-origin {} {}", self.x, self.y);
        }
        if self.wants_size() {
            let _ = writeln!(data, "win-size {} {}", self.width, self.height);
        }
        data
    }

    /// Live changes to request from an already open window.
    pub fn live_properties(&self) -> WindowProperties {
        WindowProperties {
            origin: self.wants_origin().then_some((self.x, self.y)),
            size: self.wants_size().then_some((self.width, self.height)),
            subprocess_window: (!self.subprocess_window.is_empty())
                .then(|| self.subprocess_window.clone()),
        }
    }
}

/// A partial set of window properties; `None` leaves a property unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowProperties {
    pub origin: Option<(i32, i32)>,
    pub size: Option<(i32, i32)>,
    pub subprocess_window: Option<String>,
}

/// The open application window, supplied by the windowing layer.
pub trait WindowHandle: Send + Sync {
    fn request_properties(&self, properties: WindowProperties);
}
