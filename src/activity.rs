use serde::{Deserialize, Serialize};

use greenworks_api::OperatingStatus;

/// High-level mower state exposed by the lawn mower entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Idle,
    Mowing,
    Docked,
    Paused,
    Error,
}

/// Keyword rules for firmware that reports a text state instead of a code.
/// Checked in order, first hit wins.
const TEXT_RULES: &[(&[&str], Activity)] = &[
    (&["mowing", "cutting"], Activity::Mowing),
    (&["charging", "docked"], Activity::Docked),
    (&["paused", "stopped"], Activity::Paused),
    (&["returning"], Activity::Docked),
    (&["error"], Activity::Error),
];

impl Activity {
    /// Map an integer vendor state code. This table is canonical.
    #[must_use]
    pub const fn from_code(code: i64) -> Self {
        match code {
            // stop button pressed, parked by user, paused
            1..=3 => Self::Paused,
            4 => Self::Mowing,
            // leaving station, searching for station, charging
            5..=7 => Self::Docked,
            _ => Self::Idle,
        }
    }

    #[must_use]
    pub fn from_text(text: &str) -> Self {
        let text = text.to_lowercase();
        TEXT_RULES
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|kw| text.contains(kw)))
            .map_or(Self::Idle, |(_, activity)| *activity)
    }

    /// Derive the activity from a reported status. Total: every input,
    /// including an empty status, yields a value.
    #[must_use]
    pub fn from_status(status: &OperatingStatus) -> Self {
        match (status.code, &status.text) {
            (Some(code), _) => Self::from_code(code),
            (None, Some(text)) => Self::from_text(text),
            (None, None) => Self::Idle,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Mowing => "mowing",
            Self::Docked => "docked",
            Self::Paused => "paused",
            Self::Error => "error",
        }
    }
}
