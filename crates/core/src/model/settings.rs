use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionSettingsError {
    #[error("max duration must be > 0 seconds")]
    InvalidMaxDuration,

    #[error("warning percent must be between 1 and 99")]
    InvalidWarningPercent,
}

//
// ─── SETTINGS ──────────────────────────────────────────────────────────────────
//

/// Limits applied to every practice session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    max_duration_secs: u32,
    warning_percent: u8,
}

impl SessionSettings {
    /// One hour ceiling with a warning at 75% of it.
    pub const DEFAULT_MAX_DURATION_SECS: u32 = 3_600;
    pub const DEFAULT_WARNING_PERCENT: u8 = 75;

    /// Creates custom session settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionSettingsError` if the ceiling is zero or the warning
    /// percent is outside `1..=99`.
    pub fn new(max_duration_secs: u32, warning_percent: u8) -> Result<Self, SessionSettingsError> {
        if max_duration_secs == 0 {
            return Err(SessionSettingsError::InvalidMaxDuration);
        }
        if !(1..=99).contains(&warning_percent) {
            return Err(SessionSettingsError::InvalidWarningPercent);
        }
        Ok(Self {
            max_duration_secs,
            warning_percent,
        })
    }

    /// Default warning percent with a custom ceiling.
    ///
    /// # Errors
    ///
    /// Returns `SessionSettingsError::InvalidMaxDuration` if `max_duration_secs` is zero.
    pub fn with_max_duration(max_duration_secs: u32) -> Result<Self, SessionSettingsError> {
        Self::new(max_duration_secs, Self::DEFAULT_WARNING_PERCENT)
    }

    #[must_use]
    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration_secs
    }

    #[must_use]
    pub fn warning_percent(&self) -> u8 {
        self.warning_percent
    }

    /// True once `elapsed` has reached the warning share of the ceiling.
    #[must_use]
    pub fn is_past_warning(&self, elapsed: u32) -> bool {
        u64::from(elapsed) * 100 >= u64::from(self.max_duration_secs) * u64::from(self.warning_percent)
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_duration_secs: Self::DEFAULT_MAX_DURATION_SECS,
            warning_percent: Self::DEFAULT_WARNING_PERCENT,
        }
    }
}
