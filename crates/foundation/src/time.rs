/// How the two times of a selection combine when filtering cells.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum TimeMode {
    /// Never sent on the wire.
    #[default]
    Unset = 0,
    /// Everything up to `t0`.
    Before = 1,
    /// Everything from `t1` on.
    After = 2,
    Or = 3,
    And = 4,
    Xor = 5,
}

impl TimeMode {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_set(self) -> bool {
        self != TimeMode::Unset
    }

    /// Next mode in the selector's cycle; `Xor` wraps to `Before`.
    pub fn next(self) -> Self {
        match self {
            TimeMode::Unset | TimeMode::Xor => TimeMode::Before,
            TimeMode::Before => TimeMode::After,
            TimeMode::After => TimeMode::Or,
            TimeMode::Or => TimeMode::And,
            TimeMode::And => TimeMode::Xor,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TimeMode::Unset => "_INITIALISED_",
            TimeMode::Before => "< ONLY",
            TimeMode::After => "ONLY >",
            TimeMode::Or => "< OR >",
            TimeMode::And => "< AND >",
            TimeMode::Xor => "< XOR >",
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InvalidTimeMode(pub u8);

impl std::fmt::Display for InvalidTimeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid time mode: {}", self.0)
    }
}

impl std::error::Error for InvalidTimeMode {}

impl TryFrom<u8> for TimeMode {
    type Error = InvalidTimeMode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TimeMode::Unset),
            1 => Ok(TimeMode::Before),
            2 => Ok(TimeMode::After),
            3 => Ok(TimeMode::Or),
            4 => Ok(TimeMode::And),
            5 => Ok(TimeMode::Xor),
            other => Err(InvalidTimeMode(other)),
        }
    }
}

/// Pair of epoch-second instants.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeRange {
    pub t0: i64,
    pub t1: i64,
}

impl TimeRange {
    pub fn new(t0: i64, t1: i64) -> Self {
        Self { t0, t1 }
    }

    pub fn instant(t: i64) -> Self {
        Self { t0: t, t1: t }
    }
}

/// The `(mode, t0, t1)` tuple a time selector hands to traversal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TimeSelection {
    pub mode: TimeMode,
    pub range: TimeRange,
}

impl TimeSelection {
    pub const DEFAULT_EPOCH: i64 = 950_486_422;

    pub fn new(mode: TimeMode, range: TimeRange) -> Self {
        Self { mode, range }
    }
}

impl Default for TimeSelection {
    fn default() -> Self {
        Self::new(TimeMode::Before, TimeRange::instant(Self::DEFAULT_EPOCH))
    }
}

/// Supplies the current time selection on demand.
pub trait TimeSource {
    fn selection(&self) -> TimeSelection;
}

impl TimeSource for TimeSelection {
    fn selection(&self) -> TimeSelection {
        *self
    }
}
