//! Indicators
//!
//! AG indicators are status values owned by the gateway (call, signal,
//! battery ...). The HF learns their names and legal values from
//! `AT+CIND=?`, their current values from `AT+CIND?`, and later changes
//! through `+CIEV`, which addresses an indicator by its 1-based position in
//! the gateway's list.
//!
//! HF indicators flow the other way: the HF reports values (`AT+BIEV`) for
//! the indicator identities both sides agreed on with `AT+BIND`.

use core::fmt::{self, Write};

/// Set of legal values of an indicator (0..=31)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ValueSet(u32);

impl ValueSet {
    /// Largest value a set can hold
    pub const MAX_VALUE: u8 = 31;

    /// Empty set
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Contiguous range `min..=max`; values above [`Self::MAX_VALUE`] are dropped
    #[must_use]
    pub const fn range(min: u8, max: u8) -> Self {
        let mut bits = 0u32;
        let mut value = min;
        while value <= max && value <= Self::MAX_VALUE {
            bits |= 1 << value;
            value += 1;
        }
        Self(bits)
    }

    /// Explicit list of values
    #[must_use]
    pub fn from_values(values: &[u8]) -> Self {
        let mut set = Self::empty();
        for &value in values {
            set.insert(value);
        }
        set
    }

    /// Add a value; values above [`Self::MAX_VALUE`] are ignored
    pub fn insert(&mut self, value: u8) {
        if value <= Self::MAX_VALUE {
            self.0 |= 1 << value;
        }
    }

    /// Check membership
    #[must_use]
    pub const fn contains(&self, value: u8) -> bool {
        value <= Self::MAX_VALUE && self.0 & (1 << value) != 0
    }

    /// Number of values
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Whether the set is empty
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Smallest value
    #[must_use]
    pub const fn min(&self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as u8)
        }
    }

    /// Largest value
    #[must_use]
    pub const fn max(&self) -> Option<u8> {
        if self.0 == 0 {
            None
        } else {
            Some(31 - self.0.leading_zeros() as u8)
        }
    }

    /// Values in ascending order
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=Self::MAX_VALUE).filter(|value| self.contains(*value))
    }

    /// Write the parenthesized `+CIND=?` form: `(0-3)` for ranges of three or
    /// more values, otherwise `(0,1)`.
    ///
    /// # Errors
    /// Propagates writer errors.
    pub fn write_to<W: Write>(&self, out: &mut W) -> fmt::Result {
        match (self.min(), self.max()) {
            (Some(min), Some(max)) if max - min >= 2 && self.len() == usize::from(max - min) + 1 => {
                write!(out, "({min}-{max})")
            }
            _ => {
                out.write_char('(')?;
                for (position, value) in self.iter().enumerate() {
                    if position > 0 {
                        out.write_char(',')?;
                    }
                    write!(out, "{value}")?;
                }
                out.write_char(')')
            }
        }
    }
}

/// AG indicator identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AgIndicator {
    /// Call active
    Call,
    /// Call setup progress
    CallSetup,
    /// Call held state
    CallHeld,
    /// Network service availability
    Service,
    /// Signal strength
    Signal,
    /// Roaming
    Roam,
    /// Battery charge
    BatteryCharge,
}

impl AgIndicator {
    /// Name used in `+CIND=?`
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::CallSetup => "callsetup",
            Self::CallHeld => "callheld",
            Self::Service => "service",
            Self::Signal => "signal",
            Self::Roam => "roam",
            Self::BatteryCharge => "battchg",
        }
    }

    /// Look up an indicator by its `+CIND=?` name (case-insensitive)
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::Call,
            Self::CallSetup,
            Self::CallHeld,
            Self::Service,
            Self::Signal,
            Self::Roam,
            Self::BatteryCharge,
        ]
        .into_iter()
        .find(|indicator| indicator.name().eq_ignore_ascii_case(name))
    }

    /// Legal values defined by the profile
    #[must_use]
    pub const fn default_values(self) -> ValueSet {
        match self {
            Self::Call | Self::Service | Self::Roam => ValueSet::range(0, 1),
            Self::CallSetup => ValueSet::range(0, 3),
            Self::CallHeld => ValueSet::range(0, 2),
            Self::Signal | Self::BatteryCharge => ValueSet::range(0, 5),
        }
    }
}

/// Value of an AG indicator as seen by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AgIndicatorState {
    /// Indicator identity
    pub indicator: AgIndicator,
    /// Legal values
    pub supported_values: ValueSet,
    /// Current value
    pub current_status: u8,
}

impl AgIndicatorState {
    /// Indicator with explicit legal values and initial status
    #[must_use]
    pub const fn new(indicator: AgIndicator, supported_values: ValueSet, current_status: u8) -> Self {
        Self {
            indicator,
            supported_values,
            current_status,
        }
    }

    /// `call` indicator, initially 0
    #[must_use]
    pub const fn call() -> Self {
        Self::new(AgIndicator::Call, AgIndicator::Call.default_values(), 0)
    }

    /// `callsetup` indicator, initially 0
    #[must_use]
    pub const fn callsetup() -> Self {
        Self::new(AgIndicator::CallSetup, AgIndicator::CallSetup.default_values(), 0)
    }

    /// `callheld` indicator, initially 0
    #[must_use]
    pub const fn callheld() -> Self {
        Self::new(AgIndicator::CallHeld, AgIndicator::CallHeld.default_values(), 0)
    }

    /// `service` indicator, initially 0
    #[must_use]
    pub const fn service() -> Self {
        Self::new(AgIndicator::Service, AgIndicator::Service.default_values(), 0)
    }

    /// `signal` indicator, initially 0
    #[must_use]
    pub const fn signal() -> Self {
        Self::new(AgIndicator::Signal, AgIndicator::Signal.default_values(), 0)
    }

    /// `roam` indicator, initially 0
    #[must_use]
    pub const fn roam() -> Self {
        Self::new(AgIndicator::Roam, AgIndicator::Roam.default_values(), 0)
    }

    /// `battchg` indicator, initially 0
    #[must_use]
    pub const fn battchg() -> Self {
        Self::new(
            AgIndicator::BatteryCharge,
            AgIndicator::BatteryCharge.default_values(),
            0,
        )
    }

    /// Builder-style initial status
    #[must_use]
    pub const fn with_status(mut self, current_status: u8) -> Self {
        self.current_status = current_status;
        self
    }

    /// Set the current value if it is legal
    ///
    /// Returns `false` and leaves the state untouched otherwise.
    pub fn update(&mut self, value: u8) -> bool {
        if self.supported_values.contains(value) {
            self.current_status = value;
            true
        } else {
            false
        }
    }
}

/// HF indicator identities (assigned numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum HfIndicator {
    /// Enhanced safety (0 or 1)
    EnhancedSafety = 1,
    /// Battery level (0..=100)
    BatteryLevel = 2,
}

impl HfIndicator {
    /// Look up an identity by its assigned number
    #[must_use]
    pub const fn from_u16(id: u16) -> Option<Self> {
        match id {
            1 => Some(Self::EnhancedSafety),
            2 => Some(Self::BatteryLevel),
            _ => None,
        }
    }

    /// Assigned number
    #[must_use]
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Highest legal value (the lowest is always 0)
    #[must_use]
    pub const fn max_value(self) -> u16 {
        match self {
            Self::EnhancedSafety => 1,
            Self::BatteryLevel => 100,
        }
    }

    /// Whether a value is legal for this indicator
    #[must_use]
    pub const fn accepts(self, value: u16) -> bool {
        value <= self.max_value()
    }
}

/// Value of an HF indicator as seen by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HfIndicatorState {
    /// Indicator identity
    pub indicator: HfIndicator,
    /// Both sides listed the indicator in `AT+BIND`
    pub supported: bool,
    /// The AG wants updates for it
    pub enabled: bool,
    /// Last reported value
    pub current_status: u16,
}

impl HfIndicatorState {
    /// Fresh, unsupported and disabled state
    #[must_use]
    pub const fn new(indicator: HfIndicator) -> Self {
        Self {
            indicator,
            supported: false,
            enabled: false,
            current_status: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::String;

    #[test]
    fn test_value_set_range() {
        let set = ValueSet::range(0, 3);
        assert_eq!(set.len(), 4);
        assert!(set.contains(3));
        assert!(!set.contains(4));
        assert_eq!(set.min(), Some(0));
        assert_eq!(set.max(), Some(3));
    }

    #[test]
    fn test_value_set_write_forms() {
        let mut text: String<16> = String::new();
        ValueSet::range(0, 5).write_to(&mut text).unwrap();
        assert_eq!(text.as_str(), "(0-5)");

        text.clear();
        ValueSet::range(0, 1).write_to(&mut text).unwrap();
        assert_eq!(text.as_str(), "(0,1)");

        text.clear();
        ValueSet::from_values(&[0, 2, 5]).write_to(&mut text).unwrap();
        assert_eq!(text.as_str(), "(0,2,5)");
    }

    #[test]
    fn test_value_set_ignores_large_values() {
        let mut set = ValueSet::empty();
        set.insert(40);
        assert!(set.is_empty());
        assert!(!set.contains(40));
    }

    #[test]
    fn test_ag_indicator_names() {
        assert_eq!(AgIndicator::from_name("battchg"), Some(AgIndicator::BatteryCharge));
        assert_eq!(AgIndicator::from_name("CALL"), Some(AgIndicator::Call));
        assert_eq!(AgIndicator::from_name("bogus"), None);
    }

    #[test]
    fn test_ag_indicator_update_rejects_illegal_value() {
        let mut state = AgIndicatorState::callheld();
        assert!(state.update(2));
        assert!(!state.update(3));
        assert_eq!(state.current_status, 2);
    }

    #[test]
    fn test_hf_indicator_ranges() {
        assert!(HfIndicator::BatteryLevel.accepts(100));
        assert!(!HfIndicator::BatteryLevel.accepts(101));
        assert!(!HfIndicator::EnhancedSafety.accepts(2));
        assert_eq!(HfIndicator::from_u16(2), Some(HfIndicator::BatteryLevel));
        assert_eq!(HfIndicator::from_u16(9), None);
    }
}
