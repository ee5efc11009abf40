//! Probe kinds and the per-call probe context.

use std::cell::Cell;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Kinds of host work that fire paired will/did probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    CallFunction,
    ExecuteScript,
    RecalculateStyle,
    UpdateLayout,
}

impl ProbeKind {
    pub const ALL: [Self; 4] = [
        Self::CallFunction,
        Self::ExecuteScript,
        Self::RecalculateStyle,
        Self::UpdateLayout,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CallFunction => "call_function",
            Self::ExecuteScript => "execute_script",
            Self::RecalculateStyle => "recalculate_style",
            Self::UpdateLayout => "update_layout",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProbeKind {
    type Err = UnknownProbeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "call_function" => Ok(Self::CallFunction),
            "execute_script" => Ok(Self::ExecuteScript),
            "recalculate_style" | "recalc_style" => Ok(Self::RecalculateStyle),
            "update_layout" | "layout" => Ok(Self::UpdateLayout),
            _ => Err(UnknownProbeKind(s.to_string())),
        }
    }
}

impl Serialize for ProbeKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProbeKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown probe kind strings.
#[derive(Debug, Clone)]
pub struct UnknownProbeKind(String);

impl fmt::Display for UnknownProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown probe kind: {}", self.0)
    }
}

impl std::error::Error for UnknownProbeKind {}

/// Context for a single will/did pair.
///
/// The host creates one `Probe` per instrumented call and hands the same value
/// to both halves of the pair. Observers decide whether to capture a start time;
/// the captured value lives here rather than in the observer so nested calls of
/// the same kind each keep their own start.
#[derive(Debug)]
pub struct Probe {
    kind: ProbeKind,
    start_time: Cell<Option<f64>>,
}

impl Probe {
    #[must_use]
    pub const fn new(kind: ProbeKind) -> Self {
        Self {
            kind,
            start_time: Cell::new(None),
        }
    }

    pub const fn kind(&self) -> ProbeKind {
        self.kind
    }

    /// Records the current time as the start of this call.
    pub fn capture_start_time(&self, clock: &dyn Clock) {
        self.start_time.set(Some(clock.now()));
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time.get()
    }

    /// Seconds elapsed since the captured start, or `None` if nothing was captured.
    pub fn duration(&self, clock: &dyn Clock) -> Option<f64> {
        self.start_time.get().map(|start| clock.now() - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn roundtrip_all_kinds() {
        for kind in ProbeKind::ALL {
            let parsed: ProbeKind = kind.to_string().parse().expect("should parse");
            assert_eq!(parsed, kind, "roundtrip failed for {kind:?}");
        }
    }

    #[test]
    fn short_aliases_parse() {
        assert_eq!(
            "layout".parse::<ProbeKind>().unwrap(),
            ProbeKind::UpdateLayout
        );
        assert_eq!(
            "recalc_style".parse::<ProbeKind>().unwrap(),
            ProbeKind::RecalculateStyle
        );
    }

    #[test]
    fn unknown_kind_errors() {
        let err = "paint".parse::<ProbeKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown probe kind: paint");
    }

    #[test]
    fn kind_deserializes_from_snake_case() {
        let kind: ProbeKind = serde_json::from_str("\"execute_script\"").unwrap();
        assert_eq!(kind, ProbeKind::ExecuteScript);
        assert!(serde_json::from_str::<ProbeKind>("\"bogus\"").is_err());
    }

    #[test]
    fn duration_is_none_without_captured_start() {
        let clock = ManualClock::new(4.0);
        let probe = Probe::new(ProbeKind::UpdateLayout);
        assert_eq!(probe.duration(&clock), None);
    }

    #[test]
    fn duration_measures_from_captured_start() {
        let clock = ManualClock::new(1.0);
        let probe = Probe::new(ProbeKind::CallFunction);
        probe.capture_start_time(&clock);
        clock.set(3.5);
        assert_eq!(probe.start_time(), Some(1.0));
        assert_eq!(probe.duration(&clock), Some(2.5));
    }
}
