use serde::{Deserialize, Serialize};

/// Alert severity, ordered from least to most urgent.
///
/// The rule source encodes severity as a numeric level (1 = warning,
/// 2 = error, 3 = critical); the sink receives the upper-case string form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Severity {
    Warning = 1,
    Error = 2,
    Critical = 3,
}

impl Severity {
    /// Numeric wire level as carried by the rule source.
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, String> {
        match level {
            1 => Ok(Severity::Warning),
            2 => Ok(Severity::Error),
            3 => Ok(Severity::Critical),
            other => Err(format!("unknown severity level: {other}")),
        }
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.level()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// The alert record serialised into the sink's `message` column.
///
/// `current` and `threshold` are rounded to whole numbers; `message` is the
/// raw template from the condition, substitution happens downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotice {
    pub device: String,
    pub current: f64,
    pub threshold: f64,
    pub message: String,
    pub severity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_by_urgency() {
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
        assert_eq!(
            [Severity::Error, Severity::Critical, Severity::Warning]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn severity_displays_upper_case() {
        assert_eq!(Severity::Warning.to_string(), "WARNING");
        assert_eq!(Severity::Error.to_string(), "ERROR");
        assert_eq!(Severity::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn severity_round_trips_through_levels() {
        for level in 1u8..=3 {
            let severity = Severity::try_from(level).unwrap();
            assert_eq!(severity.level(), level);
        }
        assert!(Severity::try_from(0).is_err());
        assert!(Severity::try_from(4).is_err());
    }

    #[test]
    fn severity_serialises_as_number() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "3");
        let back: Severity = serde_json::from_str("2").unwrap();
        assert_eq!(back, Severity::Error);
    }

    #[test]
    fn notice_serialises_expected_fields() {
        let notice = AlertNotice {
            device: "d1".into(),
            current: 15.0,
            threshold: 10.0,
            message: "over limit".into(),
            severity: Severity::Warning.to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&notice).unwrap()).unwrap();
        assert_eq!(value["device"], "d1");
        assert_eq!(value["current"], 15.0);
        assert_eq!(value["threshold"], 10.0);
        assert_eq!(value["severity"], "WARNING");
    }
}
