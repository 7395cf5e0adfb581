use std::fmt;
use std::str::FromStr;

/// Severity of a log event, ordered from least to most severe.
///
/// The set mirrors the levels of the classic structured-logging
/// frameworks (`trace` up to `panic`). `tracing` only emits the first
/// five; [`Fatal`](Severity::Fatal) and [`Panic`](Severity::Panic) are
/// reachable through [`Hook::fire`](crate::hook::Hook::fire) directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl Severity {
    /// All severities in ascending order. This is the default level set
    /// of a newly built hook.
    pub const fn all() -> [Severity; 7] {
        [
            Severity::Trace,
            Severity::Debug,
            Severity::Info,
            Severity::Warn,
            Severity::Error,
            Severity::Fatal,
            Severity::Panic,
        ]
    }

    /// Lowercase name of the severity. `Warn` spells out `"warning"`,
    /// matching the framework naming the mapping below relies on.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
            Severity::Panic => "panic",
        }
    }

    /// The severity token recognized by Cloud Logging.
    ///
    /// `Fatal` maps to `CRITICAL` and `Panic` to `EMERGENCY`; every
    /// other severity is its uppercased name.
    /// See <https://cloud.google.com/logging/docs/reference/v2/rest/v2/LogEntry#logseverity>.
    pub fn cloud_severity(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "CRITICAL",
            Severity::Panic => "EMERGENCY",
        }
    }

    /// Whether events of this severity are routed to the error-reporting
    /// side of the hook (`Error` and above).
    pub fn is_error(&self) -> bool {
        *self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing a [`Severity`] from a string fails.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown severity `{0}`")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(Severity::Trace),
            "debug" => Ok(Severity::Debug),
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "error" => Ok(Severity::Error),
            "fatal" => Ok(Severity::Fatal),
            "panic" => Ok(Severity::Panic),
            _ => Err(ParseSeverityError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_severity_special_cases() {
        assert_eq!(Severity::Fatal.cloud_severity(), "CRITICAL");
        assert_eq!(Severity::Panic.cloud_severity(), "EMERGENCY");
    }

    #[test]
    fn cloud_severity_is_uppercased_name_otherwise() {
        for severity in [
            Severity::Trace,
            Severity::Debug,
            Severity::Info,
            Severity::Warn,
            Severity::Error,
        ] {
            assert_eq!(
                severity.cloud_severity(),
                severity.as_str().to_uppercase()
            );
        }
    }

    #[test]
    fn ordering_follows_declaration() {
        let all = Severity::all();
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn error_routing_threshold() {
        assert!(!Severity::Warn.is_error());
        assert!(Severity::Error.is_error());
        assert!(Severity::Fatal.is_error());
        assert!(Severity::Panic.is_error());
    }

    #[test]
    fn parses_both_warn_spellings() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert!("verbose".parse::<Severity>().is_err());
    }
}
