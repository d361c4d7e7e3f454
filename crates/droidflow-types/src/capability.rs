//! Capability tags classifying why a human authorization is needed.

use serde::{Deserialize, Serialize};

/// The kind of checkpoint the automated agent cannot pass alone.
///
/// Capabilities classify the request for the human approver and for audit
/// trails; they never change how an approved artifact is applied (that is
/// driven by the artifact's payload kind).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Camera,
    Qr,
    Microphone,
    Voice,
    Nfc,
    Sms,
    TwoFactor,
    Location,
    Biometric,
    Notification,
    Contacts,
    Calendar,
    Files,
    Oauth,
    Payment,
    Permission,
    /// Fallback for capability strings this version does not know.
    #[serde(other)]
    Unknown,
}

impl Capability {
    /// Parse a capability tag, falling back to `Unknown` for unrecognized
    /// values so a newer model prompt never breaks an older runtime.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "camera" => Self::Camera,
            "qr" => Self::Qr,
            "microphone" => Self::Microphone,
            "voice" => Self::Voice,
            "nfc" => Self::Nfc,
            "sms" => Self::Sms,
            "2fa" | "two_factor" | "twofactor" => Self::TwoFactor,
            "location" => Self::Location,
            "biometric" => Self::Biometric,
            "notification" => Self::Notification,
            "contacts" => Self::Contacts,
            "calendar" => Self::Calendar,
            "files" => Self::Files,
            "oauth" => Self::Oauth,
            "payment" => Self::Payment,
            "permission" => Self::Permission,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Camera => "camera",
            Self::Qr => "qr",
            Self::Microphone => "microphone",
            Self::Voice => "voice",
            Self::Nfc => "nfc",
            Self::Sms => "sms",
            Self::TwoFactor => "2fa",
            Self::Location => "location",
            Self::Biometric => "biometric",
            Self::Notification => "notification",
            Self::Contacts => "contacts",
            Self::Calendar => "calendar",
            Self::Files => "files",
            Self::Oauth => "oauth",
            Self::Payment => "payment",
            Self::Permission => "permission",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Capability {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
