use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Canonical provider identifiers used in routing, metadata and envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Taiwan Stock Exchange daily report feed.
    Twse,
    /// Yahoo Finance chart API.
    Yahoo,
    /// FinMind community data API.
    Finmind,
}

impl ProviderId {
    pub const ALL: [Self; 3] = [Self::Twse, Self::Yahoo, Self::Finmind];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Twse => "twse",
            Self::Yahoo => "yahoo",
            Self::Finmind => "finmind",
        }
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "twse" => Ok(Self::Twse),
            "yahoo" => Ok(Self::Yahoo),
            "finmind" => Ok(Self::Finmind),
            other => Err(ValidationError::InvalidSource {
                value: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_names_case_insensitively() {
        assert_eq!("TWSE".parse::<ProviderId>(), Ok(ProviderId::Twse));
        assert_eq!(" finmind ".parse::<ProviderId>(), Ok(ProviderId::Finmind));
        assert!(matches!(
            "polygon".parse::<ProviderId>(),
            Err(ValidationError::InvalidSource { .. })
        ));
    }
}
