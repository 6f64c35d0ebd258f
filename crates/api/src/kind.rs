//! The closed set of tool kinds Eirenyx manages.

use std::fmt;
use std::str::FromStr;

use eirenyx_core::Error;

/// A managed tool kind. Both `Tool.spec.type` and `Policy.spec.type` resolve to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    Falco,
    Trivy,
    Litmus,
}

impl Kind {
    /// Every supported kind.
    pub const ALL: [Self; 3] = [Self::Falco, Self::Trivy, Self::Litmus];

    /// The wire representation of the kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Falco => "falco",
            Self::Trivy => "trivy",
            Self::Litmus => "litmus",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = Error;

    /// Parse a declared type. Unknown tags are rejected, never defaulted.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "falco" => Ok(Self::Falco),
            "trivy" => Ok(Self::Trivy),
            "litmus" => Ok(Self::Litmus),
            other => Err(Error::unsupported_type(other)),
        }
    }
}
