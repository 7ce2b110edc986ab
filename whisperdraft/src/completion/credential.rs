use std::fmt;

/// Which key a request is sent with. Resolved once per request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Key supplied by the user through settings.
    User(String),
    /// Key configured on the server.
    Shared(String),
    Missing,
}

impl Credential {
    /// The user's key wins over the server's; blank keys count as absent.
    pub fn resolve(user_key: Option<&str>, shared_key: Option<&str>) -> Self {
        let clean = |key: Option<&str>| {
            key.map(str::trim)
                .filter(|key| !key.is_empty())
                .map(str::to_string)
        };

        if let Some(key) = clean(user_key) {
            Self::User(key)
        } else if let Some(key) = clean(shared_key) {
            Self::Shared(key)
        } else {
            Self::Missing
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Shared(_) => "shared",
            Self::Missing => "none",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.source())
    }
}
