use std::fmt;

/// Bearer credential attached to every backend request when present.
#[derive(Clone)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Token {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for Token {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// Never print the secret itself.
impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token(***)")
    }
}

/// The signed-in user, identified by the email/username the identity
/// provider reported. User-scoped approval queries are only issued when
/// one is available.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    email: String,
}

impl Identity {
    /// Builds an identity from a raw email, returning `None` for blank input
    /// so an unset environment variable behaves like no identity at all.
    pub fn new(email: impl Into<String>) -> Option<Self> {
        let email = email.into().trim().to_owned();
        if email.is_empty() {
            None
        } else {
            Some(Self { email })
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}
