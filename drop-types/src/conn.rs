//! Connection identity.

use std::fmt;

/// Opaque identity of one live client link.
///
/// Assigned by the transport when a connection opens. The relay only stores
/// and compares these; it never owns the connection behind one.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(uuid::Uuid);

impl ConnId {
    /// Create a new random ConnId.
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::random()
    }
}

impl From<uuid::Uuid> for ConnId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnId({})", &self.to_string()[..8])
    }
}
