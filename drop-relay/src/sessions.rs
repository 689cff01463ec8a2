//! Session index: which slot each connection is currently part of.

use crate::error::SessionError;
use drop_types::{Code, ConnId};
use std::collections::HashMap;

/// Reverse mapping from connection to the code it holds or has joined.
///
/// A connection has at most one entry. Binding again replaces the old entry.
#[derive(Debug, Default)]
pub struct SessionIndex {
    bindings: HashMap<ConnId, Code>,
}

impl SessionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn` to `code`, returning the binding it replaced.
    pub fn bind(&mut self, conn: ConnId, code: Code) -> Option<Code> {
        self.bindings.insert(conn, code)
    }

    /// Remove the binding for `conn`.
    pub fn unbind(&mut self, conn: &ConnId) -> Result<Code, SessionError> {
        self.bindings.remove(conn).ok_or(SessionError::NotBound)
    }

    /// Remove the binding for `conn` only if it points at `code`.
    ///
    /// Used when a slot is torn down on behalf of several connections, one of
    /// which may already have moved on to a different slot.
    pub fn unbind_if(&mut self, conn: &ConnId, code: &Code) -> bool {
        if self.bindings.get(conn) == Some(code) {
            self.bindings.remove(conn);
            true
        } else {
            false
        }
    }

    /// The code `conn` is bound to.
    pub fn lookup(&self, conn: &ConnId) -> Result<Code, SessionError> {
        self.bindings.get(conn).copied().ok_or(SessionError::NotBound)
    }

    /// Number of bound connections.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no connection is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
