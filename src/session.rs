//! Acting role for the current caller, passed explicitly into every write
use crate::error::{LogisticsError, Result};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    Dispatcher,
    Driver,
    // least privileged, read-only
    #[default]
    Customer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Dispatcher => write!(f, "DISPATCHER"),
            Role::Driver => write!(f, "DRIVER"),
            Role::Customer => write!(f, "CUSTOMER"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Session {
    role: Role,
}

impl Session {
    /// A fresh session acts as a customer until someone logs in.
    pub fn new() -> Self {
        Self::default()
    }
    pub fn login(role: Role) -> Self {
        tracing::debug!(%role, "session started");
        Self { role }
    }
    pub fn switch_role(&mut self, role: Role) {
        tracing::debug!(from = %self.role, to = %role, "session role changed");
        self.role = role;
    }
    pub fn role(&self) -> Role {
        self.role
    }
    /// Write guard shared by every mutating operation.
    pub fn ensure_can_write(&self, action: &'static str) -> Result<()> {
        if self.role == Role::Customer {
            return Err(LogisticsError::PermissionDenied {
                role: self.role,
                action,
            });
        }
        Ok(())
    }
}
