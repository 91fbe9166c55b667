//! Kernel error taxonomy.
//!
//! One central enum covers the failure classes the kernel distinguishes:
//! delivery failures (retried, then dead-lettered), overlay failures
//! (counted against the circuit breaker), resource faults (fatal to one
//! invocation), security faults (always fatal, never retried), and phase
//! failures (fatal to the run only when the phase is required).
//! Crate-local leaf errors use `thiserror` and convert into these.

use std::fmt;

/// Kernel result type
pub type KernelResult<T> = Result<T, KernelError>;

/// Distinguishes the three resource budgets a sandboxed invocation can
/// exhaust. Callers can tell "too much work" from "too much memory" from
/// "too slow".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ResourceFaultKind {
    /// Fuel budget exhausted
    Fuel,
    /// Memory limit exceeded
    Memory,
    /// Wall-clock deadline exceeded
    WallClock,
}

impl fmt::Display for ResourceFaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuel => write!(f, "fuel"),
            Self::Memory => write!(f, "memory"),
            Self::WallClock => write!(f, "wall-clock"),
        }
    }
}

/// Kernel error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelError {
    /// Event delivery to a handler failed after exhausting retries
    Delivery { reason: String },

    /// An overlay violated its contract or reported failure
    OverlayFailure { overlay: String, reason: String },

    /// A sandbox resource budget was exceeded
    ResourceFault {
        /// Which budget was exceeded
        fault: ResourceFaultKind,
        /// Human-readable detail
        detail: String,
    },

    /// A capability check or query validation failed
    SecurityFault { operation: String, reason: String },

    /// A pipeline phase failed
    PhaseFailure { phase: String, reason: String },

    /// Refused by a policy gate (not a security boundary)
    PolicyDenied { operation: String, reason: String },

    /// Not found
    NotFound { kind: String, id: String },

    /// Already exists
    AlreadyExists { kind: String, id: String },

    /// Invalid state transition
    InvalidState { expected: String, actual: String },

    /// Capacity exceeded on a bounded queue or window
    CapacityExceeded { resource: String, limit: u64 },

    /// Timeout
    Timeout {
        /// Operation that timed out
        operation: String,
    },

    /// Cancelled
    Cancelled,

    /// Persistence collaborator error
    Store { message: String },

    /// Internal error (for unexpected errors)
    Internal {
        /// Error message
        message: String,
    },
}

impl KernelError {
    /// Whether this error is a sandbox resource fault
    #[must_use]
    pub const fn is_resource_fault(&self) -> bool {
        matches!(self, Self::ResourceFault { .. })
    }

    /// Whether this error is a security fault
    #[must_use]
    pub const fn is_security_fault(&self) -> bool {
        matches!(self, Self::SecurityFault { .. })
    }

    /// The resource fault kind, if this is a resource fault
    #[must_use]
    pub const fn resource_fault_kind(&self) -> Option<ResourceFaultKind> {
        match self {
            Self::ResourceFault { fault, .. } => Some(*fault),
            _ => None,
        }
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivery { reason } => write!(f, "Delivery failed: {}", reason),
            Self::OverlayFailure { overlay, reason } => {
                write!(f, "Overlay {} failed: {}", overlay, reason)
            }
            Self::ResourceFault { fault, detail } => {
                write!(f, "Resource fault ({}): {}", fault, detail)
            }
            Self::SecurityFault { operation, reason } => {
                write!(f, "Security fault in {}: {}", operation, reason)
            }
            Self::PhaseFailure { phase, reason } => {
                write!(f, "Phase {} failed: {}", phase, reason)
            }
            Self::PolicyDenied { operation, reason } => {
                write!(f, "Policy denied {}: {}", operation, reason)
            }
            Self::NotFound { kind, id } => write!(f, "{} not found: {}", kind, id),
            Self::AlreadyExists { kind, id } => write!(f, "{} already exists: {}", kind, id),
            Self::InvalidState { expected, actual } => {
                write!(f, "Invalid state: expected {}, got {}", expected, actual)
            }
            Self::CapacityExceeded { resource, limit } => {
                write!(f, "Capacity exceeded for {}: {}", resource, limit)
            }
            Self::Timeout { operation } => write!(f, "Timeout: {}", operation),
            Self::Cancelled => write!(f, "Operation cancelled"),
            Self::Store { message } => write!(f, "Store error: {}", message),
            Self::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl std::error::Error for KernelError {}

impl From<serde_json::Error> for KernelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            message: format!("encoding error: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelError::Cancelled;
        assert_eq!(format!("{}", err), "Operation cancelled");

        let err = KernelError::NotFound {
            kind: "Overlay".to_string(),
            id: "ovl_123".to_string(),
        };
        assert_eq!(format!("{}", err), "Overlay not found: ovl_123");
    }

    #[test]
    fn test_resource_fault_kinds_are_distinct() {
        let fuel = KernelError::ResourceFault {
            fault: ResourceFaultKind::Fuel,
            detail: "budget 100".to_string(),
        };
        let memory = KernelError::ResourceFault {
            fault: ResourceFaultKind::Memory,
            detail: "limit 64k".to_string(),
        };
        assert_ne!(fuel, memory);
        assert_eq!(fuel.resource_fault_kind(), Some(ResourceFaultKind::Fuel));
        assert_eq!(memory.resource_fault_kind(), Some(ResourceFaultKind::Memory));
    }

    #[test]
    fn test_fault_classification() {
        let err = KernelError::SecurityFault {
            operation: "store_write".to_string(),
            reason: "capability not declared".to_string(),
        };
        assert!(err.is_security_fault());
        assert!(!err.is_resource_fault());

        let err = KernelError::ResourceFault {
            fault: ResourceFaultKind::WallClock,
            detail: "deadline 5s".to_string(),
        };
        assert!(err.is_resource_fault());
        assert_eq!(
            err.resource_fault_kind(),
            Some(ResourceFaultKind::WallClock)
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = KernelError::Cancelled;
        let err2 = KernelError::Cancelled;
        assert_eq!(err1, err2);

        let err3 = KernelError::Timeout {
            operation: "phase".to_string(),
        };
        assert_ne!(err1, err3);
    }
}
