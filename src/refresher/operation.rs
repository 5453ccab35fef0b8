use std::fmt;

use crate::domain::ContentId;

/// Invalidation intent a refresher executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    RefreshAll,
    Refresh(ContentId),
    Remove(ContentId),
    /// Raw wire payload; decoding happens inside the refresher so a malformed
    /// batch is reported rather than propagated.
    RefreshByPayload(String),
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::RefreshAll => "refresh_all",
            OperationKind::Refresh(_) => "refresh",
            OperationKind::Remove(_) => "remove",
            OperationKind::RefreshByPayload(_) => "refresh_by_payload",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Refresh(id) | OperationKind::Remove(id) => {
                write!(f, "{}({id})", self.name())
            }
            _ => f.write_str(self.name()),
        }
    }
}
