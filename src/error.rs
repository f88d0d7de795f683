use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("store unavailable for table {table}: {reason}")]
    StoreUnavailable {
        table: String,
        reason: String,
        transient: bool,
    },

    #[error("schema mismatch for table {table}: expected [{}], found [{}]", expected.join(", "), found.join(", "))]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("view of table {table} is filtered or joined and cannot be saved")]
    PartialView { table: String },
}

impl PortalError {
    pub fn unavailable(table: &str, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            table: table.to_string(),
            reason: reason.into(),
            transient: false,
        }
    }

    pub fn transient(table: &str, reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            table: table.to_string(),
            reason: reason.into(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::StoreUnavailable {
                transient: true,
                ..
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;
