pub mod events;
pub mod repository;

use repository::StoreError;

/// Error taxonomy shared by every seatline service.
///
/// `NotFound`, `Conflict` and `Validation` are ordinary rejections the caller
/// handles. `Transient` is a storage fault the caller may retry with backoff.
/// `Invariant` means stored state disagrees with itself and needs an operator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Storage unavailable: {0}")]
    Transient(String),
    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl CoreError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }

    /// Ordinary outcome (as opposed to a fault of the system).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            CoreError::NotFound(_) | CoreError::Conflict(_) | CoreError::Validation(_)
        )
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout(_) => CoreError::Transient(err.to_string()),
            StoreError::Corrupt(msg) => {
                tracing::error!("Corrupt record in store: {}", msg);
                CoreError::Invariant(msg)
            }
            StoreError::Constraint(msg) => {
                tracing::error!("Store constraint violated: {}", msg);
                CoreError::Invariant(msg)
            }
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// 1-based page request used by every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub page_size: usize,
}

impl Page {
    pub fn new(page: usize, page_size: usize, max_page_size: usize) -> CoreResult<Self> {
        if page == 0 {
            return Err(CoreError::Validation("page numbers start at 1".to_string()));
        }
        if page_size == 0 || page_size > max_page_size {
            return Err(CoreError::Validation(format!(
                "page_size must be between 1 and {}",
                max_page_size
            )));
        }
        Ok(Self { page, page_size })
    }

    pub fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn limit(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let err: CoreError = StoreError::Timeout("claim".to_string()).into();
        assert!(err.is_retryable());

        let err: CoreError = StoreError::Unavailable("connection refused".to_string()).into();
        assert!(matches!(err, CoreError::Transient(_)));

        let err: CoreError = StoreError::Corrupt("bad status".to_string()).into();
        assert_eq!(err, CoreError::Invariant("bad status".to_string()));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_constraint_violation_is_not_retryable() {
        let err: CoreError = StoreError::Constraint("uq_reservations_active_seat".to_string()).into();
        assert_eq!(err, CoreError::Invariant("uq_reservations_active_seat".to_string()));
        assert!(!err.is_retryable());
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_page_window() {
        let page = Page::new(3, 10, 50).unwrap();
        assert_eq!(page.offset(), 20);
        assert_eq!(page.limit(), 10);

        assert!(Page::new(0, 10, 50).is_err());
        assert!(Page::new(1, 0, 50).is_err());
        assert!(Page::new(1, 51, 50).is_err());
    }
}
