// ABOUTME: Error taxonomy for scheduler control operations
// ABOUTME: Keeps not-found, provider configuration and storage failures distinguishable

use uuid::Uuid;

use crate::directions::DirectionsError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
    #[error("directions provider unavailable: {0}")]
    Configuration(#[source] DirectionsError),
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for SchedulerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SchedulerError::NotFound(id),
            other => SchedulerError::Store(other),
        }
    }
}

impl SchedulerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SchedulerError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_maps_to_not_found() {
        let id = Uuid::new_v4();
        let err = SchedulerError::from(StoreError::NotFound(id));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), format!("job not found: {}", id));
    }

    #[test]
    fn test_configuration_error_message() {
        let err = SchedulerError::Configuration(DirectionsError::MissingCredential);
        assert!(err.to_string().contains("GOOGLE_MAPS_API_KEY"));
        assert!(!err.is_not_found());
    }
}
