pub mod error;
pub mod repository;
pub mod rolling_average_service;
pub mod sensor_reading_service;
pub mod types;
pub mod validate;

pub use error::{DomainError, DomainResult};
pub use repository::{RawTelemetryRepository, RollingAverageRepository, SensorReadingRepository};
pub use rolling_average_service::{RollingAverageService, DEFAULT_WINDOW_SIZE, MIXED_READING_TYPE};
pub use sensor_reading_service::SensorReadingService;
pub use types::*;
pub use validate::{validate_with, ReadingLimits};

// Re-export mocks when testing feature is enabled
#[cfg(any(test, feature = "testing"))]
pub use repository::MockRawTelemetryRepository;
#[cfg(any(test, feature = "testing"))]
pub use repository::MockRollingAverageRepository;
#[cfg(any(test, feature = "testing"))]
pub use repository::MockSensorReadingRepository;
