//! Reading validation rules and garde report formatting.

use chrono::{DateTime, Duration, Utc};
use garde::{Report, Validate};

use crate::error::DomainError;

/// Domain-configured bounds applied when validating inbound readings
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingLimits {
    /// Values below this floor are the "invalid sensor" sentinel and are rejected
    pub min_reading_value: f64,
    /// Tolerated clock skew for client-supplied timestamps
    pub max_clock_skew: Duration,
}

impl Default for ReadingLimits {
    fn default() -> Self {
        Self {
            min_reading_value: -100.0,
            max_clock_skew: Duration::seconds(5),
        }
    }
}

/// Validate a struct against the configured limits, mapping the report to `DomainError`
pub fn validate_with<T>(value: &T, limits: &T::Context) -> Result<(), DomainError>
where
    T: Validate,
{
    value
        .validate_with(limits)
        .map_err(|report| DomainError::ValidationError(format_validation_errors(&report)))
}

/// Format validation errors from garde Report into a human-readable string
fn format_validation_errors(report: &Report) -> String {
    report
        .iter()
        .map(|(path, error)| {
            if path.to_string().is_empty() {
                error.message().to_string()
            } else {
                format!("{}: {}", path, error.message())
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::ptr_arg)]
pub(crate) fn non_blank(value: &String, _limits: &ReadingLimits) -> garde::Result {
    if value.trim().is_empty() {
        return Err(garde::Error::new("must not be empty"));
    }
    Ok(())
}

pub(crate) fn reading_in_range(value: &f64, limits: &ReadingLimits) -> garde::Result {
    if !value.is_finite() {
        return Err(garde::Error::new("must be a finite number"));
    }
    if *value < limits.min_reading_value {
        return Err(garde::Error::new(format!(
            "must be greater than or equal to {}",
            limits.min_reading_value
        )));
    }
    Ok(())
}

pub(crate) fn not_in_future(value: &Option<DateTime<Utc>>, limits: &ReadingLimits) -> garde::Result {
    match value {
        Some(ts) if *ts > Utc::now() + limits.max_clock_skew => {
            Err(garde::Error::new("must not be in the future"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CreateReadingInput, UpdateReadingInput};

    fn reading(device_id: &str, value: f64) -> CreateReadingInput {
        CreateReadingInput {
            device_id: device_id.to_string(),
            reading_value: value,
            reading_type: "temperature".to_string(),
            unit: "C".to_string(),
            battery_level: None,
            raw_data: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_validate_success() {
        let input = reading("sensor-001", 21.5);
        assert!(validate_with(&input, &ReadingLimits::default()).is_ok());
    }

    #[test]
    fn test_floor_is_inclusive() {
        let input = reading("sensor-001", -100.0);
        assert!(validate_with(&input, &ReadingLimits::default()).is_ok());
    }

    #[test]
    fn test_below_floor_rejected() {
        let input = reading("sensor-001", -100.5);
        let result = validate_with(&input, &ReadingLimits::default());
        if let Err(DomainError::ValidationError(msg)) = result {
            assert!(msg.contains("reading_value"));
        } else {
            panic!("Expected ValidationError");
        }
    }

    #[test]
    fn test_custom_floor() {
        let limits = ReadingLimits {
            min_reading_value: 0.0,
            ..Default::default()
        };
        assert!(validate_with(&reading("sensor-001", -1.0), &limits).is_err());
    }

    #[test]
    fn test_blank_device_id_rejected() {
        let result = validate_with(&reading("   ", 10.0), &ReadingLimits::default());
        if let Err(DomainError::ValidationError(msg)) = result {
            assert!(msg.contains("device_id"));
        } else {
            panic!("Expected ValidationError");
        }
    }

    #[test]
    fn test_non_finite_value_rejected() {
        let result = validate_with(&reading("sensor-001", f64::NAN), &ReadingLimits::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_battery_level_out_of_range() {
        let mut input = reading("sensor-001", 10.0);
        input.battery_level = Some(120.0);
        let result = validate_with(&input, &ReadingLimits::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut input = reading("sensor-001", 10.0);
        input.timestamp = Some(Utc::now() + Duration::hours(1));
        let result = validate_with(&input, &ReadingLimits::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_update_blank_strings_rejected() {
        let input = UpdateReadingInput {
            reading_type: Some("   ".to_string()),
            ..Default::default()
        };
        let result = validate_with(&input, &ReadingLimits::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));

        let input = UpdateReadingInput {
            unit: Some(" ".to_string()),
            ..Default::default()
        };
        let result = validate_with(&input, &ReadingLimits::default());
        assert!(matches!(result, Err(DomainError::ValidationError(_))));
    }

    #[test]
    fn test_update_absent_strings_accepted() {
        let input = UpdateReadingInput {
            unit: Some("F".to_string()),
            ..Default::default()
        };
        assert!(validate_with(&input, &ReadingLimits::default()).is_ok());
    }
}
