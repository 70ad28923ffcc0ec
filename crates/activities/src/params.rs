//! Typed decoding of the open activity parameter bag.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::event::{self, Event, category};
use crate::types::Activity;

/// Why an activity's parameters were rejected.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("invalid parameters for `{activity_type}`: {source}")]
    Decode {
        activity_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("parameter `{field}` = {value} {reason}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },
}

/// A handler's parameter struct: serde decoding followed by range checks.
pub trait ActivityParams: DeserializeOwned {
    /// Range checks run after decoding.
    fn check(&self) -> Result<(), ParamError> {
        Ok(())
    }

    fn parse(activity: &Activity) -> Result<Self, ParamError> {
        let params: Self = serde_json::from_value(Value::Object(activity.parameters.clone()))
            .map_err(|source| ParamError::Decode {
                activity_type: activity.activity_type.clone(),
                source,
            })?;
        params.check()?;
        Ok(params)
    }
}

/// Parameter errors become ERROR events stamped at the activity start.
pub fn validation_events<P: ActivityParams>(activity: &Activity) -> Vec<Event> {
    match P::parse(activity) {
        Ok(_) => Vec::new(),
        Err(err) => vec![
            event::error(activity.start_time, category::VALIDATION, err.to_string())
                .with("activity_id", activity.activity_id.as_str()),
        ],
    }
}

pub(crate) fn positive(field: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ParamError::OutOfRange {
            field,
            value,
            reason: "must be positive",
        })
    }
}

pub(crate) fn non_negative(field: &'static str, value: f64) -> Result<(), ParamError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ParamError::OutOfRange {
            field,
            value,
            reason: "must be non-negative",
        })
    }
}

pub(crate) fn within(field: &'static str, value: f64, low: f64, high: f64) -> Result<(), ParamError> {
    if value.is_finite() && (low..=high).contains(&value) {
        Ok(())
    } else {
        Err(ParamError::OutOfRange {
            field,
            value,
            reason: "is outside its allowed range",
        })
    }
}

pub(crate) fn optional(
    field: &'static str,
    value: Option<f64>,
    check: fn(&'static str, f64) -> Result<(), ParamError>,
) -> Result<(), ParamError> {
    value.map_or(Ok(()), |value| check(field, value))
}
