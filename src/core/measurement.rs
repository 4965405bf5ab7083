//! Point values and their batch projection.

use serde::{Deserialize, Serialize};

/// Unique identifier of one measured signal's history.
pub type SeriesId = i32;

/// Fieldless discriminant of [`PointValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Binary,
    Multistate,
    Numeric,
    Text,
    Image,
}

/// Image payload; the bytes are written alongside the sample row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageValue {
    /// Image format code (jpeg, png, ...).
    pub image_type: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PointValue {
    Binary(bool),
    Multistate(i32),
    Numeric(f64),
    Text(String),
    Image(ImageValue),
}

impl PointValue {
    pub fn kind(&self) -> DataKind {
        match self {
            PointValue::Binary(_) => DataKind::Binary,
            PointValue::Multistate(_) => DataKind::Multistate,
            PointValue::Numeric(_) => DataKind::Numeric,
            PointValue::Text(_) => DataKind::Text,
            PointValue::Image(_) => DataKind::Image,
        }
    }

    /// Numeric representation, if the kind has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Binary(value) => Some(if *value { 1.0 } else { 0.0 }),
            PointValue::Multistate(value) => Some(f64::from(*value)),
            PointValue::Numeric(value) => Some(*value),
            PointValue::Text(_) | PointValue::Image(_) => None,
        }
    }
}

/// Who or what caused a value to be set (user, script, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub source: String,
}

impl Annotation {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub series_id: SeriesId,
    pub value: PointValue,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: i64,
    pub annotation: Option<Annotation>,
}

impl Measurement {
    pub fn new(series_id: SeriesId, value: PointValue, timestamp: i64) -> Self {
        Self {
            series_id,
            value,
            timestamp,
            annotation: None,
        }
    }

    pub fn numeric(series_id: SeriesId, value: f64, timestamp: i64) -> Self {
        Self::new(series_id, PointValue::Numeric(value), timestamp)
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotation = Some(annotation);
        self
    }

    pub fn kind(&self) -> DataKind {
        self.value.kind()
    }

    /// Projection used by the batch path, or `None` if this measurement
    /// must be written through the single-row path.
    ///
    /// Annotated, text and image values never batch.
    pub fn batch_entry(&self, bounds: impl Fn(f64) -> f64) -> Option<BatchEntry> {
        if self.annotation.is_some() {
            return None;
        }
        let value = match &self.value {
            PointValue::Binary(_) | PointValue::Multistate(_) | PointValue::Numeric(_) => {
                self.value.as_f64()?
            }
            PointValue::Text(_) | PointValue::Image(_) => return None,
        };
        Some(BatchEntry {
            series_id: self.series_id,
            kind: self.kind(),
            value: bounds(value),
            timestamp: self.timestamp,
        })
    }

    pub fn is_batch_eligible(&self) -> bool {
        self.batch_entry(|v| v).is_some()
    }

    /// Copy with `bounds` applied to a numeric payload. Other kinds are
    /// stored as-is.
    pub fn bounded(&self, bounds: impl Fn(f64) -> f64) -> Measurement {
        let mut bounded = self.clone();
        if let PointValue::Numeric(value) = &mut bounded.value {
            *value = bounds(*value);
        }
        bounded
    }
}

/// Minimal row queued for multi-row insertion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub series_id: SeriesId,
    pub kind: DataKind,
    pub value: f64,
    pub timestamp: i64,
}

impl BatchEntry {
    pub fn into_measurement(self) -> Measurement {
        let value = match self.kind {
            DataKind::Binary => PointValue::Binary(self.value != 0.0),
            DataKind::Multistate => PointValue::Multistate(self.value as i32),
            _ => PointValue::Numeric(self.value),
        };
        Measurement::new(self.series_id, value, self.timestamp)
    }
}

/// A measurement that could not be persisted after all sync retries.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsavedMeasurement {
    pub measurement: Measurement,
    /// Number of sync attempts made so far, across drains.
    pub attempts: u32,
}

/// Everything the core needs to know about a series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDescriptor {
    pub series_id: SeriesId,
    pub name: String,
    pub kind: DataKind,
}
