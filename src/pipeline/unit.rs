//! The opaque data unit moved through the pipeline.
//!
//! A `DataUnit` is a cheap-to-clone handle onto a shared payload. The engine
//! never looks inside; only elements downcast the payload to whatever type
//! they agreed on. End of stream is expressed as `Option::<DataUnit>::None`,
//! so a real unit can never be mistaken for EOF.

use parking_lot::RwLock;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Named metadata values attached to a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }
}

struct UnitInner {
    payload: Box<dyn Any + Send + Sync>,
    pts: Duration,
    duration: Duration,
    properties: RwLock<HashMap<String, PropertyValue>>,
}

/// Shared-ownership handle to a payload plus timing metadata.
#[derive(Clone)]
pub struct DataUnit {
    inner: Arc<UnitInner>,
}

impl DataUnit {
    /// Wrap a payload with zero timestamps.
    pub fn new<T: Any + Send + Sync>(payload: T) -> Self {
        Self::with_timing(payload, Duration::ZERO, Duration::ZERO)
    }

    /// Wrap a payload with a presentation timestamp and duration.
    pub fn with_timing<T: Any + Send + Sync>(payload: T, pts: Duration, duration: Duration) -> Self {
        Self {
            inner: Arc::new(UnitInner {
                payload: Box::new(payload),
                pts,
                duration,
                properties: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Borrow the payload as `T`, if that is what it holds.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.inner.payload.downcast_ref::<T>()
    }

    #[inline]
    pub fn pts(&self) -> Duration {
        self.inner.pts
    }

    #[inline]
    pub fn duration(&self) -> Duration {
        self.inner.duration
    }

    /// Set a named property. Visible to every holder of this unit.
    pub fn set_property(&self, name: impl Into<String>, value: PropertyValue) {
        self.inner.properties.write().insert(name.into(), value);
    }

    pub fn property(&self, name: &str) -> Option<PropertyValue> {
        self.inner.properties.read().get(name).cloned()
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.inner.properties.read().contains_key(name)
    }

    /// Number of live handles onto this unit.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether two handles share the same payload.
    pub fn ptr_eq(&self, other: &DataUnit) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DataUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataUnit")
            .field("pts", &self.inner.pts)
            .field("duration", &self.inner.duration)
            .field("properties", &self.inner.properties.read().len())
            .finish()
    }
}
