//! Typed variable storage.
//!
//! [`Values`] maps keys to the current estimate of each variable. Factors read
//! their variables from it by key when evaluating or linearizing. A value is
//! stored as a [`Value`] variant and retrieved back as its concrete type through
//! [`ValueType`], so asking for a `Point3` under a key that holds a `Pose3` is
//! an error rather than a silent reinterpretation.
//!
//! # Example
//!
//! ```
//! use apex_triangulation::core::{symbol, values::Values};
//! use apex_triangulation::geometry::Point3;
//! # use apex_triangulation::core::CoreResult;
//! # fn example() -> CoreResult<()> {
//!
//! let mut values = Values::new();
//! values.insert(symbol('l', 1), Point3::new(1.0, 2.0, 3.0))?;
//!
//! let landmark: &Point3 = values.at("l1")?;
//! assert_eq!(landmark.z, 3.0);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{CoreError, CoreResult, Key};
use crate::geometry::{Point2, Point3, Pose3};

/// A variable value of any supported type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Point2(Point2),
    Point3(Point3),
    Pose3(Pose3),
}

impl Value {
    /// Name of the stored type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Point2(_) => Point2::TYPE_NAME,
            Value::Point3(_) => Point3::TYPE_NAME,
            Value::Pose3(_) => Pose3::TYPE_NAME,
        }
    }

    /// Tangent space dimension of the stored value.
    pub fn dim(&self) -> usize {
        match self {
            Value::Point2(_) => 2,
            Value::Point3(_) => 3,
            Value::Pose3(_) => 6,
        }
    }
}

/// Types that can be stored in and retrieved from [`Values`].
pub trait ValueType: Clone {
    const TYPE_NAME: &'static str;

    fn from_value(value: &Value) -> Option<&Self>;

    fn into_value(self) -> Value;
}

impl ValueType for Point2 {
    const TYPE_NAME: &'static str = "Point2";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Point2(p) => Some(p),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Point2(self)
    }
}

impl ValueType for Point3 {
    const TYPE_NAME: &'static str = "Point3";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Point3(p) => Some(p),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Point3(self)
    }
}

impl ValueType for Pose3 {
    const TYPE_NAME: &'static str = "Pose3";

    fn from_value(value: &Value) -> Option<&Self> {
        match value {
            Value::Pose3(p) => Some(p),
            _ => None,
        }
    }

    fn into_value(self) -> Value {
        Value::Pose3(self)
    }
}

/// Current estimates of all variables, keyed by [`Key`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Values {
    values: HashMap<Key, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new variable.
    ///
    /// # Errors
    ///
    /// [`CoreError::DuplicateKey`] if the key is already present.
    pub fn insert<T: ValueType>(&mut self, key: impl Into<Key>, value: T) -> CoreResult<()> {
        let key = key.into();
        if self.values.contains_key(&key) {
            return Err(CoreError::DuplicateKey(key).log());
        }
        self.values.insert(key, value.into_value());
        Ok(())
    }

    /// Replace the value of an existing variable. The type may not change.
    pub fn update<T: ValueType>(&mut self, key: &str, value: T) -> CoreResult<()> {
        let slot = self
            .values
            .get_mut(key)
            .ok_or_else(|| CoreError::MissingKey(key.to_string()).log())?;
        if T::from_value(slot).is_none() {
            return Err(CoreError::TypeMismatch {
                key: key.to_string(),
                expected: T::TYPE_NAME,
                actual: slot.type_name(),
            }
            .log());
        }
        *slot = value.into_value();
        Ok(())
    }

    /// Typed access to a stored variable.
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingKey`] if nothing is stored under `key`
    /// - [`CoreError::TypeMismatch`] if the stored value is not a `T`
    pub fn at<T: ValueType>(&self, key: &str) -> CoreResult<&T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| CoreError::MissingKey(key.to_string()).log())?;
        T::from_value(value).ok_or_else(|| {
            CoreError::TypeMismatch {
                key: key.to_string(),
                expected: T::TYPE_NAME,
                actual: value.type_name(),
            }
            .log()
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.values.keys()
    }
}
