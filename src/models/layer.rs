use super::ReferenceSystem;
use crate::error::{GapError, Result};

/// A homogeneous feature set sharing one reference system
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    /// `None` when the source did not declare a reference system
    pub crs: Option<ReferenceSystem>,
    pub features: Vec<T>,
}

impl<T> Layer<T> {
    pub fn new(crs: ReferenceSystem, features: Vec<T>) -> Self {
        Self {
            crs: Some(crs),
            features,
        }
    }

    pub fn undeclared(features: Vec<T>) -> Self {
        Self {
            crs: None,
            features,
        }
    }

    /// The declared reference system, or an error naming the layer
    pub fn require_crs(&self, name: &str) -> Result<&ReferenceSystem> {
        self.crs.as_ref().ok_or_else(|| {
            GapError::ReferenceSystem(format!("{} layer has no declared reference system", name))
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.features.iter()
    }
}
