//! Ordered catalog of the lab fields the service extracts.
//!
//! Position in the catalog is the position in the feature vector. The same
//! `FieldCatalog` value is handed to the extraction prompt builder and to the
//! deviation analyzer, so the order is defined exactly once.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error reading catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog is empty")]
    Empty,

    #[error("Duplicate field name in catalog: {0}")]
    DuplicateName(String),

    #[error("Invalid range for {name}: [{lower}, {upper}]")]
    InvalidRange { name: String, lower: f64, upper: f64 },
}

/// A lab field and its clinically accepted normal range (inclusive on both ends).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabFieldDefinition {
    pub name: String,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

impl LabFieldDefinition {
    pub fn new(name: &str, lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            name: name.to_string(),
            lower_bound,
            upper_bound,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }

    /// Whether 0 is a plausible in-range reading for this field.
    pub fn admits_zero(&self) -> bool {
        self.contains(0.0)
    }
}

/// Built-in normal ranges, in feature-vector order.
const STANDARD_FIELDS: &[(&str, f64, f64)] = &[
    ("Hemoglobin (g/dL)", 12.0, 16.0),
    ("WBC Count (10^3/uL)", 4.0, 11.0),
    ("Platelet Count (10^3/uL)", 150.0, 450.0),
    ("RBC Count (10^6/uL)", 4.2, 5.9),
    ("Hematocrit (%)", 36.0, 50.0),
    ("MCV (fL)", 80.0, 100.0),
    ("Fasting Glucose (mg/dL)", 70.0, 100.0),
    ("Creatinine (mg/dL)", 0.6, 1.3),
    ("Blood Urea Nitrogen (mg/dL)", 7.0, 20.0),
    ("Sodium (mmol/L)", 135.0, 145.0),
    ("Potassium (mmol/L)", 3.5, 5.0),
    ("Chloride (mmol/L)", 98.0, 107.0),
    ("Calcium (mg/dL)", 8.5, 10.5),
    ("Total Bilirubin (mg/dL)", 0.1, 1.2),
    ("ALT (U/L)", 7.0, 56.0),
    ("AST (U/L)", 10.0, 40.0),
    ("Albumin (g/dL)", 3.5, 5.0),
    ("Total Cholesterol (mg/dL)", 125.0, 200.0),
    ("HbA1c (%)", 4.0, 5.6),
];

/// Immutable, ordered sequence of lab field definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCatalog {
    fields: Vec<LabFieldDefinition>,
}

impl FieldCatalog {
    /// The 19 built-in fields.
    pub fn standard() -> Self {
        Self {
            fields: STANDARD_FIELDS
                .iter()
                .map(|&(name, lower, upper)| LabFieldDefinition::new(name, lower, upper))
                .collect(),
        }
    }

    /// Build a catalog from explicit definitions, keeping their order.
    pub fn new(fields: Vec<LabFieldDefinition>) -> Result<Self, CatalogError> {
        if fields.is_empty() {
            return Err(CatalogError::Empty);
        }

        for (i, field) in fields.iter().enumerate() {
            let finite = field.lower_bound.is_finite() && field.upper_bound.is_finite();
            if !finite || field.lower_bound > field.upper_bound {
                return Err(CatalogError::InvalidRange {
                    name: field.name.clone(),
                    lower: field.lower_bound,
                    upper: field.upper_bound,
                });
            }
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CatalogError::DuplicateName(field.name.clone()));
            }
        }

        Ok(Self { fields })
    }

    /// Parse a JSON array of `{name, lower_bound, upper_bound}` objects.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let fields: Vec<LabFieldDefinition> = serde_json::from_str(json)?;
        Self::new(fields)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&LabFieldDefinition> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[LabFieldDefinition] {
        &self.fields
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        Self::standard()
    }
}
