//! Deviation analysis: how far each lab value sits outside its normal range,
//! the severity bucket that distance falls into, and the batch triage flag.

use serde::Serialize;

use crate::catalog::{FieldCatalog, LabFieldDefinition};

/// Suffix appended to field names the extraction could not locate.
pub const MISSING_SUFFIX: &str = " (Missing/Defaulted)";

const MILD_THRESHOLD_PCT: f64 = 5.0;
const MODERATE_THRESHOLD_PCT: f64 = 20.0;

/// Reported deviation when the breached bound is 0 and a percentage is undefined.
const SATURATED_DEVIATION_PCT: f64 = 100.0;

/// Severity bucket, serialized with the labels downstream consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Category {
    Green,
    Yellow,
    #[serde(rename = "Red-Yellow")]
    RedYellow,
    Red,
}

/// Why an item received its category. Not part of the wire format: a missing
/// field and a mildly deviant one are both `Yellow` there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemBasis {
    Measured,
    MissingDefaulted,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisItem {
    pub category: Category,
    pub name: String,
    pub deviation: f64,
    #[serde(skip)]
    pub basis: ItemBasis,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub items: Vec<AnalysisItem>,
    pub is_life_threatening: bool,
}

/// Round to one decimal place, halves away from zero.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Signed percentage distance from the nearest breached bound; 0 when in range.
pub fn deviation_pct(value: f64, lower: f64, upper: f64) -> f64 {
    if value >= lower && value <= upper {
        return 0.0;
    }

    let limit = if value > upper { upper } else { lower };
    if limit == 0.0 {
        return SATURATED_DEVIATION_PCT.copysign(value - limit);
    }
    round1((value - limit) / limit.abs() * 100.0)
}

pub fn categorize(deviation: f64) -> Category {
    let magnitude = deviation.abs();
    if magnitude == 0.0 {
        Category::Green
    } else if magnitude <= MILD_THRESHOLD_PCT {
        Category::Yellow
    } else if magnitude <= MODERATE_THRESHOLD_PCT {
        Category::RedYellow
    } else {
        Category::Red
    }
}

/// Classify one value against its field definition.
pub fn analyze_value(field: &LabFieldDefinition, value: f64) -> AnalysisItem {
    if value == 0.0 && !field.admits_zero() {
        return AnalysisItem {
            category: Category::Yellow,
            name: format!("{}{MISSING_SUFFIX}", field.name),
            deviation: 0.0,
            basis: ItemBasis::MissingDefaulted,
        };
    }

    let deviation = deviation_pct(value, field.lower_bound, field.upper_bound);
    AnalysisItem {
        category: categorize(deviation),
        name: field.name.clone(),
        deviation,
        basis: ItemBasis::Measured,
    }
}

/// Analyze a feature vector position by position against the catalog.
///
/// Only positions present in both are processed; a short vector yields fewer items.
pub fn analyze(features: &[f64], catalog: &FieldCatalog) -> Analysis {
    let items: Vec<AnalysisItem> = catalog
        .fields()
        .iter()
        .zip(features.iter().copied())
        .map(|(field, value)| analyze_value(field, value))
        .collect();

    let is_life_threatening = items.iter().any(|item| item.category == Category::Red);

    if is_life_threatening {
        tracing::info!(
            red = items.iter().filter(|i| i.category == Category::Red).count(),
            "Life-threatening deviation detected"
        );
    }

    Analysis {
        items,
        is_life_threatening,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(lower: f64, upper: f64) -> LabFieldDefinition {
        LabFieldDefinition::new("Test", lower, upper)
    }

    #[test]
    fn in_range_deviation_is_zero() {
        assert_eq!(deviation_pct(13.5, 12.0, 16.0), 0.0);
    }

    #[test]
    fn above_range_deviation_is_positive() {
        assert_eq!(deviation_pct(17.0, 12.0, 16.0), 6.3);
    }

    #[test]
    fn below_range_deviation_is_negative() {
        assert_eq!(deviation_pct(10.0, 12.0, 16.0), -16.7);
    }

    #[test]
    fn boundaries_are_in_range() {
        assert_eq!(deviation_pct(12.0, 12.0, 16.0), 0.0);
        assert_eq!(deviation_pct(16.0, 12.0, 16.0), 0.0);
        assert_eq!(analyze_value(&field(12.0, 16.0), 16.0).category, Category::Green);
    }

    #[test]
    fn zero_bound_saturates() {
        assert_eq!(deviation_pct(-0.5, 0.0, 1.0), -100.0);
        assert_eq!(categorize(deviation_pct(-0.5, 0.0, 1.0)), Category::Red);
    }

    #[test]
    fn round1_half_away_from_zero() {
        assert_eq!(round1(6.25), 6.3);
        assert_eq!(round1(-16.666), -16.7);
    }

    #[test]
    fn category_boundaries() {
        assert_eq!(categorize(0.0), Category::Green);
        assert_eq!(categorize(5.0), Category::Yellow);
        assert_eq!(categorize(-5.0), Category::Yellow);
        assert_eq!(categorize(5.01), Category::RedYellow);
        assert_eq!(categorize(20.0), Category::RedYellow);
        assert_eq!(categorize(-20.0), Category::RedYellow);
        assert_eq!(categorize(20.01), Category::Red);
    }

    #[test]
    fn zero_outside_range_is_missing() {
        let item = analyze_value(&LabFieldDefinition::new("Platelets", 150.0, 450.0), 0.0);
        assert_eq!(item.category, Category::Yellow);
        assert_eq!(item.name, "Platelets (Missing/Defaulted)");
        assert_eq!(item.deviation, 0.0);
        assert_eq!(item.basis, ItemBasis::MissingDefaulted);
    }

    #[test]
    fn zero_inside_range_is_measured() {
        let item = analyze_value(&LabFieldDefinition::new("Trace", 0.0, 1.0), 0.0);
        assert_eq!(item.category, Category::Green);
        assert_eq!(item.name, "Trace");
        assert_eq!(item.basis, ItemBasis::Measured);
    }

    #[test]
    fn mild_deviation_yellow_is_measured() {
        // 16.5 vs upper 16 => 3.1%
        let item = analyze_value(&field(12.0, 16.0), 16.5);
        assert_eq!(item.category, Category::Yellow);
        assert_eq!(item.deviation, 3.1);
        assert_eq!(item.basis, ItemBasis::Measured);
    }

    #[test]
    fn items_follow_catalog_order() {
        let catalog = FieldCatalog::standard();
        let features: Vec<f64> = catalog
            .fields()
            .iter()
            .map(|f| (f.lower_bound + f.upper_bound) / 2.0)
            .collect();
        let analysis = analyze(&features, &catalog);

        assert_eq!(analysis.items.len(), 19);
        for (item, field) in analysis.items.iter().zip(catalog.fields()) {
            assert_eq!(item.name, field.name);
            assert_eq!(item.category, Category::Green);
        }
        assert!(!analysis.is_life_threatening);
    }

    #[test]
    fn short_vector_processes_available_positions() {
        let catalog = FieldCatalog::standard();
        let analysis = analyze(&[13.0, 6.0], &catalog);
        assert_eq!(analysis.items.len(), 2);
        assert_eq!(analysis.items[1].name, "WBC Count (10^3/uL)");
    }

    #[test]
    fn empty_vector_yields_no_items() {
        let analysis = analyze(&[], &FieldCatalog::standard());
        assert!(analysis.items.is_empty());
        assert!(!analysis.is_life_threatening);
    }

    #[test]
    fn single_red_sets_triage_flag() {
        let catalog = FieldCatalog::standard();
        let mut features = vec![14.0; 1];
        // Potassium at index 10 with range [3.5, 5.0]; 7.0 is 40% above.
        features.extend(catalog.fields()[1..10].iter().map(|f| f.lower_bound));
        features.push(7.0);
        let analysis = analyze(&features, &catalog);

        assert_eq!(analysis.items[10].category, Category::Red);
        assert!(analysis.is_life_threatening);
    }

    #[test]
    fn no_red_leaves_flag_unset() {
        let catalog = FieldCatalog::new(vec![
            LabFieldDefinition::new("A", 10.0, 20.0),
            LabFieldDefinition::new("B", 10.0, 20.0),
            LabFieldDefinition::new("C", 10.0, 20.0),
        ])
        .unwrap();
        // Green, Yellow (+5%), Red-Yellow (+15%)
        let analysis = analyze(&[15.0, 21.0, 23.0], &catalog);
        let categories: Vec<Category> = analysis.items.iter().map(|i| i.category).collect();
        assert_eq!(
            categories,
            vec![Category::Green, Category::Yellow, Category::RedYellow]
        );
        assert!(!analysis.is_life_threatening);
    }

    #[test]
    fn serializes_wire_labels() {
        let item = analyze_value(&field(10.0, 20.0), 23.0);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["category"], "Red-Yellow");
        assert_eq!(json["name"], "Test");
        assert_eq!(json["deviation"], 15.0);
        assert!(json.get("basis").is_none());
    }
}
