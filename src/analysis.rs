//! Analysis result data model (spec §3): a schema-versioned tagged union of
//! `Quick` and `Full` results, produced once at finalisation.

use std::collections::BTreeMap;

/// Current schema version stamped into every [`AnalysisResult`].
pub const SCHEMA_VERSION: u32 = 1;

/// Fields common to both [`AnalysisResult`] variants.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct QuickFields {
    pub extruder_temps: Option<Vec<u32>>,
    pub first_move_x: Option<f64>,
    pub first_move_y: Option<f64>,
    pub has_purge_tower: Option<bool>,
    pub slicer_config: Option<BTreeMap<String, String>>,
}

/// Fields only present in the `Full` variant.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FullFields {
    pub tool_change_count: u32,
    pub min_x: f64,
    pub max_x: f64,
    pub used_tools: Vec<u32>,
}

/// Tagged union of `Quick`/`Full` analysis, as specified in spec §3.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisResult {
    Quick {
        version: u32,
        #[serde(flatten)]
        fields: QuickFields,
    },
    Full {
        version: u32,
        #[serde(flatten)]
        fields: QuickFields,
        #[serde(flatten)]
        full: FullFields,
    },
}

impl AnalysisResult {
    pub fn quick(fields: QuickFields) -> Self {
        AnalysisResult::Quick {
            version: SCHEMA_VERSION,
            fields,
        }
    }

    pub fn full(fields: QuickFields, full: FullFields) -> Self {
        AnalysisResult::Full {
            version: SCHEMA_VERSION,
            fields,
            full,
        }
    }

    pub fn quick_fields(&self) -> &QuickFields {
        match self {
            AnalysisResult::Quick { fields, .. } => fields,
            AnalysisResult::Full { fields, .. } => fields,
        }
    }

    pub fn schema_version(&self) -> u32 {
        match self {
            AnalysisResult::Quick { version, .. } => *version,
            AnalysisResult::Full { version, .. } => *version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_round_trips_through_json() {
        let result = AnalysisResult::quick(QuickFields {
            first_move_x: Some(12.5),
            first_move_y: Some(3.0),
            has_purge_tower: Some(true),
            ..Default::default()
        });
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"kind\":\"quick\""));
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn full_carries_quick_fields_too() {
        let result = AnalysisResult::full(
            QuickFields {
                first_move_x: Some(1.0),
                ..Default::default()
            },
            FullFields {
                tool_change_count: 3,
                min_x: -10.0,
                max_x: 200.0,
                used_tools: vec![0, 1, 2],
            },
        );
        assert_eq!(result.quick_fields().first_move_x, Some(1.0));
        assert_eq!(result.schema_version(), SCHEMA_VERSION);
        let json = serde_json::to_string(&result).unwrap();
        let back: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn full_serializes_used_tools_as_array() {
        let result = AnalysisResult::full(
            QuickFields::default(),
            FullFields {
                tool_change_count: 1,
                min_x: 0.0,
                max_x: 1.0,
                used_tools: vec![0, 1],
            },
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["used_tools"], serde_json::json!([0, 1]));
    }
}
