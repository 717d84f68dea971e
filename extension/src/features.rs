// Feature gating by subscription tier
// A UX affordance only: nothing here is an access-control boundary

use serde::{Deserialize, Serialize};

use crate::settings::Tier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    BasicFeature,
    AdvancedAnalytics,
    CustomThemes,
    ExportData,
    PrioritySupport,
}

/// Required tier per feature. Compiled in, never mutated.
pub const FEATURE_CONFIG: [(Feature, Tier); 5] = [
    (Feature::BasicFeature, Tier::Free),
    (Feature::AdvancedAnalytics, Tier::Pro),
    (Feature::CustomThemes, Tier::Pro),
    (Feature::ExportData, Tier::Pro),
    (Feature::PrioritySupport, Tier::Pro),
];

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::BasicFeature,
        Feature::AdvancedAnalytics,
        Feature::CustomThemes,
        Feature::ExportData,
        Feature::PrioritySupport,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Feature::BasicFeature => "basic_feature",
            Feature::AdvancedAnalytics => "advanced_analytics",
            Feature::CustomThemes => "custom_themes",
            Feature::ExportData => "export_data",
            Feature::PrioritySupport => "priority_support",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|feature| feature.key() == key)
    }

    /// A feature missing from the table is treated as pro-only
    pub fn required_tier(&self) -> Tier {
        FEATURE_CONFIG
            .iter()
            .find(|(feature, _)| feature == self)
            .map(|(_, tier)| *tier)
            .unwrap_or(Tier::Pro)
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

pub fn has_access(tier: Tier, feature: Feature) -> bool {
    match feature.required_tier() {
        Tier::Free => true,
        Tier::Pro => tier == Tier::Pro,
    }
}

/// String-keyed variant for UI callers; unknown keys are denied
pub fn has_access_by_key(tier: Tier, key: &str) -> bool {
    Feature::from_key(key).is_some_and(|feature| has_access(tier, feature))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_feature_has_a_table_entry() {
        for feature in Feature::ALL {
            assert!(
                FEATURE_CONFIG.iter().any(|(f, _)| *f == feature),
                "{} missing from FEATURE_CONFIG",
                feature
            );
        }
        let free: Vec<_> = FEATURE_CONFIG
            .iter()
            .filter(|(_, tier)| *tier == Tier::Free)
            .collect();
        assert_eq!(free.len(), 1);
    }

    #[test]
    fn test_pro_has_everything() {
        for feature in Feature::ALL {
            assert!(has_access(Tier::Pro, feature));
        }
    }

    #[test]
    fn test_free_only_gets_free_features() {
        for feature in Feature::ALL {
            assert_eq!(
                has_access(Tier::Free, feature),
                feature.required_tier() == Tier::Free
            );
        }
        assert!(has_access(Tier::Free, Feature::BasicFeature));
        assert!(!has_access(Tier::Free, Feature::AdvancedAnalytics));
        assert!(has_access(Tier::Pro, Feature::AdvancedAnalytics));
    }

    #[test]
    fn test_keys() {
        assert_eq!(Feature::from_key("advanced_analytics"), Some(Feature::AdvancedAnalytics));
        assert_eq!(
            serde_json::to_value(Feature::BasicFeature).unwrap(),
            serde_json::json!("basic_feature")
        );
        assert!(has_access_by_key(Tier::Free, "basic_feature"));
        assert!(!has_access_by_key(Tier::Pro, "teleportation"));
    }
}
