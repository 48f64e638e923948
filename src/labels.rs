use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::bins::BinRanges;
use crate::constants::corpus::{ACHIEVEMENT_PROGRESS_FIELD, PERCENTAGE_SCALE};
use crate::errors::PartitionError;

/// Partitioning key derived from a sample's (possibly transformed) label.
///
/// Always finite. Ordering and hashing follow the IEEE total order, with
/// `-0.0` folded into `0.0` so equal values hash equally.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct LabelValue(f64);

impl LabelValue {
    /// Wrap a finite value; `None` for NaN or infinities.
    pub fn new(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Some(Self(if value == 0.0 { 0.0 } else { value }))
    }

    /// Label value for a 1-based bin index.
    pub fn bin(index: usize) -> Self {
        Self(index as f64)
    }

    /// Raw numeric value.
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for LabelValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LabelValue {}

impl PartialOrd for LabelValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for LabelValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<f64> for LabelValue {
    type Error = PartitionError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            PartitionError::Configuration(format!("label value {value} is not finite"))
        })
    }
}

impl From<LabelValue> for f64 {
    fn from(value: LabelValue) -> Self {
        value.0
    }
}

/// How a label's raw value is interpreted before any transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelKind {
    /// Integral counts (votes, friends, achievements).
    Count,
    /// Continuous measurements (hours played).
    Continuous,
    /// Fractions in `[0, 1]`, scaled to percentages before use.
    Percentage,
}

impl LabelKind {
    /// Apply the kind's fixed scaling policy to a raw value.
    pub fn scale(self, raw: f64) -> f64 {
        match self {
            LabelKind::Percentage => raw * PERCENTAGE_SCALE,
            LabelKind::Count | LabelKind::Continuous => raw,
        }
    }
}

/// Review attributes that can serve as the prediction label.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionLabel {
    TotalGameHours,
    #[default]
    TotalGameHoursBin,
    TotalGameHoursLastTwoWeeks,
    NumFoundHelpful,
    NumFoundUnhelpful,
    NumFoundFunny,
    NumVotedHelpfulness,
    FoundHelpfulPercentage,
    NumAchievementsPercentage,
    NumAchievementsAttained,
    NumAchievementsPossible,
    NumGuides,
    NumGamesOwned,
    NumFriends,
    NumGroups,
    NumWorkshopItems,
    NumReviews,
    NumBadges,
    NumScreenshots,
    NumComments,
    FriendPlayerLevel,
}

impl PredictionLabel {
    /// Every selectable label, in declaration order.
    pub const ALL: [PredictionLabel; 21] = [
        PredictionLabel::TotalGameHours,
        PredictionLabel::TotalGameHoursBin,
        PredictionLabel::TotalGameHoursLastTwoWeeks,
        PredictionLabel::NumFoundHelpful,
        PredictionLabel::NumFoundUnhelpful,
        PredictionLabel::NumFoundFunny,
        PredictionLabel::NumVotedHelpfulness,
        PredictionLabel::FoundHelpfulPercentage,
        PredictionLabel::NumAchievementsPercentage,
        PredictionLabel::NumAchievementsAttained,
        PredictionLabel::NumAchievementsPossible,
        PredictionLabel::NumGuides,
        PredictionLabel::NumGamesOwned,
        PredictionLabel::NumFriends,
        PredictionLabel::NumGroups,
        PredictionLabel::NumWorkshopItems,
        PredictionLabel::NumReviews,
        PredictionLabel::NumBadges,
        PredictionLabel::NumScreenshots,
        PredictionLabel::NumComments,
        PredictionLabel::FriendPlayerLevel,
    ];

    /// Flat document field holding the label.
    pub fn field(self) -> &'static str {
        match self {
            PredictionLabel::TotalGameHours => "total_game_hours",
            PredictionLabel::TotalGameHoursBin => "total_game_hours_bin",
            PredictionLabel::TotalGameHoursLastTwoWeeks => "total_game_hours_last_two_weeks",
            PredictionLabel::NumFoundHelpful => "num_found_helpful",
            PredictionLabel::NumFoundUnhelpful => "num_found_unhelpful",
            PredictionLabel::NumFoundFunny => "num_found_funny",
            PredictionLabel::NumVotedHelpfulness => "num_voted_helpfulness",
            PredictionLabel::FoundHelpfulPercentage => "found_helpful_percentage",
            PredictionLabel::NumAchievementsPercentage => "num_achievements_percentage",
            PredictionLabel::NumAchievementsAttained => "num_achievements_attained",
            PredictionLabel::NumAchievementsPossible => "num_achievements_possible",
            PredictionLabel::NumGuides => "num_guides",
            PredictionLabel::NumGamesOwned => "num_games_owned",
            PredictionLabel::NumFriends => "num_friends",
            PredictionLabel::NumGroups => "num_groups",
            PredictionLabel::NumWorkshopItems => "num_workshop_items",
            PredictionLabel::NumReviews => "num_reviews",
            PredictionLabel::NumBadges => "num_badges",
            PredictionLabel::NumScreenshots => "num_screenshots",
            PredictionLabel::NumComments => "num_comments",
            PredictionLabel::FriendPlayerLevel => "friend_player_level",
        }
    }

    /// Scaling policy for the label's raw values.
    pub fn kind(self) -> LabelKind {
        match self {
            PredictionLabel::FoundHelpfulPercentage
            | PredictionLabel::NumAchievementsPercentage => LabelKind::Percentage,
            PredictionLabel::TotalGameHours | PredictionLabel::TotalGameHoursLastTwoWeeks => {
                LabelKind::Continuous
            }
            _ => LabelKind::Count,
        }
    }

    /// Nested sub-document searched when the flat field is absent.
    pub fn nested_fallback(self) -> Option<&'static str> {
        match self {
            PredictionLabel::NumAchievementsPercentage
            | PredictionLabel::NumAchievementsAttained
            | PredictionLabel::NumAchievementsPossible => Some(ACHIEVEMENT_PROGRESS_FIELD),
            _ => None,
        }
    }

    /// Read the raw label from a sample document.
    ///
    /// Missing or `null` values yield `Ok(None)`; present non-numeric values
    /// are an error.
    pub fn lookup(
        self,
        sample_id: &str,
        fields: &Map<String, Value>,
    ) -> Result<Option<f64>, PartitionError> {
        let field = self.field();
        let value = match fields.get(field) {
            Some(value) if !value.is_null() => Some(value),
            _ => self
                .nested_fallback()
                .and_then(|nested| fields.get(nested))
                .and_then(|nested| nested.get(field))
                .filter(|value| !value.is_null()),
        };
        match value {
            None => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| PartitionError::NonNumericLabel {
                    sample_id: sample_id.to_string(),
                    label: field.to_string(),
                }),
        }
    }
}

impl fmt::Display for PredictionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

impl FromStr for PredictionLabel {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        PredictionLabel::ALL
            .into_iter()
            .find(|label| label.field() == needle)
            .ok_or_else(|| {
                PartitionError::Configuration(format!("unrecognized prediction label '{needle}'"))
            })
    }
}

/// Caller-facing transform flags, at most one of which may be active.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Apply the natural logarithm.
    pub lognormal: bool,
    /// Raise values to this power.
    pub power: Option<f64>,
    /// Replace values by their 1-based bin index.
    pub bin_ranges: Option<BinRanges>,
}

impl TransformOptions {
    /// Resolve the flags into a single transform.
    pub fn resolve(&self) -> Result<LabelTransform, PartitionError> {
        let active = [
            self.lognormal,
            self.power.is_some(),
            self.bin_ranges.is_some(),
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count();
        if active > 1 {
            return Err(PartitionError::Configuration(
                "lognormal, power, and bin ranges are mutually exclusive".into(),
            ));
        }
        if let Some(power) = self.power {
            if !power.is_finite() {
                return Err(PartitionError::Configuration(format!(
                    "power transform exponent must be finite, found {power}"
                )));
            }
            return Ok(LabelTransform::Power(power));
        }
        if self.lognormal {
            return Ok(LabelTransform::Lognormal);
        }
        Ok(match &self.bin_ranges {
            Some(bins) => LabelTransform::Binned(bins.clone()),
            None => LabelTransform::Identity,
        })
    }
}

/// Resolved label transform.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum LabelTransform {
    /// Use the (kind-scaled) raw value.
    #[default]
    Identity,
    /// Natural logarithm.
    Lognormal,
    /// `value.powf(exponent)`.
    Power(f64),
    /// 1-based bin index.
    Binned(BinRanges),
}

impl LabelTransform {
    /// Short name used in logs and errors.
    pub fn name(&self) -> String {
        match self {
            LabelTransform::Identity => "identity".to_string(),
            LabelTransform::Lognormal => "ln".to_string(),
            LabelTransform::Power(power) => format!("x**{power}"),
            LabelTransform::Binned(bins) => format!("{}-bin", bins.len()),
        }
    }

    /// Transform an already kind-scaled value.
    pub fn apply(&self, value: f64) -> Result<LabelValue, PartitionError> {
        let transformed = match self {
            LabelTransform::Identity => value,
            LabelTransform::Lognormal => value.ln(),
            LabelTransform::Power(power) => value.powf(*power),
            LabelTransform::Binned(bins) => {
                let index = bins
                    .assign(value)
                    .ok_or(PartitionError::LabelOutOfRange { value })?;
                return Ok(LabelValue::bin(index));
            }
        };
        LabelValue::new(transformed).ok_or_else(|| PartitionError::UndefinedTransform {
            value,
            transform: self.name(),
        })
    }
}

/// Turn a raw label into its partitioning key.
///
/// `Ok(None)` means the sample has no label and is excluded from every
/// partition.
pub fn transform(
    raw: Option<f64>,
    kind: LabelKind,
    transform: &LabelTransform,
) -> Result<Option<LabelValue>, PartitionError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    transform.apply(kind.scale(raw)).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bins::generate;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn absent_raw_value_excludes_sample() {
        let result = transform(None, LabelKind::Count, &LabelTransform::Lognormal).unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn percentage_labels_are_scaled_before_transform() {
        let value = transform(Some(0.25), LabelKind::Percentage, &LabelTransform::Identity)
            .unwrap()
            .unwrap();
        assert_eq!(value.get(), 25.0);

        let bins = generate(0.0, 100.0, 4).unwrap();
        let binned = transform(
            Some(0.8),
            LabelKind::Percentage,
            &LabelTransform::Binned(bins),
        )
        .unwrap()
        .unwrap();
        assert_eq!(binned, LabelValue::bin(4));
    }

    #[test]
    fn log_and_power_transforms_apply() {
        let ln = transform(Some(1.0), LabelKind::Continuous, &LabelTransform::Lognormal)
            .unwrap()
            .unwrap();
        assert_eq!(ln.get(), 0.0);
        let squared = transform(Some(3.0), LabelKind::Count, &LabelTransform::Power(2.0))
            .unwrap()
            .unwrap();
        assert_eq!(squared.get(), 9.0);
    }

    #[test]
    fn undefined_transforms_are_errors() {
        let err = transform(Some(0.0), LabelKind::Continuous, &LabelTransform::Lognormal)
            .unwrap_err();
        assert!(matches!(err, PartitionError::UndefinedTransform { .. }));
        let err = transform(Some(-4.0), LabelKind::Count, &LabelTransform::Power(0.5))
            .unwrap_err();
        assert!(matches!(err, PartitionError::UndefinedTransform { .. }));
    }

    #[test]
    fn binning_outside_coverage_is_fatal() {
        let bins = generate(0.0, 10.0, 5).unwrap();
        let err = transform(Some(42.0), LabelKind::Count, &LabelTransform::Binned(bins))
            .unwrap_err();
        assert!(matches!(err, PartitionError::LabelOutOfRange { value } if value == 42.0));
    }

    #[test]
    fn conflicting_transform_options_are_rejected() {
        let options = TransformOptions {
            lognormal: true,
            power: Some(2.0),
            bin_ranges: None,
        };
        assert!(matches!(
            options.resolve(),
            Err(PartitionError::Configuration(_))
        ));

        let options = TransformOptions {
            lognormal: false,
            power: Some(0.5),
            bin_ranges: Some(generate(0.0, 10.0, 2).unwrap()),
        };
        assert!(options.resolve().is_err());

        let options = TransformOptions {
            power: Some(0.5),
            ..TransformOptions::default()
        };
        assert_eq!(options.resolve().unwrap(), LabelTransform::Power(0.5));
        assert_eq!(
            TransformOptions::default().resolve().unwrap(),
            LabelTransform::Identity
        );
    }

    #[test]
    fn lookup_falls_back_to_nested_document() {
        let doc = fields(json!({
            "total_game_hours": 12.5,
            "achievement_progress": { "num_achievements_attained": 7 }
        }));
        assert_eq!(
            PredictionLabel::TotalGameHours.lookup("a", &doc).unwrap(),
            Some(12.5)
        );
        assert_eq!(
            PredictionLabel::NumAchievementsAttained
                .lookup("a", &doc)
                .unwrap(),
            Some(7.0)
        );
        // Only achievement labels consult the nested document.
        assert_eq!(PredictionLabel::NumFriends.lookup("a", &doc).unwrap(), None);
    }

    #[test]
    fn lookup_treats_null_as_missing_and_rejects_text() {
        let doc = fields(json!({ "num_friends": null, "num_groups": "many" }));
        assert_eq!(PredictionLabel::NumFriends.lookup("a", &doc).unwrap(), None);
        let err = PredictionLabel::NumGroups.lookup("a", &doc).unwrap_err();
        assert!(matches!(err, PartitionError::NonNumericLabel { .. }));
    }

    #[test]
    fn labels_parse_from_field_names() {
        for label in PredictionLabel::ALL {
            assert_eq!(label.field().parse::<PredictionLabel>().unwrap(), label);
        }
        assert!("hours".parse::<PredictionLabel>().is_err());
        assert_eq!(
            PredictionLabel::FoundHelpfulPercentage.kind(),
            LabelKind::Percentage
        );
    }

    #[test]
    fn label_values_order_and_hash_consistently() {
        let zero = LabelValue::new(0.0).unwrap();
        let negative_zero = LabelValue::new(-0.0).unwrap();
        assert_eq!(zero, negative_zero);
        let mut set = std::collections::HashSet::new();
        set.insert(zero);
        assert!(set.contains(&negative_zero));
        assert!(LabelValue::new(f64::NAN).is_none());
        assert!(LabelValue::bin(1) < LabelValue::bin(2));
    }
}
