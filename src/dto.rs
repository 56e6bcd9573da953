use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Customer tags arrive either pre-joined or as a list.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Tags {
    Joined(String),
    List(Vec<String>),
}

impl Tags {
    pub fn joined(&self) -> String {
        match self {
            Tags::Joined(s) => s.clone(),
            Tags::List(items) => items.join(","),
        }
    }
}

/// One customer record as posted by the CRM backend.
///
/// Every field is optional; unknown fields are ignored. Whatever the models
/// need but the record lacks is filled in during feature projection.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct CustomerData {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub age: Option<f64>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub total_spent: Option<f64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub order_count: Option<i64>,
    #[serde(default)]
    pub average_order_value: Option<f64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub recency: Option<i64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub tenure: Option<i64>,
    #[serde(default, deserialize_with = "whole_number")]
    pub last_purchase_days: Option<i64>,
    #[serde(default)]
    pub tags: Option<Tags>,
    #[serde(default)]
    pub churn_probability: Option<f64>,
}

struct WholeNumberVisitor;

impl<'de> de::Visitor<'de> for WholeNumberVisitor {
    type Value = Option<i64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("an integer or a float with no fractional part")
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Some(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        i64::try_from(v)
            .map(Some)
            .map_err(|_| de::Error::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        // i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
        if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
            Ok(Some(v as i64))
        } else {
            Err(de::Error::invalid_value(de::Unexpected::Float(v), &self))
        }
    }
}

/// Counts and day spans: integers, also accepted as `3.0`.
fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_option(WholeNumberVisitor)
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ChurnPrediction {
    pub customer_id: Option<String>,
    pub predicted_class: u8,
    pub churn_probability: f64,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RecommendationResponse {
    pub customer_id: Option<String>,
    pub cluster_id: i64,
    pub recommendations: Vec<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct HealthReport {
    pub status: String,
    pub clusters: usize,
    pub churn_features: usize,
}
