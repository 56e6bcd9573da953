//! Small hand-made artifacts and customers shared by the unit tests.

use crate::churn::ChurnModel;
use crate::recommend::RecommendationMap;
use crate::registry::ModelRegistry;
use crate::segment::SegmentPipeline;
use crm_ml_service::dto::{CustomerData, Tags};

pub const CHURN_MODEL: &str = r#"{
    "features": ["total_spent", "order_count", "average_order_value", "recency", "tenure"],
    "scaler": {
        "mean": [500.0, 5.0, 100.0, 60.0, 365.0],
        "scale": [250.0, 2.0, 50.0, 30.0, 180.0]
    },
    "coefficients": [-1.0, -0.5, 0.0, 1.5, -0.5],
    "intercept": 0.0,
    "threshold": 0.5
}"#;

// encoded layout: age | gender F, M | total_spent | churn_probability | tags vip, discount
pub const SEGMENT_MODEL: &str = r#"{
    "columns": [
        { "kind": "numeric", "name": "age", "impute": 35.0, "mean": 35.0, "scale": 10.0 },
        { "kind": "one_hot", "name": "gender", "categories": ["Female", "Male"] },
        { "kind": "numeric", "name": "total_spent", "impute": 0.0, "mean": 500.0, "scale": 250.0 },
        { "kind": "numeric", "name": "churn_probability", "impute": 0.5, "mean": 0.5, "scale": 0.25 },
        { "kind": "multi_hot", "name": "tags", "vocabulary": ["vip", "discount"] }
    ],
    "centroids": [
        [-1.0, 0.5, 0.5, -1.5, 1.5, 0.0, 1.0],
        [0.0, 0.5, 0.5, 0.0, 0.0, 0.0, 0.0],
        [1.0, 0.5, 0.5, 2.0, -1.5, 1.0, 0.0]
    ]
}"#;

pub const RECOMMENDATIONS: &str = r#"{
    "0": "Send a win-back discount",
    "1": "Recommend trending products",
    "2": "Invite to VIP loyalty program"
}"#;

pub fn churn_model() -> ChurnModel {
    ChurnModel::from_slice(CHURN_MODEL.as_bytes()).unwrap()
}

pub fn segment_pipeline() -> SegmentPipeline {
    SegmentPipeline::from_slice(SEGMENT_MODEL.as_bytes()).unwrap()
}

pub fn recommendation_map() -> RecommendationMap {
    RecommendationMap::from_json(RECOMMENDATIONS.as_bytes()).unwrap()
}

pub fn registry() -> ModelRegistry {
    ModelRegistry::new(churn_model(), segment_pipeline(), recommendation_map()).unwrap()
}

pub fn loyal_customer() -> CustomerData {
    CustomerData {
        customer_id: Some("cust-loyal".to_string()),
        total_spent: Some(1000.0),
        order_count: Some(9),
        average_order_value: Some(100.0),
        recency: Some(0),
        tenure: Some(725),
        ..Default::default()
    }
}

pub fn at_risk_customer() -> CustomerData {
    CustomerData {
        customer_id: Some("cust-at-risk".to_string()),
        age: Some(25.0),
        gender: Some("Female".to_string()),
        total_spent: Some(125.0),
        churn_probability: Some(0.875),
        tags: Some(Tags::Joined("discount".to_string())),
        ..Default::default()
    }
}

pub fn vip_customer() -> CustomerData {
    CustomerData {
        customer_id: Some("cust-vip".to_string()),
        age: Some(45.0),
        gender: Some("Male".to_string()),
        total_spent: Some(1000.0),
        churn_probability: Some(0.125),
        tags: Some(Tags::List(vec!["vip".to_string()])),
        ..Default::default()
    }
}
