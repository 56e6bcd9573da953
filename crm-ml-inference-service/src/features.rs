use crm_ml_service::dto::CustomerData;
use crm_ml_service::error::ServiceError;

/// Columns the churn classifier can consume, in projection order.
pub const CHURN_FEATURES: [&str; 5] = [
    "total_spent",
    "order_count",
    "average_order_value",
    "recency",
    "tenure",
];

/// Columns the segmentation pipeline can consume, in projection order.
pub const SEGMENT_FEATURES: [&str; 11] = [
    "age",
    "gender",
    "occupation",
    "total_spent",
    "order_count",
    "average_order_value",
    "recency",
    "tenure",
    "last_purchase_days",
    "tags",
    "churn_probability",
];

#[derive(Clone, Debug, PartialEq)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FeatureValue {
    fn number(value: Option<f64>) -> Self {
        value.map_or(FeatureValue::Missing, FeatureValue::Number)
    }

    fn integer(value: Option<i64>) -> Self {
        value.map_or(FeatureValue::Missing, |v| FeatureValue::Number(v as f64))
    }

    fn text(value: Option<String>) -> Self {
        value.map_or(FeatureValue::Missing, FeatureValue::Text)
    }

    fn or_zero(self) -> Self {
        match self {
            FeatureValue::Missing => FeatureValue::Number(0.0),
            other => other,
        }
    }
}

///
/// A small named-column table handed to the models. Rows always have one
/// cell per column.
///
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureFrame {
    columns: Vec<&'static str>,
    rows: Vec<Vec<FeatureValue>>,
}

impl FeatureFrame {
    pub fn new(columns: &[&'static str]) -> Self {
        Self {
            columns: columns.to_vec(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<FeatureValue>) -> Result<(), ServiceError> {
        if row.len() != self.columns.len() {
            return Err(ServiceError::internal_server_error(format!(
                "Row has {} cells but the frame has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Result<usize, ServiceError> {
        self.columns
            .iter()
            .position(|&column| column == name)
            .ok_or_else(|| {
                ServiceError::internal_server_error(format!("Feature '{}' is not available", name))
            })
    }

    pub fn rows(&self) -> impl Iterator<Item = &[FeatureValue]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

/// Fails if any of `names` is not a column the service projects.
pub fn ensure_known(names: &[String], known: &[&str]) -> Result<(), ServiceError> {
    match names.iter().find(|name| !known.contains(&name.as_str())) {
        Some(name) => Err(ServiceError::internal_server_error(format!(
            "Model expects unknown feature '{}'",
            name
        ))),
        None => Ok(()),
    }
}

/// Single-row churn table. Absent values become zero.
pub fn churn_frame(customer: &CustomerData) -> Result<FeatureFrame, ServiceError> {
    let row = vec![
        FeatureValue::number(customer.total_spent),
        FeatureValue::integer(customer.order_count),
        FeatureValue::number(customer.average_order_value),
        FeatureValue::integer(customer.recency),
        FeatureValue::integer(customer.tenure),
    ];
    let mut frame = FeatureFrame::new(&CHURN_FEATURES);
    frame.push_row(row.into_iter().map(FeatureValue::or_zero).collect())?;
    Ok(frame)
}

/// Single-row segmentation table. Absent values stay missing for the
/// pipeline's imputers.
pub fn segment_frame(customer: &CustomerData) -> Result<FeatureFrame, ServiceError> {
    let row = vec![
        FeatureValue::number(customer.age),
        FeatureValue::text(customer.gender.clone()),
        FeatureValue::text(customer.occupation.clone()),
        FeatureValue::number(customer.total_spent),
        FeatureValue::integer(customer.order_count),
        FeatureValue::number(customer.average_order_value),
        FeatureValue::integer(customer.recency),
        FeatureValue::integer(customer.tenure),
        FeatureValue::integer(customer.last_purchase_days),
        FeatureValue::text(customer.tags.as_ref().map(|tags| tags.joined())),
        FeatureValue::number(customer.churn_probability),
    ];
    let mut frame = FeatureFrame::new(&SEGMENT_FEATURES);
    frame.push_row(row)?;
    Ok(frame)
}
