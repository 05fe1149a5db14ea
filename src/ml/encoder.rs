use crate::error::{AppError, Result};
use crate::ml::features::TextPreprocessor;
use crate::ml::text::{TfidfConfig, TfidfVectorizer};
use crate::models::{Incident, Timings};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Value written for a missing or out-of-range numeric field
pub const MISSING_SENTINEL: f64 = -1.0;

/// Level used for a missing categorical value
pub const UNKNOWN_CATEGORY: &str = "unknown";

/// Categorical columns one-hot encoded by the feature encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoricalField {
    Gender,
    County,
    PrimaryImpression,
}

impl CategoricalField {
    pub fn value(self, incident: &Incident) -> String {
        let raw = match self {
            CategoricalField::Gender => incident.gender.as_deref(),
            CategoricalField::County => incident.county.as_deref(),
            CategoricalField::PrimaryImpression => incident.primary_impression.as_deref(),
        };
        raw.map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(UNKNOWN_CATEGORY)
            .to_string()
    }
}

/// One-hot encoder; categories unseen at fit time encode to all zeros
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    fields: Vec<CategoricalField>,

    /// Sorted levels per field, as observed at fit time
    categories: Vec<Vec<String>>,

    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new(fields: Vec<CategoricalField>) -> Self {
        Self {
            fields,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn fit(&mut self, incidents: &[Incident]) {
        self.categories = self
            .fields
            .iter()
            .map(|field| {
                let mut levels: Vec<String> =
                    incidents.iter().map(|inc| field.value(inc)).collect();
                levels.sort();
                levels.dedup();
                levels
            })
            .collect();
        self.is_fitted = true;
    }

    /// Total number of indicator columns
    pub fn width(&self) -> usize {
        self.categories.iter().map(Vec::len).sum()
    }

    /// Write the indicators for one incident into `out` (length == width)
    pub fn encode_into(&self, incident: &Incident, out: &mut [f64]) -> Result<()> {
        if !self.is_fitted {
            return Err(AppError::NotFitted(
                "OneHotEncoder must be fitted before transform".to_string(),
            ));
        }
        let mut offset = 0;
        for (field, levels) in self.fields.iter().zip(&self.categories) {
            if let Ok(pos) = levels.binary_search(&field.value(incident)) {
                out[offset + pos] = 1.0;
            }
            offset += levels.len();
        }
        Ok(())
    }

    /// Levels per field, in field order
    pub fn categories(&self) -> &[Vec<String>] {
        &self.categories
    }

    /// `col{field}__{safe level}` names, deduplicated
    pub fn feature_names(&self) -> Vec<String> {
        let names = self
            .categories
            .iter()
            .enumerate()
            .flat_map(|(col, levels)| {
                levels
                    .iter()
                    .map(move |level| format!("col{}__{}", col, TextPreprocessor::safe_name(level)))
            })
            .collect();
        make_unique(names)
    }
}

/// Suffix repeated names with `__dupN`
fn make_unique(names: Vec<String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        match seen.get(&name).copied() {
            None => {
                seen.insert(name.clone(), 0);
                out.push(name);
            }
            Some(mut count) => {
                let mut candidate;
                loop {
                    count += 1;
                    candidate = format!("{}__dup{}", name, count);
                    if !seen.contains_key(&candidate) {
                        break;
                    }
                }
                seen.insert(name, count);
                seen.insert(candidate.clone(), 0);
                out.push(candidate);
            }
        }
    }
    out
}

/// Encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Vectorizer used for the medical-text block
    pub tfidf: TfidfConfig,

    /// Categorical columns, in block order
    pub categorical_fields: Vec<CategoricalField>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            tfidf: TfidfConfig::with_max_features(500),
            categorical_fields: vec![
                CategoricalField::Gender,
                CategoricalField::County,
                CategoricalField::PrimaryImpression,
            ],
        }
    }
}

/// Encoded feature matrix with named, ordered columns
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature matrix (n_samples × n_features)
    pub values: Array2<f64>,

    /// Column names, in column order
    pub columns: Vec<String>,

    /// Incident id per row
    pub row_ids: Vec<String>,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }
}

/// Builds numeric | TF-IDF | one-hot feature blocks. Fit on the training
/// split only; every later transform reuses the fitted state unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEncoder {
    config: EncoderConfig,
    vectorizer: TfidfVectorizer,
    one_hot: OneHotEncoder,
    columns: Vec<String>,
    is_fitted: bool,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        let vectorizer = TfidfVectorizer::new(config.tfidf.clone());
        let one_hot = OneHotEncoder::new(config.categorical_fields.clone());
        Self {
            config,
            vectorizer,
            one_hot,
            columns: Vec::new(),
            is_fitted: false,
        }
    }

    /// Numeric column names, in block order
    pub fn numeric_columns() -> Vec<String> {
        Timings::NAMES
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once("patient_age".to_string()))
            .collect()
    }

    /// Fit the vectorizer and one-hot encoder on training incidents
    pub fn fit(&mut self, train: &[Incident]) -> Result<()> {
        if train.is_empty() {
            return Err(AppError::Validation(
                "cannot fit feature encoder on an empty training set".to_string(),
            ));
        }

        let texts: Vec<&str> = train.iter().map(|i| i.medical_text.as_str()).collect();
        self.vectorizer.fit(&texts)?;
        self.one_hot.fit(train);

        let mut columns = Self::numeric_columns();
        columns.extend((0..self.vectorizer.vocab_size()).map(|i| format!("tfidf_{}", i)));
        columns.extend(self.one_hot.feature_names());
        self.columns = columns;
        self.is_fitted = true;

        info!(
            n_features = self.columns.len(),
            tfidf = self.vectorizer.vocab_size(),
            one_hot = self.one_hot.width(),
            "Fitted feature encoder"
        );
        Ok(())
    }

    /// Encode incidents with the fitted state
    pub fn transform(&self, incidents: &[Incident]) -> Result<FeatureMatrix> {
        if !self.is_fitted {
            return Err(AppError::NotFitted(
                "FeatureEncoder must be fitted before transform".to_string(),
            ));
        }

        let n_numeric = Self::numeric_columns().len();
        let n_text = self.vectorizer.vocab_size();
        let n_features = self.columns.len();
        let mut values = Array2::zeros((incidents.len(), n_features));

        for (r, incident) in incidents.iter().enumerate() {
            let mut row = vec![0.0; n_features];

            // Numeric block
            let age = std::iter::once(incident.valid_age());
            for (c, value) in incident.timings.values().into_iter().chain(age).enumerate() {
                row[c] = value.unwrap_or(MISSING_SENTINEL);
            }

            // TF-IDF block
            let text = self.vectorizer.transform_one(&incident.medical_text)?;
            for (c, v) in text.entries {
                row[n_numeric + c] = v;
            }

            // One-hot block
            self.one_hot
                .encode_into(incident, &mut row[n_numeric + n_text..])?;

            for (c, v) in row.into_iter().enumerate() {
                values[[r, c]] = v;
            }
        }

        debug!(rows = incidents.len(), n_features, "Encoded feature matrix");

        Ok(FeatureMatrix {
            values,
            columns: self.columns.clone(),
            row_ids: incidents.iter().map(|i| i.id.clone()).collect(),
        })
    }

    /// Fit on the training incidents and encode them
    pub fn fit_transform(&mut self, train: &[Incident]) -> Result<FeatureMatrix> {
        self.fit(train)?;
        self.transform(train)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_features(&self) -> usize {
        self.columns.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn vectorizer(&self) -> &TfidfVectorizer {
        &self.vectorizer
    }

    pub fn one_hot(&self) -> &OneHotEncoder {
        &self.one_hot
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }
}
