use crate::error::{AppError, Result};
use ndarray::Array2;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Tokens are runs of two or more word characters
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w\w+\b").expect("valid regex"));

/// English stop words removed before n-gram generation
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "about", "above", "after", "again", "against", "all", "almost", "also", "am",
        "among", "an", "and", "any", "are", "as", "at", "be", "became", "because", "been",
        "before", "being", "below", "between", "both", "but", "by", "can", "cannot", "could",
        "did", "do", "does", "doing", "done", "down", "during", "each", "either", "else",
        "etc", "even", "ever", "every", "few", "for", "from", "further", "had", "has", "have",
        "having", "he", "her", "here", "hers", "herself", "him", "himself", "his", "how",
        "however", "i", "ie", "if", "in", "into", "is", "it", "its", "itself", "just", "may",
        "me", "might", "more", "most", "much", "must", "my", "myself", "neither", "no", "nor",
        "not", "now", "of", "off", "often", "on", "once", "only", "or", "other", "others",
        "otherwise", "our", "ours", "ourselves", "out", "over", "own", "per", "perhaps",
        "rather", "same", "she", "should", "since", "so", "some", "such", "than", "that",
        "the", "their", "theirs", "them", "themselves", "then", "there", "these", "they",
        "this", "those", "though", "through", "thus", "to", "too", "under", "until", "up",
        "upon", "us", "very", "via", "was", "we", "well", "were", "what", "whatever", "when",
        "where", "whether", "which", "while", "who", "whom", "whose", "why", "will", "with",
        "within", "without", "would", "yet", "you", "your", "yours", "yourself",
        "yourselves",
    ]
    .into_iter()
    .collect()
});

/// Vectorizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfConfig {
    /// Maximum vocabulary size (by corpus term frequency)
    pub max_features: usize,

    /// N-gram range (min, max)
    pub ngram_range: (usize, usize),

    /// Remove English stop words
    pub remove_stop_words: bool,
}

impl TfidfConfig {
    pub fn with_max_features(max_features: usize) -> Self {
        Self {
            max_features,
            ..Self::default()
        }
    }
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            ngram_range: (1, 2), // Unigrams and bigrams
            remove_stop_words: true,
        }
    }
}

/// Sparse row: `(column, value)` pairs sorted by column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn squared_norm(&self) -> f64 {
        self.entries.iter().map(|(_, v)| v * v).sum()
    }
}

/// TF-IDF vectorizer with a bounded vocabulary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    /// Configuration
    config: TfidfConfig,

    /// Vocabulary mapping (term -> column), columns in alphabetical term order
    vocabulary: BTreeMap<String, usize>,

    /// Smoothed inverse document frequency per column
    idf: Vec<f64>,

    /// Number of documents seen at fit time
    n_documents: usize,

    /// Is fitted (vocabulary built)
    is_fitted: bool,
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        Self {
            config,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
            n_documents: 0,
            is_fitted: false,
        }
    }

    /// Learn vocabulary and IDF weights from a corpus
    pub fn fit<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<()> {
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let terms = self.analyze(doc.as_ref());
            let unique: HashSet<&String> = terms.iter().collect();
            for term in unique {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            for term in terms {
                *term_freq.entry(term).or_insert(0) += 1;
            }
        }

        // Highest corpus frequency first, ties broken alphabetically
        let mut ranked: Vec<(String, usize)> = term_freq.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.config.max_features);

        let mut kept: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        kept.sort();

        let n_docs = documents.len() as f64;
        self.idf = kept
            .iter()
            .map(|term| {
                let df = doc_freq.get(term).copied().unwrap_or(0) as f64;
                ((1.0 + n_docs) / (1.0 + df)).ln() + 1.0
            })
            .collect();
        self.vocabulary = kept
            .into_iter()
            .enumerate()
            .map(|(idx, term)| (term, idx))
            .collect();
        self.n_documents = documents.len();
        self.is_fitted = true;

        Ok(())
    }

    /// Transform one document into an L2-normalized sparse row
    pub fn transform_one(&self, document: &str) -> Result<SparseVector> {
        if !self.is_fitted {
            return Err(AppError::NotFitted(
                "TfidfVectorizer must be fitted before transform".to_string(),
            ));
        }

        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyze(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_insert(0.0) += 1.0;
            }
        }

        let mut entries: Vec<(usize, f64)> = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();

        let norm = entries.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in entries.iter_mut() {
                *v /= norm;
            }
        }

        Ok(SparseVector { entries })
    }

    /// Transform a corpus into sparse rows
    pub fn transform<S: AsRef<str>>(&self, documents: &[S]) -> Result<Vec<SparseVector>> {
        documents
            .iter()
            .map(|doc| self.transform_one(doc.as_ref()))
            .collect()
    }

    /// Fit and transform in one step
    pub fn fit_transform<S: AsRef<str>>(&mut self, documents: &[S]) -> Result<Vec<SparseVector>> {
        self.fit(documents)?;
        self.transform(documents)
    }

    /// Transform a corpus into a dense `n_documents × vocab_size` block
    pub fn transform_dense<S: AsRef<str>>(&self, documents: &[S]) -> Result<Array2<f64>> {
        let rows = self.transform(documents)?;
        let mut dense = Array2::zeros((rows.len(), self.vocab_size()));
        for (r, row) in rows.iter().enumerate() {
            for &(c, v) in &row.entries {
                dense[[r, c]] = v;
            }
        }
        Ok(dense)
    }

    /// Terms in column order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.vocabulary.len()];
        for (term, &idx) in &self.vocabulary {
            names[idx] = term.clone();
        }
        names
    }

    /// Split text into tokens and n-grams
    fn analyze(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = TOKEN_PATTERN
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .filter(|t| !self.config.remove_stop_words || !STOP_WORDS.contains(t))
            .collect();

        let (min_n, max_n) = self.config.ngram_range;
        let mut terms = Vec::new();
        for n in min_n.max(1)..=max_n {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    pub fn vocab_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    pub fn n_documents(&self) -> usize {
        self.n_documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<&'static str> {
        vec![
            "chest pain | cardiac | adult",
            "chest pain | cardiac | elderly",
            "cardiac arrest | cpr | adult",
            "ankle sprain | trauma | teen",
        ]
    }

    #[test]
    fn test_vectorizer_creation() {
        let vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        assert!(!vectorizer.is_fitted());
        assert_eq!(vectorizer.vocab_size(), 0);
        assert!(vectorizer.transform_one("anything").is_err());
    }

    #[test]
    fn test_unigrams_and_bigrams_without_stop_words() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        vectorizer.fit(&["the patient is in cardiac arrest"]).unwrap();
        let names = vectorizer.feature_names();

        assert!(names.contains(&"cardiac".to_string()));
        assert!(names.contains(&"cardiac arrest".to_string()));
        assert!(names.contains(&"patient cardiac".to_string()));
        assert!(!names.contains(&"the".to_string()));
        assert!(!names.contains(&"is".to_string()));
    }

    #[test]
    fn test_vocabulary_is_bounded_and_sorted() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::with_max_features(5));
        vectorizer.fit(&corpus()).unwrap();

        assert_eq!(vectorizer.vocab_size(), 5);
        let names = vectorizer.feature_names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        // most frequent term survives truncation
        assert!(names.contains(&"cardiac".to_string()));
    }

    #[test]
    fn test_rows_are_l2_normalized() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        let rows = vectorizer.fit_transform(&corpus()).unwrap();

        for row in &rows {
            assert!((row.squared_norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_terms_give_empty_row() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        vectorizer.fit(&corpus()).unwrap();
        let row = vectorizer.transform_one("zebra xylophone").unwrap();
        assert!(row.is_empty());
    }

    #[test]
    fn test_dense_shape_matches_vocabulary() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::default());
        vectorizer.fit(&corpus()).unwrap();
        let dense = vectorizer.transform_dense(&["chest pain", "ankle"]).unwrap();
        assert_eq!(dense.shape(), &[2, vectorizer.vocab_size()]);
    }

    #[test]
    fn test_rarer_terms_weigh_more() {
        let mut vectorizer = TfidfVectorizer::new(TfidfConfig::with_max_features(100));
        vectorizer.fit(&corpus()).unwrap();
        let row = vectorizer.transform_one("cardiac trauma").unwrap();
        let names = vectorizer.feature_names();
        let weight = |term: &str| {
            let idx = names.iter().position(|n| n == term).unwrap();
            row.entries.iter().find(|(i, _)| *i == idx).unwrap().1
        };
        assert!(weight("trauma") > weight("cardiac"));
    }
}
