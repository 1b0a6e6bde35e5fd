/// One class and the classifier's probability for it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassScore {
    pub label: String,
    pub probability: f64,
}

impl ClassScore {
    pub fn new(label: impl Into<String>, probability: f64) -> Self {
        Self {
            label: label.into(),
            probability,
        }
    }
}

/// Classifier output, sorted descending by probability.
///
/// The only constructor sorts, so a `Prediction` in hand is always fresh and
/// ordered. Ties keep the classifier's enumeration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Prediction {
    scores: Vec<ClassScore>,
}

impl Prediction {
    pub fn from_scores(mut scores: Vec<ClassScore>) -> Self {
        // Vec::sort_by is stable
        scores.sort_by(|a, b| b.probability.total_cmp(&a.probability));
        Self { scores }
    }

    pub fn scores(&self) -> &[ClassScore] {
        &self.scores
    }

    pub fn top(&self) -> Option<&ClassScore> {
        self.scores.first()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Rows for the diagnostic label list: `(label, "12.3%")`.
    pub fn display_rows(&self) -> Vec<(String, String)> {
        self.scores
            .iter()
            .map(|s| (s.label.clone(), format!("{:.1}%", s.probability * 100.0)))
            .collect()
    }
}
