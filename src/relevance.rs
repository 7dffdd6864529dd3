//! Keyword pre-filter applied by callers before a question reaches the
//! orchestrator. The core pipeline never consults it.

/// Default keywords, tuned for a cardiovascular document corpus.
pub const DEFAULT_KEYWORDS: &[&str] = &[
    "cardio",
    "heart",
    "blood",
    "pressure",
    "hypertension",
    "cholesterol",
    "diabetes",
    "risk",
    "treatment",
    "symptom",
    "diagnosis",
    "prevention",
    "biomarker",
    "clinical",
    "patient",
];

#[derive(Debug, Clone)]
pub struct RelevanceGate {
    keywords: Vec<String>,
}

impl RelevanceGate {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// True if any keyword occurs in the query, ignoring case.
    pub fn is_relevant(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.keywords.iter().any(|k| query.contains(k.as_str()))
    }
}

impl Default for RelevanceGate {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}
