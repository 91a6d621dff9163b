use async_trait::async_trait;
use serde::Deserialize;

use super::FaqProvider;

/// Lexical retrieval over a small clinic FAQ corpus. Each entry is scored by
/// token overlap between the question and the entry's question + keywords;
/// the best entry wins if it clears a minimum score. Deliberately simple —
/// a semantic retrieval service can replace it behind the same trait.
pub struct ClinicDocs {
    entries: Vec<FaqEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FaqEntry {
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

const MIN_SCORE: usize = 2;

impl ClinicDocs {
    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        let entries: Vec<FaqEntry> = serde_json::from_str(s)?;
        Ok(Self { entries })
    }

    /// Read the corpus file; a missing file yields an empty corpus (every
    /// question becomes a no-match) rather than a startup failure.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path, "FAQ corpus not found, starting with no documents");
                Ok(Self { entries: vec![] })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn best_match(&self, question: &str) -> Option<&FaqEntry> {
        let tokens = tokenize(question);
        if tokens.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .map(|entry| {
                let mut candidates = tokenize(&entry.question);
                for kw in &entry.keywords {
                    candidates.extend(tokenize(kw));
                }
                let score = tokens.iter().filter(|t| candidates.contains(*t)).count();
                (score, entry)
            })
            .filter(|(score, _)| *score >= MIN_SCORE)
            .max_by_key(|(score, _)| *score)
            .map(|(_, entry)| entry)
    }
}

#[async_trait]
impl FaqProvider for ClinicDocs {
    async fn answer(&self, question: &str) -> anyhow::Result<Option<String>> {
        Ok(self.best_match(question).map(|e| e.answer.clone()))
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "do", "does", "i", "you", "your", "my", "can", "what", "when",
    "where", "how", "to", "of", "for", "in", "on", "at", "it", "have", "has",
];

fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}
