//! Score extraction from model output.
//!
//! Generative models answer in free text, so scores are pulled out with
//! per-model patterns and normalized onto the 0-10 scale. The similarity
//! model answers with probabilities that are mapped onto the same scale.

use crate::models::CriteriaScore;
use regex::Regex;

/// Upper bound of the scoring scale
pub const SCALE_MAX: f64 = 10.0;

const OVERALL: &str = "overall";

/// Normalized scores pulled out of one model answer
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub overall_score: f64,
    pub criteria: Vec<CriteriaScore>,
}

impl Extraction {
    /// Use the explicit overall score when present, else the mean of the criteria
    fn from_parts(overall: Option<f64>, criteria: Vec<CriteriaScore>) -> Self {
        let overall_score = match overall {
            Some(score) => score,
            None if criteria.is_empty() => 0.0,
            None => criteria.iter().map(|c| c.score).sum::<f64>() / criteria.len() as f64,
        };
        Self {
            overall_score,
            criteria,
        }
    }
}

/// Strategy turning generated text into scores. Never fails.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, text: &str) -> Extraction;
}

/// Values above the 0-10 scale are read as 0-100 and divided by ten
pub fn scale_correct(value: f64) -> f64 {
    if value > SCALE_MAX { value / 10.0 } else { value }
}

/// Keeps the first score seen for each label, in discovery order
#[derive(Default)]
struct FoundScores {
    overall: Option<f64>,
    criteria: Vec<CriteriaScore>,
}

impl FoundScores {
    fn contains(&self, label: &str) -> bool {
        if label == OVERALL {
            self.overall.is_some()
        } else {
            self.criteria.iter().any(|c| c.name == label)
        }
    }

    fn insert(&mut self, label: &str, score: f64, explanation: &str) {
        if self.contains(label) {
            return;
        }
        if label == OVERALL {
            self.overall = Some(score);
        } else {
            self.criteria.push(CriteriaScore::new(label, score, explanation));
        }
    }

    fn finish(self) -> Extraction {
        Extraction::from_parts(self.overall, self.criteria)
    }
}

struct MarkerRule {
    pattern: Regex,
    label: String,
}

/// Searches for a fixed vocabulary of markers such as `Colors: 8`.
///
/// Rules are tried in order and several rules may feed the same label,
/// which lets small models use synonyms. Each pattern must capture the
/// number in its first group.
pub struct MarkerExtractor {
    rules: Vec<MarkerRule>,
}

impl MarkerExtractor {
    pub fn new(rules: &[(&str, &str)]) -> Result<Self, regex::Error> {
        let rules = rules
            .iter()
            .map(|(pattern, label)| {
                Ok(MarkerRule {
                    pattern: Regex::new(pattern)?,
                    label: label.to_lowercase(),
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self { rules })
    }
}

impl TextExtractor for MarkerExtractor {
    fn extract(&self, text: &str) -> Extraction {
        let mut found = FoundScores::default();

        for rule in &self.rules {
            if found.contains(&rule.label) {
                continue;
            }
            let captured = rule
                .pattern
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok());
            if let Some(value) = captured {
                found.insert(&rule.label, scale_correct(value), "");
            }
        }

        found.finish()
    }
}

/// Reads `NAME: 7/10 - explanation` lines, one criterion per distinct name.
pub struct LabeledScoreExtractor {
    line: Regex,
}

impl LabeledScoreExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        let line = Regex::new(r"(?i)(\w+):\s*\[?(\d+(?:\.\d+)?)\]?/10[ \t]*-?[ \t]*([^\n]*)")?;
        Ok(Self { line })
    }
}

impl TextExtractor for LabeledScoreExtractor {
    fn extract(&self, text: &str) -> Extraction {
        let mut found = FoundScores::default();

        for caps in self.line.captures_iter(text) {
            let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let Ok(value) = value.as_str().parse::<f64>() else {
                continue;
            };
            let explanation = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();
            found.insert(&name.as_str().to_lowercase(), scale_correct(value), explanation);
        }

        found.finish()
    }
}

/// Probabilities of a prompt and its negation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContrastivePair {
    pub positive: f64,
    pub negative: f64,
}

impl ContrastivePair {
    /// Maps the [-1, 1] preference delta onto [0, 10]
    pub fn normalized(&self) -> f64 {
        ((self.positive - self.negative) + 1.0) * 5.0
    }
}

/// Scores from the design-quality pair and the description-match pair
pub fn similarity_scores(quality: ContrastivePair, matching: ContrastivePair) -> Extraction {
    let quality_score = quality.normalized();
    let match_score = matching.normalized();

    let criteria = vec![
        CriteriaScore::new(
            "design_quality",
            quality_score,
            format!(
                "Quality prob: {:.3} vs bad: {:.3}",
                quality.positive, quality.negative
            ),
        ),
        CriteriaScore::new(
            "description_match",
            match_score,
            format!(
                "Match prob: {:.3} vs not: {:.3}",
                matching.positive, matching.negative
            ),
        ),
    ];

    Extraction {
        overall_score: (quality_score + match_score) / 2.0,
        criteria,
    }
}

/// Numerically stable softmax. Empty or non-finite input gives an empty vector.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() || logits.iter().any(|l| !l.is_finite()) {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}
