use crate::change::{ChangeRequest, ChangeType};
use regex::Regex;
use serde::{Deserialize, Serialize};
use teamflow_core::{TeamflowError, TeamflowResult};
use tracing::debug;

/// Tunable weights of the feedback scoring formula.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight of the matched-keyword ratio.
    #[serde(default = "default_keyword_weight")]
    pub keyword_weight: f64,
    /// Weight of the matched-phrase ratio.
    #[serde(default = "default_phrase_weight")]
    pub phrase_weight: f64,
    /// Added when both keyword and phrase evidence exist.
    #[serde(default = "default_combined_bonus")]
    pub combined_bonus: f64,
    /// Below this the classifier falls back to a full rewrite.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

fn default_keyword_weight() -> f64 {
    0.5
}
fn default_phrase_weight() -> f64 {
    0.6
}
fn default_combined_bonus() -> f64 {
    0.2
}
fn default_min_confidence() -> f64 {
    0.3
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword_weight: default_keyword_weight(),
            phrase_weight: default_phrase_weight(),
            combined_bonus: default_combined_bonus(),
            min_confidence: default_min_confidence(),
        }
    }
}

impl ScoringWeights {
    pub fn score(&self, keyword_hits: usize, keywords: usize, phrase_hits: usize, phrases: usize) -> f64 {
        let ratio = |hits: usize, total: usize| {
            if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            }
        };
        let mut score = self.keyword_weight * ratio(keyword_hits, keywords)
            + self.phrase_weight * ratio(phrase_hits, phrases);
        if keyword_hits > 0 && phrase_hits > 0 {
            score += self.combined_bonus;
        }
        score
    }
}

struct Detector {
    change_type: ChangeType,
    keywords: &'static [&'static str],
    phrases: Vec<Regex>,
}

impl Detector {
    fn evidence(&self, normalized: &str, raw: &str) -> (usize, usize) {
        let keyword_hits = self
            .keywords
            .iter()
            .filter(|k| normalized.contains(&format!(" {k} ")))
            .count();
        let phrase_hits = self.phrases.iter().filter(|p| p.is_match(raw)).count();
        (keyword_hits, phrase_hits)
    }
}

struct Extractors {
    title: Regex,
    tone: Regex,
    keywords: Regex,
    meta: Regex,
    image_subject: Regex,
}

/// Deterministic heuristic classifier from free-text feedback to a [`ChangeRequest`].
///
/// Each change type has a keyword list and a phrase-regex list. The score is
/// `keyword_weight * keyword_ratio + phrase_weight * phrase_ratio`, plus
/// `combined_bonus` when both kinds of evidence are present. The best score
/// wins; ties go to the detector evaluated first.
pub struct FeedbackRouter {
    detectors: Vec<Detector>,
    extractors: Extractors,
    weights: ScoringWeights,
}

const VAGUE_VALUES: &[&str] = &[
    "something", "more", "less", "better", "catchier", "shorter", "longer", "a better",
    "a different", "different", "anything",
];

fn compile(patterns: &[&str]) -> TeamflowResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).map_err(|e| TeamflowError::Config(format!("bad pattern {p}: {e}"))))
        .collect()
}

fn compile_one(pattern: &str) -> TeamflowResult<Regex> {
    Regex::new(pattern).map_err(|e| TeamflowError::Config(format!("bad pattern {pattern}: {e}")))
}

impl FeedbackRouter {
    pub fn new(weights: ScoringWeights) -> TeamflowResult<Self> {
        let detectors = vec![
            Detector {
                change_type: ChangeType::TitleOnly,
                keywords: &["title", "headline", "heading", "header", "name"],
                phrases: compile(&[
                    r"(?i)\b(change|update|modify|replace|rewrite|improve)\b.*\b(title|headline|heading)\b",
                    r"(?i)\b(title|headline)\b.*\b(to|as|should be)\b",
                    r"(?i)\bnew\s+(title|headline)\b",
                    r"(?i)\brename\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::FeatureImage,
                keywords: &[
                    "feature image",
                    "featured image",
                    "main image",
                    "hero image",
                    "cover image",
                    "header image",
                    "thumbnail",
                ],
                phrases: compile(&[
                    r"(?i)\b(change|replace|update|new|different|regenerate)\b.*\b(feature|featured|main|hero|cover|header)\s+(image|picture|photo)\b",
                    r"(?i)\b(feature|featured|main|hero|cover)\s+(image|picture|photo)\b.*\b(should|to|with|of)\b",
                    r"(?i)\b(first|top)\s+(image|picture|photo)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::SupportingImages,
                keywords: &[
                    "supporting images",
                    "other images",
                    "images",
                    "pictures",
                    "photos",
                    "illustrations",
                    "graphics",
                ],
                phrases: compile(&[
                    r"(?i)\b(change|replace|update|regenerate|new|different|more)\b.*\b(images|pictures|photos|illustrations)\b",
                    r"(?i)\b(supporting|other|additional|body|inline)\s+(images|pictures|photos)\b",
                    r"(?i)\ball\s+(the\s+)?(images|pictures|photos)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::Introduction,
                keywords: &["introduction", "intro", "opening", "beginning", "first paragraph", "hook"],
                phrases: compile(&[
                    r"(?i)\b(rewrite|change|improve|update|shorten|lengthen|expand)\b.*\b(intro|introduction|opening|beginning|first paragraph)\b",
                    r"(?i)\b(intro|introduction|opening)\b.*\b(too|should|needs?|more|less)\b",
                    r"(?i)\b(start|begin)s?\b.*\b(differently|better|stronger)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::Conclusion,
                keywords: &[
                    "conclusion",
                    "ending",
                    "closing",
                    "final paragraph",
                    "last paragraph",
                    "wrap up",
                    "outro",
                ],
                phrases: compile(&[
                    r"(?i)\b(rewrite|change|improve|update|shorten|lengthen|expand)\b.*\b(conclusion|ending|closing|final paragraph|last paragraph)\b",
                    r"(?i)\b(conclusion|ending|closing)\b.*\b(too|should|needs?|more|less)\b",
                    r"(?i)\b(end|finish|wrap)s?\b.*\b(differently|better|stronger|call to action)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::MetaDescription,
                keywords: &["meta description", "meta", "description", "snippet", "search result"],
                phrases: compile(&[
                    r"(?i)\bmeta\s*(description|desc)\b",
                    r"(?i)\b(change|update|rewrite|improve)\b.*\bdescription\b",
                    r"(?i)\bdescription\b.*\b(to|should|shorter|longer)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::ToneAdjustment,
                keywords: &[
                    "tone",
                    "voice",
                    "style",
                    "formal",
                    "casual",
                    "friendly",
                    "professional",
                    "conversational",
                    "playful",
                    "serious",
                ],
                phrases: compile(&[
                    r"(?i)\b(more|less)\s+(formal|casual|friendly|professional|conversational|playful|serious|engaging|enthusiastic)\b",
                    r"(?i)\b(change|adjust|make)\b.*\b(tone|voice|style)\b",
                    r"(?i)\bsounds?\s+(more|less|too)\b",
                    r"(?i)\btoo\s+(formal|casual|stiff|dry|informal)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::SeoKeywords,
                keywords: &["seo", "keywords", "keyword", "search engine", "ranking", "tags"],
                phrases: compile(&[
                    r"(?i)\b(add|include|use|target|change|update)\b.*\bkeywords?\b",
                    r"(?i)\bkeywords?\b\s*(:|\blike\b|\bsuch as\b)",
                    r"(?i)\b(seo|search engine)\b",
                ])?,
            },
            Detector {
                change_type: ChangeType::FullRewrite,
                keywords: &[
                    "rewrite",
                    "redo",
                    "start over",
                    "completely",
                    "entire",
                    "whole",
                    "everything",
                    "from scratch",
                    "different topic",
                ],
                phrases: compile(&[
                    r"(?i)\b(rewrite|redo|regenerate)\b\s+(the\s+)?(whole|entire|full|complete)?\s*(article|post|thing|content|everything)\b",
                    r"(?i)\bstart\s+over\b|\bfrom\s+scratch\b",
                    r"(?i)\b(completely|totally|entirely)\s+(different|new)\b",
                    r"(?i)\b(don't|do not)\s+like\s+(it|anything|the whole)\b",
                ])?,
            },
        ];

        let extractors = Extractors {
            title: compile_one(
                r#"(?i)\b(?:title|headline|heading)\b[^:"'“]*?(?:\bto\b|\bas\b|\bbe\b|:)\s*:?\s*["“']?(?P<value>[^"”']+?)["”']?\s*[.!]?\s*$"#,
            )?,
            tone: compile_one(r"(?i)\b(?P<value>(?:more|less)\s+\w+)")?,
            keywords: compile_one(
                r"(?i)\bkeywords?\b[^:]*?(?::|\blike\b|\bsuch as\b|\bincluding\b)\s*(?P<value>.+?)\s*[.!]?\s*$",
            )?,
            meta: compile_one(
                r#"(?i)\bmeta\s+description\b[^:"]*?(?:\bto\b|:)\s*:?\s*["“']?(?P<value>[^"”']+?)["”']?\s*$"#,
            )?,
            image_subject: compile_one(
                r"(?i)\b(?:image|picture|photo)\b.*?\b(?:of|showing|with|to be)\b\s+(?P<value>.+?)\s*[.!]?\s*$",
            )?,
        };

        Ok(Self {
            detectors,
            extractors,
            weights,
        })
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Raw score per change type, in detector order.
    pub fn scores(&self, feedback: &str) -> Vec<(ChangeType, f64)> {
        let normalized = normalize(feedback);
        self.detectors
            .iter()
            .map(|d| {
                let (kw, ph) = d.evidence(&normalized, feedback);
                let score = self.weights.score(kw, d.keywords.len(), ph, d.phrases.len());
                (d.change_type, score)
            })
            .collect()
    }

    pub fn classify(&self, feedback: &str) -> ChangeRequest {
        let scores = self.scores(feedback);
        let (best, score) = select(&scores);

        if score < self.weights.min_confidence {
            debug!(best = %best, score, "Low-confidence feedback, falling back to full rewrite");
            let mut request =
                ChangeRequest::new(ChangeType::FullRewrite, feedback, self.weights.min_confidence);
            request.low_confidence = true;
            return request;
        }

        let explicit = self.explicit_value(best, feedback);
        debug!(change_type = %best, score, explicit = explicit.is_some(), "Classified feedback");
        ChangeRequest::new(best, feedback, score).with_explicit_value(explicit)
    }

    /// A literal value spelled out in the feedback, if the change type has one.
    pub fn explicit_value(&self, change_type: ChangeType, feedback: &str) -> Option<String> {
        let regex = match change_type {
            ChangeType::TitleOnly => &self.extractors.title,
            ChangeType::ToneAdjustment => &self.extractors.tone,
            ChangeType::SeoKeywords => &self.extractors.keywords,
            ChangeType::MetaDescription => &self.extractors.meta,
            ChangeType::FeatureImage | ChangeType::SupportingImages => {
                &self.extractors.image_subject
            }
            _ => return None,
        };
        let value = regex
            .captures(feedback.trim())?
            .name("value")?
            .as_str()
            .trim()
            .to_string();
        if value.is_empty() {
            return None;
        }
        if change_type == ChangeType::TitleOnly {
            let lower = value.to_lowercase();
            if VAGUE_VALUES
                .iter()
                .any(|v| lower == *v || lower.starts_with(&format!("{v} ")))
            {
                return None;
            }
        }
        Some(value)
    }
}

/// Highest score, earliest entry on ties.
pub fn select(scores: &[(ChangeType, f64)]) -> (ChangeType, f64) {
    let mut best = (ChangeType::FullRewrite, f64::MIN);
    for &(change_type, score) in scores {
        if score > best.1 {
            best = (change_type, score);
        }
    }
    if best.1 == f64::MIN {
        best.1 = 0.0;
    }
    best
}

/// Lowercase, punctuation folded to spaces, padded so every word is `" word "`.
fn normalize(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    format!(" {} ", folded.split_whitespace().collect::<Vec<_>>().join(" "))
}
