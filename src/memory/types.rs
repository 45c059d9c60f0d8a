//! Core memory type definitions.
//!
//! Defines [`MemoryKind`] (the five retrieval groups), [`Salience`] (the
//! ranking sub-scores), [`Memory`] (a full decrypted record) and the records
//! derived from it: [`EpisodicRollup`] and [`ProceduralVersion`].

use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// The fixed set of memory kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Playbooks and how-to steps. One live record per subject tag.
    Procedural,
    /// Facts, knowledge, preferences.
    Semantic,
    /// Things that happened. Source material for monthly rollups.
    Episodic,
    /// Short-lived scratch context.
    Working,
    Event,
}

impl MemoryKind {
    pub const ALL: [MemoryKind; 5] = [
        Self::Procedural,
        Self::Semantic,
        Self::Episodic,
        Self::Working,
        Self::Event,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Procedural => "procedural",
            Self::Semantic => "semantic",
            Self::Episodic => "episodic",
            Self::Working => "working",
            Self::Event => "event",
        }
    }
}

impl Default for MemoryKind {
    fn default() -> Self {
        Self::Semantic
    }
}

impl std::fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MemoryKind {
    type Err = MemoryError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "procedural" => Ok(Self::Procedural),
            "semantic" => Ok(Self::Semantic),
            "episodic" => Ok(Self::Episodic),
            "working" => Ok(Self::Working),
            "event" => Ok(Self::Event),
            _ => Err(MemoryError::UnknownKind(s.to_string())),
        }
    }
}

fn half() -> f64 {
    0.5
}

/// Ranking sub-scores, each in `[0, 1]`.
///
/// Missing keys in stored JSON fall back to importance = relevance = 0.5 and
/// zero for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Salience {
    #[serde(default = "half")]
    pub importance: f64,
    #[serde(default = "half")]
    pub relevance: f64,
    #[serde(default)]
    pub emotion: f64,
    #[serde(default)]
    pub effort: f64,
    #[serde(default)]
    pub novelty: f64,
    /// Carried for callers that record it. Not part of the score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl Default for Salience {
    fn default() -> Self {
        Self {
            importance: 0.5,
            relevance: 0.5,
            emotion: 0.0,
            effort: 0.0,
            novelty: 0.0,
            confidence: None,
        }
    }
}

impl Salience {
    /// Weighted ranking score. The weights are fixed.
    pub fn score(&self) -> f64 {
        0.35 * self.importance
            + 0.25 * self.relevance
            + 0.20 * self.emotion
            + 0.10 * self.effort
            + 0.10 * self.novelty
    }

    /// Every sub-score, and confidence when present, must be finite and in `[0, 1]`.
    ///
    /// NaN would serialize as `null` and leave the row undecodable.
    pub fn validate(&self) -> Result<(), MemoryError> {
        let fields = [
            ("importance", Some(self.importance)),
            ("relevance", Some(self.relevance)),
            ("emotion", Some(self.emotion)),
            ("effort", Some(self.effort)),
            ("novelty", Some(self.novelty)),
            ("confidence", self.confidence),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(MemoryError::InvalidSalience { field, value });
                }
            }
        }
        Ok(())
    }
}

/// Score at or above which an episodic memory makes it into a rollup.
pub const ROLLUP_SALIENCE_THRESHOLD: f64 = 0.55;

/// A decrypted memory record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: i64,
    pub kind: MemoryKind,
    pub content: String,
    pub tags: Vec<String>,
    pub salience: Salience,
    /// Free-form description of how the memory was acquired, e.g. `{"kind":"text"}`.
    pub provenance: serde_json::Value,
    pub pinned: bool,
    /// ISO 8601 UTC creation timestamp.
    pub created_at: String,
    /// ISO 8601 UTC last-modification timestamp.
    pub updated_at: String,
}

/// Input for [`crate::memory::MemoryStore::remember`].
#[derive(Debug, Clone)]
pub struct NewMemory {
    pub content: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub salience: Salience,
    pub provenance: serde_json::Value,
    pub pinned: bool,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: MemoryKind::default(),
            tags: Vec::new(),
            salience: Salience::default(),
            provenance: serde_json::json!({}),
            pinned: false,
        }
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn salience(mut self, salience: Salience) -> Self {
        self.salience = salience;
        self
    }

    pub fn provenance(mut self, provenance: serde_json::Value) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryPatch {
    pub content: Option<String>,
    pub kind: Option<MemoryKind>,
    pub tags: Option<Vec<String>>,
    pub salience: Option<Salience>,
    pub provenance: Option<serde_json::Value>,
    pub pinned: Option<bool>,
}

impl MemoryPatch {
    pub fn pinned(pinned: bool) -> Self {
        Self {
            pinned: Some(pinned),
            ..Self::default()
        }
    }

    /// Names of the fields this patch sets, for the audit journal.
    pub fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.content.is_some() {
            names.push("content");
        }
        if self.kind.is_some() {
            names.push("kind");
        }
        if self.tags.is_some() {
            names.push("tags");
        }
        if self.salience.is_some() {
            names.push("salience");
        }
        if self.provenance.is_some() {
            names.push("provenance");
        }
        if self.pinned.is_some() {
            names.push("pinned");
        }
        names
    }
}

/// Parameters for [`crate::memory::MemoryStore::recall`].
#[derive(Debug, Clone)]
pub struct RecallQuery {
    pub query: Option<String>,
    pub k: usize,
    /// Case-insensitive kind names. Empty means any kind.
    pub kinds: Vec<String>,
    /// Case-insensitive; a record matches if it carries any of these. Empty means no filter.
    pub tags_any: Vec<String>,
    pub sort_by_salience: bool,
}

impl Default for RecallQuery {
    fn default() -> Self {
        Self {
            query: None,
            k: 10,
            kinds: Vec::new(),
            tags_any: Vec::new(),
            sort_by_salience: true,
        }
    }
}

impl RecallQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }

    pub fn recent(k: usize) -> Self {
        Self {
            k,
            ..Self::default()
        }
    }

    /// The trimmed query, if it has any non-whitespace text.
    pub fn effective_query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// A monthly digest of high-salience episodic memories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicRollup {
    pub id: i64,
    /// `YYYY-MM`
    pub period: String,
    pub summary: String,
    pub source_ids: Vec<i64>,
    pub created_at: String,
}

/// Result of [`crate::memory::MemoryStore::rollup_month`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RollupOutcome {
    pub source_count: usize,
    pub rollup_id: Option<i64>,
}

/// One immutable entry in a subject's playbook history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralVersion {
    pub id: i64,
    pub subject_tag: String,
    pub version: i64,
    pub steps: Vec<String>,
    pub notes: String,
    pub source_ids: Vec<i64>,
    pub created_at: String,
}

/// Result of [`crate::memory::MemoryStore::upsert_procedural`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProceduralOutcome {
    pub version: i64,
    pub subject_tag: String,
    /// The live `procedural` memory that mirrors the latest version.
    pub memory_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!("Episodic".parse::<MemoryKind>().unwrap(), MemoryKind::Episodic);
        assert_eq!(" event ".parse::<MemoryKind>().unwrap(), MemoryKind::Event);
        assert!(matches!(
            "entity".parse::<MemoryKind>(),
            Err(MemoryError::UnknownKind(_))
        ));
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in MemoryKind::ALL {
            assert_eq!(kind.as_str().parse::<MemoryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn salience_defaults_fill_missing_keys() {
        let s: Salience = serde_json::from_str(r#"{"importance": 0.9}"#).unwrap();
        assert_eq!(s.importance, 0.9);
        assert_eq!(s.relevance, 0.5);
        assert_eq!(s.emotion, 0.0);
        assert_eq!(s.confidence, None);

        let empty: Salience = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, Salience::default());
    }

    #[test]
    fn salience_score_weights() {
        let s = Salience {
            importance: 1.0,
            relevance: 1.0,
            emotion: 1.0,
            effort: 1.0,
            novelty: 1.0,
            confidence: None,
        };
        assert!((s.score() - 1.0).abs() < 1e-9);
        assert!((Salience::default().score() - 0.3).abs() < 1e-9);
    }

    #[test]
    fn salience_validate_bounds() {
        assert!(Salience::default().validate().is_ok());
        let edge = Salience {
            importance: 1.0,
            novelty: 0.0,
            confidence: Some(1.0),
            ..Salience::default()
        };
        assert!(edge.validate().is_ok());

        for bad in [f64::NAN, f64::INFINITY, -0.1, 7.0] {
            let s = Salience {
                effort: bad,
                ..Salience::default()
            };
            assert!(matches!(
                s.validate(),
                Err(MemoryError::InvalidSalience { field: "effort", .. })
            ));
        }

        let s = Salience {
            confidence: Some(f64::NAN),
            ..Salience::default()
        };
        assert!(matches!(
            s.validate(),
            Err(MemoryError::InvalidSalience { field: "confidence", .. })
        ));
    }

    #[test]
    fn patch_lists_only_set_fields() {
        let patch = MemoryPatch {
            content: Some("x".into()),
            pinned: Some(true),
            ..MemoryPatch::default()
        };
        assert_eq!(patch.field_names(), vec!["content", "pinned"]);
    }

    #[test]
    fn effective_query_ignores_whitespace() {
        assert_eq!(RecallQuery::text("   ").effective_query(), None);
        assert_eq!(RecallQuery::text(" tea ").effective_query(), Some("tea"));
    }
}
