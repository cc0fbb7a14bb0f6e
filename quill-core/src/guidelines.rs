//! Brand and regulatory guideline profiles
//!
//! Profiles are owned by a user and looked up by `(profile_id, user_id)`.
//! Content arrives either as a structured document with named fields or as
//! legacy free text; the distinction is resolved once, when the profile is
//! deserialized, and everything downstream works with [`GuidelineContent`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{QuillError, Result};

/// Structured brand guideline document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrandGuidelineContent {
    pub brand_name: Option<String>,
    pub tone: Option<String>,
    pub voice: Option<String>,
    pub audience: Option<String>,
    pub values: Vec<String>,
    pub key_messages: Vec<String>,
    pub palette: Vec<String>,
    pub preferred_terms: Vec<String>,
    pub banned_terms: Vec<String>,
    pub dos: Vec<String>,
    pub donts: Vec<String>,
    pub notes: Option<String>,
}

impl BrandGuidelineContent {
    fn render(&self) -> String {
        let mut lines = Vec::new();

        let scalar = |label: &str, value: &Option<String>, lines: &mut Vec<String>| {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                lines.push(format!("{}: {}", label, v));
            }
        };
        let list = |label: &str, values: &[String], lines: &mut Vec<String>| {
            let items: Vec<&str> = values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect();
            if !items.is_empty() {
                lines.push(format!("{}: {}", label, items.join("; ")));
            }
        };

        scalar("Brand name", &self.brand_name, &mut lines);
        scalar("Tone", &self.tone, &mut lines);
        scalar("Voice", &self.voice, &mut lines);
        scalar("Target audience", &self.audience, &mut lines);
        list("Brand values", &self.values, &mut lines);
        list("Key messages", &self.key_messages, &mut lines);
        list("Color palette", &self.palette, &mut lines);
        list("Preferred terms", &self.preferred_terms, &mut lines);
        list("Never use", &self.banned_terms, &mut lines);
        list("Do", &self.dos, &mut lines);
        list("Don't", &self.donts, &mut lines);
        scalar("Notes", &self.notes, &mut lines);

        lines.join("\n")
    }
}

/// Guideline content: structured fields or legacy free text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuidelineContent {
    Structured(BrandGuidelineContent),
    Legacy(String),
}

impl GuidelineContent {
    /// Render as prompt text, one `Label: value` line per populated field.
    ///
    /// Legacy text is passed through trimmed. Output longer than `max_chars`
    /// is cut on a character boundary.
    pub fn format_for_prompt(&self, max_chars: usize) -> String {
        let text = match self {
            GuidelineContent::Structured(content) => content.render(),
            GuidelineContent::Legacy(text) => text.trim().to_string(),
        };
        truncate_chars(&text, max_chars)
    }

    /// True when formatting would produce nothing
    pub fn is_empty(&self) -> bool {
        match self {
            GuidelineContent::Structured(content) => content.render().is_empty(),
            GuidelineContent::Legacy(text) => text.trim().is_empty(),
        }
    }
}

/// Cut `text` to at most `max_chars` characters
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// A user's guideline profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidelineProfile {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Brand guidelines
    pub content: GuidelineContent,
    /// Regulatory rules the content must respect
    #[serde(default)]
    pub regulatory: Option<GuidelineContent>,
}

impl GuidelineProfile {
    /// Brand content, unless it renders to nothing
    pub fn brand(&self) -> Option<&GuidelineContent> {
        Some(&self.content).filter(|c| !c.is_empty())
    }

    /// Regulatory content, unless absent or empty
    pub fn regulatory(&self) -> Option<&GuidelineContent> {
        self.regulatory.as_ref().filter(|c| !c.is_empty())
    }
}

/// Read-only source of guideline profiles
#[async_trait]
pub trait GuidelineStore: Send + Sync {
    /// Fetch a profile, only if it belongs to `user_id`
    async fn get(&self, profile_id: &str, user_id: &str) -> Result<Option<GuidelineProfile>>;
}

/// In-memory guideline store, optionally seeded from a JSON file
#[derive(Debug, Default)]
pub struct InMemoryGuidelineStore {
    profiles: RwLock<HashMap<String, GuidelineProfile>>,
}

impl InMemoryGuidelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of profiles
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            QuillError::Guidelines(format!("cannot read {}: {}", path.display(), e))
        })?;
        let profiles: Vec<GuidelineProfile> = serde_json::from_str(&raw)?;
        let store = Self::new();
        for profile in profiles {
            store.insert(profile);
        }
        Ok(store)
    }

    pub fn with_profile(self, profile: GuidelineProfile) -> Self {
        self.insert(profile);
        self
    }

    pub fn insert(&self, profile: GuidelineProfile) {
        let mut profiles = match self.profiles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        profiles.insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl GuidelineStore for InMemoryGuidelineStore {
    async fn get(&self, profile_id: &str, user_id: &str) -> Result<Option<GuidelineProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| QuillError::Guidelines("profile store lock poisoned".to_string()))?;
        Ok(profiles
            .get(profile_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured() -> GuidelineContent {
        GuidelineContent::Structured(BrandGuidelineContent {
            brand_name: Some("Acme Health".to_string()),
            tone: Some("warm, precise".to_string()),
            audience: Some("clinic managers".to_string()),
            palette: vec!["#004488".to_string(), " ".to_string()],
            banned_terms: vec!["miracle".to_string()],
            ..Default::default()
        })
    }

    #[test]
    fn test_structured_formatting() {
        let text = structured().format_for_prompt(10_000);
        assert!(text.contains("Brand name: Acme Health"));
        assert!(text.contains("Tone: warm, precise"));
        assert!(text.contains("Target audience: clinic managers"));
        assert!(text.contains("Color palette: #004488"));
        assert!(text.contains("Never use: miracle"));
        assert!(!text.contains("Voice"));
    }

    #[test]
    fn test_legacy_formatting_trims() {
        let content = GuidelineContent::Legacy("  Be friendly.  ".to_string());
        assert_eq!(content.format_for_prompt(100), "Be friendly.");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let content = GuidelineContent::Legacy("héllo wörld".to_string());
        assert_eq!(content.format_for_prompt(4), "héll…");
    }

    #[test]
    fn test_untagged_resolution() {
        let legacy: GuidelineContent = serde_json::from_str(r#""Plain text rules""#).unwrap();
        assert!(matches!(legacy, GuidelineContent::Legacy(_)));

        let structured: GuidelineContent =
            serde_json::from_str(r#"{"brandName": "Acme", "tone": "bold"}"#).unwrap();
        match structured {
            GuidelineContent::Structured(c) => assert_eq!(c.tone.as_deref(), Some("bold")),
            other => panic!("expected structured, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_content_is_absent() {
        let profile = GuidelineProfile {
            id: "p".to_string(),
            user_id: "u".to_string(),
            name: None,
            content: GuidelineContent::Legacy("   ".to_string()),
            regulatory: Some(GuidelineContent::Structured(BrandGuidelineContent::default())),
        };
        assert!(profile.brand().is_none());
        assert!(profile.regulatory().is_none());
    }

    #[tokio::test]
    async fn test_store_enforces_ownership() {
        let store = InMemoryGuidelineStore::new().with_profile(GuidelineProfile {
            id: "profile-1".to_string(),
            user_id: "alice".to_string(),
            name: None,
            content: structured(),
            regulatory: None,
        });

        assert!(store.get("profile-1", "alice").await.unwrap().is_some());
        assert!(store.get("profile-1", "bob").await.unwrap().is_none());
        assert!(store.get("missing", "alice").await.unwrap().is_none());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.json");
        std::fs::write(
            &path,
            r#"[{"id": "p1", "userId": "u1", "content": "Legacy text",
                 "regulatory": {"notes": "No medical claims"}}]"#,
        )
        .unwrap();

        let store = InMemoryGuidelineStore::from_json_file(&path).unwrap();
        assert_eq!(store.len(), 1);
    }
}
