//! Knowledge packs: TOML-authored curricular content.
//!
//! A pack is a TOML document bundling topics (with trigger phrases and
//! clarification chains), rules, and the NLP lexicons for one subject. Three
//! packs are bundled into the binary; external packs load from a directory so
//! content authors can extend the tutor without touching code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AuthoringError;

/// Where a pack came from.
#[derive(Debug, Clone)]
pub enum PackSource {
    /// Bundled into the binary via `include_str!`.
    Bundled,
    /// Loaded from an external file.
    External(PathBuf),
}

/// A parsed pack document, not yet validated record-by-record.
#[derive(Debug, Clone)]
pub struct Pack {
    pub doc: PackDoc,
    pub source: PackSource,
}

/// Pack metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct PackMeta {
    pub id: String,
    pub name: String,
    pub subject: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
}

/// The raw TOML document shape.
#[derive(Debug, Clone, Deserialize)]
pub struct PackDoc {
    pub pack: PackMeta,
    #[serde(default)]
    pub topics: Vec<TopicDoc>,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
    #[serde(default)]
    pub intents: Vec<IntentDoc>,
    #[serde(default)]
    pub conditions: Vec<ConditionDoc>,
    #[serde(default)]
    pub entities: Vec<EntityDoc>,
}

/// An authored topic: tag, trigger phrases, optional clarification chain.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicDoc {
    pub tag: String,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub clarify: Vec<ClarifyDoc>,
}

/// One clarification-chain node.
#[derive(Debug, Clone, Deserialize)]
pub struct ClarifyDoc {
    pub fact: String,
    pub values: Vec<String>,
    pub prompt: String,
}

/// An authored rule record.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDoc {
    pub id: String,
    pub topic: String,
    pub concept: String,
    pub explanation: String,
    #[serde(default)]
    pub subtopic: String,
    #[serde(default)]
    pub examples: Vec<String>,
    #[serde(default = "default_cf")]
    pub cf: f64,
    #[serde(default)]
    pub priority: i32,
    /// Extra constraint strings beyond the implicit `query_topic` match,
    /// e.g. `"tissue_type = epithelial"` or `"sleep_hours < 6"`.
    #[serde(default)]
    pub when: Vec<String>,
    /// Facts to assert on firing; values may interpolate `{fact_name}`.
    #[serde(default)]
    pub asserts: BTreeMap<String, String>,
    /// Terminal rule: stop matching after this rule fires.
    #[serde(default)]
    pub halt: bool,
}

fn default_cf() -> f64 {
    1.0
}

/// Intent lexicon entry.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentDoc {
    pub name: String,
    pub triggers: Vec<String>,
}

/// Condition lexicon entry: phrases mapping to a `fact = value` pair.
#[derive(Debug, Clone, Deserialize)]
pub struct ConditionDoc {
    pub fact: String,
    pub value: String,
    pub triggers: Vec<String>,
}

/// Entity pattern: a regex with one capture group yielding a numeric fact.
#[derive(Debug, Clone, Deserialize)]
pub struct EntityDoc {
    pub fact: String,
    pub pattern: String,
}

impl Pack {
    /// Parse a pack from TOML text.
    pub fn parse(id_hint: &str, text: &str, source: PackSource) -> Result<Self, AuthoringError> {
        let doc: PackDoc = toml::from_str(text).map_err(|e| AuthoringError::PackParse {
            id: id_hint.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { doc, source })
    }

    /// Load a pack from an external TOML file.
    pub fn load(path: &Path) -> Result<Self, AuthoringError> {
        let text = std::fs::read_to_string(path).map_err(|e| AuthoringError::PackIo {
            path: path.display().to_string(),
            source: e,
        })?;
        let id_hint = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::parse(&id_hint, &text, PackSource::External(path.to_path_buf()))
    }

    /// Load every `*.toml` pack in a directory, in file-name order.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>, AuthoringError> {
        let entries = std::fs::read_dir(dir).map_err(|e| AuthoringError::PackIo {
            path: dir.display().to_string(),
            source: e,
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        paths.sort();

        let mut packs = Vec::with_capacity(paths.len());
        for path in &paths {
            packs.push(Self::load(path)?);
        }
        Ok(packs)
    }
}

/// The curricular packs compiled into the binary.
pub fn bundled_packs() -> Vec<Pack> {
    const BUNDLED: [(&str, &str); 3] = [
        ("biology", include_str!("packs/biology.toml")),
        ("chemistry", include_str!("packs/chemistry.toml")),
        ("study_skills", include_str!("packs/study_skills.toml")),
    ];
    BUNDLED
        .iter()
        .map(|(id, text)| {
            Pack::parse(id, text, PackSource::Bundled)
                .unwrap_or_else(|e| panic!("bundled pack {id} is malformed: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_packs_parse() {
        let packs = bundled_packs();
        assert_eq!(packs.len(), 3);
        let subjects: Vec<&str> = packs.iter().map(|p| p.doc.pack.subject.as_str()).collect();
        assert!(subjects.contains(&"biology"));
        assert!(subjects.contains(&"chemistry"));
        assert!(subjects.contains(&"study_skills"));
    }

    #[test]
    fn rule_defaults_applied() {
        let text = r#"
[pack]
id = "mini"
name = "Mini"
subject = "test"

[[rules]]
id = "t-1"
topic = "t"
concept = "Thing"
explanation = "A thing."
"#;
        let pack = Pack::parse("mini", text, PackSource::Bundled).unwrap();
        let rule = &pack.doc.rules[0];
        assert_eq!(rule.cf, 1.0);
        assert_eq!(rule.priority, 0);
        assert!(rule.when.is_empty());
        assert!(!rule.halt);
    }

    #[test]
    fn malformed_toml_is_a_pack_parse_error() {
        let err = Pack::parse("broken", "[pack\nid=", PackSource::Bundled).unwrap_err();
        assert!(matches!(err, AuthoringError::PackParse { .. }));
    }
}
