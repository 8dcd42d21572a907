use crate::{TeamflowError, TeamflowResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known artifact field names.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const CONTENT: &str = "content";
    pub const INTRODUCTION: &str = "introduction";
    pub const CONCLUSION: &str = "conclusion";
    pub const META_DESCRIPTION: &str = "meta_description";
    pub const KEYWORDS: &str = "keywords";
    pub const FEATURE_IMAGE: &str = "feature_image";
    pub const SUPPORTING_IMAGES: &str = "supporting_images";
    pub const TONE: &str = "tone";

    /// Fields holding serialized/rendered content that may embed other fields verbatim.
    pub const RENDERED: &[&str] = &[CONTENT, "html", "markdown"];
}

/// A pipeline's output as a mapping of named fields.
///
/// Rendered fields (see [`fields::RENDERED`]) hold serialized content such as
/// HTML. Whenever a structured field changes, its old value must be replaced
/// inside the rendered fields too so the two never diverge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Artifact {
    fields: BTreeMap<String, serde_json::Value>,
}

impl Artifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object. Any other JSON shape is rejected.
    pub fn from_value(value: serde_json::Value) -> TeamflowResult<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self {
                fields: map.into_iter().collect(),
            }),
            other => Err(TeamflowError::InvalidState(format!(
                "artifact must be a JSON object, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    pub fn with_field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(serde_json::Value::as_str)
    }

    /// Set a field, returning its previous value.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Option<serde_json::Value> {
        self.fields.insert(name.into(), value)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Replace every verbatim occurrence of `old` with `new` inside the
    /// rendered fields. The HTML-escaped form of `old` is replaced as well.
    ///
    /// Returns the number of replacements made. An empty `old` is a no-op.
    pub fn replace_in_rendered(&mut self, old: &str, new: &str) -> usize {
        if old.is_empty() || old == new {
            return 0;
        }
        let escaped_old = html_escape(old);
        let escaped_new = html_escape(new);

        let mut count = 0;
        for name in fields::RENDERED {
            let Some(serde_json::Value::String(blob)) = self.fields.get_mut(*name) else {
                continue;
            };
            let mut hits = blob.matches(old).count();
            let mut updated = blob.replace(old, new);
            if escaped_old != old {
                let escaped_hits = updated.matches(escaped_old.as_str()).count();
                if escaped_hits > 0 {
                    updated = updated.replace(escaped_old.as_str(), escaped_new.as_str());
                    hits += escaped_hits;
                }
            }
            if hits > 0 {
                *blob = updated;
                count += hits;
            }
        }
        count
    }

    /// Like [`replace_in_rendered`](Self::replace_in_rendered) but rewrites at
    /// most the first occurrence in each rendered field. Used when several
    /// fields may render identically.
    pub fn replace_first_in_rendered(&mut self, old: &str, new: &str) -> usize {
        if old.is_empty() || old == new {
            return 0;
        }
        let mut count = 0;
        for name in fields::RENDERED {
            let Some(serde_json::Value::String(blob)) = self.fields.get_mut(*name) else {
                continue;
            };
            if blob.contains(old) {
                *blob = blob.replacen(old, new, 1);
                count += 1;
            }
        }
        count
    }

    /// Whether `needle` appears in any rendered field.
    pub fn rendered_contains(&self, needle: &str) -> bool {
        fields::RENDERED
            .iter()
            .filter_map(|name| self.get_str(name))
            .any(|blob| blob.contains(needle))
    }
}

/// Minimal HTML escaping for text embedded in rendered content.
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Find an explicit title in generated text: a markdown heading or a
/// `Title:` line. Returns `None` when the text carries neither.
pub fn extract_title(text: &str) -> Option<String> {
    text.lines().map(str::trim).find_map(|line| {
        let candidate = if line.starts_with('#') {
            line.trim_start_matches('#')
        } else if has_title_prefix(line) {
            &line[6..]
        } else {
            return None;
        };
        let cleaned = clean_title(candidate);
        (!cleaned.is_empty()).then_some(cleaned)
    })
}

/// Strip markdown emphasis, a `Title:` prefix and surrounding quotes from a
/// one-line title.
pub fn clean_title(raw: &str) -> String {
    let mut title = raw.trim().trim_start_matches('#').trim();
    if has_title_prefix(title) {
        title = title[6..].trim();
    }
    title
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '*' | '_' | '`' | '“' | '”'))
        .trim()
        .to_string()
}

fn has_title_prefix(line: &str) -> bool {
    line.get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("title:"))
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
