use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl SeoMetadata {
    /// Templated metadata used whenever the generator output is unusable.
    pub fn fallback(movie_title: &str) -> Self {
        Self {
            title: fallback_title(movie_title),
            description: fallback_description(movie_title),
            tags: fallback_tags(movie_title),
        }
    }
}

fn fallback_title(movie_title: &str) -> String {
    format!("{movie_title} Official Trailer")
}

fn fallback_description(movie_title: &str) -> String {
    format!("Watch the official trailer for {movie_title}.")
}

fn fallback_tags(movie_title: &str) -> Vec<String> {
    vec![
        movie_title.to_string(),
        "movie trailer".to_string(),
        "official trailer".to_string(),
    ]
}

#[async_trait]
pub trait MetadataGenerator: Send + Sync {
    /// Never fails: every error path degrades to [`SeoMetadata::fallback`].
    async fn generate(&self, movie_title: &str) -> SeoMetadata;
}

/// Always answers with the templated fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticMetadata;

#[async_trait]
impl MetadataGenerator for StaticMetadata {
    async fn generate(&self, movie_title: &str) -> SeoMetadata {
        SeoMetadata::fallback(movie_title)
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn parse_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    let body = strip_code_fence(text);
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        return Some(map);
    }
    // Models sometimes wrap the object in prose; take the first object that
    // parses, ignoring whatever follows it.
    body.match_indices('{').find_map(|(start, _)| {
        match serde_json::Deserializer::from_str(&body[start..])
            .into_iter::<Value>()
            .next()
        {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn tag_list(value: Option<&Value>) -> Option<Vec<String>> {
    let tags: Vec<String> = match value? {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        _ => return None,
    };
    (!tags.is_empty()).then_some(tags)
}

/// Strict JSON parse of a generator reply. `None` when the reply is not a
/// JSON object; individual missing or empty fields take their templated
/// value.
pub fn parse_metadata(text: &str, movie_title: &str) -> Option<SeoMetadata> {
    let object = parse_object(text)?;
    Some(SeoMetadata {
        title: non_empty_string(object.get("title"))
            .unwrap_or_else(|| fallback_title(movie_title)),
        description: non_empty_string(object.get("description"))
            .unwrap_or_else(|| fallback_description(movie_title)),
        tags: tag_list(object.get("tags")).unwrap_or_else(|| fallback_tags(movie_title)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_templated_from_title() {
        let meta = SeoMetadata::fallback("Dune");
        assert_eq!(meta.title, "Dune Official Trailer");
        assert_eq!(meta.description, "Watch the official trailer for Dune.");
        assert_eq!(meta.tags, vec!["Dune", "movie trailer", "official trailer"]);
    }

    #[test]
    fn parses_well_formed_reply() {
        let reply = r#"{"title":"DUNE | Official Trailer","description":"Epic.","tags":["dune","sci-fi"]}"#;
        let meta = parse_metadata(reply, "Dune").unwrap();
        assert_eq!(meta.title, "DUNE | Official Trailer");
        assert_eq!(meta.description, "Epic.");
        assert_eq!(meta.tags, vec!["dune", "sci-fi"]);
    }

    #[test]
    fn accepts_fenced_and_wrapped_json() {
        let fenced = "```json\n{\"title\":\"T\",\"description\":\"D\",\"tags\":[\"a\"]}\n```";
        assert_eq!(parse_metadata(fenced, "Dune").unwrap().title, "T");

        let wrapped = "Sure! Here you go: {\"title\":\"T2\"} Hope it helps.";
        let meta = parse_metadata(wrapped, "Dune").unwrap();
        assert_eq!(meta.title, "T2");
        assert_eq!(meta.description, "Watch the official trailer for Dune.");
    }

    #[test]
    fn first_object_wins_over_trailing_braces() {
        let reply = r#"Here you go: {"title":"Dune | Trailer","tags":["dune"]} (use {placeholders} freely)"#;
        let meta = parse_metadata(reply, "Dune").unwrap();
        assert_eq!(meta.title, "Dune | Trailer");
        assert_eq!(meta.tags, vec!["dune"]);

        let stray = r#"Options {a, b} then {"title":"T3"}"#;
        assert_eq!(parse_metadata(stray, "Dune").unwrap().title, "T3");
    }

    #[test]
    fn missing_fields_fall_back_individually() {
        let reply = r#"{"description":"  ","tags":"dune, trailer ,"}"#;
        let meta = parse_metadata(reply, "Dune").unwrap();
        assert_eq!(meta.title, "Dune Official Trailer");
        assert_eq!(meta.description, "Watch the official trailer for Dune.");
        assert_eq!(meta.tags, vec!["dune", "trailer"]);
    }

    #[test]
    fn malformed_reply_is_rejected() {
        // Python-literal style output is not JSON and must not be evaluated.
        assert_eq!(parse_metadata("{'title': 'Dune', 'tags': ['a']}", "Dune"), None);
        assert_eq!(parse_metadata("__import__('os').system('rm -rf /')", "Dune"), None);
        assert_eq!(parse_metadata("[\"title\"]", "Dune"), None);
        assert_eq!(parse_metadata("", "Dune"), None);
    }

    #[tokio::test]
    async fn static_generator_returns_fallback() {
        assert_eq!(
            StaticMetadata.generate("Arrival").await,
            SeoMetadata::fallback("Arrival")
        );
    }
}
