use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ISO_DURATION: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$").ok()
});

const THUMBNAIL_QUALITIES: [&str; 5] = ["maxres", "high", "medium", "default", "standard"];
const DESCRIPTION_LIMIT: usize = 100;

/// ISO 8601 duration such as `PT1M20S` to seconds. Unparsable input counts as zero.
pub fn parse_duration(duration: &str) -> u64 {
    let Some(captures) = ISO_DURATION.as_ref().and_then(|re| re.captures(duration)) else {
        return 0;
    };

    let part = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    };

    part(1) * 86400 + part(2) * 3600 + part(3) * 60 + part(4)
}

/// Counts come back as decimal strings, occasionally as numbers.
pub fn parse_count(value: &Value) -> Option<u64> {
    match value {
        Value::String(count) => count.parse::<u64>().ok(),
        Value::Number(count) => count.as_u64(),
        _ => None,
    }
}

pub fn truncate_description(description: &str) -> String {
    match description.chars().count() > DESCRIPTION_LIMIT {
        true => format!(
            "{}...",
            description.chars().take(DESCRIPTION_LIMIT).collect::<String>()
        ),
        false => description.to_string(),
    }
}

pub fn parse_tags(tags: &Value) -> Vec<String> {
    let Some(tags) = tags.as_array() else {
        return Vec::new();
    };

    tags.iter()
        .filter_map(|tag| tag.as_str())
        .map(|tag| tag.to_string())
        .collect()
}

pub fn best_thumbnail(thumbnails: &Value) -> String {
    THUMBNAIL_QUALITIES
        .iter()
        .find_map(|quality| thumbnails[*quality]["url"].as_str())
        .unwrap_or_default()
        .to_string()
}
