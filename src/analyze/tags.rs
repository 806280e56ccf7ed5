use crate::model::video::VideoRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const TOP_TAGS: usize = 30;
pub const TOP_KEYWORDS: usize = 30;

static SEPARATORS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"[【】「」『』（）［］{}\[\]()!！?？…・.。,:：;；\s]+").ok());

/// Particles, pronouns, date units and punctuation that carry no topic.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "について", "とは", "する", "ある", "いる", "なる", "れる", "この", "その", "あの",
        "どの", "これ", "それ", "あれ", "どれ", "こと", "もの", "ため", "ところ", "よう",
        "こちら", "そちら", "あちら", "どちら", "さん", "くん", "ちゃん", "さま", "様", "で",
        "を", "の", "が", "に", "と", "へ", "から", "まで", "より", "や", "私", "僕", "俺",
        "君", "です", "ます", "#", "@", "...", "〈", "〉", "《", "》", "=", "＝", "+", "＋",
        "-", "ー", "*", "＊", "x", "×", "|", "｜", "/", "／", "〜", "日", "月", "年", "週",
        "時間", "分", "秒", "時", "今回", "前回", "方法", "どんな", "みたい", "たい", "てる",
    ]
    .into_iter()
    .collect()
});

/// Case-folded tag frequencies across `videos`, most frequent first.
/// Single-character tags are ignored.
pub fn rank_tags(videos: &[VideoRecord], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for tag in videos.iter().flat_map(|video| video.tags.iter()) {
        let tag = tag.trim().to_lowercase();
        if tag.chars().count() < 2 {
            continue;
        }
        *counts.entry(tag).or_default() += 1;
    }

    let mut ranked = counts.into_iter().collect::<Vec<(String, usize)>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);

    ranked
}

/// Word frequencies over titles and descriptions, most frequent first.
/// Words keep their case; stopwords and single characters are dropped.
pub fn extract_keywords(videos: &[VideoRecord], limit: usize) -> Vec<(String, usize)> {
    let Some(separators) = SEPARATORS.as_ref() else {
        return Vec::new();
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in videos
        .iter()
        .flat_map(|video| [video.title.as_str(), video.description.as_str()])
    {
        for word in separators.replace_all(text, " ").split_whitespace() {
            if word.chars().count() < 2 || STOPWORDS.contains(word.to_lowercase().as_str()) {
                continue;
            }
            *counts.entry(word.to_string()).or_default() += 1;
        }
    }

    let mut ranked = counts.into_iter().collect::<Vec<(String, usize)>>();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(limit);

    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn video(tags: &[&str]) -> VideoRecord {
        titled("", "", tags)
    }

    fn titled(title: &str, description: &str, tags: &[&str]) -> VideoRecord {
        VideoRecord {
            video_id: "v".to_string(),
            channel_id: "c".to_string(),
            title: title.to_string(),
            channel_title: String::new(),
            published_at: Utc::now(),
            view_count: 0,
            like_count: 0,
            comment_count: 0,
            duration_seconds: 0,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            description: description.to_string(),
            thumbnail_url: String::new(),
        }
    }

    #[test]
    fn tags_are_ranked_case_insensitively() {
        let videos = vec![
            video(&["Rust", "プログラミング", "x"]),
            video(&["rust", "入門"]),
            video(&["RUST", "プログラミング"]),
        ];

        let ranked = rank_tags(&videos, TOP_TAGS);
        assert_eq!(
            ranked,
            vec![
                ("rust".to_string(), 3),
                ("プログラミング".to_string(), 2),
                ("入門".to_string(), 1),
            ]
        );
        assert_eq!(rank_tags(&videos, 1).len(), 1);
    }

    #[test]
    fn keywords_skip_symbols_and_stopwords() {
        let videos = vec![
            titled("【筋トレ】腹筋 を 鍛える", "筋トレ です。腹筋！", &[]),
            titled("Rust 入門 (2024)", "rust と Rust", &[]),
        ];

        let keywords = extract_keywords(&videos, TOP_KEYWORDS);
        assert_eq!(
            keywords,
            vec![
                ("Rust".to_string(), 2),
                ("筋トレ".to_string(), 2),
                ("腹筋".to_string(), 2),
                ("2024".to_string(), 1),
                ("rust".to_string(), 1),
                ("入門".to_string(), 1),
                ("鍛える".to_string(), 1),
            ]
        );
    }

    #[test]
    fn keywords_respect_the_limit() {
        let videos = vec![titled("alpha beta gamma", "", &[])];
        assert_eq!(extract_keywords(&videos, 2).len(), 2);
        assert!(extract_keywords(&[], TOP_KEYWORDS).is_empty());
    }
}
