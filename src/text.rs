//! Deterministic text heuristics used when the AI path degrades.
//!
//! Nothing here touches the network. The same inputs always produce the
//! same outputs, which keeps the normalizer's fallback path reproducible.

use std::collections::HashMap;

pub const LANGUAGE_CHINESE: &str = "Chinese";
pub const LANGUAGE_ENGLISH: &str = "English";
pub const LANGUAGE_UNKNOWN: &str = "unknown";

pub const EMOTION_POSITIVE: &str = "positive";
pub const EMOTION_NEGATIVE: &str = "negative";
pub const EMOTION_NEUTRAL: &str = "neutral";

/// Keywords kept on fallback paths.
pub const FALLBACK_KEYWORDS: usize = 6;

const POSITIVE_LEXICON: &[&str] = &[
    "好", "棒", "优秀", "成功", "快乐", "美好", "喜欢", "爱", "赞", "good", "great", "excellent",
    "success", "happy", "joy", "beautiful", "love", "like", "wonderful",
];
const NEGATIVE_LEXICON: &[&str] = &[
    "坏", "差", "失败", "悲伤", "痛苦", "讨厌", "恨", "糟", "bad", "poor", "fail", "sad", "pain",
    "hate", "awful", "terrible",
];
const TECHNICAL_LEXICON: &[&str] = &[
    "AI", "算法", "代码", "程序", "技术", "数据", "模型", "系统", "计算", "网络", "algorithm",
    "code", "program", "software", "data", "model", "system", "compute", "network",
];
const ARTISTIC_LEXICON: &[&str] = &[
    "艺术", "美学", "设计", "创意", "灵感", "色彩", "画面", "音乐", "诗歌", "美术", "art",
    "aesthetic", "design", "creative", "inspiration", "color", "painting", "music", "poetry",
];

fn is_cjk_ideograph(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Character-class language detection.
///
/// Any CJK ideograph → Chinese; otherwise any ASCII Latin letter →
/// English; otherwise unknown.
pub fn detect_language(text: &str) -> &'static str {
    if text.chars().any(is_cjk_ideograph) {
        LANGUAGE_CHINESE
    } else if text.chars().any(|c| c.is_ascii_alphabetic()) {
        LANGUAGE_ENGLISH
    } else {
        LANGUAGE_UNKNOWN
    }
}

/// Frequency-ranked keyword extraction.
///
/// Lower-cases the text, replaces everything that is not a word character
/// (ASCII alphanumeric or `_`), a CJK ideograph or whitespace with a space,
/// splits on whitespace, drops tokens of one character or less and returns
/// the `max_keywords` most frequent tokens. Ties keep first-occurrence order.
pub fn extract_keywords(text: &str, max_keywords: usize) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || is_cjk_ideograph(c) || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let mut order: Vec<(String, usize)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        if word.chars().count() <= 1 {
            continue;
        }
        match index.get(word) {
            Some(&i) => order[i].1 += 1,
            None => {
                index.insert(word.to_string(), order.len());
                order.push((word.to_string(), 1));
            }
        }
    }

    // stable: equal counts stay in first-seen order
    order.sort_by(|a, b| b.1.cmp(&a.1));
    order
        .into_iter()
        .take(max_keywords)
        .map(|(word, _)| word)
        .collect()
}

/// Output of the rule-based classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicUnderstanding {
    pub intent: String,
    pub essence: String,
    pub purpose: String,
    pub emotion: String,
}

/// Rule-based sentiment/topic classification over fixed lexicons.
///
/// Emotion is positive (or negative) only when the text hits that lexicon
/// and not the opposite one. Technical vocabulary wins over artistic
/// vocabulary when both appear.
pub fn simple_understanding(text: &str) -> BasicUnderstanding {
    let plain = text.trim();
    if plain.is_empty() {
        return BasicUnderstanding {
            intent: "explore the unknown".to_string(),
            essence: "empty content".to_string(),
            purpose: "placeholder".to_string(),
            emotion: EMOTION_NEUTRAL.to_string(),
        };
    }

    let lower = plain.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    // CJK entries match as substrings; Latin entries match whole words,
    // or word prefixes for stems of four letters or more ("fail" → "failed").
    let hits = |lexicon: &[&str]| {
        lexicon.iter().any(|w| {
            if w.is_ascii() {
                let w = w.to_ascii_lowercase();
                tokens
                    .iter()
                    .any(|t| *t == w || (w.len() >= 4 && t.starts_with(w.as_str())))
            } else {
                plain.contains(w)
            }
        })
    };

    let has_pos = hits(POSITIVE_LEXICON);
    let has_neg = hits(NEGATIVE_LEXICON);
    let emotion = match (has_pos, has_neg) {
        (true, false) => EMOTION_POSITIVE,
        (false, true) => EMOTION_NEGATIVE,
        _ => EMOTION_NEUTRAL,
    };

    let essence = if hits(TECHNICAL_LEXICON) {
        "technical content"
    } else if hits(ARTISTIC_LEXICON) {
        "artistic content"
    } else {
        "text content"
    };

    BasicUnderstanding {
        intent: "express and share".to_string(),
        essence: essence.to_string(),
        purpose: "convey information or emotion".to_string(),
        emotion: emotion.to_string(),
    }
}

/// First `max_chars` characters of `text` (char-boundary safe).
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_detection() {
        assert_eq!(detect_language("Hello world"), LANGUAGE_ENGLISH);
        assert_eq!(detect_language("你好 world"), LANGUAGE_CHINESE);
        assert_eq!(detect_language("12345 !?"), LANGUAGE_UNKNOWN);
        assert_eq!(detect_language(""), LANGUAGE_UNKNOWN);
    }

    #[test]
    fn keywords_rank_by_frequency_then_first_occurrence() {
        let text = "Rust is fast. Rust is safe! Memory safety, rust.";
        let kw = extract_keywords(text, 3);
        assert_eq!(kw, vec!["rust", "is", "fast"]);
    }

    #[test]
    fn keywords_drop_single_characters_and_punctuation() {
        let kw = extract_keywords("a b c -- x-ray!!", 8);
        assert_eq!(kw, vec!["ray"]);
    }

    #[test]
    fn keywords_keep_cjk_runs() {
        let kw = extract_keywords("符文 符文 语义", 8);
        assert_eq!(kw, vec!["符文", "语义"]);
    }

    #[test]
    fn keywords_respect_limit_and_empty_input() {
        assert!(extract_keywords("", 6).is_empty());
        let kw = extract_keywords("one two three four five six seven eight nine", 6);
        assert_eq!(kw.len(), 6);
        assert_eq!(kw[0], "one");
    }

    #[test]
    fn understanding_of_empty_text() {
        let u = simple_understanding("   ");
        assert_eq!(u.essence, "empty content");
        assert_eq!(u.emotion, EMOTION_NEUTRAL);
    }

    #[test]
    fn understanding_classifies_sentiment_and_topic() {
        let u = simple_understanding("I love this new algorithm");
        assert_eq!(u.emotion, EMOTION_POSITIVE);
        assert_eq!(u.essence, "technical content");

        let u = simple_understanding("这首音乐让我悲伤");
        assert_eq!(u.emotion, EMOTION_NEGATIVE);
        assert_eq!(u.essence, "artistic content");

        let u = simple_understanding("good and bad");
        assert_eq!(u.emotion, EMOTION_NEUTRAL);
        assert_eq!(u.essence, "text content");
    }

    #[test]
    fn latin_lexicon_matches_whole_words_only() {
        // "said" must not trigger the "ai" technical entry
        let u = simple_understanding("she said hello");
        assert_eq!(u.essence, "text content");

        let u = simple_understanding("The launch failed twice");
        assert_eq!(u.emotion, EMOTION_NEGATIVE);
    }

    #[test]
    fn truncate_is_char_safe() {
        assert_eq!(truncate_chars("符文语义", 2), "符文");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
