//! Naming conventions shared by resource declarations and row models.
//!
//! Resource `post` maps to type name `posts` and model `Post`; model
//! `Admin::BlogPost` resolves back to resource `blog_post`. The rules cover
//! regular English plurals plus a short irregular table.

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("child", "children"),
    ("man", "men"),
    ("woman", "women"),
    ("mouse", "mice"),
];

const UNCOUNTABLE: &[&str] = &["equipment", "information", "news", "series", "species"];

/// Returns the plural form of a lowercase word (`comment` -> `comments`).
#[must_use]
pub fn pluralize(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    let (prefix, last) = split_last_segment(word);
    if let Some((_, plural)) = IRREGULAR.iter().find(|(s, _)| *s == last) {
        return format!("{prefix}{plural}");
    }
    if IRREGULAR.iter().any(|(_, p)| *p == last) {
        return word.to_string();
    }
    let plural = if last.ends_with('y') && !ends_with_vowel_y(last) {
        format!("{}ies", &last[..last.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| last.ends_with(s)) {
        format!("{last}es")
    } else {
        format!("{last}s")
    };
    format!("{prefix}{plural}")
}

/// Returns the singular form of a lowercase word (`comments` -> `comment`).
#[must_use]
pub fn singularize(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    let (prefix, last) = split_last_segment(word);
    if let Some((singular, _)) = IRREGULAR.iter().find(|(_, p)| *p == last) {
        return format!("{prefix}{singular}");
    }
    if IRREGULAR.iter().any(|(s, _)| *s == last) {
        return word.to_string();
    }
    let singular = if let Some(stem) = last.strip_suffix("ies") {
        format!("{stem}y")
    } else if let Some(stem) = ["ches", "shes", "sses", "xes", "zes"]
        .iter()
        .find_map(|suffix| last.strip_suffix(suffix).map(|s| (s, suffix)))
        .map(|(stem, suffix)| format!("{stem}{}", &suffix[..suffix.len() - 2]))
    {
        stem
    } else if last.ends_with("ss") {
        last.to_string()
    } else if let Some(stem) = last.strip_suffix('s') {
        stem.to_string()
    } else {
        last.to_string()
    };
    format!("{prefix}{singular}")
}

/// Converts `blog_post` to `BlogPost` and `admin/blog_post` to `Admin::BlogPost`.
#[must_use]
pub fn camelize(word: &str) -> String {
    word.split('/')
        .map(|segment| {
            segment
                .split('_')
                .filter(|part| !part.is_empty())
                .map(|part| {
                    let mut chars = part.chars();
                    chars.next().map_or_else(String::new, |first| {
                        first.to_uppercase().chain(chars).collect()
                    })
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("::")
}

/// Converts `BlogPost` to `blog_post` and `Admin::BlogPost` to `admin/blog_post`.
#[must_use]
pub fn underscore(word: &str) -> String {
    let mut out = String::with_capacity(word.len() + 4);
    let mut prev_lower = false;
    for (i, segment) in word.split("::").enumerate() {
        if i > 0 {
            out.push('/');
            prev_lower = false;
        }
        for ch in segment.chars() {
            if ch.is_uppercase() {
                if prev_lower {
                    out.push('_');
                }
                out.extend(ch.to_lowercase());
                prev_lower = false;
            } else {
                out.push(ch);
                prev_lower = ch.is_alphanumeric();
            }
        }
    }
    out
}

/// Strips any module path: `Admin::BlogPost` -> `BlogPost`.
#[must_use]
pub fn demodulize(word: &str) -> &str {
    word.rsplit("::").next().unwrap_or(word)
}

/// Converts a plural type name to a model name: `blog_posts` -> `BlogPost`.
#[must_use]
pub fn classify(word: &str) -> String {
    camelize(&singularize(word))
}

fn split_last_segment(word: &str) -> (&str, &str) {
    match word.rfind('_') {
        Some(idx) => word.split_at(idx + 1),
        None => ("", word),
    }
}

fn ends_with_vowel_y(word: &str) -> bool {
    let mut chars = word.chars().rev();
    chars.next();
    matches!(chars.next(), Some('a' | 'e' | 'i' | 'o' | 'u'))
}
