//! Human-readable cache report and its editable settings section
//!
//! ```text
//! ---- [String Key Caches] ----
//! base model: ckpt
//!
//! ---- [Number Key Caches] ----
//! 7: N/A(tag)
//!
//! ---- [TagCache Settings] ----
//! ckpt: 2
//! ```
//!
//! Only the settings section is read back. Unconfigured buckets are listed
//! there with their current size, so feeding an unedited report back bounds
//! them at that size.

use crate::cache::{TagSettings, TaggedCache};
use crate::error::{BackendError, Result};
use crate::key::CacheKey;

pub const STRING_KEYS_HEADER: &str = "---- [String Key Caches] ----";
pub const NUMBER_KEYS_HEADER: &str = "---- [Number Key Caches] ----";
pub const SETTINGS_HEADER: &str = "---- [TagCache Settings] ----";

const EMPTY_TAG_LABEL: &str = "N/A(tag)";

/// Render the three-section report
pub fn render<V>(cache: &TaggedCache<V>) -> String {
    let mut text_keys = format!("{}\n", STRING_KEYS_HEADER);
    let mut number_keys = format!("{}\n", NUMBER_KEYS_HEADER);

    for (key, tag, _) in cache.items() {
        let tag = if tag.is_empty() { EMPTY_TAG_LABEL } else { tag };
        match key {
            CacheKey::Text(k) => text_keys.push_str(&format!("{}: {}\n", k, tag)),
            CacheKey::Number(n) => number_keys.push_str(&format!("{}: {}\n", n, tag)),
        }
    }

    let mut settings = format!("{}\n", SETTINGS_HEADER);
    for (tag, capacity) in cache.settings().iter() {
        settings.push_str(&format!("{}: {}\n", tag, capacity));
    }
    for (tag, bucket) in cache.buckets() {
        if cache.settings().capacity(tag).is_none() {
            settings.push_str(&format!("{}: {}\n", tag, bucket.len()));
        }
    }

    format!("{}\n{}\n{}", text_keys, number_keys, settings)
}

/// Parse `tag: capacity` lines after the last settings header
///
/// Text without a header is treated as the settings section itself. Blank
/// lines are skipped; anything else must parse or the whole call fails.
pub fn parse_settings(text: &str) -> Result<TagSettings> {
    let section = text.rsplit(SETTINGS_HEADER).next().unwrap_or(text);

    let mut settings = TagSettings::new();
    for (idx, line) in section.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (tag, capacity) = line.rsplit_once(':').ok_or_else(|| BackendError::Settings {
            line: idx + 1,
            reason: format!("expected 'tag: capacity', got '{}'", line),
        })?;

        let capacity = capacity.trim();
        let capacity: usize = capacity.parse().map_err(|e| BackendError::Settings {
            line: idx + 1,
            reason: format!("invalid capacity '{}': {}", capacity, e),
        })?;

        settings.set(tag.trim(), capacity);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Payload;

    fn cache_with_entries() -> TaggedCache<u32> {
        let mut settings = TagSettings::new();
        settings.set("ckpt", 2);
        let mut cache = TaggedCache::new(settings);
        cache
            .put(CacheKey::from("base model"), "ckpt", Payload::Single(1))
            .unwrap();
        cache
            .put(CacheKey::from(7u64), "", Payload::Single(2))
            .unwrap();
        cache
            .put(CacheKey::from("girl latent"), "latent", Payload::List(vec![3, 4]))
            .unwrap();
        cache
    }

    #[test]
    fn test_render_sections() {
        let report = render(&cache_with_entries());

        let expected = "\
---- [String Key Caches] ----
base model: ckpt
girl latent: latent

---- [Number Key Caches] ----
7: N/A(tag)

---- [TagCache Settings] ----
ckpt: 2
: 1
latent: 1
";
        assert_eq!(report, expected);
    }

    #[test]
    fn test_render_empty_cache() {
        let cache: TaggedCache<u32> = TaggedCache::new(TagSettings::new());
        assert_eq!(
            render(&cache),
            format!(
                "{}\n\n{}\n\n{}\n",
                STRING_KEYS_HEADER, NUMBER_KEYS_HEADER, SETTINGS_HEADER
            )
        );
    }

    #[test]
    fn test_parse_rendered_report() {
        let cache = cache_with_entries();
        let settings = parse_settings(&render(&cache)).unwrap();

        assert_eq!(settings.capacity("ckpt"), Some(2));
        assert_eq!(settings.capacity("latent"), Some(1));
        assert_eq!(settings.capacity(""), Some(1));
    }

    #[test]
    fn test_parse_edited_settings() {
        let text = format!(
            "{}\nold: ckpt\n\n{}\n\n{}\nckpt: 5\n  controlnet :  3 \n\n",
            STRING_KEYS_HEADER, NUMBER_KEYS_HEADER, SETTINGS_HEADER
        );
        let settings = parse_settings(&text).unwrap();

        assert_eq!(settings.len(), 2);
        assert_eq!(settings.capacity("ckpt"), Some(5));
        assert_eq!(settings.capacity("controlnet"), Some(3));
    }

    #[test]
    fn test_parse_missing_colon_is_error() {
        let text = format!("{}\nckpt 5\n", SETTINGS_HEADER);
        let err = parse_settings(&text).unwrap_err();
        assert!(matches!(err, BackendError::Settings { line: 2, .. }));
    }

    #[test]
    fn test_parse_non_integer_capacity_is_error() {
        for bad in ["ckpt: five", "ckpt: -1", "ckpt: 2.5", "ckpt:"] {
            let text = format!("{}\n{}\n", SETTINGS_HEADER, bad);
            assert!(parse_settings(&text).is_err(), "accepted '{}'", bad);
        }
    }

    #[test]
    fn test_parse_tag_containing_colon() {
        let text = format!("{}\nsd:xl: 2\n", SETTINGS_HEADER);
        let settings = parse_settings(&text).unwrap();
        assert_eq!(settings.capacity("sd:xl"), Some(2));
    }
}
