//! Unknown-key detection for config files.
//!
//! The raw TOML is walked before serde deserialization; any key that does not
//! exist in [`StreamConfig`](super::StreamConfig) produces a warning with a
//! "did you mean?" suggestion. Warnings never reject a file.

use std::collections::HashSet;

/// A non-fatal config warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown config key '{}'", self.field)?;
        if let Some(ref s) = self.suggestion {
            write!(f, "; did you mean '{s}'?")?;
        }
        Ok(())
    }
}

/// Every valid dotted key path. Keep in sync with `stream_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    [
        "window",
        "window.horizon_ms",
        "schedule",
        "schedule.ingest_interval_ms",
        "schedule.render_interval_ms",
        "source",
        "source.read_timeout_ms",
        "source.max_read_bytes",
        "source.max_fragment_bytes",
        "source.replay_chunk_bytes",
        "recording",
        "recording.output_dir",
        "recording.file_prefix",
        "recording.format",
        "recording.overwrite",
        "render",
        "render.channels",
    ]
    .into_iter()
    .collect()
}

/// Collect dotted paths of every key in a TOML tree.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let Some(table) = value.as_table() else {
        return Vec::new();
    };
    let mut keys = Vec::new();
    for (k, v) in table {
        let path = if prefix.is_empty() {
            k.clone()
        } else {
            format!("{prefix}.{k}")
        };
        if v.is_table() {
            keys.extend(walk_toml_keys(v, &path));
        }
        keys.push(path);
    }
    keys
}

/// Edit distance between two keys.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitute = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitute.min(row[j] + 1).min(row[j + 1] + 1);
        }
    }

    row[b.len()]
}

/// Closest known key within a small edit distance.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let max_distance = (unknown.len() / 4).clamp(1, 3);
    known
        .iter()
        .map(|k| (levenshtein(unknown, k), *k))
        .filter(|(d, _)| *d <= max_distance)
        .min()
        .map(|(_, k)| k.to_string())
}

/// Warn about keys in `raw_toml` that the config does not define.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    // Syntax errors are reported by the serde pass
    let Ok(value) = raw_toml.parse::<toml::Value>() else {
        return Vec::new();
    };

    let known = known_config_keys();
    let mut warnings: Vec<ValidationWarning> = walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            field: key,
        })
        .collect();
    warnings.sort_by(|a, b| a.field.cmp(&b.field));
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("horizon_ms", "horizon_ms"), 0);
        assert_eq!(levenshtein("horizn_ms", "horizon_ms"), 1);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
    }

    #[test]
    fn test_typo_key_suggests_correction() {
        let warnings = validate_unknown_keys("[window]\nhorizn_ms = 5000.0\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "window.horizn_ms");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("window.horizon_ms"));
        assert!(warnings[0].to_string().contains("did you mean 'window.horizon_ms'"));
    }

    #[test]
    fn test_valid_keys_produce_no_warnings() {
        let text = r#"
            [window]
            horizon_ms = 10000.0
            [schedule]
            ingest_interval_ms = 10
            render_interval_ms = 100
            [recording]
            format = "csv"
            overwrite = true
            [render]
            channels = ["p1"]
        "#;
        assert!(validate_unknown_keys(text).is_empty());
    }

    #[test]
    fn test_unknown_section_without_suggestion() {
        let warnings = validate_unknown_keys("[plotting]\ncolor = \"red\"\n");
        let fields: Vec<&str> = warnings.iter().map(|w| w.field.as_str()).collect();
        assert_eq!(fields, vec!["plotting", "plotting.color"]);
        assert!(warnings.iter().all(|w| w.suggestion.is_none()));
    }

    #[test]
    fn test_default_config_keys_are_all_known() {
        let text = crate::config::StreamConfig::default().to_toml().unwrap();
        assert!(validate_unknown_keys(&text).is_empty());
    }
}
