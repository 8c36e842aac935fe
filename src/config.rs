use anyhow::Context;
use std::path::PathBuf;

pub const DEFAULT_ERROR_DISPLAY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Opened at startup when set; `workspace.select` can still switch it.
    pub workspace: Option<PathBuf>,
    /// Default for `strictColumns` on import requests.
    pub strict_columns: bool,
    /// How many row messages an import response renders.
    pub error_display_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace: None,
            strict_columns: false,
            error_display_limit: DEFAULT_ERROR_DISPLAY_LIMIT,
        }
    }
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{key} must be a boolean, got {other:?}"),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Config::default();
        if let Some(ws) = get("COURSEBOOK_WORKSPACE").filter(|s| !s.trim().is_empty()) {
            cfg.workspace = Some(PathBuf::from(ws));
        }
        if let Some(raw) = get("COURSEBOOK_STRICT_COLUMNS") {
            cfg.strict_columns = parse_bool("COURSEBOOK_STRICT_COLUMNS", &raw)?;
        }
        if let Some(raw) = get("COURSEBOOK_ERROR_DISPLAY_LIMIT") {
            cfg.error_display_limit = raw
                .trim()
                .parse()
                .with_context(|| format!("COURSEBOOK_ERROR_DISPLAY_LIMIT must be a number, got {raw:?}"))?;
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(cfg(&[]).expect("config"), Config::default());
    }

    #[test]
    fn reads_all_keys() {
        let c = cfg(&[
            ("COURSEBOOK_WORKSPACE", "/srv/courses"),
            ("COURSEBOOK_STRICT_COLUMNS", "Yes"),
            ("COURSEBOOK_ERROR_DISPLAY_LIMIT", " 5 "),
        ])
        .expect("config");
        assert_eq!(c.workspace, Some(PathBuf::from("/srv/courses")));
        assert!(c.strict_columns);
        assert_eq!(c.error_display_limit, 5);
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(cfg(&[("COURSEBOOK_STRICT_COLUMNS", "maybe")]).is_err());
        assert!(cfg(&[("COURSEBOOK_ERROR_DISPLAY_LIMIT", "-1")]).is_err());
    }
}
