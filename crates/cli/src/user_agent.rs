//! Named browser user-agent presets

use regex::Regex;

pub const DEFAULT_PRESET: &str = "chrome_windows";

pub const PRESETS: &[(&str, &str)] = &[
    (
        "chrome_windows",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    ),
    (
        "chrome_mac",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36",
    ),
    (
        "chrome_android",
        "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Mobile Safari/537.36",
    ),
    (
        "chrome_ios",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) CriOS/120.0.0.0 Mobile/15E148 Safari/604.1",
    ),
    (
        "edge_windows",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 Edg/120.0",
    ),
    (
        "safari_mac",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_0) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    ),
    (
        "safari_ios",
        "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1",
    ),
    (
        "firefox_windows",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:119.0) Gecko/20100101 Firefox/119.0",
    ),
    (
        "firefox_mac",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 13.0; rv:119.0) Gecko/20100101 Firefox/119.0",
    ),
    (
        "opera_windows",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36 OPR/110.0",
    ),
];

/// Lowercase `name` and collapse every run of non-alphanumerics into `_`.
pub fn normalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    match Regex::new("[^a-z0-9]+") {
        Ok(re) => re.replace_all(&lowered, "_").into_owned(),
        Err(_) => lowered,
    }
}

pub fn preset(name: &str) -> Option<&'static str> {
    let key = normalize(name);
    PRESETS
        .iter()
        .find(|(preset, _)| *preset == key)
        .map(|(_, ua)| *ua)
}

/// Resolve a preset name to its user-agent string. Unknown names are
/// taken to be a literal user agent.
pub fn resolve(name: Option<&str>) -> String {
    match name {
        None | Some("") => preset(DEFAULT_PRESET).unwrap_or_default().to_string(),
        Some(name) => preset(name).map(str::to_string).unwrap_or_else(|| name.to_string()),
    }
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|(name, _)| *name).collect()
}
