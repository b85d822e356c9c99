//! Suite discovery and the built-in JSON/YAML suite loader

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use spectest_core::plugin::LoadHook;
use spectest_core::{Error, Phase, Plugin, PluginContext, PluginHost, Result, Suite, TestCase};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::CliConfig;

/// Files the built-in loader accepts
pub const SUITE_FILE_FILTER: &str = r"\.(suite|spectest)\.(json|ya?ml)$";

/// Contents of a suite file: a bare list of tests or a suite object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SuiteFile {
    Tests(Vec<TestCase>),
    Suite {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        tests: Vec<TestCase>,
        #[serde(default)]
        setup: Vec<TestCase>,
        #[serde(default)]
        teardown: Vec<TestCase>,
    },
}

/// Built-in `onLoad` plugin for `.suite`/`.spectest` JSON and YAML files.
///
/// Registered first, so any user plugin that registers a loader replaces it.
pub struct CoreLoader;

#[async_trait]
impl Plugin for CoreLoader {
    fn name(&self) -> &str {
        "core-loader"
    }

    async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
        ctx.on_load(Regex::new(SUITE_FILE_FILTER)?, SuiteFileLoader);
        Ok(())
    }
}

struct SuiteFileLoader;

#[async_trait]
impl LoadHook for SuiteFileLoader {
    async fn load(&self, path: &Path) -> Result<Option<Vec<Suite>>> {
        let content = tokio::fs::read_to_string(path).await?;
        let suite = parse_suite(path, &content)?;
        Ok(Some(vec![suite]))
    }
}

/// Suite name derived from the file name: `users.spectest.yaml` -> `users`
pub fn suite_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.strip_suffix(".spectest")
        .or_else(|| stem.strip_suffix(".suite"))
        .map(str::to_string)
        .unwrap_or(stem)
}

pub fn parse_suite(path: &Path, content: &str) -> Result<Suite> {
    let invalid = |e: &dyn std::fmt::Display| Error::Suite(format!("{}: {}", path.display(), e));

    let file: SuiteFile = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => serde_json::from_str(content).map_err(|e| invalid(&e))?,
        Some("yaml") | Some("yml") => serde_yaml::from_str(content).map_err(|e| invalid(&e))?,
        _ => return Err(invalid(&"unsupported suite file type")),
    };

    let (name, tests, setup, teardown) = match file {
        SuiteFile::Tests(tests) => (None, tests, Vec::new(), Vec::new()),
        SuiteFile::Suite {
            name,
            tests,
            setup,
            teardown,
        } => (name, tests, setup, teardown),
    };
    let name = name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| suite_name_for(path));

    // Tests declaring a phase inline join the matching list.
    let mut suite = Suite::new(name, Vec::new());
    suite.setup = setup;
    suite.teardown = teardown;
    for test in tests {
        match test.phase {
            Phase::Setup => suite.setup.push(test),
            Phase::Teardown => suite.teardown.push(test),
            Phase::Main => suite.tests.push(test),
        }
    }
    for test in suite.setup.iter_mut() {
        test.phase = Phase::Setup;
    }
    for test in suite.teardown.iter_mut() {
        test.phase = Phase::Teardown;
    }
    for test in suite
        .setup
        .iter_mut()
        .chain(suite.tests.iter_mut())
        .chain(suite.teardown.iter_mut())
    {
        test.suite_name = Some(suite.name.clone());
    }
    suite.load_path = Some(path.to_path_buf());
    Ok(suite)
}

/// Suite files for this invocation: the explicit suite file, or every file
/// under `test_dir` whose name matches `file_pattern`, sorted by path.
pub fn discover_suite_paths(config: &CliConfig) -> anyhow::Result<Vec<PathBuf>> {
    if let Some(file) = &config.suite_file {
        return Ok(vec![file.clone()]);
    }

    let pattern = Regex::new(&config.file_pattern)
        .with_context(|| format!("Invalid file pattern '{}'", config.file_pattern))?;
    if !config.test_dir.exists() {
        warn!("Test directory {} does not exist", config.test_dir.display());
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(&config.test_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| pattern.is_match(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();
    debug!("Discovered {} suite files", paths.len());
    Ok(paths)
}

/// Offer each path to the active loader and collect the suites it returns.
pub async fn load_suites(plugins: &PluginHost, paths: &[PathBuf]) -> Result<Vec<Suite>> {
    let mut suites = Vec::new();
    for path in paths {
        match plugins.load_suites(path).await? {
            Some(loaded) => {
                info!("Loaded {} suite(s) from {}", loaded.len(), path.display());
                suites.extend(loaded);
            }
            None => warn!("No loader accepted {}", path.display()),
        }
    }
    Ok(suites)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_suite_name_for() {
        assert_eq!(suite_name_for(Path::new("spec/users.spectest.json")), "users");
        assert_eq!(suite_name_for(Path::new("posts.suite.yaml")), "posts");
        assert_eq!(suite_name_for(Path::new("plain.json")), "plain");
    }

    #[test]
    fn test_parse_array_file() {
        let content = r#"[
            {"name": "list", "endpoint": "/users"},
            {"name": "seed", "endpoint": "/seed", "phase": "setup"}
        ]"#;
        let suite = parse_suite(Path::new("users.spectest.json"), content).unwrap();

        assert_eq!(suite.name, "users");
        assert_eq!(suite.tests.len(), 1);
        assert_eq!(suite.setup.len(), 1);
        assert_eq!(suite.tests[0].suite_name.as_deref(), Some("users"));
        assert_eq!(suite.load_path, Some(PathBuf::from("users.spectest.json")));
    }

    #[test]
    fn test_parse_yaml_suite_object() {
        let content = "
name: Posts API
setup:
  - name: login
    endpoint: /login
tests:
  - name: list posts
    endpoint: /posts
    tags: smoke
teardown:
  - name: logout
    endpoint: /logout
";
        let suite = parse_suite(Path::new("posts.suite.yml"), content).unwrap();
        assert_eq!(suite.name, "Posts API");
        assert_eq!(suite.setup[0].phase, Phase::Setup);
        assert_eq!(suite.teardown[0].phase, Phase::Teardown);
        assert_eq!(suite.tests[0].tags, vec!["smoke"]);
        assert_eq!(suite.teardown[0].suite_name.as_deref(), Some("Posts API"));
    }

    #[test]
    fn test_parse_invalid_file() {
        let err = parse_suite(Path::new("bad.suite.json"), "{not json").unwrap_err();
        assert!(matches!(err, Error::Suite(ref msg) if msg.starts_with("bad.suite.json")));
    }

    #[test]
    fn test_discover_sorted_matches() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.suite.json"), "[]").unwrap();
        std::fs::write(dir.path().join("a.spectest.yaml"), "[]").unwrap();
        std::fs::write(nested.join("c.suite.yml"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.json"), "[]").unwrap();

        let config = CliConfig {
            test_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let names: Vec<String> = discover_suite_paths(&config)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.spectest.yaml", "b.suite.json", "c.suite.yml"]);
    }

    #[test]
    fn test_explicit_suite_file_wins() {
        let config = CliConfig {
            suite_file: Some(PathBuf::from("one.suite.json")),
            test_dir: PathBuf::from("/does/not/exist"),
            ..Default::default()
        };
        assert_eq!(
            discover_suite_paths(&config).unwrap(),
            vec![PathBuf::from("one.suite.json")]
        );
    }

    #[tokio::test]
    async fn test_core_loader_through_plugin_host() {
        let dir = TempDir::new().unwrap();
        let accepted = dir.path().join("users.suite.json");
        let ignored = dir.path().join("users.txt");
        std::fs::write(&accepted, r#"{"tests": [{"name": "a", "endpoint": "/a"}]}"#).unwrap();
        std::fs::write(&ignored, "").unwrap();

        let mut host = PluginHost::new(vec![Arc::new(CoreLoader)]);
        host.setup().await.unwrap();

        let suites = load_suites(&host, &[accepted, ignored]).await.unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "users");
        assert_eq!(suites[0].tests[0].name, "a");
    }
}
