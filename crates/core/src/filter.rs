//! Test selection pipeline
//!
//! Every stage takes the survivors of the previous one and returns them
//! split into `filtered` and `skipped`, so a test is skipped by at most one
//! stage. [`select`] runs the stages in their fixed order.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::error::Result;
use crate::snapshot::Snapshot;
use crate::types::{Phase, SkipReason, SkippedTest, TestCase};

/// Selection settings, usually taken from the [`RunConfig`]
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub tags: Vec<String>,
    pub filter: Option<String>,
    pub happy: bool,
    pub randomize: bool,
    pub seed: Option<u64>,
    pub snapshot_file: Option<PathBuf>,
}

impl From<&RunConfig> for FilterOptions {
    fn from(config: &RunConfig) -> Self {
        Self {
            tags: config.tags.clone(),
            filter: config.filter.clone(),
            happy: config.happy,
            randomize: config.randomize,
            seed: config.seed,
            snapshot_file: config.snapshot_file.clone(),
        }
    }
}

/// Output of a single stage
#[derive(Debug, Default)]
pub struct Stage {
    pub filtered: Vec<TestCase>,
    pub skipped: Vec<SkippedTest>,
}

impl Stage {
    fn keep_all(tests: Vec<TestCase>) -> Self {
        Self {
            filtered: tests,
            skipped: Vec::new(),
        }
    }

    fn partition(
        tests: Vec<TestCase>,
        reason: SkipReason,
        keep: impl Fn(&TestCase) -> bool,
    ) -> Self {
        let mut stage = Stage::default();
        for test in tests {
            if keep(&test) {
                stage.filtered.push(test);
            } else {
                stage.skipped.push(SkippedTest::new(&test, reason.clone()));
            }
        }
        stage
    }
}

/// Final selection handed to the scheduler
#[derive(Debug, Default)]
pub struct Selection {
    pub tests: Vec<TestCase>,
    pub skipped: Vec<SkippedTest>,
}

/// Parsed form of the `filter` option
#[derive(Debug, Clone)]
pub enum MetaFilter {
    Happy,
    Failures,
    Name(Regex),
}

impl MetaFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        let pattern = raw.trim();
        match pattern.to_ascii_lowercase().as_str() {
            "happy" => Ok(MetaFilter::Happy),
            "failures" => Ok(MetaFilter::Failures),
            _ => Ok(MetaFilter::Name(
                RegexBuilder::new(pattern).case_insensitive(true).build()?,
            )),
        }
    }
}

/// Materialize `repeat` and `bombard` clones.
///
/// `X` with `repeat: 1, bombard: 1` becomes `X`, `(Bombard 2) X`,
/// `(Run 2) X` and `(Bombard 2) (Run 2) X`.
pub fn expand(tests: Vec<TestCase>) -> Vec<TestCase> {
    let mut expanded = Vec::with_capacity(tests.len());
    for test in tests {
        let mut offset = 0;
        let runs: Vec<TestCase> = (1..=test.repeat + 1)
            .map(|run| {
                if run == 1 {
                    test.clone()
                } else {
                    offset += 1;
                    test.duplicate(format!("(Run {run}) {}", test.name), offset)
                }
            })
            .collect();

        for run in runs {
            let bombard = run.bombard;
            expanded.push(run.clone());
            for bomb in 2..=bombard + 1 {
                offset += 1;
                let name = format!("(Bombard {bomb}) {}", run.name);
                expanded.push(test.duplicate(name, offset));
            }
        }
    }
    expanded
}

/// Only focused tests survive when at least one is focused.
pub fn by_focus(tests: Vec<TestCase>) -> Stage {
    if !tests.iter().any(|t| t.focus) {
        return Stage::keep_all(tests);
    }
    Stage::partition(tests, SkipReason::NotFocused, |t| t.focus)
}

pub fn by_tags(tests: Vec<TestCase>, tags: &[String]) -> Stage {
    if tags.is_empty() {
        return Stage::keep_all(tests);
    }
    Stage::partition(tests, SkipReason::TagMismatch, |t| t.has_tag(tags))
}

pub fn by_name(tests: Vec<TestCase>, pattern: &Regex) -> Stage {
    Stage::partition(tests, SkipReason::NameMismatch, |t| pattern.is_match(&t.name))
}

/// Keep tests that did not pass in the snapshot. A missing or unreadable
/// snapshot leaves the list untouched.
pub fn by_failures(tests: Vec<TestCase>, snapshot_file: Option<&PathBuf>) -> Stage {
    let Some(path) = snapshot_file else {
        return Stage::keep_all(tests);
    };
    let snapshot = match Snapshot::load(path) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => return Stage::keep_all(tests),
        Err(e) => {
            warn!("Ignoring unreadable snapshot {}: {}", path.display(), e);
            return Stage::keep_all(tests);
        }
    };
    let failing = snapshot.failing_names();
    Stage::partition(tests, SkipReason::NotPreviouslyFailing, |t| failing.contains(&t.name))
}

pub fn by_happy(tests: Vec<TestCase>, happy: bool) -> Stage {
    if !happy {
        return Stage::keep_all(tests);
    }
    Stage::partition(tests, SkipReason::NotHappyPath, TestCase::is_happy_path)
}

pub fn drop_explicit_skips(tests: Vec<TestCase>) -> Stage {
    Stage::partition(tests, SkipReason::Explicit, |t| !t.skip)
}

/// Fisher-Yates shuffle, deterministic when `seed` is given.
pub fn shuffle(tests: &mut [TestCase], seed: Option<u64>) {
    match seed {
        Some(seed) => tests.shuffle(&mut StdRng::seed_from_u64(seed)),
        None => tests.shuffle(&mut rand::thread_rng()),
    }
}

/// Stable sort by `order`; unordered tests follow the ordered ones.
pub fn sort_by_order(tests: &mut [TestCase]) {
    if tests.iter().all(|t| t.order.is_none()) {
        return;
    }
    tests.sort_by_key(|t| (t.order.is_none(), t.order.unwrap_or(0)));
}

/// Turn phases into dependency edges: main tests wait for every setup test,
/// teardown tests wait for every main test.
pub fn synthesize_phase_dependencies(tests: &mut [TestCase]) {
    let ids_of = |phase: Phase, tests: &[TestCase]| {
        let mut seen = HashSet::new();
        tests
            .iter()
            .filter(|t| t.phase == phase)
            .filter(|t| seen.insert(t.operation_id.clone()))
            .map(|t| t.operation_id.clone())
            .collect::<Vec<_>>()
    };
    let setup_ids = ids_of(Phase::Setup, tests);
    let main_ids = ids_of(Phase::Main, tests);

    for test in tests.iter_mut() {
        let required = match test.phase {
            Phase::Setup => continue,
            Phase::Main => &setup_ids,
            Phase::Teardown => &main_ids,
        };
        for id in required {
            if !test.depends_on.contains(id) {
                test.depends_on.push(id.clone());
            }
        }
    }
}

/// Run the whole pipeline over a flat, validated test list.
pub fn select(tests: Vec<TestCase>, options: &FilterOptions) -> Result<Selection> {
    let meta = options.filter.as_deref().map(MetaFilter::parse).transpose()?;
    let mut skipped = Vec::new();
    let mut collect = |stage: Stage| {
        skipped.extend(stage.skipped);
        stage.filtered
    };

    let tests = expand(tests);
    let tests = collect(by_focus(tests));
    let tests = collect(by_tags(tests, &options.tags));
    let tests = match &meta {
        Some(MetaFilter::Name(pattern)) => collect(by_name(tests, pattern)),
        Some(MetaFilter::Failures) => collect(by_failures(tests, options.snapshot_file.as_ref())),
        Some(MetaFilter::Happy) | None => tests,
    };
    let happy = options.happy || matches!(meta, Some(MetaFilter::Happy));
    let tests = collect(by_happy(tests, happy));
    let mut tests = collect(drop_explicit_skips(tests));

    if options.randomize {
        shuffle(&mut tests, options.seed);
    } else {
        sort_by_order(&mut tests);
    }
    synthesize_phase_dependencies(&mut tests);

    debug!("Selected {} tests, {} skipped", tests.len(), skipped.len());
    Ok(Selection { tests, skipped })
}
