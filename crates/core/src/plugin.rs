//! Plugin registry and lifecycle dispatch
//!
//! Plugins register handlers against named extension points during a
//! one-time setup. Transform hooks (`on_prepare`, `on_fetch`) are chained in
//! registration order, each receiving the previous output. Observer hooks are
//! awaited one after another; any handler error aborts the run.

use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::HttpRequest;
use crate::types::{RunReport, Suite, TestCase, TestResult};

/// A named bundle of hook registrations.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    async fn setup(&self, ctx: &mut PluginContext) -> Result<()>;
}

/// Suite discovery: returns the suites found at `path`, or `None` to decline.
#[async_trait]
pub trait LoadHook: Send + Sync {
    async fn load(&self, path: &Path) -> Result<Option<Vec<Suite>>>;
}

/// Suite-list transform applied before filtering.
#[async_trait]
pub trait PrepareHook: Send + Sync {
    async fn prepare(&self, suites: Vec<Suite>) -> Result<Vec<Suite>>;
}

#[async_trait]
impl<F> PrepareHook for F
where
    F: Fn(Vec<Suite>) -> Result<Vec<Suite>> + Send + Sync,
{
    async fn prepare(&self, suites: Vec<Suite>) -> Result<Vec<Suite>> {
        self(suites)
    }
}

/// Request transform applied right before the transport.
#[async_trait]
pub trait FetchHook: Send + Sync {
    async fn fetch(&self, request: HttpRequest) -> Result<HttpRequest>;
}

#[async_trait]
impl<F> FetchHook for F
where
    F: Fn(HttpRequest) -> Result<HttpRequest> + Send + Sync,
{
    async fn fetch(&self, request: HttpRequest) -> Result<HttpRequest> {
        self(request)
    }
}

#[async_trait]
pub trait RunStartHook: Send + Sync {
    async fn on_run_start(&self) -> Result<()>;
}

#[async_trait]
impl<F> RunStartHook for F
where
    F: Fn() -> Result<()> + Send + Sync,
{
    async fn on_run_start(&self) -> Result<()> {
        self()
    }
}

#[async_trait]
pub trait RunEndHook: Send + Sync {
    async fn on_run_end(&self, report: &RunReport) -> Result<()>;
}

#[async_trait]
impl<F> RunEndHook for F
where
    F: Fn(&RunReport) -> Result<()> + Send + Sync,
{
    async fn on_run_end(&self, report: &RunReport) -> Result<()> {
        self(report)
    }
}

#[async_trait]
pub trait TestStartHook: Send + Sync {
    async fn on_test_start(&self, test: &TestCase) -> Result<()>;
}

#[async_trait]
impl<F> TestStartHook for F
where
    F: Fn(&TestCase) -> Result<()> + Send + Sync,
{
    async fn on_test_start(&self, test: &TestCase) -> Result<()> {
        self(test)
    }
}

#[async_trait]
pub trait TestEndHook: Send + Sync {
    async fn on_test_end(&self, test: &TestCase, result: &TestResult) -> Result<()>;
}

#[async_trait]
impl<F> TestEndHook for F
where
    F: Fn(&TestCase, &TestResult) -> Result<()> + Send + Sync,
{
    async fn on_test_end(&self, test: &TestCase, result: &TestResult) -> Result<()> {
        self(test, result)
    }
}

/// A handler together with the plugin that registered it
struct Registered<H: ?Sized> {
    plugin: String,
    handler: Arc<H>,
}

impl<H: ?Sized> Clone for Registered<H> {
    fn clone(&self) -> Self {
        Self {
            plugin: self.plugin.clone(),
            handler: self.handler.clone(),
        }
    }
}

struct LoadRegistration {
    filter: Regex,
    hook: Registered<dyn LoadHook>,
}

/// Registration surface handed to [`Plugin::setup`]
#[derive(Default)]
pub struct PluginContext {
    current: String,
    on_load: Option<LoadRegistration>,
    on_prepare: Vec<Registered<dyn PrepareHook>>,
    on_fetch: Vec<Registered<dyn FetchHook>>,
    on_run_start: Vec<Registered<dyn RunStartHook>>,
    on_run_end: Vec<Registered<dyn RunEndHook>>,
    on_test_start: Vec<Registered<dyn TestStartHook>>,
    on_test_end: Vec<Registered<dyn TestEndHook>>,
}

impl PluginContext {
    fn entry<H: ?Sized>(&self, handler: Arc<H>) -> Registered<H> {
        Registered {
            plugin: self.current.clone(),
            handler,
        }
    }

    /// Replace the active suite loader; only paths matching `filter` are offered.
    pub fn on_load(&mut self, filter: Regex, hook: impl LoadHook + 'static) {
        let hook = self.entry(Arc::new(hook) as Arc<dyn LoadHook>);
        self.on_load = Some(LoadRegistration { filter, hook });
    }

    pub fn on_prepare(&mut self, hook: impl PrepareHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn PrepareHook>);
        self.on_prepare.push(entry);
    }

    pub fn on_fetch(&mut self, hook: impl FetchHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn FetchHook>);
        self.on_fetch.push(entry);
    }

    pub fn on_run_start(&mut self, hook: impl RunStartHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn RunStartHook>);
        self.on_run_start.push(entry);
    }

    pub fn on_run_end(&mut self, hook: impl RunEndHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn RunEndHook>);
        self.on_run_end.push(entry);
    }

    pub fn on_test_start(&mut self, hook: impl TestStartHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn TestStartHook>);
        self.on_test_start.push(entry);
    }

    pub fn on_test_end(&mut self, hook: impl TestEndHook + 'static) {
        let entry = self.entry(Arc::new(hook) as Arc<dyn TestEndHook>);
        self.on_test_end.push(entry);
    }
}

/// Owns the plugins of a run and dispatches every extension point.
pub struct PluginHost {
    plugins: Vec<Arc<dyn Plugin>>,
    hooks: PluginContext,
    ready: bool,
}

impl Default for PluginHost {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PluginHost {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self {
            plugins,
            hooks: PluginContext::default(),
            ready: false,
        }
    }

    /// Run every plugin's setup once, in registration order.
    pub async fn setup(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }
        for plugin in &self.plugins {
            debug!("Setting up plugin: {}", plugin.name());
            self.hooks.current = plugin.name().to_string();
            plugin
                .setup(&mut self.hooks)
                .await
                .map_err(|e| Error::plugin(plugin.name(), e))?;
        }
        self.hooks.current.clear();
        self.ready = true;
        Ok(())
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Offer `path` to the active loader. `None` when no loader accepts it.
    pub async fn load_suites(&self, path: &Path) -> Result<Option<Vec<Suite>>> {
        let Some(registration) = &self.hooks.on_load else {
            return Ok(None);
        };
        if !registration.filter.is_match(&path.to_string_lossy()) {
            return Ok(None);
        }
        registration
            .hook
            .handler
            .load(path)
            .await
            .map_err(|e| Error::plugin(&registration.hook.plugin, e))
    }

    pub async fn prepare_suites(&self, suites: Vec<Suite>) -> Result<Vec<Suite>> {
        let mut suites = suites;
        for entry in &self.hooks.on_prepare {
            suites = entry
                .handler
                .prepare(suites)
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(suites)
    }

    pub async fn transform_request(&self, request: HttpRequest) -> Result<HttpRequest> {
        let mut request = request;
        for entry in &self.hooks.on_fetch {
            request = entry
                .handler
                .fetch(request)
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(request)
    }

    pub async fn run_start(&self) -> Result<()> {
        for entry in &self.hooks.on_run_start {
            entry
                .handler
                .on_run_start()
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(())
    }

    pub async fn run_end(&self, report: &RunReport) -> Result<()> {
        for entry in &self.hooks.on_run_end {
            entry
                .handler
                .on_run_end(report)
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(())
    }

    pub async fn test_start(&self, test: &TestCase) -> Result<()> {
        for entry in &self.hooks.on_test_start {
            entry
                .handler
                .on_test_start(test)
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(())
    }

    pub async fn test_end(&self, test: &TestCase, result: &TestResult) -> Result<()> {
        for entry in &self.hooks.on_test_end {
            entry
                .handler
                .on_test_end(test, result)
                .await
                .map_err(|e| Error::plugin(&entry.plugin, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::path::PathBuf;

    struct Tagger {
        name: &'static str,
        header: &'static str,
    }

    #[async_trait]
    impl Plugin for Tagger {
        fn name(&self) -> &str {
            self.name
        }

        async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
            let header = self.header;
            ctx.on_fetch(move |mut request: HttpRequest| -> Result<HttpRequest> {
                let trail = request.header("x-trail").unwrap_or_default().to_string();
                request.set_header("x-trail", format!("{trail}{header}"));
                Ok(request)
            });
            Ok(())
        }
    }

    struct StaticLoader {
        name: &'static str,
        suite: &'static str,
    }

    #[async_trait]
    impl LoadHook for StaticLoader {
        async fn load(&self, _path: &Path) -> Result<Option<Vec<Suite>>> {
            Ok(Some(vec![Suite::new(self.suite, Vec::new())]))
        }
    }

    #[async_trait]
    impl Plugin for StaticLoader {
        fn name(&self) -> &str {
            self.name
        }

        async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
            ctx.on_load(
                Regex::new(r"\.json$").unwrap(),
                StaticLoader {
                    name: self.name,
                    suite: self.suite,
                },
            );
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Plugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
            ctx.on_run_start(|| -> Result<()> { Err(Error::Internal("observer broke".into())) });
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fetch_hooks_compose_in_registration_order() {
        let mut host = PluginHost::new(vec![
            Arc::new(Tagger { name: "a", header: "A" }),
            Arc::new(Tagger { name: "b", header: "B" }),
        ]);
        host.setup().await.unwrap();
        assert_eq!(host.plugin_names(), vec!["a", "b"]);

        let request = host
            .transform_request(HttpRequest::new("GET", "/"))
            .await
            .unwrap();
        assert_eq!(request.header("x-trail"), Some("AB"));
    }

    #[tokio::test]
    async fn test_last_loader_wins_and_filter_applies() {
        let mut host = PluginHost::new(vec![
            Arc::new(StaticLoader { name: "first", suite: "one" }),
            Arc::new(StaticLoader { name: "second", suite: "two" }),
        ]);
        host.setup().await.unwrap();

        let suites = host
            .load_suites(&PathBuf::from("users.suite.json"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(suites[0].name, "two");

        let declined = host.load_suites(&PathBuf::from("notes.txt")).await.unwrap();
        assert!(declined.is_none());
    }

    #[tokio::test]
    async fn test_observer_error_is_fatal_and_names_plugin() {
        let mut host = PluginHost::new(vec![Arc::new(Failing)]);
        host.setup().await.unwrap();

        let err = host.run_start().await.unwrap_err();
        match err {
            Error::Plugin { plugin, message } => {
                assert_eq!(plugin, "failing");
                assert!(message.contains("observer broke"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_observers_run_in_order() {
        struct Recorder(Arc<Mutex<Vec<String>>>);

        #[async_trait]
        impl Plugin for Recorder {
            fn name(&self) -> &str {
                "recorder"
            }

            async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
                let first = self.0.clone();
                ctx.on_test_start(move |test: &TestCase| -> Result<()> {
                    first.lock().push(format!("start:{}", test.name));
                    Ok(())
                });
                let second = self.0.clone();
                ctx.on_test_start(move |test: &TestCase| -> Result<()> {
                    second.lock().push(format!("again:{}", test.name));
                    Ok(())
                });
                Ok(())
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let mut host = PluginHost::new(vec![Arc::new(Recorder(log.clone()))]);
        host.setup().await.unwrap();
        host.setup().await.unwrap();

        host.test_start(&TestCase::new("t1", "/")).await.unwrap();
        assert_eq!(*log.lock(), vec!["start:t1".to_string(), "again:t1".to_string()]);
    }

    #[tokio::test]
    async fn test_prepare_chain() {
        struct Renamer;

        #[async_trait]
        impl Plugin for Renamer {
            fn name(&self) -> &str {
                "renamer"
            }

            async fn setup(&self, ctx: &mut PluginContext) -> Result<()> {
                ctx.on_prepare(|mut suites: Vec<Suite>| -> Result<Vec<Suite>> {
                    suites.retain(|s| s.name != "drop-me");
                    Ok(suites)
                });
                ctx.on_prepare(|suites: Vec<Suite>| -> Result<Vec<Suite>> {
                    Ok(suites
                        .into_iter()
                        .map(|mut s| {
                            s.name = s.name.to_uppercase();
                            s
                        })
                        .collect())
                });
                Ok(())
            }
        }

        let mut host = PluginHost::new(vec![Arc::new(Renamer)]);
        host.setup().await.unwrap();

        let suites = host
            .prepare_suites(vec![
                Suite::new("keep", Vec::new()),
                Suite::new("drop-me", Vec::new()),
            ])
            .await
            .unwrap();
        let names: Vec<&str> = suites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["KEEP"]);
    }
}
