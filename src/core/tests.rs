use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::core::{Config, Container};
use crate::error::{ContainerError, Op, PluginError};
use crate::events::{Event, EventKind};
use crate::graph::{DisableReason, EdgeKind};
use crate::plugin::{
    Capability, CollectorBinding, Dependencies, ErrorSender, ErrorStream, Plugin, ProviderBinding, Service,
    error_channel,
};
use crate::policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
use crate::state::State;
use crate::subscribers::Subscribe;

type Log = Arc<StdMutex<Vec<String>>>;

fn record(log: &Log, what: &str, name: &str) {
    log.lock().expect("log").push(format!("{what}:{name}"));
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().expect("log").clone()
}

/// Configurable test plugin; `ID` gives every node its own concrete type.
struct Node<const ID: u8> {
    name: &'static str,
    log: Log,
    deps: Vec<Capability>,
    service: bool,
    hang_on_stop: bool,
    init_results: StdMutex<VecDeque<Result<(), PluginError>>>,
    serve_error: StdMutex<Option<PluginError>>,
    reporter: StdMutex<Option<ErrorSender>>,
    inits: AtomicU32,
}

impl<const ID: u8> Node<ID> {
    fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Arc::clone(log),
            deps: Vec::new(),
            service: false,
            hang_on_stop: false,
            init_results: StdMutex::new(VecDeque::new()),
            serve_error: StdMutex::new(None),
            reporter: StdMutex::new(None),
            inits: AtomicU32::new(0),
        }
    }

    fn needs<const DEP: u8>(mut self) -> Self {
        self.deps.push(Capability::of::<Node<DEP>>());
        self
    }

    fn serving(mut self) -> Self {
        self.service = true;
        self
    }

    fn hanging_on_stop(mut self) -> Self {
        self.hang_on_stop = true;
        self
    }

    fn init_results(self, results: impl IntoIterator<Item = Result<(), PluginError>>) -> Self {
        self.init_results.lock().expect("lock").extend(results);
        self
    }

    fn failing_serve(self, err: PluginError) -> Self {
        *self.serve_error.lock().expect("lock") = Some(err);
        self
    }

    /// Reports an incident through the stream handed out by the last `serve`.
    fn fail(&self, err: PluginError) {
        let reporter = self.reporter.lock().expect("lock");
        assert!(reporter.as_ref().expect("node is serving").try_report(err));
    }

    fn inits(&self) -> u32 {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<const ID: u8> Plugin for Node<ID> {
    fn name(&self) -> &str {
        self.name
    }

    fn dependencies(&self) -> Vec<Capability> {
        self.deps.clone()
    }

    async fn init(&self, deps: &Dependencies) -> Result<(), PluginError> {
        assert_eq!(deps.len(), self.deps.len());
        self.inits.fetch_add(1, Ordering::SeqCst);
        record(&self.log, "init", self.name);
        let next = self.init_results.lock().expect("lock").pop_front();
        next.unwrap_or(Ok(()))
    }

    fn service(&self) -> Option<&dyn Service> {
        self.service.then_some(self as &dyn Service)
    }
}

#[async_trait]
impl<const ID: u8> Service for Node<ID> {
    async fn serve(&self) -> ErrorStream {
        record(&self.log, "serve", self.name);
        let (tx, stream) = error_channel(4);
        let early = self.serve_error.lock().expect("lock").take();
        if let Some(err) = early {
            tx.try_report(err);
        }
        *self.reporter.lock().expect("lock") = Some(tx);
        stream
    }

    async fn stop(&self) -> Result<(), PluginError> {
        record(&self.log, "stop", self.name);
        if self.hang_on_stop {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

fn since(log: &Log, marker: usize) -> Vec<String> {
    entries(log)[marker..].to_vec()
}

#[tokio::test]
async fn lifecycle_follows_dependency_order() {
    let log = Log::default();
    let container = Container::new(Config::default());
    // Registered out of order on purpose.
    container
        .register(Node::<2>::new("c", &log).needs::<1>().serving())
        .await
        .expect("register c");
    container
        .register(Node::<0>::new("a", &log).serving())
        .await
        .expect("register a");
    container
        .register(Node::<1>::new("b", &log).needs::<0>().serving())
        .await
        .expect("register b");

    container.init().await.expect("init");
    assert_eq!(container.run_list().await, vec!["a", "b", "c"]);

    let _results = container.serve().await.expect("serve");
    assert_eq!(container.state(), State::Started);
    container.stop().await.expect("stop");

    assert_eq!(
        entries(&log),
        vec![
            "init:a", "init:b", "init:c", "serve:a", "serve:b", "serve:c", "stop:c", "stop:b", "stop:a"
        ]
    );
    assert_eq!(container.state(), State::Stopped);
    for name in ["a", "b", "c"] {
        assert_eq!(container.plugin_state(name).await, Some(State::Stopped));
    }
}

#[tokio::test]
async fn opted_out_plugin_excludes_its_dependents() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("x", &log).init_results([Err(PluginError::Disabled)]))
        .await
        .expect("register x");
    container
        .register(Node::<1>::new("y", &log).needs::<0>().serving())
        .await
        .expect("register y");
    container
        .register(Node::<2>::new("z", &log))
        .await
        .expect("register z");
    container
        .register(Node::<3>::new("w", &log).needs::<9>())
        .await
        .expect("register w");

    container.init().await.expect("init succeeds with z left");
    assert_eq!(container.run_list().await, vec!["z"]);

    let vertices = container.vertices().await;
    let reason = |name: &str| {
        vertices
            .iter()
            .find(|v| v.name == name)
            .and_then(|v| v.disabled.clone())
    };
    assert_eq!(reason("x"), Some(DisableReason::OptedOut));
    assert_eq!(
        reason("y"),
        Some(DisableReason::DependencyDisabled {
            dependency: "x".into()
        })
    );
    assert!(matches!(
        reason("w"),
        Some(DisableReason::MissingDependency { .. })
    ));
    assert_eq!(reason("z"), None);

    let _results = container.serve().await.expect("serve");
    assert_eq!(container.plugin_state("y").await, Some(State::Uninitialized));
    assert_eq!(container.plugin_state("z").await, Some(State::Started));
    container.stop().await.expect("stop");

    assert_eq!(entries(&log), vec!["init:x", "init:z"]);
}

#[tokio::test]
async fn opt_out_cascades_through_a_dependency_chain() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("x", &log).init_results([Err(PluginError::Disabled)]))
        .await
        .expect("register x");
    container
        .register(Node::<1>::new("y", &log).needs::<0>().serving())
        .await
        .expect("register y");
    container
        .register(Node::<2>::new("z", &log).needs::<1>().serving())
        .await
        .expect("register z");
    container
        .register(Node::<3>::new("k", &log).serving())
        .await
        .expect("register k");

    container.init().await.expect("init");
    assert_eq!(container.run_list().await, vec!["k"]);

    let z = container
        .vertices()
        .await
        .into_iter()
        .find(|v| v.name == "z")
        .expect("z is listed");
    assert_eq!(
        z.disabled,
        Some(DisableReason::DependencyDisabled {
            dependency: "y".into()
        })
    );
    assert_eq!(z.state, State::Uninitialized);

    let _results = container.serve().await.expect("serve");
    assert_eq!(container.plugin_state("z").await, Some(State::Uninitialized));
    container.stop().await.expect("stop");
    assert_eq!(container.plugin_state("z").await, Some(State::Uninitialized));

    assert_eq!(entries(&log), vec!["init:x", "init:k", "serve:k", "stop:k"]);
}

#[tokio::test]
async fn opt_out_excludes_the_right_plugin_among_namesakes() {
    let log = Log::default();
    let healthy = Arc::new(Node::<40>::new("dup", &log).serving());
    let quitter = Arc::new(
        Node::<41>::new("dup", &log).init_results((0..16).map(|_| Err(PluginError::Disabled))),
    );

    let container = Container::new(Config::default());
    container
        .register_shared(Arc::clone(&healthy))
        .await
        .expect("register first dup");
    container
        .register_shared(Arc::clone(&quitter))
        .await
        .expect("register second dup");

    container.init().await.expect("init");
    assert_eq!(healthy.inits(), 1);
    assert_eq!(quitter.inits(), 1);
    assert_eq!(container.run_list().await, vec!["dup"]);

    let disabled: Vec<_> = container
        .vertices()
        .await
        .into_iter()
        .map(|v| v.disabled)
        .collect();
    assert_eq!(disabled, vec![None, Some(DisableReason::OptedOut)]);

    let _results = container.serve().await.expect("serve");
    assert_eq!(container.plugin_state("dup").await, Some(State::Started));
    container.stop().await.expect("stop");
}

#[tokio::test]
async fn missing_dependency_of_a_namesake_keeps_the_other_running() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<42>::new("dup", &log))
        .await
        .expect("register first dup");
    container
        .register(Node::<43>::new("dup", &log).needs::<99>())
        .await
        .expect("register second dup");
    container
        .register(Node::<44>::new("quitter", &log).init_results([Err(PluginError::Disabled)]))
        .await
        .expect("register quitter");

    container.init().await.expect("first dup has no dependencies");
    assert_eq!(container.run_list().await, vec!["dup"]);

    let disabled: Vec<_> = container
        .vertices()
        .await
        .into_iter()
        .map(|v| v.disabled)
        .collect();
    assert!(matches!(
        disabled.as_slice(),
        [
            None,
            Some(DisableReason::MissingDependency { .. }),
            Some(DisableReason::OptedOut)
        ]
    ));
    assert_eq!(entries(&log), vec!["init:dup", "init:quitter"]);
}

#[tokio::test]
async fn results_channel_closes_after_stop() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("a", &log).serving())
        .await
        .expect("register a");

    container.init().await.expect("init");
    let mut results = container.serve().await.expect("serve");
    container.stop().await.expect("stop");

    let next = tokio::time::timeout(Duration::from_secs(1), results.recv())
        .await
        .expect("channel closes");
    assert!(next.is_none());
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".into()
    }
}

struct Provider {
    name: &'static str,
    greeter: Arc<dyn Greeter>,
}

#[async_trait]
impl Plugin for Provider {
    fn name(&self) -> &str {
        self.name
    }
    fn provides(&self) -> Vec<ProviderBinding> {
        vec![ProviderBinding::new::<dyn Greeter, _>(|ctx| {
            ctx.this::<Provider>()
                .map(|p| Arc::clone(&p.greeter))
                .ok_or_else(|| PluginError::fatal("provider is not a Provider"))
        })]
    }
    async fn init(&self, _deps: &Dependencies) -> Result<(), PluginError> {
        Ok(())
    }
}

#[derive(Default)]
struct Consumer {
    greeter: OnceLock<Arc<dyn Greeter>>,
}

#[async_trait]
impl Plugin for Consumer {
    fn name(&self) -> &str {
        "q"
    }
    fn dependencies(&self) -> Vec<Capability> {
        vec![Capability::of_dyn::<dyn Greeter>()]
    }
    async fn init(&self, deps: &Dependencies) -> Result<(), PluginError> {
        let greeter = deps.require::<dyn Greeter>()?;
        let _ = self.greeter.set(greeter);
        Ok(())
    }
}

#[tokio::test]
async fn dependent_receives_the_provided_instance() {
    let greeter: Arc<dyn Greeter> = Arc::new(English);
    let provider = Arc::new(Provider {
        name: "p",
        greeter: Arc::clone(&greeter),
    });
    let consumer = Arc::new(Consumer::default());

    let container = Container::new(Config::default());
    container
        .register_shared(Arc::clone(&consumer))
        .await
        .expect("register q");
    container
        .register_shared(provider)
        .await
        .expect("register p");

    container.init().await.expect("init");
    let _results = container.serve().await.expect("serve");

    let got = consumer.greeter.get().expect("q was initialized");
    assert!(Arc::ptr_eq(got, &greeter));
    assert_eq!(got.greet(), "hello");
    assert_eq!(container.run_list().await, vec!["p", "q"]);
    assert_eq!(
        container
            .providers(Capability::of_dyn::<dyn Greeter>())
            .await,
        vec!["p"]
    );
    container.stop().await.expect("stop");
}

struct Collector {
    seen: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Plugin for Collector {
    fn name(&self) -> &str {
        "collector"
    }
    fn collects(&self) -> Vec<CollectorBinding> {
        let seen = Arc::clone(&self.seen);
        vec![CollectorBinding::interface::<dyn Greeter, _>(
            move |greeter, provider| {
                seen.lock()
                    .expect("lock")
                    .push(format!("{provider}:{}", greeter.greet()));
                Ok(())
            },
        )]
    }
    async fn init(&self, _deps: &Dependencies) -> Result<(), PluginError> {
        Ok(())
    }
}

struct Second(Provider);

#[async_trait]
impl Plugin for Second {
    fn name(&self) -> &str {
        self.0.name
    }
    fn provides(&self) -> Vec<ProviderBinding> {
        vec![ProviderBinding::new::<dyn Greeter, _>(|_| {
            Ok(Arc::new(English) as Arc<dyn Greeter>)
        })]
    }
    async fn init(&self, _deps: &Dependencies) -> Result<(), PluginError> {
        Ok(())
    }
}

#[tokio::test]
async fn collector_is_fed_by_every_provider() {
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let container = Container::new(Config::default());
    container
        .register(Collector {
            seen: Arc::clone(&seen),
        })
        .await
        .expect("register collector");
    container
        .register(Provider {
            name: "p1",
            greeter: Arc::new(English),
        })
        .await
        .expect("register p1");
    container
        .register(Second(Provider {
            name: "p2",
            greeter: Arc::new(English),
        }))
        .await
        .expect("register p2");

    container.init().await.expect("init");

    assert_eq!(
        *seen.lock().expect("lock"),
        vec!["p1:hello".to_string(), "p2:hello".to_string()]
    );
    let run_list = container.run_list().await;
    assert_eq!(run_list.last().map(String::as_str), Some("collector"));

    let collect_edges: Vec<String> = container
        .edges()
        .await
        .into_iter()
        .filter(|e| e.kind == EdgeKind::Collect && e.to == "collector")
        .map(|e| e.from)
        .collect();
    assert_eq!(collect_edges, vec!["p1", "p2"]);
}

#[tokio::test]
async fn cycle_fails_init() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("a", &log).needs::<1>())
        .await
        .expect("register a");
    container
        .register(Node::<1>::new("b", &log).needs::<0>())
        .await
        .expect("register b");

    match container.init().await {
        Err(ContainerError::Cycle { path }) => {
            assert!(path.contains(&"a".to_string()));
            assert!(path.contains(&"b".to_string()));
            assert_eq!(path.first(), path.last());
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert_eq!(container.state(), State::Error);
    assert!(entries(&log).is_empty());
}

#[tokio::test(start_paused = true)]
async fn incident_restarts_only_the_failed_subgraph() {
    let log = Log::default();
    let a = Arc::new(Node::<0>::new("a", &log).serving());
    let b = Arc::new(Node::<1>::new("b", &log).needs::<0>().serving());
    let c = Arc::new(Node::<2>::new("c", &log).serving());

    let container = Container::new(Config::default());
    container.register_shared(Arc::clone(&a)).await.expect("register a");
    container.register_shared(Arc::clone(&b)).await.expect("register b");
    container.register_shared(Arc::clone(&c)).await.expect("register c");
    container.init().await.expect("init");
    let mut results = container.serve().await.expect("serve");
    let before = container.plugin_state("c").await;
    let marker = entries(&log).len();

    a.fail(PluginError::fail("connection reset"));
    let result = results.recv().await.expect("result");
    assert!(result.recovered);
    assert_eq!(&*result.plugin, "a");
    assert!(matches!(result.error, ContainerError::Serve { .. }));

    assert_eq!(
        since(&log, marker),
        vec!["stop:b", "stop:a", "init:a", "serve:a", "init:b", "serve:b"]
    );
    assert_eq!((a.inits(), b.inits(), c.inits()), (2, 2, 1));
    assert_eq!(container.plugin_state("c").await, before);
    for name in ["a", "b", "c"] {
        assert_eq!(container.plugin_state(name).await, Some(State::Started));
    }

    // The restarted plugin is monitored again.
    let marker = entries(&log).len();
    b.fail(PluginError::fail("again"));
    let result = results.recv().await.expect("second result");
    assert!(result.recovered);
    assert_eq!(since(&log, marker), vec!["stop:b", "init:b", "serve:b"]);
    assert_eq!((a.inits(), b.inits(), c.inits()), (2, 3, 1));

    container.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn retry_gives_up_when_backoff_is_exhausted() {
    let log = Log::default();
    let failing = std::iter::once(Ok(())).chain(std::iter::repeat_n(Err(PluginError::fail("still down")), 8));
    let a = Arc::new(Node::<0>::new("a", &log).serving().init_results(failing));
    let other = Arc::new(Node::<1>::new("other", &log).serving());

    let cfg = Config {
        backoff: BackoffPolicy {
            first: Duration::from_secs(1),
            max: Duration::from_secs(10),
            factor: 2.0,
            max_elapsed: Duration::from_secs(3),
            jitter: JitterPolicy::None,
        },
        ..Config::default()
    };
    let container = Container::new(cfg);
    container.register_shared(Arc::clone(&a)).await.expect("register a");
    container.register_shared(other).await.expect("register other");
    container.init().await.expect("init");
    let mut results = container.serve().await.expect("serve");

    let started = Instant::now();
    a.fail(PluginError::fail("crashed"));
    let result = results.recv().await.expect("result");

    assert!(!result.recovered);
    match result.error {
        ContainerError::BackoffExhausted {
            plugin, attempts, ..
        } => {
            assert_eq!(plugin, "a");
            // Delays of 1s and 2s fit the 3s budget, the next 4s does not.
            assert_eq!(attempts, 3);
        }
        other => panic!("expected backoff exhaustion, got {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(4));
    assert_eq!(container.plugin_state("a").await, Some(State::Error));
    assert_eq!(container.plugin_state("other").await, Some(State::Started));
    assert_eq!(container.state(), State::Started);

    container.stop().await.expect("stop");
}

#[tokio::test(start_paused = true)]
async fn fatal_reinit_is_not_retried() {
    let log = Log::default();
    let a = Arc::new(
        Node::<0>::new("a", &log)
            .serving()
            .init_results([Ok(()), Err(PluginError::fatal("config gone"))]),
    );
    let container = Container::new(Config::default());
    container.register_shared(Arc::clone(&a)).await.expect("register");
    container.init().await.expect("init");
    let mut results = container.serve().await.expect("serve");

    let started = Instant::now();
    a.fail(PluginError::fail("crashed"));
    let result = results.recv().await.expect("result");

    assert!(matches!(
        result.error,
        ContainerError::BackoffExhausted {
            attempts: 1,
            source: PluginError::Fatal { .. },
            ..
        }
    ));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(a.inits(), 2);
}

#[tokio::test(start_paused = true)]
async fn hung_stop_is_bounded_and_others_still_stop() {
    let log = Log::default();
    let cfg = Config {
        stop_timeout: Duration::from_secs(2),
        ..Config::default()
    };
    let container = Container::new(cfg);
    container
        .register(Node::<0>::new("a", &log).serving())
        .await
        .expect("register a");
    container
        .register(Node::<1>::new("b", &log).needs::<0>().serving().hanging_on_stop())
        .await
        .expect("register b");
    container
        .register(Node::<2>::new("c", &log).needs::<1>().serving())
        .await
        .expect("register c");
    container.init().await.expect("init");
    let _results = container.serve().await.expect("serve");
    let marker = entries(&log).len();

    let started = Instant::now();
    let err = container.stop().await.expect_err("b never stops");
    let elapsed = started.elapsed();

    match err {
        ContainerError::StopTimeout { timeout, stuck } => {
            assert_eq!(timeout, Duration::from_secs(2));
            assert_eq!(stuck, vec!["b".to_string()]);
        }
        other => panic!("expected a stop timeout, got {other:?}"),
    }
    assert!(elapsed <= Duration::from_secs(2) + Duration::from_millis(10));
    assert_eq!(since(&log, marker), vec!["stop:c", "stop:b", "stop:a"]);
    assert_eq!(container.plugin_state("a").await, Some(State::Stopped));
    assert_eq!(container.plugin_state("b").await, Some(State::Stopping));
    assert_eq!(container.plugin_state("c").await, Some(State::Stopped));
    assert_eq!(container.state(), State::Error);
}

#[tokio::test]
async fn never_policy_stops_the_container_on_incident() {
    let log = Log::default();
    let a = Arc::new(Node::<0>::new("a", &log).serving());
    let cfg = Config {
        restart: RestartPolicy::Never,
        ..Config::default()
    };
    let container = Container::new(cfg);
    container.register_shared(Arc::clone(&a)).await.expect("register a");
    container
        .register(Node::<1>::new("b", &log).needs::<0>().serving())
        .await
        .expect("register b");
    container.init().await.expect("init");
    let mut results = container.serve().await.expect("serve");

    a.fail(PluginError::fail("disk full"));
    let result = results.recv().await.expect("terminal result");
    assert!(!result.recovered);
    assert!(matches!(
        result.error,
        ContainerError::Serve { ref plugin, .. } if plugin == "a"
    ));
    assert_eq!(container.state(), State::Stopped);
    assert!(results.recv().await.is_none());

    let log = entries(&log);
    assert_eq!(&log[log.len() - 2..], ["stop:b", "stop:a"]);
    assert_eq!(a.inits(), 1);
}

#[tokio::test]
async fn synchronous_serve_failure_rolls_back() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("a", &log).serving())
        .await
        .expect("register a");
    container
        .register(
            Node::<1>::new("b", &log)
                .needs::<0>()
                .serving()
                .failing_serve(PluginError::fail("port in use")),
        )
        .await
        .expect("register b");
    container
        .register(Node::<2>::new("c", &log).needs::<1>().serving())
        .await
        .expect("register c");
    container.init().await.expect("init");

    let err = container.serve().await.expect_err("b fails to serve");
    assert!(matches!(err, ContainerError::Serve { ref plugin, .. } if plugin == "b"));
    assert_eq!(err.op(), Op::Serve);
    assert_eq!(container.state(), State::Error);

    assert_eq!(
        entries(&log),
        vec!["init:a", "init:b", "init:c", "serve:a", "serve:b", "stop:a"]
    );
    assert_eq!(container.plugin_state("a").await, Some(State::Stopped));
    assert_eq!(container.plugin_state("b").await, Some(State::Error));
    assert_eq!(container.plugin_state("c").await, Some(State::Initialized));

    container.stop().await.expect("nothing left to stop");
    assert_eq!(container.state(), State::Stopped);
}

#[tokio::test]
async fn registration_rules() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("a", &log))
        .await
        .expect("first");

    let err = container
        .register(Node::<0>::new("a-again", &log))
        .await
        .expect_err("same type twice");
    assert!(matches!(err, ContainerError::AlreadyRegistered { .. }));

    let mut primitive = Node::<1>::new("port", &log);
    primitive.deps.push(Capability::of::<u16>());
    let err = container
        .register(primitive)
        .await
        .expect_err("primitive dependency");
    assert!(matches!(
        err,
        ContainerError::PrimitiveCapability { ref plugin, .. } if plugin == "port"
    ));

    container.init().await.expect("init");
    let err = container
        .register(Node::<2>::new("late", &log))
        .await
        .expect_err("registration after init");
    assert!(matches!(
        err,
        ContainerError::InvalidState {
            op: Op::Register,
            ..
        }
    ));
    assert_eq!(container.vertices().await.len(), 1);
}

#[tokio::test]
async fn illegal_events_are_rejected() {
    let container = Container::new(Config::default());

    let err = container.serve().await.expect_err("serve before init");
    assert!(matches!(
        err,
        ContainerError::InvalidState { op: Op::Serve, source } if source.current == State::Uninitialized
    ));
    let err = container.stop().await.expect_err("stop before init");
    assert!(matches!(err, ContainerError::InvalidState { op: Op::Stop, .. }));
    assert_eq!(container.state(), State::Uninitialized);

    let err = container.init().await.expect_err("nothing registered");
    assert!(matches!(err, ContainerError::NoPlugins));
    assert_eq!(container.state(), State::Error);
}

#[tokio::test]
async fn init_failure_is_fatal_and_reinit_is_allowed() {
    let log = Log::default();
    let container = Container::new(Config::default());
    container
        .register(Node::<0>::new("a", &log).init_results([Err(PluginError::fail("no db"))]))
        .await
        .expect("register a");
    container
        .register(Node::<1>::new("b", &log).needs::<0>())
        .await
        .expect("register b");

    let err = container.init().await.expect_err("a fails");
    assert!(matches!(
        err,
        ContainerError::Init { op: Op::Init, ref plugin, .. } if plugin == "a"
    ));
    assert_eq!(container.state(), State::Error);
    assert_eq!(entries(&log), vec!["init:a"]);

    container.init().await.expect("second init succeeds");
    assert_eq!(entries(&log), vec!["init:a", "init:a", "init:b"]);
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

#[async_trait]
impl Subscribe for Recorder {
    async fn on_event(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }
    fn name(&self) -> &'static str {
        "recorder"
    }
}

#[tokio::test]
async fn subscribers_see_lifecycle_events() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let log = Log::default();
    let container = Container::builder(Config::default())
        .with_subscribers(vec![Arc::new(Recorder { tx })])
        .build();
    container
        .register(Node::<0>::new("a", &log))
        .await
        .expect("register");
    container.init().await.expect("init");

    let mut kinds = Vec::new();
    while let Some(ev) = rx.recv().await {
        let done = ev.kind == EventKind::PluginInitialized;
        kinds.push(ev.kind);
        if done {
            assert_eq!(ev.plugin.as_deref(), Some("a"));
            break;
        }
    }
    assert_eq!(kinds.first(), Some(&EventKind::PluginRegistered));
    assert!(kinds.contains(&EventKind::PluginInitializing));
}

#[tokio::test(start_paused = true)]
async fn run_until_returns_the_terminal_error() {
    let log = Log::default();
    let a = Arc::new(Node::<0>::new("a", &log).serving());
    let cfg = Config {
        restart: RestartPolicy::Never,
        ..Config::default()
    };
    let container = Container::new(cfg);
    container.register_shared(Arc::clone(&a)).await.expect("register");

    let trigger = Arc::clone(&a);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.fail(PluginError::fatal("corrupted"));
    });

    let err = container
        .run_until(std::future::pending())
        .await
        .expect_err("incident ends the run");
    assert!(matches!(err, ContainerError::Serve { .. }));
    assert_eq!(container.state(), State::Stopped);
    assert_eq!(entries(&log), vec!["init:a", "serve:a", "stop:a"]);
}
