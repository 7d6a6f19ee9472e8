//! Engine construction and execution limits for uploaded scripts.
//!
//! Uploaded code is trusted (there is no authentication in front of the
//! ingestion endpoint), so this is not a security sandbox. It only keeps a
//! runaway or careless script from wedging a worker thread: every
//! evaluation gets operation/size caps, a wall-clock deadline checked from
//! the progress hook, and no access to file-based `import`.

use std::time::{Duration, Instant};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult};

use super::loader::ModuleIdentity;

/// How many operations run between wall-clock checks.
const DEADLINE_CHECK_INTERVAL: u64 = 1024;

/// Extra time granted to the blocking worker before the async side gives
/// up on it. The progress hook normally terminates the script first.
const BACKSTOP_GRACE: Duration = Duration::from_millis(250);

/// Token carried by `ErrorTerminated` when the deadline fires.
const DEADLINE_TOKEN: &str = "deadline exceeded";

/// Resource limits applied to every script evaluation.
#[derive(Debug, Clone)]
pub struct ScriptLimits {
    /// Wall-clock budget for compiling and running top-level code.
    pub load_timeout: Duration,
    /// Wall-clock budget for a single handler invocation.
    pub call_timeout: Duration,
    /// Maximum Rhai operations per evaluation (`0` = unlimited).
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
            max_operations: 1_000_000,
            max_call_levels: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

/// Build a fresh engine for one evaluation.
///
/// Engines are cheap and the deadline differs per evaluation, so each load
/// or call gets its own. `print`/`debug` output from scripts is routed to
/// `tracing` tagged with the module identity.
pub(crate) fn build_engine(
    identity: &ModuleIdentity,
    limits: &ScriptLimits,
    deadline: Instant,
) -> Engine {
    let mut engine = Engine::new();

    engine.set_module_resolver(DummyModuleResolver::new());
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    engine.on_progress(move |ops| {
        if ops % DEADLINE_CHECK_INTERVAL == 0 && Instant::now() >= deadline {
            Some(Dynamic::from(DEADLINE_TOKEN))
        } else {
            None
        }
    });

    let script = identity.to_string();
    engine.on_print(move |text| tracing::info!(script = %script, "{text}"));
    let script = identity.to_string();
    engine.on_debug(move |text, _source, pos| {
        tracing::debug!(script = %script, position = %pos, "{text}");
    });

    engine
}

/// Whether an evaluation error (possibly nested in function calls) was
/// caused by the progress hook terminating the script.
pub(crate) fn is_terminated(err: &EvalAltResult) -> bool {
    match err {
        EvalAltResult::ErrorTerminated(..) => true,
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => is_terminated(inner),
        EvalAltResult::ErrorInModule(_, inner, _) => is_terminated(inner),
        _ => false,
    }
}

/// Result of running a job on the blocking pool.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Finished(T),
    TimedOut,
    Panicked(String),
}

/// Run `job` on the blocking pool with a deadline.
///
/// The job receives the deadline so it can wire it into its engine. If the
/// job overruns by more than the grace period the caller stops waiting;
/// the worker thread is left to wind down on its own.
pub(crate) async fn run_with_deadline<T, F>(timeout: Duration, job: F) -> Outcome<T>
where
    T: Send + 'static,
    F: FnOnce(Instant) -> T + Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let task = tokio::task::spawn_blocking(move || job(deadline));

    match tokio::time::timeout(timeout + BACKSTOP_GRACE, task).await {
        Ok(Ok(value)) => Outcome::Finished(value),
        Ok(Err(join_err)) => Outcome::Panicked(join_err.to_string()),
        Err(_elapsed) => Outcome::TimedOut,
    }
}
