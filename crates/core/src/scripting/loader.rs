//! Compiles stored scripts into executable modules.
//!
//! Loading compiles the source and runs its top-level statements once in a
//! fresh scope. Every fault on the way (parse errors, runtime errors in
//! module-level code, deadline overruns, even a panic in the worker) comes
//! back as a [`LoadFailure`]; nothing here can take the service down.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rhai::{CallFnOptions, Dynamic, EvalAltResult, FnAccess, Scope, AST};
use serde::Serialize;

use super::path::ScriptPath;
use super::sandbox::{build_engine, is_terminated, run_with_deadline, Outcome, ScriptLimits};
use super::store::StoredScript;
use crate::hashing::short_sha256_hex;

/// Hex characters of the path digest kept in an identity.
const IDENTITY_DIGEST_LEN: usize = 16;

/// Stable name of a loaded script module.
///
/// Derived from the absolute path alone, so re-uploading the same file
/// yields the same identity (hot reload) while distinct paths differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ModuleIdentity(String);

impl ModuleIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `user_script_<sanitized stem>_<16 hex chars of sha256(path)>`.
pub fn module_identity(absolute_path: &Path) -> ModuleIdentity {
    let digest = short_sha256_hex(
        absolute_path.to_string_lossy().as_bytes(),
        IDENTITY_DIGEST_LEN,
    );
    let safe_stem: String = absolute_path
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    ModuleIdentity(format!("user_script_{safe_stem}_{digest}"))
}

/// Why a script could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadFailure {
    #[error("Script load failed: syntax error: {0}")]
    Syntax(String),

    #[error("Script load failed: {0}")]
    Runtime(String),

    #[error("Script load failed: timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Script load failed: loader crashed: {0}")]
    Crashed(String),
}

/// A compiled script whose top-level code has run successfully.
pub struct LoadedModule {
    identity: ModuleIdentity,
    filename: ScriptPath,
    ast: AST,
    scope: Scope<'static>,
    functions: BTreeSet<(String, usize)>,
    limits: ScriptLimits,
}

impl LoadedModule {
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    pub fn filename(&self) -> &ScriptPath {
        &self.filename
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Whether the script defines a public function `name` taking `arity`
    /// parameters.
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.functions.contains(&(name.to_string(), arity))
    }

    /// Arity to use when calling `name` as a request handler.
    ///
    /// Prefers the one-argument form (receives the request) over the
    /// zero-argument form. Any other arity is not a handler.
    pub fn handler_arity(&self, name: &str) -> Option<usize> {
        [1, 0].into_iter().find(|&arity| self.has_function(name, arity))
    }

    /// Call a script function synchronously with the given deadline.
    ///
    /// Top-level statements are not re-run; the call sees a copy of the
    /// scope left behind by the load.
    pub(crate) fn call_fn(
        &self,
        name: &str,
        args: Vec<Dynamic>,
        deadline: Instant,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        let engine = build_engine(&self.identity, &self.limits, deadline);
        let mut scope = self.scope.clone();
        let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
        engine.call_fn_with_options(options, &mut scope, &self.ast, name, args)
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("identity", &self.identity)
            .field("filename", &self.filename)
            .field("functions", &self.functions)
            .finish_non_exhaustive()
    }
}

/// Loads stored scripts with a fixed set of [`ScriptLimits`].
#[derive(Debug, Clone, Default)]
pub struct ModuleLoader {
    limits: ScriptLimits,
}

impl ModuleLoader {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }

    /// Compile `script` and run its top-level code under the load deadline.
    pub async fn load(&self, script: &StoredScript) -> Result<Arc<LoadedModule>, LoadFailure> {
        let identity = module_identity(&script.absolute_path);
        let started = Instant::now();

        let job_identity = identity.clone();
        let job_limits = self.limits.clone();
        let source = script.source.clone();
        let outcome = run_with_deadline(self.limits.load_timeout, move |deadline| {
            compile_and_run(&job_identity, &job_limits, deadline, &source, started)
        })
        .await;

        let (ast, scope) = match outcome {
            Outcome::Finished(result) => result?,
            Outcome::TimedOut => {
                return Err(LoadFailure::Timeout {
                    elapsed_ms: elapsed_ms(started),
                })
            }
            Outcome::Panicked(msg) => return Err(LoadFailure::Crashed(msg)),
        };

        let functions = ast
            .iter_functions()
            .filter(|f| f.access == FnAccess::Public)
            .map(|f| (f.name.to_string(), f.params.len()))
            .collect();

        tracing::info!(
            module = %identity,
            path = %script.absolute_path.display(),
            elapsed_ms = elapsed_ms(started),
            "Script module loaded",
        );

        Ok(Arc::new(LoadedModule {
            identity,
            filename: script.relative_path.clone(),
            ast,
            scope,
            functions,
            limits: self.limits.clone(),
        }))
    }
}

fn compile_and_run(
    identity: &ModuleIdentity,
    limits: &ScriptLimits,
    deadline: Instant,
    source: &str,
    started: Instant,
) -> Result<(AST, Scope<'static>), LoadFailure> {
    let engine = build_engine(identity, limits, deadline);
    let ast = engine
        .compile(source)
        .map_err(|e| LoadFailure::Syntax(e.to_string()))?;

    let mut scope = Scope::new();
    engine.run_ast_with_scope(&mut scope, &ast).map_err(|e| {
        if is_terminated(&e) {
            LoadFailure::Timeout {
                elapsed_ms: elapsed_ms(started),
            }
        } else {
            LoadFailure::Runtime(e.to_string())
        }
    })?;

    Ok((ast, scope))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
