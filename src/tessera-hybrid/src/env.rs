//! Lazy binding environment.
//!
//! Free symbols that are not proxy slots resolve here: declared column
//! names go to the column subset provider for the current slice, everything
//! else to the caller's scope. The active level is built on first use and
//! then shared by every group.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use log::debug;

use common_error::TesseraResult;
use tessera_core::{ColumnSubsets, Slice, Symbol, Value};
use tessera_expr::{HandlerId, Scope};

use crate::handler::HandlerTable;

#[derive(Debug)]
struct ActiveScope {
    declared: HashSet<Symbol>,
}

/// Two-level scope: declared columns over the caller's scope.
pub struct LazyEnv {
    provider: Arc<dyn ColumnSubsets>,
    outer: Arc<dyn Scope>,
    active: OnceLock<ActiveScope>,
    constructions: AtomicUsize,
}

impl fmt::Debug for LazyEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyEnv")
            .field("provider", &self.provider)
            .field("active", &self.active.get())
            .finish_non_exhaustive()
    }
}

impl LazyEnv {
    /// Declare the provider's columns over `outer`. Nothing is built yet.
    pub fn declare(provider: Arc<dyn ColumnSubsets>, outer: Arc<dyn Scope>) -> Self {
        Self {
            provider,
            outer,
            active: OnceLock::new(),
            constructions: AtomicUsize::new(0),
        }
    }

    fn active(&self) -> &ActiveScope {
        self.active.get_or_init(|| {
            self.constructions.fetch_add(1, Ordering::Relaxed);
            let declared: HashSet<Symbol> = self.provider.variable_names().iter().cloned().collect();
            debug!("building active scope over {} declared columns", declared.len());
            ActiveScope { declared }
        })
    }

    /// Resolve `name` for `slice`: a declared column, else the caller's scope.
    pub fn resolve(&self, name: &Symbol, slice: &Slice) -> TesseraResult<Option<Value>> {
        if self.active().declared.contains(name) {
            return self.provider.get(name, slice).map(Some);
        }
        self.outer.resolve(name)
    }

    /// The caller's scope.
    pub fn outer(&self) -> &Arc<dyn Scope> {
        &self.outer
    }

    /// Whether the active level has been built.
    pub fn is_constructed(&self) -> bool {
        self.active.get().is_some()
    }

    /// How many times the active level was built. Never more than one.
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::Relaxed)
    }
}

/// The scope one group is evaluated in.
///
/// Proxy slots are prefetched for the slice; other names fall through to
/// the lazy environment. Placeholders are answered by the handler table.
pub(crate) struct BoundScope<'a> {
    env: &'a LazyEnv,
    slice: &'a Slice,
    proxies: HashMap<Symbol, Value>,
    handlers: &'a HandlerTable,
}

impl<'a> BoundScope<'a> {
    pub(crate) fn new(
        env: &'a LazyEnv,
        slice: &'a Slice,
        proxies: HashMap<Symbol, Value>,
        handlers: &'a HandlerTable,
    ) -> Self {
        Self {
            env,
            slice,
            proxies,
            handlers,
        }
    }
}

impl Scope for BoundScope<'_> {
    fn resolve(&self, name: &Symbol) -> TesseraResult<Option<Value>> {
        if let Some(value) = self.proxies.get(name) {
            return Ok(Some(value.clone()));
        }
        self.env.resolve(name, self.slice)
    }

    fn placeholder(&self, id: HandlerId) -> TesseraResult<Value> {
        self.handlers.process(id, self.slice)
    }
}
