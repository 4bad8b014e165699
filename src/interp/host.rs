//! Host bindings for external functions.
//!
//! An external function declares a signature and a symbol; the body comes
//! from whatever the host binds to that symbol here. Bindings operate on
//! i32 values only, matching the scalar set the trampoline supports.

use hashbrown::HashMap;
use std::fmt;

type HostFn = Box<dyn Fn(&[i32]) -> i32>;

/// Symbol table of host-supplied function bodies.
#[derive(Default)]
pub struct HostFunctions {
    bindings: HashMap<String, HostFn>,
}

impl HostFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol`, replacing any earlier binding.
    pub fn bind<F>(&mut self, symbol: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&[i32]) -> i32 + 'static,
    {
        self.bindings.insert(symbol.into(), Box::new(f));
        self
    }

    pub fn get(&self, symbol: &str) -> Option<&dyn Fn(&[i32]) -> i32> {
        self.bindings.get(symbol).map(|f| f.as_ref())
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.bindings.contains_key(symbol)
    }
}

impl fmt::Debug for HostFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.bindings.keys()).finish()
    }
}
