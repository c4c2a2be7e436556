//! Environment
//!
//! The environment is the view a cell function gets of its context. Reads go
//! through [`Context::get_value`] semantics, writes through
//! [`Context::set_value`].
//!
//! # Isolation
//!
//! A read made in isolation returns the value but records no dependency, so
//! a later change of the read cell does not invalidate the reader. There are
//! two ways to isolate:
//!
//! - [`Env::isolated`] returns a separate view whose reads are always
//!   isolated.
//! - [`Env::isolate`] switches this view into isolation until the returned
//!   guard is dropped.
//!
//! ```rust
//! use translucent_core::{Context, Result};
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let ctx = Context::new();
//! ctx.new_value("x", 1)?;
//! ctx.new_value("y", 10)?;
//! ctx.new_observer("sum", |env| {
//!     let x: i64 = env.get_as("x")?;
//!     // Changing `y` alone will not re-run this observer.
//!     let y: i64 = env.isolated().get_as("y")?;
//!     Ok(json!(x + y))
//! })?;
//! ctx.run()?;
//! # Ok(())
//! # }
//! ```

use std::cell::Cell;
use std::ops::Deref;

use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use super::Context;
use crate::error::{Error, Result};

/// View of a context passed to every cell function.
pub struct Env<'c> {
    context: &'c Context,
    isolated: Cell<bool>,
}

impl<'c> Env<'c> {
    pub(crate) fn new(context: &'c Context) -> Self {
        Self {
            context,
            isolated: Cell::new(false),
        }
    }

    /// The context this environment reads from.
    pub fn context(&self) -> &'c Context {
        self.context
    }

    /// Whether reads through this view currently record dependencies.
    pub fn is_isolated(&self) -> bool {
        self.isolated.get()
    }

    /// Read a cell.
    pub fn get(&self, name: &str) -> Result<Json> {
        self.context.read(name, self.is_isolated())
    }

    /// Read a cell and decode it.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.get(name)?;
        serde_json::from_value(value).map_err(|source| Error::Decode {
            name: name.to_string(),
            source,
        })
    }

    /// Write a value cell.
    pub fn set(&self, name: &str, value: impl Into<Json>) -> Result<()> {
        self.context.set_value(name, value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.context.contains(name)
    }

    /// A view whose reads never record dependencies.
    pub fn isolated(&self) -> Env<'c> {
        Env {
            context: self.context,
            isolated: Cell::new(true),
        }
    }

    /// Isolate this view until the guard is dropped.
    pub fn isolate(&self) -> Isolation<'_, 'c> {
        let previous = self.isolated.replace(true);
        Isolation {
            env: self,
            previous,
        }
    }
}

/// Scoped isolation of an [`Env`]. Restores the previous mode on drop.
pub struct Isolation<'e, 'c> {
    env: &'e Env<'c>,
    previous: bool,
}

impl<'c> Deref for Isolation<'_, 'c> {
    type Target = Env<'c>;

    fn deref(&self) -> &Self::Target {
        self.env
    }
}

impl Drop for Isolation<'_, '_> {
    fn drop(&mut self) {
        self.env.isolated.set(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn environment_reads_and_writes() {
        let ctx = Context::new();
        let env = ctx.env();
        assert!(!env.is_isolated());
        assert!(matches!(env.get("a"), Err(Error::UndefinedKey(name)) if name == "a"));

        ctx.new_value("a", 1).unwrap();
        assert!(env.contains("a"));
        assert!(!env.contains("b"));

        let a: i64 = env.get_as("a").unwrap();
        env.set("a", a + 1).unwrap();
        assert_eq!(ctx.get_value("a").unwrap(), json!(2));
    }

    #[test]
    fn isolated_views_stay_isolated() {
        let ctx = Context::new();
        let env = ctx.env();

        let view = env.isolated();
        assert!(view.is_isolated());
        assert!(view.isolated().is_isolated());
        assert!(!env.is_isolated());
        assert!(std::ptr::eq(view.context(), &ctx));
    }

    #[test]
    fn isolation_guard_restores_mode() {
        let ctx = Context::new();
        let env = ctx.env();

        {
            let scoped = env.isolate();
            assert!(scoped.is_isolated());
            {
                let _nested = env.isolate();
                assert!(env.is_isolated());
            }
            assert!(env.is_isolated());
        }
        assert!(!env.is_isolated());
    }

    #[test]
    fn typed_read_reports_decode_errors() {
        let ctx = Context::new();
        ctx.new_value("s", "text").unwrap();

        let result: Result<i64> = ctx.env().get_as("s");
        assert!(matches!(result, Err(Error::Decode { name, .. }) if name == "s"));
    }
}
