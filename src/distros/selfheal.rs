//! Recovery for locally cached external resources such as clone directories.
//!
//! A resource that can be torn down and rebuilt deterministically gets one
//! second chance: when work against it fails, it is destroyed, recreated and
//! the work is retried exactly once. A second failure is final.

use super::runner::is_cancelled;
use crate::ui::prelude::*;
use anyhow::{Context, Result};

/// A cached resource that can be rebuilt from scratch.
pub trait Recreatable {
    /// Short name used in log messages.
    fn describe(&self) -> String;

    /// Bring the resource into existence.
    fn ensure(&mut self) -> Result<()>;

    /// Remove every trace of the resource. Must succeed if it does not exist.
    fn teardown(&mut self) -> Result<()>;
}

/// Ensure `resource`, run `work` against it and, if that fails, rebuild the
/// resource once and retry. Cancellation is never retried.
pub fn with_recovery<R, T, F>(resource: &mut R, mut work: F) -> Result<T>
where
    R: Recreatable + ?Sized,
    F: FnMut(&R) -> Result<T>,
{
    resource.ensure()?;

    let first = match work(resource) {
        Ok(value) => return Ok(value),
        Err(err) if is_cancelled(&err) => return Err(err),
        Err(err) => err,
    };

    let name = resource.describe();
    emit(
        Level::Warn,
        "distros.selfheal.retry",
        &format!("{} is unusable ({:#}); recreating it once", name, first),
        None,
    );

    resource
        .teardown()
        .with_context(|| format!("removing {} for a clean retry", name))?;
    resource
        .ensure()
        .with_context(|| format!("recreating {}", name))?;

    work(resource).with_context(|| format!("{} failed again after being recreated", name))
}
