//! User-supplied SQL generators.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::ProducerError;
use crate::event::IoEvent;

/// Turns one event into an ordered list of SQL statements.
///
/// Implemented for any `Fn(&IoEvent) -> anyhow::Result<Vec<String>>`.
pub trait SqlGenerator: Send + Sync {
    fn generate(&self, event: &IoEvent) -> anyhow::Result<Vec<String>>;
}

impl<F> SqlGenerator for F
where
    F: Fn(&IoEvent) -> anyhow::Result<Vec<String>> + Send + Sync,
{
    fn generate(&self, event: &IoEvent) -> anyhow::Result<Vec<String>> {
        self(event)
    }
}

/// Invoke a generator, turning both errors and panics into `ProducerError`.
pub fn invoke(generator: &dyn SqlGenerator, event: &IoEvent) -> Result<Vec<String>, ProducerError> {
    match catch_unwind(AssertUnwindSafe(|| generator.generate(event))) {
        Ok(Ok(statements)) => Ok(statements
            .into_iter()
            .filter(|sql| !sql.trim().is_empty())
            .collect()),
        Ok(Err(e)) => Err(ProducerError::Generator(e.into())),
        Err(payload) => Err(ProducerError::GeneratorPanicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "generator panicked".to_string()
    }
}
