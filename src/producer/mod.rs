//! Event to SQL statement list.
//!
//! Two independent strategies feed one list: every configured template is
//! rendered first, in order, then the generator's statements are appended
//! in the order it returned them. Either strategy may be absent. The first
//! failure aborts the whole list.

pub mod generator;
pub mod template;

pub use generator::SqlGenerator;
pub use template::{template_context, TemplateSet};

use std::sync::Arc;
use thiserror::Error;

use crate::event::IoEvent;

/// Error type for SQL production.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("error compiling sql template[{index}] {template}: {message}")]
    TemplateCompile {
        index: usize,
        template: String,
        message: String,
    },

    #[error("error generating SQL from sql template[{index}] {template}: {source}")]
    TemplateRender {
        index: usize,
        template: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("no sql template at index {0}")]
    NoSuchTemplate(usize),

    #[error("error generating SQL statements from generator function: {0}")]
    Generator(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("sql generator panicked: {0}")]
    GeneratorPanicked(String),
}

/// Builds the statement list for one event.
#[derive(Clone, Default)]
pub struct SqlProducer {
    templates: Option<Arc<TemplateSet>>,
    generator: Option<Arc<dyn SqlGenerator>>,
}

impl SqlProducer {
    pub fn new(templates: Option<&[String]>, generator: Option<Arc<dyn SqlGenerator>>) -> Self {
        Self {
            templates: templates.map(|t| Arc::new(TemplateSet::compile(t))),
            generator,
        }
    }

    pub fn templates(&self) -> Option<&TemplateSet> {
        self.templates.as_deref()
    }

    pub fn generator(&self) -> Option<&Arc<dyn SqlGenerator>> {
        self.generator.as_ref()
    }

    /// Whether any strategy is configured at all.
    pub fn has_strategy(&self) -> bool {
        self.templates.as_ref().is_some_and(|t| !t.is_empty()) || self.generator.is_some()
    }

    /// Ordered statements for `event`: rendered templates, then generator output.
    pub fn produce(&self, event: &IoEvent) -> Result<Vec<String>, ProducerError> {
        let mut statements = match &self.templates {
            Some(templates) => templates.render_all(event)?,
            None => Vec::new(),
        };

        if let Some(generator) = &self.generator {
            statements.extend(generator::invoke(generator.as_ref(), event)?);
        }

        Ok(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::IoEventType;

    fn event() -> IoEvent {
        IoEvent::new(IoEventType::Created, "/tmp/f1")
    }

    fn generator(statements: &'static [&'static str]) -> Arc<dyn SqlGenerator> {
        Arc::new(move |_: &IoEvent| -> anyhow::Result<Vec<String>> {
            Ok(statements.iter().map(ToString::to_string).collect())
        })
    }

    #[test]
    fn test_templates_then_generator() {
        let templates = vec![
            "T1 {{{filename}}}".to_string(),
            "T2 {{{eventType}}}".to_string(),
        ];
        let producer = SqlProducer::new(Some(&templates), Some(generator(&["G1", "G2"])));

        assert_eq!(
            producer.produce(&event()).unwrap(),
            vec!["T1 f1", "T2 created", "G1", "G2"]
        );
    }

    #[test]
    fn test_no_strategy_yields_empty_list() {
        let producer = SqlProducer::default();
        assert!(!producer.has_strategy());
        assert!(producer.produce(&event()).unwrap().is_empty());
    }

    #[test]
    fn test_generator_returning_nothing() {
        let producer = SqlProducer::new(None, Some(generator(&[])));
        assert!(producer.has_strategy());
        assert!(producer.produce(&event()).unwrap().is_empty());
    }

    #[test]
    fn test_template_failure_skips_generator() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let generator: Arc<dyn SqlGenerator> =
            Arc::new(move |_: &IoEvent| -> anyhow::Result<Vec<String>> {
                counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(vec!["G1".into()])
            });
        let templates = vec!["{{#each}}".to_string()];
        let producer = SqlProducer::new(Some(&templates), Some(generator));

        assert!(producer.produce(&event()).is_err());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
