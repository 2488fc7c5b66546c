//! Handlebars SQL templates.
//!
//! `{{{ field }}}` substitutes the raw value, so whatever an event carries
//! lands in the SQL text unescaped. Quoting is the template author's job.

use handlebars::Handlebars;
use serde_json::{json, Value};

use super::ProducerError;
use crate::event::IoEvent;

/// Variables a template can reference.
///
/// - `eventType`, `fullPath`, `parentPath`, `filename`
/// - `optionalStats` (object), `optionalExtraInfo` (any JSON)
/// - `stats`, `extraInfo`: the same two values pre-rendered as text
pub fn template_context(event: &IoEvent) -> Value {
    let stats_text = event
        .optional_stats
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default();
    let extra_text = match &event.optional_extra_info {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    json!({
        "eventType": event.event_type.as_str(),
        "fullPath": event.full_path,
        "parentPath": event.parent_path(),
        "filename": event.filename(),
        "optionalStats": event.optional_stats,
        "optionalExtraInfo": event.optional_extra_info,
        "stats": stats_text,
        "extraInfo": extra_text,
    })
}

/// Compiled, ordered set of SQL templates.
///
/// A template that fails to compile keeps its slot: it is reported once at
/// construction and fails every render that reaches it.
pub struct TemplateSet {
    registry: Handlebars<'static>,
    slots: Vec<Slot>,
}

struct Slot {
    source: String,
    compile_error: Option<String>,
}

impl TemplateSet {
    /// Compile `templates` in order.
    pub fn compile(templates: &[String]) -> Self {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(false);

        let slots = templates
            .iter()
            .enumerate()
            .map(|(index, source)| Slot {
                source: source.clone(),
                compile_error: registry
                    .register_template_string(&slot_name(index), source)
                    .err()
                    .map(|e| e.to_string()),
            })
            .collect();

        Self { registry, slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Template source text at `index`.
    pub fn source(&self, index: usize) -> Option<&str> {
        self.slots.get(index).map(|slot| slot.source.as_str())
    }

    /// Compile failures as `ProducerError`s, in template order.
    pub fn compile_errors(&self) -> Vec<ProducerError> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.compile_error
                    .as_ref()
                    .map(|message| ProducerError::TemplateCompile {
                        index,
                        template: slot.source.clone(),
                        message: message.clone(),
                    })
            })
            .collect()
    }

    /// Render one template against a prepared context.
    pub fn render_one(&self, index: usize, context: &Value) -> Result<String, ProducerError> {
        let slot = self
            .slots
            .get(index)
            .ok_or(ProducerError::NoSuchTemplate(index))?;

        if let Some(message) = &slot.compile_error {
            return Err(ProducerError::TemplateCompile {
                index,
                template: slot.source.clone(),
                message: message.clone(),
            });
        }

        self.registry
            .render(&slot_name(index), context)
            .map_err(|source| ProducerError::TemplateRender {
                index,
                template: slot.source.clone(),
                source: Box::new(source),
            })
    }

    /// Render every template in order, failing on the first error.
    ///
    /// Blank output is dropped.
    pub fn render_all(&self, event: &IoEvent) -> Result<Vec<String>, ProducerError> {
        let context = template_context(event);
        let mut rendered = Vec::with_capacity(self.slots.len());
        for index in 0..self.slots.len() {
            let sql = self.render_one(index, &context)?;
            if !sql.trim().is_empty() {
                rendered.push(sql);
            }
        }
        Ok(rendered)
    }
}

fn slot_name(index: usize) -> String {
    format!("sql-template-{index}")
}
