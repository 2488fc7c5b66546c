//! Dry-run validation run once after construction.
//!
//! Each configured strategy is exercised against a synthetic event whose
//! stats come from a real file. Results are only logged (and failures
//! reported to the error sink); they never block readiness or fail
//! construction.

use super::PluginContext;
use crate::event::{FileStats, IoEvent, IoEventType};
use crate::error::ReactorError;
use crate::observability::sink::Severity;
use crate::producer::{generator, template_context, ProducerError, SqlGenerator, TemplateSet};

const SYNTHETIC_PATH: &str = "/test/full/path/tothing";

/// Stats of the running executable, standing in for a monitored file.
pub(crate) async fn synthetic_stats() -> Option<FileStats> {
    let exe = std::env::current_exe().ok()?;
    match tokio::fs::metadata(&exe).await {
        Ok(metadata) => Some(FileStats::from_metadata(&metadata)),
        Err(e) => {
            tracing::warn!(path = %exe.display(), error = %e, "No stats for synthetic event");
            None
        }
    }
}

fn synthetic_event(event_type: IoEventType, stats: Option<FileStats>) -> IoEvent {
    let event = IoEvent::new(event_type, SYNTHETIC_PATH);
    match stats {
        Some(stats) => event.with_stats(stats),
        None => event,
    }
}

/// Invoke the generator once and log what it returns.
pub(crate) async fn dry_run_generator(ctx: PluginContext, generator: &dyn SqlGenerator) {
    let event = synthetic_event(IoEventType::Created, synthetic_stats().await);

    match generator::invoke(generator, &event) {
        Ok(statements) => ctx.log(
            Severity::Info,
            &format!("sqlGenerator() function returned test statements to exec: {statements:?}"),
        ),
        Err(e) => {
            let message = format!("{} error pre-processing sqlGenerator: {e}", ctx.origin());
            ctx.log(Severity::Error, &message);
            ctx.report_error(&message, &ReactorError::Producer(e));
        }
    }
}

/// Render every template once, each independently of the others.
///
/// Templates that failed to compile were already reported and are skipped.
pub(crate) async fn dry_run_templates(ctx: PluginContext, templates: &TemplateSet) {
    let event = synthetic_event(
        IoEventType::Other("testEventType".into()),
        synthetic_stats().await,
    );
    let context = template_context(&event);

    for index in 0..templates.len() {
        let source = templates.source(index).unwrap_or_default();
        match templates.render_one(index, &context) {
            Ok(rendered) => ctx.log(
                Severity::Info,
                &format!("sqlTemplate[{source}] rendered to: {rendered}"),
            ),
            Err(ProducerError::TemplateCompile { .. }) => {}
            Err(e) => {
                let message = format!(
                    "{} error pre-testing sqlTemplate[{source}]: {e}",
                    ctx.origin()
                );
                ctx.log(Severity::Error, &message);
                ctx.report_error(&message, &ReactorError::Producer(e));
            }
        }
    }
}
