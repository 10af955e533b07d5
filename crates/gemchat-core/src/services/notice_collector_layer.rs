use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use tracing::{
    Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::Layer;

use crate::models::notice_store::{Notice, NoticeLevel, NoticeStore};

/// Visitor to extract fields from tracing events
struct FieldVisitor {
    message: Option<String>,
    fields: HashMap<String, String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: HashMap::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value_str = format!("{:?}", value);

        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields.insert(field.name().to_string(), value_str);
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields
                .insert(field.name().to_string(), value.to_string());
        }
    }
}

/// Tracing layer that turns events at or above `min_level` into notices.
///
/// The store already records its own write failures; front ends install this
/// layer at `ERROR` to also surface unexpected failures from anywhere else.
pub struct NoticeCollectorLayer {
    notices: NoticeStore,
    min_level: Level,
}

impl NoticeCollectorLayer {
    pub fn new(notices: NoticeStore, min_level: Level) -> Self {
        Self { notices, min_level }
    }
}

impl<S> Layer<S> for NoticeCollectorLayer
where
    S: Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let metadata = event.metadata();

        // Level ordering: ERROR is the "smallest" level
        if *metadata.level() > self.min_level {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        self.notices.push(Notice {
            timestamp: SystemTime::now(),
            level: if *metadata.level() == Level::ERROR {
                NoticeLevel::Error
            } else {
                NoticeLevel::Warning
            },
            message: visitor.message.unwrap_or_default(),
            target: metadata.target().to_string(),
            fields: visitor.fields,
        });
    }
}
