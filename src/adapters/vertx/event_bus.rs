//! Event Bus Metrics - Handlers, Messages and Reply Failures
//!
//! Message flow on one address:
//! 1. `message_sent` counts a send or a publish.
//! 2. `message_received` adds the number of matching handlers to the
//!    pending gauge and counts delivery when at least one handler exists.
//! 3. Each handler brackets its work with `begin_handle_message` (one
//!    message leaves pending, processing timer starts) and
//!    `end_handle_message` (timer ends, failure class counted).

use std::sync::Arc;

use crate::domain::{TimerSample, labels};
use crate::ports::meter_registry::MeterRegistry;
use crate::ports::metrics_spi::{EventBusMetrics, ReplyFailure};
use crate::usecases::{Counters, Gauges, Summaries, Timers};

/// Families of the event bus category.
pub struct VertxEventBusMetrics {
    handlers: Gauges,
    pending: Gauges,
    published: Counters,
    sent: Counters,
    received: Counters,
    delivered: Counters,
    errors: Counters,
    reply_failures: Counters,
    processing_time: Timers,
    bytes_read: Summaries,
    bytes_written: Summaries,
}

impl VertxEventBusMetrics {
    pub fn new(registry: &Arc<dyn MeterRegistry>) -> Self {
        let address_side = [labels::ADDRESS, labels::SIDE];
        Self {
            handlers: Gauges::new(
                "vertx_eventbus_handlers",
                "Number of event bus handlers in use",
                Arc::clone(registry),
                &[labels::ADDRESS],
            ),
            pending: Gauges::new(
                "vertx_eventbus_pending",
                "Number of messages not processed yet",
                Arc::clone(registry),
                &address_side,
            ),
            published: Counters::new(
                "vertx_eventbus_published",
                "Number of messages published (publish / subscribe)",
                Arc::clone(registry),
                &address_side,
            ),
            sent: Counters::new(
                "vertx_eventbus_sent",
                "Number of messages sent (point-to-point)",
                Arc::clone(registry),
                &address_side,
            ),
            received: Counters::new(
                "vertx_eventbus_received",
                "Number of messages received",
                Arc::clone(registry),
                &address_side,
            ),
            delivered: Counters::new(
                "vertx_eventbus_delivered",
                "Number of messages delivered to handlers",
                Arc::clone(registry),
                &address_side,
            ),
            errors: Counters::new(
                "vertx_eventbus_errors",
                "Number of errors",
                Arc::clone(registry),
                &[labels::ADDRESS, labels::CLASS],
            ),
            reply_failures: Counters::new(
                "vertx_eventbus_reply_failures",
                "Number of message reply failures",
                Arc::clone(registry),
                &[labels::ADDRESS, labels::FAILURE],
            ),
            processing_time: Timers::new(
                "vertx_eventbus_processing_time",
                "Processing time",
                Arc::clone(registry),
                &[labels::ADDRESS],
            ),
            bytes_read: Summaries::new(
                "vertx_eventbus_bytes_read",
                "Number of bytes received while reading messages from event bus cluster peers",
                Arc::clone(registry),
                &[labels::ADDRESS],
            ),
            bytes_written: Summaries::new(
                "vertx_eventbus_bytes_written",
                "Number of bytes sent while sending messages to event bus cluster peers",
                Arc::clone(registry),
                &[labels::ADDRESS],
            ),
        }
    }

    /// Run one handler invocation between `begin_handle_message` and
    /// `end_handle_message`.
    ///
    /// An `Err` is counted under its simple type name and returned
    /// unchanged.
    pub fn measure<T, E>(
        &self,
        handler: &EventBusHandler,
        local: bool,
        f: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        self.measure_with(handler, local, f, labels::error_class::<E>)
    }

    /// Like [`measure`](Self::measure), with the `class` label of an
    /// `Err` chosen by `classify`.
    pub fn measure_with<T, E>(
        &self,
        handler: &EventBusHandler,
        local: bool,
        f: impl FnOnce() -> Result<T, E>,
        classify: impl FnOnce(&E) -> String,
    ) -> Result<T, E> {
        let timing = self.begin_handle_message(handler, local);
        let result = f();
        match &result {
            Ok(_) => self.end_handle_message(handler, timing, None),
            Err(e) => {
                let class = classify(e);
                self.end_handle_message(handler, timing, Some(class.as_str()));
            }
        }
        result
    }
}

/// A registered consumer.
#[derive(Debug, Clone)]
pub struct EventBusHandler {
    address: String,
}

impl EventBusHandler {
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl EventBusMetrics for VertxEventBusMetrics {
    type Handler = EventBusHandler;
    type HandlerTiming = TimerSample;

    fn handler_registered(&self, address: &str) -> EventBusHandler {
        self.handlers.get(&[address]).increment();
        EventBusHandler {
            address: address.to_string(),
        }
    }

    fn handler_unregistered(&self, handler: EventBusHandler) {
        self.handlers.get(&[handler.address.as_str()]).decrement();
    }

    fn begin_handle_message(&self, handler: &EventBusHandler, local: bool) -> TimerSample {
        self.pending
            .get(&[handler.address.as_str(), labels::side(local)])
            .decrement();
        self.processing_time.start(&[handler.address.as_str()])
    }

    fn end_handle_message(
        &self,
        handler: &EventBusHandler,
        timing: TimerSample,
        failure: Option<&str>,
    ) {
        timing.end();
        if let Some(class) = failure {
            self.errors
                .get(&[handler.address.as_str(), class])
                .increment();
        }
    }

    fn message_sent(&self, address: &str, publish: bool, local: bool) {
        let counter = if publish { &self.published } else { &self.sent };
        counter.get(&[address, labels::side(local)]).increment();
    }

    fn message_received(&self, address: &str, _publish: bool, local: bool, handlers: usize) {
        let values = [address, labels::side(local)];
        self.pending.get(&values).add(handlers as f64);
        self.received.get(&values).increment();
        if handlers > 0 {
            self.delivered.get(&values).increment();
        }
    }

    fn message_written(&self, address: &str, bytes: u64) {
        self.bytes_written.get(&[address]).record(bytes as f64);
    }

    fn message_read(&self, address: &str, bytes: u64) {
        self.bytes_read.get(&[address]).record(bytes as f64);
    }

    fn reply_failure(&self, address: &str, failure: ReplyFailure) {
        let failure = failure.to_string();
        self.reply_failures
            .get(&[address, failure.as_str()])
            .increment();
    }
}
