//! InfluxDB Backend - Line Protocol Push Loop
//!
//! Every `step` the current value of every registered meter is rendered
//! as one line of InfluxDB line protocol and written in batches of at
//! most `batch_size` lines. Counters and gauges carry a single `value`
//! field; timers (milliseconds) and summaries carry `count`, `sum`,
//! `mean` and `upper`.
//!
//! Failed writes are logged and the batch is dropped. There is no retry
//! queue: the next step carries fresh cumulative values anyway.
//!
//! With `compressed` set, request bodies are gzip-encoded and sent with
//! `Content-Encoding: gzip`.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::{Client, Url};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use super::store::MeterStore;
use crate::config::InfluxDbOptions;
use crate::domain::{Meter, MeterId, RegisteredMeter};
use crate::error::{MetricsError, Result};
use crate::ports::line_writer::LineWriter;
use crate::ports::meter_registry::MeterRegistry;

/// Longest response body kept in a write error.
const MAX_ERROR_BODY: usize = 512;

/// Push-based backend writing InfluxDB line protocol.
pub struct InfluxDbBackend {
    /// Renders and writes the store contents.
    publisher: Arc<Publisher>,
    /// Stops the push loop after a final flush.
    shutdown_tx: broadcast::Sender<()>,
    /// Push loop task, taken by the first `shutdown`.
    push_task: Mutex<Option<JoinHandle<()>>>,
}

impl InfluxDbBackend {
    /// Build the backend with the HTTP writer described by `options`.
    pub fn from_options(options: &InfluxDbOptions) -> Result<Self> {
        let writer = HttpLineWriter::new(options)?;
        Self::new(options, Arc::new(writer))
    }

    /// Build the backend around any writer and start the push loop.
    pub fn new(options: &InfluxDbOptions, writer: Arc<dyn LineWriter>) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| MetricsError::NoRuntime("influxdb"))?;

        let publisher = Arc::new(Publisher::new(
            Arc::new(MeterStore::new()),
            writer,
            options.batch_size,
        ));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let push_task = runtime.spawn(push_loop(
            Arc::clone(&publisher),
            options.step(),
            shutdown_rx,
        ));

        info!(
            uri = %options.uri,
            db = %options.db,
            step_secs = options.step_secs,
            "InfluxDB backend started"
        );

        Ok(Self {
            publisher,
            shutdown_tx,
            push_task: Mutex::new(Some(push_task)),
        })
    }

    /// Registry the families register their meters with.
    pub fn meter_registry(&self) -> Arc<dyn MeterRegistry> {
        Arc::clone(&self.publisher.store) as Arc<dyn MeterRegistry>
    }

    /// Render and write the current values now.
    pub async fn flush(&self) -> usize {
        self.publisher.publish().await
    }

    /// Stop the push loop. The loop flushes once more before exiting.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop the push loop and wait for its final flush to complete.
    ///
    /// Later calls return immediately.
    pub async fn shutdown(&self) {
        self.close();
        let task = self
            .push_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };
        if let Err(e) = task.await {
            warn!(error = %e, "InfluxDB push loop ended abnormally");
        }
    }
}

impl Drop for InfluxDbBackend {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for InfluxDbBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxDbBackend")
            .field("meters", &self.publisher.store.len())
            .field("batch_size", &self.publisher.batch_size)
            .finish()
    }
}

/// Renders the store and writes it in batches.
struct Publisher {
    store: Arc<MeterStore>,
    writer: Arc<dyn LineWriter>,
    batch_size: usize,
}

impl Publisher {
    fn new(store: Arc<MeterStore>, writer: Arc<dyn LineWriter>, batch_size: usize) -> Self {
        Self {
            store,
            writer,
            batch_size: batch_size.max(1),
        }
    }

    /// Returns the number of lines accepted by the writer.
    async fn publish(&self) -> usize {
        let timestamp_ms = chrono::Utc::now().timestamp_millis();
        let lines = to_lines(&self.store.meters(), timestamp_ms);
        if lines.is_empty() {
            return 0;
        }

        let mut written = 0;
        for batch in lines.chunks(self.batch_size) {
            match self.writer.write(batch).await {
                Ok(()) => written += batch.len(),
                Err(e) => warn!(lines = batch.len(), error = %e, "InfluxDB write failed, batch dropped"),
            }
        }
        debug!(written, total = lines.len(), "Published meters to InfluxDB");
        written
    }
}

#[instrument(skip(publisher, shutdown_rx))]
async fn push_loop(
    publisher: Arc<Publisher>,
    step: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let step = step.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + step, step);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                publisher.publish().await;
                info!("InfluxDB push loop stopped");
                return;
            }
            _ = ticker.tick() => {
                publisher.publish().await;
            }
        }
    }
}

// ── Line protocol ──

/// Render meters as line protocol, one line per meter.
pub fn to_lines(meters: &[RegisteredMeter], timestamp_ms: i64) -> Vec<String> {
    meters
        .iter()
        .filter_map(|m| line(&m.id, &m.meter, timestamp_ms))
        .collect()
}

fn line(id: &MeterId, meter: &Meter, timestamp_ms: i64) -> Option<String> {
    let (metric_type, fields) = match meter {
        Meter::Counter(c) => ("counter", vec![("value", c.count())]),
        Meter::Gauge(g) => ("gauge", vec![("value", g.value())]),
        Meter::Timer(t) => (
            "histogram",
            vec![
                ("count", t.count() as f64),
                ("sum", millis(t.total_time())),
                ("mean", millis(t.mean())),
                ("upper", millis(t.max())),
            ],
        ),
        Meter::Summary(s) => (
            "histogram",
            vec![
                ("count", s.count() as f64),
                ("sum", s.total()),
                ("mean", s.mean()),
                ("upper", s.max()),
            ],
        ),
    };

    let fields: Vec<String> = fields
        .into_iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| format!("{k}={v}"))
        .collect();
    if fields.is_empty() {
        return None;
    }

    let mut out = escape(&id.name, &[',', ' ']);
    for tag in &id.tags {
        if tag.value.is_empty() {
            continue;
        }
        out.push(',');
        out.push_str(&escape(&tag.key, &[',', '=', ' ']));
        out.push('=');
        out.push_str(&escape(&tag.value, &[',', '=', ' ']));
    }
    out.push_str(",metric_type=");
    out.push_str(metric_type);
    out.push(' ');
    out.push_str(&fields.join(","));
    out.push(' ');
    out.push_str(&timestamp_ms.to_string());
    Some(out)
}

fn millis(d: Duration) -> f64 {
    d.as_nanos() as f64 / 1_000_000.0
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ── HTTP writer ──

/// Writes batches to the InfluxDB 1.x HTTP API.
pub struct HttpLineWriter {
    client: Client,
    /// `{uri}/write?...` with all query parameters.
    write_url: Url,
    /// `{uri}/query` for database creation.
    query_url: Url,
    db: String,
    user_name: Option<String>,
    password: Option<String>,
    /// Gzip request bodies.
    compressed: bool,
    /// Set once `CREATE DATABASE` succeeded.
    database_ready: AtomicBool,
}

impl HttpLineWriter {
    pub fn new(options: &InfluxDbOptions) -> Result<Self> {
        let base = options.uri.trim_end_matches('/');
        let invalid = |reason: String| MetricsError::InvalidUri {
            uri: options.uri.clone(),
            reason,
        };

        let mut write_url = Url::parse(&format!("{base}/write")).map_err(|e| invalid(e.to_string()))?;
        {
            let mut query = write_url.query_pairs_mut();
            query
                .append_pair("consistency", "one")
                .append_pair("precision", "ms")
                .append_pair("db", &options.db);
            if let Some(rp) = &options.retention_policy {
                query.append_pair("rp", rp);
            }
        }
        let query_url = Url::parse(&format!("{base}/query")).map_err(|e| invalid(e.to_string()))?;

        let client = Client::builder()
            .connect_timeout(options.connect_timeout())
            .timeout(options.read_timeout())
            .build()?;

        Ok(Self {
            client,
            write_url,
            query_url,
            db: options.db.clone(),
            user_name: options.user_name.clone(),
            password: options.password.clone(),
            compressed: options.compressed,
            database_ready: AtomicBool::new(false),
        })
    }

    /// Target of line writes.
    pub fn write_url(&self) -> &Url {
        &self.write_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.user_name {
            Some(user) => request.basic_auth(user, self.password.as_ref()),
            None => request,
        }
    }

    async fn ensure_database(&self) {
        if self.database_ready.load(Ordering::Acquire) {
            return;
        }
        let statement = format!("CREATE DATABASE \"{}\"", self.db.replace('"', "\\\""));
        let request = self
            .client
            .post(self.query_url.clone())
            .query(&[("q", statement.as_str())]);
        match self.authorize(request).send().await {
            Ok(response) if response.status().is_success() => {
                self.database_ready.store(true, Ordering::Release);
                debug!(db = %self.db, "InfluxDB database ensured");
            }
            Ok(response) => {
                warn!(db = %self.db, status = %response.status(), "Unable to create InfluxDB database");
            }
            Err(e) => warn!(db = %self.db, error = %e, "Unable to create InfluxDB database"),
        }
    }
}

#[async_trait]
impl LineWriter for HttpLineWriter {
    async fn write(&self, lines: &[String]) -> Result<()> {
        self.ensure_database().await;

        let body = lines.join("\n");
        let request = self
            .client
            .post(self.write_url.clone())
            .header(reqwest::header::CONTENT_TYPE, "text/plain; charset=utf-8");
        let request = if self.compressed {
            request
                .header(reqwest::header::CONTENT_ENCODING, "gzip")
                .body(gzip(body.as_bytes()).map_err(MetricsError::Compress)?)
        } else {
            request.body(body)
        };
        let response = self.authorize(request).send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(MetricsError::InfluxWrite {
            status: status.as_u16(),
            body,
        })
    }
}

fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;
    use crate::domain::{Counter, Gauge, Summary, Timer};

    #[derive(Default)]
    struct RecordingWriter {
        batches: Mutex<Vec<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl LineWriter for RecordingWriter {
        async fn write(&self, lines: &[String]) -> Result<()> {
            if self.fail {
                return Err(MetricsError::InfluxWrite {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.batches.lock().unwrap().push(lines.to_vec());
            Ok(())
        }
    }

    fn registered(name: &str, tags: &[(&str, &str)], meter: Meter) -> RegisteredMeter {
        let keys: Vec<String> = tags.iter().map(|(k, _)| k.to_string()).collect();
        let values: Vec<&str> = tags.iter().map(|(_, v)| *v).collect();
        RegisteredMeter {
            id: MeterId::new(name, "", &keys, &values),
            meter,
        }
    }

    #[test]
    fn test_counter_and_gauge_lines() {
        let counter = Arc::new(Counter::default());
        counter.increment_by(5.0);
        let gauge = Arc::new(Gauge::default());
        gauge.set(-2.5);

        let lines = to_lines(
            &[
                registered("vertx_eventbus_sent", &[("address", "a b"), ("side", "local")], Meter::Counter(counter)),
                registered("vertx_pool_in_use", &[("pool_name", "w=1,2")], Meter::Gauge(gauge)),
            ],
            1_000,
        );
        assert_eq!(
            lines,
            vec![
                r"vertx_eventbus_sent,address=a\ b,side=local,metric_type=counter value=5 1000",
                r"vertx_pool_in_use,pool_name=w\=1\,2,metric_type=gauge value=-2.5 1000",
            ]
        );
    }

    #[test]
    fn test_timer_line_in_millis() {
        let timer = Arc::new(Timer::default());
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(30));

        let lines = to_lines(&[registered("t", &[], Meter::Timer(timer))], 7);
        assert_eq!(lines, vec!["t,metric_type=histogram count=2,sum=40,mean=20,upper=30 7"]);
    }

    #[test]
    fn test_summary_line_and_empty_tag_skipped() {
        let summary = Arc::new(Summary::default());
        summary.record(4.0);
        let lines = to_lines(&[registered("s", &[("local", "")], Meter::Summary(summary))], 1);
        assert_eq!(lines, vec!["s,metric_type=histogram count=1,sum=4,mean=4,upper=4 1"]);
    }

    #[tokio::test]
    async fn test_publish_batches() {
        let store = Arc::new(MeterStore::new());
        for i in 0..5 {
            store
                .register(
                    MeterId::new("c", "", &["i".to_string()], &[i.to_string()]),
                    Meter::Counter(Arc::new(Counter::default())),
                )
                .unwrap();
        }
        let writer = Arc::new(RecordingWriter::default());
        let publisher = Publisher::new(store, Arc::clone(&writer) as Arc<dyn LineWriter>, 2);

        assert_eq!(publisher.publish().await, 5);
        let sizes: Vec<usize> = writer.batches.lock().unwrap().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_failed_write_is_dropped() {
        let store = Arc::new(MeterStore::new());
        store
            .register(
                MeterId::new("c", "", &[], &[] as &[&str]),
                Meter::Counter(Arc::new(Counter::default())),
            )
            .unwrap();
        let writer = Arc::new(RecordingWriter {
            fail: true,
            ..RecordingWriter::default()
        });
        let publisher = Publisher::new(store, writer, 10);
        assert_eq!(tokio_test::block_on(publisher.publish()), 0);
    }

    #[test]
    fn test_gzip_body_decodes_to_lines() {
        let body = "a,metric_type=counter value=1 1\nb,metric_type=gauge value=2 1";
        let compressed = gzip(body.as_bytes()).unwrap();
        assert_eq!(&compressed[..2], &[0x1f_u8, 0x8b]);

        let mut decoded = String::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, body);
    }

    #[tokio::test]
    async fn test_shutdown_flushes_once_and_stops() {
        let writer = Arc::new(RecordingWriter::default());
        let options = InfluxDbOptions {
            step_secs: 3600,
            ..InfluxDbOptions::default()
        };
        let backend =
            InfluxDbBackend::new(&options, Arc::clone(&writer) as Arc<dyn LineWriter>).unwrap();
        backend
            .meter_registry()
            .register(
                MeterId::new("c", "", &[], &[] as &[&str]),
                Meter::Counter(Arc::new(Counter::default())),
            )
            .unwrap();

        backend.shutdown().await;
        assert_eq!(writer.batches.lock().unwrap().len(), 1);

        backend.shutdown().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(writer.batches.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_write_url() {
        let options = InfluxDbOptions {
            uri: "http://influx:8086/".to_string(),
            db: "vertx".to_string(),
            retention_policy: Some("week".to_string()),
            ..InfluxDbOptions::default()
        };
        let writer = HttpLineWriter::new(&options).unwrap();
        assert_eq!(
            writer.write_url().as_str(),
            "http://influx:8086/write?consistency=one&precision=ms&db=vertx&rp=week"
        );
    }

    #[test]
    fn test_invalid_uri() {
        let options = InfluxDbOptions {
            uri: "not a uri".to_string(),
            ..InfluxDbOptions::default()
        };
        assert!(matches!(
            HttpLineWriter::new(&options),
            Err(MetricsError::InvalidUri { .. })
        ));
    }

    #[test]
    fn test_backend_requires_runtime() {
        let writer = Arc::new(RecordingWriter::default());
        assert!(matches!(
            InfluxDbBackend::new(&InfluxDbOptions::default(), writer),
            Err(MetricsError::NoRuntime("influxdb"))
        ));
    }
}
