//! Per-printer job executor
//!
//! One worker task per printer drains a FIFO of commands (configure, connect,
//! jobs, disconnect). The cloneable [`PrintJobExecutor`] handle validates input
//! up front and never blocks on printer I/O except where it awaits a reply.
//!
//! ```text
//!   Idle ──connect──▶ Connecting ──ok──▶ Ready ◀──▶ Printing
//!    ▲                    │                 │           │
//!    │                  error             error       error
//!    │                    ▼                 ▼           ▼
//!    └────disconnect──── Faulted ◀──────────┴───────────┘
//! ```

mod job;
mod state;
mod worker;

pub use job::{DirectPrintRequest, JobHandle, PrintJob};
pub use state::ExecutorState;

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::{CutMode, PrinterConfig, PrinterOptions};
use crate::encoder::{decode_base64_image, validate_barcode};
use crate::error::{ConfigurationError, EncodingError, PrintError, PrintResult};
use crate::escpos::EscPosBuilder;
use crate::markup::{Barcode, DEFAULT_QR_SIZE, MarkupBuilder, Symbology, parse};
use crate::settings::ExecutorSettings;
use crate::transport::{SystemTransportFactory, TransportFactory};
use job::{JobBody, QueuedJob};
use state::StateCell;
use worker::{Command, Worker};

/// Trailing feed used by the single-purpose print helpers
const HELPER_FEED_LINES: f32 = 10.0;

/// QR module size used by direct print
const DIRECT_PRINT_QR_SIZE: u8 = 38;

/// State shared between handles and the worker
pub(crate) struct Shared {
    pub(crate) state: StateCell,
    config: Mutex<Option<Arc<PrinterConfig>>>,
    buffer: Mutex<MarkupBuilder>,
    pub(crate) shutdown: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Handle to one printer's executor
///
/// Cheap to clone; all clones talk to the same worker.
#[derive(Clone)]
pub struct PrintJobExecutor {
    tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl PrintJobExecutor {
    /// Start the worker task on the current tokio runtime
    pub fn spawn(factory: Arc<dyn TransportFactory>, settings: ExecutorSettings) -> Self {
        let shared = Arc::new(Shared {
            state: StateCell::new(),
            config: Mutex::new(None),
            buffer: Mutex::new(MarkupBuilder::new()),
            shutdown: CancellationToken::new(),
        });
        let (tx, rx) = mpsc::unbounded_channel();

        let worker = Worker::new(shared.clone(), factory, settings);
        tokio::spawn(worker.run(rx));

        Self { tx, shared }
    }

    /// Executor for real hardware, settings from the environment
    pub fn system() -> Self {
        Self::spawn(
            Arc::new(SystemTransportFactory::default()),
            ExecutorSettings::from_env(),
        )
    }

    pub fn state(&self) -> ExecutorState {
        self.shared.state.get()
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ExecutorState> {
        self.shared.state.subscribe()
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> Option<Arc<PrinterConfig>> {
        lock(&self.shared.config).clone()
    }

    fn send(&self, command: Command) -> PrintResult<()> {
        self.tx.send(command).map_err(|_| PrintError::ExecutorClosed)
    }

    fn require_config(&self) -> PrintResult<Arc<PrinterConfig>> {
        self.config()
            .ok_or(PrintError::Configuration(ConfigurationError::NotConfigured))
    }

    // === Lifecycle ===

    /// Validate and install printer options
    ///
    /// A connection to a different device is closed and the executor returns
    /// to `Idle`; a connection to the same device is kept.
    #[instrument(skip(self, options))]
    pub async fn configure(&self, options: &PrinterOptions) -> PrintResult<()> {
        let config = Arc::new(PrinterConfig::build(options)?);
        tracing::info!(
            printer = %config.target(),
            paper_mm = config.paper_size().mm(),
            chars_per_line = config.characters_per_line(),
            "Printer configured"
        );

        *lock(&self.shared.config) = Some(config.clone());
        let (reply, rx) = oneshot::channel();
        self.send(Command::Configure { config, reply })?;
        rx.await.map_err(|_| PrintError::ExecutorClosed)
    }

    /// Open the connection
    ///
    /// Only one attempt runs at a time; a second caller gets
    /// [`PrintError::AlreadyInProgress`]. Already connected is success.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> PrintResult<()> {
        let config = self.require_config()?;

        let proceed = self.shared.state.update(|state| match *state {
            ExecutorState::Idle | ExecutorState::Faulted => {
                *state = ExecutorState::Connecting;
                Ok(true)
            }
            ExecutorState::Connecting => Err(PrintError::AlreadyInProgress),
            ExecutorState::Ready | ExecutorState::Printing => Ok(false),
        })?;
        if !proceed {
            return Ok(());
        }

        let (reply, rx) = oneshot::channel();
        if let Err(e) = self.send(Command::Connect { config, reply }) {
            self.shared.state.set(ExecutorState::Faulted);
            return Err(e);
        }
        rx.await.map_err(|_| PrintError::ExecutorClosed)?
    }

    /// Close the connection and forget the configuration
    ///
    /// Safe from any state and safe to repeat. The append buffer is kept.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> PrintResult<()> {
        *lock(&self.shared.config) = None;

        let (reply, rx) = oneshot::channel();
        if self.send(Command::Disconnect { reply }).is_err() {
            // Worker gone; it closed the connection on its way out
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    /// Stop the worker; queued jobs fail with [`PrintError::ExecutorClosed`]
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    // === Jobs ===

    /// Queue a markup job
    ///
    /// The markup is parsed here; only `Ready` or `Printing` executors accept
    /// jobs. Jobs run in submission order.
    pub fn submit(&self, job: PrintJob) -> PrintResult<JobHandle> {
        let elements = parse(&job.markup)?;
        self.enqueue(JobBody::Elements {
            elements,
            feed_lines: job.feed_lines,
        })
    }

    /// Queue a job and wait for it
    pub async fn print(&self, job: PrintJob) -> PrintResult<()> {
        self.submit(job)?.wait().await
    }

    fn enqueue(&self, body: JobBody) -> PrintResult<JobHandle> {
        let state = self.state();
        if !state.accepts_jobs() {
            return Err(PrintError::NotReady(state));
        }
        let config = self.require_config()?;

        let (job, handle) = QueuedJob::new(body, config);
        tracing::debug!(job_id = %job.id, "Print job queued");
        self.send(Command::Job(job))?;
        Ok(handle)
    }

    async fn print_raw(&self, bytes: Vec<u8>) -> PrintResult<()> {
        self.enqueue(JobBody::Raw(bytes))?.wait().await
    }

    // === Append API ===

    /// Append markup text to the buffer
    pub fn append_text(&self, markup: &str) -> PrintResult<()> {
        parse(markup)?;
        lock(&self.shared.buffer).text(markup);
        Ok(())
    }

    /// Append a base64 picture, scaled down to the printable width
    pub fn append_image(&self, base64: &str) -> PrintResult<()> {
        let config = self.require_config()?;
        let bitmap = decode_base64_image(base64, config.printable_width_dots() as u32)?;
        lock(&self.shared.buffer).image(bitmap);
        Ok(())
    }

    pub fn append_barcode(&self, barcode: Barcode) -> PrintResult<()> {
        validate_barcode(&barcode)?;
        lock(&self.shared.buffer).barcode(barcode);
        Ok(())
    }

    /// Append a centered QR code; a size of 0 uses the default
    pub fn append_qr_code(&self, content: &str, size: u8) -> PrintResult<()> {
        check_qr_content(content)?;
        let size = if size == 0 { DEFAULT_QR_SIZE } else { size };
        lock(&self.shared.buffer).qr_code(content, size);
        Ok(())
    }

    pub fn append_feed(&self, lines: u32) -> PrintResult<()> {
        lock(&self.shared.buffer).feed(lines);
        Ok(())
    }

    /// Current buffer content
    pub fn buffered_markup(&self) -> String {
        lock(&self.shared.buffer).markup()
    }

    /// Print the buffer as one job and clear it
    ///
    /// The buffer is only cleared once the job is accepted.
    pub async fn start_print(&self) -> PrintResult<()> {
        let handle = {
            let mut buffer = lock(&self.shared.buffer);
            let handle = self.submit(PrintJob::new(buffer.markup()))?;
            buffer.take();
            handle
        };
        handle.wait().await
    }

    // === Single-purpose helpers ===

    pub async fn print_text_and_feed(&self, markup: &str, feed_lines: u32) -> PrintResult<()> {
        self.print(PrintJob::new(markup).with_feed(feed_lines as f32))
            .await
    }

    /// Blank feed, followed by the configured cut / drawer epilogue
    pub async fn print_feed(&self, lines: u32) -> PrintResult<()> {
        self.print(PrintJob::new("[L]").with_feed(lines as f32)).await
    }

    pub async fn print_qr_code(&self, content: &str) -> PrintResult<()> {
        check_qr_content(content)?;
        let mut markup = MarkupBuilder::new();
        markup.qr_code(content, DEFAULT_QR_SIZE).feed(1);
        self.print(PrintJob::new(markup.take()).with_feed(HELPER_FEED_LINES))
            .await
    }

    /// Centered CODE128 barcode
    pub async fn print_barcode(&self, content: &str) -> PrintResult<()> {
        let barcode = Barcode::new(Symbology::Code128, content.trim());
        validate_barcode(&barcode)?;
        let mut markup = MarkupBuilder::new();
        markup.barcode(barcode).feed(1);
        self.print(PrintJob::new(markup.take()).with_feed(HELPER_FEED_LINES))
            .await
    }

    pub async fn print_image(&self, base64: &str) -> PrintResult<()> {
        let config = self.require_config()?;
        let bitmap = decode_base64_image(base64, config.printable_width_dots() as u32)?;
        let mut markup = MarkupBuilder::new();
        markup.image(bitmap).feed(1);
        self.print(PrintJob::new(markup.take()).with_feed(HELPER_FEED_LINES))
            .await
    }

    /// Logo, lines, QR code and picture as one job
    pub async fn direct_print(&self, request: &DirectPrintRequest) -> PrintResult<()> {
        let config = self.require_config()?;
        let max_width = config.printable_width_dots() as u32;
        let mut markup = MarkupBuilder::new();

        if let Some(logo) = request.logo.as_deref().filter(|s| !s.is_empty()) {
            markup.image(decode_base64_image(logo, max_width)?);
        }
        for line in &request.lines {
            markup.text(line);
        }
        if let Some(qr) = request.qr_data.as_deref() {
            check_qr_content(qr)?;
            markup.qr_code(qr, DIRECT_PRINT_QR_SIZE).feed(1);
        }
        if let Some(image) = request.image_base64.as_deref().filter(|s| !s.is_empty()) {
            markup.image(decode_base64_image(image, max_width)?).feed(1);
        }

        self.print(PrintJob::new(markup.take())).await
    }

    // === Raw commands ===

    /// Cut with the configured mode (full when cutting is disabled)
    pub async fn cut_paper(&self) -> PrintResult<()> {
        let config = self.require_config()?;
        let mode = match config.cut_mode() {
            CutMode::None => CutMode::Full,
            mode => mode,
        };
        let mut b = EscPosBuilder::new(config.charset());
        b.cut(mode);
        self.print_raw(b.build()).await
    }

    /// Kick the cash drawer
    pub async fn open_cash_drawer(&self) -> PrintResult<()> {
        let config = self.require_config()?;
        let mut b = EscPosBuilder::new(config.charset());
        b.open_drawer();
        self.print_raw(b.build()).await
    }
}

/// QR payloads live on a single markup line
fn check_qr_content(content: &str) -> Result<(), EncodingError> {
    if content.is_empty() {
        return Err(EncodingError::InvalidQrContent("content is empty".to_string()));
    }
    if content.contains(['\n', '\r']) || content.to_ascii_lowercase().contains("</qrcode>") {
        return Err(EncodingError::InvalidQrContent(
            "content must be a single line without markup".to_string(),
        ));
    }
    Ok(())
}
