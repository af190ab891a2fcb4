//! Print jobs and their handles

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::config::PrinterConfig;
use crate::error::{PrintError, PrintResult};
use crate::markup::Element;

/// A markup job
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJob {
    pub markup: String,
    /// Trailing feed in lines; `None` uses the configured `feedAfterPrint`
    pub feed_lines: Option<f32>,
}

impl PrintJob {
    pub fn new(markup: impl Into<String>) -> Self {
        Self {
            markup: markup.into(),
            feed_lines: None,
        }
    }

    pub fn with_feed(mut self, lines: f32) -> Self {
        self.feed_lines = Some(lines);
        self
    }
}

/// Logo, text lines, QR code and picture printed as one job
///
/// ```ignore
/// { "logo": "<base64>", "lines": ["Table 4", "Total 12.50"],
///   "dataQr": "https://example.com/r/123", "printBase64": null }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DirectPrintRequest {
    /// Base64 picture printed first, centered
    pub logo: Option<String>,
    /// Markup lines, left aligned
    pub lines: Vec<String>,
    #[serde(alias = "dataQr")]
    pub qr_data: Option<String>,
    /// Base64 picture printed last
    #[serde(alias = "printBase64")]
    pub image_base64: Option<String>,
}

/// What the worker writes for a job
#[derive(Debug)]
pub(crate) enum JobBody {
    /// Parsed markup; encoded by the worker and followed by the epilogue
    Elements {
        elements: Vec<Element>,
        feed_lines: Option<f32>,
    },
    /// Bytes written as-is (standalone cut, drawer kick)
    Raw(Vec<u8>),
}

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// Cancellation flag shared between a handle and the worker
///
/// Exactly one of [`cancel`](Self::cancel) and [`start`](Self::start) wins.
#[derive(Debug, Default)]
pub(crate) struct JobControl {
    phase: AtomicU8,
}

impl JobControl {
    pub(crate) fn cancel(&self) -> bool {
        self.phase
            .compare_exchange(QUEUED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn start(&self) -> bool {
        self.phase
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A job waiting in the worker queue
pub(crate) struct QueuedJob {
    pub(crate) id: Uuid,
    pub(crate) body: JobBody,
    pub(crate) config: Arc<PrinterConfig>,
    pub(crate) control: Arc<JobControl>,
    pub(crate) reply: oneshot::Sender<PrintResult<()>>,
}

impl QueuedJob {
    pub(crate) fn new(body: JobBody, config: Arc<PrinterConfig>) -> (Self, JobHandle) {
        let id = Uuid::new_v4();
        let control = Arc::new(JobControl::default());
        let (reply, rx) = oneshot::channel();
        let job = Self {
            id,
            body,
            config,
            control: control.clone(),
            reply,
        };
        let handle = JobHandle { id, control, rx };
        (job, handle)
    }
}

/// Caller side of a submitted job
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    control: Arc<JobControl>,
    rx: oneshot::Receiver<PrintResult<()>>,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancel the job if the worker has not started it yet
    ///
    /// Returns `false` once the job is running or finished.
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    /// Wait for the job outcome
    pub async fn wait(self) -> PrintResult<()> {
        self.rx.await.map_err(|_| PrintError::ExecutorClosed)?
    }
}
