//! Executor worker
//!
//! Owns the connection and drains the command queue one message at a time, so
//! jobs for one printer never interleave.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

use super::Shared;
use super::job::{JobBody, QueuedJob};
use super::state::ExecutorState;
use crate::config::PrinterConfig;
use crate::encoder::CommandEncoder;
use crate::error::{PrintError, PrintResult};
use crate::escpos::EscPosBuilder;
use crate::settings::ExecutorSettings;
use crate::transport::{Connection, TransportFactory};

pub(crate) enum Command {
    Configure {
        config: Arc<PrinterConfig>,
        reply: oneshot::Sender<()>,
    },
    Connect {
        config: Arc<PrinterConfig>,
        reply: oneshot::Sender<PrintResult<()>>,
    },
    Job(QueuedJob),
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Worker {
    shared: Arc<Shared>,
    connection: Connection,
    settings: ExecutorSettings,
}

impl Worker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        factory: Arc<dyn TransportFactory>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            shared,
            connection: Connection::new(factory, settings.write_deadline()),
            settings,
        }
    }

    /// Run until shutdown or until every handle is dropped
    pub(crate) async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        tracing::info!("Printer executor started");
        let shutdown = self.shared.shutdown.clone();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Printer executor received shutdown signal");
                    break;
                }
                command = rx.recv() => {
                    let Some(command) = command else {
                        tracing::info!("All executor handles dropped, worker stopping");
                        break;
                    };
                    self.handle(command).await;
                }
            }
        }

        self.connection.close().await;
        self.shared.state.set(ExecutorState::Idle);
        tracing::info!("Printer executor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Configure { config, reply } => {
                self.configure(&config).await;
                let _ = reply.send(());
            }
            Command::Connect { config, reply } => {
                let result = self.connect(&config).await;
                let _ = reply.send(result);
            }
            Command::Job(job) => self.run_job(job).await,
            Command::Disconnect { reply } => {
                self.connection.close().await;
                self.shared.state.set(ExecutorState::Idle);
                let _ = reply.send(());
            }
        }
    }

    /// Drop a connection that points at another device
    async fn configure(&mut self, config: &PrinterConfig) {
        let stale = self
            .connection
            .target()
            .is_some_and(|current| !current.same_device(config.target()));
        if stale {
            tracing::info!(printer = %config.target(), "Printer target changed, closing connection");
            self.connection.close().await;
            self.shared.state.set(ExecutorState::Idle);
        }
    }

    #[instrument(skip(self, config), fields(printer = %config.target()))]
    async fn connect(&mut self, config: &PrinterConfig) -> PrintResult<()> {
        match self.connection.open(config.target()).await {
            Ok(()) => {
                self.shared.state.set(ExecutorState::Ready);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Printer connect failed");
                self.shared.state.set(ExecutorState::Faulted);
                Err(e.into())
            }
        }
    }

    async fn run_job(&mut self, job: QueuedJob) {
        let QueuedJob {
            id,
            body,
            config,
            control,
            reply,
        } = job;

        if !control.start() {
            tracing::debug!(job_id = %id, "Job cancelled before start");
            let _ = reply.send(Err(PrintError::Cancelled));
            return;
        }

        let result = self.execute(body, &config).await;
        match &result {
            Ok(()) => tracing::info!(job_id = %id, "Print job completed"),
            Err(e) => tracing::warn!(job_id = %id, error = %e, "Print job failed"),
        }
        let _ = reply.send(result);
    }

    async fn execute(&mut self, body: JobBody, config: &PrinterConfig) -> PrintResult<()> {
        // Everything is encoded before the first byte goes out
        let segments = match body {
            JobBody::Elements {
                elements,
                feed_lines,
            } => {
                let encoder = CommandEncoder::new(config)?;
                let encoded = match feed_lines {
                    Some(lines) => encoder.encode_with_feed(&elements, lines)?,
                    None => encoder.encode(&elements)?,
                };
                let mut segments = encoded.into_segments();
                let epilogue = epilogue(config);
                if !epilogue.is_empty() {
                    segments.push(epilogue);
                }
                segments
            }
            JobBody::Raw(bytes) => vec![bytes],
        };

        let ready = self.shared.state.update(|state| {
            if state.accepts_jobs() && self.connection.is_connected() {
                *state = ExecutorState::Printing;
                Ok(())
            } else {
                Err(PrintError::NotReady(*state))
            }
        });
        ready?;

        for segment in &segments {
            if let Err(e) = self.connection.write(segment).await {
                self.shared.state.set(ExecutorState::Faulted);
                return Err(e.into());
            }
        }

        if config.disconnect_after_print() {
            if let Err(e) = self.connection.flush().await {
                self.shared.state.set(ExecutorState::Faulted);
                return Err(e.into());
            }
            // Let the printer empty its buffer before anything else is sent
            tokio::time::sleep(self.settings.drain_delay()).await;
        }

        self.shared.state.set(ExecutorState::Ready);
        Ok(())
    }
}

/// Drawer kick, then cut, so the cut is the last thing on the paper
fn epilogue(config: &PrinterConfig) -> Vec<u8> {
    let mut b = EscPosBuilder::new(config.charset());
    if config.open_cash_drawer() {
        b.open_drawer();
    }
    b.cut(config.cut_mode());
    b.build()
}
