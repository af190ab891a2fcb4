//! Executor behaviour against the in-memory transport

use std::sync::Arc;
use std::time::Duration;

use escpos_printer::markup::{Barcode, Symbology};
use escpos_printer::transport::MemoryLink;
use escpos_printer::{
    ConfigurationError, ConnectionError, EncodingError, ExecutorSettings, ExecutorState,
    MemoryTransportFactory, PrintError, PrintJob, PrintJobExecutor, PrinterOptions,
};

const CUT_FULL: [u8; 4] = [0x1D, 0x56, 0x41, 0x00];

fn executor() -> (PrintJobExecutor, MemoryLink) {
    let factory = MemoryTransportFactory::new();
    let link = factory.link();
    let exec = PrintJobExecutor::spawn(
        Arc::new(factory),
        ExecutorSettings::with_overrides(1_000, 0),
    );
    (exec, link)
}

fn options() -> PrinterOptions {
    PrinterOptions::network("printer.local")
}

async fn ready_executor() -> (PrintJobExecutor, MemoryLink) {
    let (exec, link) = executor();
    exec.configure(&options()).await.unwrap();
    exec.connect().await.unwrap();
    assert_eq!(exec.state(), ExecutorState::Ready);
    (exec, link)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[tokio::test]
async fn test_qr_job_end_to_end() {
    let (exec, link) = ready_executor().await;
    let mut transitions = exec.subscribe();

    exec.print(PrintJob::new(
        "[C]<qrcode size='6'>https://example.com</qrcode>",
    ))
    .await
    .unwrap();

    let out = link.written();
    assert_eq!(&out[..2], &[0x1B, 0x40]);
    assert!(find(&out, &[0x1D, 0x28, 0x6B]).is_some());
    assert!(find(&out, b"https://example.com").is_some());
    assert!(out.ends_with(&CUT_FULL));

    assert_eq!(transitions.recv().await.unwrap(), ExecutorState::Printing);
    assert_eq!(transitions.recv().await.unwrap(), ExecutorState::Ready);
    assert_eq!(exec.state(), ExecutorState::Ready);
}

#[tokio::test]
async fn test_jobs_run_in_submission_order() {
    let (exec, link) = ready_executor().await;

    let handles: Vec<_> = ["[L]first", "[L]second", "[L]third"]
        .into_iter()
        .map(|markup| exec.submit(PrintJob::new(markup)).unwrap())
        .collect();
    for handle in handles {
        handle.wait().await.unwrap();
    }

    let out = link.written();
    let first = find(&out, b"first").unwrap();
    let second = find(&out, b"second").unwrap();
    let third = find(&out, b"third").unwrap();
    assert!(first < second && second < third);
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (exec, _link) = executor();
    exec.disconnect().await.unwrap();
    exec.disconnect().await.unwrap();
    assert_eq!(exec.state(), ExecutorState::Idle);

    let (exec, link) = ready_executor().await;
    exec.disconnect().await.unwrap();
    exec.disconnect().await.unwrap();
    assert_eq!(exec.state(), ExecutorState::Idle);
    assert_eq!(link.open_handles(), 0);
    assert_eq!(link.disconnect_count(), 1);
    assert!(exec.config().is_none());
}

#[tokio::test]
async fn test_wrong_check_digit_writes_nothing() {
    let (exec, link) = ready_executor().await;

    let err = exec
        .print(PrintJob::new(
            "[C]<barcode type='ean13'>5901234123458</barcode>",
        ))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PrintError::Encoding(EncodingError::InvalidBarcodeContent { .. })
    ));
    assert!(link.written().is_empty());
    assert_eq!(exec.state(), ExecutorState::Ready);

    // The right check digit prints
    exec.print(PrintJob::new(
        "[C]<barcode type='ean13'>5901234123457</barcode>",
    ))
    .await
    .unwrap();
    assert!(find(&link.written(), b"5901234123457").is_some());
}

#[tokio::test]
async fn test_concurrent_connect_is_rejected() {
    let (exec, link) = executor();
    exec.configure(&options()).await.unwrap();
    link.set_connect_delay(Duration::from_millis(100));

    let first = tokio::spawn({
        let exec = exec.clone();
        async move { exec.connect().await }
    });
    while exec.state() != ExecutorState::Connecting {
        tokio::task::yield_now().await;
    }

    assert_eq!(exec.connect().await, Err(PrintError::AlreadyInProgress));
    first.await.unwrap().unwrap();
    assert_eq!(exec.state(), ExecutorState::Ready);

    // Connected already: no second transport
    exec.connect().await.unwrap();
    assert_eq!(link.created(), 1);
}

#[tokio::test]
async fn test_cancel_queued_job() {
    let (exec, link) = ready_executor().await;

    let running = exec.submit(PrintJob::new("[L]first")).unwrap();
    let queued = exec.submit(PrintJob::new("[L]second")).unwrap();
    assert!(queued.cancel());
    assert!(!queued.cancel());

    running.wait().await.unwrap();
    assert_eq!(queued.wait().await, Err(PrintError::Cancelled));

    let out = link.written();
    assert!(find(&out, b"first").is_some());
    assert!(find(&out, b"second").is_none());
    assert_eq!(exec.state(), ExecutorState::Ready);
}

#[tokio::test]
async fn test_started_job_cannot_be_cancelled() {
    let (exec, link) = ready_executor().await;
    link.set_write_delay(Duration::from_millis(50));

    let job = exec.submit(PrintJob::new("[L]slow")).unwrap();
    while exec.state() != ExecutorState::Printing {
        tokio::task::yield_now().await;
    }
    assert!(!job.cancel());
    job.wait().await.unwrap();
}

#[tokio::test]
async fn test_write_failure_faults_executor() {
    let (exec, link) = ready_executor().await;
    link.fail_writes(ConnectionError::IoFailure("broken pipe".to_string()));

    let err = exec.print(PrintJob::new("[L]lost")).await.unwrap_err();
    assert!(matches!(
        err,
        PrintError::Connection(ConnectionError::IoFailure(_))
    ));
    assert_eq!(exec.state(), ExecutorState::Faulted);
    assert_eq!(link.open_handles(), 0);

    assert_eq!(
        exec.submit(PrintJob::new("[L]again")).unwrap_err(),
        PrintError::NotReady(ExecutorState::Faulted)
    );

    // Reconnect builds a fresh transport
    link.clear_faults();
    exec.connect().await.unwrap();
    exec.print(PrintJob::new("[L]again")).await.unwrap();
    assert_eq!(link.created(), 2);
}

#[tokio::test]
async fn test_write_deadline_faults_executor() {
    let factory = MemoryTransportFactory::new();
    let link = factory.link();
    let exec = PrintJobExecutor::spawn(Arc::new(factory), ExecutorSettings::with_overrides(20, 0));
    exec.configure(&options()).await.unwrap();
    exec.connect().await.unwrap();

    link.set_write_delay(Duration::from_millis(500));
    let err = exec.print(PrintJob::new("[L]stuck")).await.unwrap_err();
    assert!(matches!(
        err,
        PrintError::Connection(ConnectionError::Timeout(_))
    ));
    assert_eq!(exec.state(), ExecutorState::Faulted);
}

#[tokio::test]
async fn test_connect_failure_then_retry() {
    let (exec, link) = executor();
    exec.configure(&options()).await.unwrap();

    link.fail_next_connect(ConnectionError::PermissionDenied("not paired".to_string()));
    assert_eq!(
        exec.connect().await,
        Err(PrintError::Connection(ConnectionError::PermissionDenied(
            "not paired".to_string()
        )))
    );
    assert_eq!(exec.state(), ExecutorState::Faulted);

    exec.connect().await.unwrap();
    assert_eq!(exec.state(), ExecutorState::Ready);
}

#[tokio::test]
async fn test_operations_need_configuration_and_connection() {
    let (exec, _link) = executor();
    assert_eq!(
        exec.connect().await,
        Err(PrintError::Configuration(ConfigurationError::NotConfigured))
    );
    assert_eq!(
        exec.submit(PrintJob::new("[L]x")).unwrap_err(),
        PrintError::NotReady(ExecutorState::Idle)
    );

    assert!(matches!(
        exec.configure(&PrinterOptions::default()).await,
        Err(PrintError::Configuration(ConfigurationError::MissingIdentity))
    ));

    // Bad markup is reported before the state check matters
    exec.configure(&options()).await.unwrap();
    exec.connect().await.unwrap();
    assert!(matches!(
        exec.submit(PrintJob::new("[L]<b>open")),
        Err(PrintError::Parser(_))
    ));
}

#[tokio::test]
async fn test_reconfigure_other_device_drops_connection() {
    let (exec, link) = ready_executor().await;

    let mut same = options();
    same.paper_size = Some(80);
    exec.configure(&same).await.unwrap();
    assert_eq!(exec.state(), ExecutorState::Ready);
    assert_eq!(exec.config().unwrap().characters_per_line(), 48);

    exec.configure(&PrinterOptions::network("other.local"))
        .await
        .unwrap();
    assert_eq!(exec.state(), ExecutorState::Idle);
    assert_eq!(link.open_handles(), 0);
}

#[tokio::test]
async fn test_append_buffer_prints_once() {
    let (exec, link) = ready_executor().await;

    exec.append_text("[C]<b>Total</b>[R]12.50").unwrap();
    exec.append_barcode(Barcode::new(Symbology::Ean13, "590123412345"))
        .unwrap();
    exec.append_qr_code("order-42", 0).unwrap();
    exec.append_feed(2).unwrap();

    // Rejected input leaves the buffer alone
    let before = exec.buffered_markup();
    assert!(exec.append_text("<u>dangling").is_err());
    assert!(exec
        .append_barcode(Barcode::new(Symbology::Ean13, "5901234123458"))
        .is_err());
    assert!(exec.append_qr_code("", 4).is_err());
    assert_eq!(exec.buffered_markup(), before);
    assert!(before.contains("<qrcode size='25'>order-42</qrcode>"));

    exec.start_print().await.unwrap();
    assert!(exec.buffered_markup().is_empty());

    let out = link.written();
    assert!(find(&out, b"Total").is_some());
    assert!(find(&out, b"5901234123457").is_some());
    assert!(find(&out, b"order-42").is_some());
    assert!(out.ends_with(&CUT_FULL));
}

#[tokio::test]
async fn test_buffer_survives_rejected_start() {
    let (exec, _link) = executor();
    exec.append_text("[L]kept").unwrap();
    assert_eq!(
        exec.start_print().await,
        Err(PrintError::NotReady(ExecutorState::Idle))
    );
    assert_eq!(exec.buffered_markup(), "[L][L]kept");
}

#[tokio::test]
async fn test_raw_commands() {
    let (exec, link) = ready_executor().await;

    exec.cut_paper().await.unwrap();
    assert_eq!(link.written(), CUT_FULL);

    link.clear();
    exec.open_cash_drawer().await.unwrap();
    assert_eq!(link.written(), vec![0x1B, 0x70, 0x00, 25, 250]);

    // Cutting disabled still cuts on request
    let mut no_cut = options();
    no_cut.cut_paper_type = Some(escpos_printer::CutMode::None);
    exec.configure(&no_cut).await.unwrap();
    link.clear();
    exec.cut_paper().await.unwrap();
    assert_eq!(link.written(), CUT_FULL);
}

#[tokio::test]
async fn test_print_helpers() {
    let (exec, link) = ready_executor().await;

    exec.print_barcode("ABC-123").await.unwrap();
    let out = link.written();
    // GS k 73 with the code set B prefix
    assert!(find(&out, b"\x1D\x6B\x49").is_some());
    assert!(find(&out, b"{BABC-123").is_some());

    link.clear();
    exec.print_qr_code("hello").await.unwrap();
    assert!(find(&link.written(), b"hello").is_some());

    link.clear();
    exec.print_feed(3).await.unwrap();
    assert!(link.written().ends_with(&CUT_FULL));

    link.clear();
    exec.print_text_and_feed("[C]Thanks", 2).await.unwrap();
    assert!(find(&link.written(), b"Thanks").is_some());
}

#[tokio::test]
async fn test_direct_print_lines_and_qr() {
    let (exec, link) = ready_executor().await;

    let request = escpos_printer::DirectPrintRequest {
        lines: vec!["Table 4".to_string(), "<b>Total</b>[R]9.00".to_string()],
        qr_data: Some("https://example.com/r/4".to_string()),
        ..Default::default()
    };
    exec.direct_print(&request).await.unwrap();

    let out = link.written();
    let table = find(&out, b"Table 4").unwrap();
    let qr = find(&out, b"https://example.com/r/4").unwrap();
    assert!(table < qr);
    assert!(out.ends_with(&CUT_FULL));
}

#[tokio::test]
async fn test_shutdown_closes_executor() {
    let (exec, link) = ready_executor().await;
    exec.shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(exec.state(), ExecutorState::Idle);
    assert_eq!(link.open_handles(), 0);
    assert_eq!(exec.connect().await, Err(PrintError::ExecutorClosed));
    exec.disconnect().await.unwrap();
}
