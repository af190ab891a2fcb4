//! Print a sample receipt
//!
//! With `PRINTER_HOST` set the receipt goes to that network printer; otherwise
//! it is rendered into memory and dumped as hex.
//!
//! Run: PRINTER_HOST=192.168.1.100 cargo run --example print_receipt

use std::sync::Arc;

use escpos_printer::markup::{Barcode, Symbology};
use escpos_printer::{
    ExecutorSettings, MemoryTransportFactory, PrintJobExecutor, PrinterOptions,
    SystemTransportFactory, TransportFactory,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let host = std::env::var("PRINTER_HOST").ok();
    let memory = MemoryTransportFactory::new();
    let link = memory.link();

    let (factory, options): (Arc<dyn TransportFactory>, _) = match &host {
        Some(host) => (
            Arc::new(SystemTransportFactory::default()),
            PrinterOptions::network(host),
        ),
        None => (Arc::new(memory), PrinterOptions::network("dry-run")),
    };

    let printer = PrintJobExecutor::spawn(factory, ExecutorSettings::from_env());
    printer.configure(&options).await?;
    printer.connect().await?;

    printer.append_text("[C]<font size='big'><b>HARBOUR CAFE</b></font>")?;
    printer.append_text("[C]Table 12")?;
    printer.append_feed(1)?;
    printer.append_text("[L]Flat white x2[R]7.00\n[L]Croissant[R]3.20")?;
    printer.append_text("[L]<b>Total</b>[R]<b>10.20</b>")?;
    printer.append_feed(1)?;
    printer.append_barcode(Barcode::new(Symbology::Ean13, "590123412345"))?;
    printer.append_qr_code("https://example.com/r/12", 6)?;
    printer.start_print().await?;

    printer.disconnect().await?;

    if host.is_none() {
        let bytes = link.written();
        println!("{} bytes", bytes.len());
        for chunk in bytes.chunks(32) {
            println!("{}", hex::encode(chunk));
        }
    }
    Ok(())
}
