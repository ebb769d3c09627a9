//! QuestDB time-series sink over InfluxDB Line Protocol (TCP)

use super::{BatchSink, SinkError};
use crate::feed::PriceEvent;
use async_trait::async_trait;
use std::fmt::Write as _;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// Default ILP address
pub const DEFAULT_ILP_ADDR: &str = "127.0.0.1:9009";

/// Default table name
pub const DEFAULT_TABLE: &str = "ticker";

/// Line-protocol writer for the ticker table.
///
/// The TCP connection is dropped after a failed write and re-established on
/// the next one, so retries start from a clean stream.
pub struct IlpSink {
    addr: String,
    table: String,
    stream: Option<BufWriter<TcpStream>>,
    lines: String,
}

impl IlpSink {
    /// Connect to the ILP endpoint. Failing here is a startup error.
    pub async fn connect(addr: impl Into<String>, table: impl Into<String>) -> Result<Self, SinkError> {
        let addr = addr.into();
        let stream = Self::open(&addr).await?;
        tracing::info!(%addr, "Connected to QuestDB line protocol");

        Ok(Self {
            addr,
            table: table.into(),
            stream: Some(stream),
            lines: String::new(),
        })
    }

    async fn open(addr: &str) -> Result<BufWriter<TcpStream>, SinkError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SinkError::Connect(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true)?;
        Ok(BufWriter::new(stream))
    }

    /// Append a batch of rows to the send buffer
    pub async fn write(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError> {
        self.lines.clear();
        for event in batch {
            format_line(&mut self.lines, &self.table, event);
        }

        if self.stream.is_none() {
            tracing::info!(addr = %self.addr, "Reconnecting to QuestDB line protocol");
            self.stream = Some(Self::open(&self.addr).await?);
        }

        let result = match self.stream.as_mut() {
            Some(stream) => stream.write_all(self.lines.as_bytes()).await,
            None => return Err(SinkError::Closed),
        };

        if let Err(e) = result {
            self.stream = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Push buffered rows to the server
    pub async fn flush(&mut self) -> Result<(), SinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        if let Err(e) = stream.flush().await {
            self.stream = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Flush and shut the connection down
    pub async fn close(&mut self) -> Result<(), SinkError> {
        self.flush().await?;
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BatchSink for IlpSink {
    async fn write_batch(&mut self, batch: &[PriceEvent]) -> Result<(), SinkError> {
        self.write(batch).await?;
        self.flush().await
    }

    async fn close(&mut self) -> Result<(), SinkError> {
        IlpSink::close(self).await
    }
}

/// Render one event as an ILP line (trailing newline included)
pub fn format_line(out: &mut String, table: &str, event: &PriceEvent) {
    escape_into(out, table);
    out.push_str(",type=ticker,product_id=");
    escape_into(out, &event.product_id);
    out.push_str(",side=");
    out.push_str(event.side.as_str());

    // Writing into a String cannot fail
    let _ = write!(
        out,
        " sequence={}i,price={},open_24h={},volume_24h={},low_24h={},high_24h={},\
         volume_30d={},best_bid={},best_bid_size={},best_ask={},best_ask_size={},\
         trade_id={}i,last_size={}",
        event.sequence,
        event.price,
        event.open_24h,
        event.volume_24h,
        event.low_24h,
        event.high_24h,
        event.volume_30d,
        event.best_bid,
        event.best_bid_size,
        event.best_ask,
        event.best_ask_size,
        event.trade_id,
        event.last_size,
    );

    // Out-of-range instants fall back to server-assigned time
    if let Some(nanos) = event.time.timestamp_nanos_opt() {
        let _ = write!(out, " {}", nanos);
    }
    out.push('\n');
}

/// Escape a measurement name or tag value. Line breaks would end the row,
/// so they are written as the two-character sequences `\n` and `\r`.
fn escape_into(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            ',' | ' ' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
}
