//! Newline-delimited JSON event feed.
//!
//! Each input line is one event:
//!
//! ```json
//! {"kind": "trades", "data": {"exchange": "COINBASE", "symbol": "BTC-USD", "side": "buy", "price": 1.5}}
//! ```
//!
//! Events are fanned out to the queue of every writer attached to the
//! event's kind. Sending waits for queue space, so a slow writer slows the
//! feed down instead of losing records.

use anyhow::Result;
use k4_core::types::{MessageKind, Record};
use k4_sink::QueueSender;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct FeedEvent {
    pub kind: MessageKind,
    pub data: Record,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<FeedEvent>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Writer queues by message kind.
#[derive(Default)]
pub struct Router {
    routes: Vec<(MessageKind, String, QueueSender)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, kind: MessageKind, label: impl Into<String>, tx: QueueSender) {
        self.routes.push((kind, label.into(), tx));
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Deliver `event` to every writer of its kind. Returns how many queues
    /// accepted it.
    pub async fn dispatch(&self, event: FeedEvent) -> usize {
        let mut delivered = 0;
        for (kind, label, tx) in &self.routes {
            if *kind != event.kind {
                continue;
            }
            match tx.send(event.data.clone()).await {
                Ok(()) => delivered += 1,
                Err(_) => warn!("[{label}] writer stopped, event not delivered"),
            }
        }
        delivered
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FeedStats {
    pub events: u64,
    pub delivered: u64,
    pub unrouted: u64,
    pub malformed: u64,
}

/// Read events until EOF or shutdown.
pub async fn run_feed<R>(reader: R, router: &Router, mut shutdown: watch::Receiver<bool>) -> Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();
    let mut line_no = 0u64;

    loop {
        let line = tokio::select! {
            biased;
            Ok(()) = async { shutdown.wait_for(|stop| *stop).await.map(drop) } => {
                info!("[feed] shutdown requested");
                break;
            }
            line = lines.next_line() => match line? {
                Some(l) => l,
                None => {
                    info!("[feed] end of input");
                    break;
                }
            },
        };
        line_no += 1;

        let event = match parse_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                warn!("[feed] line {line_no}: {e}");
                stats.malformed += 1;
                continue;
            }
        };
        stats.events += 1;
        match router.dispatch(event).await {
            0 => stats.unrouted += 1,
            n => stats.delivered += n as u64,
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_events_and_skips_blank_lines() {
        let ev = parse_line(r#"{"kind":"book","data":{"symbol":"BTC-USD","book":{"bid":[]}}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(ev.kind, MessageKind::Book);
        assert_eq!(ev.data.text("symbol").as_deref(), Some("BTC-USD"));
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line(r#"{"kind":"orderbook","data":{}}"#).is_err());
    }

    #[tokio::test]
    async fn fans_out_by_kind() {
        let (trades_a, mut qa) = k4_sink::queue(8);
        let (trades_b, mut qb) = k4_sink::queue(8);
        let (book, mut qc) = k4_sink::queue(8);
        let mut router = Router::new();
        router.add(MessageKind::Trades, "a", trades_a);
        router.add(MessageKind::Trades, "b", trades_b);
        router.add(MessageKind::Book, "c", book);

        let input = concat!(
            r#"{"kind":"trades","data":{"symbol":"BTC-USD"}}"#,
            "\n\nnot json\n",
            r#"{"kind":"ticker","data":{"symbol":"ETH-USD"}}"#,
            "\n",
        );
        let (_stop, rx) = watch::channel(false);
        let stats = run_feed(input.as_bytes(), &router, rx).await.unwrap();
        assert_eq!(stats, FeedStats { events: 2, delivered: 2, unrouted: 1, malformed: 1 });

        drop(router);
        assert_eq!(qa.next_batch().await.map(|b| b.len()), Some(1));
        assert_eq!(qb.next_batch().await.map(|b| b.len()), Some(1));
        assert!(qc.next_batch().await.is_none());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let router = Router::new();
        let (stop, rx) = watch::channel(true);
        let stats = run_feed(&b"{\"kind\":\"trades\",\"data\":{}}\n"[..], &router, rx).await.unwrap();
        assert_eq!(stats, FeedStats::default());
        drop(stop);
    }
}
