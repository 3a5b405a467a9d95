#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

pub const RECIPIENT: &str = "000051309";

pub fn header(recipient: &str) -> String {
    format!("A0{:<6}{}{}{}{:<9}", "002.0a", "20241102", "031500", "N", recipient)
}

pub struct Line<'a> {
    pub store: &'a str,
    pub date: &'a str,
    pub brand: &'a str,
    pub product: &'a str,
    pub installments: &'a str,
    pub gross: &'a str,
    pub net: &'a str,
    pub nsu: &'a str,
}

impl Default for Line<'_> {
    fn default() -> Self {
        Line {
            store: "000000000012345",
            date: "20241101",
            brand: "001",
            product: "010",
            installments: "01",
            gross: "10000",
            net: "9750",
            nsu: "000000000123",
        }
    }
}

pub fn transaction(line: &Line<'_>) -> String {
    format!(
        "CV{:<15}{:<8}{:<3}{:<3}{:<2}{:0>13}{:0>13}{:<12}",
        line.store,
        line.date,
        line.brand,
        line.product,
        line.installments,
        line.gross,
        line.net,
        line.nsu
    )
}

pub fn trailer(total: u64) -> String {
    format!("A9{:0>11}", total)
}

/// A well-formed statement with `n` valid transactions.
pub fn statement(n: usize) -> Vec<u8> {
    let mut lines = vec![header(RECIPIENT)];
    for i in 0..n {
        let nsu = format!("{:012}", i + 1);
        lines.push(transaction(&Line {
            nsu: &nsu,
            ..Line::default()
        }));
    }
    lines.push(trailer(n as u64 + 2));
    join(&lines)
}

pub fn join(lines: &[String]) -> Vec<u8> {
    let mut text = lines.join("\r\n");
    text.push_str("\r\n");
    text.into_bytes()
}

/// Collects every emitted event with its level.
#[derive(Clone, Default)]
pub struct EventCollector {
    pub events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl EventCollector {
    pub fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, msg)| msg.clone())
            .collect()
    }
}

impl<S> Layer<S> for EventCollector
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        use std::fmt::Write as FmtWrite;
        let mut msg = String::new();
        let _ = write!(&mut msg, "{:?}", event);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), msg));
    }
}
