//! Console Printer
//!
//! Event listener that writes one formatted line per event.

use std::fmt::Display;
use std::io::{self, Write};

use chrono::{Local, TimeZone};
use parking_lot::Mutex;

use super::format::EventFormatter;
use crate::application::ports::EventListener;
use crate::domain::events::MarketEvent;

/// Writes every received event to `W`, one line each.
///
/// Write failures are logged and otherwise ignored.
pub struct ConsolePrinter<W, Tz = Local> {
    out: Mutex<W>,
    formatter: EventFormatter<Tz>,
}

impl ConsolePrinter<io::Stdout, Local> {
    /// Printer writing to standard output with local timestamps.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout(), EventFormatter::local())
    }
}

impl<W, Tz> ConsolePrinter<W, Tz>
where
    W: Write + Send,
    Tz: TimeZone,
    Tz::Offset: Display,
{
    /// Printer writing to `out`.
    #[must_use]
    pub fn new(out: W, formatter: EventFormatter<Tz>) -> Self {
        Self {
            out: Mutex::new(out),
            formatter,
        }
    }

    /// Consume the printer and return its writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()
    }
}

impl<W, Tz> EventListener for ConsolePrinter<W, Tz>
where
    W: Write + Send,
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Display,
{
    fn on_event(&self, event: &MarketEvent) {
        let line = self.formatter.format(event);
        if let Err(e) = self.write_line(&line) {
            tracing::warn!(error = %e, symbol = event.symbol(), "Failed to print event");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::events::{TimeAndSale, Trade};

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prints_one_line_per_event() {
        let printer = ConsolePrinter::new(Vec::new(), EventFormatter::with_timezone(Utc));

        printer.on_event(&MarketEvent::TimeAndSale(TimeAndSale {
            event_symbol: "ETH/USD:GDAX".to_string(),
            ..Default::default()
        }));
        printer.on_event(&MarketEvent::Trade(Trade {
            event_symbol: "SPY".to_string(),
            ..Default::default()
        }));

        let output = String::from_utf8(printer.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("TimeAndSale{symbol=ETH/USD:GDAX, index=0, "));
        assert!(lines[1].starts_with("Trade{symbol=SPY, "));
    }

    #[test]
    fn write_errors_are_swallowed() {
        let printer = ConsolePrinter::new(BrokenPipe, EventFormatter::with_timezone(Utc));
        printer.on_event(&MarketEvent::Trade(Trade::default()));
    }
}
