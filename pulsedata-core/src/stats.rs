//! Missing-data report for a channel set.

use console::style;
use std::io::{self, Write};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const RULE_WIDTH: usize = 80;
const BLOCK: &str = "▇";
const BLOCKS: u32 = 10;

/// Options of the missing-data report.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StatsOptions {
    /// List channels that contain every pulse id.
    pub show_complete: bool,
    /// Emit ANSI colours.
    pub color: bool,
}

impl Default for StatsOptions {
    fn default() -> Self {
        Self {
            show_complete: false,
            color: true,
        }
    }
}

impl StatsOptions {
    /// List complete channels too.
    #[must_use]
    pub fn with_show_complete(mut self, show_complete: bool) -> Self {
        self.show_complete = show_complete;
        self
    }

    /// Enable or disable colours.
    #[must_use]
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }
}

/// Record count of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelStats {
    pub name: String,
    pub count: usize,
}

/// Per-channel record counts measured against the union of all pulse ids.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Stats {
    pub channels: Vec<ChannelStats>,
    /// Pulse ids present in every channel.
    pub ncommon: usize,
    /// Pulse ids present in any channel.
    pub ntotal: usize,
}

#[derive(Clone, Copy)]
enum Tone {
    Good,
    Bad,
    Plain,
}

impl Stats {
    /// Channels holding every pulse id of the union.
    #[must_use]
    pub fn ncomplete(&self) -> usize {
        self.channels
            .iter()
            .filter(|ch| ch.count == self.ntotal)
            .count()
    }

    /// Writes the report.
    ///
    /// # Errors
    /// Returns any error of the underlying writer.
    pub fn write<W: Write>(&self, out: &mut W, options: &StatsOptions) -> io::Result<()> {
        write_rule(out)?;

        let shown: Vec<&ChannelStats> = self
            .channels
            .iter()
            .filter(|ch| options.show_complete || ch.count != self.ntotal)
            .collect();

        if !shown.is_empty() {
            let name_width = shown.iter().map(|ch| ch.name.len()).max().unwrap_or(0);
            let count_width = self.ntotal.to_string().len();
            let perc_width = shown
                .iter()
                .map(|ch| loss_percentage(ch.count, self.ntotal).to_string().len())
                .max()
                .unwrap_or(1);
            let nmin = shown.iter().map(|ch| ch.count).min().unwrap_or(0);

            for ch in &shown {
                let perc = loss_percentage(ch.count, self.ntotal);
                let line = format!(
                    "{:<name_width$} {:>count_width$} / {} -> {:>perc_width$}% loss {}",
                    ch.name,
                    ch.count,
                    self.ntotal,
                    perc,
                    dip(perc),
                );
                let tone = if ch.count == self.ntotal {
                    Tone::Good
                } else if ch.count == nmin {
                    Tone::Bad
                } else {
                    Tone::Plain
                };
                writeln!(out, "{}", paint(&line, tone, options.color))?;
            }
            writeln!(out)?;
        }

        let line = format!(
            "over the whole data set: {} / {} -> {}% loss",
            self.ncommon,
            self.ntotal,
            loss_percentage(self.ncommon, self.ntotal),
        );
        let tone = if self.ncommon == self.ntotal {
            Tone::Good
        } else {
            Tone::Bad
        };
        writeln!(out, "{}", paint(&line, tone, options.color))?;

        let nchannels = self.channels.len();
        let ncomplete = self.ncomplete();
        let line = format!(
            "complete channels: {} / {} -> {}% incomplete",
            ncomplete,
            nchannels,
            loss_percentage(ncomplete, nchannels),
        );
        let tone = if ncomplete == nchannels {
            Tone::Good
        } else {
            Tone::Bad
        };
        writeln!(out, "{}", paint(&line, tone, options.color))?;

        if !options.show_complete {
            let line = "complete channels are hidden";
            writeln!(out, "{}", paint(line, Tone::Good, options.color))?;
        }

        write_rule(out)
    }

    /// Renders the report into a string.
    ///
    /// # Errors
    /// Returns the error of [`Stats::write`].
    pub fn render(&self, options: &StatsOptions) -> io::Result<String> {
        let mut buf = Vec::new();
        self.write(&mut buf, options)?;
        String::from_utf8(buf).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// Share of `ntotal` missing from `n`, in whole percent.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn loss_percentage(n: usize, ntotal: usize) -> u32 {
    if ntotal == 0 {
        return 0;
    }
    let ratio = 1.0 - n as f64 / ntotal as f64;
    (ratio * 100.0).round() as u32
}

/// Bar of the remaining share: one block per started 10% kept.
#[must_use]
pub fn dip(perc: u32) -> String {
    let lost = perc.min(100).div_ceil(100 / BLOCKS);
    BLOCK.repeat((BLOCKS - lost) as usize)
}

fn paint(text: &str, tone: Tone, color: bool) -> String {
    if !color {
        return text.to_string();
    }
    let styled = style(text).force_styling(true);
    match tone {
        Tone::Good => styled.green().to_string(),
        Tone::Bad => styled.red().to_string(),
        Tone::Plain => text.to_string(),
    }
}

fn write_rule<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))?;
    writeln!(out)
}
