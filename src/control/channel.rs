//! Textual control channel
//!
//! Translates attribute reads and writes of human-readable text into
//! [`ControlSurface`] calls. Five attributes exist:
//!
//! - `status` (r): clock resolution, period, run count, state, firings, overruns
//! - `period` (rw): nominal period in ms
//! - `control` (w): `stop`, `infinite`, or a positive run count
//! - `config` (rw): `<bins> <width_ns> [clamp|separate]`
//! - `statistics` (r): aggregated jitter statistics and the histogram

use std::fmt::Write as _;

use crate::error::{ChannelError, ConfigError, ControlError};
use crate::models::{ControlCommand, StatisticsReport};
use crate::sampler::histogram::EdgePolicy;

use super::ControlSurface;

/// Upper bound on the size of any response
pub const MAX_RESPONSE_BYTES: usize = 4096;

/// A named attribute of the channel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Status,
    Period,
    Control,
    Config,
    Statistics,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Status,
        Attribute::Period,
        Attribute::Control,
        Attribute::Config,
        Attribute::Statistics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Attribute::Status => "status",
            Attribute::Period => "period",
            Attribute::Control => "control",
            Attribute::Config => "config",
            Attribute::Statistics => "statistics",
        }
    }

    pub fn parse(name: &str) -> Result<Self, ChannelError> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.name() == name)
            .ok_or_else(|| ChannelError::UnknownAttribute(name.to_string()))
    }

    pub fn is_readable(&self) -> bool {
        !matches!(self, Attribute::Control)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Attribute::Period | Attribute::Control | Attribute::Config)
    }

    /// `r`, `w` or `rw`
    pub fn mode(&self) -> &'static str {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => "rw",
            (true, false) => "r",
            _ => "w",
        }
    }
}

/// Text front-end over a [`ControlSurface`]
#[derive(Clone)]
pub struct ControlChannel {
    surface: ControlSurface,
}

impl ControlChannel {
    pub fn new(surface: ControlSurface) -> Self {
        ControlChannel { surface }
    }

    pub fn surface(&self) -> &ControlSurface {
        &self.surface
    }

    /// Render an attribute. The result never exceeds [`MAX_RESPONSE_BYTES`].
    pub fn read(&self, name: &str) -> Result<String, ChannelError> {
        let attribute = Attribute::parse(name)?;
        let text = match attribute {
            Attribute::Status => self.render_status(),
            Attribute::Period => format!("{}\n", self.surface.get_status().period.as_millis()),
            Attribute::Config => {
                let config = self.surface.histogram_config();
                format!(
                    "{} {} {}\n",
                    config.bin_count,
                    config.bin_width_ns,
                    config.edge_policy.as_str()
                )
            }
            Attribute::Statistics => render_statistics(&self.surface.get_statistics()),
            Attribute::Control => {
                return Err(ChannelError::PermissionDenied {
                    attribute: attribute.name(),
                    access: "readable",
                })
            }
        };
        Ok(truncate_response(text))
    }

    /// Apply `input` to an attribute. Returns the number of bytes consumed.
    pub fn write(&self, name: &str, input: &str) -> Result<usize, ChannelError> {
        let attribute = Attribute::parse(name)?;
        match attribute {
            Attribute::Period => {
                let ms = parse_period(input)?;
                self.surface.set_period(ms)?;
            }
            Attribute::Control => {
                let command = parse_control(input)?;
                self.surface.control(command)?;
            }
            Attribute::Config => {
                let (bins, width, policy) = parse_config(input)?;
                match policy {
                    Some(policy) => self.surface.set_histogram_layout(bins, width, policy)?,
                    None => self.surface.set_histogram_config(bins, width)?,
                }
            }
            Attribute::Status | Attribute::Statistics => {
                return Err(ChannelError::PermissionDenied {
                    attribute: attribute.name(),
                    access: "writable",
                })
            }
        }
        Ok(input.len())
    }

    fn render_status(&self) -> String {
        let status = self.surface.get_status();
        format!(
            "Clock resolution: {} ns\nPeriod: {} ms\nRunCount: {}\nStatus: {}\nFirings: {}\nOverruns: {}\n",
            status.clock_resolution.as_nanos(),
            status.period.as_millis(),
            status.run_count,
            status.state,
            status.firings,
            status.overruns
        )
    }
}

/// Parse a decimal period in ms
pub fn parse_period(input: &str) -> Result<u32, ControlError> {
    let trimmed = input.trim();
    trimmed
        .parse::<u32>()
        .map_err(|_| ControlError::InvalidArgument(format!("invalid period '{}'", trimmed)))
}

/// `stop`, `infinite`, or a decimal run count
pub fn parse_control(input: &str) -> Result<ControlCommand, ControlError> {
    match input.trim() {
        "stop" => Ok(ControlCommand::Stop),
        "infinite" => Ok(ControlCommand::Infinite),
        other => other
            .parse::<u32>()
            .map(ControlCommand::Finite)
            .map_err(|_| ControlError::InvalidArgument(format!("invalid control command '{}'", other))),
    }
}

/// `<bins> <width_ns> [clamp|separate]`
pub fn parse_config(input: &str) -> Result<(u16, u64, Option<EdgePolicy>), ConfigError> {
    let fields: Vec<&str> = input.split_whitespace().collect();
    if fields.len() < 2 || fields.len() > 3 {
        return Err(ConfigError::InvalidArgument(format!(
            "expected '<bins> <width_ns> [clamp|separate]', got '{}'",
            input.trim()
        )));
    }
    let bins = fields[0]
        .parse::<u16>()
        .map_err(|_| ConfigError::InvalidArgument(format!("invalid bin count '{}'", fields[0])))?;
    let width = fields[1]
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidArgument(format!("invalid bin width '{}'", fields[1])))?;
    let policy = match fields.get(2) {
        Some(word) => Some(
            EdgePolicy::parse(word)
                .ok_or_else(|| ConfigError::InvalidArgument(format!("unknown edge policy '{}'", word)))?,
        ),
        None => None,
    };
    Ok((bins, width, policy))
}

/// Statistics text. Bin 0 is reported as "below the upper edge of bin 0".
pub fn render_statistics(report: &StatisticsReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Count: {}", report.count);
    if report.count == 0 {
        let _ = writeln!(out, "Min: n/a\nMax: n/a");
    } else {
        let _ = writeln!(out, "Min: {:+}ns\nMax: {:+}ns", report.min, report.max);
    }
    let _ = writeln!(out, "Mean: {:+}ns", report.mean);
    let _ = writeln!(out, "Variance: {}ns^2", report.variance);
    let _ = writeln!(out, "Stddev: {}ns", report.stddev);
    let _ = writeln!(
        out,
        "|Jitter| p50: {}ns p99: {}ns p99.9: {}ns max: {}ns",
        report.magnitude.p50_ns, report.magnitude.p99_ns, report.magnitude.p99_9_ns, report.magnitude.max_ns
    );

    let histogram = &report.histogram;
    for (i, bin) in histogram.bins.iter().enumerate() {
        if i == 0 {
            let upper = bin.lower_bound_ns.saturating_add(histogram.bin_width_ns as i64);
            let _ = writeln!(out, " <  {:+6}ns: {}", upper, bin.count);
        } else {
            let _ = writeln!(out, " >= {:+6}ns: {}", bin.lower_bound_ns, bin.count);
        }
    }
    if histogram.underflow > 0 || histogram.overflow > 0 {
        let _ = writeln!(out, "Underflow: {}\nOverflow: {}", histogram.underflow, histogram.overflow);
    }
    out
}

/// Cut `text` to at most [`MAX_RESPONSE_BYTES`] on a char boundary
pub fn truncate_response(mut text: String) -> String {
    if text.len() > MAX_RESPONSE_BYTES {
        let mut end = MAX_RESPONSE_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
    text
}
