//! Frame layout for the terminal viewer.
//!
//! `render_frame` is pure: it turns a `ViewState` into the lines of one
//! frame. `paint` writes those lines over the previous frame in place.

use std::io::{self, Write};

use crossterm::{
    cursor::MoveTo,
    queue,
    style::Print,
    terminal::{Clear, ClearType},
};

use crate::config::ChartConfig;
use crate::domain::{Acceleration, Channel, Snapshot};

use super::state::ViewState;

const TITLE: &str = "Marlin Sensor Monitor";
const MIN_WIDTH: usize = 40;
const INDENT: &str = "  ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Connected,
    Reconnecting,
}

impl LinkStatus {
    fn label(self) -> &'static str {
        match self {
            LinkStatus::Connected => "● LIVE",
            LinkStatus::Reconnecting => "○ RECONNECTING",
        }
    }
}

/// lay out one complete frame for a terminal `width` columns wide
pub fn render_frame(state: &ViewState, link: LinkStatus, width: usize, chart: &ChartConfig) -> Vec<String> {
    let width = width.max(MIN_WIDTH);
    let mut lines = Vec::with_capacity(chart.height + 12);

    header(&mut lines, state, link, width);
    lines.push(String::new());
    plot(&mut lines, state, width, chart);
    lines.push(String::new());
    lines.push(deviation_line(state));
    lines.push(format!("{INDENT}←/→ change axis   Ctrl+C exit"));

    lines.into_iter().map(|line| truncate(&line, width)).collect()
}

fn header(lines: &mut Vec<String>, state: &ViewState, link: LinkStatus, width: usize) {
    let inner = width - 2;
    let rule = "─".repeat(inner);
    let latched = state.latched();

    let status = link.label();
    let gap = (inner - 2).saturating_sub(TITLE.chars().count() + status.chars().count());
    let title = format!("{TITLE}{}{status}", " ".repeat(gap));

    lines.push(format!("┌{rule}┐"));
    lines.push(boxed(&title, inner));
    lines.push(format!("├{rule}┤"));
    lines.push(boxed(&climate_line(latched), inner));
    lines.push(boxed(&adc_line(latched), inner));
    lines.push(format!("├{rule}┤"));
    lines.push(boxed(
        &format!(
            "{}-axis deviation (g), last {} samples",
            state.axis().label(),
            state.window().capacity()
        ),
        inner,
    ));
    lines.push(format!("└{rule}┘"));
}

fn climate_line(latched: &Snapshot) -> String {
    format!(
        "Temperature: {}  Humidity: {}  TVOC: {}  CO2: {}",
        reading(latched.temperature, 1, "°C"),
        reading(latched.humidity, 1, "%"),
        reading(latched.tvoc, 3, "ppm"),
        reading(latched.co2, 0, "ppm"),
    )
}

fn adc_line(latched: &Snapshot) -> String {
    let inputs: Vec<String> = Channel::ADC
        .iter()
        .enumerate()
        .map(|(i, channel)| format!("A{}={}", i, reading(latched.get(*channel), 3, "V")))
        .collect();
    format!("ADC: {}", inputs.join("  "))
}

fn reading(value: Option<f64>, precision: usize, unit: &str) -> String {
    match value {
        Some(v) => format!("{v:.precision$}{unit}"),
        None => "N/A".to_string(),
    }
}

fn boxed(text: &str, inner: usize) -> String {
    format!("│ {} │", pad(text, inner - 2))
}

/// exactly `width` chars: truncated or right-padded with spaces
fn pad(text: &str, width: usize) -> String {
    let mut out: String = text.chars().take(width).collect();
    let len = out.chars().count();
    out.extend(std::iter::repeat(' ').take(width - len));
    out
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        text.chars().take(width).collect()
    }
}

fn plot(lines: &mut Vec<String>, state: &ViewState, width: usize, chart: &ChartConfig) {
    let window = state.window();
    if window.is_empty() {
        lines.push(format!("{INDENT}Waiting for {}-axis data...", state.axis().label()));
        return;
    }

    let range = match window.magnitude() {
        m if m == 0.0 => 0.1,
        m => m,
    };

    // newest samples on the right; older positions stay blank
    let available = width.saturating_sub(chart.margin).max(1);
    let columns = available.min(window.len());
    let samples: Vec<f64> = window.iter().skip(window.len() - columns).collect();
    let blank = " ".repeat(available - columns);

    let height = chart.height.max(2);
    for row in (0..height).rev() {
        let level = range * (2.0 * row as f64 / (height - 1) as f64 - 1.0);
        let cells: String = samples.iter().map(|v| cell(*v, level, range)).collect();
        lines.push(format!("{INDENT}{blank}{cells}"));
    }
    lines.push(format!("{INDENT}{blank}{}", "─".repeat(columns)));

    lines.push(format!("{INDENT}Scale: -{range:.3}g to +{range:.3}g"));
}

fn cell(value: f64, level: f64, range: f64) -> char {
    if level.abs() < range * 0.05 {
        '─'
    } else if (level > 0.0 && value >= level) || (level < 0.0 && value <= level) {
        '█'
    } else {
        ' '
    }
}

fn deviation_line(state: &ViewState) -> String {
    let Some(deviation) = state.latest_deviation() else {
        return format!("{INDENT}Current Deviations: N/A");
    };
    let axis = state.axis();
    format!(
        "{INDENT}Current Deviations: {} | [{}={:+.3}g]",
        components(&deviation),
        axis.label(),
        deviation.component(axis)
    )
}

fn components(deviation: &Acceleration) -> String {
    format!("X={:+.3}g Y={:+.3}g Z={:+.3}g", deviation.x, deviation.y, deviation.z)
}

/// overwrite the screen from the top-left corner with `lines`
pub fn paint<W: Write>(out: &mut W, lines: &[String]) -> io::Result<()> {
    queue!(out, MoveTo(0, 0))?;
    for line in lines {
        queue!(out, Print(line), Clear(ClearType::UntilNewLine), Print("\r\n"))?;
    }
    queue!(out, Clear(ClearType::FromCursorDown))?;
    out.flush()
}
