//! Text line layout
//!
//! Lines wrap at character granularity. A line mixing alignments is laid out
//! in columns when everything fits, otherwise each alignment prints on its
//! own line(s).

use crate::config::{Charset, PrinterConfig};
use crate::encoding::char_width;
use crate::escpos::EscPosBuilder;
use crate::markup::{Align, TextRun, TextStyle};

type Piece = (String, TextStyle);

/// Encode one printed line made of `runs`
pub(crate) fn encode_line(b: &mut EscPosBuilder, runs: &[&TextRun], config: &PrinterConfig) {
    let Some(first) = runs.first() else {
        return;
    };
    let width = config.characters_per_line();
    let charset = config.charset();

    if runs.iter().all(|r| r.align == first.align) {
        b.align(first.align);
        for line in wrap(runs, width, charset) {
            write_pieces(b, &line);
            b.newline();
        }
        return;
    }

    let buckets: Vec<(Align, Vec<&TextRun>)> = [Align::Left, Align::Center, Align::Right]
        .into_iter()
        .map(|align| {
            let group: Vec<&TextRun> = runs.iter().copied().filter(|r| r.align == align).collect();
            (align, group)
        })
        .filter(|(_, group)| group.iter().any(|r| !r.content.is_empty()))
        .collect();

    let widths: Vec<usize> = buckets
        .iter()
        .map(|(_, group)| group.iter().map(|r| run_width(r, charset)).sum())
        .collect();
    let gaps = buckets.len().saturating_sub(1);
    let used: usize = widths.iter().sum::<usize>() + gaps;

    if used <= width {
        let line = columns(&buckets, &widths, width);
        b.align(Align::Left);
        write_pieces(b, &line);
        b.newline();
    } else {
        for (align, group) in &buckets {
            b.align(*align);
            for line in wrap(group, width, charset) {
                write_pieces(b, &line);
                b.newline();
            }
        }
    }
}

fn run_width(run: &TextRun, charset: Charset) -> usize {
    let scale = run.style.size.width_scale();
    run.content
        .chars()
        .map(|c| char_width(c, charset) * scale)
        .sum()
}

fn push_char(line: &mut Vec<Piece>, c: char, style: TextStyle) {
    match line.last_mut() {
        Some((text, s)) if *s == style => text.push(c),
        _ => line.push((c.to_string(), style)),
    }
}

fn push_run(line: &mut Vec<Piece>, run: &TextRun) {
    for c in run.content.chars() {
        push_char(line, c, run.style);
    }
}

fn pad(line: &mut Vec<Piece>, n: usize) {
    for _ in 0..n {
        push_char(line, ' ', TextStyle::default());
    }
}

/// Break runs into printed lines of at most `width` columns
fn wrap(runs: &[&TextRun], width: usize, charset: Charset) -> Vec<Vec<Piece>> {
    let mut lines = Vec::new();
    let mut line: Vec<Piece> = Vec::new();
    let mut col = 0;

    for run in runs {
        let scale = run.style.size.width_scale();
        for c in run.content.chars() {
            let w = char_width(c, charset) * scale;
            if col + w > width && col > 0 {
                lines.push(std::mem::take(&mut line));
                col = 0;
            }
            push_char(&mut line, c, run.style);
            col += w;
        }
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Lay out left, center and right groups on one line
fn columns(buckets: &[(Align, Vec<&TextRun>)], widths: &[usize], width: usize) -> Vec<Piece> {
    let width_of = |align: Align| {
        buckets
            .iter()
            .zip(widths)
            .find(|((a, _), _)| *a == align)
            .map(|(_, w)| *w)
    };
    let left_w = width_of(Align::Left);
    let right_w = width_of(Align::Right);

    let mut line = Vec::new();
    let mut col = 0;

    for ((align, group), w) in buckets.iter().zip(widths) {
        let start = match align {
            Align::Left => 0,
            Align::Center => {
                let ideal = width.saturating_sub(*w) / 2;
                let min = left_w.map_or(0, |lw| lw + 1);
                let max = match right_w {
                    Some(rw) => width.saturating_sub(rw + 1 + *w),
                    None => width.saturating_sub(*w),
                };
                ideal.clamp(min, max.max(min))
            }
            Align::Right => width.saturating_sub(*w),
        };
        pad(&mut line, start.saturating_sub(col));
        for run in group {
            push_run(&mut line, run);
        }
        col = start.max(col) + w;
    }
    line
}

fn apply_style(b: &mut EscPosBuilder, current: &mut TextStyle, wanted: TextStyle) {
    if current.bold != wanted.bold {
        b.bold(wanted.bold);
    }
    if current.underline != wanted.underline {
        b.underline(wanted.underline);
    }
    if current.size != wanted.size {
        b.size(wanted.size);
    }
    *current = wanted;
}

/// Write styled pieces, leaving the printer in the default style
fn write_pieces(b: &mut EscPosBuilder, pieces: &[Piece]) {
    let mut current = TextStyle::default();
    for (text, style) in pieces {
        apply_style(b, &mut current, *style);
        b.text(text);
    }
    apply_style(b, &mut current, TextStyle::default());
}
