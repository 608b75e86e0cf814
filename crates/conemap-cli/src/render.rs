//! Terminal rendering of the shared obstacle map.
//!
//! Each character covers a square block of cells; the block shows the
//! strongest claim inside it (`#` obstacle, `.` free, blank unknown).  The
//! top row is the map's highest `y`.

use colored::Colorize;
use conemap_perception::costmap::{FREE_SPACE, LETHAL_OBSTACLE, ObstacleMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Obstacle,
    Free,
    Unknown,
}

impl Glyph {
    fn symbol(self) -> char {
        match self {
            Glyph::Obstacle => '#',
            Glyph::Free => '.',
            Glyph::Unknown => ' ',
        }
    }
}

/// Block glyphs, top row first, at most `max_cols` wide.
pub fn glyphs(map: &ObstacleMap, max_cols: u32) -> Vec<Vec<Glyph>> {
    let step = map.size_x().div_ceil(max_cols.max(1)).max(1);
    let rows = map.size_y().div_ceil(step);
    let cols = map.size_x().div_ceil(step);

    (0..rows)
        .rev()
        .map(|row| {
            (0..cols)
                .map(|col| block_glyph(map, col * step, row * step, step))
                .collect()
        })
        .collect()
}

fn block_glyph(map: &ObstacleMap, x0: u32, y0: u32, step: u32) -> Glyph {
    let mut glyph = Glyph::Unknown;
    for y in y0..(y0 + step).min(map.size_y()) {
        for x in x0..(x0 + step).min(map.size_x()) {
            match map.cost(x, y) {
                LETHAL_OBSTACLE => return Glyph::Obstacle,
                FREE_SPACE => glyph = Glyph::Free,
                _ => {}
            }
        }
    }
    glyph
}

/// Coloured rendering framed by a border, ready to print.
pub fn print_map(map: &ObstacleMap, max_cols: u32) {
    let rows = glyphs(map, max_cols);
    let width = rows.first().map_or(0, Vec::len);
    let border = format!("+{}+", "-".repeat(width));

    println!("  {}", border.dimmed());
    for row in &rows {
        let line: String = row
            .iter()
            .map(|g| {
                let s = g.symbol().to_string();
                match g {
                    Glyph::Obstacle => s.red().bold().to_string(),
                    Glyph::Free => s.green().to_string(),
                    Glyph::Unknown => s,
                }
            })
            .collect();
        println!("  {}{}{}", "|".dimmed(), line, "|".dimmed());
    }
    println!("  {}", border.dimmed());
}
