use image::RgbaImage;
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span, Text};

use crate::media::Picture;

const UPPER_HALF: &str = "▀";

/// Renders `picture` into at most `cols` x `rows` cells, two pixel rows per
/// cell, centred horizontally and vertically. Every pixel is blended toward
/// `background` by `1 - opacity`.
pub fn render(
    picture: &Picture,
    cols: u16,
    rows: u16,
    opacity: f32,
    background: (u8, u8, u8),
) -> Text<'static> {
    if cols == 0 || rows == 0 {
        return Text::default();
    }
    let fitted = picture.fitted(cols as u32, rows as u32 * 2);
    render_fitted(&fitted, cols, rows, opacity, background)
}

fn render_fitted(
    image: &RgbaImage,
    cols: u16,
    rows: u16,
    opacity: f32,
    background: (u8, u8, u8),
) -> Text<'static> {
    let width = image.width() as usize;
    let cell_rows = (image.height() as usize).div_ceil(2);
    let pad_left = (cols as usize).saturating_sub(width) / 2;
    let pad_top = (rows as usize).saturating_sub(cell_rows) / 2;
    let opacity = opacity.clamp(0.0, 1.0);

    let mut lines: Vec<Line<'static>> = Vec::with_capacity(pad_top + cell_rows);
    for _ in 0..pad_top {
        lines.push(Line::default());
    }

    for row in 0..cell_rows {
        let mut spans = Vec::with_capacity(width + 1);
        if pad_left > 0 {
            spans.push(Span::raw(" ".repeat(pad_left)));
        }
        let top_y = (row * 2) as u32;
        let bottom_y = top_y + 1;
        for x in 0..image.width() {
            let top = blend(image.get_pixel(x, top_y).0, opacity, background);
            let bottom = if bottom_y < image.height() {
                blend(image.get_pixel(x, bottom_y).0, opacity, background)
            } else {
                background
            };
            spans.push(Span::styled(
                UPPER_HALF,
                Style::default().fg(rgb(top)).bg(rgb(bottom)),
            ));
        }
        lines.push(Line::from(spans));
    }

    Text::from(lines)
}

fn blend(pixel: [u8; 4], opacity: f32, background: (u8, u8, u8)) -> (u8, u8, u8) {
    let alpha = opacity * (pixel[3] as f32 / 255.0);
    let mix = |fg: u8, bg: u8| -> u8 {
        (fg as f32 * alpha + bg as f32 * (1.0 - alpha))
            .round()
            .clamp(0.0, 255.0) as u8
    };
    (
        mix(pixel[0], background.0),
        mix(pixel[1], background.1),
        mix(pixel[2], background.2),
    )
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}
