use std::f64::consts::PI;

use serde::Serialize;

use crate::models::LayoutResult;

pub const SCORE_RING_RADIUS: f64 = 25.0;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ScoreRing {
    pub radius: f64,
    pub circumference: f64,
    pub dash_offset: f64,
}

/// Render-ready view of one layout.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct LayoutCard {
    /// 1-based display position.
    pub position: usize,
    pub title: String,
    pub top_pick: bool,
    pub score_percent: u32,
    pub ring: ScoreRing,
    pub palette: Vec<String>,
    pub image_src: String,
    pub download_name: String,
}

pub fn score_percent(score: f64) -> u32 { (score.clamp(0.0, 1.0) * 100.0).round() as u32 }

pub fn score_ring(percent: u32) -> ScoreRing {
    let circumference = 2.0 * PI * SCORE_RING_RADIUS;
    ScoreRing {
        radius: SCORE_RING_RADIUS,
        circumference,
        dash_offset: circumference - (percent as f64 / 100.0) * circumference,
    }
}

/// Whitespace runs become `_`; characters that are unsafe in file names are dropped.
fn sanitize_cta(cta: &str) -> String {
    cta.split_whitespace()
        .map(|word| word.chars().filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn download_file_name(position: usize, cta: &str) -> String {
    format!("layout_{}_{}.png", position, sanitize_cta(cta))
}

/// Expects layouts already ranked; the first card is the top pick.
pub fn present(layouts: &[LayoutResult]) -> Vec<LayoutCard> {
    layouts
        .iter()
        .enumerate()
        .map(|(index, layout)| {
            let position = index + 1;
            let percent = score_percent(layout.score);
            LayoutCard {
                position,
                title: format!("Layout Option {position}"),
                top_pick: index == 0,
                score_percent: percent,
                ring: score_ring(percent),
                palette: layout.palette.clone(),
                image_src: format!("data:image/png;base64,{}", layout.image),
                download_name: download_file_name(position, &layout.cta_text),
            }
        })
        .collect()
}
