use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine;
use image::{imageops, DynamicImage, ImageFormat, Rgba, RgbaImage};
use rand::{seq::SliceRandom, Rng};
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use thiserror::Error;
use tracing::{error, info};

use crate::models::{GenerateLayoutsResponse, GenerationRequest, LayoutResult, Theme, UploadedFile};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("network failure: {0}")]
    Transport(String),
    #[error("Network error: {status}")]
    Status { status: u16, body: String },
    #[error("unexpected response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Other(String),
}

/// Produces layouts for one upload selection.
#[async_trait]
pub trait LayoutGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<LayoutResult>, GenerationError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

fn is_base64(s: &str) -> bool { s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') }

// Shortens base64 image payloads inside a response body before it is logged.
// Only all-ASCII base64 strings are cut, so the slice stays on a char boundary.
fn truncate_images_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "image" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100 && is_base64(s) {
                            *val = serde_json::Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_images_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_images_in_json(val);
            }
        }
        _ => {}
    }
}

fn preview_body(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(mut value) => {
            truncate_images_in_json(&mut value);
            value.to_string()
        }
        Err(_) => body.chars().take(500).collect(),
    }
}

/// Talks to the external layout service over multipart HTTP.
pub struct RemoteGenerator {
    client: Client,
    endpoint: String,
}

impl RemoteGenerator {
    pub fn new(endpoint: impl Into<String>) -> Self { Self { client: Client::new(), endpoint: endpoint.into() } }

    fn file_part(file: &UploadedFile) -> Result<Part, GenerationError> {
        Part::bytes(file.bytes.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| GenerationError::Other(format!("invalid content type for {}: {}", file.file_name, e)))
    }

    fn build_form(request: &GenerationRequest) -> Result<Form, GenerationError> {
        Ok(Form::new()
            .part("product_image", Self::file_part(&request.product)?)
            .part("logo_image", Self::file_part(&request.logo)?)
            .text("theme", request.theme.name()))
    }
}

#[async_trait]
impl LayoutGenerator for RemoteGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<LayoutResult>, GenerationError> {
        let form = Self::build_form(request)?;
        info!("🔗 Posting layout request to {} (theme {})", self.endpoint, request.theme);

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("❌ Layout service error response: {}", preview_body(&body));
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }

        let body = response.text().await.map_err(|e| GenerationError::Transport(e.to_string()))?;
        tracing::debug!("📥 Raw layout response: {}", preview_body(&body));

        let parsed: GenerateLayoutsResponse = serde_json::from_str(&body).map_err(|e| {
            error!("❌ Could not parse layout response: {} body={}", e, preview_body(&body));
            GenerationError::Malformed(e.to_string())
        })?;
        Ok(parsed.layouts)
    }

    fn describe(&self) -> String { format!("remote({})", self.endpoint) }
}

const CANVAS_SIZE: u32 = 540;
const PRODUCT_MAX: u32 = 325;
const LOGO_MAX: u32 = 90;
const LOGO_MARGIN: u32 = 25;
const DEMO_CTA: &str = "SHOP NOW";

type Rgb = (u8, u8, u8);

fn theme_palettes(theme: Theme) -> &'static [(Rgb, Rgb)] {
    match theme {
        Theme::Minimal => &[((245, 245, 245), (224, 224, 224))],
        Theme::Luxury => &[((40, 40, 40), (10, 10, 10))],
        Theme::Sporty => &[((200, 0, 0), (50, 50, 50)), ((0, 100, 220), (230, 230, 230))],
        Theme::Festival => &[((138, 43, 226), (255, 0, 255)), ((255, 105, 180), (255, 185, 85))],
        Theme::Nature => &[((34, 139, 34), (189, 183, 107)), ((139, 69, 19), (244, 164, 96))],
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    Shadow,
    Reflection,
    Vignette,
    BlurredShapes,
}

fn theme_effects(theme: Theme) -> &'static [Effect] {
    match theme {
        Theme::Minimal => &[],
        Theme::Luxury | Theme::Nature => &[Effect::Reflection, Effect::Vignette],
        Theme::Sporty => &[Effect::Shadow],
        Theme::Festival => &[Effect::BlurredShapes],
    }
}

const CLEAR: Rgba<u8> = Rgba([255, 255, 255, 0]);

fn filled_ellipse(width: u32, height: u32, color: Rgba<u8>) -> RgbaImage {
    let (rx, ry) = (width as f32 / 2.0, height as f32 / 2.0);
    RgbaImage::from_fn(width, height, |x, y| {
        let dx = (x as f32 + 0.5 - rx) / rx;
        let dy = (y as f32 + 0.5 - ry) / ry;
        if dx * dx + dy * dy <= 1.0 { color } else { CLEAR }
    })
}

// Three translucent random blobs, blurred at quarter resolution and scaled up.
fn add_blurred_shapes(canvas: &mut RgbaImage, rng: &mut impl Rng) {
    const SCALE: u32 = 4;
    let side = CANVAS_SIZE / SCALE;
    let mut overlay = RgbaImage::from_pixel(side, side, CLEAR);
    for _ in 0..3 {
        let x = rng.gen_range(-50..CANVAS_SIZE as i64 - 50) / SCALE as i64;
        let y = rng.gen_range(-50..CANVAS_SIZE as i64 - 50) / SCALE as i64;
        let w = rng.gen_range(100..250) / SCALE;
        let h = rng.gen_range(100..250) / SCALE;
        let color = Rgba([rng.gen(), rng.gen(), rng.gen(), rng.gen_range(40..80)]);
        imageops::overlay(&mut overlay, &filled_ellipse(w, h, color), x, y);
    }
    let soft = imageops::resize(&imageops::blur(&overlay, 10.0), CANVAS_SIZE, CANVAS_SIZE, imageops::FilterType::Triangle);
    imageops::overlay(canvas, &soft, 0, 0);
}

fn add_shadow(canvas: &mut RgbaImage, product: &RgbaImage, px: i64, py: i64) {
    const PAD: u32 = 24;
    let height = (product.height() / 4).max(1);
    let mut shadow = RgbaImage::from_pixel(product.width() + 2 * PAD, height + 2 * PAD, Rgba([0, 0, 0, 0]));
    imageops::overlay(&mut shadow, &filled_ellipse(product.width(), height, Rgba([0, 0, 0, 70])), PAD as i64, PAD as i64);
    let shadow = imageops::blur(&shadow, 8.0);
    let sy = py + product.height() as i64 - (height / 2) as i64 - PAD as i64;
    imageops::overlay(canvas, &shadow, px - PAD as i64, sy);
}

// Mirrored copy under the product, fading from ~30% opacity to nothing.
fn add_reflection(canvas: &mut RgbaImage, product: &RgbaImage, px: i64, py: i64) {
    let mut reflection = imageops::blur(&imageops::flip_vertical(product), 1.0);
    let height = reflection.height().max(1) as f32;
    for (_, y, pixel) in reflection.enumerate_pixels_mut() {
        let fade = 80.0 / 255.0 * (1.0 - y as f32 / height);
        pixel.0[3] = (pixel.0[3] as f32 * fade).round() as u8;
    }
    imageops::overlay(canvas, &reflection, px, py + product.height() as i64);
}

// Fades the canvas alpha towards the corners.
fn add_vignette(canvas: &mut RgbaImage) {
    let half = CANVAS_SIZE as f32 / 2.0;
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = (x as f32 + 0.5 - half) / half;
        let dy = (y as f32 + 0.5 - half) / half;
        let keep = ((1.3 - (dx * dx + dy * dy).sqrt()) / 0.6).clamp(0.0, 1.0);
        pixel.0[3] = pixel.0[3].min((keep * 255.0).round() as u8);
    }
}

#[derive(Debug, Clone, Copy)]
enum LogoCorner {
    TopLeft,
    TopRight,
}

fn hex(c: Rgb) -> String { format!("#{:02x}{:02x}{:02x}", c.0, c.1, c.2) }

/// Offline stand-in used when no endpoint is configured: composes the
/// uploads over a theme gradient.
#[derive(Default)]
pub struct DemoGenerator;

impl DemoGenerator {
    fn decode(file: &UploadedFile) -> Result<DynamicImage, GenerationError> {
        image::load_from_memory(&file.bytes)
            .map_err(|e| GenerationError::Other(format!("could not read {}: {}", file.file_name, e)))
    }

    fn render(
        product: &DynamicImage,
        logo: &DynamicImage,
        theme: Theme,
        (top, bottom): (Rgb, Rgb),
        corner: LogoCorner,
        rng: &mut impl Rng,
    ) -> Result<Vec<u8>, GenerationError> {
        let effects = theme_effects(theme);
        let mut canvas = RgbaImage::from_fn(CANVAS_SIZE, CANVAS_SIZE, |_, y| {
            let t = y as f32 / CANVAS_SIZE as f32;
            let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
            Rgba([mix(top.0, bottom.0), mix(top.1, bottom.1), mix(top.2, bottom.2), 255])
        });
        if effects.contains(&Effect::BlurredShapes) {
            add_blurred_shapes(&mut canvas, rng);
        }

        let product = product.thumbnail(PRODUCT_MAX, PRODUCT_MAX).to_rgba8();
        let px = ((CANVAS_SIZE - product.width()) / 2) as i64;
        let py = ((CANVAS_SIZE - product.height()) / 2) as i64;
        if effects.contains(&Effect::Shadow) {
            add_shadow(&mut canvas, &product, px, py);
        }
        if effects.contains(&Effect::Reflection) {
            add_reflection(&mut canvas, &product, px, py);
        }
        imageops::overlay(&mut canvas, &product, px, py);

        let logo = logo.thumbnail(LOGO_MAX, LOGO_MAX).to_rgba8();
        let lx = match corner {
            LogoCorner::TopLeft => LOGO_MARGIN,
            LogoCorner::TopRight => CANVAS_SIZE - logo.width() - LOGO_MARGIN,
        };
        imageops::overlay(&mut canvas, &logo, lx as i64, LOGO_MARGIN as i64);

        if effects.contains(&Effect::Vignette) {
            add_vignette(&mut canvas);
        }

        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(canvas)
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| GenerationError::Other(format!("png encoding failed: {e}")))?;
        Ok(out.into_inner())
    }
}

#[async_trait]
impl LayoutGenerator for DemoGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<LayoutResult>, GenerationError> {
        info!("Using demo mode - composing placeholder layouts for theme {}", request.theme);
        let product = Self::decode(&request.product)?;
        let logo = Self::decode(&request.logo)?;

        let mut rng = rand::thread_rng();
        let mut layouts = Vec::new();
        for corner in [LogoCorner::TopLeft, LogoCorner::TopRight] {
            let colors = *theme_palettes(request.theme)
                .choose(&mut rng)
                .ok_or_else(|| GenerationError::Other(format!("no palette for {}", request.theme)))?;
            let png = Self::render(&product, &logo, request.theme, colors, corner, &mut rng)?;
            layouts.push(LayoutResult {
                image: base64::engine::general_purpose::STANDARD.encode(png),
                score: rng.gen_range(0.75..0.99),
                palette: vec![hex(colors.0), hex(colors.1)],
                cta_text: DEMO_CTA.to_string(),
            });
        }
        info!("📦 Composed {} placeholder layouts", layouts.len());
        Ok(layouts)
    }

    fn describe(&self) -> String { "demo".to_string() }
}

#[cfg(test)]
pub(crate) fn png_file(name: &str, color: [u8; 4]) -> UploadedFile {
    let img = RgbaImage::from_pixel(40, 30, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img).write_to(&mut out, ImageFormat::Png).unwrap();
    UploadedFile { file_name: name.to_string(), content_type: "image/png".to_string(), bytes: out.into_inner().into() }
}

/// Spins up a local stand-in for the layout service on an ephemeral port.
#[cfg(test)]
pub(crate) async fn fake_service(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/generate_layouts/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Multipart, http::StatusCode, routing::post, Json, Router};
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};
    use std::{collections::BTreeMap, sync::Arc};

    fn request() -> GenerationRequest {
        GenerationRequest {
            product: png_file("shoe.png", [200, 10, 10, 255]),
            logo: png_file("brand.png", [10, 10, 200, 255]),
            theme: Theme::Festival,
        }
    }

    #[tokio::test]
    async fn remote_sends_three_parts_and_parses_layouts() {
        let seen = Arc::new(parking_lot::Mutex::new(BTreeMap::new()));
        let seen_in_handler = seen.clone();
        let app = Router::new().route(
            "/generate_layouts/",
            post(move |mut multipart: Multipart| {
                let seen = seen_in_handler.clone();
                async move {
                    while let Some(field) = multipart.next_field().await.unwrap() {
                        let name = field.name().unwrap_or_default().to_string();
                        let file_name = field.file_name().map(str::to_string);
                        let data = field.bytes().await.unwrap();
                        seen.lock().insert(name, (file_name, data.len()));
                    }
                    Json(serde_json::json!({
                        "layouts": [
                            {"image": "aGk=", "score": 0.8, "palette": ["#000000"], "cta_text": "SHOP NOW"}
                        ]
                    }))
                }
            }),
        );
        let endpoint = fake_service(app).await;

        let req = request();
        let layouts = RemoteGenerator::new(endpoint).generate(&req).await.unwrap();
        assert_eq!(layouts.len(), 1);
        assert_eq!(layouts[0].cta_text, "SHOP NOW");

        let seen = seen.lock();
        assert_eq!(seen.keys().cloned().collect::<Vec<_>>(), vec!["logo_image", "product_image", "theme"]);
        assert_eq!(seen["product_image"], (Some("shoe.png".to_string()), req.product.bytes.len()));
        assert_eq!(seen["logo_image"].0.as_deref(), Some("brand.png"));
        assert_eq!(seen["theme"], (None, "Festival".len()));
    }

    #[tokio::test]
    async fn remote_maps_server_error_to_status() {
        let app = Router::new().route("/generate_layouts/", post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }));
        let endpoint = fake_service(app).await;

        let err = RemoteGenerator::new(endpoint).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Status { status: 500, .. }));
        assert_eq!(err.to_string(), "Network error: 500");
    }

    #[tokio::test]
    async fn remote_rejects_body_without_layouts() {
        let app = Router::new().route("/generate_layouts/", post(|| async { Json(serde_json::json!({"results": []})) }));
        let endpoint = fake_service(app).await;

        let err = RemoteGenerator::new(endpoint).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn remote_reports_unreachable_service() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = RemoteGenerator::new(format!("http://{addr}/generate_layouts/")).generate(&request()).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }

    #[tokio::test]
    async fn demo_composes_two_scored_pngs() {
        let layouts = DemoGenerator.generate(&request()).await.unwrap();
        assert_eq!(layouts.len(), 2);

        let festival: Vec<Vec<String>> =
            theme_palettes(Theme::Festival).iter().map(|(a, b)| vec![hex(*a), hex(*b)]).collect();
        for layout in &layouts {
            assert!((0.75..0.99).contains(&layout.score));
            assert_eq!(layout.cta_text, "SHOP NOW");
            assert!(festival.contains(&layout.palette));

            let png = base64::engine::general_purpose::STANDARD.decode(&layout.image).unwrap();
            let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (CANVAS_SIZE, CANVAS_SIZE));
        }
    }

    #[tokio::test]
    async fn demo_fails_on_unreadable_upload() {
        let mut req = request();
        req.logo.bytes = bytes::Bytes::from_static(b"definitely not an image");
        let err = DemoGenerator.generate(&req).await.unwrap_err();
        assert!(err.to_string().contains("brand.png"));
    }

    #[test]
    fn log_preview_truncates_image_payloads() {
        let long = "A".repeat(400);
        let body = serde_json::json!({"layouts": [{"image": long, "score": 0.5}]}).to_string();
        let preview = preview_body(&body);
        assert!(preview.contains("[truncated 350 chars]"));
        assert!(preview.len() < body.len());
    }

    #[test]
    fn log_preview_leaves_non_base64_images_intact() {
        let euro = "€".repeat(60);
        let body = serde_json::json!({"image": euro, "nested": [{"image": "é".repeat(200)}]}).to_string();
        let preview = preview_body(&body);
        assert!(preview.contains(&"€".repeat(60)));
        assert!(!preview.contains("truncated"));
    }

    fn decoded(png: &[u8]) -> RgbaImage { image::load_from_memory_with_format(png, ImageFormat::Png).unwrap().to_rgba8() }

    #[test]
    fn vignette_themes_fade_the_corners() {
        let req = request();
        let (product, logo) = (DemoGenerator::decode(&req.product).unwrap(), DemoGenerator::decode(&req.logo).unwrap());
        let mut rng = StdRng::seed_from_u64(7);

        let luxury = theme_palettes(Theme::Luxury)[0];
        let canvas = decoded(&DemoGenerator::render(&product, &logo, Theme::Luxury, luxury, LogoCorner::TopRight, &mut rng).unwrap());
        assert_eq!(canvas.get_pixel(0, CANVAS_SIZE - 1).0[3], 0);
        assert_eq!(canvas.get_pixel(CANVAS_SIZE / 2, CANVAS_SIZE / 2).0[3], 255);

        let minimal = theme_palettes(Theme::Minimal)[0];
        let canvas = decoded(&DemoGenerator::render(&product, &logo, Theme::Minimal, minimal, LogoCorner::TopLeft, &mut rng).unwrap());
        assert_eq!(canvas.get_pixel(0, CANVAS_SIZE - 1).0, [224, 224, 224, 255]);
    }

    #[test]
    fn every_theme_renders() {
        let req = request();
        let (product, logo) = (DemoGenerator::decode(&req.product).unwrap(), DemoGenerator::decode(&req.logo).unwrap());
        let mut rng = StdRng::seed_from_u64(42);
        for theme in Theme::ALL {
            let colors = theme_palettes(theme)[0];
            let canvas = decoded(&DemoGenerator::render(&product, &logo, theme, colors, LogoCorner::TopLeft, &mut rng).unwrap());
            assert_eq!(canvas.dimensions(), (CANVAS_SIZE, CANVAS_SIZE));
        }
        assert_eq!(theme_effects(Theme::Sporty), &[Effect::Shadow]);
        assert!(theme_effects(Theme::Minimal).is_empty());
    }

    #[test]
    fn palette_colors_are_hex() {
        assert_eq!(hex((245, 245, 245)), "#f5f5f5");
        assert_eq!(hex((0, 100, 220)), "#0064dc");
    }
}
