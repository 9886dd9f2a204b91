//! Frame asset generator.
//!
//! Renders one still image per scene: a gradient background chosen from
//! the scene's visual hint, the narration's hook line, an optional
//! secondary line, and a progress strip. The composite is built as an
//! SVG document and rasterized to PNG. Pure function of the scene's
//! text/hint fields; malformed hints fall back to the neutral treatment
//! instead of failing the job.

use log::debug;

use crate::error::RenderError;
use crate::scene::Scene;

const MAIN_TEXT_MAX_CHARS: usize = 60;
const SUB_TEXT_MAX_CHARS: usize = 100;

/// Visual treatment selected from the scene hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Treatment {
    Fear,
    Success,
    Warning,
    Confident,
    Neutral,
}

impl Treatment {
    /// Keyword match on the hint; anything unrecognized is neutral.
    pub fn from_hint(hint: &str) -> Self {
        let h = hint.to_lowercase();
        if h.contains("fear") || h.contains("worry") || h.contains("danger") {
            Self::Fear
        } else if h.contains("success") || h.contains("win") || h.contains("rich") {
            Self::Success
        } else if h.contains("debt") || h.contains("problem") {
            Self::Warning
        } else if h.contains("confident") || h.contains("hero") {
            Self::Confident
        } else {
            Self::Neutral
        }
    }

    /// Gradient endpoints for the background.
    fn gradient(self) -> (&'static str, &'static str) {
        match self {
            Self::Fear => ("#000000", "#434343"),
            Self::Success => ("#134e4a", "#065f46"),
            Self::Warning => ("#450a0a", "#991b1b"),
            Self::Confident => ("#1e3a8a", "#1e40af"),
            Self::Neutral => ("#0f172a", "#1e293b"),
        }
    }
}

/// Renders scene stills at a fixed resolution.
pub struct FrameRenderer {
    width: u32,
    height: u32,
    watermark: Option<String>,
    options: usvg::Options<'static>,
}

impl FrameRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut fontdb = usvg::fontdb::Database::new();
        fontdb.load_system_fonts();
        let options = usvg::Options {
            fontdb: std::sync::Arc::new(fontdb),
            ..Default::default()
        };
        Self {
            width,
            height,
            watermark: None,
            options,
        }
    }

    /// Add a faint brand line in the lower-left corner of every frame.
    pub fn with_watermark(mut self, watermark: impl Into<String>) -> Self {
        self.watermark = Some(watermark.into());
        self
    }

    /// Render one scene to PNG bytes.
    ///
    /// `scene_count` sizes the progress strip along the bottom edge.
    /// Never fails for a well-formed scene; an internal failure here is a
    /// bug and surfaces as an asset-generation error.
    pub fn render(&self, scene: &Scene, scene_count: usize) -> Result<Vec<u8>, RenderError> {
        debug!("rendering frame for scene {}", scene.index);

        let svg = self.compose_svg(scene, scene_count);
        let tree = usvg::Tree::from_str(&svg, &self.options)
            .map_err(|e| RenderError::AssetGeneration(format!("scene {}: {}", scene.index, e)))?;

        let mut pixmap = resvg::tiny_skia::Pixmap::new(self.width, self.height).ok_or_else(|| {
            RenderError::AssetGeneration(format!(
                "scene {}: failed to allocate {}x{} pixmap",
                scene.index, self.width, self.height
            ))
        })?;
        resvg::render(
            &tree,
            resvg::tiny_skia::Transform::identity(),
            &mut pixmap.as_mut(),
        );

        pixmap
            .encode_png()
            .map_err(|e| RenderError::AssetGeneration(format!("scene {}: {}", scene.index, e)))
    }

    fn compose_svg(&self, scene: &Scene, scene_count: usize) -> String {
        let (w, h) = (self.width, self.height);
        let treatment = Treatment::from_hint(&scene.visual_hint);
        let (grad_start, grad_end) = treatment.gradient();

        let main_text = main_line(&scene.narration_text);
        let sub_text = sub_line(&scene.narration_text);

        // Progress strip along the bottom edge grows with the scene's
        // position in the video.
        let progress_width =
            (scene.index + 1) as f64 / scene_count.max(1) as f64 * f64::from(w);

        let mut svg = format!(
            r##"<svg width="{w}" height="{h}" xmlns="http://www.w3.org/2000/svg">
  <defs>
    <filter id="textGlow" x="-20%" y="-20%" width="140%" height="140%">
      <feGaussianBlur stdDeviation="5" result="blur"/>
      <feComposite in="SourceGraphic" in2="blur" operator="over"/>
    </filter>
    <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
      <stop offset="0%" stop-color="{grad_start}"/>
      <stop offset="100%" stop-color="{grad_end}"/>
    </linearGradient>
  </defs>
  <rect width="{w}" height="{h}" fill="url(#grad)"/>
  <rect x="50" y="50" width="{inner_w}" height="{inner_h}" fill="none" stroke="rgba(255,255,255,0.1)" stroke-width="2"/>
  <text x="50%" y="48%" font-family="Impact, Arial, sans-serif" font-size="110" font-weight="900" fill="#FFD700" text-anchor="middle" filter="url(#textGlow)" letter-spacing="4">{main}</text>
"##,
            inner_w = w.saturating_sub(100),
            inner_h = h.saturating_sub(100),
            main = escape_xml(&main_text),
        );

        if !sub_text.is_empty() {
            svg.push_str(&format!(
                r##"  <text x="50%" y="62%" font-family="Verdana, sans-serif" font-size="42" fill="white" fill-opacity="0.9" font-style="italic" text-anchor="middle">{}</text>
"##,
                escape_xml(&sub_text)
            ));
        }

        if let Some(watermark) = &self.watermark {
            svg.push_str(&format!(
                r##"  <text x="100" y="{y}" font-family="Arial" font-size="24" fill="rgba(255,255,255,0.3)" font-weight="bold">{text}</text>
"##,
                y = h.saturating_sub(100),
                text = escape_xml(watermark),
            ));
        }

        svg.push_str(&format!(
            r##"  <rect x="0" y="{y}" width="{pw:.1}" height="10" fill="#FFD700" fill-opacity="0.6"/>
</svg>
"##,
            y = h.saturating_sub(10),
            pw = progress_width,
        ));

        svg
    }
}

/// The hook line: first sentence, truncated and uppercased.
fn main_line(narration: &str) -> String {
    narration
        .split('.')
        .next()
        .unwrap_or("")
        .trim()
        .chars()
        .take(MAIN_TEXT_MAX_CHARS)
        .collect::<String>()
        .to_uppercase()
}

/// The secondary line: second sentence, truncated. May be empty.
fn sub_line(narration: &str) -> String {
    narration
        .split('.')
        .nth(1)
        .unwrap_or("")
        .trim()
        .chars()
        .take(SUB_TEXT_MAX_CHARS)
        .collect()
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&apos;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(narration: &str, hint: &str) -> Scene {
        Scene {
            index: 0,
            duration_seconds: 5.0,
            narration_text: narration.to_string(),
            visual_hint: hint.to_string(),
        }
    }

    #[test]
    fn test_treatment_from_hint() {
        assert_eq!(Treatment::from_hint("a moment of fear"), Treatment::Fear);
        assert_eq!(Treatment::from_hint("WIN big"), Treatment::Success);
        assert_eq!(Treatment::from_hint("drowning in debt"), Treatment::Warning);
        assert_eq!(Treatment::from_hint("hero shot"), Treatment::Confident);
        assert_eq!(Treatment::from_hint(""), Treatment::Neutral);
        assert_eq!(Treatment::from_hint("???\u{1F600}"), Treatment::Neutral);
    }

    #[test]
    fn test_text_lines() {
        assert_eq!(main_line("hello there. second part."), "HELLO THERE");
        assert_eq!(sub_line("hello there. second part."), "second part");
        assert_eq!(sub_line("just one sentence"), "");
        // Truncation counts characters, not bytes.
        let long = "é".repeat(200);
        assert_eq!(main_line(&long).chars().count(), MAIN_TEXT_MAX_CHARS);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"<cash> & "debt""#),
            "&lt;cash&gt; &amp; &quot;debt&quot;"
        );
    }

    #[test]
    fn test_render_produces_png() {
        let renderer = FrameRenderer::new(320, 180).with_watermark("demo");
        let bytes = renderer
            .render(&scene("Markets move fast. Stay calm.", "confident"), 3)
            .unwrap();
        assert!(bytes.len() > 8);
        assert_eq!(&bytes[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_render_tolerates_hostile_text() {
        let renderer = FrameRenderer::new(160, 90);
        let bytes = renderer
            .render(&scene("<script>&'\"</script>. tail.", "\u{0000}weird"), 1)
            .unwrap();
        assert!(!bytes.is_empty());
    }
}
