//! Compositing graph synthesis.
//!
//! Builds the per-variant distortion chain and, when a banner is placed,
//! the chains that fit the banner into its band without cropping or
//! exceeding the canvas.

use unic_models::{BannerMode, BannerPosition, PlacementDecision, VariantParams, VideoInfo};

use crate::config::BannerConfig;
use crate::graph::{Expr, ExprEnv, Filter, FilterChain, FilterGraph, Var};

const SOURCE_VIDEO: &str = "0:v";
const BANNER_VIDEO: &str = "1:v";
const BASE_LABEL: &str = "base";
const CANVAS_LABEL: &str = "canvas";
const BANNER_RAW_LABEL: &str = "banner_raw";
const BANNER_LABEL: &str = "banner";
const FITTED_BASE_LABEL: &str = "base2";
/// Label of the final video stream.
pub const OUTPUT_LABEL: &str = "vout";

/// Smallest banner side the fit bounds allow.
const MIN_BANNER_SIDE: f64 = 2.0;

/// A graph ready for `-filter_complex` and the label to `-map`.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedGraph {
    pub graph: FilterGraph,
    pub output_label: String,
}

impl SynthesizedGraph {
    pub fn map_spec(&self) -> String {
        format!("[{}]", self.output_label)
    }
}

/// Expressions positioning the banner on the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct BannerGeometry {
    /// Fit bounds passed to `scale2ref`
    pub max_w: Expr,
    pub max_h: Expr,
    /// Overlay coordinates
    pub x: Expr,
    pub y: Expr,
}

/// Numeric resolution of a placement for one frame and banner size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutPreview {
    pub canvas_w: f64,
    pub canvas_h: f64,
    pub banner_w: f64,
    pub banner_h: f64,
    pub x: f64,
    pub y: f64,
}

/// Builds filter graphs for one source frame geometry.
#[derive(Debug, Clone)]
pub struct FilterGraphSynthesizer {
    frame: VideoInfo,
    chromakey_enabled: bool,
    chromakey_similarity: f64,
    chromakey_blend: f64,
}

impl FilterGraphSynthesizer {
    pub fn new(config: &BannerConfig, frame: VideoInfo) -> Self {
        Self {
            frame,
            chromakey_enabled: config.chromakey_enabled,
            chromakey_similarity: config.chromakey_similarity,
            chromakey_blend: config.chromakey_blend,
        }
    }

    /// Build the graph for one variant.
    pub fn build(&self, decision: Option<&PlacementDecision>, params: &VariantParams) -> SynthesizedGraph {
        let mut graph = FilterGraph::new();

        let base_out = if decision.is_some() { BASE_LABEL } else { OUTPUT_LABEL };
        graph.push(self.base_chain(params).output(base_out));

        if let Some(decision) = decision {
            let geometry = banner_geometry(decision);

            let canvas = match decision.mode {
                BannerMode::Strip => strip_canvas(decision),
                BannerMode::Overlay => FilterChain::new().filter(Filter::Null),
            };
            graph.push(canvas.input(BASE_LABEL).output(CANVAS_LABEL));
            graph.push(self.banner_chain(decision));
            graph.push(
                FilterChain::new()
                    .input(BANNER_RAW_LABEL)
                    .input(CANVAS_LABEL)
                    .filter(Filter::ScaleToRef {
                        w: geometry.max_w,
                        h: geometry.max_h,
                    })
                    .output(BANNER_LABEL)
                    .output(FITTED_BASE_LABEL),
            );
            graph.push(
                FilterChain::new()
                    .input(FITTED_BASE_LABEL)
                    .input(BANNER_LABEL)
                    .filter(Filter::Overlay {
                        x: geometry.x,
                        y: geometry.y,
                    })
                    .output(OUTPUT_LABEL),
            );
        }

        SynthesizedGraph {
            graph,
            output_label: OUTPUT_LABEL.to_string(),
        }
    }

    /// Zoom-crop, color shift and grain on the source video.
    fn base_chain(&self, params: &VariantParams) -> FilterChain {
        let zoom = params.zoom;
        let (restore_w, restore_h): (Expr, Expr) = if self.frame.has_geometry() {
            (self.frame.width.into(), self.frame.height.into())
        } else {
            (Var::InputW.into(), Var::InputH.into())
        };

        FilterChain::new()
            .input(SOURCE_VIDEO)
            .filter(Filter::Scale {
                w: Var::InputW * zoom,
                h: Var::InputH * zoom,
                flags: Some("lanczos"),
            })
            .filter(Filter::Crop {
                w: Var::InputW / zoom,
                h: Var::InputH / zoom,
            })
            .filter(Filter::Scale {
                w: restore_w,
                h: restore_h,
                flags: Some("lanczos"),
            })
            .filter(Filter::Eq {
                brightness: params.brightness,
                contrast: 1.0,
                saturation: params.saturation_factor,
            })
            .filter(Filter::ResetPts)
            .filter(Filter::Noise {
                strength: params.noise_level,
            })
    }

    fn banner_chain(&self, decision: &PlacementDecision) -> FilterChain {
        let mut chain = FilterChain::new()
            .input(BANNER_VIDEO)
            .filter(Filter::ResetPts)
            .filter(Filter::Format("rgba"));

        if let (true, Some(color)) = (self.chromakey_enabled, decision.chroma_key_color) {
            chain = chain.filter(Filter::ChromaKey {
                color,
                similarity: self.chromakey_similarity,
                blend: self.chromakey_blend,
            });
        }

        chain.output(BANNER_RAW_LABEL)
    }

    /// Resolve the layout numerically for a banner of `native` size.
    ///
    /// Returns `None` when the frame geometry is unknown.
    pub fn preview(&self, decision: &PlacementDecision, native: (u32, u32)) -> Option<LayoutPreview> {
        if !self.frame.has_geometry() || native.0 == 0 || native.1 == 0 {
            return None;
        }
        Some(preview_layout(decision, self.frame.width, self.frame.height, native))
    }
}

/// Shrink the footage and pad a black band for the banner.
fn strip_canvas(decision: &PlacementDecision) -> FilterChain {
    let band = decision.strip_height;
    let video_offset = match decision.position {
        BannerPosition::Top => band,
        BannerPosition::Bottom => 0,
    };

    FilterChain::new()
        .filter(Filter::Scale {
            w: Var::InputW.into(),
            h: Var::InputH * (Expr::num(1u32) - decision.strip_ratio),
            flags: None,
        })
        .filter(Filter::Pad {
            w: Var::InputW.into(),
            h: Var::InputH + band,
            x: Expr::num(0u32),
            y: Expr::num(video_offset),
            color: "black",
        })
}

/// Fit bounds and overlay coordinates for a placement.
pub fn banner_geometry(decision: &PlacementDecision) -> BannerGeometry {
    let margin = decision.margin_px;
    let twice_margin = || Expr::num(2u32) * margin;

    let max_w = Expr::min(
        Var::InputW,
        Expr::max(MIN_BANNER_SIDE, Expr::num(decision.width_ratio) * Var::RefW - twice_margin()),
    );

    // The margin floor gives way to the canvas edge on frames too small for both margins
    let x = Expr::min(
        Expr::max(
            margin,
            Expr::min((Var::MainW - Var::OverlayW) / 2u32, Var::MainW - Var::OverlayW - margin),
        ),
        Expr::max(0u32, Var::MainW - Var::OverlayW),
    );
    let bottom_limit = || Var::MainH - Var::OverlayH - margin;
    let within_canvas = |y: Expr| Expr::min(Expr::max(margin, y), Expr::max(0u32, Var::MainH - Var::OverlayH));

    let (max_h, y) = match decision.mode {
        BannerMode::Strip => {
            let band = decision.strip_height;
            let centered = (Expr::num(band) - Var::OverlayH) / 2u32;
            let target = match decision.position {
                BannerPosition::Top => centered,
                BannerPosition::Bottom => Var::MainH - band + centered,
            };
            (
                Expr::min(Var::InputH, Expr::max(MIN_BANNER_SIDE, Expr::num(band) - twice_margin())),
                within_canvas(Expr::min(target, bottom_limit())),
            )
        }
        BannerMode::Overlay => {
            let band = Expr::max(MIN_BANNER_SIDE, Expr::num(decision.strip_ratio) * Var::RefH);
            // Anchored to the band edge rather than centred in it
            let anchor = match decision.position {
                BannerPosition::Top => Expr::num(margin),
                BannerPosition::Bottom => bottom_limit(),
            };
            (
                Expr::min(Var::InputH, Expr::max(MIN_BANNER_SIDE, band - twice_margin())),
                within_canvas(Expr::min(anchor, bottom_limit())),
            )
        }
    };

    BannerGeometry { max_w, max_h, x, y }
}

/// Evaluate a placement for a `width`×`height` source and `native` banner.
pub fn preview_layout(decision: &PlacementDecision, width: u32, height: u32, native: (u32, u32)) -> LayoutPreview {
    let (canvas_w, canvas_h) = match decision.mode {
        BannerMode::Strip => {
            let scaled_h = (height as f64 * (1.0 - decision.strip_ratio)).round();
            (width as f64, scaled_h + decision.strip_height as f64)
        }
        BannerMode::Overlay => (width as f64, height as f64),
    };

    let geometry = banner_geometry(decision);
    let (native_w, native_h) = (native.0 as f64, native.1 as f64);

    let fit_env = ExprEnv {
        input_w: native_w,
        input_h: native_h,
        ref_w: canvas_w,
        ref_h: canvas_h,
        ..ExprEnv::default()
    };
    let bound_w = geometry.max_w.eval(&fit_env).floor();
    let bound_h = geometry.max_h.eval(&fit_env).floor();

    // force_original_aspect_ratio=decrease
    let aspect = native_w / native_h;
    let banner_w = bound_w.min((bound_h * aspect).floor()).max(MIN_BANNER_SIDE).min(bound_w);
    let banner_h = bound_h.min((bound_w / aspect).floor()).max(MIN_BANNER_SIDE).min(bound_h);

    let overlay_env = ExprEnv {
        main_w: canvas_w,
        main_h: canvas_h,
        overlay_w: banner_w,
        overlay_h: banner_h,
        ..ExprEnv::default()
    };

    LayoutPreview {
        canvas_w,
        canvas_h,
        banner_w,
        banner_h,
        x: geometry.x.eval(&overlay_env),
        y: geometry.y.eval(&overlay_env),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use unic_models::{BannerAsset, Rgb};

    fn params() -> VariantParams {
        VariantParams {
            seed: 1,
            zoom: 1.03,
            brightness: 0.01,
            saturation_factor: 0.99,
            noise_value: 0.008,
            noise_level: 2,
            pitch_factor: 1.0,
        }
    }

    fn decision(position: BannerPosition, mode: BannerMode, width: u32, height: u32) -> PlacementDecision {
        let min_dim = width.min(height).max(1) as f64;
        let margin = ((min_dim * 0.03) as u32).max(2).min(((min_dim * 0.08) as u32).max(2));
        let mut strip = ((height as f64 * 0.20) as u32).max(2);
        if strip <= 2 * margin + 2 {
            strip = (2 * margin + 2).min(height);
        }
        PlacementDecision {
            asset: BannerAsset {
                path: PathBuf::from("banner.png"),
                is_motion: false,
                sampled_corner_color: None,
                native_size: Some((1200, 300)),
            },
            position,
            mode,
            strip_height: strip,
            margin_px: margin,
            width_ratio: 0.86,
            strip_ratio: 0.20,
            chroma_key_color: Some(Rgb::new(0, 255, 0)),
        }
    }

    fn synth(width: u32, height: u32) -> FilterGraphSynthesizer {
        let frame = VideoInfo {
            width,
            height,
            duration: 10.0,
            fps: 30.0,
            has_audio: true,
        };
        FilterGraphSynthesizer::new(&BannerConfig::default(), frame)
    }

    #[test]
    fn test_base_chain_without_banner() {
        let built = synth(1080, 1920).build(None, &params());
        assert_eq!(built.output_label, "vout");
        assert_eq!(
            built.graph.to_string(),
            "[0:v]scale=iw*1.03:ih*1.03:flags=lanczos,crop=iw/1.03:ih/1.03,\
             scale=1080:1920:flags=lanczos,eq=brightness=0.01000:contrast=1.0:saturation=0.99000,\
             setpts=PTS-STARTPTS,noise=alls=2:allf=t[vout]"
        );
    }

    #[test]
    fn test_unknown_geometry_restores_input_size() {
        let synth = FilterGraphSynthesizer::new(&BannerConfig::default(), VideoInfo::unknown());
        let text = synth.build(None, &params()).graph.to_string();
        assert!(text.contains("scale=iw:ih:flags=lanczos"));
    }

    #[test]
    fn test_strip_bottom_graph() {
        let decision = decision(BannerPosition::Bottom, BannerMode::Strip, 1080, 1920);
        let text = synth(1080, 1920).build(Some(&decision), &params()).graph.to_string();

        assert!(text.contains("[0:v]scale=iw*1.03"));
        assert!(text.contains("noise=alls=2:allf=t[base]"));
        assert!(text.contains("[base]scale=iw:ih*(1-0.2),pad=iw:ih+384:0:0:color=black[canvas]"));
        assert!(text.contains("[1:v]setpts=PTS-STARTPTS,format=rgba,chromakey=0x00ff00:0.18:0.02[banner_raw]"));
        assert!(text.contains(
            "[banner_raw][canvas]scale2ref=w=min(iw\\,max(2\\,0.86*ref_w-2*32)):h=min(ih\\,max(2\\,384-2*32)):force_original_aspect_ratio=decrease[banner][base2]"
        ));
        assert!(text.contains("y=min(max(32\\,min(H-384+(384-h)/2\\,H-h-32))\\,max(0\\,H-h))"));
        assert!(text.ends_with(":format=auto[vout]"));
    }

    #[test]
    fn test_strip_top_pads_above() {
        let decision = decision(BannerPosition::Top, BannerMode::Strip, 1080, 1920);
        let text = synth(1080, 1920).build(Some(&decision), &params()).graph.to_string();
        assert!(text.contains("pad=iw:ih+384:0:384:color=black"));
        assert!(text.contains("y=min(max(32\\,min((384-h)/2\\,H-h-32))\\,max(0\\,H-h))"));
    }

    #[test]
    fn test_overlay_graph_and_chromakey_toggle() {
        let decision = decision(BannerPosition::Top, BannerMode::Overlay, 1080, 1920);
        let config = BannerConfig {
            chromakey_enabled: false,
            ..BannerConfig::default()
        };
        let synth = FilterGraphSynthesizer::new(&config, VideoInfo {
            width: 1080,
            height: 1920,
            duration: 1.0,
            fps: 30.0,
            has_audio: false,
        });
        let text = synth.build(Some(&decision), &params()).graph.to_string();
        assert!(text.contains("[base]null[canvas]"));
        assert!(!text.contains("chromakey"));
        assert!(text.contains("h=min(ih\\,max(2\\,max(2\\,0.2*ref_h)-2*32))"));
        assert!(text.contains("y=min(max(32\\,min(32\\,H-h-32))\\,max(0\\,H-h))"));
    }

    #[test]
    fn test_preview_fits_inside_band_and_width() {
        for (w, h) in [(1080, 1920), (720, 1280), (1920, 1080), (64, 64), (8, 8), (3, 3), (2, 2)] {
            for mode in [BannerMode::Strip, BannerMode::Overlay] {
                for position in [BannerPosition::Top, BannerPosition::Bottom] {
                    let decision = decision(position, mode, w, h);
                    for native in [(1200, 300), (300, 300), (40, 200), (3, 3)] {
                        let layout = preview_layout(&decision, w, h, native);
                        let label = format!("{w}x{h} {mode}/{position} {native:?}");

                        assert!(layout.banner_w >= MIN_BANNER_SIDE && layout.banner_h >= MIN_BANNER_SIDE, "{label}");
                        assert!(layout.banner_w <= native.0 as f64, "{label}");
                        assert!(layout.banner_h <= native.1 as f64, "{label}");
                        assert!(
                            layout.banner_w <= (decision.width_ratio * layout.canvas_w).max(MIN_BANNER_SIDE),
                            "{label}"
                        );
                        assert!(layout.x >= 0.0 && layout.x <= layout.canvas_w - layout.banner_w, "{label}");
                        assert!(layout.y >= 0.0 && layout.y <= layout.canvas_h - layout.banner_h, "{label}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_tiny_frame_keeps_banner_on_canvas() {
        let decision = decision(BannerPosition::Top, BannerMode::Strip, 3, 3);
        let layout = preview_layout(&decision, 3, 3, (3, 3));
        assert_eq!((layout.canvas_w, layout.canvas_h), (3.0, 5.0));
        assert_eq!((layout.banner_w, layout.banner_h), (2.0, 2.0));
        assert_eq!((layout.x, layout.y), (1.0, 2.0));
    }

    #[test]
    fn test_fit_bounds_never_below_two_pixels() {
        let decision = decision(BannerPosition::Bottom, BannerMode::Strip, 8, 8);
        let geometry = banner_geometry(&decision);
        let env = ExprEnv {
            input_w: 500.0,
            input_h: 500.0,
            ref_w: 1.0,
            ref_h: 1.0,
            ..ExprEnv::default()
        };
        assert!(geometry.max_w.eval(&env) >= 2.0);
        assert!(geometry.max_h.eval(&env) >= 2.0);
    }

    #[test]
    fn test_strip_banner_lands_in_band() {
        let decision = decision(BannerPosition::Bottom, BannerMode::Strip, 1080, 1920);
        let layout = preview_layout(&decision, 1080, 1920, (1200, 300));
        let band_top = layout.canvas_h - decision.strip_height as f64;
        assert!(layout.y >= band_top);
        assert!(layout.y + layout.banner_h <= layout.canvas_h - decision.margin_px as f64);
        assert_eq!(layout.canvas_h, 1536.0 + 384.0);
    }

    #[test]
    fn test_preview_requires_geometry() {
        let decision = decision(BannerPosition::Top, BannerMode::Overlay, 1080, 1920);
        let synth = FilterGraphSynthesizer::new(&BannerConfig::default(), VideoInfo::unknown());
        assert!(synth.preview(&decision, (100, 50)).is_none());
    }
}
