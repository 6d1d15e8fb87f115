//! Typed filter-graph IR.
//!
//! Expressions, filters and labelled chains are built as values and only
//! turned into FFmpeg `filter_complex` text by their `Display` impls. The
//! same expressions can be evaluated numerically, which is how layout
//! bounds are checked without running the engine.

use std::fmt;
use std::ops;

use unic_models::Rgb;

/// Variables the engine binds while evaluating filter options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    /// Input width (`iw`)
    InputW,
    /// Input height (`ih`)
    InputH,
    /// Reference input width for `scale2ref` (`ref_w`)
    RefW,
    /// Reference input height for `scale2ref` (`ref_h`)
    RefH,
    /// Main (background) width for `overlay` (`W`)
    MainW,
    /// Main (background) height for `overlay` (`H`)
    MainH,
    /// Overlaid width (`w`)
    OverlayW,
    /// Overlaid height (`h`)
    OverlayH,
}

impl Var {
    pub fn as_str(&self) -> &'static str {
        match self {
            Var::InputW => "iw",
            Var::InputH => "ih",
            Var::RefW => "ref_w",
            Var::RefH => "ref_h",
            Var::MainW => "W",
            Var::MainH => "H",
            Var::OverlayW => "w",
            Var::OverlayH => "h",
        }
    }
}

/// Values bound to [`Var`]s during numeric evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExprEnv {
    pub input_w: f64,
    pub input_h: f64,
    pub ref_w: f64,
    pub ref_h: f64,
    pub main_w: f64,
    pub main_h: f64,
    pub overlay_w: f64,
    pub overlay_h: f64,
}

impl ExprEnv {
    fn get(&self, var: Var) -> f64 {
        match var {
            Var::InputW => self.input_w,
            Var::InputH => self.input_h,
            Var::RefW => self.ref_w,
            Var::RefH => self.ref_h,
            Var::MainW => self.main_w,
            Var::MainH => self.main_h,
            Var::OverlayW => self.overlay_w,
            Var::OverlayH => self.overlay_h,
        }
    }
}

/// Arithmetic expression over engine variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(Var),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn num(value: impl Into<f64>) -> Self {
        Expr::Num(value.into())
    }

    pub fn var(var: Var) -> Self {
        Expr::Var(var)
    }

    pub fn min(a: impl Into<Expr>, b: impl Into<Expr>) -> Self {
        Expr::Min(Box::new(a.into()), Box::new(b.into()))
    }

    pub fn max(a: impl Into<Expr>, b: impl Into<Expr>) -> Self {
        Expr::Max(Box::new(a.into()), Box::new(b.into()))
    }

    /// Evaluate with the engine's floating-point semantics.
    pub fn eval(&self, env: &ExprEnv) -> f64 {
        match self {
            Expr::Num(n) => *n,
            Expr::Var(v) => env.get(*v),
            Expr::Add(a, b) => a.eval(env) + b.eval(env),
            Expr::Sub(a, b) => a.eval(env) - b.eval(env),
            Expr::Mul(a, b) => a.eval(env) * b.eval(env),
            Expr::Div(a, b) => a.eval(env) / b.eval(env),
            Expr::Min(a, b) => a.eval(env).min(b.eval(env)),
            Expr::Max(a, b) => a.eval(env).max(b.eval(env)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(..) | Expr::Sub(..) => 1,
            Expr::Num(n) if *n < 0.0 => 1,
            Expr::Mul(..) | Expr::Div(..) => 2,
            _ => 3,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, parent: u8, right_of_inverse: bool) -> fmt::Result {
        let prec = self.precedence();
        let wrap = prec < parent || (right_of_inverse && prec == parent);
        if wrap {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }

    fn fmt_binary(f: &mut fmt::Formatter<'_>, a: &Expr, op: char, b: &Expr, prec: u8) -> fmt::Result {
        a.fmt_operand(f, prec, false)?;
        write!(f, "{}", op)?;
        b.fmt_operand(f, prec, op == '-' || op == '/')
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => f.write_str(&format_number(*n)),
            Expr::Var(v) => f.write_str(v.as_str()),
            Expr::Add(a, b) => Expr::fmt_binary(f, a, '+', b, 1),
            Expr::Sub(a, b) => Expr::fmt_binary(f, a, '-', b, 1),
            Expr::Mul(a, b) => Expr::fmt_binary(f, a, '*', b, 2),
            Expr::Div(a, b) => Expr::fmt_binary(f, a, '/', b, 2),
            // Commas inside option values must be escaped in filter_complex
            Expr::Min(a, b) => write!(f, "min({}\\,{})", a, b),
            Expr::Max(a, b) => write!(f, "max({}\\,{})", a, b),
        }
    }
}

/// Shortest decimal form with at most five fractional digits.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let text = format!("{:.5}", n);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::Num(value)
    }
}

impl From<u32> for Expr {
    fn from(value: u32) -> Self {
        Expr::Num(value as f64)
    }
}

impl From<Var> for Expr {
    fn from(value: Var) -> Self {
        Expr::Var(value)
    }
}

macro_rules! impl_expr_op {
    ($trait:ident, $method:ident, $variant:ident) => {
        impl<R: Into<Expr>> ops::$trait<R> for Expr {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::$variant(Box::new(self), Box::new(rhs.into()))
            }
        }

        impl<R: Into<Expr>> ops::$trait<R> for Var {
            type Output = Expr;

            fn $method(self, rhs: R) -> Expr {
                Expr::$variant(Box::new(Expr::Var(self)), Box::new(rhs.into()))
            }
        }
    };
}

impl_expr_op!(Add, add, Add);
impl_expr_op!(Sub, sub, Sub);
impl_expr_op!(Mul, mul, Mul);
impl_expr_op!(Div, div, Div);

/// A single filter node.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Scale {
        w: Expr,
        h: Expr,
        flags: Option<&'static str>,
    },
    Crop {
        w: Expr,
        h: Expr,
    },
    Eq {
        brightness: f64,
        contrast: f64,
        saturation: f64,
    },
    /// `setpts=PTS-STARTPTS`
    ResetPts,
    Noise {
        strength: u32,
    },
    Format(&'static str),
    ChromaKey {
        color: Rgb,
        similarity: f64,
        blend: f64,
    },
    Pad {
        w: Expr,
        h: Expr,
        x: Expr,
        y: Expr,
        color: &'static str,
    },
    Null,
    /// `scale2ref` fitting the first input inside the given bounds.
    ScaleToRef {
        w: Expr,
        h: Expr,
    },
    Overlay {
        x: Expr,
        y: Expr,
    },
    Resample {
        rate: u32,
        sample_format: Option<&'static str>,
    },
    SetRate(u32),
    Tempo(f64),
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Scale { w, h, flags } => {
                write!(f, "scale={}:{}", w, h)?;
                if let Some(flags) = flags {
                    write!(f, ":flags={}", flags)?;
                }
                Ok(())
            }
            Filter::Crop { w, h } => write!(f, "crop={}:{}", w, h),
            Filter::Eq {
                brightness,
                contrast,
                saturation,
            } => write!(
                f,
                "eq=brightness={:.5}:contrast={:.1}:saturation={:.5}",
                brightness, contrast, saturation
            ),
            Filter::ResetPts => f.write_str("setpts=PTS-STARTPTS"),
            Filter::Noise { strength } => write!(f, "noise=alls={}:allf=t", strength),
            Filter::Format(format) => write!(f, "format={}", format),
            Filter::ChromaKey {
                color,
                similarity,
                blend,
            } => write!(f, "chromakey={}:{}:{}", color, similarity, blend),
            Filter::Pad { w, h, x, y, color } => {
                write!(f, "pad={}:{}:{}:{}:color={}", w, h, x, y, color)
            }
            Filter::Null => f.write_str("null"),
            Filter::ScaleToRef { w, h } => write!(
                f,
                "scale2ref=w={}:h={}:force_original_aspect_ratio=decrease",
                w, h
            ),
            Filter::Overlay { x, y } => write!(f, "overlay=x={}:y={}:format=auto", x, y),
            Filter::Resample { rate, sample_format } => {
                write!(f, "aresample={}", rate)?;
                if let Some(osf) = sample_format {
                    write!(f, ":osf={}", osf)?;
                }
                Ok(())
            }
            Filter::SetRate(rate) => write!(f, "asetrate={}", rate),
            Filter::Tempo(tempo) => write!(f, "atempo={:.7}", tempo),
        }
    }
}

/// Filters applied in sequence, with optional labelled pads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterChain {
    pub inputs: Vec<String>,
    pub filters: Vec<Filter>,
    pub outputs: Vec<String>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, label: impl Into<String>) -> Self {
        self.inputs.push(label.into());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn output(mut self, label: impl Into<String>) -> Self {
        self.outputs.push(label.into());
        self
    }
}

impl fmt::Display for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.inputs {
            write!(f, "[{}]", label)?;
        }
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", filter)?;
        }
        for label in &self.outputs {
            write!(f, "[{}]", label)?;
        }
        Ok(())
    }
}

/// Chains joined with `;`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterGraph {
    pub chains: Vec<FilterChain>,
}

impl FilterGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(mut self, chain: FilterChain) -> Self {
        self.chains.push(chain);
        self
    }

    pub fn push(&mut self, chain: FilterChain) {
        self.chains.push(chain);
    }

    /// Chain that writes `label`, if any.
    pub fn producer(&self, label: &str) -> Option<&FilterChain> {
        self.chains.iter().find(|c| c.outputs.iter().any(|o| o == label))
    }
}

impl fmt::Display for FilterGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, chain) in self.chains.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{}", chain)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_parenthesizes_only_when_needed() {
        let expr = Var::InputH * (Expr::num(1.0) - 0.2);
        assert_eq!(expr.to_string(), "ih*(1-0.2)");

        let expr = Var::MainH - 384u32 + (Expr::num(384u32) - Var::OverlayH) / 2.0;
        assert_eq!(expr.to_string(), "H-384+(384-h)/2");

        let expr = Expr::num(10.0) - (Expr::num(4.0) - 3.0);
        assert_eq!(expr.to_string(), "10-(4-3)");
        assert_eq!(expr.eval(&ExprEnv::default()), 9.0);
    }

    #[test]
    fn test_functions_escape_commas() {
        let expr = Expr::max(32u32, Expr::min((Var::MainW - Var::OverlayW) / 2.0, Var::MainW - Var::OverlayW - 32u32));
        assert_eq!(expr.to_string(), "max(32\\,min((W-w)/2\\,W-w-32))");
    }

    #[test]
    fn test_eval_binds_variables() {
        let env = ExprEnv {
            main_w: 1080.0,
            overlay_w: 880.0,
            ..ExprEnv::default()
        };
        let x = Expr::max(32u32, Expr::min((Var::MainW - Var::OverlayW) / 2.0, Var::MainW - Var::OverlayW - 32u32));
        assert_eq!(x.eval(&env), 100.0);
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(2.0), "2");
        assert_eq!(format_number(0.86), "0.86");
        assert_eq!(format_number(1.034567891), "1.03457");
        assert_eq!(format_number(-3.0), "-3");
    }

    #[test]
    fn test_graph_serialization() {
        let graph = FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input("0:v")
                    .filter(Filter::ResetPts)
                    .filter(Filter::Noise { strength: 2 })
                    .output("base"),
            )
            .chain(FilterChain::new().input("base").filter(Filter::Null).output("vout"));

        assert_eq!(
            graph.to_string(),
            "[0:v]setpts=PTS-STARTPTS,noise=alls=2:allf=t[base];[base]null[vout]"
        );
        assert!(graph.producer("vout").is_some());
        assert!(graph.producer("missing").is_none());
    }

    #[test]
    fn test_filter_display() {
        let key = Filter::ChromaKey {
            color: Rgb::new(0, 255, 0),
            similarity: 0.18,
            blend: 0.02,
        };
        assert_eq!(key.to_string(), "chromakey=0x00ff00:0.18:0.02");

        let audio = FilterChain::new()
            .filter(Filter::Resample { rate: 48000, sample_format: Some("s32") })
            .filter(Filter::SetRate(48480))
            .filter(Filter::Tempo(1.0 / 1.01));
        assert_eq!(
            audio.to_string(),
            "aresample=48000:osf=s32,asetrate=48480,atempo=0.9900990"
        );
    }
}
