//! Display targets for rendered surfaces

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use log::{debug, warn};
use regex::Regex;

use crate::viewport::Size;

static SVG_ROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<svg\b[^>]*>").expect("Failed to compile svg root regex"));
static WIDTH_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\s)width="[^"]*""#).expect("Failed to compile width regex"));
static HEIGHT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\s)height="[^"]*""#).expect("Failed to compile height regex"));

/// Element that shows at most one rendered surface at a time.
///
/// The viewer always calls [`SurfaceSink::detach`] before
/// [`SurfaceSink::attach`], so an implementation never holds two.
pub trait SurfaceSink<S> {
    /// Display `surface` at `size`
    fn attach(&mut self, surface: &S, size: Size);

    /// Remove the displayed surface; returns whether one was shown
    fn detach(&mut self) -> bool;

    /// Update the displayed width/height without touching the content
    fn resize(&mut self, size: Size);

    /// Size of the enclosing container, if it can be measured
    fn container_size(&self) -> Option<Size>;
}

/// SVG markup produced by a vector renderer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SvgSurface(Arc<str>);

impl SvgSurface {
    pub fn new(markup: impl Into<Arc<str>>) -> Self {
        Self(markup.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Markup with the root element's `width`/`height` set to `size`
    #[must_use]
    pub fn with_size(&self, size: Size) -> String {
        let markup = self.as_str();
        let Some(root) = SVG_ROOT_RE.find(markup) else {
            return markup.to_string();
        };

        let width = format!(r#"${{1}}width="{}""#, format_px(size.width));
        let height = format!(r#"${{1}}height="{}""#, format_px(size.height));

        let mut tag = root.as_str().to_string();
        tag = if WIDTH_ATTR_RE.is_match(&tag) {
            WIDTH_ATTR_RE.replace(&tag, width.as_str()).into_owned()
        } else {
            tag.replacen("<svg", &format!(r#"<svg width="{}""#, format_px(size.width)), 1)
        };
        tag = if HEIGHT_ATTR_RE.is_match(&tag) {
            HEIGHT_ATTR_RE.replace(&tag, height.as_str()).into_owned()
        } else {
            tag.replacen("<svg", &format!(r#"<svg height="{}""#, format_px(size.height)), 1)
        };

        let mut out = String::with_capacity(markup.len() + 32);
        out.push_str(&markup[..root.start()]);
        out.push_str(&tag);
        out.push_str(&markup[root.end()..]);
        out
    }
}

fn format_px(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded}")
}

/// Writes the attached SVG to a file; detaching removes the file
pub struct SvgFileSink {
    path: PathBuf,
    container: Option<Size>,
    current: Option<SvgSurface>,
}

impl SvgFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            container: None,
            current: None,
        }
    }

    #[must_use]
    pub fn with_container(mut self, container: Size) -> Self {
        self.container = Some(container);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn current(&self) -> Option<&SvgSurface> {
        self.current.as_ref()
    }

    fn write(&self, surface: &SvgSurface, size: Size) {
        if let Err(e) = fs::write(&self.path, surface.with_size(size)) {
            warn!("Failed to write {}: {e}", self.path.display());
        }
    }
}

impl SurfaceSink<SvgSurface> for SvgFileSink {
    fn attach(&mut self, surface: &SvgSurface, size: Size) {
        debug!("Writing page to {}", self.path.display());
        self.write(surface, size);
        self.current = Some(surface.clone());
    }

    fn detach(&mut self) -> bool {
        if self.current.take().is_none() {
            return false;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {e}", self.path.display());
        }
        true
    }

    fn resize(&mut self, size: Size) {
        if let Some(surface) = &self.current {
            self.write(surface, size);
        }
    }

    fn container_size(&self) -> Option<Size> {
        self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0"?>
<svg xmlns="http://www.w3.org/2000/svg" width="612pt" height="792pt" viewBox="0 0 612 792">
<path stroke-width="2" d="M0 0"/>
</svg>"#;

    #[test]
    fn with_size_rewrites_root_attributes_only() {
        let svg = SvgSurface::new(PAGE);
        let resized = svg.with_size(Size::new(306.0, 396.5));

        assert!(resized.contains(r#"width="306" height="396.5" viewBox="0 0 612 792""#));
        assert!(resized.contains(r#"stroke-width="2""#));
        assert!(resized.starts_with("<?xml"));
    }

    #[test]
    fn with_size_adds_missing_attributes() {
        let svg = SvgSurface::new(r#"<svg viewBox="0 0 10 10"></svg>"#);
        let resized = svg.with_size(Size::new(20.0, 30.0));

        assert!(resized.contains(r#"width="20""#));
        assert!(resized.contains(r#"height="30""#));
    }

    #[test]
    fn file_sink_writes_resizes_and_removes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("page.svg");
        let mut sink = SvgFileSink::new(&path);

        sink.attach(&SvgSurface::new(PAGE), Size::new(612.0, 792.0));
        let written = fs::read_to_string(&path).expect("written");
        assert!(written.contains(r#"width="612""#));

        sink.resize(Size::new(100.0, 200.0));
        let written = fs::read_to_string(&path).expect("rewritten");
        assert!(written.contains(r#"height="200""#));

        assert!(sink.detach());
        assert!(!path.exists());
        assert!(!sink.detach());
    }

    #[test]
    fn file_sink_reports_configured_container() {
        let sink = SvgFileSink::new("unused.svg");
        assert_eq!(sink.container_size(), None);

        let sink = sink.with_container(Size::new(300.0, 400.0));
        assert_eq!(sink.container_size(), Some(Size::new(300.0, 400.0)));
    }
}
