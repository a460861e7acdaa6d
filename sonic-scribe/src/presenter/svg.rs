//! SVG builder: accumulates elements and produces the final document

pub(super) struct SvgBuilder {
    elements: Vec<String>,
    width: f64,
    height: f64,
    class: &'static str,
}

fn escape(content: &str) -> String {
    content
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

impl SvgBuilder {
    pub(super) fn new(width: f64, height: f64, class: &'static str) -> Self {
        Self {
            elements: Vec::new(),
            width,
            height,
            class,
        }
    }

    pub(super) fn build(self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" class="{}" viewBox="0 0 {:.0} {:.0}" width="{:.0}" height="{:.0}">"#,
            self.class, self.width, self.height, self.width, self.height
        );
        svg.push('\n');
        for el in &self.elements {
            svg.push_str("  ");
            svg.push_str(el);
            svg.push('\n');
        }
        svg.push_str("</svg>\n");
        svg
    }

    pub(super) fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, color: &str, width: f64) {
        self.elements.push(format!(
            r#"<line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="{}" stroke-width="{:.1}"/>"#,
            x1, y1, x2, y2, color, width
        ));
    }

    pub(super) fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, opacity: f64) {
        self.elements.push(format!(
            r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" fill-opacity="{:.2}"/>"#,
            x, y, w, h, fill, opacity
        ));
    }

    /// Rectangle tagged with a class and data attributes
    pub(super) fn note_rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, opacity: f64, pitch: u8) {
        self.elements.push(format!(
            r#"<rect class="note" data-pitch="{}" x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" fill-opacity="{:.2}"/>"#,
            pitch, x, y, w, h, fill, opacity
        ));
    }

    pub(super) fn notehead(&mut self, cx: f64, cy: f64, rx: f64, ry: f64, color: &str, pitch: u8) {
        self.elements.push(format!(
            r#"<ellipse class="notehead" data-pitch="{}" cx="{:.1}" cy="{:.1}" rx="{:.1}" ry="{:.1}" fill="{}" transform="rotate(-15,{:.1},{:.1})"/>"#,
            pitch, cx, cy, rx, ry, color, cx, cy
        ));
    }

    pub(super) fn text(&mut self, x: f64, y: f64, content: &str, size: f64, fill: &str) {
        self.elements.push(format!(
            r#"<text x="{:.1}" y="{:.1}" font-size="{:.0}" fill="{}">{}</text>"#,
            x,
            y,
            size,
            fill,
            escape(content)
        ));
    }
}
