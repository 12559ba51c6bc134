//! Minimal HTML writer for the runner page

use std::fmt::Write as _;

use testdrive_common::DocType;

/// Accumulates a runner page. Tags are written in call order.
#[derive(Debug, Default)]
pub struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the document. Quirks mode writes no doctype declaration.
    pub fn start_head(&mut self, doc_type: DocType, title: &str) -> &mut Self {
        if let Some(declaration) = doc_type.declaration() {
            let _ = writeln!(self.out, "{}", declaration);
        }
        self.out.push_str("<html>\n<head>\n");
        let _ = writeln!(self.out, "<title>{}</title>", escape(title));
        self
    }

    pub fn finish_head(&mut self) -> &mut Self {
        self.out.push_str("</head>\n");
        self
    }

    pub fn start_body(&mut self) -> &mut Self {
        self.out.push_str("<body>\n");
        self
    }

    pub fn finish_body(&mut self) -> &mut Self {
        self.out.push_str("</body>\n</html>\n");
        self
    }

    /// Inline script. `code` is written as-is and must not contain `</script>`.
    pub fn write_script(&mut self, code: &str) -> &mut Self {
        let _ = writeln!(self.out, "<script type=\"text/javascript\">{}</script>", code);
        self
    }

    pub fn write_external_script(&mut self, src: &str) -> &mut Self {
        let _ = writeln!(
            self.out,
            "<script type=\"text/javascript\" src=\"{}\"></script>",
            escape(src)
        );
        self
    }

    pub fn write_style_sheet(&mut self, href: &str) -> &mut Self {
        let _ = writeln!(
            self.out,
            "<link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"></link>",
            escape(href)
        );
        self
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
