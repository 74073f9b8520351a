//! Markdown rendering for listing bodies.
//!
//! Raw HTML in the source is always escaped. Links and images are kept only
//! when the author's role allows them; otherwise their text content is
//! rendered in place.

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd, html};
use serde::{Deserialize, Serialize};

/// Per-role rendering switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MarkupOptions {
    pub tables: bool,
    pub strikethrough: bool,
    pub links: bool,
    pub images: bool,
}

impl Default for MarkupOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            links: true,
            images: false,
        }
    }
}

impl MarkupOptions {
    #[must_use]
    pub const fn full() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            links: true,
            images: true,
        }
    }

    fn parser_options(&self) -> Options {
        let mut opts = Options::empty();
        if self.tables {
            opts.insert(Options::ENABLE_TABLES);
        }
        if self.strikethrough {
            opts.insert(Options::ENABLE_STRIKETHROUGH);
        }
        opts
    }
}

/// Render `md` to HTML under `options`.
#[must_use]
pub fn render(md: &str, options: &MarkupOptions) -> String {
    let parser = Parser::new_ext(md, options.parser_options()).filter_map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Link { .. }) | Event::End(TagEnd::Link) if !options.links => None,
        Event::Start(Tag::Image { .. }) | Event::End(TagEnd::Image) if !options.images => None,
        other => Some(other),
    });

    let mut out = String::with_capacity(md.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
