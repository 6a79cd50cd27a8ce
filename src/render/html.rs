use base64::{engine::general_purpose, Engine as _};
use pulldown_cmark::{html, Event, Options, Parser, Tag};

use crate::character::{field_spec, CharacterRecord, FieldKind};
use crate::config::PortraitEmbed;
use crate::error::{ForgeError, ForgeResult};
use crate::llm::media::detect_mime_type;
use crate::render::{PortraitAsset, PORTRAITS_TITLE, SECTIONS};
use crate::storage::file_name_of;

pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn is_safe_link(dest: &str) -> bool {
    url::Url::parse(dest.trim())
        .map(|url| matches!(url.scheme(), "http" | "https" | "mailto"))
        .unwrap_or(false)
}

/// Markdown to HTML with raw HTML passed through as text. Images collapse to
/// their alt text and links keep only http, https and mailto targets.
fn markdown_to_html(text: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    let parser = Parser::new_ext(text, options).filter_map(|event| match event {
        Event::Html(raw) => Some(Event::Text(raw)),
        Event::Start(Tag::Image(..)) | Event::End(Tag::Image(..)) => None,
        Event::Start(Tag::Link(_, ref dest, _)) | Event::End(Tag::Link(_, ref dest, _))
            if !is_safe_link(dest) =>
        {
            None
        }
        other => Some(other),
    });
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered.trim_end().to_string()
}

/// Resolves the `src` attribute for each portrait.
pub async fn portrait_sources(
    portraits: &[PortraitAsset],
    embed: PortraitEmbed,
) -> ForgeResult<Vec<String>> {
    let mut sources = Vec::with_capacity(portraits.len());
    for portrait in portraits {
        let source = match embed {
            PortraitEmbed::Path => portrait
                .public_url
                .clone()
                .unwrap_or_else(|| format!("/images/{}", file_name_of(&portrait.path))),
            PortraitEmbed::DataUri => {
                let bytes = tokio::fs::read(&portrait.path)
                    .await
                    .map_err(|err| ForgeError::file_system(&portrait.path, err))?;
                let mime_type =
                    detect_mime_type(&bytes).unwrap_or_else(|| "image/png".to_string());
                format!(
                    "data:{};base64,{}",
                    mime_type,
                    general_purpose::STANDARD.encode(&bytes)
                )
            }
        };
        sources.push(source);
    }
    Ok(sources)
}

fn render_value(record: &CharacterRecord, name: &str) -> String {
    let kind = field_spec(name).map(|spec| spec.kind);
    match kind {
        Some(FieldKind::List) => {
            let items = record.list(name).unwrap_or_default();
            if items.is_empty() {
                return String::new();
            }
            let mut list = String::from("<ul>");
            for item in items {
                list.push_str("<li>");
                list.push_str(&escape_html(item));
                list.push_str("</li>");
            }
            list.push_str("</ul>");
            list
        }
        Some(FieldKind::LongText) => markdown_to_html(record.text(name).unwrap_or_default()),
        _ => escape_html(record.text(name).unwrap_or_default()),
    }
}

/// Self-contained sheet fragment. `portrait_sources` are used verbatim as `src`.
pub fn render_html(record: &CharacterRecord, portrait_sources: &[String]) -> String {
    let mut out = String::new();
    out.push_str("<article class=\"character-sheet\">\n");
    out.push_str(&format!(
        "<h1>{}</h1>\n",
        escape_html(record.display_name())
    ));

    for section in SECTIONS {
        out.push_str("<section>\n");
        out.push_str(&format!("<h2>{}</h2>\n<dl>\n", escape_html(section.title)));
        for name in section.fields.iter().copied() {
            let label = field_spec(name).map(|spec| spec.label).unwrap_or(name);
            out.push_str(&format!(
                "<dt>{}</dt>\n<dd class=\"field-{}\">{}</dd>\n",
                escape_html(label),
                name,
                render_value(record, name)
            ));
        }
        out.push_str("</dl>\n</section>\n");
    }

    out.push_str(&format!(
        "<section class=\"portraits\">\n<h2>{}</h2>\n",
        PORTRAITS_TITLE
    ));
    for (index, source) in portrait_sources.iter().enumerate() {
        out.push_str(&format!(
            "<img src=\"{}\" alt=\"{} portrait {}\">\n",
            escape_html(source),
            escape_html(record.display_name()),
            index + 1
        ));
    }
    out.push_str("</section>\n</article>\n");
    out
}

pub const SHEET_STYLE: &str = "body{font-family:Georgia,serif;max-width:820px;margin:2em auto;color:#222}\
h1{border-bottom:2px solid #7a1f1f}h2{color:#7a1f1f;margin-top:1.4em}\
dl{display:grid;grid-template-columns:12em 1fr;gap:.3em 1em}dt{font-weight:bold}dd{margin:0}\
dd p{margin:0 0 .4em}.portraits img{max-width:256px;margin:.5em .5em 0 0;border:1px solid #ccc}";

/// Wraps a sheet fragment into a downloadable page.
pub fn standalone_document(record: &CharacterRecord, fragment: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{} - Character Sheet</title>\n<style>{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(record.display_name()),
        SHEET_STYLE,
        fragment
    )
}
