use std::path::Path;

use crate::character::options::{is_custom_value, options_for, CUSTOM_OPTION};
use crate::character::{field_spec, CharacterRecord, FieldKind, FieldSpec};
use crate::db::models::CharacterRow;
use crate::pipeline::{MAX_PORTRAITS, MIN_PORTRAITS};
use crate::render::html::{escape_html, SHEET_STYLE};
use crate::render::SECTIONS;
use crate::state::{MessageLevel, Session, StatusMessage};
use crate::storage::file_name_of;

pub const APP_TITLE: &str = "D&D Character Forge";
pub const CUSTOM_SUFFIX: &str = "__custom";

const FORM_STYLE: &str = "fieldset{margin:1em 0;border:1px solid #ccc}label{display:block;margin-top:.6em;font-weight:bold}\
input[type=text],textarea,select{width:100%;box-sizing:border-box}\
.banner{padding:.6em 1em;margin:1em 0;border-radius:4px}.banner.error{background:#fbe3e3;color:#7a1f1f}\
.banner.info{background:#e3f1fb;color:#1f4e7a}.actions button{margin-right:.6em}\
table{border-collapse:collapse;width:100%}td,th{border-bottom:1px solid #ddd;padding:.3em;text-align:left}";

pub fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}{}</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        SHEET_STYLE,
        FORM_STYLE,
        body
    )
}

fn banner(message: &StatusMessage) -> String {
    let class = match message.level {
        MessageLevel::Info => "info",
        MessageLevel::Error => "error",
    };
    format!(
        "<div class=\"banner {}\" role=\"alert\">{}</div>\n",
        class,
        escape_html(&message.text)
    )
}

fn option_tag(value: &str, label: &str, selected: bool) -> String {
    format!(
        "<option value=\"{}\"{}>{}</option>",
        escape_html(value),
        if selected { " selected" } else { "" },
        escape_html(label)
    )
}

fn list_input(record: &CharacterRecord, spec: &FieldSpec, options: &[&str]) -> String {
    let current = record.list(spec.name).unwrap_or_default();
    let mut html = format!(
        "<input type=\"hidden\" name=\"{0}\" value=\"\">\n<select id=\"{0}\" name=\"{0}\" multiple size=\"6\">",
        spec.name
    );
    for option in options {
        html.push_str(&option_tag(option, option, current.iter().any(|item| item == option)));
    }
    for extra in current.iter().filter(|item| !options.contains(&item.as_str())) {
        html.push_str(&option_tag(extra, extra, true));
    }
    html.push_str("</select>\n");
    html
}

fn select_input(record: &CharacterRecord, spec: &FieldSpec, options: &[&str]) -> String {
    let value = record.text(spec.name).unwrap_or_default();
    let mut html = format!("<select id=\"{0}\" name=\"{0}\">", spec.name);
    html.push_str(&option_tag("", "", value.is_empty()));
    for option in options.iter().filter(|option| !option.is_empty()) {
        html.push_str(&option_tag(option, option, *option == value));
    }
    // Generated values outside the catalogue stay selectable.
    if is_custom_value(spec.name, value) {
        html.push_str(&option_tag(value, value, true));
    }
    html.push_str("</select>\n");
    if options.contains(&CUSTOM_OPTION) {
        html.push_str(&format!(
            "<input type=\"text\" name=\"{}{}\" value=\"\" placeholder=\"Custom {}\">\n",
            spec.name,
            CUSTOM_SUFFIX,
            escape_html(&spec.label.to_lowercase())
        ));
    }
    html
}

fn field_input(record: &CharacterRecord, spec: &FieldSpec) -> String {
    let mut html = format!(
        "<label for=\"{}\">{}</label>\n",
        spec.name,
        escape_html(spec.label)
    );
    let input = match (spec.kind, options_for(spec.name)) {
        (FieldKind::List, Some(options)) => list_input(record, spec, options),
        (FieldKind::List, None) => format!(
            "<input type=\"text\" id=\"{0}\" name=\"{0}\" value=\"{1}\">\n",
            spec.name,
            escape_html(&record.display_value(spec.name))
        ),
        (_, Some(options)) => select_input(record, spec, options),
        (FieldKind::LongText, None) => format!(
            "<textarea id=\"{0}\" name=\"{0}\" rows=\"3\">{1}</textarea>\n",
            spec.name,
            escape_html(record.text(spec.name).unwrap_or_default())
        ),
        (FieldKind::Text, None) => format!(
            "<input type=\"text\" id=\"{0}\" name=\"{0}\" value=\"{1}\">\n",
            spec.name,
            escape_html(record.text(spec.name).unwrap_or_default())
        ),
    };
    html.push_str(&input);
    html
}

fn download_link(path: &Path, label: &str) -> String {
    let file_name = file_name_of(path);
    format!(
        "<a href=\"/download/{}\" download>{}</a>",
        escape_html(&file_name),
        escape_html(label)
    )
}

pub fn form_page(session: &Session, message: Option<&StatusMessage>) -> String {
    let record = &session.record;
    let mut body = format!("<h1>{}</h1>\n", escape_html(APP_TITLE));
    if let Some(message) = message {
        body.push_str(&banner(message));
    }

    body.push_str("<form method=\"post\" action=\"/\">\n");
    for section in SECTIONS {
        body.push_str(&format!(
            "<fieldset>\n<legend>{}</legend>\n",
            escape_html(section.title)
        ));
        for spec in section.fields.iter().filter_map(|name| field_spec(name)) {
            body.push_str(&field_input(record, spec));
        }
        body.push_str("</fieldset>\n");
    }
    body.push_str(&format!(
        "<label for=\"portrait_count\">Number of portraits</label>\n\
         <input type=\"number\" id=\"portrait_count\" name=\"portrait_count\" min=\"{}\" max=\"{}\" value=\"{}\">\n",
        MIN_PORTRAITS, MAX_PORTRAITS, session.portrait_count
    ));
    body.push_str(
        "<p class=\"actions\"><button type=\"submit\">Save</button>\
         <button type=\"submit\" formaction=\"/generate\">Generate Character Sheet</button></p>\n</form>\n",
    );
    body.push_str(
        "<form method=\"post\" action=\"/reset\"><button type=\"submit\">Start Over</button></form>\n",
    );

    if let Some(document) = &session.last_document {
        body.push_str(&format!(
            "<section class=\"downloads\">\n<h2>Downloads</h2>\n<p>{} | {}</p>\n</section>\n",
            download_link(&document.pdf_path, "Download PDF"),
            download_link(&document.html_path, "Download HTML")
        ));
        body.push_str(&document.html);
    }

    body.push_str("<p><a href=\"/characters\">Character archive</a></p>\n");
    layout(APP_TITLE, &body)
}

pub fn archive_page(rows: Option<&[CharacterRow]>) -> String {
    let mut body = String::from("<h1>Character Archive</h1>\n");
    match rows {
        None => body.push_str("<p>The character archive is disabled.</p>\n"),
        Some([]) => body.push_str("<p>No characters have been generated yet.</p>\n"),
        Some(rows) => {
            body.push_str(
                "<table>\n<tr><th>Name</th><th>Race</th><th>Class</th><th>Created</th><th>Sheet</th></tr>\n",
            );
            for row in rows {
                let sheet = row
                    .document_path
                    .as_deref()
                    .map(|path| download_link(Path::new(path), "PDF"))
                    .unwrap_or_default();
                body.push_str(&format!(
                    "<tr><td><a href=\"/characters/{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                    row.id,
                    escape_html(&row.name),
                    escape_html(&row.race),
                    escape_html(&row.class),
                    row.created_at.format("%Y-%m-%d %H:%M UTC"),
                    sheet
                ));
            }
            body.push_str("</table>\n");
        }
    }
    body.push_str("<p><a href=\"/\">Back to the form</a></p>\n");
    layout("Character Archive", &body)
}

pub fn archived_sheet_page(record: &CharacterRecord, sheet: &str) -> String {
    let mut body = String::from(sheet);
    if let Some(pdf_path) = record.pdf_path.as_deref() {
        body.push_str(&format!(
            "<p>{}</p>\n",
            download_link(Path::new(pdf_path), "Download PDF")
        ));
    }
    body.push_str("<p><a href=\"/characters\">Back to the archive</a></p>\n");
    layout(record.display_name(), &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_outside_the_catalogue_stay_selected() {
        let mut session = Session::new(1);
        session.record.race = "Aasimar".to_string();
        session.record.class = "Ranger".to_string();
        let page = form_page(&session, None);

        assert!(page.contains("<option value=\"Aasimar\" selected>Aasimar</option>"));
        assert!(page.contains("name=\"race__custom\""));
        assert!(!page.contains("name=\"alignment__custom\""));
        assert!(page.contains("<option value=\"Ranger\" selected>Ranger</option>"));
    }

    #[test]
    fn generated_list_values_outside_the_catalogue_stay_selected() {
        let mut session = Session::new(1);
        session.record.languages = vec!["Common".to_string(), "Thieves' Cant".to_string()];
        let page = form_page(&session, None);
        assert!(page.contains("<option value=\"Common\" selected>Common</option>"));
        assert!(page.contains("<option value=\"Thieves&#39; Cant\" selected>"));
    }

    #[test]
    fn banner_is_escaped_and_classed() {
        let session = Session::new(1);
        let page = form_page(&session, Some(&StatusMessage::error("bad <input>")));
        assert!(page.contains("class=\"banner error\""));
        assert!(page.contains("bad &lt;input&gt;"));
    }

    #[test]
    fn empty_archive_says_so() {
        assert!(archive_page(None).contains("disabled"));
        assert!(archive_page(Some(&[])).contains("No characters"));
    }
}
