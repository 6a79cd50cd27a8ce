use std::path::{Path, PathBuf};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::info;

use crate::character::{field_spec, CharacterRecord};
use crate::error::{ForgeError, ForgeResult};
use crate::render::{PortraitAsset, PORTRAITS_TITLE, SECTIONS};
use crate::storage::{unique_file_name, write_file};

// A4 in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const MARGIN: i64 = 50;
const BOTTOM_LIMIT: i64 = 60;
const FOOTER_Y: i64 = 30;

const TITLE_SIZE: i64 = 20;
const HEADER_SIZE: i64 = 14;
const BODY_SIZE: i64 = 10;
const FOOTER_SIZE: i64 = 9;
const LINE_HEIGHT: i64 = 14;

const LABEL_WIDTH: i64 = 140;
const VALUE_X: i64 = MARGIN + LABEL_WIDTH;
const PORTRAIT_BOX: i64 = 220;
const MAX_EMBED_PIXELS: u32 = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource_name(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Draw {
    Text {
        font: Font,
        size: i64,
        x: i64,
        y: i64,
        text: String,
    },
    Image {
        index: usize,
        x: i64,
        y: i64,
        width: i64,
        height: i64,
    },
}

/// Decoded portrait ready for a DeviceRGB image XObject.
pub struct PdfImage {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

fn decode_portrait(bytes: &[u8]) -> ForgeResult<PdfImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| ForgeError::DataFormat(format!("unreadable portrait image: {err}")))?;
    let image = if image.width() > MAX_EMBED_PIXELS || image.height() > MAX_EMBED_PIXELS {
        image.thumbnail(MAX_EMBED_PIXELS, MAX_EMBED_PIXELS)
    } else {
        image
    };
    let rgb = image.to_rgb8();
    Ok(PdfImage {
        width: rgb.width(),
        height: rgb.height(),
        rgb: rgb.into_raw(),
    })
}

/// Standard Type1 fonts only cover Latin-1-ish glyphs; fold the rest to ASCII.
fn pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => out.push('a'),
            'é' | 'è' | 'ê' | 'ë' => out.push('e'),
            'í' | 'ì' | 'î' | 'ï' => out.push('i'),
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' => out.push('o'),
            'ú' | 'ù' | 'û' | 'ü' => out.push('u'),
            'ñ' => out.push('n'),
            'ç' => out.push('c'),
            '‘' | '’' => out.push('\''),
            '“' | '”' => out.push('"'),
            '–' | '—' => out.push('-'),
            '…' => out.push_str("..."),
            '\t' => out.push(' '),
            c if c.is_ascii_graphic() || c == ' ' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// Helvetica averages about half an em per glyph.
fn chars_per_line(width: i64, size: i64) -> usize {
    ((width * 2) / size).max(1) as usize
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let head: String = word.chars().take(max_chars).collect();
                word = word.chars().skip(max_chars).collect();
                lines.push(head);
            }
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

struct Layout {
    pages: Vec<Vec<Draw>>,
    cursor: i64,
}

impl Layout {
    fn new() -> Self {
        Layout {
            pages: vec![Vec::new()],
            cursor: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ensure_space(&mut self, height: i64) {
        if self.cursor - height < BOTTOM_LIMIT {
            self.pages.push(Vec::new());
            self.cursor = PAGE_HEIGHT - MARGIN;
        }
    }

    fn push(&mut self, draw: Draw) {
        if let Some(page) = self.pages.last_mut() {
            page.push(draw);
        }
    }

    fn text_at(&mut self, font: Font, size: i64, x: i64, text: &str) {
        if text.is_empty() {
            return;
        }
        let y = self.cursor - size;
        self.push(Draw::Text {
            font,
            size,
            x,
            y,
            text: text.to_string(),
        });
    }

    fn title(&mut self, text: &str) {
        self.ensure_space(TITLE_SIZE + 16);
        self.text_at(Font::Bold, TITLE_SIZE, MARGIN, &pdf_text(text));
        self.cursor -= TITLE_SIZE + 16;
    }

    fn header(&mut self, text: &str) {
        self.ensure_space(HEADER_SIZE + 14 + LINE_HEIGHT);
        self.cursor -= 6;
        self.text_at(Font::Bold, HEADER_SIZE, MARGIN, &pdf_text(text));
        self.cursor -= HEADER_SIZE + 8;
    }

    fn row(&mut self, label: &str, value: &str) {
        let label_lines = wrap_text(&pdf_text(label), chars_per_line(LABEL_WIDTH - 10, BODY_SIZE));
        let value_lines = wrap_text(
            &pdf_text(value),
            chars_per_line(PAGE_WIDTH - MARGIN - VALUE_X, BODY_SIZE),
        );
        let count = label_lines.len().max(value_lines.len());
        for index in 0..count {
            self.ensure_space(LINE_HEIGHT);
            if let Some(line) = label_lines.get(index) {
                self.text_at(Font::Bold, BODY_SIZE, MARGIN, line);
            }
            if let Some(line) = value_lines.get(index) {
                self.text_at(Font::Regular, BODY_SIZE, VALUE_X, line);
            }
            self.cursor -= LINE_HEIGHT;
        }
        self.cursor -= 4;
    }

    fn image(&mut self, index: usize, width: u32, height: u32) {
        let (width, height) = (i64::from(width.max(1)), i64::from(height.max(1)));
        let (draw_width, draw_height) = if width >= height {
            (PORTRAIT_BOX, (height * PORTRAIT_BOX / width).max(1))
        } else {
            ((width * PORTRAIT_BOX / height).max(1), PORTRAIT_BOX)
        };
        self.ensure_space(draw_height + 10);
        self.push(Draw::Image {
            index,
            x: MARGIN,
            y: self.cursor - draw_height,
            width: draw_width,
            height: draw_height,
        });
        self.cursor -= draw_height + 10;
    }

    fn add_footers(&mut self) {
        let total = self.pages.len();
        for (index, page) in self.pages.iter_mut().enumerate() {
            page.push(Draw::Text {
                font: Font::Regular,
                size: FOOTER_SIZE,
                x: PAGE_WIDTH / 2 - 25,
                y: FOOTER_Y,
                text: format!("Page {} of {}", index + 1, total),
            });
        }
    }
}

fn layout_sheet(record: &CharacterRecord, images: &[PdfImage]) -> Vec<Vec<Draw>> {
    let mut layout = Layout::new();
    layout.title(&format!("{} - Character Sheet", record.display_name()));

    for section in SECTIONS {
        layout.header(section.title);
        for name in section.fields.iter().copied() {
            let label = field_spec(name).map(|spec| spec.label).unwrap_or(name);
            layout.row(label, &record.display_value(name));
        }
    }

    layout.header(PORTRAITS_TITLE);
    for (index, image) in images.iter().enumerate() {
        layout.image(index, image.width, image.height);
    }

    layout.add_footers();
    layout.pages
}

fn page_operations(draws: &[Draw]) -> Vec<Operation> {
    let mut operations = Vec::new();
    for draw in draws {
        match draw {
            Draw::Text {
                font,
                size,
                x,
                y,
                text,
            } => {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new(
                    "Tf",
                    vec![font.resource_name().into(), (*size).into()],
                ));
                operations.push(Operation::new("Td", vec![(*x).into(), (*y).into()]));
                operations.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(text.as_str())],
                ));
                operations.push(Operation::new("ET", vec![]));
            }
            Draw::Image {
                index,
                x,
                y,
                width,
                height,
            } => {
                operations.push(Operation::new("q", vec![]));
                operations.push(Operation::new(
                    "cm",
                    vec![
                        (*width).into(),
                        0i64.into(),
                        0i64.into(),
                        (*height).into(),
                        (*x).into(),
                        (*y).into(),
                    ],
                ));
                operations.push(Operation::new(
                    "Do",
                    vec![Object::Name(image_resource_name(*index).into_bytes())],
                ));
                operations.push(Operation::new("Q", vec![]));
            }
        }
    }
    operations
}

fn image_resource_name(index: usize) -> String {
    format!("Im{}", index + 1)
}

fn build_document(pages: &[Vec<Draw>], images: &[PdfImage]) -> ForgeResult<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let regular_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let bold_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
    });

    let mut xobjects = Dictionary::new();
    for (index, image) in images.iter().enumerate() {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width),
                "Height" => i64::from(image.height),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
            },
            image.rgb.clone(),
        ));
        xobjects.set(image_resource_name(index), image_id);
    }

    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => regular_id,
            "F2" => bold_id,
        },
        "XObject" => xobjects,
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for draws in pages {
        let content = Content {
            operations: page_operations(draws),
        };
        let encoded = content
            .encode()
            .map_err(|err| ForgeError::DataFormat(format!("failed to encode page: {err}")))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id: ObjectId = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    let media_box: Vec<Object> = vec![
        0i64.into(),
        0i64.into(),
        PAGE_WIDTH.into(),
        PAGE_HEIGHT.into(),
    ];
    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => page_count,
        "Resources" => resources_id,
        "MediaBox" => media_box,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)
        .map_err(|err| ForgeError::FileSystem(format!("failed to serialize PDF: {err}")))?;
    Ok(bytes)
}

/// Lays out the sheet and returns the PDF bytes. Portraits are raw image file contents.
pub fn render_pdf(record: &CharacterRecord, portraits: &[Vec<u8>]) -> ForgeResult<Vec<u8>> {
    let images = portraits
        .iter()
        .map(|bytes| decode_portrait(bytes))
        .collect::<ForgeResult<Vec<_>>>()?;
    let pages = layout_sheet(record, &images);
    build_document(&pages, &images)
}

/// Renders the sheet and saves it as `<name>_<token>.pdf` under `sheets_dir`.
pub async fn render_pdf_file(
    record: &CharacterRecord,
    portraits: &[PortraitAsset],
    sheets_dir: &Path,
) -> ForgeResult<PathBuf> {
    let mut portrait_bytes = Vec::with_capacity(portraits.len());
    for portrait in portraits {
        let bytes = tokio::fs::read(&portrait.path)
            .await
            .map_err(|err| ForgeError::file_system(&portrait.path, err))?;
        portrait_bytes.push(bytes);
    }

    let pdf = render_pdf(record, &portrait_bytes)?;
    let path = sheets_dir.join(unique_file_name(record.display_name(), "", "pdf"));
    write_file(&path, &pdf).await?;
    info!(
        "Rendered PDF sheet for {} ({} bytes) to {}",
        record.display_name(),
        pdf.len(),
        path.display()
    );
    Ok(path)
}
