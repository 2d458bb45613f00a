use anyhow::{Context, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::path::Path;

use crate::embed::{prepare_all, PreparedImage};
use crate::font::{TitleFont, RESOURCE_NAME};
use crate::layout::{Book, Canvas, Page, Placement, TextLine};

/// document info entries
pub struct Metadata<'a> {
    pub title: &'a str,
    pub author: Option<&'a str>,
}

/// images of the chapter currently being drawn, prepared in one batch
struct ChapterImages {
    chapter: usize,
    images: Vec<Option<Result<PreparedImage>>>,
}

/// Build the whole PDF in memory. Images are prepared one chapter at a time
/// so only a single chapter's pixel data is held at once.
pub fn build_document(
    book: &Book,
    pages: &[Page],
    canvas: Canvas,
    font: &mut TitleFont,
    meta: &Metadata,
    quiet: bool,
) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.new_object_id();
    let mut page_ids: Vec<Object> = Vec::with_capacity(pages.len());

    let total_pictures = book.picture_count();
    let mut drawn = 0usize;
    let mut batch: Option<ChapterImages> = None;

    for page in pages {
        let mut operations = vec![Operation::new("g", vec![0.into()])];
        for line in &page.lines {
            push_text(&mut operations, font, line);
        }

        let mut resources = dictionary! {
            "Font" => dictionary! {
                RESOURCE_NAME => font_id,
            },
        };

        if let Some(placed) = page.picture {
            let image_id = take_image(&mut doc, book, &mut batch, placed, quiet)?;
            resources.set(
                "XObject",
                dictionary! {
                    "Im0" => image_id,
                },
            );
            push_image(&mut operations, &placed);

            drawn += 1;
            if !quiet {
                let path = &book.chapters[placed.chapter].pictures[placed.picture].path;
                eprintln!("  [{}/{}] {}", drawn, total_pictures, path.display());
            }
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content
                .encode()
                .context("Failed to encode content stream")?,
        ));
        let resources_id = doc.add_object(resources);
        let page_id = doc.add_object(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), Object::Real(canvas.width), Object::Real(canvas.height)],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        page_ids.push(page_id.into());
    }

    font.write(&mut doc, font_id)?;

    // build pages tree
    let count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => page_ids,
            "Count" => count,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => Object::Name(b"Catalog".to_vec()),
        "Pages" => pages_id,
    };
    if let Some(labels) = page_labels(pages) {
        catalog.set("PageLabels", labels);
    }
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);

    let info_id = doc.add_object(info_dictionary(meta));
    doc.trailer.set("Info", info_id);

    Ok(doc)
}

/// build the book and write it to `output`
pub fn make_book(
    book: &Book,
    pages: &[Page],
    canvas: Canvas,
    font: &mut TitleFont,
    meta: &Metadata,
    output: &Path,
    quiet: bool,
) -> Result<()> {
    let start = std::time::Instant::now();
    let mut doc = build_document(book, pages, canvas, font, meta, quiet)?;
    if !quiet {
        eprintln!("Saving...");
    }
    doc.save(output)
        .with_context(|| format!("Failed to save {}", output.display()))?;
    tracing::info!(
        "wrote {} page(s) of {}x{} pt in {:.2}s",
        pages.len(),
        canvas.width,
        canvas.height,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn push_text(operations: &mut Vec<Operation>, font: &mut TitleFont, line: &TextLine) {
    operations.extend([
        Operation::new("BT", vec![]),
        Operation::new(
            "Tf",
            vec![Object::Name(RESOURCE_NAME.as_bytes().to_vec()), Object::Real(line.size)],
        ),
        Operation::new("Td", vec![Object::Real(line.x), Object::Real(line.baseline)]),
        Operation::new("Tj", vec![font.encode(&line.text)]),
        Operation::new("ET", vec![]),
    ]);
}

fn push_image(operations: &mut Vec<Operation>, placed: &Placement) {
    operations.extend([
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(placed.width),
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(placed.height),
                Object::Real(placed.x),
                Object::Real(placed.y),
            ],
        ),
        Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
        Operation::new("Q", vec![]),
    ]);
}

/// add the image for `placed`, preparing its whole chapter first if needed
fn take_image(
    doc: &mut Document,
    book: &Book,
    batch: &mut Option<ChapterImages>,
    placed: Placement,
    quiet: bool,
) -> Result<ObjectId> {
    if batch.as_ref().map(|b| b.chapter) != Some(placed.chapter) {
        let chapter = &book.chapters[placed.chapter];
        if !quiet {
            eprintln!("{}", chapter.name);
        }
        let paths: Vec<_> = chapter.pictures.iter().map(|p| p.path.clone()).collect();
        *batch = Some(ChapterImages {
            chapter: placed.chapter,
            images: prepare_all(&paths).into_iter().map(Some).collect(),
        });
    }
    let prepared = batch
        .as_mut()
        .and_then(|b| b.images.get_mut(placed.picture))
        .and_then(Option::take)
        .context("Image already added to the document")??;
    Ok(prepared.add_to(doc))
}

/// viewer page labels matching the printed numbers: the cover is labelled
/// "Cover", numbering starts at the first numbered page
fn page_labels(pages: &[Page]) -> Option<lopdf::Dictionary> {
    let first = pages.iter().position(|p| p.number.is_some())?;
    let start = pages[first].number?;
    let mut nums: Vec<Object> = Vec::new();
    if first > 0 {
        nums.push(Object::Integer(0));
        nums.push(Object::Dictionary(dictionary! {
            "P" => Object::string_literal("Cover"),
        }));
    }
    nums.push(Object::Integer(first as i64));
    nums.push(Object::Dictionary(dictionary! {
        "S" => Object::Name(b"D".to_vec()),
        "St" => start as i64,
    }));
    Some(dictionary! { "Nums" => nums })
}

fn info_dictionary(meta: &Metadata) -> lopdf::Dictionary {
    let mut info = lopdf::Dictionary::new();
    info.set(
        "Producer",
        Object::String(
            format!("mkbook {}", env!("CARGO_PKG_VERSION")).into_bytes(),
            StringFormat::Literal,
        ),
    );
    if let Ok(dur) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        info.set(
            "CreationDate",
            Object::String(pdf_date(dur.as_secs()).into_bytes(), StringFormat::Literal),
        );
    }
    info.set("Title", text_string(meta.title));
    if let Some(a) = meta.author {
        info.set("Author", text_string(a));
    }
    info
}

/// PDF text string: plain bytes for ASCII, UTF-16BE with BOM otherwise
fn text_string(s: &str) -> Object {
    if s.is_ascii() {
        return Object::String(s.as_bytes().to_vec(), StringFormat::Literal);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Hexadecimal)
}

/// PDF date (D:YYYYMMDDHHmmSSZ) for seconds since the Unix epoch, UTC
fn pdf_date(secs: u64) -> String {
    let days = secs / 86400;
    let time_of_day = secs % 86400;
    let hours = time_of_day / 3600;
    let minutes = (time_of_day % 3600) / 60;
    let seconds = time_of_day % 60;
    // civil date from days since epoch
    let z = days + 719468;
    let era = z / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    format!(
        "D:{:04}{:02}{:02}{:02}{:02}{:02}Z",
        y, m, d, hours, minutes, seconds
    )
}
