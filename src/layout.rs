//! Page geometry for the book: the shared canvas size and where every line of
//! text and every picture lands on each page.
//!
//! Coordinates are PDF points with the origin at the bottom-left corner. One
//! image pixel is laid out as one point.

use std::path::PathBuf;

use crate::scan::Folder;

/// margin between the page edge and the frame
pub const PAGE_MARGIN: f32 = 72.0;
/// inner padding of the frame
pub const FRAME_PADDING: f32 = 6.0;
/// points added to the largest image on each axis
pub const DEFAULT_PADDING: f32 = 400.0;
/// line height as a multiple of the font size
pub const LEADING: f32 = 1.2;
/// title type is this many times the body font size
pub const TITLE_SCALE: f32 = 3.0;
/// what a heading break turns into: the line ends and three blank lines follow
const TITLE_BREAK: &str = "\n\n\n\n";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Canvas {
    pub width: f32,
    pub height: f32,
}

impl Canvas {
    /// Page size that fits every image: the widest width and the tallest
    /// height seen (taken independently, never below `floor`), plus `padding`
    /// on each axis.
    pub fn fit(
        dims: impl IntoIterator<Item = (u32, u32)>,
        floor: (f32, f32),
        padding: f32,
    ) -> Canvas {
        let (mut width, mut height) = floor;
        for (w, h) in dims {
            width = width.max(w as f32);
            height = height.max(h as f32);
        }
        Canvas {
            width: width + padding,
            height: height + padding,
        }
    }

    pub fn frame(&self) -> Frame {
        let inset = PAGE_MARGIN + FRAME_PADDING;
        Frame {
            left: inset,
            bottom: inset,
            width: (self.width - 2.0 * inset).max(0.0),
            top: (self.height - inset).max(inset),
        }
    }
}

/// printable area of a page
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f32,
    pub bottom: f32,
    pub width: f32,
    pub top: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub name: String,
    pub pictures: Vec<Picture>,
}

impl Chapter {
    /// box every picture of the chapter is placed in
    pub fn frame_size(&self) -> (f32, f32) {
        self.pictures.iter().fold((0.0, 0.0), |(w, h), p| {
            (w.max(p.width as f32), h.max(p.height as f32))
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

impl Book {
    /// Pair scanned folders with their probed image sizes. `dims` holds one
    /// entry per image, in folder then file order. Folders without pictures
    /// are dropped.
    pub fn assemble(title: String, folders: Vec<Folder>, dims: &[(u32, u32)]) -> Book {
        let mut dims = dims.iter().copied();
        let chapters = folders
            .into_iter()
            .filter_map(|folder| {
                let pictures: Vec<Picture> = folder
                    .images
                    .into_iter()
                    .zip(dims.by_ref())
                    .map(|(path, (width, height))| Picture {
                        path,
                        width,
                        height,
                    })
                    .collect();
                (!pictures.is_empty()).then(|| Chapter {
                    name: folder.name,
                    pictures,
                })
            })
            .collect();
        Book { title, chapters }
    }

    pub fn picture_dims(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.chapters
            .iter()
            .flat_map(|c| c.pictures.iter().map(|p| (p.width, p.height)))
    }

    pub fn picture_count(&self) -> usize {
        self.chapters.iter().map(|c| c.pictures.len()).sum()
    }
}

/// a single line of text, `x` is the left edge and `baseline` the baseline
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub text: String,
    pub size: f32,
    pub x: f32,
    pub baseline: f32,
}

/// where a picture is drawn, (x, y) is its bottom-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub chapter: usize,
    pub picture: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    pub lines: Vec<TextLine>,
    pub picture: Option<Placement>,
    /// running page number printed on the page
    pub number: Option<u32>,
}

/// Chapter heading as shown on a title page: a full-width space starts a new
/// paragraph, and so does the text after a closing bracket.
pub fn chapter_title(name: &str) -> String {
    name.replace('\u{3000}', TITLE_BREAK)
        .replace(']', &format!("]{}", TITLE_BREAK))
        .trim_matches('\n')
        .to_string()
}

/// Break `text` into lines no wider than `max_width`. Explicit newlines are
/// kept; inside a line, breaks may fall between any two characters.
pub fn wrap_lines(
    text: &str,
    size: f32,
    max_width: f32,
    measure: &dyn Fn(&str, f32) -> f32,
) -> Vec<String> {
    let mut lines = Vec::new();
    for segment in text.split('\n') {
        let mut line = String::new();
        for c in segment.chars() {
            let mut candidate = line.clone();
            candidate.push(c);
            if !line.is_empty() && measure(&candidate, size) > max_width {
                lines.push(std::mem::take(&mut line));
                line.push(c);
            } else {
                line = candidate;
            }
        }
        lines.push(line);
    }
    lines
}

/// top-down placement of flowing content on one page
struct Cursor<'a> {
    frame: Frame,
    y: f32,
    measure: &'a dyn Fn(&str, f32) -> f32,
    page: Page,
}

impl<'a> Cursor<'a> {
    fn new(canvas: Canvas, measure: &'a dyn Fn(&str, f32) -> f32) -> Self {
        let frame = canvas.frame();
        Cursor {
            frame,
            y: frame.top,
            measure,
            page: Page::default(),
        }
    }

    fn space(&mut self, height: f32) {
        self.y -= height;
    }

    /// centered paragraph; lines below the frame are clamped onto its bottom
    fn paragraph(&mut self, text: &str, size: f32) {
        let leading = size * LEADING;
        for line in wrap_lines(text, size, self.frame.width, self.measure) {
            let baseline = (self.y - size).max(self.frame.bottom);
            let width = (self.measure)(&line, size);
            let x = self.frame.left + (self.frame.width - width) / 2.0;
            self.y -= leading;
            if line.is_empty() {
                continue;
            }
            self.page.lines.push(TextLine {
                text: line,
                size,
                x,
                baseline,
            });
        }
    }

    fn number(&mut self, number: u32, size: f32) {
        self.paragraph(&number.to_string(), size);
        self.page.number = Some(number);
    }

    fn finish(self) -> Page {
        self.page
    }
}

/// Lay out the whole book: a cover, then for every chapter a title page
/// followed by one page per picture.
pub fn paginate(
    book: &Book,
    canvas: Canvas,
    font_size: f32,
    measure: &dyn Fn(&str, f32) -> f32,
) -> Vec<Page> {
    let title_size = font_size * TITLE_SCALE;
    let mut pages = Vec::with_capacity(1 + book.chapters.len() + book.picture_count());
    let mut number = 1u32;

    let mut cover = Cursor::new(canvas, measure);
    cover.space(canvas.height / 2.0);
    cover.paragraph(&book.title, title_size);
    pages.push(cover.finish());

    for (ci, chapter) in book.chapters.iter().enumerate() {
        let mut title = Cursor::new(canvas, measure);
        title.space(canvas.height / 2.0);
        title.paragraph(&chapter_title(&chapter.name), title_size);
        title.space(canvas.height / 8.0 + font_size * 9.0);
        title.number(number, font_size);
        pages.push(title.finish());
        number += 1;

        let (box_w, box_h) = chapter.frame_size();
        for (pi, picture) in chapter.pictures.iter().enumerate() {
            let mut page = Cursor::new(canvas, measure);
            page.paragraph(&chapter.name, font_size);
            page.space(font_size);

            // room left once the trailing gap and page number are reserved
            let avail_h = page.y - page.frame.bottom - font_size - font_size * LEADING;
            let scale = 1f32
                .min(avail_h.max(1.0) / box_h.max(1.0))
                .min(page.frame.width.max(1.0) / box_w.max(1.0));
            let (bw, bh) = (box_w * scale, box_h * scale);
            let (w, h) = (picture.width as f32 * scale, picture.height as f32 * scale);
            let box_left = page.frame.left + (page.frame.width - bw) / 2.0;
            let box_bottom = page.y - bh;
            page.page.picture = Some(Placement {
                chapter: ci,
                picture: pi,
                x: box_left + (bw - w) / 2.0,
                y: box_bottom + (bh - h) / 2.0,
                width: w,
                height: h,
            });
            page.space(bh);
            page.space(font_size);
            page.number(number, font_size);
            pages.push(page.finish());
            number += 1;
        }
    }
    pages
}
