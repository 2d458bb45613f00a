use ab_glyph::{Font, FontVec};
use anyhow::{Context, Result};
use lopdf::{dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// name of the font in every page's resource dictionary
pub const RESOURCE_NAME: &str = "F1";

/// Helvetica advance widths for ' '..='~', in 1/1000 em
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556,
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778,
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556,
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556,
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

/// single-face fonts with Japanese glyphs found on common desktop systems
pub const SYSTEM_CJK_FONTS: &[&str] = &[
    "/usr/share/fonts/opentype/ipaexfont-gothic/ipaexg.ttf",
    "/usr/share/fonts/opentype/ipafont-gothic/ipag.ttf",
    "/usr/share/fonts/truetype/fonts-japanese-gothic.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJKjp-Regular.otf",
    "/usr/share/fonts/noto-cjk/NotoSansCJKjp-Regular.otf",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJKjp-Regular.otf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\simhei.ttf",
];

/// font used for every piece of text in the book
pub enum TitleFont {
    /// standard Helvetica, printable ASCII only
    Builtin,
    Embedded(EmbeddedFont),
}

pub struct EmbeddedFont {
    name: String,
    data: Vec<u8>,
    font: FontVec,
    units_per_em: f32,
    /// CFF outlines (OpenType "OTTO") rather than TrueType glyf
    cff: bool,
    /// glyph id -> first char drawn with it, for ToUnicode and /W
    used: BTreeMap<u16, char>,
}

impl TitleFont {
    pub fn load(path: Option<&Path>) -> Result<TitleFont> {
        let Some(path) = path else {
            return Ok(TitleFont::Builtin);
        };
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read font {}", path.display()))?;
        anyhow::ensure!(
            !data.starts_with(b"ttcf"),
            "Font collections are not supported: {}",
            path.display()
        );
        let font = FontVec::try_from_vec(data.clone())
            .map_err(|e| anyhow::anyhow!("Failed to parse font {}: {}", path.display(), e))?;
        let units_per_em = font.units_per_em().unwrap_or(1000.0);
        let stem = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = stem.split('.').next().unwrap_or_default();
        tracing::info!("embedding font {} ({} bytes)", path.display(), data.len());
        Ok(TitleFont::Embedded(EmbeddedFont {
            name: sanitize_font_name(stem),
            cff: data.starts_with(b"OTTO"),
            data,
            font,
            units_per_em,
            used: BTreeMap::new(),
        }))
    }

    /// Font for a book showing `texts`: the given file if any, Helvetica when
    /// every text is printable ASCII, else the first of `fallbacks` that has
    /// a glyph for every character.
    pub fn select(path: Option<&Path>, texts: &[&str], fallbacks: &[&str]) -> Result<TitleFont> {
        if path.is_some() {
            return TitleFont::load(path);
        }
        let Some(sample) = first_non_ascii(texts) else {
            return Ok(TitleFont::Builtin);
        };
        for candidate in fallbacks.iter().map(Path::new).filter(|p| p.is_file()) {
            match TitleFont::load(Some(candidate)) {
                Ok(font) if font.covers(texts) => {
                    tracing::warn!(
                        "no font given, embedding {} for {:?}; the whole font file goes into the PDF",
                        candidate.display(),
                        sample
                    );
                    return Ok(font);
                }
                Ok(_) => tracing::debug!("{} lacks glyphs for the titles", candidate.display()),
                Err(e) => tracing::debug!("skipping {}: {:#}", candidate.display(), e),
            }
        }
        tracing::warn!(
            "{:?} cannot be drawn with the built-in font and will show as '?'; use -F/--tt-font",
            sample
        );
        Ok(TitleFont::Builtin)
    }

    /// whether every visible character of `texts` has a glyph
    pub fn covers(&self, texts: &[&str]) -> bool {
        match self {
            TitleFont::Builtin => first_non_ascii(texts).is_none(),
            TitleFont::Embedded(f) => texts
                .iter()
                .flat_map(|t| t.chars())
                .filter(|c| !c.is_whitespace())
                .all(|c| f.font.glyph_id(c).0 != 0),
        }
    }

    /// advance width of `text` in points
    pub fn measure(&self, text: &str, size: f32) -> f32 {
        match self {
            TitleFont::Builtin => {
                text.chars().map(|c| helvetica_width(c) as f32).sum::<f32>() * size / 1000.0
            }
            TitleFont::Embedded(f) => {
                let units: f32 = text
                    .chars()
                    .map(|c| f.font.h_advance_unscaled(f.font.glyph_id(c)))
                    .sum();
                units * size / f.units_per_em
            }
        }
    }

    /// string operand for `Tj`
    pub fn encode(&mut self, text: &str) -> Object {
        match self {
            TitleFont::Builtin => {
                let bytes = text
                    .chars()
                    .map(|c| if (' '..='~').contains(&c) { c as u8 } else { b'?' })
                    .collect();
                Object::String(bytes, StringFormat::Literal)
            }
            TitleFont::Embedded(f) => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for c in text.chars() {
                    let gid = f.font.glyph_id(c).0;
                    f.used.entry(gid).or_insert(c);
                    bytes.extend_from_slice(&gid.to_be_bytes());
                }
                Object::String(bytes, StringFormat::Hexadecimal)
            }
        }
    }

    /// write the font dictionary into the reserved object `id`
    pub fn write(&self, doc: &mut Document, id: ObjectId) -> Result<()> {
        let dict = match self {
            TitleFont::Builtin => dictionary! {
                "Type" => Object::Name(b"Font".to_vec()),
                "Subtype" => Object::Name(b"Type1".to_vec()),
                "BaseFont" => Object::Name(b"Helvetica".to_vec()),
                "Encoding" => Object::Name(b"WinAnsiEncoding".to_vec()),
            },
            TitleFont::Embedded(f) => f.composite_font(doc)?,
        };
        doc.objects.insert(id, Object::Dictionary(dict));
        Ok(())
    }
}

impl EmbeddedFont {
    /// scale font units to the 1000-unit glyph space of PDF
    fn to_pdf_units(&self, v: f32) -> f32 {
        v * 1000.0 / self.units_per_em
    }

    fn composite_font(&self, doc: &mut Document) -> Result<lopdf::Dictionary> {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;

        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(&self.data)?;
        let compressed = enc.finish()?;
        let mut file_dict = dictionary! {
            "Filter" => Object::Name(b"FlateDecode".to_vec()),
        };
        if self.cff {
            file_dict.set("Subtype", Object::Name(b"OpenType".to_vec()));
        } else {
            file_dict.set("Length1", self.data.len() as i64);
        }
        let file_id = doc.add_object(Stream::new(file_dict, compressed));

        let ascent = self.to_pdf_units(self.font.ascent_unscaled());
        let descent = self.to_pdf_units(self.font.descent_unscaled());
        let mut descriptor = dictionary! {
            "Type" => Object::Name(b"FontDescriptor".to_vec()),
            "FontName" => Object::Name(self.name.clone().into_bytes()),
            "Flags" => 4,
            "FontBBox" => vec![0.into(), Object::Real(descent), 1000.into(), Object::Real(ascent)],
            "ItalicAngle" => 0,
            "Ascent" => Object::Real(ascent),
            "Descent" => Object::Real(descent),
            "CapHeight" => Object::Real(ascent),
            "StemV" => 80,
        };
        descriptor.set(if self.cff { "FontFile3" } else { "FontFile2" }, file_id);
        let descriptor_id = doc.add_object(descriptor);

        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for &gid in self.used.keys() {
            let advance = self.font.h_advance_unscaled(ab_glyph::GlyphId(gid));
            widths.push(Object::Integer(gid as i64));
            widths.push(Object::Array(vec![Object::Real(self.to_pdf_units(advance))]));
        }

        let mut cid_font = dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(if self.cff { b"CIDFontType0".to_vec() } else { b"CIDFontType2".to_vec() }),
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
        };
        if !self.cff {
            cid_font.set("CIDToGIDMap", Object::Name(b"Identity".to_vec()));
        }
        let cid_font_id = doc.add_object(cid_font);
        let to_unicode_id = doc.add_object(Stream::new(dictionary! {}, self.to_unicode_cmap()));

        Ok(dictionary! {
            "Type" => Object::Name(b"Font".to_vec()),
            "Subtype" => Object::Name(b"Type0".to_vec()),
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "Encoding" => Object::Name(b"Identity-H".to_vec()),
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }

    fn to_unicode_cmap(&self) -> Vec<u8> {
        let mut cmap = String::from(
            "/CIDInit /ProcSet findresource begin\n\
             12 dict begin\n\
             begincmap\n\
             /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
             /CMapName /Adobe-Identity-UCS def\n\
             /CMapType 2 def\n\
             1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
        );
        let entries: Vec<(&u16, &char)> = self.used.iter().collect();
        // at most 100 entries per bfchar block
        for block in entries.chunks(100) {
            cmap.push_str(&format!("{} beginbfchar\n", block.len()));
            for (gid, c) in block {
                let mut units = [0u16; 2];
                let hex: String = c
                    .encode_utf16(&mut units)
                    .iter()
                    .map(|u| format!("{:04X}", u))
                    .collect();
                cmap.push_str(&format!("<{:04X}> <{}>\n", gid, hex));
            }
            cmap.push_str("endbfchar\n");
        }
        cmap.push_str(
            "endcmap\n\
             CMapName currentdict /CMap defineresource pop\n\
             end\n\
             end\n",
        );
        cmap.into_bytes()
    }
}

/// first text the built-in font would have to draw with '?'
fn first_non_ascii<'a>(texts: &[&'a str]) -> Option<&'a str> {
    texts
        .iter()
        .copied()
        .find(|t| t.chars().any(|c| !(' '..='~').contains(&c)))
}

fn helvetica_width(c: char) -> u16 {
    if (' '..='~').contains(&c) {
        HELVETICA_WIDTHS[c as usize - 0x20]
    } else {
        // drawn as '?'
        556
    }
}

/// PDF font names: keep [A-Za-z0-9_-], turn whitespace into '-'
fn sanitize_font_name(raw: &str) -> String {
    let out: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect();
    if out.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_measure_uses_helvetica_metrics() {
        let font = TitleFont::Builtin;
        assert!((font.measure("A", 10.0) - 6.67).abs() < 0.001);
        assert!((font.measure("il", 1000.0) - 444.0).abs() < 0.001);
        assert_eq!(font.measure("", 20.0), 0.0);
    }

    #[test]
    fn builtin_encode_replaces_non_ascii() {
        let mut font = TitleFont::Builtin;
        match font.encode("ch 1 第") {
            Object::String(bytes, StringFormat::Literal) => assert_eq!(bytes, b"ch 1 ?"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn builtin_font_dictionary() {
        let mut doc = Document::with_version("1.5");
        let id = doc.new_object_id();
        TitleFont::Builtin.write(&mut doc, id).unwrap();
        let dict = doc.get_dictionary(id).unwrap();
        assert_eq!(dict.get(b"BaseFont").unwrap().as_name_str().unwrap(), "Helvetica");
    }

    #[test]
    fn load_without_path_is_builtin() {
        assert!(matches!(TitleFont::load(None).unwrap(), TitleFont::Builtin));
    }

    fn system_font(name: &str) -> Option<std::path::PathBuf> {
        [
            "/usr/share/fonts/truetype/dejavu/",
            "/usr/share/fonts/dejavu/",
            "/usr/share/fonts/TTF/",
        ]
        .iter()
        .map(|dir| Path::new(dir).join(name))
        .find(|p| p.is_file())
    }

    #[test]
    fn non_ascii_texts_are_found() {
        assert_eq!(first_non_ascii(&["My Book", "ch 1"]), None);
        assert_eq!(first_non_ascii(&["My Book", "第２話", "Café"]), Some("第２話"));
        assert!(!TitleFont::Builtin.covers(&["第２話"]));
        assert!(TitleFont::Builtin.covers(&["[ch] 10"]));
    }

    #[test]
    fn select_ascii_titles_use_builtin() {
        let font = TitleFont::select(None, &["My Book", "ch 1"], SYSTEM_CJK_FONTS).unwrap();
        assert!(matches!(font, TitleFont::Builtin));
    }

    #[test]
    fn select_falls_back_to_builtin_without_usable_font() {
        let dir = std::env::temp_dir().join("mkbook_test_font_select");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let broken = dir.join("Broken.ttf");
        std::fs::write(&broken, b"definitely not a font").unwrap();
        let fallbacks = [broken.to_str().unwrap(), "/nonexistent/mkbook/font.ttf"];

        let texts = ["My Book", "第２話"];
        let font = TitleFont::select(None, &texts, &fallbacks).unwrap();
        assert!(matches!(font, TitleFont::Builtin));
        assert!(!font.covers(&texts));
    }

    #[test]
    fn select_skips_fonts_missing_glyphs() {
        let Some(dejavu) = system_font("DejaVuSans.ttf") else {
            eprintln!("Skipping: DejaVuSans.ttf not installed");
            return;
        };
        let fallbacks = [dejavu.to_str().unwrap()];

        let font = TitleFont::select(None, &["Café"], &fallbacks).unwrap();
        assert!(matches!(font, TitleFont::Embedded(_)));
        assert!(font.covers(&["Café"]));

        // no CJK ideographs in DejaVu Sans
        let font = TitleFont::select(None, &["第２話"], &fallbacks).unwrap();
        assert!(matches!(font, TitleFont::Builtin));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = std::env::temp_dir().join("mkbook_test_font_garbage");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Broken.ttf");
        std::fs::write(&path, b"definitely not a font").unwrap();
        assert!(TitleFont::load(Some(path.as_path())).is_err());
    }

    #[test]
    fn load_rejects_collections() {
        let dir = std::env::temp_dir().join("mkbook_test_font_ttc");
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("Fonts.ttc");
        std::fs::write(&path, b"ttcf\0\x01\0\0").unwrap();
        let err = TitleFont::load(Some(path.as_path())).err().unwrap();
        assert!(err.to_string().contains("collections"));
    }

    #[test]
    fn font_names_are_sanitized() {
        assert_eq!(sanitize_font_name("Rampart One"), "Rampart-One");
        assert_eq!(sanitize_font_name("Noto_Sans-JP"), "Noto_Sans-JP");
        assert_eq!(sanitize_font_name("源ノ角"), "EmbeddedFont");
    }
}
