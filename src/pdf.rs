//! PDF discovery and extraction: text, document metadata and embedded images.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExtractError;

const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub paper_id: String,
    pub source_pdf: PathBuf,
    pub title: String,
    pub author: Option<String>,
    #[serde(rename = "creationDate")]
    pub creation_date: Option<String>,
    #[serde(rename = "modDate")]
    pub mod_date: Option<String>,
    pub keywords: Option<String>,
    pub producer: Option<String>,
    pub encryption: bool,
    pub page_count: usize,
}

impl PaperMetadata {
    pub fn new(paper_id: impl Into<String>, source_pdf: PathBuf, title: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            source_pdf,
            title: title.into(),
            author: None,
            creation_date: None,
            mod_date: None,
            keywords: None,
            producer: None,
            encryption: false,
            page_count: 0,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            &self.paper_id
        } else {
            &self.title
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedPaper {
    pub paper_id: String,
    pub text: String,
    pub text_path: PathBuf,
    pub metadata_path: PathBuf,
    pub figures_paths: Vec<PathBuf>,
    pub metadata: PaperMetadata,
}

/// Turns one PDF into text, metadata and figures under `artifacts_dir`.
pub trait Extractor {
    fn extract(
        &self,
        pdf_path: &Path,
        artifacts_dir: &Path,
    ) -> Result<ExtractedPaper, ExtractError>;
}

/// Lists `*.pdf` files (any letter case) directly inside `dir`, sorted.
pub fn find_pdfs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        // dotfiles such as macOS `._x.pdf` resource forks are not papers
        let hidden = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && !hidden && path.is_file() {
            found.insert(path);
        }
    }
    Ok(found.into_iter().collect())
}

pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.trim().to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "paper".to_string()
    } else {
        slug
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractor;

impl Extractor for PdfExtractor {
    fn extract(
        &self,
        pdf_path: &Path,
        artifacts_dir: &Path,
    ) -> Result<ExtractedPaper, ExtractError> {
        let stem = pdf_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let paper_id = slugify(&stem);

        let figures_dir = artifacts_dir.join("figures").join(&paper_id);
        let text_dir = artifacts_dir.join("clean_text");
        let meta_dir = artifacts_dir.join("metadata");
        fs::create_dir_all(&figures_dir)?;
        fs::create_dir_all(&text_dir)?;
        fs::create_dir_all(&meta_dir)?;

        let doc = Document::load(pdf_path).map_err(|err| ExtractError::Load {
            path: pdf_path.to_path_buf(),
            message: err.to_string(),
        })?;
        let pages = doc.get_pages();

        let mut texts = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => texts.push(text),
                Err(err) => {
                    debug!(
                        pdf = %pdf_path.display(),
                        page = page_number,
                        error = %err,
                        "page text unreadable"
                    );
                    texts.push(String::new());
                }
            }
        }
        let text = texts.join("\n");
        let text_path = text_dir.join(format!("{paper_id}.txt"));
        fs::write(&text_path, &text)?;

        let info = info_dictionary(&doc);
        let field = |key: &[u8]| info.and_then(|dict| info_string(&doc, dict, key));
        let metadata = PaperMetadata {
            paper_id: paper_id.clone(),
            source_pdf: pdf_path.to_path_buf(),
            title: field(b"Title").unwrap_or_else(|| stem.clone()),
            author: field(b"Author"),
            creation_date: field(b"CreationDate"),
            mod_date: field(b"ModDate"),
            keywords: field(b"Keywords"),
            producer: field(b"Producer"),
            encryption: doc.trailer.get(b"Encrypt").is_ok(),
            page_count: pages.len(),
        };
        let metadata_path = meta_dir.join(format!("{paper_id}.json"));
        fs::write(&metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        let figures_paths = write_images(&doc, &figures_dir)?;
        debug!(
            paper_id = %paper_id,
            pages = pages.len(),
            figures = figures_paths.len(),
            "extracted pdf"
        );

        Ok(ExtractedPaper {
            paper_id,
            text,
            text_path,
            metadata_path,
            figures_paths,
            metadata,
        })
    }
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(doc: &Document, dict: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match dict.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match value {
        Object::String(bytes, _) => {
            let text = decode_pdf_string(bytes);
            let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

/// Text strings are UTF-16BE with a byte order mark, UTF-8 with a BOM, or
/// PDFDocEncoding (read here as Latin-1).
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
        return char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
    }
    if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return String::from_utf8_lossy(rest).into_owned();
    }
    bytes.iter().map(|&b| char::from(b)).collect()
}

fn image_extension(dict: &Dictionary) -> Option<&'static str> {
    let is_image =
        matches!(dict.get(b"Subtype"), Ok(Object::Name(name)) if name.as_slice() == b"Image");
    if !is_image {
        return None;
    }
    let filters: Vec<&[u8]> = match dict.get(b"Filter").ok()? {
        Object::Name(name) => vec![name.as_slice()],
        Object::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Object::Name(name) => Some(name.as_slice()),
                _ => None,
            })
            .collect(),
        _ => return None,
    };
    // only formats whose stream bytes are already a complete image file
    match filters.last().copied() {
        Some(b"DCTDecode") if filters.len() == 1 => Some("jpg"),
        Some(b"JPXDecode") if filters.len() == 1 => Some("jp2"),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Image XObjects a page can draw, following `/Resources` inheritance up
/// the page tree.
fn page_xobjects(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut node = doc.get_dictionary(page_id).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let Some(dict) = node else {
            break;
        };
        let resources = dict.get(b"Resources").ok().and_then(|o| resolve(doc, o));
        if let Some(Object::Dictionary(resources)) = resources {
            let xobjects = resources.get(b"XObject").ok().and_then(|o| resolve(doc, o));
            return match xobjects {
                Some(Object::Dictionary(xobjects)) => xobjects
                    .iter()
                    .filter_map(|(_, value)| value.as_reference().ok())
                    .collect(),
                _ => Vec::new(),
            };
        }
        node = dict
            .get(b"Parent")
            .and_then(Object::as_reference)
            .and_then(|id| doc.get_dictionary(id))
            .ok();
    }
    Vec::new()
}

/// Writes JPEG and JPEG 2000 images page by page, in the order each page
/// lists them. An image drawn on several pages is written once per page.
fn write_images(doc: &Document, figures_dir: &Path) -> Result<Vec<PathBuf>, ExtractError> {
    let mut paths = Vec::new();
    for page_id in doc.get_pages().into_values() {
        for id in page_xobjects(doc, page_id) {
            let Ok(Object::Stream(stream)) = doc.get_object(id) else {
                continue;
            };
            let Some(ext) = image_extension(&stream.dict) else {
                continue;
            };
            if stream.content.is_empty() {
                continue;
            }
            let path = figures_dir.join(format!("img_{:03}.{ext}", paths.len()));
            fs::write(&path, &stream.content)?;
            paths.push(path);
        }
    }
    Ok(paths)
}
