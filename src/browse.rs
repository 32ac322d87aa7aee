use base64::Engine;
use image::ImageFormat;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::chroot::{PathGuard, PathGuardError};
use crate::config::RadioConfig;
use crate::player::TargetKind;
use crate::web::html::{entry_item, image_item, more_item};

/// Rendered size after which a listing is cut with a "more" marker
pub const MAX_LISTING_BYTES: usize = 20_000;

/// Edge length of inline image thumbnails
pub const THUMBNAIL_SIZE: u32 = 36;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

#[derive(Error, Debug)]
pub enum BrowseError {
    #[error(transparent)]
    Path(#[from] PathGuardError),

    #[error("Cannot list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Renders directory and radio listings as HTML fragments
#[derive(Debug)]
pub struct Browser {
    guard: Arc<PathGuard>,
    radios: Vec<RadioConfig>,
    budget: usize,
    thumbnails: bool,
}

impl Browser {
    pub fn new(guard: Arc<PathGuard>, radios: Vec<RadioConfig>) -> Self {
        Self {
            guard,
            radios,
            budget: MAX_LISTING_BYTES,
            thumbnails: true,
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_thumbnails(mut self, thumbnails: bool) -> Self {
        self.thumbnails = thumbnails;
        self
    }

    /// Lazily render the entries of `kind` at `segments`, skipping the first
    /// `offset` names. The directory itself is read up front; entries are
    /// rendered as the iterator advances.
    pub fn browse<S: AsRef<str>>(
        &self,
        kind: TargetKind,
        segments: &[S],
        offset: usize,
    ) -> Result<Listing<'_>, BrowseError> {
        let source = match kind {
            TargetKind::File => {
                let dir = self.guard.resolve(segments)?;
                let names = sorted_names(&dir)?;
                let relative: Vec<String> =
                    segments.iter().map(|s| s.as_ref().to_string()).collect();
                Source::Directory {
                    dir,
                    relative,
                    names: names.into_iter().skip(offset),
                }
            }
            TargetKind::Http => Source::Radios(self.radios.iter().skip(offset)),
        };

        Ok(Listing {
            source,
            thumbnails: self.thumbnails,
            offset,
            position: 0,
            rendered_bytes: 0,
            budget: self.budget,
            done: false,
        })
    }

    /// Render a whole listing page as one newline-joined document
    pub fn render<S: AsRef<str>>(
        &self,
        kind: TargetKind,
        segments: &[S],
        offset: usize,
    ) -> Result<String, BrowseError> {
        let items: Vec<String> = self.browse(kind, segments, offset)?.collect();
        debug!("Rendered {} listing item(s) for {}", items.len(), kind);
        Ok(items.join("\n"))
    }
}

enum Source<'a> {
    Directory {
        dir: PathBuf,
        relative: Vec<String>,
        names: std::iter::Skip<std::vec::IntoIter<String>>,
    },
    Radios(std::iter::Skip<std::slice::Iter<'a, RadioConfig>>),
}

/// Iterator over rendered listing items.
///
/// Stops with a "more" marker once the rendered size exceeds the budget;
/// the marker carries the offset of the first entry that did not fit.
pub struct Listing<'a> {
    source: Source<'a>,
    thumbnails: bool,
    offset: usize,
    position: usize,
    rendered_bytes: usize,
    budget: usize,
    done: bool,
}

impl Iterator for Listing<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while !self.done {
            let position = self.position;
            let item = match &mut self.source {
                Source::Directory {
                    dir,
                    relative,
                    names,
                } => {
                    let Some(name) = names.next() else {
                        self.done = true;
                        break;
                    };
                    self.position += 1;
                    if name.starts_with('.') {
                        continue;
                    }
                    render_entry(dir, relative, &name, self.thumbnails)
                }
                Source::Radios(radios) => {
                    let Some(radio) = radios.next() else {
                        self.done = true;
                        break;
                    };
                    self.position += 1;
                    entry_item("file", &radio.url, &radio.name)
                }
            };

            self.rendered_bytes += item.len();
            if self.rendered_bytes > self.budget {
                self.done = true;
                return Some(more_item(self.offset + position));
            }
            return Some(item);
        }
        None
    }
}

fn sorted_names(dir: &Path) -> Result<Vec<String>, BrowseError> {
    let entries = std::fs::read_dir(dir).map_err(|source| BrowseError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BrowseError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(raw) => warn!("Skipping non UTF-8 entry {:?} in {}", raw, dir.display()),
        }
    }
    names.sort();
    Ok(names)
}

fn render_entry(dir: &Path, relative: &[String], name: &str, thumbnails: bool) -> String {
    let path = dir.join(name);
    if path.is_dir() {
        return entry_item("dir", name, name);
    }

    if thumbnails && is_image(name) {
        match thumbnail_base64(&path) {
            Ok(png) => {
                let show_url = relative
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(name))
                    .collect::<Vec<_>>()
                    .join("/");
                return image_item(&show_url, name, &png);
            }
            Err(e) => warn!("No thumbnail for {}: {}", path.display(), e),
        }
    }

    entry_item("file", name, name)
}

fn is_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn thumbnail_base64(path: &Path) -> Result<String, image::ImageError> {
    let img = image::open(path)?;
    let thumb = img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE);
    let mut png = Cursor::new(Vec::new());
    thumb.write_to(&mut png, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
}
