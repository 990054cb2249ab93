//! Uploaded files from multipart requests.

use std::fs::{self, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use unicode_normalization::UnicodeNormalization;

use crate::multidict::MultiDict;
use crate::spool::SpooledBody;

/// Default chunk size for [`FileUpload::save`] and [`FileUpload::copy_to`] (64 KiB).
pub const DEFAULT_COPY_CHUNK: usize = 1 << 16;

/// Longest sanitized filename, in bytes.
const MAX_FILENAME_LEN: usize = 255;

/// Errors raised while persisting an upload.
#[derive(Debug)]
pub enum SaveError {
    /// The target exists and overwriting was not requested.
    FileAlreadyExists {
        /// The path that already exists.
        path: PathBuf,
    },
    /// Any other filesystem failure.
    Io(io::Error),
}

impl std::fmt::Display for SaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileAlreadyExists { path } => {
                write!(f, "file already exists: {}", path.display())
            }
            Self::Io(err) => write!(f, "failed to save upload: {err}"),
        }
    }
}

impl std::error::Error for SaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::FileAlreadyExists { .. } => None,
        }
    }
}

impl From<io::Error> for SaveError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// A file received as one part of a multipart body.
///
/// The content stream is shared behind a lock so that [`size`](Self::size),
/// [`save`](Self::save) and [`copy_to`](Self::copy_to) can be called through a
/// shared reference; each of them leaves the stream offset where it found it.
#[derive(Debug)]
pub struct FileUpload {
    name: String,
    raw_filename: String,
    headers: MultiDict<String>,
    content: Mutex<SpooledBody>,
    filename: OnceLock<String>,
    size: OnceLock<u64>,
}

impl FileUpload {
    /// Build an upload from its form field name, client filename, part headers
    /// and buffered contents.
    ///
    /// Header names are normalized to `Title-Case` with `_` mapped to `-`.
    #[must_use]
    pub fn new<I, K, V>(
        name: impl Into<String>,
        raw_filename: impl Into<String>,
        headers: I,
        content: SpooledBody,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(key, value)| (title_case_header(key.as_ref()), value.into()))
            .collect();
        Self {
            name: name.into(),
            raw_filename: raw_filename.into(),
            headers,
            content: Mutex::new(content),
            filename: OnceLock::new(),
            size: OnceLock::new(),
        }
    }

    /// Form field name of the part.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename exactly as the client sent it.
    #[must_use]
    pub fn raw_filename(&self) -> &str {
        &self.raw_filename
    }

    /// Sanitized filename, safe to use as a single path component.
    ///
    /// Computed once on first access.
    #[must_use]
    pub fn filename(&self) -> &str {
        self.filename
            .get_or_init(|| sanitize_filename(&self.raw_filename))
    }

    /// Part headers, keyed by `Title-Case` names.
    #[must_use]
    pub fn headers(&self) -> &MultiDict<String> {
        &self.headers
    }

    /// A single part header; the lookup is case-insensitive.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&title_case_header(name))
            .map(String::as_str)
    }

    /// `Content-Type` of the part, if any.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// Returns true if the contents have been spilled to disk.
    #[must_use]
    pub fn is_spooled(&self) -> bool {
        self.content.lock().is_spooled()
    }

    /// Size of the contents in bytes.
    ///
    /// The stream is measured by seeking to its end; the previous offset is
    /// restored afterwards. The result is cached.
    pub fn size(&self) -> io::Result<u64> {
        if let Some(size) = self.size.get() {
            return Ok(*size);
        }
        let mut content = self.content.lock();
        let offset = content.stream_position()?;
        let end = content.seek(SeekFrom::End(0));
        content.seek(SeekFrom::Start(offset))?;
        let end = end?;
        Ok(*self.size.get_or_init(|| end))
    }

    /// Read everything from the current offset to the end, then restore the offset.
    pub fn read_to_vec(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.copy_to(&mut out, DEFAULT_COPY_CHUNK)?;
        Ok(out)
    }

    /// Copy the contents, from the current offset, into `writer`.
    ///
    /// Data moves in `chunk_len` blocks. The stream offset is restored even
    /// when the copy fails. Returns the number of bytes copied.
    pub fn copy_to<W: Write + ?Sized>(&self, writer: &mut W, chunk_len: usize) -> io::Result<u64> {
        let mut content = self.content.lock();
        let offset = content.stream_position()?;
        let result = copy_chunks(&mut *content, writer, chunk_len.max(1));
        content.seek(SeekFrom::Start(offset))?;
        result
    }

    /// Write the contents to `destination`.
    ///
    /// When `destination` is a directory the sanitized [`filename`](Self::filename)
    /// is appended to it. Missing parent directories are created. Without
    /// `overwrite`, an existing target yields [`SaveError::FileAlreadyExists`].
    /// Returns the path written.
    pub fn save(&self, destination: impl AsRef<Path>, overwrite: bool) -> Result<PathBuf, SaveError> {
        self.save_chunked(destination, overwrite, DEFAULT_COPY_CHUNK)
    }

    /// [`save`](Self::save) with an explicit copy chunk size.
    pub fn save_chunked(
        &self,
        destination: impl AsRef<Path>,
        overwrite: bool,
        chunk_len: usize,
    ) -> Result<PathBuf, SaveError> {
        let mut path = destination.as_ref().to_path_buf();
        if path.is_dir() {
            let filename = self.filename();
            if filename.is_empty() {
                return Err(SaveError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "upload has no usable filename",
                )));
            }
            path.push(filename);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if overwrite {
            options.create(true).truncate(true);
        } else {
            options.create_new(true);
        }
        let mut file = options.open(&path).map_err(|err| {
            if err.kind() == io::ErrorKind::AlreadyExists {
                SaveError::FileAlreadyExists { path: path.clone() }
            } else {
                SaveError::Io(err)
            }
        })?;

        self.copy_to(&mut file, chunk_len)?;
        file.flush()?;
        tracing::debug!(path = %path.display(), field = %self.name, "saved upload");
        Ok(path)
    }
}

fn copy_chunks<R: Read, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
    chunk_len: usize,
) -> io::Result<u64> {
    let mut buf = vec![0u8; chunk_len];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// `content_type` / `CONTENT-TYPE` -> `Content-Type`.
fn title_case_header(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for ch in name.trim().chars() {
        let ch = if ch == '_' { '-' } else { ch };
        if upper {
            out.extend(ch.to_uppercase());
        } else {
            out.extend(ch.to_lowercase());
        }
        upper = ch == '-';
    }
    out
}

/// Turn a client-supplied filename into a safe, lowercase, ASCII path component.
///
/// Accents are folded by compatibility decomposition, any directory part is
/// dropped (both `/` and `\` count as separators), and only
/// `[a-z0-9._-]` survive. Runs of whitespace and dashes become a single `-`.
/// Leading dots and dashes and trailing dots are trimmed so the result can
/// never be `.`, `..` or a hidden file. The result may be empty.
///
/// ```
/// use sluice_core::upload::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My Résumé.PDF"), "my-resume.pdf");
/// assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
/// assert_eq!(sanitize_filename("///"), "");
/// ```
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    let ascii: String = raw.nfkd().filter(char::is_ascii).collect();
    let unified = ascii.replace('\\', "/");
    let base = unified.rsplit('/').next().unwrap_or_default();

    let kept: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') || c.is_whitespace())
        .collect();
    let lowered = kept.trim().to_ascii_lowercase();

    let mut collapsed = String::with_capacity(lowered.len());
    let mut in_run = false;
    for ch in lowered.chars() {
        if ch == '-' || ch.is_whitespace() {
            if !in_run {
                collapsed.push('-');
            }
            in_run = true;
        } else {
            collapsed.push(ch);
            in_run = false;
        }
    }

    let mut name = collapsed
        .trim_start_matches(['.', '-'])
        .trim_end_matches('.')
        .to_string();
    if name.len() > MAX_FILENAME_LEN {
        name.truncate(MAX_FILENAME_LEN);
        name = name.trim_end_matches('.').to_string();
    }
    name
}
