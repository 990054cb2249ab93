//! Serving files from disk.
//!
//! [`send_file`] is meant for development: it streams a file in fixed-size
//! blocks with the headers a browser needs, without caching or range
//! support.

use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sluice_core::{HttpError, IntoResponse, Response, StatusCode};

/// Default block size for streamed files.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

/// Errors raised while opening a file to send.
#[derive(Debug)]
pub enum StaticFileError {
    /// The path does not exist or is not a regular file.
    NotFound {
        /// The requested path.
        path: PathBuf,
    },
    /// The file exists but cannot be read.
    AccessDenied {
        /// The requested path.
        path: PathBuf,
    },
    /// Any other filesystem error.
    Io(io::Error),
}

impl fmt::Display for StaticFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { path } => write!(f, "file not found: {}", path.display()),
            Self::AccessDenied { path } => write!(f, "access denied: {}", path.display()),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for StaticFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StaticFileError> for HttpError {
    fn from(err: StaticFileError) -> Self {
        match err {
            StaticFileError::NotFound { .. } => HttpError::not_found(),
            StaticFileError::AccessDenied { .. } => {
                HttpError::new(StatusCode::FORBIDDEN).with_message("Access Denied")
            }
            StaticFileError::Io(_) => HttpError::internal(),
        }
    }
}

impl IntoResponse for StaticFileError {
    fn into_response(self) -> Response {
        HttpError::from(self).into_response()
    }
}

/// How the browser should treat the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Disposition {
    /// Display it.
    #[default]
    Inline,
    /// Offer a "Save as" dialog with the file's own name.
    Attachment,
    /// Offer a "Save as" dialog with the given name.
    AttachmentAs(String),
}

/// Options for [`send_file`].
#[derive(Debug, Clone)]
pub struct SendFileOptions {
    block_size: usize,
    disposition: Disposition,
}

impl Default for SendFileOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            disposition: Disposition::Inline,
        }
    }
}

impl SendFileOptions {
    /// Create options with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the block size (minimum 1).
    #[must_use]
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size.max(1);
        self
    }

    /// Ask the browser to download the file.
    #[must_use]
    pub fn with_disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    /// Returns the block size.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the disposition.
    #[must_use]
    pub fn disposition(&self) -> &Disposition {
        &self.disposition
    }
}

/// Build a streaming response for the file at `path`.
///
/// Sets `Content-Type` from the extension (falling back to
/// `application/octet-stream`), `Content-Length`, `Last-Modified` and, for
/// downloads, `Content-Disposition`.
///
/// # Errors
///
/// [`StaticFileError::NotFound`] if `path` is not a regular file,
/// [`StaticFileError::AccessDenied`] if it cannot be opened for reading.
pub fn send_file(
    path: impl AsRef<Path>,
    options: &SendFileOptions,
) -> Result<Response, StaticFileError> {
    let path = path.as_ref();
    let metadata = fs::metadata(path).map_err(|e| classify(path, e))?;
    if !metadata.is_file() {
        return Err(StaticFileError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| classify(path, e))?;

    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut response = Response::ok()
        .header("Content-Type", guess_mime(&filename))
        .header("Content-Length", metadata.len().to_string());
    if let Some(modified) = metadata.modified().ok().and_then(httpdate) {
        response.set_header("Last-Modified", modified);
    }
    let download = match &options.disposition {
        Disposition::Inline => None,
        Disposition::Attachment => Some(filename.as_str()),
        Disposition::AttachmentAs(name) => Some(name.as_str()),
    };
    if let Some(name) = download {
        response.set_header(
            "Content-Disposition",
            format!("attachment; filename=\"{}\"", name.replace('"', "")),
        );
    }

    Ok(response.stream(FileBlocks {
        file: Some(file),
        block_size: options.block_size,
    }))
}

fn classify(path: &Path, err: io::Error) -> StaticFileError {
    match err.kind() {
        io::ErrorKind::NotFound => StaticFileError::NotFound {
            path: path.to_path_buf(),
        },
        io::ErrorKind::PermissionDenied => StaticFileError::AccessDenied {
            path: path.to_path_buf(),
        },
        _ => StaticFileError::Io(err),
    }
}

/// Lazy block reader; the file is closed at end of stream or on error.
struct FileBlocks {
    file: Option<File>,
    block_size: usize,
}

impl Iterator for FileBlocks {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        let file = self.file.as_mut()?;
        let mut block = Vec::with_capacity(self.block_size);
        match file.by_ref().take(self.block_size as u64).read_to_end(&mut block) {
            Ok(0) => {
                self.file = None;
                None
            }
            Ok(_) => Some(Ok(block)),
            Err(e) => {
                self.file = None;
                Some(Err(e))
            }
        }
    }
}

/// MIME type for a file name, by extension.
#[must_use]
pub fn guess_mime(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/vnd.microsoft.icon",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}

/// IMF-fixdate for `time`, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
///
/// Returns `None` for times before the Unix epoch.
#[must_use]
pub fn httpdate(time: SystemTime) -> Option<String> {
    const WEEKDAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = time.duration_since(UNIX_EPOCH).ok()?.as_secs();
    let days = secs / 86_400;
    let secs_of_day = secs % 86_400;
    let (year, month, day) = civil_from_days(i64::try_from(days).ok()?);

    let weekday = WEEKDAYS.get(usize::try_from(days % 7).ok()?)?;
    let month = MONTHS.get(usize::try_from(month - 1).ok()?)?;
    Some(format!(
        "{weekday}, {day:02} {month} {year:04} {:02}:{:02}:{:02} GMT",
        secs_of_day / 3600,
        secs_of_day % 3600 / 60,
        secs_of_day % 60,
    ))
}

/// Proleptic Gregorian (year, month, day) for days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, i64, i64) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn httpdate_known_values() {
        assert_eq!(httpdate(at(0)).unwrap(), "Thu, 01 Jan 1970 00:00:00 GMT");
        assert_eq!(httpdate(at(784_111_777)).unwrap(), "Sun, 06 Nov 1994 08:49:37 GMT");
        // Leap day.
        assert_eq!(httpdate(at(951_782_400)).unwrap(), "Tue, 29 Feb 2000 00:00:00 GMT");
        assert_eq!(httpdate(at(1_700_000_000)).unwrap(), "Tue, 14 Nov 2023 22:13:20 GMT");
    }

    #[test]
    fn mime_guessing() {
        assert_eq!(guess_mime("index.HTML"), "text/html");
        assert_eq!(guess_mime("photo.jpeg"), "image/jpeg");
        assert_eq!(guess_mime("archive.tar.gz"), "application/gzip");
        assert_eq!(guess_mime("README"), "application/octet-stream");
    }

    #[test]
    fn sends_file_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"0123456789").unwrap();

        let options = SendFileOptions::new().with_block_size(4);
        let response = send_file(&path, &options).unwrap();
        assert_eq!(response.get_header("Content-Type"), Some("text/plain"));
        assert_eq!(response.get_header("Content-Length"), Some("10"));
        assert!(response.get_header("Last-Modified").unwrap().ends_with(" GMT"));
        assert!(response.get_header("Content-Disposition").is_none());

        let out = response.into_gateway().unwrap();
        assert_eq!(out.header("Content-Length"), Some("10"));
        assert_eq!(out.body_bytes().unwrap(), b"0123456789");
    }

    #[test]
    fn download_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        fs::write(&path, b"%PDF").unwrap();

        let options = SendFileOptions::new().with_disposition(Disposition::Attachment);
        let response = send_file(&path, &options).unwrap();
        assert_eq!(
            response.get_header("Content-Disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );

        let options =
            SendFileOptions::new().with_disposition(Disposition::AttachmentAs("q3.pdf".into()));
        let response = send_file(&path, &options).unwrap();
        assert_eq!(
            response.get_header("Content-Disposition"),
            Some("attachment; filename=\"q3.pdf\"")
        );
    }

    #[test]
    fn missing_file_and_directory_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let options = SendFileOptions::default();

        let err = send_file(dir.path().join("nope"), &options).unwrap_err();
        assert!(matches!(err, StaticFileError::NotFound { .. }));
        assert_eq!(HttpError::from(err).status(), StatusCode::NOT_FOUND);

        let err = send_file(dir.path(), &options).unwrap_err();
        assert!(matches!(err, StaticFileError::NotFound { .. }));
    }

    #[test]
    fn access_denied_maps_to_forbidden() {
        let err = StaticFileError::AccessDenied {
            path: PathBuf::from("/secret"),
        };
        let response = err.into_response();
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
    }
}
