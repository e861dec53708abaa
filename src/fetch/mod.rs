//! Conditional downloads into the cache
//!
//! [`Fetcher::fetch`] decides, in order:
//!
//! 1. `skip_if_exists` and the destination exists: done, no request
//! 2. an expected SHA-1 matches the existing file: done, no request
//! 3. `max_age` set and the file is younger than it: done, no request; older files are
//!    re-fetched unconditionally
//! 4. offline: use the existing file or fail with [`LoomError::Offline`]
//! 5. send a GET, conditional on the sibling `.etag` marker and the file's mtime
//! 6. `304`, or a `Last-Modified` no newer than the local file: done, nothing written
//! 7. otherwise stream the body (gunzipped when `Content-Encoding: gzip`) into a temporary
//!    file next to the destination, verify it, rename it into place, then record the ETag and
//!    set the mtime to `Last-Modified`
//!
//! The destination is only ever replaced by a complete, verified file. When anything fails
//! the temporary file is deleted and a previously downloaded destination is left untouched.

pub mod transport;

pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

use crate::core::LoomError;
use crate::utils::fs::{
    AtomicFile, atomic_write, calculate_sha1, get_modified_time, remove_path, set_modified_time,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// How a single download may be short-circuited.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Send `If-None-Match` / `If-Modified-Since` and remember the response ETag
    pub use_etag: bool,
    /// Advertise `Accept-Encoding: gzip`
    pub accept_gzip: bool,
    /// Never re-download an existing destination
    pub skip_if_exists: bool,
    /// Expected SHA-1 of the content, lowercase hex
    pub expected_sha1: Option<String>,
    /// Files older than this are re-fetched without conditional headers
    pub max_age: Option<Duration>,
    /// Accept a zero-byte body
    pub allow_empty: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn etag(mut self) -> Self {
        self.use_etag = true;
        self
    }

    #[must_use]
    pub const fn gzip(mut self) -> Self {
        self.accept_gzip = true;
        self
    }

    #[must_use]
    pub const fn skip_if_exists(mut self) -> Self {
        self.skip_if_exists = true;
        self
    }

    #[must_use]
    pub fn sha1(mut self, hash: impl Into<String>) -> Self {
        self.expected_sha1 = Some(hash.into().to_ascii_lowercase());
        self
    }

    #[must_use]
    pub const fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }
}

/// What [`Fetcher::fetch`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A new body was written to the destination
    Downloaded,
    /// The existing destination was kept
    UpToDate,
}

/// Downloads files into the cache through an [`HttpTransport`].
pub struct Fetcher {
    transport: Box<dyn HttpTransport>,
    offline: bool,
}

impl Fetcher {
    pub fn new(transport: Box<dyn HttpTransport>, offline: bool) -> Self {
        Self { transport, offline }
    }

    pub const fn is_offline(&self) -> bool {
        self.offline
    }

    /// Fetch `url` into `dest`.
    pub fn fetch(&self, url: &str, dest: &Path, options: &FetchOptions) -> Result<FetchOutcome> {
        let exists = dest.is_file();

        if exists && options.skip_if_exists {
            debug!("{} exists, not fetching", dest.display());
            return Ok(FetchOutcome::UpToDate);
        }

        let mut local_hash_mismatch = None;
        if exists && let Some(expected) = &options.expected_sha1 {
            let actual = calculate_sha1(dest)?;
            if actual == *expected {
                debug!("{} matches expected hash, not fetching", dest.display());
                return Ok(FetchOutcome::UpToDate);
            }
            local_hash_mismatch = Some(actual);
        }

        let mut stale = false;
        if exists && let Some(max_age) = options.max_age {
            let age = SystemTime::now()
                .duration_since(get_modified_time(dest)?)
                .unwrap_or(Duration::ZERO);
            if age <= max_age {
                debug!("{} is {}s old, within max age", dest.display(), age.as_secs());
                return Ok(FetchOutcome::UpToDate);
            }
            stale = true;
        }

        if self.offline {
            return match (exists, local_hash_mismatch) {
                (true, None) => {
                    debug!("Offline: using cached {}", dest.display());
                    Ok(FetchOutcome::UpToDate)
                }
                (true, Some(actual)) => Err(LoomError::ChecksumMismatch {
                    path: dest.to_path_buf(),
                    expected: options.expected_sha1.clone().unwrap_or_default(),
                    actual,
                }
                .into()),
                (false, _) => Err(LoomError::Offline {
                    path: dest.to_path_buf(),
                }
                .into()),
            };
        }

        let conditional = exists && options.use_etag && !stale && local_hash_mismatch.is_none();
        let local_mtime = if conditional { Some(get_modified_time(dest)?) } else { None };

        let mut request = HttpRequest::get(url);
        if conditional {
            if let Some(etag) = read_etag(dest)? {
                request = request.header("If-None-Match", etag);
            }
            if let Some(mtime) = local_mtime {
                request = request.header("If-Modified-Since", format_http_date(mtime));
            }
        }
        if options.accept_gzip {
            request = request.header("Accept-Encoding", "gzip");
        }

        debug!("GET {url}");
        let response = self.transport.get(&request)?;

        if response.status == 304 && exists {
            debug!("{url} not modified");
            return Ok(FetchOutcome::UpToDate);
        }
        if !response.is_success() {
            return Err(LoomError::HttpStatus {
                url: url.to_string(),
                status: response.status,
            }
            .into());
        }

        let last_modified = response.header("last-modified").and_then(parse_http_date);
        if let (Some(local), Some(remote)) = (local_mtime, last_modified)
            && local >= remote
        {
            debug!("{} is newer than remote, keeping it", dest.display());
            return Ok(FetchOutcome::UpToDate);
        }

        let etag = response.header("etag").map(str::to_string);
        let gzipped = response
            .header("content-encoding")
            .is_some_and(|encoding| encoding.eq_ignore_ascii_case("gzip"));

        info!("Downloading {url}");
        self.write_body(url, dest, response.body, gzipped, options)?;

        if options.use_etag {
            let marker = etag_path(dest);
            match etag {
                Some(etag) => atomic_write(&marker, etag.as_bytes())?,
                None => {
                    remove_path(&marker)?;
                }
            }
        }
        if let Some(remote) = last_modified {
            set_modified_time(dest, remote)?;
        }

        Ok(FetchOutcome::Downloaded)
    }

    fn write_body(
        &self,
        url: &str,
        dest: &Path,
        body: Box<dyn Read + Send>,
        gzipped: bool,
        options: &FetchOptions,
    ) -> Result<()> {
        let mut reader: Box<dyn Read> = if gzipped { Box::new(GzDecoder::new(body)) } else { body };

        let mut file = AtomicFile::create(dest)?;
        let written = io::copy(&mut reader, &mut file).map_err(|err| {
            if gzipped && err.kind() == io::ErrorKind::InvalidInput {
                anyhow::Error::from(LoomError::DataIntegrity {
                    path: dest.to_path_buf(),
                    reason: format!("invalid gzip stream: {err}"),
                })
            } else {
                anyhow::Error::from(LoomError::Network {
                    url: url.to_string(),
                    reason: err.to_string(),
                })
            }
        })?;

        if written == 0 && !options.allow_empty {
            return Err(LoomError::DataIntegrity {
                path: dest.to_path_buf(),
                reason: format!("{url} returned an empty body"),
            }
            .into());
        }

        if let Some(expected) = &options.expected_sha1 {
            let actual = calculate_sha1(file.temp_path())?;
            if actual != *expected {
                warn!("Discarding download of {url}: hash mismatch");
                return Err(LoomError::ChecksumMismatch {
                    path: dest.to_path_buf(),
                    expected: expected.clone(),
                    actual,
                }
                .into());
            }
        }

        file.commit()
            .with_context(|| format!("Failed to store download of {url}"))
    }
}

/// Sibling file recording the last ETag seen for `dest`.
pub fn etag_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".etag");
    dest.with_file_name(name)
}

fn read_etag(dest: &Path) -> Result<Option<String>> {
    let marker = etag_path(dest);
    if !marker.is_file() {
        return Ok(None);
    }
    let etag = std::fs::read_to_string(&marker)
        .with_context(|| format!("Failed to read {}", marker.display()))?;
    let etag = etag.trim();
    Ok((!etag.is_empty()).then(|| etag.to_string()))
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn format_http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Parse a `Last-Modified` header value.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|time| SystemTime::from(time.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{CannedResponse, CountingTransport};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    const URL: &str = "https://example.invalid/file.json";

    fn fetcher(transport: &CountingTransport) -> Fetcher {
        Fetcher::new(Box::new(transport.clone()), false)
    }

    #[test]
    fn test_skip_if_exists_makes_no_calls() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.json");
        std::fs::write(&dest, "cached").unwrap();

        let transport = CountingTransport::new();
        let outcome =
            fetcher(&transport).fetch(URL, &dest, &FetchOptions::new().skip_if_exists()).unwrap();
        assert_eq!(outcome, FetchOutcome::UpToDate);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_matching_hash_makes_no_calls() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("abc");
        std::fs::write(&dest, "abc").unwrap();

        let transport = CountingTransport::new();
        let options = FetchOptions::new().sha1("A9993E364706816ABA3E25717850C26C9CD0D89D");
        assert_eq!(fetcher(&transport).fetch(URL, &dest, &options).unwrap(), FetchOutcome::UpToDate);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_download_records_etag_and_mtime() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("nested/file.json");
        let transport = CountingTransport::new();
        transport.route(
            URL,
            CannedResponse::ok("{}")
                .header("ETag", "\"v1\"")
                .header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT"),
        );

        let outcome = fetcher(&transport).fetch(URL, &dest, &FetchOptions::new().etag()).unwrap();
        assert_eq!(outcome, FetchOutcome::Downloaded);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{}");
        assert_eq!(std::fs::read_to_string(etag_path(&dest)).unwrap(), "\"v1\"");
        assert_eq!(
            get_modified_time(&dest).unwrap(),
            parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap()
        );
    }

    #[test]
    fn test_not_modified_keeps_file_and_sends_conditions() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.json");
        std::fs::write(&dest, "cached").unwrap();
        std::fs::write(etag_path(&dest), "\"v1\"").unwrap();

        let transport = CountingTransport::new();
        transport.route(URL, CannedResponse::status(304));
        let outcome = fetcher(&transport).fetch(URL, &dest, &FetchOptions::new().etag()).unwrap();

        assert_eq!(outcome, FetchOutcome::UpToDate);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "cached");
        let request = &transport.requests()[0];
        assert_eq!(request.header_value("If-None-Match"), Some("\"v1\""));
        assert!(request.header_value("If-Modified-Since").is_some());
    }

    #[test]
    fn test_remote_older_than_local_is_ignored() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.json");
        std::fs::write(&dest, "cached").unwrap();

        let transport = CountingTransport::new();
        transport.route(
            URL,
            CannedResponse::ok("remote").header("Last-Modified", "Mon, 01 Jan 2001 00:00:00 GMT"),
        );
        let outcome = fetcher(&transport).fetch(URL, &dest, &FetchOptions::new().etag()).unwrap();
        assert_eq!(outcome, FetchOutcome::UpToDate);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "cached");
    }

    #[test]
    fn test_gzip_body_is_decoded() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("index.json");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"{\"objects\":{}}").unwrap();
        let compressed = encoder.finish().unwrap();

        let transport = CountingTransport::new();
        transport.route(URL, CannedResponse::ok(compressed).header("Content-Encoding", "gzip"));
        fetcher(&transport).fetch(URL, &dest, &FetchOptions::new().gzip()).unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{\"objects\":{}}");
        assert_eq!(transport.requests()[0].header_value("accept-encoding"), Some("gzip"));
    }

    #[test]
    fn test_http_error_and_empty_body_leave_no_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.jar");
        let transport = CountingTransport::new();

        let err = fetcher(&transport).fetch(URL, &dest, &FetchOptions::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoomError>(),
            Some(LoomError::HttpStatus { status: 404, .. })
        ));

        transport.route(URL, CannedResponse::ok(Vec::<u8>::new()));
        let err = fetcher(&transport).fetch(URL, &dest, &FetchOptions::new()).unwrap_err();
        assert!(err.downcast_ref::<LoomError>().is_some_and(LoomError::is_integrity_error));
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_hash_mismatch_keeps_previous_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("client.jar");
        std::fs::write(&dest, "old").unwrap();

        let transport = CountingTransport::new();
        transport.route(URL, CannedResponse::ok("tampered"));
        let options = FetchOptions::new().sha1("a9993e364706816aba3e25717850c26c9cd0d89d");
        let err = fetcher(&transport).fetch(URL, &dest, &options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<LoomError>(),
            Some(LoomError::ChecksumMismatch { .. })
        ));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "old");
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_max_age_window() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.json");
        std::fs::write(&dest, "cached").unwrap();
        std::fs::write(etag_path(&dest), "\"v1\"").unwrap();

        let transport = CountingTransport::new();
        transport.route(URL, CannedResponse::ok("fresh"));
        let fresh = FetchOptions::new().etag().max_age(Some(Duration::from_secs(3600)));
        assert_eq!(fetcher(&transport).fetch(URL, &dest, &fresh).unwrap(), FetchOutcome::UpToDate);
        assert_eq!(transport.calls(), 0);

        set_modified_time(&dest, SystemTime::now() - Duration::from_secs(7200)).unwrap();
        assert_eq!(fetcher(&transport).fetch(URL, &dest, &fresh).unwrap(), FetchOutcome::Downloaded);
        assert!(transport.requests()[0].header_value("If-None-Match").is_none());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "fresh");
    }

    #[test]
    fn test_offline_mode() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.json");
        let transport = CountingTransport::new();
        let offline = Fetcher::new(Box::new(transport.clone()), true);

        let err = offline.fetch(URL, &dest, &FetchOptions::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoomError>(), Some(LoomError::Offline { .. })));

        std::fs::write(&dest, "cached").unwrap();
        assert_eq!(offline.fetch(URL, &dest, &FetchOptions::new()).unwrap(), FetchOutcome::UpToDate);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn test_http_date_round_trip() {
        let time = parse_http_date("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(format_http_date(time), "Wed, 21 Oct 2015 07:28:00 GMT");
    }
}
