use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;
use serde::Deserialize;

use crate::error::{CsegError, Result};
use crate::format::cseg::Segment;

use super::{SegmentWriter, WriteStatus, WriterContext};

/// Bounded retry count for transient HTTP transport failures.
const HTTP_RETRY_NUM: u32 = 2;
/// Upper bound of the randomized sleep between retries, milliseconds.
const RANDOM_SLEEP_MAX_MS: u64 = 50;
/// Budget for the create and save calls; uploads use the configured
/// writer timeout.
const FILE_CREATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Response envelope of the IVR storage service.
#[derive(Debug, Default, Deserialize)]
struct IvrEnvelope {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    info: Option<String>,
}

/// Three-phase REST writer for an IVR storage service.
///
/// Each segment is delivered as: `op=create` announcing size and timing and
/// returning an upload target `{name, uri}`; a PUT of the segment bytes to
/// that target (HTTP, or a direct filesystem path as fallback); then
/// `op=save` on success or `op=fail` after a failed upload. An empty create
/// envelope means the service cannot accept the segment yet and pauses the
/// worker. The name of the last saved file rides along on the next create.
pub struct IvrWriter {
    client: Option<reqwest::blocking::Client>,
    rest_uri: String,
    last_filename: Option<String>,
}

impl IvrWriter {
    /// Creates an uninitialized IVR writer.
    pub fn new() -> Self {
        Self {
            client: None,
            rest_uri: String::new(),
            last_filename: None,
        }
    }

    fn client(&self) -> Result<&reqwest::blocking::Client> {
        self.client
            .as_ref()
            .ok_or_else(|| CsegError::Internal("ivr writer used before init".to_string()))
    }

    fn create_file(&mut self, segment: &Segment) -> Result<(String, String)> {
        let params = create_params(segment, self.last_filename.take());
        let (status, body) = post_form(
            self.client()?,
            &self.rest_uri,
            &params,
            FILE_CREATE_TIMEOUT,
        )?;
        if !(200..300).contains(&status) {
            log_remote_info(&body, status);
            return Err(map_http_status(status));
        }
        let envelope: IvrEnvelope = serde_json::from_str(&body)
            .map_err(|e| CsegError::WriterProtocol(format!("bad create response: {}", e)))?;
        match (envelope.name, envelope.uri) {
            (Some(name), Some(uri)) if !name.is_empty() && !uri.is_empty() => Ok((name, uri)),
            // empty envelope: the service cannot take the upload right now
            _ => Err(CsegError::WriterPause),
        }
    }

    fn upload_file(&self, uri: &str, body: Vec<u8>, timeout: Duration) -> Result<()> {
        if uri.starts_with("http://") || uri.starts_with("https://") {
            let status = put_bytes(self.client()?, uri, body, timeout)?;
            if !(200..300).contains(&status) {
                warn!("segment upload rejected with status {}", status);
                return Err(map_http_status(status));
            }
            Ok(())
        } else {
            // filesystem target handed back by the service
            std::fs::write(uri, &body)
                .map_err(|e| CsegError::WriterIo(format!("write {}: {}", uri, e)))
        }
    }

    fn save_file(&self, name: &str, success: bool) -> Result<()> {
        let op = if success { "save" } else { "fail" };
        let params = vec![("op", op.to_string()), ("name", name.to_string())];
        let (status, body) = post_form(
            self.client()?,
            &self.rest_uri,
            &params,
            FILE_CREATE_TIMEOUT,
        )?;
        if !(200..300).contains(&status) {
            log_remote_info(&body, status);
            return Err(map_http_status(status));
        }
        Ok(())
    }
}

impl Default for IvrWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl SegmentWriter for IvrWriter {
    fn init(&mut self, ctx: &WriterContext) -> Result<()> {
        if ctx.url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(CsegError::InvalidConfig(format!(
                "ivr URL without a host: {}",
                ctx.filename
            )));
        }
        self.rest_uri = rest_uri(&ctx.filename)?;
        self.client = Some(
            reqwest::blocking::Client::builder()
                .build()
                .map_err(|e| CsegError::WriterIo(format!("http client: {}", e)))?,
        );
        info!("ivr writer initialized, endpoint {}", self.rest_uri);
        Ok(())
    }

    fn write_segment(&mut self, ctx: &WriterContext, segment: &Segment) -> Result<WriteStatus> {
        let (name, uri) = match self.create_file(segment) {
            Ok(target) => target,
            Err(CsegError::WriterPause) => {
                debug!("service not ready for segment {}", segment.sequence);
                return Ok(WriteStatus::Pause);
            }
            Err(err) => return Err(err),
        };

        let body = segment.contiguous()?;
        match self.upload_file(&uri, body, ctx.timeout) {
            Ok(()) => {
                self.save_file(&name, true)?;
                debug!(
                    "segment {} uploaded as {} ({} bytes)",
                    segment.sequence, name, segment.size
                );
                self.last_filename = Some(name);
                Ok(WriteStatus::Done)
            }
            Err(upload_err) => {
                // tell the service to drop the half-written file
                if let Err(err) = self.save_file(&name, false) {
                    warn!("could not fail file {}: {}", name, err);
                }
                Err(upload_err)
            }
        }
    }

    fn uninit(&mut self, ctx: &WriterContext) {
        self.client = None;
        self.last_filename = None;
        debug!("ivr writer released for {}", ctx.filename);
    }
}

/// Swaps the `ivr` scheme for `http`, keeping everything after the colon.
fn rest_uri(filename: &str) -> Result<String> {
    match filename.find(':') {
        Some(colon) => Ok(format!("http{}", &filename[colon..])),
        None => Err(CsegError::InvalidConfig(format!(
            "malformed ivr URL: {}",
            filename
        ))),
    }
}

/// Form fields of the create call.
fn create_params(segment: &Segment, last_filename: Option<String>) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("op", "create".to_string()),
        ("content_type", "video/mp2t".to_string()),
        ("size", segment.size.to_string()),
        ("start", format!("{:.6}", segment.start_ts)),
        ("duration", format!("{:.6}", segment.duration)),
    ];
    if let Some(last) = last_filename {
        params.push(("last_file_name", last));
    }
    params
}

fn map_http_status(status: u16) -> CsegError {
    match status {
        400 => CsegError::InvalidInput("remote rejected request".to_string()),
        404 => CsegError::InvalidInput("remote file not found".to_string()),
        401..=499 => CsegError::WriterRemote4xx(status),
        500..=599 => CsegError::WriterRemote5xx(status),
        other => CsegError::WriterProtocol(format!("unexpected status {}", other)),
    }
}

fn log_remote_info(body: &str, status: u16) {
    match serde_json::from_str::<IvrEnvelope>(body) {
        Ok(envelope) => {
            if let Some(info) = envelope.info {
                warn!("ivr service status {}: {}", status, info);
            }
        }
        Err(_) => warn!("ivr service status {}: {}", status, body),
    }
}

fn random_sleep() {
    let ms = rand::thread_rng().gen_range(1..=RANDOM_SLEEP_MAX_MS);
    std::thread::sleep(Duration::from_millis(ms));
}

/// POSTs form data, retrying transient transport failures with a short
/// randomized backoff. Timeouts are final.
fn post_form(
    client: &reqwest::blocking::Client,
    uri: &str,
    params: &[(&'static str, String)],
    timeout: Duration,
) -> Result<(u16, String)> {
    let mut attempts = HTTP_RETRY_NUM;
    loop {
        let result = client.post(uri).timeout(timeout).form(params).send();
        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().unwrap_or_default();
                return Ok((status, body));
            }
            Err(err) if err.is_timeout() => {
                return Err(CsegError::WriterIo(format!("POST {} timed out", uri)));
            }
            Err(err) => {
                attempts -= 1;
                if attempts == 0 {
                    return Err(CsegError::WriterIo(format!("POST {}: {}", uri, err)));
                }
                random_sleep();
            }
        }
    }
}

/// PUTs the segment body, with the same retry discipline as [`post_form`].
fn put_bytes(
    client: &reqwest::blocking::Client,
    uri: &str,
    body: Vec<u8>,
    timeout: Duration,
) -> Result<u16> {
    let mut attempts = HTTP_RETRY_NUM;
    loop {
        let result = client
            .put(uri)
            .timeout(timeout)
            .header(reqwest::header::CONTENT_TYPE, "video/mp2t")
            .body(body.clone())
            .send();
        match result {
            Ok(response) => return Ok(response.status().as_u16()),
            Err(err) if err.is_timeout() => {
                return Err(CsegError::WriterIo(format!("PUT {} timed out", uri)));
            }
            Err(err) => {
                attempts -= 1;
                if attempts == 0 {
                    return Err(CsegError::WriterIo(format!("PUT {}: {}", uri, err)));
                }
                random_sleep();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::cseg::SegmentBuilder;

    fn segment() -> Segment {
        SegmentBuilder::new(4, 1_500_000.25, 0).finish(180_000)
    }

    #[test]
    fn test_rest_uri_swaps_scheme() {
        assert_eq!(
            rest_uri("ivr://storage.example:8080/api/v1/files").unwrap(),
            "http://storage.example:8080/api/v1/files"
        );
        assert!(rest_uri("no-scheme-here").is_err());
    }

    #[test]
    fn test_create_params() {
        let params = create_params(&segment(), None);
        assert_eq!(params[0], ("op", "create".to_string()));
        assert_eq!(params[1], ("content_type", "video/mp2t".to_string()));
        assert_eq!(params[3], ("start", "1500000.250000".to_string()));
        assert_eq!(params[4], ("duration", "2.000000".to_string()));
        assert!(params.iter().all(|(k, _)| *k != "last_file_name"));

        let params = create_params(&segment(), Some("rec-0003.ts".to_string()));
        assert_eq!(
            params.last().unwrap(),
            &("last_file_name", "rec-0003.ts".to_string())
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(map_http_status(400), CsegError::InvalidInput(_)));
        assert!(matches!(map_http_status(404), CsegError::InvalidInput(_)));
        assert!(matches!(map_http_status(403), CsegError::WriterRemote4xx(403)));
        assert!(matches!(map_http_status(503), CsegError::WriterRemote5xx(503)));
        assert!(matches!(map_http_status(302), CsegError::WriterProtocol(_)));
    }

    #[test]
    fn test_envelope_parsing() {
        let envelope: IvrEnvelope =
            serde_json::from_str(r#"{"name":"rec-0001.ts","uri":"http://u/rec-0001.ts"}"#).unwrap();
        assert_eq!(envelope.name.as_deref(), Some("rec-0001.ts"));
        assert_eq!(envelope.uri.as_deref(), Some("http://u/rec-0001.ts"));
        assert!(envelope.info.is_none());

        // an empty envelope means pause
        let envelope: IvrEnvelope = serde_json::from_str("{}").unwrap();
        assert!(envelope.name.is_none());
        assert!(envelope.uri.is_none());
    }

    #[test]
    fn test_init_requires_host() {
        use std::time::Duration;
        let filename = "ivr:///path-only".to_string();
        let ctx = WriterContext {
            url: url::Url::parse(&filename).unwrap(),
            filename,
            timeout: Duration::from_secs(1),
        };
        assert!(IvrWriter::new().init(&ctx).is_err());
    }
}
