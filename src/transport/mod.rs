//! Named local endpoint carrying download requests between instances.
//!
//! Every connection carries exactly one frame: a 4-byte big-endian length
//! followed by the UTF-8 bytes of the percent-encoded URL. There is no
//! reply.

use std::io;
use std::os::unix::net::UnixListener as StdUnixListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};
use tracing::{debug, error, info, warn};

use crate::domain::{AppError, DownloadRequest, ResourceLocator};

pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// How long a connected peer may take to deliver its frame.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(30);

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

pub fn encode_request(request: &DownloadRequest) -> Bytes {
    Bytes::copy_from_slice(request.locator.as_str().as_bytes())
}

pub fn decode_request(frame: &[u8]) -> Result<DownloadRequest, AppError> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| AppError::Protocol(format!("payload is not UTF-8: {}", e)))?;
    let locator =
        ResourceLocator::parse(text).map_err(|e| AppError::Protocol(e.to_string()))?;

    Ok(DownloadRequest::new(locator))
}

/// A socket path, not yet bound or connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    path: PathBuf,
}

impl Endpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bind the endpoint. Fails with `AddrInUse` when another process owns it.
    pub fn bind(&self) -> io::Result<Listener> {
        let inner = StdUnixListener::bind(&self.path)?;
        inner.set_nonblocking(true)?;

        Ok(Listener {
            inner,
            path: self.path.clone(),
        })
    }

    /// Send one request to the process owning the endpoint.
    pub async fn forward(&self, request: &DownloadRequest) -> Result<(), AppError> {
        let stream = UnixStream::connect(&self.path).await.map_err(|e| {
            AppError::Unreachable(self.path.display().to_string(), e.to_string())
        })?;

        let mut framed = FramedWrite::new(stream, codec());
        framed
            .send(encode_request(request))
            .await
            .map_err(|e| AppError::Io(format!("Failed to send request: {}", e)))?;

        let mut stream = framed.into_inner();
        stream
            .shutdown()
            .await
            .map_err(|e| AppError::Io(format!("Failed to close connection: {}", e)))?;

        debug!(url = %request.locator, "request forwarded");
        Ok(())
    }
}

/// The bound endpoint. Dropping it releases the name.
#[derive(Debug)]
pub struct Listener {
    inner: StdUnixListener,
    path: PathBuf,
}

impl Listener {
    /// Accept connections until `tx` is closed, emitting one request per
    /// well-formed frame.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn serve(&self, tx: mpsc::UnboundedSender<DownloadRequest>) -> io::Result<()> {
        let listener = UnixListener::from_std(self.inner.try_clone()?)?;
        info!(path = %self.path.display(), "accepting download requests");

        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            if tx.is_closed() {
                break;
            }

            let tx = tx.clone();
            tokio::spawn(async move {
                match read_request(stream).await {
                    Ok(request) => {
                        info!(url = %request.locator, "request received");
                        if tx.unbounded_send(request).is_err() {
                            debug!("request dropped, receiver gone");
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping connection"),
                }
            });
        }

        debug!("request receiver gone, accept loop stopped");
        Ok(())
    }

    /// Requests arriving on the endpoint, as a stream for the event loop.
    pub fn incoming(self: Arc<Self>) -> BoxStream<'static, DownloadRequest> {
        let (tx, rx) = mpsc::unbounded();

        let accept = futures::stream::once(async move {
            if let Err(e) = self.serve(tx).await {
                error!(error = %e, "accept loop failed");
            }
        })
        .filter_map(|()| async { None::<DownloadRequest> });

        futures::stream::select(accept, rx).boxed()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "endpoint released"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to release endpoint"),
        }
    }
}

async fn read_request(stream: UnixStream) -> Result<DownloadRequest, AppError> {
    let mut framed = FramedRead::new(stream, codec());

    let frame = tokio::time::timeout(FRAME_TIMEOUT, framed.next())
        .await
        .map_err(|_| AppError::Protocol("timed out waiting for frame".to_string()))?;

    match frame {
        Some(Ok(frame)) => decode_request(&frame),
        Some(Err(e)) => Err(AppError::Protocol(e.to_string())),
        None => Err(AppError::Protocol("connection closed before a frame".to_string())),
    }
}
