use crate::config::StreamingConfig;
use crate::error::{Error, Result};
use futures::Stream;
use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Multipart boundary used by `multipart/x-mixed-replace` responses
pub const MJPEG_BOUNDARY: &str = "frame";

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Outcome of waiting for one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePoll {
    /// One encoded JPEG image
    Frame(Vec<u8>),
    /// Nothing arrived within the wait
    Pending,
    /// The source reached end of stream or failed
    Ended,
}

/// An open upstream connection producing JPEG frames.
///
/// Dropping the source releases the connection.
pub trait FrameSource: Send {
    fn next_frame(&mut self, wait: Duration) -> FramePoll;
}

/// Opens frame sources. `open` blocks until the source is playing or gives up.
pub trait SourceOpener: Send + Sync {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>>;
}

/// Wrap one JPEG image as a multipart part
pub fn mjpeg_part(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\n\r\n",
        MJPEG_BOUNDARY
    );
    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Relays one upstream source per client as an MJPEG body
pub struct StreamRelay {
    opener: Arc<dyn SourceOpener>,
    frame_timeout: Duration,
}

impl StreamRelay {
    pub fn new(opener: Arc<dyn SourceOpener>, frame_timeout: Duration) -> Self {
        Self {
            opener,
            frame_timeout,
        }
    }

    pub fn from_config(config: &StreamingConfig) -> Self {
        Self::new(
            Arc::new(GstSourceOpener::new(config)),
            Duration::from_millis(config.frame_timeout_ms),
        )
    }

    /// Open `url` and return its multipart body chunks.
    ///
    /// Fails with `SourceUnavailable` before any byte is produced if the
    /// source cannot be opened. The upstream connection is released when
    /// the returned stream is dropped or the source ends.
    pub async fn open(
        &self,
        url: &str,
    ) -> Result<impl Stream<Item = std::io::Result<Vec<u8>>> + Send + 'static> {
        let opener = Arc::clone(&self.opener);
        let source_url = url.to_string();
        let source = tokio::task::spawn_blocking(move || opener.open(&source_url))
            .await
            .map_err(|e| Error::Internal(format!("Stream open task failed: {}", e)))??;

        info!("Stream relay started for {}", url);

        let (tx, rx) = mpsc::channel::<Vec<u8>>(2);
        let frame_timeout = self.frame_timeout;
        let relay_url = url.to_string();
        tokio::task::spawn_blocking(move || {
            relay_frames(source, &tx, frame_timeout);
            info!("Stream relay stopped for {}", relay_url);
        });

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (Ok(chunk), rx))
        }))
    }
}

/// Pull frames until the source ends or the receiving side goes away
fn relay_frames(mut source: Box<dyn FrameSource>, tx: &mpsc::Sender<Vec<u8>>, wait: Duration) {
    loop {
        if tx.is_closed() {
            debug!("Stream client disconnected");
            break;
        }

        match source.next_frame(wait) {
            FramePoll::Frame(jpeg) => {
                if tx.blocking_send(mjpeg_part(&jpeg)).is_err() {
                    debug!("Stream client disconnected");
                    break;
                }
            }
            FramePoll::Pending => continue,
            FramePoll::Ended => break,
        }
    }
}

/// Opens `uridecodebin ! videoconvert ! jpegenc ! appsink` pipelines
pub struct GstSourceOpener {
    open_timeout: Duration,
    jpeg_quality: i32,
}

impl GstSourceOpener {
    pub fn new(config: &StreamingConfig) -> Self {
        Self {
            open_timeout: Duration::from_secs(config.open_timeout_secs),
            jpeg_quality: config.jpeg_quality.clamp(0, 100),
        }
    }

    fn build_pipeline(&self, url: &str) -> Result<(gst::Pipeline, gst_app::AppSink)> {
        let unavailable = |e: gst::glib::BoolError| {
            Error::SourceUnavailable(format!("Failed to build pipeline for {}: {}", url, e))
        };

        let pipeline = gst::Pipeline::new();
        let decode = gst::ElementFactory::make("uridecodebin")
            .property("uri", url)
            .build()
            .map_err(unavailable)?;
        let convert = gst::ElementFactory::make("videoconvert")
            .build()
            .map_err(unavailable)?;
        let encode = gst::ElementFactory::make("jpegenc")
            .property("quality", self.jpeg_quality)
            .build()
            .map_err(unavailable)?;
        let appsink = gst_app::AppSink::builder()
            .max_buffers(1)
            .drop(true)
            .sync(false)
            .wait_on_eos(false)
            .build();

        pipeline
            .add_many([&decode, &convert, &encode, appsink.upcast_ref()])
            .map_err(unavailable)?;
        gst::Element::link_many([&convert, &encode, appsink.upcast_ref()]).map_err(unavailable)?;

        // uridecodebin exposes pads only once it knows the media
        let convert_weak = convert.downgrade();
        decode.connect_pad_added(move |_, src_pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            if sink_pad.is_linked() {
                return;
            }

            let is_video = src_pad
                .current_caps()
                .and_then(|caps| caps.structure(0).map(|s| s.name().starts_with("video/")))
                .unwrap_or(false);
            if !is_video {
                return;
            }

            if let Err(e) = src_pad.link(&sink_pad) {
                warn!("Failed to link decoded video pad: {:?}", e);
            }
        });

        Ok((pipeline, appsink))
    }
}

impl SourceOpener for GstSourceOpener {
    fn open(&self, url: &str) -> Result<Box<dyn FrameSource>> {
        let (pipeline, appsink) = self.build_pipeline(url)?;
        // Guard first, so every failure below tears the pipeline down
        let source = GstFrameSource { pipeline, appsink };

        source.pipeline.set_state(gst::State::Playing).map_err(|e| {
            Error::SourceUnavailable(format!("Failed to start stream {}: {}", url, e))
        })?;

        let wait = gst::ClockTime::from_mseconds(self.open_timeout.as_millis() as u64);
        let (result, current, _) = source.pipeline.state(wait);
        if result.is_err() || current != gst::State::Playing {
            return Err(Error::SourceUnavailable(format!(
                "Stream {} did not start within {:?}",
                url, self.open_timeout
            )));
        }

        Ok(Box::new(source))
    }
}

/// A playing pipeline; set to NULL on drop
pub struct GstFrameSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

impl GstFrameSource {
    fn pipeline_failed(&self) -> bool {
        let Some(bus) = self.pipeline.bus() else {
            return false;
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos]) {
            match msg.view() {
                gst::MessageView::Error(err) => {
                    warn!(
                        "Error from {}: {}",
                        err.src()
                            .map(|s| s.name())
                            .unwrap_or_else(|| "unknown".into()),
                        err.error()
                    );
                    return true;
                }
                gst::MessageView::Eos(_) => return true,
                _ => {}
            }
        }
        false
    }
}

impl FrameSource for GstFrameSource {
    fn next_frame(&mut self, wait: Duration) -> FramePoll {
        let timeout = gst::ClockTime::from_mseconds(wait.as_millis() as u64);
        match self.appsink.try_pull_sample(timeout) {
            Some(sample) => {
                let Some(buffer) = sample.buffer() else {
                    return FramePoll::Pending;
                };
                match buffer.map_readable() {
                    Ok(map) => FramePoll::Frame(map.as_slice().to_vec()),
                    Err(e) => {
                        warn!("Failed to map frame buffer: {:?}", e);
                        FramePoll::Pending
                    }
                }
            }
            None if self.appsink.is_eos() || self.pipeline_failed() => FramePoll::Ended,
            None => FramePoll::Pending,
        }
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop stream pipeline: {:?}", e);
        }
    }
}
