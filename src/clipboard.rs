// Clipboard polling and change detection.
//
// A fixed-interval loop reads the system clipboard on the blocking pool,
// classifies the content, and emits a change event only when the raw RGBA
// bytes differ from the last captured snapshot. Clipboard read failures are
// treated as "no change" so the loop can never crash or re-trigger on the
// same image after the clipboard briefly held non-image content.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A decoded clipboard image. The RGBA byte sequence is the snapshot
/// identity used for exact-equality change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Outcome of one clipboard read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardRead {
    /// The clipboard holds no image (empty, text, or temporarily unreadable).
    NoImage,
    /// The clipboard reports image content the platform backend cannot decode.
    Unsupported,
    Image(CapturedImage),
}

// ---------------------------------------------------------------------------
// Change detection
// ---------------------------------------------------------------------------

/// Tracks the last captured snapshot and decides when a read is a new image.
///
/// `NoImage` and `Unsupported` reads never clear the stored snapshot, so the
/// clipboard flickering to non-image content and back does not re-trigger on
/// the same image.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    last: Option<Vec<u8>>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        ChangeDetector { last: None }
    }

    /// Consume one clipboard read. Returns the image iff it differs from the
    /// stored snapshot (including the first image ever seen), updating the
    /// snapshot in that case.
    pub fn observe(&mut self, read: ClipboardRead) -> Option<CapturedImage> {
        match read {
            ClipboardRead::Image(image) => {
                if self.last.as_deref() == Some(image.rgba.as_slice()) {
                    return None;
                }
                self.last = Some(image.rgba.clone());
                Some(image)
            }
            ClipboardRead::NoImage | ClipboardRead::Unsupported => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Clipboard access
// ---------------------------------------------------------------------------

/// Read the current clipboard image, swallowing every failure mode.
///
/// Blocking: call from `spawn_blocking` when a tokio runtime is driving other
/// work.
pub fn read_clipboard() -> ClipboardRead {
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(c) => c,
        Err(e) => {
            debug!("clipboard unavailable: {e}");
            return ClipboardRead::NoImage;
        }
    };

    match clipboard.get_image() {
        Ok(image) => {
            let width = image.width as u32;
            let height = image.height as u32;
            let rgba = image.bytes.into_owned();
            if rgba.len() != (width as usize) * (height as usize) * 4 {
                debug!(
                    width,
                    height,
                    len = rgba.len(),
                    "clipboard image buffer does not match its dimensions"
                );
                return ClipboardRead::Unsupported;
            }
            ClipboardRead::Image(CapturedImage {
                width,
                height,
                rgba,
            })
        }
        Err(arboard::Error::ContentNotAvailable) => ClipboardRead::NoImage,
        Err(arboard::Error::ConversionFailure) => ClipboardRead::Unsupported,
        Err(e) => {
            debug!("clipboard read failed: {e}");
            ClipboardRead::NoImage
        }
    }
}

// ---------------------------------------------------------------------------
// Poll loop
// ---------------------------------------------------------------------------

/// Poll the clipboard every `poll_interval` and send each newly detected
/// image through `tx`. Runs until the receiver is dropped.
pub async fn watch(poll_interval: Duration, tx: mpsc::Sender<CapturedImage>) {
    info!(
        "clipboard watcher started (poll interval {}ms)",
        poll_interval.as_millis()
    );

    let mut detector = ChangeDetector::new();
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let read = match tokio::task::spawn_blocking(read_clipboard).await {
            Ok(read) => read,
            Err(e) => {
                warn!("clipboard read task failed: {e}");
                ClipboardRead::NoImage
            }
        };

        if let Some(image) = detector.observe(read) {
            info!(
                width = image.width,
                height = image.height,
                "new clipboard image detected"
            );
            if tx.send(image).await.is_err() {
                // Receiver dropped: the cycle loop is gone, stop polling.
                break;
            }
        }
    }

    info!("clipboard watcher stopped");
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
