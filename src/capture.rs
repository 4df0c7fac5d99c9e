use crate::protocol::{
    self, CHUNK_SIZE, CHUNK_TIMEOUT, FIRST_CHUNK_RETRY_PAUSE, INTER_CHUNK_PAUSE,
    MAX_CHUNK_RETRIES, READOUT_MARGIN,
};
use crate::transport::{BulkPipe, CommandChannel};
use crate::types::{CaptureGeometry, Image, TransferEvent};
use crate::{Result, SxError};
use crossbeam_channel::Sender;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Cooperative cancellation for exposure waits and image transfers.
///
/// Clone it, hand one copy to the capture call and keep the other; calling
/// `cancel()` wakes any in-progress wait and aborts the capture with
/// `SxError::Cancelled` at the next checkpoint.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled = true;
        self.inner.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for up to `timeout`, returning early if cancelled.
    /// Returns true when the token was cancelled.
    pub fn wait(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self
            .inner
            .cancelled
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*cancelled {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .condvar
                .wait_timeout(cancelled, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            cancelled = guard;
        }
        true
    }
}

/// Everything a capture needs beyond the open device.
pub struct CaptureOptions {
    pub geometry: CaptureGeometry,
    pub exposure: Duration,
    pub cancel: CancelToken,
    /// Optional sink for transfer progress events. Delivery is best-effort
    /// via `try_send`; a slow consumer drops events, never data.
    pub events: Option<Sender<TransferEvent>>,
}

impl CaptureOptions {
    pub fn new(exposure: Duration) -> Self {
        CaptureOptions {
            geometry: CaptureGeometry::default(),
            exposure,
            cancel: CancelToken::new(),
            events: None,
        }
    }
}

fn emit(events: Option<&Sender<TransferEvent>>, event: TransferEvent) {
    if let Some(tx) = events {
        if tx.try_send(event).is_err() {
            log::trace!("Transfer event channel full or disconnected");
        }
    }
}

/// Run a full capture: trigger the delayed exposure, wait it out, then
/// reassemble the pixel stream.
pub(crate) fn run_capture<P: BulkPipe>(pipe: &P, opts: &CaptureOptions) -> Result<Image> {
    let geometry = opts.geometry;
    let expected = geometry.byte_count();

    expose(pipe, opts)?;

    emit(
        opts.events.as_ref(),
        TransferEvent::ReadoutStarted {
            expected_bytes: expected,
        },
    );

    let (raw, received) = collect(pipe, expected, &opts.cancel, opts.events.as_ref())?;

    let data = protocol::unpack_pixels(&raw[..received.min(raw.len())], geometry.pixel_count());
    Ok(Image {
        data,
        width: geometry.width,
        height: geometry.height,
        bits_per_pixel: protocol::BITS_PER_PIXEL,
        received_bytes: received,
    })
}

/// Issue the read-pixels-delayed command and wait out the sensor's internal
/// exposure plus readout margin. The camera times the exposure itself; the
/// host waits a conservative upper bound instead of polling.
fn expose<P: BulkPipe>(pipe: &P, opts: &CaptureOptions) -> Result<()> {
    let exposure_ms = opts.exposure.as_millis().min(u32::MAX as u128) as u32;
    let frame = protocol::build_exposure_frame(&opts.geometry, exposure_ms);

    CommandChannel::new(pipe).send_no_response(&frame)?;

    emit(
        opts.events.as_ref(),
        TransferEvent::ExposureStarted { exposure_ms },
    );
    log::info!(
        "Exposure started: {} ms, {}x{} bin {}x{}",
        exposure_ms,
        opts.geometry.width,
        opts.geometry.height,
        opts.geometry.x_bin,
        opts.geometry.y_bin
    );

    if opts
        .cancel
        .wait(Duration::from_millis(exposure_ms as u64) + READOUT_MARGIN)
    {
        return Err(SxError::Cancelled);
    }
    Ok(())
}

/// Accumulate `expected` bytes from the bulk-IN endpoint in bounded chunks.
///
/// Per-chunk timeouts retry up to `MAX_CHUNK_RETRIES` consecutive times,
/// with the counter reset by any successful chunk. A short chunk is the
/// device's end-of-stream signal. Exhausted retries with data already in
/// hand degrade to a partial result; with nothing in hand they fail the
/// capture. Returns the buffer (always `expected` long, zero tail) and the
/// number of bytes actually received.
pub(crate) fn collect<P: BulkPipe>(
    pipe: &P,
    expected: usize,
    cancel: &CancelToken,
    events: Option<&Sender<TransferEvent>>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = vec![0u8; expected];
    let mut received = 0usize;
    let mut timeouts = 0u32;

    while received < expected {
        if cancel.is_cancelled() {
            return Err(SxError::Cancelled);
        }

        let want = CHUNK_SIZE.min(expected - received);
        match pipe.read_bulk(&mut buf[received..received + want], CHUNK_TIMEOUT) {
            Ok(n) => {
                received += n;
                timeouts = 0;
                emit(
                    events,
                    TransferEvent::ChunkReceived {
                        bytes: n,
                        total: received,
                        expected,
                    },
                );
                log::debug!("Chunk received: {} bytes ({}/{})", n, received, expected);

                if n < want {
                    // End-of-stream: the device has nothing more to send.
                    log::debug!("Short chunk, treating as end of stream");
                    break;
                }
                if received < expected && cancel.wait(INTER_CHUNK_PAUSE) {
                    return Err(SxError::Cancelled);
                }
            }
            Err(rusb::Error::Timeout) => {
                timeouts += 1;
                emit(
                    events,
                    TransferEvent::ChunkTimeout {
                        attempt: timeouts,
                        max: MAX_CHUNK_RETRIES,
                    },
                );
                log::warn!(
                    "Chunk read timed out (attempt {}/{})",
                    timeouts,
                    MAX_CHUNK_RETRIES
                );

                if timeouts >= MAX_CHUNK_RETRIES {
                    if received == 0 {
                        return Err(SxError::CaptureFailed(
                            "no image data received after repeated timeouts".into(),
                        ));
                    }
                    break;
                }
                if received == 0 && cancel.wait(FIRST_CHUNK_RETRY_PAUSE) {
                    return Err(SxError::Cancelled);
                }
            }
            Err(e) => {
                if received == 0 {
                    return Err(SxError::CaptureFailed(format!("bulk read failed: {}", e)));
                }
                log::warn!("Bulk read failed mid-transfer: {}, keeping partial data", e);
                break;
            }
        }
    }

    if received >= expected {
        emit(events, TransferEvent::Completed { received, expected });
        log::info!("Transfer complete: {} bytes", received);
    } else {
        emit(events, TransferEvent::Degraded { received, expected });
        log::warn!(
            "Transfer degraded: {}/{} bytes, zero-filling the remainder",
            received,
            expected
        );
    }

    Ok((buf, received))
}
