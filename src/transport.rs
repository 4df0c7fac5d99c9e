use crate::protocol::{self, COMMAND_TIMEOUT};
use crate::{Result, SxError};
use std::time::Duration;

/// Blocking bulk endpoint pair. The camera's command protocol and image
/// readout both run over this seam; tests substitute a scripted pipe.
pub trait BulkPipe {
    /// Write to the bulk-OUT endpoint, returning bytes transferred.
    fn write_bulk(&self, data: &[u8], timeout: Duration) -> rusb::Result<usize>;

    /// Read from the bulk-IN endpoint, returning bytes transferred.
    fn read_bulk(&self, buf: &mut [u8], timeout: Duration) -> rusb::Result<usize>;
}

/// Two-stage vendor command channel.
///
/// Stage 1 writes an 8-byte command header plus any parameter block as a
/// single bulk-OUT transfer, stage 2 reads the response from bulk-IN into
/// the caller's buffer. No retry here; callers that tolerate timeouts
/// (the transfer reassembler) bring their own policy.
pub struct CommandChannel<'p, P: BulkPipe> {
    pipe: &'p P,
}

impl<'p, P: BulkPipe> CommandChannel<'p, P> {
    pub fn new(pipe: &'p P) -> Self {
        Self { pipe }
    }

    /// Issue a command and read its response. Returns the number of
    /// response bytes actually transferred.
    pub fn send(&self, opcode: u8, params: &[u8], response: &mut [u8]) -> Result<usize> {
        let frame = protocol::build_command_frame(opcode, params.len() as u16);
        let mut request = Vec::with_capacity(frame.len() + params.len());
        request.extend_from_slice(&frame);
        request.extend_from_slice(params);

        self.pipe
            .write_bulk(&request, COMMAND_TIMEOUT)
            .map_err(SxError::CommandWrite)?;

        let len = self
            .pipe
            .read_bulk(response, COMMAND_TIMEOUT)
            .map_err(SxError::CommandRead)?;

        log::trace!(
            "Command 0x{:02x}: {} param bytes out, {} response bytes in",
            opcode,
            params.len(),
            len
        );
        Ok(len)
    }

    /// Write a command frame without reading a response. Used for the
    /// exposure trigger, which answers with the pixel stream instead.
    pub fn send_no_response(&self, frame: &[u8]) -> Result<()> {
        self.pipe
            .write_bulk(frame, COMMAND_TIMEOUT)
            .map_err(SxError::CommandWrite)?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::BulkPipe;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// One scripted outcome for a bulk read.
    pub enum ReadStep {
        /// Deliver this many bytes, each set to the given fill value.
        Data(usize, u8),
        /// Report a transfer timeout.
        Timeout,
        /// Report a hard transport error.
        Error(rusb::Error),
    }

    /// Scripted in-memory pipe. Reads pop from the script; once the
    /// script is exhausted every read succeeds with a full buffer of
    /// `default_fill`. Writes are recorded for inspection.
    pub struct ScriptedPipe {
        pub script: RefCell<VecDeque<ReadStep>>,
        pub default_fill: u8,
        pub reads: Cell<usize>,
        pub writes: RefCell<Vec<Vec<u8>>>,
        pub write_error: Cell<Option<rusb::Error>>,
    }

    impl ScriptedPipe {
        pub fn new(script: Vec<ReadStep>) -> Self {
            ScriptedPipe {
                script: RefCell::new(script.into()),
                default_fill: 0xAB,
                reads: Cell::new(0),
                writes: RefCell::new(Vec::new()),
                write_error: Cell::new(None),
            }
        }
    }

    impl BulkPipe for ScriptedPipe {
        fn write_bulk(&self, data: &[u8], _timeout: Duration) -> rusb::Result<usize> {
            if let Some(err) = self.write_error.take() {
                return Err(err);
            }
            self.writes.borrow_mut().push(data.to_vec());
            Ok(data.len())
        }

        fn read_bulk(&self, buf: &mut [u8], _timeout: Duration) -> rusb::Result<usize> {
            self.reads.set(self.reads.get() + 1);
            match self.script.borrow_mut().pop_front() {
                Some(ReadStep::Data(n, fill)) => {
                    let n = n.min(buf.len());
                    buf[..n].fill(fill);
                    Ok(n)
                }
                Some(ReadStep::Timeout) => Err(rusb::Error::Timeout),
                Some(ReadStep::Error(e)) => Err(e),
                None => {
                    buf.fill(self.default_fill);
                    Ok(buf.len())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{ReadStep, ScriptedPipe};
    use super::*;
    use crate::protocol::CMD_GET_FIRMWARE_VERSION;

    #[test]
    fn test_send_writes_header_then_reads() {
        let pipe = ScriptedPipe::new(vec![ReadStep::Data(4, 0x01)]);
        let channel = CommandChannel::new(&pipe);

        let mut response = [0u8; 4];
        let len = channel
            .send(CMD_GET_FIRMWARE_VERSION, &[], &mut response)
            .unwrap();
        assert_eq!(len, 4);
        assert_eq!(response, [1, 1, 1, 1]);

        let writes = pipe.writes.borrow();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0], vec![0x40, 0xFF, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_send_appends_params_to_frame() {
        let pipe = ScriptedPipe::new(vec![ReadStep::Data(1, 0)]);
        let channel = CommandChannel::new(&pipe);

        let mut response = [0u8; 1];
        channel.send(0x02, &[9, 8, 7], &mut response).unwrap();

        let writes = pipe.writes.borrow();
        assert_eq!(writes[0], vec![0x40, 0x02, 0, 0, 0, 0, 3, 0, 9, 8, 7]);
    }

    #[test]
    fn test_write_failure_maps_to_command_write() {
        let pipe = ScriptedPipe::new(vec![]);
        pipe.write_error.set(Some(rusb::Error::Pipe));
        let channel = CommandChannel::new(&pipe);

        let mut response = [0u8; 4];
        match channel.send(0xFF, &[], &mut response) {
            Err(SxError::CommandWrite(rusb::Error::Pipe)) => {}
            other => panic!("expected CommandWrite, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_read_failure_maps_to_command_read() {
        let pipe = ScriptedPipe::new(vec![ReadStep::Error(rusb::Error::Io)]);
        let channel = CommandChannel::new(&pipe);

        let mut response = [0u8; 4];
        match channel.send(0xFF, &[], &mut response) {
            Err(SxError::CommandRead(rusb::Error::Io)) => {}
            other => panic!("expected CommandRead, got {:?}", other.map(|_| ())),
        }
    }
}
