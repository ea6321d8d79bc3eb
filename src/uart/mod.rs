// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Serial channel shared by all chips on one board.
//!
//! The channel owns the port for the process lifetime and partitions access
//! with three locks: one writer at a time, one reader at a time, and one full
//! request/response transaction at a time. Chips interleave on the bus request
//! by request; they are never parallel at the UART level.

pub mod framing;

use crate::error::{self, ErrorKind, Frame as FrameError};

use async_trait::async_trait;
use futures::lock::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::trace;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

pub use framing::{Frame, TYPE_CHAIN, TYPE_CONTROL};

/// Default line speed of the chip chain
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// A stuck chip must not wedge the bus, every read is bounded by this deadline
const READ_DEADLINE: Duration = Duration::from_secs(1);

/// Request/response access to chips on a shared bus.
///
/// Implemented by [`Channel`] for real hardware and by fakes in tests; the job
/// protocol and the PLL programmer are written against this trait.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Allocate the next query id. Monotonically increasing per bus.
    fn next_query_id(&self) -> u32;

    /// Frame `data` and send it to `chip_id`
    async fn write(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<()>;

    /// Atomically write a request and read one response frame
    async fn request(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<Frame>;
}

pub struct Channel {
    tag: String,
    query_id: AtomicU32,
    closed: AtomicBool,
    reader: Mutex<ReadHalf<SerialStream>>,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
    request_lock: Mutex<()>,
}

impl Channel {
    /// Open the UART device at `path` and take ownership of it
    /// (8 data bits, 1 stop bit, no flow control).
    pub fn open(path: &str, baud_rate: u32) -> error::Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .stop_bits(tokio_serial::StopBits::One)
            .parity(tokio_serial::Parity::None)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()?;
        Ok(Self::from_stream(path.to_string(), port))
    }

    fn from_stream(tag: String, port: SerialStream) -> Self {
        let (reader, writer) = tokio::io::split(port);
        Self {
            tag,
            query_id: AtomicU32::new(0),
            closed: AtomicBool::new(false),
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            request_lock: Mutex::new(()),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Mark the channel closed and drop the underlying port
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        writer.take();
    }

    /// Parse one frame with the read deadline applied
    pub async fn read(&self) -> error::Result<Frame> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ErrorKind::Io("channel is closed".to_string()))?
        }
        match timeout(READ_DEADLINE, self.do_read()).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::Timeout)?,
        }
    }

    async fn do_read(&self) -> error::Result<Frame> {
        let mut reader = self.reader.lock().await;
        let mut body = Vec::new();
        loop {
            match self.read_byte(&mut reader).await? {
                framing::STX => body.clear(),
                framing::ETX => {
                    let frame = framing::unserialize(&body)?;
                    trace!("[{}] frame from chip {}", self.tag, frame.chip_id);
                    return Ok(frame);
                }
                framing::ESC => {
                    let literal = self.read_byte(&mut reader).await?;
                    body.push(literal);
                }
                other => body.push(other),
            }
        }
    }

    /// Read a single byte; an empty read is legal (the port runs with a zero
    /// minimum read size) and means "no data yet".
    async fn read_byte(&self, reader: &mut ReadHalf<SerialStream>) -> error::Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            let n = reader.read(&mut byte).await?;
            if n == 1 {
                return Ok(byte[0]);
            }
        }
    }

    async fn do_write(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<()> {
        let packed = framing::pack(chip_id, req_type, data);
        let mut writer = self.writer.lock().await;
        let writer = writer
            .as_mut()
            .ok_or_else(|| ErrorKind::Io("channel is closed".to_string()))?;
        let n = writer.write(&packed).await?;
        if n != packed.len() {
            Err(ErrorKind::Io(format!(
                "short UART write: {} of {} bytes",
                n,
                packed.len()
            )))?
        }
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Bus for Channel {
    fn next_query_id(&self) -> u32 {
        self.query_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn write(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<()> {
        self.do_write(chip_id, req_type, data).await
    }

    async fn request(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<Frame> {
        let _guard = self.request_lock.lock().await;
        self.do_write(chip_id, req_type, data).await?;
        self.read().await
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// A scripted chip: every `request` pops the next canned response, every
    /// write is recorded for later inspection.
    pub struct FakeChip {
        query_id: AtomicU32,
        pub writes: StdMutex<Vec<(u8, u8, Vec<u8>)>>,
        responses: StdMutex<VecDeque<error::Result<Frame>>>,
    }

    impl FakeChip {
        pub fn new(first_query_id: u32) -> Self {
            Self {
                query_id: AtomicU32::new(first_query_id),
                writes: StdMutex::new(Vec::new()),
                responses: StdMutex::new(VecDeque::new()),
            }
        }

        pub fn push_response(&self, chip_id: u8, data: Vec<u8>) {
            self.responses
                .lock()
                .unwrap()
                .push_back(Ok(Frame { chip_id, data }));
        }

        pub fn push_error(&self, error: error::Error) {
            self.responses.lock().unwrap().push_back(Err(error));
        }

        pub fn written_frames(&self) -> Vec<(u8, u8, Vec<u8>)> {
            self.writes.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Bus for FakeChip {
        fn next_query_id(&self) -> u32 {
            self.query_id.fetch_add(1, Ordering::SeqCst)
        }

        async fn write(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<()> {
            self.writes
                .lock()
                .unwrap()
                .push((chip_id, req_type, data.to_vec()));
            Ok(())
        }

        async fn request(&self, chip_id: u8, req_type: u8, data: &[u8]) -> error::Result<Frame> {
            self.write(chip_id, req_type, data).await?;
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("BUG: fake chip has no scripted response left")
        }
    }
}

#[cfg(test)]
mod test {
    use super::test_utils::FakeChip;
    use super::*;

    #[tokio::test]
    async fn test_query_ids_are_monotonic() {
        let chip = FakeChip::new(7);
        let ids: Vec<u32> = (0..5).map(|_| chip.next_query_id()).collect();
        assert_eq!(ids, vec![7, 8, 9, 10, 11]);
    }

    #[tokio::test]
    async fn test_fake_chip_scripting() {
        let chip = FakeChip::new(0);
        chip.push_response(2, vec![0xAB]);
        let frame = chip.request(2, TYPE_CHAIN, &[0x9A]).await.expect("request");
        assert_eq!(frame.data, vec![0xAB]);
        assert_eq!(chip.written_frames(), vec![(2, TYPE_CHAIN, vec![0x9A])]);
    }

    /// Push a wire image through a pseudo-terminal pair and let the channel
    /// reader reassemble it, leading line noise included.
    #[tokio::test]
    async fn test_read_reassembles_frame_from_wire() {
        let (mut peer, port) = SerialStream::pair().expect("cannot open pty pair");
        let channel = Channel::from_stream("pty".to_string(), port);
        assert_eq!(channel.tag(), "pty");

        let mut wire = vec![0xFFu8, 0x00];
        wire.extend(framing::pack(4, TYPE_CHAIN, &[0x02, 0x9A, 0x1B]));
        peer.write_all(&wire).await.expect("peer write");

        let frame = channel.read().await.expect("read failed");
        assert_eq!(frame.chip_id, 4);
        assert_eq!(frame.data, vec![0x02, 0x9A, 0x1B]);
    }

    #[tokio::test]
    async fn test_closed_channel_rejects_io() {
        let (_peer, port) = SerialStream::pair().expect("cannot open pty pair");
        let channel = Channel::from_stream("pty".to_string(), port);
        channel.close().await;

        let write_err = channel
            .write(1, TYPE_CHAIN, &[0x9A])
            .await
            .expect_err("write on closed channel succeeded")
            .kind();
        match write_err {
            ErrorKind::Io(msg) => assert!(msg.contains("closed")),
            other => panic!("unexpected error kind {:?}", other),
        }

        let read_err = channel
            .read()
            .await
            .expect_err("read on closed channel succeeded")
            .kind();
        match read_err {
            ErrorKind::Io(msg) => assert!(msg.contains("closed")),
            other => panic!("unexpected error kind {:?}", other),
        }
    }
}
