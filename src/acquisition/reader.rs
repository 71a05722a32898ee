//! Blocking reads from the sensor link on a background thread.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::path::Path;
use std::thread;

/// Bytes requested per read; the driver hands over up to a few lines at a time.
pub const READ_BUF_SIZE: usize = 1540;

/// Chunks in flight before the reader blocks.
const CHANNEL_CAPACITY: usize = 64;

/// What the reader thread saw.
#[derive(Debug)]
pub enum ReadEvent {
    Data(Vec<u8>),
    /// The source returned end-of-file
    Closed,
    Failed(io::Error),
}

/// Owns the receiving end of the reader thread's channel.
///
/// The thread is detached: a read blocked on an idle device cannot be
/// interrupted, so it ends when the source closes, fails, or the receiver
/// is dropped and the next chunk cannot be delivered.
pub struct ByteReader {
    receiver: Receiver<ReadEvent>,
}

impl ByteReader {
    /// Start reading `source` on a named background thread.
    pub fn spawn<R: Read + Send + 'static>(source: R) -> io::Result<Self> {
        let (sender, receiver) = bounded(CHANNEL_CAPACITY);
        thread::Builder::new()
            .name("ctp-reader".into())
            .spawn(move || read_loop(source, sender))?;
        Ok(Self { receiver })
    }

    pub fn receiver(&self) -> &Receiver<ReadEvent> {
        &self.receiver
    }
}

/// Open the sensor character device for reading.
pub fn open_input(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

fn read_loop<R: Read>(mut source: R, sender: Sender<ReadEvent>) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let event = match source.read(&mut buf) {
            Ok(0) => ReadEvent::Closed,
            Ok(n) => ReadEvent::Data(buf[..n].to_vec()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => ReadEvent::Failed(e),
        };

        let last = !matches!(event, ReadEvent::Data(_));
        if sender.send(event).is_err() || last {
            break;
        }
    }
    tracing::debug!("reader thread finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    struct FailingSource;

    impl Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "link down"))
        }
    }

    #[test]
    fn test_chunks_then_closed() {
        let data: Vec<u8> = (0..4000u32).map(|b| b as u8).collect();
        let reader = ByteReader::spawn(Cursor::new(data.clone())).unwrap();

        let mut received = Vec::new();
        loop {
            match reader.receiver().recv().unwrap() {
                ReadEvent::Data(chunk) => {
                    assert!(chunk.len() <= READ_BUF_SIZE);
                    received.extend(chunk);
                }
                ReadEvent::Closed => break,
                ReadEvent::Failed(e) => panic!("unexpected error {e}"),
            }
        }
        assert_eq!(received, data);
    }

    #[test]
    fn test_read_error_is_forwarded() {
        let reader = ByteReader::spawn(FailingSource).unwrap();
        match reader.receiver().recv().unwrap() {
            ReadEvent::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_open_missing_device() {
        assert!(open_input(Path::new("/nonexistent/ctp_uart")).is_err());
    }
}
