use std::{
    pin::Pin,
    task::{
        Context,
        Poll,
    },
};

use futures_util::Stream;
use pin_project_lite::pin_project;
use tokio::io::{
    AsyncRead,
    ReadBuf,
};

use crate::{
    Counters,
    Decoder,
    Error,
    Frame,
};

/// this can be larger for more efficient reads, although the underlying
/// reader is probably buffered.
const RECEIVE_BUFFER_SIZE: usize = 1024;

pin_project! {
    /// Decodes frames from any [`AsyncRead`] byte stream.
    ///
    /// The stream ends when the underlying reader reaches EOF; read errors
    /// are passed through. Both leave the decoder state intact, but a
    /// `Reader` is cheap and a new connection should get a fresh one.
    #[derive(Debug)]
    pub struct Reader<R> {
        #[pin]
        reader: R,
        receive_buffer: ReceiveBuffer,
        decoder: Decoder,
    }
}

impl<R> Reader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            receive_buffer: Default::default(),
            decoder: Default::default(),
        }
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        self.decoder.counters_mut()
    }
}

impl<R: AsyncRead> Stream for Reader<R> {
    type Item = Result<Frame, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            let this = self.as_mut().project();

            if this.receive_buffer.has_data() {
                while let Some(byte) = this.receive_buffer.next_byte() {
                    if let Some(frame) = this.decoder.push(byte) {
                        return Poll::Ready(Some(Ok(frame)));
                    }
                }
            }
            else {
                // buffer is drained, receive more
                this.receive_buffer.reset();

                let mut read_buf = ReadBuf::new(&mut this.receive_buffer.buffer);
                match this.reader.poll_read(cx, &mut read_buf) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(error)) => return Poll::Ready(Some(Err(error.into()))),
                    Poll::Ready(Ok(())) => {
                        let num_bytes_read = read_buf.filled().len();

                        // if no data was received, the underlying reader
                        // reached EOF
                        if num_bytes_read == 0 {
                            return Poll::Ready(None);
                        }

                        this.receive_buffer.write_pos = num_bytes_read;
                        this.decoder.counters_mut().socket_reads += 1;
                        this.decoder.counters_mut().bytes_read += num_bytes_read as u64;
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct ReceiveBuffer {
    buffer: [u8; RECEIVE_BUFFER_SIZE],
    read_pos: usize,
    write_pos: usize,
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self {
            buffer: [0; RECEIVE_BUFFER_SIZE],
            read_pos: 0,
            write_pos: 0,
        }
    }
}

impl ReceiveBuffer {
    #[inline(always)]
    fn has_data(&self) -> bool {
        self.read_pos < self.write_pos
    }

    #[inline(always)]
    fn reset(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    #[inline(always)]
    fn next_byte(&mut self) -> Option<u8> {
        self.has_data().then(|| {
            let byte = self.buffer[self.read_pos];
            self.read_pos += 1;
            byte
        })
    }
}
