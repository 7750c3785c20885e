use crate::{
    ESCAPE,
    Frame,
    MAX_FRAME,
    is_frame_type,
};

/// Stream health counters.
///
/// `socket_reads` and `bytes_read` are maintained by [`Reader`], the frame
/// counters by [`Decoder`]. A bad frame is one abandoned by the decoder:
/// an empty body at end-of-frame, or an overflow of the frame buffer.
///
/// [`Reader`]: crate::Reader
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counters {
    pub socket_reads: u64,
    pub bytes_read: u64,
    pub frames_good: u64,
    pub frames_bad: u64,
}

impl Counters {
    /// Returns the counters accumulated since the last call and resets
    /// them to zero.
    pub fn take(&mut self) -> Counters {
        std::mem::take(self)
    }
}

#[derive(Clone, Copy, Debug)]
enum State {
    /// Discarding input until the next escape.
    Hunt,
    /// Read an escape, expecting a frame type byte.
    AwaitType,
    /// Inside a frame body.
    Body,
    /// Read an escape inside a frame body.
    Escape,
}

/// Incremental frame decoder.
///
/// Fed one byte at a time; a completed data frame is returned from the
/// byte that terminates it. The decoder never fails: anything it can't
/// make sense of puts it back into hunt mode looking for the next escape.
#[derive(Debug)]
pub struct Decoder {
    state: State,
    buf: [u8; MAX_FRAME],
    len: usize,
    counters: Counters,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            state: State::Hunt,
            buf: [0; MAX_FRAME],
            len: 0,
            counters: Counters::default(),
        }
    }
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut Counters {
        &mut self.counters
    }

    /// Feed a chunk of raw stream input, yielding any frames completed by
    /// it. Decoding state carries over between chunks, so input may be
    /// split at arbitrary points.
    pub fn feed<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = Frame> + 'a {
        bytes.iter().filter_map(move |&byte| self.push(byte))
    }

    /// Advance the decoder by one input byte.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            State::Hunt => {
                if byte == ESCAPE {
                    self.state = State::AwaitType;
                }
            }
            State::AwaitType => {
                if is_frame_type(byte) {
                    self.len = 0;
                    self.push_byte(byte);
                    self.state = State::Body;
                }
                else {
                    // includes a doubled escape: that can't start a frame
                    self.state = State::Hunt;
                }
            }
            State::Body => {
                if byte == ESCAPE {
                    self.state = State::Escape;
                }
                else if !self.push_byte(byte) {
                    self.overflow();
                }
            }
            State::Escape => {
                if byte == ESCAPE {
                    // escaped escape, part of the body
                    if self.push_byte(ESCAPE) {
                        self.state = State::Body;
                    }
                    else {
                        self.overflow();
                    }
                }
                else if self.len == 0 {
                    self.counters.frames_bad += 1;
                    self.state = State::Hunt;
                }
                else {
                    // end of frame: the byte after the escape is either the
                    // type of the next frame or arbitrary stream content
                    let frame = self.complete_frame();

                    if is_frame_type(byte) {
                        self.push_byte(byte);
                        self.state = State::Body;
                    }
                    else {
                        self.state = State::AwaitType;
                    }

                    return frame;
                }
            }
        }

        None
    }

    fn push_byte(&mut self, byte: u8) -> bool {
        if self.len == MAX_FRAME {
            return false;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        true
    }

    /// Oversized frame: throw it away and resynchronize.
    fn overflow(&mut self) {
        self.len = 0;
        self.counters.frames_bad += 1;
        self.state = State::Hunt;
    }

    fn complete_frame(&mut self) -> Option<Frame> {
        let buf = &self.buf[..self.len];
        self.counters.frames_good += 1;

        let frame = Frame::from_buffer(buf);
        tracing::trace!(?buf, accepted = frame.is_some(), "frame");

        self.len = 0;
        frame
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Decoder,
        ESCAPE,
        Frame,
        FrameData,
        MlatTimestamp,
        SignalLevel,
    };

    /// Escape-encode one frame. A frame on the wire only ends where the
    /// next one begins, so tests append [`terminator`] after the last one.
    fn encode(frame_type: u8, mlat: &[u8; 6], rssi: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![ESCAPE, frame_type];
        for &byte in mlat.iter().chain([rssi].iter()).chain(payload) {
            out.push(byte);
            if byte == ESCAPE {
                out.push(ESCAPE);
            }
        }
        out
    }

    fn terminator() -> Vec<u8> {
        vec![ESCAPE, 0x31]
    }

    fn collect(input: &[u8]) -> (Vec<Frame>, Decoder) {
        let mut decoder = Decoder::new();
        let frames = decoder.feed(input).collect();
        (frames, decoder)
    }

    #[test]
    fn it_decodes_a_long_squitter() {
        let payload = [
            0x8d, 0x48, 0x40, 0xd6, 0x20, 0x2c, 0xc3, 0x71, 0xc3, 0x2c, 0xe0, 0x57, 0x60, 0x98,
        ];
        let mut input = encode(0x33, &[1, 2, 3, 4, 5, 6], 0xc8, &payload);
        input.extend(terminator());

        let (frames, decoder) = collect(&input);
        assert_eq!(
            frames,
            vec![Frame {
                timestamp: MlatTimestamp([1, 2, 3, 4, 5, 6]),
                signal: SignalLevel(0xc8),
                data: FrameData::ModeSLong(payload),
            }]
        );
        assert_eq!(decoder.counters().frames_good, 1);
        assert_eq!(decoder.counters().frames_bad, 0);
    }

    #[test]
    fn it_unescapes_escapes_in_the_body() {
        let mut payload = [0u8; 14];
        payload[..8].copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        payload[8] = ESCAPE;
        payload[9..].copy_from_slice(&[0xa, 0xb, 0xc, 0xd, 0xe]);

        let mut input = encode(0x33, &[1, 2, 3, 4, 5, 6], 0xc8, &payload);
        input.extend(terminator());

        let (frames, _) = collect(&input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.payload()[8], ESCAPE);
    }

    #[test]
    fn it_decodes_back_to_back_frames() {
        let mut input = encode(0x31, &[0; 6], 10, &[0x20, 0x05]);
        input.extend(encode(0x32, &[0; 6], 20, &[0x5d; 7]));
        input.extend(encode(0x33, &[0; 6], 30, &[0x8d; 14]));
        input.extend(terminator());

        let (frames, decoder) = collect(&input);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].data, FrameData::ModeAc([0x20, 0x05]));
        assert_eq!(frames[1].data, FrameData::ModeSShort([0x5d; 7]));
        assert_eq!(frames[2].data, FrameData::ModeSLong([0x8d; 14]));
        assert_eq!(decoder.counters().frames_good, 3);
    }

    #[test]
    fn it_recovers_valid_frames_from_garbage() {
        let mut input = vec![0x00, 0xff, 0x47, 0x11];
        input.extend(encode(0x32, &[9; 6], 20, &[0x28; 7]));
        // a lone escape and a non-type byte end the frame and force a resync
        input.extend([ESCAPE, 0x99, 0xde, 0xad, 0xbe, 0xef]);
        input.extend(encode(0x33, &[7; 6], 40, &[0x8f; 14]));
        input.extend(terminator());

        let (frames, _) = collect(&input);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data, FrameData::ModeSShort([0x28; 7]));
        assert_eq!(frames[1].data, FrameData::ModeSLong([0x8f; 14]));
    }

    #[test]
    fn it_drops_frames_with_unknown_payload_lengths() {
        // correct framing, but an 11 byte payload matches no message class
        let mut input = encode(0x33, &[0; 6], 0, &[0x55; 11]);
        input.extend(terminator());

        let (frames, decoder) = collect(&input);
        assert!(frames.is_empty());
        // it still framed correctly, so it doesn't count as bad
        assert_eq!(decoder.counters().frames_good, 1);
        assert_eq!(decoder.counters().frames_bad, 0);
    }

    #[test]
    fn it_resets_on_oversized_frames() {
        let mut input = vec![ESCAPE, 0x33];
        input.extend([0x42; 64]);
        input.extend(encode(0x32, &[3; 6], 50, &[0x5d; 7]));
        input.extend(terminator());

        let (frames, decoder) = collect(&input);
        assert_eq!(decoder.counters().frames_bad, 1);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, FrameData::ModeSShort([0x5d; 7]));
    }

    #[test]
    fn it_survives_arbitrary_chunking() {
        let mut input = encode(0x33, &[1; 6], 1, &[ESCAPE; 14]);
        input.extend(encode(0x32, &[2; 6], 2, &[0x5d; 7]));
        input.extend(terminator());

        let (whole, _) = collect(&input);
        assert_eq!(whole.len(), 2);

        for chunk_size in 1..input.len() {
            let mut decoder = Decoder::new();
            let mut frames = Vec::new();
            for chunk in input.chunks(chunk_size) {
                frames.extend(decoder.feed(chunk));
            }
            assert_eq!(frames, whole, "chunk size {chunk_size}");
        }
    }
}
