use bytes::{
    BufMut,
    Bytes,
    BytesMut,
};

use crate::{
    MLAT_LEN,
    MODE_S_LONG_LEN,
    authtag::Signer,
};

/// key + timestamp + sequence + opcode.
pub const HEADER_LEN: usize = 8 + 8 + 4 + 1;

/// Message types understood by the aggregator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    ModeAc = 0x01,
    ModeSShort = 0x02,
    ModeSExtended = 0x03,
    Multiframe = 0x04,
    Keepalive = 0x80,
    Telemetry = 0x81,
    RadioStats = 0x82,
}

/// Build one complete datagram: header, opcode-specific body, tag.
///
/// `body` writes the body for `opcode` onto the buffer; the tag is then
/// computed over header and body together and appended. The result is
/// ready to hand to the socket in one piece.
pub fn seal(
    key: u64,
    ts_us: u64,
    seq: u32,
    opcode: Opcode,
    signer: &Signer,
    body: impl FnOnce(&mut BytesMut),
) -> Bytes {
    let mut buf = BytesMut::with_capacity(768);
    buf.put_u64_le(key);
    buf.put_u64_le(ts_us);
    buf.put_u32_le(seq);
    buf.put_u8(opcode as u8);

    body(&mut buf);

    let tag = signer.sign(&buf);
    buf.put_slice(&tag);
    buf.freeze()
}

/// One extended squitter as carried in message bodies: timestamp, signal
/// level, payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EsRecord {
    pub mlat: [u8; MLAT_LEN],
    pub rssi: u8,
    pub data: [u8; MODE_S_LONG_LEN],
}

impl EsRecord {
    pub const WIRE_LEN: usize = MLAT_LEN + 1 + MODE_S_LONG_LEN;

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_slice(&self.mlat);
        buf.put_u8(self.rssi);
        buf.put_slice(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        Signer,
        authtag::TAG_LEN,
        envelope::{
            EsRecord,
            HEADER_LEN,
            Opcode,
            seal,
        },
    };

    #[test]
    fn it_lays_out_the_envelope_little_endian() {
        let signer = Signer::new(b"secret");
        let mlat = hex::decode("010203040506").unwrap();
        let payload = hex::decode("8d4840d6202cc371c32ce0576098").unwrap();

        let datagram = seal(
            0x0123456789abcdef,
            0x0102030405060708,
            42,
            Opcode::ModeSExtended,
            &signer,
            |buf| {
                let record = EsRecord {
                    mlat: mlat.as_slice().try_into().unwrap(),
                    rssi: 0xc8,
                    data: payload.as_slice().try_into().unwrap(),
                };
                record.encode(buf);
            },
        );

        assert_eq!(datagram.len(), HEADER_LEN + EsRecord::WIRE_LEN + TAG_LEN);
        assert_eq!(&datagram[0..8], &hex::decode("efcdab8967452301").unwrap()[..]);
        assert_eq!(&datagram[8..16], &hex::decode("0807060504030201").unwrap()[..]);
        assert_eq!(&datagram[16..20], &[42, 0, 0, 0]);
        assert_eq!(datagram[20], 0x03);
        assert_eq!(&datagram[21..27], &mlat[..]);
        assert_eq!(datagram[27], 0xc8);
        assert_eq!(&datagram[28..42], &payload[..]);

        let (message, tag) = datagram.split_at(datagram.len() - TAG_LEN);
        assert!(signer.verify(message, tag));
    }

    #[test]
    fn the_tag_covers_header_and_body() {
        let signer = Signer::new(b"secret");
        let datagram = seal(1, 2, 3, Opcode::Keepalive, &signer, |buf| {
            buf.extend_from_slice(&[0, 1, 0]);
        });

        let (message, tag) = datagram.split_at(datagram.len() - TAG_LEN);
        for i in 0..message.len() {
            let mut altered = message.to_vec();
            altered[i] ^= 0x01;
            assert!(!signer.verify(&altered, tag), "byte {i}");
        }
    }
}
