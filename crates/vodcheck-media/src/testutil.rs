//! Synthetic stream writers for tests.
//!
//! Compiled for this crate's own tests and, with the `testutil` feature,
//! for downstream crates' tests.

use bytes::{BufMut, BytesMut};
use std::collections::HashMap;

use crate::ts::PACKET_SIZE;

/// Encode a 33-bit PES timestamp with the given 4-bit prefix.
pub fn encode_timestamp(prefix: u8, ts: i64) -> [u8; 5] {
    let ts = ts as u64;
    [
        (prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
        (ts >> 22) as u8,
        (((ts >> 15) as u8 & 0x7F) << 1) | 1,
        (ts >> 7) as u8,
        ((ts as u8 & 0x7F) << 1) | 1,
    ]
}

/// One ADTS frame of `len` bytes (header included).
pub fn adts_frame(len: usize) -> Vec<u8> {
    let mut f = vec![0x11u8; len];
    f[0] = 0xFF;
    f[1] = 0xF1;
    f[2] = 0x50;
    f[3] = 0x80 | ((len >> 11) & 0x03) as u8;
    f[4] = ((len >> 3) & 0xFF) as u8;
    f[5] = (((len & 0x07) << 5) as u8) | 0x1F;
    f[6] = 0xFC;
    f
}

/// Writes 188-byte transport packets with correct continuity counters.
#[derive(Default)]
pub struct TsWriter {
    buf: BytesMut,
    counters: HashMap<u16, u8>,
}

impl TsWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `data` into packets on `pid`, stuffing the last one through the
    /// adaptation field.
    pub fn packetize(&mut self, pid: u16, data: &[u8]) {
        let mut first = true;
        let mut rest = data;
        loop {
            let take = rest.len().min(184);
            let chunk = &rest[..take];
            rest = &rest[take..];

            let cc = self.counters.entry(pid).or_insert(0);
            let counter = *cc;
            *cc = (*cc + 1) & 0x0F;

            let start = self.buf.len();
            self.buf.put_u8(0x47);
            self.buf
                .put_u8(((first as u8) << 6) | ((pid >> 8) as u8 & 0x1F));
            self.buf.put_u8(pid as u8);
            if chunk.len() < 184 {
                let af_len = 183 - chunk.len();
                self.buf.put_u8(0x30 | counter);
                self.buf.put_u8(af_len as u8);
                if af_len > 0 {
                    self.buf.put_u8(0x00);
                    self.buf.put_bytes(0xFF, af_len - 1);
                }
            } else {
                self.buf.put_u8(0x10 | counter);
            }
            self.buf.put_slice(chunk);
            debug_assert_eq!(self.buf.len() - start, PACKET_SIZE);

            first = false;
            if rest.is_empty() {
                break;
            }
        }
    }

    pub fn pat(&mut self, pmt_pid: u16) {
        let mut s = BytesMut::new();
        s.put_u8(0);
        s.put_u8(0x00);
        s.put_u16(0xB000 | 13);
        s.put_u16(1);
        s.put_u8(0xC1);
        s.put_u8(0);
        s.put_u8(0);
        s.put_u16(1);
        s.put_u16(0xE000 | pmt_pid);
        s.put_u32(0);
        self.packetize(0, &s);
    }

    pub fn pmt(&mut self, pmt_pid: u16, video_pid: u16, audio_pid: Option<u16>) {
        let entries = if audio_pid.is_some() { 2 } else { 1 };
        let mut s = BytesMut::new();
        s.put_u8(0);
        s.put_u8(0x02);
        s.put_u16(0xB000 | (13 + 5 * entries));
        s.put_u16(1);
        s.put_u8(0xC1);
        s.put_u8(0);
        s.put_u8(0);
        s.put_u16(0xE000 | video_pid);
        s.put_u16(0xF000);
        s.put_u8(0x1B);
        s.put_u16(0xE000 | video_pid);
        s.put_u16(0xF000);
        if let Some(pid) = audio_pid {
            s.put_u8(0x0F);
            s.put_u16(0xE000 | pid);
            s.put_u16(0xF000);
        }
        s.put_u32(0);
        self.packetize(pmt_pid, &s);
    }

    /// A video PES holding one access unit: AUD, then an IDR or non-IDR
    /// slice padded to `size` bytes.
    pub fn video_frame(&mut self, pid: u16, pts: i64, dts: i64, idr: bool, size: usize) {
        let mut pes = BytesMut::new();
        pes.put_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 10]);
        pes.put_slice(&encode_timestamp(0x3, pts));
        pes.put_slice(&encode_timestamp(0x1, dts));
        pes.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x09, 0xF0]);
        pes.put_slice(&[0x00, 0x00, 0x00, 0x01, if idr { 0x65 } else { 0x41 }]);
        pes.put_bytes(0xAB, size);
        self.packetize(pid, &pes);
    }

    /// An audio PES with `frames` ADTS frames of `frame_len` bytes each.
    pub fn audio_pes(&mut self, pid: u16, pts: i64, frames: usize, frame_len: usize) {
        let mut pes = BytesMut::new();
        pes.put_slice(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x00, 0x80, 0x80, 5]);
        pes.put_slice(&encode_timestamp(0x2, pts));
        for _ in 0..frames {
            pes.put_slice(&adts_frame(frame_len));
        }
        self.packetize(pid, &pes);
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn build(self) -> Vec<u8> {
        self.buf.to_vec()
    }
}

/// One mux packet: header, `payload_len` payload bytes, trailer.
pub fn mux_packet(
    tag_type: u8,
    packet_type: u8,
    timestamp: i64,
    composition_offset: i32,
    payload_len: usize,
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    buf.put_u8(tag_type);
    buf.put_uint(payload_len as u64, 3);
    buf.put_uint((timestamp & 0x00FF_FFFF) as u64, 3);
    buf.put_u8((timestamp >> 24) as u8);
    buf.put_uint(0, 3);

    let mut payload = vec![0x55u8; payload_len];
    if payload_len >= 2 {
        payload[0] = if tag_type == 9 { 0x17 } else { 0xAF };
        payload[1] = packet_type;
    }
    if tag_type == 9 && payload_len >= 5 {
        let cto = (composition_offset as u32).to_be_bytes();
        payload[2..5].copy_from_slice(&cto[1..4]);
    }
    buf.put_slice(&payload);
    buf.put_u32((11 + payload_len) as u32);
    buf.to_vec()
}

/// A bootstrap blob in the packager's layout: empty strings, one segment run
/// entry and one fragment run table holding `records`.
pub fn bootstrap_blob(
    media_time: u64,
    fragments_per_segment: u32,
    records: &[(u32, u64, u32)],
) -> Vec<u8> {
    let mut afrt = BytesMut::new();
    afrt.put_u32(0);
    afrt.put_u32(1000);
    afrt.put_u8(0);
    afrt.put_u32(records.len() as u32);
    for &(first, timestamp, duration) in records {
        afrt.put_u32(first);
        afrt.put_u64(timestamp);
        afrt.put_u32(duration);
        if duration == 0 {
            afrt.put_u8(0);
        }
    }

    let mut body = BytesMut::new();
    body.put_u32(0);
    body.put_u32(1);
    body.put_u8(0);
    body.put_u32(1000);
    body.put_u64(media_time);
    body.put_u64(0);
    body.put_u8(0); // movie identifier
    body.put_u8(0); // server entries
    body.put_u8(0); // quality entries
    body.put_u8(0); // drm
    body.put_u8(0); // metadata
    body.put_u8(1);
    body.put_u32(25);
    body.put_slice(b"asrt");
    body.put_u32(0);
    body.put_u8(0);
    body.put_u32(1);
    body.put_u32(1);
    body.put_u32(fragments_per_segment);
    body.put_u8(1);
    body.put_u32((8 + afrt.len()) as u32);
    body.put_slice(b"afrt");
    body.put_slice(&afrt);

    let mut blob = BytesMut::new();
    blob.put_u32((8 + body.len()) as u32);
    blob.put_slice(b"abst");
    blob.put_slice(&body);
    blob.to_vec()
}

/// A plain 32-bit-size box.
pub fn make_box(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(8 + payload.len());
    buf.put_u32((8 + payload.len()) as u32);
    buf.put_slice(tag);
    buf.put_slice(payload);
    buf.to_vec()
}

/// AES-128-CBC encrypt with PKCS#7 padding, the inverse of
/// [`decrypt_segment`](crate::decrypt_segment).
pub fn encrypt_segment(plain: &[u8], key: &[u8; 16], iv: &[u8; 16]) -> Vec<u8> {
    use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};

    cbc::Encryptor::<aes::Aes128>::new(key.into(), iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
}
