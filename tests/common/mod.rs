//! Shared fixtures for integration tests.
//!
//! Builds synthetic assets (playlists, transport-stream segments, box
//! fragments) and serves them from a [`StaticFetcher`].

#![allow(dead_code)]

use std::sync::Arc;

use bytes::{BufMut, BytesMut};
use vodcheck::config::Config;
use vodcheck::{Report, Verifier};
use vodcheck_manifest::StaticFetcher;
use vodcheck_media::testutil::{make_box, mux_packet, TsWriter};
use tokio_util::sync::CancellationToken;

pub const HLS: &str = "application/vnd.apple.mpegurl";
pub const TS: &str = "video/mp2t";
pub const MP4: &str = "video/mp4";

/// Video frame spacing in 90 kHz ticks (25 fps).
pub const FRAME_TICKS: i64 = 3600;
/// Frames per transport-stream segment.
pub const FRAMES: i64 = 10;
/// Duration of one transport-stream segment in 90 kHz ticks.
pub const SEGMENT_TICKS: i64 = FRAME_TICKS * FRAMES;

/// A transport-stream segment of [`FRAMES`] video frames starting at `pts`,
/// with an IDR frame every five frames.
pub fn ts_segment(pts: i64) -> Vec<u8> {
    let mut w = TsWriter::new();
    w.pat(0x1000);
    w.pmt(0x1000, 0x100, None);
    for i in 0..FRAMES {
        let t = pts + i * FRAME_TICKS;
        w.video_frame(0x100, t, t, i % 5 == 0, 300);
    }
    w.build()
}

/// A single-track `moof` + `mdat` fragment starting at `base_time` with
/// `samples` samples of `duration` ticks each.
pub fn box_fragment(base_time: u64, samples: u32, duration: u32) -> Vec<u8> {
    let mut tfhd = BytesMut::new();
    tfhd.put_u32(0x08);
    tfhd.put_u32(1);
    tfhd.put_u32(duration);
    let mut tfdt = BytesMut::new();
    tfdt.put_u32(0x0100_0000);
    tfdt.put_u64(base_time);
    let mut trun = BytesMut::new();
    trun.put_u32(0x001);
    trun.put_u32(samples);
    trun.put_i32(0);

    let mut traf = make_box(b"tfhd", &tfhd);
    traf.extend(make_box(b"tfdt", &tfdt));
    traf.extend(make_box(b"trun", &trun));
    let mut data = make_box(b"moof", &make_box(b"traf", &traf));
    data.extend(make_box(b"mdat", &[0u8; 32]));
    data
}

/// A bootstrap-indexed fragment: mux packets in an `mdat`, timestamps in
/// milliseconds, `frames` video frames spaced `spacing` ms apart.
pub fn mux_fragment(start_ms: i64, frames: i64, spacing: i64) -> Vec<u8> {
    let mut mdat = mux_packet(9, 0, 0, 0, 20);
    for i in 0..frames {
        mdat.extend(mux_packet(9, 1, start_ms + i * spacing, 0, 20));
    }
    let mut data = make_box(b"afra", &[0u8; 12]);
    data.extend(make_box(b"mdat", &mdat));
    data
}

/// A media playlist listing `segments` transport-stream segments.
pub fn media_playlist(segments: &[&str]) -> String {
    let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:1\n#EXT-X-MEDIA-SEQUENCE:1\n");
    for segment in segments {
        body.push_str("#EXTINF:0.4,\n");
        body.push_str(segment);
        body.push('\n');
    }
    body.push_str("#EXT-X-ENDLIST\n");
    body
}

/// Two-variant HLS asset under `http://h/`, three segments per variant.
///
/// The second variant is offset by `offset` ticks, and `perturb` shifts the
/// given `(variant, segment)` by a further amount.
pub fn hls_asset(offset: i64, perturb: Option<(usize, usize, i64)>) -> StaticFetcher {
    let master = "#EXTM3U
#EXT-X-STREAM-INF:BANDWIDTH=800000
low/index.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=1600000
high/index.m3u8
";
    let mut fetcher = StaticFetcher::new().with("http://h/master.m3u8", HLS, master);
    for (variant, dir) in ["low", "high"].into_iter().enumerate() {
        let names = ["s1.ts", "s2.ts", "s3.ts"];
        fetcher = fetcher.with(
            &format!("http://h/{}/index.m3u8", dir),
            HLS,
            media_playlist(&names),
        );
        for (segment, name) in names.iter().enumerate() {
            let mut start = 900_000 + segment as i64 * SEGMENT_TICKS + variant as i64 * offset;
            if let Some((v, s, shift)) = perturb {
                if v == variant && s == segment {
                    start += shift;
                }
            }
            fetcher = fetcher.with(&format!("http://h/{}/{}", dir, name), TS, ts_segment(start));
        }
    }
    fetcher
}

/// Run a verification with `config` against `fetcher`.
pub async fn verify(fetcher: StaticFetcher, url: &str, config: Config) -> (Report, Arc<StaticFetcher>) {
    let fetcher = Arc::new(fetcher);
    let verifier = Verifier::new(fetcher.clone(), config);
    let report = verifier
        .run(url, CancellationToken::new())
        .await
        .expect("run failed");
    (report, fetcher)
}
