//! MPEG transport stream parsing.
//!
//! - `packet` - 188-byte packet header and adaptation field
//! - `psi` - PAT/PMT sections
//! - `pes` - PES header timestamps, ADTS frame counting
//! - `demux` - single-pass demultiplexer producing a [`TsSummary`]

mod demux;
mod packet;
mod pes;
mod psi;

pub use demux::{demux, AccessUnit, ContinuityError, PesStream, PesUnit, TsSummary};
pub use packet::{PacketHeader, NULL_PID, PACKET_SIZE, PAT_PID, SYNC_BYTE};
pub use pes::{count_adts_frames, read_timestamp, PesHeader};
pub use psi::{parse_pat, parse_pmt, PmtStream, STREAM_TYPE_AVC};
