use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder};
use log::warn;
use thiserror::Error;

/// Exact byte length of an `.ot` slice settings file.
///
/// The format is a packed big-endian record with fixed field offsets; any
/// other file length means the file is not this format (or is truncated)
/// and is rejected outright rather than partially read.
pub const OT_FILE_SIZE: usize = 832;

/// Capacity of the on-disk slice table. Only the first `slice_count`
/// entries are meaningful; the rest are stale machine state.
pub const MAX_SLICES: usize = 64;

/// Magic bytes at the start of every slice settings file
/// (`FORM....DPS1SMPA`).
pub const HEADER_BYTES: [u8; 16] = [
    0x46, 0x4F, 0x52, 0x4D, 0x00, 0x00, 0x00, 0x00, 0x44, 0x50, 0x53, 0x31, 0x53, 0x4D, 0x50,
    0x41,
];

/// Offset of the first byte covered by the checksum.
const CHECKSUM_START: usize = 0x10;
/// Offset of the checksum field itself (last two bytes of the file).
const CHECKSUM_OFFSET: usize = OT_FILE_SIZE - 2;

/// Errors that can occur while loading a slice settings file.
#[derive(Debug, Error)]
pub enum OtSoxError {
    /// The file length does not match the fixed record layout.
    #[error("'{}' is not a valid .ot file: expected {} bytes, found {found}", .path.display(), OT_FILE_SIZE)]
    SizeMismatch {
        /// Path of the offending file.
        path: PathBuf,
        /// Actual length reported by the filesystem.
        found: u64,
    },

    /// Wrapper around IO errors encountered while reading the file.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The header magic does not match [`HEADER_BYTES`]. Strict mode only.
    #[error("header magic does not match a slice settings file")]
    BadHeader,

    /// The declared slice count exceeds the table capacity. Strict mode only.
    #[error("slice count {count} exceeds the {max}-entry slice table", max = MAX_SLICES)]
    SliceCountOutOfRange {
        /// The count as read from the file.
        count: u32,
    },

    /// The stored checksum does not match the file contents. Strict mode only.
    #[error("checksum mismatch: file says {stored:#06x}, contents sum to {computed:#06x}")]
    ChecksumMismatch {
        /// Checksum read from the file.
        stored: u16,
        /// Checksum recomputed over the file contents.
        computed: u16,
    },
}

/// Timestretch setting. Decoded for completeness, not used for chopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StretchMode {
    Off,
    Normal,
    Beat,
}

impl StretchMode {
    /// Decode the on-disk value; unknown values yield `None` rather than an
    /// error, matching the lenient loader.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(StretchMode::Off),
            2 => Some(StretchMode::Normal),
            3 => Some(StretchMode::Beat),
            _ => None,
        }
    }
}

/// Loop behaviour of the whole take.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    Off,
    Normal,
    PingPong,
}

impl LoopMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(LoopMode::Off),
            1 => Some(LoopMode::Normal),
            2 => Some(LoopMode::PingPong),
            _ => None,
        }
    }
}

/// Slice trigger quantization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QuantizeMode {
    /// Triggers quantize to the pattern length.
    PatternLength,
    /// Triggers fire immediately.
    Direct,
    /// Triggers quantize to a fixed number of sequencer steps.
    Steps(u16),
}

impl QuantizeMode {
    /// Decode the on-disk value. Raw values 1 through 16 select a step grid
    /// from the machine's fixed subdivision table.
    pub fn from_raw(raw: u8) -> Option<Self> {
        const STEP_TABLE: [u16; 16] = [
            1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 128, 192, 256,
        ];
        match raw {
            0x00 => Some(QuantizeMode::PatternLength),
            0xFF => Some(QuantizeMode::Direct),
            1..=16 => Some(QuantizeMode::Steps(STEP_TABLE[raw as usize - 1])),
            _ => None,
        }
    }
}

/// One chop boundary in the slice table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Slice {
    start_point: u32,
    end_point: u32,
    loop_point: u32,
}

/// One slice paired with its 0-based position in the table.
///
/// The index determines the output filename suffix downstream, so ordering
/// is part of the contract: [`OtFile::slices`] yields these strictly in
/// on-disk order. Offsets are in the sample domain and are passed through
/// unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SliceDescriptor {
    /// Position in the slice table.
    pub index: usize,
    /// Sample offset where the slice begins.
    pub start_point: u32,
    /// Sample offset where the slice ends.
    pub end_point: u32,
    /// Internal loop point of the slice; preserved but not used for chopping.
    pub loop_point: u32,
}

/// A fully decoded slice settings file.
///
/// Every multi-byte field is stored big-endian on disk; [`load`] converts
/// them all to native order in a single pass, so nothing downstream ever
/// touches raw bytes. The record is immutable after load.
///
/// The slice table is deliberately not public: all access goes through
/// [`OtFile::slices`], which enforces the `slice_count` bound.
#[derive(Clone, Debug)]
pub struct OtFile {
    /// Magic bytes; see [`HEADER_BYTES`]. Checked only by [`OtFile::validate`].
    pub header: [u8; 16],
    /// Tempo in BPM multiplied by 24.
    pub tempo: u32,
    /// Trim length multiplied by 100.
    pub trim_len: u32,
    /// Loop length multiplied by 100.
    pub loop_len: u32,
    /// Raw timestretch setting; see [`StretchMode::from_raw`].
    pub stretch: u32,
    /// Raw loop setting; see [`LoopMode::from_raw`].
    pub loop_mode: u32,
    /// Linear gain. 0x30 is 0 dB, 0x00 is -24 dB, 0x60 is +24 dB.
    pub gain: u16,
    /// Raw trigger quantization; see [`QuantizeMode::from_raw`].
    pub quantize: u8,
    /// First sample of the trimmed take.
    pub trim_start: u32,
    /// Last sample of the trimmed take.
    pub trim_end: u32,
    /// Loop point of the whole take, in samples.
    pub loop_point: u32,
    slices: [Slice; MAX_SLICES],
    /// Number of valid entries in the slice table, as declared by the file.
    pub slice_count: u32,
    /// Stored checksum. Parsed but only verified by [`OtFile::validate`].
    pub checksum: u16,
    computed_checksum: u16,
}

impl OtFile {
    fn decode(raw: &[u8; OT_FILE_SIZE]) -> OtFile {
        let mut header = [0u8; 16];
        header.copy_from_slice(&raw[0x00..0x10]);
        // 7 reserved bytes at 0x10 sit between the header and the tempo.

        let mut slices = [Slice::default(); MAX_SLICES];
        for (i, slice) in slices.iter_mut().enumerate() {
            let at = 0x3A + i * 12;
            slice.start_point = BigEndian::read_u32(&raw[at..]);
            slice.end_point = BigEndian::read_u32(&raw[at + 4..]);
            slice.loop_point = BigEndian::read_u32(&raw[at + 8..]);
        }

        let slice_count = BigEndian::read_u32(&raw[0x33A..]);
        if slice_count as usize > MAX_SLICES {
            warn!(
                "slice count {slice_count} exceeds the {MAX_SLICES}-entry table, \
                 extra entries will be ignored"
            );
        }

        OtFile {
            header,
            tempo: BigEndian::read_u32(&raw[0x17..]),
            trim_len: BigEndian::read_u32(&raw[0x1B..]),
            loop_len: BigEndian::read_u32(&raw[0x1F..]),
            stretch: BigEndian::read_u32(&raw[0x23..]),
            loop_mode: BigEndian::read_u32(&raw[0x27..]),
            gain: BigEndian::read_u16(&raw[0x2B..]),
            quantize: raw[0x2D],
            trim_start: BigEndian::read_u32(&raw[0x2E..]),
            trim_end: BigEndian::read_u32(&raw[0x32..]),
            loop_point: BigEndian::read_u32(&raw[0x36..]),
            slices,
            slice_count,
            checksum: BigEndian::read_u16(&raw[CHECKSUM_OFFSET..]),
            computed_checksum: checksum_of(raw),
        }
    }

    /// Tempo in beats per minute.
    pub fn bpm(&self) -> f64 {
        f64::from(self.tempo) / 24.0
    }

    /// Gain in decibels. The stored value moves in half-dB steps around the
    /// 0x30 reference point.
    pub fn gain_db(&self) -> f64 {
        (f64::from(self.gain) - 48.0) / 2.0
    }

    /// Number of usable slices: the declared count clamped to the table
    /// capacity.
    pub fn valid_slices(&self) -> usize {
        (self.slice_count as usize).min(MAX_SLICES)
    }

    /// Iterate the usable entries of the slice table in on-disk order.
    ///
    /// Yields exactly [`OtFile::valid_slices`] descriptors; entries at or
    /// beyond the declared count are never exposed.
    pub fn slices(&self) -> impl Iterator<Item = SliceDescriptor> + '_ {
        self.slices[..self.valid_slices()]
            .iter()
            .enumerate()
            .map(|(index, slice)| SliceDescriptor {
                index,
                start_point: slice.start_point,
                end_point: slice.end_point,
                loop_point: slice.loop_point,
            })
    }

    /// Stricter checks than the lenient loader performs: header magic,
    /// slice count bound, and checksum.
    ///
    /// The checksum is the 16-bit wrapping sum of every byte after the
    /// header up to the checksum field, which is how the machine computes
    /// it when writing.
    pub fn validate(&self) -> Result<(), OtSoxError> {
        if self.header != HEADER_BYTES {
            return Err(OtSoxError::BadHeader);
        }
        if self.slice_count as usize > MAX_SLICES {
            return Err(OtSoxError::SliceCountOutOfRange {
                count: self.slice_count,
            });
        }
        if self.checksum != self.computed_checksum {
            return Err(OtSoxError::ChecksumMismatch {
                stored: self.checksum,
                computed: self.computed_checksum,
            });
        }
        Ok(())
    }
}

fn checksum_of(raw: &[u8; OT_FILE_SIZE]) -> u16 {
    raw[CHECKSUM_START..CHECKSUM_OFFSET]
        .iter()
        .fold(0u16, |sum, &byte| sum.wrapping_add(u16::from(byte)))
}

/// Load and decode the slice settings file at `path`.
///
/// The file length is compared against the fixed layout before any content
/// is read; a mismatch is a [`OtSoxError::SizeMismatch`], never a partial
/// read. Errors are per-file and recoverable: a caller iterating many files
/// can report the failure and move on.
pub fn load<P: AsRef<Path>>(path: P) -> Result<OtFile, OtSoxError> {
    let path = path.as_ref();

    let len = fs::metadata(path)?.len();
    if len != OT_FILE_SIZE as u64 {
        return Err(OtSoxError::SizeMismatch {
            path: path.to_path_buf(),
            found: len,
        });
    }

    let mut raw = [0u8; OT_FILE_SIZE];
    File::open(path)?.read_exact(&mut raw)?;

    Ok(OtFile::decode(&raw))
}
