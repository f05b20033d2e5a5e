//! Trace reader: one binary instruction-trace stream per CPU, with
//! transparent gzip/xz decompression via a subprocess pipe and
//! loop-on-EOF for traces shorter than the requested run length.

use std::io::{BufReader, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};

use crate::common::SimError;

const NUM_DESTINATIONS: usize = 2;
const NUM_SOURCES: usize = 4;

/// Legacy on-disk record: `ip`, branch info, register ids, and the
/// destination/source memory address arrays, with no size or
/// instruction-length fields.
const LEGACY_RECORD_SIZE: usize = 8 + 1 + 1 + NUM_DESTINATIONS + NUM_SOURCES + 8 * NUM_DESTINATIONS + 8 * NUM_SOURCES;

/// Default on-disk record: the legacy record plus per-operand memory
/// sizes and an instruction-length field (§6).
const DEFAULT_RECORD_SIZE: usize = LEGACY_RECORD_SIZE + 4 * NUM_DESTINATIONS + 4 * NUM_SOURCES + 4;

/// One decoded trace instruction. Memory operands are carried as the
/// full destination/source arrays (non-zero entries are accessed
/// addresses); the load/store queue drivers use the first non-zero
/// entry of each, since this simulator's OoO collaborator contract
/// models one outstanding memory operand per instruction.
#[derive(Debug, Clone, Copy)]
pub struct TraceInstruction {
    /// Instruction pointer.
    pub ip: u64,
    /// Destination (store) addresses; zero entries are unused.
    pub destination_memory: [u64; NUM_DESTINATIONS],
    /// Source (load) addresses; zero entries are unused.
    pub source_memory: [u64; NUM_SOURCES],
    /// Per-destination access size in bytes; absent (legacy trace) defaults to 8.
    pub destination_memory_size: [u32; NUM_DESTINATIONS],
    /// Per-source access size in bytes; absent (legacy trace) defaults to 8.
    pub source_memory_size: [u32; NUM_SOURCES],
}

impl TraceInstruction {
    /// Whether this instruction carries a load address.
    #[must_use]
    pub fn is_load(&self) -> bool {
        self.source_memory.iter().any(|&a| a != 0)
    }

    /// Whether this instruction carries a store address.
    #[must_use]
    pub fn is_store(&self) -> bool {
        self.destination_memory.iter().any(|&a| a != 0)
    }

    /// The first populated load address and its size, if any.
    #[must_use]
    pub fn first_load(&self) -> Option<(u64, u32)> {
        self.source_memory
            .iter()
            .zip(self.source_memory_size.iter())
            .find(|&(&addr, _)| addr != 0)
            .map(|(&addr, &size)| (addr, size))
    }

    /// The first populated store address and its size, if any.
    #[must_use]
    pub fn first_store(&self) -> Option<(u64, u32)> {
        self.destination_memory
            .iter()
            .zip(self.destination_memory_size.iter())
            .find(|&(&addr, _)| addr != 0)
            .map(|(&addr, &size)| (addr, size))
    }
}

fn decode_legacy(bytes: &[u8]) -> TraceInstruction {
    let ip = u64::from_le_bytes(bytes[0..8].try_into().unwrap_or_default());
    let mut offset = 10; // ip (8) + is_branch + branch_taken
    offset += NUM_DESTINATIONS; // destination_registers
    offset += NUM_SOURCES; // source_registers

    let mut destination_memory = [0u64; NUM_DESTINATIONS];
    for slot in &mut destination_memory {
        *slot = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap_or_default());
        offset += 8;
    }
    let mut source_memory = [0u64; NUM_SOURCES];
    for slot in &mut source_memory {
        *slot = u64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap_or_default());
        offset += 8;
    }

    TraceInstruction {
        ip,
        destination_memory,
        source_memory,
        destination_memory_size: [8; NUM_DESTINATIONS],
        source_memory_size: [8; NUM_SOURCES],
    }
}

fn decode_default(bytes: &[u8]) -> TraceInstruction {
    let mut insn = decode_legacy(bytes);
    let mut offset = LEGACY_RECORD_SIZE;

    for slot in &mut insn.destination_memory_size {
        *slot = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap_or_default());
        offset += 4;
    }
    for slot in &mut insn.source_memory_size {
        *slot = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap_or_default());
        offset += 4;
    }
    // instruction_size trails the record; not tracked by this simulator.
    insn
}

/// Whether traces are read in the legacy (no size/instruction-length
/// fields) or default on-disk format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceFormat {
    /// `LEGACY_TRACE`-style record: addresses and register ids only.
    Legacy,
    /// Default record: legacy fields plus per-operand sizes and
    /// instruction length. Carries an optional irregular-access-range
    /// prefix (§6).
    Default,
}

enum Source {
    Plain(BufReader<std::fs::File>),
    Piped {
        child: Child,
        reader: BufReader<std::process::ChildStdout>,
    },
}

/// Reads one CPU's trace, transparently decompressing `.gz`/`.xz`
/// files through a subprocess, and looping from the start when the
/// underlying stream is exhausted before the run completes.
pub struct TraceReader {
    path: std::path::PathBuf,
    format: TraceFormat,
    source: Source,
    /// `(lo, hi)` irregular-access address ranges read from the
    /// non-legacy trace's header prefix, if any.
    irregular_ranges: Vec<(u64, u64)>,
}

impl TraceReader {
    /// Opens `path` in the default record format, spawning a
    /// decompressor subprocess if its extension names a supported
    /// compression format.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trace` if the file cannot be opened or the
    /// decompressor cannot be spawned.
    pub fn open(path: &Path) -> Result<Self, SimError> {
        Self::open_with_format(path, TraceFormat::Default)
    }

    /// Opens `path` in the given record format. Default-format traces
    /// begin with a `u64` pair count followed by that many `(lo, hi)`
    /// irregular-access ranges, consumed once at open time.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trace` if the file cannot be opened, the
    /// decompressor cannot be spawned, or the irregular-range prefix
    /// is truncated.
    pub fn open_with_format(path: &Path, format: TraceFormat) -> Result<Self, SimError> {
        let mut source = Self::open_source(path)?;
        let irregular_ranges = if format == TraceFormat::Default {
            Self::read_irregular_ranges(&mut source, path)?
        } else {
            Vec::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            format,
            source,
            irregular_ranges,
        })
    }

    /// The irregular-access address ranges read from this trace's
    /// header, if it carried one.
    #[must_use]
    pub fn irregular_ranges(&self) -> &[(u64, u64)] {
        &self.irregular_ranges
    }

    fn read_irregular_ranges(source: &mut Source, path: &Path) -> Result<Vec<(u64, u64)>, SimError> {
        let mut count_buf = [0u8; 8];
        let n = Self::read_from(source, &mut count_buf)
            .map_err(|e| SimError::Trace(format!("reading range count for {}: {e}", path.display())))?;
        if n < 8 {
            // Too short to carry a range-count prefix; treat as a body with no ranges.
            return Ok(Vec::new());
        }
        let n_pairs = u64::from_le_bytes(count_buf);
        let mut ranges = Vec::with_capacity(usize::try_from(n_pairs).unwrap_or(0).min(1 << 20));
        for _ in 0..n_pairs {
            let mut pair_buf = [0u8; 16];
            let n = Self::read_from(source, &mut pair_buf)
                .map_err(|e| SimError::Trace(format!("reading irregular range for {}: {e}", path.display())))?;
            if n < 16 {
                return Err(SimError::Trace(format!("truncated irregular-range prefix in {}", path.display())));
            }
            let lo = u64::from_le_bytes(pair_buf[0..8].try_into().unwrap_or_default());
            let hi = u64::from_le_bytes(pair_buf[8..16].try_into().unwrap_or_default());
            ranges.push((lo, hi));
        }
        Ok(ranges)
    }

    fn open_source(path: &Path) -> Result<Source, SimError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let decompressor = match ext {
            "gz" => Some("gzip"),
            "xz" => Some("xz"),
            _ => None,
        };

        if let Some(program) = decompressor {
            let mut child = Command::new(program)
                .arg("-dc")
                .arg(path)
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| SimError::Trace(format!("spawning {program} for {}: {e}", path.display())))?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| SimError::Trace(format!("no stdout pipe for {}", path.display())))?;
            Ok(Source::Piped {
                child,
                reader: BufReader::new(stdout),
            })
        } else {
            let file = std::fs::File::open(path)
                .map_err(|e| SimError::Trace(format!("opening {}: {e}", path.display())))?;
            Ok(Source::Plain(BufReader::new(file)))
        }
    }

    fn read_from(source: &mut Source, buf: &mut [u8]) -> std::io::Result<usize> {
        match source {
            Source::Plain(r) => read_exact_or_eof(r, buf),
            Source::Piped { reader, .. } => read_exact_or_eof(reader, buf),
        }
    }

    fn record_size(&self) -> usize {
        match self.format {
            TraceFormat::Legacy => LEGACY_RECORD_SIZE,
            TraceFormat::Default => DEFAULT_RECORD_SIZE,
        }
    }

    /// Reads the next instruction, re-opening the trace from the start
    /// (and respawning the decompressor, if any) when the underlying
    /// stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns `SimError::Trace` if the trace cannot be rewound.
    pub fn next_instruction(&mut self) -> Result<TraceInstruction, SimError> {
        let record_size = self.record_size();
        let mut buf = [0u8; DEFAULT_RECORD_SIZE];
        loop {
            let n = Self::read_from(&mut self.source, &mut buf[..record_size])
                .map_err(|e| SimError::Trace(format!("reading {}: {e}", self.path.display())))?;
            if n == record_size {
                return Ok(match self.format {
                    TraceFormat::Legacy => decode_legacy(&buf[..record_size]),
                    TraceFormat::Default => decode_default(&buf[..record_size]),
                });
            }
            self.source = Self::open_source(&self.path)?;
            if self.format == TraceFormat::Default {
                self.irregular_ranges = Self::read_irregular_ranges(&mut self.source, &self.path)?;
            }
        }
    }
}

impl Drop for TraceReader {
    fn drop(&mut self) {
        if let Source::Piped { child, .. } = &mut self.source {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn read_exact_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let total_needed = buf.len();
    let mut total = 0;
    while total < total_needed {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_default_record(file: &mut std::fs::File, ip: u64, loads: &[u64], stores: &[u64]) {
        file.write_all(&ip.to_le_bytes()).unwrap();
        file.write_all(&[0u8, 0u8]).unwrap(); // is_branch, branch_taken
        file.write_all(&[0u8; NUM_DESTINATIONS]).unwrap();
        file.write_all(&[0u8; NUM_SOURCES]).unwrap();

        let mut dest = [0u64; NUM_DESTINATIONS];
        for (slot, &addr) in dest.iter_mut().zip(stores) {
            *slot = addr;
        }
        for addr in dest {
            file.write_all(&addr.to_le_bytes()).unwrap();
        }

        let mut src = [0u64; NUM_SOURCES];
        for (slot, &addr) in src.iter_mut().zip(loads) {
            *slot = addr;
        }
        for addr in src {
            file.write_all(&addr.to_le_bytes()).unwrap();
        }

        for _ in 0..NUM_DESTINATIONS {
            file.write_all(&8u32.to_le_bytes()).unwrap();
        }
        for _ in 0..NUM_SOURCES {
            file.write_all(&8u32.to_le_bytes()).unwrap();
        }
        file.write_all(&4u32.to_le_bytes()).unwrap(); // instruction_size
    }

    #[test]
    fn reads_records_and_loops_on_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        write_default_record(&mut file, 0x400, &[0x1000], &[]);
        drop(file);

        let mut reader = TraceReader::open(&path).unwrap();
        let first = reader.next_instruction().unwrap();
        assert_eq!(first.ip, 0x400);
        assert!(first.is_load());
        assert_eq!(first.first_load(), Some((0x1000, 8)));

        let second = reader.next_instruction().unwrap();
        assert_eq!(second.ip, 0x400, "trace should loop, not terminate");
    }

    #[test]
    fn store_only_record_has_no_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        write_default_record(&mut file, 0x800, &[], &[0x2000]);
        drop(file);

        let mut reader = TraceReader::open(&path).unwrap();
        let insn = reader.next_instruction().unwrap();
        assert!(!insn.is_load());
        assert!(insn.is_store());
        assert_eq!(insn.first_store(), Some((0x2000, 8)));
    }
}
