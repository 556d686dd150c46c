// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Byte streams over package buffers.

Both directions move data in blocks of [BLOCK] bytes, so a staged buffer costs one round
trip per block rather than one per call.
*/

use std::io::{self, Read, Write};

use super::description::BufferRef;
use super::error::BufferError;
use super::package::ExecutionPackage;

pub const BLOCK: usize = 4096;

fn io_error(e: BufferError) -> io::Error {
    io::Error::other(e)
}

/// Reads a buffer from `start` to its end.
#[derive(Debug)]
pub struct BufferReader<'p, 'i> {
    package: &'p mut ExecutionPackage<'i>,
    buffer: BufferRef,
    position: u64,
    end: u64,
    block: Vec<u8>,
    consumed: usize,
}

impl<'p, 'i> BufferReader<'p, 'i> {
    pub fn new(package: &'p mut ExecutionPackage<'i>, buffer: BufferRef, start: u64) -> Result<Self, BufferError> {
        let end = package
            .buffer_size(buffer)
            .ok_or(BufferError::NoSuchBuffer(buffer))?;
        if start > end {
            return Err(BufferError::OutOfRange {
                buffer,
                offset: start,
                len: 0,
                size: end,
            });
        }
        Ok(BufferReader {
            package,
            buffer,
            position: start,
            end,
            block: Vec::with_capacity(BLOCK),
            consumed: 0,
        })
    }

    /// Offset of the next byte `read` returns.
    pub fn position(&self) -> u64 {
        self.position - (self.block.len() - self.consumed) as u64
    }

    fn refill(&mut self) -> Result<(), BufferError> {
        let len = (self.end - self.position).min(BLOCK as u64) as usize;
        self.block.resize(len, 0);
        self.package.read(self.buffer, self.position, &mut self.block)?;
        self.position += len as u64;
        self.consumed = 0;
        Ok(())
    }
}

impl Read for BufferReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.consumed == self.block.len() {
            if self.position == self.end || buf.is_empty() {
                return Ok(0);
            }
            self.refill().map_err(io_error)?;
        }
        let available = &self.block[self.consumed..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consumed += n;
        Ok(n)
    }
}

/**
Writes a buffer from `start` onward.

`write` returns `Ok(0)` once the buffer is full.  Pending bytes go out on `flush`,
[BufferWriter::finish], or, ignoring errors, on drop.
*/
#[derive(Debug)]
pub struct BufferWriter<'p, 'i> {
    package: &'p mut ExecutionPackage<'i>,
    buffer: BufferRef,
    position: u64,
    end: u64,
    pending: Vec<u8>,
}

impl<'p, 'i> BufferWriter<'p, 'i> {
    pub fn new(package: &'p mut ExecutionPackage<'i>, buffer: BufferRef, start: u64) -> Result<Self, BufferError> {
        let end = package
            .buffer_size(buffer)
            .ok_or(BufferError::NoSuchBuffer(buffer))?;
        if start > end {
            return Err(BufferError::OutOfRange {
                buffer,
                offset: start,
                len: 0,
                size: end,
            });
        }
        Ok(BufferWriter {
            package,
            buffer,
            position: start,
            end,
            pending: Vec::with_capacity(BLOCK),
        })
    }

    /// Offset the next written byte lands at.
    pub fn position(&self) -> u64 {
        self.position + self.pending.len() as u64
    }

    fn write_pending(&mut self) -> Result<(), BufferError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        self.package.write(self.buffer, self.position, &self.pending)?;
        self.position += self.pending.len() as u64;
        self.pending.clear();
        Ok(())
    }

    /// Writes out pending bytes and returns the end offset.
    pub fn finish(mut self) -> Result<u64, BufferError> {
        self.write_pending()?;
        Ok(self.position)
    }
}

impl Write for BufferWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = (self.end - self.position()) as usize;
        let n = room.min(BLOCK - self.pending.len()).min(buf.len());
        self.pending.extend_from_slice(&buf[..n]);
        if self.pending.len() == BLOCK {
            self.write_pending().map_err(io_error)?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending().map_err(io_error)
    }
}

impl Drop for BufferWriter<'_, '_> {
    fn drop(&mut self) {
        if let Err(e) = self.write_pending() {
            logwise::error_sync!(
                "dropping a buffer writer lost pending bytes: {err}",
                err = logwise::privacy::LogIt(&e)
            );
        }
    }
}

#[cfg(all(test, not(feature = "backend_vulkan")))]
mod tests {
    use super::*;
    use crate::compute::ExecutionPackageDescription;
    use crate::device::{Instance, SimulatedDevice};

    #[test]
    fn stream_through_staging() {
        let instance = Instance::simulated(vec![SimulatedDevice::discrete()]);
        let mut d = ExecutionPackageDescription::default();
        let data = d.add_data(10_000);
        d.staging = 1024;
        let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
        let bytes: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut writer = BufferWriter::new(&mut package, data, 0).unwrap();
        writer.write_all(&bytes).unwrap();
        //the buffer is full
        assert_eq!(writer.write(&[1]).unwrap(), 0);
        assert_eq!(writer.finish().unwrap(), 10_000);

        let mut reader = BufferReader::new(&mut package, data, 0).unwrap();
        let mut back = Vec::new();
        reader.read_to_end(&mut back).unwrap();
        assert_eq!(back, bytes);
    }

    #[test]
    fn reader_starts_mid_buffer() {
        let instance = Instance::simulated(vec![SimulatedDevice::integrated()]);
        let mut d = ExecutionPackageDescription::default();
        let input = d.add_input(16);
        let mut package = ExecutionPackage::prepare(&instance, 0, &d).unwrap();
        package.write(input, 0, &(0..16).collect::<Vec<u8>>()).unwrap();
        let mut reader = BufferReader::new(&mut package, input, 10).unwrap();
        let mut two = [0; 2];
        reader.read_exact(&mut two).unwrap();
        assert_eq!(two, [10, 11]);
        assert_eq!(reader.position(), 12);
        assert!(BufferReader::new(&mut package, input, 17).is_err());
    }
}
