// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Fixed-width big-endian records over any byte stream.

use std::io::{self, Read, Write};

/// A value with a fixed big-endian encoding.
pub trait Record: Copy {
    const WIDTH: usize;
    /// Writes exactly [Record::WIDTH] bytes.
    fn encode(self, out: &mut [u8]);
    fn decode(bytes: &[u8]) -> Self;
}

macro_rules! record {
    ($($t:ty),*) => {
        $(
            impl Record for $t {
                const WIDTH: usize = std::mem::size_of::<$t>();
                fn encode(self, out: &mut [u8]) {
                    out[..Self::WIDTH].copy_from_slice(&self.to_be_bytes());
                }
                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    <$t>::from_be_bytes(raw)
                }
            }
        )*
    };
}

record!(u32, i32, u64, i64, f32, f64);

pub fn write_record<T: Record, W: Write>(writer: &mut W, value: T) -> io::Result<()> {
    let mut bytes = [0u8; 8];
    value.encode(&mut bytes[..T::WIDTH]);
    writer.write_all(&bytes[..T::WIDTH])
}

pub fn write_records<T: Record, W: Write>(writer: &mut W, values: &[T]) -> io::Result<()> {
    values.iter().try_for_each(|v| write_record(writer, *v))
}

/// Reads one record.  `Ok(None)` at a clean end of stream; a partial record is an error.
pub fn try_read_record<T: Record, R: Read>(reader: &mut R) -> io::Result<Option<T>> {
    let mut bytes = [0u8; 8];
    let mut filled = 0;
    while filled < T::WIDTH {
        match reader.read(&mut bytes[filled..T::WIDTH]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Some(T::decode(&bytes[..T::WIDTH])))
}

pub fn read_record<T: Record, R: Read>(reader: &mut R) -> io::Result<T> {
    try_read_record(reader)?.ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
}

pub fn read_records<T: Record, R: Read>(reader: &mut R, count: usize) -> io::Result<Vec<T>> {
    (0..count).map(|_| read_record(reader)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_layout() {
        let mut out = Vec::new();
        write_record(&mut out, 0x0102_0304u32).unwrap();
        write_record(&mut out, -2i64).unwrap();
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        assert_eq!(&out[4..], &[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe]);
        let mut input = out.as_slice();
        assert_eq!(read_record::<u32, _>(&mut input).unwrap(), 0x0102_0304);
        assert_eq!(read_record::<i64, _>(&mut input).unwrap(), -2);
        assert_eq!(try_read_record::<f64, _>(&mut input).unwrap(), None);
    }

    #[test]
    fn truncated_record() {
        let mut input: &[u8] = &[0, 0, 0];
        let err = try_read_record::<f32, _>(&mut input).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn nan_bits_survive() {
        let nan = f64::from_bits(0x7ff8_0000_0000_0001);
        let mut out = Vec::new();
        write_records(&mut out, &[nan, 1.5]).unwrap();
        let back: Vec<f64> = read_records(&mut out.as_slice(), 2).unwrap();
        assert_eq!(back[0].to_bits(), nan.to_bits());
        assert_eq!(back[1], 1.5);
    }
}
