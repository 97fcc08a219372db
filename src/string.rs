use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::consts;

/// Reads a null-terminated string.  Cabinets from major version 17 onwards
/// store UTF-16LE strings; older ones store 8-bit strings in the code page of
/// the machine that built them, which we read as UTF-8 when possible and as
/// Latin-1 otherwise.
pub(crate) fn read_null_terminated_string<R: Read>(
    reader: &mut R,
    is_utf16: bool,
) -> io::Result<String> {
    if is_utf16 {
        return read_utf16_string(reader);
    }
    let mut bytes = Vec::<u8>::new();
    loop {
        let byte = reader.read_u8()?;
        if byte == 0 {
            break;
        } else if bytes.len() == consts::MAX_STRING_SIZE {
            invalid_data!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        bytes.push(byte);
    }
    Ok(match String::from_utf8(bytes) {
        Ok(string) => string,
        Err(error) => error.into_bytes().iter().map(|&b| b as char).collect(),
    })
}

fn read_utf16_string<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut units = Vec::<u16>::new();
    loop {
        let unit = reader.read_u16::<LittleEndian>()?;
        if unit == 0 {
            break;
        } else if units.len() == consts::MAX_STRING_SIZE {
            invalid_data!(
                "String longer than maximum of {} characters",
                consts::MAX_STRING_SIZE
            );
        }
        units.push(unit);
    }
    Ok(String::from_utf16_lossy(&units))
}

/// Reads a string prefixed by its byte length.  Used by V3 archives, whose
/// names are not null-terminated.
pub(crate) fn read_prefixed_string<R: Read>(
    reader: &mut R,
    length: usize,
) -> io::Result<String> {
    let mut bytes = vec![0u8; length];
    reader.read_exact(&mut bytes)?;
    if let Some(end) = bytes.iter().position(|&b| b == 0) {
        bytes.truncate(end);
    }
    Ok(match String::from_utf8(bytes) {
        Ok(string) => string,
        Err(error) => error.into_bytes().iter().map(|&b| b as char).collect(),
    })
}
