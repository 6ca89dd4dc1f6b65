use crate::errors::RdbError;
use crate::protocol_constants::*;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use crc::{Crc, CRC_64_REDIS};
use log::{debug, warn};
use std::io::Read;

static RDB_CRC: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// One key loaded from a snapshot. The expiry, when present, is an absolute
/// unix-epoch-milliseconds deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct RdbRecord {
    pub key: String,
    pub value: String,
    pub expires_at_ms: Option<i64>,
}

enum StringLength {
    Bytes(usize),
    Integer(i64),
}

/// Opcode-driven decoder for the binary snapshot format. Only string values
/// are supported; every other value type fails the parse. Records from
/// databases other than index 0 are decoded and discarded.
pub struct RdbParser<R> {
    reader: R,
    digest: crc::Digest<'static, u64>,
}

impl<R: Read> RdbParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            digest: RDB_CRC.digest(),
        }
    }

    pub fn parse(mut self) -> Result<Vec<RdbRecord>, RdbError> {
        self.read_header()?;

        let mut records = Vec::new();
        let mut current_db: usize = 0;
        loop {
            let opcode = self.read_u8()?;
            match opcode {
                OPCODE_AUX => {
                    let key = self.read_string()?;
                    let value = self.read_string()?;
                    debug!("rdb aux field {}={}", key, value);
                }
                OPCODE_SELECT_DB => {
                    current_db = self.read_size()?;
                    let marker = self.read_u8()?;
                    if marker != OPCODE_RESIZE_DB {
                        return Err(RdbError::UnexpectedOpcode(marker));
                    }
                    let table_size = self.read_size()?;
                    let expires_size = self.read_size()?;
                    debug!(
                        "rdb database {} (table size {}, expires {})",
                        current_db, table_size, expires_size
                    );
                    if current_db != 0 {
                        warn!("ignoring records from database {}", current_db);
                    }
                }
                OPCODE_EXPIRE_TIME_MS => {
                    let expiry = LittleEndian::read_i64(&self.read_bytes(8)?);
                    let value_type = self.read_u8()?;
                    let record = self.read_record(value_type, Some(expiry))?;
                    if current_db == 0 {
                        records.push(record);
                    }
                }
                OPCODE_EXPIRE_TIME_S => {
                    let seconds = LittleEndian::read_i32(&self.read_bytes(4)?);
                    let value_type = self.read_u8()?;
                    let record = self.read_record(value_type, Some(i64::from(seconds) * 1000))?;
                    if current_db == 0 {
                        records.push(record);
                    }
                }
                OPCODE_EOF => {
                    self.verify_checksum()?;
                    break;
                }
                value_type => {
                    let record = self.read_record(value_type, None)?;
                    if current_db == 0 {
                        records.push(record);
                    }
                }
            }
        }
        Ok(records)
    }

    fn read_header(&mut self) -> Result<(), RdbError> {
        let header = self.read_bytes(9)?;
        if &header[..5] != MAGIC_NUMBER {
            return Err(RdbError::InvalidMagic);
        }
        let version = String::from_utf8_lossy(&header[5..]).into_owned();
        if !header[5..].iter().all(u8::is_ascii_digit) {
            return Err(RdbError::InvalidVersion(version));
        }
        debug!("rdb version {}", version);
        Ok(())
    }

    fn read_record(
        &mut self,
        value_type: u8,
        expires_at_ms: Option<i64>,
    ) -> Result<RdbRecord, RdbError> {
        if value_type != VALUE_TYPE_STRING {
            return Err(RdbError::UnsupportedValueType(value_type));
        }
        let key = self.read_string()?;
        let value = self.read_string()?;
        Ok(RdbRecord {
            key,
            value,
            expires_at_ms,
        })
    }

    // Variable-length size field. The two top bits of the first byte select
    // the layout; `11` is not a size but an integer-string directive.
    fn read_length(&mut self) -> Result<StringLength, RdbError> {
        let first = self.read_u8()?;
        match first >> 6 {
            0b00 => Ok(StringLength::Bytes((first & 0x3F) as usize)),
            0b01 => {
                let second = self.read_u8()?;
                Ok(StringLength::Bytes(
                    (((first & 0x3F) as usize) << 8) | second as usize,
                ))
            }
            0b10 => {
                let buf = self.read_bytes(4)?;
                Ok(StringLength::Bytes(BigEndian::read_u32(&buf) as usize))
            }
            _ => match first & 0x3F {
                STRING_ENC_INT8 => {
                    let byte = self.read_u8()?;
                    Ok(StringLength::Integer(i64::from(byte as i8)))
                }
                STRING_ENC_INT16 => {
                    let buf = self.read_bytes(2)?;
                    Ok(StringLength::Integer(i64::from(LittleEndian::read_i16(&buf))))
                }
                STRING_ENC_INT32 => {
                    let buf = self.read_bytes(4)?;
                    Ok(StringLength::Integer(i64::from(LittleEndian::read_i32(&buf))))
                }
                encoding => Err(RdbError::UnsupportedStringEncoding(encoding)),
            },
        }
    }

    fn read_size(&mut self) -> Result<usize, RdbError> {
        match self.read_length()? {
            StringLength::Bytes(n) => Ok(n),
            StringLength::Integer(_) => Err(RdbError::InvalidLength),
        }
    }

    fn read_string(&mut self) -> Result<String, RdbError> {
        match self.read_length()? {
            StringLength::Bytes(n) => {
                let buf = self.read_bytes(n)?;
                Ok(String::from_utf8_lossy(&buf).into_owned())
            }
            StringLength::Integer(n) => Ok(n.to_string()),
        }
    }

    // The trailer is the CRC-64 of every preceding byte. A zero trailer
    // means the writer had checksums disabled. Mismatches are logged, not
    // fatal.
    fn verify_checksum(&mut self) -> Result<(), RdbError> {
        let digest = std::mem::replace(&mut self.digest, RDB_CRC.digest());
        let computed = digest.finalize();
        let mut trailer = [0u8; 8];
        self.reader.read_exact(&mut trailer)?;
        let stored = LittleEndian::read_u64(&trailer);
        if stored != 0 && stored != computed {
            warn!(
                "rdb checksum mismatch: stored {:016x}, computed {:016x}",
                stored, computed
            );
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8, RdbError> {
        let mut buf = [0u8; 1];
        self.reader.read_exact(&mut buf)?;
        self.digest.update(&buf);
        Ok(buf[0])
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, RdbError> {
        let mut buf = vec![0u8; n];
        self.reader.read_exact(&mut buf)?;
        self.digest.update(&buf);
        Ok(buf)
    }
}
